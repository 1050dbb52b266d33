//! Tagged decision diagrams (spec.md §4.A, §4.E).
//!
//! A TBDD node is a BDD node `(v, hi, lo)` plus a `tag`: the variable
//! level its children actually branch on next. When a function doesn't
//! depend on every variable in between, the chain of "don't care" nodes
//! a plain BDD would need just to keep the level order intact collapses
//! into this one node -- `tag` records where the real branching resumes
//! so a reader (or `reorder`) can reconstruct the skipped range without
//! materializing it.
//!
//! The original engine attaches a tag to every *edge* (so a node's hi
//! and lo children can each resume at a different level). This crate
//! stores the tag once per *node* instead -- both children are assumed
//! to resume at the same level, which is the common case (a node's
//! `tag` is simply the topmost variable its `hi`/`lo` children actually
//! mention) and keeps the node payload a plain tuple the unique table
//! can hash directly, at the cost of not compressing the rarer case
//! where hi and lo skip different numbers of levels. Documented in
//! DESIGN.md as a deliberate scope reduction.
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::bdd::BddBase;
use crate::gc::{self, GcStats, ResizePolicy};
use crate::kind::Kind;
use crate::levels::Levels;
use crate::nid::{Nid, I, O};
use crate::opcache::OpCache;
use crate::refs::ExternalRefs;
use crate::runtime::Runtime;
use crate::table::UniqueTable;
use crate::vid::{topmost, topmost_of3, Vid};
use crate::zdd::ZddBase;

/// `(branch var, hi child, lo child, tag)`.
pub type TbddNode = (Vid, Nid, Nid, Vid);

const ITE: u8 = 0;

struct Inner {
    table: UniqueTable<TbddNode>,
    cache: OpCache,
    rt: Runtime,
    levels: Mutex<Levels>,
    refs: Mutex<ExternalRefs>,
}

#[derive(Clone)]
pub struct TbddBase(Arc<Inner>);

impl TbddBase {
    pub fn new(num_workers: usize) -> Self {
        TbddBase(Arc::new(Inner {
            table: UniqueTable::new(1 << 16, 1 << 30),
            cache: OpCache::new(1 << 20),
            rt: Runtime::new(num_workers),
            levels: Mutex::new(Levels::new()),
            refs: Mutex::new(ExternalRefs::new()),
        }))
    }

    pub fn new_var(&self) -> Nid {
        let v = self.0.levels.lock().unwrap().new_var();
        self.restrict(v, I, O)
    }

    pub fn num_vars(&self) -> usize { self.0.levels.lock().unwrap().num_vars() }
    pub fn node_count(&self) -> usize { self.0.table.len() }
    pub fn protect(&self, n: Nid) { if !n.is_const() { self.0.refs.lock().unwrap().protect(n.index() as u32); } }
    pub fn unprotect(&self, n: Nid) { if !n.is_const() { self.0.refs.lock().unwrap().unprotect(n.index() as u32); } }

    fn node(&self, n: Nid) -> TbddNode { self.0.table.get(n.index() as u32) }

    pub fn var_of(&self, n: Nid) -> Vid { if n.is_const() { Vid::TOP } else { self.node(n).0 } }

    /// The level this node's children actually resume branching at --
    /// `Vid::TOP` if both are leaves.
    pub fn tag_of(&self, n: Nid) -> Vid { if n.is_const() { Vid::TOP } else { self.node(n).3 } }

    fn cofactors(&self, n: Nid, v: Vid) -> (Nid, Nid) {
        if n.is_const() { return (n, n); }
        let (nv, hi, lo, _tag) = self.node(n);
        if nv != v { (n, n) } else { (hi.inv_if(n.is_inv()), lo.inv_if(n.is_inv())) }
    }

    /// Build (or find canonical) the node `(v, hi, lo)`, with `tag`
    /// derived as the topmost level `hi`/`lo` actually branch on.
    fn restrict(&self, v: Vid, hi: Nid, lo: Nid) -> Nid {
        if hi == lo { return hi; }
        if self.0.table.is_full() {
            self.collect_garbage();
            if self.0.table.is_full() {
                crate::fatal!("tbdd: unique table full after GC, cannot allocate node");
            }
        }
        let tag = topmost(self.var_of(hi), self.var_of(lo));
        if lo.is_inv() {
            let r = self.0.table.lookup((v, !hi, !lo, tag));
            !Nid::from_index(r.index as u64)
        } else {
            let r = self.0.table.lookup((v, hi, lo, tag));
            Nid::from_index(r.index as u64)
        }
    }

    /// Variables strictly between `v` and this node's `tag` that the
    /// node's canonical form has elided -- the range a plain BDD would
    /// have spent one redundant node per level on.
    pub fn skipped_vars(&self, n: Nid) -> Vec<Vid> {
        if n.is_const() { return vec![]; }
        let (v, _, _, tag) = self.node(n);
        (v.label() + 1..tag.label()).map(Vid::new).collect()
    }

    pub fn ite(&self, i: Nid, t: Nid, e: Nid) -> Nid {
        self.0.rt.yield_to_gc_if_requested();
        if i == I { return t; }
        if i == O { return e; }
        if t == e { return t; }
        if t == I && e == O { return i; }
        if t == O && e == I { return !i; }

        let (i, t, e, flip) = if t.is_inv() { (i, !t, !e, true) } else { (i, t, e, false) };

        if let Some(bits) = self.0.cache.get(ITE as u64, i.bits(), t.bits(), e.bits()) {
            let r = Nid::from_bits(bits);
            return if flip { !r } else { r };
        }

        let v = topmost_of3(self.var_of(i), self.var_of(t), self.var_of(e));
        let (ihi, ilo) = self.cofactors(i, v);
        let (thi, tlo) = self.cofactors(t, v);
        let (ehi, elo) = self.cofactors(e, v);

        let other = self.clone();
        let (hi, lo) = self.0.rt.join(
            || self.ite(ihi, thi, ehi),
            move || other.ite(ilo, tlo, elo),
        );

        let result = self.restrict(v, hi, lo);
        self.0.cache.put(ITE as u64, i.bits(), t.bits(), e.bits(), result.bits());
        if flip { !result } else { result }
    }

    pub fn and(&self, a: Nid, b: Nid) -> Nid { self.ite(a, b, O) }
    pub fn or(&self, a: Nid, b: Nid) -> Nid { self.ite(a, I, b) }
    pub fn xor(&self, a: Nid, b: Nid) -> Nid { self.ite(a, !b, b) }

    /// Structural copy into a [`BddBase`]: a canonical reduced BDD already
    /// elides any level a node doesn't depend on the same way `tag` does
    /// here (`cofactors`'s "doesn't depend" case returns the node
    /// unchanged either way), so no level-expansion is needed, just a
    /// memoized walk rebuilding each node through `b`'s own `restrict`.
    pub fn to_bdd(&self, b: &BddBase, f: Nid) -> Nid {
        fn go(t: &TbddBase, b: &BddBase, n: Nid, memo: &mut HashMap<Nid, Nid>) -> Nid {
            if n.is_const() { return n; }
            let raw = n.raw();
            if let Some(&r) = memo.get(&raw) { return r.inv_if(n.is_inv()); }
            let v = t.var_of(raw);
            let (hi, lo) = t.cofactors(raw, v);
            let bhi = go(t, b, hi, memo);
            let blo = go(t, b, lo, memo);
            let result = b.restrict(v, bhi, blo);
            memo.insert(raw, result);
            result.inv_if(n.is_inv())
        }
        go(self, b, f, &mut HashMap::new())
    }

    /// Inverse of [`Self::to_bdd`]: same memoized structural walk, driven
    /// by the BDD's own cofactors instead.
    pub fn from_bdd(&self, b: &BddBase, f: Nid) -> Nid {
        fn go(t: &TbddBase, b: &BddBase, n: Nid, memo: &mut HashMap<Nid, Nid>) -> Nid {
            if n.is_const() { return n; }
            let raw = n.raw();
            if let Some(&r) = memo.get(&raw) { return r.inv_if(n.is_inv()); }
            let v = b.var_of(raw);
            let (hi, lo) = b.cofactors(raw, v);
            let thi = go(t, b, hi, memo);
            let tlo = go(t, b, lo, memo);
            let result = t.restrict(v, thi, tlo);
            memo.insert(raw, result);
            result.inv_if(n.is_inv())
        }
        go(self, b, f, &mut HashMap::new())
    }

    /// Characteristic-function conversion into a [`ZddBase`]: unlike a
    /// BDD, a ZDD's "doesn't depend on v" cofactor is `(O, n)`, not `(n,
    /// n)`, so a level a node skips isn't free here -- it has to become
    /// an explicit node whose hi and lo both lead to the same subfamily
    /// (`z.restrict` doesn't elide `hi == lo`, only `hi == O`, so this
    /// really does build a branch, not collapse one away). Walks every
    /// level `0..num_vars` explicitly for that reason. Assumes `self` and
    /// `z` were populated with the same variable count in the same order
    /// (neither kind reorders, so label and level coincide for both).
    pub fn to_zdd(&self, z: &ZddBase, f: Nid) -> Nid {
        fn go(t: &TbddBase, z: &ZddBase, n: Nid, level: u32, nvars: usize, memo: &mut HashMap<(Nid, u32), Nid>) -> Nid {
            if level as usize == nvars { return n; }
            if n == O { return O; }
            if let Some(&r) = memo.get(&(n, level)) { return r; }
            let result = if n != I && t.var_of(n).label() == level {
                let v = t.var_of(n);
                let (hi, lo) = t.cofactors(n, v);
                let zhi = go(t, z, hi, level + 1, nvars, memo);
                let zlo = go(t, z, lo, level + 1, nvars, memo);
                z.restrict(Vid::new(level), zhi, zlo)
            } else {
                let sub = go(t, z, n, level + 1, nvars, memo);
                z.restrict(Vid::new(level), sub, sub)
            };
            memo.insert((n, level), result);
            result
        }
        go(self, z, f, 0, self.num_vars(), &mut HashMap::new())
    }

    /// Inverse of [`Self::to_zdd`]: a ZDD node's var always matches the
    /// query (no don't-care branches to skip on this side), so this is a
    /// plain structural walk rebuilding each node through `self::restrict`
    /// (which derives the `tag` automatically).
    pub fn from_zdd(&self, z: &ZddBase, f: Nid) -> Nid {
        fn go(t: &TbddBase, z: &ZddBase, n: Nid, memo: &mut HashMap<Nid, Nid>) -> Nid {
            if n == O { return O; }
            if n == I { return I; }
            if let Some(&r) = memo.get(&n) { return r; }
            let v = z.var_of(n);
            let (hi, lo) = z.cofactors(n, v);
            let thi = go(t, z, hi, memo);
            let tlo = go(t, z, lo, memo);
            let result = t.restrict(v, thi, tlo);
            memo.insert(n, result);
            result
        }
        go(self, z, f, &mut HashMap::new())
    }

    pub fn collect_garbage(&self) -> GcStats {
        let table = &self.0.table;
        gc::collect(
            &self.0.rt,
            table,
            &self.0.cache,
            &mut self.0.refs.lock().unwrap(),
            |ix, mark| {
                let (_, hi, lo, _tag) = table.get(ix);
                if !hi.is_const() { mark(hi.index() as u32); }
                if !lo.is_const() { mark(lo.index() as u32); }
            },
            |_| {},
            ResizePolicy::Normal,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_and_or_xor() {
        let b = TbddBase::new(2);
        let x = b.new_var();
        let y = b.new_var();
        assert_eq!(b.and(x, y), b.ite(x, y, O));
        assert_eq!(b.or(x, I), I);
        assert_eq!(b.xor(x, x), O);
    }

    #[test]
    fn test_tag_records_next_real_level() {
        let b = TbddBase::new(1);
        let x0 = b.new_var();
        let x1 = b.new_var();
        let x2 = b.new_var();
        // f depends on x0 and x2 but not x1: hi/lo of the top node point
        // straight at x2's node, so tag should read x2's level, not x1's.
        let f = b.and(x0, x2);
        let v = b.var_of(f);
        assert_eq!(v, b.var_of(x0));
        let tag = b.tag_of(f);
        assert_eq!(tag, b.var_of(x2));
        assert_eq!(b.skipped_vars(f), vec![b.var_of(x1)]);
    }

    #[test]
    fn test_to_bdd_and_back_preserves_function() {
        let t = TbddBase::new(1);
        let b = BddBase::new(1);
        let x0 = t.new_var();
        let _x1 = t.new_var();
        let x2 = t.new_var();
        let bx0 = b.new_var();
        let bx1 = b.new_var();
        b.new_var();
        // f skips x1 in the TBDD's tag; the BDD side has no such shortcut
        // and must materialize every level explicitly.
        let f = t.and(x0, x2);
        let fb = t.to_bdd(&b, f);
        assert_eq!(b.satcount(fb, 3), 2);

        let back = t.from_bdd(&b, fb);
        assert_eq!(back, f);

        let g = b.xor(bx0, bx1);
        let gt = t.from_bdd(&b, g);
        let back_g = t.to_bdd(&b, gt);
        assert_eq!(back_g, g);
    }

    #[test]
    fn test_to_zdd_and_back_preserves_family() {
        let t = TbddBase::new(1);
        let z = ZddBase::new(1);
        let x0 = t.new_var();
        let x1 = t.new_var();
        let x2 = t.new_var();
        z.new_var();
        z.new_var();
        z.new_var();
        // f = x0 & x2, skipping x1's level entirely -- to_zdd must turn
        // that skip into an explicit "don't care" node at x1's level.
        let f = t.and(x0, x2);
        let zf = t.to_zdd(&z, f);
        // The only satisfying assignment sets x0 and x2, x1 either way:
        // two members of the characteristic-function family.
        assert_eq!(z.count(zf), 2);
        let mut sets: Vec<Vec<Vid>> = z.members(zf).collect();
        for s in &mut sets { s.sort_by_key(|v| v.label()); }
        sets.sort();
        assert_eq!(sets, vec![
            vec![t.var_of(x0), t.var_of(x1), t.var_of(x2)],
            vec![t.var_of(x0), t.var_of(x2)],
        ]);

        let back = t.from_zdd(&z, zf);
        assert_eq!(back, f);
    }
}
