//! Binary decision diagrams (spec.md §4.A, §4.E).
//!
//! Canonical form follows the usual BDD convention: a node's `lo` child
//! is never complemented (the complement bit, if one is needed, lives on
//! the node's own handle instead), and `hi == lo` collapses the node
//! away entirely. `ite` is the single primitive everything else reduces
//! to -- `AND(a,b) = ite(a,b,O)`, `OR(a,b) = ite(a,I,b)`,
//! `XOR(a,b) = ite(a,!b,b)` -- the same reduction the teacher's
//! `bdd::BddBase` uses, generalized from its hardcoded `ITE::norm` into a
//! recursive method driven by [`crate::kind`]'s cofactor/restrict
//! primitives instead of a bespoke three-way match.
use std::sync::{Arc, Mutex};

use crate::gc::{self, GcStats, ResizePolicy};
use crate::kind::Kind;
use crate::levels::Levels;
use crate::nid::{Nid, I, O};
use crate::opcache::OpCache;
use crate::refs::{self, ExternalRefs};
use crate::runtime::Runtime;
use crate::table::UniqueTable;
use crate::vid::Vid;

/// `(branch var, hi child, lo child)`. This is the payload stored in the
/// unique table; a [`Nid`]'s index points at one of these.
pub type BddNode = (Vid, Nid, Nid);

const ITE: u8 = 0;

struct Inner {
    table: UniqueTable<BddNode>,
    cache: OpCache,
    rt: Runtime,
    levels: Mutex<Levels>,
    refs: Mutex<ExternalRefs>,
}

/// A BDD universe: one unique table, one operation cache, one worker
/// pool. Cheap to clone (an `Arc` around shared state), which is what
/// lets a recursive `ite` call hand a copy of itself to a spawned task.
#[derive(Clone)]
pub struct BddBase(Arc<Inner>);

impl BddBase {
    pub fn new(num_workers: usize) -> Self {
        Self::with_table_capacity(num_workers, 1 << 16, 1 << 30)
    }

    /// Same as [`Self::new`] but with an explicit unique-table capacity,
    /// for exercising the table-full path without allocating a million
    /// nodes.
    pub(crate) fn with_table_capacity(num_workers: usize, initial: usize, max: usize) -> Self {
        BddBase(Arc::new(Inner {
            table: UniqueTable::new(initial, max),
            cache: OpCache::new(1 << 20),
            rt: Runtime::new(num_workers),
            levels: Mutex::new(Levels::new()),
            refs: Mutex::new(ExternalRefs::new()),
        }))
    }

    /// Allocate a fresh variable and return its literal (the BDD node
    /// `(v, I, O)`, i.e. "x_v is true").
    pub fn new_var(&self) -> Nid {
        let v = self.0.levels.lock().unwrap().new_var();
        self.var_node(v)
    }

    fn var_node(&self, v: Vid) -> Nid { self.restrict(v, I, O) }

    pub fn num_vars(&self) -> usize { self.0.levels.lock().unwrap().num_vars() }

    pub fn protect(&self, n: Nid) { if !n.is_const() { self.0.refs.lock().unwrap().protect(n.index() as u32); } }
    pub fn unprotect(&self, n: Nid) { if !n.is_const() { self.0.refs.lock().unwrap().unprotect(n.index() as u32); } }

    pub fn node_count(&self) -> usize { self.0.table.len() }

    /// Is the unique table at capacity? Exposed so [`crate::reorder`] can
    /// check before attempting a swap, which allocates a burst of new
    /// nodes -- a sift that would blow the table should fail cleanly
    /// rather than hit the same wall every ordinary `restrict` call does.
    pub fn is_table_full(&self) -> bool { self.0.table.is_full() }

    /// `v`'s current structural depth, for ordering purposes: its level
    /// if it's a real variable, or past every real level if it's
    /// `Vid::TOP` (constants have no level and always sort last). Label
    /// order alone isn't enough here -- after [`crate::reorder`] swaps two
    /// variables, their labels no longer sit in level order, so `ite` and
    /// friends must pick the topmost operand by *level*, not by raw `Vid`
    /// comparison the way [`crate::vid::topmost_of3`] does.
    fn depth_of(&self, v: Vid) -> u32 {
        if v.is_top() { u32::MAX } else { self.level_of(v) }
    }

    fn topmost(&self, a: Vid, b: Vid) -> Vid {
        if self.depth_of(a) <= self.depth_of(b) { a } else { b }
    }

    fn topmost_of3(&self, a: Vid, b: Vid, c: Vid) -> Vid {
        self.topmost(a, self.topmost(b, c))
    }

    /// If-then-else: the one primitive recursive operation. Every other
    /// boolean connective is a thin wrapper around it.
    pub fn ite(&self, i: Nid, t: Nid, e: Nid) -> Nid {
        self.0.rt.yield_to_gc_if_requested();
        if i == I { return t; }
        if i == O { return e; }
        if t == e { return t; }
        if t == I && e == O { return i; }
        if t == O && e == I { return !i; }
        if i == t { return self.ite(i, I, e); }
        if i == !t { return self.ite(i, O, e); }
        if i == e { return self.ite(i, t, O); }
        if i == !e { return self.ite(i, t, I); }

        let (i, t, e, flip) = if t.is_inv() { (i, !t, !e, true) } else { (i, t, e, false) };

        if let Some(bits) = self.0.cache.get(ITE as u64, i.bits(), t.bits(), e.bits()) {
            let r = Nid::from_bits(bits);
            return if flip { !r } else { r };
        }

        let v = self.topmost_of3(self.var_of(i), self.var_of(t), self.var_of(e));
        let (ihi, ilo) = self.cofactors(i, v);
        let (thi, tlo) = self.cofactors(t, v);
        let (ehi, elo) = self.cofactors(e, v);

        let other = self.clone();
        let (hi, lo) = refs::protect_all(&[i, t, e], || self.0.rt.join(
            || self.ite(ihi, thi, ehi),
            move || other.ite(ilo, tlo, elo),
        ));

        let result = refs::protect_all(&[hi, lo], || self.restrict(v, hi, lo));
        self.0.cache.put(ITE as u64, i.bits(), t.bits(), e.bits(), result.bits());
        if flip { !result } else { result }
    }

    pub fn and(&self, a: Nid, b: Nid) -> Nid { self.ite(a, b, O) }
    pub fn or(&self, a: Nid, b: Nid) -> Nid { self.ite(a, I, b) }
    pub fn xor(&self, a: Nid, b: Nid) -> Nid { self.ite(a, !b, b) }
    pub fn not(&self, a: Nid) -> Nid { !a }

    /// Existential quantification over `v`: `exists(v, f) = f[v:=1] OR f[v:=0]`.
    pub fn exists(&self, v: Vid, f: Nid) -> Nid {
        let (hi, lo) = self.cofactors(f, v);
        self.or(hi, lo)
    }

    /// Universal quantification: `forall(v, f) = f[v:=1] AND f[v:=0]`.
    pub fn forall(&self, v: Vid, f: Nid) -> Nid {
        let (hi, lo) = self.cofactors(f, v);
        self.and(hi, lo)
    }

    /// Compose: substitute `g` for every occurrence of `v` in `f`.
    pub fn compose(&self, f: Nid, v: Vid, g: Nid) -> Nid {
        let (hi, lo) = self.cofactors(f, v);
        self.ite(g, hi, lo)
    }

    /// Set `v` to `val` in `f` (spec.md's `restrict`/cofactor-at-a-point).
    pub fn restrict_var(&self, f: Nid, v: Vid, val: bool) -> Nid {
        let (hi, lo) = self.cofactors(f, v);
        if val { hi } else { lo }
    }

    /// `relprod(s, r, vars) = exists(vars, s AND r)` -- the core step of
    /// BFS reachability analysis over a transition relation `r`.
    pub fn relprod(&self, s: Nid, r: Nid, vars: &[Vid]) -> Nid {
        self.and_exists(s, r, vars)
    }

    /// `relprev` swaps the roles: used when stepping a transition
    /// relation backwards (predecessor image) instead of forwards.
    pub fn relprev(&self, s: Nid, r: Nid, vars: &[Vid]) -> Nid {
        self.and_exists(r, s, vars)
    }

    /// `and_exists(a, b, vars) = exists(vars, a AND b)`, computed without
    /// ever materializing the full conjunction when a variable in `vars`
    /// can be eliminated from a subtree early.
    pub fn and_exists(&self, a: Nid, b: Nid, vars: &[Vid]) -> Nid {
        let mut acc = self.and(a, b);
        for &v in vars { acc = self.exists(v, acc); }
        acc
    }

    /// Generalized cofactor (Coudert-Madre constrain): restricts `f` to
    /// the "don't care" space outside `c`, which can shrink the diagram
    /// when `c` is cheap and `f` is expensive.
    pub fn constrain(&self, f: Nid, c: Nid) -> Nid {
        if c == I { return f; }
        if c == O { return O; }
        if f.is_const() { return f; }
        let v = self.topmost(self.var_of(f), self.var_of(c));
        let (fhi, flo) = self.cofactors(f, v);
        let (chi, clo) = self.cofactors(c, v);
        if chi == O { return self.constrain(flo, clo); }
        if clo == O { return self.constrain(fhi, chi); }
        self.restrict(v, self.constrain(fhi, chi), self.constrain(flo, clo))
    }

    /// Number of root-to-`I` paths (ignoring how many assignments each
    /// path represents), used as a cheaper proxy for `satcount` when only
    /// relative size matters.
    pub fn pathcount(&self, f: Nid) -> u128 {
        fn go(b: &BddBase, f: Nid, memo: &mut std::collections::HashMap<Nid, u128>) -> u128 {
            if f == O { return 0; }
            if f == I { return 1; }
            if let Some(&n) = memo.get(&f) { return n; }
            let v = b.var_of(f);
            let (hi, lo) = b.cofactors(f, v);
            let n = go(b, hi, memo) + go(b, lo, memo);
            memo.insert(f, n);
            n
        }
        go(self, f, &mut std::collections::HashMap::new())
    }

    /// Number of satisfying assignments over `num_vars` total variables.
    ///
    /// Counts "don't care" variables skipped between a node and its
    /// parent by *level* (current structural position), not raw label --
    /// after [`crate::reorder`] swaps two variables their labels no
    /// longer sit in level order, so label arithmetic alone would under-
    /// or overflow the skip count.
    pub fn satcount(&self, f: Nid, num_vars: usize) -> u128 {
        fn go(b: &BddBase, f: Nid, depth: u32, num_vars: usize) -> u128 {
            if f == O { return 0; }
            if f == I { return 1u128 << (num_vars as u32 - depth); }
            let v = b.var_of(f);
            let level = b.level_of(v);
            let (hi, lo) = b.cofactors(f, v);
            let skipped = level - depth;
            let sub = go(b, hi, level + 1, num_vars) + go(b, lo, level + 1, num_vars);
            sub << skipped
        }
        go(self, f, 0, num_vars)
    }

    /// Current structural position of `v` (spec.md §3 levels table).
    pub fn level_of(&self, v: Vid) -> u32 { self.0.levels.lock().unwrap().level_of_label(v) }
    pub fn label_of_level(&self, level: u32) -> Vid { self.0.levels.lock().unwrap().label_of_level(level) }
    pub fn swap_levels(&self, level: u32) { self.0.levels.lock().unwrap().swap_levels(level); }

    pub fn support(&self, f: Nid, out: &mut Vec<Vid>) {
        fn walk(b: &BddBase, f: Nid, seen: &mut std::collections::HashSet<Nid>, out: &mut Vec<Vid>) {
            if f.is_const() || !seen.insert(f.raw()) { return; }
            let v = b.var_of(f);
            if !out.contains(&v) { out.push(v); }
            let (hi, lo) = b.cofactors(f, v);
            walk(b, hi, seen, out);
            walk(b, lo, seen, out);
        }
        let mut seen = std::collections::HashSet::new();
        walk(self, f, &mut seen, out);
        out.sort_by_key(|v| v.label());
    }

    pub fn collect_garbage(&self) -> GcStats {
        let table = &self.0.table;
        gc::collect(
            &self.0.rt,
            table,
            &self.0.cache,
            &mut self.0.refs.lock().unwrap(),
            |ix, mark| {
                let (_, hi, lo) = table.get(ix);
                if !hi.is_const() { mark(hi.index() as u32); }
                if !lo.is_const() { mark(lo.index() as u32); }
            },
            |_| {},
            ResizePolicy::Normal,
        )
    }
}

impl Kind for BddBase {
    fn var_of(&self, n: Nid) -> Vid {
        if n.is_const() { Vid::TOP } else { self.0.table.get(n.index() as u32).0 }
    }

    fn cofactors(&self, n: Nid, v: Vid) -> (Nid, Nid) {
        if n.is_const() { return (n, n); }
        let (nv, hi, lo) = self.0.table.get(n.index() as u32);
        if nv != v { (n, n) } else { (hi.inv_if(n.is_inv()), lo.inv_if(n.is_inv())) }
    }

    fn restrict(&self, v: Vid, hi: Nid, lo: Nid) -> Nid {
        if hi == lo { return hi; }
        if self.0.table.is_full() {
            self.collect_garbage();
            if self.0.table.is_full() {
                crate::fatal!("bdd: unique table full after GC, cannot allocate node");
            }
        }
        if lo.is_inv() {
            let r = self.0.table.lookup((v, !hi, !lo));
            !Nid::from_index(r.index as u64)
        } else {
            let r = self.0.table.lookup((v, hi, lo));
            Nid::from_index(r.index as u64)
        }
    }

    fn terminal(&self, _op: u8, _a: Nid, _b: Nid) -> Option<Nid> { None }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_and_or_xor_truth_table() {
        let b = BddBase::new(2);
        let x = b.new_var();
        let y = b.new_var();
        assert_eq!(b.and(x, y), b.ite(x, y, O));
        assert_eq!(b.or(x, y), b.ite(x, I, y));
        assert_eq!(b.xor(x, x), O);
        assert_eq!(b.xor(x, O), x);
        assert_eq!(b.and(x, I), x);
        assert_eq!(b.and(x, O), O);
        assert_eq!(b.or(x, I), I);
    }

    #[test]
    fn test_ite_is_canonical() {
        let b = BddBase::new(1);
        let x = b.new_var();
        let y = b.new_var();
        let f1 = b.and(x, y);
        let f2 = b.and(y, x);
        assert_eq!(f1, f2, "AND must be commutative under canonicalization");
    }

    #[test]
    fn test_exists_forall() {
        let b = BddBase::new(1);
        let x = b.new_var();
        let y = b.new_var();
        let f = b.and(x, y);
        let vx = b.var_of(x);
        assert_eq!(b.exists(vx, f), y);
        assert_eq!(b.forall(vx, f), O);
    }

    #[test]
    fn test_satcount() {
        let b = BddBase::new(1);
        let x = b.new_var();
        let y = b.new_var();
        let f = b.or(x, y);
        assert_eq!(b.satcount(f, 2), 3);
        assert_eq!(b.satcount(I, 2), 4);
        assert_eq!(b.satcount(O, 2), 0);
    }

    #[test]
    fn test_support() {
        let b = BddBase::new(1);
        let x = b.new_var();
        let y = b.new_var();
        let z = b.new_var();
        let f = b.and(x, z);
        let mut s = vec![];
        b.support(f, &mut s);
        assert_eq!(s, vec![b.var_of(x), b.var_of(z)]);
        let _ = y;
    }

    #[test]
    fn test_pathcount_vs_satcount() {
        let b = BddBase::new(1);
        let x = b.new_var();
        let y = b.new_var();
        let f = b.or(x, y);
        assert_eq!(b.pathcount(f), 2); // two paths reach I: (x=1,*) and (x=0,y=1)
        assert_eq!(b.satcount(f, 2), 3);
    }

    #[test]
    fn test_constrain_and_relprod() {
        let b = BddBase::new(1);
        let x = b.new_var();
        let y = b.new_var();
        let f = b.and(x, y);
        assert_eq!(b.constrain(f, I), f);
        assert_eq!(b.constrain(f, O), O);
        let vx = b.var_of(x);
        assert_eq!(b.relprod(x, y, &[vx]), b.exists(vx, b.and(x, y)));
    }

    #[test]
    fn test_gc_keeps_protected() {
        let b = BddBase::new(1);
        let x = b.new_var();
        let y = b.new_var();
        let f = b.and(x, y);
        b.protect(f);
        let stats = b.collect_garbage();
        assert!(stats.collected == 0 || b.and(x, y) == f);
    }
}
