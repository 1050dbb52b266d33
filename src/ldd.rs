//! List decision diagrams (spec.md §4.A, §4.E).
//!
//! An LDD node `(val, down, right)` represents a set of finite integer
//! tuples: `val` is the value at the current position, `down` is the
//! subtree over the remaining positions given that value, and `right`
//! is the subtree for alternative values at the *same* position (nodes
//! are chained by increasing `val`, so two LDDs can be merged the way
//! two sorted linked lists are merged). `I` terminates an accepted
//! tuple; `O` is the empty set. This doesn't fit [`crate::kind::Kind`]'s
//! single-variable cofactor model (there's no fixed "next variable" to
//! pick between two operands -- the merge has to walk both `right`
//! chains in step), so these operations are hand-recursive the same way
//! `bdd::ite` is.
use std::sync::{Arc, Mutex};

use crate::gc::{self, GcStats, ResizePolicy};
use crate::nid::{Nid, I, O};
use crate::opcache::OpCache;
use crate::refs::ExternalRefs;
use crate::runtime::Runtime;
use crate::table::UniqueTable;

pub type LddNode = (i64, Nid, Nid);

const UNION: u8 = 0;
const MATCH: u8 = 1;
const MINUS: u8 = 2;
const JOIN: u8 = 3;

struct Inner {
    table: UniqueTable<LddNode>,
    cache: OpCache,
    rt: Runtime,
    refs: Mutex<ExternalRefs>,
}

#[derive(Clone)]
pub struct LddBase(Arc<Inner>);

impl LddBase {
    pub fn new(num_workers: usize) -> Self {
        LddBase(Arc::new(Inner {
            table: UniqueTable::new(1 << 16, 1 << 30),
            cache: OpCache::new(1 << 20),
            rt: Runtime::new(num_workers),
            refs: Mutex::new(ExternalRefs::new()),
        }))
    }

    fn make(&self, val: i64, down: Nid, right: Nid) -> Nid {
        if down == O { return right; }
        let r = self.0.table.lookup((val, down, right));
        Nid::from_index(r.index as u64)
    }

    fn node(&self, n: Nid) -> LddNode { self.0.table.get(n.index() as u32) }

    /// The singleton tuple `[val]`.
    pub fn member(&self, val: i64) -> Nid { self.make(val, I, O) }

    /// Prepend `val` to every tuple in `tail`.
    pub fn cons(&self, val: i64, tail: Nid) -> Nid { self.make(val, tail, O) }

    pub fn protect(&self, n: Nid) { if !n.is_const() { self.0.refs.lock().unwrap().protect(n.index() as u32); } }
    pub fn unprotect(&self, n: Nid) { if !n.is_const() { self.0.refs.lock().unwrap().unprotect(n.index() as u32); } }
    pub fn node_count(&self) -> usize { self.0.table.len() }

    fn cached(&self, op: u8, a: Nid, b: Nid) -> Option<Nid> { self.0.cache.get(op as u64, a.bits(), b.bits(), 0).map(Nid::from_bits) }
    fn store(&self, op: u8, a: Nid, b: Nid, r: Nid) { self.0.cache.put(op as u64, a.bits(), b.bits(), 0, r.bits()); }

    /// Union of two tuple sets.
    pub fn union(&self, a: Nid, b: Nid) -> Nid {
        self.0.rt.yield_to_gc_if_requested();
        if a == O { return b; }
        if b == O { return a; }
        if a == I || b == I { return I; } // both sets contain the empty tuple at this position
        if a == b { return a; }
        if let Some(r) = self.cached(UNION, a, b) { return r; }
        let (va, da, ra) = self.node(a);
        let (vb, db, rb) = self.node(b);
        let result = match va.cmp(&vb) {
            std::cmp::Ordering::Less => self.make(va, da, self.union(ra, b)),
            std::cmp::Ordering::Greater => self.make(vb, db, self.union(a, rb)),
            std::cmp::Ordering::Equal => {
                let other = self.clone();
                let (down, right) = self.0.rt.join(
                    || self.union(da, db),
                    move || other.union(ra, rb),
                );
                self.make(va, down, right)
            }
        };
        self.store(UNION, a, b, result);
        result
    }

    /// Intersection ("match"): tuples present in both sets.
    pub fn match_(&self, a: Nid, b: Nid) -> Nid {
        self.0.rt.yield_to_gc_if_requested();
        if a == O || b == O { return O; }
        if a == I && b == I { return I; }
        if a == I { return O; }
        if b == I { return O; }
        if a == b { return a; }
        if let Some(r) = self.cached(MATCH, a, b) { return r; }
        let (va, da, ra) = self.node(a);
        let (vb, db, rb) = self.node(b);
        let result = match va.cmp(&vb) {
            std::cmp::Ordering::Less => self.match_(ra, b),
            std::cmp::Ordering::Greater => self.match_(a, rb),
            std::cmp::Ordering::Equal => {
                let other = self.clone();
                let (down, right) = self.0.rt.join(
                    || self.match_(da, db),
                    move || other.match_(ra, rb),
                );
                self.make(va, down, right)
            }
        };
        self.store(MATCH, a, b, result);
        result
    }

    /// Set difference: tuples in `a` but not `b`.
    pub fn minus(&self, a: Nid, b: Nid) -> Nid {
        self.0.rt.yield_to_gc_if_requested();
        if a == O { return O; }
        if b == O { return a; }
        if a == b { return O; }
        if let Some(r) = self.cached(MINUS, a, b) { return r; }
        let result = if a == I {
            if b == I { O } else { I }
        } else if b == I {
            a
        } else {
            let (va, da, ra) = self.node(a);
            let (vb, db, rb) = self.node(b);
            match va.cmp(&vb) {
                std::cmp::Ordering::Less => self.make(va, da, self.minus(ra, b)),
                std::cmp::Ordering::Greater => self.minus(a, rb),
                std::cmp::Ordering::Equal => {
                    let other = self.clone();
                    let (down, right) = self.0.rt.join(
                        || self.minus(da, db),
                        move || other.minus(ra, rb),
                    );
                    self.make(va, down, right)
                }
            }
        };
        self.store(MINUS, a, b, result);
        result
    }

    /// Sequential composition: wherever a tuple in `a` ends, continue it
    /// with every tuple in `b`.
    pub fn join(&self, a: Nid, b: Nid) -> Nid {
        self.0.rt.yield_to_gc_if_requested();
        if a == O { return O; }
        if a == I { return b; }
        if let Some(r) = self.cached(JOIN, a, b) { return r; }
        let (va, da, ra) = self.node(a);
        let other = self.clone();
        let (down, right) = self.0.rt.join(
            || self.join(da, b),
            move || other.join(ra, b),
        );
        let result = self.make(va, down, right);
        self.store(JOIN, a, b, result);
        result
    }

    /// Drop the first coordinate from every tuple (existential
    /// projection over the leading position): the union of every
    /// `down` subtree across the whole `right` chain at the top level.
    pub fn project_first(&self, f: Nid) -> Nid {
        if f == O || f == I { return f; }
        let (_, down, right) = self.node(f);
        self.union(down, self.project_first(right))
    }

    /// Drop the first `n` coordinates.
    pub fn project(&self, f: Nid, n: usize) -> Nid {
        let mut r = f;
        for _ in 0..n { r = self.project_first(r); }
        r
    }

    /// Number of distinct tuples represented by `f`.
    pub fn count(&self, f: Nid) -> u128 {
        fn go(l: &LddBase, f: Nid, memo: &mut std::collections::HashMap<Nid, u128>) -> u128 {
            if f == O { return 0; }
            if f == I { return 1; }
            if let Some(&n) = memo.get(&f) { return n; }
            let (_, down, right) = l.node(f);
            let n = go(l, down, memo) + go(l, right, memo);
            memo.insert(f, n);
            n
        }
        go(self, f, &mut std::collections::HashMap::new())
    }

    pub fn collect_garbage(&self) -> GcStats {
        let table = &self.0.table;
        gc::collect(
            &self.0.rt,
            table,
            &self.0.cache,
            &mut self.0.refs.lock().unwrap(),
            |ix, mark| {
                let (_, down, right) = table.get(ix);
                if !down.is_const() { mark(down.index() as u32); }
                if !right.is_const() { mark(right.index() as u32); }
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
    fn test_member_union_count() {
        let l = LddBase::new(1);
        let a = l.member(1);
        let b = l.member(2);
        let both = l.union(a, b);
        assert_eq!(l.count(both), 2);
        assert_eq!(l.count(l.match_(a, b)), 0);
        assert_eq!(l.match_(a, a), a);
    }

    #[test]
    fn test_minus() {
        let l = LddBase::new(1);
        let a = l.member(1);
        let b = l.member(2);
        let both = l.union(a, b);
        assert_eq!(l.minus(both, b), a);
    }

    #[test]
    fn test_join_concatenates() {
        let l = LddBase::new(1);
        let a = l.member(1); // tuple [1]
        let b = l.member(2); // tuple [2]
        let ab = l.join(a, b); // tuple [1,2]
        assert_eq!(l.count(ab), 1);
        let (v, down, right) = l.node(ab);
        assert_eq!(v, 1);
        assert_eq!(right, O);
        assert_eq!(down, b);
    }

    #[test]
    fn test_project_first_drops_leading_coordinate() {
        let l = LddBase::new(1);
        let a = l.member(1);
        let b = l.member(2);
        let ab = l.join(a, b); // [1,2]
        let ba = l.join(b, a); // [2,1]
        let both = l.union(ab, ba);
        let projected = l.project_first(both);
        // suffixes after dropping the first coordinate: {2} from ab, {1} from ba
        assert_eq!(l.count(projected), 2);
    }
}
