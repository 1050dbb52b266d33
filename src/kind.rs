//! Shared machinery for binary recursive operations across all diagram
//! kinds (spec.md §4.E).
//!
//! Every kind (BDD/ZDD/MTBDD/LDD/TBDD) defines canonicalization (when do
//! `hi`/`lo` collapse to a single child) and its own handful of terminal
//! shortcuts (`AND(a, O) = O` regardless of what `a` is), but the
//! recursive skeleton around those decisions -- cache lookup, pick the
//! top variable, cofactor both operands on it, recurse in parallel via
//! [`crate::runtime::Runtime::join`], canonicalize, cache the result --
//! is identical. `binop` is that skeleton, generalized from the
//! three-way normalization the teacher's `bdd::ITE::norm` hardcodes for
//! `ite` specifically into something every binary operator can reuse.
use std::sync::Arc;

use crate::nid::Nid;
use crate::opcache::OpCache;
use crate::refs;
use crate::runtime::Runtime;
use crate::vid::Vid;

/// A diagram kind's canonicalization and terminal-shortcut rules.
/// Implementors wrap an `Arc`-shared unique table internally, so cloning
/// a `Kind` is cheap and is how a recursive call crosses into a spawned
/// worker task.
pub trait Kind: Clone + Send + Sync + 'static {
    /// The variable this node branches on, or `Vid::TOP` for a leaf/const.
    fn var_of(&self, n: Nid) -> Vid;
    /// This node's children when branching on `v`. If `n` branches on a
    /// variable below `v` (or is a leaf), both cofactors equal `n` itself
    /// -- the standard "doesn't depend on v" case.
    fn cofactors(&self, n: Nid, v: Vid) -> (Nid, Nid);
    /// Build (or find canonical) the node `(v, hi, lo)`, applying this
    /// kind's elision rule (BDD: elide if hi==lo; ZDD: elide if hi==O; ...).
    fn restrict(&self, v: Vid, hi: Nid, lo: Nid) -> Nid;
    /// Short-circuit result for `op(a, b)` without recursing, if this
    /// kind's algebra makes one available (e.g. `AND(a, O) = O`).
    fn terminal(&self, op: Opcode, a: Nid, b: Nid) -> Option<Nid>;
}

/// Numeric opcode, used only as an operation-cache key component; each
/// kind module defines its own small set of constants (`AND`, `OR`, ...).
/// Distinct kinds use distinct `OpCache` instances, so the opcode alone
/// disambiguates one kind's `AND` from another's.
pub type Opcode = u8;

/// The generic binary-operator template.
pub fn binop<K: Kind>(kind: &K, rt: &Arc<Runtime>, cache: &Arc<OpCache>, op: Opcode, a: Nid, b: Nid) -> Nid {
    rt.yield_to_gc_if_requested();
    if let Some(r) = kind.terminal(op, a, b) { return r; }

    if let Some(bits) = cache.get(op as u64, a.bits(), b.bits(), 0) {
        return Nid::from_bits(bits);
    }

    let va = kind.var_of(a);
    let vb = kind.var_of(b);
    let v = if va.is_above(&vb) { va } else { vb };

    let (ahi, alo) = kind.cofactors(a, v);
    let (bhi, blo) = kind.cofactors(b, v);

    let (k2, rt2, c2) = (kind.clone(), rt.clone(), cache.clone());
    let (hi, lo) = refs::protect_all(&[a, b], || rt.join(
        || binop(kind, rt, cache, op, ahi, bhi),
        move || binop(&k2, &rt2, &c2, op, alo, blo),
    ));

    let result = refs::protect_all(&[hi, lo], || kind.restrict(v, hi, lo));
    cache.put(op as u64, a.bits(), b.bits(), 0, result.bits());
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nid::{I, O};

    #[derive(Clone)]
    struct ConstKind;
    impl Kind for ConstKind {
        fn var_of(&self, _n: Nid) -> Vid { Vid::TOP }
        fn cofactors(&self, n: Nid, _v: Vid) -> (Nid, Nid) { (n, n) }
        fn restrict(&self, _v: Vid, hi: Nid, _lo: Nid) -> Nid { hi }
        fn terminal(&self, _op: Opcode, a: Nid, _b: Nid) -> Option<Nid> { Some(a) }
    }

    #[test]
    fn test_terminal_short_circuits() {
        let k = ConstKind;
        let rt = Arc::new(Runtime::new(1));
        let cache = Arc::new(OpCache::new(64));
        assert_eq!(binop(&k, &rt, &cache, 0, I, O), I);
    }

    #[derive(Clone)]
    struct XorKind(Arc<crate::table::UniqueTable<(Vid, Nid, Nid)>>);
    impl Kind for XorKind {
        fn var_of(&self, n: Nid) -> Vid {
            if n.is_const() { Vid::TOP } else { self.0.get(n.index() as u32).0 }
        }
        fn cofactors(&self, n: Nid, v: Vid) -> (Nid, Nid) {
            if n.is_const() { return (n, n); }
            let (nv, hi, lo) = self.0.get(n.index() as u32);
            if nv != v { (n, n) } else { (hi.inv_if(n.is_inv()), lo.inv_if(n.is_inv())) }
        }
        fn restrict(&self, v: Vid, hi: Nid, lo: Nid) -> Nid {
            if hi == lo { return hi; }
            let (hi, lo, inv) = if hi.is_inv() { (!hi, !lo, true) } else { (hi, lo, false) };
            let r = self.0.lookup((v, hi, lo));
            Nid::from_index(r.index as u64).inv_if(inv)
        }
        fn terminal(&self, op: Opcode, a: Nid, b: Nid) -> Option<Nid> {
            const XOR: u8 = 1;
            if op == XOR {
                if a == O { return Some(b); }
                if b == O { return Some(a); }
                if a == b { return Some(O); }
            }
            None
        }
    }

    #[test]
    fn test_xor_self_inverse_via_binop() {
        let table = Arc::new(crate::table::UniqueTable::new(16, 1024));
        let k = XorKind(table.clone());
        let rt = Arc::new(Runtime::new(2));
        let cache = Arc::new(OpCache::new(64));
        let x0 = Nid::from_index(table.lookup((Vid::new(0), I, O)).index as u64);
        assert_eq!(binop(&k, &rt, &cache, 1, x0, x0), O);
        assert_eq!(binop(&k, &rt, &cache, 1, x0, O), x0);
    }
}
