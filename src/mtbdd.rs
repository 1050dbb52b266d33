//! Multi-terminal decision diagrams (spec.md §4.A, §4.B, §4.E).
//!
//! Unlike BDD/ZDD, an MTBDD's leaves aren't a fixed pair of constants --
//! they carry arbitrary values (booleans, integers, floats), so every
//! leaf lives in the same unique table as internal nodes, addressed by
//! an ordinary index (the handle's complement bit goes unused here: a
//! leaf's value is its identity, there's no "negated leaf" to collapse
//! onto). `apply`/`uapply` take arbitrary user closures rather than a
//! fixed opcode set, so they're implemented directly instead of through
//! [`crate::kind::binop`] (whose terminal-shortcut model assumes a small,
//! fixed operator alphabet known ahead of time).
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::gc::{self, GcStats, ResizePolicy};
use crate::levels::Levels;
use crate::nid::Nid;
use crate::opcache::OpCache;
use crate::refs::ExternalRefs;
use crate::runtime::Runtime;
use crate::table::UniqueTable;
use crate::vid::{topmost, Vid};

/// A leaf value. Floats are stored by bit pattern so the type stays
/// `Eq + Hash`, which the unique table requires for canonicalization.
///
/// `Custom(type_id, payload)` is an escape hatch for leaves this crate
/// doesn't know the shape of (e.g. a handle into an external arena of
/// bignums). `type_id` selects which `destroy` callback runs on it when
/// GC sweeps it unreached; `payload` is opaque to everything here except
/// that callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Leaf {
    Bool(bool),
    Int(i64),
    Float(u64),
    Custom(u32, u64),
}

impl Leaf {
    pub fn float(v: f64) -> Leaf { Leaf::Float(v.to_bits()) }
    pub fn as_f64(&self) -> Option<f64> { if let Leaf::Float(bits) = self { Some(f64::from_bits(*bits)) } else { None } }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MtNode {
    Internal(Vid, Nid, Nid),
    Leaf(Leaf),
}

const APPLY: u8 = 0;

struct Inner {
    table: UniqueTable<MtNode>,
    cache: OpCache,
    rt: Runtime,
    levels: Mutex<Levels>,
    refs: Mutex<ExternalRefs>,
    /// `type_id -> destroy` callbacks for [`Leaf::Custom`] leaves,
    /// registered by whatever owns that `type_id`'s external arena. Run
    /// during `collect_garbage`'s sweep for any custom leaf GC didn't
    /// mark live.
    custom_destroyers: Mutex<HashMap<u32, fn(u64)>>,
}

#[derive(Clone)]
pub struct MtbddBase(Arc<Inner>);

impl MtbddBase {
    pub fn new(num_workers: usize) -> Self {
        MtbddBase(Arc::new(Inner {
            table: UniqueTable::new(1 << 16, 1 << 30),
            cache: OpCache::new(1 << 20),
            rt: Runtime::new(num_workers),
            levels: Mutex::new(Levels::new()),
            refs: Mutex::new(ExternalRefs::new()),
            custom_destroyers: Mutex::new(HashMap::new()),
        }))
    }

    pub fn new_var(&self, hi: Nid, lo: Nid) -> Nid {
        let v = self.0.levels.lock().unwrap().new_var();
        self.make_internal(v, hi, lo)
    }

    pub fn leaf(&self, value: Leaf) -> Nid {
        let r = self.0.table.lookup(MtNode::Leaf(value));
        Nid::from_index(r.index as u64)
    }

    /// Register (or replace) the `destroy` callback for `type_id`, run on
    /// any of its [`Leaf::Custom`] leaves that GC sweeps as unreachable.
    pub fn register_custom_leaf(&self, type_id: u32, destroy: fn(u64)) {
        self.0.custom_destroyers.lock().unwrap().insert(type_id, destroy);
    }

    /// Build (or find canonical) a custom leaf. Unlike [`Self::leaf`],
    /// this goes through `lookup_custom` so GC knows to run `type_id`'s
    /// registered destroy callback if this leaf is ever swept.
    pub fn custom_leaf(&self, type_id: u32, payload: u64) -> Nid {
        let r = self.0.table.lookup_custom(MtNode::Leaf(Leaf::Custom(type_id, payload)));
        Nid::from_index(r.index as u64)
    }

    fn make_internal(&self, v: Vid, hi: Nid, lo: Nid) -> Nid {
        if hi == lo { return hi; }
        if self.0.table.is_full() {
            self.collect_garbage();
            if self.0.table.is_full() {
                crate::fatal!("mtbdd: unique table full after GC, cannot allocate node");
            }
        }
        let r = self.0.table.lookup(MtNode::Internal(v, hi, lo));
        Nid::from_index(r.index as u64)
    }

    fn node(&self, n: Nid) -> MtNode { self.0.table.get(n.index() as u32) }

    pub fn var_of(&self, n: Nid) -> Vid {
        match self.node(n) { MtNode::Internal(v, _, _) => v, MtNode::Leaf(_) => Vid::TOP }
    }

    pub fn leaf_value(&self, n: Nid) -> Option<Leaf> {
        match self.node(n) { MtNode::Leaf(l) => Some(l), MtNode::Internal(..) => None }
    }

    fn cofactors(&self, n: Nid, v: Vid) -> (Nid, Nid) {
        match self.node(n) {
            MtNode::Leaf(_) => (n, n),
            MtNode::Internal(nv, hi, lo) => if nv == v { (hi, lo) } else { (n, n) },
        }
    }

    pub fn protect(&self, n: Nid) { self.0.refs.lock().unwrap().protect(n.index() as u32); }
    pub fn unprotect(&self, n: Nid) { self.0.refs.lock().unwrap().unprotect(n.index() as u32); }
    pub fn node_count(&self) -> usize { self.0.table.len() }

    /// Apply a binary leaf operation pointwise, recursing structurally.
    /// `op` must be a plain function pointer (not a capturing closure) so
    /// its identity can be folded into the operation-cache key, the same
    /// way the original engine keys its MTBDD cache on the callback
    /// pointer plus the two operand handles.
    pub fn apply(&self, op: fn(Leaf, Leaf) -> Leaf, a: Nid, b: Nid) -> Nid {
        self.0.rt.yield_to_gc_if_requested();
        let opcode = op as usize as u64;
        if let (MtNode::Leaf(la), MtNode::Leaf(lb)) = (self.node(a), self.node(b)) {
            return self.leaf(op(la, lb));
        }
        if let Some(bits) = self.0.cache.get(opcode, a.bits(), b.bits(), APPLY as u64) {
            return Nid::from_bits(bits);
        }
        let v = topmost(self.var_of(a), self.var_of(b));
        let (ahi, alo) = self.cofactors(a, v);
        let (bhi, blo) = self.cofactors(b, v);
        let other = self.clone();
        let (hi, lo) = crate::refs::protect_all(&[a, b], || self.0.rt.join(
            || self.apply(op, ahi, bhi),
            move || other.apply(op, alo, blo),
        ));
        let result = crate::refs::protect_all(&[hi, lo], || self.make_internal(v, hi, lo));
        self.0.cache.put(opcode, a.bits(), b.bits(), APPLY as u64, result.bits());
        result
    }

    /// Map every leaf through a unary function, leaving structure intact
    /// except where two branches collapse to the same new leaf.
    pub fn uapply(&self, op: fn(Leaf) -> Leaf, a: Nid) -> Nid {
        self.0.rt.yield_to_gc_if_requested();
        match self.node(a) {
            MtNode::Leaf(l) => self.leaf(op(l)),
            MtNode::Internal(v, hi, lo) => {
                let other = self.clone();
                let (hi2, lo2) = crate::refs::protect_all(&[hi, lo], || self.0.rt.join(
                    || self.uapply(op, hi), move || other.uapply(op, lo),
                ));
                crate::refs::protect_all(&[hi2, lo2], || self.make_internal(v, hi2, lo2))
            }
        }
    }

    /// Eliminate `v` by folding its two cofactors with `combine` (e.g.
    /// `Leaf::Int` addition for a "sum out this variable" abstraction, or
    /// `max`/`min` for best-case/worst-case projections).
    pub fn abstract_var(&self, v: Vid, f: Nid, combine: fn(Leaf, Leaf) -> Leaf) -> Nid {
        let (hi, lo) = self.cofactors(f, v);
        self.apply(combine, hi, lo)
    }

    pub fn support(&self, f: Nid, out: &mut Vec<Vid>) {
        fn walk(b: &MtbddBase, f: Nid, seen: &mut std::collections::HashSet<Nid>, out: &mut Vec<Vid>) {
            if !seen.insert(f) { return; }
            if let MtNode::Internal(v, hi, lo) = b.node(f) {
                if !out.contains(&v) { out.push(v); }
                walk(b, hi, seen, out);
                walk(b, lo, seen, out);
            }
        }
        let mut seen = std::collections::HashSet::new();
        walk(self, f, &mut seen, out);
        out.sort_by_key(|v| v.label());
    }

    pub fn collect_garbage(&self) -> GcStats {
        let table = &self.0.table;
        let destroyers = self.0.custom_destroyers.lock().unwrap();
        gc::collect(
            &self.0.rt,
            table,
            &self.0.cache,
            &mut self.0.refs.lock().unwrap(),
            |ix, mark| {
                if let MtNode::Internal(_, hi, lo) = table.get(ix) {
                    mark(hi.index() as u32);
                    mark(lo.index() as u32);
                }
            },
            |node| {
                if let MtNode::Leaf(Leaf::Custom(type_id, payload)) = node {
                    if let Some(destroy) = destroyers.get(&type_id) { destroy(payload); }
                }
            },
            ResizePolicy::Normal,
        )
    }
}

/// Leaf-memoization cache used by callers that build many diagrams over
/// the same small value set (not part of the unique table itself, since
/// unlike node identity a leaf's canonical form never needs GC -- a leaf
/// with no internal node pointing at it is simply unreachable).
pub type LeafCache = HashMap<Leaf, Nid>;

#[cfg(test)]
mod tests {
    use super::*;

    fn add(a: Leaf, b: Leaf) -> Leaf {
        match (a, b) { (Leaf::Int(x), Leaf::Int(y)) => Leaf::Int(x + y), _ => panic!("type mismatch") }
    }
    fn double(a: Leaf) -> Leaf { match a { Leaf::Int(x) => Leaf::Int(x * 2), _ => panic!() } }

    static DESTROYED: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);
    fn record_destroy(payload: u64) { DESTROYED.store(payload, std::sync::atomic::Ordering::SeqCst); }

    #[test]
    fn test_custom_leaf_destroy_runs_on_gc() {
        let m = MtbddBase::new(1);
        m.register_custom_leaf(7, record_destroy);
        let kept = m.custom_leaf(7, 111);
        m.protect(kept);
        let swept = m.custom_leaf(7, 222);
        assert_eq!(DESTROYED.load(std::sync::atomic::Ordering::SeqCst), 0);
        m.collect_garbage();
        assert_eq!(DESTROYED.load(std::sync::atomic::Ordering::SeqCst), 222);
        // the protected leaf survived and still canonicalizes to itself
        assert_eq!(m.custom_leaf(7, 111), kept);
        let _ = swept;
    }

    #[test]
    fn test_apply_pointwise_add() {
        let m = MtbddBase::new(2);
        let zero = m.leaf(Leaf::Int(0));
        let one = m.leaf(Leaf::Int(1));
        let f = m.new_var(one, zero);
        let sum = m.apply(add, f, f);
        // f doubled: hi branch 1+1=2, lo branch 0+0=0
        assert!(m.leaf_value(sum).is_none());
        let v = m.var_of(sum);
        let (hi, lo) = m.cofactors(sum, v);
        assert_eq!(m.leaf_value(hi), Some(Leaf::Int(2)));
        assert_eq!(m.leaf_value(lo), Some(Leaf::Int(0)));
    }

    #[test]
    fn test_uapply_doubles_leaves() {
        let m = MtbddBase::new(1);
        let one = m.leaf(Leaf::Int(1));
        let doubled = m.uapply(double, one);
        assert_eq!(m.leaf_value(doubled), Some(Leaf::Int(2)));
    }

    #[test]
    fn test_abstract_sums_branches() {
        let m = MtbddBase::new(1);
        let zero = m.leaf(Leaf::Int(0));
        let one = m.leaf(Leaf::Int(1));
        let f = m.new_var(one, zero);
        let v = m.var_of(f);
        let summed = m.abstract_var(v, f, add);
        assert_eq!(m.leaf_value(summed), Some(Leaf::Int(1)));
    }
}
