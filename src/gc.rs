//! Cooperative garbage collection (spec.md §4.F).
//!
//! GC runs inside [`crate::runtime::Runtime::new_frame`]: every worker
//! finishes its current task and parks before the clear/mark/sweep/resize
//! sequence starts, so no thread is mid-operation on a node that could be
//! collected out from under it. The phases mirror the original engine's
//! `sylvan_gc_*` sequence (clear op-cache, mark from roots, sweep unmarked
//! from the unique table, resize if needed) adapted to the safe
//! `UniqueTable`/`OpCache` built in this crate instead of raw bitmaps.
use std::hash::Hash;
use crate::gc::ResizePolicy::{Aggressive, Normal};
use crate::opcache::OpCache;
use crate::refs::{all_published_roots, ExternalRefs};
use crate::runtime::Runtime;
use crate::table::UniqueTable;

/// How aggressively the unique table grows after a collection that
/// didn't free much. `Normal` only grows when the table is still over a
/// load-factor threshold after sweeping; `Aggressive` always doubles,
/// trading memory for fewer future GC pauses (useful for reordering,
/// which allocates a burst of new nodes in a short window).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResizePolicy { Normal, Aggressive }

impl ResizePolicy {
    fn should_grow(&self, live: usize, capacity: usize) -> bool {
        match self {
            Aggressive => true,
            Normal => capacity > 0 && live * 4 >= capacity * 3, // load factor > 0.75
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GcStats {
    pub collected: usize,
    pub custom_destroyed: usize,
    pub new_capacity: usize,
}

/// Run one full GC cycle for a single kind's table.
///
/// `trace_children(ix, mark)` must call `mark` once for every index `ix`
/// directly references (a node's hi/lo, an LDD's down/right, ...); the
/// collector starts from every external ref and every published
/// protection-stack entry and transitively marks from there.
pub fn collect<N, TraceFn, DestroyFn>(
    rt: &Runtime,
    table: &UniqueTable<N>,
    opcache: &OpCache,
    refs: &mut ExternalRefs,
    mut trace_children: TraceFn,
    destroy_custom: DestroyFn,
    policy: ResizePolicy,
) -> GcStats
where
    N: Eq + Hash + Copy,
    TraceFn: FnMut(u32, &mut dyn FnMut(u32)),
    DestroyFn: Fn(N),
{
    log::debug!("gc: starting collection, {} live nodes", table.len());
    rt.new_frame(|| {
        opcache.clear();

        let mut stack: Vec<u32> = refs.roots().collect();
        stack.extend(all_published_roots());
        while let Some(ix) = stack.pop() {
            if table.mark(ix) {
                trace_children(ix, &mut |child| stack.push(child));
            }
        }

        let (collected, custom_destroyed) = table.sweep(destroy_custom);
        refs.compact();

        let new_capacity = if policy.should_grow(table.len(), table.capacity()) {
            let cap = table.grow();
            log::debug!("gc: resizing table to {cap} entries");
            cap
        } else {
            table.capacity()
        };

        log::debug!("gc: collected {collected} nodes, destroyed {custom_destroyed} custom leaves");
        GcStats { collected, custom_destroyed, new_capacity }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Eq, PartialEq, Hash, Clone, Copy, Debug)]
    struct Node { lo: u32, hi: u32 }

    #[test]
    fn test_collect_keeps_reachable_drops_rest() {
        let rt = Runtime::new(1);
        let table: UniqueTable<Node> = UniqueTable::new(16, 1024);
        let opcache = OpCache::new(64);
        let mut refs = ExternalRefs::new();

        let leaf = table.lookup(Node { lo: 0, hi: 0 }).index;
        let root = table.lookup(Node { lo: leaf, hi: leaf }).index;
        let orphan = table.lookup(Node { lo: 9, hi: 9 }).index;
        refs.protect(root);

        let stats = collect(
            &rt, &table, &opcache, &mut refs,
            |ix, mark| {
                let n = table.get(ix);
                if n.lo != 0 { mark(n.lo); }
                if n.hi != 0 { mark(n.hi); }
            },
            |_| {},
            ResizePolicy::Normal,
        );

        assert_eq!(stats.collected, 1);
        assert_eq!(table.lookup(Node { lo: leaf, hi: leaf }).index, root);
        let re_orphan = table.lookup(Node { lo: 9, hi: 9 });
        assert!(re_orphan.created);
        assert_ne!(re_orphan.index, orphan);
    }

    #[test]
    fn test_aggressive_policy_always_grows() {
        let rt = Runtime::new(1);
        let table: UniqueTable<Node> = UniqueTable::new(4, 64);
        let opcache = OpCache::new(64);
        let mut refs = ExternalRefs::new();
        let stats = collect(&rt, &table, &opcache, &mut refs, |_, _| {}, |_| {}, ResizePolicy::Aggressive);
        assert_eq!(stats.new_capacity, 8);
    }
}
