//! GC roots: external references and per-worker protection stacks
//! (spec.md §4.D/§4.F).
//!
//! A node survives GC if it's reachable from either of two root sets:
//! the user-held *external* refcounts (bumped by `protect`/`ref_nid`,
//! dropped by `deref`), or the nodes each worker currently has live on
//! its call stack mid-operation (a worker computing `ite(a, ite(b,..),
//! c)` can't let `b`'s result be collected while still building on it,
//! even though nothing external points at it yet).
//!
//! Grounded on `swap::IxRc`'s `{ irc, erc }` split (internal refcount
//! from other nodes vs. external refcount from callers) generalized to
//! saturating atomic counters so `protect`/`unprotect` never blocks a GC
//! in progress, and on `swarm.rs`'s per-worker ownership model for the
//! protection stack: each worker thread owns its stack exclusively, so
//! it's a plain `thread_local!` `Vec`, not a shared structure.
use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;
use std::thread::ThreadId;
use dashmap::DashMap;

/// Saturating external refcount, 23 bits wide to match the original
/// engine's packed refcount field; once saturated it never decreases,
/// which just means the node becomes permanently rooted (harmless: it
/// correctly describes "so many callers hold this that we stopped being
/// able to count them exactly").
const MAX_REFCOUNT: u32 = (1 << 23) - 1;

#[derive(Default)]
pub struct ExternalRefs {
    counts: HashMap<u32, AtomicU32>,
}

impl ExternalRefs {
    pub fn new() -> Self { Self::default() }

    /// Bump the external refcount for table index `ix`. Returns the new
    /// count (saturating at `MAX_REFCOUNT`).
    pub fn protect(&mut self, ix: u32) -> u32 {
        let counter = self.counts.entry(ix).or_insert_with(|| AtomicU32::new(0));
        let mut cur = counter.load(Ordering::Relaxed);
        loop {
            if cur >= MAX_REFCOUNT { return cur; }
            match counter.compare_exchange_weak(cur, cur + 1, Ordering::AcqRel, Ordering::Relaxed) {
                Ok(_) => return cur + 1,
                Err(actual) => cur = actual,
            }
        }
    }

    /// Drop one external reference. Panics on underflow -- an unbalanced
    /// deref is a caller bug, not a condition to paper over.
    pub fn unprotect(&mut self, ix: u32) {
        let counter = self.counts.get(&ix).expect("unprotect of an index with no external refs");
        let mut cur = counter.load(Ordering::Relaxed);
        loop {
            assert!(cur > 0, "refcount underflow for index {ix}");
            if cur >= MAX_REFCOUNT {
                // saturated: permanently rooted, nothing to decrement
                return;
            }
            match counter.compare_exchange_weak(cur, cur - 1, Ordering::AcqRel, Ordering::Relaxed) {
                Ok(_) => return,
                Err(actual) => cur = actual,
            }
        }
    }

    pub fn refcount(&self, ix: u32) -> u32 {
        self.counts.get(&ix).map_or(0, |c| c.load(Ordering::Relaxed))
    }

    /// Every index with a nonzero external refcount; these are GC roots.
    pub fn roots(&self) -> impl Iterator<Item = u32> + '_ {
        self.counts.iter().filter(|(_, c)| c.load(Ordering::Relaxed) > 0).map(|(ix, _)| *ix)
    }

    /// Drop bookkeeping for indices that hit zero, so the map doesn't
    /// grow unboundedly across a long run. Called during GC sweep.
    pub fn compact(&mut self) {
        self.counts.retain(|_, c| c.load(Ordering::Relaxed) > 0);
    }
}

thread_local! {
    static PROTECTION_STACK: RefCell<Vec<u32>> = const { RefCell::new(Vec::new()) };
}

fn published() -> &'static DashMap<ThreadId, Vec<u32>> {
    static PUBLISHED: OnceLock<DashMap<ThreadId, Vec<u32>>> = OnceLock::new();
    PUBLISHED.get_or_init(DashMap::new)
}

fn publish_current_stack() {
    let snapshot = PROTECTION_STACK.with(|s| s.borrow().clone());
    published().insert(std::thread::current().id(), snapshot);
}

/// Push `ix` onto this worker's protection stack for the duration of
/// `body`. Used to root an intermediate result across a recursive call
/// that might trigger GC before the result is either returned or handed
/// to `ExternalRefs::protect`. The stack is republished into a shared
/// map on every push/pop so a GC running on a different thread (inside
/// `Runtime::new_frame`) can see every worker's live roots, not just its
/// own -- a plain `thread_local!` would be invisible to the collector.
pub fn with_protected<R>(ix: u32, body: impl FnOnce() -> R) -> R {
    PROTECTION_STACK.with(|s| s.borrow_mut().push(ix));
    publish_current_stack();
    let result = body();
    PROTECTION_STACK.with(|s| { s.borrow_mut().pop(); });
    publish_current_stack();
    result
}

/// Snapshot of this worker's currently-protected indices, for the GC
/// mark phase to walk as additional roots.
pub fn local_roots() -> Vec<u32> {
    PROTECTION_STACK.with(|s| s.borrow().clone())
}

/// Every index currently protected on any worker's stack, as last
/// published. Called by the GC mark phase from inside `new_frame`, where
/// all workers are parked between tasks so their published stacks are
/// stable.
pub fn all_published_roots() -> Vec<u32> {
    published().iter().flat_map(|entry| entry.value().clone()).collect()
}

/// Protect every non-constant node in `ns` on this worker's stack for the
/// duration of `body`, then pop them back off (innermost-first). Used
/// around the window between a recursive op computing an intermediate
/// result and either returning it or wiring it into a table entry --
/// exactly the nodes a GC triggered mid-recursion wouldn't otherwise see,
/// since they're not yet reachable from any external ref.
pub fn protect_all<R>(ns: &[crate::nid::Nid], body: impl FnOnce() -> R) -> R {
    match ns.split_first() {
        None => body(),
        Some((n, rest)) => {
            if n.is_const() {
                protect_all(rest, body)
            } else {
                with_protected(n.index() as u32, || protect_all(rest, body))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protect_unprotect_roundtrip() {
        let mut r = ExternalRefs::new();
        assert_eq!(r.refcount(5), 0);
        r.protect(5);
        r.protect(5);
        assert_eq!(r.refcount(5), 2);
        r.unprotect(5);
        assert_eq!(r.refcount(5), 1);
    }

    #[test]
    #[should_panic]
    fn test_underflow_panics() {
        let mut r = ExternalRefs::new();
        r.protect(5);
        r.unprotect(5);
        r.unprotect(5);
    }

    #[test]
    fn test_roots_and_compact() {
        let mut r = ExternalRefs::new();
        r.protect(1);
        r.protect(2);
        r.unprotect(2);
        let roots: Vec<_> = r.roots().collect();
        assert_eq!(roots, vec![1]);
        r.compact();
        assert_eq!(r.refcount(2), 0);
    }

    #[test]
    fn test_protect_all_skips_constants() {
        use crate::nid::{I, O};
        let n = crate::nid::Nid::from_index(5);
        protect_all(&[I, n, O], || {
            assert_eq!(local_roots(), vec![5]);
        });
        assert!(local_roots().is_empty());
    }

    #[test]
    fn test_local_protection_stack() {
        assert!(local_roots().is_empty());
        with_protected(42, || {
            assert_eq!(local_roots(), vec![42]);
            with_protected(7, || {
                assert_eq!(local_roots(), vec![42, 7]);
            });
            assert_eq!(local_roots(), vec![42]);
        });
        assert!(local_roots().is_empty());
    }
}
