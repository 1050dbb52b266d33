//! The operation cache (spec.md §4.C): a fixed-size, best-effort memo
//! table keyed on `(opcode, a, b, c) -> res`.
//!
//! This is a direct port of the original engine's `cache.h` bucket
//! scheme (FNV-1a hash, a 32-bit status word split into a bitlock, a
//! hash fragment used to detect collisions without comparing the full
//! key, and a tag that increments on every successful `put`) rather
//! than a generalization of `wip::WorkState`'s `DashMap` -- `WorkState`
//! is unbounded and exists to track work-in-progress, while this cache
//! is a fixed-capacity, lossy accelerator: a miss is always safe, and a
//! `put` is free to silently refuse to evict a hot bucket. Direct port
//! because the status-word trick is precisely what makes lookups
//! lock-free: readers never block on a concurrent writer, they just see
//! a possibly-stale or locked bucket and report a miss.
use std::sync::atomic::{AtomicU32, Ordering};
use std::cell::UnsafeCell;

const LOCK_BIT: u32 = 0x8000_0000;
const HASH_MASK: u32 = 0x7fff_0000;
const TAG_MASK: u32 = 0x0000_ffff;

#[derive(Clone, Copy, Default)]
struct Entry { a: u64, b: u64, c: u64, res: u64 }

struct Slot {
    status: AtomicU32,
    entry: UnsafeCell<Entry>,
}

// Safety: `entry` is only read/written while `status`'s lock bit is held
// via CAS, following the same protocol as the original's cache_get/put.
unsafe impl Sync for Slot {}

impl Default for Slot {
    fn default() -> Self { Slot { status: AtomicU32::new(0), entry: UnsafeCell::new(Entry::default()) } }
}

fn fnv1a(opcode: u64, a: u64, b: u64, c: u64) -> u64 {
    const PRIME: u64 = 1099511628211;
    let mut hash: u64 = 14695981039346656037;
    hash = (hash ^ opcode).wrapping_mul(PRIME);
    hash = (hash ^ a).wrapping_mul(PRIME);
    hash = (hash ^ b).wrapping_mul(PRIME);
    hash = (hash ^ c).wrapping_mul(PRIME);
    hash
}

/// A fixed-size, lossy memo table. `size` must be a power of two.
pub struct OpCache {
    slots: Vec<Slot>,
    mask: u64,
}

impl OpCache {
    pub fn new(size: usize) -> Self {
        assert!(size.is_power_of_two(), "operation cache size must be a power of 2");
        let mut slots = Vec::with_capacity(size);
        slots.resize_with(size, Slot::default);
        OpCache { slots, mask: size as u64 - 1 }
    }

    /// Best-effort lookup. A `None` means either a genuine miss, a
    /// colliding key, or a bucket that's mid-write on another thread --
    /// callers must always be able to recompute the result from scratch.
    pub fn get(&self, opcode: u64, a: u64, b: u64, c: u64) -> Option<u64> {
        let hash = fnv1a(opcode, a, b, c);
        let slot = &self.slots[(hash & self.mask) as usize];
        let s = slot.status.load(Ordering::Acquire);
        if s & LOCK_BIT != 0 { return None; }
        if (s ^ ((hash >> 32) as u32)) & HASH_MASK != 0 { return None; }
        // Safety: lock bit was clear when we read `s`; the entry is only
        // mutated by a writer that holds the lock, so it's safe to read
        // as long as we recheck `status` unchanged afterwards.
        let entry = unsafe { *slot.entry.get() };
        if entry.a != a || entry.b != b || entry.c != c { return None; }
        let res = entry.res;
        if slot.status.load(Ordering::Acquire) == s { Some(res) } else { None }
    }

    /// Best-effort insert. May silently refuse to store (bucket locked
    /// by a racing writer, or already holds a fresher hash fragment);
    /// the caller never needs to know which.
    pub fn put(&self, opcode: u64, a: u64, b: u64, c: u64, res: u64) -> bool {
        let hash = fnv1a(opcode, a, b, c);
        let slot = &self.slots[(hash & self.mask) as usize];
        let hash_frag = ((hash >> 32) as u32) & HASH_MASK;
        let s = slot.status.load(Ordering::Acquire);
        if s & LOCK_BIT != 0 { return false; }
        let new_s = ((s.wrapping_add(1)) & TAG_MASK) | hash_frag;
        if slot.status.compare_exchange(s, new_s | LOCK_BIT, Ordering::AcqRel, Ordering::Relaxed).is_err() {
            return false;
        }
        // Safety: we hold the lock bit exclusively until the store below.
        unsafe { *slot.entry.get() = Entry { a, b, c, res }; }
        slot.status.store(new_s, Ordering::Release);
        true
    }

    pub fn len(&self) -> usize { self.slots.len() }
    pub fn is_empty(&self) -> bool { self.slots.is_empty() }

    /// Drop every entry (spec.md's "clear" GC phase for the op cache --
    /// results may reference nodes about to be swept).
    pub fn clear(&self) {
        for slot in &self.slots {
            slot.status.store(0, Ordering::Release);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_then_get() {
        let c = OpCache::new(64);
        assert!(c.put(1, 2, 3, 4, 42));
        assert_eq!(c.get(1, 2, 3, 4), Some(42));
    }

    #[test]
    fn test_miss_on_different_key() {
        let c = OpCache::new(64);
        c.put(1, 2, 3, 4, 42);
        assert_eq!(c.get(1, 2, 3, 5), None);
    }

    #[test]
    fn test_clear() {
        let c = OpCache::new(64);
        c.put(1, 2, 3, 4, 42);
        c.clear();
        assert_eq!(c.get(1, 2, 3, 4), None);
    }

    #[test]
    #[should_panic]
    fn test_requires_power_of_two() {
        OpCache::new(63);
    }
}
