//! The process-wide engine handle (spec.md §6 external interfaces).
//!
//! The original engine is initialized once per process via
//! `sylvan_init_package`/`sylvan_init_bdd`/... into a set of file-local
//! globals. This crate collapses that into one `Sylvan::init(config)`
//! call behind a `std::sync::OnceLock`, the same "call once, get a
//! shared handle back" idiom the teacher's modules use for their
//! `lazy_static!` globals -- wrapped in a `Mutex<Option<_>>` rather than
//! a bare `OnceLock<Sylvan>` so `quit` can actually clear it (useful for
//! tests that need a fresh engine, and matching the original API's
//! `sylvan_quit` being a real, callable shutdown rather than a no-op).
use std::sync::{Arc, Mutex, OnceLock};

use crate::bdd::BddBase;
use crate::config::{ReorderConfig, SylvanConfig};
use crate::ldd::LddBase;
use crate::mtbdd::MtbddBase;
use crate::tbdd::TbddBase;
use crate::zdd::ZddBase;

type Hook = Box<dyn Fn() + Send + Sync>;

/// Callbacks run around `Sylvan::collect_garbage`.
#[derive(Default)]
pub struct GcHooks {
    pub pre: Vec<Hook>,
    pub post: Vec<Hook>,
    pub mark: Vec<Hook>,
}

struct Inner {
    config: SylvanConfig,
    bdd: BddBase,
    zdd: ZddBase,
    mtbdd: MtbddBase,
    ldd: LddBase,
    tbdd: TbddBase,
    gc_hooks: Mutex<GcHooks>,
    reorder_config: Mutex<ReorderConfig>,
}

/// A handle to the shared engine state. Cheap to clone (an `Arc`
/// around one set of per-kind bases, all themselves `Arc`-backed).
#[derive(Clone)]
pub struct Sylvan(Arc<Inner>);

static SYLVAN: OnceLock<Mutex<Option<Sylvan>>> = OnceLock::new();

impl Sylvan {
    /// Initialize the engine, or return the already-running instance if
    /// one exists -- `init` is idempotent, matching the original's
    /// guard against double-initialization.
    pub fn init(config: SylvanConfig) -> Sylvan {
        let slot = SYLVAN.get_or_init(|| Mutex::new(None));
        let mut guard = slot.lock().unwrap();
        if let Some(existing) = guard.as_ref() {
            return existing.clone();
        }
        let threads = config.resolved_threads();
        log::info!("sylvan: initializing with {threads} worker threads, {} byte budget", config.memory_bytes);
        let sylvan = Sylvan(Arc::new(Inner {
            config,
            bdd: BddBase::new(threads),
            zdd: ZddBase::new(threads),
            mtbdd: MtbddBase::new(threads),
            ldd: LddBase::new(threads),
            tbdd: TbddBase::new(threads),
            gc_hooks: Mutex::new(GcHooks::default()),
            reorder_config: Mutex::new(ReorderConfig::default()),
        }));
        *guard = Some(sylvan.clone());
        sylvan
    }

    /// The running instance, if `init` has been called and `quit` hasn't.
    pub fn current() -> Option<Sylvan> {
        SYLVAN.get().and_then(|slot| slot.lock().unwrap().clone())
    }

    /// Shut the engine down. A later `init` starts a fresh one.
    pub fn quit(&self) {
        if let Some(slot) = SYLVAN.get() {
            *slot.lock().unwrap() = None;
        }
        log::info!("sylvan: shut down");
    }

    pub fn config(&self) -> SylvanConfig { self.0.config }
    pub fn bdd(&self) -> &BddBase { &self.0.bdd }
    pub fn zdd(&self) -> &ZddBase { &self.0.zdd }
    pub fn mtbdd(&self) -> &MtbddBase { &self.0.mtbdd }
    pub fn ldd(&self) -> &LddBase { &self.0.ldd }
    pub fn tbdd(&self) -> &TbddBase { &self.0.tbdd }

    pub fn set_gc_hooks(&self, hooks: GcHooks) { *self.0.gc_hooks.lock().unwrap() = hooks; }
    pub fn reorder_config(&self) -> ReorderConfig { *self.0.reorder_config.lock().unwrap() }
    pub fn set_reorder_config(&self, cfg: ReorderConfig) { *self.0.reorder_config.lock().unwrap() = cfg; }

    /// Run a collection pass across every kind, firing the configured
    /// pre/post hooks around it. `mark` hooks are for callers that need
    /// to register extra GC roots outside the five bases themselves
    /// (e.g. an embedding application's own cache of live diagrams).
    pub fn collect_garbage(&self) {
        let hooks = self.0.gc_hooks.lock().unwrap();
        for h in &hooks.pre { h(); }
        for h in &hooks.mark { h(); }
        self.0.bdd.collect_garbage();
        self.0.zdd.collect_garbage();
        self.0.mtbdd.collect_garbage();
        self.0.ldd.collect_garbage();
        self.0.tbdd.collect_garbage();
        for h in &hooks.post { h(); }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Exercises the full init -> use -> quit -> re-init lifecycle in one
    // test, since `Sylvan` is backed by a single process-global slot and
    // other tests in this binary could otherwise race against it.
    #[test]
    fn test_init_is_a_singleton_and_quit_resets_it() {
        let a = Sylvan::init(SylvanConfig { threads: 1, ..SylvanConfig::default() });
        let b = Sylvan::init(SylvanConfig { threads: 99, ..SylvanConfig::default() });
        assert_eq!(a.config().threads, b.config().threads, "second init must return the first instance");

        let x = a.bdd().new_var();
        let y = a.bdd().new_var();
        assert_eq!(a.bdd().and(x, y), b.bdd().and(x, y));

        a.quit();
        assert!(Sylvan::current().is_none());

        let c = Sylvan::init(SylvanConfig { threads: 2, ..SylvanConfig::default() });
        assert_eq!(c.config().threads, 2);
        c.quit();
    }

    #[test]
    fn test_gc_hooks_fire_in_order() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        use std::sync::Arc as StdArc;

        if let Some(existing) = Sylvan::current() { existing.quit(); }
        let s = Sylvan::init(SylvanConfig { threads: 1, ..SylvanConfig::default() });
        let order = StdArc::new(AtomicUsize::new(0));
        let (pre_seen, post_seen) = (order.clone(), order.clone());
        s.set_gc_hooks(GcHooks {
            pre: vec![Box::new(move || { pre_seen.store(1, Ordering::SeqCst); })],
            post: vec![Box::new(move || { post_seen.store(2, Ordering::SeqCst); })],
            mark: vec![],
        });
        s.collect_garbage();
        assert_eq!(order.load(Ordering::SeqCst), 2);
        s.quit();
    }
}
