//! The work-stealing fork/join runtime (spec.md §4.D/§4.F).
//!
//! DD operations recurse in pairs (an ITE splits into a "then" and an
//! "else" branch that can be solved independently and combined). The
//! teacher's `swarm.rs`/`vhl_swarm.rs` solve this with a message-passing
//! swarm: a fixed pool of worker threads, a shared job queue
//! (`concurrent_queue::ConcurrentQueue`), and senders/receivers connecting
//! them. This module keeps that same shape -- a fixed pool, a shared
//! lock-free injector queue, workers parked on a condvar when idle -- but
//! trades the message-passing `Worker` trait for a direct `spawn`/`join`
//! API, since recursive DD operations want ordinary call-stack recursion
//! with a fork point, not a query/response protocol.
//!
//! `new_frame` is the GC integration point: a cooperative stop-the-world
//! barrier every worker reaches between tasks (never mid-task), used to
//! run mark/sweep while no thread is holding a node reference that isn't
//! already accounted for in the GC roots.
use concurrent_queue::ConcurrentQueue;
use crossbeam_channel::{bounded, Sender, Receiver};
use std::cell::Cell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

thread_local! {
    /// Set for the lifetime of a dedicated pool worker thread (never for
    /// the thread that calls `Runtime::new`/`join`/`new_frame` from
    /// outside the pool). `new_frame` uses this to know whether the
    /// thread requesting a frame is itself one of the `num_workers`
    /// threads the barrier waits on -- if so, it obviously can't also
    /// park, so the quorum only needs the other workers.
    static IS_POOL_WORKER: Cell<bool> = const { Cell::new(false) };
}

type Job = Box<dyn FnOnce() + Send>;

struct Shared {
    injector: ConcurrentQueue<Job>,
    shutdown: AtomicBool,
    parked: Mutex<()>,
    wake: Condvar,
    /// Incremented by `new_frame` to request a barrier; workers that see
    /// a generation bump park themselves until the frame body finishes.
    frame_requested: AtomicBool,
    frame_generation: AtomicUsize,
    /// Count of workers that have parked for the current frame request.
    parked_workers: AtomicUsize,
    num_workers: usize,
}

/// A fixed pool of worker threads sharing one injector queue.
pub struct Runtime {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
}

impl Runtime {
    pub fn new(num_workers: usize) -> Self {
        let n = if num_workers == 0 { num_cpus::get() } else { num_workers };
        let shared = Arc::new(Shared {
            injector: ConcurrentQueue::unbounded(),
            shutdown: AtomicBool::new(false),
            parked: Mutex::new(()),
            wake: Condvar::new(),
            frame_requested: AtomicBool::new(false),
            frame_generation: AtomicUsize::new(0),
            parked_workers: AtomicUsize::new(0),
            num_workers: n,
        });
        let mut workers = Vec::with_capacity(n);
        for _ in 0..n {
            let s = shared.clone();
            workers.push(thread::spawn(move || worker_loop(s)));
        }
        Runtime { shared, workers }
    }

    pub fn num_workers(&self) -> usize { self.shared.num_workers }

    /// Push a task onto the shared queue. Used internally by `join`; also
    /// usable directly for fire-and-forget background work (e.g. async GC
    /// bookkeeping).
    pub fn spawn<F: FnOnce() + Send + 'static>(&self, f: F) {
        if self.shared.injector.push(Box::new(f)).is_err() { panic!("injector queue closed"); }
        self.shared.wake.notify_one();
    }

    /// Run `a` and `b` to completion, executing `a` on the calling thread
    /// while `b` runs on (or is stolen by) the pool; blocks until both are
    /// done. This is the `spawn`/`sync` pattern from spec.md §4.D applied
    /// to a single fork point, which is all a binary DD operator needs.
    pub fn join<RA, RB, A, B>(&self, a: A, b: B) -> (RA, RB)
    where
        RA: Send + 'static,
        RB: Send + 'static,
        A: FnOnce() -> RA,
        B: FnOnce() -> RB + Send + 'static,
    {
        let (tx, rx): (Sender<RB>, Receiver<RB>) = bounded(1);
        self.spawn(move || { let _ = tx.send(b()); });
        let ra = a();
        // Help drain the injector while waiting, instead of idling --
        // this is what makes the scheme "work-stealing" from the caller's
        // point of view even though there's no per-worker deque.
        let rb = loop {
            match rx.try_recv() {
                Ok(rb) => break rb,
                Err(crossbeam_channel::TryRecvError::Empty) => {
                    // Stop draining the injector once a frame is requested --
                    // otherwise this thread could keep pulling and running
                    // jobs that touch the table while GC's mark/sweep is in
                    // progress. Parking here also counts this thread towards
                    // the frame's quorum, which is what lets `new_frame`
                    // ever reach it when every pool worker is this deep in
                    // recursion rather than idling in `worker_loop`.
                    if self.shared.frame_requested.load(Ordering::SeqCst) {
                        self.yield_to_gc_if_requested();
                    } else if let Ok(job) = self.shared.injector.pop() {
                        job();
                    } else {
                        std::thread::yield_now();
                    }
                }
                Err(crossbeam_channel::TryRecvError::Disconnected) => {
                    panic!("join: worker dropped its result sender");
                }
            }
        };
        (ra, rb)
    }

    /// Cooperative GC checkpoint (spec.md §5): if a collector is waiting
    /// at [`Self::new_frame`], park here until it's done, then return. A
    /// no-op when no frame is pending. Meant to be called at the top of
    /// every recursive DD operation so a GC triggered by a table-full
    /// condition deep in one worker's recursion doesn't have to wait for
    /// every *other* worker to bottom out before it can run.
    pub fn yield_to_gc_if_requested(&self) {
        if !self.shared.frame_requested.load(Ordering::SeqCst) { return; }
        let start_gen = self.shared.frame_generation.load(Ordering::SeqCst);
        self.shared.parked_workers.fetch_add(1, Ordering::SeqCst);
        self.shared.wake.notify_all();
        {
            let guard = self.shared.parked.lock().unwrap();
            let _guard = self.shared.wake.wait_while(guard, |_| {
                self.shared.frame_generation.load(Ordering::SeqCst) == start_gen
                    && self.shared.frame_requested.load(Ordering::SeqCst)
            }).unwrap();
        }
        self.shared.parked_workers.fetch_sub(1, Ordering::SeqCst);
    }

    /// Stop-the-world barrier. Every worker finishes its current task,
    /// parks, and waits here; `body` then runs with no other thread
    /// touching shared node storage, and workers resume once it returns.
    ///
    /// `body` runs under `catch_unwind`: a parked worker only re-checks
    /// `frame_requested`/`frame_generation`, so a panic here that skipped
    /// clearing them would leave every worker parked forever and hang
    /// `Drop` on `self.workers.pop().join()`. The frame is always closed
    /// before the result (or panic) is handed back to the caller.
    pub fn new_frame<R>(&self, body: impl FnOnce() -> R) -> R {
        // If the calling thread is itself one of this pool's workers (GC
        // triggered by a table-full check deep inside a recursive op), it
        // can't also park waiting on itself -- the quorum only needs the
        // *other* workers to reach a safe point.
        let already_a_worker = IS_POOL_WORKER.with(Cell::get);
        let target = if already_a_worker { self.shared.num_workers.saturating_sub(1) } else { self.shared.num_workers };
        self.shared.parked_workers.store(0, Ordering::SeqCst);
        self.shared.frame_requested.store(true, Ordering::SeqCst);
        self.shared.wake.notify_all();
        {
            let guard = self.shared.parked.lock().unwrap();
            let _guard = self.shared.wake.wait_while(guard, |_| {
                self.shared.parked_workers.load(Ordering::SeqCst) < target
            }).unwrap();
        }
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(body));
        self.shared.frame_generation.fetch_add(1, Ordering::SeqCst);
        self.shared.frame_requested.store(false, Ordering::SeqCst);
        self.shared.wake.notify_all();
        match result {
            Ok(r) => r,
            Err(payload) => std::panic::resume_unwind(payload),
        }
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.shared.shutdown.store(true, Ordering::SeqCst);
        self.shared.wake.notify_all();
        while let Some(h) = self.workers.pop() { let _ = h.join(); }
    }
}

fn worker_loop(shared: Arc<Shared>) {
    IS_POOL_WORKER.with(|f| f.set(true));
    let my_generation_seen = AtomicUsize::new(shared.frame_generation.load(Ordering::SeqCst));
    loop {
        if shared.shutdown.load(Ordering::SeqCst) { return; }
        if shared.frame_requested.load(Ordering::SeqCst) {
            park_for_frame(&shared, &my_generation_seen);
            continue;
        }
        match shared.injector.pop() {
            Ok(job) => job(),
            Err(_) => {
                let guard = shared.parked.lock().unwrap();
                drop(shared.wake.wait_timeout(guard, std::time::Duration::from_millis(10)));
            }
        }
    }
}

fn park_for_frame(shared: &Arc<Shared>, my_generation_seen: &AtomicUsize) {
    let start_gen = shared.frame_generation.load(Ordering::SeqCst);
    if my_generation_seen.load(Ordering::SeqCst) == start_gen {
        shared.parked_workers.fetch_add(1, Ordering::SeqCst);
        shared.wake.notify_all();
    }
    let guard = shared.parked.lock().unwrap();
    drop(shared.wake.wait_while(guard, |_| {
        shared.frame_generation.load(Ordering::SeqCst) == start_gen
            && shared.frame_requested.load(Ordering::SeqCst)
    }));
    my_generation_seen.store(shared.frame_generation.load(Ordering::SeqCst), Ordering::SeqCst);
}
