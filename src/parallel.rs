//! CPU parallel driver (spec §5, "Concurrency & Resource Model").
//!
//! `blub` dispatches work as GPU compute passes (`wgpu::ComputePass::dispatch`), which has no
//! CPU analogue to generalize directly. This is grounded in the rest of the pack instead:
//! `other_examples` particle/grid sims (`mineubob-Australia-Fire-Sim`, `PMantix-ParticleSim`)
//! reach for `rayon` for exactly this data-parallel shape, so `ParallelDriver` wraps a
//! `rayon::ThreadPool` the way those crates use the global pool, but sized and overridable
//! the way `blub`'s own worker counts would have been.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::OnceLock;

use rayon::{ThreadPool, ThreadPoolBuilder};

static FORCE_SINGLE_THREAD: AtomicBool = AtomicBool::new(false);

/// Process-wide override forcing every `ParallelDriver` to run sequentially. Mirrors the
/// `force_single_thread` global spec.md §9 calls out; replaces it with an `AtomicBool`
/// instead of a raw mutable global. `has_graphical_interface` is dropped — this core has no UI.
pub fn set_force_single_thread(value: bool) {
    FORCE_SINGLE_THREAD.store(value, Ordering::SeqCst);
}

pub fn force_single_thread() -> bool {
    FORCE_SINGLE_THREAD.load(Ordering::SeqCst)
}

fn env_thread_override() -> Option<usize> {
    std::env::var("SHIOKAZE_NUM_THREADS")
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .filter(|&n| n > 0)
}

/// Data-parallel driver over a sized range or a batch of independent closures.
///
/// Safe to call re-entrantly: a `for_each` issued from inside a task already running on the
/// pool is serviced by the same work-stealing scheduler without deadlocking, which is the
/// property spec.md §5 requires of nested dispatch.
pub struct ParallelDriver {
    pool: ThreadPool,
    maximal_threads: usize,
}

impl ParallelDriver {
    /// Build a driver sized to `num_cpus`, unless overridden by `SHIOKAZE_NUM_THREADS`.
    pub fn new() -> Self {
        let threads = env_thread_override().unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        });
        Self::with_threads(threads)
    }

    pub fn with_threads(threads: usize) -> Self {
        let threads = threads.max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .build()
            .expect("failed to build rayon thread pool");
        info!("parallel driver initialized with {} threads", threads);
        ParallelDriver {
            pool,
            maximal_threads: threads,
        }
    }

    pub fn maximal_threads(&self) -> usize {
        self.maximal_threads
    }

    /// Run `f(index)` for every index in `0..n`, in parallel unless
    /// [`force_single_thread`] is set.
    pub fn for_each<F>(&self, n: usize, f: F)
    where
        F: Fn(usize) + Sync + Send,
    {
        self.for_each_range(0..n, f)
    }

    pub fn for_each_range<F>(&self, range: std::ops::Range<usize>, f: F)
    where
        F: Fn(usize) + Sync + Send,
    {
        if force_single_thread() {
            for i in range {
                f(i);
            }
            return;
        }
        self.pool.install(|| {
            use rayon::prelude::*;
            range.into_par_iter().for_each(|i| f(i));
        });
    }

    /// Run a batch of independent closures, one per worker slot if possible. Mirrors
    /// `blub`'s `run(fns...)` convenience used to fan out unrelated subsystem updates.
    pub fn run(&self, fns: Vec<Box<dyn Fn() + Sync + Send + '_>>) {
        if force_single_thread() {
            for f in fns.iter() {
                f();
            }
            return;
        }
        self.pool.install(|| {
            use rayon::prelude::*;
            fns.into_par_iter().for_each(|f| f());
        });
    }
}

impl Default for ParallelDriver {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide default driver, lazily constructed on first use.
pub fn global() -> &'static ParallelDriver {
    static DRIVER: OnceLock<ParallelDriver> = OnceLock::new();
    DRIVER.get_or_init(ParallelDriver::new)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn for_each_visits_every_index() {
        let driver = ParallelDriver::with_threads(4);
        let sum = AtomicUsize::new(0);
        driver.for_each(100, |i| {
            sum.fetch_add(i, Ordering::Relaxed);
        });
        assert_eq!(sum.load(Ordering::Relaxed), (0..100).sum());
    }

    #[test]
    fn force_single_thread_still_visits_every_index() {
        let driver = ParallelDriver::with_threads(4);
        set_force_single_thread(true);
        let sum = AtomicUsize::new(0);
        driver.for_each(50, |i| {
            sum.fetch_add(i, Ordering::Relaxed);
        });
        set_force_single_thread(false);
        assert_eq!(sum.load(Ordering::Relaxed), (0..50).sum());
    }
}
