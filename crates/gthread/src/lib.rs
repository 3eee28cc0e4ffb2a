//! # gthread - Preemptive Green Threads
//!
//! User-level threads multiplexed onto a single OS thread, scheduled round
//! robin and preempted by a CPU-time timer.
//!
//! ## Features
//!
//! - **One OS thread**: exactly one green thread runs at any instant
//! - **Preemption**: SIGVTALRM every quantum of CPU time forces a dispatch
//! - **Strict FIFO**: no priorities, no work stealing
//! - **Join/cancel**: blocking join with a return value, irrevocable cancel
//!
//! ## Preemption and shared locks
//!
//! A tick never switches threads inside the allocator or the `k*` logging
//! macros: the default `global-allocator` feature installs
//! `PreemptSafeAlloc`, and logging defers ticks while it holds stderr.
//! `println!` from green threads is not covered; use `kprintln!` instead.
//!
//! ## Quick Start
//!
//! ```ignore
//! fn main() {
//!     gthread::init(10_000);
//!
//!     let a = gthread::create(|| {
//!         let mut n = 0;
//!         for _ in 0..5 {
//!             n += 1;
//!         }
//!         gthread::exit(n)
//!     });
//!
//!     let status = gthread::join(a).unwrap();
//!     assert_eq!(status.value(), Some(5));
//!     gthread::exit(0);
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      User Code                              │
//! │     create(), join(), exit(), yield_now(), cancel()         │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Scheduler                              │
//! │   ready / blocked / zombie queues, one dispatcher           │
//! └─────────────────────────────────────────────────────────────┘
//!          │                   │                   │
//!          ▼                   ▼                   ▼
//!    ┌───────────┐      ┌───────────┐      ┌───────────┐
//!    │  Context  │      │  Stacks   │      │  Timer +  │
//!    │  switch   │      │ mmap+guard│      │ SIGVTALRM │
//!    └───────────┘      └───────────┘      └───────────┘
//! ```

// Re-export core types
pub use gthread_core::{GThreadId, GThreadState, JoinStatus, SchedError, SchedResult};

// Re-export kprint macros for debug logging
pub use gthread_core::{kprint, kprintln, kerror, kwarn, kinfo, kdebug, ktrace};
pub use gthread_core::kprint::{LogLevel, init as init_logging, set_log_level, set_flush_enabled};

// Re-export env utilities
pub use gthread_core::{env_get, env_get_bool};

// Re-export runtime types
pub use gthread_runtime::{PreemptSafeAlloc, Scheduler, SchedulerConfig};

/// Allocator that defers preemption while it holds the system allocator's locks
///
/// Any green thread that allocates under preemption depends on it. Turn off
/// the `global-allocator` feature only to install `PreemptSafeAlloc` (or a
/// wrapper that does the same) from the final binary.
#[cfg(feature = "global-allocator")]
#[global_allocator]
static GLOBAL: PreemptSafeAlloc = PreemptSafeAlloc;

use gthread_runtime::current_scheduler;
use std::marker::PhantomData;

/// Runtime handle owning the scheduler of the current OS thread
///
/// Creating it turns the calling code into green thread 1. Dropping it (or
/// calling `shutdown`) runs the remaining threads to completion and unbinds
/// the scheduler, after which a new runtime may be created.
pub struct Runtime {
    sched: Option<Box<Scheduler>>,
    _not_send: PhantomData<*const ()>,
}

impl Runtime {
    /// Create and start a scheduler on the calling OS thread
    pub fn new(config: SchedulerConfig) -> SchedResult<Self> {
        let sched = Scheduler::new(config)?;
        sched.start()?;

        Ok(Self {
            sched: Some(sched),
            _not_send: PhantomData,
        })
    }

    /// Access the underlying scheduler
    pub fn scheduler(&self) -> Option<&Scheduler> {
        self.sched.as_deref()
    }

    /// Run `f` as green thread 1, then shut down
    ///
    /// This is the typical entry point for applications.
    pub fn block_on<F, T>(&mut self, f: F) -> SchedResult<T>
    where
        F: FnOnce() -> T,
    {
        let result = f();
        self.shutdown()?;
        Ok(result)
    }

    /// Drain the ready queue, stop preemption and release every thread
    ///
    /// Fails with `NotMainThread` unless called from green thread 1.
    pub fn shutdown(&mut self) -> SchedResult<()> {
        if let Some(sched) = &self.sched {
            sched.shutdown()?;
        }
        self.sched = None;
        Ok(())
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        if let Some(sched) = self.sched.take() {
            if let Err(e) = sched.shutdown() {
                // Some stack is still live; freeing the scheduler is unsafe now
                kerror!("runtime dropped outside green thread 1: {}", e);
                std::mem::forget(sched);
            }
        }
    }
}

/// Initialize the scheduler for this OS thread with a `quantum_us` quantum
///
/// Other settings come from the environment (see `SchedulerConfig::from_env`).
/// Any failure is fatal: the process aborts. The runtime lives until the
/// process exits.
pub fn init(quantum_us: u64) {
    let config = SchedulerConfig::from_env().quantum_us(quantum_us);
    match Runtime::new(config) {
        Ok(runtime) => std::mem::forget(runtime),
        Err(e) => {
            kerror!("gthread init failed: {}", e);
            std::process::abort();
        }
    }
}

/// Create a green thread running `f`
///
/// The value `f` returns is what `join` reports. Stack allocation failure is
/// fatal.
///
/// # Panics
///
/// Panics if no scheduler was initialized on this OS thread.
pub fn create<F>(f: F) -> GThreadId
where
    F: FnOnce() -> usize + 'static,
{
    let sched = current_scheduler().expect("gthread::init must be called first");
    match sched.create(f) {
        Ok(id) => id,
        Err(e) => {
            kerror!("gthread create failed: {}", e);
            std::process::abort();
        }
    }
}

/// Wait for `id` to terminate and report how it ended
///
/// Returns immediately if `id` has already terminated. A successful join
/// reclaims the thread, so joining it again yields `GThreadNotFound`.
pub fn join(id: GThreadId) -> SchedResult<JoinStatus> {
    current_scheduler()
        .ok_or(SchedError::NotInitialized)?
        .join(id)
}

/// Terminate the calling green thread with `value`
///
/// From green thread 1 this waits for every other runnable thread, then ends
/// the process with `value` as exit status.
pub fn exit(value: usize) -> ! {
    match current_scheduler() {
        Some(sched) => sched.exit(value),
        None => std::process::exit(value as i32),
    }
}

/// Yield execution to the next ready green thread
///
/// If called outside any scheduler, this yields the OS thread.
#[inline]
pub fn yield_now() {
    match current_scheduler() {
        Some(sched) => sched.yield_now(),
        None => std::thread::yield_now(),
    }
}

/// Cancel `id`; it will never run again
///
/// Cancelling the calling thread is `exit(0)`.
pub fn cancel(id: GThreadId) -> SchedResult<()> {
    current_scheduler()
        .ok_or(SchedError::NotInitialized)?
        .cancel(id)
}

/// Get the current green thread's ID
///
/// Returns `GThreadId::NONE` if no scheduler runs on this OS thread.
#[inline]
pub fn current_id() -> GThreadId {
    current_scheduler()
        .map(|s| s.current_id())
        .unwrap_or(GThreadId::NONE)
}

/// Compare two thread ids
#[inline]
pub fn equal(a: GThreadId, b: GThreadId) -> bool {
    a == b
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    fn cooperative() -> SchedulerConfig {
        SchedulerConfig::new()
            .enable_preemption(false)
            .stack_size(64 * 1024)
    }

    fn preemptive(quantum_us: u64) -> SchedulerConfig {
        SchedulerConfig::new()
            .enable_preemption(true)
            .quantum_us(quantum_us)
            .stack_size(64 * 1024)
    }

    fn run<F: FnOnce()>(config: SchedulerConfig, f: F) {
        let mut rt = Runtime::new(config).unwrap();
        rt.block_on(f).unwrap();
    }

    #[test]
    fn test_ids_are_monotonic() {
        run(cooperative(), || {
            let ids: Vec<_> = (0..10).map(|_| create(|| 0)).collect();
            assert!(ids[0] > GThreadId::MAIN);
            for w in ids.windows(2) {
                assert!(w[1] > w[0]);
            }
            for id in ids {
                assert_eq!(join(id), Ok(JoinStatus::Finished(0)));
            }
            // Never reused after reclamation
            assert!(create(|| 0) > GThreadId::new(11));
        });
    }

    #[test]
    fn test_join_reports_value() {
        run(cooperative(), || {
            let returned = create(|| 7);
            let exited = create(|| exit(42));
            assert_eq!(join(exited), Ok(JoinStatus::Finished(42)));
            assert_eq!(join(returned), Ok(JoinStatus::Finished(7)));
        });
    }

    #[test]
    fn test_join_rejections() {
        run(cooperative(), || {
            assert_eq!(join(current_id()), Err(SchedError::SelfJoin));
            assert_eq!(join(GThreadId::new(999)), Err(SchedError::GThreadNotFound));

            let inner = create(|| match join(current_id()) {
                Err(SchedError::SelfJoin) => 1,
                _ => 0,
            });
            assert_eq!(join(inner), Ok(JoinStatus::Finished(1)));
        });
    }

    #[test]
    fn test_second_join_after_reclaim() {
        run(cooperative(), || {
            let t = create(|| 3);
            assert_eq!(join(t), Ok(JoinStatus::Finished(3)));
            assert_eq!(join(t), Err(SchedError::GThreadNotFound));
            assert_eq!(cancel(t), Err(SchedError::GThreadNotFound));
        });
    }

    #[test]
    fn test_reciprocal_join_rejected() {
        run(cooperative(), || {
            let b_id = Rc::new(Cell::new(GThreadId::NONE));

            let slot = b_id.clone();
            let a = create(move || match join(slot.get()) {
                Ok(JoinStatus::Finished(v)) => v + 10,
                _ => 0,
            });
            let b = create(move || match join(a) {
                Err(SchedError::ReciprocalJoin) => 1,
                _ => 0,
            });
            b_id.set(b);

            assert_eq!(join(b), Ok(JoinStatus::Finished(1)));
            assert_eq!(join(a), Ok(JoinStatus::Finished(11)));
        });
    }

    #[test]
    fn test_join_main_from_child_is_reciprocal() {
        run(cooperative(), || {
            let t = create(|| match join(GThreadId::MAIN) {
                Err(SchedError::ReciprocalJoin) => 5,
                _ => 0,
            });
            assert_eq!(join(t), Ok(JoinStatus::Finished(5)));
        });
    }

    #[test]
    fn test_three_way_cycle_deadlock() {
        run(cooperative(), || {
            let slots: Rc<[Cell<GThreadId>; 3]> = Rc::new(Default::default());

            let waits_on = |next: usize| {
                let slots = slots.clone();
                move || match join(slots[next].get()) {
                    Ok(JoinStatus::Finished(v)) => v,
                    Err(SchedError::Deadlock) => 99,
                    _ => 0,
                }
            };

            let a = create(waits_on(1));
            let b = create(waits_on(2));
            let c = create(waits_on(0));
            slots[0].set(a);
            slots[1].set(b);
            slots[2].set(c);

            // c finds nothing runnable and gets Deadlock; the value flows back
            assert_eq!(join(a), Ok(JoinStatus::Finished(99)));
            // b and c were reclaimed by their joiners
            assert_eq!(join(b), Err(SchedError::GThreadNotFound));
            assert_eq!(join(c), Err(SchedError::GThreadNotFound));
        });
    }

    #[test]
    fn test_round_robin_order() {
        run(cooperative(), || {
            let log = Rc::new(RefCell::new(Vec::new()));
            let ids: Vec<_> = [b'A', b'B', b'C']
                .into_iter()
                .map(|tag| {
                    let log = log.clone();
                    create(move || {
                        for _ in 0..4 {
                            log.borrow_mut().push(tag);
                            yield_now();
                        }
                        0
                    })
                })
                .collect();
            for id in ids {
                join(id).unwrap();
            }
            assert_eq!(&log.borrow()[..], b"ABCABCABCABC");
        });
    }

    #[test]
    fn test_yield_alone_is_noop() {
        run(cooperative(), || {
            yield_now();
            yield_now();
            assert_eq!(current_id(), GThreadId::MAIN);
        });
    }

    #[test]
    fn test_cancel_ready_thread_never_runs() {
        run(cooperative(), || {
            let hits = Rc::new(Cell::new(0));
            let h = hits.clone();
            let t = create(move || {
                h.set(h.get() + 1);
                0
            });

            assert_eq!(cancel(t), Ok(()));
            assert_eq!(cancel(t), Err(SchedError::AlreadyTerminated));
            yield_now();
            assert_eq!(hits.get(), 0);
            assert_eq!(join(t), Ok(JoinStatus::Cancelled));
            assert_eq!(cancel(GThreadId::new(12345)), Err(SchedError::GThreadNotFound));
        });
    }

    #[test]
    fn test_cancel_finished_thread_rejected() {
        run(cooperative(), || {
            let t = create(|| 3);
            yield_now();
            assert_eq!(cancel(t), Err(SchedError::AlreadyTerminated));
            assert_eq!(join(t), Ok(JoinStatus::Finished(3)));
        });
    }

    #[test]
    fn test_cancel_blocked_joiner() {
        run(cooperative(), || {
            let release = Rc::new(Cell::new(false));
            let r = release.clone();
            let worker = create(move || {
                while !r.get() {
                    yield_now();
                }
                5
            });
            let waiter = create(move || match join(worker) {
                Ok(_) => 1,
                Err(_) => 2,
            });

            // worker yields, waiter parks on worker, main is back
            yield_now();
            assert_eq!(cancel(waiter), Ok(()));
            release.set(true);

            assert_eq!(join(worker), Ok(JoinStatus::Finished(5)));
            assert_eq!(join(waiter), Ok(JoinStatus::Cancelled));
        });
    }

    #[test]
    fn test_cancel_wakes_joiner() {
        run(cooperative(), || {
            let spinner = create(|| loop {
                yield_now();
            });
            let waiter = create(move || match join(spinner) {
                Ok(JoinStatus::Cancelled) => 1,
                _ => 0,
            });

            yield_now();
            assert_eq!(cancel(spinner), Ok(()));
            assert_eq!(join(waiter), Ok(JoinStatus::Finished(1)));
            assert_eq!(join(spinner), Ok(JoinStatus::Cancelled));
        });
    }

    #[test]
    fn test_self_cancel_is_exit_zero() {
        run(cooperative(), || {
            let t = create(|| {
                let _ = cancel(current_id());
                unreachable!()
            });
            assert_eq!(join(t), Ok(JoinStatus::Finished(0)));
        });
    }

    #[test]
    fn test_nested_create() {
        run(cooperative(), || {
            let outer = create(|| {
                let inner = create(|| 20);
                join(inner).ok().and_then(|s| s.value()).unwrap_or(0) + 1
            });
            assert_eq!(join(outer), Ok(JoinStatus::Finished(21)));
        });
    }

    #[test]
    fn test_identity() {
        run(cooperative(), || {
            assert_eq!(current_id(), GThreadId::MAIN);
            let seen = Rc::new(Cell::new(GThreadId::NONE));
            let s = seen.clone();
            let t = create(move || {
                s.set(current_id());
                0
            });
            join(t).unwrap();
            assert!(equal(seen.get(), t));
            assert!(equal(t, t));
            assert!(!equal(t, GThreadId::MAIN));
        });
    }

    #[test]
    fn test_preemption_unsticks_tight_loop() {
        run(preemptive(1_000), || {
            let flag = Arc::new(AtomicBool::new(false));

            let f = flag.clone();
            let spinner = create(move || {
                while !f.load(Ordering::Acquire) {
                    std::hint::spin_loop();
                }
                1
            });
            let f = flag.clone();
            let setter = create(move || {
                f.store(true, Ordering::Release);
                2
            });

            assert_eq!(join(spinner), Ok(JoinStatus::Finished(1)));
            assert_eq!(join(setter), Ok(JoinStatus::Finished(2)));
        });
    }

    #[test]
    fn test_two_counters() {
        run(preemptive(10_000), || {
            let counter = Arc::new(AtomicUsize::new(0));
            let worker = |counter: Arc<AtomicUsize>| {
                move || {
                    let mut local = 0;
                    for _ in 0..5 {
                        counter.fetch_add(1, Ordering::Relaxed);
                        local += 1;
                    }
                    exit(local)
                }
            };

            let a = create(worker(counter.clone()));
            let b = create(worker(counter.clone()));

            assert_eq!(join(a), Ok(JoinStatus::Finished(5)));
            assert_eq!(join(b), Ok(JoinStatus::Finished(5)));
            assert_eq!(counter.load(Ordering::Relaxed), 10);
        });
    }

    #[test]
    fn test_allocating_threads_under_preemption() {
        run(preemptive(50), || {
            let ids: Vec<_> = (0..3usize)
                .map(|t| {
                    create(move || {
                        let mut total = 0usize;
                        for i in 0..100_000usize {
                            let v = vec![t as u8; (i * 37) % 8192 + 1];
                            let s = format!("{}:{}", t, v.len());
                            total = total.wrapping_add(v.len() + s.len());
                        }
                        total
                    })
                })
                .collect();

            for id in ids {
                assert!(matches!(join(id), Ok(JoinStatus::Finished(n)) if n > 0));
            }
        });
    }

    #[test]
    fn test_logging_threads_under_preemption() {
        run(preemptive(50), || {
            let ids: Vec<_> = (0..3usize)
                .map(|t| {
                    create(move || {
                        for i in 0..2_000 {
                            kprintln!("logger {} line {}", t, i);
                        }
                        t
                    })
                })
                .collect();

            for (t, id) in ids.into_iter().enumerate() {
                assert_eq!(join(id), Ok(JoinStatus::Finished(t)));
            }
        });
    }

    const EXIT_SCENARIO: &str = "GT_TEST_EXIT_SCENARIO";

    /// Re-run this test binary on the single test `name` with `scenario` set
    fn run_scenario(name: &str, scenario: &str) -> std::process::Output {
        std::process::Command::new(std::env::current_exe().unwrap())
            .args([name, "--exact", "--nocapture", "--test-threads=1"])
            .env(EXIT_SCENARIO, scenario)
            .env("GT_ENABLE_PREEMPTION", "0")
            .output()
            .unwrap()
    }

    fn scenario() -> Option<String> {
        std::env::var(EXIT_SCENARIO).ok()
    }

    #[test]
    fn test_main_exit_drains_then_ends_process() {
        if scenario().as_deref() == Some("main-exit") {
            init(10_000);
            for n in 0..3 {
                create(move || {
                    println!("ran {}", n);
                    0
                });
            }
            exit(7);
        }

        let out = run_scenario("tests::test_main_exit_drains_then_ends_process", "main-exit");
        let stdout = String::from_utf8_lossy(&out.stdout);
        assert_eq!(out.status.code(), Some(7), "{}", stdout);

        let pos: Vec<_> = (0..3)
            .map(|n| stdout.find(&format!("ran {}", n)).expect("thread did not run"))
            .collect();
        assert!(pos[0] < pos[1] && pos[1] < pos[2], "{}", stdout);
    }

    #[test]
    fn test_last_runnable_thread_exit_ends_process() {
        if scenario().as_deref() == Some("last-exit") {
            init(10_000);
            let worker = create(|| {
                // Main is parked in join; once it is cancelled nothing else can run
                cancel(GThreadId::MAIN).unwrap();
                println!("worker exiting");
                exit(5)
            });
            let _ = join(worker);
            panic!("cancelled main thread was resumed");
        }

        let out = run_scenario("tests::test_last_runnable_thread_exit_ends_process", "last-exit");
        let stdout = String::from_utf8_lossy(&out.stdout);
        assert_eq!(out.status.code(), Some(5), "{}", stdout);
        assert!(stdout.contains("worker exiting"), "{}", stdout);
    }

    #[test]
    fn test_shutdown_drains_and_unbinds() {
        let hits = Rc::new(Cell::new(0));
        let mut rt = Runtime::new(cooperative()).unwrap();
        for _ in 0..3 {
            let h = hits.clone();
            create(move || {
                h.set(h.get() + 1);
                0
            });
        }
        rt.shutdown().unwrap();

        assert_eq!(hits.get(), 3);
        assert_eq!(current_id(), GThreadId::NONE);
        assert_eq!(join(GThreadId::new(2)), Err(SchedError::NotInitialized));

        // The OS thread is free for a new instance
        let again = Runtime::new(cooperative()).unwrap();
        assert_eq!(current_id(), GThreadId::MAIN);
        drop(again);
        assert_eq!(current_id(), GThreadId::NONE);
    }

    #[test]
    fn test_double_init_rejected() {
        let _rt = Runtime::new(cooperative()).unwrap();
        assert!(matches!(
            Runtime::new(cooperative()),
            Err(SchedError::AlreadyInitialized)
        ));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let bad = cooperative().stack_size(1024);
        assert!(matches!(Runtime::new(bad), Err(SchedError::InvalidConfig(_))));
        assert_eq!(current_id(), GThreadId::NONE);
    }

    #[test]
    fn test_global_init() {
        std::thread::spawn(|| {
            init(5_000);
            let t = create(|| 3);
            assert_eq!(join(t), Ok(JoinStatus::Finished(3)));
        })
        .join()
        .unwrap();
    }
}
