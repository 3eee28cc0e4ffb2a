//! Preemption demo
//!
//! Several green threads spin in tight loops that never yield. The CPU-time
//! timer still rotates them, which shows up as every thread making progress
//! before the first one is done.
//!
//! ```text
//! GT_QUANTUM_US=2000 cargo run -p gthread-preemption -- 4
//! ```

use gthread::{cancel, create, env_get, join, current_id, Runtime, SchedulerConfig};
use gthread::kinfo;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

const SPIN_ITERS: u64 = 200_000_000;

fn main() {
    let threads: usize = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| env_get("GT_DEMO_THREADS", 3));

    let config = SchedulerConfig::from_env();
    config.print();

    let mut runtime = match Runtime::new(config) {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to start runtime: {}", e);
            std::process::exit(1);
        }
    };

    let result = runtime.block_on(|| {
        let progress: Arc<Vec<AtomicU64>> =
            Arc::new((0..threads).map(|_| AtomicU64::new(0)).collect());
        let snapshot: Arc<Vec<AtomicU64>> =
            Arc::new((0..threads).map(|_| AtomicU64::new(0)).collect());
        let first_done = Arc::new(AtomicBool::new(false));
        let start = Instant::now();

        let ids: Vec<_> = (0..threads)
            .map(|slot| {
                let progress = progress.clone();
                let snapshot = snapshot.clone();
                let first_done = first_done.clone();
                create(move || {
                    let mut x = 0u64;
                    for i in 0..SPIN_ITERS {
                        x = x.wrapping_mul(6364136223846793005).wrapping_add(i);
                        if i % 1_000_000 == 0 {
                            progress[slot].store(i + 1, Ordering::Relaxed);
                        }
                    }
                    if !first_done.swap(true, Ordering::SeqCst) {
                        for (seen, p) in snapshot.iter().zip(progress.iter()) {
                            seen.store(p.load(Ordering::Relaxed), Ordering::Relaxed);
                        }
                    }
                    (x & 0xff) as usize
                })
            })
            .collect();

        // A straggler that gets cancelled before it ever runs
        let victim = create(|| 0);
        let _ = cancel(victim);

        for id in &ids {
            let _ = join(*id);
        }
        let _ = join(victim);

        let elapsed = start.elapsed();
        let advanced = snapshot
            .iter()
            .filter(|p| p.load(Ordering::Relaxed) > 0)
            .count();

        kinfo!(
            "{} spinning threads finished in {:?} (caller={})",
            threads,
            elapsed,
            current_id()
        );
        println!(
            "{}/{} threads had made progress by the time the first one finished",
            advanced, threads
        );
    });

    if let Err(e) = result {
        eprintln!("shutdown failed: {}", e);
        std::process::exit(1);
    }
}
