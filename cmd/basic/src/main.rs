//! Basic gthread example
//!
//! Two green threads bump a shared counter five times each and exit with
//! their local count; the initializing thread joins both.
//!
//! # Environment Variables
//!
//! - `GT_FLUSH_EPRINT=1` - Flush debug output immediately (useful for crash debugging)
//! - `GT_LOG_LEVEL=debug` - Set log level (off, error, warn, info, debug, trace)
//! - `GT_DEBUG=1` - Scheduler debug lines

use gthread::{create, exit, init, join, yield_now, JoinStatus};
use gthread::{kinfo, kdebug};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// GT_LOG_LEVEL=debug GT_FLUSH_EPRINT=1 cargo run -p gthread-basic
fn main() {
    println!("=== gthread Basic Example ===\n");

    init(10_000);

    let counter = Arc::new(AtomicUsize::new(0));

    let worker = |name: &'static str| {
        let counter = counter.clone();
        move || {
            let mut local = 0;
            for i in 0..5 {
                counter.fetch_add(1, Ordering::SeqCst);
                local += 1;
                kdebug!("[{}] iteration {}", name, i);
                yield_now();
            }
            exit(local)
        }
    };

    let a = create(worker("A"));
    let b = create(worker("B"));
    kinfo!("created A={} B={}", a, b);

    let ra = join(a);
    let rb = join(b);

    match (ra, rb) {
        (Ok(JoinStatus::Finished(ra)), Ok(JoinStatus::Finished(rb))) => {
            println!("A returned {}, B returned {}", ra, rb);
        }
        other => println!("unexpected join results: {:?}", other),
    }
    println!("shared counter = {}", counter.load(Ordering::SeqCst));

    println!("\n=== Example Complete ===");
    exit(0);
}
