//! Signal handling for preemption
//!
//! Uses SIGVTALRM on Unix systems to preempt CPU-bound green threads.
//! Masking the signal on the scheduler's OS thread is the critical section.

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        mod unix;
        pub use unix::*;
    }
}
