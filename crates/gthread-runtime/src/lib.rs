//! # gthread-runtime
//!
//! Platform-specific runtime implementation for the gthread scheduler.
//!
//! This crate provides:
//! - Stack management (mmap with a guard page)
//! - Signal handling (SIGVTALRM for preemption, masking as critical section)
//! - A per-OS-thread CPU-time preemption timer
//! - Context switching (architecture-specific assembly)
//! - The scheduler itself: ready/blocked/zombie queues and the dispatcher
//! - A global allocator that defers preemption while it runs

pub mod alloc;
pub mod config;
pub mod memory;
pub mod signal;
pub mod arch;
pub mod timer;
pub mod critical;
pub mod context;
pub mod tcb;
pub mod tls;
pub mod scheduler;

// Re-exports
pub use alloc::PreemptSafeAlloc;
pub use config::SchedulerConfig;
pub use scheduler::Scheduler;
pub use tls::current_scheduler;

// Platform detection
cfg_if::cfg_if! {
    if #[cfg(not(target_os = "linux"))] {
        compile_error!("gthread needs Linux per-thread CPU-time timers (SIGEV_THREAD_ID)");
    }
}

// Architecture detection
cfg_if::cfg_if! {
    if #[cfg(target_arch = "x86_64")] {
        pub use arch::x86_64 as current_arch;
    } else if #[cfg(target_arch = "aarch64")] {
        pub use arch::aarch64 as current_arch;
    } else {
        compile_error!("Unsupported architecture");
    }
}
