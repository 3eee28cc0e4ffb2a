//! # gthread-core
//!
//! Core types for the gthread green-thread scheduler.
//!
//! This crate is platform-agnostic and contains no OS-specific code.
//! Context switching, signals, timers and stacks live in `gthread-runtime`.
//!
//! ## Modules
//!
//! - `id` - Green thread identifier and monotonic allocator
//! - `state` - Thread state and join status
//! - `error` - Error types
//! - `kprint` - Kernel-style debug printing macros
//! - `env` - Environment variable utilities
//! - `preempt` - Per-OS-thread preemption disable count

pub mod id;
pub mod state;
pub mod error;
pub mod kprint;
pub mod env;
pub mod preempt;

// Re-exports for convenience
pub use id::{GThreadId, IdAllocator};
pub use state::{GThreadState, JoinStatus};
pub use error::{SchedError, SchedResult, MemoryError, SetupError};
pub use env::{env_get, env_get_bool};

/// Constants shared by the scheduler and its stacks
pub mod constants {
    /// Guard page size below every green thread stack
    pub const GUARD_SIZE: usize = 4096;

    /// Smallest stack a green thread may be configured with
    pub const MIN_STACK_SIZE: usize = 64 * 1024;

    /// Id of the thread that initialized the scheduler
    pub const MAIN_THREAD_ID: u64 = 1;
}
