//! gthread Configuration
//!
//! Provides compile-time defaults with runtime environment overrides.
//!
//! # Configuration Priority (highest wins)
//!
//! 1. Builder setters
//! 2. Environment variables (runtime, `from_env` only)
//! 3. User's gt_config.rs (compile-time, via `GT_CONFIG_RS`)
//! 4. Library defaults
//!
//! # Example
//!
//! ```rust,ignore
//! use gthread_runtime::config::SchedulerConfig;
//!
//! let config = SchedulerConfig::from_env()
//!     .quantum(Duration::from_micros(5_000))
//!     .stack_size(512 * 1024);
//! ```

pub mod defaults;

use std::time::Duration;
use gthread_core::constants::MIN_STACK_SIZE;
use gthread_core::env::{env_get, env_get_bool};
use gthread_core::error::{SchedError, SchedResult};

/// Scheduler configuration with builder pattern.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Preemption period, measured in CPU time of the scheduler's OS thread.
    /// Fixed once the scheduler is initialized.
    pub quantum: Duration,
    /// Usable stack size per green thread (a guard page is added below it)
    pub stack_size: usize,
    /// Arm the preemption timer. Without it scheduling is purely cooperative.
    pub enable_preemption: bool,
    /// Enable scheduler debug logging
    pub debug_logging: bool,
    /// Initial capacity of the ready, blocked and zombie queues
    pub queue_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl SchedulerConfig {
    /// Create config from compile-time defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `GT_QUANTUM_US` - Preemption quantum in microseconds
    /// - `GT_STACK_SIZE` - Stack size per green thread
    /// - `GT_ENABLE_PREEMPTION` - Arm the preemption timer (0/1)
    /// - `GT_DEBUG` - Enable debug logging (0/1)
    /// - `GT_QUEUE_CAPACITY` - Initial queue capacity
    pub fn from_env() -> Self {
        Self {
            quantum: Duration::from_micros(env_get("GT_QUANTUM_US", defaults::QUANTUM_US)),
            stack_size: env_get("GT_STACK_SIZE", defaults::STACK_SIZE),
            enable_preemption: env_get_bool("GT_ENABLE_PREEMPTION", defaults::ENABLE_PREEMPTION),
            debug_logging: env_get_bool("GT_DEBUG", defaults::DEBUG_LOGGING),
            queue_capacity: env_get("GT_QUEUE_CAPACITY", defaults::QUEUE_CAPACITY),
        }
    }

    /// Create config with explicit defaults (no env override).
    /// Useful for testing or when you want full control.
    pub fn new() -> Self {
        Self {
            quantum: Duration::from_micros(defaults::QUANTUM_US),
            stack_size: defaults::STACK_SIZE,
            enable_preemption: defaults::ENABLE_PREEMPTION,
            debug_logging: defaults::DEBUG_LOGGING,
            queue_capacity: defaults::QUEUE_CAPACITY,
        }
    }

    // Builder methods

    pub fn quantum(mut self, d: Duration) -> Self {
        self.quantum = d;
        self
    }

    pub fn quantum_us(self, us: u64) -> Self {
        self.quantum(Duration::from_micros(us))
    }

    pub fn stack_size(mut self, size: usize) -> Self {
        self.stack_size = size;
        self
    }

    pub fn enable_preemption(mut self, enable: bool) -> Self {
        self.enable_preemption = enable;
        self
    }

    pub fn debug_logging(mut self, enable: bool) -> Self {
        self.debug_logging = enable;
        self
    }

    pub fn queue_capacity(mut self, cap: usize) -> Self {
        self.queue_capacity = cap;
        self
    }

    /// Validate configuration.
    pub fn validate(&self) -> SchedResult<()> {
        if self.quantum < Duration::from_micros(1) {
            return Err(SchedError::InvalidConfig("quantum must be >= 1us"));
        }
        if self.stack_size < MIN_STACK_SIZE {
            return Err(SchedError::InvalidConfig("stack_size must be >= 64KB"));
        }
        Ok(())
    }

    /// Print configuration (for debugging)
    pub fn print(&self) {
        eprintln!("gthread Configuration:");
        eprintln!("  quantum:            {:?}", self.quantum);
        eprintln!("  stack_size:         {}", self.stack_size);
        eprintln!("  enable_preemption:  {}", self.enable_preemption);
        eprintln!("  debug_logging:      {}", self.debug_logging);
        eprintln!("  queue_capacity:     {}", self.queue_capacity);
    }
}
