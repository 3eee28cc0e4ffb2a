//! Preemption timer
//!
//! A POSIX timer on the CPU-time clock of the scheduler's OS thread. Each
//! expiry delivers SIGVTALRM to that OS thread only, so schedulers on other
//! OS threads (and the test harness) are unaffected.

use crate::signal::PREEMPT_SIGNAL;
use gthread_core::error::{SchedResult, SetupError};
use nix::sys::signal::{SigEvent, SigevNotify};
use nix::sys::time::TimeSpec;
use nix::sys::timer::{Expiration, Timer, TimerSetTimeFlags};
use nix::time::ClockId;
use std::time::Duration;

/// Periodic timer driving preemption ticks; deleted on drop
pub struct PreemptTimer {
    timer: Timer,
    quantum: Duration,
}

/// Kernel id of the calling OS thread
fn current_tid() -> libc::pid_t {
    unsafe { libc::syscall(libc::SYS_gettid) as libc::pid_t }
}

impl PreemptTimer {
    /// Create and arm a timer firing every `quantum` of thread CPU time
    pub fn start(quantum: Duration) -> SchedResult<Self> {
        let event = SigEvent::new(SigevNotify::SigevThreadId {
            signal: PREEMPT_SIGNAL,
            thread_id: current_tid(),
            si_value: 0,
        });

        let mut timer = Timer::new(ClockId::CLOCK_THREAD_CPUTIME_ID, event)
            .map_err(|e| SetupError::TimerCreate(e as i32))?;

        timer
            .set(
                Expiration::Interval(TimeSpec::from_duration(quantum)),
                TimerSetTimeFlags::empty(),
            )
            .map_err(|e| SetupError::TimerArm(e as i32))?;

        Ok(PreemptTimer { timer, quantum })
    }

    /// Configured tick period
    #[inline]
    pub fn quantum(&self) -> Duration {
        self.quantum
    }
}

impl std::fmt::Debug for PreemptTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreemptTimer")
            .field("quantum", &self.quantum)
            .finish()
    }
}
