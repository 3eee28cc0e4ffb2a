//! Thread-local storage for the scheduler bound to this OS thread
//!
//! The preemption handler has no arguments beyond the signal number, so it
//! finds its scheduler through this pointer.

use crate::scheduler::Scheduler;
use std::cell::Cell;

thread_local! {
    /// Scheduler owned by this OS thread (null when none)
    static SCHEDULER: Cell<*const Scheduler> = const { Cell::new(std::ptr::null()) };
}

/// Bind a scheduler to the current OS thread
#[inline]
pub fn set_scheduler(sched: *const Scheduler) {
    SCHEDULER.with(|cell| cell.set(sched));
}

/// Unbind the scheduler from the current OS thread
#[inline]
pub fn clear_scheduler() {
    SCHEDULER.with(|cell| cell.set(std::ptr::null()));
}

/// Raw scheduler pointer, null when none is bound
#[inline]
pub fn scheduler_ptr() -> *const Scheduler {
    SCHEDULER.try_with(|cell| cell.get()).unwrap_or(std::ptr::null())
}

/// Scheduler bound to the current OS thread, if any
///
/// The pointee is owned by a `Runtime` that clears this binding before it
/// is dropped, so the reference is valid while the binding exists.
#[inline]
pub fn current_scheduler() -> Option<&'static Scheduler> {
    unsafe { scheduler_ptr().as_ref() }
}

/// Check if a scheduler is bound to this OS thread
#[inline]
pub fn has_scheduler() -> bool {
    !scheduler_ptr().is_null()
}
