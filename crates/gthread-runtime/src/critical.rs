//! Scheduler critical section
//!
//! All green threads of a scheduler share one OS thread, so the only
//! concurrent party is the preemption handler. Blocking SIGVTALRM on that OS
//! thread is therefore enough for mutual exclusion; no atomics are needed.
//!
//! Re-entering the lock is a scheduler bug and panics.

use crate::signal::{block_preempt, unblock_preempt};
use core::cell::{Cell, UnsafeCell};
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{compiler_fence, Ordering};

/// A lock that masks preemption while held
pub struct MaskLock<T> {
    held: Cell<bool>,
    data: UnsafeCell<T>,
}

impl<T> MaskLock<T> {
    /// Create a new lock containing the given value
    #[inline]
    pub const fn new(value: T) -> Self {
        MaskLock {
            held: Cell::new(false),
            data: UnsafeCell::new(value),
        }
    }

    /// Block preemption and take the lock
    #[inline]
    pub fn lock(&self) -> MaskGuard<'_, T> {
        block_preempt();
        assert!(!self.held.get(), "scheduler critical section re-entered");
        self.held.set(true);
        compiler_fence(Ordering::SeqCst);
        MaskGuard { lock: self }
    }

    /// Check whether the lock is held
    ///
    /// Read by the preemption handler, which runs on the same OS thread.
    #[inline]
    pub fn is_held(&self) -> bool {
        self.held.get()
    }
}

/// Guard that releases the lock and unblocks preemption on drop
pub struct MaskGuard<'a, T> {
    lock: &'a MaskLock<T>,
}

impl<T> Deref for MaskGuard<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for MaskGuard<'_, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for MaskGuard<'_, T> {
    #[inline]
    fn drop(&mut self) {
        compiler_fence(Ordering::SeqCst);
        self.lock.held.set(false);
        unblock_preempt();
    }
}
