//! Per-OS-thread preemption disable count
//!
//! Code that takes locks the scheduler cannot see (the allocator, stdio)
//! runs inside a `NoPreempt` section. A tick that lands in such a section is
//! recorded as pending instead of switching threads; leaving the outermost
//! section runs the registered deferred-tick hook.
//!
//! Every item here only touches const-initialized thread-locals without
//! destructors, so it is usable from the allocator and the signal handler.

use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

thread_local! {
    static DEPTH: AtomicU32 = const { AtomicU32::new(0) };
    static PENDING: AtomicBool = const { AtomicBool::new(false) };
    static HOOK: Cell<Option<fn()>> = const { Cell::new(None) };
}

/// Enter a no-preemption section
#[inline]
pub fn disable() {
    DEPTH.with(|d| d.fetch_add(1, Ordering::SeqCst));
}

/// Leave a no-preemption section
///
/// Leaving the outermost one runs the deferred-tick hook if a tick arrived
/// in the meantime.
#[inline]
pub fn enable() {
    let prev = DEPTH.with(|d| d.fetch_sub(1, Ordering::SeqCst));
    debug_assert!(prev > 0, "preempt::enable without matching disable");
    if prev == 1 && PENDING.with(|p| p.swap(false, Ordering::SeqCst)) {
        if let Some(hook) = HOOK.with(|h| h.get()) {
            hook();
        }
    }
}

/// True while inside at least one no-preemption section
#[inline]
pub fn is_disabled() -> bool {
    DEPTH.with(|d| d.load(Ordering::SeqCst)) > 0
}

/// Remember a tick that arrived while preemption was disabled
#[inline]
pub fn defer_tick() {
    PENDING.with(|p| p.store(true, Ordering::SeqCst));
}

/// True if a tick is waiting for the outermost section to end
#[inline]
pub fn tick_pending() -> bool {
    PENDING.with(|p| p.load(Ordering::SeqCst))
}

/// Install (or clear) the function run for a deferred tick
pub fn set_deferred_hook(hook: Option<fn()>) {
    HOOK.with(|h| h.set(hook));
    if hook.is_none() {
        PENDING.with(|p| p.store(false, Ordering::SeqCst));
    }
}

/// RAII no-preemption section
pub struct NoPreempt {
    _not_send: PhantomData<*const ()>,
}

impl NoPreempt {
    #[inline]
    pub fn new() -> Self {
        disable();
        Self { _not_send: PhantomData }
    }
}

impl Default for NoPreempt {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for NoPreempt {
    #[inline]
    fn drop(&mut self) {
        enable();
    }
}
