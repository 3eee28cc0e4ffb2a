//! Preemption-safe global allocator
//!
//! The system allocator takes locks the scheduler knows nothing about. A
//! green thread switched out while holding one leaves every other green
//! thread on the OS thread blocked on it, and the CPU-time timer never fires
//! again. `PreemptSafeAlloc` wraps `System` in a no-preemption section so
//! ticks landing inside the allocator are deferred until it returns.
//!
//! ```ignore
//! #[global_allocator]
//! static ALLOC: gthread_runtime::alloc::PreemptSafeAlloc = gthread_runtime::alloc::PreemptSafeAlloc;
//! ```

use gthread_core::preempt::NoPreempt;
use std::alloc::{GlobalAlloc, Layout, System};

/// `System` with preemption deferred for the duration of every call
#[derive(Debug, Default, Clone, Copy)]
pub struct PreemptSafeAlloc;

unsafe impl GlobalAlloc for PreemptSafeAlloc {
    #[inline]
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let _np = NoPreempt::new();
        System.alloc(layout)
    }

    #[inline]
    unsafe fn alloc_zeroed(&self, layout: Layout) -> *mut u8 {
        let _np = NoPreempt::new();
        System.alloc_zeroed(layout)
    }

    #[inline]
    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        let _np = NoPreempt::new();
        System.dealloc(ptr, layout)
    }

    #[inline]
    unsafe fn realloc(&self, ptr: *mut u8, layout: Layout, new_size: usize) -> *mut u8 {
        let _np = NoPreempt::new();
        System.realloc(ptr, layout, new_size)
    }
}
