//! Execution contexts
//!
//! An `ExecutionContext` is the saved register file of a suspended green
//! thread together with the stack it runs on. Contexts are always boxed so
//! the register file has a stable address while a switch is in flight.

use crate::arch::EntryFn;
use crate::current_arch::{self, SavedRegs};
use crate::memory::Stack;
use gthread_core::error::SchedResult;

/// Saved registers plus backing stack of one green thread
pub struct ExecutionContext {
    regs: SavedRegs,

    /// `None` for the initializing thread, which runs on its OS stack
    stack: Option<Stack>,
}

impl ExecutionContext {
    /// Context for the thread that is already running on its own stack
    ///
    /// The register file is filled in by the first switch away from it.
    pub fn for_current() -> Box<Self> {
        Box::new(ExecutionContext {
            regs: SavedRegs::default(),
            stack: None,
        })
    }

    /// Fresh context that starts in `entry(arg)` on a new stack
    pub fn new(stack_size: usize, entry: EntryFn, arg: usize) -> SchedResult<Box<Self>> {
        let stack = Stack::new(stack_size)?;
        let top = stack.top();
        let mut ctx = Box::new(ExecutionContext {
            regs: SavedRegs::default(),
            stack: Some(stack),
        });
        unsafe { current_arch::init_context(&mut ctx.regs, top, entry, arg) };
        Ok(ctx)
    }

    /// Where a switch away from this context stores the registers
    #[inline]
    pub fn save_area(&mut self) -> *mut SavedRegs {
        &mut self.regs
    }

    /// Where a switch to this context loads the registers from
    #[inline]
    pub fn resume_point(&self) -> *const SavedRegs {
        &self.regs
    }

    #[inline]
    pub fn stack(&self) -> Option<&Stack> {
        self.stack.as_ref()
    }
}

impl std::fmt::Debug for ExecutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionContext")
            .field("stack", &self.stack)
            .finish_non_exhaustive()
    }
}

/// Save the running registers to `from` and resume `to`
///
/// # Safety
///
/// `from` must stay valid until the saved context is resumed; `to` must be
/// a context whose stack is still mapped.
#[inline]
pub unsafe fn switch(from: *mut SavedRegs, to: *const SavedRegs) {
    current_arch::context_switch(from, to);
}
