//! x86_64 context switching implementation
//!
//! Only the System V callee-saved state is switched: the general purpose
//! callee-saved registers plus the MXCSR and x87 control words. Everything
//! else is already spilled by the compiler around the call to
//! `context_switch`.

use std::arch::naked_asm;

/// Callee-saved register file of a suspended green thread
///
/// Field offsets are hard-coded in the assembly below.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct SavedRegs {
    pub rsp: u64, // 0x00
    pub rip: u64, // 0x08
    pub rbx: u64, // 0x10
    pub rbp: u64, // 0x18
    pub r12: u64, // 0x20
    pub r13: u64, // 0x28
    pub r14: u64, // 0x30
    pub r15: u64, // 0x38
    pub mxcsr: u32, // 0x40
    pub fpucw: u16, // 0x44
}

/// Power-on MXCSR: all SSE exceptions masked, round to nearest
const MXCSR_DEFAULT: u32 = 0x1F80;

/// Power-on x87 control word: all exceptions masked, extended precision
const FPUCW_DEFAULT: u16 = 0x037F;

impl Default for SavedRegs {
    fn default() -> Self {
        Self {
            rsp: 0,
            rip: 0,
            rbx: 0,
            rbp: 0,
            r12: 0,
            r13: 0,
            r14: 0,
            r15: 0,
            mxcsr: MXCSR_DEFAULT,
            fpucw: FPUCW_DEFAULT,
        }
    }
}

/// Initialize a new green thread's context
///
/// When first switched to, execution begins in the trampoline, which calls
/// `entry_fn(entry_arg)` on the fresh stack.
///
/// # Safety
///
/// `regs` must point to valid SavedRegs memory.
/// `stack_top` must be the highest address of a mapped stack.
#[inline]
pub unsafe fn init_context(
    regs: *mut SavedRegs,
    stack_top: *mut u8,
    entry_fn: super::EntryFn,
    entry_arg: usize,
) {
    // The trampoline is reached by `jmp`, so rsp is the aligned top itself.
    let aligned_sp = (stack_top as usize) & !0xF;

    let regs = &mut *regs;
    *regs = SavedRegs::default();
    regs.rsp = aligned_sp as u64;
    regs.rip = entry_trampoline as *const () as usize as u64;
    regs.r12 = entry_fn as *const () as usize as u64;
    regs.r13 = entry_arg as u64;
}

/// Trampoline that calls the entry function with its argument
///
/// The entry function never returns; `ud2` traps if it ever does.
#[unsafe(naked)]
unsafe extern "C" fn entry_trampoline() {
    naked_asm!(
        "mov rdi, r13",
        "and rsp, -16",
        "call r12",
        "ud2",
    );
}

/// Switch from the running context to another one
///
/// Saves callee-saved registers to `old_regs` and loads from `new_regs`.
/// Returns when some later switch loads `old_regs` again.
///
/// # Safety
///
/// `new_regs` must hold either a context produced by `init_context` or one
/// saved by a previous `context_switch` whose stack is still mapped.
#[unsafe(naked)]
pub unsafe extern "C" fn context_switch(
    _old_regs: *mut SavedRegs,
    _new_regs: *const SavedRegs,
) {
    naked_asm!(
        // Save callee-saved registers to old_regs (RDI)
        "mov [rdi + 0x00], rsp",
        "lea rax, [rip + 1f]",
        "mov [rdi + 0x08], rax",
        "mov [rdi + 0x10], rbx",
        "mov [rdi + 0x18], rbp",
        "mov [rdi + 0x20], r12",
        "mov [rdi + 0x28], r13",
        "mov [rdi + 0x30], r14",
        "mov [rdi + 0x38], r15",
        "stmxcsr [rdi + 0x40]",
        "fnstcw [rdi + 0x44]",
        // Load callee-saved registers from new_regs (RSI)
        "mov rsp, [rsi + 0x00]",
        "mov rax, [rsi + 0x08]",
        "mov rbx, [rsi + 0x10]",
        "mov rbp, [rsi + 0x18]",
        "mov r12, [rsi + 0x20]",
        "mov r13, [rsi + 0x28]",
        "mov r14, [rsi + 0x30]",
        "mov r15, [rsi + 0x38]",
        "ldmxcsr [rsi + 0x40]",
        "fldcw [rsi + 0x44]",
        // Jump to new RIP
        "jmp rax",
        // Return point for saved context
        "1:",
        "ret",
    );
}
