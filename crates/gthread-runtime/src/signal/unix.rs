//! Unix signal handling for SIGVTALRM preemption

use gthread_core::error::{SchedResult, SetupError};
use nix::sys::signal::{sigaction, SaFlags, SigAction, SigHandler, SigSet, Signal};
use std::sync::atomic::{AtomicBool, Ordering};

/// Signal delivered by the preemption timer
pub const PREEMPT_SIGNAL: Signal = Signal::SIGVTALRM;

static HANDLER_INSTALLED: AtomicBool = AtomicBool::new(false);

#[inline]
fn preempt_set() -> SigSet {
    let mut set = SigSet::empty();
    set.add(PREEMPT_SIGNAL);
    set
}

/// Install the process-wide SIGVTALRM handler
///
/// The disposition is shared by every OS thread, so this is done once.
/// SA_RESTART keeps blocking syscalls in green threads from failing with
/// EINTR when a tick lands.
pub fn install_preempt_handler(handler: extern "C" fn(libc::c_int)) -> SchedResult<()> {
    if HANDLER_INSTALLED.load(Ordering::SeqCst) {
        return Ok(());
    }

    let action = SigAction::new(
        SigHandler::Handler(handler),
        SaFlags::SA_RESTART,
        SigSet::empty(),
    );
    unsafe { sigaction(PREEMPT_SIGNAL, &action) }
        .map_err(|e| SetupError::HandlerInstall(e as i32))?;

    HANDLER_INSTALLED.store(true, Ordering::SeqCst);
    Ok(())
}

/// Block SIGVTALRM on the calling OS thread
#[inline]
pub fn block_preempt() {
    // pthread_sigmask only fails for an invalid `how`
    let _ = preempt_set().thread_block();
}

/// Unblock SIGVTALRM on the calling OS thread
#[inline]
pub fn unblock_preempt() {
    let _ = preempt_set().thread_unblock();
}

/// Check whether SIGVTALRM is blocked on the calling OS thread
pub fn preempt_blocked() -> bool {
    SigSet::thread_get_mask()
        .map(|mask| mask.contains(PREEMPT_SIGNAL))
        .unwrap_or(false)
}
