//! Green thread state and join status types

use core::fmt;

/// State of a green thread
///
/// `Running` covers every live thread: the current one and those waiting in
/// the ready queue or parked in a join. The other two are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum GThreadState {
    /// Alive (current, ready or blocked in join)
    Running = 0,

    /// Terminated by `cancel`
    Cancelled = 1,

    /// Terminated by `exit` or by returning from its entry function
    Done = 2,
}

impl GThreadState {
    /// Check if this state allows the thread to be dispatched
    #[inline]
    pub const fn is_runnable(&self) -> bool {
        matches!(self, GThreadState::Running)
    }

    /// Check if this thread has terminated (done or cancelled)
    #[inline]
    pub const fn is_terminated(&self) -> bool {
        matches!(self, GThreadState::Done | GThreadState::Cancelled)
    }
}

impl From<GThreadState> for u8 {
    fn from(state: GThreadState) -> u8 {
        state as u8
    }
}

impl fmt::Display for GThreadState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GThreadState::Running => write!(f, "RUNNING"),
            GThreadState::Cancelled => write!(f, "CANCELLED"),
            GThreadState::Done => write!(f, "DONE"),
        }
    }
}

/// Outcome of a successful `join`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinStatus {
    /// The target exited with this value
    Finished(usize),

    /// The target was cancelled; it has no return value
    Cancelled,
}

impl JoinStatus {
    /// Return value, if the target finished normally
    #[inline]
    pub const fn value(&self) -> Option<usize> {
        match self {
            JoinStatus::Finished(v) => Some(*v),
            JoinStatus::Cancelled => None,
        }
    }

    #[inline]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self, JoinStatus::Cancelled)
    }
}

impl fmt::Display for JoinStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JoinStatus::Finished(v) => write!(f, "finished({})", v),
            JoinStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_predicates() {
        assert!(GThreadState::Running.is_runnable());
        assert!(!GThreadState::Cancelled.is_runnable());
        assert!(!GThreadState::Done.is_runnable());

        assert!(GThreadState::Done.is_terminated());
        assert!(GThreadState::Cancelled.is_terminated());
        assert!(!GThreadState::Running.is_terminated());
    }

    #[test]
    fn test_join_status() {
        assert_eq!(JoinStatus::Finished(5).value(), Some(5));
        assert_eq!(JoinStatus::Cancelled.value(), None);
        assert!(JoinStatus::Cancelled.is_cancelled());
        assert_eq!(format!("{}", JoinStatus::Finished(7)), "finished(7)");
    }
}
