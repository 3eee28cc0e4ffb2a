//! Error types for the gthread scheduler

use core::fmt;

/// Result type for scheduler operations
pub type SchedResult<T> = Result<T, SchedError>;

/// Errors that can occur in scheduler operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedError {
    /// A thread tried to join itself
    SelfJoin,

    /// No thread with this id exists (never created, or already reclaimed)
    GThreadNotFound,

    /// The target is itself blocked joining the caller
    ReciprocalJoin,

    /// The target is already done or cancelled
    AlreadyTerminated,

    /// Parking the caller would leave no runnable thread
    Deadlock,

    /// Operation is reserved to the initializing thread
    NotMainThread,

    /// Internal state did not match the operation
    InvalidState,

    /// Scheduler not initialized on this OS thread
    NotInitialized,

    /// Scheduler already initialized on this OS thread
    AlreadyInitialized,

    /// Configuration rejected by validation
    InvalidConfig(&'static str),

    /// Stack allocation/mapping failed
    MemoryError(MemoryError),

    /// Signal handler or timer setup failed
    SetupError(SetupError),
}

impl SchedError {
    /// Status code view of an error: every rejection is -1
    #[inline]
    pub const fn status(&self) -> i32 {
        -1
    }

    /// Caller-argument errors: reported with no side effect, caller continues
    pub const fn is_rejection(&self) -> bool {
        matches!(
            self,
            SchedError::SelfJoin
                | SchedError::GThreadNotFound
                | SchedError::ReciprocalJoin
                | SchedError::AlreadyTerminated
                | SchedError::Deadlock
                | SchedError::NotMainThread
        )
    }
}

impl fmt::Display for SchedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedError::SelfJoin => write!(f, "thread cannot join itself"),
            SchedError::GThreadNotFound => write!(f, "green thread not found"),
            SchedError::ReciprocalJoin => write!(f, "target is already joining the caller"),
            SchedError::AlreadyTerminated => write!(f, "green thread already terminated"),
            SchedError::Deadlock => write!(f, "join would deadlock"),
            SchedError::NotMainThread => write!(f, "operation requires the initializing thread"),
            SchedError::InvalidState => write!(f, "invalid green thread state"),
            SchedError::NotInitialized => write!(f, "scheduler not initialized"),
            SchedError::AlreadyInitialized => write!(f, "scheduler already initialized"),
            SchedError::InvalidConfig(msg) => write!(f, "invalid config: {}", msg),
            SchedError::MemoryError(e) => write!(f, "memory error: {}", e),
            SchedError::SetupError(e) => write!(f, "setup error: {}", e),
        }
    }
}

impl std::error::Error for SchedError {}

/// Stack memory errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    /// mmap failed
    AllocationFailed,

    /// mprotect on the guard page failed
    ProtectionFailed,

    /// Requested stack size overflowed or was zero
    InvalidSize,
}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MemoryError::AllocationFailed => write!(f, "stack allocation failed"),
            MemoryError::ProtectionFailed => write!(f, "guard page protection failed"),
            MemoryError::InvalidSize => write!(f, "invalid stack size"),
        }
    }
}

impl From<MemoryError> for SchedError {
    fn from(e: MemoryError) -> Self {
        SchedError::MemoryError(e)
    }
}

/// Preemption setup errors, carrying the OS errno
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SetupError {
    /// sigaction for the preemption signal failed
    HandlerInstall(i32),

    /// timer_create failed
    TimerCreate(i32),

    /// timer_settime failed
    TimerArm(i32),
}

impl fmt::Display for SetupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SetupError::HandlerInstall(e) => write!(f, "signal handler install failed (errno {})", e),
            SetupError::TimerCreate(e) => write!(f, "timer create failed (errno {})", e),
            SetupError::TimerArm(e) => write!(f, "timer arm failed (errno {})", e),
        }
    }
}

impl From<SetupError> for SchedError {
    fn from(e: SetupError) -> Self {
        SchedError::SetupError(e)
    }
}
