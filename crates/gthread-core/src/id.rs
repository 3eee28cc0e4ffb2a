//! Green thread identifier type

use core::fmt;
use crate::constants::MAIN_THREAD_ID;

/// Unique identifier for a green thread
///
/// Ids are handed out by [`IdAllocator`] in strictly increasing order and are
/// never reused, even after the thread has been joined and reclaimed.
/// The value 0 is reserved as a sentinel for "no green thread".
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct GThreadId(u64);

impl GThreadId {
    /// Sentinel value indicating no green thread
    pub const NONE: GThreadId = GThreadId(0);

    /// The thread that initialized the scheduler
    pub const MAIN: GThreadId = GThreadId(MAIN_THREAD_ID);

    /// Create a new GThreadId from a raw value
    #[inline]
    pub const fn new(id: u64) -> Self {
        GThreadId(id)
    }

    /// Get the raw u64 value
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Check if this is the NONE sentinel
    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == 0
    }

    /// Check if this is a valid id
    #[inline]
    pub const fn is_some(self) -> bool {
        self.0 != 0
    }

    /// Check if this is the initializing thread
    #[inline]
    pub const fn is_main(self) -> bool {
        self.0 == MAIN_THREAD_ID
    }
}

impl From<u64> for GThreadId {
    #[inline]
    fn from(id: u64) -> Self {
        GThreadId(id)
    }
}

impl From<GThreadId> for u64 {
    #[inline]
    fn from(id: GThreadId) -> Self {
        id.0
    }
}

impl fmt::Debug for GThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "GThreadId(NONE)")
        } else {
            write!(f, "GThreadId({})", self.0)
        }
    }
}

impl fmt::Display for GThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "none")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl Default for GThreadId {
    fn default() -> Self {
        GThreadId::NONE
    }
}

/// Monotonic id source
///
/// The first id handed out is [`GThreadId::MAIN`].
#[derive(Debug)]
pub struct IdAllocator {
    next: u64,
}

impl IdAllocator {
    pub const fn new() -> Self {
        Self { next: MAIN_THREAD_ID }
    }

    /// Take the next id
    #[inline]
    pub fn allocate(&mut self) -> GThreadId {
        let id = GThreadId(self.next);
        self.next += 1;
        id
    }

    /// Number of ids handed out so far
    #[inline]
    pub fn issued(&self) -> u64 {
        self.next - MAIN_THREAD_ID
    }
}

impl Default for IdAllocator {
    fn default() -> Self {
        Self::new()
    }
}
