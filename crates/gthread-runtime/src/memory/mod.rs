//! Stack memory for green threads
//!
//! Platform-specific implementations handle virtual memory allocation.
//!
//! ```text
//!  base                                                  top
//!  | guard (PROT_NONE) |        usable stack (RW)         |
//!                       <------------- grows down -------
//! ```

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        mod unix;
    }
}

use std::ptr::NonNull;

/// An owned, guard-protected stack mapping
///
/// Unmapped on drop. Must never be dropped while code runs on it.
pub struct Stack {
    /// Lowest address of the mapping (start of the guard page)
    base: NonNull<u8>,

    /// Total size of the mapping, guard included
    total_size: usize,

    /// Size of the guard region at the bottom
    guard_size: usize,
}

impl Stack {
    /// Highest address of the stack (exclusive); execution starts below it
    #[inline]
    pub fn top(&self) -> *mut u8 {
        unsafe { self.base.as_ptr().add(self.total_size) }
    }

    /// Lowest usable address (just above the guard)
    #[inline]
    pub fn bottom(&self) -> *mut u8 {
        unsafe { self.base.as_ptr().add(self.guard_size) }
    }

    /// Usable bytes between guard and top
    #[inline]
    pub fn usable_size(&self) -> usize {
        self.total_size - self.guard_size
    }

    /// Check whether an address lies inside the mapping
    #[inline]
    pub fn contains(&self, addr: usize) -> bool {
        let base = self.base.as_ptr() as usize;
        addr >= base && addr < base + self.total_size
    }
}

impl std::fmt::Debug for Stack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stack")
            .field("bottom", &self.bottom())
            .field("top", &self.top())
            .field("usable", &self.usable_size())
            .finish()
    }
}
