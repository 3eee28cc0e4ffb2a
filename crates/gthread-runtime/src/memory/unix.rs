//! Unix stack implementation using mmap

use super::Stack;
use gthread_core::constants::GUARD_SIZE;
use gthread_core::error::{MemoryError, SchedResult};
use std::ptr::NonNull;

/// System page size, falling back to the guard size if sysconf fails
fn page_size() -> usize {
    let ret = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if ret > 0 {
        ret as usize
    } else {
        GUARD_SIZE
    }
}

impl Stack {
    /// Map a stack with at least `size` usable bytes plus a guard page
    ///
    /// The guard page at the low end stays PROT_NONE, so an overflow
    /// faults instead of corrupting a neighbouring mapping.
    pub fn new(size: usize) -> SchedResult<Self> {
        if size == 0 {
            return Err(MemoryError::InvalidSize.into());
        }

        let page = page_size();
        let guard_size = GUARD_SIZE.max(page);
        let usable = size
            .checked_add(page - 1)
            .map(|s| s & !(page - 1))
            .ok_or(MemoryError::InvalidSize)?;
        let total_size = usable
            .checked_add(guard_size)
            .ok_or(MemoryError::InvalidSize)?;

        let base = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                total_size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS | libc::MAP_NORESERVE,
                -1,
                0,
            )
        };

        if base == libc::MAP_FAILED {
            return Err(MemoryError::AllocationFailed.into());
        }

        let ret = unsafe { libc::mprotect(base, guard_size, libc::PROT_NONE) };
        if ret != 0 {
            unsafe { libc::munmap(base, total_size) };
            return Err(MemoryError::ProtectionFailed.into());
        }

        let base = NonNull::new(base as *mut u8).ok_or(MemoryError::AllocationFailed)?;

        Ok(Stack {
            base,
            total_size,
            guard_size,
        })
    }
}

impl Drop for Stack {
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.base.as_ptr() as *mut libc::c_void, self.total_size);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_geometry() {
        let stack = Stack::new(64 * 1024).unwrap();
        assert!(stack.usable_size() >= 64 * 1024);
        assert_eq!(stack.usable_size() % page_size(), 0);
        assert_eq!(stack.top() as usize - stack.bottom() as usize, stack.usable_size());
        assert!(stack.contains(stack.bottom() as usize));
        assert!(!stack.contains(stack.top() as usize));
    }

    #[test]
    fn test_stack_is_writable() {
        let stack = Stack::new(100_000).unwrap();
        let len = stack.usable_size();
        unsafe {
            std::ptr::write_bytes(stack.bottom(), 0xAB, len);
            assert_eq!(*stack.top().sub(1), 0xAB);
            assert_eq!(*stack.bottom(), 0xAB);
        }
    }

    #[test]
    fn test_zero_size_rejected() {
        assert_eq!(
            Stack::new(0).unwrap_err(),
            MemoryError::InvalidSize.into()
        );
    }

    #[test]
    fn test_overflowing_size_rejected() {
        assert!(Stack::new(usize::MAX).is_err());
    }
}
