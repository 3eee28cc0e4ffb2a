//! Architecture-specific context switching
//!
//! Provides assembly implementations for saving and restoring registers
//! during green thread context switches.

cfg_if::cfg_if! {
    if #[cfg(target_arch = "x86_64")] {
        pub mod x86_64;
    } else if #[cfg(target_arch = "aarch64")] {
        pub mod aarch64;
    }
}

/// First function run on a fresh stack. It must never return.
pub type EntryFn = extern "C" fn(usize) -> !;

#[cfg(test)]
mod tests {
    use crate::current_arch::{context_switch, init_context, SavedRegs};
    use crate::memory::Stack;
    use std::ptr::{addr_of, addr_of_mut};

    struct PingPong {
        main: SavedRegs,
        child: SavedRegs,
        hits: usize,
    }

    extern "C" fn bounce(arg: usize) -> ! {
        let pp = arg as *mut PingPong;
        loop {
            unsafe {
                (*pp).hits += 1;
                context_switch(addr_of_mut!((*pp).child), addr_of!((*pp).main));
            }
        }
    }

    #[test]
    fn test_ping_pong() {
        let stack = Stack::new(64 * 1024).unwrap();
        let mut pp = Box::new(PingPong {
            main: SavedRegs::default(),
            child: SavedRegs::default(),
            hits: 0,
        });
        let p: *mut PingPong = &mut *pp;

        unsafe { init_context(addr_of_mut!((*p).child), stack.top(), bounce, p as usize) };

        for round in 1..=3 {
            unsafe { context_switch(addr_of_mut!((*p).main), addr_of!((*p).child)) };
            assert_eq!(unsafe { (*p).hits }, round);
        }
    }

    #[test]
    fn test_locals_survive_switch() {
        // Callee-saved registers hold these across the switch
        let stack = Stack::new(64 * 1024).unwrap();
        let mut pp = Box::new(PingPong {
            main: SavedRegs::default(),
            child: SavedRegs::default(),
            hits: 0,
        });
        let p: *mut PingPong = &mut *pp;
        unsafe { init_context(addr_of_mut!((*p).child), stack.top(), bounce, p as usize) };

        let mut acc = 0u64;
        for i in 0..100u64 {
            acc = acc.wrapping_mul(31).wrapping_add(i);
            unsafe { context_switch(addr_of_mut!((*p).main), addr_of!((*p).child)) };
        }
        let expected = (0..100u64).fold(0u64, |a, i| a.wrapping_mul(31).wrapping_add(i));
        assert_eq!(acc, expected);
        assert_eq!(unsafe { (*p).hits }, 100);
    }
}
