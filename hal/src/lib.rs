//! # Quill HAL - Hardware Abstraction Layer
//!
//! The narrow contract between the Quill execution core and the
//! architecture it runs on.
//!
//! ## Design Philosophy
//!
//! The core consumes exactly three kinds of hardware service:
//! - **Interrupt lines**: register, unregister, enable, disable
//! - **Execution contexts**: build an initial context, switch between two
//! - **Raw memory**: allocate and free untyped blocks (thread stacks)
//!
//! Everything else (register access, boot, drivers) lives outside the core.
//! Host stand-ins for all three live in [`arch_stubs`].

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

pub mod context;
pub mod interrupts;
pub mod memory;

// Stub implementations (host builds and tests)
pub mod arch_stubs;

pub use context::{ContextSwitch, EntryPoint, ThreadContext};
pub use interrupts::{InterruptController, InterruptLine};
pub use memory::MemoryAllocator;

/// Result type for HAL operations
pub type HalResult<T> = Result<T, HalError>;

/// Errors that can occur in HAL operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HalError {
    /// The operation is not supported on this architecture
    NotSupported,
    /// Invalid parameter provided
    InvalidParameter,
    /// Resource is not available
    ResourceBusy,
    /// Memory allocation failed
    OutOfMemory,
    /// Feature not initialized
    NotInitialized,
}

cfg_if::cfg_if! {
    if #[cfg(target_arch = "x86_64")] {
        /// Architecture name constant
        pub const ARCH_NAME: &str = "x86_64";
    } else if #[cfg(target_arch = "aarch64")] {
        /// Architecture name constant
        pub const ARCH_NAME: &str = "aarch64";
    } else if #[cfg(target_arch = "arm")] {
        /// Architecture name constant
        pub const ARCH_NAME: &str = "arm";
    } else if #[cfg(target_arch = "riscv64")] {
        /// Architecture name constant
        pub const ARCH_NAME: &str = "riscv64";
    } else {
        /// Architecture name constant
        pub const ARCH_NAME: &str = "unknown";
    }
}

/// Virtual address type (architecture-independent)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct VirtAddr(u64);

static_assertions::assert_eq_size!(VirtAddr, u64);

impl VirtAddr {
    /// Create a new virtual address
    #[inline]
    pub const fn new(addr: u64) -> Self {
        Self(addr)
    }

    /// The null address
    #[inline]
    pub const fn null() -> Self {
        Self(0)
    }

    /// Get the raw address value
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Check whether this is the null address
    #[inline]
    pub const fn is_null(self) -> bool {
        self.0 == 0
    }

    /// Check if the address is aligned to the given alignment
    #[inline]
    pub const fn is_aligned(self, align: u64) -> bool {
        self.0 % align == 0
    }

    /// Align the address down to the given alignment
    #[inline]
    pub const fn align_down(self, align: u64) -> Self {
        Self(self.0 & !(align - 1))
    }

    /// Add an offset to the address
    #[inline]
    pub const fn add(self, offset: u64) -> Self {
        Self(self.0 + offset)
    }

    /// Convert to a raw mutable pointer
    #[inline]
    pub const fn as_mut_ptr<T>(self) -> *mut T {
        self.0 as *mut T
    }
}

impl<T> From<*mut T> for VirtAddr {
    fn from(ptr: *mut T) -> Self {
        Self(ptr as usize as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_virt_addr_alignment() {
        let addr = VirtAddr::new(0x1234);
        assert!(!addr.is_aligned(16));
        assert_eq!(addr.align_down(16), VirtAddr::new(0x1230));
        assert!(addr.align_down(16).is_aligned(16));
        assert_eq!(addr.add(0x10).as_u64(), 0x1244);
    }

    #[test]
    fn test_virt_addr_null() {
        assert!(VirtAddr::null().is_null());
        assert!(VirtAddr::default().is_null());
        assert!(!VirtAddr::new(8).is_null());
    }

    #[test]
    fn test_arch_name_known() {
        assert!(!ARCH_NAME.is_empty());
    }
}
