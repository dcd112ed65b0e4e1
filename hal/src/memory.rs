//! # Raw Memory
//!
//! Untyped block allocation, consumed by the execution core for thread
//! stacks. The allocator's internals are not the core's concern.

use crate::{HalResult, VirtAddr};

/// Raw memory allocator
pub trait MemoryAllocator: Send {
    /// Allocate `size` bytes aligned to `align`.
    ///
    /// Fails with [`crate::HalError::OutOfMemory`] when the request cannot
    /// be satisfied.
    fn allocate(&mut self, size: usize, align: usize) -> HalResult<VirtAddr>;

    /// Return a block to the allocator.
    ///
    /// # Safety
    /// `addr` must have come from [`MemoryAllocator::allocate`] on this
    /// allocator with the same `size` and `align`, and must not be in use.
    unsafe fn free(&mut self, addr: VirtAddr, size: usize, align: usize);
}
