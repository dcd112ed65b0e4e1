//! # Host Stubs
//!
//! Stand-in HAL implementations for host builds and tests. None of them
//! touch hardware; each exposes a shared probe so tests can observe what
//! the core asked for after the stub has been moved into the kernel.

use crate::context::{ContextSwitch, ThreadContext};
use crate::interrupts::{InterruptController, InterruptLine};
use crate::memory::MemoryAllocator;
use crate::{HalError, HalResult, VirtAddr};
use alloc::sync::Arc;
use alloc::vec;
use alloc::vec::Vec;
use core::alloc::Layout;
use core::ptr::NonNull;
use core::sync::atomic::{AtomicUsize, Ordering};
use spin::Mutex;

// =============================================================================
// Stub Context Switch
// =============================================================================

/// One recorded switch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchRecord {
    /// Stack pointer of the outgoing context (none at boot)
    pub from_sp: Option<u64>,
    /// Stack pointer of the incoming context
    pub to_sp: u64,
    /// Entry argument of the incoming context
    pub to_arg: usize,
}

/// Context switch that records instead of transferring control.
///
/// `switch` returns immediately, which is what the scheduler would observe
/// when the outgoing thread is eventually resumed.
pub struct StubContextSwitch {
    log: Arc<Mutex<Vec<SwitchRecord>>>,
}

impl StubContextSwitch {
    /// Create a new stub
    pub fn new() -> Self {
        Self {
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Shared view of the switch log
    pub fn probe(&self) -> Arc<Mutex<Vec<SwitchRecord>>> {
        self.log.clone()
    }
}

impl Default for StubContextSwitch {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextSwitch for StubContextSwitch {
    unsafe fn switch(&mut self, from: Option<NonNull<ThreadContext>>, to: NonNull<ThreadContext>) {
        // SAFETY: the caller guarantees both contexts are valid for the call
        let (from_sp, to) = unsafe { (from.map(|ctx| ctx.as_ref().sp), to.as_ref()) };
        self.log.lock().push(SwitchRecord {
            from_sp,
            to_sp: to.sp,
            to_arg: to.argument(),
        });
        log::trace!("stub switch {:?} -> {:#x}", from_sp, to.sp);
    }
}

// =============================================================================
// Heap Allocator
// =============================================================================

/// Counters shared between a [`HeapAllocator`] and its observers
#[derive(Debug, Default)]
pub struct AllocatorStats {
    allocations: AtomicUsize,
    frees: AtomicUsize,
    bytes_in_use: AtomicUsize,
}

impl AllocatorStats {
    /// Number of successful allocations
    pub fn allocations(&self) -> usize {
        self.allocations.load(Ordering::Relaxed)
    }

    /// Number of frees
    pub fn frees(&self) -> usize {
        self.frees.load(Ordering::Relaxed)
    }

    /// Blocks currently outstanding
    pub fn outstanding(&self) -> usize {
        self.allocations() - self.frees()
    }

    /// Bytes currently outstanding
    pub fn bytes_in_use(&self) -> usize {
        self.bytes_in_use.load(Ordering::Relaxed)
    }
}

/// Allocator backed by the global heap, with an optional byte budget
pub struct HeapAllocator {
    budget: Option<usize>,
    stats: Arc<AllocatorStats>,
}

impl HeapAllocator {
    /// Unlimited allocator
    pub fn new() -> Self {
        Self {
            budget: None,
            stats: Arc::new(AllocatorStats::default()),
        }
    }

    /// Allocator that fails once `budget` bytes are outstanding
    pub fn with_budget(budget: usize) -> Self {
        Self {
            budget: Some(budget),
            ..Self::new()
        }
    }

    /// Shared view of the counters
    pub fn stats(&self) -> Arc<AllocatorStats> {
        self.stats.clone()
    }
}

impl Default for HeapAllocator {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryAllocator for HeapAllocator {
    fn allocate(&mut self, size: usize, align: usize) -> HalResult<VirtAddr> {
        let layout = Layout::from_size_align(size, align).map_err(|_| HalError::InvalidParameter)?;
        if size == 0 {
            return Err(HalError::InvalidParameter);
        }

        let in_use = self.stats.bytes_in_use();
        if let Some(budget) = self.budget {
            if in_use + size > budget {
                log::debug!("stub heap: {} bytes over budget of {}", in_use + size, budget);
                return Err(HalError::OutOfMemory);
            }
        }

        // SAFETY: layout has a non-zero size
        let ptr = unsafe { alloc::alloc::alloc(layout) };
        if ptr.is_null() {
            return Err(HalError::OutOfMemory);
        }

        self.stats.allocations.fetch_add(1, Ordering::Relaxed);
        self.stats.bytes_in_use.fetch_add(size, Ordering::Relaxed);
        Ok(VirtAddr::from(ptr))
    }

    unsafe fn free(&mut self, addr: VirtAddr, size: usize, align: usize) {
        // SAFETY: the caller guarantees addr came from allocate with this size and align
        unsafe {
            let layout = Layout::from_size_align_unchecked(size, align);
            alloc::alloc::dealloc(addr.as_mut_ptr(), layout);
        }
        self.stats.frees.fetch_add(1, Ordering::Relaxed);
        self.stats.bytes_in_use.fetch_sub(size, Ordering::Relaxed);
    }
}

// =============================================================================
// Stub Interrupt Controller
// =============================================================================

/// Per-line state of a [`StubInterruptController`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LineState {
    /// A handler has claimed the line
    pub registered: bool,
    /// The line is unmasked
    pub enabled: bool,
    /// Number of acknowledged interrupts
    pub acked: u32,
}

/// Interrupt controller that only tracks line state
pub struct StubInterruptController {
    lines: Arc<Mutex<Vec<LineState>>>,
}

impl StubInterruptController {
    /// Create a controller with `count` lines
    pub fn new(count: usize) -> Self {
        Self {
            lines: Arc::new(Mutex::new(vec![LineState::default(); count])),
        }
    }

    /// Shared view of the line table
    pub fn probe(&self) -> Arc<Mutex<Vec<LineState>>> {
        self.lines.clone()
    }

    fn with_line<R>(&self, line: InterruptLine, f: impl FnOnce(&mut LineState) -> R) -> HalResult<R> {
        let mut lines = self.lines.lock();
        lines
            .get_mut(line as usize)
            .map(f)
            .ok_or(HalError::InvalidParameter)
    }
}

impl InterruptController for StubInterruptController {
    fn line_count(&self) -> usize {
        self.lines.lock().len()
    }

    fn register(&mut self, line: InterruptLine) -> HalResult<()> {
        self.with_line(line, |state| {
            if state.registered {
                Err(HalError::ResourceBusy)
            } else {
                state.registered = true;
                log::trace!("IRQ{} registered", line);
                Ok(())
            }
        })?
    }

    fn unregister(&mut self, line: InterruptLine) -> HalResult<()> {
        self.with_line(line, |state| {
            if state.registered {
                state.registered = false;
                log::trace!("IRQ{} unregistered", line);
                Ok(())
            } else {
                Err(HalError::NotInitialized)
            }
        })?
    }

    fn enable_line(&mut self, line: InterruptLine) -> HalResult<()> {
        self.with_line(line, |state| state.enabled = true)?;
        log::trace!("IRQ{} enabled", line);
        Ok(())
    }

    fn disable_line(&mut self, line: InterruptLine) -> HalResult<()> {
        self.with_line(line, |state| state.enabled = false)?;
        log::trace!("IRQ{} disabled", line);
        Ok(())
    }

    fn is_line_enabled(&self, line: InterruptLine) -> bool {
        self.with_line(line, |state| state.enabled).unwrap_or(false)
    }

    fn acknowledge(&mut self, line: InterruptLine) {
        if self.with_line(line, |state| state.acked += 1).is_err() {
            log::warn!("acknowledge of unknown IRQ{}", line);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(_arg: usize) {}

    #[test]
    fn test_stub_switch_records() {
        let mut arch = StubContextSwitch::new();
        let probe = arch.probe();
        let mut a = arch.create_context(entry, 1, entry, VirtAddr::new(0x1000));
        let mut b = arch.create_context(entry, 2, entry, VirtAddr::new(0x2000));

        unsafe {
            arch.switch(None, NonNull::from(&mut a));
            arch.switch(Some(NonNull::from(&mut a)), NonNull::from(&mut b));
        }

        let log = probe.lock();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0], SwitchRecord { from_sp: None, to_sp: 0x1000, to_arg: 1 });
        assert_eq!(log[1], SwitchRecord { from_sp: Some(0x1000), to_sp: 0x2000, to_arg: 2 });
    }

    #[test]
    fn test_heap_allocator_budget() {
        let mut heap = HeapAllocator::with_budget(256);
        let stats = heap.stats();

        let a = heap.allocate(128, 16).unwrap();
        assert!(a.is_aligned(16));
        let b = heap.allocate(128, 16).unwrap();
        assert_eq!(heap.allocate(1, 1), Err(HalError::OutOfMemory));
        assert_eq!(stats.outstanding(), 2);
        assert_eq!(stats.bytes_in_use(), 256);

        unsafe {
            heap.free(a, 128, 16);
            heap.free(b, 128, 16);
        }
        assert_eq!(stats.outstanding(), 0);
        assert_eq!(stats.bytes_in_use(), 0);
    }

    #[test]
    fn test_heap_allocator_rejects_zero_size() {
        let mut heap = HeapAllocator::new();
        assert_eq!(heap.allocate(0, 8), Err(HalError::InvalidParameter));
        assert_eq!(heap.allocate(8, 3), Err(HalError::InvalidParameter));
    }

    #[test]
    fn test_stub_controller_lines() {
        let mut ic = StubInterruptController::new(8);
        let probe = ic.probe();

        assert_eq!(ic.line_count(), 8);
        ic.register(3).unwrap();
        assert_eq!(ic.register(3), Err(HalError::ResourceBusy));
        ic.enable_line(3).unwrap();
        assert!(ic.is_line_enabled(3));
        ic.acknowledge(3);

        assert_eq!(probe.lock()[3], LineState { registered: true, enabled: true, acked: 1 });

        ic.disable_line(3).unwrap();
        ic.unregister(3).unwrap();
        assert_eq!(ic.unregister(3), Err(HalError::NotInitialized));
        assert_eq!(ic.register(99), Err(HalError::InvalidParameter));
        assert!(!ic.is_line_enabled(99));
    }
}
