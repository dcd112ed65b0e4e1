//! # Thread Structure
//!
//! The thread descriptor and the pieces it owns.

use super::ThreadState;
use crate::scheduler::{Priority, SchedulingPolicy};
use crate::wait::QueueHandle;
use crate::{ExecError, ExecResult, ExitStatus, Handle, ThreadId};
use alloc::boxed::Box;
use alloc::string::String;
use core::fmt;
use quill_hal::{EntryPoint, MemoryAllocator, ThreadContext, VirtAddr};

/// Generation-checked reference to a thread descriptor
pub type ThreadHandle = Handle<Thread>;

/// Thread flags
pub mod flags {
    use bitflags::bitflags;

    bitflags! {
        /// Thread flags
        #[derive(Debug, Clone, Copy, PartialEq, Eq)]
        pub struct ThreadFlags: u32 {
            /// Thread is a kernel thread
            const KERNEL = 1 << 0;
            /// Thread is the idle thread
            const IDLE = 1 << 1;
            /// Thread is the init thread
            const INIT = 1 << 2;
            /// Exited; stack and self-reference are released at the next switch
            const PENDING_DELETE = 1 << 3;
        }
    }

    impl ThreadFlags {
        /// Flags a creation request may set
        pub const CREATE_MASK: Self = Self::KERNEL.union(Self::INIT);
    }
}

pub use flags::ThreadFlags;

/// Thread stack
///
/// Caller-supplied stacks are never freed by the executive.
#[derive(Debug, PartialEq, Eq)]
pub struct ThreadStack {
    base: VirtAddr,
    size: usize,
    align: usize,
    owned: bool,
}

impl ThreadStack {
    /// Wrap a stack the caller keeps ownership of
    pub fn caller_supplied(base: VirtAddr, size: usize) -> ExecResult<Self> {
        if base.is_null() || size == 0 {
            return Err(ExecError::InvalidArgument);
        }
        Ok(Self {
            base,
            size,
            align: 1,
            owned: false,
        })
    }

    /// Allocate an owned stack
    pub fn allocate(memory: &mut dyn MemoryAllocator, size: usize, align: usize) -> ExecResult<Self> {
        let base = memory.allocate(size, align)?;
        Ok(Self {
            base,
            size,
            align,
            owned: true,
        })
    }

    /// Free the stack if the descriptor owns it. Safe to call twice.
    pub fn release(&mut self, memory: &mut dyn MemoryAllocator) {
        if self.owned && !self.base.is_null() {
            // SAFETY: base/size/align are exactly what allocate handed out,
            // and the null reset below keeps this from running twice
            unsafe { memory.free(self.base, self.size, self.align) };
            log::trace!("[thread] freed stack {:#x} ({} bytes)", self.base.as_u64(), self.size);
        }
        self.base = VirtAddr::null();
        self.owned = false;
    }

    /// Lowest address
    pub fn base(&self) -> VirtAddr {
        self.base
    }

    /// Stack size in bytes
    pub fn size(&self) -> usize {
        self.size
    }

    /// Highest address (initial stack pointer)
    pub fn top(&self) -> VirtAddr {
        self.base.add(self.size as u64)
    }

    /// Whether the executive frees this stack
    pub fn is_owned(&self) -> bool {
        self.owned
    }

    /// Whether the stack has been released
    pub fn is_released(&self) -> bool {
        self.base.is_null()
    }
}

/// Cancellation hook attached to a suspended thread
///
/// Invoked at most once, when the thread is force-exited while SUSPENDED,
/// so it can unwind whatever external wait it registered against.
pub struct CancelHook {
    callback: Box<dyn FnOnce(ThreadHandle, usize) + Send>,
    param: usize,
}

impl CancelHook {
    /// Create a hook
    pub fn new(callback: impl FnOnce(ThreadHandle, usize) + Send + 'static, param: usize) -> Self {
        Self {
            callback: Box::new(callback),
            param,
        }
    }

    /// Opaque parameter passed to the callback
    pub fn param(&self) -> usize {
        self.param
    }

    pub(crate) fn fire(self, thread: ThreadHandle) {
        (self.callback)(thread, self.param);
    }
}

impl fmt::Debug for CancelHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CancelHook").field("param", &self.param).finish_non_exhaustive()
    }
}

/// Thread descriptor
#[derive(Debug)]
pub struct Thread {
    pub(crate) id: ThreadId,
    pub(crate) name: String,
    pub(crate) context: ThreadContext,
    pub(crate) stack: ThreadStack,
    pub(crate) state: ThreadState,
    /// Set iff state == Wait
    pub(crate) queue: Option<QueueHandle>,
    pub(crate) priority: Priority,
    pub(crate) policy: SchedulingPolicy,
    pub(crate) flags: ThreadFlags,
    /// Self plus one per joiner
    pub(crate) ref_count: u32,
    pub(crate) join_queue: QueueHandle,
    pub(crate) exit_status: Option<ExitStatus>,
    pub(crate) private_param: Option<usize>,
    pub(crate) errno: i32,
    pub(crate) retval: isize,
    /// Only meaningful while Suspended
    pub(crate) cancel_hook: Option<CancelHook>,
}

impl Thread {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: ThreadId,
        name: String,
        context: ThreadContext,
        stack: ThreadStack,
        priority: Priority,
        policy: SchedulingPolicy,
        flags: ThreadFlags,
        join_queue: QueueHandle,
    ) -> Self {
        Self {
            id,
            name,
            context,
            stack,
            state: ThreadState::Ready,
            queue: None,
            priority,
            policy,
            flags,
            ref_count: 1,
            join_queue,
            exit_status: None,
            private_param: None,
            errno: 0,
            retval: 0,
            cancel_hook: None,
        }
    }

    /// Get thread ID
    pub fn id(&self) -> ThreadId {
        self.id
    }

    /// Get thread name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get current state
    pub fn state(&self) -> ThreadState {
        self.state
    }

    /// Queue the thread is linked into, if waiting
    pub fn queue(&self) -> Option<QueueHandle> {
        self.queue
    }

    /// Get priority
    pub fn priority(&self) -> Priority {
        self.priority
    }

    /// Get scheduling policy
    pub fn policy(&self) -> SchedulingPolicy {
        self.policy
    }

    /// Get flags
    pub fn flags(&self) -> ThreadFlags {
        self.flags
    }

    /// Check if kernel thread
    pub fn is_kernel(&self) -> bool {
        self.flags.contains(ThreadFlags::KERNEL)
    }

    /// Check if this is the idle thread
    pub fn is_idle(&self) -> bool {
        self.flags.contains(ThreadFlags::IDLE)
    }

    /// Current reference count
    pub fn ref_count(&self) -> u32 {
        self.ref_count
    }

    /// Queue of threads waiting for this one to exit
    pub fn join_queue(&self) -> QueueHandle {
        self.join_queue
    }

    /// Exit status, once PASSIVE
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.exit_status
    }

    /// Saved execution context
    pub fn context(&self) -> &ThreadContext {
        &self.context
    }

    /// Stack descriptor
    pub fn stack(&self) -> &ThreadStack {
        &self.stack
    }

    /// Error code of the last failed call
    pub fn errno(&self) -> i32 {
        self.errno
    }

    /// Return value of the last syscall
    pub fn retval(&self) -> isize {
        self.retval
    }

    /// Private parameter slot
    pub fn private_param(&self) -> Option<usize> {
        self.private_param
    }

    /// Whether a cancellation hook is armed
    pub fn has_cancel_hook(&self) -> bool {
        self.cancel_hook.is_some()
    }
}

/// Thread creation request
#[derive(Debug, Clone)]
pub struct ThreadBuilder {
    pub(crate) entry: EntryPoint,
    pub(crate) arg: usize,
    pub(crate) name: Option<String>,
    pub(crate) priority: Option<i32>,
    pub(crate) flags: ThreadFlags,
    pub(crate) policy: SchedulingPolicy,
    pub(crate) stack: Option<(VirtAddr, usize)>,
    pub(crate) stack_size: Option<usize>,
}

impl ThreadBuilder {
    /// Start a request for a thread running `entry`
    pub fn new(entry: EntryPoint) -> Self {
        Self {
            entry,
            arg: 0,
            name: None,
            priority: None,
            flags: ThreadFlags::empty(),
            policy: SchedulingPolicy::Fifo,
            stack: None,
            stack_size: None,
        }
    }

    /// Argument passed to the entry function
    pub fn arg(mut self, arg: usize) -> Self {
        self.arg = arg;
        self
    }

    /// Thread name (diagnostics only)
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Requested priority; clamped into the configured level range
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Creation flags
    pub fn flags(mut self, flags: ThreadFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Scheduling policy
    pub fn policy(mut self, policy: SchedulingPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Run on a caller-supplied stack the executive never frees
    pub fn stack(mut self, base: VirtAddr, size: usize) -> Self {
        self.stack = Some((base, size));
        self
    }

    /// Size of the stack to allocate
    pub fn stack_size(mut self, size: usize) -> Self {
        self.stack_size = Some(size);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_hal::arch_stubs::HeapAllocator;

    fn entry(_arg: usize) {}

    #[test]
    fn test_owned_stack_release_is_idempotent() {
        let mut heap = HeapAllocator::new();
        let stats = heap.stats();

        let mut stack = ThreadStack::allocate(&mut heap, 4096, 16).unwrap();
        assert!(stack.is_owned());
        assert_eq!(stack.top().as_u64(), stack.base().as_u64() + 4096);
        assert_eq!(stats.outstanding(), 1);

        stack.release(&mut heap);
        stack.release(&mut heap);
        assert!(stack.is_released());
        assert_eq!(stats.frees(), 1);
    }

    #[test]
    fn test_caller_supplied_stack_is_never_freed() {
        let mut heap = HeapAllocator::new();
        let stats = heap.stats();

        let mut stack = ThreadStack::caller_supplied(VirtAddr::new(0x4000), 1024).unwrap();
        assert!(!stack.is_owned());
        stack.release(&mut heap);
        assert_eq!(stats.frees(), 0);

        assert_eq!(
            ThreadStack::caller_supplied(VirtAddr::null(), 1024),
            Err(ExecError::InvalidArgument)
        );
    }

    #[test]
    fn test_builder_defaults() {
        let builder = ThreadBuilder::new(entry).arg(7).name("worker");
        assert_eq!(builder.arg, 7);
        assert_eq!(builder.name.as_deref(), Some("worker"));
        assert_eq!(builder.policy, SchedulingPolicy::Fifo);
        assert!(builder.priority.is_none());
        assert!(builder.stack.is_none());
    }

    #[test]
    fn test_create_mask_excludes_internal_flags() {
        assert!(!ThreadFlags::CREATE_MASK.contains(ThreadFlags::IDLE));
        assert!(!ThreadFlags::CREATE_MASK.contains(ThreadFlags::PENDING_DELETE));
    }
}
