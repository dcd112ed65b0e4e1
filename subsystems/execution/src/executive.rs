//! # Executive
//!
//! The kernel-state object: thread registry, ready structure, blocking
//! queues, identifier pool, context-switch engine and the raw memory
//! allocator stacks come from.
//!
//! Every operation runs to completion between yield points, so nothing in
//! here takes a lock. An embedding on a preemptive or multi-core target
//! must serialize access to the executive itself.

use crate::context::ContextSwitchEngine;
use crate::scheduler::{MultilevelQueue, Priority, RunQueue, SchedulerMetrics, SchedulingPolicy};
use crate::thread::{Thread, ThreadBuilder, ThreadFlags, ThreadHandle, ThreadRegistry, ThreadState};
use crate::wait::WaitQueue;
use crate::{Arena, ContextSwitchHook, ErrorNumber, ExecConfig, ExecError, ExecResult, IdPool, ThreadId};
use alloc::boxed::Box;
use core::fmt;
use quill_hal::{ContextSwitch, MemoryAllocator};

/// Execution core state
pub struct Executive {
    pub(crate) config: ExecConfig,
    pub(crate) registry: ThreadRegistry,
    pub(crate) ready: MultilevelQueue,
    pub(crate) queues: Arena<WaitQueue>,
    pub(crate) ids: IdPool,
    pub(crate) active: Option<ThreadHandle>,
    pub(crate) idle: ThreadHandle,
    pub(crate) engine: ContextSwitchEngine,
    pub(crate) memory: Box<dyn MemoryAllocator>,
}

impl Executive {
    /// Build the executive and its idle thread. Nothing runs until
    /// [`Executive::start`].
    pub fn new(
        config: ExecConfig,
        arch: Box<dyn ContextSwitch>,
        memory: Box<dyn MemoryAllocator>,
    ) -> ExecResult<Self> {
        config.validate()?;

        let mut exec = Self {
            ready: MultilevelQueue::new(config.priority_levels)?,
            ids: IdPool::new(config.max_ids)?,
            registry: ThreadRegistry::new(),
            queues: Arena::new(),
            active: None,
            idle: ThreadHandle::dangling(),
            engine: ContextSwitchEngine::new(arch),
            memory,
            config,
        };

        let idle = ThreadBuilder::new(exec.config.idle_entry)
            .name("idle")
            .priority(Priority::IDLE.as_u8() as i32);
        exec.idle = exec.spawn(idle, ThreadFlags::IDLE | ThreadFlags::KERNEL)?;

        log::debug!(
            "[exec] initialized: {} priority levels, {} ids",
            exec.config.priority_levels,
            exec.config.max_ids
        );
        Ok(exec)
    }

    /// Boot dispatch: switch from no context into the most urgent thread
    pub fn start(&mut self) -> ExecResult<()> {
        if self.active.is_some() {
            return Err(ExecError::InvalidArgument);
        }
        log::info!("[exec] starting with {} threads", self.registry.count());
        self.schedule();
        Ok(())
    }

    /// Whether [`Executive::start`] has run
    pub fn is_started(&self) -> bool {
        self.active.is_some()
    }

    /// Configuration
    pub fn config(&self) -> &ExecConfig {
        &self.config
    }

    /// Scheduler metrics
    pub fn metrics(&self) -> &SchedulerMetrics {
        self.engine.metrics()
    }

    /// Register a context-switch hook
    pub fn add_switch_hook(&mut self, hook: Box<dyn ContextSwitchHook>) {
        self.engine.add_hook(hook);
    }

    /// Identifier pool (shared with the device registry)
    pub fn ids(&mut self) -> &mut IdPool {
        &mut self.ids
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Currently running thread (none before start)
    pub fn active(&self) -> Option<ThreadHandle> {
        self.active
    }

    /// The idle thread
    pub fn idle_thread(&self) -> ThreadHandle {
        self.idle
    }

    /// Borrow a thread descriptor
    pub fn thread(&self, thread: ThreadHandle) -> ExecResult<&Thread> {
        self.registry.get(thread)
    }

    /// Current state of a thread
    pub fn state(&self, thread: ThreadHandle) -> ExecResult<ThreadState> {
        self.registry.get(thread).map(Thread::state)
    }

    /// Registered and not yet PASSIVE
    pub fn is_alive(&self, thread: ThreadHandle) -> bool {
        self.registry
            .get(thread)
            .map(|t| t.state != ThreadState::Passive)
            .unwrap_or(false)
    }

    /// SUSPENDED (defaults to the active thread)
    pub fn is_suspended(&self, thread: Option<ThreadHandle>) -> bool {
        self.lookup(thread)
            .map(|t| t.state == ThreadState::Suspended)
            .unwrap_or(false)
    }

    /// Thread identifier (defaults to the active thread)
    pub fn get_id(&self, thread: Option<ThreadHandle>) -> ExecResult<ThreadId> {
        self.lookup(thread).map(Thread::id)
    }

    /// Scheduling priority (defaults to the active thread)
    pub fn get_priority(&self, thread: Option<ThreadHandle>) -> ExecResult<Priority> {
        self.lookup(thread).map(Thread::priority)
    }

    /// Scheduling policy (defaults to the active thread)
    pub fn get_policy(&self, thread: Option<ThreadHandle>) -> ExecResult<SchedulingPolicy> {
        self.lookup(thread).map(Thread::policy)
    }

    /// Number of registered descriptors, PASSIVE ones included
    pub fn thread_count(&self) -> usize {
        self.registry.count()
    }

    /// Number of threads in the ready structure
    pub fn ready_count(&self) -> usize {
        self.ready.len()
    }

    /// Iterate over all descriptors
    pub fn threads(&self) -> impl Iterator<Item = (ThreadHandle, &Thread)> {
        self.registry.iter()
    }

    /// Look a thread up by identifier
    pub fn find_by_id(&self, id: ThreadId) -> Option<ThreadHandle> {
        self.registry.find_by_id(id)
    }

    // =========================================================================
    // Per-thread slots
    // =========================================================================

    /// Private parameter slot
    pub fn private_param(&self, thread: Option<ThreadHandle>) -> ExecResult<Option<usize>> {
        self.lookup(thread).map(Thread::private_param)
    }

    /// Set the private parameter slot
    pub fn set_private_param(&mut self, thread: Option<ThreadHandle>, value: usize) -> ExecResult<()> {
        self.lookup_mut(thread)?.private_param = Some(value);
        Ok(())
    }

    /// Read and clear the private parameter slot
    pub fn take_private_param(&mut self, thread: Option<ThreadHandle>) -> ExecResult<Option<usize>> {
        Ok(self.lookup_mut(thread)?.private_param.take())
    }

    /// Error code slot
    pub fn errno(&self, thread: Option<ThreadHandle>) -> ExecResult<i32> {
        self.lookup(thread).map(Thread::errno)
    }

    /// Set the error code slot
    pub fn set_errno(&mut self, thread: Option<ThreadHandle>, errno: i32) -> ExecResult<()> {
        self.lookup_mut(thread)?.errno = errno;
        Ok(())
    }

    /// Syscall return-value slot
    pub fn retval(&self, thread: Option<ThreadHandle>) -> ExecResult<isize> {
        self.lookup(thread).map(Thread::retval)
    }

    /// Set the syscall return-value slot
    pub fn set_retval(&mut self, thread: Option<ThreadHandle>, retval: isize) -> ExecResult<()> {
        self.lookup_mut(thread)?.retval = retval;
        Ok(())
    }

    /// Store the outcome of a call on the active thread and pass it through.
    ///
    /// A failure sets errno and a return value of -1; success sets the
    /// return value to 0 and leaves errno alone.
    pub fn record<T, E: ErrorNumber>(&mut self, result: Result<T, E>) -> Result<T, E> {
        if let Some(thread) = self.active.and_then(|h| self.registry.get_mut(h).ok()) {
            match &result {
                Ok(_) => thread.retval = 0,
                Err(error) => {
                    thread.errno = error.errno();
                    thread.retval = -1;
                }
            }
        }
        result
    }

    /// Log every thread descriptor
    pub fn dump(&self) {
        log::info!("[exec] threads ({}):", self.registry.count());
        for (handle, thread) in self.registry.iter() {
            let marker = if Some(handle) == self.active { "*" } else { " " };
            log::info!(
                "{} {:?} id={} name={:?} prio={} state={:?} refs={} exit={:?}",
                marker,
                handle,
                thread.id.as_u32(),
                thread.name,
                thread.priority.as_u8(),
                thread.state,
                thread.ref_count,
                thread.exit_status
            );
        }
    }

    // =========================================================================
    // Internal helpers
    // =========================================================================

    /// Resolve an optional handle, defaulting to the active thread
    pub(crate) fn resolve(&self, thread: Option<ThreadHandle>) -> ExecResult<ThreadHandle> {
        match thread {
            Some(handle) if self.registry.contains(handle) => Ok(handle),
            Some(_) => Err(ExecError::NoSuchEntity),
            None => self.active.ok_or(ExecError::InvalidArgument),
        }
    }

    fn lookup(&self, thread: Option<ThreadHandle>) -> ExecResult<&Thread> {
        self.registry.get(self.resolve(thread)?)
    }

    fn lookup_mut(&mut self, thread: Option<ThreadHandle>) -> ExecResult<&mut Thread> {
        let handle = self.resolve(thread)?;
        self.registry.get_mut(handle)
    }

    /// Descriptor that the bookkeeping says must exist
    pub(crate) fn expect_thread(&mut self, thread: ThreadHandle) -> &mut Thread {
        match self.registry.get_mut(thread) {
            Ok(t) => t,
            Err(_) => kernel_fault!("thread {:?} missing from the registry", thread),
        }
    }

    /// Put a thread at the tail of its ready level
    pub(crate) fn make_ready(&mut self, thread: ThreadHandle) {
        let t = self.expect_thread(thread);
        t.state = ThreadState::Ready;
        t.queue = None;
        let priority = t.priority;
        self.ready.enqueue(thread, priority);
    }

    /// Pull a READY thread out of the ready structure
    pub(crate) fn unready(&mut self, thread: ThreadHandle) {
        if !self.ready.remove(thread) {
            kernel_fault!("READY thread {:?} not in the ready structure", thread);
        }
    }
}

impl Drop for Executive {
    fn drop(&mut self) {
        let memory = self.memory.as_mut();
        for (_, thread) in self.registry.iter_mut() {
            thread.stack.release(memory);
        }
        log::debug!("[exec] torn down ({} descriptors)", self.registry.count());
    }
}

impl fmt::Debug for Executive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Executive")
            .field("threads", &self.registry.count())
            .field("ready", &self.ready.len())
            .field("queues", &self.queues.len())
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_hal::arch_stubs::{HeapAllocator, StubContextSwitch};

    fn executive() -> Executive {
        Executive::new(
            ExecConfig::small(),
            Box::new(StubContextSwitch::new()),
            Box::new(HeapAllocator::new()),
        )
        .unwrap()
    }

    #[test]
    fn test_new_creates_idle_thread() {
        let exec = executive();
        let idle = exec.idle_thread();
        let thread = exec.thread(idle).unwrap();

        assert!(thread.is_idle());
        assert!(thread.is_kernel());
        assert_eq!(thread.priority(), Priority::IDLE);
        assert_eq!(thread.state(), ThreadState::Ready);
        assert_eq!(exec.active(), None);
    }

    #[test]
    fn test_start_dispatches_idle() {
        let mut exec = executive();
        exec.start().unwrap();
        assert_eq!(exec.active(), Some(exec.idle_thread()));
        assert_eq!(exec.state(exec.idle_thread()), Ok(ThreadState::Active));
        assert_eq!(exec.start(), Err(ExecError::InvalidArgument));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = ExecConfig::small();
        config.priority_levels = 0;
        let result = Executive::new(
            config,
            Box::new(StubContextSwitch::new()),
            Box::new(HeapAllocator::new()),
        );
        assert_eq!(result.err(), Some(ExecError::InvalidArgument));
    }

    #[test]
    fn test_record_sets_errno_on_active_thread() {
        let mut exec = executive();
        exec.start().unwrap();

        let result: ExecResult<()> = exec.record(Err(ExecError::NoSuchEntity));
        assert_eq!(result, Err(ExecError::NoSuchEntity));
        assert_eq!(exec.errno(None), Ok(crate::errno::ESRCH));
        assert_eq!(exec.retval(None), Ok(-1));

        let _ = exec.record(Ok::<_, ExecError>(()));
        assert_eq!(exec.retval(None), Ok(0));
        assert_eq!(exec.errno(None), Ok(crate::errno::ESRCH));
    }

    #[test]
    fn test_slot_accessors() {
        let mut exec = executive();
        assert_eq!(exec.set_private_param(None, 1), Err(ExecError::InvalidArgument));

        let idle = Some(exec.idle_thread());
        exec.set_private_param(idle, 99).unwrap();
        assert_eq!(exec.private_param(idle), Ok(Some(99)));
        assert_eq!(exec.take_private_param(idle), Ok(Some(99)));
        assert_eq!(exec.private_param(idle), Ok(None));

        exec.set_errno(idle, 5).unwrap();
        exec.set_retval(idle, 12).unwrap();
        assert_eq!(exec.errno(idle), Ok(5));
        assert_eq!(exec.retval(idle), Ok(12));
    }
}
