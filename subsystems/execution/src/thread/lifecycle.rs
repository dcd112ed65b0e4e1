//! # Thread Lifecycle
//!
//! Creation, suspension, exit, join and collection.

use super::{CancelHook, Thread, ThreadBuilder, ThreadFlags, ThreadHandle, ThreadStack, ThreadState};
use crate::scheduler::Priority;
use crate::wait::WaitQueue;
use crate::{ExecError, ExecResult, Executive, ExitStatus, ThreadId};
use alloc::string::String;

impl Executive {
    /// Create a thread and append it to the ready structure.
    ///
    /// The thread does not run until the dispatcher picks it.
    pub fn create(&mut self, builder: ThreadBuilder) -> ExecResult<ThreadHandle> {
        let flags = builder.flags & ThreadFlags::CREATE_MASK;
        self.spawn(builder, flags)
    }

    pub(crate) fn spawn(&mut self, builder: ThreadBuilder, flags: ThreadFlags) -> ExecResult<ThreadHandle> {
        if !builder.policy.is_supported() {
            return Err(ExecError::NotSupported);
        }
        let priority = match builder.priority {
            Some(raw) => Priority::clamped(raw, self.config.priority_levels),
            None => Priority::new(self.config.default_priority),
        };

        self.registry.reserve()?;
        self.engine.reserve_reclaim(self.registry.count() + 1)?;
        let id = ThreadId::new(self.ids.allocate()?);

        let mut stack = match self.provision_stack(&builder) {
            Ok(stack) => stack,
            Err(error) => {
                self.release_id(id);
                return Err(error);
            }
        };

        let join_queue = match self.queues.insert(WaitQueue::new()) {
            Ok(queue) => queue,
            Err(error) => {
                stack.release(self.memory.as_mut());
                self.release_id(id);
                return Err(error);
            }
        };

        let context = self.engine.create_context(
            builder.entry,
            builder.arg,
            self.config.exit_trampoline,
            stack.top().align_down(self.config.stack_alignment as u64),
        );
        let name = builder.name.unwrap_or_else(String::new);
        let thread = Thread::new(id, name, context, stack, priority, builder.policy, flags, join_queue);

        let Ok(handle) = self.registry.register(thread) else {
            kernel_fault!("registry slot reserved for thread {} was lost", id.as_u32());
        };
        match self.queues.get_mut(join_queue) {
            Some(queue) => queue.make_join_queue(handle),
            None => kernel_fault!("join queue of thread {} was lost", id.as_u32()),
        }

        self.make_ready(handle);
        self.engine.metrics().record_create();
        log::debug!(
            "[thread] created {} ({:?}) prio={} flags={:?}",
            id.as_u32(),
            handle,
            priority.as_u8(),
            flags
        );
        Ok(handle)
    }

    fn provision_stack(&mut self, builder: &ThreadBuilder) -> ExecResult<ThreadStack> {
        match builder.stack {
            Some((base, size)) => ThreadStack::caller_supplied(base, size),
            None => {
                let size = builder.stack_size.unwrap_or(self.config.default_stack_size);
                if size < self.config.stack_alignment {
                    return Err(ExecError::InvalidArgument);
                }
                ThreadStack::allocate(self.memory.as_mut(), size, self.config.stack_alignment)
            }
        }
    }

    fn release_id(&mut self, id: ThreadId) {
        if self.ids.release(id.as_u32()).is_err() {
            kernel_fault!("thread id {} released twice", id.as_u32());
        }
    }

    /// Suspend a thread (defaults to the active thread).
    ///
    /// Only ACTIVE and READY threads can be suspended. This does not
    /// reschedule; suspending the active thread must be followed by
    /// [`Executive::schedule`].
    pub fn suspend(&mut self, thread: Option<ThreadHandle>, hook: Option<CancelHook>) -> ExecResult<()> {
        let handle = self.resolve(thread)?;
        let t = self.registry.get(handle)?;
        let (idle, state) = (t.is_idle(), t.state);
        if idle {
            return Err(ExecError::InvalidArgument);
        }

        match state {
            ThreadState::Active => {}
            ThreadState::Ready => self.unready(handle),
            _ => return Err(ExecError::InvalidArgument),
        }

        let t = self.expect_thread(handle);
        t.state = ThreadState::Suspended;
        t.cancel_hook = hook;
        log::trace!("[thread] suspended {:?}", handle);
        Ok(())
    }

    /// Return a SUSPENDED thread to the ready structure. Its cancellation
    /// hook is dropped without running.
    pub fn resume(&mut self, thread: ThreadHandle) -> ExecResult<()> {
        let t = self.registry.get_mut(thread)?;
        if t.state != ThreadState::Suspended {
            return Err(ExecError::InvalidArgument);
        }
        t.cancel_hook = None;
        self.make_ready(thread);
        log::trace!("[thread] resumed {:?}", thread);
        Ok(())
    }

    /// Terminate a thread (defaults to the active thread).
    ///
    /// Idempotent on PASSIVE threads. Joiners receive `status` in their
    /// private-parameter slot and become READY in arrival order. The stack
    /// is released at the next switch, never here. When the active thread
    /// exits itself the dispatcher runs; on hardware that call does not
    /// return.
    pub fn exit(&mut self, thread: Option<ThreadHandle>, status: ExitStatus) -> ExecResult<()> {
        let handle = self.resolve(thread)?;
        let is_self = self.active == Some(handle);

        let t = self.registry.get(handle)?;
        let (state, queue) = (t.state, t.queue);
        if state == ThreadState::Passive {
            return Ok(());
        }
        if t.is_idle() {
            return Err(ExecError::InvalidArgument);
        }

        match state {
            ThreadState::Ready => self.unready(handle),
            ThreadState::Wait => {
                let Some(queue) = queue else {
                    kernel_fault!("WAIT thread {:?} has no recorded queue", handle);
                };
                // A joiner torn out of a join queue gives back its reference
                if let Some(owner) = self.unlink_waiter(handle, queue) {
                    self.release_reference(owner);
                }
            }
            ThreadState::Suspended => {
                if let Some(hook) = self.expect_thread(handle).cancel_hook.take() {
                    log::trace!("[thread] cancelling suspended {:?}", handle);
                    hook.fire(handle);
                }
            }
            ThreadState::Active if !is_self => return Err(ExecError::NoSuchEntity),
            ThreadState::Active | ThreadState::Passive => {}
        }

        let t = self.expect_thread(handle);
        t.state = ThreadState::Passive;
        t.exit_status = Some(status);
        t.cancel_hook = None;
        t.flags.insert(ThreadFlags::PENDING_DELETE);
        let (id, join_queue) = (t.id, t.join_queue);
        self.engine.defer_reclaim(handle);

        let mut joiners = 0;
        while self.release_head(join_queue, Some(status)).is_some() {
            joiners += 1;
        }
        log::debug!("[thread] {} exited with {:#x}, {} joiner(s) released", id.as_u32(), status, joiners);

        if is_self {
            self.schedule();
        }
        Ok(())
    }

    /// Register `waiting` (defaults to the active thread) as a joiner of
    /// `waited`.
    ///
    /// Takes a reference on `waited`. Returns `true` when `waiting` was
    /// queued on the join queue and must block (schedule) before
    /// collecting, `false` when `waited` already exited.
    pub fn wait_for(&mut self, waiting: Option<ThreadHandle>, waited: ThreadHandle) -> ExecResult<bool> {
        let waiting = self.resolve(waiting)?;
        if waiting == waited {
            return Err(ExecError::InvalidArgument);
        }

        let target = self.registry.get(waited)?;
        let (passive, join_queue) = (target.state == ThreadState::Passive, target.join_queue);

        if !passive {
            // Queue first so a rejected joiner leaves no reference behind
            self.enqueue(Some(waiting), join_queue)?;
        }
        self.expect_thread(waited).ref_count += 1;

        log::trace!("[thread] {:?} joins {:?}", waiting, waited);
        Ok(!passive)
    }

    /// Read a PASSIVE thread's exit status and drop one joiner reference.
    ///
    /// The descriptor is destroyed, and its identifier released, when the
    /// last reference goes.
    pub fn collect(&mut self, waited: ThreadHandle) -> ExecResult<ExitStatus> {
        let t = self.registry.get(waited)?;
        if t.state != ThreadState::Passive {
            return Err(ExecError::InvalidArgument);
        }
        let self_ref = u32::from(t.flags.contains(ThreadFlags::PENDING_DELETE));
        if t.ref_count <= self_ref {
            // Nobody joined; the remaining reference belongs to the reclaim step
            return Err(ExecError::InvalidArgument);
        }
        let Some(status) = t.exit_status else {
            kernel_fault!("PASSIVE thread {:?} has no exit status", waited);
        };

        self.release_reference(waited);
        Ok(status)
    }

    /// Drop one reference; destroy the descriptor at zero
    pub(crate) fn release_reference(&mut self, thread: ThreadHandle) {
        let t = self.expect_thread(thread);
        if t.ref_count == 0 {
            kernel_fault!("thread {:?} reference count underflow", thread);
        }
        t.ref_count -= 1;
        if t.ref_count == 0 {
            self.remove_descriptor(thread);
        }
    }

    fn remove_descriptor(&mut self, thread: ThreadHandle) {
        let Ok(mut t) = self.registry.unregister(thread) else {
            kernel_fault!("thread {:?} destroyed twice", thread);
        };
        if t.state != ThreadState::Passive {
            kernel_fault!("destroying thread {:?} in state {:?}", thread, t.state);
        }

        match self.queues.remove(t.join_queue) {
            Some(queue) if queue.is_empty() => {}
            _ => kernel_fault!("join queue of {:?} missing or still occupied", thread),
        }
        t.stack.release(self.memory.as_mut());
        self.release_id(t.id);
        self.engine.metrics().record_destroy();

        log::debug!("[thread] destroyed {} ({:?})", t.id.as_u32(), thread);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ExecConfig;
    use alloc::boxed::Box;
    use alloc::sync::Arc;
    use core::sync::atomic::{AtomicUsize, Ordering};
    use quill_hal::arch_stubs::{HeapAllocator, StubContextSwitch};
    use quill_hal::VirtAddr;

    fn entry(_arg: usize) {}

    fn started() -> Executive {
        let mut exec = Executive::new(
            ExecConfig::small(),
            Box::new(StubContextSwitch::new()),
            Box::new(HeapAllocator::new()),
        )
        .unwrap();
        exec.start().unwrap();
        exec
    }

    #[test]
    fn test_create_assigns_fresh_ids() {
        let mut exec = started();
        let a = exec.create(ThreadBuilder::new(entry).name("a")).unwrap();
        let b = exec.create(ThreadBuilder::new(entry).name("b")).unwrap();

        let (ida, idb) = (exec.get_id(Some(a)).unwrap(), exec.get_id(Some(b)).unwrap());
        assert_ne!(ida, idb);
        assert_eq!(exec.find_by_id(idb), Some(b));
        assert_eq!(exec.thread(a).unwrap().name(), "a");
        assert_eq!(exec.thread(a).unwrap().ref_count(), 1);
        assert_eq!(exec.get_priority(Some(a)), Ok(Priority::new(ExecConfig::small().default_priority)));
    }

    #[test]
    fn test_create_rejects_unsupported_policy() {
        let mut exec = started();
        let builder = ThreadBuilder::new(entry).policy(crate::SchedulingPolicy::RoundRobin);
        assert_eq!(exec.create(builder).err(), Some(ExecError::NotSupported));
    }

    #[test]
    fn test_create_strips_internal_flags() {
        let mut exec = started();
        let a = exec
            .create(ThreadBuilder::new(entry).flags(ThreadFlags::IDLE | ThreadFlags::KERNEL))
            .unwrap();
        assert_eq!(exec.thread(a).unwrap().flags(), ThreadFlags::KERNEL);
    }

    #[test]
    fn test_caller_supplied_stack_context() {
        let mut exec = started();
        let a = exec
            .create(ThreadBuilder::new(entry).arg(11).stack(VirtAddr::new(0x10_0000), 0x1000))
            .unwrap();
        let t = exec.thread(a).unwrap();
        assert!(!t.stack().is_owned());
        assert_eq!(t.context().sp, 0x10_1000);
        assert_eq!(t.context().argument(), 11);
    }

    #[test]
    fn test_suspend_and_resume() {
        let mut exec = started();
        let a = exec.create(ThreadBuilder::new(entry)).unwrap();

        exec.suspend(Some(a), None).unwrap();
        assert!(exec.is_suspended(Some(a)));
        assert_eq!(exec.ready_count(), 0);
        assert_eq!(exec.suspend(Some(a), None), Err(ExecError::InvalidArgument));

        exec.resume(a).unwrap();
        assert_eq!(exec.state(a), Ok(ThreadState::Ready));
        assert_eq!(exec.resume(a), Err(ExecError::InvalidArgument));
    }

    #[test]
    fn test_resume_drops_hook_without_firing() {
        let mut exec = started();
        let fired = Arc::new(AtomicUsize::new(0));
        let a = exec.create(ThreadBuilder::new(entry)).unwrap();

        let counter = fired.clone();
        let hook = CancelHook::new(
            move |_, _| {
                counter.fetch_add(1, Ordering::SeqCst);
            },
            0,
        );
        exec.suspend(Some(a), Some(hook)).unwrap();
        exec.resume(a).unwrap();
        exec.exit(Some(a), 0).unwrap();

        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_idle_thread_is_protected() {
        let mut exec = started();
        let idle = exec.idle_thread();
        assert_eq!(exec.exit(Some(idle), 0), Err(ExecError::InvalidArgument));
        assert_eq!(exec.suspend(Some(idle), None), Err(ExecError::InvalidArgument));
        assert_eq!(exec.set_priority(Some(idle), 3), Err(ExecError::InvalidArgument));
    }

    #[test]
    fn test_wait_for_rejects_self_and_stale() {
        let mut exec = started();
        let a = exec.create(ThreadBuilder::new(entry)).unwrap();
        assert_eq!(exec.wait_for(Some(a), a), Err(ExecError::InvalidArgument));

        exec.exit(Some(a), 0).unwrap();
        exec.yield_now().unwrap();
        assert_eq!(exec.thread_count(), 1);
        assert_eq!(exec.wait_for(None, a), Err(ExecError::NoSuchEntity));
    }

    #[test]
    fn test_collect_requires_join() {
        let mut exec = started();
        let a = exec.create(ThreadBuilder::new(entry)).unwrap();
        assert_eq!(exec.collect(a), Err(ExecError::InvalidArgument));

        exec.exit(Some(a), 3).unwrap();
        // Exited but not reclaimed and nobody joined
        assert_eq!(exec.collect(a), Err(ExecError::InvalidArgument));
    }

    #[test]
    fn test_join_already_exited_thread() {
        let mut exec = started();
        let a = exec.create(ThreadBuilder::new(entry).priority(4)).unwrap();
        let b = exec.create(ThreadBuilder::new(entry).priority(4)).unwrap();

        exec.exit(Some(a), 0xbeef).unwrap();
        assert_eq!(exec.wait_for(Some(b), a), Ok(false));
        assert_eq!(exec.state(b), Ok(ThreadState::Ready));
        assert_eq!(exec.collect(a), Ok(0xbeef));

        // The reclaim step still holds the last reference
        assert!(exec.thread(a).is_ok());
        exec.schedule();
        assert_eq!(exec.thread(a).err(), Some(ExecError::NoSuchEntity));
    }
}
