//! # Context Switching
//!
//! The boundary with the architecture's switch primitive, and the
//! switch-then-free protocol for exited threads.
//!
//! `exit` never frees the exiting thread's stack: the thread may still be
//! running on it. Instead the descriptor is flagged
//! [`ThreadFlags::PENDING_DELETE`] and queued here. At the end of the next
//! dispatch pass, right after any switch has landed on the incoming thread,
//! [`Executive::finish_switch`] frees the queued stacks and drops each
//! thread's self-reference.
//!
//! A freshly created context enters its entry point directly rather than
//! returning through [`Executive::switch_to`], so an architecture port must
//! run the post-switch step before the first instruction of a new thread.

use crate::scheduler::SchedulerMetrics;
use crate::thread::{ThreadFlags, ThreadHandle};
use crate::{ExecError, ExecResult, Executive, ThreadId};
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;
use core::ptr::NonNull;
use quill_hal::{ContextSwitch, EntryPoint, ThreadContext, VirtAddr};

/// Context switch reason
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchReason {
    /// First dispatch; there is no outgoing context
    Boot,
    /// Outgoing thread gave up the CPU but stays READY
    Yield,
    /// Outgoing thread is waiting or suspended
    Blocked,
    /// Outgoing thread exited
    Exit,
    /// A higher-priority thread became ready
    Preempt,
}

/// Context switch hook
pub trait ContextSwitchHook: Send {
    /// Called before context switch
    fn pre_switch(&self, from: Option<ThreadId>, to: ThreadId, reason: SwitchReason);

    /// Called after context switch
    fn post_switch(&self, from: Option<ThreadId>, to: ThreadId, reason: SwitchReason);
}

/// Context switch engine
pub struct ContextSwitchEngine {
    /// Architecture primitive
    arch: Box<dyn ContextSwitch>,
    /// Hooks
    hooks: Vec<Box<dyn ContextSwitchHook>>,
    /// Exited threads waiting for the next switch
    reclaim: Vec<ThreadHandle>,
    metrics: SchedulerMetrics,
}

impl ContextSwitchEngine {
    /// Create a new context switch engine
    pub fn new(arch: Box<dyn ContextSwitch>) -> Self {
        Self {
            arch,
            hooks: Vec::new(),
            reclaim: Vec::new(),
            metrics: SchedulerMetrics::new(),
        }
    }

    /// Add a hook
    pub fn add_hook(&mut self, hook: Box<dyn ContextSwitchHook>) {
        self.hooks.push(hook);
    }

    /// Scheduler metrics
    pub fn metrics(&self) -> &SchedulerMetrics {
        &self.metrics
    }

    /// Exited threads not yet reclaimed
    pub fn pending_reclaim(&self) -> usize {
        self.reclaim.len()
    }

    /// Build the initial context for a new thread
    pub fn create_context(
        &self,
        entry: EntryPoint,
        arg: usize,
        exit: EntryPoint,
        stack_top: VirtAddr,
    ) -> ThreadContext {
        self.arch.create_context(entry, arg, exit, stack_top)
    }

    /// Make room for `threads` deferred threads so exit never allocates
    pub(crate) fn reserve_reclaim(&mut self, threads: usize) -> ExecResult<()> {
        let additional = threads.saturating_sub(self.reclaim.len());
        self.reclaim
            .try_reserve(additional)
            .map_err(|_| ExecError::OutOfResources)
    }

    pub(crate) fn defer_reclaim(&mut self, thread: ThreadHandle) {
        self.reclaim.push(thread);
    }

    /// Next queued thread other than the one now running
    pub(crate) fn next_reclaim(&mut self, running: Option<ThreadHandle>) -> Option<ThreadHandle> {
        let index = self.reclaim.iter().position(|&t| Some(t) != running)?;
        Some(self.reclaim.swap_remove(index))
    }

    /// Perform a context switch
    ///
    /// # Safety
    /// Both context pointers must be valid for the whole call, and `to`
    /// must hold a context built by [`ContextSwitchEngine::create_context`]
    /// or saved by an earlier switch.
    pub unsafe fn switch(
        &mut self,
        from: Option<(ThreadId, NonNull<ThreadContext>)>,
        to: (ThreadId, NonNull<ThreadContext>),
        reason: SwitchReason,
    ) {
        let from_id = from.map(|(id, _)| id);

        for hook in &self.hooks {
            hook.pre_switch(from_id, to.0, reason);
        }

        self.metrics.record_context_switch();
        log::trace!("[switch] {:?} -> {:?} ({:?})", from_id, to.0, reason);

        // SAFETY: forwarded from the caller
        unsafe { self.arch.switch(from.map(|(_, ctx)| ctx), to.1) };

        for hook in &self.hooks {
            hook.post_switch(from_id, to.0, reason);
        }
    }
}

impl fmt::Debug for ContextSwitchEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextSwitchEngine")
            .field("hooks", &self.hooks.len())
            .field("reclaim", &self.reclaim)
            .field("metrics", &self.metrics)
            .finish_non_exhaustive()
    }
}

impl Executive {
    /// Transfer control from `from` (none at boot) to `to`, then reclaim.
    ///
    /// `to` must already be marked ACTIVE.
    pub(crate) fn switch_to(&mut self, from: Option<ThreadHandle>, to: ThreadHandle, reason: SwitchReason) {
        self.active = Some(to);

        let outgoing = from.map(|handle| {
            let id = self.expect_thread(handle).id;
            match self.registry.context_ptr(handle) {
                Ok(ctx) => (id, ctx),
                Err(_) => kernel_fault!("outgoing thread {:?} vanished before the switch", handle),
            }
        });
        let to_id = self.expect_thread(to).id;
        let incoming = match self.registry.context_ptr(to) {
            Ok(ctx) => (to_id, ctx),
            Err(_) => kernel_fault!("incoming thread {:?} vanished before the switch", to),
        };

        // SAFETY: both pointers address live registry slots, and the
        // registry is not touched until the primitive returns
        unsafe { self.engine.switch(outgoing, incoming, reason) };

        self.finish_switch();
    }

    /// Post-switch step: release every pending-delete thread except the
    /// one now running.
    pub fn finish_switch(&mut self) {
        while let Some(thread) = self.engine.next_reclaim(self.active) {
            self.reclaim(thread);
        }
    }

    fn reclaim(&mut self, thread: ThreadHandle) {
        let Ok(t) = self.registry.get_mut(thread) else {
            kernel_fault!("thread {:?} queued for reclaim is not registered", thread);
        };
        if !t.flags.contains(ThreadFlags::PENDING_DELETE) {
            kernel_fault!("thread {:?} queued for reclaim without PENDING_DELETE", thread);
        }
        t.flags.remove(ThreadFlags::PENDING_DELETE);
        t.stack.release(self.memory.as_mut());

        self.engine.metrics().record_reclaim();
        log::trace!("[switch] reclaimed thread {}", t.id.as_u32());

        self.release_reference(thread);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::sync::Arc;
    use quill_hal::arch_stubs::StubContextSwitch;
    use spin::Mutex;

    struct Recorder(Arc<Mutex<Vec<(&'static str, Option<ThreadId>, ThreadId, SwitchReason)>>>);

    impl ContextSwitchHook for Recorder {
        fn pre_switch(&self, from: Option<ThreadId>, to: ThreadId, reason: SwitchReason) {
            self.0.lock().push(("pre", from, to, reason));
        }

        fn post_switch(&self, from: Option<ThreadId>, to: ThreadId, reason: SwitchReason) {
            self.0.lock().push(("post", from, to, reason));
        }
    }

    fn entry(_arg: usize) {}

    #[test]
    fn test_hooks_surround_the_switch() {
        let arch = StubContextSwitch::new();
        let probe = arch.probe();
        let mut engine = ContextSwitchEngine::new(Box::new(arch));
        let events = Arc::new(Mutex::new(Vec::new()));
        engine.add_hook(Box::new(Recorder(events.clone())));

        let mut ctx = engine.create_context(entry, 3, entry, VirtAddr::new(0x3000));
        let to = (ThreadId::new(1), NonNull::from(&mut ctx));
        unsafe { engine.switch(None, to, SwitchReason::Boot) };

        let events = events.lock();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], ("pre", None, ThreadId::new(1), SwitchReason::Boot));
        assert_eq!(events[1], ("post", None, ThreadId::new(1), SwitchReason::Boot));
        assert_eq!(probe.lock()[0].to_arg, 3);
        assert_eq!(engine.metrics().context_switches(), 1);
    }

    #[test]
    fn test_next_reclaim_skips_running_thread() {
        let mut engine = ContextSwitchEngine::new(Box::new(StubContextSwitch::new()));
        let a = ThreadHandle::from_raw(0, 0);
        let b = ThreadHandle::from_raw(1, 0);
        engine.reserve_reclaim(2).unwrap();
        engine.defer_reclaim(a);
        engine.defer_reclaim(b);

        assert_eq!(engine.next_reclaim(Some(a)), Some(b));
        assert_eq!(engine.next_reclaim(Some(a)), None);
        assert_eq!(engine.pending_reclaim(), 1);
        assert_eq!(engine.next_reclaim(None), Some(a));
    }
}
