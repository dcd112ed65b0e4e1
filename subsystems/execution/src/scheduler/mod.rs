//! # Scheduler
//!
//! Priority-then-FIFO dispatch over the ready structure. Scheduling is
//! cooperative: the dispatcher only runs when a thread calls it, directly
//! or through `exit`, `yield_now` and `set_priority`.

pub mod metrics;
pub mod priority;
pub mod queue;
pub mod traits;

pub use metrics::SchedulerMetrics;
pub use priority::*;
pub use queue::{FifoQueue, MultilevelQueue};
pub use traits::*;

use crate::context::SwitchReason;
use crate::thread::{ThreadHandle, ThreadState};
use crate::{ExecError, ExecResult, Executive};

impl Executive {
    /// Dispatcher
    ///
    /// An ACTIVE thread keeps the CPU unless the ready structure holds a
    /// strictly more urgent thread, in which case it goes back to the head
    /// of its level. Otherwise the head of the highest non-empty level is
    /// dispatched.
    ///
    /// Every pass ends with the reclaim step, whether or not control moved.
    pub fn schedule(&mut self) {
        let current = self.active;

        let reason = match current {
            None => SwitchReason::Boot,
            Some(handle) => {
                let t = self.expect_thread(handle);
                let (state, priority) = (t.state, t.priority);
                match state {
                    ThreadState::Active => match self.ready.peek_priority() {
                        Some(head) if head > priority => {
                            self.expect_thread(handle).state = ThreadState::Ready;
                            self.ready.enqueue_front(handle, priority);
                            self.engine.metrics().record_preemption();
                            SwitchReason::Preempt
                        }
                        _ => {
                            self.finish_switch();
                            return;
                        }
                    },
                    ThreadState::Ready => SwitchReason::Yield,
                    ThreadState::Wait | ThreadState::Suspended => SwitchReason::Blocked,
                    ThreadState::Passive => SwitchReason::Exit,
                }
            }
        };

        let Some(next) = self.ready.dequeue() else {
            kernel_fault!("ready structure empty at dispatch");
        };

        let t = self.expect_thread(next);
        t.state = ThreadState::Active;
        t.queue = None;

        if current == Some(next) {
            log::trace!("[sched] {:?} keeps the CPU", next);
            self.finish_switch();
            return;
        }

        log::trace!("[sched] dispatch {:?} -> {:?} ({:?})", current, next, reason);
        self.switch_to(current, next, reason);
    }

    /// Give up the CPU to the next thread of equal or higher priority
    pub fn yield_now(&mut self) -> ExecResult<()> {
        let handle = self.active.ok_or(ExecError::InvalidArgument)?;
        self.make_ready(handle);
        self.engine.metrics().record_yield();
        self.schedule();
        Ok(())
    }

    /// Change a thread's priority (defaults to the active thread).
    ///
    /// ACTIVE and READY threads are re-leveled at the tail of their new
    /// level and the dispatcher runs. Other states only store the value;
    /// wait queues stay FIFO. Returns the old priority.
    pub fn set_priority(&mut self, thread: Option<ThreadHandle>, priority: i32) -> ExecResult<Priority> {
        let handle = self.resolve(thread)?;
        let new = Priority::clamped(priority, self.config.priority_levels);

        let t = self.registry.get_mut(handle)?;
        if t.is_idle() {
            return Err(ExecError::InvalidArgument);
        }
        let old = t.priority;
        let state = t.state;
        t.priority = new;

        log::debug!("[sched] {:?} priority {} -> {}", handle, old.as_u8(), new.as_u8());

        match state {
            ThreadState::Active => {
                self.make_ready(handle);
                self.schedule();
            }
            ThreadState::Ready => {
                self.unready(handle);
                self.make_ready(handle);
                self.schedule();
            }
            ThreadState::Wait | ThreadState::Suspended | ThreadState::Passive => {}
        }

        Ok(old)
    }

    /// Change policy and priority together.
    ///
    /// Only FIFO is implemented. The priority is validated rather than
    /// clamped; 0 keeps the current priority.
    pub fn set_sched_param(
        &mut self,
        thread: ThreadHandle,
        policy: SchedulingPolicy,
        priority: i32,
    ) -> ExecResult<()> {
        if !self.is_alive(thread) {
            return Err(ExecError::NoSuchEntity);
        }
        if !policy.is_supported() {
            return Err(ExecError::NotSupported);
        }

        let current = self.registry.get(thread)?.priority;
        let requested = match priority {
            0 => current,
            raw => Priority::checked(raw, self.config.priority_levels)?,
        };

        if requested != current {
            self.set_priority(Some(thread), requested.as_u8() as i32)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ExecConfig, ThreadBuilder};
    use alloc::boxed::Box;
    use quill_hal::arch_stubs::{HeapAllocator, StubContextSwitch};

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
    fn test_higher_priority_ready_thread_preempts() {
        let mut exec = started();
        let idle = exec.idle_thread();
        let a = exec.create(ThreadBuilder::new(entry).priority(5)).unwrap();

        exec.schedule();
        assert_eq!(exec.active(), Some(a));
        assert_eq!(exec.state(idle), Ok(ThreadState::Ready));
        assert_eq!(exec.metrics().preemptions(), 1);
    }

    #[test]
    fn test_equal_priority_does_not_preempt() {
        let mut exec = started();
        let a = exec.create(ThreadBuilder::new(entry).priority(5)).unwrap();
        exec.schedule();
        let b = exec.create(ThreadBuilder::new(entry).priority(5)).unwrap();

        exec.schedule();
        assert_eq!(exec.active(), Some(a));
        assert_eq!(exec.state(b), Ok(ThreadState::Ready));
    }

    #[test]
    fn test_yield_rotates_within_level() {
        let mut exec = started();
        let a = exec.create(ThreadBuilder::new(entry).priority(5)).unwrap();
        let b = exec.create(ThreadBuilder::new(entry).priority(5)).unwrap();
        exec.schedule();
        assert_eq!(exec.active(), Some(a));

        exec.yield_now().unwrap();
        assert_eq!(exec.active(), Some(b));
        assert_eq!(exec.state(a), Ok(ThreadState::Ready));

        exec.yield_now().unwrap();
        assert_eq!(exec.active(), Some(a));
        assert_eq!(exec.metrics().voluntary_yields(), 2);
    }

    #[test]
    fn test_yield_alone_keeps_cpu() {
        let mut exec = started();
        let a = exec.create(ThreadBuilder::new(entry).priority(5)).unwrap();
        exec.schedule();
        let switches = exec.metrics().context_switches();

        exec.yield_now().unwrap();
        assert_eq!(exec.active(), Some(a));
        assert_eq!(exec.metrics().context_switches(), switches);
    }

    #[test]
    fn test_set_priority_relevels_ready_thread() {
        let mut exec = started();
        let a = exec.create(ThreadBuilder::new(entry).priority(2)).unwrap();
        let b = exec.create(ThreadBuilder::new(entry).priority(4)).unwrap();

        // Raising a above b and above the running idle thread dispatches it
        let old = exec.set_priority(Some(a), 9).unwrap();
        assert_eq!(old, Priority::new(2));
        assert_eq!(exec.active(), Some(a));

        // Dropping the active thread below b hands the CPU over
        exec.set_priority(None, 1).unwrap();
        assert_eq!(exec.active(), Some(b));
        assert_eq!(exec.get_priority(Some(a)), Ok(Priority::new(1)));
    }

    #[test]
    fn test_set_priority_in_place_for_blocked_threads() {
        let mut exec = started();
        let q = exec.create_queue().unwrap();
        let a = exec.create(ThreadBuilder::new(entry).priority(2)).unwrap();
        exec.enqueue(Some(a), q).unwrap();

        exec.set_priority(Some(a), 12).unwrap();
        assert_eq!(exec.state(a), Ok(ThreadState::Wait));
        assert_eq!(exec.get_priority(Some(a)), Ok(Priority::new(12)));
        assert_eq!(exec.active(), Some(exec.idle_thread()));

        // Clamped into the level range
        exec.set_priority(Some(a), 1000).unwrap();
        assert_eq!(exec.get_priority(Some(a)), Ok(Priority::new(15)));
    }

    #[test]
    fn test_set_sched_param() {
        let mut exec = started();
        let a = exec.create(ThreadBuilder::new(entry).priority(3)).unwrap();

        assert_eq!(
            exec.set_sched_param(a, SchedulingPolicy::RoundRobin, 3),
            Err(ExecError::NotSupported)
        );
        assert_eq!(
            exec.set_sched_param(a, SchedulingPolicy::Fifo, 99),
            Err(ExecError::InvalidArgument)
        );

        exec.set_sched_param(a, SchedulingPolicy::Fifo, 0).unwrap();
        assert_eq!(exec.get_priority(Some(a)), Ok(Priority::new(3)));

        exec.set_sched_param(a, SchedulingPolicy::Fifo, 6).unwrap();
        assert_eq!(exec.get_priority(Some(a)), Ok(Priority::new(6)));
        assert_eq!(exec.active(), Some(a));

        exec.exit(Some(a), 0).unwrap();
        assert_eq!(
            exec.set_sched_param(a, SchedulingPolicy::Fifo, 4),
            Err(ExecError::NoSuchEntity)
        );
    }
}
