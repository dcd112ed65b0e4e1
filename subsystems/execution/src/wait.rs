//! # Blocking Queues
//!
//! FIFO lists of waiting threads. A queue only references its threads;
//! the registry keeps owning them. Synchronization objects and every
//! thread's join queue are built on these.

use crate::scheduler::FifoQueue;
use crate::thread::{ThreadHandle, ThreadState};
use crate::{ExecError, ExecResult, Executive, Handle};
use alloc::vec::Vec;

/// Generation-checked reference to a blocking queue
pub type QueueHandle = Handle<WaitQueue>;

/// FIFO wait list
#[derive(Debug, Default)]
pub struct WaitQueue {
    waiters: FifoQueue,
    /// Thread whose join queue this is. Every waiter holds a reference on it.
    owner: Option<ThreadHandle>,
}

impl WaitQueue {
    /// Create an empty queue
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn make_join_queue(&mut self, owner: ThreadHandle) {
        self.owner = Some(owner);
    }

    /// Number of waiting threads
    pub fn len(&self) -> usize {
        self.waiters.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }

    /// Check membership
    pub fn contains(&self, thread: ThreadHandle) -> bool {
        self.waiters.contains(thread)
    }

    /// Whether this is some thread's join queue
    pub fn is_join_queue(&self) -> bool {
        self.owner.is_some()
    }

    /// Thread this join queue belongs to
    pub fn owner(&self) -> Option<ThreadHandle> {
        self.owner
    }

    /// Waiters, head first
    pub fn iter(&self) -> impl Iterator<Item = ThreadHandle> + '_ {
        self.waiters.iter()
    }
}

impl Executive {
    /// Create a blocking queue
    pub fn create_queue(&mut self) -> ExecResult<QueueHandle> {
        self.queues.insert(WaitQueue::new())
    }

    /// Destroy an empty blocking queue
    pub fn destroy_queue(&mut self, queue: QueueHandle) -> ExecResult<()> {
        let q = self.queues.get(queue).ok_or(ExecError::NoSuchEntity)?;
        if q.is_join_queue() || !q.is_empty() {
            return Err(ExecError::InvalidArgument);
        }
        self.queues.remove(queue);
        Ok(())
    }

    /// Number of threads waiting on a queue
    pub fn queue_len(&self, queue: QueueHandle) -> ExecResult<usize> {
        self.queues.get(queue).map(WaitQueue::len).ok_or(ExecError::NoSuchEntity)
    }

    /// Snapshot of a queue's waiters, head first
    pub fn waiters(&self, queue: QueueHandle) -> ExecResult<Vec<ThreadHandle>> {
        self.queues
            .get(queue)
            .map(|q| q.iter().collect())
            .ok_or(ExecError::NoSuchEntity)
    }

    /// Move a thread (defaults to the active thread) onto a queue's tail.
    ///
    /// The thread becomes WAIT. When it is the active thread the caller
    /// must follow up with [`Executive::schedule`].
    pub fn enqueue(&mut self, thread: Option<ThreadHandle>, queue: QueueHandle) -> ExecResult<()> {
        let handle = self.resolve(thread)?;
        if !self.queues.contains(queue) {
            return Err(ExecError::NoSuchEntity);
        }

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

        self.link_waiter(handle, queue);
        log::trace!("[wait] {:?} waits on {:?}", handle, queue);
        Ok(())
    }

    /// Release the head of a queue to the ready structure.
    ///
    /// Returns whether a thread was released.
    pub fn release_one(&mut self, queue: QueueHandle) -> ExecResult<bool> {
        if !self.queues.contains(queue) {
            return Err(ExecError::NoSuchEntity);
        }
        Ok(self.release_head(queue, None).is_some())
    }

    /// Release every waiter of a queue, in arrival order
    pub fn release_all(&mut self, queue: QueueHandle) -> ExecResult<usize> {
        if !self.queues.contains(queue) {
            return Err(ExecError::NoSuchEntity);
        }
        let mut released = 0;
        while self.release_head(queue, None).is_some() {
            released += 1;
        }
        Ok(released)
    }

    /// Pop the head of a queue, hand it `param` and make it READY
    pub(crate) fn release_head(&mut self, queue: QueueHandle, param: Option<usize>) -> Option<ThreadHandle> {
        let thread = self.queues.get_mut(queue)?.waiters.pop_front()?;

        let t = self.expect_thread(thread);
        if t.state != ThreadState::Wait || t.queue != Some(queue) {
            kernel_fault!(
                "thread {:?} released from {:?} but recorded {:?} in {:?}",
                thread,
                queue,
                t.state,
                t.queue
            );
        }
        if param.is_some() {
            t.private_param = param;
        }

        self.make_ready(thread);
        log::trace!("[wait] released {:?} from {:?}", thread, queue);
        Some(thread)
    }

    pub(crate) fn link_waiter(&mut self, thread: ThreadHandle, queue: QueueHandle) {
        let t = self.expect_thread(thread);
        t.state = ThreadState::Wait;
        t.queue = Some(queue);
        match self.queues.get_mut(queue) {
            Some(q) => q.waiters.push_back(thread),
            None => kernel_fault!("queue {:?} vanished while linking {:?}", queue, thread),
        }
    }

    /// Remove a WAIT thread from the queue it recorded.
    ///
    /// Returns the owner when `queue` is a join queue; the caller then
    /// holds the join reference the waiter took.
    pub(crate) fn unlink_waiter(&mut self, thread: ThreadHandle, queue: QueueHandle) -> Option<ThreadHandle> {
        let Some(q) = self.queues.get_mut(queue) else {
            kernel_fault!("WAIT thread {:?} recorded vanished queue {:?}", thread, queue);
        };
        if !q.waiters.remove(thread) {
            kernel_fault!("WAIT thread {:?} not linked into its queue {:?}", thread, queue);
        }
        let owner = q.owner;
        let t = self.expect_thread(thread);
        t.queue = None;
        owner
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
    fn test_enqueue_ready_thread_and_release_in_order() {
        let mut exec = started();
        let q = exec.create_queue().unwrap();
        let a = exec.create(ThreadBuilder::new(entry).priority(3)).unwrap();
        let b = exec.create(ThreadBuilder::new(entry).priority(3)).unwrap();

        exec.enqueue(Some(a), q).unwrap();
        exec.enqueue(Some(b), q).unwrap();
        assert_eq!(exec.state(a), Ok(ThreadState::Wait));
        assert_eq!(exec.thread(a).unwrap().queue(), Some(q));
        assert_eq!(exec.waiters(q).unwrap(), [a, b]);

        assert_eq!(exec.release_one(q), Ok(true));
        assert_eq!(exec.state(a), Ok(ThreadState::Ready));
        assert_eq!(exec.thread(a).unwrap().queue(), None);
        assert_eq!(exec.state(b), Ok(ThreadState::Wait));

        assert_eq!(exec.release_all(q), Ok(1));
        assert_eq!(exec.release_one(q), Ok(false));
    }

    #[test]
    fn test_enqueue_rejects_blocked_and_idle() {
        let mut exec = started();
        let q = exec.create_queue().unwrap();
        let a = exec.create(ThreadBuilder::new(entry)).unwrap();

        exec.enqueue(Some(a), q).unwrap();
        assert_eq!(exec.enqueue(Some(a), q), Err(ExecError::InvalidArgument));

        let idle = exec.idle_thread();
        assert_eq!(exec.enqueue(Some(idle), q), Err(ExecError::InvalidArgument));
    }

    #[test]
    fn test_destroy_queue() {
        let mut exec = started();
        let q = exec.create_queue().unwrap();
        let a = exec.create(ThreadBuilder::new(entry)).unwrap();

        exec.enqueue(Some(a), q).unwrap();
        assert_eq!(exec.destroy_queue(q), Err(ExecError::InvalidArgument));

        exec.release_all(q).unwrap();
        exec.destroy_queue(q).unwrap();
        assert_eq!(exec.queue_len(q), Err(ExecError::NoSuchEntity));
        assert_eq!(exec.release_one(q), Err(ExecError::NoSuchEntity));

        let join = exec.thread(a).unwrap().join_queue();
        assert_eq!(exec.destroy_queue(join), Err(ExecError::InvalidArgument));
    }
}
