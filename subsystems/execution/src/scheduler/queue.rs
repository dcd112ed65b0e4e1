//! # Run Queues
//!
//! The ready structure is a [`MultilevelQueue`]: one [`FifoQueue`] per
//! priority level, highest non-empty level dispatched first.

use super::traits::RunQueue;
use super::Priority;
use crate::{ExecError, ExecResult, ThreadHandle};
use alloc::collections::VecDeque;
use alloc::vec::Vec;

/// Simple FIFO queue of thread handles
#[derive(Debug, Default)]
pub struct FifoQueue {
    queue: VecDeque<ThreadHandle>,
}

impl FifoQueue {
    /// Create a new FIFO queue
    pub fn new() -> Self {
        Self {
            queue: VecDeque::new(),
        }
    }

    /// Append at the tail
    pub fn push_back(&mut self, thread: ThreadHandle) {
        self.queue.push_back(thread);
    }

    /// Insert at the head
    pub fn push_front(&mut self, thread: ThreadHandle) {
        self.queue.push_front(thread);
    }

    /// Pop the head
    pub fn pop_front(&mut self) -> Option<ThreadHandle> {
        self.queue.pop_front()
    }

    /// Head, without removing it
    pub fn front(&self) -> Option<ThreadHandle> {
        self.queue.front().copied()
    }

    /// Remove a thread by identity
    pub fn remove(&mut self, thread: ThreadHandle) -> bool {
        if let Some(pos) = self.queue.iter().position(|&x| x == thread) {
            self.queue.remove(pos);
            true
        } else {
            false
        }
    }

    /// Check membership
    pub fn contains(&self, thread: ThreadHandle) -> bool {
        self.queue.contains(&thread)
    }

    /// Number of queued threads
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Iterate head to tail
    pub fn iter(&self) -> impl Iterator<Item = ThreadHandle> + '_ {
        self.queue.iter().copied()
    }
}

impl RunQueue for FifoQueue {
    fn enqueue(&mut self, thread: ThreadHandle, _priority: Priority) {
        self.push_back(thread);
    }

    fn enqueue_front(&mut self, thread: ThreadHandle, _priority: Priority) {
        self.push_front(thread);
    }

    fn dequeue(&mut self) -> Option<ThreadHandle> {
        self.pop_front()
    }

    fn peek(&self) -> Option<ThreadHandle> {
        self.front()
    }

    fn len(&self) -> usize {
        self.queue.len()
    }

    fn remove(&mut self, thread: ThreadHandle) -> bool {
        FifoQueue::remove(self, thread)
    }
}

/// Priority-leveled ready structure
#[derive(Debug)]
pub struct MultilevelQueue {
    /// Queues by priority level, index = level
    levels: Vec<FifoQueue>,
}

impl MultilevelQueue {
    /// Create a ready structure with `num_levels` levels
    pub fn new(num_levels: usize) -> ExecResult<Self> {
        let mut levels = Vec::new();
        levels
            .try_reserve_exact(num_levels)
            .map_err(|_| ExecError::OutOfResources)?;
        levels.resize_with(num_levels, FifoQueue::new);
        Ok(Self { levels })
    }

    /// Number of levels
    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    /// Priority of the thread that would be dispatched next
    pub fn peek_priority(&self) -> Option<Priority> {
        self.highest().map(|level| Priority::new(level as u8))
    }

    /// Threads queued at one level, head to tail
    pub fn level(&self, priority: Priority) -> impl Iterator<Item = ThreadHandle> + '_ {
        self.levels
            .get(priority.level())
            .into_iter()
            .flat_map(|queue| queue.iter())
    }

    fn highest(&self) -> Option<usize> {
        self.levels.iter().rposition(|queue| !queue.is_empty())
    }

    fn slot(&mut self, priority: Priority) -> &mut FifoQueue {
        let last = self.levels.len() - 1;
        &mut self.levels[priority.level().min(last)]
    }
}

impl RunQueue for MultilevelQueue {
    fn enqueue(&mut self, thread: ThreadHandle, priority: Priority) {
        self.slot(priority).push_back(thread);
    }

    fn enqueue_front(&mut self, thread: ThreadHandle, priority: Priority) {
        self.slot(priority).push_front(thread);
    }

    fn dequeue(&mut self) -> Option<ThreadHandle> {
        let level = self.highest()?;
        self.levels[level].pop_front()
    }

    fn peek(&self) -> Option<ThreadHandle> {
        self.highest().and_then(|level| self.levels[level].front())
    }

    fn len(&self) -> usize {
        self.levels.iter().map(FifoQueue::len).sum()
    }

    fn remove(&mut self, thread: ThreadHandle) -> bool {
        self.levels.iter_mut().any(|level| level.remove(thread))
    }
}
