//! # Scheduler Traits

use super::Priority;
use crate::ThreadHandle;

/// Scheduling policies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SchedulingPolicy {
    /// First-in-first-out within a priority level
    #[default]
    Fifo,
    /// Round-robin within a priority level (not implemented)
    RoundRobin,
}

impl SchedulingPolicy {
    /// Whether the ready structure implements this policy
    pub fn is_supported(self) -> bool {
        matches!(self, SchedulingPolicy::Fifo)
    }
}

/// Run queue trait
pub trait RunQueue: Send {
    /// Add a thread at the tail of its level
    fn enqueue(&mut self, thread: ThreadHandle, priority: Priority);

    /// Add a thread at the head of its level
    fn enqueue_front(&mut self, thread: ThreadHandle, priority: Priority);

    /// Remove and return the next thread
    fn dequeue(&mut self) -> Option<ThreadHandle>;

    /// Peek at the next thread without removing
    fn peek(&self) -> Option<ThreadHandle>;

    /// Check if the queue is empty
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get the number of threads in the queue
    fn len(&self) -> usize;

    /// Remove a specific thread
    fn remove(&mut self, thread: ThreadHandle) -> bool;
}
