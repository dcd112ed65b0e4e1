//! # Thread Registry
//!
//! Owner of every thread descriptor, from creation until its reference
//! count reaches zero.

use super::{Thread, ThreadHandle, ThreadState};
use crate::{Arena, ExecError, ExecResult, ThreadId};
use alloc::vec::Vec;
use core::ptr::NonNull;
use quill_hal::ThreadContext;

/// Thread registry
#[derive(Debug, Default)]
pub struct ThreadRegistry {
    threads: Arena<Thread>,
}

impl ThreadRegistry {
    /// Create a new registry
    pub const fn new() -> Self {
        Self {
            threads: Arena::new(),
        }
    }

    /// Register a new thread
    pub fn register(&mut self, thread: Thread) -> ExecResult<ThreadHandle> {
        self.threads.insert(thread)
    }

    /// Make sure the next [`ThreadRegistry::register`] cannot fail
    pub fn reserve(&mut self) -> ExecResult<()> {
        self.threads.reserve()
    }

    /// Unregister a thread, handing its descriptor back
    pub fn unregister(&mut self, handle: ThreadHandle) -> ExecResult<Thread> {
        self.threads.remove(handle).ok_or(ExecError::NoSuchEntity)
    }

    /// Get a thread
    pub fn get(&self, handle: ThreadHandle) -> ExecResult<&Thread> {
        self.threads.get(handle).ok_or(ExecError::NoSuchEntity)
    }

    /// Get a thread mutably
    pub fn get_mut(&mut self, handle: ThreadHandle) -> ExecResult<&mut Thread> {
        self.threads.get_mut(handle).ok_or(ExecError::NoSuchEntity)
    }

    /// Check whether a handle still names a registered thread
    pub fn contains(&self, handle: ThreadHandle) -> bool {
        self.threads.contains(handle)
    }

    /// Raw pointer to a thread's saved context, for the switch primitive
    pub(crate) fn context_ptr(&mut self, handle: ThreadHandle) -> ExecResult<NonNull<ThreadContext>> {
        self.get_mut(handle).map(|thread| NonNull::from(&mut thread.context))
    }

    /// Get all threads in a state
    pub fn get_by_state(&self, state: ThreadState) -> Vec<ThreadHandle> {
        self.threads
            .iter()
            .filter(|(_, t)| t.state == state)
            .map(|(handle, _)| handle)
            .collect()
    }

    /// Look a thread up by identifier
    pub fn find_by_id(&self, id: ThreadId) -> Option<ThreadHandle> {
        self.threads
            .iter()
            .find(|(_, t)| t.id == id)
            .map(|(handle, _)| handle)
    }

    /// Get thread count
    pub fn count(&self) -> usize {
        self.threads.len()
    }

    /// Iterate over all threads
    pub fn iter(&self) -> impl Iterator<Item = (ThreadHandle, &Thread)> {
        self.threads.iter()
    }

    /// Iterate mutably over all threads
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (ThreadHandle, &mut Thread)> {
        self.threads.iter_mut()
    }
}
