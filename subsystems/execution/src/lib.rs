//! # Quill Execution Subsystem
//!
//! The execution subsystem manages:
//! - Thread descriptors and their lifecycle state machine
//! - The priority-leveled ready structure and the dispatcher
//! - FIFO blocking queues (synchronization and join)
//! - The context-switch boundary and deferred stack reclamation
//!
//! ## Key Principle
//!
//! All state lives in one explicit [`Executive`] object. There are no
//! globals: a kernel owns exactly one executive, a test can build as many
//! as it likes. Scheduling is cooperative; the executive only switches
//! threads at explicit yield points (`suspend` + `schedule`, `exit`,
//! `yield_now`, `set_priority`).

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

#[macro_use]
pub mod fault;

pub mod arena;
pub mod config;
pub mod context;
pub mod executive;
pub mod ids;
pub mod scheduler;
pub mod thread;
pub mod wait;


pub use arena::{Arena, Handle};
pub use config::ExecConfig;
pub use context::{ContextSwitchEngine, ContextSwitchHook, SwitchReason};
pub use executive::Executive;
pub use ids::IdPool;
pub use scheduler::{Priority, SchedulerMetrics, SchedulingPolicy};
pub use thread::{
    CancelHook, Thread, ThreadBuilder, ThreadFlags, ThreadHandle, ThreadRegistry, ThreadStack, ThreadState,
};
pub use wait::{QueueHandle, WaitQueue};

use quill_hal::HalError;

/// Value handed from an exiting thread to its joiners
pub type ExitStatus = usize;

/// Unique identifier for threads
///
/// Drawn from the executive's [`IdPool`]; unique while the thread is alive
/// and reused only after its descriptor has been destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(u32);

impl ThreadId {
    /// Wrap a raw identifier
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Get the raw ID value
    pub fn as_u32(self) -> u32 {
        self.0
    }
}

/// Execution result type
pub type ExecResult<T> = Result<T, ExecError>;

/// Execution errors
///
/// Recoverable failures only. Broken internal invariants are reported
/// through [`fault::consistency_fault`] instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecError {
    /// Null/out-of-range handle, priority or parameter, or an operation
    /// the target's current state does not allow
    InvalidArgument,
    /// Descriptor not present in the registry, or a stale handle
    NoSuchEntity,
    /// Requested capability or scheduling policy is not implemented
    NotSupported,
    /// An allocator or identifier pool could not satisfy the request
    OutOfResources,
}

impl ExecError {
    /// POSIX-style error number stored in a thread's errno slot
    pub const fn errno(self) -> i32 {
        match self {
            ExecError::InvalidArgument => errno::EINVAL,
            ExecError::NoSuchEntity => errno::ESRCH,
            ExecError::NotSupported => errno::ENOTSUP,
            ExecError::OutOfResources => errno::ENOMEM,
        }
    }
}

impl From<HalError> for ExecError {
    fn from(error: HalError) -> Self {
        match error {
            HalError::OutOfMemory | HalError::ResourceBusy => ExecError::OutOfResources,
            HalError::NotSupported => ExecError::NotSupported,
            HalError::InvalidParameter | HalError::NotInitialized => ExecError::InvalidArgument,
        }
    }
}

/// Errors that can be stored in a thread's errno slot
pub trait ErrorNumber {
    /// POSIX-style error number
    fn errno(&self) -> i32;
}

impl ErrorNumber for ExecError {
    fn errno(&self) -> i32 {
        ExecError::errno(*self)
    }
}

/// Error numbers shared with the syscall layer
pub mod errno {
    /// No such thread
    pub const ESRCH: i32 = 3;
    /// I/O error
    pub const EIO: i32 = 5;
    /// Out of memory
    pub const ENOMEM: i32 = 12;
    /// Device or resource busy
    pub const EBUSY: i32 = 16;
    /// No such device
    pub const ENODEV: i32 = 19;
    /// Invalid argument
    pub const EINVAL: i32 = 22;
    /// Operation not supported
    pub const ENOTSUP: i32 = 95;
}
