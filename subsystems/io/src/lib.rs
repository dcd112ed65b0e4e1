//! # Quill I/O Subsystem
//!
//! The device framework threads block and wake against:
//! - Device capability traits and static device definitions
//! - The device registry: add, init, open/close reference counting, remove
//! - Interrupt dispatch from a hardware line to its bound device handler
//! - Identifier-checked open handles and per-process descriptor tables
//! - The [`Kernel`] object composing the executive with the devices, and
//!   the device syscall entry points
//!
//! ## Interrupts
//!
//! A handler runs to completion and never dispatches. It only sees an
//! [`InterruptScope`], which can release waiting threads (WAIT → READY)
//! and hand them a value; the switch happens at the next yield point.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

extern crate alloc;

pub mod descriptor;
pub mod device;
pub mod interrupt;
pub mod kernel;
pub mod null;
pub mod registry;
pub mod syscall;


pub use descriptor::{DescriptorTable, DeviceHandle, Fd};
pub use device::{
    Capabilities, Device, DeviceDefinition, DeviceDestroy, DeviceError, DeviceFlags, DeviceInit, DeviceName,
    DeviceParams, DeviceRecv, DeviceResult, DeviceSend, InterruptHandler, OpenFlags,
};
pub use interrupt::InterruptScope;
pub use kernel::{Kernel, KernelConfig};
pub use null::NullDevice;
pub use registry::{DeviceDescriptor, DeviceInfo, DeviceKey, DeviceRegistry};

use quill_execution::{errno, ErrorNumber, ExecError};
use quill_hal::HalError;

/// I/O result type
pub type IoResult<T> = Result<T, IoError>;

/// I/O errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IoError {
    /// Bad descriptor, name, parameter or buffer
    InvalidArgument,
    /// No device by that name, or a stale handle
    NoSuchDevice,
    /// Exclusive device already open, line already bound, or device
    /// already initialized
    Busy,
    /// The device lacks the requested capability
    NotSupported,
    /// An allocation or identifier could not be obtained
    OutOfResources,
    /// The driver reported a failure
    Device(DeviceError),
}

impl IoError {
    /// POSIX-style error number stored in a thread's errno slot
    pub const fn errno(self) -> i32 {
        match self {
            IoError::InvalidArgument => errno::EINVAL,
            IoError::NoSuchDevice => errno::ENODEV,
            IoError::Busy => errno::EBUSY,
            IoError::NotSupported => errno::ENOTSUP,
            IoError::OutOfResources => errno::ENOMEM,
            IoError::Device(_) => errno::EIO,
        }
    }
}

impl ErrorNumber for IoError {
    fn errno(&self) -> i32 {
        IoError::errno(*self)
    }
}

impl From<ExecError> for IoError {
    fn from(error: ExecError) -> Self {
        match error {
            ExecError::InvalidArgument => IoError::InvalidArgument,
            ExecError::NoSuchEntity => IoError::NoSuchDevice,
            ExecError::NotSupported => IoError::NotSupported,
            ExecError::OutOfResources => IoError::OutOfResources,
        }
    }
}

impl From<HalError> for IoError {
    fn from(error: HalError) -> Self {
        match error {
            HalError::ResourceBusy => IoError::Busy,
            HalError::OutOfMemory => IoError::OutOfResources,
            HalError::NotSupported => IoError::NotSupported,
            HalError::InvalidParameter | HalError::NotInitialized => IoError::InvalidArgument,
        }
    }
}

impl From<DeviceError> for IoError {
    fn from(error: DeviceError) -> Self {
        IoError::Device(error)
    }
}
