//! # Device Interface
//!
//! A driver implements [`Device`] plus whichever capability traits it
//! actually supports. The registry asks for each capability explicitly
//! through the `as_*` accessors; a capability that is not offered is
//! simply `None`.

use crate::interrupt::InterruptScope;
use crate::{IoError, IoResult};
use alloc::boxed::Box;
use alloc::string::String;
use bitflags::bitflags;
use core::fmt;
use quill_hal::InterruptLine;
use static_assertions::const_assert;

/// Longest device name the registry accepts
pub const MAX_NAME_LEN: usize = 32;

/// Maximum number of entries in a [`DeviceParams`] map
pub const MAX_PARAMS: usize = 8;

const_assert!(MAX_NAME_LEN >= "dev_null".len());
const_assert!(MAX_PARAMS.is_power_of_two());

/// Bounded device name
pub type DeviceName = heapless::String<MAX_NAME_LEN>;

bitflags! {
    /// Device access mode
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DeviceFlags: u32 {
        /// At most one opener at a time
        const EXCLUSIVE = 1 << 0;
    }
}

bitflags! {
    /// Flags requested by an opener
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct OpenFlags: u32 {
        /// Open for reading
        const READ = 1 << 0;
        /// Open for writing
        const WRITE = 1 << 1;
        /// Do not wait for data
        const NONBLOCK = 1 << 2;
    }
}

bitflags! {
    /// Capabilities a device offers
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Capabilities: u32 {
        /// Has an initializer
        const INIT = 1 << 0;
        /// Has a destructor
        const DESTROY = 1 << 1;
        /// Accepts data
        const SEND = 1 << 2;
        /// Produces data
        const RECV = 1 << 3;
        /// Handles an interrupt line
        const INTERRUPT = 1 << 4;
    }
}

impl Capabilities {
    /// Ask a driver which capabilities it offers
    pub fn probe(device: &mut dyn Device) -> Self {
        let mut caps = Capabilities::empty();
        caps.set(Capabilities::INIT, device.as_init().is_some());
        caps.set(Capabilities::DESTROY, device.as_destroy().is_some());
        caps.set(Capabilities::SEND, device.as_send().is_some());
        caps.set(Capabilities::RECV, device.as_recv().is_some());
        caps.set(Capabilities::INTERRUPT, device.as_interrupt().is_some());
        caps
    }
}

/// Driver-reported failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceError {
    /// The hardware reported an I/O failure
    Io,
    /// The device is not ready for the request
    NotReady,
    /// The driver rejected its parameters
    BadParameters,
}

/// Driver result type
pub type DeviceResult<T> = Result<T, DeviceError>;

/// Small key → value parameter map handed to a driver's initializer
#[derive(Debug, Clone, Default)]
pub struct DeviceParams {
    entries: heapless::LinearMap<&'static str, u64, MAX_PARAMS>,
}

impl DeviceParams {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a parameter
    pub fn set(&mut self, key: &'static str, value: u64) -> IoResult<()> {
        self.entries
            .insert(key, value)
            .map(|_| ())
            .map_err(|_| IoError::OutOfResources)
    }

    /// Builder form of [`DeviceParams::set`]
    pub fn with(mut self, key: &'static str, value: u64) -> IoResult<Self> {
        self.set(key, value)?;
        Ok(self)
    }

    /// Look a parameter up
    pub fn get(&self, key: &str) -> Option<u64> {
        self.entries
            .iter()
            .find(|(k, _)| **k == key)
            .map(|(_, value)| *value)
    }

    /// Number of parameters
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Initializer capability
pub trait DeviceInit {
    /// Bring the device up. An error leaves it registered but unbound.
    fn init(&mut self, flags: DeviceFlags, params: &DeviceParams) -> DeviceResult<()>;
}

/// Destructor capability
pub trait DeviceDestroy {
    /// Tear the device down before it leaves the registry
    fn destroy(&mut self, flags: DeviceFlags, params: &DeviceParams);
}

/// Output capability
pub trait DeviceSend {
    /// Write `data`, returning the number of bytes accepted
    fn send(&mut self, data: &[u8], flags: OpenFlags) -> DeviceResult<usize>;
}

/// Input capability
pub trait DeviceRecv {
    /// Read into `buf`, returning the number of bytes produced
    fn recv(&mut self, buf: &mut [u8], flags: OpenFlags) -> DeviceResult<usize>;
}

/// Interrupt-handler capability
pub trait InterruptHandler {
    /// Service `line`. Must not block; waiting threads are woken through
    /// `scope`.
    fn handle(&mut self, line: InterruptLine, scope: &mut InterruptScope<'_>) -> DeviceResult<()>;
}

/// A device driver
pub trait Device: Send {
    /// Initializer, if any
    fn as_init(&mut self) -> Option<&mut dyn DeviceInit> {
        None
    }

    /// Destructor, if any
    fn as_destroy(&mut self) -> Option<&mut dyn DeviceDestroy> {
        None
    }

    /// Output, if any
    fn as_send(&mut self) -> Option<&mut dyn DeviceSend> {
        None
    }

    /// Input, if any
    fn as_recv(&mut self) -> Option<&mut dyn DeviceRecv> {
        None
    }

    /// Interrupt handler, if any
    fn as_interrupt(&mut self) -> Option<&mut dyn InterruptHandler> {
        None
    }
}

/// Static description of a device, as found in the kernel's device table
pub struct DeviceDefinition {
    pub(crate) name: String,
    pub(crate) flags: DeviceFlags,
    pub(crate) interrupt_line: Option<InterruptLine>,
    pub(crate) params: DeviceParams,
    pub(crate) driver: Box<dyn Device>,
}

impl DeviceDefinition {
    /// Describe a shared device with no interrupt line and no parameters
    pub fn new(name: impl Into<String>, driver: impl Device + 'static) -> Self {
        Self {
            name: name.into(),
            flags: DeviceFlags::empty(),
            interrupt_line: None,
            params: DeviceParams::new(),
            driver: Box::new(driver),
        }
    }

    /// Set the access mode
    pub fn flags(mut self, flags: DeviceFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set the interrupt line the handler is bound to
    pub fn interrupt_line(mut self, line: InterruptLine) -> Self {
        self.interrupt_line = Some(line);
        self
    }

    /// Set initialization parameters
    pub fn params(mut self, params: DeviceParams) -> Self {
        self.params = params;
        self
    }

    /// Replace the driver
    pub fn driver(mut self, driver: impl Device + 'static) -> Self {
        self.driver = Box::new(driver);
        self
    }

    /// Device name
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for DeviceDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceDefinition")
            .field("name", &self.name)
            .field("flags", &self.flags)
            .field("interrupt_line", &self.interrupt_line)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SendOnly;

    impl DeviceSend for SendOnly {
        fn send(&mut self, data: &[u8], _flags: OpenFlags) -> DeviceResult<usize> {
            Ok(data.len())
        }
    }

    impl Device for SendOnly {
        fn as_send(&mut self) -> Option<&mut dyn DeviceSend> {
            Some(self)
        }
    }

    #[test]
    fn test_probe_reports_offered_capabilities() {
        let mut dev = SendOnly;
        assert_eq!(Capabilities::probe(&mut dev), Capabilities::SEND);
    }

    #[test]
    fn test_params_get_and_replace() {
        let mut params = DeviceParams::new().with("baud", 9600).unwrap();
        assert_eq!(params.get("baud"), Some(9600));
        assert_eq!(params.get("parity"), None);

        params.set("baud", 115_200).unwrap();
        assert_eq!(params.get("baud"), Some(115_200));
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn test_params_capacity() {
        const KEYS: [&str; MAX_PARAMS] = ["a", "b", "c", "d", "e", "f", "g", "h"];
        let mut params = DeviceParams::new();
        for (value, &key) in KEYS.iter().enumerate() {
            params.set(key, value as u64).unwrap();
        }
        assert_eq!(params.set("i", 0), Err(IoError::OutOfResources));
        assert_eq!(params.get("h"), Some(7));
    }

    #[test]
    fn test_definition_builder() {
        let def = DeviceDefinition::new("uart0", SendOnly)
            .flags(DeviceFlags::EXCLUSIVE)
            .interrupt_line(4);
        assert_eq!(def.name(), "uart0");
        assert_eq!(def.flags, DeviceFlags::EXCLUSIVE);
        assert_eq!(def.interrupt_line, Some(4));
        assert!(def.params.is_empty());
    }
}
