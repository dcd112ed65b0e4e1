//! # Device Registry
//!
//! Owns every device descriptor. Open handles are identifier-checked,
//! non-owning references into it.

use crate::descriptor::DeviceHandle;
use crate::device::{Capabilities, Device, DeviceDefinition, DeviceFlags, DeviceName, DeviceParams, OpenFlags};
use crate::{IoError, IoResult};
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::fmt;
use hashbrown::HashMap;
use quill_execution::{Arena, Handle, IdPool};
use quill_hal::{InterruptController, InterruptLine};

/// Registry slot of a device
pub type DeviceKey = Handle<DeviceDescriptor>;

/// One registered device
pub struct DeviceDescriptor {
    pub(crate) id: u32,
    pub(crate) name: DeviceName,
    pub(crate) flags: DeviceFlags,
    pub(crate) params: DeviceParams,
    pub(crate) interrupt_line: Option<InterruptLine>,
    pub(crate) capabilities: Capabilities,
    pub(crate) driver: Box<dyn Device>,
    pub(crate) initialized: bool,
    pub(crate) bound: bool,
    pub(crate) open_count: u32,
    /// Union of the live openers' flags
    pub(crate) open_flags: OpenFlags,
    /// Serial and flags of every handle currently open on this device
    pub(crate) handles: Vec<(u32, OpenFlags)>,
}

impl DeviceDescriptor {
    /// Device identifier
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Device name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether any opener holds the device
    pub fn is_open(&self) -> bool {
        self.open_count > 0
    }

    /// Snapshot for introspection
    pub fn info(&self) -> DeviceInfo {
        DeviceInfo {
            id: self.id,
            name: self.name.clone(),
            flags: self.flags,
            capabilities: self.capabilities,
            initialized: self.initialized,
            open: self.is_open(),
            open_count: self.open_count,
            open_flags: self.open_flags,
            interrupt_line: self.interrupt_line,
            bound: self.bound,
        }
    }
}

impl fmt::Debug for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceDescriptor")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("flags", &self.flags)
            .field("capabilities", &self.capabilities)
            .field("open_count", &self.open_count)
            .field("bound", &self.bound)
            .finish_non_exhaustive()
    }
}

/// Device state as reported by [`DeviceRegistry::info`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Device identifier
    pub id: u32,
    /// Device name
    pub name: DeviceName,
    /// Access mode
    pub flags: DeviceFlags,
    /// Offered capabilities
    pub capabilities: Capabilities,
    /// Initialization succeeded
    pub initialized: bool,
    /// At least one opener
    pub open: bool,
    /// Number of openers
    pub open_count: u32,
    /// Union of the live openers' flags
    pub open_flags: OpenFlags,
    /// Declared interrupt line
    pub interrupt_line: Option<InterruptLine>,
    /// The handler is bound and the line enabled
    pub bound: bool,
}

/// Device registry
pub struct DeviceRegistry {
    pub(crate) devices: Arena<DeviceDescriptor>,
    /// Interrupt line → bound device
    pub(crate) bindings: HashMap<InterruptLine, DeviceKey>,
    next_serial: u32,
}

impl DeviceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            devices: Arena::new(),
            bindings: HashMap::new(),
            next_serial: 0,
        }
    }

    /// Register a device. It stays inert until [`DeviceRegistry::init`].
    pub fn add(&mut self, ids: &mut IdPool, definition: DeviceDefinition) -> IoResult<DeviceKey> {
        let DeviceDefinition {
            name,
            flags,
            interrupt_line,
            params,
            mut driver,
        } = definition;

        let mut bounded = DeviceName::new();
        if name.is_empty() || bounded.push_str(&name).is_err() {
            return Err(IoError::InvalidArgument);
        }
        if self.find(&name).is_some() {
            return Err(IoError::InvalidArgument);
        }
        let capabilities = Capabilities::probe(driver.as_mut());
        if capabilities.contains(Capabilities::INTERRUPT) && interrupt_line.is_none() {
            return Err(IoError::InvalidArgument);
        }

        self.devices.reserve()?;
        let id = ids.allocate()?;
        let descriptor = DeviceDescriptor {
            id,
            name: bounded,
            flags,
            params,
            interrupt_line,
            capabilities,
            driver,
            initialized: false,
            bound: false,
            open_count: 0,
            open_flags: OpenFlags::empty(),
            handles: Vec::new(),
        };
        let Ok(key) = self.devices.insert(descriptor) else {
            quill_execution::kernel_fault!("device slot reserved for {} was lost", name);
        };

        log::info!("[dev] registered {} (id={}, caps={:?})", name, id, capabilities);
        Ok(key)
    }

    /// Initialize a device, applying `flags` and `params` overrides first.
    ///
    /// On success a declared interrupt handler is bound to the device's
    /// line and the line is enabled. A failing driver initializer, or a
    /// line the controller refuses to enable, leaves the device registered,
    /// uninitialized and unbound with its line released.
    pub fn init(
        &mut self,
        key: DeviceKey,
        flags: Option<DeviceFlags>,
        params: Option<DeviceParams>,
        controller: &mut dyn InterruptController,
    ) -> IoResult<()> {
        let dev = self.devices.get_mut(key).ok_or(IoError::NoSuchDevice)?;
        if dev.initialized {
            return Err(IoError::Busy);
        }
        if let Some(flags) = flags {
            dev.flags = flags;
        }
        if let Some(params) = params {
            dev.params = params;
        }

        let line = match dev.interrupt_line {
            Some(line) if dev.capabilities.contains(Capabilities::INTERRUPT) => Some(line),
            _ => None,
        };
        if let Some(line) = line {
            if self.bindings.contains_key(&line) {
                return Err(IoError::Busy);
            }
            self.bindings.try_reserve(1).map_err(|_| IoError::OutOfResources)?;
            controller.register(line)?;
        }

        let dev = self.expect(key);
        let (flags, params) = (dev.flags, &dev.params);
        let result = match dev.driver.as_init() {
            Some(init) => init.init(flags, params),
            None => Ok(()),
        };
        if let Err(error) = result {
            if let Some(line) = line {
                release_line(controller, line, &dev.name);
            }
            log::debug!("[dev] init of {} failed: {:?}", dev.name, error);
            return Err(IoError::Device(error));
        }

        if let Some(line) = line {
            if let Err(error) = controller.enable_line(line) {
                // Undo the driver init so the device is left as it was
                release_line(controller, line, &dev.name);
                if let Some(destroy) = dev.driver.as_destroy() {
                    destroy.destroy(flags, params);
                }
                log::warn!("[irq] enabling line {} for {} failed: {:?}", line, dev.name, error);
                return Err(error.into());
            }
            dev.bound = true;
            log::debug!("[irq] line {} bound to {}", line, dev.name);
            self.bindings.insert(line, key);
        }
        self.expect(key).initialized = true;
        Ok(())
    }

    /// Unbind, destroy and unregister a device; its identifier is released
    pub fn remove(
        &mut self,
        key: DeviceKey,
        ids: &mut IdPool,
        controller: &mut dyn InterruptController,
    ) -> IoResult<()> {
        let dev = self.devices.get_mut(key).ok_or(IoError::NoSuchDevice)?;
        if dev.is_open() {
            log::warn!("[dev] removing {} with {} opener(s)", dev.name, dev.open_count);
        }

        if let (true, Some(line)) = (dev.bound, dev.interrupt_line) {
            if let Err(error) = controller.disable_line(line) {
                log::warn!("[irq] disabling line {} of {} failed: {:?}", line, dev.name, error);
            }
            release_line(controller, line, &dev.name);
            dev.bound = false;
            self.bindings.remove(&line);
        }

        let dev = self.expect(key);
        if dev.initialized {
            let (flags, params) = (dev.flags, &dev.params);
            if let Some(destroy) = dev.driver.as_destroy() {
                destroy.destroy(flags, params);
            }
        }

        let Some(dev) = self.devices.remove(key) else {
            quill_execution::kernel_fault!("device {:?} vanished during removal", key);
        };
        if ids.release(dev.id).is_err() {
            quill_execution::kernel_fault!("device id {} released twice", dev.id);
        }
        log::info!("[dev] removed {} (id={})", dev.name, dev.id);
        Ok(())
    }

    /// Open a device by name.
    ///
    /// An exclusive device that is already open is refused with
    /// [`IoError::Busy`]. Read/write conflicts between shared openers are
    /// not arbitrated.
    pub fn open(&mut self, name: &str, flags: OpenFlags) -> IoResult<DeviceHandle> {
        let key = self.find(name).ok_or(IoError::NoSuchDevice)?;
        let mut serial = self.next_serial;
        let dev = self.expect(key);

        if dev.flags.contains(DeviceFlags::EXCLUSIVE) && dev.is_open() {
            return Err(IoError::Busy);
        }
        dev.handles.try_reserve(1).map_err(|_| IoError::OutOfResources)?;
        // Skip serials still held after the counter wraps
        while dev.handles.iter().any(|&(live, _)| live == serial) {
            serial = serial.wrapping_add(1);
        }

        dev.handles.push((serial, flags));
        dev.open_count += 1;
        dev.open_flags |= flags;
        let handle = DeviceHandle {
            device: key,
            id: dev.id,
            serial,
            flags,
        };
        log::trace!("[dev] open {} -> {} opener(s)", dev.name, dev.open_count);

        self.next_serial = serial.wrapping_add(1);
        Ok(handle)
    }

    /// Close a handle. The device stops being open with its last opener.
    pub fn close(&mut self, handle: DeviceHandle) -> IoResult<()> {
        let dev = self.resolve(&handle)?;
        let index = dev
            .handles
            .iter()
            .position(|&(serial, _)| serial == handle.serial)
            .ok_or(IoError::NoSuchDevice)?;

        dev.handles.swap_remove(index);
        dev.open_count -= 1;
        dev.open_flags = dev
            .handles
            .iter()
            .fold(OpenFlags::empty(), |acc, &(_, flags)| acc | flags);
        log::trace!("[dev] close {} -> {} opener(s)", dev.name, dev.open_count);
        Ok(())
    }

    /// Forward data to the device's output capability
    pub fn send(&mut self, handle: &DeviceHandle, data: &[u8]) -> IoResult<usize> {
        let dev = self.resolve(handle)?;
        let sender = dev.driver.as_send().ok_or(IoError::NotSupported)?;
        Ok(sender.send(data, handle.flags)?)
    }

    /// Read from the device's input capability
    pub fn recv(&mut self, handle: &DeviceHandle, buf: &mut [u8]) -> IoResult<usize> {
        let dev = self.resolve(handle)?;
        let receiver = dev.driver.as_recv().ok_or(IoError::NotSupported)?;
        Ok(receiver.recv(buf, handle.flags)?)
    }

    /// Linear lookup by name
    pub fn find(&self, name: &str) -> Option<DeviceKey> {
        self.devices
            .iter()
            .find(|(_, dev)| dev.name.as_str() == name)
            .map(|(key, _)| key)
    }

    /// Borrow a descriptor
    pub fn get(&self, key: DeviceKey) -> IoResult<&DeviceDescriptor> {
        self.devices.get(key).ok_or(IoError::NoSuchDevice)
    }

    /// Introspection snapshot of a device
    pub fn info(&self, key: DeviceKey) -> IoResult<DeviceInfo> {
        self.get(key).map(DeviceDescriptor::info)
    }

    /// Device bound to an interrupt line
    pub fn bound_device(&self, line: InterruptLine) -> Option<DeviceKey> {
        self.bindings.get(&line).copied()
    }

    /// Number of registered devices
    pub fn count(&self) -> usize {
        self.devices.len()
    }

    /// Registry slots of all devices
    pub fn keys(&self) -> Vec<DeviceKey> {
        self.devices.iter().map(|(key, _)| key).collect()
    }

    /// Resolve a handle, checking the device identifier
    fn resolve(&mut self, handle: &DeviceHandle) -> IoResult<&mut DeviceDescriptor> {
        self.devices
            .get_mut(handle.device)
            .filter(|dev| dev.id == handle.id)
            .ok_or(IoError::NoSuchDevice)
    }

    fn expect(&mut self, key: DeviceKey) -> &mut DeviceDescriptor {
        match self.devices.get_mut(key) {
            Some(dev) => dev,
            None => quill_execution::kernel_fault!("device {:?} missing from the registry", key),
        }
    }
}

/// Give a line back to the controller; a refusal is logged and the line stays lost
fn release_line(controller: &mut dyn InterruptController, line: InterruptLine, owner: &str) {
    if let Err(error) = controller.unregister(line) {
        log::warn!("[irq] unregistering line {} of {} failed: {:?}", line, owner, error);
    }
}

impl Default for DeviceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DeviceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceRegistry")
            .field("devices", &self.devices.len())
            .field("bindings", &self.bindings)
            .finish_non_exhaustive()
    }
}
