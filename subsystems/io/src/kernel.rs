//! # Kernel
//!
//! Composes the executive with the device registry and the interrupt
//! controller. One [`Kernel`] is the whole explicit kernel state; there
//! are no globals.

use crate::descriptor::DeviceHandle;
use crate::device::{DeviceDefinition, DeviceFlags, DeviceParams, OpenFlags};
use crate::registry::{DeviceInfo, DeviceKey, DeviceRegistry};
use crate::{IoResult, NullDevice};
use alloc::boxed::Box;
use alloc::vec;
use alloc::vec::Vec;
use core::fmt;
use quill_execution::{ExecConfig, Executive};
use quill_hal::{ContextSwitch, InterruptController, InterruptLine, MemoryAllocator};

/// Kernel configuration
#[derive(Debug)]
pub struct KernelConfig {
    /// Executive configuration
    pub exec: ExecConfig,
    /// Static device table, added and initialized in order by [`Kernel::new`]
    pub devices: Vec<DeviceDefinition>,
}

impl KernelConfig {
    /// Default executive configuration and a table holding `dev_null`
    pub fn new() -> Self {
        Self {
            exec: ExecConfig::new(),
            devices: vec![NullDevice::definition()],
        }
    }

    /// Small executive configuration and a table holding `dev_null`
    pub fn small() -> Self {
        Self {
            exec: ExecConfig::small(),
            ..Self::new()
        }
    }

    /// Append a device to the static table
    pub fn with_device(mut self, definition: DeviceDefinition) -> Self {
        self.devices.push(definition);
        self
    }
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Kernel state
pub struct Kernel {
    pub(crate) exec: Executive,
    pub(crate) devices: DeviceRegistry,
    pub(crate) controller: Box<dyn InterruptController>,
}

impl Kernel {
    /// Build the executive and bring up the static device table.
    ///
    /// A device whose initializer fails stays registered, without an
    /// interrupt binding.
    pub fn new(
        config: KernelConfig,
        arch: Box<dyn ContextSwitch>,
        memory: Box<dyn MemoryAllocator>,
        controller: Box<dyn InterruptController>,
    ) -> IoResult<Self> {
        let mut kernel = Self {
            exec: Executive::new(config.exec, arch, memory)?,
            devices: DeviceRegistry::new(),
            controller,
        };

        for definition in config.devices {
            let key = kernel.add_device(definition)?;
            if let Err(error) = kernel.init_device(key, None, None) {
                let name = kernel.devices.get(key).map(|dev| dev.name()).unwrap_or("?");
                log::warn!("[dev] {} failed to initialize: {:?}", name, error);
            }
        }

        log::info!("[dev] {} device(s) registered", kernel.devices.count());
        Ok(kernel)
    }

    /// Boot dispatch
    pub fn start(&mut self) -> IoResult<()> {
        Ok(self.exec.start()?)
    }

    /// The executive
    pub fn executive(&self) -> &Executive {
        &self.exec
    }

    /// The executive, mutably
    pub fn executive_mut(&mut self) -> &mut Executive {
        &mut self.exec
    }

    /// The device registry
    pub fn devices(&self) -> &DeviceRegistry {
        &self.devices
    }

    // =========================================================================
    // Devices
    // =========================================================================

    /// Register a device
    pub fn add_device(&mut self, definition: DeviceDefinition) -> IoResult<DeviceKey> {
        self.devices.add(self.exec.ids(), definition)
    }

    /// Initialize a device, optionally overriding its flags and parameters
    pub fn init_device(
        &mut self,
        key: DeviceKey,
        flags: Option<DeviceFlags>,
        params: Option<DeviceParams>,
    ) -> IoResult<()> {
        self.devices.init(key, flags, params, self.controller.as_mut())
    }

    /// Unbind, destroy and unregister a device
    pub fn remove_device(&mut self, key: DeviceKey) -> IoResult<()> {
        self.devices.remove(key, self.exec.ids(), self.controller.as_mut())
    }

    /// Open a device by name
    pub fn open(&mut self, name: &str, flags: OpenFlags) -> IoResult<DeviceHandle> {
        self.devices.open(name, flags)
    }

    /// Close a handle
    pub fn close(&mut self, handle: DeviceHandle) -> IoResult<()> {
        self.devices.close(handle)
    }

    /// Write to a device
    pub fn send(&mut self, handle: &DeviceHandle, data: &[u8]) -> IoResult<usize> {
        self.devices.send(handle, data)
    }

    /// Read from a device
    pub fn recv(&mut self, handle: &DeviceHandle, buf: &mut [u8]) -> IoResult<usize> {
        self.devices.recv(handle, buf)
    }

    /// Interrupt entry point, called by the architecture layer
    pub fn interrupt(&mut self, line: InterruptLine) -> IoResult<()> {
        self.devices
            .dispatch(line, &mut self.exec, self.controller.as_mut())
    }

    /// Look a device up by name
    pub fn find_device(&self, name: &str) -> Option<DeviceKey> {
        self.devices.find(name)
    }

    /// Introspection snapshot of a device
    pub fn device_info(&self, key: DeviceKey) -> IoResult<DeviceInfo> {
        self.devices.info(key)
    }

    /// Remove every device, then drop the executive
    pub fn shutdown(mut self) {
        for key in self.devices.keys() {
            if let Err(error) = self.remove_device(key) {
                log::warn!("[dev] removing {:?} at shutdown failed: {:?}", key, error);
            }
        }
        log::info!("[exec] kernel shut down");
    }
}

impl fmt::Debug for Kernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Kernel")
            .field("exec", &self.exec)
            .field("devices", &self.devices)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_hal::arch_stubs::{HeapAllocator, StubContextSwitch, StubInterruptController};

    #[test]
    fn test_new_brings_up_static_table() {
        let kernel = Kernel::new(
            KernelConfig::small(),
            Box::new(StubContextSwitch::new()),
            Box::new(HeapAllocator::new()),
            Box::new(StubInterruptController::new(4)),
        )
        .unwrap();

        let null = kernel.find_device(NullDevice::NAME).unwrap();
        let info = kernel.device_info(null).unwrap();
        assert!(info.initialized);
        assert!(!info.bound);
        assert!(!kernel.executive().is_started());
    }

    #[test]
    fn test_start_and_shutdown() {
        let heap = HeapAllocator::new();
        let stats = heap.stats();
        let mut kernel = Kernel::new(
            KernelConfig::small(),
            Box::new(StubContextSwitch::new()),
            Box::new(heap),
            Box::new(StubInterruptController::new(4)),
        )
        .unwrap();

        kernel.start().unwrap();
        assert!(kernel.start().is_err());
        assert_eq!(kernel.executive_mut().ids().in_use(), 2);

        kernel.shutdown();
        assert_eq!(stats.outstanding(), 0);
    }
}
