//! # Handles and Descriptor Tables
//!
//! An open handle refers to a device by registry slot *and* by the
//! device's identifier. Once the device is removed (and its identifier
//! possibly handed to someone else) the handle no longer resolves.

use crate::registry::DeviceKey;
use crate::{IoError, IoResult, OpenFlags};
use alloc::vec::Vec;

/// Per-opener reference to a device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceHandle {
    pub(crate) device: DeviceKey,
    pub(crate) id: u32,
    pub(crate) serial: u32,
    pub(crate) flags: OpenFlags,
}

impl DeviceHandle {
    /// Registry slot of the device
    pub fn device(&self) -> DeviceKey {
        self.device
    }

    /// Identifier the device had when it was opened
    pub fn device_id(&self) -> u32 {
        self.id
    }

    /// Flags requested at open
    pub fn flags(&self) -> OpenFlags {
        self.flags
    }
}

/// Small integer file descriptor
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fd(usize);

impl Fd {
    /// Wrap a raw descriptor number
    pub const fn new(raw: usize) -> Self {
        Self(raw)
    }

    /// Raw descriptor number
    pub fn as_usize(self) -> usize {
        self.0
    }
}

/// Per-process table from descriptors to device handles
#[derive(Debug)]
pub struct DescriptorTable {
    slots: Vec<Option<DeviceHandle>>,
    limit: usize,
}

impl DescriptorTable {
    /// Default maximum number of open descriptors
    pub const DEFAULT_LIMIT: usize = 64;

    /// Create a table with the default limit
    pub fn new() -> Self {
        Self::with_limit(Self::DEFAULT_LIMIT)
    }

    /// Create a table holding at most `limit` descriptors
    pub fn with_limit(limit: usize) -> Self {
        Self {
            slots: Vec::new(),
            limit,
        }
    }

    /// Store a handle under the lowest free descriptor
    pub fn insert(&mut self, handle: DeviceHandle) -> IoResult<Fd> {
        if let Some(index) = self.slots.iter().position(Option::is_none) {
            self.slots[index] = Some(handle);
            return Ok(Fd(index));
        }
        if self.slots.len() >= self.limit {
            return Err(IoError::OutOfResources);
        }
        self.slots.try_reserve(1).map_err(|_| IoError::OutOfResources)?;
        self.slots.push(Some(handle));
        Ok(Fd(self.slots.len() - 1))
    }

    /// Look a descriptor up
    pub fn get(&self, fd: Fd) -> Option<&DeviceHandle> {
        self.slots.get(fd.0).and_then(Option::as_ref)
    }

    /// Take a descriptor out of the table
    pub fn remove(&mut self, fd: Fd) -> Option<DeviceHandle> {
        self.slots.get_mut(fd.0).and_then(Option::take)
    }

    /// Number of open descriptors
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Open descriptors in ascending order
    pub fn iter(&self) -> impl Iterator<Item = (Fd, &DeviceHandle)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.as_ref().map(|handle| (Fd(index), handle)))
    }
}

impl Default for DescriptorTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DeviceRegistry, NullDevice};
    use quill_execution::IdPool;

    fn handles(count: usize) -> Vec<DeviceHandle> {
        let mut ids = IdPool::new(8).unwrap();
        let mut registry = DeviceRegistry::new();
        registry.add(&mut ids, NullDevice::definition()).unwrap();
        (0..count)
            .map(|_| registry.open("dev_null", OpenFlags::READ).unwrap())
            .collect()
    }

    #[test]
    fn test_descriptors_reused_lowest_first() {
        let h = handles(3);
        let mut table = DescriptorTable::new();
        assert_eq!(table.insert(h[0]), Ok(Fd::new(0)));
        assert_eq!(table.insert(h[1]), Ok(Fd::new(1)));
        assert_eq!(table.insert(h[2]), Ok(Fd::new(2)));

        assert_eq!(table.remove(Fd::new(1)), Some(h[1]));
        assert_eq!(table.remove(Fd::new(1)), None);
        assert_eq!(table.get(Fd::new(2)), Some(&h[2]));
        assert_eq!(table.len(), 2);

        assert_eq!(table.insert(h[1]), Ok(Fd::new(1)));
    }

    #[test]
    fn test_limit() {
        let h = handles(2);
        let mut table = DescriptorTable::with_limit(1);
        table.insert(h[0]).unwrap();
        assert_eq!(table.insert(h[1]), Err(IoError::OutOfResources));
        assert_eq!(table.get(Fd::new(7)), None);
    }
}
