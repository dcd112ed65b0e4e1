//! # Null Device
//!
//! `dev_null`: shared, no interrupt, accepts every write and produces
//! nothing.

use crate::device::{Device, DeviceDefinition, DeviceRecv, DeviceResult, DeviceSend, OpenFlags};

/// The null device
#[derive(Debug, Clone, Copy, Default)]
pub struct NullDevice;

impl NullDevice {
    /// Registry name
    pub const NAME: &'static str = "dev_null";

    /// Table entry for the null device
    pub fn definition() -> DeviceDefinition {
        DeviceDefinition::new(Self::NAME, NullDevice)
    }
}

impl DeviceSend for NullDevice {
    fn send(&mut self, _data: &[u8], _flags: OpenFlags) -> DeviceResult<usize> {
        Ok(0)
    }
}

impl DeviceRecv for NullDevice {
    fn recv(&mut self, _buf: &mut [u8], _flags: OpenFlags) -> DeviceResult<usize> {
        Ok(0)
    }
}

impl Device for NullDevice {
    fn as_send(&mut self) -> Option<&mut dyn DeviceSend> {
        Some(self)
    }

    fn as_recv(&mut self) -> Option<&mut dyn DeviceRecv> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_transfers_nothing() {
        let mut dev = NullDevice;
        let mut buf = [0xffu8; 8];
        assert_eq!(dev.send(b"discard me", OpenFlags::WRITE), Ok(0));
        assert_eq!(dev.recv(&mut buf, OpenFlags::READ), Ok(0));
        assert_eq!(buf, [0xff; 8]);
    }
}
