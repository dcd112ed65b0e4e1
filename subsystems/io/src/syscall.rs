//! # Device System Calls
//!
//! Entry points behind `open`, `close`, `read` and `write`. Arguments
//! arrive already copied in from user space. Every call stores its
//! outcome on the calling thread: errno on failure, the byte count (or
//! zero) in the return-value slot on success.

use crate::descriptor::{DescriptorTable, Fd};
use crate::device::OpenFlags;
use crate::kernel::Kernel;
use crate::{IoError, IoResult};

impl Kernel {
    /// Open a device and bind it to the lowest free descriptor
    pub fn sys_open(&mut self, table: &mut DescriptorTable, name: &str, flags: OpenFlags) -> IoResult<Fd> {
        let result = self.devices.open(name, flags).and_then(|handle| {
            table.insert(handle).map_err(|error| {
                // Undo the open; the handle was never published
                if let Err(undo) = self.devices.close(handle) {
                    log::warn!("[dev] undoing open of {} failed: {:?}", name, undo);
                }
                error
            })
        });
        let result = self.exec.record(result);
        if let Ok(fd) = result {
            log::trace!("[dev] sys_open {} -> fd {}", name, fd.as_usize());
        }
        result
    }

    /// Release a descriptor and close its device handle
    pub fn sys_close(&mut self, table: &mut DescriptorTable, fd: Fd) -> IoResult<()> {
        let result = match table.remove(fd) {
            Some(handle) => self.devices.close(handle),
            None => Err(IoError::InvalidArgument),
        };
        self.exec.record(result)
    }

    /// Read from the device behind `fd`
    pub fn sys_read(&mut self, table: &DescriptorTable, fd: Fd, buf: &mut [u8]) -> IoResult<usize> {
        let result = match table.get(fd) {
            None => Err(IoError::InvalidArgument),
            Some(_) if buf.is_empty() => Err(IoError::InvalidArgument),
            Some(handle) => self.devices.recv(handle, buf),
        };
        self.finish_transfer(result)
    }

    /// Write to the device behind `fd`
    pub fn sys_write(&mut self, table: &DescriptorTable, fd: Fd, data: &[u8]) -> IoResult<usize> {
        let result = match table.get(fd) {
            None => Err(IoError::InvalidArgument),
            Some(_) if data.is_empty() => Err(IoError::InvalidArgument),
            Some(handle) => self.devices.send(handle, data),
        };
        self.finish_transfer(result)
    }

    fn finish_transfer(&mut self, result: IoResult<usize>) -> IoResult<usize> {
        let result = self.exec.record(result);
        if let Ok(count) = result {
            let retval = isize::try_from(count).unwrap_or(isize::MAX);
            // No active thread before start; record already skipped it
            if self.exec.active().is_some() {
                if let Err(error) = self.exec.set_retval(None, retval) {
                    log::warn!("[dev] storing transfer count failed: {:?}", error);
                }
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::KernelConfig;
    use alloc::boxed::Box;
    use quill_execution::errno;
    use quill_hal::arch_stubs::{HeapAllocator, StubContextSwitch, StubInterruptController};

    fn kernel() -> Kernel {
        let mut kernel = Kernel::new(
            KernelConfig::small(),
            Box::new(StubContextSwitch::new()),
            Box::new(HeapAllocator::new()),
            Box::new(StubInterruptController::new(4)),
        )
        .unwrap();
        kernel.start().unwrap();
        kernel
    }

    #[test]
    fn test_open_write_close() {
        let mut kernel = kernel();
        let mut table = DescriptorTable::new();

        let fd = kernel.sys_open(&mut table, "dev_null", OpenFlags::WRITE).unwrap();
        assert_eq!(fd, Fd::new(0));
        assert_eq!(kernel.sys_write(&table, fd, b"hello"), Ok(0));
        assert_eq!(kernel.executive().retval(None), Ok(0));

        kernel.sys_close(&mut table, fd).unwrap();
        assert!(table.is_empty());
        let null = kernel.find_device("dev_null").unwrap();
        assert!(!kernel.device_info(null).unwrap().open);
    }

    #[test]
    fn test_errors_set_errno() {
        let mut kernel = kernel();
        let mut table = DescriptorTable::new();

        assert_eq!(kernel.sys_open(&mut table, "uart7", OpenFlags::READ), Err(IoError::NoSuchDevice));
        assert_eq!(kernel.executive().errno(None), Ok(errno::ENODEV));
        assert_eq!(kernel.executive().retval(None), Ok(-1));

        let mut buf = [0u8; 4];
        assert_eq!(kernel.sys_read(&table, Fd::new(3), &mut buf), Err(IoError::InvalidArgument));
        assert_eq!(kernel.executive().errno(None), Ok(errno::EINVAL));

        assert_eq!(kernel.sys_close(&mut table, Fd::new(0)), Err(IoError::InvalidArgument));
    }

    #[test]
    fn test_zero_length_transfer_rejected() {
        let mut kernel = kernel();
        let mut table = DescriptorTable::new();
        let fd = kernel.sys_open(&mut table, "dev_null", OpenFlags::READ).unwrap();

        assert_eq!(kernel.sys_read(&table, fd, &mut []), Err(IoError::InvalidArgument));
        assert_eq!(kernel.sys_write(&table, fd, &[]), Err(IoError::InvalidArgument));
    }

    #[test]
    fn test_full_table_undoes_open() {
        let mut kernel = kernel();
        let mut table = DescriptorTable::with_limit(1);
        kernel.sys_open(&mut table, "dev_null", OpenFlags::READ).unwrap();

        assert_eq!(
            kernel.sys_open(&mut table, "dev_null", OpenFlags::READ),
            Err(IoError::OutOfResources)
        );
        let null = kernel.find_device("dev_null").unwrap();
        assert_eq!(kernel.device_info(null).unwrap().open_count, 1);
        assert_eq!(kernel.executive().errno(None), Ok(errno::ENOMEM));
    }
}
