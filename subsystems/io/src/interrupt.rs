//! # Interrupt Dispatch
//!
//! The architecture layer calls [`DeviceRegistry::dispatch`] when a line
//! fires. The bound device's handler runs to completion with an
//! [`InterruptScope`]: it may release waiting threads and hand them a
//! value, but it cannot block or dispatch. A handler never sees the
//! registry, so dispatch cannot nest.

use crate::registry::DeviceRegistry;
use crate::{IoError, IoResult};
use quill_execution::{Executive, QueueHandle, ThreadHandle};
use quill_hal::{InterruptController, InterruptLine};

/// What an interrupt handler may do to the executive
#[derive(Debug)]
pub struct InterruptScope<'a> {
    exec: &'a mut Executive,
    released: usize,
}

impl<'a> InterruptScope<'a> {
    pub(crate) fn new(exec: &'a mut Executive) -> Self {
        Self { exec, released: 0 }
    }

    /// Move the head of `queue` to the ready structure
    pub fn release_one(&mut self, queue: QueueHandle) -> IoResult<bool> {
        let released = self.exec.release_one(queue)?;
        self.released += usize::from(released);
        Ok(released)
    }

    /// Move every waiter of `queue` to the ready structure
    pub fn release_all(&mut self, queue: QueueHandle) -> IoResult<usize> {
        let released = self.exec.release_all(queue)?;
        self.released += released;
        Ok(released)
    }

    /// Number of threads waiting on `queue`
    pub fn queue_len(&self, queue: QueueHandle) -> IoResult<usize> {
        Ok(self.exec.queue_len(queue)?)
    }

    /// Head of `queue`, if any
    pub fn first_waiter(&self, queue: QueueHandle) -> IoResult<Option<ThreadHandle>> {
        Ok(self.exec.waiters(queue)?.first().copied())
    }

    /// Hand a value (a wake reason, a received byte) to a thread
    pub fn set_private_param(&mut self, thread: ThreadHandle, value: usize) -> IoResult<()> {
        Ok(self.exec.set_private_param(Some(thread), value)?)
    }

    /// Threads released so far in this interrupt
    pub fn released(&self) -> usize {
        self.released
    }
}

impl DeviceRegistry {
    /// Run the handler bound to `line`.
    ///
    /// An unbound line is spurious: it is logged and reported as
    /// [`IoError::NoSuchDevice`]. A binding that no longer resolves to a
    /// registered handler-capable device is a consistency fault.
    pub fn dispatch(
        &mut self,
        line: InterruptLine,
        exec: &mut Executive,
        controller: &mut dyn InterruptController,
    ) -> IoResult<()> {
        let Some(&key) = self.bindings.get(&line) else {
            log::warn!("[irq] spurious interrupt on line {}", line);
            controller.acknowledge(line);
            return Err(IoError::NoSuchDevice);
        };

        let Some(dev) = self.devices.get_mut(key) else {
            quill_execution::kernel_fault!("line {} bound to unregistered device {:?}", line, key);
        };
        if !dev.bound || dev.interrupt_line != Some(line) {
            quill_execution::kernel_fault!("line {} bound to {} which does not claim it", line, dev.name);
        }
        let Some(handler) = dev.driver.as_interrupt() else {
            quill_execution::kernel_fault!("device {} bound to line {} has no handler", dev.name, line);
        };

        let mut scope = InterruptScope::new(exec);
        let result = handler.handle(line, &mut scope);
        let released = scope.released();
        controller.acknowledge(line);

        log::trace!("[irq] line {} handled by {}, {} thread(s) released", line, dev.name, released);
        result.map_err(|error| {
            log::warn!("[irq] handler of {} failed: {:?}", dev.name, error);
            IoError::Device(error)
        })
    }
}
