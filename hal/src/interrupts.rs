//! # Interrupt Controller Abstraction
//!
//! The core never touches interrupt hardware directly. A device that
//! declares an interrupt handler gets its line claimed and enabled through
//! this trait, and the architecture layer calls back into the device
//! registry when the line fires.

use crate::HalResult;

/// Interrupt line number
pub type InterruptLine = u32;

/// Interrupt controller abstraction
pub trait InterruptController: Send {
    /// Get the number of interrupt lines
    fn line_count(&self) -> usize;

    /// Claim a line for a handler.
    ///
    /// Fails with [`crate::HalError::ResourceBusy`] if the line is
    /// already claimed.
    fn register(&mut self, line: InterruptLine) -> HalResult<()>;

    /// Release a previously claimed line
    fn unregister(&mut self, line: InterruptLine) -> HalResult<()>;

    /// Unmask a line
    fn enable_line(&mut self, line: InterruptLine) -> HalResult<()>;

    /// Mask a line
    fn disable_line(&mut self, line: InterruptLine) -> HalResult<()>;

    /// Check if a line is unmasked
    fn is_line_enabled(&self, line: InterruptLine) -> bool;

    /// Acknowledge an interrupt (signal end of handling)
    fn acknowledge(&mut self, line: InterruptLine);
}
