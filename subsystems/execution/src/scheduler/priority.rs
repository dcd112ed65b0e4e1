//! # Priority Management
//!
//! Discrete priority levels. A larger number is more urgent; level 0
//! belongs to the idle thread.

use crate::{ExecError, ExecResult};

/// Thread priority
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Priority(u8);

impl Priority {
    /// Idle priority (lowest)
    pub const IDLE: Self = Self(0);

    /// Create a priority from a raw level
    pub const fn new(level: u8) -> Self {
        Self(level)
    }

    /// Clamp an arbitrary request into `0..levels`
    pub fn clamped(raw: i32, levels: usize) -> Self {
        let max = levels.saturating_sub(1).min(u8::MAX as usize) as i32;
        Self(raw.clamp(0, max) as u8)
    }

    /// Validate a request against `0..levels` without clamping
    pub fn checked(raw: i32, levels: usize) -> ExecResult<Self> {
        if raw < 0 || raw as usize >= levels || raw > u8::MAX as i32 {
            return Err(ExecError::InvalidArgument);
        }
        Ok(Self(raw as u8))
    }

    /// Ready-structure level index
    pub fn level(self) -> usize {
        self.0 as usize
    }

    /// Raw value
    pub fn as_u8(self) -> u8 {
        self.0
    }

    /// Check if this is the idle level
    pub fn is_idle(self) -> bool {
        self == Self::IDLE
    }
}

impl From<u8> for Priority {
    fn from(level: u8) -> Self {
        Self(level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamping() {
        assert_eq!(Priority::clamped(-5, 16), Priority::IDLE);
        assert_eq!(Priority::clamped(100, 16), Priority::new(15));
        assert_eq!(Priority::clamped(7, 16), Priority::new(7));
        assert_eq!(Priority::clamped(1000, 256), Priority::new(255));
    }

    #[test]
    fn test_checked_rejects_out_of_range() {
        assert_eq!(Priority::checked(15, 16), Ok(Priority::new(15)));
        assert_eq!(Priority::checked(16, 16), Err(ExecError::InvalidArgument));
        assert_eq!(Priority::checked(-1, 16), Err(ExecError::InvalidArgument));
    }

    #[test]
    fn test_larger_is_more_urgent() {
        assert!(Priority::new(8) > Priority::new(5));
        assert!(Priority::IDLE.is_idle());
    }
}
