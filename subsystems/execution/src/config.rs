//! # Executive Configuration

use crate::{ExecError, ExecResult};
use quill_hal::EntryPoint;
use static_assertions::const_assert;

/// Configuration for the executive
#[derive(Debug, Clone)]
pub struct ExecConfig {
    /// Number of discrete priority levels (0 = idle, highest = most urgent)
    pub priority_levels: usize,
    /// Priority used when a creation request does not name one
    pub default_priority: u8,
    /// Stack size allocated when the caller does not supply a stack
    pub default_stack_size: usize,
    /// Alignment of allocated stacks
    pub stack_alignment: usize,
    /// Capacity of the identifier pool
    pub max_ids: u32,
    /// Where a thread lands if its entry function returns
    pub exit_trampoline: EntryPoint,
    /// Body of the idle thread. The embedding kernel normally supplies a
    /// loop that re-enters the dispatcher.
    pub idle_entry: EntryPoint,
}

impl ExecConfig {
    /// Default number of priority levels
    pub const DEFAULT_PRIORITY_LEVELS: usize = 64;
    /// Upper bound on priority levels (priorities are stored in a `u8`)
    pub const MAX_PRIORITY_LEVELS: usize = 256;
    /// Default thread priority
    pub const DEFAULT_PRIORITY: u8 = 32;
    /// Default stack size: 16 KiB
    pub const DEFAULT_STACK_SIZE: usize = 16 * 1024;
    /// Default stack alignment
    pub const DEFAULT_STACK_ALIGNMENT: usize = 16;
    /// Default identifier pool capacity
    pub const DEFAULT_MAX_IDS: u32 = 1024;

    /// Create default configuration
    pub fn new() -> Self {
        Self {
            priority_levels: Self::DEFAULT_PRIORITY_LEVELS,
            default_priority: Self::DEFAULT_PRIORITY,
            default_stack_size: Self::DEFAULT_STACK_SIZE,
            stack_alignment: Self::DEFAULT_STACK_ALIGNMENT,
            max_ids: Self::DEFAULT_MAX_IDS,
            exit_trampoline: return_trap,
            idle_entry: idle_spin,
        }
    }

    /// A small configuration for tests and constrained targets
    pub fn small() -> Self {
        Self {
            priority_levels: 16,
            default_priority: 8,
            default_stack_size: 4 * 1024,
            max_ids: 64,
            ..Self::new()
        }
    }

    /// Check the configuration for consistency
    pub fn validate(&self) -> ExecResult<()> {
        if self.priority_levels < 2 || self.priority_levels > Self::MAX_PRIORITY_LEVELS {
            return Err(ExecError::InvalidArgument);
        }
        if self.default_priority as usize >= self.priority_levels {
            return Err(ExecError::InvalidArgument);
        }
        if !self.stack_alignment.is_power_of_two() || self.default_stack_size < self.stack_alignment {
            return Err(ExecError::InvalidArgument);
        }
        if self.max_ids == 0 {
            return Err(ExecError::InvalidArgument);
        }
        Ok(())
    }
}

impl Default for ExecConfig {
    fn default() -> Self {
        Self::new()
    }
}

const_assert!((ExecConfig::DEFAULT_PRIORITY as usize) < ExecConfig::DEFAULT_PRIORITY_LEVELS);
const_assert!(ExecConfig::DEFAULT_PRIORITY_LEVELS <= ExecConfig::MAX_PRIORITY_LEVELS);
const_assert!(ExecConfig::DEFAULT_STACK_ALIGNMENT.is_power_of_two());

/// Default exit trampoline: a thread whose entry returned without calling
/// exit parks here.
fn return_trap(_status: usize) {
    log::error!("[thread] entry returned without an exit trampoline installed");
    loop {
        core::hint::spin_loop();
    }
}

/// Default idle body: wait for an interrupt forever
fn idle_spin(_arg: usize) {
    loop {
        core::hint::spin_loop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ExecConfig::new().validate().is_ok());
        assert!(ExecConfig::small().validate().is_ok());
    }

    #[test]
    fn test_invalid_configs() {
        let mut config = ExecConfig::new();
        config.priority_levels = 1;
        assert_eq!(config.validate(), Err(ExecError::InvalidArgument));

        let mut config = ExecConfig::new();
        config.priority_levels = 300;
        assert_eq!(config.validate(), Err(ExecError::InvalidArgument));

        let mut config = ExecConfig::new();
        config.default_priority = 64;
        assert_eq!(config.validate(), Err(ExecError::InvalidArgument));

        let mut config = ExecConfig::new();
        config.stack_alignment = 12;
        assert_eq!(config.validate(), Err(ExecError::InvalidArgument));

        let mut config = ExecConfig::new();
        config.max_ids = 0;
        assert_eq!(config.validate(), Err(ExecError::InvalidArgument));
    }
}
