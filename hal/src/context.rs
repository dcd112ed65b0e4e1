//! # Execution Contexts
//!
//! Saved-register state and the opaque switch primitive.
//!
//! The execution core treats a context as a blob it owns but never looks
//! inside; the architecture fills it in at thread creation and on every
//! switch.

use crate::VirtAddr;
use core::ptr::NonNull;

/// Thread entry point. The argument is passed in the first argument register.
pub type EntryPoint = fn(usize);

/// Thread context (saved registers)
#[derive(Debug, Clone, Default)]
pub struct ThreadContext {
    /// Instruction pointer
    pub ip: u64,
    /// Stack pointer
    pub sp: u64,
    /// General purpose registers (architecture-specific count)
    pub regs: [u64; 16],
    /// Flags register
    pub flags: u64,
}

impl ThreadContext {
    /// Index of the first-argument register in [`ThreadContext::regs`]
    pub const ARG_REG: usize = 0;
    /// Index of the link register (return address of the entry function)
    pub const LINK_REG: usize = 15;

    /// Create a context that starts at `entry(arg)` on the given stack and
    /// returns into `exit` if `entry` returns.
    pub fn new(entry: EntryPoint, arg: usize, exit: EntryPoint, stack_top: VirtAddr) -> Self {
        let mut regs = [0; 16];
        regs[Self::ARG_REG] = arg as u64;
        regs[Self::LINK_REG] = exit as usize as u64;

        Self {
            ip: entry as usize as u64,
            sp: stack_top.as_u64(),
            regs,
            flags: 0,
        }
    }

    /// Argument the context was created with
    pub fn argument(&self) -> usize {
        self.regs[Self::ARG_REG] as usize
    }
}

/// Architecture context-switch primitive
pub trait ContextSwitch: Send {
    /// Build the initial context for a new thread.
    ///
    /// `stack_top` is the highest address of the thread's stack. The
    /// architecture must arrange for `exit` to run if `entry` returns.
    fn create_context(
        &self,
        entry: EntryPoint,
        arg: usize,
        exit: EntryPoint,
        stack_top: VirtAddr,
    ) -> ThreadContext {
        ThreadContext::new(entry, arg, exit, stack_top)
    }

    /// Save the running state into `from` (none at boot) and resume `to`.
    ///
    /// Returns when something later switches back into `from`. A context
    /// whose owner has exited is never switched back into.
    ///
    /// # Safety
    /// Both pointers must be valid for the duration of the call and `to`
    /// must hold a context produced by [`ContextSwitch::create_context`] or
    /// a previous save.
    unsafe fn switch(&mut self, from: Option<NonNull<ThreadContext>>, to: NonNull<ThreadContext>);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(_arg: usize) {}
    fn exit(_status: usize) {}

    #[test]
    fn test_context_layout() {
        let ctx = ThreadContext::new(entry, 42, exit, VirtAddr::new(0x8000));
        assert_eq!(ctx.argument(), 42);
        assert_eq!(ctx.sp, 0x8000);
        assert_eq!(ctx.ip, entry as usize as u64);
        assert_eq!(ctx.regs[ThreadContext::LINK_REG], exit as usize as u64);
    }
}
