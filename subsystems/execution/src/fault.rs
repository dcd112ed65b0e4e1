//! # Consistency Faults
//!
//! A consistency fault means kernel bookkeeping is corrupted: a WAIT thread
//! missing from its recorded queue, a bound interrupt with no handler, and
//! the like. There is no local recovery. This is the only path in the
//! crate that terminates.

use core::fmt;

/// Report a consistency fault and stop.
#[macro_export]
macro_rules! kernel_fault {
    ($($arg:tt)*) => {
        $crate::fault::consistency_fault(format_args!($($arg)*))
    };
}

/// Log the violated invariant and panic.
#[cold]
#[track_caller]
pub fn consistency_fault(args: fmt::Arguments<'_>) -> ! {
    log::error!("[fault] kernel consistency fault: {}", args);
    panic!("kernel consistency fault: {}", args)
}
