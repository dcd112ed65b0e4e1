//! # Thread Management
//!
//! Thread descriptors, the registry that owns them, and the lifecycle
//! operations that move them through the state machine.

mod lifecycle;
pub mod registry;
pub mod states;
#[allow(clippy::module_inception)]
pub mod thread;

pub use registry::*;
pub use states::*;
pub use thread::*;
