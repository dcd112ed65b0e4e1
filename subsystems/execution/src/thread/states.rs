//! # Thread States
//!
//! Thread state machine definition.
//!
//! ```text
//! create -> READY <-> ACTIVE
//! READY | ACTIVE -> WAIT       (enqueue)      WAIT -> READY       (release)
//! READY | ACTIVE -> SUSPENDED  (suspend)      SUSPENDED -> READY  (resume)
//! any but PASSIVE -> PASSIVE   (exit)
//! ```

/// Thread state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ThreadState {
    /// In the ready structure, waiting to be dispatched
    Ready = 0,
    /// Currently running (exactly one thread after boot)
    Active = 1,
    /// Linked into a blocking queue
    Wait = 2,
    /// Parked by an explicit suspend, possibly with a cancellation hook
    Suspended = 3,
    /// Finished; exit status is valid
    Passive = 4,
}

impl ThreadState {
    /// Convert from u32
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Ready),
            1 => Some(Self::Active),
            2 => Some(Self::Wait),
            3 => Some(Self::Suspended),
            4 => Some(Self::Passive),
            _ => None,
        }
    }

    /// Convert to u32
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    /// Check if thread can be dispatched
    pub fn is_runnable(&self) -> bool {
        matches!(self, ThreadState::Ready | ThreadState::Active)
    }

    /// Check if thread is blocked (queued or suspended)
    pub fn is_blocked(&self) -> bool {
        matches!(self, ThreadState::Wait | ThreadState::Suspended)
    }

    /// Check if thread has finished
    pub fn is_terminated(&self) -> bool {
        matches!(self, ThreadState::Passive)
    }

    /// Valid transitions from this state
    pub fn valid_transitions(&self) -> &'static [ThreadState] {
        match self {
            ThreadState::Ready => &[
                ThreadState::Active,
                ThreadState::Wait,
                ThreadState::Suspended,
                ThreadState::Passive,
            ],
            ThreadState::Active => &[
                ThreadState::Ready,
                ThreadState::Wait,
                ThreadState::Suspended,
                ThreadState::Passive,
            ],
            ThreadState::Wait => &[ThreadState::Ready, ThreadState::Passive],
            ThreadState::Suspended => &[ThreadState::Ready, ThreadState::Passive],
            ThreadState::Passive => &[],
        }
    }

    /// Check a single transition
    pub fn can_transition_to(&self, next: ThreadState) -> bool {
        self.valid_transitions().contains(&next)
    }
}

impl Default for ThreadState {
    fn default() -> Self {
        ThreadState::Ready
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_passive_is_final() {
        assert!(ThreadState::Passive.valid_transitions().is_empty());
        for state in [
            ThreadState::Ready,
            ThreadState::Active,
            ThreadState::Wait,
            ThreadState::Suspended,
        ] {
            assert!(state.can_transition_to(ThreadState::Passive));
        }
    }

    #[test]
    fn test_blocked_states_only_return_through_ready() {
        assert!(ThreadState::Wait.can_transition_to(ThreadState::Ready));
        assert!(!ThreadState::Wait.can_transition_to(ThreadState::Active));
        assert!(!ThreadState::Suspended.can_transition_to(ThreadState::Active));
        assert!(!ThreadState::Suspended.can_transition_to(ThreadState::Wait));
    }

    #[test]
    fn test_u32_conversion() {
        for raw in 0..5 {
            let state = ThreadState::from_u32(raw).unwrap();
            assert_eq!(state.as_u32(), raw);
        }
        assert_eq!(ThreadState::from_u32(5), None);
    }
}
