//! The replay engine's state machine.
//!
//! Kept as a closed tagged union backed by an `AtomicU8` so the derived
//! predicates (`is_fetching`, `is_replaying`) are constant-time membership tests
//! that can be queried from any thread without taking a lock.

use std::sync::atomic::{AtomicU8, Ordering};

/// The replay engine's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum EngineState {
    Idle = 0,
    ReadyForFirst = 1,
    InitialFetching = 2,
    InitialAndFinalFetching = 3,
    ReplayingAndFetching = 4,
    FinalFetching = 5,
    AllFetched = 6,
}

impl EngineState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => EngineState::Idle,
            1 => EngineState::ReadyForFirst,
            2 => EngineState::InitialFetching,
            3 => EngineState::InitialAndFinalFetching,
            4 => EngineState::ReplayingAndFetching,
            5 => EngineState::FinalFetching,
            6 => EngineState::AllFetched,
            other => unreachable!("invalid EngineState tag {other}"),
        }
    }

    /// A chunk is actively being written into a replay buffer slot.
    #[inline]
    pub fn is_fetching(self) -> bool {
        matches!(
            self,
            EngineState::InitialFetching
                | EngineState::InitialAndFinalFetching
                | EngineState::ReplayingAndFetching
                | EngineState::FinalFetching
        )
    }

    /// The consumer loop has acquired at least the first buffer and is (or is
    /// about to be) emitting tuples.
    #[inline]
    pub fn is_replaying(self) -> bool {
        matches!(
            self,
            EngineState::ReplayingAndFetching | EngineState::FinalFetching | EngineState::AllFetched
        )
    }

    #[inline]
    pub fn can_begin_chunk(self) -> bool {
        matches!(self, EngineState::ReadyForFirst | EngineState::ReplayingAndFetching)
    }
}

/// Atomic storage for [`EngineState`], shared across the feeder and engine
/// threads.
#[derive(Debug)]
pub struct AtomicEngineState(AtomicU8);

impl AtomicEngineState {
    pub fn new(initial: EngineState) -> Self {
        Self(AtomicU8::new(initial as u8))
    }

    #[inline]
    pub fn load(&self) -> EngineState {
        EngineState::from_u8(self.0.load(Ordering::Acquire))
    }

    #[inline]
    pub fn store(&self, state: EngineState) {
        self.0.store(state as u8, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicates_partition_the_fetching_states() {
        let fetching = [
            EngineState::InitialFetching,
            EngineState::InitialAndFinalFetching,
            EngineState::ReplayingAndFetching,
            EngineState::FinalFetching,
        ];
        for s in fetching {
            assert!(s.is_fetching(), "{s:?} should be fetching");
        }
        for s in [EngineState::Idle, EngineState::ReadyForFirst, EngineState::AllFetched] {
            assert!(!s.is_fetching(), "{s:?} should not be fetching");
        }
    }

    #[test]
    fn replaying_covers_the_tail_of_the_state_machine() {
        for s in [
            EngineState::ReplayingAndFetching,
            EngineState::FinalFetching,
            EngineState::AllFetched,
        ] {
            assert!(s.is_replaying());
        }
        for s in [EngineState::Idle, EngineState::ReadyForFirst, EngineState::InitialFetching] {
            assert!(!s.is_replaying());
        }
    }

    #[test]
    fn atomic_state_round_trips() {
        let s = AtomicEngineState::new(EngineState::Idle);
        assert_eq!(s.load(), EngineState::Idle);
        s.store(EngineState::ReadyForFirst);
        assert_eq!(s.load(), EngineState::ReadyForFirst);
    }
}
