//! The session connection state machine.

use std::sync::atomic::{AtomicU8, Ordering};

/// A session's place in the handshake/run/reconnect lifecycle.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u8)]
pub enum Stage {
    Idle = 0,
    Connecting = 1,
    Handshaking = 2,
    Running = 3,
    Disconnecting = 4,
    /// Terminal: the session will never reconnect (e.g. authentication
    /// failure or an invalid shard count). Distinct from `Idle` so a caller
    /// can tell "never started" from "gave up for good".
    Dead = 5,
}

impl Stage {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Connecting,
            2 => Self::Handshaking,
            3 => Self::Running,
            4 => Self::Disconnecting,
            _ => Self::Dead,
        }
    }
}

/// An atomically readable/transitionable [`Stage`].
///
/// `Session::connect` must only ever run once concurrently per session; a
/// `compare_exchange` from `Idle`/`Disconnecting` to `Connecting` is the
/// single call that decides who, if anyone, gets to proceed.
#[derive(Debug)]
pub struct StageCell(AtomicU8);

impl StageCell {
    pub fn new(stage: Stage) -> Self {
        Self(AtomicU8::new(stage as u8))
    }

    pub fn get(&self) -> Stage {
        Stage::from_u8(self.0.load(Ordering::Acquire))
    }

    pub fn set(&self, stage: Stage) {
        self.0.store(stage as u8, Ordering::Release);
    }

    /// Attempt to move from `from` to `to`. Returns `true` if this call won
    /// the transition.
    pub fn try_transition(&self, from: Stage, to: Stage) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl Default for StageCell {
    fn default() -> Self {
        Self::new(Stage::Idle)
    }
}

#[cfg(test)]
mod tests {
    use super::{Stage, StageCell};

    #[test]
    fn only_one_caller_wins_the_connect_transition() {
        let cell = StageCell::new(Stage::Idle);

        assert!(cell.try_transition(Stage::Idle, Stage::Connecting));
        assert!(!cell.try_transition(Stage::Idle, Stage::Connecting));
        assert_eq!(cell.get(), Stage::Connecting);
    }

    #[test]
    fn dead_is_distinct_from_idle() {
        let cell = StageCell::new(Stage::Idle);
        cell.set(Stage::Dead);

        assert!(!cell.try_transition(Stage::Idle, Stage::Connecting));
        assert_eq!(cell.get(), Stage::Dead);
    }
}
