//! Connection lifecycle state.

use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle of a [`Connection`](super::Connection).
///
/// Transitions only move forward: `Created → Started → Stopped`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Constructed, reader and writer not yet spawned.
    Created,
    /// Reader and writer tasks are running.
    Started,
    /// Teardown has begun or finished; sends fail fast.
    Stopped,
}

impl ConnectionState {
    const fn as_u8(self) -> u8 {
        match self {
            Self::Created => 0,
            Self::Started => 1,
            Self::Stopped => 2,
        }
    }

    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Created,
            1 => Self::Started,
            _ => Self::Stopped,
        }
    }
}

/// Atomic cell holding a [`ConnectionState`].
#[derive(Debug)]
pub(super) struct AtomicState(AtomicU8);

impl AtomicState {
    pub(super) const fn new() -> Self { Self(AtomicU8::new(ConnectionState::Created.as_u8())) }

    pub(super) fn get(&self) -> ConnectionState {
        ConnectionState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Move `Created` to `Started`. Has no effect in any other state.
    pub(super) fn mark_started(&self) {
        let _ = self.0.compare_exchange(
            ConnectionState::Created.as_u8(),
            ConnectionState::Started.as_u8(),
            Ordering::AcqRel,
            Ordering::Acquire,
        );
    }

    /// Move to `Stopped`, returning `true` for the single caller that
    /// performed the transition.
    pub(super) fn mark_stopped(&self) -> bool {
        self.0.swap(ConnectionState::Stopped.as_u8(), Ordering::AcqRel)
            != ConnectionState::Stopped.as_u8()
    }
}

const START_PENDING: u8 = 0;
const START_RUNNING: u8 = 1;
const START_DONE: u8 = 2;
const START_SKIPPED: u8 = 3;
const STOP_OWED: u8 = 4;

/// Orders the start hook before the stop hook.
///
/// The reader claims the start hook with [`StartGate::begin`]. A stop that
/// arrives while the hook runs is handed to the reader, which tears the
/// connection down once [`StartGate::finish`] reports it owed. A stop that
/// arrives before the reader starts skips the start hook entirely.
#[derive(Debug)]
pub(super) struct StartGate(AtomicU8);

impl StartGate {
    pub(super) const fn new() -> Self { Self(AtomicU8::new(START_PENDING)) }

    /// Claim the start hook. Returns `false` if the connection stopped first.
    pub(super) fn begin(&self) -> bool {
        self.0
            .compare_exchange(START_PENDING, START_RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Record that the start hook returned. Returns `true` if a stop arrived
    /// while it ran and teardown is now owed by the caller.
    pub(super) fn finish(&self) -> bool { self.0.swap(START_DONE, Ordering::AcqRel) == STOP_OWED }

    /// Called once by the stopping side. Returns `true` if teardown may run
    /// now, `false` if the running start hook's owner will run it.
    pub(super) fn stop(&self) -> bool {
        match self.0.compare_exchange(
            START_PENDING,
            START_SKIPPED,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => true,
            Err(START_RUNNING) => self
                .0
                .compare_exchange(START_RUNNING, STOP_OWED, Ordering::AcqRel, Ordering::Acquire)
                .is_err(),
            Err(_) => true,
        }
    }
}
