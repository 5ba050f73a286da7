use std::sync::atomic::{AtomicU8, Ordering};

const OPEN: u8 = 0;
const CANCELLED: u8 = 1;
const COMMITTED: u8 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateState {
    Open,
    Cancelled,
    Committed,
}

/// Cancellation gate for one Pending alert.
///
/// The user's cancel and the countdown's dispatch race for a single
/// compare-and-swap out of `Open`. Exactly one of them wins, and the loser
/// observes the winner's state. Once closed the gate never reopens.
#[derive(Debug, Default)]
pub struct CancellationGate {
    state: AtomicU8,
}

impl CancellationGate {
    pub fn new() -> Self {
        CancellationGate {
            state: AtomicU8::new(OPEN),
        }
    }

    /// Returns true if this call moved the gate to Cancelled.
    pub fn try_cancel(&self) -> bool {
        self.close(CANCELLED)
    }

    /// Returns true if this call moved the gate to Committed.
    pub fn try_commit(&self) -> bool {
        self.close(COMMITTED)
    }

    pub fn state(&self) -> GateState {
        match self.state.load(Ordering::SeqCst) {
            CANCELLED => GateState::Cancelled,
            COMMITTED => GateState::Committed,
            _ => GateState::Open,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state() == GateState::Open
    }

    fn close(&self, to: u8) -> bool {
        self.state
            .compare_exchange(OPEN, to, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}
