// SPDX-License-Identifier: MIT OR Apache-2.0
//! Evaluation gate: decides whether an evaluation request runs now or waits.
//!
//! The network is single threaded, so "locking" is a reentrant counter rather
//! than a mutex. While anything holds the gate, requests only set one pending
//! flag; the holder that brings the gate back to idle drains it. Any number of
//! requests while held coalesce into a single pass.

/// What currently holds the gate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateState {
    /// Nothing holds the gate; requests run immediately
    Idle,
    /// Held by `n` nested locks
    Locked(usize),
    /// An evaluation pass is running
    Evaluating,
    /// Property link propagation is running
    Linking,
}

/// Reentrant lock with a single "pending evaluation" flag
#[derive(Debug, Default)]
pub struct EvaluationGate {
    locks: usize,
    evaluating: bool,
    linking: usize,
    pending: bool,
}

impl EvaluationGate {
    /// Create an idle gate
    pub fn new() -> Self {
        Self::default()
    }

    /// Current state; linking shadows evaluating, which shadows locks
    pub fn state(&self) -> GateState {
        if self.linking > 0 {
            GateState::Linking
        } else if self.evaluating {
            GateState::Evaluating
        } else if self.locks > 0 {
            GateState::Locked(self.locks)
        } else {
            GateState::Idle
        }
    }

    /// Number of nested locks held, whatever else holds the gate
    pub fn lock_count(&self) -> usize {
        self.locks
    }

    /// Whether nothing holds the gate
    pub fn is_idle(&self) -> bool {
        self.state() == GateState::Idle
    }

    /// Whether an evaluation is waiting for the gate to open
    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Record a request; returns `true` if it must wait (the gate is held)
    pub fn defer(&mut self) -> bool {
        if self.is_idle() {
            false
        } else {
            self.pending = true;
            true
        }
    }

    /// Mark an evaluation as wanted without checking the state
    pub fn set_pending(&mut self) {
        self.pending = true;
    }

    /// Clear and return the pending flag
    pub fn take_pending(&mut self) -> bool {
        std::mem::take(&mut self.pending)
    }

    /// Acquire one lock level
    pub fn lock(&mut self) {
        self.locks += 1;
    }

    /// Release one lock level.
    ///
    /// Returns `true` when the gate became idle with a request pending; the
    /// caller is then responsible for running it.
    pub fn unlock(&mut self) -> bool {
        if self.locks == 0 {
            tracing::warn!("Unbalanced network unlock ignored");
            return false;
        }
        self.locks -= 1;
        self.drainable()
    }

    /// Enter an evaluation pass; `false` if the gate was not idle
    pub fn begin_evaluation(&mut self) -> bool {
        if !self.is_idle() {
            return false;
        }
        self.evaluating = true;
        true
    }

    /// Leave an evaluation pass; returns `true` if a request arrived meanwhile
    pub fn end_evaluation(&mut self) -> bool {
        self.evaluating = false;
        self.drainable()
    }

    /// Enter link propagation (may nest, and may happen mid-evaluation)
    pub fn begin_linking(&mut self) {
        self.linking += 1;
    }

    /// Leave link propagation; returns `true` when the gate became idle with a request pending
    pub fn end_linking(&mut self) -> bool {
        self.linking = self.linking.saturating_sub(1);
        self.drainable()
    }

    fn drainable(&self) -> bool {
        self.is_idle() && self.pending
    }
}
