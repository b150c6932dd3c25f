//! MUX sub-state-machine.
//!
//! Tracks the authoritative MUX direction as confirmed by orchagent (via
//! STATE_DB) and by the cable driver (probe responses). `Wait` is entered
//! after a switch request and left on a matching confirmation or on the
//! mux-wait timeout; `Unknown` drives periodic driver probes with
//! exponential backoff; `Error` is terminal for the decision cycle and is
//! only left through reconfiguration or an unambiguous driver confirmation.

use crate::state::MuxState;
use std::time::Duration;

/// Initial driver-probe backoff.
const PROBE_BACKOFF_INITIAL_MS: u64 = 100;
/// Backoff doubles up to this cap.
const PROBE_BACKOFF_CAP_MS: u64 = 1_600;

/// Outcome of a mux-wait timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitTimeoutOutcome {
    /// Below the retry bound: probe the driver and keep trying.
    Retry,
    /// Retry bound exhausted: the MUX is declared in error.
    Error,
}

#[derive(Debug)]
pub struct MuxStateMachine {
    state: MuxState,
    /// Target of the outstanding switch request while in `Wait`.
    wait_target: Option<MuxState>,
    /// Switch attempts since the last confirmed state.
    switch_attempts: u32,
    probe_backoff_ms: u64,
}

impl MuxStateMachine {
    pub fn new(initial: MuxState) -> Self {
        Self {
            state: initial,
            wait_target: None,
            switch_attempts: 0,
            probe_backoff_ms: PROBE_BACKOFF_INITIAL_MS,
        }
    }

    pub fn state(&self) -> MuxState {
        self.state
    }

    pub fn wait_target(&self) -> Option<MuxState> {
        self.wait_target
    }

    /// Enters `Wait` after a switch request toward `target`. Counts the
    /// attempt toward the retry bound.
    pub fn enter_wait(&mut self, target: MuxState) {
        self.state = MuxState::Wait;
        self.wait_target = Some(target);
        self.switch_attempts += 1;
    }

    /// Applies a confirmed state from the store or driver. A definitive
    /// answer clears the attempt counter and probe backoff. `Error` is only
    /// cleared by a definitive Active/Standby confirmation.
    pub fn confirm(&mut self, confirmed: MuxState) -> Option<MuxState> {
        match confirmed {
            MuxState::Active | MuxState::Standby => {
                self.wait_target = None;
                self.switch_attempts = 0;
                self.reset_backoff();
            }
            MuxState::Unknown => {
                if self.state == MuxState::Error {
                    // Error requires an unambiguous answer to clear
                    return None;
                }
                self.wait_target = None;
            }
            _ => {}
        }
        if self.state == confirmed {
            return None;
        }
        self.state = confirmed;
        Some(confirmed)
    }

    /// Forces the state without touching retry bookkeeping. Used for the
    /// immediate link-down yield and config-forced switches.
    pub fn force(&mut self, state: MuxState) -> Option<MuxState> {
        self.wait_target = None;
        if state != MuxState::Wait {
            self.switch_attempts = 0;
            self.reset_backoff();
        }
        if self.state == state {
            return None;
        }
        self.state = state;
        Some(state)
    }

    /// Handles the mux-wait timeout. Below the retry bound the machine
    /// degrades to `Unknown` (the caller schedules a driver probe); once
    /// the bound is reached it degrades to `Error`.
    pub fn handle_wait_timeout(&mut self, retry_count: u32) -> WaitTimeoutOutcome {
        self.wait_target = None;
        if self.switch_attempts >= retry_count.max(1) {
            self.state = MuxState::Error;
            self.switch_attempts = 0;
            WaitTimeoutOutcome::Error
        } else {
            self.state = MuxState::Unknown;
            WaitTimeoutOutcome::Retry
        }
    }

    /// Returns the current probe backoff and doubles it for the next call.
    pub fn next_probe_backoff(&mut self) -> Duration {
        let current = self.probe_backoff_ms;
        self.probe_backoff_ms = (self.probe_backoff_ms * 2).min(PROBE_BACKOFF_CAP_MS);
        Duration::from_millis(current)
    }

    pub fn reset_backoff(&mut self) {
        self.probe_backoff_ms = PROBE_BACKOFF_INITIAL_MS;
    }
}
