//! Link prober sub-state-machine.
//!
//! Consumes the raw ICMP classification events produced by the probe
//! session and applies N-consecutive-sample hysteresis before reporting a
//! state change to the composite machine. Positive transitions (toward
//! Active/PeerActive) and negative transitions (toward Unknown/PeerUnknown)
//! use independently configured signal counts.
//!
//! The own axis never moves to `Standby` on its own; the composite machine
//! asserts `Standby` once a switch toward the peer has been confirmed.

use crate::state::{LinkProberState, PeerLinkProberState};

/// Raw classification event for one probe tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkProberEvent {
    /// Our own heartbeat echoed back.
    IcmpSelf,
    /// No heartbeat observed this tick.
    IcmpUnknown,
    /// Peer ToR heartbeat observed.
    IcmpPeerActive,
    /// No peer heartbeat observed this tick.
    IcmpPeerUnknown,
}

/// Own-axis link prober state machine.
#[derive(Debug)]
pub struct LinkProberStateMachine {
    state: LinkProberState,
    self_event_count: u32,
    unknown_event_count: u32,
}

impl LinkProberStateMachine {
    pub fn new(initial: LinkProberState) -> Self {
        Self {
            state: initial,
            self_event_count: 0,
            unknown_event_count: 0,
        }
    }

    pub fn state(&self) -> LinkProberState {
        self.state
    }

    /// Handles a self/unknown event; returns the new state when the
    /// hysteresis threshold was crossed.
    pub fn handle_event(
        &mut self,
        event: LinkProberEvent,
        positive_count: u32,
        negative_count: u32,
    ) -> Option<LinkProberState> {
        match event {
            LinkProberEvent::IcmpSelf => {
                self.unknown_event_count = 0;
                self.self_event_count += 1;
                if self.state != LinkProberState::Active
                    && self.self_event_count >= positive_count.max(1)
                {
                    return self.advance(LinkProberState::Active);
                }
                None
            }
            LinkProberEvent::IcmpUnknown => {
                self.self_event_count = 0;
                self.unknown_event_count += 1;
                if self.state != LinkProberState::Unknown
                    && self.unknown_event_count >= negative_count.max(1)
                {
                    return self.advance(LinkProberState::Unknown);
                }
                None
            }
            // peer events are handled by the peer machine
            _ => None,
        }
    }

    /// Asserts the Standby state after the composite machine confirmed a
    /// switch toward the peer. Clears the counters so a later self event
    /// needs a fresh run of positives.
    pub fn assert_standby(&mut self) -> Option<LinkProberState> {
        self.advance(LinkProberState::Standby)
    }

    fn advance(&mut self, next: LinkProberState) -> Option<LinkProberState> {
        self.self_event_count = 0;
        self.unknown_event_count = 0;
        if self.state == next {
            return None;
        }
        self.state = next;
        Some(next)
    }
}

/// Peer-axis link prober state machine. Mirrors the own axis but only
/// updates the peer composite; it never drives a MUX switch request by
/// itself.
#[derive(Debug)]
pub struct PeerLinkProberStateMachine {
    state: PeerLinkProberState,
    active_event_count: u32,
    unknown_event_count: u32,
}

impl PeerLinkProberStateMachine {
    pub fn new(initial: PeerLinkProberState) -> Self {
        Self {
            state: initial,
            active_event_count: 0,
            unknown_event_count: 0,
        }
    }

    pub fn state(&self) -> PeerLinkProberState {
        self.state
    }

    pub fn handle_event(
        &mut self,
        event: LinkProberEvent,
        positive_count: u32,
        negative_count: u32,
    ) -> Option<PeerLinkProberState> {
        match event {
            LinkProberEvent::IcmpPeerActive => {
                self.unknown_event_count = 0;
                self.active_event_count += 1;
                if self.state != PeerLinkProberState::PeerActive
                    && self.active_event_count >= positive_count.max(1)
                {
                    return self.advance(PeerLinkProberState::PeerActive);
                }
                None
            }
            LinkProberEvent::IcmpPeerUnknown => {
                self.active_event_count = 0;
                self.unknown_event_count += 1;
                if self.state != PeerLinkProberState::PeerUnknown
                    && self.unknown_event_count >= negative_count.max(1)
                {
                    return self.advance(PeerLinkProberState::PeerUnknown);
                }
                None
            }
            _ => None,
        }
    }

    fn advance(&mut self, next: PeerLinkProberState) -> Option<PeerLinkProberState> {
        self.active_event_count = 0;
        self.unknown_event_count = 0;
        if self.state == next {
            return None;
        }
        self.state = next;
        Some(next)
    }
}
