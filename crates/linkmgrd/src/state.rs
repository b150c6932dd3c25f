//! State labels and composite state types for the per-port state machines.

use crate::error::LinkMgrError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Link prober state for the own-side axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkProberState {
    /// Receiving our own heartbeats; this ToR carries the traffic.
    Active,
    /// Reached only via the composite machine after a confirmed switch to
    /// standby; the prober itself never transitions here directly.
    Standby,
    /// Heartbeats lost for the configured negative signal count.
    Unknown,
    /// Initial state; no classification yet.
    Wait,
}

impl LinkProberState {
    pub const COUNT: usize = 4;

    pub const fn index(self) -> usize {
        match self {
            LinkProberState::Active => 0,
            LinkProberState::Standby => 1,
            LinkProberState::Unknown => 2,
            LinkProberState::Wait => 3,
        }
    }
}

impl fmt::Display for LinkProberState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LinkProberState::Active => "Active",
            LinkProberState::Standby => "Standby",
            LinkProberState::Unknown => "Unknown",
            LinkProberState::Wait => "Wait",
        };
        write!(f, "{}", s)
    }
}

/// Link prober state for the peer axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PeerLinkProberState {
    /// Peer heartbeats observed.
    PeerActive,
    /// Peer heartbeats lost.
    PeerUnknown,
    /// Initial state.
    PeerWait,
}

impl fmt::Display for PeerLinkProberState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PeerLinkProberState::PeerActive => "PeerActive",
            PeerLinkProberState::PeerUnknown => "PeerUnknown",
            PeerLinkProberState::PeerWait => "PeerWait",
        };
        write!(f, "{}", s)
    }
}

/// MUX direction state as tracked against driver/orchagent confirmations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MuxState {
    Active,
    Standby,
    Unknown,
    Error,
    /// A switch request is outstanding; the mux-wait timer is armed.
    Wait,
}

impl MuxState {
    pub const COUNT: usize = 5;

    pub const fn index(self) -> usize {
        match self {
            MuxState::Active => 0,
            MuxState::Standby => 1,
            MuxState::Unknown => 2,
            MuxState::Error => 3,
            MuxState::Wait => 4,
        }
    }

    /// Wire spelling used in the APP/STATE DB tables.
    pub const fn as_str(self) -> &'static str {
        match self {
            MuxState::Active => "active",
            MuxState::Standby => "standby",
            MuxState::Unknown => "unknown",
            MuxState::Error => "error",
            MuxState::Wait => "wait",
        }
    }
}

impl fmt::Display for MuxState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MuxState {
    type Err = LinkMgrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(MuxState::Active),
            "standby" => Ok(MuxState::Standby),
            "unknown" => Ok(MuxState::Unknown),
            "error" | "Error" => Ok(MuxState::Error),
            _ => Err(LinkMgrError::invalid_value("mux state", s)),
        }
    }
}

/// Link (oper status) state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkState {
    Up,
    Down,
}

impl LinkState {
    pub const COUNT: usize = 2;

    pub const fn index(self) -> usize {
        match self {
            LinkState::Up => 0,
            LinkState::Down => 1,
        }
    }
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LinkState::Up => "Up",
            LinkState::Down => "Down",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for LinkState {
    type Err = LinkMgrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(LinkState::Up),
            "down" => Ok(LinkState::Down),
            _ => Err(LinkMgrError::invalid_value("oper_status", s)),
        }
    }
}

/// Port health as published to STATE MUX_LINKMGR_TABLE.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkManagerHealth {
    Uninitialized,
    Unhealthy,
    Healthy,
}

impl LinkManagerHealth {
    pub const fn as_str(self) -> &'static str {
        match self {
            LinkManagerHealth::Uninitialized => "uninitialized",
            LinkManagerHealth::Unhealthy => "unhealthy",
            LinkManagerHealth::Healthy => "healthy",
        }
    }
}

impl fmt::Display for LinkManagerHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The composite switching-decision state: one value per axis.
///
/// This triple is the index into the composite machine's transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeState {
    pub link_prober: LinkProberState,
    pub mux: MuxState,
    pub link: LinkState,
}

impl CompositeState {
    /// Initial composite state for a newly created port.
    pub const INIT: CompositeState = CompositeState {
        link_prober: LinkProberState::Wait,
        mux: MuxState::Wait,
        link: LinkState::Down,
    };

    /// Returns true when no axis is still in a wait state; used by the
    /// warm-restart reconciliation counter.
    pub fn is_stable(&self) -> bool {
        self.link_prober != LinkProberState::Wait && self.mux != MuxState::Wait
    }
}

impl fmt::Display for CompositeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.link_prober, self.mux, self.link)
    }
}

/// Composite view of the peer ToR: prober axis plus inferred peer mux.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerCompositeState {
    pub link_prober: PeerLinkProberState,
    pub mux: MuxState,
}

impl PeerCompositeState {
    pub const INIT: PeerCompositeState = PeerCompositeState {
        link_prober: PeerLinkProberState::PeerWait,
        mux: MuxState::Wait,
    };
}

impl fmt::Display for PeerCompositeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.link_prober, self.mux)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_mux_state_round_trip() {
        for state in [MuxState::Active, MuxState::Standby, MuxState::Unknown] {
            assert_eq!(state.as_str().parse::<MuxState>().unwrap(), state);
        }
        assert!("wait".parse::<MuxState>().is_err());
        assert!("bogus".parse::<MuxState>().is_err());
    }

    #[test]
    fn test_link_state_parse() {
        assert_eq!("up".parse::<LinkState>().unwrap(), LinkState::Up);
        assert_eq!("down".parse::<LinkState>().unwrap(), LinkState::Down);
        assert!("UP".parse::<LinkState>().is_err());
    }

    #[test]
    fn test_initial_composite_state() {
        let state = CompositeState::INIT;
        assert_eq!(state.link_prober, LinkProberState::Wait);
        assert_eq!(state.mux, MuxState::Wait);
        assert_eq!(state.link, LinkState::Down);
        assert!(!state.is_stable());
    }

    #[test]
    fn test_stable_composite() {
        let state = CompositeState {
            link_prober: LinkProberState::Active,
            mux: MuxState::Active,
            link: LinkState::Up,
        };
        assert!(state.is_stable());

        let waiting = CompositeState {
            link_prober: LinkProberState::Active,
            mux: MuxState::Wait,
            link: LinkState::Up,
        };
        assert!(!waiting.is_stable());
    }

    #[test]
    fn test_axis_indices_are_dense() {
        assert_eq!(LinkProberState::Wait.index(), LinkProberState::COUNT - 1);
        assert_eq!(MuxState::Wait.index(), MuxState::COUNT - 1);
        assert_eq!(LinkState::Down.index(), LinkState::COUNT - 1);
    }
}
