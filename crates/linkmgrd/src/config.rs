//! Process-wide and per-port MUX configuration.

use crate::error::LinkMgrError;
use serde::{Deserialize, Serialize};
use sonic_types::{Ipv4Address, MacAddress};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Per-port configuration mode from `CONFIG_DB MUX_CABLE.<port>.state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum MuxMode {
    /// Prober-driven switching decisions.
    #[default]
    Auto,
    /// Pinned active; prober-driven standby switches are suppressed.
    Active,
    /// Pinned standby.
    Standby,
    /// Track state only; never write switch requests.
    Manual,
    /// Own-side decisions only; peer-driven actions and peer writes are
    /// suppressed.
    Detached,
}

impl fmt::Display for MuxMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MuxMode::Auto => "auto",
            MuxMode::Active => "active",
            MuxMode::Standby => "standby",
            MuxMode::Manual => "manual",
            MuxMode::Detached => "detach",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for MuxMode {
    type Err = LinkMgrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(MuxMode::Auto),
            "active" => Ok(MuxMode::Active),
            "standby" => Ok(MuxMode::Standby),
            "manual" => Ok(MuxMode::Manual),
            "detach" => Ok(MuxMode::Detached),
            _ => Err(LinkMgrError::invalid_value("mux config mode", s)),
        }
    }
}

/// Cable kind from `CONFIG_DB MUX_CABLE.<port>.cable_type`.
///
/// Only active-standby cables are managed; other kinds are registered but
/// ignored by the switching core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum CableType {
    #[default]
    ActiveStandby,
    Other,
}

impl CableType {
    pub fn from_config(value: &str) -> CableType {
        match value {
            "active-standby" => CableType::ActiveStandby,
            _ => CableType::Other,
        }
    }
}

/// Process-wide tunables, populated from the CLI and from
/// `CONFIG_DB MUX_LINKMGR.LINK_PROBER`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MuxConfig {
    /// Heartbeat interval for IPv4 probing, milliseconds.
    pub interval_v4_ms: u64,
    /// Heartbeat interval for IPv6 probing, milliseconds (probing itself is
    /// stubbed; the knob is tracked for config completeness).
    pub interval_v6_ms: u64,
    /// Consecutive positive events required to advance to Active/PeerActive.
    pub positive_signal_count: u32,
    /// Consecutive negative events required to advance to Unknown/PeerUnknown.
    pub negative_signal_count: u32,
    /// Heartbeat suspension window used around a standby switchover,
    /// milliseconds.
    pub suspend_timer_ms: u64,
    /// Bound on switch request retries before declaring MUX Error.
    pub mux_state_change_retry_count: u32,
    /// Consecutive link samples required to accept a link state change.
    pub link_state_change_retry_count: u32,
    /// How long to wait for a switch confirmation before probing,
    /// milliseconds.
    pub mux_wait_timeout_ms: u64,
    /// How long to wait for the first prober classification after link up,
    /// milliseconds.
    pub probe_wait_timeout_ms: u64,
    /// Fallback warm-restart reconciliation window, seconds.
    pub reconciliation_timeout_secs: u64,
    /// Gate probing on IPv4 default route presence.
    pub enable_default_route_feature: bool,
    /// Emit switchover timing metric rows.
    pub enable_switchover_measurement: bool,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            interval_v4_ms: 100,
            interval_v6_ms: 1000,
            positive_signal_count: 1,
            negative_signal_count: 3,
            suspend_timer_ms: 500,
            mux_state_change_retry_count: 3,
            link_state_change_retry_count: 1,
            mux_wait_timeout_ms: 1_000,
            probe_wait_timeout_ms: 1_000,
            reconciliation_timeout_secs: 30,
            enable_default_route_feature: false,
            enable_switchover_measurement: true,
        }
    }
}

impl MuxConfig {
    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.interval_v4_ms)
    }

    pub fn suspend_timeout(&self) -> Duration {
        Duration::from_millis(self.suspend_timer_ms)
    }

    pub fn mux_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.mux_wait_timeout_ms)
    }

    pub fn probe_wait_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_wait_timeout_ms)
    }

    /// Applies one LINK_PROBER field from CONFIG_DB. Unknown fields are
    /// ignored so schema additions do not break older daemons.
    pub fn apply_link_prober_field(&mut self, field: &str, value: &str) -> Result<(), LinkMgrError> {
        let parsed = value
            .parse::<u64>()
            .map_err(|_| LinkMgrError::invalid_value(field, value))?;
        match field {
            "interval_v4" => self.interval_v4_ms = parsed,
            "interval_v6" => self.interval_v6_ms = parsed,
            "positive_signal_count" => self.positive_signal_count = parsed as u32,
            "negative_signal_count" => self.negative_signal_count = parsed as u32,
            "suspend_timer" => self.suspend_timer_ms = parsed,
            _ => {}
        }
        Ok(())
    }
}

/// Per-port configuration owned by the MuxPort.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MuxPortConfig {
    /// Port name, e.g. `"Ethernet4"`.
    pub port_name: String,
    /// Server/blade id derived from the port name suffix.
    pub server_id: u16,
    /// Server (blade) IPv4 address; probes target this.
    pub server_ipv4: Option<Ipv4Address>,
    /// Server MAC, learned lazily from kernel neighbor events.
    pub server_mac: Option<MacAddress>,
    /// Cable kind.
    pub cable_type: CableType,
    /// Configuration mode.
    pub mode: MuxMode,
}

impl MuxPortConfig {
    pub fn new(port_name: impl Into<String>) -> Self {
        let port_name = port_name.into();
        let server_id = sonic_types::server_id_from_port_name(&port_name).unwrap_or(0);
        Self {
            port_name,
            server_id,
            server_ipv4: None,
            server_mac: None,
            cable_type: CableType::default(),
            mode: MuxMode::default(),
        }
    }
}
