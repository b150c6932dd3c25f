//! Table name constants for linkmgrd.
//!
//! These match the schema definitions in swss-common.

/// CONFIG_DB table carrying the ToR device metadata (MAC address).
pub const CFG_DEVICE_METADATA_TABLE_NAME: &str = "DEVICE_METADATA";

/// CONFIG_DB table for loopback interfaces; Loopback2 supplies the probe
/// source IP.
pub const CFG_LOOPBACK_INTERFACE_TABLE_NAME: &str = "LOOPBACK_INTERFACE";

/// CONFIG_DB table for MUX cable configuration (server IPs, cable type,
/// per-port mode).
pub const CFG_MUX_CABLE_TABLE_NAME: &str = "MUX_CABLE";

/// CONFIG_DB table for link manager tunables (link prober intervals,
/// signal counts, log verbosity).
pub const CFG_MUX_LINKMGR_TABLE_NAME: &str = "MUX_LINKMGR";

/// APPL_DB table carrying port oper status (link up/down).
pub const APP_PORT_TABLE_NAME: &str = "PORT_TABLE";

/// APPL_DB table linkmgrd writes switch requests to (consumed by orchagent).
pub const APP_MUX_CABLE_TABLE_NAME: &str = "MUX_CABLE_TABLE";

/// APPL_DB table for driver commands (MUX state probe).
pub const APP_MUX_CABLE_COMMAND_TABLE_NAME: &str = "MUX_CABLE_COMMAND_TABLE";

/// APPL_DB table carrying driver command responses.
pub const APP_MUX_CABLE_RESPONSE_TABLE_NAME: &str = "MUX_CABLE_RESPONSE_TABLE";

/// APPL_DB table for peer forwarding-state writes.
pub const APP_PEER_FORWARDING_STATE_TABLE_NAME: &str = "PEER_HW_FORWARDING_STATE_TABLE";

/// STATE_DB table carrying the MUX state as confirmed by orchagent.
pub const STATE_MUX_CABLE_TABLE_NAME: &str = "MUX_CABLE_TABLE";

/// STATE_DB table linkmgrd publishes port health to.
pub const STATE_MUX_LINKMGR_TABLE_NAME: &str = "MUX_LINKMGR_TABLE";

/// STATE_DB table for switchover timing metrics.
pub const STATE_MUX_METRICS_TABLE_NAME: &str = "MUX_METRICS_TABLE";

/// STATE_DB table for link prober packet-loss statistics.
pub const STATE_LINK_PROBE_STATS_TABLE_NAME: &str = "LINK_PROBE_STATS_TABLE";

/// STATE_DB table carrying default route reachability.
pub const STATE_ROUTE_TABLE_NAME: &str = "ROUTE_TABLE";

/// STATE_DB table carrying cable info (peer link status).
pub const STATE_MUX_CABLE_INFO_TABLE_NAME: &str = "MUX_CABLE_INFO";

/// STATE_DB table for warm restart coordination.
pub const STATE_WARM_RESTART_TABLE_NAME: &str = "WARM_RESTART_TABLE";

/// STATE_DB table enabling warm restart per service.
pub const STATE_WARM_RESTART_ENABLE_TABLE_NAME: &str = "WARM_RESTART_ENABLE_TABLE";

/// Field names used across the linkmgrd tables.
pub mod fields {
    /// MUX/link manager/route state field.
    pub const STATE: &str = "state";

    /// Driver command field in the command table.
    pub const COMMAND: &str = "command";

    /// Peer switch request field in the command table.
    pub const PEER_COMMAND: &str = "peer_command";

    /// Driver response field in the response table.
    pub const RESPONSE: &str = "response";

    /// Port oper status field in APP PORT_TABLE.
    pub const OPER_STATUS: &str = "oper_status";

    /// Peer link status field in MUX_CABLE_INFO.
    pub const LINK_STATUS_PEER: &str = "link_status_peer";

    /// Server IPv4 address field in CONFIG MUX_CABLE.
    pub const SERVER_IPV4: &str = "server_ipv4";

    /// Cable type field in CONFIG MUX_CABLE.
    pub const CABLE_TYPE: &str = "cable_type";

    /// Packet loss counter reset trigger in CONFIG MUX_CABLE.
    pub const PCK_LOSS_DATA_RESET: &str = "pck_loss_data_reset";

    /// ToR MAC address field in DEVICE_METADATA|localhost.
    pub const MAC: &str = "mac";

    /// Packet loss statistics fields.
    pub const PCK_LOSS_COUNT: &str = "pck_loss_count";
    pub const PCK_EXPECTED_COUNT: &str = "pck_expected_count";
    pub const LINK_PROBER_UNKNOWN_START: &str = "link_prober_unknown_start";
    pub const LINK_PROBER_UNKNOWN_END: &str = "link_prober_unknown_end";

    /// Warm restart timer field (seconds).
    pub const TIMER: &str = "timer";

    /// Warm restart enable flag.
    pub const ENABLE: &str = "enable";
}

/// Well-known keys.
pub mod keys {
    /// DEVICE_METADATA key holding host-level metadata.
    pub const LOCALHOST: &str = "localhost";

    /// MUX_LINKMGR key holding link prober tunables.
    pub const LINK_PROBER: &str = "LINK_PROBER";

    /// MUX_LINKMGR key holding logger settings.
    pub const MUXLOGGER: &str = "MUXLOGGER";

    /// Loopback interface prefix supplying the probe source IP.
    pub const LOOPBACK2_PREFIX: &str = "Loopback2|";

    /// Default route keys in STATE ROUTE_TABLE.
    pub const IPV4_DEFAULT_ROUTE: &str = "0.0.0.0/0";
    pub const IPV6_DEFAULT_ROUTE: &str = "::/0";

    /// Warm restart table key for this daemon.
    pub const LINKMGRD: &str = "linkmgrd";

    /// Warm restart enable key covering the whole system.
    pub const SYSTEM: &str = "system";
}
