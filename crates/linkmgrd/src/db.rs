//! Store adapter: typed interface over the SONiC Redis databases.
//!
//! Writes are posted onto an unbounded channel and applied by a dedicated
//! writer task, so the state machines never block on the store. The writer
//! coalesces bursts of identical writes (same key, field, and value within
//! 20 ms) into a single operation.
//!
//! The subscription side listens to keyspace notifications for the input
//! tables, re-reads the touched row, and routes a typed event to the right
//! port through the manager. The adapter holds only a weak reference to
//! the manager so shutdown ordering stays acyclic.

use crate::config::CableType;
use crate::error::{LinkMgrError, Result};
use crate::link_manager::{LinkProberMetricsEvent, MuxMetricsEvent};
use crate::manager::MuxManager;
use crate::metrics::MetricsCollector;
use crate::state::{LinkManagerHealth, MuxState};
use crate::tables::{self, fields, keys};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use sonic_types::{Ipv4Address, MacAddress};
use std::collections::HashMap;
use std::sync::Weak;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

/// Identical writes inside this window collapse into one.
const WRITE_COALESCE_WINDOW: Duration = Duration::from_millis(20);

/// Bounded poll timeout so shutdown stays responsive.
const SUBSCRIBE_POLL_TIMEOUT: Duration = Duration::from_millis(1_000);

/// SONiC database instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DbId {
    ApplDb,
    ConfigDb,
    StateDb,
}

impl DbId {
    pub fn index(&self) -> i64 {
        match self {
            DbId::ApplDb => 0,
            DbId::ConfigDb => 4,
            DbId::StateDb => 6,
        }
    }

    /// Separator between table name and row key.
    pub fn separator(&self) -> char {
        match self {
            DbId::ApplDb => ':',
            DbId::ConfigDb | DbId::StateDb => '|',
        }
    }

    pub fn row_key(&self, table: &str, key: &str) -> String {
        format!("{}{}{}", table, self.separator(), key)
    }
}

/// Typed write posted to the writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOp {
    Hset {
        db: DbId,
        key: String,
        field: String,
        value: String,
    },
    Hdel {
        db: DbId,
        key: String,
        field: String,
    },
    Del {
        db: DbId,
        key: String,
    },
}

/// Typed view of the store as seen by the per-port machinery.
///
/// Every method is non-blocking; implementations enqueue the operation and
/// return immediately.
pub trait DbInterface: Send + Sync {
    /// Switch request for orchagent.
    fn set_mux_state(&self, port: &str, state: MuxState);
    /// Ask the cable driver to read the actual MUX direction.
    fn probe_mux_state(&self, port: &str);
    /// Record the peer forwarding state.
    fn set_peer_mux_state(&self, port: &str, state: MuxState);
    /// Ask the peer ToR to take the active role.
    fn post_peer_switch_request(&self, port: &str);
    /// Publish port health for the CLI.
    fn set_mux_linkmgr_state(&self, port: &str, health: LinkManagerHealth);
    /// Publish a switchover timing metric row.
    fn post_mux_metrics(&self, port: &str, event: MuxMetricsEvent, target: MuxState);
    /// Publish a prober unknown-window metric row.
    fn post_link_prober_metrics(&self, port: &str, event: LinkProberMetricsEvent);
    /// Publish heartbeat loss counters.
    fn post_pck_loss_ratio(&self, port: &str, unknown: u64, expected: u64);
    /// Mark the warm restart epoch reconciled.
    fn set_warm_restart_reconciled(&self);
}

/// Production adapter posting to the Redis writer task.
pub struct RedisDbInterface {
    writes_tx: mpsc::UnboundedSender<WriteOp>,
}

impl RedisDbInterface {
    /// Connects the writer task to APPL_DB and STATE_DB.
    pub async fn new(host: &str, port: u16, metrics: MetricsCollector) -> Result<Self> {
        let appl = connect(host, port, DbId::ApplDb).await?;
        let state = connect(host, port, DbId::StateDb).await?;
        let (writes_tx, writes_rx) = mpsc::unbounded_channel();
        tokio::spawn(writer_loop(appl, state, metrics, writes_rx));
        Ok(Self { writes_tx })
    }

    fn post(&self, op: WriteOp) {
        let _ = self.writes_tx.send(op);
    }

    fn hset(&self, db: DbId, table: &str, key: &str, field: &str, value: impl Into<String>) {
        self.post(WriteOp::Hset {
            db,
            key: db.row_key(table, key),
            field: field.to_string(),
            value: value.into(),
        });
    }

    fn timestamp() -> String {
        chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Micros, true)
    }
}

impl DbInterface for RedisDbInterface {
    fn set_mux_state(&self, port: &str, state: MuxState) {
        if !matches!(state, MuxState::Active | MuxState::Standby | MuxState::Unknown) {
            return;
        }
        debug!(port, state = %state, "setting mux state");
        self.hset(
            DbId::ApplDb,
            tables::APP_MUX_CABLE_TABLE_NAME,
            port,
            fields::STATE,
            state.as_str(),
        );
    }

    fn probe_mux_state(&self, port: &str) {
        debug!(port, "requesting driver mux probe");
        self.hset(
            DbId::ApplDb,
            tables::APP_MUX_CABLE_COMMAND_TABLE_NAME,
            port,
            fields::COMMAND,
            "probe",
        );
    }

    fn set_peer_mux_state(&self, port: &str, state: MuxState) {
        debug!(port, state = %state, "setting peer forwarding state");
        self.hset(
            DbId::ApplDb,
            tables::APP_PEER_FORWARDING_STATE_TABLE_NAME,
            port,
            fields::STATE,
            state.as_str(),
        );
    }

    fn post_peer_switch_request(&self, port: &str) {
        info!(port, "posting switch-active request to peer");
        self.hset(
            DbId::ApplDb,
            tables::APP_MUX_CABLE_COMMAND_TABLE_NAME,
            port,
            fields::PEER_COMMAND,
            "switch_active",
        );
    }

    fn set_mux_linkmgr_state(&self, port: &str, health: LinkManagerHealth) {
        debug!(port, health = %health, "publishing link manager health");
        self.hset(
            DbId::StateDb,
            tables::STATE_MUX_LINKMGR_TABLE_NAME,
            port,
            fields::STATE,
            health.as_str(),
        );
    }

    fn post_mux_metrics(&self, port: &str, event: MuxMetricsEvent, target: MuxState) {
        let suffix = match event {
            MuxMetricsEvent::SwitchStart => "start",
            MuxMetricsEvent::SwitchEnd => "end",
        };
        let key = DbId::StateDb.row_key(tables::STATE_MUX_METRICS_TABLE_NAME, port);
        if event == MuxMetricsEvent::SwitchStart {
            // a new switch window replaces the previous row wholesale
            self.post(WriteOp::Del {
                db: DbId::StateDb,
                key: key.clone(),
            });
        }
        self.post(WriteOp::Hset {
            db: DbId::StateDb,
            key,
            field: format!("linkmgrd_switch_{}_{}", target.as_str(), suffix),
            value: Self::timestamp(),
        });
    }

    fn post_link_prober_metrics(&self, port: &str, event: LinkProberMetricsEvent) {
        let key = DbId::StateDb.row_key(tables::STATE_LINK_PROBE_STATS_TABLE_NAME, port);
        if event == LinkProberMetricsEvent::UnknownStart {
            for field in [
                fields::LINK_PROBER_UNKNOWN_START,
                fields::LINK_PROBER_UNKNOWN_END,
            ] {
                self.post(WriteOp::Hdel {
                    db: DbId::StateDb,
                    key: key.clone(),
                    field: field.to_string(),
                });
            }
        }
        let field = match event {
            LinkProberMetricsEvent::UnknownStart => fields::LINK_PROBER_UNKNOWN_START,
            LinkProberMetricsEvent::UnknownEnd => fields::LINK_PROBER_UNKNOWN_END,
        };
        self.post(WriteOp::Hset {
            db: DbId::StateDb,
            key,
            field: field.to_string(),
            value: Self::timestamp(),
        });
    }

    fn post_pck_loss_ratio(&self, port: &str, unknown: u64, expected: u64) {
        self.hset(
            DbId::StateDb,
            tables::STATE_LINK_PROBE_STATS_TABLE_NAME,
            port,
            fields::PCK_LOSS_COUNT,
            unknown.to_string(),
        );
        self.hset(
            DbId::StateDb,
            tables::STATE_LINK_PROBE_STATS_TABLE_NAME,
            port,
            fields::PCK_EXPECTED_COUNT,
            expected.to_string(),
        );
    }

    fn set_warm_restart_reconciled(&self) {
        info!("publishing warm restart state reconciled");
        self.hset(
            DbId::StateDb,
            tables::STATE_WARM_RESTART_TABLE_NAME,
            keys::LINKMGRD,
            fields::STATE,
            "reconciled",
        );
    }
}

async fn connect(host: &str, port: u16, db: DbId) -> Result<ConnectionManager> {
    let url = format!("redis://{}:{}/{}", host, port, db.index());
    let client = redis::Client::open(url)?;
    Ok(ConnectionManager::new(client).await?)
}

async fn writer_loop(
    mut appl: ConnectionManager,
    mut state: ConnectionManager,
    metrics: MetricsCollector,
    mut writes_rx: mpsc::UnboundedReceiver<WriteOp>,
) {
    let mut recent: HashMap<(DbId, String, String), (String, Instant)> = HashMap::new();

    while let Some(op) = writes_rx.recv().await {
        if let WriteOp::Hset { db, key, field, value } = &op {
            let slot = (*db, key.clone(), field.clone());
            if let Some((last_value, at)) = recent.get(&slot) {
                if last_value == value && at.elapsed() < WRITE_COALESCE_WINDOW {
                    continue;
                }
            }
            recent.insert(slot, (value.clone(), Instant::now()));
        }

        let result = match &op {
            WriteOp::Hset { db, key, field, value } => {
                let conn = if *db == DbId::StateDb { &mut state } else { &mut appl };
                conn.hset::<_, _, _, ()>(key, field, value).await
            }
            WriteOp::Hdel { db, key, field } => {
                let conn = if *db == DbId::StateDb { &mut state } else { &mut appl };
                conn.hdel::<_, _, ()>(key, field).await
            }
            WriteOp::Del { db, key } => {
                recent.retain(|(_, k, _), _| k != key);
                let conn = if *db == DbId::StateDb { &mut state } else { &mut appl };
                conn.del::<_, ()>(key).await
            }
        };

        if let Err(e) = result {
            metrics.record_write_error();
            error!(error = %e, op = ?op, "store write failed");
        }
    }
}

// ---- subscription side --------------------------------------------------

/// Parses a keyspace notification channel into `(db, table, row key)`.
pub fn decode_notification_channel(channel: &str) -> Option<(DbId, String, String)> {
    let rest = channel.strip_prefix("__keyspace@")?;
    let (db_index, redis_key) = rest.split_once("__:")?;
    let db = match db_index {
        "0" => DbId::ApplDb,
        "4" => DbId::ConfigDb,
        "6" => DbId::StateDb,
        _ => return None,
    };
    let (table, key) = redis_key.split_once(db.separator())?;
    Some((db, table.to_string(), key.to_string()))
}

/// Reads the initial configuration and runs the subscription loop until
/// `shutdown` flips or the manager is dropped.
pub async fn run_subscriptions(
    manager: Weak<MuxManager>,
    host: String,
    port: u16,
    mut shutdown: tokio::sync::watch::Receiver<bool>,
) -> Result<()> {
    let mut ctx = SubscriberContext::connect(&host, port, manager).await?;
    ctx.load_initial_config().await?;

    let client = redis::Client::open(format!("redis://{}:{}/0", host, port))?;
    let mut pubsub = client.get_async_pubsub().await?;
    for pattern in [
        "__keyspace@0__:PORT_TABLE:*",
        "__keyspace@0__:MUX_CABLE_RESPONSE_TABLE:*",
        "__keyspace@0__:MUX_CABLE_COMMAND_TABLE:*",
        "__keyspace@4__:MUX_CABLE|*",
        "__keyspace@4__:MUX_LINKMGR|*",
        "__keyspace@6__:MUX_CABLE_TABLE|*",
        "__keyspace@6__:ROUTE_TABLE|*",
        "__keyspace@6__:MUX_CABLE_INFO|*",
    ] {
        pubsub.psubscribe(pattern).await?;
    }
    info!("store subscriptions established");

    use futures_util::StreamExt;
    let mut stream = pubsub.on_message();
    loop {
        if *shutdown.borrow() {
            break;
        }
        let message = tokio::select! {
            biased;
            _ = shutdown.changed() => continue,
            message = tokio::time::timeout(SUBSCRIBE_POLL_TIMEOUT, stream.next()) => {
                match message {
                    Ok(Some(m)) => m,
                    Ok(None) => break,
                    Err(_) => continue, // poll timeout, re-check shutdown
                }
            }
        };

        let channel: String = message.get_channel_name().to_string();
        let Some((db, table, key)) = decode_notification_channel(&channel) else {
            continue;
        };
        if let Err(e) = ctx.handle_row(db, &table, &key).await {
            warn!(error = %e, channel, "failed handling store notification");
        }
    }

    info!("store subscription loop exiting");
    Ok(())
}

/// Query connections plus the routing target for decoded events.
struct SubscriberContext {
    appl: ConnectionManager,
    config: ConnectionManager,
    state: ConnectionManager,
    manager: Weak<MuxManager>,
}

impl SubscriberContext {
    async fn connect(host: &str, port: u16, manager: Weak<MuxManager>) -> Result<Self> {
        Ok(Self {
            appl: connect(host, port, DbId::ApplDb).await?,
            config: connect(host, port, DbId::ConfigDb).await?,
            state: connect(host, port, DbId::StateDb).await?,
            manager,
        })
    }

    fn manager(&self) -> Result<std::sync::Arc<MuxManager>> {
        self.manager
            .upgrade()
            .ok_or_else(|| LinkMgrError::ConfigNotFound("manager dropped".into()))
    }

    /// One-time reads at startup: tunables, cable types, and server IPs.
    /// The ToR MAC and loopback IP were already read before the manager was
    /// constructed.
    async fn load_initial_config(&mut self) -> Result<()> {
        let manager = self.manager()?;

        let linkmgr_key = DbId::ConfigDb.row_key(tables::CFG_MUX_LINKMGR_TABLE_NAME, keys::LINK_PROBER);
        let tunables: HashMap<String, String> = self.config.hgetall(&linkmgr_key).await?;
        for (field, value) in &tunables {
            manager.update_link_prober_config(field, value);
        }

        let logger_key = DbId::ConfigDb.row_key(tables::CFG_MUX_LINKMGR_TABLE_NAME, keys::MUXLOGGER);
        let verbosity: Option<String> = self.config.hget(&logger_key, "log_verbosity").await?;
        if let Some(verbosity) = verbosity {
            manager.update_log_verbosity(&verbosity);
        }

        let pattern = format!("{}{}*", tables::CFG_MUX_CABLE_TABLE_NAME, DbId::ConfigDb.separator());
        let cable_keys: Vec<String> = self.config.keys(&pattern).await?;
        for redis_key in cable_keys {
            if let Some((_, port)) = redis_key.split_once('|') {
                let port = port.to_string();
                self.refresh_mux_cable_config(&port).await?;
            }
        }
        Ok(())
    }

    async fn refresh_mux_cable_config(&mut self, port: &str) -> Result<()> {
        let manager = self.manager()?;
        let key = DbId::ConfigDb.row_key(tables::CFG_MUX_CABLE_TABLE_NAME, port);
        let row: HashMap<String, String> = self.config.hgetall(&key).await?;

        let cable_type = row
            .get(fields::CABLE_TYPE)
            .map(|v| CableType::from_config(v))
            .unwrap_or_default();
        manager.update_port_cable_type(port, cable_type);

        if let Some(ip) = row.get(fields::SERVER_IPV4) {
            match Ipv4Address::parse_host(ip) {
                Ok(ip) => manager.update_server_ip(port, ip),
                Err(e) => warn!(port, value = %ip, error = %e, "invalid server_ipv4"),
            }
        }
        if let Some(mode) = row.get(fields::STATE) {
            manager.update_mux_mode(port, mode);
        }
        if row.contains_key(fields::PCK_LOSS_DATA_RESET) {
            manager.reset_pck_loss(port);
        }
        Ok(())
    }

    /// Re-reads a notified row and routes the typed event.
    async fn handle_row(&mut self, db: DbId, table: &str, key: &str) -> Result<()> {
        let manager = self.manager()?;
        let redis_key = db.row_key(table, key);

        match (db, table) {
            (DbId::ApplDb, tables::APP_PORT_TABLE_NAME) => {
                let status: Option<String> = self.appl.hget(&redis_key, fields::OPER_STATUS).await?;
                if let Some(status) = status {
                    manager.update_link_state(key, &status);
                }
            }
            (DbId::ApplDb, tables::APP_MUX_CABLE_RESPONSE_TABLE_NAME) => {
                let response: Option<String> = self.appl.hget(&redis_key, fields::RESPONSE).await?;
                if let Some(response) = response {
                    manager.process_probe_response(key, &response);
                }
            }
            (DbId::ApplDb, tables::APP_MUX_CABLE_COMMAND_TABLE_NAME) => {
                let command: Option<String> =
                    self.appl.hget(&redis_key, fields::PEER_COMMAND).await?;
                if command.as_deref() == Some("switch_active") {
                    // consume the mailbox so an unrelated write to this row
                    // does not replay the request
                    let _: () = self.appl.hdel(&redis_key, fields::PEER_COMMAND).await?;
                    manager.handle_peer_switch_request(key);
                }
            }
            (DbId::ConfigDb, tables::CFG_MUX_CABLE_TABLE_NAME) => {
                self.refresh_mux_cable_config(key).await?;
            }
            (DbId::ConfigDb, tables::CFG_MUX_LINKMGR_TABLE_NAME) => {
                if key == keys::LINK_PROBER {
                    let row: HashMap<String, String> = self.config.hgetall(&redis_key).await?;
                    for (field, value) in &row {
                        manager.update_link_prober_config(field, value);
                    }
                } else if key == keys::MUXLOGGER {
                    let verbosity: Option<String> =
                        self.config.hget(&redis_key, "log_verbosity").await?;
                    if let Some(verbosity) = verbosity {
                        manager.update_log_verbosity(&verbosity);
                    }
                }
            }
            (DbId::StateDb, tables::STATE_MUX_CABLE_TABLE_NAME) => {
                let state: Option<String> = self.state.hget(&redis_key, fields::STATE).await?;
                if let Some(state) = state {
                    manager.update_mux_state(key, &state);
                }
            }
            (DbId::StateDb, tables::STATE_ROUTE_TABLE_NAME) => {
                let state: Option<String> = self.state.hget(&redis_key, fields::STATE).await?;
                if let Some(state) = state {
                    match key {
                        keys::IPV4_DEFAULT_ROUTE => manager.update_default_route_state(true, &state),
                        keys::IPV6_DEFAULT_ROUTE => manager.update_default_route_state(false, &state),
                        _ => debug!(key, "ignoring non-default route"),
                    }
                }
            }
            (DbId::StateDb, tables::STATE_MUX_CABLE_INFO_TABLE_NAME) => {
                let status: Option<String> =
                    self.state.hget(&redis_key, fields::LINK_STATUS_PEER).await?;
                if let Some(status) = status {
                    manager.update_peer_link_state(key, &status);
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// Reads the ToR MAC from CONFIG DEVICE_METADATA; missing or malformed is a
/// fatal init error.
pub async fn read_tor_mac(host: &str, port: u16) -> Result<MacAddress> {
    let mut config = connect(host, port, DbId::ConfigDb).await?;
    let key = DbId::ConfigDb.row_key(tables::CFG_DEVICE_METADATA_TABLE_NAME, keys::LOCALHOST);
    let mac: Option<String> = config.hget(&key, fields::MAC).await?;
    let mac = mac.ok_or_else(|| LinkMgrError::ConfigNotFound("ToR MAC address".into()))?;
    mac.parse::<MacAddress>()
        .map_err(|_| LinkMgrError::ConfigNotFound(format!("invalid ToR MAC address {}", mac)))
}

/// Scans CONFIG LOOPBACK_INTERFACE for the Loopback2 IPv4 address; absence
/// is a fatal init error.
pub async fn read_loopback_ip(host: &str, port: u16) -> Result<Ipv4Address> {
    let mut config = connect(host, port, DbId::ConfigDb).await?;
    let pattern = format!("{}|*", tables::CFG_LOOPBACK_INTERFACE_TABLE_NAME);
    let loopback_keys: Vec<String> = config.keys(&pattern).await?;
    parse_loopback_keys(&loopback_keys)
}

/// Extracts the Loopback2 IPv4 address from LOOPBACK_INTERFACE keys of the
/// form `LOOPBACK_INTERFACE|Loopback2|<ip>[/<prefix>]`.
pub fn parse_loopback_keys(redis_keys: &[String]) -> Result<Ipv4Address> {
    for redis_key in redis_keys {
        let Some((_, rest)) = redis_key.split_once('|') else {
            continue;
        };
        let Some(ip) = rest.strip_prefix(keys::LOOPBACK2_PREFIX) else {
            continue;
        };
        if let Ok(ip) = Ipv4Address::parse_host(ip) {
            return Ok(ip);
        }
    }
    Err(LinkMgrError::ConfigNotFound(
        "Loopback2 IPv4 address missing".into(),
    ))
}

/// Checks the warm restart context and reads the configured reconciliation
/// timer, if any.
pub async fn read_warm_restart_context(host: &str, port: u16) -> Result<(bool, Option<u64>)> {
    let mut state = connect(host, port, DbId::StateDb).await?;
    let enable_key = DbId::StateDb.row_key(tables::STATE_WARM_RESTART_ENABLE_TABLE_NAME, keys::SYSTEM);
    let enabled: Option<String> = state.hget(&enable_key, fields::ENABLE).await?;
    if enabled.as_deref() != Some("true") {
        return Ok((false, None));
    }
    let timer_key = DbId::StateDb.row_key(tables::STATE_WARM_RESTART_TABLE_NAME, keys::LINKMGRD);
    let timer: Option<String> = state.hget(&timer_key, fields::TIMER).await?;
    Ok((true, timer.and_then(|t| t.parse().ok())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_decode_notification_channel() {
        assert_eq!(
            decode_notification_channel("__keyspace@0__:MUX_CABLE_RESPONSE_TABLE:Ethernet4"),
            Some((
                DbId::ApplDb,
                "MUX_CABLE_RESPONSE_TABLE".to_string(),
                "Ethernet4".to_string()
            ))
        );
        assert_eq!(
            decode_notification_channel("__keyspace@6__:MUX_CABLE_TABLE|Ethernet0"),
            Some((
                DbId::StateDb,
                "MUX_CABLE_TABLE".to_string(),
                "Ethernet0".to_string()
            ))
        );
        assert_eq!(
            decode_notification_channel("__keyspace@6__:ROUTE_TABLE|0.0.0.0/0"),
            Some((
                DbId::StateDb,
                "ROUTE_TABLE".to_string(),
                "0.0.0.0/0".to_string()
            ))
        );
    }

    #[test]
    fn test_decode_rejects_foreign_channels() {
        assert_eq!(decode_notification_channel("__keyevent@0__:hset"), None);
        assert_eq!(decode_notification_channel("__keyspace@2__:FOO:bar"), None);
        assert_eq!(decode_notification_channel("plain-message"), None);
    }

    #[test]
    fn test_parse_loopback_keys() {
        let redis_keys = vec![
            "LOOPBACK_INTERFACE|Loopback0|10.0.0.1/32".to_string(),
            "LOOPBACK_INTERFACE|Loopback2|10.1.0.32/32".to_string(),
            "LOOPBACK_INTERFACE|Loopback2|fe80::1/128".to_string(),
        ];
        assert_eq!(
            parse_loopback_keys(&redis_keys).unwrap(),
            Ipv4Address::new(10, 1, 0, 32)
        );
    }

    #[test]
    fn test_parse_loopback_keys_missing_ipv4_is_fatal() {
        let redis_keys = vec![
            "LOOPBACK_INTERFACE|Loopback0|10.0.0.1/32".to_string(),
            "LOOPBACK_INTERFACE|Loopback2|fe80::1/128".to_string(),
        ];
        let err = parse_loopback_keys(&redis_keys).unwrap_err();
        assert!(err.is_fatal_init());
    }

    #[test]
    fn test_row_key_separators() {
        assert_eq!(
            DbId::ApplDb.row_key("MUX_CABLE_TABLE", "Ethernet4"),
            "MUX_CABLE_TABLE:Ethernet4"
        );
        assert_eq!(
            DbId::StateDb.row_key("MUX_LINKMGR_TABLE", "Ethernet4"),
            "MUX_LINKMGR_TABLE|Ethernet4"
        );
    }
}
