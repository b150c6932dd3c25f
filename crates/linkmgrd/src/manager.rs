//! MuxManager: the port registry and process-wide fan-out.
//!
//! Ports are created lazily on the first configuration or server-IP event
//! that references them and live for the remainder of the process. The
//! registry is a single coarse-locked map; lookups dominate writes. Events
//! are routed onto the owning port's strand, so the manager itself never
//! mutates per-port state.

use crate::config::{CableType, MuxConfig, MuxPortConfig};
use crate::db::DbInterface;
use crate::error::Result;
use crate::link_prober::HeartbeatTransport;
use crate::metrics::MetricsCollector;
use crate::port::{MuxPort, PortEvent};
use crate::state::LinkState;
use sonic_types::{Ipv4Address, MacAddress};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Builds the heartbeat transport for a port's netdev. Injected so tests
/// and non-privileged environments can substitute fakes.
pub type TransportFactory =
    Box<dyn Fn(&str) -> Result<Arc<dyn HeartbeatTransport>> + Send + Sync>;

/// Applies a runtime log-verbosity change.
pub type LogVerbosityHook = Box<dyn Fn(&str) + Send + Sync>;

/// Warm-restart reconciliation accounting, shared by every port.
///
/// Each port registered during a warm-restart epoch counts once; when the
/// count drains to zero (or the reconciliation timer fires first) the
/// `reconciled` state is published exactly once.
pub struct ReconciliationTracker {
    pending: AtomicI64,
    published: AtomicBool,
    db: Arc<dyn DbInterface>,
}

impl ReconciliationTracker {
    pub fn new(db: Arc<dyn DbInterface>) -> Self {
        Self {
            pending: AtomicI64::new(0),
            published: AtomicBool::new(false),
            db,
        }
    }

    pub fn port_registered(&self) {
        self.pending.fetch_add(1, Ordering::SeqCst);
    }

    pub fn port_reconciled(&self) {
        let remaining = self.pending.fetch_sub(1, Ordering::SeqCst) - 1;
        debug!(remaining, "port reconciled");
        if remaining <= 0 {
            self.publish();
        }
    }

    /// The reconciliation timer elapsed; publish unconditionally.
    pub fn timer_fired(&self) {
        warn!("reconciliation timed out after warm restart, publishing reconciled");
        self.publish();
    }

    pub fn is_published(&self) -> bool {
        self.published.load(Ordering::SeqCst)
    }

    fn publish(&self) {
        if !self.published.swap(true, Ordering::SeqCst) {
            self.db.set_warm_restart_reconciled();
        }
    }
}

/// Process-wide immutable identity plus the mutable port registry.
pub struct MuxManager {
    config: Mutex<MuxConfig>,
    tor_mac: MacAddress,
    loopback_ip: Ipv4Address,
    db: Arc<dyn DbInterface>,
    transport_factory: TransportFactory,
    log_hook: Option<LogVerbosityHook>,
    metrics: MetricsCollector,

    ports: Mutex<HashMap<String, MuxPort>>,
    cable_types: Mutex<HashMap<String, CableType>>,
    server_ip_map: Mutex<HashMap<Ipv4Address, String>>,

    warm_restart: AtomicBool,
    reconciliation: Arc<ReconciliationTracker>,
    ipv4_default_route_ok: AtomicBool,
}

impl MuxManager {
    pub fn new(
        config: MuxConfig,
        tor_mac: MacAddress,
        loopback_ip: Ipv4Address,
        db: Arc<dyn DbInterface>,
        transport_factory: TransportFactory,
        log_hook: Option<LogVerbosityHook>,
        metrics: MetricsCollector,
    ) -> Arc<Self> {
        let reconciliation = Arc::new(ReconciliationTracker::new(Arc::clone(&db)));
        Arc::new(Self {
            config: Mutex::new(config),
            tor_mac,
            loopback_ip,
            db,
            transport_factory,
            log_hook,
            metrics,
            ports: Mutex::new(HashMap::new()),
            cable_types: Mutex::new(HashMap::new()),
            server_ip_map: Mutex::new(HashMap::new()),
            warm_restart: AtomicBool::new(false),
            reconciliation,
            ipv4_default_route_ok: AtomicBool::new(true),
        })
    }

    pub fn reconciliation(&self) -> Arc<ReconciliationTracker> {
        Arc::clone(&self.reconciliation)
    }

    /// Arms warm-restart reconciliation: ports created from now on are
    /// counted, and the timer publishes `reconciled` if they do not all
    /// stabilize in time.
    pub fn start_warm_restart_reconciliation(self: &Arc<Self>, timer: Option<u64>) {
        self.warm_restart.store(true, Ordering::SeqCst);
        let timeout = timer.unwrap_or_else(|| {
            self.config.lock().unwrap().reconciliation_timeout_secs
        });
        info!(timeout_secs = timeout, "warm restart detected, starting reconciliation timer");
        let tracker = self.reconciliation();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(timeout)).await;
            if !tracker.is_published() {
                tracker.timer_fired();
            }
        });
    }

    /// Looks a port up, creating it on first reference. Ports with a cable
    /// type other than active-standby are not managed.
    fn with_port<F>(&self, port_name: &str, create: bool, f: F)
    where
        F: FnOnce(&MuxPort),
    {
        let mut ports = self.ports.lock().unwrap();
        if let Some(port) = ports.get(port_name) {
            f(port);
            return;
        }
        if !create {
            debug!(port = port_name, "event for unknown port dropped");
            return;
        }
        let cable_type = self
            .cable_types
            .lock()
            .unwrap()
            .get(port_name)
            .copied()
            .unwrap_or_default();
        if cable_type != CableType::ActiveStandby {
            debug!(port = port_name, "unmanaged cable type, ignoring");
            return;
        }

        let transport = match (self.transport_factory)(port_name) {
            Ok(transport) => transport,
            Err(e) => {
                warn!(port = port_name, error = %e, "cannot open heartbeat transport, port ignored");
                return;
            }
        };

        let mut port_config = MuxPortConfig::new(port_name);
        port_config.cable_type = cable_type;
        let port = MuxPort::new(
            port_config,
            self.config.lock().unwrap().clone(),
            self.tor_mac,
            self.loopback_ip,
            Arc::clone(&self.db),
            transport,
            self.reconciliation(),
            self.metrics.clone(),
            self.warm_restart.load(Ordering::SeqCst),
        );
        // replay process-wide state the port missed
        port.post(PortEvent::DefaultRouteState(
            self.ipv4_default_route_ok.load(Ordering::SeqCst),
        ));
        f(&port);
        ports.insert(port_name.to_string(), port);
    }

    // ---- routed events ---------------------------------------------------

    pub fn update_server_ip(&self, port_name: &str, ip: Ipv4Address) {
        info!(port = port_name, ip = %ip, "server ip");
        self.server_ip_map
            .lock()
            .unwrap()
            .insert(ip, port_name.to_string());
        self.with_port(port_name, true, |port| {
            port.post(PortEvent::ServerIpUpdate(ip));
        });
    }

    pub fn update_port_cable_type(&self, port_name: &str, cable_type: CableType) {
        self.cable_types
            .lock()
            .unwrap()
            .insert(port_name.to_string(), cable_type);
    }

    pub fn update_mux_mode(&self, port_name: &str, mode: &str) {
        match mode.parse() {
            Ok(mode) => self.with_port(port_name, false, |port| {
                port.post(PortEvent::MuxConfig(mode));
            }),
            Err(e) => warn!(port = port_name, value = mode, error = %e, "invalid mux mode"),
        }
    }

    pub fn update_link_state(&self, port_name: &str, state: &str) {
        match state.parse::<LinkState>() {
            Ok(state) => self.with_port(port_name, true, |port| {
                port.post(PortEvent::LinkStateSample(state));
            }),
            Err(e) => warn!(port = port_name, value = state, error = %e, "invalid oper status"),
        }
    }

    pub fn update_peer_link_state(&self, port_name: &str, state: &str) {
        match state.parse::<LinkState>() {
            Ok(state) => self.with_port(port_name, true, |port| {
                port.post(PortEvent::PeerLinkState(state));
            }),
            Err(e) => warn!(port = port_name, value = state, error = %e, "invalid peer link status"),
        }
    }

    /// MUX state confirmed by orchagent in STATE_DB.
    pub fn update_mux_state(&self, port_name: &str, state: &str) {
        match state.parse() {
            Ok(state) => self.with_port(port_name, true, |port| {
                port.post(PortEvent::MuxStateNotification(state));
            }),
            Err(e) => warn!(port = port_name, value = state, error = %e, "invalid mux state"),
        }
    }

    /// Driver response to a probe command.
    pub fn process_probe_response(&self, port_name: &str, state: &str) {
        match state.parse() {
            Ok(state) => self.with_port(port_name, false, |port| {
                port.post(PortEvent::ProbeMuxResponse(state));
            }),
            Err(e) => warn!(port = port_name, value = state, error = %e, "invalid probe response"),
        }
    }

    pub fn handle_peer_switch_request(&self, port_name: &str) {
        self.with_port(port_name, false, |port| {
            port.post(PortEvent::SwitchActiveRequest);
        });
    }

    pub fn reset_pck_loss(&self, port_name: &str) {
        self.with_port(port_name, false, |port| {
            port.post(PortEvent::PckLossReset);
        });
    }

    /// Kernel neighbor event supplied a MAC for a server IP.
    pub fn process_server_mac(&self, ip: Ipv4Address, mac: MacAddress) {
        let port_name = self.server_ip_map.lock().unwrap().get(&ip).cloned();
        if let Some(port_name) = port_name {
            self.with_port(&port_name, false, |port| {
                port.post(PortEvent::ServerMacUpdate(mac));
            });
        }
    }

    /// Default route state from STATE ROUTE_TABLE. IPv4 presence alone
    /// decides; IPv6 is tracked for completeness but does not gate.
    pub fn update_default_route_state(&self, is_v4: bool, state: &str) {
        if !is_v4 {
            debug!(state, "ipv6 default route state ignored");
            return;
        }
        let ok = state == "ok";
        self.ipv4_default_route_ok.store(ok, Ordering::SeqCst);
        info!(ok, "default route state");
        let ports = self.ports.lock().unwrap();
        for port in ports.values() {
            port.post(PortEvent::DefaultRouteState(ok));
        }
    }

    /// LINK_PROBER tunable update from CONFIG MUX_LINKMGR.
    pub fn update_link_prober_config(&self, field: &str, value: &str) {
        let updated = {
            let mut config = self.config.lock().unwrap();
            match config.apply_link_prober_field(field, value) {
                Ok(()) => config.clone(),
                Err(e) => {
                    warn!(field, value, error = %e, "invalid link prober tunable");
                    return;
                }
            }
        };
        info!(field, value, "link prober config update");
        let ports = self.ports.lock().unwrap();
        for port in ports.values() {
            port.post(PortEvent::ConfigUpdate(updated.clone()));
        }
    }

    pub fn update_log_verbosity(&self, verbosity: &str) {
        if let Some(hook) = &self.log_hook {
            info!(verbosity, "updating log verbosity");
            hook(verbosity);
        }
    }

    #[cfg(test)]
    pub fn port_count(&self) -> usize {
        self.ports.lock().unwrap().len()
    }
}
