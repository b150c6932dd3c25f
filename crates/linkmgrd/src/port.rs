//! Per-port event pump and service wiring.
//!
//! Every port owns a strand: an unbounded channel drained by a single
//! spawned task. Bus events, probe classifications, and timer expiries for
//! the port are all posted to the same channel, so no two handlers for one
//! port ever run concurrently while distinct ports proceed in parallel on
//! the runtime's worker pool. Timers carry generation numbers; the
//! composite machine discards stale fires.

use crate::config::{MuxConfig, MuxMode, MuxPortConfig};
use crate::db::DbInterface;
use crate::link_manager::{
    ActiveStandbyStateMachine, LinkProberMetricsEvent, MuxMetricsEvent, PortServices,
};
use crate::link_prober::{HeartbeatTransport, ProbeSession, ProbeSessionHandle};
use crate::link_prober_sm::LinkProberEvent;
use crate::manager::ReconciliationTracker;
use crate::metrics::MetricsCollector;
use crate::state::{LinkManagerHealth, LinkState, MuxState};
use sonic_types::{Ipv4Address, MacAddress};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Events delivered to a port's strand, in FIFO order.
#[derive(Debug, Clone)]
pub enum PortEvent {
    /// Raw classification from the probe session.
    LinkProber(LinkProberEvent),
    /// MUX state confirmed by orchagent (STATE_DB).
    MuxStateNotification(MuxState),
    /// Driver response to a probe command (APP_DB).
    ProbeMuxResponse(MuxState),
    /// Oper status sample from APP PORT_TABLE.
    LinkStateSample(LinkState),
    /// Peer link status from STATE MUX_CABLE_INFO.
    PeerLinkState(LinkState),
    /// Mode change from CONFIG MUX_CABLE.
    MuxConfig(MuxMode),
    /// Process-wide default route state fan-out.
    DefaultRouteState(bool),
    /// Switch-active request from the peer ToR.
    SwitchActiveRequest,
    /// Server IP from CONFIG MUX_CABLE; first one activates the machine.
    ServerIpUpdate(Ipv4Address),
    /// Server MAC learned from a kernel neighbor event.
    ServerMacUpdate(MacAddress),
    /// Packet-loss counter reset request.
    PckLossReset,
    /// Process-wide tunable update.
    ConfigUpdate(MuxConfig),
    MuxWaitTimeout(u64),
    ProbeWaitTimeout(u64),
    ProbeBackoffTimeout(u64),
    SuspendTimerExpiry,
}

/// Production [`PortServices`]: store writes go through the DB adapter,
/// probe control through the session handle, timers through the strand.
struct PortServicesImpl {
    port_name: String,
    db: Arc<dyn DbInterface>,
    probe: Arc<ProbeSessionHandle>,
    events_tx: mpsc::UnboundedSender<PortEvent>,
    reconciliation: Arc<ReconciliationTracker>,
    metrics: MetricsCollector,
}

impl PortServicesImpl {
    fn arm_timer(&self, duration: Duration, event: PortEvent) {
        let events_tx = self.events_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(duration).await;
            let _ = events_tx.send(event);
        });
    }
}

impl PortServices for PortServicesImpl {
    fn set_mux_state(&mut self, state: MuxState) {
        self.metrics.record_switchover(state);
        self.db.set_mux_state(&self.port_name, state);
    }

    fn probe_mux_state(&mut self) {
        self.db.probe_mux_state(&self.port_name);
    }

    fn set_peer_mux_state(&mut self, state: MuxState) {
        self.db.set_peer_mux_state(&self.port_name, state);
    }

    fn post_peer_switch_request(&mut self) {
        self.db.post_peer_switch_request(&self.port_name);
    }

    fn set_mux_linkmgr_state(&mut self, health: LinkManagerHealth) {
        self.metrics.record_health(&self.port_name, health);
        self.db.set_mux_linkmgr_state(&self.port_name, health);
    }

    fn post_mux_metrics(&mut self, event: MuxMetricsEvent, target: MuxState) {
        self.db.post_mux_metrics(&self.port_name, event, target);
    }

    fn post_link_prober_metrics(&mut self, event: LinkProberMetricsEvent) {
        self.db.post_link_prober_metrics(&self.port_name, event);
    }

    fn suspend_probes(&mut self, duration: Duration) {
        self.probe.suspend_tx(duration);
    }

    fn resume_probes(&mut self) {
        self.probe.resume_tx();
    }

    fn shutdown_probes(&mut self) {
        self.probe.shutdown_tx();
    }

    fn restart_probes(&mut self) {
        self.probe.restart_tx();
    }

    fn arm_mux_wait_timer(&mut self, generation: u64, duration: Duration) {
        self.arm_timer(duration, PortEvent::MuxWaitTimeout(generation));
    }

    fn arm_probe_wait_timer(&mut self, generation: u64, duration: Duration) {
        self.arm_timer(duration, PortEvent::ProbeWaitTimeout(generation));
    }

    fn arm_probe_backoff_timer(&mut self, generation: u64, duration: Duration) {
        self.arm_timer(duration, PortEvent::ProbeBackoffTimeout(generation));
    }

    fn notify_reconciled(&mut self) {
        self.reconciliation.port_reconciled();
    }
}

/// One managed MUX port: configuration, state machines, probe session, and
/// the strand that serializes them.
pub struct MuxPort {
    port_name: String,
    events_tx: mpsc::UnboundedSender<PortEvent>,
    task: JoinHandle<()>,
}

impl MuxPort {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        port_config: MuxPortConfig,
        config: MuxConfig,
        tor_mac: MacAddress,
        loopback_ip: Ipv4Address,
        db: Arc<dyn DbInterface>,
        transport: Arc<dyn HeartbeatTransport>,
        reconciliation: Arc<ReconciliationTracker>,
        metrics: MetricsCollector,
        warm_restart: bool,
    ) -> Self {
        let port_name = port_config.port_name.clone();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        // the session id ties echoed heartbeats to this daemon instance
        let session_id = std::process::id() ^ u32::from(port_config.server_id) << 16;

        let session = ProbeSession::start(
            port_name.clone(),
            &config,
            tor_mac,
            loopback_ip,
            port_config.server_id,
            session_id,
            transport,
            events_tx.clone(),
        );

        let mut machine = ActiveStandbyStateMachine::new(port_name.clone(), config);
        if warm_restart {
            machine.set_reconciliation_pending();
            reconciliation.port_registered();
        }

        let services = PortServicesImpl {
            port_name: port_name.clone(),
            db: Arc::clone(&db),
            probe: session.handle(),
            events_tx: events_tx.clone(),
            reconciliation,
            metrics: metrics.clone(),
        };

        let task = tokio::spawn(strand_loop(
            port_name.clone(),
            machine,
            session,
            services,
            db,
            metrics,
            events_rx,
        ));

        info!(port = %port_name, "created mux port");
        Self {
            port_name,
            events_tx,
            task,
        }
    }

    pub fn name(&self) -> &str {
        &self.port_name
    }

    /// Posts an event onto this port's strand.
    pub fn post(&self, event: PortEvent) {
        let _ = self.events_tx.send(event);
    }
}

impl Drop for MuxPort {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn strand_loop(
    port_name: String,
    mut machine: ActiveStandbyStateMachine,
    session: ProbeSession,
    mut services: PortServicesImpl,
    db: Arc<dyn DbInterface>,
    metrics: MetricsCollector,
    mut events_rx: mpsc::UnboundedReceiver<PortEvent>,
) {
    let probe = session.handle();

    while let Some(event) = events_rx.recv().await {
        metrics.record_event();
        match event {
            PortEvent::LinkProber(e) => {
                let before = machine.composite_state().link_prober;
                machine.handle_link_prober_event(e, &mut services);
                if machine.composite_state().link_prober != before {
                    db.post_pck_loss_ratio(
                        &port_name,
                        probe.stats.unknown(),
                        probe.stats.expected(),
                    );
                }
            }
            PortEvent::MuxStateNotification(state) => {
                machine.handle_mux_state_notification(state, &mut services);
            }
            PortEvent::ProbeMuxResponse(state) => {
                machine.handle_probe_mux_response(state, &mut services);
            }
            PortEvent::LinkStateSample(state) => {
                machine.handle_link_state_sample(state, &mut services);
            }
            PortEvent::PeerLinkState(state) => {
                machine.handle_peer_link_state(state, &mut services);
            }
            PortEvent::MuxConfig(mode) => {
                machine.handle_mux_config(mode, &mut services);
            }
            PortEvent::DefaultRouteState(ok) => {
                machine.handle_default_route_state(ok, &mut services);
            }
            PortEvent::SwitchActiveRequest => {
                machine.handle_switch_active_request(&mut services);
            }
            PortEvent::ServerIpUpdate(ip) => {
                debug!(port = %port_name, ip = %ip, "server ip update");
                probe.set_server_ip(ip);
                machine.activate(&mut services);
            }
            PortEvent::ServerMacUpdate(mac) => {
                debug!(port = %port_name, mac = %mac, "server mac update");
                probe.set_server_mac(mac);
            }
            PortEvent::PckLossReset => {
                probe.reset_counters();
                db.post_pck_loss_ratio(&port_name, 0, 0);
            }
            PortEvent::ConfigUpdate(config) => {
                probe.set_interval(config.probe_interval());
                machine.update_config(config);
            }
            PortEvent::MuxWaitTimeout(generation) => {
                machine.handle_mux_wait_timeout(generation, &mut services);
            }
            PortEvent::ProbeWaitTimeout(generation) => {
                machine.handle_probe_wait_timeout(generation, &mut services);
            }
            PortEvent::ProbeBackoffTimeout(generation) => {
                machine.handle_probe_backoff_timeout(generation, &mut services);
            }
            PortEvent::SuspendTimerExpiry => {
                machine.handle_suspend_timer_expiry(&mut services);
            }
        }
    }
}
