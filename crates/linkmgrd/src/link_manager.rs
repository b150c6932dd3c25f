//! Composite link manager state machine for active-standby MUX cables.
//!
//! Fuses the three per-port sub-state-machines (link prober, MUX, link)
//! into a single switching decision surface. The machine is driven by
//! events delivered on the port's strand and acts on the world exclusively
//! through the [`PortServices`] capability handle, which keeps it free of
//! I/O and directly testable.
//!
//! Decisions are data-driven: a dense 3-D table indexed by
//! `(link prober, mux, link)` holds tagged action descriptors. The table is
//! consulted whenever an axis changes; the cell is keyed by the composite
//! value *after* the change.

use crate::config::{MuxConfig, MuxMode};
use crate::link_prober_sm::{LinkProberEvent, LinkProberStateMachine, PeerLinkProberStateMachine};
use crate::link_state_sm::LinkStateMachine;
use crate::mux_state_sm::{MuxStateMachine, WaitTimeoutOutcome};
use crate::state::{
    CompositeState, LinkManagerHealth, LinkProberState, LinkState, MuxState, PeerCompositeState,
    PeerLinkProberState,
};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Switchover timing metric events, published as
/// `linkmgrd_switch_<target>_{start,end}` rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MuxMetricsEvent {
    SwitchStart,
    SwitchEnd,
}

/// Link prober unknown-window metric events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkProberMetricsEvent {
    UnknownStart,
    UnknownEnd,
}

/// Capability handle through which the composite machine acts.
///
/// The production implementation posts store writes to the DB adapter and
/// arms tokio timers on the port strand; the test fixture records every
/// call. All methods must be non-blocking.
pub trait PortServices {
    /// Write `APP MUX_CABLE_TABLE.<port>.state` (switch request).
    fn set_mux_state(&mut self, state: MuxState);
    /// Write `APP MUX_CABLE_COMMAND_TABLE.<port>.command = probe`.
    fn probe_mux_state(&mut self);
    /// Write the peer forwarding-state row.
    fn set_peer_mux_state(&mut self, state: MuxState);
    /// Post a switch-active request to the peer ToR mailbox.
    fn post_peer_switch_request(&mut self);
    /// Publish `STATE MUX_LINKMGR_TABLE.<port>.state`.
    fn set_mux_linkmgr_state(&mut self, health: LinkManagerHealth);
    /// Publish a switchover timing metric row.
    fn post_mux_metrics(&mut self, event: MuxMetricsEvent, target: MuxState);
    /// Publish a link prober unknown-window metric row.
    fn post_link_prober_metrics(&mut self, event: LinkProberMetricsEvent);

    /// Pause heartbeat transmission for `duration`; reception continues.
    fn suspend_probes(&mut self, duration: Duration);
    /// Resume heartbeat transmission after a suspension.
    fn resume_probes(&mut self);
    /// Hard-disable heartbeat transmission (default-route gating).
    fn shutdown_probes(&mut self);
    /// Re-enable heartbeat transmission after a shutdown.
    fn restart_probes(&mut self);

    /// Arm the mux-wait timer; the expiry must be delivered back as
    /// `handle_mux_wait_timeout(generation)`.
    fn arm_mux_wait_timer(&mut self, generation: u64, duration: Duration);
    /// Arm the probe-wait timer.
    fn arm_probe_wait_timer(&mut self, generation: u64, duration: Duration);
    /// Arm the driver-probe backoff timer.
    fn arm_probe_backoff_timer(&mut self, generation: u64, duration: Duration);

    /// The port reached a stable composite for the first time in this
    /// warm-restart epoch.
    fn notify_reconciled(&mut self);
}

/// Tagged action descriptor held in the transition table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum TableAction {
    #[default]
    Noop,
    /// Request the MUX switch to active (wait/confirm flow).
    SwitchActive,
    /// Request the MUX switch to standby (wait/confirm flow).
    SwitchStandby,
    /// Suspend own heartbeats, then request standby. Guards double
    /// switches while our own probes are in flight.
    SuspendAndSwitchStandby,
    /// Ask the driver for the actual MUX direction.
    ProbeMux,
    /// The link is down: yield to the peer without waiting for a
    /// confirmation.
    YieldStandby,
}

type TransitionTable =
    [[[TableAction; LinkState::COUNT]; MuxState::COUNT]; LinkProberState::COUNT];

/// The composite (3-axis) state machine for one active-standby port.
pub struct ActiveStandbyStateMachine {
    port_name: String,
    config: MuxConfig,
    mode: MuxMode,

    link_prober: LinkProberStateMachine,
    peer_link_prober: PeerLinkProberStateMachine,
    mux: MuxStateMachine,
    link: LinkStateMachine,

    composite: CompositeState,
    peer_composite: PeerCompositeState,
    peer_link_state: LinkState,

    table: TransitionTable,

    default_route_ok: bool,
    published_health: Option<LinkManagerHealth>,

    /// Switch window currently open in the metrics table (start emitted,
    /// end pending). Keeps start/end strictly alternating.
    metrics_open: Option<MuxState>,
    /// A prober-unknown window is open in LINK_PROBE_STATS.
    prober_unknown_open: bool,

    activated: bool,
    suspended: bool,
    /// Counted toward warm-restart reconciliation; cleared after the first
    /// stable composite.
    reconciliation_pending: bool,

    mux_wait_gen: u64,
    probe_wait_gen: u64,
    probe_backoff_gen: u64,
}

impl ActiveStandbyStateMachine {
    pub fn new(port_name: impl Into<String>, config: MuxConfig) -> Self {
        Self {
            port_name: port_name.into(),
            config,
            mode: MuxMode::Auto,
            link_prober: LinkProberStateMachine::new(LinkProberState::Wait),
            peer_link_prober: PeerLinkProberStateMachine::new(PeerLinkProberState::PeerWait),
            mux: MuxStateMachine::new(MuxState::Wait),
            link: LinkStateMachine::new(LinkState::Down),
            composite: CompositeState::INIT,
            peer_composite: PeerCompositeState::INIT,
            peer_link_state: LinkState::Down,
            table: build_transition_table(),
            default_route_ok: true,
            published_health: None,
            metrics_open: None,
            prober_unknown_open: false,
            activated: false,
            suspended: false,
            reconciliation_pending: false,
            mux_wait_gen: 0,
            probe_wait_gen: 0,
            probe_backoff_gen: 0,
        }
    }

    pub fn composite_state(&self) -> CompositeState {
        self.composite
    }

    pub fn peer_composite_state(&self) -> PeerCompositeState {
        self.peer_composite
    }

    pub fn mode(&self) -> MuxMode {
        self.mode
    }

    pub fn update_config(&mut self, config: MuxConfig) {
        self.config = config;
    }

    /// Marks this port as participating in warm-restart reconciliation.
    pub fn set_reconciliation_pending(&mut self) {
        self.reconciliation_pending = true;
    }

    /// Activates the machine once all components are initialized, and
    /// publishes the initial (uninitialized) health.
    pub fn activate(&mut self, services: &mut dyn PortServices) {
        if self.activated {
            return;
        }
        self.activated = true;
        info!(port = %self.port_name, "activating link manager state machine");
        self.publish_health(services);
    }

    // ---- event handlers -------------------------------------------------

    /// Raw ICMP classification event from the probe session.
    pub fn handle_link_prober_event(
        &mut self,
        event: LinkProberEvent,
        services: &mut dyn PortServices,
    ) {
        let positive = self.config.positive_signal_count;
        let negative = self.config.negative_signal_count;

        if let Some(state) = self.link_prober.handle_event(event, positive, negative) {
            debug!(port = %self.port_name, state = %state, "link prober state change");
            self.post_prober_window_metrics(state, services);
            self.composite.link_prober = state;
            self.run_table(services);
        }

        if let Some(state) = self.peer_link_prober.handle_event(event, positive, negative) {
            debug!(port = %self.port_name, state = %state, "peer link prober state change");
            self.peer_composite.link_prober = state;
            self.handle_peer_prober_change(state, services);
        }

        self.refresh(services);
    }

    /// MUX state confirmation from orchagent (STATE_DB).
    pub fn handle_mux_state_notification(
        &mut self,
        state: MuxState,
        services: &mut dyn PortServices,
    ) {
        let was_wait = self.composite.mux == MuxState::Wait;
        if let Some(changed) = self.mux.confirm(state) {
            debug!(port = %self.port_name, state = %changed, "mux state confirmed");
            if was_wait {
                // leaving Wait cancels the mux-wait timer
                self.mux_wait_gen += 1;
            }
            self.composite.mux = changed;
            if self.metrics_open == Some(changed) {
                self.emit_switch_metric(MuxMetricsEvent::SwitchEnd, changed, services);
            }
            if changed == MuxState::Standby
                && self.peer_composite.link_prober == PeerLinkProberState::PeerActive
            {
                // the peer demonstrably carries the traffic now
                if let Some(state) = self.link_prober.assert_standby() {
                    self.composite.link_prober = state;
                }
            }
            self.run_table(services);
        }
        self.refresh(services);
    }

    /// Driver response to a probe command (APP_DB response table).
    pub fn handle_probe_mux_response(
        &mut self,
        response: MuxState,
        services: &mut dyn PortServices,
    ) {
        match response {
            MuxState::Error | MuxState::Unknown => {
                // indefinite answer: keep probing with backoff
                warn!(port = %self.port_name, response = %response, "indefinite mux probe response");
                if self.composite.mux == MuxState::Unknown {
                    self.arm_probe_backoff(services);
                }
            }
            MuxState::Active | MuxState::Standby => {
                if self.composite.mux == MuxState::Unknown {
                    let desired = self.desired_mux_state();
                    if response == desired {
                        // driver already points the right way; converge the
                        // store so orchagent programs the same direction
                        if let Some(changed) = self.mux.confirm(response) {
                            self.composite.mux = changed;
                        }
                        if self.can_write_mux() {
                            services.set_mux_state(desired);
                        }
                        self.run_table(services);
                    } else {
                        // disagreement: re-request without clearing the
                        // attempt counter so the retry bound holds
                        self.request_mux(desired, services);
                    }
                } else {
                    self.handle_mux_state_notification(response, services);
                    return;
                }
            }
            MuxState::Wait => {}
        }
        self.refresh(services);
    }

    /// Raw link oper-status sample from APP PORT_TABLE.
    pub fn handle_link_state_sample(
        &mut self,
        sample: LinkState,
        services: &mut dyn PortServices,
    ) {
        let retries = self.config.link_state_change_retry_count;
        if let Some(state) = self.link.handle_sample(sample, retries) {
            info!(port = %self.port_name, state = %state, "link state change");
            self.composite.link = state;
            match state {
                LinkState::Up => {
                    if self.composite.link_prober == LinkProberState::Wait {
                        self.arm_probe_wait(services);
                    }
                }
                LinkState::Down => {}
            }
            self.run_table(services);
        }
        self.refresh(services);
    }

    /// Peer link status from STATE MUX_CABLE_INFO.
    pub fn handle_peer_link_state(&mut self, state: LinkState, services: &mut dyn PortServices) {
        if self.peer_link_state != state {
            info!(port = %self.port_name, state = %state, "peer link state change");
            self.peer_link_state = state;
        }
        self.refresh(services);
    }

    /// Configuration mode change from CONFIG MUX_CABLE.
    pub fn handle_mux_config(&mut self, mode: MuxMode, services: &mut dyn PortServices) {
        if self.mode == mode {
            return;
        }
        info!(port = %self.port_name, mode = %mode, "mux config change");
        self.mode = mode;

        match mode {
            MuxMode::Active => self.forced_switch(MuxState::Active, services),
            MuxMode::Standby => {
                self.forced_switch(MuxState::Standby, services);
                services.post_peer_switch_request();
            }
            MuxMode::Auto => self.run_table(services),
            MuxMode::Manual | MuxMode::Detached => {}
        }
        self.refresh(services);
    }

    /// Process-wide default route state fan-in.
    pub fn handle_default_route_state(&mut self, ok: bool, services: &mut dyn PortServices) {
        if self.default_route_ok == ok {
            return;
        }
        self.default_route_ok = ok;
        if self.config.enable_default_route_feature {
            if ok {
                info!(port = %self.port_name, "default route restored, restarting probes");
                services.restart_probes();
            } else {
                warn!(port = %self.port_name, "default route missing, shutting probes down");
                services.shutdown_probes();
            }
        }
        self.refresh(services);
    }

    /// Switch-active request from the peer ToR.
    pub fn handle_switch_active_request(&mut self, services: &mut dyn PortServices) {
        if matches!(self.mode, MuxMode::Detached | MuxMode::Manual) {
            debug!(port = %self.port_name, mode = %self.mode, "ignoring peer switch request");
            return;
        }
        if self.peer_link_state == LinkState::Down {
            warn!(port = %self.port_name, "peer requested switchover while its link is down, ignoring");
            return;
        }
        let accept = self.composite.link_prober == LinkProberState::Unknown
            || self.composite.link == LinkState::Down;
        if accept {
            info!(port = %self.port_name, "accepting peer switch request, yielding to standby");
            self.yield_standby(services);
        } else {
            debug!(port = %self.port_name, composite = %self.composite, "peer switch request ignored");
        }
        self.refresh(services);
    }

    /// Mux-wait timer expiry. Stale generations are discarded.
    pub fn handle_mux_wait_timeout(&mut self, generation: u64, services: &mut dyn PortServices) {
        if generation != self.mux_wait_gen || self.composite.mux != MuxState::Wait {
            return;
        }
        warn!(port = %self.port_name, "mux wait timeout");
        match self
            .mux
            .handle_wait_timeout(self.config.mux_state_change_retry_count)
        {
            WaitTimeoutOutcome::Retry => {
                self.composite.mux = MuxState::Unknown;
                self.issue_probe(services);
            }
            WaitTimeoutOutcome::Error => {
                warn!(port = %self.port_name, "mux switch retries exhausted, entering error state");
                self.composite.mux = MuxState::Error;
            }
        }
        self.refresh(services);
    }

    /// Probe-wait timer expiry.
    pub fn handle_probe_wait_timeout(&mut self, generation: u64, services: &mut dyn PortServices) {
        if generation != self.probe_wait_gen {
            return;
        }
        if self.composite.link_prober == LinkProberState::Wait
            && self.composite.link == LinkState::Up
        {
            warn!(port = %self.port_name, "no prober classification yet, probing driver");
            self.issue_probe(services);
            self.arm_probe_wait(services);
        }
        self.refresh(services);
    }

    /// Driver-probe backoff timer expiry.
    pub fn handle_probe_backoff_timeout(
        &mut self,
        generation: u64,
        services: &mut dyn PortServices,
    ) {
        if generation != self.probe_backoff_gen {
            return;
        }
        if self.composite.mux == MuxState::Unknown {
            self.issue_probe(services);
        }
    }

    /// Suspension window elapsed.
    pub fn handle_suspend_timer_expiry(&mut self, services: &mut dyn PortServices) {
        self.suspended = false;
        services.resume_probes();
        if matches!(self.composite.mux, MuxState::Wait | MuxState::Unknown) {
            self.issue_probe(services);
        }
    }

    // ---- decision core --------------------------------------------------

    fn run_table(&mut self, services: &mut dyn PortServices) {
        let action = self.table[self.composite.link_prober.index()][self.composite.mux.index()]
            [self.composite.link.index()];
        debug!(
            port = %self.port_name,
            composite = %self.composite,
            action = ?action,
            "transition"
        );
        match action {
            TableAction::Noop => {}
            TableAction::SwitchActive => {
                if self.mode != MuxMode::Standby {
                    self.request_mux(MuxState::Active, services);
                }
            }
            TableAction::SwitchStandby => {
                if self.mode != MuxMode::Active {
                    self.request_mux(MuxState::Standby, services);
                }
            }
            TableAction::SuspendAndSwitchStandby => {
                if self.mode != MuxMode::Active && self.can_write_mux() {
                    if !self.suspended {
                        self.suspended = true;
                        services.suspend_probes(self.config.suspend_timeout());
                    }
                    self.request_mux(MuxState::Standby, services);
                }
            }
            TableAction::ProbeMux => self.issue_probe(services),
            TableAction::YieldStandby => {
                if self.mode != MuxMode::Active {
                    self.yield_standby(services);
                }
            }
        }
    }

    /// The MUX direction the current prober state calls for.
    fn desired_mux_state(&self) -> MuxState {
        match self.mode {
            MuxMode::Active => MuxState::Active,
            MuxMode::Standby => MuxState::Standby,
            _ => match self.composite.link_prober {
                LinkProberState::Active => MuxState::Active,
                _ => MuxState::Standby,
            },
        }
    }

    fn can_write_mux(&self) -> bool {
        self.mode != MuxMode::Manual
    }

    /// Issues a switch request through the wait/confirm flow.
    fn request_mux(&mut self, target: MuxState, services: &mut dyn PortServices) {
        if !self.can_write_mux() {
            return;
        }
        // an identical request is already outstanding
        if self.composite.mux == MuxState::Wait && self.mux.wait_target() == Some(target) {
            return;
        }
        info!(port = %self.port_name, target = %target, "requesting mux switch");
        self.emit_switch_metric(MuxMetricsEvent::SwitchStart, target, services);
        self.mux.enter_wait(target);
        self.composite.mux = MuxState::Wait;
        services.set_mux_state(target);
        self.mux_wait_gen += 1;
        services.arm_mux_wait_timer(self.mux_wait_gen, self.config.mux_wait_timeout());
    }

    /// Link-down (or accepted peer request) yield: the standby direction is
    /// assumed immediately, without a wait window.
    fn yield_standby(&mut self, services: &mut dyn PortServices) {
        if !self.can_write_mux() {
            return;
        }
        if self.composite.mux == MuxState::Standby {
            return;
        }
        info!(port = %self.port_name, "yielding mux to standby");
        self.mux_wait_gen += 1; // cancels any outstanding wait window
        self.mux.force(MuxState::Standby);
        self.composite.mux = MuxState::Standby;
        services.set_mux_state(MuxState::Standby);
        self.emit_switch_metric(MuxMetricsEvent::SwitchStart, MuxState::Standby, services);
        self.emit_switch_metric(MuxMetricsEvent::SwitchEnd, MuxState::Standby, services);
    }

    /// Config-forced switch: the target is pinned, so the axis is set
    /// directly and the store write is issued once.
    fn forced_switch(&mut self, target: MuxState, services: &mut dyn PortServices) {
        if self.composite.mux == target {
            return;
        }
        info!(port = %self.port_name, target = %target, "config-forced mux switch");
        self.mux_wait_gen += 1;
        self.mux.force(target);
        self.composite.mux = target;
        services.set_mux_state(target);
        self.emit_switch_metric(MuxMetricsEvent::SwitchStart, target, services);
        self.emit_switch_metric(MuxMetricsEvent::SwitchEnd, target, services);
    }

    fn issue_probe(&mut self, services: &mut dyn PortServices) {
        services.probe_mux_state();
        self.arm_probe_backoff(services);
    }

    fn arm_probe_backoff(&mut self, services: &mut dyn PortServices) {
        self.probe_backoff_gen += 1;
        let backoff = self.mux.next_probe_backoff();
        services.arm_probe_backoff_timer(self.probe_backoff_gen, backoff);
    }

    fn arm_probe_wait(&mut self, services: &mut dyn PortServices) {
        self.probe_wait_gen += 1;
        services.arm_probe_wait_timer(self.probe_wait_gen, self.config.probe_wait_timeout());
    }

    fn handle_peer_prober_change(
        &mut self,
        state: PeerLinkProberState,
        services: &mut dyn PortServices,
    ) {
        match state {
            PeerLinkProberState::PeerActive => {
                self.peer_composite.mux = MuxState::Active;
            }
            PeerLinkProberState::PeerUnknown => {
                self.peer_composite.mux = MuxState::Standby;
                if self.mode != MuxMode::Detached {
                    services.set_peer_mux_state(MuxState::Standby);
                }
            }
            PeerLinkProberState::PeerWait => {}
        }
    }

    // ---- metrics and health ---------------------------------------------

    fn emit_switch_metric(
        &mut self,
        event: MuxMetricsEvent,
        target: MuxState,
        services: &mut dyn PortServices,
    ) {
        if !self.config.enable_switchover_measurement {
            return;
        }
        match event {
            MuxMetricsEvent::SwitchStart => {
                // close a superseded window first so start/end alternate
                if let Some(open) = self.metrics_open.take() {
                    if open != target {
                        services.post_mux_metrics(MuxMetricsEvent::SwitchEnd, open);
                    } else {
                        self.metrics_open = Some(open);
                        return;
                    }
                }
                self.metrics_open = Some(target);
                services.post_mux_metrics(MuxMetricsEvent::SwitchStart, target);
            }
            MuxMetricsEvent::SwitchEnd => {
                if self.metrics_open == Some(target) {
                    self.metrics_open = None;
                    services.post_mux_metrics(MuxMetricsEvent::SwitchEnd, target);
                }
            }
        }
    }

    fn post_prober_window_metrics(
        &mut self,
        state: LinkProberState,
        services: &mut dyn PortServices,
    ) {
        if state == LinkProberState::Unknown {
            if !self.prober_unknown_open {
                self.prober_unknown_open = true;
                services.post_link_prober_metrics(LinkProberMetricsEvent::UnknownStart);
            }
        } else if self.prober_unknown_open {
            self.prober_unknown_open = false;
            services.post_link_prober_metrics(LinkProberMetricsEvent::UnknownEnd);
        }
    }

    fn health(&self) -> LinkManagerHealth {
        if !self.activated
            || (self.composite.link_prober == LinkProberState::Wait
                && self.composite.mux == MuxState::Wait)
        {
            return LinkManagerHealth::Uninitialized;
        }
        let steady_active = self.composite.link_prober == LinkProberState::Active
            && self.composite.mux == MuxState::Active
            && self.composite.link == LinkState::Up;
        if steady_active && self.default_route_ok {
            LinkManagerHealth::Healthy
        } else {
            LinkManagerHealth::Unhealthy
        }
    }

    fn publish_health(&mut self, services: &mut dyn PortServices) {
        let health = self.health();
        if self.published_health != Some(health) {
            self.published_health = Some(health);
            services.set_mux_linkmgr_state(health);
        }
    }

    /// Post-event bookkeeping: health publication and warm-restart
    /// reconciliation accounting.
    fn refresh(&mut self, services: &mut dyn PortServices) {
        if self.activated {
            self.publish_health(services);
        }
        if self.reconciliation_pending && self.composite.is_stable() {
            self.reconciliation_pending = false;
            services.notify_reconciled();
        }
    }
}

/// Populates the transition table. Only reachable triples carry an action;
/// everything else is a no-op.
fn build_transition_table() -> TransitionTable {
    use LinkProberState as Lp;
    use LinkState as Ls;
    use MuxState as Ms;

    let mut table: TransitionTable = Default::default();
    let mut set = |lp: Lp, ms: Ms, ls: Ls, action: TableAction| {
        table[lp.index()][ms.index()][ls.index()] = action;
    };

    // link up: prober-driven reconciliation between desire and actual
    set(Lp::Active, Ms::Wait, Ls::Up, TableAction::SwitchActive);
    set(Lp::Active, Ms::Standby, Ls::Up, TableAction::SwitchActive);
    set(Lp::Active, Ms::Unknown, Ls::Up, TableAction::ProbeMux);

    set(Lp::Standby, Ms::Active, Ls::Up, TableAction::SwitchStandby);
    set(Lp::Standby, Ms::Unknown, Ls::Up, TableAction::ProbeMux);

    set(
        Lp::Unknown,
        Ms::Active,
        Ls::Up,
        TableAction::SuspendAndSwitchStandby,
    );
    set(Lp::Unknown, Ms::Unknown, Ls::Up, TableAction::ProbeMux);

    set(Lp::Wait, Ms::Unknown, Ls::Up, TableAction::ProbeMux);

    // link down: this side yields regardless of the prober axis
    for lp in [Lp::Active, Lp::Standby, Lp::Unknown, Lp::Wait] {
        set(lp, Ms::Active, Ls::Down, TableAction::YieldStandby);
        set(lp, Ms::Unknown, Ls::Down, TableAction::YieldStandby);
        set(lp, Ms::Wait, Ls::Down, TableAction::YieldStandby);
    }
    // the freshly created port sits at (Wait, Wait, Down); nothing to do
    set(Lp::Wait, Ms::Wait, Ls::Down, TableAction::Noop);

    table
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Debug, Default)]
    struct RecordingServices {
        mux_writes: Vec<MuxState>,
        probes: u32,
        peer_mux_writes: Vec<MuxState>,
        peer_switch_requests: u32,
        health: Vec<LinkManagerHealth>,
        metrics: Vec<(MuxMetricsEvent, MuxState)>,
        prober_metrics: Vec<LinkProberMetricsEvent>,
        suspends: u32,
        resumes: u32,
        shutdowns: u32,
        restarts: u32,
        mux_wait_timers: Vec<u64>,
        probe_wait_timers: Vec<u64>,
        backoff_timers: Vec<u64>,
        reconciled: u32,
    }

    impl PortServices for RecordingServices {
        fn set_mux_state(&mut self, state: MuxState) {
            self.mux_writes.push(state);
        }
        fn probe_mux_state(&mut self) {
            self.probes += 1;
        }
        fn set_peer_mux_state(&mut self, state: MuxState) {
            self.peer_mux_writes.push(state);
        }
        fn post_peer_switch_request(&mut self) {
            self.peer_switch_requests += 1;
        }
        fn set_mux_linkmgr_state(&mut self, health: LinkManagerHealth) {
            self.health.push(health);
        }
        fn post_mux_metrics(&mut self, event: MuxMetricsEvent, target: MuxState) {
            self.metrics.push((event, target));
        }
        fn post_link_prober_metrics(&mut self, event: LinkProberMetricsEvent) {
            self.prober_metrics.push(event);
        }
        fn suspend_probes(&mut self, _duration: Duration) {
            self.suspends += 1;
        }
        fn resume_probes(&mut self) {
            self.resumes += 1;
        }
        fn shutdown_probes(&mut self) {
            self.shutdowns += 1;
        }
        fn restart_probes(&mut self) {
            self.restarts += 1;
        }
        fn arm_mux_wait_timer(&mut self, generation: u64, _duration: Duration) {
            self.mux_wait_timers.push(generation);
        }
        fn arm_probe_wait_timer(&mut self, generation: u64, _duration: Duration) {
            self.probe_wait_timers.push(generation);
        }
        fn arm_probe_backoff_timer(&mut self, generation: u64, _duration: Duration) {
            self.backoff_timers.push(generation);
        }
        fn notify_reconciled(&mut self) {
            self.reconciled += 1;
        }
    }

    fn test_machine() -> ActiveStandbyStateMachine {
        let mut config = MuxConfig::default();
        config.interval_v4_ms = 10;
        ActiveStandbyStateMachine::new("Ethernet0", config)
    }

    fn composite(
        lp: LinkProberState,
        mux: MuxState,
        link: LinkState,
    ) -> CompositeState {
        CompositeState {
            link_prober: lp,
            mux,
            link,
        }
    }

    fn bring_to_active(
        sm: &mut ActiveStandbyStateMachine,
        services: &mut RecordingServices,
    ) {
        sm.activate(services);
        sm.handle_link_state_sample(LinkState::Up, services);
        sm.handle_link_prober_event(LinkProberEvent::IcmpSelf, services);
        sm.handle_mux_state_notification(MuxState::Active, services);
    }

    #[test]
    fn test_bootstrap_to_active() {
        let mut sm = test_machine();
        let mut services = RecordingServices::default();

        sm.activate(&mut services);
        assert_eq!(sm.composite_state(), CompositeState::INIT);
        assert_eq!(services.health, vec![LinkManagerHealth::Uninitialized]);

        sm.handle_link_state_sample(LinkState::Up, &mut services);
        assert_eq!(
            sm.composite_state(),
            composite(LinkProberState::Wait, MuxState::Wait, LinkState::Up)
        );
        assert_eq!(services.probe_wait_timers.len(), 1);

        sm.handle_link_prober_event(LinkProberEvent::IcmpSelf, &mut services);
        assert_eq!(
            sm.composite_state(),
            composite(LinkProberState::Active, MuxState::Wait, LinkState::Up)
        );
        assert_eq!(services.mux_writes, vec![MuxState::Active]);
        assert_eq!(services.mux_wait_timers.len(), 1);

        sm.handle_mux_state_notification(MuxState::Active, &mut services);
        assert_eq!(
            sm.composite_state(),
            composite(LinkProberState::Active, MuxState::Active, LinkState::Up)
        );
        assert_eq!(services.mux_writes.len(), 1);
        assert_eq!(
            services.metrics,
            vec![
                (MuxMetricsEvent::SwitchStart, MuxState::Active),
                (MuxMetricsEvent::SwitchEnd, MuxState::Active),
            ]
        );
        assert_eq!(*services.health.last().unwrap(), LinkManagerHealth::Healthy);
    }

    #[test]
    fn test_prober_unknown_switches_to_standby() {
        let mut sm = test_machine();
        let mut services = RecordingServices::default();
        bring_to_active(&mut sm, &mut services);
        services.mux_writes.clear();

        for _ in 0..3 {
            sm.handle_link_prober_event(LinkProberEvent::IcmpUnknown, &mut services);
        }
        assert_eq!(
            sm.composite_state(),
            composite(LinkProberState::Unknown, MuxState::Wait, LinkState::Up)
        );
        assert_eq!(services.mux_writes, vec![MuxState::Standby]);
        assert_eq!(services.suspends, 1);
        assert_eq!(
            services.prober_metrics,
            vec![LinkProberMetricsEvent::UnknownStart]
        );

        sm.handle_mux_state_notification(MuxState::Standby, &mut services);
        assert_eq!(
            sm.composite_state(),
            composite(LinkProberState::Unknown, MuxState::Standby, LinkState::Up)
        );
    }

    #[test]
    fn test_link_down_yields_immediately() {
        let mut sm = test_machine();
        let mut services = RecordingServices::default();
        bring_to_active(&mut sm, &mut services);
        services.mux_writes.clear();

        sm.handle_link_state_sample(LinkState::Down, &mut services);
        assert_eq!(
            sm.composite_state(),
            composite(LinkProberState::Active, MuxState::Standby, LinkState::Down)
        );
        assert_eq!(services.mux_writes, vec![MuxState::Standby]);
    }

    #[test]
    fn test_manual_mode_suppresses_writes() {
        let mut sm = test_machine();
        let mut services = RecordingServices::default();
        sm.activate(&mut services);
        sm.handle_mux_config(MuxMode::Manual, &mut services);

        sm.handle_link_state_sample(LinkState::Up, &mut services);
        sm.handle_link_prober_event(LinkProberEvent::IcmpSelf, &mut services);
        for _ in 0..3 {
            sm.handle_link_prober_event(LinkProberEvent::IcmpUnknown, &mut services);
        }
        sm.handle_link_state_sample(LinkState::Down, &mut services);

        assert_eq!(services.mux_writes, vec![]);
    }

    #[test]
    fn test_mux_wait_timeout_probes_then_errors() {
        let mut sm = test_machine();
        let mut services = RecordingServices::default();
        sm.activate(&mut services);
        sm.handle_link_state_sample(LinkState::Up, &mut services);
        sm.handle_link_prober_event(LinkProberEvent::IcmpSelf, &mut services);
        assert_eq!(sm.composite_state().mux, MuxState::Wait);

        // attempt 1 of 3 timed out
        let gen = *services.mux_wait_timers.last().unwrap();
        sm.handle_mux_wait_timeout(gen, &mut services);
        assert_eq!(sm.composite_state().mux, MuxState::Unknown);
        assert_eq!(services.probes, 1);

        // driver says standby, prober wants active: re-request (attempt 2)
        sm.handle_probe_mux_response(MuxState::Standby, &mut services);
        assert_eq!(sm.composite_state().mux, MuxState::Wait);
        let gen = *services.mux_wait_timers.last().unwrap();
        sm.handle_mux_wait_timeout(gen, &mut services);
        assert_eq!(sm.composite_state().mux, MuxState::Unknown);

        // attempt 3 exhausts the bound
        sm.handle_probe_mux_response(MuxState::Standby, &mut services);
        let gen = *services.mux_wait_timers.last().unwrap();
        sm.handle_mux_wait_timeout(gen, &mut services);
        assert_eq!(sm.composite_state().mux, MuxState::Error);
        assert_eq!(
            *services.health.last().unwrap(),
            LinkManagerHealth::Unhealthy
        );
    }

    #[test]
    fn test_stale_timer_generation_discarded() {
        let mut sm = test_machine();
        let mut services = RecordingServices::default();
        sm.activate(&mut services);
        sm.handle_link_state_sample(LinkState::Up, &mut services);
        sm.handle_link_prober_event(LinkProberEvent::IcmpSelf, &mut services);

        let stale = *services.mux_wait_timers.last().unwrap();
        sm.handle_mux_state_notification(MuxState::Active, &mut services);

        // the wait window closed; the late fire must be ignored
        sm.handle_mux_wait_timeout(stale, &mut services);
        assert_eq!(sm.composite_state().mux, MuxState::Active);
    }

    #[test]
    fn test_config_forced_standby_and_back() {
        let mut sm = test_machine();
        let mut services = RecordingServices::default();
        bring_to_active(&mut sm, &mut services);
        services.mux_writes.clear();

        sm.handle_mux_config(MuxMode::Standby, &mut services);
        assert_eq!(
            sm.composite_state(),
            composite(LinkProberState::Active, MuxState::Standby, LinkState::Up)
        );
        assert_eq!(services.mux_writes, vec![MuxState::Standby]);
        assert_eq!(services.peer_switch_requests, 1);

        // back to auto with the prober still hearing itself
        sm.handle_mux_config(MuxMode::Auto, &mut services);
        assert_eq!(services.mux_writes, vec![MuxState::Standby, MuxState::Active]);
        sm.handle_mux_state_notification(MuxState::Active, &mut services);
        assert_eq!(
            sm.composite_state(),
            composite(LinkProberState::Active, MuxState::Active, LinkState::Up)
        );
        assert_eq!(services.mux_writes.len(), 2);
    }

    #[test]
    fn test_probe_response_converges_store() {
        let mut sm = test_machine();
        let mut services = RecordingServices::default();
        sm.activate(&mut services);
        sm.handle_link_state_sample(LinkState::Up, &mut services);

        // driver reports unknown repeatedly before any prober signal
        for _ in 0..3 {
            sm.handle_mux_state_notification(MuxState::Unknown, &mut services);
        }
        assert_eq!(sm.composite_state().mux, MuxState::Unknown);
        let probes_before = services.probes;
        assert!(probes_before >= 1);

        sm.handle_link_prober_event(LinkProberEvent::IcmpSelf, &mut services);
        assert_eq!(
            sm.composite_state(),
            composite(LinkProberState::Active, MuxState::Unknown, LinkState::Up)
        );
        assert!(services.probes > 0);
        assert_eq!(services.mux_writes, vec![]);

        sm.handle_probe_mux_response(MuxState::Active, &mut services);
        assert_eq!(
            sm.composite_state(),
            composite(LinkProberState::Active, MuxState::Active, LinkState::Up)
        );
        assert_eq!(services.mux_writes, vec![MuxState::Active]);
    }

    #[test]
    fn test_peer_axis_tracking() {
        let mut sm = test_machine();
        let mut services = RecordingServices::default();
        bring_to_active(&mut sm, &mut services);

        sm.handle_link_prober_event(LinkProberEvent::IcmpPeerActive, &mut services);
        assert_eq!(
            sm.peer_composite_state().link_prober,
            PeerLinkProberState::PeerActive
        );
        assert_eq!(sm.peer_composite_state().mux, MuxState::Active);
        assert_eq!(services.peer_mux_writes, vec![]);

        for _ in 0..3 {
            sm.handle_link_prober_event(LinkProberEvent::IcmpPeerUnknown, &mut services);
        }
        assert_eq!(
            sm.peer_composite_state().link_prober,
            PeerLinkProberState::PeerUnknown
        );
        assert_eq!(sm.peer_composite_state().mux, MuxState::Standby);
        assert_eq!(services.peer_mux_writes, vec![MuxState::Standby]);
    }

    #[test]
    fn test_peer_switch_request_gating() {
        let mut sm = test_machine();
        let mut services = RecordingServices::default();
        bring_to_active(&mut sm, &mut services);
        sm.handle_peer_link_state(LinkState::Up, &mut services);
        services.mux_writes.clear();

        // healthy active side refuses to yield
        sm.handle_switch_active_request(&mut services);
        assert_eq!(services.mux_writes, vec![]);

        // with the prober unknown the request is honored
        for _ in 0..3 {
            sm.handle_link_prober_event(LinkProberEvent::IcmpUnknown, &mut services);
        }
        services.mux_writes.clear();
        sm.handle_switch_active_request(&mut services);
        assert_eq!(services.mux_writes, vec![MuxState::Standby]);
    }

    #[test]
    fn test_default_route_gating() {
        let mut config = MuxConfig::default();
        config.enable_default_route_feature = true;
        let mut sm = ActiveStandbyStateMachine::new("Ethernet0", config);
        let mut services = RecordingServices::default();
        bring_to_active(&mut sm, &mut services);

        sm.handle_default_route_state(false, &mut services);
        assert_eq!(services.shutdowns, 1);
        assert_eq!(
            *services.health.last().unwrap(),
            LinkManagerHealth::Unhealthy
        );

        sm.handle_default_route_state(true, &mut services);
        assert_eq!(services.restarts, 1);
        assert_eq!(*services.health.last().unwrap(), LinkManagerHealth::Healthy);
    }

    #[test]
    fn test_metrics_start_end_alternate() {
        let mut sm = test_machine();
        let mut services = RecordingServices::default();
        bring_to_active(&mut sm, &mut services);
        for _ in 0..3 {
            sm.handle_link_prober_event(LinkProberEvent::IcmpUnknown, &mut services);
        }
        sm.handle_mux_state_notification(MuxState::Standby, &mut services);

        let mut open: Option<MuxState> = None;
        for (event, target) in &services.metrics {
            match event {
                MuxMetricsEvent::SwitchStart => {
                    assert_eq!(open, None, "start emitted while a window is open");
                    open = Some(*target);
                }
                MuxMetricsEvent::SwitchEnd => {
                    assert_eq!(open, Some(*target), "end without matching start");
                    open = None;
                }
            }
        }
    }

    #[test]
    fn test_reconciliation_notified_once() {
        let mut sm = test_machine();
        let mut services = RecordingServices::default();
        sm.set_reconciliation_pending();
        bring_to_active(&mut sm, &mut services);
        assert_eq!(services.reconciled, 1);

        // further stable states do not re-notify
        sm.handle_link_prober_event(LinkProberEvent::IcmpSelf, &mut services);
        assert_eq!(services.reconciled, 1);
    }

    #[test]
    fn test_suspend_expiry_resumes_probes() {
        let mut sm = test_machine();
        let mut services = RecordingServices::default();
        bring_to_active(&mut sm, &mut services);
        for _ in 0..3 {
            sm.handle_link_prober_event(LinkProberEvent::IcmpUnknown, &mut services);
        }
        assert_eq!(services.suspends, 1);

        sm.handle_suspend_timer_expiry(&mut services);
        assert_eq!(services.resumes, 1);
    }

    #[test]
    fn test_unreachable_cells_are_noop() {
        let table = build_transition_table();
        assert_eq!(
            table[LinkProberState::Wait.index()][MuxState::Wait.index()][LinkState::Down.index()],
            TableAction::Noop
        );
        assert_eq!(
            table[LinkProberState::Active.index()][MuxState::Error.index()]
                [LinkState::Up.index()],
            TableAction::Noop
        );
    }
}
