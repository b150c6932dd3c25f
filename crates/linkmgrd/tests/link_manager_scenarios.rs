//! End-to-end scenarios for the composite link manager state machine.
//!
//! These drive the machine exactly as the port strand does, with a
//! recording service fixture standing in for the store and the probe
//! session. Thresholds match the production defaults relevant to the
//! scenarios: positive signal count 1, negative signal count 3.

use pretty_assertions::assert_eq;
use sonic_linkmgrd::link_manager::{LinkProberMetricsEvent, MuxMetricsEvent};
use sonic_linkmgrd::link_prober_sm::LinkProberEvent;
use sonic_linkmgrd::state::{
    CompositeState, LinkManagerHealth, LinkProberState, LinkState, MuxState, PeerLinkProberState,
};
use sonic_linkmgrd::{ActiveStandbyStateMachine, MuxConfig, MuxMode, PortServices};
use std::time::Duration;

#[derive(Debug, Default)]
struct FakePort {
    mux_writes: Vec<MuxState>,
    probes: u32,
    peer_mux_writes: Vec<MuxState>,
    peer_switch_requests: u32,
    health: Vec<LinkManagerHealth>,
    metrics: Vec<(MuxMetricsEvent, MuxState)>,
    prober_metrics: Vec<LinkProberMetricsEvent>,
    suspends: u32,
    mux_wait_gens: Vec<u64>,
    probe_wait_gens: Vec<u64>,
    backoff_gens: Vec<u64>,
    reconciled: u32,
}

impl PortServices for FakePort {
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
    fn resume_probes(&mut self) {}
    fn shutdown_probes(&mut self) {}
    fn restart_probes(&mut self) {}
    fn arm_mux_wait_timer(&mut self, generation: u64, _duration: Duration) {
        self.mux_wait_gens.push(generation);
    }
    fn arm_probe_wait_timer(&mut self, generation: u64, _duration: Duration) {
        self.probe_wait_gens.push(generation);
    }
    fn arm_probe_backoff_timer(&mut self, generation: u64, _duration: Duration) {
        self.backoff_gens.push(generation);
    }
    fn notify_reconciled(&mut self) {
        self.reconciled += 1;
    }
}

fn machine() -> ActiveStandbyStateMachine {
    let mut config = MuxConfig::default();
    config.interval_v4_ms = 10;
    ActiveStandbyStateMachine::new("Ethernet4", config)
}

fn composite(lp: LinkProberState, mux: MuxState, link: LinkState) -> CompositeState {
    CompositeState {
        link_prober: lp,
        mux,
        link,
    }
}

/// Scenario 1: link up, one self heartbeat, store confirms active.
fn establish_active(sm: &mut ActiveStandbyStateMachine, port: &mut FakePort) {
    sm.activate(port);
    assert_eq!(sm.composite_state(), CompositeState::INIT);

    sm.handle_link_state_sample(LinkState::Up, port);
    assert_eq!(
        sm.composite_state(),
        composite(LinkProberState::Wait, MuxState::Wait, LinkState::Up)
    );

    sm.handle_link_prober_event(LinkProberEvent::IcmpSelf, port);
    sm.handle_mux_state_notification(MuxState::Active, port);
    assert_eq!(
        sm.composite_state(),
        composite(LinkProberState::Active, MuxState::Active, LinkState::Up)
    );
}

#[test]
fn scenario_link_up_prober_active_reaches_steady_active() {
    let mut sm = machine();
    let mut port = FakePort::default();
    establish_active(&mut sm, &mut port);

    assert_eq!(port.mux_writes, vec![MuxState::Active]);
    // health walked uninitialized -> unhealthy -> healthy
    assert_eq!(
        port.health,
        vec![
            LinkManagerHealth::Uninitialized,
            LinkManagerHealth::Unhealthy,
            LinkManagerHealth::Healthy,
        ]
    );
    // one probe-wait window on link up, one mux-wait window for the switch
    assert_eq!(port.probe_wait_gens.len(), 1);
    assert_eq!(port.mux_wait_gens.len(), 1);
}

#[test]
fn scenario_heartbeat_loss_switches_to_standby() {
    let mut sm = machine();
    let mut port = FakePort::default();
    establish_active(&mut sm, &mut port);
    port.mux_writes.clear();

    for _ in 0..3 {
        sm.handle_link_prober_event(LinkProberEvent::IcmpUnknown, &mut port);
    }
    sm.handle_mux_state_notification(MuxState::Standby, &mut port);

    assert_eq!(
        sm.composite_state(),
        composite(LinkProberState::Unknown, MuxState::Standby, LinkState::Up)
    );
    assert_eq!(port.mux_writes, vec![MuxState::Standby]);
    assert_eq!(port.suspends, 1);
    assert_eq!(
        port.prober_metrics,
        vec![LinkProberMetricsEvent::UnknownStart]
    );
}

#[test]
fn scenario_link_down_yields_standby() {
    let mut sm = machine();
    let mut port = FakePort::default();
    establish_active(&mut sm, &mut port);
    port.mux_writes.clear();

    sm.handle_link_state_sample(LinkState::Down, &mut port);
    assert_eq!(
        sm.composite_state(),
        composite(LinkProberState::Active, MuxState::Standby, LinkState::Down)
    );
    assert_eq!(port.mux_writes, vec![MuxState::Standby]);
}

#[test]
fn scenario_config_standby_then_auto_restores_active() {
    let mut sm = machine();
    let mut port = FakePort::default();
    establish_active(&mut sm, &mut port);
    port.mux_writes.clear();

    sm.handle_mux_config(MuxMode::Standby, &mut port);
    assert_eq!(
        sm.composite_state(),
        composite(LinkProberState::Active, MuxState::Standby, LinkState::Up)
    );
    assert_eq!(port.mux_writes, vec![MuxState::Standby]);

    sm.handle_mux_config(MuxMode::Auto, &mut port);
    sm.handle_link_prober_event(LinkProberEvent::IcmpSelf, &mut port);
    sm.handle_mux_state_notification(MuxState::Active, &mut port);
    assert_eq!(
        sm.composite_state(),
        composite(LinkProberState::Active, MuxState::Active, LinkState::Up)
    );
    assert_eq!(port.mux_writes, vec![MuxState::Standby, MuxState::Active]);
}

#[test]
fn scenario_bootstrap_with_unknown_driver_state() {
    let mut sm = machine();
    let mut port = FakePort::default();
    sm.activate(&mut port);
    sm.handle_link_state_sample(LinkState::Up, &mut port);

    for _ in 0..3 {
        sm.handle_mux_state_notification(MuxState::Unknown, &mut port);
    }
    sm.handle_link_prober_event(LinkProberEvent::IcmpSelf, &mut port);
    assert_eq!(
        sm.composite_state(),
        composite(LinkProberState::Active, MuxState::Unknown, LinkState::Up)
    );
    assert!(port.probes >= 1);
    assert_eq!(port.mux_writes, vec![]);

    sm.handle_probe_mux_response(MuxState::Active, &mut port);
    assert_eq!(
        sm.composite_state(),
        composite(LinkProberState::Active, MuxState::Active, LinkState::Up)
    );
    assert_eq!(port.mux_writes, vec![MuxState::Active]);
    // driver probes back off while the direction stays unknown
    assert!(!port.backoff_gens.is_empty());
}

#[test]
fn scenario_warm_restart_port_counts_once() {
    let mut sm = machine();
    let mut port = FakePort::default();
    sm.set_reconciliation_pending();
    establish_active(&mut sm, &mut port);
    assert_eq!(port.reconciled, 1);

    // later stable states do not count again
    sm.handle_link_state_sample(LinkState::Down, &mut port);
    sm.handle_link_state_sample(LinkState::Up, &mut port);
    sm.handle_mux_state_notification(MuxState::Active, &mut port);
    assert_eq!(port.reconciled, 1);
}

#[test]
fn scenario_peer_axis() {
    let mut sm = machine();
    let mut port = FakePort::default();
    establish_active(&mut sm, &mut port);

    sm.handle_link_prober_event(LinkProberEvent::IcmpPeerActive, &mut port);
    let peer = sm.peer_composite_state();
    assert_eq!(peer.link_prober, PeerLinkProberState::PeerActive);
    assert_eq!(peer.mux, MuxState::Active);
    assert_eq!(port.peer_mux_writes, vec![]);

    for _ in 0..3 {
        sm.handle_link_prober_event(LinkProberEvent::IcmpPeerUnknown, &mut port);
    }
    let peer = sm.peer_composite_state();
    assert_eq!(peer.link_prober, PeerLinkProberState::PeerUnknown);
    assert_eq!(peer.mux, MuxState::Standby);
    assert_eq!(port.peer_mux_writes, vec![MuxState::Standby]);
}

// ---- property-style checks ----------------------------------------------

/// Deterministic pseudo-random sequence without external crates.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        self.0 >> 33
    }
}

fn random_event(sm: &mut ActiveStandbyStateMachine, port: &mut FakePort, roll: u64) {
    match roll % 8 {
        0 => sm.handle_link_prober_event(LinkProberEvent::IcmpSelf, port),
        1 => sm.handle_link_prober_event(LinkProberEvent::IcmpUnknown, port),
        2 => sm.handle_link_prober_event(LinkProberEvent::IcmpPeerActive, port),
        3 => sm.handle_link_prober_event(LinkProberEvent::IcmpPeerUnknown, port),
        4 => sm.handle_link_state_sample(LinkState::Up, port),
        5 => sm.handle_link_state_sample(LinkState::Down, port),
        6 => sm.handle_mux_state_notification(MuxState::Active, port),
        _ => sm.handle_mux_state_notification(MuxState::Standby, port),
    }
}

/// Delivers the confirmations a live store would produce until no axis is
/// waiting anymore.
fn quiesce(sm: &mut ActiveStandbyStateMachine, port: &mut FakePort) {
    for _ in 0..16 {
        let state = sm.composite_state();
        match state.mux {
            MuxState::Wait => {
                let confirm = port.mux_writes.last().copied().unwrap_or(MuxState::Standby);
                sm.handle_mux_state_notification(confirm, port);
            }
            MuxState::Unknown => {
                sm.handle_probe_mux_response(MuxState::Standby, port);
            }
            _ => {}
        }
        if sm.composite_state().link_prober == LinkProberState::Wait {
            sm.handle_link_prober_event(LinkProberEvent::IcmpSelf, port);
            continue;
        }
        if sm.composite_state().mux != MuxState::Wait
            && sm.composite_state().mux != MuxState::Unknown
        {
            break;
        }
    }
}

#[test]
fn property_quiescent_composite_has_no_wait_axis() {
    for seed in 0..64 {
        let mut sm = machine();
        let mut port = FakePort::default();
        sm.activate(&mut port);
        let mut rng = Lcg(seed * 2654435761 + 1);

        for _ in 0..40 {
            let roll = rng.next();
            random_event(&mut sm, &mut port, roll);
        }
        quiesce(&mut sm, &mut port);

        let state = sm.composite_state();
        assert_ne!(state.link_prober, LinkProberState::Wait, "seed {}", seed);
        assert_ne!(state.mux, MuxState::Wait, "seed {}", seed);
        assert_ne!(state.mux, MuxState::Unknown, "seed {}", seed);
    }
}

#[test]
fn property_switch_metrics_alternate_per_target() {
    for seed in 0..64 {
        let mut sm = machine();
        let mut port = FakePort::default();
        sm.activate(&mut port);
        let mut rng = Lcg(seed + 7);

        for _ in 0..60 {
            let roll = rng.next();
            random_event(&mut sm, &mut port, roll);
        }

        let mut open: Option<MuxState> = None;
        let mut counts: std::collections::HashMap<(MuxState, bool), i64> =
            std::collections::HashMap::new();
        for (event, target) in &port.metrics {
            match event {
                MuxMetricsEvent::SwitchStart => {
                    assert_eq!(open, None, "seed {}: start inside open window", seed);
                    open = Some(*target);
                    *counts.entry((*target, true)).or_default() += 1;
                }
                MuxMetricsEvent::SwitchEnd => {
                    assert_eq!(open, Some(*target), "seed {}: unmatched end", seed);
                    open = None;
                    *counts.entry((*target, false)).or_default() += 1;
                }
            }
        }
        for target in [MuxState::Active, MuxState::Standby] {
            let starts = counts.get(&(target, true)).copied().unwrap_or(0);
            let ends = counts.get(&(target, false)).copied().unwrap_or(0);
            assert!(
                (starts - ends).abs() <= 1,
                "seed {}: {} starts vs {} ends for {}",
                seed,
                starts,
                ends,
                target
            );
        }
    }
}

#[test]
fn property_manual_mode_never_writes() {
    for seed in 0..64 {
        let mut sm = machine();
        let mut port = FakePort::default();
        sm.activate(&mut port);
        sm.handle_mux_config(MuxMode::Manual, &mut port);
        let mut rng = Lcg(seed ^ 0xbeef);

        for _ in 0..60 {
            let roll = rng.next();
            random_event(&mut sm, &mut port, roll);
        }
        sm.handle_switch_active_request(&mut port);

        assert_eq!(port.mux_writes, vec![], "seed {}", seed);
    }
}

#[test]
fn property_request_then_confirm_round_trip() {
    for target in [MuxState::Active, MuxState::Standby] {
        let mut sm = machine();
        let mut port = FakePort::default();
        sm.activate(&mut port);
        sm.handle_link_state_sample(LinkState::Up, &mut port);
        if target == MuxState::Active {
            sm.handle_link_prober_event(LinkProberEvent::IcmpSelf, &mut port);
        } else {
            for _ in 0..3 {
                sm.handle_link_prober_event(LinkProberEvent::IcmpUnknown, &mut port);
            }
        }
        assert_eq!(port.mux_writes.last(), Some(&target));

        sm.handle_mux_state_notification(target, &mut port);
        assert_eq!(sm.composite_state().mux, target);
    }
}
