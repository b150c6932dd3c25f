//! Prometheus metrics collection for linkmgrd.
//!
//! The authoritative, consumer-facing counters live in STATE_DB
//! (MUX_METRICS_TABLE, LINK_PROBE_STATS_TABLE); this collector exists for
//! fleet-level scraping and alerting on the daemon itself.

use crate::state::{LinkManagerHealth, MuxState};
use prometheus::{Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Process-level metrics collector for linkmgrd.
///
/// Cloning is cheap: the underlying counters and the registry are shared
/// handles, so one collector is created at startup and cloned into the DB
/// writer and every port.
#[derive(Clone)]
pub struct MetricsCollector {
    // Counters
    pub switchovers_total: IntCounterVec,
    pub port_events_total: IntCounter,
    pub db_write_errors_total: IntCounter,

    // Gauges
    pub healthy_ports: IntGauge,

    /// Ports currently reporting healthy; backs the gauge so duplicate
    /// health publications do not double-count.
    healthy_set: Arc<Mutex<HashSet<String>>>,

    // Registry for export
    pub registry: Arc<Registry>,
}

impl MetricsCollector {
    /// Create a new metrics collector with its own registry.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let switchovers_total = IntCounterVec::new(
            Opts::new(
                "linkmgrd_switchovers_total",
                "MUX switch requests written to APP_DB, by target state",
            ),
            &["target"],
        )?;
        registry.register(Box::new(switchovers_total.clone()))?;

        let port_events_total = IntCounter::with_opts(Opts::new(
            "linkmgrd_port_events_total",
            "Events processed across all port strands",
        ))?;
        registry.register(Box::new(port_events_total.clone()))?;

        let db_write_errors_total = IntCounter::with_opts(Opts::new(
            "linkmgrd_db_write_errors_total",
            "Store writes that failed after posting",
        ))?;
        registry.register(Box::new(db_write_errors_total.clone()))?;

        let healthy_ports = IntGauge::with_opts(Opts::new(
            "linkmgrd_healthy_ports",
            "Ports currently reporting healthy",
        ))?;
        registry.register(Box::new(healthy_ports.clone()))?;

        Ok(Self {
            switchovers_total,
            port_events_total,
            db_write_errors_total,
            healthy_ports,
            healthy_set: Arc::new(Mutex::new(HashSet::new())),
            registry: Arc::new(registry),
        })
    }

    /// Record a MUX switch request.
    pub fn record_switchover(&self, target: MuxState) {
        self.switchovers_total
            .with_label_values(&[target.as_str()])
            .inc();
    }

    /// Record one event handled on a port strand.
    pub fn record_event(&self) {
        self.port_events_total.inc();
    }

    /// Record a failed store write.
    pub fn record_write_error(&self) {
        self.db_write_errors_total.inc();
    }

    /// Track the healthy-port gauge from per-port health publications.
    pub fn record_health(&self, port: &str, health: LinkManagerHealth) {
        let mut healthy = self.healthy_set.lock().unwrap();
        let changed = match health {
            LinkManagerHealth::Healthy => healthy.insert(port.to_string()),
            _ => healthy.remove(port),
        };
        if changed {
            self.healthy_ports.set(healthy.len() as i64);
        }
    }

    /// Gather all metrics in Prometheus text exposition format.
    pub fn gather_metrics(&self) -> Result<String, prometheus::Error> {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new().expect("Failed to create metrics collector")
    }
}
