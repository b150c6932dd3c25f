//! Dual-ToR MUX cable link manager for SONiC.
//!
//! linkmgrd decides, for every server-facing port behind a smart (Y) cable,
//! which of the two ToRs should be the active forwarding side. It fuses
//! three asynchronous signal streams into one per-port decision machine:
//!
//! - L3 heartbeats probed toward the server (link prober)
//! - link oper status from APP_DB
//! - MUX direction confirmations from orchagent and the cable driver
//!
//! Decisions surface as APP_DB switch requests consumed by orchagent, plus
//! health and metric rows in STATE_DB.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────────────────┐     ┌─────────────────┐
//! │  Redis (SONiC)  │     │           linkmgrd           │     │  Redis (SONiC)  │
//! │                 │     │                              │     │                 │
//! │  CONFIG_DB      │────▶│  db::run_subscriptions       │     │  APPL_DB        │
//! │  APPL_DB        │     │        │                     │     │   MUX_CABLE     │
//! │  STATE_DB       │     │        ▼                     │     │   _TABLE        │
//! │                 │     │  MuxManager ──▶ MuxPort ─────│────▶│                 │
//! └─────────────────┘     │   (registry)    (strand)     │     │  STATE_DB       │
//!                         │                   │          │     │   MUX_LINKMGR   │
//! ┌─────────────────┐     │                   ▼          │     │   MUX_METRICS   │
//! │  Kernel         │────▶│  netlink    ActiveStandby    │     │                 │
//! │  RTM_NEWNEIGH   │     │             StateMachine     │     └─────────────────┘
//! └─────────────────┘     │                   ▲          │
//!                         │                   │          │
//! ┌─────────────────┐     │             ProbeSession     │
//! │  server NIC     │◀───▶│             (heartbeats)     │
//! └─────────────────┘     └──────────────────────────────┘
//! ```
//!
//! Concurrency follows a strand discipline: all events for one port are
//! serialized onto that port's channel and handled by a single task, while
//! distinct ports run in parallel on the shared worker pool.

pub mod config;
pub mod db;
pub mod error;
pub mod heartbeat;
pub mod link_manager;
pub mod link_prober;
pub mod link_prober_sm;
pub mod link_state_sm;
pub mod manager;
pub mod metrics;
pub mod mux_state_sm;
pub mod netlink;
pub mod port;
pub mod state;
pub mod tables;

pub use config::{CableType, MuxConfig, MuxMode, MuxPortConfig};
pub use db::{DbInterface, RedisDbInterface};
pub use error::{LinkMgrError, Result};
pub use link_manager::{
    ActiveStandbyStateMachine, LinkProberMetricsEvent, MuxMetricsEvent, PortServices,
};
pub use link_prober::{HeartbeatTransport, ProbeSession, ProbeSessionHandle};
pub use link_prober_sm::LinkProberEvent;
pub use manager::{MuxManager, ReconciliationTracker};
pub use metrics::MetricsCollector;
pub use port::{MuxPort, PortEvent};
pub use state::{
    CompositeState, LinkManagerHealth, LinkProberState, LinkState, MuxState, PeerCompositeState,
    PeerLinkProberState,
};
