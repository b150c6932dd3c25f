//! MUX cable link manager daemon.
//!
//! Entry point: reads the ToR identity from CONFIG_DB, builds the port
//! manager, and runs the store subscription and kernel neighbor listener
//! until SIGINT/SIGTERM.
//!
//! Exit codes: 0 clean shutdown, 1 fatal initialization (missing
//! configuration), 2 unexpected termination.

use clap::Parser;
use sonic_linkmgrd::manager::{LogVerbosityHook, TransportFactory};
use sonic_linkmgrd::{
    db, netlink, LinkMgrError, MetricsCollector, MuxConfig, MuxManager, RedisDbInterface,
};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::reload;
use tracing_subscriber::util::SubscriberInitExt;

const EXIT_FATAL_INIT: i32 = 1;
const EXIT_UNEXPECTED: i32 = 2;

/// SONiC dual-ToR MUX cable link manager.
#[derive(Debug, Parser)]
#[command(name = "linkmgrd", version, about)]
struct Args {
    /// Redis host for the SONiC databases.
    #[arg(long, default_value = "127.0.0.1")]
    redis_host: String,

    /// Redis port for the SONiC databases.
    #[arg(long, default_value_t = 6379)]
    redis_port: u16,

    /// Initial log verbosity (trace, debug, info, warning, error, fatal).
    #[arg(short, long, default_value = "info")]
    verbosity: String,

    /// Gate heartbeat transmission on IPv4 default-route presence.
    #[arg(short = 'd', long)]
    enable_default_route_feature: bool,

    /// Suppress switchover timing metric rows.
    #[arg(long)]
    disable_switchover_measurement: bool,
}

fn main() {
    let args = Args::parse();

    // leave two cores to the data-plane processes sharing the box
    let workers = std::thread::available_parallelism()
        .map(|n| n.get().saturating_sub(2).max(1))
        .unwrap_or(1);
    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(workers)
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("linkmgrd: failed to build runtime: {}", e);
            std::process::exit(EXIT_UNEXPECTED);
        }
    };

    match runtime.block_on(run_daemon(args)) {
        Ok(()) => {
            info!("linkmgrd: exiting normally");
        }
        Err(e) if e.is_fatal_init() => {
            error!(error = %e, "linkmgrd: fatal initialization error");
            std::process::exit(EXIT_FATAL_INIT);
        }
        Err(e) => {
            error!(error = %e, "linkmgrd: unexpected termination");
            std::process::exit(EXIT_UNEXPECTED);
        }
    }
}

fn verbosity_filter(verbosity: &str) -> LevelFilter {
    match verbosity {
        "trace" => LevelFilter::TRACE,
        "debug" => LevelFilter::DEBUG,
        "info" => LevelFilter::INFO,
        "warning" => LevelFilter::WARN,
        "error" | "fatal" => LevelFilter::ERROR,
        _ => LevelFilter::WARN,
    }
}

/// Installs the structured logger and returns the runtime-reload hook used
/// for `MUXLOGGER.log_verbosity` updates.
fn init_logging(initial: &str) -> LogVerbosityHook {
    let (filter, handle) = reload::Layer::new(verbosity_filter(initial));
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .compact(),
        )
        .init();

    Box::new(move |verbosity: &str| {
        let level = verbosity_filter(verbosity);
        if let Err(e) = handle.reload(level) {
            warn!(error = %e, "failed to reload log verbosity");
        }
    })
}

async fn run_daemon(args: Args) -> sonic_linkmgrd::Result<()> {
    let log_hook = init_logging(&args.verbosity);
    info!("linkmgrd: starting MUX cable link manager");

    // ToR identity; both are hard requirements for probing
    let tor_mac = db::read_tor_mac(&args.redis_host, args.redis_port).await?;
    let loopback_ip = db::read_loopback_ip(&args.redis_host, args.redis_port).await?;
    info!(mac = %tor_mac, loopback = %loopback_ip, "linkmgrd: ToR identity");

    let mut config = MuxConfig::default();
    config.enable_default_route_feature = args.enable_default_route_feature;
    config.enable_switchover_measurement = !args.disable_switchover_measurement;

    let metrics = MetricsCollector::new()?;
    info!("linkmgrd: initialized metrics collector");

    let db_interface = Arc::new(
        RedisDbInterface::new(&args.redis_host, args.redis_port, metrics.clone()).await?,
    );

    #[cfg(target_os = "linux")]
    let transport_factory: TransportFactory = Box::new(|port_name| {
        let transport = sonic_linkmgrd::link_prober::RawSocketTransport::new(port_name)?;
        Ok(Arc::new(transport) as Arc<dyn sonic_linkmgrd::HeartbeatTransport>)
    });
    #[cfg(not(target_os = "linux"))]
    let transport_factory: TransportFactory =
        Box::new(|_| Err(LinkMgrError::ProbeSocket("unsupported platform".into())));

    let manager = MuxManager::new(
        config,
        tor_mac,
        loopback_ip,
        db_interface,
        transport_factory,
        Some(log_hook),
        metrics,
    );

    let (warm_restart, warm_timer) =
        db::read_warm_restart_context(&args.redis_host, args.redis_port).await?;
    if warm_restart {
        manager.start_warm_restart_reconciliation(warm_timer);
    }

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let subscriptions = tokio::spawn(db::run_subscriptions(
        Arc::downgrade(&manager),
        args.redis_host.clone(),
        args.redis_port,
        shutdown_rx.clone(),
    ));
    let neighbors = tokio::spawn(netlink::run_neighbor_listener(
        Arc::downgrade(&manager),
        shutdown_rx,
    ));

    wait_for_signal().await;
    info!("linkmgrd: shutdown signal received");

    // two-phase teardown: stop the input paths first, then release the
    // manager (and with it the port strands and the writer)
    let _ = shutdown_tx.send(true);
    if let Err(e) = subscriptions.await.map_err(join_error)? {
        warn!(error = %e, "subscription loop ended with error");
    }
    if let Err(e) = neighbors.await.map_err(join_error)? {
        warn!(error = %e, "neighbor listener ended with error");
    }
    drop(manager);

    Ok(())
}

fn join_error(e: tokio::task::JoinError) -> LinkMgrError {
    LinkMgrError::Io(std::io::Error::other(e))
}

async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(sigterm) => sigterm,
        Err(e) => {
            warn!(error = %e, "cannot install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_mapping() {
        assert_eq!(verbosity_filter("trace"), LevelFilter::TRACE);
        assert_eq!(verbosity_filter("warning"), LevelFilter::WARN);
        assert_eq!(verbosity_filter("fatal"), LevelFilter::ERROR);
        assert_eq!(verbosity_filter("bogus"), LevelFilter::WARN);
    }

    #[test]
    fn test_args_defaults() {
        let args = Args::parse_from(["linkmgrd"]);
        assert_eq!(args.redis_host, "127.0.0.1");
        assert_eq!(args.redis_port, 6379);
        assert!(!args.enable_default_route_feature);
        assert!(!args.disable_switchover_measurement);
    }
}
