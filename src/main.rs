//! mtik_exporter Binary Entry Point
//!
//! This binary runs the complete exporter: device polling plus the
//! Prometheus endpoint. Core functionality is provided by the
//! `mtik_exporter` library crate.

use clap::Parser;
use mtik_exporter::{
    collector::{Collector, LatestVersionSource, catalog, latest_version},
    config::{AppConfig, DeviceConfig, SystemConfig},
    device::{DeviceConnection, DeviceEntry, DeviceIdentity, RestTransport},
    exposition::Exposition,
    scheduler::{Job, LoadStats, Scheduler},
    server::{AppState, create_router, serve_until},
};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// mtik_exporter - RouterOS Prometheus Exporter
#[derive(Parser, Debug)]
#[command(name = "mtik-exporter", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        default_value = "mtik_exporter.yaml",
        env = "MTIK_EXPORTER_CONFIG"
    )]
    config: String,

    /// Exposition bind address (overrides config file)
    #[arg(long, env = "MTIK_EXPORTER_EXPORT_ADDRESS")]
    export_address: Option<String>,

    /// Exposition port (overrides config file)
    #[arg(long, env = "MTIK_EXPORTER_EXPORT_PORT")]
    export_port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,mtik_exporter=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("mtik_exporter - RouterOS Prometheus Exporter");

    let cli = Cli::parse();

    tracing::info!("Loading configuration from: {}", cli.config);
    let mut config = AppConfig::load(&cli.config)?;

    // Apply CLI/env overrides (CLI > ENV > config file)
    if let Some(address) = cli.export_address {
        config.system.export_address = address;
    }
    if let Some(port) = cli.export_port {
        config.system.export_port = port;
    }
    config.validate()?;

    let system = &config.system;
    let stats = Arc::new(LoadStats::new(&system.metric_prefix)?);

    // Build devices and their collectors
    let disabled: Vec<&String> = config
        .devices
        .iter()
        .filter(|(_, device)| !device.enabled)
        .map(|(name, _)| name)
        .collect();
    if !disabled.is_empty() {
        tracing::info!(devices = ?disabled, "Skipping disabled devices");
    }

    let mut devices = Vec::new();
    for (name, device_config) in config.enabled_devices() {
        let device = build_device(name, device_config, system)?;
        tracing::info!(
            device = %name,
            address = %device_config.hostname,
            fast = device.fast_collectors().len(),
            slow = device.slow_collectors().len(),
            "Registered device"
        );
        devices.push(Arc::new(device));
    }

    if devices.is_empty() {
        tracing::warn!("No enabled devices configured");
    }

    // Initial connect; failures are recorded and retried by the scheduler
    for device in &devices {
        device.connection().connect().await;
    }

    let mut scheduler = Scheduler::new(Arc::clone(&stats))
        .with_reconnect_delay(system.reconnect_delay)
        .with_stagger(system.startup_stagger);

    let mut all_collectors: Vec<Arc<dyn Collector>> = Vec::new();
    for device in &devices {
        all_collectors.extend(device.collectors().cloned());
        for job in [Job::fast(device), Job::slow(device)].into_iter().flatten() {
            scheduler.add_job(job);
        }
    }

    if system.check_for_updates {
        let source =
            LatestVersionSource::new(system.check_for_updates_channels.clone(), system.socket_timeout)?;
        let collector = latest_version::collector(source, system.system_interval);
        all_collectors.push(Arc::clone(&collector));
        scheduler.add_job(Job::system(vec![collector], system.system_interval));
        tracing::info!(
            channels = ?system.check_for_updates_channels,
            "RouterOS update check enabled"
        );
    }

    tracing::info!(jobs = scheduler.job_count(), "Starting scheduler");
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler_handle = tokio::spawn(scheduler.run(shutdown_rx));

    let exposition = Exposition::new(system.metric_prefix.clone())
        .with_collectors(all_collectors)
        .with_stats(Arc::clone(&stats));
    tracing::info!(collectors = exposition.collector_count(), "Exposition ready");

    let app = create_router(AppState {
        exposition: Arc::new(exposition),
        devices,
    });

    let ip: IpAddr = system.export_address.parse()?;
    let addr = SocketAddr::new(ip, system.export_port);

    tracing::info!("Exporter listening on: http://{}/metrics", addr);
    tracing::info!("Press Ctrl+C to shutdown");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    serve_until(
        listener,
        app,
        shutdown_signal(),
        shutdown_tx,
        system.shutdown_timeout,
    )
    .await?;

    join_with_timeout(scheduler_handle, system.shutdown_timeout).await;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Build one device entry with its transport, connection and collectors.
fn build_device(
    name: &str,
    config: &DeviceConfig,
    system: &SystemConfig,
) -> Result<DeviceEntry, Box<dyn std::error::Error>> {
    let transport = RestTransport::new(config, system.socket_timeout)?;
    let connection = DeviceConnection::new(name, &config.hostname, transport, system.backoff());
    let identity = DeviceIdentity::new(name, &config.hostname);

    let build = |names: &[String], interval: Duration| {
        names
            .iter()
            .map(|collector| catalog::build(collector, identity.labels(), interval))
            .collect::<Result<Vec<_>, _>>()
    };
    let fast = build(&config.collectors, config.polling_interval)?;
    let slow = build(&config.slow_collectors, config.slow_polling_interval)?;

    Ok(DeviceEntry::new(identity, config.clone(), connection).with_collectors(fast, slow))
}

/// Wait for the scheduler task, giving up after `timeout`.
async fn join_with_timeout(handle: tokio::task::JoinHandle<()>, timeout: Duration) {
    match tokio::time::timeout(timeout, handle).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(error = %e, "Scheduler task failed"),
        Err(_) => tracing::warn!(
            timeout_secs = timeout.as_secs(),
            "Scheduler did not stop in time, abandoning in-flight load"
        ),
    }
}

/// Setup graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C signal");
        }
        _ = terminate => {
            tracing::info!("Received terminate signal");
        }
    }
}
