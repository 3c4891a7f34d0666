//! ringsight: onboard vision node
//!
//! Loads the node configuration, opens every camera, wires up switched
//! streams and runs the ring localizer until interrupted.

use anyhow::{bail, Context};
use clap::Parser;
use ringsight_eye::config::{CameraConfig, NtMode, DEFAULT_CONFIG_PATH};
use ringsight_eye::pipeline::FrameCounter;
use ringsight_eye::vision_thread::{VisionThread, DEFAULT_FRAME_INTERVAL};
use ringsight_eye::{
    CameraRegistry, NodeConfig, OutputStream, SampleScheduler, SwitchBinding, SwitchRouter,
    SwitchedStream, ValueTable,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ringsight")]
#[command(about = "Onboard ring localization and camera switching", long_about = None)]
#[command(version)]
struct Cli {
    /// Node configuration file
    #[arg(default_value = DEFAULT_CONFIG_PATH)]
    config: String,

    /// Log level (error, warn, info, debug, trace); RUST_LOG takes precedence
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Override the sampling period in milliseconds
    #[arg(long)]
    period_ms: Option<u64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let mut config = NodeConfig::load(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config))?;
    if let Some(period_ms) = cli.period_ms {
        if period_ms == 0 {
            bail!("--period-ms must be greater than zero");
        }
        config.localizer.period_ms = period_ms;
    }

    match config.nt_mode() {
        NtMode::Server => info!("Setting up telemetry server"),
        NtMode::Client => info!("Setting up telemetry client for team {}", config.team),
    }
    let table = Arc::new(ValueTable::new());

    let mut sources = Vec::with_capacity(config.cameras.len());
    for camera in &config.cameras {
        let source = ringsight_eye::source::open_camera(camera)
            .with_context(|| format!("failed to open camera '{}'", camera.name))?;
        sources.push(source);
    }
    let registry = Arc::new(CameraRegistry::new(sources));

    let mut routers = Vec::with_capacity(config.switched_cameras.len());
    for switched in &config.switched_cameras {
        let stream = Arc::new(SwitchedStream::new(switched.name.clone()));
        let router = SwitchRouter::new(SwitchBinding::from(switched), registry.clone(), stream);
        routers.push(router.spawn(&table));
    }

    let Some(primary) = registry.get(0).cloned() else {
        warn!("No cameras configured, nothing to localize");
        wait_for_shutdown().await;
        return Ok(());
    };

    let localizer = &config.localizer;
    let output = Arc::new(OutputStream::new(localizer.output_stream.clone(), localizer.resolution));

    let frame_interval = config
        .cameras
        .first()
        .map_or(DEFAULT_FRAME_INTERVAL, CameraConfig::frame_interval);
    let mut vision = VisionThread::spawn_paced(primary.clone(), FrameCounter::new(), frame_interval, |count: &u64| {
        debug!("Frame {}", count);
    })
    .context("failed to start vision thread")?;

    let scheduler = SampleScheduler::from_config(primary, table.clone(), localizer)
        .with_output(output.clone())
        .spawn();

    info!("Ready: {} camera(s), {} switched stream(s)", registry.len(), routers.len());

    tokio::select! {
        _ = wait_for_shutdown() => {}
        _ = wait_until_stopped(|| scheduler.is_running()) => {
            warn!("Sampling stopped on its own");
        }
    }

    let cycles = scheduler.stop().await.context("sampling failed")?;
    let frames = vision.stop();
    for router in routers {
        router.abort();
    }

    info!(
        "Shut down after {} cycles, {} frames, {} overlays",
        cycles,
        frames,
        output.frame_count()
    );
    Ok(())
}

/// Poll until the predicate reports false
async fn wait_until_stopped(is_running: impl Fn() -> bool) {
    while is_running() {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

/// Wait for Ctrl-C or, on unix, SIGTERM
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Could not listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(e) => {
                warn!("Could not listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
