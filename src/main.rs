//! ==============================================================================
//! main.rs - potwatch entry point
//! ==============================================================================
//!
//! purpose:
//!     logs a user in by chat id, resolves their pots and keeps a live
//!     dashboard of every pot's readings.
//!
//! responsibilities:
//!     - load configuration (dashboard.toml)
//!     - resolve the chat id to pot ids (or take --device ids directly)
//!     - build the fetcher, the render sinks and the poll scheduler
//!     - start monitoring and serve the web dashboard
//!     - stop cleanly on ctrl-c
//!
//! architecture:
//!
//!     ┌────────────────────────────────────────────────────────────┐
//!     │                       potwatch (this file)                  │
//!     │  ┌──────────────┐   ┌──────────────┐   ┌────────────────┐  │
//!     │  │ poll session │   │ web server   │   │ ctrl-c watcher │  │
//!     │  │ (10s cycle)  │   │ (port 3000)  │   │                │  │
//!     │  └──────┬───────┘   └──────┬───────┘   └────────────────┘  │
//!     │         │ render           │ read                          │
//!     │         └────────► DashboardSink ◄─────┘                   │
//!     └─────────┼──────────────────────────────────────────────────┘
//!               │ GET {base_url}{pot_id}, one task per pot
//!               ▼
//!        telemetry service
//!
//! ==============================================================================

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use potwatch::config::DashboardConfig;
use potwatch::identity::{self, IdentityClient};
use potwatch::monitor::Monitor;
use potwatch::server::{self, DashboardSink};
use potwatch::sink::{CompositeSink, LogSink};
use potwatch::{DeviceId, HttpFetcher, PollScheduler};

#[derive(Parser, Debug)]
#[command(name = "potwatch", about = "Live plant-pot telemetry dashboard")]
struct Args {
    /// config file (defaults to config/dashboard.toml or ../config/dashboard.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// chat id to log in with
    #[arg(short, long, env = "POTWATCH_USER")]
    user: Option<String>,

    /// monitor these pot ids directly, skipping the login lookup
    #[arg(short, long = "device")]
    devices: Vec<String>,

    /// run a single refresh cycle and exit
    #[arg(long)]
    once: bool,

    /// do not serve the web dashboard
    #[arg(long)]
    no_server: bool,

    /// log filter used when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // step 1: load configuration
    let config = match &args.config {
        Some(path) => DashboardConfig::load(path)?,
        None => DashboardConfig::load_or_default(),
    };
    config.validate()?;
    config.log_summary();

    // step 2: log in
    let devices = resolve_devices(&args, &config).await?;
    tracing::info!(pots = devices.len(), "monitoring {} pot(s)", devices.len());

    // step 3: fetcher, sinks, scheduler
    let fetcher = HttpFetcher::from_config(&config.telemetry, &config.metrics.tracked)?;
    let dashboard = DashboardSink::new();
    let sink = CompositeSink::new()
        .with(Arc::new(LogSink::new(config.logging.show_readings)))
        .with(Arc::new(dashboard.clone()));
    let scheduler = Arc::new(PollScheduler::new(
        Arc::new(fetcher),
        Arc::new(sink),
        config.telemetry.timeout(),
    ));

    if args.once {
        let session = scheduler.start(devices).await?;
        let tracked = session.tracked();
        session.stop();
        let failed = tracked.outcomes.values().filter(|o| o.failure_kind().is_some()).count();
        tracing::info!(pots = tracked.len(), failed, "single refresh finished");
        return Ok(());
    }

    // step 4: monitoring + dashboard
    let monitor = Monitor::new(scheduler, devices, config.polling.interval());
    if config.polling.autostart {
        monitor.start().await?;
    } else {
        tracing::info!("monitoring idle, start it from the dashboard");
    }

    if !args.no_server {
        let bind = config.server.bind.clone();
        let metrics = config.metrics.tracked.clone();
        let web_monitor = monitor.clone();
        tokio::spawn(async move {
            if let Err(e) = server::run_server(&bind, dashboard, web_monitor, metrics).await {
                tracing::error!(error = %format!("{e:#}"), "web server error");
            }
        });
    }

    // step 5: run until ctrl-c
    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    tracing::info!("shutting down");
    monitor.stop().await;
    Ok(())
}

async fn resolve_devices(args: &Args, config: &DashboardConfig) -> Result<Vec<DeviceId>> {
    if !args.devices.is_empty() {
        let devices = identity::explicit_ids(&args.devices);
        if devices.is_empty() {
            bail!("--device ids must not be blank");
        }
        return Ok(devices);
    }

    let Some(user) = &args.user else {
        bail!("no pots to monitor: pass --user <chat id> or --device <pot id>");
    };

    let identity = IdentityClient::from_config(&config.identity)?;
    let devices = identity
        .resolve(user)
        .await
        .with_context(|| format!("login failed for chat id {user}"))?;
    Ok(devices)
}
