//! waypostd - The waypost background service
//!
//! This is the main entry point for the waypostd service.
//! It wires together all the components:
//! - Configuration loading
//! - Store initialization
//! - Live hub server (Unix socket, optional TCP)
//! - Live feed of new samples
//! - Periodic batch stop scanning

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use waypost_config::{load_config_or_default, Settings};
use waypost_core::BatchScanner;
use waypost_hub::{Hub, HubServer};
use waypost_store::{SqliteStore, Store};
use waypost_util::{default_config_path, parse_timestamp, DriverId};
use waypostd::LiveFeed;

/// waypostd - Stop scanning and live fleet location distribution
#[derive(Parser, Debug)]
#[command(name = "waypostd")]
#[command(about = "Stop scanning and live fleet location distribution", long_about = None)]
struct Args {
    /// Configuration file path (default: ~/.config/waypost/config.toml)
    #[arg(short, long, env = "WAYPOST_CONFIG", default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Socket path override (or set WAYPOST_SOCKET env var)
    #[arg(short, long, env = "WAYPOST_SOCKET")]
    socket: Option<PathBuf>,

    /// Data directory override (or set WAYPOST_DATA_DIR env var)
    #[arg(short, long, env = "WAYPOST_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one stop scan and exit
    Scan {
        /// Window start, RFC 3339 (default: the configured lookback before --until)
        #[arg(long, value_parser = parse_time_arg)]
        since: Option<DateTime<Utc>>,

        /// Window end, RFC 3339 (default: now)
        #[arg(long, value_parser = parse_time_arg)]
        until: Option<DateTime<Utc>>,

        /// Scan only this driver
        #[arg(long)]
        driver: Option<String>,
    },
}

fn parse_time_arg(s: &str) -> std::result::Result<DateTime<Utc>, String> {
    parse_timestamp(s).ok_or_else(|| format!("'{s}' is not an RFC 3339 timestamp"))
}

fn load_settings(args: &Args) -> Result<Settings> {
    let mut settings = load_config_or_default(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    if let Some(socket) = &args.socket {
        settings.service.socket_path = socket.clone();
    }
    if let Some(data_dir) = &args.data_dir {
        settings.service.data_dir = data_dir.clone();
    }

    info!(
        config_path = %args.config.display(),
        data_dir = %settings.service.data_dir.display(),
        "Configuration loaded"
    );
    Ok(settings)
}

fn open_store(settings: &Settings) -> Result<Arc<dyn Store>> {
    let data_dir = &settings.service.data_dir;
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("Failed to create data directory {:?}", data_dir))?;

    let db_path = data_dir.join("waypost.db");
    let store: Arc<dyn Store> = Arc::new(
        SqliteStore::open(&db_path)
            .with_context(|| format!("Failed to open database {:?}", db_path))?,
    );

    info!(db_path = %db_path.display(), "Store initialized");
    Ok(store)
}

fn build_scanner(settings: &Settings, store: Arc<dyn Store>) -> BatchScanner {
    BatchScanner::new(
        store,
        settings.detector,
        settings.dedup,
        settings.scanner.workers,
    )
}

/// Main service state
struct Service {
    settings: Settings,
    store: Arc<dyn Store>,
    hub: Hub,
    server: Arc<HubServer>,
    scanner: BatchScanner,
}

impl Service {
    async fn new(settings: Settings) -> Result<Self> {
        let store = open_store(&settings)?;

        let hub = Hub::spawn(settings.hub);
        let mut server = HubServer::new(hub.clone(), &settings.service.socket_path)
            .with_tcp(settings.service.tcp_listen);
        server
            .start()
            .await
            .context("Failed to start live hub server")?;

        let scanner = build_scanner(&settings, store.clone());

        Ok(Self {
            settings,
            store,
            hub,
            server: Arc::new(server),
            scanner,
        })
    }

    async fn run(self) -> Result<()> {
        let mut feed = LiveFeed::new(self.store.clone(), self.hub.clone(), self.settings.detector)
            .context("Failed to start live feed")?;

        // Spawn hub accept task
        let server = self.server.clone();
        tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!(error = %e, "Hub server error");
            }
        });

        // Set up signal handlers
        let mut sigterm = signal(SignalKind::terminate())
            .context("Failed to create SIGTERM handler")?;
        let mut sigint = signal(SignalKind::interrupt())
            .context("Failed to create SIGINT handler")?;
        let mut sighup = signal(SignalKind::hangup())
            .context("Failed to create SIGHUP handler")?;

        let mut feed_timer = tokio::time::interval(self.settings.hub.feed_interval);
        let mut scan_timer = self
            .settings
            .scanner
            .interval
            .map(|every| tokio::time::interval_at(Instant::now() + every, every));
        let mut scan_task: Option<JoinHandle<()>> = None;

        info!("Service running");

        loop {
            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down gracefully");
                    break;
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, shutting down gracefully");
                    break;
                }
                _ = sighup.recv() => {
                    info!("Received SIGHUP, shutting down gracefully");
                    break;
                }

                // Publish samples appended since the last tick
                _ = feed_timer.tick() => {
                    if let Err(e) = feed.tick() {
                        warn!(error = %e, "Live feed tick failed");
                    }
                }

                // Periodic stop scan over the lookback window
                _ = next_scan(&mut scan_timer) => {
                    if scan_task.as_ref().is_some_and(|task| !task.is_finished()) {
                        warn!("Previous stop scan still running, skipping this one");
                        continue;
                    }

                    let scanner = self.scanner.clone();
                    let end = waypost_util::now();
                    let start = end - self.settings.scanner.lookback;
                    scan_task = Some(tokio::spawn(async move {
                        if let Err(e) = scanner.detect_for_all(start, end).await {
                            warn!(error = %e, "Stop scan failed");
                        }
                    }));
                }
            }
        }

        info!("Shutting down waypostd");

        self.hub.shutdown();
        if let Some(task) = scan_task
            && !task.is_finished()
        {
            info!("Waiting for the running stop scan to finish");
            let _ = task.await;
        }
        self.server.shutdown();

        info!("Shutdown complete");
        Ok(())
    }
}

async fn next_scan(timer: &mut Option<Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn run_scan(
    settings: &Settings,
    since: Option<DateTime<Utc>>,
    until: Option<DateTime<Utc>>,
    driver: Option<String>,
) -> Result<()> {
    let store = open_store(settings)?;
    let scanner = build_scanner(settings, store);

    let end = until.unwrap_or_else(waypost_util::now);
    let start = since.unwrap_or(end - settings.scanner.lookback);

    let inserted = match driver {
        Some(driver) => {
            let driver = DriverId::new(driver);
            let stops = scanner
                .detect_for_driver(&driver, start, end)
                .with_context(|| format!("Stop scan failed for driver {driver}"))?;
            stops.len()
        }
        None => scanner
            .detect_for_all(start, end)
            .await
            .context("Stop scan failed")?,
    };

    info!(%start, %end, inserted, "Manual stop scan complete");
    println!("{inserted}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&args.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "waypostd starting"
    );

    let settings = load_settings(&args)?;

    match args.command {
        Some(Commands::Scan {
            since,
            until,
            driver,
        }) => run_scan(&settings, since, until, driver).await,
        None => {
            let service = Service::new(settings).await?;
            service.run().await
        }
    }
}
