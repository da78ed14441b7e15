//! dat-seeder - pushes DataLayer `.dat` files to an object store.
//!
//! # Commands
//!
//! - `dat-seeder run`: Watch the directory and push new files
//! - `dat-seeder status`: Show what has been pushed and what is pending
//!
//! # Environment Variables
//!
//! See the [`config`](dat_seeder::config) module for available configuration options.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use dat_seeder::config::{self, Config};
use dat_seeder::filter::{self, Eligibility};
use dat_seeder::ledger::Ledger;
use dat_seeder::monitor::{Monitor, MonitorConfig};
use dat_seeder::watcher::scan_directory;

/// dat-seeder - pushes DataLayer `.dat` files to an object store.
#[derive(Parser, Debug)]
#[command(name = "dat-seeder")]
#[command(author, version, about, long_about = None)]
#[command(after_help = "\
ENVIRONMENT VARIABLES:
    SEEDER_SERVER_URL            Control-server upload endpoint (required for 'run')
    SEEDER_WATCH_DIR             Directory to watch (default: Chia DataLayer file store)
    SEEDER_THROTTLE_MS           Delay between uploads (default: 1000)
    SEEDER_CREDENTIAL_POLL_SECS  Credential check interval (default: 30)
    SEEDER_REQUEST_TIMEOUT_SECS  Per-request HTTP timeout (default: none)
    SEEDER_USERNAME              Basic-auth username
    SEEDER_PASSWORD              Basic-auth password

EXAMPLES:
    # Start pushing files
    export SEEDER_SERVER_URL=https://seed.example.com/upload
    export SEEDER_USERNAME=alice SEEDER_PASSWORD=secret
    dat-seeder run

    # See what is left to push
    dat-seeder status --dir /data/server_files
")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

/// CLI subcommands.
#[derive(Subcommand, Debug)]
enum Command {
    /// Watch the directory and push new .dat files.
    ///
    /// Requires SEEDER_SERVER_URL. Without SEEDER_USERNAME/SEEDER_PASSWORD
    /// the monitor waits for credentials before doing anything.
    Run,

    /// Show the pushed-files ledger and the files still waiting to be pushed.
    Status {
        /// Directory to inspect (default: SEEDER_WATCH_DIR, then the Chia
        /// DataLayer file store).
        #[arg(short, long)]
        dir: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Status { dir } => run_status(dir),
        Command::Run => {
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .enable_all()
                .build()
                .context("Failed to create tokio runtime")?;

            runtime.block_on(run_seeder())
        }
    }
}

/// Prints the ledger size and the eligible files not yet pushed.
fn run_status(dir: Option<PathBuf>) -> Result<()> {
    let dir = match dir {
        Some(dir) => dir,
        None => config::watch_dir_from_env().context("Failed to resolve watch directory")?,
    };

    let ledger = Ledger::load(&dir);
    let paths = scan_directory(&dir)
        .with_context(|| format!("Failed to read directory {}", dir.display()))?;

    let pending: Vec<String> = paths
        .iter()
        .filter_map(|path| match filter::check(path, &ledger) {
            Eligibility::Eligible { filename, .. } => Some(filename),
            Eligibility::Skip(_) => None,
        })
        .collect();

    println!("Directory: {}", dir.display());
    println!("Ledger:    {}", ledger.path().display());
    println!("Pushed:    {}", ledger.len());
    println!("Pending:   {}", pending.len());
    for filename in pending {
        println!("  {filename}");
    }

    Ok(())
}

/// Runs the seeder until a shutdown signal arrives.
async fn run_seeder() -> Result<()> {
    init_logging();

    info!("Starting dat-seeder");

    let config = Config::from_env().context("Failed to load configuration")?;

    info!(
        server_url = %config.server_url,
        watch_dir = %config.watch_dir.display(),
        throttle_ms = config.throttle.as_millis(),
        "Configuration loaded"
    );

    if !config.watch_dir.exists() {
        info!(watch_dir = %config.watch_dir.display(), "Creating watch directory");
        std::fs::create_dir_all(&config.watch_dir).context("Failed to create watch directory")?;
    }

    let monitor = Monitor::new(MonitorConfig::from(&config)).context("Failed to create monitor")?;

    let mut lengths = monitor.subscribe_queue_length();
    tokio::spawn(async move {
        loop {
            match lengths.recv().await {
                Ok(len) => info!(pending = len, "Queue length changed"),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Queue length updates lagged");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    match config.credentials.clone() {
        Some(credentials) => monitor.set_credentials(credentials),
        None => monitor.start(),
    }

    info!("Seeder running. Press Ctrl+C to stop.");
    wait_for_shutdown().await;

    info!(
        pending = monitor.queue_len(),
        pushed = monitor.pushed_count().await,
        "Shutting down"
    );

    Ok(())
}

/// Initializes the logging subsystem.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_level(true)
        .init();
}

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn wait_for_shutdown() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
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
}
