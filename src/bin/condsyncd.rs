//! condsync daemon - condition synchronization server
//!
//! Clients coordinate through named integer conditions grouped into
//! solutions: one client sets a value, others wait for it.
//!
//! # Usage
//!
//! ```bash
//! # Start in the foreground on the default port (9999)
//! condsyncd
//!
//! # Start in the background, logs under $XDG_STATE_HOME/condsync/
//! condsyncd -d
//!
//! # Listen on loopback only, another port
//! condsyncd --bind 127.0.0.1 --port 7000
//!
//! # Read settings from a file
//! CONDSYNC_CONFIG=/etc/condsyncd.toml condsyncd
//!
//! # Enable debug logging
//! RUST_LOG=condsyncd=debug condsyncd
//! ```
//!
//! # Signal Handling
//!
//! - SIGTERM/SIGINT: stop accepting connections and exit

use std::fs::{self, File};
use std::net::IpAddr;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use condsyncd::config::ServerConfig;
use condsyncd::monitor::spawn_monitor_task;
use condsyncd::registry::SolutionRegistry;
use condsyncd::server::SyncServer;

/// condsync daemon - condition synchronization server
#[derive(Parser, Debug)]
#[command(name = "condsyncd", version, about)]
struct Args {
    /// TOML configuration file (overrides CONDSYNC_CONFIG)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Address to listen on (overrides file and CONDSYNC_BIND)
    #[arg(short, long, value_name = "ADDR")]
    bind: Option<IpAddr>,

    /// Port to listen on (overrides file and CONDSYNC_PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// Run as a background daemon (fork to background)
    #[arg(short = 'd', long)]
    daemon: bool,
}

/// Returns the path to the log file used when daemonized.
fn log_file_path() -> PathBuf {
    let state_dir = dirs::state_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join("condsync");
    state_dir.join("condsyncd.log")
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Resolve before forking so configuration errors reach the terminal.
    let config = ServerConfig::resolve(args.config, args.bind, args.port)
        .context("Failed to load configuration")?;

    if args.daemon {
        // Daemonize before starting tokio runtime
        daemonize()?;
    }

    run_daemon(config)
}

/// Daemonizes the current process.
fn daemonize() -> Result<()> {
    use daemonize::Daemonize;

    let log_path = log_file_path();

    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent).context("Failed to create log directory")?;
    }

    let stdout = File::create(&log_path).context("Failed to create log file for stdout")?;
    let stderr = stdout
        .try_clone()
        .context("Failed to create log file for stderr")?;

    Daemonize::new()
        .working_directory("/")
        .stdout(stdout)
        .stderr(stderr)
        .start()
        .context("Failed to daemonize")?;

    Ok(())
}

/// Filter used when `RUST_LOG` is unset, empty or unparsable.
const DEFAULT_LOG_FILTER: &str = "condsyncd=info,condsync_core=info,condsync_protocol=info";

/// Builds the log filter. `RUST_LOG` replaces the defaults entirely.
fn log_filter(rust_log: Option<&str>) -> EnvFilter {
    rust_log
        .filter(|directives| !directives.trim().is_empty())
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Runs the daemon (async entry point).
#[tokio::main]
async fn run_daemon(config: ServerConfig) -> Result<()> {
    let rust_log = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(rust_log.as_deref()))
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pid = process::id(),
        addr = %config.socket_addr(),
        "condsync daemon starting"
    );

    let cancel_token = CancellationToken::new();

    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        if let Err(e) = wait_for_shutdown_signal().await {
            error!(error = %e, "Error waiting for shutdown signal");
        }
        info!("Shutdown signal received");
        shutdown_token.cancel();
    });

    let registry = Arc::new(SolutionRegistry::new());

    let server = match SyncServer::bind(&config, Arc::clone(&registry), cancel_token.clone()).await
    {
        Ok(server) => server,
        Err(e) => {
            error!(error = %e, "Failed to start server");
            return Err(e).context("Failed to start server");
        }
    };

    let _monitor_handle = spawn_monitor_task(registry, cancel_token);
    info!("Process monitor started");

    server.run().await;

    info!("condsync daemon stopped");
    Ok(())
}

/// Waits for a shutdown signal (SIGTERM or SIGINT).
async fn wait_for_shutdown_signal() -> Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        tokio::select! {
            _ = sigterm.recv() => {
                info!("Received SIGTERM");
            }
            _ = sigint.recv() => {
                info!("Received SIGINT");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C");
    }

    Ok(())
}
