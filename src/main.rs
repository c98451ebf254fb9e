use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use turnstile::clock::{SharedClock, SystemClock};
use turnstile::config::{GateMode, LoggingConfig, TurnstileConfig};
use turnstile::gate::{AdmissionGate, ResponseMessage};
use turnstile::metrics::MetricsSink;

/// Decide admission for peer addresses read from stdin, one per line.
#[derive(Debug, Parser)]
#[command(name = "turnstile", version, about)]
struct Args {
    /// YAML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the configured gate mode
    #[arg(long, value_enum)]
    mode: Option<GateMode>,

    /// Override the configured log filter
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let mut config = TurnstileConfig::load(args.config.as_deref())?;
    if let Some(mode) = args.mode {
        config.mode = mode;
    }
    if let Some(level) = args.log_level {
        config.logging.level = level;
    }

    init_tracing(&config.logging);

    info!("Starting Turnstile admission gate");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    info!(mode = ?config.mode, limiter = %config.limiter.kind(), "Configuration loaded");

    let metrics = Arc::new(MetricsSink::new());
    let clock: SharedClock = Arc::new(SystemClock);
    let gate = AdmissionGate::from_config(&config, clock, metrics)?;

    let sweeper = match gate.registry() {
        Some(registry) => {
            Some(registry.clone().spawn_sweeper(config.registry.sweep_interval())?)
        }
        None => None,
    };

    tokio::select! {
        result = process_requests(&gate) => result?,
        _ = shutdown_signal() => {}
    }

    if let Some(sweeper) = sweeper {
        sweeper.abort();
    }

    print!("{}", gate.metrics());
    info!("Turnstile admission gate stopped");
    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&logging.level));

    // Decisions go to stdout, so logs stay on stderr.
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_writer(std::io::stderr);

    if logging.json {
        builder.json().init();
    } else {
        builder.init();
    }
}

/// Answer each stdin line with `<status> <json body>` until EOF.
async fn process_requests(gate: &AdmissionGate) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        let peer = line.trim();
        if peer.is_empty() {
            continue;
        }

        let (status, message) = match gate.decide_peer(peer) {
            Ok(decision) => (decision.status_code(), decision.message()),
            Err(err) if err.is_identity() => {
                (err.status_code(), ResponseMessage::server_error(&err))
            }
            Err(err) => return Err(err.into()),
        };

        let body = serde_json::to_string(&message)?;
        stdout.write_all(format!("{} {}\n", status, body).as_bytes()).await?;
    }

    stdout.flush().await?;
    Ok(())
}

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        }
        _ = terminate => {
            info!("Received SIGTERM, shutting down");
        }
    }
}
