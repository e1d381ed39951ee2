#![forbid(unsafe_code)]

//! `apt-transport-artifact-registry`: the `ar+https` apt method binary.
//!
//! Installed as `/usr/lib/apt/methods/ar+https`. stdin and stdout belong to
//! the apt method protocol, so diagnostics are written to stderr.

use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use apt_transport_artifact_registry::fetch::download::FileDownloader;
use apt_transport_artifact_registry::fetch::http::GcpConnector;
use apt_transport_artifact_registry::{AppError, AptMethod, Result};

/// How long runtime shutdown waits for the blocking stdin reader.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(250);

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "ar+https", about = "apt method for Google Artifact Registry", version, long_about = None)]
struct Cli {
    /// Log output format on stderr (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Log filter used when `RUST_LOG` is not set.
    #[arg(long, default_value = "warn")]
    log_filter: String,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format, &args.log_filter)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Startup(format!("failed to build tokio runtime: {err}")))?;
    let outcome = runtime.block_on(run());
    // stdin is read on a blocking thread that may still be parked in read(2).
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    outcome
}

async fn run() -> Result<()> {
    let connector = Arc::new(GcpConnector::new()?);
    let mut method = AptMethod::new(
        tokio::io::stdin(),
        tokio::io::stdout(),
        connector,
        Arc::new(FileDownloader),
    );

    let ct = CancellationToken::new();
    tokio::select! {
        outcome = method.run(ct.clone()) => {
            if let Err(err) = &outcome {
                error!(%err, "apt method terminated");
            }
            outcome
        }
        () = shutdown_signal() => {
            info!("shutdown signal received");
            ct.cancel();
            Ok(())
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat, default_filter: &str) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let subscriber = fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Startup(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Startup(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
