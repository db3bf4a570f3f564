//! Drive gatekeeper server.
//!
//! ```text
//!   request ──▶ maintenance gate ──▶ session ──▶ rate limit ──▶ root binding
//!                                                                   │
//!   response ◀── file operation ◀── AUTHORIZED ◀── path sandbox ◀───┘
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use drive_gatekeeper::config::{load_config, watcher::ConfigWatcher};
use drive_gatekeeper::lifecycle::{wait_for_signal, Shutdown};
use drive_gatekeeper::net::load_tls_config;
use drive_gatekeeper::observability::{logging, metrics};
use drive_gatekeeper::HttpServer;

#[derive(Parser)]
#[command(name = "drive-gatekeeper")]
#[command(about = "Gatekeeper for a per-user file drive", long_about = None)]
struct Args {
    /// TOML configuration file. Defaults plus environment overrides without it.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let config = load_config(args.config.as_deref())?;
    logging::init_logging(&config.observability.log_level);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "drive-gatekeeper starting");
    tracing::info!(
        bind_address = %config.listener.bind_address,
        storage = %config.storage.base_dir.display(),
        rps = config.rate_limit.requests_per_second,
        burst = config.rate_limit.burst_size,
        request_timeout_secs = config.timeouts.request_secs,
        maintenance = config.maintenance.enabled,
        "Configuration loaded"
    );
    if config.session.signing_key.is_empty() {
        tracing::warn!("No session signing key configured; every drive request will fail with 500");
    }

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(e) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                error = %e,
                "Failed to parse metrics address"
            ),
        }
    }

    // Hot reload only applies when a file was given.
    let (config_updates, _watcher) = match &args.config {
        Some(path) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            match watcher.run() {
                Ok(handle) => (updates, Some(handle)),
                Err(e) => {
                    tracing::error!(error = %e, "Config watcher failed to start, hot reload disabled");
                    (mpsc::unbounded_channel().1, None)
                }
            }
        }
        None => (mpsc::unbounded_channel().1, None),
    };

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();
    let tls = config.listener.tls.clone();
    let bind_address = config.listener.bind_address.clone();
    let server = HttpServer::new(config);

    let serve = async move {
        match tls {
            Some(tls) => {
                let addr: SocketAddr = bind_address.parse().map_err(|e| {
                    std::io::Error::new(std::io::ErrorKind::InvalidInput, e)
                })?;
                let rustls = load_tls_config(&tls).await?;
                server.run_tls(addr, rustls, config_updates, server_shutdown).await
            }
            None => {
                let listener = TcpListener::bind(&bind_address).await?;
                server.run(listener, config_updates, server_shutdown).await
            }
        }
    };
    let mut server_task = tokio::spawn(serve);

    // The server may also stop on its own, e.g. when the bind fails.
    let finished = tokio::select! {
        _ = wait_for_signal() => None,
        result = &mut server_task => Some(result),
    };
    let result = match finished {
        Some(result) => result,
        None => {
            shutdown.trigger();
            server_task.await
        }
    };
    result??;
    tracing::info!("Shutdown complete");
    Ok(())
}
