//! Build Status Server: listens for CI build events and lights the
//! indicator green when every tracked build passes, red otherwise.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::task::JoinSet;

use build_status_server::config::{Config, ConfigSource, EXAMPLE_CONFIG};
use build_status_server::routes::AppState;
use build_status_server::services::intake_service::EventIntake;
use build_status_server::services::notify_service::Notifier;
use build_status_server::services::pipeline::Pipeline;
use build_status_server::services::store_service::StatusStore;
use build_status_server::transport::http::HttpTransport;
use build_status_server::transport::udp::UdpTransport;
use build_status_server::transport::Transport;

#[derive(Parser)]
#[command(name = "build-status-server", version, about = "CI build status aggregator")]
struct Cli {
    /// Specify what configuration file to load
    #[arg(short, long, env = "BUILD_STATUS_CONFIG")]
    config: Option<PathBuf>,

    /// Be more informative about what's going on
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Loaded before tracing so the file's `verbose` picks the log level.
    let loaded = Config::load(cli.config.as_deref());
    let verbose = cli.verbose || loaded.as_ref().is_ok_and(|(c, _)| c.verbose);
    init_tracing(verbose);

    let (config, source) = match loaded {
        Ok(loaded) => loaded,
        Err(e) => {
            tracing::error!("{e}");
            return Err(e.into());
        }
    };
    report_source(&source);

    if let Some(addr) = config.metrics.address {
        build_status_server::metrics::init_metrics(addr);
    }

    let store = Arc::new(StatusStore::new(config.store_path()));
    tracing::info!(path = %store.path().display(), "Using status store");

    let intake = EventIntake::new(config.build_mask()?, store);
    let notifier = Notifier::new(config.tcp_client.clone());
    let pipeline = Arc::new(Pipeline::new(intake, notifier));

    // Bind everything before serving anything: a bind failure is fatal.
    let mut listeners = JoinSet::new();

    let udp = UdpTransport::new(config.udp_server.clone(), Arc::clone(&pipeline));
    let socket = match udp.setup().await {
        Ok(socket) => socket,
        Err(e) => {
            tracing::error!("{e}");
            return Err(e.into());
        }
    };

    let http = match &config.http_server {
        Some(listen) => {
            let http = HttpTransport::new(listen.clone(), AppState::new(Arc::clone(&pipeline)));
            match http.setup().await {
                Ok(listener) => Some((http, listener)),
                Err(e) => {
                    tracing::error!("{e}");
                    return Err(e.into());
                }
            }
        }
        None => None,
    };

    listeners.spawn(async move { udp.process(socket).await });
    if let Some((http, listener)) = http {
        listeners.spawn(async move { http.process(listener).await });
    }

    tokio::select! {
        _ = shutdown_signal() => {}
        Some(result) = listeners.join_next() => {
            if let Err(e) = result {
                tracing::error!("Listener task failed: {e}");
            }
        }
    }

    tracing::info!("Stopping listeners...");
    listeners.shutdown().await;
    tracing::info!("Shutdown complete");

    Ok(())
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "info,build_status_server=debug,tower_http=debug"
    } else {
        "info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "json" {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn report_source(source: &ConfigSource) {
    match source {
        ConfigSource::Explicit(path) | ConfigSource::Discovered(path) => {
            tracing::info!("Loaded configuration from {}", path.display());
        }
        ConfigSource::Defaults { searched } => {
            let locations = searched
                .iter()
                .map(|p| format!("    {}", p.display()))
                .collect::<Vec<_>>()
                .join("\n");
            tracing::warn!(
                "Looks like there isn't an available configuration file for this program.\n\
                 We're going to use some sensible defaults, but you're strongly recommended\n\
                 to create one in any of the following locations:\n\n{locations}\n\n\
                 Here is a sample of the contents for that file (and the settings we're\n\
                 going to use):\n\n{EXAMPLE_CONFIG}\n\
                 Also, you can specify what configuration file to load by passing --config."
            );
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received SIGINT, shutting down..."),
        _ = terminate => tracing::info!("Received SIGTERM, shutting down..."),
    }
}
