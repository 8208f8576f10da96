use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use newrelic_exporter::newrelic::{self, DEFAULT_BASE_URL};
use newrelic_exporter::{server, CancellationToken, Client, Config, ConfigError, Exporter};
use thiserror::Error;
use tokio::runtime::Builder;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Exposes New Relic APM metrics for Prometheus.
#[derive(Debug, Parser)]
#[command(version)]
struct Cli {
    /// Address to listen on for web interface and telemetry.
    #[arg(long = "web.listen-address", env = "LISTEN_ADDRESS", default_value = "0.0.0.0:9112")]
    listen_address: SocketAddr,
    /// Path under which to expose metrics.
    #[arg(long = "web.telemetry-path", env = "TELEMETRY_PATH", default_value = "/metrics")]
    telemetry_path: String,
    /// New Relic API key.
    #[arg(long = "newrelic.api-key", env = "NEWRELIC_API_KEY", hide_env_values = true)]
    api_key: String,
    /// New Relic API base URL.
    #[arg(long = "newrelic.base-url", env = "NEWRELIC_BASE_URL", default_value = DEFAULT_BASE_URL)]
    base_url: String,
    /// Configuration file path.
    #[arg(long = "config", env = "CONFIG_FILEPATH", default_value = "config.yml")]
    config: PathBuf,
}

#[derive(Debug, Error)]
enum Error {
    #[error("You must provide your New Relic API key")]
    MissingApiKey,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("Build client; err={0}")]
    Client(#[from] newrelic::Error),
    #[error("Build runtime; err={0}")]
    Runtime(#[from] std::io::Error),
    #[error(transparent)]
    Server(#[from] server::Error),
}

fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    info!(version = env!("CARGO_PKG_VERSION"), "Starting newrelic_exporter");

    if let Err(err) = run(cli) {
        error!(%err, "Exiting");

        return Err(err);
    }

    Ok(())
}

fn run(cli: Cli) -> Result<(), Error> {
    if cli.api_key.trim().is_empty() {
        return Err(Error::MissingApiKey);
    }

    let config = Config::load(&cli.config)?;
    let client = Client::new(&cli.base_url, &cli.api_key, config.timeout())?;
    let exporter = Arc::new(Exporter::new(client, config));

    let runtime = Builder::new_multi_thread().enable_all().build()?;
    runtime.block_on(async {
        let cxl = CancellationToken::new();
        tokio::spawn({
            let cxl = cxl.clone();

            async move {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => cxl.cancel(),
                    Err(err) => error!(%err, "Failed to listen for shutdown signal"),
                }
            }
        });

        server::run(cli.listen_address, cli.telemetry_path, exporter, cxl).await?;
        info!("Shut down");

        Ok(())
    })
}
