pub mod batch;
pub mod config;
pub mod exporter;
pub mod metric;
pub mod newrelic;
mod recorder;
mod retry;
pub mod server;

pub use config::{Config, ConfigError};
pub use exporter::Exporter;
pub use newrelic::Client;
pub use tokio_util::sync::CancellationToken;
