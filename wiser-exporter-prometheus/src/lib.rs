//! Prometheus exporter for Drayton Wiser heating hubs.
//!
//! This crate polls a Wiser hub on a fixed delay and exposes the heating,
//! hot water and per-room state via an HTTP `/metrics` endpoint.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐     ┌─────────────────┐
//! │    Wiser Hub    │────>│    Collection   │────>│   Instruments   │────>│   HTTP Server   │
//! │   (/data/...)   │     │      Cycle      │     │  (commit lock)  │     │   (/metrics)    │
//! └─────────────────┘     └─────────────────┘     └─────────────────┘     └─────────────────┘
//! ```
//!
//! Each cycle reads everything from the hub into a [`snapshot::HubSnapshot`]
//! first and only then commits it, so a scrape sees either the previous
//! cycle or the new one in full.
//!
//! # Usage
//!
//! ```bash
//! WISER_HUBHOST=192.168.1.10 WISER_HUBSECRET=... wiser-exporter-prometheus
//! ```
//!
//! # Configuration
//!
//! See [`config::ExporterConfig`] and [`args::ExporterArgs`].

pub mod args;
pub mod config;
pub mod cycle;
pub mod http;
pub mod instruments;
pub mod snapshot;

pub use args::ExporterArgs;
pub use config::{ConfigError, ExporterConfig};
pub use cycle::{CollectionCycle, CycleError, CycleSummary, Poller};
pub use http::HttpServer;
pub use instruments::{InstrumentRegistry, MetricsExposition, SharedExposition};

use config::{LogFormat, LoggingConfig};

/// Initialize tracing with the given configuration.
///
/// `RUST_LOG` takes precedence over the configured level.
pub fn init_tracing(config: &LoggingConfig) -> anyhow::Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.effective_level()));

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .try_init()
                .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))?;
        }
    }

    Ok(())
}
