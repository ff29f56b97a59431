//! CLI argument parsing.
//!
//! Every hub setting can also be given through the `WISER_*` environment
//! variables, which is how the exporter is usually deployed.

use std::path::PathBuf;

use clap::Parser;
use clap::builder::BoolishValueParser;

use crate::config::ConfigOverrides;

/// Prometheus exporter for Drayton Wiser heating hubs.
#[derive(Parser, Debug, Clone)]
#[command(name = "wiser-exporter-prometheus")]
#[command(about = "Export Wiser heating hub state as Prometheus metrics")]
#[command(version)]
pub struct ExporterArgs {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Hub address.
    #[arg(long, env = "WISER_HUBHOST")]
    pub hub_host: Option<String>,

    /// Hub secret.
    #[arg(long, env = "WISER_HUBSECRET", hide_env_values = true)]
    pub hub_secret: Option<String>,

    /// Log hub identity and per-room values at debug level.
    #[arg(long, env = "WISER_DEBUG", value_parser = BoolishValueParser::new())]
    pub debug: bool,

    /// Seconds to wait between collection cycles.
    #[arg(long, env = "WISER_DELAY")]
    pub delay: Option<u64>,

    /// HTTP listen address (overrides config).
    #[arg(long, env = "WISER_LISTEN")]
    pub listen: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long)]
    pub log_level: Option<String>,
}

impl ExporterArgs {
    /// Settings that override the configuration file.
    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            hub_host: self.hub_host.clone(),
            hub_secret: self.hub_secret.clone(),
            debug: self.debug,
            delay_secs: self.delay,
            listen: self.listen.clone(),
            log_level: self.log_level.clone(),
        }
    }
}
