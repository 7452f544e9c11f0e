//! CLI argument definitions for logharvest-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

use logharvest_core::config::HarvestConfig;

/// logharvest log-to-metric daemon.
///
/// Receives shipper messages, extracts metrics with the configured rules
/// and flushes aggregated values to the downstream sink.
#[derive(Parser, Debug)]
#[command(name = "logharvest-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to logharvest.toml configuration file.
    #[arg(short, long, default_value = "/etc/logharvest/logharvest.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Validate configuration and rule files, then exit without starting the daemon.
    #[arg(long)]
    pub validate: bool,
}

impl DaemonCli {
    /// Apply command-line overrides on top of the loaded configuration.
    pub fn apply_overrides(&self, config: &mut HarvestConfig) {
        if let Some(level) = &self.log_level {
            config.general.log_level.clone_from(level);
        }
        if let Some(format) = &self.log_format {
            config.general.log_format.clone_from(format);
        }
    }
}
