//! cpuscaled: the cpuscale daemon.
//!
//! Reads the status of one application from a control endpoint, decides a
//! replica count from its CPU utilization, and writes the count back.
//!
//! # Usage
//!
//! ```text
//! cpuscaled --config /etc/cpuscale/config.json --log-level info
//! ```

mod daemon;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use cpuscale_core::{LogLevel, Settings};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "cpuscaled", about = "CPU-driven replica autoscaler")]
struct Cli {
    /// Settings file (JSON, or TOML with a `.toml` extension). Built-in
    /// defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Overrides LOG_LEVEL from the settings file.
    #[arg(long)]
    log_level: Option<LogLevel>,
}

impl Cli {
    fn settings(&self) -> anyhow::Result<Settings> {
        let mut settings = match &self.config {
            Some(path) => Settings::from_file(path)
                .with_context(|| format!("failed to load settings from {}", path.display()))?,
            None => Settings::default(),
        };
        if let Some(level) = self.log_level {
            settings.log_level = level;
        }
        Ok(settings)
    }
}

/// `RUST_LOG` wins when set; otherwise the configured level.
fn env_filter(settings: &Settings) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(settings.log_directive()))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = cli.settings()?;

    tracing_subscriber::fmt()
        .with_env_filter(env_filter(&settings))
        .init();

    daemon::run(settings, daemon::shutdown_signal()).await
}
