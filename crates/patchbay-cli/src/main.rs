//! patchbay - route control events between protocol backends
//!
//! Loads a configuration file, starts every configured backend and runs the
//! event reactor until interrupted.

use anyhow::{Context, Result};
use clap::Parser;
use patchbay_config::Override;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod runner;

/// patchbay - protocol-agnostic control event router
#[derive(Parser)]
#[command(name = "patchbay")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(env = "PATCHBAY_CONFIG", default_value = "patchbay.cfg")]
    config: PathBuf,

    /// Backend option override (backend.option=value)
    #[arg(short = 'b', long = "backend-override", value_name = "BACKEND.OPTION=VALUE")]
    backend_overrides: Vec<String>,

    /// Instance option override (instance.option=value)
    #[arg(short = 'i', long = "instance-override", value_name = "INSTANCE.OPTION=VALUE")]
    instance_overrides: Vec<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,

    /// Load the configuration, print routing statistics and exit
    #[arg(long)]
    check: bool,
}

impl Cli {
    fn overrides(&self) -> Result<Vec<Override>> {
        let backend = self.backend_overrides.iter().map(|text| {
            Override::backend(text).with_context(|| format!("Invalid backend override {}", text))
        });
        let instance = self.instance_overrides.iter().map(|text| {
            Override::instance(text).with_context(|| format!("Invalid instance override {}", text))
        });
        backend.chain(instance).collect()
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(&cli.log_level, cli.json_logs)?;

    let overrides = cli.overrides()?;
    if cli.check {
        runner::check(&cli.config, overrides)
    } else {
        runner::run(&cli.config, overrides).await
    }
}

fn setup_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("Failed to parse log level")?;

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr)
                    .compact(),
            )
            .init();
    }

    Ok(())
}
