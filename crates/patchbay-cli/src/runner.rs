//! Engine setup and the main run loop

use anyhow::{Context, Result};
use colored::Colorize;
use patchbay_config::{ConfigLoader, Override};
use patchbay_core::Engine;
use serde_json::json;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info};

/// Create an engine with every built-in backend and load `config` into it.
///
/// On failure the backends that were already set up are shut down.
fn prepare(config: &Path, overrides: Vec<Override>) -> Result<Engine> {
    let mut engine = Engine::new();
    let registered =
        patchbay_backends::register_builtin(&mut engine).context("Failed to register backends")?;
    info!("{} backends available", registered);

    let loaded = ConfigLoader::new(&mut engine)
        .with_overrides(overrides)
        .load(config);

    if let Err(e) = loaded {
        engine.shutdown();
        return Err(e)
            .with_context(|| format!("Failed to load configuration {}", config.display()));
    }

    Ok(engine)
}

/// Load the configuration and print a JSON summary of the routing setup
pub fn check(config: &Path, overrides: Vec<Override>) -> Result<()> {
    let mut engine = prepare(config, overrides)?;

    let core = engine.core();
    let summary = json!({
        "config": config.display().to_string(),
        "backends": core.registry().backend_count(),
        "instances": core.registry().total_instances(),
        "channels": core.channels().len(),
        "routing": core.routing().stats(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);

    engine.shutdown();
    Ok(())
}

/// Start all backends and route events until Ctrl+C
pub async fn run(config: &Path, overrides: Vec<Override>) -> Result<()> {
    let mut engine = prepare(config, overrides)?;

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        flag.store(true, Ordering::SeqCst);
    })
    .context("Failed to install Ctrl+C handler")?;

    if let Err(e) = engine.start() {
        engine.shutdown();
        return Err(e).context("Failed to start backends");
    }

    let stats = engine.core().routing().stats();
    println!(
        "{} Routing {} channels across {} instances ({} mappings)",
        "patchbay".cyan().bold(),
        engine.core().channels().len(),
        engine.core().registry().total_instances(),
        stats.edges
    );
    println!("  Press Ctrl+C to stop");

    let result = engine.run(&shutdown).await;
    if let Err(e) = &result {
        error!("Reactor stopped: {}", e);
    }

    engine.shutdown();
    println!("{}", "Stopped".yellow());

    result.context("Event routing failed")
}
