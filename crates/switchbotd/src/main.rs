use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use switchbotd::Config;
use switchbotd::Engine;
use switchbotd::config::LoggingConfig;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Expose SwitchBot bots as switch entities
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Path to the TOML configuration file
    #[arg(default_value = "switchbotd.toml")]
    config: PathBuf,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Load configuration
    let config = Config::from_file(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;

    if args.check {
        for warning in &config.warnings {
            eprintln!("warning: {}", warning);
        }
        println!(
            "{}: OK ({} switchbot entr{})",
            args.config.display(),
            config.switchbot.len(),
            if config.switchbot.len() == 1 { "y" } else { "ies" }
        );
        return Ok(());
    }

    init_tracing(&config.logging);

    tracing::info!("switchbotd starting");
    tracing::info!("Loaded config from: {}", args.config.display());
    for warning in &config.warnings {
        tracing::warn!("{}", warning);
    }

    let engine = Arc::new(Engine::new());
    let registered = engine.register_integrations_from_config(&config);
    if registered == 0 {
        tracing::warn!("No integrations configured; nothing to do");
    }

    let engine_task = {
        let engine = engine.clone();
        tokio::spawn(async move {
            if let Err(e) = engine.run().await {
                tracing::error!("Engine stopped with error: {}", e);
            }
        })
    };

    let (api_shutdown_tx, api_shutdown_rx) = tokio::sync::oneshot::channel();
    let api_task = config.api.clone().map(|api| {
        let engine = engine.clone();
        tokio::spawn(async move {
            if let Err(e) = switchbotd::api::serve(api.listen, api.port, engine, api_shutdown_rx).await
            {
                tracing::error!("HTTP API server failed: {}", e);
            }
        })
    });

    tracing::info!("Press Ctrl+C to exit");

    // Wait for Ctrl+C
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            tracing::info!("Received shutdown signal");
        }
        Err(e) => {
            tracing::error!("Failed to listen for shutdown signal: {}", e);
        }
    }

    if let Some(task) = api_task {
        let _ = api_shutdown_tx.send(());
        if let Err(e) = task.await {
            tracing::error!("HTTP API task failed: {}", e);
        }
    }

    tracing::info!("Stopping integrations...");
    engine.shutdown().await;
    engine_task.abort();

    tracing::info!("switchbotd shutdown complete");

    Ok(())
}

fn init_tracing(logging: &LoggingConfig) {
    let targets = logging
        .overrides
        .iter()
        .fold(
            Targets::new().with_default(LevelFilter::from(logging.level)),
            |targets, (target, level)| targets.with_target(target.clone(), LevelFilter::from(*level)),
        );

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(targets)
        .init();
}
