//! `run` command implementation.

use std::time::Duration;

use anyhow::{Context, Result};
use config_loader::{ConfigLoader, ConfigOverrides};
use contracts::{SinkMode, StreamerConfig};
use tracing::{info, warn};

use crate::cli::RunArgs;
use crate::error::CliError;
use crate::pipeline::{Pipeline, PipelineConfig};

/// Execute the `run` command
pub async fn run_pipeline(args: &RunArgs) -> Result<()> {
    let config = resolve_config(args)?;

    info!(
        mode = ?config.collection.mode,
        kind = config.producer.kind.as_str(),
        rate_hz = config.producer.rate_hz,
        queue_capacity = config.collection.queue_capacity,
        drop_policy = ?config.collection.drop_policy,
        "Configuration loaded"
    );

    // Dry run - just validate and exit
    if args.dry_run {
        info!("Dry run mode - configuration is valid, exiting");
        print_config_summary(&config);
        return Ok(());
    }

    let pipeline = Pipeline::new(PipelineConfig {
        streamer: config,
        max_samples: (args.max_samples > 0).then_some(args.max_samples),
        duration: (args.duration > 0).then(|| Duration::from_secs(args.duration)),
        metrics_port: (args.metrics_port > 0).then_some(args.metrics_port),
    });

    info!("Starting pipeline...");
    let stats = pipeline
        .run(shutdown_signal())
        .await
        .context("Pipeline execution failed")?;

    info!(
        written = stats.dispatcher.write_count,
        dropped = stats.dispatcher.dropped_count,
        duration_secs = stats.duration.as_secs_f64(),
        throughput = format!("{:.2}", stats.throughput()),
        "Pipeline completed successfully"
    );
    stats.print_summary();

    info!("Motion Streamer finished");
    Ok(())
}

/// Config file (or defaults) with command-line overrides, validated once
fn resolve_config(args: &RunArgs) -> Result<StreamerConfig, CliError> {
    let path = args.config.as_deref();
    match path {
        Some(path) => {
            info!(config = %path.display(), "Loading configuration");
            if !path.exists() {
                return Err(CliError::config_not_found(path.display().to_string()));
            }
        }
        None => info!("No configuration file given, using defaults"),
    }
    ConfigLoader::resolve(path, &overrides_from(args)).map_err(CliError::Config)
}

fn overrides_from(args: &RunArgs) -> ConfigOverrides {
    ConfigOverrides {
        mode: args.mode.map(Into::into),
        host: args.host.clone(),
        port: args.port,
        file_path: args.output.clone(),
        kind: args.kind.map(Into::into),
        rate_hz: args.rate,
    }
}

/// Resolves on Ctrl+C or SIGTERM
///
/// A handler that fails to install is logged and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Print configuration summary for dry-run mode
fn print_config_summary(config: &StreamerConfig) {
    println!("\n=== Configuration Summary ===\n");
    println!("Collection:");
    println!("  Mode: {:?}", config.collection.mode);
    println!("  Queue capacity: {}", config.collection.queue_capacity);
    println!("  Drop policy: {:?}", config.collection.drop_policy);

    match config.collection.mode {
        SinkMode::File => {
            println!("\nFile:");
            println!("  Path: {}", config.file.path.display());
            println!("  Precision: {}", config.file.precision);
        }
        SinkMode::Network => {
            let connection = config.network.to_connection_config();
            println!("\nNetwork:");
            println!("  Server: {}", connection.endpoint());
            println!("  Max retries: {}", connection.max_retries);
            println!(
                "  Worst-case backoff: {:.1}s",
                connection.worst_case_backoff().as_secs_f64()
            );
        }
    }

    println!("\nProducer:");
    println!("  Kind: {}", config.producer.kind.as_str());
    println!("  Rate: {} Hz", config.producer.rate_hz);
    println!();
}
