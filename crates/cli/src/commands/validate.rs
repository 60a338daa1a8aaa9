//! `validate` command implementation.

use std::time::Duration;

use anyhow::{Context, Result};
use contracts::{SinkMode, StreamerConfig};
use serde::Serialize;
use tracing::info;

use crate::cli::ValidateArgs;

/// Worst-case reconnect window above which a warning is raised
const LONG_BACKOFF: Duration = Duration::from_secs(5 * 60);

/// Validation result for JSON output
#[derive(Serialize)]
struct ValidationResult {
    valid: bool,
    config_path: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    warnings: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    summary: Option<ConfigSummary>,
}

#[derive(Serialize)]
struct ConfigSummary {
    version: String,
    mode: SinkMode,
    endpoint: String,
    file_path: String,
    kind: &'static str,
    rate_hz: f64,
    queue_capacity: usize,
}

/// Execute the `validate` command
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    info!(config = %args.config.display(), "Validating configuration");

    let result = validate_config(args);

    if args.json {
        let json = serde_json::to_string_pretty(&result)
            .context("Failed to serialize validation result")?;
        println!("{json}");
    } else {
        print_validation_result(&result);
    }

    if result.valid {
        Ok(())
    } else {
        anyhow::bail!("Configuration validation failed")
    }
}

fn validate_config(args: &ValidateArgs) -> ValidationResult {
    let config_path = args.config.display().to_string();

    if !args.config.exists() {
        return ValidationResult {
            valid: false,
            config_path,
            error: Some(format!("File not found: {}", args.config.display())),
            warnings: None,
            summary: None,
        };
    }

    match config_loader::ConfigLoader::load_from_path(&args.config) {
        Ok(config) => {
            let warnings = collect_warnings(&config);
            ValidationResult {
                valid: true,
                config_path,
                error: None,
                warnings: (!warnings.is_empty()).then_some(warnings),
                summary: Some(ConfigSummary {
                    version: format!("{:?}", config.version),
                    mode: config.collection.mode,
                    endpoint: config.network.to_connection_config().endpoint(),
                    file_path: config.file.path.display().to_string(),
                    kind: config.producer.kind.as_str(),
                    rate_hz: config.producer.rate_hz,
                    queue_capacity: config.collection.queue_capacity,
                }),
            }
        }
        Err(e) => ValidationResult {
            valid: false,
            config_path,
            error: Some(e.to_string()),
            warnings: None,
            summary: None,
        },
    }
}

/// Collect configuration warnings (non-fatal issues)
fn collect_warnings(config: &StreamerConfig) -> Vec<String> {
    let mut warnings = Vec::new();

    if config.collection.mode == SinkMode::Network {
        let connection = config.network.to_connection_config();
        if connection.max_retries == 0 {
            warnings.push(
                "network.max_retries is 0 - the first failed connect is terminal".to_string(),
            );
        }
        let worst = connection.worst_case_backoff();
        if worst > LONG_BACKOFF {
            warnings.push(format!(
                "Worst-case reconnect backoff is {:.0}s - samples queue up meanwhile",
                worst.as_secs_f64()
            ));
        }
    }

    if (config.collection.queue_capacity as f64) < config.producer.rate_hz {
        warnings.push(format!(
            "collection.queue_capacity ({}) holds less than one second at {} Hz",
            config.collection.queue_capacity, config.producer.rate_hz
        ));
    }

    if config.collection.mode == SinkMode::File && config.file.precision == 0 {
        warnings.push("file.precision is 0 - values are written as integers".to_string());
    }

    warnings
}

fn print_validation_result(result: &ValidationResult) {
    if result.valid {
        println!("✓ Configuration is valid: {}", result.config_path);

        if let Some(ref summary) = result.summary {
            println!("\n  Version: {}", summary.version);
            println!("  Mode: {:?}", summary.mode);
            match summary.mode {
                SinkMode::File => println!("  File: {}", summary.file_path),
                SinkMode::Network => println!("  Server: {}", summary.endpoint),
            }
            println!("  Samples: {} @ {} Hz", summary.kind, summary.rate_hz);
            println!("  Queue capacity: {}", summary.queue_capacity);
        }

        if let Some(ref warnings) = result.warnings {
            println!("\n⚠ Warnings:");
            for warning in warnings {
                println!("  - {warning}");
            }
        }
    } else {
        println!("✗ Configuration is invalid: {}", result.config_path);
        if let Some(ref error) = result.error {
            println!("\n  Error: {error}");
        }
    }
}
