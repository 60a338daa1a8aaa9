//! `info` command implementation.

use anyhow::{Context, Result};
use contracts::{DropPolicy, SinkMode, StreamerConfig};
use serde::Serialize;
use tracing::info;

use crate::cli::InfoArgs;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo {
    version: String,
    collection: CollectionInfo,
    network: NetworkInfo,
    file: FileInfo,
    producer: ProducerInfo,
}

#[derive(Serialize)]
struct CollectionInfo {
    mode: SinkMode,
    queue_capacity: usize,
    drop_policy: DropPolicy,
}

#[derive(Serialize)]
struct NetworkInfo {
    endpoint: String,
    max_retries: u32,
    /// Wait before each retry, in order (ms)
    retry_schedule_ms: Vec<u64>,
    worst_case_backoff_ms: u64,
    connect_timeout_ms: u64,
    write_timeout_ms: u64,
}

#[derive(Serialize)]
struct FileInfo {
    path: String,
    precision: usize,
}

#[derive(Serialize)]
struct ProducerInfo {
    kind: &'static str,
    channels: usize,
    rate_hz: f64,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        anyhow::bail!("Configuration file not found: {}", args.config.display());
    }

    let config = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    let info = build_config_info(&config);
    if args.json {
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{json}");
    } else {
        print_config_info(&info);
    }

    Ok(())
}

fn build_config_info(config: &StreamerConfig) -> ConfigInfo {
    let connection = config.network.to_connection_config();
    let retry_schedule_ms = (1..=connection.max_retries)
        .map(|attempt| connection.backoff_delay(attempt).as_millis() as u64)
        .collect();

    ConfigInfo {
        version: format!("{:?}", config.version),
        collection: CollectionInfo {
            mode: config.collection.mode,
            queue_capacity: config.collection.queue_capacity,
            drop_policy: config.collection.drop_policy,
        },
        network: NetworkInfo {
            endpoint: connection.endpoint(),
            max_retries: connection.max_retries,
            retry_schedule_ms,
            worst_case_backoff_ms: connection.worst_case_backoff().as_millis() as u64,
            connect_timeout_ms: config.network.connect_timeout_ms,
            write_timeout_ms: config.network.write_timeout_ms,
        },
        file: FileInfo {
            path: config.file.path.display().to_string(),
            precision: config.file.precision,
        },
        producer: ProducerInfo {
            kind: config.producer.kind.as_str(),
            channels: config.producer.kind.channel_count(),
            rate_hz: config.producer.rate_hz,
        },
    }
}

fn print_config_info(info: &ConfigInfo) {
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║              Motion Streamer Configuration                   ║");
    println!("╚══════════════════════════════════════════════════════════════╝\n");

    let active = |mode: SinkMode| {
        if info.collection.mode == mode {
            " (active)"
        } else {
            ""
        }
    };

    println!("📦 Collection");
    println!("   ├─ Version: {}", info.version);
    println!("   ├─ Mode: {:?}", info.collection.mode);
    println!("   ├─ Queue Capacity: {}", info.collection.queue_capacity);
    println!("   └─ Drop Policy: {:?}", info.collection.drop_policy);

    let network = &info.network;
    println!("\n🌐 Network{}", active(SinkMode::Network));
    println!("   ├─ Server: {}", network.endpoint);
    println!("   ├─ Max Retries: {}", network.max_retries);
    if network.retry_schedule_ms.is_empty() {
        println!("   ├─ Retry Schedule: (none, first failure is terminal)");
    } else {
        let schedule: Vec<String> = network
            .retry_schedule_ms
            .iter()
            .map(|ms| format!("{:.1}s", *ms as f64 / 1000.0))
            .collect();
        println!("   ├─ Retry Schedule: {}", schedule.join(" → "));
    }
    println!(
        "   ├─ Worst-case Backoff: {:.1}s",
        network.worst_case_backoff_ms as f64 / 1000.0
    );
    println!(
        "   └─ Timeouts: connect {}ms, write {}ms",
        network.connect_timeout_ms, network.write_timeout_ms
    );

    println!("\n📄 File{}", active(SinkMode::File));
    println!("   ├─ Path: {}", info.file.path);
    println!("   └─ Precision: {}", info.file.precision);

    println!("\n📈 Producer");
    println!("   ├─ Kind: {} ({} channels)", info.producer.kind, info.producer.channels);
    println!("   └─ Rate: {} Hz", info.producer.rate_hz);

    println!();
}
