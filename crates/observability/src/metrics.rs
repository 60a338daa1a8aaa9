//! 采集与传输指标模块
//!
//! 通过 `metrics` 宏记录样本流转、连接状态与队列深度，并在内存中聚合运行摘要。

use std::collections::BTreeMap;
use std::fmt;

use contracts::{ConnectionState, DropPolicy};
use metrics::{counter, gauge, histogram};

/// Numeric code exported for a connection state
///
/// 0 = disconnected, 1 = connecting, 2 = connected, 3 = backoff, 4 = failed
pub fn connection_state_code(state: ConnectionState) -> f64 {
    match state {
        ConnectionState::Disconnected => 0.0,
        ConnectionState::Connecting => 1.0,
        ConnectionState::Connected => 2.0,
        ConnectionState::Backoff(_) => 3.0,
        ConnectionState::Failed => 4.0,
    }
}

/// 记录生产者产生的样本
pub fn record_sample_produced(kind: &str) {
    counter!("motion_streamer_samples_produced_total", "kind" => kind.to_string()).increment(1);
}

/// 记录因队列溢出丢弃的样本
pub fn record_sample_dropped(policy: DropPolicy) {
    let policy = match policy {
        DropPolicy::DropOldest => "drop_oldest",
        DropPolicy::DropNewest => "drop_newest",
    };
    counter!("motion_streamer_samples_dropped_total", "policy" => policy).increment(1);
}

/// 记录 sink 写入结果的增量
pub fn record_samples_written(sink_name: &str, written: u64, failed: u64) {
    if written > 0 {
        counter!(
            "motion_streamer_samples_written_total",
            "sink" => sink_name.to_string(),
            "status" => "success"
        )
        .increment(written);
    }
    if failed > 0 {
        counter!(
            "motion_streamer_samples_written_total",
            "sink" => sink_name.to_string(),
            "status" => "failure"
        )
        .increment(failed);
    }
}

/// 记录队列深度
pub fn record_queue_depth(depth: usize) {
    gauge!("motion_streamer_queue_depth").set(depth as f64);
}

/// 记录连接状态迁移
pub fn record_connection_state(endpoint: &str, state: ConnectionState) {
    gauge!("motion_streamer_connection_state", "endpoint" => endpoint.to_string())
        .set(connection_state_code(state));

    match state {
        ConnectionState::Backoff(attempt) => {
            counter!("motion_streamer_connection_retries_total", "endpoint" => endpoint.to_string())
                .increment(1);
            gauge!("motion_streamer_connection_attempt", "endpoint" => endpoint.to_string())
                .set(f64::from(attempt));
        }
        ConnectionState::Connected => {
            counter!("motion_streamer_connections_established_total", "endpoint" => endpoint.to_string())
                .increment(1);
            gauge!("motion_streamer_connection_attempt", "endpoint" => endpoint.to_string()).set(0.0);
        }
        ConnectionState::Failed => {
            counter!("motion_streamer_connection_failures_total", "endpoint" => endpoint.to_string())
                .increment(1);
        }
        ConnectionState::Disconnected | ConnectionState::Connecting => {}
    }
}

/// 记录生产者节拍偏差 (实际间隔 - 期望间隔)
pub fn record_producer_jitter_ms(jitter_ms: f64) {
    histogram!("motion_streamer_producer_jitter_ms").record(jitter_ms);
}

/// 运行指标聚合器
///
/// 在内存中聚合指标，便于在运行结束时输出摘要。
#[derive(Debug, Clone, Default)]
pub struct StreamMetricsAggregator {
    /// 提交的样本数
    pub submitted: u64,

    /// 被拒绝的样本数 (dispatcher 未运行)
    pub rejected: u64,

    /// 队列溢出丢弃数
    pub dropped: u64,

    /// 成功写入数
    pub written: u64,

    /// 写入失败数
    pub write_failures: u64,

    /// 进入 Backoff 的次数
    pub retries: u64,

    /// 建立连接的次数
    pub connections: u64,

    /// 各状态出现次数
    pub state_counts: BTreeMap<String, u64>,

    /// 队列深度统计
    pub queue_depth: RunningStats,

    /// 生产者节拍偏差统计 (毫秒)
    pub jitter_ms: RunningStats,
}

impl StreamMetricsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录一次连接状态迁移
    pub fn observe_state(&mut self, state: ConnectionState) {
        match state {
            ConnectionState::Backoff(_) => self.retries += 1,
            ConnectionState::Connected => self.connections += 1,
            _ => {}
        }
        let key = match state {
            ConnectionState::Backoff(_) => "backoff".to_string(),
            other => other.to_string(),
        };
        *self.state_counts.entry(key).or_insert(0) += 1;
    }

    /// 记录一次周期性采样的 dispatcher 计数 (累计值)
    pub fn observe_totals(&mut self, written: u64, failures: u64, dropped: u64, queue_len: usize) {
        self.written = written;
        self.write_failures = failures;
        self.dropped = dropped;
        self.queue_depth.push(queue_len as f64);
    }

    /// 生成摘要报告
    pub fn summary(&self) -> MetricsSummary {
        let attempted = self.submitted.max(1) as f64;
        MetricsSummary {
            submitted: self.submitted,
            rejected: self.rejected,
            dropped: self.dropped,
            written: self.written,
            write_failures: self.write_failures,
            drop_rate: if self.submitted > 0 {
                self.dropped as f64 / attempted * 100.0
            } else {
                0.0
            },
            retries: self.retries,
            connections: self.connections,
            queue_depth: StatsSummary::from(&self.queue_depth),
            jitter_ms: StatsSummary::from(&self.jitter_ms),
            state_counts: self.state_counts.clone(),
        }
    }
}

/// 指标摘要
#[derive(Debug, Clone, Default)]
pub struct MetricsSummary {
    pub submitted: u64,
    pub rejected: u64,
    pub dropped: u64,
    pub written: u64,
    pub write_failures: u64,
    pub drop_rate: f64,
    pub retries: u64,
    pub connections: u64,
    pub queue_depth: StatsSummary,
    pub jitter_ms: StatsSummary,
    pub state_counts: BTreeMap<String, u64>,
}

impl fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Stream Summary ===")?;
        writeln!(f, "Samples submitted: {}", self.submitted)?;
        writeln!(f, "Samples rejected (not running): {}", self.rejected)?;
        writeln!(f, "Samples dropped: {} ({:.2}%)", self.dropped, self.drop_rate)?;
        writeln!(
            f,
            "Samples written: {} (failures: {})",
            self.written, self.write_failures
        )?;
        writeln!(f, "Queue depth: {}", self.queue_depth)?;
        writeln!(f, "Producer jitter (ms): {}", self.jitter_ms)?;

        if !self.state_counts.is_empty() {
            writeln!(
                f,
                "Connections: {} established, {} retries",
                self.connections, self.retries
            )?;
            for (state, count) in &self.state_counts {
                writeln!(f, "  {state}: {count}")?;
            }
        }

        Ok(())
    }
}

/// 统计摘要
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// 在线统计 (Welford)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
            return;
        }

        self.min = self.min.min(value);
        self.max = self.max.max(value);
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        self.m2 += delta * (value - self.mean);
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// 样本方差
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}
