//! Pipeline statistics and metrics.

use std::time::Duration;

use contracts::{ConnectionState, SinkMode};
use dispatcher::MetricsSnapshot;
use observability::StreamMetricsAggregator;

use super::producer::ProducerReport;

/// Why the run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StopReason {
    /// Sample limit reached
    #[default]
    Completed,
    /// Duration limit reached
    TimedOut,
    /// Ctrl+C / SIGTERM
    Interrupted,
    /// Connection retries exhausted
    ConnectionFailed,
    /// Sink rejected a write in a way retrying cannot fix
    SinkFailed,
}

/// Statistics from a pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineStats {
    pub mode: SinkMode,
    pub stop_reason: StopReason,
    pub duration: Duration,
    /// Last observed connection state (network mode only)
    pub final_state: Option<ConnectionState>,
    pub producer: ProducerReport,
    pub dispatcher: MetricsSnapshot,
    pub metrics: StreamMetricsAggregator,
}

impl PipelineStats {
    /// Samples written per second
    pub fn throughput(&self) -> f64 {
        let secs = self.duration.as_secs_f64();
        if secs > 0.0 {
            self.dispatcher.write_count as f64 / secs
        } else {
            0.0
        }
    }

    /// Share of submitted samples that never reached the sink (%)
    pub fn loss_rate(&self) -> f64 {
        let submitted = self.producer.submitted;
        if submitted == 0 {
            return 0.0;
        }
        let lost = self.dispatcher.dropped_count + self.dispatcher.failure_count;
        lost as f64 / submitted as f64 * 100.0
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n=== Motion Streamer Statistics ===\n");

        println!("Overview");
        println!("   ├─ Mode: {:?}", self.mode);
        println!("   ├─ Stopped: {:?}", self.stop_reason);
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Throughput: {:.2} samples/s", self.throughput());
        if let Some(state) = self.final_state {
            println!("   ├─ Connection: {state}");
        }
        println!("   └─ Loss: {:.2}%", self.loss_rate());

        println!("\nDelivery");
        println!("   ├─ Submitted: {}", self.producer.submitted);
        println!("   ├─ Rejected (stopped): {}", self.producer.rejected);
        println!("   ├─ Dropped (overflow): {}", self.dispatcher.dropped_count);
        println!("   │  ├─ oldest displaced: {}", self.producer.displaced_oldest);
        println!("   │  └─ newest refused: {}", self.producer.dropped_newest);
        println!("   ├─ Written: {}", self.dispatcher.write_count);
        println!("   └─ Write failures: {}", self.dispatcher.failure_count);
        println!("\nProducer");
        println!("   └─ Ran for: {:.2}s", self.producer.elapsed.as_secs_f64());

        println!("\n{}", self.metrics.summary());
    }
}
