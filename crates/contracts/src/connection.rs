//! Connection parameters and connection state machine states
//!
//! Consumed by the dispatcher's `ConnectionManager`.

use std::fmt;
use std::time::Duration;

/// Upper bound for a single backoff wait, regardless of attempt count
pub const MAX_BACKOFF_DELAY: Duration = Duration::from_secs(3600);

/// Remote endpoint and retry policy
///
/// Immutable for the lifetime of one attempt sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionConfig {
    /// Server host name or IP address
    pub host: String,

    /// Server port (1-65535)
    pub port: u16,

    /// Reconnection attempts allowed after the first failure
    pub max_retries: u32,

    /// Base backoff unit
    pub backoff_base: Duration,

    /// Backoff growth factor (2.0 = exponential doubling)
    pub backoff_factor: f64,

    /// Bound on a single blocking connect
    pub connect_timeout: Duration,

    /// Bound on a single line write + flush
    pub write_timeout: Duration,
}

impl ConnectionConfig {
    /// Create a config with default retry policy
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Self::default()
        }
    }

    /// `host:port` string used for connecting and logging
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Delay before retry `attempt` (1-based): `backoff_base * backoff_factor^(attempt - 1)`
    ///
    /// With the defaults this gives 1s, 2s, 4s, 8s, 16s for attempts 1..=5.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.backoff_base.as_secs_f64() * self.backoff_factor.powi(exponent);
        Duration::try_from_secs_f64(secs)
            .unwrap_or(MAX_BACKOFF_DELAY)
            .min(MAX_BACKOFF_DELAY)
    }

    /// Sum of every backoff wait before the manager gives up
    pub fn worst_case_backoff(&self) -> Duration {
        (1..=self.max_retries)
            .map(|attempt| self.backoff_delay(attempt))
            .sum()
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 5000,
            max_retries: 5,
            backoff_base: Duration::from_secs(1),
            backoff_factor: 2.0,
            connect_timeout: Duration::from_secs(10),
            write_timeout: Duration::from_secs(5),
        }
    }
}

/// Connection manager state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ConnectionState {
    /// No transport, no attempt scheduled
    #[default]
    Disconnected,
    /// Connect attempt in flight
    Connecting,
    /// Transport established and writable
    Connected,
    /// Waiting before retry number `n`
    Backoff(u32),
    /// Retry ceiling exceeded; terminal until reset
    Failed,
}

impl ConnectionState {
    /// Only `Failed` is terminal
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Failed)
    }

    /// Whether a connect attempt is in flight or scheduled
    pub fn is_pending(self) -> bool {
        matches!(self, Self::Connecting | Self::Backoff(_))
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connecting => write!(f, "connecting"),
            Self::Connected => write!(f, "connected"),
            Self::Backoff(attempt) => write!(f, "backoff({attempt})"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_delay_doubles() {
        let config = ConnectionConfig::default();
        let delays: Vec<_> = (1..=5).map(|n| config.backoff_delay(n)).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8),
                Duration::from_secs(16),
            ]
        );
    }

    #[test]
    fn test_backoff_delay_monotonic() {
        let config = ConnectionConfig {
            backoff_base: Duration::from_millis(250),
            max_retries: 8,
            ..ConnectionConfig::default()
        };
        for n in 1..config.max_retries {
            assert!(config.backoff_delay(n) < config.backoff_delay(n + 1));
        }
    }

    #[test]
    fn test_backoff_delay_is_capped() {
        let config = ConnectionConfig::default();
        assert_eq!(config.backoff_delay(200), MAX_BACKOFF_DELAY);
    }

    #[test]
    fn test_worst_case_backoff() {
        let config = ConnectionConfig::default();
        assert_eq!(config.worst_case_backoff(), Duration::from_secs(31));
    }

    #[test]
    fn test_endpoint_and_defaults() {
        let config = ConnectionConfig::new("10.0.0.2", 9000);
        assert_eq!(config.endpoint(), "10.0.0.2:9000");
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.backoff_factor, 2.0);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ConnectionState::Backoff(3).to_string(), "backoff(3)");
        assert!(ConnectionState::Failed.is_terminal());
        assert!(ConnectionState::Backoff(1).is_pending());
        assert!(!ConnectionState::Connected.is_pending());
    }
}
