//! StreamerConfig - Config Loader 输出
//!
//! 描述完整的采集配置：输出模式、网络参数、文件输出、样本生产者。

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use validator::Validate;

use crate::{ChannelKind, ConnectionConfig};

/// 配置版本
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConfigVersion {
    #[default]
    V1,
}

/// 完整的采集配置
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct StreamerConfig {
    /// 配置版本
    #[serde(default)]
    pub version: ConfigVersion,

    /// 采集与分发设置
    #[serde(default)]
    #[validate(nested)]
    pub collection: CollectionConfig,

    /// 网络输出设置
    #[serde(default)]
    #[validate(nested)]
    pub network: NetworkConfig,

    /// 文件输出设置
    #[serde(default)]
    #[validate(nested)]
    pub file: FileConfig,

    /// 样本生产者设置
    #[serde(default)]
    #[validate(nested)]
    pub producer: ProducerConfig,
}

/// 输出模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SinkMode {
    /// 写入本地文件
    #[default]
    File,
    /// 通过 TCP 发送到服务器
    Network,
}

/// 队列溢出策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DropPolicy {
    /// 丢弃最旧的样本
    #[default]
    DropOldest,
    /// 丢弃最新的样本
    DropNewest,
}

/// 采集与分发配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CollectionConfig {
    /// 当前输出模式
    #[serde(default)]
    pub mode: SinkMode,

    /// 队列容量
    #[serde(default = "default_queue_capacity")]
    #[validate(range(min = 1, message = "queue_capacity must be >= 1"))]
    pub queue_capacity: usize,

    /// 溢出策略
    #[serde(default)]
    pub drop_policy: DropPolicy,
}

fn default_queue_capacity() -> usize {
    256
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            mode: SinkMode::default(),
            queue_capacity: default_queue_capacity(),
            drop_policy: DropPolicy::default(),
        }
    }
}

/// 网络输出配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NetworkConfig {
    /// 服务器地址
    #[serde(default = "default_host")]
    pub host: String,

    /// 服务器端口
    #[serde(default = "default_port")]
    #[validate(range(min = 1, message = "port must be in 1..=65535"))]
    pub port: u16,

    /// 最大重试次数
    #[serde(default = "default_max_retries")]
    #[validate(range(max = 32, message = "max_retries must be <= 32"))]
    pub max_retries: u32,

    /// 退避基本单位 (毫秒)
    #[serde(default = "default_backoff_base_ms")]
    #[validate(range(min = 1, message = "backoff_base_ms must be > 0"))]
    pub backoff_base_ms: u64,

    /// 退避增长因子
    #[serde(default = "default_backoff_factor")]
    #[validate(range(min = 1.0, message = "backoff_factor must be >= 1.0"))]
    pub backoff_factor: f64,

    /// 连接超时 (毫秒)
    #[serde(default = "default_connect_timeout_ms")]
    #[validate(range(min = 1, message = "connect_timeout_ms must be > 0"))]
    pub connect_timeout_ms: u64,

    /// 写超时 (毫秒)
    #[serde(default = "default_write_timeout_ms")]
    #[validate(range(min = 1, message = "write_timeout_ms must be > 0"))]
    pub write_timeout_ms: u64,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_max_retries() -> u32 {
    5
}

fn default_backoff_base_ms() -> u64 {
    1000
}

fn default_backoff_factor() -> f64 {
    2.0
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_write_timeout_ms() -> u64 {
    5_000
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_retries: default_max_retries(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_factor: default_backoff_factor(),
            connect_timeout_ms: default_connect_timeout_ms(),
            write_timeout_ms: default_write_timeout_ms(),
        }
    }
}

impl NetworkConfig {
    /// Build the runtime connection parameters
    pub fn to_connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            host: self.host.clone(),
            port: self.port,
            max_retries: self.max_retries,
            backoff_base: Duration::from_millis(self.backoff_base_ms),
            backoff_factor: self.backoff_factor,
            connect_timeout: Duration::from_millis(self.connect_timeout_ms),
            write_timeout: Duration::from_millis(self.write_timeout_ms),
        }
    }
}

/// 文件输出配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct FileConfig {
    /// 输出文件路径 (追加写入)
    #[serde(default = "default_file_path")]
    pub path: PathBuf,

    /// 小数位数
    #[serde(default = "default_file_precision")]
    #[validate(range(max = 9, message = "precision must be <= 9"))]
    pub precision: usize,
}

fn default_file_path() -> PathBuf {
    PathBuf::from("SensorData.txt")
}

fn default_file_precision() -> usize {
    6
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            path: default_file_path(),
            precision: default_file_precision(),
        }
    }
}

/// 样本生产者配置
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ProducerConfig {
    /// 样本通道布局
    #[serde(default)]
    pub kind: ChannelKind,

    /// 采样频率 (Hz)
    #[serde(default = "default_rate_hz")]
    #[validate(range(exclusive_min = 0.0, max = 10000.0, message = "rate_hz must be in (0, 10000]"))]
    pub rate_hz: f64,
}

fn default_rate_hz() -> f64 {
    50.0
}

impl Default for ProducerConfig {
    fn default() -> Self {
        Self {
            kind: ChannelKind::default(),
            rate_hz: default_rate_hz(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = StreamerConfig::default();
        assert_eq!(config.collection.mode, SinkMode::File);
        assert_eq!(config.collection.queue_capacity, 256);
        assert_eq!(config.collection.drop_policy, DropPolicy::DropOldest);
        assert_eq!(config.network.max_retries, 5);
        assert_eq!(config.file.precision, 6);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn connection_config_conversion() {
        let network = NetworkConfig {
            host: "192.168.1.10".into(),
            port: 7000,
            backoff_base_ms: 250,
            ..NetworkConfig::default()
        };
        let conn = network.to_connection_config();
        assert_eq!(conn.endpoint(), "192.168.1.10:7000");
        assert_eq!(conn.backoff_base, Duration::from_millis(250));
        assert_eq!(conn.backoff_delay(3), Duration::from_millis(1000));
    }

    #[test]
    fn derive_validation_rejects_port_zero() {
        let mut config = StreamerConfig::default();
        config.network.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn derive_validation_caps_max_retries() {
        let mut network = NetworkConfig {
            max_retries: 32,
            ..NetworkConfig::default()
        };
        assert!(network.validate().is_ok());

        network.max_retries = u32::MAX;
        let errors = network.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("max_retries"));
    }

    #[test]
    fn drop_policy_serde_names() {
        let policy: DropPolicy = serde_json::from_str("\"drop_newest\"").unwrap();
        assert_eq!(policy, DropPolicy::DropNewest);
    }
}
