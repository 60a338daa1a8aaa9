//! # Config Loader
//!
//! 采集配置加载模块。
//!
//! 负责：
//! - 解析 TOML / JSON 配置文件（按扩展名识别）
//! - 合并命令行覆盖项，合并后统一校验
//! - 输出 `StreamerConfig`
//!
//! # Example
//!
//! ```no_run
//! use config_loader::{ConfigLoader, ConfigOverrides};
//! use std::path::Path;
//!
//! let overrides = ConfigOverrides {
//!     port: Some(6000),
//!     ..ConfigOverrides::default()
//! };
//! let config = ConfigLoader::resolve(Some(Path::new("streamer.toml")), &overrides).unwrap();
//! println!("Target: {}", config.network.to_connection_config().endpoint());
//! ```

mod overrides;
mod parser;
mod validator;

pub use contracts::StreamerConfig;
pub use overrides::ConfigOverrides;
pub use parser::ConfigFormat;

use contracts::ContractError;
use std::path::Path;
use tracing::debug;

/// Entry point for building a validated `StreamerConfig`
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load and validate a `.toml` / `.json` file
    pub fn load_from_path(path: &Path) -> Result<StreamerConfig, ContractError> {
        Self::resolve(Some(path), &ConfigOverrides::default())
    }

    /// Parse and validate in-memory content
    pub fn load_from_str(
        content: &str,
        format: ConfigFormat,
    ) -> Result<StreamerConfig, ContractError> {
        Self::checked(parser::parse(content, format)?)
    }

    /// Build the effective configuration for a run
    ///
    /// Starts from `path` (or the built-in defaults), applies `overrides`,
    /// then validates once. An override can therefore repair a bad file
    /// value, and an override that breaks a rule is rejected like a bad file.
    ///
    /// # Errors
    /// Read, format, parse or validation failure.
    pub fn resolve(
        path: Option<&Path>,
        overrides: &ConfigOverrides,
    ) -> Result<StreamerConfig, ContractError> {
        let mut config = match path {
            Some(path) => Self::read(path)?,
            None => StreamerConfig::default(),
        };
        if !overrides.is_empty() {
            overrides.apply(&mut config);
        }
        Self::checked(config)
    }

    /// Run every validation rule against an already-built configuration
    pub fn validate(config: &StreamerConfig) -> Result<(), ContractError> {
        validator::validate(config)
    }

    pub fn to_toml(config: &StreamerConfig) -> Result<String, ContractError> {
        toml::to_string_pretty(config)
            .map_err(|e| ContractError::config_parse(format!("TOML serialize error: {e}")))
    }

    pub fn to_json(config: &StreamerConfig) -> Result<String, ContractError> {
        serde_json::to_string_pretty(config)
            .map_err(|e| ContractError::config_parse(format!("JSON serialize error: {e}")))
    }

    /// Parse a file without validating it
    fn read(path: &Path) -> Result<StreamerConfig, ContractError> {
        let format = ConfigFormat::from_path(path)?;
        let content = std::fs::read_to_string(path)?;
        debug!(path = %path.display(), format = ?format, "Config file read");
        parser::parse(&content, format)
    }

    fn checked(config: StreamerConfig) -> Result<StreamerConfig, ContractError> {
        validator::validate(&config)?;
        Ok(config)
    }
}
