//! 配置解析模块
//!
//! 支持 TOML (主要) 和 JSON (可选) 格式。

use std::path::Path;

use contracts::{ContractError, StreamerConfig};

/// 配置文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML 格式 (推荐)
    Toml,
    /// JSON 格式
    Json,
}

impl ConfigFormat {
    /// 从文件扩展名推断格式
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    /// 从文件路径推断格式
    pub fn from_path(path: &Path) -> Result<Self, ContractError> {
        let ext = path.extension().and_then(|e| e.to_str()).ok_or_else(|| {
            ContractError::config_parse(format!(
                "cannot determine config format of {}",
                path.display()
            ))
        })?;
        Self::from_extension(ext)
            .ok_or_else(|| ContractError::config_parse(format!("unsupported config format: .{ext}")))
    }
}

/// 解析 TOML 格式配置
///
/// 错误信息带 1-based 行号（若 toml 能定位）。
pub fn parse_toml(content: &str) -> Result<StreamerConfig, ContractError> {
    toml::from_str(content).map_err(|e| {
        let message = match e.span() {
            Some(span) => format!(
                "TOML parse error at line {}: {}",
                line_of(content, span.start),
                e.message().trim_end()
            ),
            None => format!("TOML parse error: {}", e.message().trim_end()),
        };
        ContractError::ConfigParse {
            message,
            source: Some(Box::new(e)),
        }
    })
}

/// 解析 JSON 格式配置
pub fn parse_json(content: &str) -> Result<StreamerConfig, ContractError> {
    serde_json::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("JSON parse error at line {}, column {}", e.line(), e.column()),
        source: Some(Box::new(e)),
    })
}

fn line_of(content: &str, offset: usize) -> usize {
    let end = offset.min(content.len());
    content.as_bytes()[..end].iter().filter(|&&b| b == b'\n').count() + 1
}

/// 根据格式解析配置
pub fn parse(content: &str, format: ConfigFormat) -> Result<StreamerConfig, ContractError> {
    match format {
        ConfigFormat::Toml => parse_toml(content),
        ConfigFormat::Json => parse_json(content),
    }
}
