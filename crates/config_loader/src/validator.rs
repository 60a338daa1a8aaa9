//! 配置校验模块
//!
//! 校验规则：
//! - 字段范围 (validator derive): port, queue_capacity, max_retries, backoff, rate_hz, precision
//! - network 模式下 host 非空且不含空白
//! - file 模式下 path 非空

use contracts::{ContractError, SinkMode, StreamerConfig};
use ::validator::{Validate, ValidationErrors, ValidationErrorsKind};

/// 校验 StreamerConfig 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(config: &StreamerConfig) -> Result<(), ContractError> {
    validate_fields(config)?;
    validate_network_target(config)?;
    validate_file_target(config)?;
    Ok(())
}

/// 运行 derive 规则，并转换为带字段路径的错误
fn validate_fields(config: &StreamerConfig) -> Result<(), ContractError> {
    config.validate().map_err(|errors| {
        let (field, message) = first_violation(&errors, "")
            .unwrap_or_else(|| ("config".to_string(), errors.to_string()));
        ContractError::config_validation(field, message)
    })
}

fn first_violation(errors: &ValidationErrors, prefix: &str) -> Option<(String, String)> {
    for (field, kind) in errors.errors() {
        let path = if prefix.is_empty() {
            field.to_string()
        } else {
            format!("{prefix}.{field}")
        };
        match kind {
            ValidationErrorsKind::Field(field_errors) => {
                if let Some(err) = field_errors.first() {
                    let message = err
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| err.code.to_string());
                    return Some((path, message));
                }
            }
            ValidationErrorsKind::Struct(inner) => {
                if let Some(found) = first_violation(inner, &path) {
                    return Some(found);
                }
            }
            ValidationErrorsKind::List(items) => {
                for (idx, inner) in items {
                    if let Some(found) = first_violation(inner, &format!("{path}[{idx}]")) {
                        return Some(found);
                    }
                }
            }
        }
    }
    None
}

/// 校验网络目标
fn validate_network_target(config: &StreamerConfig) -> Result<(), ContractError> {
    if config.collection.mode != SinkMode::Network {
        return Ok(());
    }

    let host = &config.network.host;
    if host.trim().is_empty() {
        return Err(ContractError::config_validation(
            "network.host",
            "host cannot be empty in network mode",
        ));
    }
    if host.chars().any(char::is_whitespace) {
        return Err(ContractError::config_validation(
            "network.host",
            format!("host '{host}' contains whitespace"),
        ));
    }
    Ok(())
}

/// 校验文件目标
fn validate_file_target(config: &StreamerConfig) -> Result<(), ContractError> {
    if config.collection.mode != SinkMode::File {
        return Ok(());
    }

    if config.file.path.as_os_str().is_empty() {
        return Err(ContractError::config_validation(
            "file.path",
            "path cannot be empty in file mode",
        ));
    }
    Ok(())
}
