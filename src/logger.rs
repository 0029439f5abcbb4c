//! 日志模块
//!
//! 特性：
//! - 支持人类可读和 JSON 两种格式
//! - 可配置的日志级别（RUST_LOG）和格式（LOG_FORMAT）

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// 日志格式类型
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LogFormat {
    /// 人类可读格式（带颜色）
    Pretty,
    /// 紧凑单行格式
    Compact,
    /// JSON 结构化格式（适合日志收集系统）
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pretty" => Ok(LogFormat::Pretty),
            "compact" => Ok(LogFormat::Compact),
            "json" => Ok(LogFormat::Json),
            _ => Err(format!("unknown log format: {}", s)),
        }
    }
}

/// 日志配置
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// 日志格式
    pub format: LogFormat,
    /// 是否显示目标模块
    pub show_target: bool,
    /// 是否显示文件名和行号
    pub show_file: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            format: LogFormat::Pretty,
            show_target: true,
            show_file: false,
        }
    }
}

/// 初始化日志系统
///
/// 重复初始化（如测试多次调用）会被静默忽略
///
/// # 环境变量
/// - `RUST_LOG`: 日志级别过滤（如 `info`, `debug`, `warn,playpass=trace`）
pub fn init(config: LogConfig) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let registry = tracing_subscriber::registry().with(env_filter);

    let result = match config.format {
        LogFormat::Pretty => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(config.show_target)
                    .with_file(config.show_file)
                    .with_line_number(config.show_file),
            )
            .try_init(),
        LogFormat::Compact => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .compact()
                    .with_target(config.show_target),
            )
            .try_init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(config.show_target),
            )
            .try_init(),
    };

    let _ = result;
}

/// 按 `LOG_FORMAT` 环境变量初始化（pretty / compact / json）
pub fn init_from_env() {
    let format = std::env::var("LOG_FORMAT")
        .ok()
        .and_then(|s| s.parse::<LogFormat>().ok())
        .unwrap_or(LogFormat::Pretty);

    init(LogConfig {
        format,
        ..Default::default()
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parse() {
        assert_eq!("pretty".parse::<LogFormat>().unwrap(), LogFormat::Pretty);
        assert_eq!("compact".parse::<LogFormat>().unwrap(), LogFormat::Compact);
        assert_eq!("JSON".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert!("yaml".parse::<LogFormat>().is_err());
    }

    #[test]
    fn test_init_is_idempotent() {
        init(LogConfig::default());
        init(LogConfig {
            format: LogFormat::Compact,
            ..Default::default()
        });
    }
}
