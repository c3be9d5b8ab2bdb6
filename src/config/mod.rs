/// 统一配置系统
///
/// 提供TOML/JSON配置文件、环境变量覆盖和配置验证
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

use crate::core::logging::CHANNEL_SCRIPT;
use crate::impl_default;

pub mod marshal;
pub mod runtime;

pub use marshal::MarshalConfig;
pub use runtime::RuntimeConfig;

/// 配置错误
#[derive(Error, Debug)]
pub enum ConfigError {
    /// 文件读取错误
    #[error("Config file error: {0}")]
    FileError(#[from] std::io::Error),
    /// 解析错误
    #[error("Config parse error: {0}")]
    ParseError(String),
    /// 验证错误
    #[error("Config validation error: {0}")]
    ValidationError(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// 脚本桥主配置
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptConfig {
    /// 运行时配置
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// 值转换配置
    #[serde(default)]
    pub marshal: MarshalConfig,

    /// 错误报告配置
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,

    /// 日志配置
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ScriptConfig {
    /// 创建默认配置
    pub fn new() -> Self {
        Self::default()
    }

    /// 从TOML文件加载配置
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(ConfigError::FileError)?;
        Self::from_toml_str(&content)
    }

    /// 从TOML字符串解析配置
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// 从JSON字符串解析配置
    pub fn from_json_str(content: &str) -> ConfigResult<Self> {
        serde_json::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// 序列化为TOML
    pub fn to_toml_string(&self) -> ConfigResult<String> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// 从环境变量覆盖配置
    pub fn apply_env_overrides(&mut self) {
        override_from_env("SCRIPT_MEMORY_LIMIT", &mut self.runtime.memory_limit);
        override_from_env("SCRIPT_MAX_STACK_SIZE", &mut self.runtime.max_stack_size);
        override_from_env("SCRIPT_GC_THRESHOLD", &mut self.runtime.gc_threshold);
        override_from_env("SCRIPT_MAX_DEPTH", &mut self.marshal.max_depth);

        if let Ok(val) = env::var("SCRIPT_LOG_LEVEL") {
            match val.parse() {
                Ok(level) => self.logging.level = level,
                Err(e) => tracing::warn!(target: CHANNEL_SCRIPT, "Ignoring SCRIPT_LOG_LEVEL: {}", e),
            }
        }
    }

    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        self.runtime.validate()?;
        self.marshal.validate()?;
        self.diagnostics.validate()?;
        Ok(())
    }
}

fn override_from_env<T: FromStr>(key: &str, slot: &mut T) {
    if let Ok(val) = env::var(key) {
        match val.parse() {
            Ok(parsed) => *slot = parsed,
            Err(_) => tracing::warn!(target: CHANNEL_SCRIPT, "Ignoring {}: '{}' is not a valid value", key, val),
        }
    }
}

/// 脚本错误报告配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticsConfig {
    /// 是否过滤原生/匿名/桥内部的调用栈帧
    pub filter_internal_frames: bool,

    /// 报告中保留的最大栈帧数
    pub max_stack_frames: usize,
}

impl_default!(DiagnosticsConfig {
    filter_internal_frames: true,
    max_stack_frames: 32,
});

impl DiagnosticsConfig {
    /// 验证配置
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_stack_frames == 0 {
            return Err(ConfigError::ValidationError(
                "max_stack_frames must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// 日志配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// 日志级别
    pub level: LogLevel,

    /// 是否在输出中显示通道名
    pub show_channels: bool,
}

impl_default!(LoggingConfig {
    level: LogLevel::Info,
    show_channels: true,
});

/// 日志级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    /// 跟踪
    Trace,
    /// 调试
    Debug,
    /// 信息
    Info,
    /// 警告
    Warn,
    /// 错误
    Error,
}

impl FromStr for LogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            other => Err(ConfigError::ParseError(format!("unknown log level '{}'", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ScriptConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_toml_serialization() {
        let config = ScriptConfig::default();
        let toml_str = config.to_toml_string().unwrap();
        let parsed = ScriptConfig::from_toml_str(&toml_str).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_json_serialization() {
        let config = ScriptConfig::default();
        let json_str = serde_json::to_string(&config).unwrap();
        let parsed = ScriptConfig::from_json_str(&json_str).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn test_partial_toml() {
        let parsed = ScriptConfig::from_toml_str(
            r#"
            [marshal]
            max_depth = 16

            [logging]
            level = "Debug"
            show_channels = false
            "#,
        )
        .unwrap();

        assert_eq!(parsed.marshal.max_depth, 16);
        assert_eq!(parsed.logging.level, LogLevel::Debug);
        assert_eq!(parsed.runtime, RuntimeConfig::default());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let mut config = ScriptConfig::default();
        config.marshal.max_depth = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationError(_))
        ));

        let mut config = ScriptConfig::default();
        config.diagnostics.max_stack_frames = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_error() {
        let result = ScriptConfig::from_toml_str("[marshal]\nmax_depth = \"deep\"");
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_log_level_from_str() {
        assert_eq!("WARN".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert!("loud".parse::<LogLevel>().is_err());
    }
}
