//! 日志初始化
//!
//! 诊断信息统一通过 `tracing` 输出，通道即 `target`：
//!
//! - `script` - 参数/类型不匹配、回调解析失败
//! - `script.lifecycle` - 原生对象的所有权事件
//! - `script.error` - 脚本运行时错误
//! - `script.console` - 脚本侧 console 输出

use crate::config::{LogLevel, LoggingConfig};

/// 参数与类型诊断通道
pub const CHANNEL_SCRIPT: &str = "script";
/// 对象生命周期通道
pub const CHANNEL_LIFECYCLE: &str = "script.lifecycle";
/// 脚本运行时错误通道
pub const CHANNEL_ERROR: &str = "script.error";
/// 脚本 console 通道
pub const CHANNEL_CONSOLE: &str = "script.console";

/// 初始化日志系统
///
/// 日志级别优先读取 `RUST_LOG` 环境变量，未设置时使用配置中的级别。
/// 重复调用是安全的。
pub fn init(config: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.level.as_filter()));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.show_channels)
        .try_init();
}

impl LogLevel {
    /// 对应的 `EnvFilter` 指令
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_idempotent() {
        let config = LoggingConfig::default();
        init(&config);
        init(&config);
        tracing::info!(target: CHANNEL_SCRIPT, "logging initialised twice");
    }

    #[test]
    fn test_level_filters() {
        assert_eq!(LogLevel::Warn.as_filter(), "warn");
        assert_eq!(LogLevel::Trace.as_filter(), "trace");
    }
}
