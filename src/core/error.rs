//! 统一错误处理模块
//!
//! 提供脚本桥范围内的统一错误类型定义
//!
//! ## 错误类型分层
//!
//! - **宿主层错误** (`BridgeError`): 宿主代码调用运行时、注册类型、加载配置时返回
//! - **参数协议错误** (`ArgumentError`, `ConversionError`): 原生函数检查参数时产生，
//!   只用于诊断，不会以 panic 或脚本异常的形式跨越边界
//!
//! 脚本运行时的编译/执行错误由 [`ScriptErrorReport`] 描述。

use thiserror::Error;

use crate::config::ConfigError;
use crate::scripting::diagnostics::ScriptErrorReport;
use crate::scripting::ValueKind;

/// 脚本桥核心错误类型
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Script engine error: {0}")]
    Engine(#[from] rquickjs::Error),

    #[error("Script error: {0}")]
    Script(#[from] ScriptErrorReport),

    #[error("Registration error: {0}")]
    Registration(String),

    #[error("Callback not resolved: {0}")]
    UnresolvedCallback(String),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// 参数检查错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ArgumentError {
    #[error("expected {expected} arguments, found {found}")]
    Count { expected: usize, found: usize },

    #[error("argument {index}: expected {expected}, found {found}")]
    Kind {
        index: usize,
        expected: ValueKind,
        found: ValueKind,
    },

    #[error("invalid format code '{code}' at position {index}")]
    Format { index: usize, code: char },
}

/// 值转换错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConversionError {
    #[error("expected {expected}, found {found}")]
    Mismatch { expected: ValueKind, found: ValueKind },

    #[error("{value} is out of range for {target}")]
    OutOfRange { value: f64, target: &'static str },

    #[error("{value} is not a valid {target}")]
    UnknownVariant { value: i64, target: &'static str },
}

/// 脚本桥结果类型别名
pub type BridgeResult<T> = Result<T, BridgeError>;
