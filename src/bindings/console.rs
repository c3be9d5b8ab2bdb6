//! `console` 命名空间
//!
//! 脚本输出统一写入 `script.console` 日志通道。

use crate::core::logging::CHANNEL_CONSOLE;
use crate::core::BridgeResult;
use crate::scripting::{FunctionTable, ScriptArgs, ScriptHandle, ScriptScope};

/// 拼接参数：字符串与数值原样输出，原生对象显示为 `[Engine <Type>]`，其余按 JSON 显示
pub fn render(values: &[ScriptHandle]) -> String {
    values
        .iter()
        .map(|value| {
            if let Some(text) = value.as_str() {
                text.to_string()
            } else if let Some(number) = value.as_f64() {
                number.to_string()
            } else if let Some(tag) = value.native_tag() {
                format!("[Engine {}]", tag.type_name)
            } else {
                value.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn message(args: &ScriptArgs<'_>) -> String {
    let values: Vec<ScriptHandle> = args.iter().cloned().collect();
    render(&values)
}

fn log(args: &mut ScriptArgs<'_>) -> bool {
    tracing::info!(target: CHANNEL_CONSOLE, "{}", message(args));
    true
}

fn debug(args: &mut ScriptArgs<'_>) -> bool {
    tracing::debug!(target: CHANNEL_CONSOLE, "{}", message(args));
    true
}

fn warn(args: &mut ScriptArgs<'_>) -> bool {
    tracing::warn!(target: CHANNEL_CONSOLE, "{}", message(args));
    true
}

fn error(args: &mut ScriptArgs<'_>) -> bool {
    tracing::error!(target: CHANNEL_CONSOLE, "{}", message(args));
    true
}

/// 注册 `console.log/info/debug/warn/error`
pub fn register(scope: &ScriptScope<'_>) -> BridgeResult<()> {
    let mut table = FunctionTable::new();
    table
        .add("log", log)
        .add("info", log)
        .add("debug", debug)
        .add("warn", warn)
        .add("error", error);
    scope.register_functions(Some("console"), &table)
}
