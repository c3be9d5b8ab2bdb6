//! 引擎绑定
//!
//! 通过注册契约暴露给脚本的引擎功能：
//! - `console` - 日志输出
//! - `math` - 基于 glam 的向量类型与 `Axis` 枚举

pub mod console;
pub mod math;

use crate::core::BridgeResult;
use crate::scripting::ScriptScope;

/// 注册全部内置绑定
pub fn register_all(scope: &ScriptScope<'_>) -> BridgeResult<()> {
    console::register(scope)?;
    math::register(scope)?;
    Ok(())
}
