//! 原生 → 脚本回调
//!
//! 回调只保存名字（`"name"` 或 `"object.method"`），每次调用时重新解析，
//! 解析失败即放弃调用。

use rquickjs::function::{Rest, This};
use rquickjs::{Function, Object, Value};

use crate::core::logging::{CHANNEL_ERROR, CHANNEL_SCRIPT};
use crate::core::{BridgeError, BridgeResult};
use crate::scripting::scope::ScriptScope;
use crate::scripting::value::ScriptHandle;

/// 按名字绑定的脚本函数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptCallback {
    path: String,
    valid: bool,
}

/// 解析路径，返回 (this, 函数)
fn resolve<'js>(scope: &ScriptScope<'js>, path: &str) -> rquickjs::Result<Option<(Value<'js>, Function<'js>)>> {
    let ctx = scope.ctx();
    let mut owner: Option<Object<'js>> = None;
    let mut current: Value<'js> = ctx.globals().into_value();

    for segment in path.split('.') {
        if segment.is_empty() {
            return Ok(None);
        }
        let Some(object) = current.as_object().cloned() else {
            return Ok(None);
        };
        current = object.get(segment)?;
        owner = Some(object);
    }

    let Some(function) = current.as_function().cloned() else {
        return Ok(None);
    };
    let this = match owner {
        Some(object) if path.contains('.') => object.into_value(),
        _ => Value::new_undefined(ctx.clone()),
    };
    Ok(Some((this, function)))
}

impl ScriptCallback {
    /// 解析一次以确认存在，失败时得到无效回调
    pub fn from_global(scope: &ScriptScope<'_>, path: &str) -> Self {
        let valid = match resolve(scope, path) {
            Ok(Some(_)) => true,
            Ok(None) => {
                tracing::warn!(target: CHANNEL_SCRIPT, "callback '{}' does not name a script function", path);
                false
            }
            Err(err) => {
                let err = scope.engine_error(err, None);
                tracing::warn!(target: CHANNEL_SCRIPT, "callback '{}' could not be resolved: {}", path, err);
                false
            }
        };
        Self {
            path: path.to_string(),
            valid,
        }
    }

    /// 从未解析过的无效回调
    pub fn invalid(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            valid: false,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    /// 调用回调，成功返回 true
    pub fn call(&self, scope: &ScriptScope<'_>, args: &[ScriptHandle]) -> bool {
        self.call_with_result(scope, args).is_some()
    }

    /// 调用回调并返回结果
    pub fn call_with_result(&self, scope: &ScriptScope<'_>, args: &[ScriptHandle]) -> Option<ScriptHandle> {
        self.try_call(scope, args).ok()
    }

    /// 调用回调，失败原因以 `BridgeError` 返回
    pub fn try_call(&self, scope: &ScriptScope<'_>, args: &[ScriptHandle]) -> BridgeResult<ScriptHandle> {
        if !self.valid {
            return Err(BridgeError::UnresolvedCallback(self.path.clone()));
        }

        let (this, function) = match resolve(scope, &self.path) {
            Ok(Some(found)) => found,
            Ok(None) => {
                tracing::warn!(target: CHANNEL_SCRIPT, "callback '{}' no longer resolves", self.path);
                return Err(BridgeError::UnresolvedCallback(self.path.clone()));
            }
            Err(err) => return Err(scope.engine_error(err, None)),
        };

        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(scope.push_raw(arg).map_err(|err| scope.engine_error(err, None))?);
        }

        match function.call::<_, Value>((This(this), Rest(values))) {
            Ok(result) => Ok(scope.pull(&result)),
            Err(rquickjs::Error::Exception) => {
                let report = scope.report_exception(None);
                tracing::error!(target: CHANNEL_ERROR, "callback '{}' failed: {}", self.path, report);
                Err(BridgeError::Script(report))
            }
            Err(err) => Err(BridgeError::Engine(err)),
        }
    }
}
