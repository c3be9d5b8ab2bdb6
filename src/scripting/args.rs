//! 参数/返回值协议
//!
//! 每次原生调用构造一个 `ScriptArgs`：参数在进入时一次性读出，
//! 原生函数用 `check` 校验、用 `get` 系列读取，再通过 `add_return*` 设置唯一的返回值。

use rquickjs::{Ctx, Object, Value};

use crate::core::logging::CHANNEL_SCRIPT;
use crate::core::ArgumentError;
use crate::scripting::object::{NativeObject, NativeRef, ObjectId, ScriptLease};
use crate::scripting::registry::ScriptClass;
use crate::scripting::scope::ScriptScope;
use crate::scripting::stash;
use crate::scripting::value::{FromScript, IntoHandle, NativeTag, ScriptHandle, ValueKind};

/// 返回值
enum ReturnValue {
    Value(ScriptHandle),
    /// 交给回收器的新对象，推送时附加终结器
    Owned { tag: NativeTag, lease: ScriptLease },
}

/// 一次原生调用的参数帧
pub struct ScriptArgs<'js> {
    scope: ScriptScope<'js>,
    function: String,
    values: Vec<ScriptHandle>,
    callee: Option<NativeTag>,
    ret: Option<ReturnValue>,
    /// 本次调用收到的包装对象，原样返回时保持同一性
    origins: Vec<(ObjectId, Object<'js>)>,
}

impl<'js> ScriptArgs<'js> {
    /// 构造静态调用的参数帧
    pub fn new(scope: ScriptScope<'js>, function: impl Into<String>, values: Vec<ScriptHandle>) -> Self {
        Self {
            scope,
            function: function.into(),
            values,
            callee: None,
            ret: None,
            origins: Vec::new(),
        }
    }

    /// 附加被调用的原生对象（实例方法调用）
    pub fn with_callee(mut self, callee: NativeTag) -> Self {
        self.callee = Some(callee);
        self
    }

    /// 从运行时的调用帧构造
    pub(crate) fn from_call(
        scope: ScriptScope<'js>,
        function: &str,
        this: &Value<'js>,
        args: &[Value<'js>],
    ) -> Self {
        let values = args.iter().map(|value| scope.pull(value)).collect();
        let callee = this.as_object().and_then(stash::read_tag);
        let origins = std::iter::once(this)
            .chain(args)
            .filter_map(|value| {
                let object = value.as_object()?;
                stash::read_tag(object).map(|tag| (tag.id, object.clone()))
            })
            .collect();
        Self {
            scope,
            function: function.to_string(),
            values,
            callee,
            ret: None,
            origins,
        }
    }

    /// 当前作用域，可用于回调脚本或登记对象
    pub fn scope(&self) -> &ScriptScope<'js> {
        &self.scope
    }

    pub fn function_name(&self) -> &str {
        &self.function
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScriptHandle> {
        self.values.iter()
    }

    /// 按格式串校验参数
    ///
    /// 格式字符：`N` Number、`B` Boolean、`S` String、`O` Object、`A` Array。
    /// 格式串长度即期望的参数个数，缺少的参数视为 `Null`，多余的参数同样不通过。
    pub fn validate(&self, format: &str) -> Result<(), ArgumentError> {
        let mut expected_count = 0;
        for (index, code) in format.chars().enumerate() {
            let expected = ValueKind::from_code(code).ok_or(ArgumentError::Format { index, code })?;
            let found = self.values.get(index).map_or(ValueKind::Null, |value| value.kind());
            if found != expected {
                return Err(ArgumentError::Kind {
                    index,
                    expected,
                    found,
                });
            }
            expected_count += 1;
        }
        if self.values.len() > expected_count {
            return Err(ArgumentError::Count {
                expected: expected_count,
                found: self.values.len(),
            });
        }
        Ok(())
    }

    /// `validate` 的布尔形式，失败时记录警告
    pub fn check(&self, format: &str) -> bool {
        match self.validate(format) {
            Ok(()) => true,
            Err(err) => {
                tracing::warn!(target: CHANNEL_SCRIPT, "{}: {}", self.function, err);
                false
            }
        }
    }

    /// 读取参数，缺省时返回 `default`；类型不符或数值越界时返回 `default` 并记录警告
    pub fn get<T: FromScript>(&self, index: usize, default: T) -> T {
        let Some(value) = self.values.get(index) else {
            return default;
        };
        match T::from_script(value) {
            Ok(converted) => converted,
            Err(err) => {
                tracing::warn!(target: CHANNEL_SCRIPT, "{}: argument {}: {}", self.function, index, err);
                default
            }
        }
    }

    pub fn get_handle(&self, index: usize) -> Option<ScriptHandle> {
        self.values.get(index).cloned()
    }

    pub fn get_str(&self, index: usize) -> Option<&str> {
        self.values.get(index).and_then(|value| value.as_str())
    }

    /// 取出参数标记的原生对象
    ///
    /// 参数必须是带原生标记的对象，且类型名与 `T::NAME` 完全一致、对象仍然存活；
    /// 否则记录警告并返回 None。
    pub fn get_pointer<T: ScriptClass>(&self, index: usize) -> Option<NativeRef<T>> {
        let Some(value) = self.values.get(index) else {
            tracing::warn!(target: CHANNEL_SCRIPT, "{}: argument {}: expected {}, found nothing", self.function, index, T::NAME);
            return None;
        };
        let Some(tag) = value.native_tag() else {
            tracing::warn!(target: CHANNEL_SCRIPT, "{}: argument {}: expected {}, found {}", self.function, index, T::NAME, value.kind());
            return None;
        };
        self.resolve_tag::<T>(tag, &format!("argument {}", index))
    }

    /// 取出被调用的原生对象
    ///
    /// 静态调用（没有被调用对象）说明注册有误，记录错误并返回 None。
    pub fn get_self<T: ScriptClass>(&self) -> Option<NativeRef<T>> {
        let Some(tag) = self.callee.as_ref() else {
            tracing::error!(target: CHANNEL_SCRIPT, "{}: called without an instance, expected {}", self.function, T::NAME);
            return None;
        };
        self.resolve_tag::<T>(tag, "self")
    }

    fn resolve_tag<T: ScriptClass>(&self, tag: &NativeTag, what: &str) -> Option<NativeRef<T>> {
        if tag.type_name != T::NAME {
            tracing::warn!(target: CHANNEL_SCRIPT, "{}: {}: expected {}, found {}", self.function, what, T::NAME, tag.type_name);
            return None;
        }
        let resolved = self.scope.registry().resolve::<T>(tag);
        if resolved.is_none() {
            tracing::warn!(target: CHANNEL_SCRIPT, "{}: {}: {} {} no longer exists", self.function, what, T::NAME, tag.id);
        }
        resolved
    }

    pub fn callee(&self) -> Option<&NativeTag> {
        self.callee.as_ref()
    }

    /// 设置返回值，覆盖之前的值
    pub fn add_return(&mut self, value: impl IntoHandle) {
        self.ret = Some(ReturnValue::Value(value.into_handle()));
    }

    /// 返回一个原生持有的对象
    pub fn add_return_pointer<T: ScriptClass>(&mut self, object: &NativeObject<T>) {
        self.ret = Some(ReturnValue::Value(object.handle()));
    }

    /// 返回一个新对象，所有权交给脚本回收器
    pub fn add_return_owned<T: ScriptClass>(&mut self, value: T) -> ObjectId {
        let (id, lease) = self.scope.bridge().registry().adopt_script(value);
        self.ret = Some(ReturnValue::Owned {
            tag: NativeTag::new(id, T::NAME),
            lease,
        });
        id
    }

    /// 当前的返回值
    pub fn return_value(&self) -> Option<ScriptHandle> {
        self.ret.as_ref().map(|ret| match ret {
            ReturnValue::Value(handle) => handle.clone(),
            ReturnValue::Owned { tag, .. } => ScriptHandle::tagged_object(tag.clone()),
        })
    }

    /// 推送返回值，未设置时为 `undefined`
    pub(crate) fn into_return(mut self, ctx: &Ctx<'js>) -> rquickjs::Result<Value<'js>> {
        match self.ret.take() {
            None => Ok(Value::new_undefined(ctx.clone())),
            Some(ReturnValue::Value(handle)) => {
                let origin = handle
                    .native_tag()
                    .and_then(|tag| self.origins.iter().find(|(id, _)| *id == tag.id))
                    .map(|(_, object)| object.clone());
                match origin {
                    Some(object) => Ok(object.into_value()),
                    None => self.scope.push_raw(&handle),
                }
            }
            Some(ReturnValue::Owned { tag, lease }) => {
                let finalizer = stash::finalizer(ctx, lease)?;
                Ok(stash::wrap(ctx, &tag, false, Some(finalizer))?.into_value())
            }
        }
    }
}

impl std::fmt::Debug for ScriptArgs<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptArgs")
            .field("function", &self.function)
            .field("values", &self.values)
            .field("callee", &self.callee)
            .finish()
    }
}
