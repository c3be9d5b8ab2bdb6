//! 脚本值与运行时值之间的转换
//!
//! - `pull`: 运行时值 → `ScriptHandle`，永不失败，无法识别的值变为 `Null`
//! - `push`: `ScriptHandle` → 运行时值，按标签分派，容器递归
//!
//! 两个方向都受 `max_depth` 限制，超出部分变为 `Null`。

use std::collections::HashSet;

use rquickjs::{Array, Ctx, Object, Value};

use crate::core::logging::CHANNEL_SCRIPT;
use crate::scripting::object::{ObjectRegistry, Ownership};
use crate::scripting::stash;
use crate::scripting::value::{NativeTag, ScriptHandle, ScriptValue};

/// 一次转换的上下文
#[derive(Clone, Copy)]
pub struct Marshal<'a> {
    registry: &'a ObjectRegistry,
    max_depth: usize,
}

impl<'a> Marshal<'a> {
    pub fn new(registry: &'a ObjectRegistry, max_depth: usize) -> Self {
        Self { registry, max_depth }
    }

    /// 读取运行时值
    pub fn pull<'js>(&self, ctx: &Ctx<'js>, value: &Value<'js>) -> ScriptHandle {
        self.pull_at(ctx, value, 0)
    }

    /// 写入运行时值
    pub fn push<'js>(&self, ctx: &Ctx<'js>, handle: &ScriptHandle) -> rquickjs::Result<Value<'js>> {
        self.push_at(ctx, handle, 0)
    }

    fn pull_at<'js>(&self, ctx: &Ctx<'js>, value: &Value<'js>, depth: usize) -> ScriptHandle {
        if depth > self.max_depth {
            tracing::warn!(target: CHANNEL_SCRIPT, "value nested deeper than {} levels, truncated to null", self.max_depth);
            return ScriptHandle::null();
        }
        match self.try_pull(ctx, value, depth) {
            Ok(handle) => handle,
            Err(err) => {
                if let rquickjs::Error::Exception = err {
                    let _ = ctx.catch();
                }
                tracing::debug!(target: CHANNEL_SCRIPT, "failed to read script value, using null: {}", err);
                ScriptHandle::null()
            }
        }
    }

    fn try_pull<'js>(&self, ctx: &Ctx<'js>, value: &Value<'js>, depth: usize) -> rquickjs::Result<ScriptHandle> {
        if value.is_null() || value.is_undefined() {
            return Ok(ScriptHandle::null());
        }
        if let Some(b) = value.as_bool() {
            return Ok(ScriptHandle::boolean(b));
        }
        if let Some(n) = value.as_number() {
            return Ok(ScriptHandle::number(n));
        }
        if let Some(s) = value.as_string() {
            return Ok(ScriptHandle::string(s.to_string()?));
        }
        if value.is_function() {
            return Ok(ScriptHandle::null());
        }
        let Some(object) = value.as_object() else {
            return Ok(ScriptHandle::null());
        };

        if let Some(array) = value.as_array() {
            return self.pull_array(ctx, array, depth);
        }
        // 只看自有属性，原型链上的下标不算
        let keys = stash::own_keys(ctx, object)?;
        if keys.iter().any(|key| key == "0") {
            return self.pull_indexed(ctx, object, &keys, depth);
        }
        self.pull_object(ctx, object, keys, depth)
    }

    fn pull_array<'js>(&self, ctx: &Ctx<'js>, array: &Array<'js>, depth: usize) -> rquickjs::Result<ScriptHandle> {
        let handle = ScriptHandle::new_array();
        for index in 0..array.len() {
            let item: Value = array.get(index)?;
            handle.append(self.pull_at(ctx, &item, depth + 1));
        }
        Ok(handle)
    }

    /// 带有从 0 开始的连续整数键的普通对象按数组读取
    fn pull_indexed<'js>(
        &self,
        ctx: &Ctx<'js>,
        object: &Object<'js>,
        keys: &[String],
        depth: usize,
    ) -> rquickjs::Result<ScriptHandle> {
        let own: HashSet<&str> = keys.iter().map(String::as_str).collect();
        let handle = ScriptHandle::new_array();
        let mut index = 0usize;
        loop {
            let key = index.to_string();
            if !own.contains(key.as_str()) {
                break;
            }
            let item: Value = object.get(key.as_str())?;
            handle.append(self.pull_at(ctx, &item, depth + 1));
            index += 1;
        }
        Ok(handle)
    }

    fn pull_object<'js>(
        &self,
        ctx: &Ctx<'js>,
        object: &Object<'js>,
        keys: Vec<String>,
        depth: usize,
    ) -> rquickjs::Result<ScriptHandle> {
        let handle = match stash::read_tag(object) {
            Some(tag) => ScriptHandle::tagged_object(tag),
            None => ScriptHandle::new_object(),
        };
        for key in keys {
            if stash::is_hidden_key(&key) {
                continue;
            }
            let field: Value = object.get(key.as_str())?;
            handle.insert(key, self.pull_at(ctx, &field, depth + 1));
        }
        Ok(handle)
    }

    fn push_at<'js>(&self, ctx: &Ctx<'js>, handle: &ScriptHandle, depth: usize) -> rquickjs::Result<Value<'js>> {
        if depth > self.max_depth {
            tracing::warn!(target: CHANNEL_SCRIPT, "value nested deeper than {} levels, truncated to null", self.max_depth);
            return Ok(Value::new_null(ctx.clone()));
        }
        let value = match &**handle {
            ScriptValue::Null => Value::new_null(ctx.clone()),
            ScriptValue::Boolean(b) => Value::new_bool(ctx.clone(), *b),
            ScriptValue::Number(n) => Value::new_number(ctx.clone(), *n),
            ScriptValue::String(s) => rquickjs::String::from_str(ctx.clone(), s)?.into_value(),
            ScriptValue::Array(items) => {
                let array = Array::new(ctx.clone())?;
                for (index, item) in items.items().iter().enumerate() {
                    array.set(index, self.push_at(ctx, item, depth + 1)?)?;
                }
                array.into_value()
            }
            ScriptValue::Object(fields) => {
                let (target, shared) = match fields.native_tag() {
                    Some(tag) => self.wrapper(ctx, tag)?,
                    None => (Object::new(ctx.clone())?, false),
                };
                // 共享的包装对象不被覆盖，字段只写到新建的对象上
                if !shared {
                    for (key, field) in fields.fields().iter() {
                        target.set(key.as_str(), self.push_at(ctx, field, depth + 1)?)?;
                    }
                }
                target.into_value()
            }
        };
        Ok(value)
    }

    /// 为原生对象取得包装对象，第二项表示是否为共享的缓存对象
    ///
    /// 原生持有的对象复用缓存中的包装对象。脚本持有的对象每次得到新的包装对象，
    /// 各自带一份租约，对象要等所有包装对象都被回收后才销毁。
    /// 已销毁的对象得到惰性的包装对象。
    fn wrapper<'js>(&self, ctx: &Ctx<'js>, tag: &NativeTag) -> rquickjs::Result<(Object<'js>, bool)> {
        match self.registry.ownership(tag.id) {
            Some(Ownership::NativeOwned) => Ok((stash::wrap(ctx, tag, true, None)?, true)),
            Some(Ownership::ScriptOwned) => {
                let finalizer = match self.registry.lease(tag.id) {
                    Some(lease) => Some(stash::finalizer(ctx, lease)?),
                    None => None,
                };
                Ok((stash::wrap(ctx, tag, false, finalizer)?, false))
            }
            None => Ok((stash::wrap(ctx, tag, false, None)?, false)),
        }
    }
}
