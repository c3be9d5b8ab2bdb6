//! 脚本值模型
//!
//! 跨越脚本边界的唯一数据形式。`ScriptHandle` 是对 `ScriptValue` 的共享引用，
//! 值的类型标签在构造后不可改变，转换总是产生新值。
//!
//! 对象与数组必须是树形结构：向容器插入其自身会被拒绝，但更深层的环无法在插入时
//! 发现，调用方需要自行保证。跨边界转换有深度上限（见 `MarshalConfig`）。

use std::cell::{Ref, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use crate::core::logging::CHANNEL_SCRIPT;
use crate::core::ConversionError;
use crate::scripting::object::ObjectId;

/// 值的类型标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    Boolean,
    Number,
    String,
    Object,
    Array,
}

impl ValueKind {
    /// 解析参数格式字符 (`N`/`B`/`S`/`O`/`A`)
    pub fn from_code(code: char) -> Option<Self> {
        match code {
            'N' => Some(ValueKind::Number),
            'B' => Some(ValueKind::Boolean),
            'S' => Some(ValueKind::String),
            'O' => Some(ValueKind::Object),
            'A' => Some(ValueKind::Array),
            _ => None,
        }
    }

    /// 对应的格式字符，Null 没有格式字符
    pub fn code(self) -> Option<char> {
        match self {
            ValueKind::Null => None,
            ValueKind::Boolean => Some('B'),
            ValueKind::Number => Some('N'),
            ValueKind::String => Some('S'),
            ValueKind::Object => Some('O'),
            ValueKind::Array => Some('A'),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ValueKind::Null => "Null",
            ValueKind::Boolean => "Boolean",
            ValueKind::Number => "Number",
            ValueKind::String => "String",
            ValueKind::Object => "Object",
            ValueKind::Array => "Array",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 原生对象标记
///
/// 让脚本侧对象"包装"一个原生对象，以便之后取回。它不是所有权引用：
/// 真正的对象保存在 `ObjectRegistry` 中，按 `id` 查找并校验类型。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NativeTag {
    pub id: ObjectId,
    pub type_name: String,
}

impl NativeTag {
    pub fn new(id: ObjectId, type_name: impl Into<String>) -> Self {
        Self {
            id,
            type_name: type_name.into(),
        }
    }
}

/// 对象值：有序的键值表，外加可选的原生对象标记
#[derive(Debug, Default)]
pub struct ObjectValue {
    fields: RefCell<BTreeMap<String, ScriptHandle>>,
    native: Option<NativeTag>,
}

impl ObjectValue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_native(tag: NativeTag) -> Self {
        Self {
            fields: RefCell::new(BTreeMap::new()),
            native: Some(tag),
        }
    }

    pub fn native_tag(&self) -> Option<&NativeTag> {
        self.native.as_ref()
    }

    pub fn get(&self, key: &str) -> Option<ScriptHandle> {
        self.fields.borrow().get(key).cloned()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.fields.borrow().contains_key(key)
    }

    pub fn fields(&self) -> Ref<'_, BTreeMap<String, ScriptHandle>> {
        self.fields.borrow()
    }

    pub fn len(&self) -> usize {
        self.fields.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.borrow().is_empty()
    }

    fn insert(&self, key: String, value: ScriptHandle) {
        self.fields.borrow_mut().insert(key, value);
    }
}

/// 数组值
#[derive(Debug, Default)]
pub struct ArrayValue {
    items: RefCell<Vec<ScriptHandle>>,
}

impl ArrayValue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, index: usize) -> Option<ScriptHandle> {
        self.items.borrow().get(index).cloned()
    }

    pub fn items(&self) -> Ref<'_, Vec<ScriptHandle>> {
        self.items.borrow()
    }

    pub fn len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.borrow().is_empty()
    }

    fn push(&self, value: ScriptHandle) {
        self.items.borrow_mut().push(value);
    }
}

/// 脚本值
#[derive(Debug)]
pub enum ScriptValue {
    Null,
    Boolean(bool),
    Number(f64),
    String(String),
    Object(ObjectValue),
    Array(ArrayValue),
}

impl ScriptValue {
    pub fn kind(&self) -> ValueKind {
        match self {
            ScriptValue::Null => ValueKind::Null,
            ScriptValue::Boolean(_) => ValueKind::Boolean,
            ScriptValue::Number(_) => ValueKind::Number,
            ScriptValue::String(_) => ValueKind::String,
            ScriptValue::Object(_) => ValueKind::Object,
            ScriptValue::Array(_) => ValueKind::Array,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ScriptValue::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ScriptValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            ScriptValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            ScriptValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&ObjectValue> {
        match self {
            ScriptValue::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ArrayValue> {
        match self {
            ScriptValue::Array(arr) => Some(arr),
            _ => None,
        }
    }

    pub fn native_tag(&self) -> Option<&NativeTag> {
        self.as_object().and_then(ObjectValue::native_tag)
    }
}

impl PartialEq for ScriptValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ScriptValue::Null, ScriptValue::Null) => true,
            (ScriptValue::Boolean(a), ScriptValue::Boolean(b)) => a == b,
            (ScriptValue::Number(a), ScriptValue::Number(b)) => a == b,
            (ScriptValue::String(a), ScriptValue::String(b)) => a == b,
            (ScriptValue::Object(a), ScriptValue::Object(b)) => {
                a.native == b.native && *a.fields.borrow() == *b.fields.borrow()
            }
            (ScriptValue::Array(a), ScriptValue::Array(b)) => {
                *a.items.borrow() == *b.items.borrow()
            }
            _ => false,
        }
    }
}

impl Serialize for ScriptValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            ScriptValue::Null => serializer.serialize_unit(),
            ScriptValue::Boolean(b) => serializer.serialize_bool(*b),
            ScriptValue::Number(n) => serializer.serialize_f64(*n),
            ScriptValue::String(s) => serializer.serialize_str(s),
            ScriptValue::Array(arr) => {
                let items = arr.items();
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items.iter() {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            // 原生标记不参与序列化
            ScriptValue::Object(obj) => {
                let fields = obj.fields();
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (key, value) in fields.iter() {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
        }
    }
}

impl fmt::Display for ScriptValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = serde_json::to_string(self).map_err(|_| fmt::Error)?;
        f.write_str(&text)
    }
}

/// 对 `ScriptValue` 的共享引用
#[derive(Debug, Clone)]
pub struct ScriptHandle(Rc<ScriptValue>);

impl ScriptHandle {
    /// 转换任意原生值；已经是 `ScriptHandle` 时原样返回，不做拷贝
    pub fn new(value: impl IntoHandle) -> Self {
        value.into_handle()
    }

    pub fn null() -> Self {
        Self(Rc::new(ScriptValue::Null))
    }

    pub fn boolean(value: bool) -> Self {
        Self(Rc::new(ScriptValue::Boolean(value)))
    }

    pub fn number(value: f64) -> Self {
        Self(Rc::new(ScriptValue::Number(value)))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self(Rc::new(ScriptValue::String(value.into())))
    }

    /// 空对象
    pub fn new_object() -> Self {
        Self(Rc::new(ScriptValue::Object(ObjectValue::new())))
    }

    /// 空数组
    pub fn new_array() -> Self {
        Self(Rc::new(ScriptValue::Array(ArrayValue::new())))
    }

    /// 带原生对象标记的空对象
    pub fn tagged_object(tag: NativeTag) -> Self {
        Self(Rc::new(ScriptValue::Object(ObjectValue::with_native(tag))))
    }

    /// 向对象插入字段，覆盖同名字段
    ///
    /// 目标不是对象、或插入的值就是目标自身时返回 false。
    pub fn insert(&self, key: impl Into<String>, value: impl IntoHandle) -> bool {
        let key = key.into();
        let value = value.into_handle();
        let Some(obj) = self.0.as_object() else {
            tracing::warn!(target: CHANNEL_SCRIPT, "insert('{}') on {} value", key, self.kind());
            return false;
        };
        if value.ptr_eq(self) {
            tracing::warn!(target: CHANNEL_SCRIPT, "refusing to insert object into itself under '{}'", key);
            return false;
        }
        obj.insert(key, value);
        true
    }

    /// 向数组末尾追加元素
    pub fn append(&self, value: impl IntoHandle) -> bool {
        let value = value.into_handle();
        let Some(arr) = self.0.as_array() else {
            tracing::warn!(target: CHANNEL_SCRIPT, "append() on {} value", self.kind());
            return false;
        };
        if value.ptr_eq(self) {
            tracing::warn!(target: CHANNEL_SCRIPT, "refusing to append array to itself");
            return false;
        }
        arr.push(value);
        true
    }

    /// 读取对象字段
    pub fn get(&self, key: &str) -> Option<ScriptHandle> {
        self.0.as_object().and_then(|obj| obj.get(key))
    }

    /// 读取数组元素
    pub fn at(&self, index: usize) -> Option<ScriptHandle> {
        self.0.as_array().and_then(|arr| arr.get(index))
    }

    /// 容器元素个数，非容器为 0
    pub fn len(&self) -> usize {
        match &*self.0 {
            ScriptValue::Object(obj) => obj.len(),
            ScriptValue::Array(arr) => arr.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 对象的全部键（有序）
    pub fn keys(&self) -> Vec<String> {
        self.0
            .as_object()
            .map(|obj| obj.fields().keys().cloned().collect())
            .unwrap_or_default()
    }

    /// 数组的全部元素
    pub fn items(&self) -> Vec<ScriptHandle> {
        self.0
            .as_array()
            .map(|arr| arr.items().clone())
            .unwrap_or_default()
    }

    pub fn ptr_eq(&self, other: &ScriptHandle) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// 深拷贝，原生标记按原样保留
    pub fn deep_copy(&self) -> ScriptHandle {
        match &*self.0 {
            ScriptValue::Null => ScriptHandle::null(),
            ScriptValue::Boolean(b) => ScriptHandle::boolean(*b),
            ScriptValue::Number(n) => ScriptHandle::number(*n),
            ScriptValue::String(s) => ScriptHandle::string(s.clone()),
            ScriptValue::Object(obj) => {
                let copy = match obj.native_tag() {
                    Some(tag) => ScriptHandle::tagged_object(tag.clone()),
                    None => ScriptHandle::new_object(),
                };
                for (key, value) in obj.fields().iter() {
                    copy.insert(key.clone(), value.deep_copy());
                }
                copy
            }
            ScriptValue::Array(arr) => {
                let copy = ScriptHandle::new_array();
                for item in arr.items().iter() {
                    copy.append(item.deep_copy());
                }
                copy
            }
        }
    }

    /// 转换为 JSON，非有限数值变为 null
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;

        match &*self.0 {
            ScriptValue::Null => Json::Null,
            ScriptValue::Boolean(b) => Json::Bool(*b),
            ScriptValue::Number(n) => serde_json::Number::from_f64(*n)
                .map(Json::Number)
                .unwrap_or(Json::Null),
            ScriptValue::String(s) => Json::String(s.clone()),
            ScriptValue::Array(arr) => Json::Array(arr.items().iter().map(|h| h.to_json()).collect()),
            ScriptValue::Object(obj) => Json::Object(
                obj.fields()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    /// 从 JSON 构造
    pub fn from_json(json: &serde_json::Value) -> ScriptHandle {
        use serde_json::Value as Json;

        match json {
            Json::Null => ScriptHandle::null(),
            Json::Bool(b) => ScriptHandle::boolean(*b),
            Json::Number(n) => n
                .as_f64()
                .map(ScriptHandle::number)
                .unwrap_or_else(ScriptHandle::null),
            Json::String(s) => ScriptHandle::string(s.clone()),
            Json::Array(items) => {
                let arr = ScriptHandle::new_array();
                for item in items {
                    arr.append(ScriptHandle::from_json(item));
                }
                arr
            }
            Json::Object(fields) => {
                let obj = ScriptHandle::new_object();
                for (key, value) in fields {
                    obj.insert(key.clone(), ScriptHandle::from_json(value));
                }
                obj
            }
        }
    }
}

impl Deref for ScriptHandle {
    type Target = ScriptValue;

    fn deref(&self) -> &ScriptValue {
        &self.0
    }
}

impl PartialEq for ScriptHandle {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || *self.0 == *other.0
    }
}

impl Serialize for ScriptHandle {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl fmt::Display for ScriptHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Default for ScriptHandle {
    fn default() -> Self {
        Self::null()
    }
}

/// 原生值 → `ScriptHandle`
pub trait IntoHandle {
    fn into_handle(self) -> ScriptHandle;
}

impl IntoHandle for ScriptHandle {
    fn into_handle(self) -> ScriptHandle {
        self
    }
}

impl IntoHandle for &ScriptHandle {
    fn into_handle(self) -> ScriptHandle {
        self.clone()
    }
}

impl IntoHandle for ScriptValue {
    fn into_handle(self) -> ScriptHandle {
        ScriptHandle(Rc::new(self))
    }
}

impl IntoHandle for bool {
    fn into_handle(self) -> ScriptHandle {
        ScriptHandle::boolean(self)
    }
}

macro_rules! impl_into_handle_number {
    ($($ty:ty),*) => {
        $(
            impl IntoHandle for $ty {
                fn into_handle(self) -> ScriptHandle {
                    ScriptHandle::number(self as f64)
                }
            }
        )*
    };
}

impl_into_handle_number!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64);

impl IntoHandle for &str {
    fn into_handle(self) -> ScriptHandle {
        ScriptHandle::string(self)
    }
}

impl IntoHandle for String {
    fn into_handle(self) -> ScriptHandle {
        ScriptHandle::string(self)
    }
}

impl IntoHandle for &String {
    fn into_handle(self) -> ScriptHandle {
        ScriptHandle::string(self.as_str())
    }
}

impl<T: IntoHandle> IntoHandle for Option<T> {
    fn into_handle(self) -> ScriptHandle {
        match self {
            Some(value) => value.into_handle(),
            None => ScriptHandle::null(),
        }
    }
}

impl<T: IntoHandle> IntoHandle for Vec<T> {
    fn into_handle(self) -> ScriptHandle {
        let arr = ScriptHandle::new_array();
        for item in self {
            arr.append(item);
        }
        arr
    }
}

/// `ScriptValue` → 原生值
pub trait FromScript: Sized {
    fn from_script(value: &ScriptValue) -> Result<Self, ConversionError>;
}

fn mismatch(expected: ValueKind, value: &ScriptValue) -> ConversionError {
    ConversionError::Mismatch {
        expected,
        found: value.kind(),
    }
}

impl FromScript for bool {
    fn from_script(value: &ScriptValue) -> Result<Self, ConversionError> {
        value.as_bool().ok_or_else(|| mismatch(ValueKind::Boolean, value))
    }
}

impl FromScript for f64 {
    fn from_script(value: &ScriptValue) -> Result<Self, ConversionError> {
        value.as_f64().ok_or_else(|| mismatch(ValueKind::Number, value))
    }
}

impl FromScript for f32 {
    fn from_script(value: &ScriptValue) -> Result<Self, ConversionError> {
        let n = value.as_f64().ok_or_else(|| mismatch(ValueKind::Number, value))?;
        if n.is_finite() && n.abs() > f32::MAX as f64 {
            return Err(ConversionError::OutOfRange {
                value: n,
                target: "f32",
            });
        }
        Ok(n as f32)
    }
}

macro_rules! impl_from_script_integer {
    ($($ty:ty),*) => {
        $(
            impl FromScript for $ty {
                fn from_script(value: &ScriptValue) -> Result<Self, ConversionError> {
                    let n = value.as_f64().ok_or_else(|| mismatch(ValueKind::Number, value))?;
                    let truncated = n.trunc();
                    // MAX as f64 rounds up to 2^bits for 64-bit types, so the
                    // conversion must survive the trip back to f64
                    if !n.is_finite() || (truncated as $ty) as f64 != truncated {
                        return Err(ConversionError::OutOfRange {
                            value: n,
                            target: stringify!($ty),
                        });
                    }
                    Ok(truncated as $ty)
                }
            }
        )*
    };
}

impl_from_script_integer!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

impl FromScript for String {
    fn from_script(value: &ScriptValue) -> Result<Self, ConversionError> {
        value
            .as_str()
            .map(str::to_owned)
            .ok_or_else(|| mismatch(ValueKind::String, value))
    }
}
