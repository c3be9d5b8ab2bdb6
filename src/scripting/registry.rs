// ============================================================================
// 注册
// 类、自由函数、枚举写入脚本全局命名空间
// ============================================================================

use rquickjs::{Ctx, Object};

use crate::core::logging::CHANNEL_SCRIPT;
use crate::core::{BridgeError, BridgeResult};
use crate::scripting::args::ScriptArgs;
use crate::scripting::scope::ScriptScope;
use crate::scripting::stash::{self, INTERNAL_PREFIX};
use crate::scripting::trampoline;

/// 原生函数：成功返回 true；失败返回 false，记录诊断后脚本侧得到 undefined
pub type NativeFn = fn(&mut ScriptArgs<'_>) -> bool;

/// 脚本侧构造函数：返回 None 表示构造失败，`new` 得到的对象不关联任何原生对象
pub type Constructor<T> = fn(&mut ScriptArgs<'_>) -> Option<T>;

/// 脚本数值可以精确表示的整数上界 (2^53，比 `Number.MAX_SAFE_INTEGER` 大一)
pub const MAX_EXACT_INTEGER: i64 = 1 << 53;

/// 脚本可见的原生类型
///
/// 这是注册的全部契约：名字、函数表、枚举表，以及可选的构造函数。
/// 未提供构造函数的类在脚本中只是一个带函数表的命名空间对象。
pub trait ScriptClass: Sized + 'static {
    /// 脚本中的全局名
    const NAME: &'static str;

    fn register_functions(table: &mut FunctionTable);

    fn register_enums(table: &mut EnumTable);

    /// 响应脚本 `new` 表达式的构造函数
    fn constructor() -> Option<Constructor<Self>> {
        None
    }
}

/// 以数值形式跨越边界的枚举，通常由 `script_enum!` 生成
pub trait ScriptEnum: Sized + Copy + 'static {
    const NAME: &'static str;
    const ENTRIES: &'static [(&'static str, i64)];

    fn to_number(self) -> i64;

    fn from_number(value: i64) -> Option<Self>;
}

/// 是否为合法的注册名：脚本标识符，且不占用内部前缀或保留名
pub fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !(first.is_ascii_alphabetic() || first == '_' || first == '$') {
        return false;
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$') {
        return false;
    }
    !name.starts_with(INTERNAL_PREFIX) && name != "constructor" && name != "prototype"
}

/// 有序函数表
#[derive(Default, Clone)]
pub struct FunctionTable {
    entries: Vec<(&'static str, NativeFn)>,
}

impl FunctionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加函数
    ///
    /// # Panics
    ///
    /// 名字为空、不是合法标识符或重复时触发断言。
    pub fn add(&mut self, name: &'static str, function: NativeFn) -> &mut Self {
        assert!(is_valid_name(name), "invalid script function name '{}'", name);
        assert!(
            !self.entries.iter().any(|(existing, _)| *existing == name),
            "duplicate script function '{}'",
            name
        );
        self.entries.push((name, function));
        self
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, NativeFn)> + '_ {
        self.entries.iter().copied()
    }
}

impl std::fmt::Debug for FunctionTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.entries.iter().map(|(name, _)| name)).finish()
    }
}

/// 一个枚举的定义
#[derive(Debug, Clone, PartialEq)]
pub struct EnumDef {
    pub name: &'static str,
    pub entries: &'static [(&'static str, i64)],
}

/// 类内嵌的枚举表
#[derive(Debug, Default, Clone)]
pub struct EnumTable {
    enums: Vec<EnumDef>,
}

impl EnumTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加枚举
    ///
    /// # Panics
    ///
    /// 名字非法、重复，或条目为空、条目名非法、条目名重复时触发断言。
    pub fn add(&mut self, name: &'static str, entries: &'static [(&'static str, i64)]) -> &mut Self {
        assert_enum_well_formed(name, entries);
        assert!(
            !self.enums.iter().any(|def| def.name == name),
            "duplicate script enum '{}'",
            name
        );
        self.enums.push(EnumDef { name, entries });
        self
    }

    /// 添加 `ScriptEnum` 类型
    pub fn add_enum<E: ScriptEnum>(&mut self) -> &mut Self {
        self.add(E::NAME, E::ENTRIES)
    }

    pub fn len(&self) -> usize {
        self.enums.len()
    }

    pub fn is_empty(&self) -> bool {
        self.enums.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &EnumDef> {
        self.enums.iter()
    }
}

fn assert_enum_well_formed(name: &str, entries: &[(&str, i64)]) {
    assert!(is_valid_name(name), "invalid script enum name '{}'", name);
    assert!(!entries.is_empty(), "script enum '{}' has no entries", name);
    for (index, (key, _)) in entries.iter().enumerate() {
        assert!(is_valid_name(key), "invalid entry '{}' in script enum '{}'", key, name);
        assert!(
            !entries[..index].iter().any(|(other, _)| other == key),
            "duplicate entry '{}' in script enum '{}'",
            key,
            name
        );
    }
}

/// 构造枚举对象，超出精确整数范围的条目记录错误后跳过
fn build_enum<'js>(ctx: &Ctx<'js>, name: &str, entries: &[(&str, i64)]) -> rquickjs::Result<Object<'js>> {
    let object = Object::new(ctx.clone())?;
    for (key, value) in entries {
        if value.unsigned_abs() > MAX_EXACT_INTEGER as u64 {
            tracing::error!(target: CHANNEL_SCRIPT, "{}.{} = {} cannot be represented exactly in script, skipped", name, key, value);
            continue;
        }
        object.set(*key, *value as f64)?;
    }
    Ok(object)
}

fn claim_name(scope: &ScriptScope<'_>, name: &str) -> BridgeResult<()> {
    if !is_valid_name(name) {
        return Err(BridgeError::Registration(format!("'{}' is not a valid script name", name)));
    }
    if scope.bridge().is_claimed(name) || scope.ctx().globals().contains_key(name)? {
        return Err(BridgeError::Registration(format!("'{}' is already registered", name)));
    }
    scope.bridge().claim(name);
    Ok(())
}

/// 注册类
pub(crate) fn register_class<T: ScriptClass>(scope: &ScriptScope<'_>) -> BridgeResult<()> {
    claim_name(scope, T::NAME)?;
    let ctx = scope.ctx();

    let mut functions = FunctionTable::new();
    T::register_functions(&mut functions);
    let mut enums = EnumTable::new();
    T::register_enums(&mut enums);

    let methods = Object::new(ctx.clone())?;
    for (name, function) in functions.iter() {
        let qualified = format!("{}.{}", T::NAME, name);
        methods.set(name, trampoline::native_function(scope, qualified, function)?)?;
    }

    let enum_objects = Object::new(ctx.clone())?;
    for def in enums.iter() {
        enum_objects.set(def.name, build_enum(ctx, def.name, def.entries)?)?;
    }

    let construct = match T::constructor() {
        Some(constructor) => Some(trampoline::constructor_function::<T>(scope, constructor)?),
        None => None,
    };
    let constructable = construct.is_some();
    stash::register_class(ctx, T::NAME, construct, methods, enum_objects)?;

    tracing::debug!(
        target: CHANNEL_SCRIPT,
        "registered class {} ({} functions, {} enums, constructable: {})",
        T::NAME,
        functions.len(),
        enums.len(),
        constructable
    );
    Ok(())
}

/// 注册自由函数，`namespace` 给出时挂在同名全局对象下（不存在则创建）
pub(crate) fn register_functions(
    scope: &ScriptScope<'_>,
    namespace: Option<&str>,
    table: &FunctionTable,
) -> BridgeResult<()> {
    let ctx = scope.ctx();
    let globals = ctx.globals();

    let target = match namespace {
        None => globals.clone(),
        Some(name) => {
            if !is_valid_name(name) {
                return Err(BridgeError::Registration(format!("'{}' is not a valid script name", name)));
            }
            let existing: rquickjs::Value = globals.get(name)?;
            if existing.is_undefined() {
                let object = Object::new(ctx.clone())?;
                globals.set(name, object.clone())?;
                object
            } else if let Some(object) = existing.as_object().filter(|_| !existing.is_function()) {
                object.clone()
            } else {
                return Err(BridgeError::Registration(format!(
                    "global '{}' exists and is not a namespace object",
                    name
                )));
            }
        }
    };

    for (name, function) in table.iter() {
        if target.contains_key(name)? {
            return Err(BridgeError::Registration(match namespace {
                Some(ns) => format!("'{}.{}' is already registered", ns, name),
                None => format!("'{}' is already registered", name),
            }));
        }
        let qualified = match namespace {
            Some(ns) => format!("{}.{}", ns, name),
            None => name.to_string(),
        };
        target.set(name, trampoline::native_function(scope, qualified, function)?)?;
    }
    Ok(())
}

/// 注册全局枚举对象
pub(crate) fn register_enum(
    scope: &ScriptScope<'_>,
    name: &'static str,
    entries: &'static [(&'static str, i64)],
) -> BridgeResult<()> {
    if entries.is_empty() || entries.iter().any(|(key, _)| !is_valid_name(key)) {
        return Err(BridgeError::Registration(format!("enum '{}' has malformed entries", name)));
    }
    claim_name(scope, name)?;
    let object = build_enum(scope.ctx(), name, entries)?;
    scope.ctx().globals().set(name, object)?;
    Ok(())
}
