//! 脚本侧簿记
//!
//! 运行时启动时安装一段引导脚本，在全局对象上放置一个不可枚举的
//! `__engine_stash`。桥接层对脚本堆的所有簿记（隐藏字段、类原型、
//! 原生对象包装缓存）都经由它完成。

use rquickjs::{Ctx, Function, Object, Value};

use crate::scripting::object::{ObjectId, ScriptLease};
use crate::scripting::value::NativeTag;

const BOOTSTRAP: &str = include_str!("bootstrap.js");

/// 簿记对象在全局对象上的名字
pub const STASH_GLOBAL: &str = "__engine_stash";

/// 包装对象上的隐藏字段
pub const ID_KEY: &str = "__engine_id";
pub const TYPE_KEY: &str = "__engine_type";
pub const FINALIZER_KEY: &str = "__engine_finalizer";

/// 桥接层内部名字的公共前缀
pub const INTERNAL_PREFIX: &str = "__engine";

/// 是否为隐藏簿记字段
pub fn is_hidden_key(key: &str) -> bool {
    key == ID_KEY || key == TYPE_KEY || key == FINALIZER_KEY
}

/// 安装引导脚本
pub(crate) fn install(ctx: &Ctx<'_>) -> rquickjs::Result<()> {
    ctx.eval::<(), _>(BOOTSTRAP)
}

fn helper<'js>(ctx: &Ctx<'js>, name: &str) -> rquickjs::Result<Function<'js>> {
    let stash: Object = ctx.globals().get(STASH_GLOBAL)?;
    stash.get(name)
}

/// 全部自有属性名，包括不可枚举的
pub(crate) fn own_keys<'js>(ctx: &Ctx<'js>, target: &Object<'js>) -> rquickjs::Result<Vec<String>> {
    helper(ctx, "ownKeys")?.call((target.clone(),))
}

/// 为原生对象创建包装对象
///
/// `cache` 为真时同一 id 总是返回同一个包装对象（原生持有的对象），
/// 直到 [`forget`] 将其移出缓存。
pub(crate) fn wrap<'js>(
    ctx: &Ctx<'js>,
    tag: &NativeTag,
    cache: bool,
    finalizer: Option<Function<'js>>,
) -> rquickjs::Result<Object<'js>> {
    helper(ctx, "wrap")?.call((tag.type_name.as_str(), tag.id.as_f64(), cache, finalizer))
}

/// 在 `new` 创建的对象上附加隐藏字段与终结器
pub(crate) fn attach<'js>(
    ctx: &Ctx<'js>,
    target: &Object<'js>,
    tag: &NativeTag,
    finalizer: Function<'js>,
) -> rquickjs::Result<()> {
    helper(ctx, "attach")?.call::<_, Value>((
        target.clone(),
        tag.type_name.as_str(),
        tag.id.as_f64(),
        finalizer,
    ))?;
    Ok(())
}

/// 持有租约的隐藏终结函数，随包装对象一起被回收
pub(crate) fn finalizer<'js>(ctx: &Ctx<'js>, lease: ScriptLease) -> rquickjs::Result<Function<'js>> {
    Function::new(ctx.clone(), move || lease.object_id().as_f64())
}

/// 清除已销毁对象的包装缓存
pub(crate) fn forget(ctx: &Ctx<'_>, ids: &[ObjectId]) -> rquickjs::Result<()> {
    let ids: Vec<f64> = ids.iter().map(|id| id.as_f64()).collect();
    helper(ctx, "forget")?.call::<_, ()>((ids,))
}

/// 安装类：可构造时生成构造函数，否则是普通命名空间对象
pub(crate) fn register_class<'js>(
    ctx: &Ctx<'js>,
    type_name: &str,
    construct: Option<Function<'js>>,
    methods: Object<'js>,
    enums: Object<'js>,
) -> rquickjs::Result<()> {
    helper(ctx, "registerClass")?.call::<_, Value>((type_name, construct, methods, enums))?;
    Ok(())
}

/// 读取包装对象上的原生标记
pub(crate) fn read_tag(target: &Object<'_>) -> Option<NativeTag> {
    let id = target.get::<_, Option<f64>>(ID_KEY).ok().flatten()?;
    let type_name = target.get::<_, Option<String>>(TYPE_KEY).ok().flatten()?;
    Some(NativeTag::new(ObjectId::from_f64(id)?, type_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rquickjs::{Context, Runtime};

    fn with_stash<F: for<'js> FnOnce(Ctx<'js>)>(f: F) {
        let runtime = Runtime::new().unwrap();
        let context = Context::full(&runtime).unwrap();
        context.with(|ctx| {
            install(&ctx).unwrap();
            f(ctx);
        });
    }

    #[test]
    fn test_stash_is_hidden() {
        with_stash(|ctx| {
            let keys: Vec<String> = ctx.eval("Object.keys(globalThis)").unwrap();
            assert!(!keys.iter().any(|k| k == STASH_GLOBAL));
            let present: bool = ctx.eval("typeof __engine_stash === 'object'").unwrap();
            assert!(present);
        });
    }

    #[test]
    fn test_cached_wrapper_identity() {
        with_stash(|ctx| {
            let tag = NativeTag::new(ObjectId::from_raw(4), "Widget");
            let a = wrap(&ctx, &tag, true, None).unwrap();
            let b = wrap(&ctx, &tag, true, None).unwrap();
            ctx.globals().set("a", a).unwrap();
            ctx.globals().set("b", b).unwrap();
            assert!(ctx.eval::<bool, _>("a === b").unwrap());
            assert_eq!(ctx.eval::<String, _>("String(a)").unwrap(), "[Engine Widget]");

            forget(&ctx, &[tag.id]).unwrap();
            let c = wrap(&ctx, &tag, true, None).unwrap();
            ctx.globals().set("c", c).unwrap();
            assert!(!ctx.eval::<bool, _>("a === c").unwrap());
        });
    }

    #[test]
    fn test_hidden_tag_round_trip() {
        with_stash(|ctx| {
            let tag = NativeTag::new(ObjectId::from_raw(9), "Widget");
            let wrapper = wrap(&ctx, &tag, false, None).unwrap();
            assert_eq!(read_tag(&wrapper), Some(tag));

            ctx.globals().set("w", wrapper).unwrap();
            let visible: Vec<String> = ctx.eval("Object.keys(w)").unwrap();
            assert!(visible.is_empty());
            let own: Vec<String> = ctx.eval("Object.getOwnPropertyNames(w)").unwrap();
            assert!(own.iter().all(|k| is_hidden_key(k)));
        });
    }
}
