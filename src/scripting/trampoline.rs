// ============================================================================
// 跳板
// 脚本 → 原生调用的唯一入口
// ============================================================================

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;

use rquickjs::function::{Rest, This};
use rquickjs::{Ctx, Exception, Function, Value};

use crate::core::logging::{CHANNEL_ERROR, CHANNEL_SCRIPT};
use crate::scripting::args::ScriptArgs;
use crate::scripting::registry::{Constructor, NativeFn, ScriptClass};
use crate::scripting::scope::{Bridge, ScriptScope};
use crate::scripting::stash;
use crate::scripting::value::NativeTag;

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message
    } else {
        "non-string panic payload"
    }
}

/// 运行原生代码，panic 视为绑定层缺陷：记录错误后按失败处理
fn guarded<R>(function: &str, run: impl FnOnce() -> Option<R>) -> Option<R> {
    match panic::catch_unwind(AssertUnwindSafe(run)) {
        Ok(result) => result,
        Err(payload) => {
            tracing::error!(
                target: CHANNEL_ERROR,
                "native function '{}' panicked (binding bug): {}",
                function,
                panic_message(payload.as_ref())
            );
            None
        }
    }
}

fn invoke<'js>(
    ctx: Ctx<'js>,
    bridge: &Rc<Bridge>,
    name: &str,
    function: NativeFn,
    this: Value<'js>,
    args: Vec<Value<'js>>,
) -> rquickjs::Result<Value<'js>> {
    let scope = ScriptScope::enter(ctx.clone(), Rc::clone(bridge));
    let mut frame = ScriptArgs::from_call(scope, name, &this, &args);

    let succeeded = guarded(name, || function(&mut frame).then_some(())).is_some();
    if !succeeded {
        // 失败不以异常形式进入脚本，调用结果为 undefined
        tracing::warn!(target: CHANNEL_SCRIPT, "native function '{}' failed", name);
        return Ok(Value::new_undefined(ctx));
    }
    frame.into_return(&ctx)
}

/// 为原生函数创建跳板
pub(crate) fn native_function<'js>(
    scope: &ScriptScope<'js>,
    name: String,
    function: NativeFn,
) -> rquickjs::Result<Function<'js>> {
    let bridge = Rc::clone(scope.bridge());
    Function::new(
        scope.ctx().clone(),
        move |ctx: Ctx<'js>, this: This<Value<'js>>, args: Rest<Value<'js>>| {
            invoke(ctx, &bridge, &name, function, this.0, args.0)
        },
    )
}

/// 为类创建构造跳板
///
/// 由引导脚本中的构造函数以 `construct.apply(this, arguments)` 调用，
/// 此时 `new` 已经校验过。构造成功后对象交给回收器，守卫挂在隐藏的终结器上。
pub(crate) fn constructor_function<'js, T: ScriptClass>(
    scope: &ScriptScope<'js>,
    constructor: Constructor<T>,
) -> rquickjs::Result<Function<'js>> {
    let bridge = Rc::clone(scope.bridge());
    let name = format!("new {}", T::NAME);
    Function::new(
        scope.ctx().clone(),
        move |ctx: Ctx<'js>, this: This<Value<'js>>, args: Rest<Value<'js>>| {
            construct::<T>(ctx, &bridge, &name, constructor, this.0, args.0)
        },
    )
}

fn construct<'js, T: ScriptClass>(
    ctx: Ctx<'js>,
    bridge: &Rc<Bridge>,
    name: &str,
    constructor: Constructor<T>,
    this: Value<'js>,
    args: Vec<Value<'js>>,
) -> rquickjs::Result<Value<'js>> {
    let Some(target) = this.as_object().cloned() else {
        return Err(Exception::throw_type(&ctx, &format!("{} requires an object receiver", name)));
    };

    let scope = ScriptScope::enter(ctx.clone(), Rc::clone(bridge));
    let undefined = Value::new_undefined(ctx.clone());
    let mut frame = ScriptArgs::from_call(scope, name, &undefined, &args);

    let Some(value) = guarded(name, || constructor(&mut frame)) else {
        // 未附加标记的对象是惰性的，方法调用都会按失败处理
        tracing::warn!(target: CHANNEL_SCRIPT, "{} failed, the new object is inert", name);
        return Ok(Value::new_undefined(ctx));
    };
    drop(frame);

    let (id, lease) = bridge.registry().adopt_script(value);
    let finalizer = stash::finalizer(&ctx, lease)?;
    stash::attach(&ctx, &target, &NativeTag::new(id, T::NAME), finalizer)?;
    Ok(Value::new_undefined(ctx))
}
