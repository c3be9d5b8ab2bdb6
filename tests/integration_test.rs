use std::cell::Cell;

use engine_script_bridge::scripting::{
    Constructor, EnumTable, FunctionTable, ScriptArgs, ScriptClass, ScriptHandle, ScriptRuntime,
    ValueKind,
};
use engine_script_bridge::BridgeError;

// ============================================================================
// 测试用类型
// ============================================================================

thread_local! {
    static LIVE: Cell<i64> = const { Cell::new(0) };
    static DROPPED: Cell<usize> = const { Cell::new(0) };
}

fn live() -> i64 {
    LIVE.with(|c| c.get())
}

fn dropped() -> usize {
    DROPPED.with(|c| c.get())
}

struct Vec2Like {
    x: f64,
    y: f64,
}

impl Vec2Like {
    fn new(x: f64, y: f64) -> Self {
        LIVE.with(|c| c.set(c.get() + 1));
        Self { x, y }
    }
}

impl Drop for Vec2Like {
    fn drop(&mut self) {
        LIVE.with(|c| c.set(c.get() - 1));
        DROPPED.with(|c| c.set(c.get() + 1));
    }
}

fn get_x(args: &mut ScriptArgs) -> bool {
    let Some(this) = args.get_self::<Vec2Like>() else {
        return false;
    };
    let x = this.borrow().x;
    args.add_return(x);
    true
}

fn set_x(args: &mut ScriptArgs) -> bool {
    if !args.check("N") {
        return false;
    }
    let Some(this) = args.get_self::<Vec2Like>() else {
        return false;
    };
    this.borrow_mut().x = args.get(0, 0.0);
    true
}

fn get_y(args: &mut ScriptArgs) -> bool {
    let Some(this) = args.get_self::<Vec2Like>() else {
        return false;
    };
    let y = this.borrow().y;
    args.add_return(y);
    true
}

fn set_y(args: &mut ScriptArgs) -> bool {
    if !args.check("N") {
        return false;
    }
    let Some(this) = args.get_self::<Vec2Like>() else {
        return false;
    };
    this.borrow_mut().y = args.get(0, 0.0);
    true
}

fn construct(_args: &mut ScriptArgs) -> Option<Vec2Like> {
    Some(Vec2Like::new(0.0, 0.0))
}

impl ScriptClass for Vec2Like {
    const NAME: &'static str = "Vec2Like";

    fn register_functions(table: &mut FunctionTable) {
        table
            .add("get_x", get_x)
            .add("set_x", set_x)
            .add("get_y", get_y)
            .add("set_y", set_y);
    }

    fn register_enums(table: &mut EnumTable) {
        table.add("Corner", &[("TopLeft", 0), ("BottomRight", 3)]);
    }

    fn constructor() -> Option<Constructor<Self>> {
        Some(construct)
    }
}

/// 非可构造类：只有静态函数
struct Clock;

fn clock_now(args: &mut ScriptArgs) -> bool {
    args.add_return(12.5);
    true
}

impl ScriptClass for Clock {
    const NAME: &'static str = "Clock";

    fn register_functions(table: &mut FunctionTable) {
        table.add("now", clock_now);
    }

    fn register_enums(_table: &mut EnumTable) {}
}

fn runtime() -> ScriptRuntime {
    let runtime = ScriptRuntime::new().unwrap();
    runtime.register::<Vec2Like>().unwrap();
    runtime
}

// ============================================================================
// 端到端
// ============================================================================

#[test]
fn test_vec2like_end_to_end() -> anyhow::Result<()> {
    let runtime = runtime();
    let result = runtime.eval("var v = new Vec2Like(); v.set_x(5); v.get_x();")?;
    assert_eq!(result, ScriptHandle::number(5.0));

    runtime.with(|scope| {
        let v = scope.global("v");
        let native = scope.resolve::<Vec2Like>(&v).expect("v wraps a Vec2Like");
        assert_eq!(native.borrow().x, 5.0);
        assert_eq!(native.borrow().y, 0.0);
    });
    Ok(())
}

#[test]
fn test_class_shape() -> anyhow::Result<()> {
    let runtime = runtime();
    assert_eq!(runtime.eval("String(new Vec2Like())")?.as_str(), Some("[Engine Vec2Like]"));
    assert_eq!(runtime.eval("Vec2Like.Corner.BottomRight")?.as_f64(), Some(3.0));
    assert_eq!(runtime.eval("typeof Vec2Like.get_x")?.as_str(), Some("function"));
    // 隐藏字段不可枚举
    assert_eq!(runtime.eval("Object.keys(new Vec2Like()).length")?.as_f64(), Some(0.0));
    assert!(matches!(runtime.eval("Vec2Like()"), Err(BridgeError::Script(_))));

    runtime.register::<Clock>()?;
    assert_eq!(runtime.eval("Clock.now()")?.as_f64(), Some(12.5));
    assert!(matches!(runtime.eval("new Clock()"), Err(BridgeError::Script(_))));
    Ok(())
}

#[test]
fn test_free_functions_and_enums() -> anyhow::Result<()> {
    fn add(args: &mut ScriptArgs) -> bool {
        if !args.check("NN") {
            return false;
        }
        let sum = args.get(0, 0.0) + args.get(1, 0.0);
        args.add_return(sum);
        true
    }

    fn nothing(_args: &mut ScriptArgs) -> bool {
        true
    }

    let runtime = runtime();
    let mut table = FunctionTable::new();
    table.add("add", add).add("nothing", nothing);
    runtime.register_functions(None, &table)?;
    runtime.register_functions(Some("Util"), &table)?;

    assert_eq!(runtime.eval("add(2, 3)")?.as_f64(), Some(5.0));
    assert_eq!(runtime.eval("Util.add(1, 1)")?.as_f64(), Some(2.0));
    assert_eq!(runtime.eval("typeof nothing()")?.as_str(), Some("undefined"));

    // 参数不符只记录诊断，脚本继续执行
    assert_eq!(runtime.eval("typeof add('2', 3)")?.as_str(), Some("undefined"));
    assert_eq!(runtime.eval("add('2', 3); 'continued'")?.as_str(), Some("continued"));

    // 重复注册
    assert!(matches!(
        runtime.register_functions(Some("Util"), &table),
        Err(BridgeError::Registration(_))
    ));
    assert!(matches!(runtime.register::<Vec2Like>(), Err(BridgeError::Registration(_))));
    Ok(())
}

// ============================================================================
// 生命周期
// ============================================================================

#[test]
fn test_script_owned_finalized_exactly_once() -> anyhow::Result<()> {
    let runtime = runtime();
    let live_before = live();
    let dropped_before = dropped();

    runtime.eval("var a = new Vec2Like(); var b = new Vec2Like(); a.set_x(1);")?;
    assert_eq!(live(), live_before + 2);
    assert_eq!(runtime.live_objects(), 2);

    runtime.eval("a = null;")?;
    runtime.collect_garbage();
    assert_eq!(dropped(), dropped_before + 1);
    assert_eq!(runtime.live_objects(), 1);

    runtime.collect_garbage();
    assert_eq!(dropped(), dropped_before + 1);

    drop(runtime);
    assert_eq!(dropped(), dropped_before + 2);
    assert_eq!(live(), live_before);
    Ok(())
}

#[test]
fn test_native_owned_wrapper_becomes_inert() -> anyhow::Result<()> {
    let runtime = runtime();
    let object = runtime.adopt(Vec2Like::new(7.0, 1.0));
    runtime.set_global("held", object.handle())?;

    assert_eq!(runtime.eval("held.get_x()")?.as_f64(), Some(7.0));
    // 同一原生对象总是得到同一个包装对象
    runtime.set_global("again", object.handle())?;
    assert_eq!(runtime.eval("held === again")?.as_bool(), Some(true));

    runtime.eval("held.set_x(9)")?;
    assert_eq!(object.borrow().x, 9.0);

    let dropped_before = dropped();
    drop(object);
    assert_eq!(dropped(), dropped_before + 1);
    assert_eq!(runtime.live_objects(), 0);

    // 失效的包装对象调用失败但不崩溃
    assert_eq!(runtime.eval("typeof held.get_x()")?.as_str(), Some("undefined"));
    assert_eq!(runtime.eval("held.set_x(1); 'still running'")?.as_str(), Some("still running"));
    // 原生对象只销毁一次
    runtime.collect_garbage();
    drop(runtime);
    assert_eq!(dropped(), dropped_before + 1);
    Ok(())
}

#[test]
fn test_returned_owned_object() -> anyhow::Result<()> {
    fn spawn(args: &mut ScriptArgs) -> bool {
        let x = args.get(0, 0.0);
        args.add_return_owned(Vec2Like::new(x, 0.0));
        true
    }

    let runtime = runtime();
    let mut table = FunctionTable::new();
    table.add("spawn", spawn);
    runtime.register_functions(None, &table)?;

    let dropped_before = dropped();
    assert_eq!(runtime.eval("spawn(4).get_x()")?.as_f64(), Some(4.0));
    runtime.collect_garbage();
    assert_eq!(dropped(), dropped_before + 1);
    assert_eq!(runtime.live_objects(), 0);
    Ok(())
}

fn keep(args: &mut ScriptArgs) -> bool {
    let Some(value) = args.get_handle(0) else {
        return false;
    };
    args.add_return(value);
    true
}

#[test]
fn test_script_owned_survives_native_round_trip() -> anyhow::Result<()> {
    let runtime = runtime();
    let mut table = FunctionTable::new();
    table.add("keep", keep);
    runtime.register_functions(None, &table)?;
    let dropped_before = dropped();

    // 原样返回的参数仍是同一个对象
    assert_eq!(runtime.eval("var o = new Vec2Like(); o.set_x(3); keep(o) === o")?.as_bool(), Some(true));

    // 另一个包装对象也让对象保持存活
    runtime.eval("var k = keep([o])[0]; o = null;")?;
    runtime.collect_garbage();
    assert_eq!(dropped(), dropped_before);
    assert_eq!(runtime.eval("k.get_x()")?.as_f64(), Some(3.0));

    // 宿主转交的句柄同样如此
    let held = runtime.get_global("k");
    runtime.set_global("again", held)?;
    runtime.eval("k = null;")?;
    runtime.collect_garbage();
    assert_eq!(dropped(), dropped_before);
    assert_eq!(runtime.eval("again.get_x()")?.as_f64(), Some(3.0));

    // 最后一个包装对象被回收后才销毁，且只销毁一次
    runtime.eval("again = null;")?;
    runtime.collect_garbage();
    assert_eq!(dropped(), dropped_before + 1);
    assert_eq!(runtime.live_objects(), 0);

    drop(runtime);
    assert_eq!(dropped(), dropped_before + 1);
    Ok(())
}

// ============================================================================
// 指针安全
// ============================================================================

struct Other;

impl ScriptClass for Other {
    const NAME: &'static str = "Other";
    fn register_functions(_table: &mut FunctionTable) {}
    fn register_enums(_table: &mut EnumTable) {}
}

#[test]
fn test_pointer_type_mismatch_is_rejected() -> anyhow::Result<()> {
    fn read_x(args: &mut ScriptArgs) -> bool {
        match args.get_pointer::<Vec2Like>(0) {
            Some(v) => {
                let x = v.borrow().x;
                args.add_return(x);
            }
            None => args.add_return(-1),
        }
        true
    }

    let runtime = runtime();
    let mut table = FunctionTable::new();
    table.add("read_x", read_x);
    runtime.register_functions(None, &table)?;

    let other = runtime.adopt(Other);
    runtime.set_global("other", other.handle())?;
    assert_eq!(runtime.eval("read_x(other)")?.as_f64(), Some(-1.0));

    // 伪造的隐藏字段也无法冒充
    let forged = "var fake = {}; Object.defineProperty(fake, '__engine_id', {value: 1}); \
                  Object.defineProperty(fake, '__engine_type', {value: 'Vec2Like'}); read_x(fake)";
    assert_eq!(runtime.eval(forged)?.as_f64(), Some(-1.0));

    assert_eq!(runtime.eval("var real = new Vec2Like(); real.set_x(2); read_x(real)")?.as_f64(), Some(2.0));
    assert_eq!(runtime.eval("read_x({x: 1})")?.as_f64(), Some(-1.0));
    Ok(())
}

// ============================================================================
// 回调
// ============================================================================

#[test]
fn test_callback_resolution() -> anyhow::Result<()> {
    let runtime = runtime();
    runtime.eval(
        "var received = [];
         function Exists(a, b, c) { received = [a, b, c]; return a + b; }
         var Game = { scale: 3, onTick: function (dt) { return dt * this.scale; } };",
    )?;

    let missing = runtime.callback("DoesNotExist");
    assert!(!missing.is_valid());
    assert!(!runtime.call(&missing, &[ScriptHandle::number(1.0)]));

    let exists = runtime.callback("Exists");
    assert!(exists.is_valid());
    let args = [ScriptHandle::number(1.0), ScriptHandle::number(2.0), ScriptHandle::string("three")];
    let result = runtime.call_with_result(&exists, &args).expect("callback succeeds");
    assert_eq!(result.as_f64(), Some(3.0));

    let received = runtime.get_global("received");
    assert_eq!(received.kind(), ValueKind::Array);
    assert_eq!(received.at(2).unwrap().as_str(), Some("three"));

    // 点分路径以所属对象为 this
    let tick = runtime.callback("Game.onTick");
    assert_eq!(runtime.call_with_result(&tick, &[ScriptHandle::number(2.0)]).unwrap().as_f64(), Some(6.0));

    assert!(!runtime.callback("Game.scale").is_valid());
    assert!(!runtime.callback("Game..onTick").is_valid());
    Ok(())
}

#[test]
fn test_callback_fails_closed() -> anyhow::Result<()> {
    let runtime = runtime();
    runtime.eval("function Later() { return 1; } function Throws() { throw new Error('bad'); }")?;

    let later = runtime.callback("Later");
    assert!(runtime.call(&later, &[]));

    runtime.eval("Later = undefined;")?;
    assert!(!runtime.call(&later, &[]));

    let throws = runtime.callback("Throws");
    assert!(throws.is_valid());
    runtime.with(|scope| match throws.try_call(scope, &[]) {
        Err(BridgeError::Script(report)) => assert_eq!(report.message, "Error: bad"),
        other => panic!("unexpected result: {:?}", other),
    });
    Ok(())
}

#[test]
fn test_native_calls_back_into_script() -> anyhow::Result<()> {
    fn each(args: &mut ScriptArgs) -> bool {
        let Some(name) = args.get_str(0).map(str::to_string) else {
            return false;
        };
        let callback = args.scope().callback(&name);
        let mut total = 0.0;
        for i in 0..3 {
            let Some(result) = callback.call_with_result(args.scope(), &[ScriptHandle::number(i as f64)]) else {
                return false;
            };
            total += result.as_f64().unwrap_or(0.0);
        }
        args.add_return(total);
        true
    }

    let runtime = runtime();
    let mut table = FunctionTable::new();
    table.add("each", each);
    runtime.register_functions(None, &table)?;
    runtime.eval("function double(n) { return n * 2; }")?;
    assert_eq!(runtime.eval("each('double')")?.as_f64(), Some(6.0));
    Ok(())
}

// ============================================================================
// 错误处理
// ============================================================================

#[test]
fn test_panicking_binding_is_contained() -> anyhow::Result<()> {
    fn explode(_args: &mut ScriptArgs) -> bool {
        panic!("binding bug");
    }

    let runtime = runtime();
    let mut table = FunctionTable::new();
    table.add("explode", explode);
    runtime.register_functions(None, &table)?;

    let caught = runtime.eval("try { explode(); 'not thrown' } catch (e) { 'thrown: ' + e.message }")?;
    assert_eq!(caught.as_str(), Some("not thrown"));
    assert_eq!(runtime.eval("typeof explode()")?.as_str(), Some("undefined"));
    assert_eq!(runtime.eval("1 + 2")?.as_f64(), Some(3.0));
    Ok(())
}
