// ============================================================================
// 脚本运行时
// 持有运行时与上下文，安装桥接层并提供宿主侧入口
// ============================================================================

use std::rc::Rc;

use rquickjs::{Context, Runtime};
use serde::Serialize;

use crate::config::ScriptConfig;
use crate::core::logging::CHANNEL_SCRIPT;
use crate::core::BridgeResult;
use crate::scripting::callback::ScriptCallback;
use crate::scripting::object::NativeObject;
use crate::scripting::registry::{FunctionTable, ScriptClass, ScriptEnum};
use crate::scripting::scope::{Bridge, ScriptScope};
use crate::scripting::stash;
use crate::scripting::value::{IntoHandle, ScriptHandle};

/// 内存统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MemoryStats {
    /// 运行时向分配器申请的字节数
    pub allocated_bytes: u64,
    /// 运行时实际使用的字节数
    pub used_bytes: u64,
    /// 配置的内存上限，0 表示不限
    pub memory_limit: u64,
    /// 脚本堆中的对象数
    pub script_objects: u64,
    /// 登记表中的原生对象数
    pub native_objects: u64,
}

/// 脚本运行时
///
/// 单线程，不可跨线程传递。字段顺序决定析构顺序：上下文和运行时先于桥接状态释放，
/// 此时仍被脚本持有的对象经由终结器销毁。
pub struct ScriptRuntime {
    context: Context,
    runtime: Runtime,
    bridge: Rc<Bridge>,
}

impl ScriptRuntime {
    /// 以默认配置创建
    pub fn new() -> BridgeResult<Self> {
        Self::with_config(ScriptConfig::default())
    }

    /// 以指定配置创建
    pub fn with_config(config: ScriptConfig) -> BridgeResult<Self> {
        config.validate()?;

        let runtime = Runtime::new()?;
        if config.runtime.memory_limit > 0 {
            runtime.set_memory_limit(config.runtime.memory_limit);
        }
        if config.runtime.max_stack_size > 0 {
            runtime.set_max_stack_size(config.runtime.max_stack_size);
        }
        if config.runtime.gc_threshold > 0 {
            runtime.set_gc_threshold(config.runtime.gc_threshold);
        }

        let context = Context::full(&runtime)?;
        context.with(|ctx| stash::install(&ctx))?;

        tracing::info!(
            target: CHANNEL_SCRIPT,
            "script runtime ready (memory limit: {} bytes, max depth: {})",
            config.runtime.memory_limit,
            config.marshal.max_depth
        );

        Ok(Self {
            context,
            runtime,
            bridge: Rc::new(Bridge::new(config)),
        })
    }

    /// 进入运行时
    pub fn with<F, R>(&self, f: F) -> R
    where
        F: for<'js> FnOnce(&ScriptScope<'js>) -> R,
    {
        self.context.with(|ctx| {
            let scope = ScriptScope::enter(ctx, Rc::clone(&self.bridge));
            f(&scope)
        })
    }

    pub fn config(&self) -> &ScriptConfig {
        self.bridge.config()
    }

    pub fn eval(&self, source: &str) -> BridgeResult<ScriptHandle> {
        self.with(|scope| scope.eval(source))
    }

    pub fn eval_named(&self, name: &str, source: &str) -> BridgeResult<ScriptHandle> {
        self.with(|scope| scope.eval_named(name, source))
    }

    pub fn register<T: ScriptClass>(&self) -> BridgeResult<()> {
        self.with(|scope| scope.register::<T>())
    }

    pub fn register_functions(&self, namespace: Option<&str>, table: &FunctionTable) -> BridgeResult<()> {
        self.with(|scope| scope.register_functions(namespace, table))
    }

    pub fn register_enum<E: ScriptEnum>(&self) -> BridgeResult<()> {
        self.with(|scope| scope.register_enum::<E>())
    }

    /// 以原生持有方式登记对象，不需要进入运行时
    pub fn adopt<T: ScriptClass>(&self, value: T) -> NativeObject<T> {
        self.bridge.registry().adopt_native(value)
    }

    pub fn callback(&self, path: &str) -> ScriptCallback {
        self.with(|scope| scope.callback(path))
    }

    pub fn call(&self, callback: &ScriptCallback, args: &[ScriptHandle]) -> bool {
        self.with(|scope| callback.call(scope, args))
    }

    pub fn call_with_result(&self, callback: &ScriptCallback, args: &[ScriptHandle]) -> Option<ScriptHandle> {
        self.with(|scope| callback.call_with_result(scope, args))
    }

    pub fn get_global(&self, name: &str) -> ScriptHandle {
        self.with(|scope| scope.global(name))
    }

    pub fn set_global(&self, name: &str, value: impl IntoHandle) -> BridgeResult<()> {
        let value = value.into_handle();
        self.with(|scope| scope.set_global(name, value))
    }

    /// 运行一次完整的垃圾回收，并清理失效的包装缓存
    pub fn collect_garbage(&self) {
        self.with(|_| ());
        self.runtime.run_gc();
    }

    pub fn memory_stats(&self) -> MemoryStats {
        let usage = self.runtime.memory_usage();
        MemoryStats {
            allocated_bytes: usage.malloc_size as u64,
            used_bytes: usage.memory_used_size as u64,
            memory_limit: self.bridge.config().runtime.memory_limit as u64,
            script_objects: usage.obj_count as u64,
            native_objects: self.bridge.registry().live_objects() as u64,
        }
    }

    /// 当前登记的原生对象数
    pub fn live_objects(&self) -> usize {
        self.bridge.registry().live_objects()
    }
}
