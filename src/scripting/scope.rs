//! 进入运行时后的操作入口

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use rquickjs::{Ctx, Value};

use crate::config::ScriptConfig;
use crate::core::logging::{CHANNEL_ERROR, CHANNEL_LIFECYCLE};
use crate::core::{BridgeError, BridgeResult};
use crate::scripting::callback::ScriptCallback;
use crate::scripting::diagnostics::ScriptErrorReport;
use crate::scripting::marshal::Marshal;
use crate::scripting::object::{NativeObject, NativeRef, ObjectRegistry};
use crate::scripting::registry::{self, FunctionTable, ScriptClass, ScriptEnum};
use crate::scripting::stash;
use crate::scripting::value::{IntoHandle, ScriptHandle};

/// 运行时共享的桥接状态，被每个跳板函数持有
pub(crate) struct Bridge {
    registry: Rc<ObjectRegistry>,
    config: ScriptConfig,
    names: RefCell<HashSet<String>>,
}

impl Bridge {
    pub(crate) fn new(config: ScriptConfig) -> Self {
        Self {
            registry: Rc::new(ObjectRegistry::new()),
            config,
            names: RefCell::new(HashSet::new()),
        }
    }

    pub(crate) fn registry(&self) -> &Rc<ObjectRegistry> {
        &self.registry
    }

    pub(crate) fn config(&self) -> &ScriptConfig {
        &self.config
    }

    pub(crate) fn is_claimed(&self, name: &str) -> bool {
        self.names.borrow().contains(name)
    }

    pub(crate) fn claim(&self, name: &str) {
        self.names.borrow_mut().insert(name.to_string());
    }
}

/// 运行时作用域
///
/// 只在 `ScriptRuntime::with` 的闭包内或原生函数调用期间存在。
#[derive(Clone)]
pub struct ScriptScope<'js> {
    ctx: Ctx<'js>,
    bridge: Rc<Bridge>,
}

impl<'js> ScriptScope<'js> {
    /// 进入作用域，先清理已销毁原生对象的包装缓存
    pub(crate) fn enter(ctx: Ctx<'js>, bridge: Rc<Bridge>) -> Self {
        let released = bridge.registry.take_released();
        if !released.is_empty() {
            if let Err(err) = stash::forget(&ctx, &released) {
                tracing::debug!(target: CHANNEL_LIFECYCLE, "failed to drop {} stale wrappers: {}", released.len(), err);
            }
        }
        Self { ctx, bridge }
    }

    pub fn ctx(&self) -> &Ctx<'js> {
        &self.ctx
    }

    pub(crate) fn bridge(&self) -> &Rc<Bridge> {
        &self.bridge
    }

    pub fn registry(&self) -> &ObjectRegistry {
        &self.bridge.registry
    }

    pub fn config(&self) -> &ScriptConfig {
        &self.bridge.config
    }

    fn marshal(&self) -> Marshal<'_> {
        Marshal::new(&self.bridge.registry, self.bridge.config.marshal.max_depth)
    }

    /// 运行时值 → `ScriptHandle`
    pub fn pull(&self, value: &Value<'js>) -> ScriptHandle {
        self.marshal().pull(&self.ctx, value)
    }

    /// `ScriptHandle` → 运行时值
    pub fn push(&self, handle: &ScriptHandle) -> BridgeResult<Value<'js>> {
        self.marshal().push(&self.ctx, handle).map_err(|err| self.engine_error(err, None))
    }

    pub(crate) fn push_raw(&self, handle: &ScriptHandle) -> rquickjs::Result<Value<'js>> {
        self.marshal().push(&self.ctx, handle)
    }

    /// 执行代码并返回最后一个表达式的值
    pub fn eval(&self, source: &str) -> BridgeResult<ScriptHandle> {
        self.eval_named("script", source)
    }

    /// 执行代码，错误报告中以 `name` 作为文件名
    pub fn eval_named(&self, name: &str, source: &str) -> BridgeResult<ScriptHandle> {
        match self.ctx.eval::<Value, _>(source) {
            Ok(value) => Ok(self.pull(&value)),
            Err(err) => Err(self.engine_error(err, Some(name))),
        }
    }

    /// 读取全局变量，不存在时为 `Null`
    pub fn global(&self, name: &str) -> ScriptHandle {
        match self.ctx.globals().get::<_, Value>(name) {
            Ok(value) => self.pull(&value),
            Err(err) => {
                self.engine_error(err, None);
                ScriptHandle::null()
            }
        }
    }

    /// 设置全局变量
    pub fn set_global(&self, name: &str, value: impl IntoHandle) -> BridgeResult<()> {
        let value = self.push(&value.into_handle())?;
        self.ctx
            .globals()
            .set(name, value)
            .map_err(|err| self.engine_error(err, None))
    }

    /// 注册类
    pub fn register<T: ScriptClass>(&self) -> BridgeResult<()> {
        registry::register_class::<T>(self)
    }

    /// 注册自由函数
    pub fn register_functions(&self, namespace: Option<&str>, table: &FunctionTable) -> BridgeResult<()> {
        registry::register_functions(self, namespace, table)
    }

    /// 注册全局枚举
    pub fn register_enum<E: ScriptEnum>(&self) -> BridgeResult<()> {
        registry::register_enum(self, E::NAME, E::ENTRIES)
    }

    /// 以原生持有方式登记对象
    pub fn adopt<T: ScriptClass>(&self, value: T) -> NativeObject<T> {
        self.bridge.registry.adopt_native(value)
    }

    /// 按名字解析回调
    pub fn callback(&self, path: &str) -> ScriptCallback {
        ScriptCallback::from_global(self, path)
    }

    /// 取回值上标记的原生对象
    pub fn resolve<T: ScriptClass>(&self, handle: &ScriptHandle) -> Option<NativeRef<T>> {
        let tag = handle.native_tag()?;
        self.bridge.registry.resolve::<T>(tag)
    }

    /// 把运行时错误转换成 `BridgeError`，脚本异常同时记录到错误通道
    pub(crate) fn engine_error(&self, err: rquickjs::Error, chunk: Option<&str>) -> BridgeError {
        match err {
            rquickjs::Error::Exception => {
                let report = self.report_exception(chunk);
                tracing::error!(target: CHANNEL_ERROR, "{}", report);
                BridgeError::Script(report)
            }
            other => BridgeError::Engine(other),
        }
    }

    /// 取出挂起的异常
    pub(crate) fn report_exception(&self, chunk: Option<&str>) -> ScriptErrorReport {
        ScriptErrorReport::catch(&self.ctx, chunk, &self.bridge.config.diagnostics)
    }
}
