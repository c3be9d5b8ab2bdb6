//! 脚本桥
//!
//! 原生代码与嵌入式 JavaScript 运行时 (QuickJS) 之间的数据交换与互相调用。
//!
//! - `value` / `marshal` - 跨边界的值模型及其读写
//! - `args` - 原生函数的参数/返回值协议
//! - `object` / `registry` / `stash` - 原生对象生命周期与注册
//! - `trampoline` / `callback` - 双向调用
//! - `diagnostics` - 脚本错误报告
//! - `engine` / `scope` - 宿主侧入口

pub mod args;
pub mod callback;
pub mod diagnostics;
pub mod engine;
pub mod marshal;
pub mod object;
pub mod registry;
pub mod scope;
pub mod stash;
pub mod value;

mod trampoline;

pub use args::ScriptArgs;
pub use callback::ScriptCallback;
pub use diagnostics::{ScriptErrorReport, StackFrame};
pub use engine::{MemoryStats, ScriptRuntime};
pub use marshal::Marshal;
pub use object::{
    FinalizerGuard, NativeObject, NativeRef, ObjectId, ObjectRegistry, Ownership, ScriptLease,
};
pub use registry::{Constructor, EnumTable, FunctionTable, NativeFn, ScriptClass, ScriptEnum};
pub use scope::ScriptScope;
pub use value::{FromScript, IntoHandle, NativeTag, ScriptHandle, ScriptValue, ValueKind};
