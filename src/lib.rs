//! # Engine Script Bridge
//!
//! Interop layer between native engine code and an embedded JavaScript runtime
//! (QuickJS via `rquickjs`).
//!
//! ## Features
//!
//! - **Value Model**: tagged, reference-counted values shared across the boundary
//! - **Argument Protocol**: format-checked arguments, typed getters, a single return slot
//! - **Object Lifecycle**: native-owned and script-owned objects behind an id registry
//! - **Registration**: classes, free functions and enums through the `ScriptClass` trait
//! - **Callbacks**: name-bound script functions invoked from native code
//! - **Diagnostics**: script errors reported with internal stack frames removed
//!
//! ### Example
//!
//! ```ignore
//! use engine_script_bridge::scripting::ScriptRuntime;
//!
//! let runtime = ScriptRuntime::new()?;
//! runtime.with(|scope| engine_script_bridge::bindings::register_all(scope))?;
//! let length = runtime.eval("new Vec2(3, 4).length()")?;
//! assert_eq!(length.as_f64(), Some(5.0));
//! ```
//!
//! ## Modules
//!
//! - [`core`]: errors, logging channels, macros
//! - [`config`]: runtime, marshal, diagnostics and logging configuration
//! - [`scripting`]: the bridge itself
//! - [`bindings`]: engine functionality exposed to scripts

/// Errors, logging and shared macros
pub mod core;
/// Configuration loading and validation
pub mod config;
/// The script bridge
pub mod scripting;
/// Built-in engine bindings
pub mod bindings;

pub use crate::core::{BridgeError, BridgeResult};
pub use crate::scripting::{ScriptHandle, ScriptRuntime, ScriptValue};
