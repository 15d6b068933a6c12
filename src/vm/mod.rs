//! This module contains the runtime.
//!
//! A `Runtime` runs one container against an `Environment`,
//! which carries everything host-provided:
//! the shared script cache, plugins, translations, and a script provider.

pub mod cache;
pub mod environment;
pub mod plugin;
pub mod runtime;
pub mod scope;
pub mod trace;
pub mod translation;

pub use cache::{Resource, ScriptCache, ScriptProvider};
pub use environment::Environment;
pub use plugin::{Native, Pending, Plugin, PluginContext, PluginRegistry};
pub use runtime::{Finished, Runtime, State, Status, StopHandle};
pub use trace::{Fault, RuntimeError, TraceFrame};
pub use translation::Translator;
