//! Conveyor plan loading
//!
//! Turns `.lua` and `.json` plan files into validated
//! [`PipelinePlan`](conveyor_core::PipelinePlan)s. Lua plans are evaluated in
//! a sandbox that only exposes the `pipeline`, `env` and `log` modules.

pub mod error;
pub mod loader;
pub mod module;
pub mod modules;
pub mod parser;
pub mod sandbox;

pub use error::LoadError;
pub use loader::{Loader, PlanFormat};
pub use module::{ModuleRegistry, PlanModule};
pub use modules::{EnvModule, LogModule, LogSink, MapVarProvider, TracingLogSink, VarProvider};
pub use sandbox::{PipelineModule, create_sandbox};
