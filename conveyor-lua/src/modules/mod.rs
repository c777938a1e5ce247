//! Modules available to plan scripts besides `pipeline`

pub mod env;
pub mod log;

pub use env::{EnvModule, MapVarProvider, VarProvider};
pub use log::{LogModule, LogSink, TracingLogSink};
