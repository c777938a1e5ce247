//! `log` module: lets plan scripts emit diagnostics while they are loaded

use crate::module::PlanModule;
use conveyor_core::domain::log::LogLevel;
use mlua::prelude::*;
use std::sync::Arc;

/// Destination of messages logged by plan scripts
pub trait LogSink: Send + Sync {
    fn write(&self, level: LogLevel, message: &str);
}

/// Forwards plan-script messages to `tracing` under the `conveyor::plan` target
#[derive(Debug, Clone, Default)]
pub struct TracingLogSink {
    chunk: Option<String>,
}

impl TracingLogSink {
    /// Tags every message with the script it came from
    pub fn for_chunk(chunk: impl Into<String>) -> Self {
        Self {
            chunk: Some(chunk.into()),
        }
    }
}

impl LogSink for TracingLogSink {
    fn write(&self, level: LogLevel, message: &str) {
        let chunk = self.chunk.as_deref().unwrap_or("plan");
        match level {
            LogLevel::Debug => tracing::debug!(target: "conveyor::plan", chunk, "{}", message),
            LogLevel::Info => tracing::info!(target: "conveyor::plan", chunk, "{}", message),
            LogLevel::Warning => tracing::warn!(target: "conveyor::plan", chunk, "{}", message),
            LogLevel::Error => tracing::error!(target: "conveyor::plan", chunk, "{}", message),
        }
    }
}

pub struct LogModule<S: LogSink> {
    sink: Arc<S>,
}

impl<S: LogSink> LogModule<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink: Arc::new(sink),
        }
    }
}

const LEVELS: [(&str, LogLevel); 4] = [
    ("debug", LogLevel::Debug),
    ("info", LogLevel::Info),
    ("warning", LogLevel::Warning),
    ("error", LogLevel::Error),
];

impl<S: LogSink + 'static> PlanModule for LogModule<S> {
    fn id(&self) -> &'static str {
        "log"
    }

    fn register(&self, lua: &Lua) -> LuaResult<()> {
        let log = lua.create_table()?;

        for (name, level) in LEVELS {
            let sink = Arc::clone(&self.sink);
            log.set(
                name,
                lua.create_function(move |_, message: LuaValue| {
                    let text = match message {
                        LuaValue::String(s) => s.to_string_lossy(),
                        other => format!("{:?}", other),
                    };
                    sink.write(level, &text);
                    Ok(())
                })?,
            )?;
        }

        lua.globals().set(self.id(), log)
    }

    fn stubs(&self) -> String {
        let mut stubs = String::from(
            "---@meta\n\n---Diagnostics printed while the plan is loaded\n---@class log\nlog = {}\n",
        );
        for (name, _) in LEVELS {
            stubs.push_str(&format!("\n---@param message string\nfunction log.{}(message) end\n", name));
        }
        stubs
    }
}
