//! Log domain types

use serde::{Deserialize, Serialize};

/// Severity of a message emitted by a plan script
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Debug,
    Info,
    Warning,
    Error,
}
