use conveyor_core::DefinitionError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while turning a plan file into a [`PipelinePlan`](conveyor_core::PipelinePlan)
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read plan {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("unsupported plan format for {}: expected a .lua or .json file", path.display())]
    UnsupportedFormat { path: PathBuf },

    #[error("plan script failed: {0}")]
    Script(String),

    #[error("plan script must return a table, got {0}")]
    NotATable(&'static str),

    #[error("malformed plan: {0}")]
    Malformed(String),

    #[error("invalid plan: {0}")]
    Definition(#[from] DefinitionError),
}

impl From<serde_json::Error> for LoadError {
    fn from(err: serde_json::Error) -> Self {
        LoadError::Malformed(err.to_string())
    }
}
