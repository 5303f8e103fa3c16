//! Error types for caption scoring.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EvalError>;

#[derive(Debug, Error)]
pub enum EvalError {
    /// A tuple had no tokens or more than three.
    #[error("Malformed tuple: expected 1 to 3 tokens, got {arity}")]
    MalformedTuple { arity: usize },

    #[error("Unknown category: '{0}'")]
    UnknownCategory(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The lexical database is missing and could not be provisioned.
    #[error("Lexical database unavailable: {0}")]
    LexiconUnavailable(String),

    #[error("Download failed: {0}")]
    Download(String),

    /// The external scorer (or the runtime it needs) is not installed.
    #[error("Dependency unavailable: {0}")]
    DependencyUnavailable(String),

    #[error("External process failed with exit code {code:?}: {output}")]
    ProcessFailed { code: Option<i32>, output: String },

    #[error("Malformed scorer output: {0}")]
    MalformedOutput(String),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("Token producer failed: {0}")]
    Producer(String),
}

impl EvalError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        EvalError::Io {
            path: path.into(),
            source,
        }
    }
}
