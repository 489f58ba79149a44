//! Error taxonomy for the instrumentation engine
//!
//! Only fatal conditions are errors. Join misses, untimed checkpoints and
//! over-wide checkpoints are data-quality or shape conditions: they are
//! counted in phase reports and logged, never returned from here.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that abort an engine invocation
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Timed execution configuration error: no {file_name} in {} or any parent directory", start.display())]
    ConfigNotFound { file_name: &'static str, start: PathBuf },

    #[error("Timed execution configuration error: {}: line {line} ({field}) is missing", path.display())]
    MissingField {
        path: PathBuf,
        line: usize,
        field: &'static str,
    },

    #[error("Timed execution configuration error: {}: line {line} ({field}) has invalid value {value:?}", path.display())]
    InvalidField {
        path: PathBuf,
        line: usize,
        field: &'static str,
        value: String,
    },

    #[error("Timed execution configuration error: unsupported mode {0}")]
    UnsupportedMode(i64),

    #[error("Timed execution configuration error: invalid option: {0}")]
    InvalidOption(String),

    #[error("Timed execution configuration error: required {kind} not found: {}", path.display())]
    MissingInput { kind: &'static str, path: PathBuf },

    #[error("{}:{line}: {reason}", path.display())]
    Malformed {
        path: PathBuf,
        line: usize,
        reason: String,
    },

    #[error("Invalid program: {0}")]
    InvalidProgram(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
