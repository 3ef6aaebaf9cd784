//! Error types for bucle

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch {
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("{0} backend is not available")]
    BackendUnavailable(String),

    #[error("Distributed error: {0}")]
    Distributed(String),

    #[error("Unknown metric: {0}")]
    UnknownMetric(String),

    #[error("Missing parameter in state dict: {0}")]
    MissingParameter(String),

    #[error("Collate error: {0}")]
    Collate(String),
}

pub type Result<T> = std::result::Result<T, Error>;
