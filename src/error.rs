//! Error types for the microviz library.

use thiserror::Error;

/// Main error type for the library.
#[derive(Error, Debug)]
pub enum MicrovizError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("No abundance table for study '{study}' at rank '{rank}' under {dir}")]
    MissingFile {
        study: String,
        rank: String,
        dir: String,
    },

    #[error("Empty data: {0}")]
    EmptyData(String),

    #[error("Insufficient samples: found {found}, need at least 2")]
    InsufficientSamples { found: usize },

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Missing column '{0}'")]
    MissingColumn(String),

    #[error("GraphML error: {0}")]
    Graphml(String),

    #[error("Numerical error: {0}")]
    Numerical(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("YAML serialization error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, MicrovizError>;
