use thiserror::Error;

/// Errors raised while loading, filtering, or assembling views
#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed CSV in {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Invalid input: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, TrackerError>;
