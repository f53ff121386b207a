//! Error types for the UFCNN pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the UFCNN pipeline.
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error (bad parameters, detected before any numeric work).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Normalizer source is neither an in-memory table nor a readable file.
    #[error("Input type error: {0}")]
    InputType(String),

    /// A file required by naming convention does not exist.
    #[error("Missing file: {}", .0.display())]
    MissingFile(PathBuf),

    /// Data error (malformed rows, misaligned indices, unknown columns).
    #[error("Data error: {0}")]
    Data(String),

    /// Tensor shape mismatch.
    #[error("Shape error: {0}")]
    Shape(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Delimited-text parsing error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Binary array encoding error.
    #[error("Encoding error: {0}")]
    Encoding(#[from] bincode::Error),
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create an input type error.
    pub fn input_type(msg: impl Into<String>) -> Self {
        Error::InputType(msg.into())
    }

    /// Create a missing file error.
    pub fn missing_file(path: impl Into<PathBuf>) -> Self {
        Error::MissingFile(path.into())
    }

    /// Create a data error.
    pub fn data(msg: impl Into<String>) -> Self {
        Error::Data(msg.into())
    }

    /// Create a shape error.
    pub fn shape(msg: impl Into<String>) -> Self {
        Error::Shape(msg.into())
    }

    /// Whether the error was raised by parameter validation.
    pub fn is_config(&self) -> bool {
        matches!(self, Error::Config(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_message() {
        let err = Error::missing_file("data/signal_20130729v.csv");
        assert_eq!(err.to_string(), "Missing file: data/signal_20130729v.csv");
    }

    #[test]
    fn test_is_config() {
        assert!(Error::config("bad ret_type").is_config());
        assert!(!Error::data("misaligned").is_config());
    }
}
