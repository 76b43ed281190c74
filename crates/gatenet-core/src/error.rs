//! Error types for gated convolution networks.

use thiserror::Error;

/// Gating-related errors.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GateError {
    /// Unrecognized gated convolution policy
    #[error("Unrecognized gated convolution policy: {0}")]
    PolicyType(String),

    /// Policy used with a layer setup it does not support
    #[error("Gate policy error: {0}")]
    Policy(String),

    /// Incorrect parameter value
    #[error("Gate parameter error: {0}")]
    ParameterValue(String),

    /// Unrecognized granularity
    #[error("Unrecognized granularity {0:?}")]
    Granularity(String),
}

/// Main error type for gatenet.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Gating error
    #[error(transparent)]
    Gate(#[from] GateError),

    /// Image processing error
    #[error("Image processing error: {0}")]
    Image(String),

    /// Model error
    #[error("Model error: {0}")]
    Model(String),

    /// Dataset error
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Checkpoint error
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    /// Evaluation error
    #[error("Evaluation error: {0}")]
    Evaluation(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Invalid argument error
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Not found error
    #[error("Not found: {0}")]
    NotFound(String),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::Image(err.to_string())
    }
}

/// Specialized Result type for gatenet operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Model("test error".to_string());
        assert_eq!(err.to_string(), "Model error: test error");
    }

    #[test]
    fn test_gate_error_is_transparent() {
        let err: Error = GateError::Granularity("height".to_string()).into();
        assert_eq!(err.to_string(), "Unrecognized granularity \"height\"");
        assert!(matches!(err, Error::Gate(GateError::Granularity(_))));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_toml_error_conversion() {
        let parse: std::result::Result<toml::Value, _> = toml::from_str("= broken");
        let err: Error = parse.unwrap_err().into();
        assert!(matches!(err, Error::Config(_)));
    }
}
