// src/utils/error.rs
use std::io;
use thiserror::Error;

/// Main error type for the mining application
///
/// Recoverable errors (network hiccups, malformed job fields) are retried
/// or ignored inside the component that hit them; only liveness-root
/// exhaustion and logic faults are allowed to reach `main`.
#[derive(Error, Debug)]
pub enum MinerError {
    /// Errors related to mining algorithms or compute backends
    #[error("Algorithm error: {0}")]
    AlgorithmError(String),

    /// Errors related to network connectivity
    #[error("Network connection error: {0}")]
    ConnectionError(String),

    /// Errors in protocol handling or invalid protocol messages
    #[error("Protocol violation: {0}")]
    ProtocolError(String),

    /// Standard I/O operation errors
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// URL parsing errors
    #[error("URL parse error: {0}")]
    UrlError(#[from] url::ParseError),

    /// HTTP request/response errors
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// Configuration file or parameter errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Thread communication channel errors
    #[error("Thread communication error: {0}")]
    ChannelError(String),

    /// Invalid user input or parameter errors
    #[error("Invalid input: {0}")]
    InputError(String),

    /// A broken timing or backend integration was detected; fatal
    #[error("Measurement fault: {0}")]
    MeasurementFault(String),
}

/// Converts hex decoding errors into MinerError
///
/// Used when invalid hex data is encountered during job decoding or
/// protocol message handling.
impl From<hex::FromHexError> for MinerError {
    fn from(e: hex::FromHexError) -> Self {
        MinerError::InputError(format!("Hex conversion failed: {}", e))
    }
}

/// Converts a push against a frozen command queue into MinerError
impl From<crate::utils::queue::QueueFrozen> for MinerError {
    fn from(e: crate::utils::queue::QueueFrozen) -> Self {
        MinerError::ChannelError(e.to_string())
    }
}
