//! Error types for `Nozzle` core library.

use thiserror::Error;

/// Result type alias using `Nozzle` Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for `Nozzle` operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Envelope protobuf decoding error
    #[error("Failed to decode envelope: {0}")]
    Decode(#[from] prost::DecodeError),
}
