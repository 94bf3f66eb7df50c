//! # Error Types
//!
//! Custom error types for Vibra Link using `thiserror`.
//!
//! Link failures (timeouts, lost permissions, dropped streams) are published
//! as [`crate::connection::ConnectionState`] values rather than returned, so
//! this enum only covers failures a caller can act on.

use thiserror::Error;

/// Main error type for Vibra Link
#[derive(Debug, Error)]
pub enum VibraError {
    /// Command cannot be serialised without breaking the line protocol
    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    /// A command was submitted while no session is live
    #[error("Not connected")]
    NotConnected,

    /// Serial transport errors
    #[error("Serial error: {0}")]
    Serial(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Vibra Link
pub type Result<T> = std::result::Result<T, VibraError>;
