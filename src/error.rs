//! This module defines all error types used throughout the application.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the application
#[derive(Error, Debug)]
pub enum Error {
    /// IO errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON-RPC transport or protocol errors
    #[error("RPC error: {0}")]
    Rpc(String),

    /// Contract call encoding/decoding errors
    #[error("ABI error: {0}")]
    Abi(String),

    /// The ledger refused or failed a write
    #[error("Ledger error: {0}")]
    Ledger(String),

    /// Block history could not be walked
    #[error("Log scan error: {0}")]
    Scan(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file parse errors
    #[error("Configuration parse error in {file:?}: {message}")]
    ConfigParse { file: PathBuf, message: String },

    /// Invalid participant / contract address
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    /// Missing configuration
    #[error("Missing configuration: {0}")]
    MissingConfig(String),

    /// Generic error with custom message
    #[error("{0}")]
    Custom(String),

    /// Wrapped anyhow errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a custom error with a message
    pub fn custom(msg: impl Into<String>) -> Self {
        Self::Custom(msg.into())
    }

    /// Create an RPC error
    pub fn rpc(msg: impl Into<String>) -> Self {
        Self::Rpc(msg.into())
    }

    /// Create an ABI error
    pub fn abi(msg: impl Into<String>) -> Self {
        Self::Abi(msg.into())
    }

    /// Create a ledger error
    pub fn ledger(msg: impl Into<String>) -> Self {
        Self::Ledger(msg.into())
    }

    /// Create a log scan error
    pub fn scan(msg: impl Into<String>) -> Self {
        Self::Scan(msg.into())
    }

    /// Whether the error came from a write the ledger rejected
    pub fn is_ledger_rejection(&self) -> bool {
        matches!(self, Error::Ledger(_))
    }
}

// Implement From traits for common external error types

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::ConfigParse {
            file: PathBuf::from("unknown"),
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Rpc(format!("JSON error: {}", err))
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Rpc(format!("HTTP error: {}", err))
    }
}

// Helper macros for creating errors

/// Create an ABI error with formatting
#[macro_export]
macro_rules! abi_error {
    ($($arg:tt)*) => {
        $crate::error::Error::Abi(format!($($arg)*))
    };
}

/// Bail with an ABI error message
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return Err($crate::abi_error!($($arg)*))
    };
}

/// Ensure a condition is true or return error
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $($arg:tt)*) => {
        if !($cond) {
            $crate::bail!($($arg)*);
        }
    };
}
