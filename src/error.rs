//! Error types for the light-node automator

use thiserror::Error;

/// Result type alias using our custom Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the automator
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    // Wallet errors
    #[error("Invalid private key: {0}")]
    InvalidKey(String),

    #[error("Address mismatch: wallet lists {expected}, key derives {derived}")]
    AddressMismatch { expected: String, derived: String },

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("Invalid proof: {0}")]
    InvalidProof(String),

    // Remote service errors
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Already done: {0}")]
    AlreadyDone(String),

    #[error("Retries exhausted after {attempts} attempts: {last}")]
    ExhaustedRetries { attempts: u32, last: Box<Error> },

    // Proxy errors
    #[error("Invalid proxy endpoint: {0}")]
    InvalidProxy(String),

    #[error("Proxy probe failed: {0}")]
    Probe(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    // I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl Error {
    /// HTTP status carried by this error, if any
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Http { status, .. } => Some(*status),
            Error::ExhaustedRetries { last, .. } => last.status(),
            _ => None,
        }
    }

    /// Check if this error is local and deterministic (retrying cannot help)
    pub fn is_local(&self) -> bool {
        matches!(
            self,
            Error::Config(_)
                | Error::InvalidKey(_)
                | Error::AddressMismatch { .. }
                | Error::Signing(_)
                | Error::InvalidProof(_)
                | Error::InvalidProxy(_)
                | Error::Serialization(_)
                | Error::Io(_)
        )
    }
}

// Conversion from serde_json errors
impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

// Conversion from I/O errors
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

// Conversion from reqwest errors (status errors are mapped explicitly by the client)
impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            return Error::Http {
                status: status.as_u16(),
                message: e.to_string(),
            };
        }
        if e.is_decode() || e.is_body() {
            // Body cut off mid-response
            return Error::Deserialization(e.to_string());
        }
        Error::Transport(e.to_string())
    }
}
