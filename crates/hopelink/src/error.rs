//! Error types for hopelink.
//!
//! This module defines all error types used throughout the hopelink crate,
//! providing detailed context for debugging and user-friendly error messages.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for hopelink operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Storage Errors ===
    /// Failed to open or create the local database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Cloud Errors ===
    /// The cloud client could not be constructed.
    #[error("cloud backend initialization failed: {0}")]
    CloudInit(String),

    /// An HTTP request to a remote endpoint failed in transport.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// A remote endpoint answered with a non-success status.
    #[error("remote endpoint returned status {status}: {body}")]
    RemoteStatus {
        /// HTTP status code.
        status: u16,
        /// Response body, as returned.
        body: String,
    },

    /// A remote response could not be interpreted.
    #[error("malformed remote response: {0}")]
    RemoteResponse(String),

    // === Session and Form Errors ===
    /// Login rejected.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// An action needs a logged-in session.
    #[error("no active session")]
    NoSession,

    /// The registration input is missing or has invalid values.
    #[error("invalid registration: {message}")]
    InvalidRegistration {
        /// Description of what is wrong.
        message: String,
    },

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic Errors ===
    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for hopelink operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create a new cloud initialization error.
    #[must_use]
    pub fn cloud_init(message: impl Into<String>) -> Self {
        Self::CloudInit(message.into())
    }

    /// Create an authentication error with a user-visible message.
    #[must_use]
    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication(message.into())
    }

    /// Create an invalid registration error.
    #[must_use]
    pub fn invalid_registration(message: impl Into<String>) -> Self {
        Self::InvalidRegistration {
            message: message.into(),
        }
    }

    /// Check if this error is a rejected login.
    #[must_use]
    pub fn is_authentication_error(&self) -> bool {
        matches!(self, Self::Authentication(_))
    }

    /// Check if this error came from talking to a remote endpoint.
    #[must_use]
    pub fn is_remote_error(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::RemoteStatus { .. } | Self::RemoteResponse(_)
        )
    }
}
