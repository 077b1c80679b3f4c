//! Error types for the bank account core
//!
//! This module provides a unified error handling system for the ledger, the
//! contact registry and the user lifecycle service. The first four variants
//! are the business error kinds surfaced to callers; the rest are ambient
//! failures of configuration or storage.

use std::fmt::Display;
use thiserror::Error;

/// Bank core error type
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed input reaching the core (blank phone, email without `@`)
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Referenced user or contact does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Login, phone or email already taken
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Business rule violated by the current state
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Database migration error
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Extension trait to add context to error results
pub trait ErrorExt<T> {
    /// Add context information to an error
    fn with_context<C, F>(self, context_fn: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Display;
}

impl<T> ErrorExt<T> for Result<T> {
    fn with_context<C, F>(self, context_fn: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Display,
    {
        self.map_err(|e| {
            let context = context_fn().to_string();
            match e {
                Error::ValidationError(msg) => Error::ValidationError(format!("{}: {}", context, msg)),
                Error::NotFound(msg) => Error::NotFound(format!("{}: {}", context, msg)),
                Error::AlreadyExists(msg) => Error::AlreadyExists(format!("{}: {}", context, msg)),
                Error::Conflict(msg) => Error::Conflict(format!("{}: {}", context, msg)),
                Error::ConfigurationError(msg) => Error::ConfigurationError(format!("{}: {}", context, msg)),
                Error::Internal(msg) => Error::Internal(format!("{}: {}", context, msg)),
                Error::Database(e) => Error::Database(e),
                Error::Migration(e) => Error::Migration(e),
            }
        })
    }
}

/// Convert string messages into an error
impl From<String> for Error {
    fn from(message: String) -> Self {
        Error::Internal(message)
    }
}

/// Convert static string references into an error
impl From<&str> for Error {
    fn from(message: &str) -> Self {
        Error::Internal(message.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_keeps_the_error_kind() {
        let result: Result<()> = Err(Error::Conflict("insufficient funds".to_string()));
        let err = result.with_context(|| "transfer failed").unwrap_err();

        match err {
            Error::Conflict(msg) => assert_eq!(msg, "transfer failed: insufficient funds"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn plain_messages_become_internal() {
        let err: Error = "sweep aborted".into();
        assert!(matches!(err, Error::Internal(msg) if msg == "sweep aborted"));
    }
}
