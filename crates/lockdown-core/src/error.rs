//! Error types for Lockdown core operations.
//!
//! This module defines the error hierarchy for all core operations.
//! Cryptographic and codec failures are folded into four kinds at the
//! encryption service boundary (`Validation`, `WrongPassword`, `Encryption`,
//! `Decryption`); the CLI layer maps these to user-friendly messages.

use thiserror::Error;

/// Result type alias for Lockdown operations.
pub type Result<T> = std::result::Result<T, LockdownError>;

/// Core error type for Lockdown operations.
#[derive(Debug, Error)]
pub enum LockdownError {
    /// Malformed envelope, empty password, or a payload that is empty or too short.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Authentication failed while opening an envelope.
    ///
    /// Carries no detail: a wrong password, a wrong document id
    /// and tampered bytes are indistinguishable to the caller.
    #[error("Incorrect password")]
    WrongPassword,

    /// Encryption failed, including a failed round-trip self-check.
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Any other decryption failure.
    #[error("Decryption error: {0}")]
    Decryption(String),

    /// Host storage failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Another lock transition is in flight for this document
    #[error("Document is busy: {0}")]
    Busy(String),

    /// The user dismissed a prompt
    #[error("Cancelled")]
    Cancelled,

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid user input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl LockdownError {
    /// Whether a prompt should offer the user another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LockdownError::WrongPassword | LockdownError::Validation(_)
        )
    }
}

impl From<std::io::Error> for LockdownError {
    fn from(err: std::io::Error) -> Self {
        LockdownError::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for LockdownError {
    fn from(err: serde_json::Error) -> Self {
        LockdownError::Validation(err.to_string())
    }
}
