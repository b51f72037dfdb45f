//! CLI error types for structured error handling.
//!
//! Core errors are mapped onto a small set of exit codes so scripts can tell
//! a wrong password from a missing document.

use std::fmt;

use lockdown_core::LockdownError;

use crate::constants::exit_codes;

/// CLI-specific errors with associated exit codes.
#[derive(Debug, Clone)]
pub enum CliError {
    /// Resource not found (config, vault root, document)
    NotFound { message: String, hint: String },

    /// Authentication failed (wrong password, too many attempts)
    AuthFailed {
        message: String,
        hint: Option<String>,
    },

    /// Invalid user input
    InvalidInput(String),

    /// Envelope could not be decoded or decrypted to text
    IntegrityFailed { message: String, hint: String },

    /// Anything else the core reported
    Other(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::NotFound { message, .. } => write!(f, "{}", message),
            CliError::AuthFailed { message, .. } => write!(f, "{}", message),
            CliError::InvalidInput(message) => write!(f, "{}", message),
            CliError::IntegrityFailed { message, .. } => write!(f, "{}", message),
            CliError::Other(message) => write!(f, "{}", message),
        }
    }
}

impl std::error::Error for CliError {}

impl CliError {
    /// Create a NotFound error with message and hint.
    pub fn not_found(message: impl Into<String>, hint: impl Into<String>) -> Self {
        CliError::NotFound {
            message: message.into(),
            hint: hint.into(),
        }
    }

    /// Create an AuthFailed error with message and hint.
    pub fn auth_failed_with_hint(message: impl Into<String>, hint: impl Into<String>) -> Self {
        CliError::AuthFailed {
            message: message.into(),
            hint: Some(hint.into()),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        CliError::InvalidInput(message.into())
    }

    /// Hint shown under the error message, if any.
    pub fn hint(&self) -> Option<&str> {
        match self {
            CliError::NotFound { hint, .. } | CliError::IntegrityFailed { hint, .. } => {
                Some(hint)
            }
            CliError::AuthFailed { hint, .. } => hint.as_deref(),
            CliError::InvalidInput(_) | CliError::Other(_) => None,
        }
    }

    /// Get the exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::NotFound { .. } => exit_codes::NOT_FOUND,
            CliError::AuthFailed { .. } => exit_codes::AUTH_FAILED,
            CliError::InvalidInput(_) => exit_codes::INVALID_INPUT,
            CliError::IntegrityFailed { .. } => exit_codes::INTEGRITY_FAILED,
            CliError::Other(_) => 1,
        }
    }
}

impl From<&LockdownError> for CliError {
    fn from(err: &LockdownError) -> Self {
        match err {
            LockdownError::NotFound(_) => CliError::not_found(
                err.to_string(),
                "Hint: Run `lockdown status` to list locked documents.",
            ),
            LockdownError::WrongPassword => CliError::auth_failed_with_hint(
                err.to_string(),
                "Hint: Check your password, or set LOCKDOWN_PASSWORD for non-interactive use.",
            ),
            LockdownError::Cancelled => CliError::AuthFailed {
                message: err.to_string(),
                hint: None,
            },
            LockdownError::Validation(_) | LockdownError::Decryption(_) => {
                CliError::IntegrityFailed {
                    message: err.to_string(),
                    hint: "Hint: Run `lockdown repair <PATH>` to recover a duplicated envelope."
                        .to_string(),
                }
            }
            LockdownError::InvalidInput(_) | LockdownError::Busy(_) => {
                CliError::invalid_input(err.to_string())
            }
            LockdownError::Encryption(_) | LockdownError::Storage(_) => {
                CliError::Other(err.to_string())
            }
        }
    }
}

/// Classify any command failure for reporting.
pub fn classify(err: &anyhow::Error) -> CliError {
    if let Some(cli) = err.downcast_ref::<CliError>() {
        return cli.clone();
    }
    if let Some(core) = err.downcast_ref::<LockdownError>() {
        return CliError::from(core);
    }
    CliError::Other(format!("{:#}", err))
}
