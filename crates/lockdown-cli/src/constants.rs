//! Constants used throughout the CLI.

/// Exit codes for the CLI.
///
/// These follow common Unix conventions:
/// - 0: Success
/// - 1: General error (used by anyhow for unhandled errors)
/// - 2: Misuse of shell command (reserved by shells)
/// - 3+: Application-specific errors
pub mod exit_codes {
    /// Resource not found (config, vault root, document, folder).
    pub const NOT_FOUND: i32 = 3;

    /// Invalid user input or arguments, or a document busy in another operation.
    pub const INVALID_INPUT: i32 = 4;

    /// Authentication failed (wrong password, too many attempts).
    pub const AUTH_FAILED: i32 = 5;

    /// Stored envelope is corrupted beyond recovery.
    pub const INTEGRITY_FAILED: i32 = 6;
}

/// Environment variables read by the CLI.
pub mod env {
    /// Password used for every prompt, for scripts and tests.
    pub const PASSWORD: &str = "LOCKDOWN_PASSWORD";
}

/// Default polling interval for `lockdown watch`.
pub const DEFAULT_WATCH_INTERVAL_MS: u64 = 500;
