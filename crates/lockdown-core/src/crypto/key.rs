//! Key derivation using PBKDF2-HMAC-SHA512.
//!
//! This module derives encryption keys from passwords. The iteration count is
//! the security property: it is configurable upward, never below
//! [`MIN_ITERATIONS`], and derived keys are never cached.

use pbkdf2::pbkdf2_hmac;
use sha2::Sha512;
use zeroize::ZeroizeOnDrop;

use super::password::Password;
use crate::error::{LockdownError, Result};

/// Salt length in bytes. Every encryption uses a fresh random salt.
pub const SALT_SIZE: usize = 16;

/// Length of derived key in bytes (32 bytes = 256 bits for AES-256).
pub const KEY_SIZE: usize = 32;

/// Safety floor for PBKDF2 iterations.
pub const MIN_ITERATIONS: u32 = 1_000_000;

/// KDF cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    iterations: u32,
}

impl KdfParams {
    /// Create parameters with the given iteration count.
    ///
    /// # Errors
    ///
    /// Returns `LockdownError::InvalidInput` if `iterations` is below
    /// [`MIN_ITERATIONS`].
    pub fn new(iterations: u32) -> Result<Self> {
        if iterations < MIN_ITERATIONS {
            return Err(LockdownError::InvalidInput(format!(
                "KDF iterations must be at least {} (got {})",
                MIN_ITERATIONS, iterations
            )));
        }
        Ok(Self { iterations })
    }

    /// Cheap parameters for test suites. Never available in release code paths.
    #[cfg(any(test, feature = "testing"))]
    pub fn testing() -> Self {
        Self { iterations: 1_000 }
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }
}

impl Default for KdfParams {
    fn default() -> Self {
        Self {
            iterations: MIN_ITERATIONS,
        }
    }
}

/// A symmetric key derived from a password.
///
/// Key material is zeroized from memory when dropped.
#[derive(Clone, ZeroizeOnDrop)]
pub struct DerivedKey {
    key: [u8; KEY_SIZE],
}

impl DerivedKey {
    /// Get a reference to the raw key bytes.
    ///
    /// # Security
    ///
    /// Avoid storing or logging this value. Use only for immediate cipher operations.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.key
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DerivedKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Derive a 256-bit key from a password and salt.
///
/// Pure and deterministic: the same password, salt and parameters always
/// produce the same key. The call is CPU-bound; async callers run
/// it on a blocking thread.
///
/// # Examples
///
/// ```
/// use lockdown_core::crypto::{derive_key, KdfParams, Password};
///
/// let password = Password::new("my-password").unwrap();
/// let salt = [7u8; 16];
/// let key = derive_key(&password, &salt, KdfParams::default());
/// assert_eq!(key.as_bytes().len(), 32);
/// ```
pub fn derive_key(password: &Password, salt: &[u8; SALT_SIZE], params: KdfParams) -> DerivedKey {
    let mut key = [0u8; KEY_SIZE];
    pbkdf2_hmac::<Sha512>(
        password.expose().as_bytes(),
        salt,
        params.iterations,
        &mut key,
    );
    DerivedKey { key }
}
