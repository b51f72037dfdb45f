//! Password handling.
//!
//! A password is the sole input to key derivation. It is held as a secret,
//! redacted from debug output, and exposes only a one-way digest for
//! verification purposes.

use std::fmt;

use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};

use crate::error::{LockdownError, Result};

/// A non-empty user password.
pub struct Password(SecretString);

impl Password {
    /// Wrap a password, rejecting empty or whitespace-only input.
    ///
    /// # Examples
    ///
    /// ```
    /// use lockdown_core::crypto::Password;
    ///
    /// assert!(Password::new("correct horse").is_ok());
    /// assert!(Password::new("   ").is_err());
    /// ```
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(LockdownError::Validation(
                "Password cannot be empty".to_string(),
            ));
        }
        Ok(Self(SecretString::from(value)))
    }

    /// Hex-encoded SHA-256 digest of the password.
    ///
    /// Stored in the lock registry to recognise a wrong password early. It is
    /// independent of the KDF-derived encryption key and never used as one.
    pub fn hash(&self) -> String {
        hex::encode(Sha256::digest(self.expose().as_bytes()))
    }

    /// Check this password against a stored verification hash.
    pub fn verify(&self, hash: &str) -> bool {
        self.hash().eq_ignore_ascii_case(hash.trim())
    }

    pub(crate) fn expose(&self) -> &str {
        self.0.expose_secret()
    }
}

impl Clone for Password {
    fn clone(&self) -> Self {
        Self(SecretString::from(self.expose().to_string()))
    }
}

impl PartialEq for Password {
    fn eq(&self, other: &Self) -> bool {
        self.expose() == other.expose()
    }
}

impl Eq for Password {}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password([REDACTED])")
    }
}

impl TryFrom<&str> for Password {
    type Error = LockdownError;

    fn try_from(value: &str) -> Result<Self> {
        Password::new(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_password_rejected() {
        assert!(Password::new("").is_err());
        assert!(Password::new("  \n\t").is_err());
        let err = Password::new("").unwrap_err();
        assert!(matches!(err, LockdownError::Validation(_)));
    }

    #[test]
    fn test_hash_is_hex_sha256() {
        let password = Password::new("correct horse").unwrap();
        let hash = password.hash();
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(hash, Password::new("correct horse").unwrap().hash());
    }

    #[test]
    fn test_verify() {
        let password = Password::new("correct horse").unwrap();
        let hash = password.hash();
        assert!(password.verify(&hash));
        assert!(password.verify(&hash.to_uppercase()));
        assert!(!Password::new("wrong").unwrap().verify(&hash));
    }

    #[test]
    fn test_debug_redacts() {
        let password = Password::new("hunter2-secret").unwrap();
        let debug_output = format!("{:?}", password);
        assert!(debug_output.contains("REDACTED"));
        assert!(!debug_output.contains("hunter2"));
    }

    #[test]
    fn test_clone_preserves_secret() {
        let password = Password::new("correct horse").unwrap();
        assert_eq!(password.clone(), password);
    }
}
