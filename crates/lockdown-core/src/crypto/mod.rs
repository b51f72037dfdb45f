//! Cryptographic primitives for Lockdown.
//!
//! This module orchestrates well-audited implementations:
//! - **PBKDF2-HMAC-SHA512**: slow password-based key derivation
//! - **AES-256-GCM**: authenticated encryption with the document id as AAD
//!
//! ## Security Model
//!
//! - A fresh 16-byte salt and 12-byte nonce per encryption, from the OS RNG
//! - Derived keys are zeroized on drop and never cached
//! - Passwords are held as secrets; only a one-way digest is ever persisted
//!
//! ## Threat Model
//!
//! We defend against:
//! - Theft or inspection of documents at rest
//! - Tampering with, or relocating, encrypted documents
//! - Offline brute-force attacks on the password (KDF cost)
//!
//! We do NOT defend against:
//! - Compromised OS / keylogger
//! - Access to an unlocked session / process memory

pub mod cipher;
pub mod key;
pub mod password;

pub use cipher::{open, seal, CipherError, NONCE_SIZE, TAG_SIZE};
pub use key::{derive_key, DerivedKey, KdfParams, KEY_SIZE, MIN_ITERATIONS, SALT_SIZE};
pub use password::Password;

use crate::error::{LockdownError, Result};

/// Fill a fixed-size buffer from the operating system's CSPRNG.
pub fn random_bytes<const N: usize>() -> Result<[u8; N]> {
    let mut bytes = [0u8; N];
    getrandom::getrandom(&mut bytes)
        .map_err(|e| LockdownError::Encryption(format!("Random generation failed: {}", e)))?;
    Ok(bytes)
}
