//! AES-256-GCM authenticated encryption.
//!
//! `seal` output is `ciphertext || tag`. `open` reports authentication
//! failure (wrong key, wrong associated data, tampered bytes) as
//! [`CipherError::AuthenticationFailed`], distinct from every other failure.

use aes_gcm::aead::{Aead, KeyInit, Payload};
use aes_gcm::{Aes256Gcm, Nonce};
use thiserror::Error;

use super::key::DerivedKey;

/// Nonce length in bytes. Fresh per seal call.
pub const NONCE_SIZE: usize = 12;

/// Authentication tag length in bytes.
pub const TAG_SIZE: usize = 16;

/// Cipher-level failures.
#[derive(Debug, Error)]
pub enum CipherError {
    #[error("Authentication failed")]
    AuthenticationFailed,

    #[error("Ciphertext shorter than the {TAG_SIZE}-byte tag")]
    Truncated,

    #[error("Cipher setup failed: {0}")]
    Setup(String),

    #[error("Sealing failed")]
    Seal,
}

fn cipher_for(key: &DerivedKey) -> Result<Aes256Gcm, CipherError> {
    Aes256Gcm::new_from_slice(key.as_bytes()).map_err(|e| CipherError::Setup(e.to_string()))
}

/// Encrypt `plaintext`, binding `aad` into the tag.
pub fn seal(
    plaintext: &[u8],
    key: &DerivedKey,
    nonce: &[u8; NONCE_SIZE],
    aad: &[u8],
) -> Result<Vec<u8>, CipherError> {
    let cipher = cipher_for(key)?;
    cipher
        .encrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| CipherError::Seal)
}

/// Decrypt and authenticate `ciphertext_with_tag`.
pub fn open(
    ciphertext_with_tag: &[u8],
    key: &DerivedKey,
    nonce: &[u8; NONCE_SIZE],
    aad: &[u8],
) -> Result<Vec<u8>, CipherError> {
    if ciphertext_with_tag.len() < TAG_SIZE {
        return Err(CipherError::Truncated);
    }
    let cipher = cipher_for(key)?;
    cipher
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: ciphertext_with_tag,
                aad,
            },
        )
        .map_err(|_| CipherError::AuthenticationFailed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::key::{derive_key, KdfParams, SALT_SIZE};
    use crate::crypto::password::Password;

    fn key(password: &str) -> DerivedKey {
        derive_key(
            &Password::new(password).unwrap(),
            &[9u8; SALT_SIZE],
            KdfParams::testing(),
        )
    }

    #[test]
    fn test_seal_open_round_trip() {
        let key = key("pw");
        let nonce = [1u8; NONCE_SIZE];
        let sealed = seal(b"secret data", &key, &nonce, b"notes/a.md").unwrap();

        assert_eq!(sealed.len(), b"secret data".len() + TAG_SIZE);
        let opened = open(&sealed, &key, &nonce, b"notes/a.md").unwrap();
        assert_eq!(opened, b"secret data");
    }

    #[test]
    fn test_wrong_aad_is_authentication_failure() {
        let key = key("pw");
        let nonce = [1u8; NONCE_SIZE];
        let sealed = seal(b"secret", &key, &nonce, b"notes/a.md").unwrap();

        let result = open(&sealed, &key, &nonce, b"notes/b.md");
        assert!(matches!(result, Err(CipherError::AuthenticationFailed)));
    }

    #[test]
    fn test_wrong_key_is_authentication_failure() {
        let nonce = [1u8; NONCE_SIZE];
        let sealed = seal(b"secret", &key("pw-one"), &nonce, b"id").unwrap();

        let result = open(&sealed, &key("pw-two"), &nonce, b"id");
        assert!(matches!(result, Err(CipherError::AuthenticationFailed)));
    }

    #[test]
    fn test_tampered_ciphertext_fails() {
        let key = key("pw");
        let nonce = [1u8; NONCE_SIZE];
        let mut sealed = seal(b"secret", &key, &nonce, b"id").unwrap();
        sealed[0] ^= 0x01;

        let result = open(&sealed, &key, &nonce, b"id");
        assert!(matches!(result, Err(CipherError::AuthenticationFailed)));
    }

    #[test]
    fn test_truncated_input_is_not_authentication_failure() {
        let result = open(&[0u8; 4], &key("pw"), &[0u8; NONCE_SIZE], b"id");
        assert!(matches!(result, Err(CipherError::Truncated)));
    }

    #[test]
    fn test_empty_plaintext() {
        let key = key("pw");
        let nonce = [2u8; NONCE_SIZE];
        let sealed = seal(b"", &key, &nonce, b"id").unwrap();
        assert_eq!(sealed.len(), TAG_SIZE);
        assert!(open(&sealed, &key, &nonce, b"id").unwrap().is_empty());
    }
}
