//! Encryption service.
//!
//! Composes key derivation, the AEAD cipher and the envelope codec. Every
//! cryptographic or codec failure leaves this module as one of
//! `Validation`, `WrongPassword`, `Encryption` or `Decryption`.

use crate::crypto::{
    derive_key, open, random_bytes, seal, CipherError, DerivedKey, KdfParams, Password,
    NONCE_SIZE, SALT_SIZE, TAG_SIZE,
};
use crate::document::DocumentId;
use crate::envelope::{Envelope, MARKER};
use crate::error::{LockdownError, Result};

/// Password-based document encryption bound to a document id.
#[derive(Debug, Clone, Copy, Default)]
pub struct EncryptionService {
    params: KdfParams,
}

impl EncryptionService {
    pub fn new(params: KdfParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> KdfParams {
        self.params
    }

    /// Encrypt `plaintext` for `id`.
    ///
    /// The envelope is re-parsed from its wire form and opened before it is
    /// returned; if that does not reproduce `plaintext` byte for byte the call
    /// fails with `Encryption` and nothing is handed back.
    ///
    /// # Errors
    ///
    /// - `Validation` if `plaintext` already carries the envelope marker
    /// - `Encryption` if sealing or the round-trip check fails
    pub async fn encrypt(
        &self,
        plaintext: &str,
        password: &Password,
        id: &DocumentId,
    ) -> Result<Envelope> {
        if plaintext.contains(MARKER) {
            return Err(LockdownError::Validation(
                "Content is already encrypted".to_string(),
            ));
        }

        let salt: [u8; SALT_SIZE] = random_bytes()?;
        let nonce: [u8; NONCE_SIZE] = random_bytes()?;
        let key = self
            .derive(password, salt)
            .await
            .map_err(LockdownError::Encryption)?;

        let ciphertext = seal(plaintext.as_bytes(), &key, &nonce, id.as_aad())
            .map_err(|e| LockdownError::Encryption(e.to_string()))?;
        let envelope = Envelope::encode(&salt, &nonce, &ciphertext);

        verify_round_trip(&envelope, &key, id, plaintext)?;
        tracing::debug!(document = %id, "Encrypted document");

        Ok(envelope)
    }

    /// Decrypt `envelope` for `id`.
    ///
    /// # Errors
    ///
    /// - `WrongPassword` on authentication failure (wrong password, wrong id,
    ///   tampered bytes)
    /// - `Validation` if the ciphertext is shorter than the tag, or the
    ///   plaintext itself contains the envelope marker
    /// - `Decryption` for anything else
    pub async fn decrypt(
        &self,
        envelope: &Envelope,
        password: &Password,
        id: &DocumentId,
    ) -> Result<String> {
        let (plaintext, _) = self.decrypt_recovering(envelope, password, id).await?;
        Ok(plaintext)
    }

    /// Decrypt, falling back to the first half of an exactly repeated payload.
    ///
    /// Returns the plaintext together with the envelope that actually
    /// authenticated, so callers can write back the canonical form. The half
    /// shares the salt of the full payload, so the key is derived once.
    ///
    /// # Errors
    ///
    /// Same as [`decrypt`](Self::decrypt). When neither candidate
    /// authenticates the error is `WrongPassword`.
    pub async fn decrypt_recovering(
        &self,
        envelope: &Envelope,
        password: &Password,
        id: &DocumentId,
    ) -> Result<(String, Envelope)> {
        let parts = envelope.parts()?;
        if parts.ciphertext.len() < TAG_SIZE {
            return Err(LockdownError::Validation(
                "Ciphertext shorter than authentication tag".to_string(),
            ));
        }

        let key = self
            .derive(password, parts.salt)
            .await
            .map_err(LockdownError::Decryption)?;

        let (plaintext, authenticated) =
            match open(&parts.ciphertext, &key, &parts.nonce, id.as_aad()) {
                Ok(plaintext) => (plaintext, envelope.clone()),
                Err(CipherError::AuthenticationFailed) => {
                    let half = envelope.repetition_half().ok_or(LockdownError::WrongPassword)?;
                    let half_parts = half.parts()?;
                    let plaintext =
                        open(&half_parts.ciphertext, &key, &half_parts.nonce, id.as_aad())
                            .map_err(map_open_error)?;
                    tracing::warn!(document = %id, "Recovered duplicated envelope payload");
                    (plaintext, half)
                }
                Err(e) => return Err(map_open_error(e)),
            };

        let plaintext = String::from_utf8(plaintext)
            .map_err(|_| LockdownError::Decryption("Plaintext is not valid UTF-8".to_string()))?;

        if plaintext.contains(MARKER) {
            return Err(LockdownError::Validation(
                "Decrypted content is itself encrypted".to_string(),
            ));
        }

        tracing::debug!(document = %id, "Decrypted document");
        Ok((plaintext, authenticated))
    }

    /// Decode raw stored text and decrypt it.
    pub async fn decrypt_text(
        &self,
        raw: &str,
        password: &Password,
        id: &DocumentId,
    ) -> Result<String> {
        let envelope = Envelope::decode(raw)?;
        self.decrypt(&envelope, password, id).await
    }

    /// Run the KDF on the blocking pool.
    async fn derive(
        &self,
        password: &Password,
        salt: [u8; SALT_SIZE],
    ) -> std::result::Result<DerivedKey, String> {
        let password = password.clone();
        let params = self.params;
        tokio::task::spawn_blocking(move || derive_key(&password, &salt, params))
            .await
            .map_err(|e| format!("Key derivation task failed: {}", e))
    }
}

fn map_open_error(err: CipherError) -> LockdownError {
    match err {
        CipherError::AuthenticationFailed => LockdownError::WrongPassword,
        CipherError::Truncated => LockdownError::Validation(err.to_string()),
        other => LockdownError::Decryption(other.to_string()),
    }
}

fn verify_round_trip(
    envelope: &Envelope,
    key: &DerivedKey,
    id: &DocumentId,
    expected: &str,
) -> Result<()> {
    let failed = || LockdownError::Encryption("Round-trip verification failed".to_string());

    let reparsed = Envelope::decode(&envelope.to_string()).map_err(|_| failed())?;
    let parts = reparsed.parts().map_err(|_| failed())?;
    let opened = open(&parts.ciphertext, key, &parts.nonce, id.as_aad()).map_err(|_| failed())?;

    if opened != expected.as_bytes() {
        return Err(failed());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;

    use super::*;

    fn service() -> EncryptionService {
        EncryptionService::new(KdfParams::testing())
    }

    fn password(value: &str) -> Password {
        Password::new(value).unwrap()
    }

    #[tokio::test]
    async fn test_encrypt_decrypt_round_trip() {
        let id = DocumentId::new("notes/a.md");
        let envelope = service()
            .encrypt("Hello, World! This is secret data.", &password("pw"), &id)
            .await
            .unwrap();

        let decrypted = service().decrypt(&envelope, &password("pw"), &id).await.unwrap();
        assert_eq!(decrypted, "Hello, World! This is secret data.");
    }

    #[tokio::test]
    async fn test_fresh_salt_and_nonce_per_call() {
        let id = DocumentId::new("a.md");
        let one = service().encrypt("same", &password("pw"), &id).await.unwrap();
        let two = service().encrypt("same", &password("pw"), &id).await.unwrap();

        let (p1, p2) = (one.parts().unwrap(), two.parts().unwrap());
        assert_ne!(p1.salt, p2.salt);
        assert_ne!(p1.nonce, p2.nonce);
    }

    #[tokio::test]
    async fn test_wrong_document_id_is_wrong_password() {
        let envelope = service()
            .encrypt("secret", &password("pw"), &DocumentId::new("notes/a.md"))
            .await
            .unwrap();

        let result = service()
            .decrypt(&envelope, &password("pw"), &DocumentId::new("notes/b.md"))
            .await;
        assert!(matches!(result, Err(LockdownError::WrongPassword)));
    }

    #[tokio::test]
    async fn test_wrong_password() {
        let id = DocumentId::new("a.md");
        let envelope = service().encrypt("secret", &password("right"), &id).await.unwrap();

        let result = service().decrypt(&envelope, &password("wrong"), &id).await;
        assert!(matches!(result, Err(LockdownError::WrongPassword)));
    }

    #[tokio::test]
    async fn test_every_ciphertext_byte_is_authenticated() {
        let id = DocumentId::new("a.md");
        let envelope = service().encrypt("tamper me", &password("pw"), &id).await.unwrap();
        let raw = STANDARD.decode(envelope.extract_payload()).unwrap();

        for index in (SALT_SIZE + NONCE_SIZE)..raw.len() {
            let mut tampered = raw.clone();
            tampered[index] ^= 0x01;
            let text = format!("{}\n{}", MARKER, STANDARD.encode(&tampered));

            let result = service().decrypt_text(&text, &password("pw"), &id).await;
            assert!(
                matches!(result, Err(LockdownError::WrongPassword)),
                "byte {} was not authenticated",
                index
            );
        }
    }

    #[tokio::test]
    async fn test_empty_and_whitespace_plaintext() {
        let id = DocumentId::new("a.md");
        for text in ["", "   \n"] {
            let envelope = service().encrypt(text, &password("pw"), &id).await.unwrap();
            assert_eq!(
                service().decrypt(&envelope, &password("pw"), &id).await.unwrap(),
                text
            );
        }
    }

    #[tokio::test]
    async fn test_encrypting_an_envelope_is_rejected() {
        let id = DocumentId::new("a.md");
        let envelope = service().encrypt("inner", &password("pw"), &id).await.unwrap();

        let result = service()
            .encrypt(&envelope.to_string(), &password("pw"), &id)
            .await;
        assert!(matches!(result, Err(LockdownError::Validation(_))));
    }

    #[tokio::test]
    async fn test_nested_envelope_plaintext_is_validation_error() {
        // Hand-seal a plaintext that carries the marker, bypassing encrypt's guard.
        let id = DocumentId::new("a.md");
        let salt = [4u8; SALT_SIZE];
        let nonce = [5u8; NONCE_SIZE];
        let key = derive_key(&password("pw"), &salt, KdfParams::testing());
        let inner = format!("{}\nAAAA", MARKER);
        let ciphertext = seal(inner.as_bytes(), &key, &nonce, id.as_aad()).unwrap();
        let envelope = Envelope::encode(&salt, &nonce, &ciphertext);

        let result = service().decrypt(&envelope, &password("pw"), &id).await;
        assert!(matches!(result, Err(LockdownError::Validation(_))));
    }

    #[tokio::test]
    async fn test_ciphertext_shorter_than_tag_is_validation_error() {
        let envelope = Envelope::encode(&[0u8; SALT_SIZE], &[0u8; NONCE_SIZE], &[1u8; 8]);
        let result = service()
            .decrypt(&envelope, &password("pw"), &DocumentId::new("a.md"))
            .await;
        assert!(matches!(result, Err(LockdownError::Validation(_))));
    }

    #[tokio::test]
    async fn test_duplicated_envelope_still_decrypts() {
        let id = DocumentId::new("a.md");
        let envelope = service().encrypt("hello", &password("pw"), &id).await.unwrap();
        let duplicated = format!("{}\n{}", MARKER, envelope.extract_payload().repeat(2));

        let decrypted = service()
            .decrypt_text(&duplicated, &password("pw"), &id)
            .await
            .unwrap();
        assert_eq!(decrypted, "hello");
    }

    #[tokio::test]
    async fn test_unpadded_duplicate_decrypts_through_half() {
        // 4 + 44 bytes encodes without padding.
        let id = DocumentId::new("a.md");
        let envelope = service().encrypt("body", &password("pw"), &id).await.unwrap();
        assert!(!envelope.extract_payload().contains('='));
        let duplicated = format!("{}\n{}", MARKER, envelope.extract_payload().repeat(2));

        let decoded = Envelope::decode(&duplicated).unwrap();
        let (plaintext, authenticated) = service()
            .decrypt_recovering(&decoded, &password("pw"), &id)
            .await
            .unwrap();
        assert_eq!(plaintext, "body");
        assert_eq!(authenticated, envelope);
    }

    #[tokio::test]
    async fn test_canonical_envelope_is_returned_as_is() {
        let id = DocumentId::new("a.md");
        let envelope = service().encrypt("body", &password("pw"), &id).await.unwrap();
        let (_, authenticated) = service()
            .decrypt_recovering(&envelope, &password("pw"), &id)
            .await
            .unwrap();
        assert_eq!(authenticated, envelope);
    }

    #[tokio::test]
    async fn test_duplicate_with_wrong_password_is_wrong_password() {
        let id = DocumentId::new("a.md");
        let envelope = service().encrypt("body", &password("pw"), &id).await.unwrap();
        let duplicated = format!("{}\n{}", MARKER, envelope.extract_payload().repeat(2));

        let result = service()
            .decrypt_text(&duplicated, &password("nope"), &id)
            .await;
        assert!(matches!(result, Err(LockdownError::WrongPassword)));
    }
}
