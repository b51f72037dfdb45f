//! End-to-end flows at the production KDF cost.
//!
//! Each derivation runs the full iteration count, so these tests keep the
//! number of encrypt/decrypt calls small.

use std::sync::Arc;

use lockdown_core::host::{NoopIndicator, StaticPrompter};
use lockdown_core::{
    CoordinatorConfig, DocState, DocumentId, DocumentStore, EncryptionService, Envelope,
    FsDocumentStore, Host, KdfParams, LockCoordinator, LockdownError, Password, VaultConfig,
};

fn password(value: &str) -> Password {
    Password::new(value).expect("password should be valid")
}

#[tokio::test]
async fn test_encrypt_decrypt_and_bindings() {
    let service = EncryptionService::new(KdfParams::default());
    let doc = DocumentId::new("notes/a.md");

    let envelope = service
        .encrypt("hello world", &password("correct horse"), &doc)
        .await
        .expect("encrypt should succeed");
    let stored = envelope.to_string();
    assert!(stored.starts_with("<!-- LOCKDOWN_ENCRYPTED -->\n"));

    let plaintext = service
        .decrypt_text(&stored, &password("correct horse"), &doc)
        .await
        .expect("decrypt should succeed");
    assert_eq!(plaintext, "hello world");

    let wrong_id = service
        .decrypt_text(&stored, &password("correct horse"), &DocumentId::new("notes/b.md"))
        .await;
    assert!(matches!(wrong_id, Err(LockdownError::WrongPassword)));

    let wrong_password = service.decrypt_text(&stored, &password("wrong"), &doc).await;
    assert!(matches!(wrong_password, Err(LockdownError::WrongPassword)));
}

#[tokio::test]
async fn test_duplicated_payload_is_recovered_and_tampering_detected() {
    let service = EncryptionService::new(KdfParams::default());
    let doc = DocumentId::new("a.md");
    let pw = password("pw");

    let envelope = service
        .encrypt("body", &pw, &doc)
        .await
        .expect("encrypt should succeed");
    let payload = envelope.extract_payload().to_string();

    // "body" seals to an unpadded payload, so only authentication can tell
    // the duplicate apart from a longer envelope.
    let duplicated = format!("{}{}", envelope, payload);
    let decoded = Envelope::decode(&duplicated).expect("duplicate should decode");
    assert_eq!(decoded.repetition_half(), Some(envelope.clone()));
    let plaintext = service
        .decrypt_text(&duplicated, &pw, &doc)
        .await
        .expect("duplicate should decrypt");
    assert_eq!(plaintext, "body");

    // Flip one character in the ciphertext region of the payload.
    let mut chars: Vec<char> = payload.chars().collect();
    let target = chars.len() - 8;
    chars[target] = if chars[target] == 'A' { 'B' } else { 'A' };
    let tampered = format!("<!-- LOCKDOWN_ENCRYPTED -->\n{}", chars.into_iter().collect::<String>());

    let result = service.decrypt_text(&tampered, &pw, &doc).await;
    assert!(matches!(result, Err(LockdownError::WrongPassword)));
}

#[tokio::test]
async fn test_filesystem_lock_unlock_round_trip() {
    let dir = tempfile::tempdir().expect("tempdir should be created");
    let store = Arc::new(FsDocumentStore::new(dir.path()));
    let doc = DocumentId::new("journal/today.md");
    store
        .write(&doc, "dear diary")
        .await
        .expect("seed write should succeed");

    let host = Host {
        store: store.clone(),
        prompter: Arc::new(StaticPrompter::with_password(password("correct horse"))),
        indicator: Arc::new(NoopIndicator),
    };
    let coordinator = LockCoordinator::load(
        host,
        EncryptionService::new(KdfParams::default()),
        VaultConfig::default(),
        CoordinatorConfig::default(),
    )
    .await
    .expect("coordinator should load");

    coordinator.lock_document(&doc).await.expect("lock should succeed");
    assert_eq!(coordinator.state(&doc), DocState::Locked);

    let on_disk = std::fs::read_to_string(dir.path().join("journal/today.md"))
        .expect("document should exist");
    assert!(Envelope::is_envelope(&on_disk));
    assert!(!on_disk.contains("dear diary"));

    let registry = std::fs::read_to_string(dir.path().join(".lockdown/registry.json"))
        .expect("registry should be persisted");
    assert!(registry.contains("journal/today.md"));
    assert!(registry.contains("lockedDocuments"));

    coordinator.unlock_document(&doc).await.expect("unlock should succeed");
    let on_disk = std::fs::read_to_string(dir.path().join("journal/today.md"))
        .expect("document should exist");
    assert_eq!(on_disk, "dear diary");
    assert_eq!(coordinator.state(&doc), DocState::Unlocked);
}
