//! # Lockdown Core
//!
//! Core library for Lockdown - password-locking individual notes and folders
//! inside a document vault.
//!
//! This crate provides the encryption, envelope format, lock registry and
//! lock coordination logic, independent of any particular host (editor
//! plugin, CLI, file watcher).
//!
//! ## Architecture
//!
//! - **crypto**: Password handling, PBKDF2 key derivation, AES-256-GCM
//! - **envelope**: Marker + base64 wire format, with corruption recovery
//! - **service**: Encrypt/decrypt of whole documents
//! - **vault**: In-memory password cache with an inactivity timeout
//! - **registry**: Persisted set of locked documents and folders
//! - **host**: Store, prompt and indicator contracts the host implements
//! - **fs**: Filesystem-backed document store
//! - **coordinator**: Per-document lock state machine and orchestration

pub mod coordinator;
pub mod crypto;
pub mod document;
pub mod envelope;
pub mod error;
pub mod fs;
pub mod host;
pub mod registry;
pub mod service;
pub mod vault;

pub use coordinator::{ChangeOutcome, CoordinatorConfig, DocState, Host, LockCoordinator};
pub use crypto::{KdfParams, Password};
pub use document::DocumentId;
pub use envelope::Envelope;
pub use error::{LockdownError, Result};
pub use fs::FsDocumentStore;
pub use host::{ChangeEvent, DocumentStore, IndicatorState, LockIndicator, Prompter};
pub use registry::LockRegistry;
pub use service::EncryptionService;
pub use vault::{SessionVault, VaultConfig};

/// Core version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
