//! Host collaborator contracts.
//!
//! The coordinator never touches files, terminals or widgets directly. It
//! talks to a [`DocumentStore`] for content, a [`Prompter`] for passwords and
//! confirmations, and a [`LockIndicator`] for lock-state rendering.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::crypto::Password;
use crate::document::DocumentId;
use crate::error::{LockdownError, Result};

/// A document's content changed in host storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub id: DocumentId,
    pub content: String,
}

/// Text storage addressed by document id.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Read a document's full text. Missing documents are `NotFound`.
    async fn read(&self, id: &DocumentId) -> Result<String>;

    async fn write(&self, id: &DocumentId, content: &str) -> Result<()>;

    /// Whether a document or container exists at `path`.
    async fn exists(&self, path: &str) -> Result<bool>;

    async fn mkdir(&self, path: &str) -> Result<()>;

    /// Every document (transitively) inside `container`, sorted.
    async fn list(&self, container: &str) -> Result<Vec<DocumentId>>;
}

/// User interaction.
#[async_trait]
pub trait Prompter: Send + Sync {
    /// Ask for a password. `None` means the user cancelled.
    async fn request_password(&self, prompt: &str, is_new: bool) -> Option<Password>;

    /// Ask a yes/no question. `None` means the user cancelled.
    async fn request_confirmation(&self, message: &str) -> Option<bool>;
}

/// What a host should render next to a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndicatorState {
    Locked,
    Unlocked,
    Busy,
}

/// Idempotent lock-state sink.
pub trait LockIndicator: Send + Sync {
    fn apply(&self, id: &DocumentId, state: IndicatorState);
}

/// Indicator that renders nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopIndicator;

impl LockIndicator for NoopIndicator {
    fn apply(&self, _id: &DocumentId, _state: IndicatorState) {}
}

/// Prompter answering every request with fixed values.
///
/// For scripted and non-interactive hosts.
#[derive(Debug, Clone)]
pub struct StaticPrompter {
    password: Option<Password>,
    confirm: Option<bool>,
}

impl StaticPrompter {
    pub fn new(password: Option<Password>, confirm: Option<bool>) -> Self {
        Self { password, confirm }
    }

    pub fn with_password(password: Password) -> Self {
        Self::new(Some(password), Some(true))
    }

    pub fn cancelling() -> Self {
        Self::new(None, None)
    }
}

#[async_trait]
impl Prompter for StaticPrompter {
    async fn request_password(&self, _prompt: &str, _is_new: bool) -> Option<Password> {
        self.password.clone()
    }

    async fn request_confirmation(&self, _message: &str) -> Option<bool> {
        self.confirm
    }
}

/// In-memory document store.
///
/// Every successful write is published to all subscribers, like a host that
/// reports its own saves back as change notifications. Reads and writes
/// yield to the scheduler first, so concurrent callers interleave at the same
/// points they would against real storage.
#[derive(Default)]
pub struct MemoryStore {
    documents: Mutex<BTreeMap<String, String>>,
    containers: Mutex<BTreeSet<String>>,
    subscribers: Mutex<Vec<mpsc::UnboundedSender<ChangeEvent>>>,
    fail_writes: AtomicBool,
    failing_ids: Mutex<BTreeSet<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a document without publishing a change.
    pub fn insert(&self, id: impl Into<String>, content: impl Into<String>) {
        self.documents.lock().insert(id.into(), content.into());
    }

    /// Synchronous snapshot of a document.
    pub fn get(&self, id: &str) -> Option<String> {
        self.documents.lock().get(id).cloned()
    }

    pub fn remove(&self, id: &str) -> Option<String> {
        self.documents.lock().remove(id)
    }

    /// Receive a [`ChangeEvent`] for every subsequent write.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<ChangeEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        rx
    }

    /// Make subsequent writes fail with a storage error.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
        if !fail {
            self.failing_ids.lock().clear();
        }
    }

    /// Make subsequent writes to one document fail.
    pub fn fail_writes_to(&self, id: impl Into<String>) {
        self.failing_ids.lock().insert(id.into());
    }

    fn publish(&self, event: ChangeEvent) {
        self.subscribers
            .lock()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn read(&self, id: &DocumentId) -> Result<String> {
        tokio::task::yield_now().await;
        self.get(id.as_str())
            .ok_or_else(|| LockdownError::NotFound(format!("Document {}", id)))
    }

    async fn write(&self, id: &DocumentId, content: &str) -> Result<()> {
        tokio::task::yield_now().await;
        if self.fail_writes.load(Ordering::SeqCst) || self.failing_ids.lock().contains(id.as_str()) {
            return Err(LockdownError::Storage(format!("Write to {} failed", id)));
        }
        self.documents
            .lock()
            .insert(id.as_str().to_string(), content.to_string());
        self.publish(ChangeEvent {
            id: id.clone(),
            content: content.to_string(),
        });
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let key = path.trim_matches('/');
        if self.documents.lock().contains_key(key) || self.containers.lock().contains(key) {
            return Ok(true);
        }
        Ok(self
            .documents
            .lock()
            .keys()
            .any(|doc| DocumentId::new(doc.as_str()).is_within(key)))
    }

    async fn mkdir(&self, path: &str) -> Result<()> {
        self.containers
            .lock()
            .insert(path.trim_matches('/').to_string());
        Ok(())
    }

    async fn list(&self, container: &str) -> Result<Vec<DocumentId>> {
        Ok(self
            .documents
            .lock()
            .keys()
            .map(|doc| DocumentId::new(doc.as_str()))
            .filter(|doc| doc.is_within(container))
            .collect())
    }
}
