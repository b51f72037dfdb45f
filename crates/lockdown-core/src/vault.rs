//! In-memory session password cache.
//!
//! Holds per-document passwords plus one root slot. Two expiry paths run
//! independently:
//!
//! - lazy: a read of an entry idle longer than the timeout removes it
//! - timer: every store re-arms one shared timer; when it fires the whole
//!   vault is drained and the expiry callback runs once with what was
//!   drained
//!
//! A timeout of zero or less disables both.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::crypto::Password;
use crate::document::DocumentId;

/// Session vault settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VaultConfig {
    /// Idle timeout in minutes; `<= 0` keeps passwords for the process lifetime.
    pub timeout_minutes: i64,
}

impl VaultConfig {
    pub fn timeout(&self) -> Option<Duration> {
        if self.timeout_minutes <= 0 {
            None
        } else {
            Some(Duration::from_secs((self.timeout_minutes as u64).saturating_mul(60)))
        }
    }
}

impl Default for VaultConfig {
    fn default() -> Self {
        Self {
            timeout_minutes: 15,
        }
    }
}

/// Everything the expiry timer drained out of the vault.
#[derive(Debug, Default)]
pub struct ExpiredSession {
    pub documents: Vec<(DocumentId, Password)>,
    pub root: Option<Password>,
}

impl ExpiredSession {
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty() && self.root.is_none()
    }
}

type ExpiryCallback = Arc<dyn Fn(ExpiredSession) + Send + Sync>;

struct Entry {
    password: Password,
    last_used: Instant,
}

impl Entry {
    fn new(password: Password) -> Self {
        Self {
            password,
            last_used: Instant::now(),
        }
    }
}

#[derive(Default)]
struct VaultState {
    documents: HashMap<DocumentId, Entry>,
    root: Option<Entry>,
    timer: Option<JoinHandle<()>>,
    generation: u64,
}

impl VaultState {
    fn cancel_timer(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}

/// Time-bounded password cache keyed by document id.
pub struct SessionVault {
    state: Arc<Mutex<VaultState>>,
    timeout: Option<Duration>,
    on_expire: Option<ExpiryCallback>,
}

impl SessionVault {
    pub fn new(config: VaultConfig) -> Self {
        Self {
            state: Arc::new(Mutex::new(VaultState::default())),
            timeout: config.timeout(),
            on_expire: None,
        }
    }

    /// Create a vault that reports timer expiry through `on_expire`.
    pub fn with_expiry<F>(config: VaultConfig, on_expire: F) -> Self
    where
        F: Fn(ExpiredSession) + Send + Sync + 'static,
    {
        Self {
            state: Arc::new(Mutex::new(VaultState::default())),
            timeout: config.timeout(),
            on_expire: Some(Arc::new(on_expire)),
        }
    }

    pub fn store_document_password(&self, id: &DocumentId, password: Password) {
        self.state.lock().documents.insert(id.clone(), Entry::new(password));
        self.rearm();
    }

    /// Cached password for `id`, refreshing its last-use time.
    pub fn get_document_password(&self, id: &DocumentId) -> Option<Password> {
        let mut state = self.state.lock();
        let expired = state
            .documents
            .get(id)
            .map(|entry| self.is_stale(entry))?;
        if expired {
            state.documents.remove(id);
            tracing::debug!(document = %id, "Evicted idle document password");
            return None;
        }
        let entry = state.documents.get_mut(id)?;
        entry.last_used = Instant::now();
        Some(entry.password.clone())
    }

    pub fn store_root_password(&self, password: Password) {
        self.state.lock().root = Some(Entry::new(password));
        self.rearm();
    }

    pub fn get_root_password(&self) -> Option<Password> {
        let mut state = self.state.lock();
        let expired = state.root.as_ref().map(|entry| self.is_stale(entry))?;
        if expired {
            state.root = None;
            tracing::debug!("Evicted idle root password");
            return None;
        }
        let entry = state.root.as_mut()?;
        entry.last_used = Instant::now();
        Some(entry.password.clone())
    }

    pub fn clear_document(&self, id: &DocumentId) {
        self.state.lock().documents.remove(id);
    }

    /// Drop every entry and the root slot, and disarm the timer.
    pub fn clear_all(&self) {
        let mut state = self.state.lock();
        state.documents.clear();
        state.root = None;
        state.cancel_timer();
    }

    /// Ids with a live cached password, sorted.
    pub fn cached_documents(&self) -> Vec<DocumentId> {
        let state = self.state.lock();
        let mut ids: Vec<DocumentId> = state
            .documents
            .iter()
            .filter(|(_, entry)| !self.is_stale(entry))
            .map(|(id, _)| id.clone())
            .collect();
        ids.sort();
        ids
    }

    pub fn is_empty(&self) -> bool {
        let state = self.state.lock();
        state.documents.is_empty() && state.root.is_none()
    }

    fn is_stale(&self, entry: &Entry) -> bool {
        match self.timeout {
            Some(timeout) => entry.last_used.elapsed() > timeout,
            None => false,
        }
    }

    /// Restart the shared eviction timer from now.
    fn rearm(&self) {
        let Some(timeout) = self.timeout else {
            return;
        };
        let Ok(handle) = Handle::try_current() else {
            tracing::debug!("No async runtime; session timer not armed");
            return;
        };

        let mut state = self.state.lock();
        state.cancel_timer();
        let generation = state.generation;
        let weak = Arc::downgrade(&self.state);
        let on_expire = self.on_expire.clone();
        state.timer = Some(handle.spawn(async move {
            tokio::time::sleep(timeout).await;
            expire(weak, generation, on_expire);
        }));
    }
}

fn expire(state: Weak<Mutex<VaultState>>, generation: u64, on_expire: Option<ExpiryCallback>) {
    let Some(state) = state.upgrade() else {
        return;
    };
    let expired = {
        let mut state = state.lock();
        if state.generation != generation {
            return;
        }
        state.timer = None;
        let mut documents: Vec<(DocumentId, Password)> = state
            .documents
            .drain()
            .map(|(id, entry)| (id, entry.password))
            .collect();
        documents.sort_by(|a, b| a.0.cmp(&b.0));
        ExpiredSession {
            documents,
            root: state.root.take().map(|entry| entry.password),
        }
    };

    tracing::info!(
        documents = expired.documents.len(),
        root = expired.root.is_some(),
        "Session expired"
    );
    if let Some(callback) = on_expire {
        callback(expired);
    }
}

impl Drop for SessionVault {
    fn drop(&mut self) {
        self.state.lock().cancel_timer();
    }
}
