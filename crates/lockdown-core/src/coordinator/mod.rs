//! Lock coordinator.
//!
//! Reconciles user lock/unlock commands with the host's asynchronous change
//! notifications. Every document has one [`DocState`]; a transition is begun
//! synchronously (so two callers can never both start work on the same
//! document) and settled after the async work finishes. Work on different
//! documents interleaves freely.

mod container;
mod maintenance;
mod session;
pub mod state;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::crypto::Password;
use crate::document::DocumentId;
use crate::envelope::Envelope;
use crate::error::{LockdownError, Result};
use crate::host::{DocumentStore, LockIndicator, Prompter};
use crate::registry::LockRegistry;
use crate::service::EncryptionService;
use crate::vault::{ExpiredSession, SessionVault, VaultConfig};

pub use session::ChangeOutcome;
pub use state::{DocState, Effect, Input, LockKind, Rejection, Resting, UnlockKind};

/// Default location of the persisted registry inside host storage.
pub const DEFAULT_REGISTRY_PATH: &str = ".lockdown/registry.json";

/// How many times a lock re-encrypts when the document changes under it.
const SNAPSHOT_RETRIES: usize = 3;

/// Coordinator settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Prompted password attempts before giving up.
    pub max_password_attempts: u32,
    /// Keep passwords in the session vault after a successful lock/unlock.
    pub cache_passwords: bool,
    /// Registry location inside host storage.
    pub registry_path: String,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_password_attempts: 3,
            cache_passwords: true,
            registry_path: DEFAULT_REGISTRY_PATH.to_string(),
        }
    }
}

/// Host collaborators handed to the coordinator.
#[derive(Clone)]
pub struct Host {
    pub store: Arc<dyn DocumentStore>,
    pub prompter: Arc<dyn Prompter>,
    pub indicator: Arc<dyn LockIndicator>,
}

/// Where a cached password came from.
enum Source {
    Root,
    Cached(DocumentId),
}

pub struct LockCoordinator {
    store: Arc<dyn DocumentStore>,
    prompter: Arc<dyn Prompter>,
    indicator: Arc<dyn LockIndicator>,
    service: EncryptionService,
    vault: SessionVault,
    registry: Mutex<LockRegistry>,
    states: Mutex<HashMap<DocumentId, DocState>>,
    persist_lock: tokio::sync::Mutex<()>,
    expiry_rx: Mutex<Option<mpsc::UnboundedReceiver<ExpiredSession>>>,
    registry_id: DocumentId,
    config: CoordinatorConfig,
}

impl LockCoordinator {
    /// Build a coordinator and load the persisted registry.
    ///
    /// A missing registry file is an empty registry.
    pub async fn load(
        host: Host,
        service: EncryptionService,
        vault_config: VaultConfig,
        config: CoordinatorConfig,
    ) -> Result<Self> {
        let registry_id = DocumentId::new(config.registry_path.clone());
        let registry = match host.store.read(&registry_id).await {
            Ok(json) => LockRegistry::from_json(&json)?,
            Err(LockdownError::NotFound(_)) => LockRegistry::new(),
            Err(e) => return Err(e),
        };

        let (expiry_tx, expiry_rx) = mpsc::unbounded_channel();
        let vault = SessionVault::with_expiry(vault_config, move |expired| {
            let _ = expiry_tx.send(expired);
        });

        tracing::debug!(
            documents = registry.locked_documents().count(),
            containers = registry.locked_containers().count(),
            "Loaded lock registry"
        );

        Ok(Self {
            store: host.store,
            prompter: host.prompter,
            indicator: host.indicator,
            service,
            vault,
            registry: Mutex::new(registry),
            states: Mutex::new(HashMap::new()),
            persist_lock: tokio::sync::Mutex::new(()),
            expiry_rx: Mutex::new(Some(expiry_rx)),
            registry_id,
            config,
        })
    }

    /// Current state of a document.
    pub fn state(&self, id: &DocumentId) -> DocState {
        let registered = self.registry.lock().is_document_locked(id);
        let states = self.states.lock();
        Self::current(&states, id, registered)
    }

    /// Snapshot of the registry.
    pub fn registry(&self) -> LockRegistry {
        self.registry.lock().clone()
    }

    pub fn vault(&self) -> &SessionVault {
        &self.vault
    }

    pub fn set_root_password(&self, password: Password) {
        self.vault.store_root_password(password);
    }

    /// Encrypt a document in place and register it as locked.
    ///
    /// Locking an already locked document is a no-op. Content that is
    /// already an envelope is adopted once the password is proven to open it.
    pub async fn lock_document(&self, id: &DocumentId) -> Result<()> {
        self.ensure_document(id)?;
        match self.begin(id, Input::Lock) {
            Ok(()) => {}
            Err(Rejection::Noop) => {
                tracing::debug!(document = %id, "Already locked");
                return Ok(());
            }
            Err(rejection) => return Err(self.rejected(id, rejection)),
        }

        match self.lock_inner(id).await {
            Ok(password) => {
                self.settle(id, Input::Finished, Some(&password));
                tracing::info!(document = %id, "Locked document");
                Ok(())
            }
            Err(e) => {
                self.settle(id, Input::Aborted, None);
                tracing::warn!(document = %id, error = %e, "Lock aborted");
                Err(e)
            }
        }
    }

    async fn lock_inner(&self, id: &DocumentId) -> Result<Password> {
        let mut snapshot = self.store.read(id).await?;

        let (mut envelope, password) = if Envelope::is_envelope(&snapshot) {
            let envelope = Envelope::decode(&snapshot)?;
            let existing = &envelope;
            let ((), password) = self
                .with_password(id, false, move |pw| async move {
                    self.service.decrypt(existing, &pw, id).await.map(|_| ())
                })
                .await?;
            tracing::debug!(document = %id, "Adopting existing envelope");
            (envelope, password)
        } else {
            let plaintext = snapshot.as_str();
            self.with_password(id, true, move |pw| async move {
                self.service.encrypt(plaintext, &pw, id).await
            })
            .await?
        };

        // The host may have saved again while the KDF ran.
        let mut retries = 0;
        loop {
            let current = self.store.read(id).await?;
            if current == snapshot {
                break;
            }
            retries += 1;
            if retries > SNAPSHOT_RETRIES || Envelope::is_envelope(&current) {
                return Err(LockdownError::Busy(format!(
                    "{} kept changing while it was being locked",
                    id
                )));
            }
            tracing::debug!(document = %id, retries, "Content changed during lock; re-encrypting");
            envelope = self.service.encrypt(&current, &password, id).await?;
            snapshot = current;
        }

        self.registry.lock().add_document(id, password.hash());
        if let Err(e) = self.persist_registry().await {
            self.registry.lock().remove_document(id);
            return Err(e);
        }

        if let Err(e) = self.store.write(id, &envelope.to_string()).await {
            self.registry.lock().remove_document(id);
            if let Err(persist_err) = self.persist_registry().await {
                tracing::warn!(document = %id, error = %persist_err, "Could not roll back registry");
            }
            return Err(e);
        }

        Ok(password)
    }

    /// Decrypt a document in place and drop it from the registry.
    ///
    /// The registry entry is removed and persisted before the plaintext is
    /// written. If that write fails the document is reported as still
    /// `Locked`; retrying the unlock completes it.
    pub async fn unlock_document(&self, id: &DocumentId) -> Result<()> {
        self.ensure_document(id)?;
        let registered = {
            let registry = self.registry.lock();
            if !registry.is_directly_locked(id) {
                if let Some(container) = registry.locking_container(id) {
                    return Err(LockdownError::InvalidInput(format!(
                        "{} is locked through folder {}; unlock the folder instead",
                        id, container
                    )));
                }
            }
            registry.is_directly_locked(id)
        };

        if !registered && self.state(id) == DocState::Unlocked {
            let content = self.store.read(id).await?;
            if !Envelope::is_envelope(&content) {
                tracing::debug!(document = %id, "Already unlocked");
                return Ok(());
            }
        }

        self.begin(id, Input::Unlock(UnlockKind::Permanent))
            .map_err(|rejection| self.rejected(id, rejection))?;

        match self.unlock_inner(id).await {
            Ok(password) => {
                self.settle(id, Input::Finished, password.as_ref());
                tracing::info!(document = %id, "Unlocked document");
                Ok(())
            }
            Err(e) => {
                self.settle(id, Input::Aborted, None);
                tracing::warn!(document = %id, error = %e, "Unlock aborted");
                Err(e)
            }
        }
    }

    async fn unlock_inner(&self, id: &DocumentId) -> Result<Option<Password>> {
        let content = self.store.read(id).await?;
        if !Envelope::is_envelope(&content) {
            // Registered but stored as plaintext: only the registry is stale.
            self.registry.lock().remove_document(id);
            self.persist_registry().await?;
            return Ok(None);
        }

        let envelope = Envelope::decode(&content)?;
        let envelope = &envelope;
        let (plaintext, password) = self
            .with_password(id, false, move |pw| async move {
                self.service.decrypt(envelope, &pw, id).await
            })
            .await?;

        let previous_hash = {
            let mut registry = self.registry.lock();
            let hash = registry.verification_hash_for(id).map(str::to_string);
            registry.remove_document(id).then_some(hash)
        };
        if let Err(e) = self.persist_registry().await {
            if let Some(hash) = previous_hash {
                self.registry
                    .lock()
                    .add_document(id, hash.unwrap_or_default());
            }
            return Err(e);
        }
        self.store.write(id, &plaintext).await?;

        Ok(Some(password))
    }

    /// Decrypt a document for viewing without changing storage or registry.
    ///
    /// The document ends `Unlocked` with its password cached, so later edits
    /// are re-encrypted by [`LockCoordinator::handle_change`].
    pub async fn open_document(&self, id: &DocumentId) -> Result<String> {
        self.ensure_document(id)?;
        let content = self.store.read(id).await?;
        if !Envelope::is_envelope(&content) {
            return Ok(content);
        }
        let envelope = Envelope::decode(&content)?;

        self.begin(id, Input::Unlock(UnlockKind::Session))
            .map_err(|rejection| self.rejected(id, rejection))?;

        let existing = &envelope;
        let result = self
            .with_password(id, false, move |pw| async move {
                self.service.decrypt(existing, &pw, id).await
            })
            .await;

        match result {
            Ok((plaintext, password)) => {
                self.settle(id, Input::Finished, Some(&password));
                tracing::info!(document = %id, "Opened document for this session");
                Ok(plaintext)
            }
            Err(e) => {
                self.settle(id, Input::Aborted, None);
                Err(e)
            }
        }
    }

    // ---- state bookkeeping ----

    fn current(states: &HashMap<DocumentId, DocState>, id: &DocumentId, registered: bool) -> DocState {
        states.get(id).copied().unwrap_or(if registered {
            DocState::Locked
        } else {
            DocState::Unlocked
        })
    }

    /// Start a transition. Nothing is mutated on rejection.
    fn begin(&self, id: &DocumentId, input: Input) -> std::result::Result<(), Rejection> {
        self.begin_all(std::slice::from_ref(id), input)
    }

    /// Start the same transition on several documents, all or none.
    fn begin_all(&self, ids: &[DocumentId], input: Input) -> std::result::Result<(), Rejection> {
        let registered: Vec<bool> = {
            let registry = self.registry.lock();
            ids.iter().map(|id| registry.is_document_locked(id)).collect()
        };

        let effects = {
            let mut states = self.states.lock();
            let mut steps = Vec::with_capacity(ids.len());
            for (id, registered) in ids.iter().zip(registered) {
                let step = state::transition(Self::current(&states, id, registered), input)?;
                steps.push((id.clone(), step));
            }
            let mut effects = Vec::new();
            for (id, step) in steps {
                tracing::debug!(document = %id, next = ?step.next, "Transition started");
                states.insert(id.clone(), step.next);
                effects.push((id, step.effects));
            }
            effects
        };

        for (id, effects) in effects {
            self.apply_effects(&id, &effects, None);
        }
        Ok(())
    }

    /// Finish the in-flight transition for `id`.
    fn settle(&self, id: &DocumentId, input: Input, password: Option<&Password>) {
        let step = {
            let registered = self.registry.lock().is_document_locked(id);
            let mut states = self.states.lock();
            match state::transition(Self::current(&states, id, registered), input) {
                Ok(step) => {
                    states.insert(id.clone(), step.next);
                    step
                }
                Err(rejection) => {
                    tracing::warn!(document = %id, ?input, ?rejection, "Unexpected settle");
                    return;
                }
            }
        };
        tracing::debug!(document = %id, next = ?step.next, "Transition settled");
        self.apply_effects(id, &step.effects, password);
    }

    /// Drop the explicit state so it is derived from the registry again.
    fn reset_state(&self, id: &DocumentId) {
        self.states.lock().remove(id);
        let state = self.state(id);
        self.indicator.apply(id, state.indicator());
    }

    fn apply_effects(&self, id: &DocumentId, effects: &[Effect], password: Option<&Password>) {
        for effect in effects {
            match effect {
                Effect::Indicate(indicator) => self.indicator.apply(id, *indicator),
                Effect::CachePassword => {
                    if let (true, Some(password)) = (self.config.cache_passwords, password) {
                        self.vault.store_document_password(id, password.clone());
                    }
                }
                Effect::EvictPassword => self.vault.clear_document(id),
            }
        }
    }

    fn rejected(&self, id: &DocumentId, rejection: Rejection) -> LockdownError {
        match rejection {
            Rejection::Busy => LockdownError::Busy(id.to_string()),
            Rejection::Noop => LockdownError::InvalidInput(format!("{} is already in that state", id)),
            Rejection::Invalid => {
                LockdownError::InvalidInput(format!("Invalid lock transition for {}", id))
            }
        }
    }

    fn is_registry_file(&self, id: &DocumentId) -> bool {
        *id == self.registry_id
    }

    fn ensure_document(&self, id: &DocumentId) -> Result<()> {
        if self.is_registry_file(id) {
            return Err(LockdownError::InvalidInput(format!(
                "{} is the lock registry, not a document",
                id
            )));
        }
        Ok(())
    }

    // ---- credentials ----

    /// Cached passwords worth trying for `id`, in order: root, the
    /// document's own entry, then registered ancestor containers nearest
    /// first.
    fn cached_candidates(&self, id: &DocumentId) -> Vec<(Source, Password)> {
        let mut candidates = Vec::new();
        if let Some(root) = self.vault.get_root_password() {
            candidates.push((Source::Root, root));
        }
        if let Some(own) = self.vault.get_document_password(id) {
            candidates.push((Source::Cached(id.clone()), own));
        }
        for ancestor in id.ancestors().into_iter().rev() {
            let container = DocumentId::new(ancestor);
            if let Some(password) = self.vault.get_document_password(&container) {
                candidates.push((Source::Cached(container), password));
            }
        }
        candidates
    }

    fn forget(&self, source: &Source) {
        if let Source::Cached(id) = source {
            tracing::debug!(document = %id, "Evicting stale cached password");
            self.vault.clear_document(id);
        }
    }

    /// First cached credential that passes the verification hash, without
    /// prompting.
    fn cached_credential(&self, id: &DocumentId) -> Option<Password> {
        let expected = self
            .registry
            .lock()
            .verification_hash_for(id)
            .map(str::to_string);
        // Document and container entries are more specific than root.
        let (root, specific): (Vec<_>, Vec<_>) = self
            .cached_candidates(id)
            .into_iter()
            .partition(|(source, _)| matches!(source, Source::Root));
        specific
            .into_iter()
            .chain(root)
            .map(|(_, password)| password)
            .find(|password| expected.as_deref().map_or(true, |hash| password.verify(hash)))
    }

    /// Run `op` with a password: cached candidates first, then up to
    /// `max_password_attempts` prompts.
    ///
    /// Candidates that fail the registry verification hash never reach
    /// `op`. `WrongPassword` and `Validation` from `op` move on to the next
    /// candidate; any other error ends the search.
    async fn with_password<T, F, Fut>(
        &self,
        id: &DocumentId,
        is_new: bool,
        op: F,
    ) -> Result<(T, Password)>
    where
        F: Fn(Password) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let expected = self
            .registry
            .lock()
            .verification_hash_for(id)
            .map(str::to_string);

        for (source, candidate) in self.cached_candidates(id) {
            if let Some(hash) = &expected {
                if !candidate.verify(hash) {
                    self.forget(&source);
                    continue;
                }
            }
            match op(candidate.clone()).await {
                Ok(value) => return Ok((value, candidate)),
                Err(LockdownError::WrongPassword) => self.forget(&source),
                Err(e) if e.is_retryable() => {}
                Err(e) => return Err(e),
            }
        }

        let attempts = self.config.max_password_attempts.max(1);
        let mut last_err = LockdownError::WrongPassword;
        for attempt in 0..attempts {
            let prompt = prompt_text(id, is_new, attempt, attempts);
            let Some(candidate) = self.prompter.request_password(&prompt, is_new).await else {
                return Err(LockdownError::Cancelled);
            };
            if let Some(hash) = &expected {
                if !candidate.verify(hash) {
                    last_err = LockdownError::WrongPassword;
                    continue;
                }
            }
            match op(candidate.clone()).await {
                Ok(value) => return Ok((value, candidate)),
                Err(e) if e.is_retryable() => last_err = e,
                Err(e) => return Err(e),
            }
        }
        Err(last_err)
    }

    // ---- persistence ----

    async fn persist_registry(&self) -> Result<()> {
        let _guard = self.persist_lock.lock().await;
        if let Some((dir, _)) = self.config.registry_path.rsplit_once('/') {
            self.store.mkdir(dir).await?;
        }
        let json = self.registry.lock().to_json()?;
        self.store.write(&self.registry_id, &json).await
    }
}

fn prompt_text(id: &DocumentId, is_new: bool, attempt: u32, attempts: u32) -> String {
    let base = if is_new {
        format!("New password for {}", id)
    } else {
        format!("Password for {}", id)
    };
    if attempt == 0 {
        base
    } else {
        format!(
            "Incorrect password. {} attempts remaining. {}",
            attempts - attempt,
            base
        )
    }
}
