//! Folder (container) locking.
//!
//! A locked container covers every document beneath it except documents
//! locked on their own and documents inside a nested locked container; those
//! keep their own password.

use super::{Input, LockCoordinator, UnlockKind};
use crate::document::DocumentId;
use crate::envelope::Envelope;
use crate::error::{LockdownError, Result};

fn normalize(container: &str) -> String {
    container.trim_matches('/').to_string()
}

impl LockCoordinator {
    /// Documents under `container` that the container's password covers.
    async fn covered_documents(&self, container: &str) -> Result<Vec<DocumentId>> {
        let listed = self.store.list(container).await?;
        let registry = self.registry.lock();
        let nested: Vec<String> = registry
            .locked_containers()
            .filter(|other| *other != container && DocumentId::new(*other).is_within(container))
            .map(str::to_string)
            .collect();

        Ok(listed
            .into_iter()
            .filter(|id| !self.is_registry_file(id))
            .filter(|id| !registry.is_directly_locked(id))
            .filter(|id| !nested.iter().any(|n| id.is_within(n)))
            .collect())
    }

    /// Encrypt every plaintext document in `container` under one new
    /// password and register the container.
    ///
    /// Everything is encrypted in memory first; a failure there touches
    /// neither the registry nor storage.
    pub async fn lock_container(&self, container: &str) -> Result<usize> {
        let container = normalize(container);
        if container.is_empty() {
            return Err(LockdownError::InvalidInput(
                "Refusing to lock the vault root as a folder".to_string(),
            ));
        }
        if self.registry.lock().is_container_locked(&container) {
            tracing::debug!(container = %container, "Folder already locked");
            return Ok(0);
        }
        if !self.store.exists(&container).await? {
            return Err(LockdownError::NotFound(format!("Folder {}", container)));
        }

        let confirmed = self
            .prompter
            .request_confirmation(&format!(
                "Lock every document in {}? New documents added there will be locked too.",
                container
            ))
            .await;
        if confirmed != Some(true) {
            return Err(LockdownError::Cancelled);
        }

        let mut targets = Vec::new();
        for id in self.covered_documents(&container).await? {
            let content = self.store.read(&id).await?;
            if Envelope::is_envelope(&content) {
                tracing::debug!(document = %id, "Skipping already encrypted document");
                continue;
            }
            targets.push((id, content));
        }
        let ids: Vec<DocumentId> = targets.iter().map(|(id, _)| id.clone()).collect();

        self.begin_all(&ids, Input::Lock)
            .map_err(|rejection| self.rejected(&DocumentId::new(container.as_str()), rejection))?;

        let container_id = DocumentId::new(container.as_str());
        let targets = &targets;
        let encrypted = self
            .with_password(&container_id, true, move |pw| async move {
                let mut sealed = Vec::with_capacity(targets.len());
                for (id, content) in targets {
                    sealed.push(self.service.encrypt(content, &pw, id).await?);
                }
                Ok::<_, LockdownError>(sealed)
            })
            .await;

        let (envelopes, password) = match encrypted {
            Ok(result) => result,
            Err(e) => {
                for id in &ids {
                    self.settle(id, Input::Aborted, None);
                }
                return Err(e);
            }
        };

        self.registry
            .lock()
            .add_container(&container, password.hash());
        if let Err(e) = self.persist_registry().await {
            self.registry.lock().remove_container(&container);
            for id in &ids {
                self.settle(id, Input::Aborted, None);
            }
            return Err(e);
        }
        if self.config.cache_passwords {
            self.vault
                .store_document_password(&container_id, password.clone());
        }

        let mut first_err = None;
        for (id, envelope) in ids.iter().zip(envelopes) {
            match self.store.write(id, &envelope.to_string()).await {
                Ok(()) => self.settle(id, Input::Finished, Some(&password)),
                Err(e) => {
                    tracing::warn!(document = %id, error = %e, "Folder lock write failed");
                    self.settle(id, Input::Aborted, None);
                    first_err.get_or_insert(e);
                }
            }
        }
        if let Some(e) = first_err {
            return Err(e);
        }

        tracing::info!(container = %container, documents = ids.len(), "Locked folder");
        Ok(ids.len())
    }

    /// Decrypt every envelope in `container` and drop the container from the
    /// registry.
    ///
    /// All documents are decrypted in memory before anything is written; one
    /// failure leaves the whole folder locked.
    pub async fn unlock_container(&self, container: &str) -> Result<usize> {
        let container = normalize(container);
        if !self.registry.lock().is_container_locked(&container) {
            return Err(LockdownError::InvalidInput(format!(
                "Folder {} is not locked",
                container
            )));
        }

        let mut targets = Vec::new();
        for id in self.covered_documents(&container).await? {
            let content = self.store.read(&id).await?;
            if Envelope::is_envelope(&content) {
                targets.push((id, Envelope::decode(&content)?));
            }
        }
        let ids: Vec<DocumentId> = targets.iter().map(|(id, _)| id.clone()).collect();

        let container_id = DocumentId::new(container.as_str());
        self.begin_all(&ids, Input::Unlock(UnlockKind::Permanent))
            .map_err(|rejection| self.rejected(&container_id, rejection))?;

        let targets = &targets;
        let decrypted = self
            .with_password(&container_id, false, move |pw| async move {
                let mut plaintexts = Vec::with_capacity(targets.len());
                for (id, envelope) in targets {
                    plaintexts.push(self.service.decrypt(envelope, &pw, id).await?);
                }
                Ok::<_, LockdownError>(plaintexts)
            })
            .await;

        let (plaintexts, password) = match decrypted {
            Ok(result) => result,
            Err(e) => {
                for id in &ids {
                    self.settle(id, Input::Aborted, None);
                }
                return Err(e);
            }
        };

        let previous_hash = {
            let mut registry = self.registry.lock();
            let hash = registry
                .verification_hash_for(&container_id)
                .map(str::to_string);
            registry.remove_container(&container);
            hash
        };
        if let Err(e) = self.persist_registry().await {
            self.registry
                .lock()
                .add_container(&container, previous_hash.unwrap_or_default());
            for id in &ids {
                self.settle(id, Input::Aborted, None);
            }
            return Err(e);
        }
        self.vault.clear_document(&container_id);

        let mut first_err = None;
        for (id, plaintext) in ids.iter().zip(plaintexts) {
            match self.store.write(id, &plaintext).await {
                Ok(()) => self.settle(id, Input::Finished, Some(&password)),
                Err(e) => {
                    tracing::warn!(document = %id, error = %e, "Folder unlock write failed");
                    self.settle(id, Input::Aborted, None);
                    first_err.get_or_insert(e);
                }
            }
        }
        if let Some(e) = first_err {
            return Err(e);
        }

        tracing::info!(container = %container, documents = ids.len(), "Unlocked folder");
        Ok(ids.len())
    }
}
