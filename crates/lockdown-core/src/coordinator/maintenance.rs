//! Registry pruning, relocation and envelope repair.

use super::{Input, LockCoordinator, UnlockKind};
use crate::document::DocumentId;
use crate::envelope::Envelope;
use crate::error::{LockdownError, Result};

impl LockCoordinator {
    /// Drop registry entries whose document or folder no longer exists.
    ///
    /// Returns the removed ids.
    pub async fn prune_missing(&self) -> Result<Vec<String>> {
        let (documents, containers): (Vec<String>, Vec<String>) = {
            let registry = self.registry.lock();
            (
                registry.locked_documents().map(str::to_string).collect(),
                registry.locked_containers().map(str::to_string).collect(),
            )
        };

        let mut removed = Vec::new();
        for id in documents {
            if !self.store.exists(&id).await? {
                self.registry.lock().remove_document(&DocumentId::new(id.as_str()));
                removed.push(id);
            }
        }
        for container in containers {
            if !self.store.exists(&container).await? {
                self.registry.lock().remove_container(&container);
                removed.push(container);
            }
        }

        if !removed.is_empty() {
            self.persist_registry().await?;
            for id in &removed {
                self.reset_state(&DocumentId::new(id.as_str()));
            }
            tracing::info!(removed = removed.len(), "Pruned missing registry entries");
        }
        Ok(removed)
    }

    /// Re-seal a locked document that the host moved from `from` to `to`.
    ///
    /// The envelope now stored at `to` was sealed for `from`; it is decrypted
    /// under the old id, encrypted under the new one, written back, and the
    /// registry entry follows it.
    pub async fn relocate(&self, from: &DocumentId, to: &DocumentId) -> Result<()> {
        self.ensure_document(from)?;
        self.ensure_document(to)?;
        if !self.registry.lock().is_directly_locked(from) {
            return Err(LockdownError::InvalidInput(format!("{} is not locked", from)));
        }
        if self.state(from).is_transient() {
            return Err(LockdownError::Busy(from.to_string()));
        }

        let content = self.store.read(to).await?;
        if !Envelope::is_envelope(&content) {
            return Err(LockdownError::InvalidInput(format!(
                "{} is not encrypted",
                to
            )));
        }
        let envelope = Envelope::decode(&content)?;

        // Guards `to` for the duration; `from` is only read from the vault.
        self.begin(to, Input::Unlock(UnlockKind::Session))
            .map_err(|rejection| self.rejected(to, rejection))?;

        let result = self.relocate_inner(from, to, &envelope).await;
        self.states.lock().remove(from);
        self.reset_state(to);

        match &result {
            Ok(()) => tracing::info!(from = %from, to = %to, "Relocated locked document"),
            Err(e) => tracing::warn!(from = %from, to = %to, error = %e, "Relocation failed"),
        }
        result
    }

    async fn relocate_inner(
        &self,
        from: &DocumentId,
        to: &DocumentId,
        envelope: &Envelope,
    ) -> Result<()> {
        let (plaintext, password) = self
            .with_password(from, false, move |pw| async move {
                self.service.decrypt(envelope, &pw, from).await
            })
            .await?;
        let resealed = self.service.encrypt(&plaintext, &password, to).await?;

        self.registry.lock().rename_document(from, to);
        if let Err(e) = self.persist_registry().await {
            self.registry.lock().rename_document(to, from);
            return Err(e);
        }
        if let Err(e) = self.store.write(to, &resealed.to_string()).await {
            self.registry.lock().rename_document(to, from);
            if let Err(persist) = self.persist_registry().await {
                tracing::warn!(from = %from, to = %to, error = %persist, "Failed to restore registry after relocation failure");
            }
            return Err(e);
        }

        self.vault.clear_document(from);
        if self.config.cache_passwords {
            self.vault.store_document_password(to, password);
        }
        Ok(())
    }

    /// Rewrite a corrupted or duplicated envelope in canonical form.
    ///
    /// The recovered envelope must decrypt before anything is written.
    /// Returns `false` when the stored text was already canonical. An exactly
    /// repeated payload counts as canonical only if the full payload
    /// authenticates.
    pub async fn repair_document(&self, id: &DocumentId) -> Result<bool> {
        self.ensure_document(id)?;
        let content = self.store.read(id).await?;
        if !Envelope::is_envelope(&content) {
            return Err(LockdownError::InvalidInput(format!("{} is not encrypted", id)));
        }
        let envelope = Envelope::decode(&content)?;
        if content.trim_end() == envelope.to_string() && envelope.repetition_half().is_none() {
            return Ok(false);
        }

        self.begin(id, Input::ContentChanged)
            .map_err(|rejection| self.rejected(id, rejection))?;

        let existing = &envelope;
        let result = async {
            let ((_, authenticated), _) = self
                .with_password(id, false, move |pw| async move {
                    self.service.decrypt_recovering(existing, &pw, id).await
                })
                .await?;
            let canonical = authenticated.to_string();
            if content.trim_end() == canonical {
                return Ok(false);
            }
            self.store.write(id, &canonical).await?;
            Ok::<_, LockdownError>(true)
        }
        .await;

        match result {
            Ok(repaired) => {
                self.settle(id, Input::Finished, None);
                if repaired {
                    tracing::info!(document = %id, "Repaired envelope");
                }
                Ok(repaired)
            }
            Err(e) => {
                self.settle(id, Input::Aborted, None);
                Err(e)
            }
        }
    }
}
