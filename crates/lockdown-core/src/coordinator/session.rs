//! Change notifications, session expiry and teardown.

use std::collections::BTreeMap;

use tokio::sync::mpsc;

use super::{DocState, Input, LockCoordinator, Rejection};
use crate::crypto::Password;
use crate::document::DocumentId;
use crate::envelope::Envelope;
use crate::error::{LockdownError, Result};
use crate::host::ChangeEvent;
use crate::vault::ExpiredSession;

/// What a change notification led to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOutcome {
    /// Not a locked document, already encrypted, or no cached credential.
    Ignored,
    /// Another transition was in flight, or the content moved on before the
    /// write.
    Suppressed,
    /// The new content was encrypted and written back.
    Relocked,
}

impl LockCoordinator {
    /// React to new content reported by the host.
    ///
    /// Plaintext that lands on a registered document is re-encrypted with a
    /// cached credential (document, enclosing folder, or root). Nothing is
    /// ever prompted for here.
    pub async fn handle_change(&self, event: ChangeEvent) -> Result<ChangeOutcome> {
        let ChangeEvent { id, content } = event;
        if self.is_registry_file(&id) || Envelope::is_envelope(&content) {
            return Ok(ChangeOutcome::Ignored);
        }
        if !self.registry.lock().is_document_locked(&id) {
            return Ok(ChangeOutcome::Ignored);
        }
        let Some(password) = self.cached_credential(&id) else {
            tracing::debug!(document = %id, "Edited locked document has no cached credential");
            return Ok(ChangeOutcome::Ignored);
        };

        self.relock(&id, &content, &password).await
    }

    /// Re-encrypt `content` and write it back, staying in the current
    /// settled state.
    pub(super) async fn relock(
        &self,
        id: &DocumentId,
        content: &str,
        password: &Password,
    ) -> Result<ChangeOutcome> {
        match self.begin(id, Input::ContentChanged) {
            Ok(()) => {}
            Err(Rejection::Busy) => {
                tracing::debug!(document = %id, "Re-lock suppressed; transition in flight");
                return Ok(ChangeOutcome::Suppressed);
            }
            Err(rejection) => return Err(self.rejected(id, rejection)),
        }

        let result = self.relock_inner(id, content, password).await;
        let input = match result {
            Ok(ChangeOutcome::Relocked) => Input::Finished,
            _ => Input::Aborted,
        };
        self.settle(id, input, None);
        if let Err(e) = &result {
            tracing::warn!(document = %id, error = %e, "Re-lock failed");
        }
        result
    }

    async fn relock_inner(
        &self,
        id: &DocumentId,
        content: &str,
        password: &Password,
    ) -> Result<ChangeOutcome> {
        let envelope = self.service.encrypt(content, password, id).await?;

        // Decision and write are separated by the KDF; check again.
        let current = self.store.read(id).await?;
        if current != content || !self.registry.lock().is_document_locked(id) {
            tracing::debug!(document = %id, "Content moved on before re-lock write");
            return Ok(ChangeOutcome::Suppressed);
        }

        self.store.write(id, &envelope.to_string()).await?;
        tracing::info!(document = %id, "Re-locked edited document");
        Ok(ChangeOutcome::Relocked)
    }

    /// Force every open document back to `Locked` after the vault expired.
    ///
    /// Plaintext on disk is re-encrypted with the drained credential (or the
    /// drained root password) before the document is marked locked.
    pub async fn handle_session_expired(&self, expired: ExpiredSession) {
        let ExpiredSession { documents, root } = expired;
        let mut targets: BTreeMap<DocumentId, Option<Password>> = documents
            .into_iter()
            .map(|(id, password)| (id, Some(password)))
            .collect();

        let open: Vec<DocumentId> = self
            .states
            .lock()
            .iter()
            .filter(|(_, state)| **state == DocState::Unlocked)
            .map(|(id, _)| id.clone())
            .collect();
        for id in open {
            targets.entry(id).or_insert(None);
        }

        for (id, password) in targets {
            if !self.registry.lock().is_document_locked(&id) {
                continue;
            }
            let password = password.or_else(|| root.clone());
            match self.store.read(&id).await {
                Ok(content) if !Envelope::is_envelope(&content) => match &password {
                    Some(password) => {
                        if let Err(e) = self.relock(&id, &content, password).await {
                            tracing::warn!(document = %id, error = %e, "Expiry re-lock failed");
                        }
                    }
                    None => {
                        tracing::warn!(document = %id, "No credential to re-lock plaintext at expiry");
                    }
                },
                Ok(_) => {}
                Err(e) => tracing::warn!(document = %id, error = %e, "Could not read document at expiry"),
            }

            match self.begin(&id, Input::SessionExpired) {
                Ok(()) => {}
                Err(rejection) => {
                    tracing::debug!(document = %id, ?rejection, "Expiry deferred to in-flight transition");
                }
            }
        }
    }

    /// Service host change events and vault expiry until `changes` closes.
    pub async fn run(&self, mut changes: mpsc::UnboundedReceiver<ChangeEvent>) -> Result<()> {
        let mut expiry = self
            .expiry_rx
            .lock()
            .take()
            .ok_or_else(|| LockdownError::InvalidInput("Coordinator is already running".into()))?;

        loop {
            tokio::select! {
                event = changes.recv() => match event {
                    Some(event) => {
                        let id = event.id.clone();
                        match self.handle_change(event).await {
                            Ok(outcome) => tracing::debug!(document = %id, ?outcome, "Handled change"),
                            Err(e) => tracing::warn!(document = %id, error = %e, "Change handling failed"),
                        }
                    }
                    None => break,
                },
                Some(expired) = expiry.recv() => self.handle_session_expired(expired).await,
            }
        }

        *self.expiry_rx.lock() = Some(expiry);
        Ok(())
    }

    /// Teardown: re-lock every open document with its cached credential and
    /// clear the vault.
    pub async fn shutdown(&self) {
        let root = self.vault.get_root_password();
        let documents: Vec<(DocumentId, Password)> = self
            .vault
            .cached_documents()
            .into_iter()
            .filter_map(|id| self.vault.get_document_password(&id).map(|pw| (id, pw)))
            .collect();
        self.vault.clear_all();

        self.handle_session_expired(ExpiredSession { documents, root })
            .await;
        tracing::info!("Session closed");
    }
}
