//! Durable record of locked documents and containers.
//!
//! Pure state: the coordinator owns persistence and calls
//! [`LockRegistry::to_json`] / [`LockRegistry::from_json`] at the storage
//! boundary.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::document::DocumentId;
use crate::error::Result;

/// Persisted registry shape: three parallel collections.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedRegistry {
    #[serde(default)]
    pub locked_documents: Vec<String>,
    #[serde(default)]
    pub locked_containers: Vec<String>,
    #[serde(default)]
    pub verification_hashes: BTreeMap<String, String>,
}

/// In-memory lock registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LockRegistry {
    documents: BTreeSet<String>,
    containers: BTreeSet<String>,
    hashes: BTreeMap<String, String>,
}

fn container_key(id: &str) -> String {
    id.trim_matches('/').to_string()
}

impl LockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_document(&mut self, id: &DocumentId, verification_hash: impl Into<String>) {
        self.documents.insert(id.as_str().to_string());
        self.hashes
            .insert(id.as_str().to_string(), verification_hash.into());
    }

    /// Returns whether the document was directly registered.
    pub fn remove_document(&mut self, id: &DocumentId) -> bool {
        self.hashes.remove(id.as_str());
        self.documents.remove(id.as_str())
    }

    pub fn add_container(&mut self, container: &str, verification_hash: impl Into<String>) {
        let key = container_key(container);
        self.containers.insert(key.clone());
        self.hashes.insert(key, verification_hash.into());
    }

    pub fn remove_container(&mut self, container: &str) -> bool {
        let key = container_key(container);
        self.hashes.remove(&key);
        self.containers.remove(&key)
    }

    /// Registered directly, or through any ancestor container.
    pub fn is_document_locked(&self, id: &DocumentId) -> bool {
        self.documents.contains(id.as_str()) || self.locking_container(id).is_some()
    }

    /// Registered directly (not through a container).
    pub fn is_directly_locked(&self, id: &DocumentId) -> bool {
        self.documents.contains(id.as_str())
    }

    pub fn is_container_locked(&self, container: &str) -> bool {
        self.containers.contains(&container_key(container))
    }

    /// Outermost registered ancestor container of `id`, walking from the
    /// root down.
    pub fn locking_container(&self, id: &DocumentId) -> Option<&str> {
        id.ancestors()
            .into_iter()
            .find(|ancestor| self.containers.contains(*ancestor))
            .and_then(|ancestor| self.containers.get(ancestor).map(String::as_str))
    }

    /// Verification hash for `id`: its own entry, else the nearest
    /// registered ancestor container.
    pub fn verification_hash_for(&self, id: &DocumentId) -> Option<&str> {
        if let Some(hash) = self.hashes.get(id.as_str()) {
            return Some(hash);
        }
        id.ancestors()
            .into_iter()
            .rev()
            .filter(|ancestor| self.containers.contains(*ancestor))
            .find_map(|ancestor| self.hashes.get(ancestor).map(String::as_str))
    }

    /// Move a document entry (and its hash) from `from` to `to`.
    pub fn rename_document(&mut self, from: &DocumentId, to: &DocumentId) -> bool {
        if !self.documents.remove(from.as_str()) {
            return false;
        }
        self.documents.insert(to.as_str().to_string());
        if let Some(hash) = self.hashes.remove(from.as_str()) {
            self.hashes.insert(to.as_str().to_string(), hash);
        }
        true
    }

    pub fn locked_documents(&self) -> impl Iterator<Item = &str> {
        self.documents.iter().map(String::as_str)
    }

    pub fn locked_containers(&self) -> impl Iterator<Item = &str> {
        self.containers.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty() && self.containers.is_empty()
    }

    pub fn to_persisted(&self) -> PersistedRegistry {
        PersistedRegistry {
            locked_documents: self.documents.iter().cloned().collect(),
            locked_containers: self.containers.iter().cloned().collect(),
            verification_hashes: self.hashes.clone(),
        }
    }

    /// Rebuild from the persisted shape. Hashes for ids that are in neither
    /// list are dropped.
    pub fn from_persisted(persisted: PersistedRegistry) -> Self {
        let documents: BTreeSet<String> = persisted.locked_documents.into_iter().collect();
        let containers: BTreeSet<String> = persisted
            .locked_containers
            .iter()
            .map(|c| container_key(c))
            .collect();
        let hashes = persisted
            .verification_hashes
            .into_iter()
            .filter(|(id, _)| documents.contains(id) || containers.contains(id))
            .collect();
        Self {
            documents,
            containers,
            hashes,
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_persisted())?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        if json.trim().is_empty() {
            return Ok(Self::new());
        }
        let persisted: PersistedRegistry = serde_json::from_str(json)?;
        Ok(Self::from_persisted(persisted))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direct_document_lock() {
        let mut registry = LockRegistry::new();
        let id = DocumentId::new("notes/a.md");
        registry.add_document(&id, "hash-a");

        assert!(registry.is_document_locked(&id));
        assert!(registry.is_directly_locked(&id));
        assert_eq!(registry.verification_hash_for(&id), Some("hash-a"));

        assert!(registry.remove_document(&id));
        assert!(!registry.is_document_locked(&id));
        assert_eq!(registry.verification_hash_for(&id), None);
    }

    #[test]
    fn test_container_locks_descendants() {
        let mut registry = LockRegistry::new();
        registry.add_container("notes/", "hash-notes");

        let nested = DocumentId::new("notes/daily/a.md");
        assert!(registry.is_container_locked("notes"));
        assert!(registry.is_document_locked(&nested));
        assert!(!registry.is_directly_locked(&nested));
        assert_eq!(registry.locking_container(&nested), Some("notes"));
        assert_eq!(registry.verification_hash_for(&nested), Some("hash-notes"));
        assert!(!registry.is_document_locked(&DocumentId::new("notebook/a.md")));
    }

    #[test]
    fn test_nearest_container_hash_wins() {
        let mut registry = LockRegistry::new();
        registry.add_container("notes", "outer");
        registry.add_container("notes/daily", "inner");

        let id = DocumentId::new("notes/daily/a.md");
        assert_eq!(registry.verification_hash_for(&id), Some("inner"));
        assert_eq!(registry.locking_container(&id), Some("notes"));
    }

    #[test]
    fn test_rename_moves_hash() {
        let mut registry = LockRegistry::new();
        let from = DocumentId::new("a.md");
        let to = DocumentId::new("archive/a.md");
        registry.add_document(&from, "h");

        assert!(registry.rename_document(&from, &to));
        assert!(!registry.is_document_locked(&from));
        assert_eq!(registry.verification_hash_for(&to), Some("h"));
        assert!(!registry.rename_document(&from, &to));
    }

    #[test]
    fn test_json_uses_camel_case_fields() {
        let mut registry = LockRegistry::new();
        registry.add_document(&DocumentId::new("a.md"), "h1");
        registry.add_container("notes", "h2");

        let json = registry.to_json().unwrap();
        assert!(json.contains("\"lockedDocuments\""));
        assert!(json.contains("\"lockedContainers\""));
        assert!(json.contains("\"verificationHashes\""));

        let restored = LockRegistry::from_json(&json).unwrap();
        assert_eq!(restored, registry);
    }

    #[test]
    fn test_from_json_tolerates_missing_fields_and_empty_input() {
        assert!(LockRegistry::from_json("").unwrap().is_empty());
        let registry = LockRegistry::from_json(r#"{"lockedDocuments":["a.md"]}"#).unwrap();
        assert!(registry.is_document_locked(&DocumentId::new("a.md")));
        assert_eq!(registry.verification_hash_for(&DocumentId::new("a.md")), None);
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        assert!(LockRegistry::from_json("{not json").is_err());
    }
}
