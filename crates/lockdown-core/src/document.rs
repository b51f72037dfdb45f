//! Document identity.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Logical path of a document (or container) inside host storage.
///
/// The id doubles as associated data for the AEAD cipher, so ciphertext
/// sealed for one id will not open under another. Equality is plain string
/// equality; no normalization is applied.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Bytes bound into the authentication tag.
    pub fn as_aad(&self) -> &[u8] {
        self.0.as_bytes()
    }

    /// Ancestor container paths, outermost first.
    ///
    /// `notes/daily/a.md` yields `notes`, then `notes/daily`.
    pub fn ancestors(&self) -> Vec<&str> {
        let trimmed = self.0.trim_matches('/');
        let mut ancestors = Vec::new();
        for (idx, ch) in trimmed.char_indices() {
            if ch == '/' {
                ancestors.push(&trimmed[..idx]);
            }
        }
        ancestors
    }

    /// Whether this id lies (transitively) inside `container`.
    pub fn is_within(&self, container: &str) -> bool {
        let container = container.trim_matches('/');
        if container.is_empty() {
            return true;
        }
        self.ancestors().iter().any(|ancestor| *ancestor == container)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DocumentId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for DocumentId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}
