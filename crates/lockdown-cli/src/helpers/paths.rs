//! Mapping command-line paths onto document ids.

use std::path::Path;

use lockdown_core::{DocumentId, FsDocumentStore};

use crate::errors::CliError;

/// Resolve a user-supplied path to a document id inside the vault.
///
/// Absolute paths and paths that exist relative to the working directory
/// must lie under the root. Anything else is taken as relative to the root.
pub fn document_id(store: &FsDocumentStore, raw: &str) -> anyhow::Result<DocumentId> {
    let candidate = Path::new(raw);
    let on_disk = if candidate.is_absolute() {
        Some(candidate.to_path_buf())
    } else {
        std::env::current_dir()
            .ok()
            .map(|cwd| cwd.join(candidate))
            .filter(|path| path.exists())
    };

    if let Some(path) = on_disk {
        let path = match (path.parent(), path.file_name()) {
            // Canonicalize the parent so a missing leaf still resolves.
            (Some(parent), Some(name)) if parent.exists() => std::fs::canonicalize(parent)?.join(name),
            _ => path,
        };
        return store.id_for(&path).map_err(|_| {
            CliError::invalid_input(format!(
                "{} is outside the vault root {}",
                raw,
                store.root().display()
            ))
            .into()
        });
    }

    // Validates the id stays inside the root.
    store.resolve(raw)?;
    let id = raw.trim_start_matches("./").trim_matches('/');
    if id.is_empty() {
        return Err(CliError::invalid_input("Path must name a document or folder").into());
    }
    Ok(DocumentId::new(id))
}
