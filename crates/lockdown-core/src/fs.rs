//! Filesystem-backed document store.
//!
//! Documents are UTF-8 files under a root directory; a document id is the
//! file's path relative to that root with `/` separators. Writes go to a
//! sibling temp file first and are renamed into place.

use std::collections::HashMap;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::document::DocumentId;
use crate::error::{LockdownError, Result};
use crate::host::{ChangeEvent, DocumentStore};

/// Atomically rename a file, with fallback for platforms where rename fails if target exists.
///
/// On some platforms (notably Windows), rename fails if the destination already exists.
/// The fallback removes the destination first and retries; if that also fails
/// the temp file is cleaned up.
pub async fn rename_with_fallback(temp_path: &Path, destination: &Path) -> io::Result<()> {
    if let Err(initial_err) = tokio::fs::rename(temp_path, destination).await {
        let _ = tokio::fs::remove_file(destination).await;
        if let Err(retry_err) = tokio::fs::rename(temp_path, destination).await {
            let _ = tokio::fs::remove_file(temp_path).await;
            return Err(io::Error::new(
                retry_err.kind(),
                format!(
                    "Atomic rename failed (initial: {}, retry: {})",
                    initial_err, retry_err
                ),
            ));
        }
    }
    Ok(())
}

/// Document store over a directory tree.
#[derive(Debug, Clone)]
pub struct FsDocumentStore {
    root: PathBuf,
}

impl FsDocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a relative id to a path under the root.
    ///
    /// Absolute ids and `..` components are rejected.
    pub fn resolve(&self, id: &str) -> Result<PathBuf> {
        let relative = Path::new(id.trim_start_matches("./"));
        let mut path = self.root.clone();
        for component in relative.components() {
            match component {
                Component::Normal(part) => path.push(part),
                Component::CurDir => {}
                _ => {
                    return Err(LockdownError::InvalidInput(format!(
                        "Path must stay inside the vault root: {}",
                        id
                    )))
                }
            }
        }
        Ok(path)
    }

    /// Relative id for a path under the root.
    pub fn id_for(&self, path: &Path) -> Result<DocumentId> {
        let relative = path.strip_prefix(&self.root).map_err(|_| {
            LockdownError::InvalidInput(format!(
                "{} is outside the vault root {}",
                path.display(),
                self.root.display()
            ))
        })?;
        let parts: Vec<String> = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();
        Ok(DocumentId::new(parts.join("/")))
    }

    /// Poll every document under the root and report content changes.
    ///
    /// The first pass only records a baseline. The task stops when the
    /// returned receiver is dropped.
    pub fn watch(
        &self,
        interval: Duration,
    ) -> (mpsc::UnboundedReceiver<ChangeEvent>, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let store = self.clone();
        let handle = tokio::spawn(async move {
            let mut seen: HashMap<DocumentId, String> = HashMap::new();
            let mut baseline = true;
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if tx.is_closed() {
                    break;
                }
                let ids = match store.list("").await {
                    Ok(ids) => ids,
                    Err(e) => {
                        tracing::warn!(error = %e, "Watch scan failed");
                        continue;
                    }
                };
                for id in ids {
                    let Ok(content) = store.read(&id).await else {
                        continue;
                    };
                    let changed = seen.get(&id).map_or(true, |prev| *prev != content);
                    if changed {
                        seen.insert(id.clone(), content.clone());
                        if !baseline && tx.send(ChangeEvent { id, content }).is_err() {
                            return;
                        }
                    }
                }
                baseline = false;
            }
        });
        (rx, handle)
    }
}

async fn walk(dir: PathBuf, out: &mut Vec<PathBuf>) -> io::Result<()> {
    let mut stack = vec![dir];
    while let Some(dir) = stack.pop() {
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
            Err(e) => return Err(e),
        };
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_name().to_string_lossy().starts_with('.') {
                continue;
            }
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                stack.push(entry.path());
            } else if file_type.is_file() {
                out.push(entry.path());
            }
        }
    }
    Ok(())
}

#[async_trait]
impl DocumentStore for FsDocumentStore {
    async fn read(&self, id: &DocumentId) -> Result<String> {
        let path = self.resolve(id.as_str())?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => String::from_utf8(bytes).map_err(|_| {
                LockdownError::InvalidInput(format!("{} is not a UTF-8 text document", id))
            }),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(LockdownError::NotFound(format!("Document {}", id)))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn write(&self, id: &DocumentId, content: &str) -> Result<()> {
        let path = self.resolve(id.as_str())?;
        let parent = path
            .parent()
            .ok_or_else(|| LockdownError::InvalidInput(format!("Invalid document id: {}", id)))?;
        tokio::fs::create_dir_all(parent).await?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let temp_path = parent.join(format!(".{}.{}.tmp", file_name, uuid::Uuid::new_v4()));

        if let Err(e) = tokio::fs::write(&temp_path, content.as_bytes()).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            return Err(e.into());
        }
        rename_with_fallback(&temp_path, &path).await?;
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let path = self.resolve(path)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }

    async fn mkdir(&self, path: &str) -> Result<()> {
        let path = self.resolve(path)?;
        tokio::fs::create_dir_all(&path).await?;
        Ok(())
    }

    async fn list(&self, container: &str) -> Result<Vec<DocumentId>> {
        let dir = self.resolve(container)?;
        let mut files = Vec::new();
        walk(dir, &mut files).await?;

        let mut ids = files
            .iter()
            .map(|path| self.id_for(path))
            .collect::<Result<Vec<_>>>()?;
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_rename_new_file() {
        let dir = tempdir().unwrap();
        let temp = dir.path().join("temp.txt");
        let dest = dir.path().join("dest.txt");
        fs::write(&temp, "test").unwrap();

        rename_with_fallback(&temp, &dest).await.unwrap();

        assert!(!temp.exists());
        assert_eq!(fs::read_to_string(&dest).unwrap(), "test");
    }

    #[tokio::test]
    async fn test_write_overwrites_and_leaves_no_temp_files() {
        let dir = tempdir().unwrap();
        let store = FsDocumentStore::new(dir.path());
        let id = DocumentId::new("notes/a.md");

        store.write(&id, "old").await.unwrap();
        store.write(&id, "new").await.unwrap();

        assert_eq!(store.read(&id).await.unwrap(), "new");
        let names: Vec<String> = fs::read_dir(dir.path().join("notes"))
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["a.md".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_document_is_not_found() {
        let dir = tempdir().unwrap();
        let store = FsDocumentStore::new(dir.path());
        let err = store.read(&DocumentId::new("nope.md")).await.unwrap_err();
        assert!(matches!(err, LockdownError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_paths_cannot_escape_root() {
        let dir = tempdir().unwrap();
        let store = FsDocumentStore::new(dir.path());
        assert!(store.resolve("../etc/passwd").is_err());
        assert!(store.resolve("/etc/passwd").is_err());
        assert!(store.resolve("./notes/a.md").is_ok());
    }

    #[tokio::test]
    async fn test_list_skips_hidden_entries() {
        let dir = tempdir().unwrap();
        let store = FsDocumentStore::new(dir.path());
        store.write(&DocumentId::new("b.md"), "b").await.unwrap();
        store.write(&DocumentId::new("notes/a.md"), "a").await.unwrap();
        store
            .write(&DocumentId::new(".lockdown/registry.json"), "{}")
            .await
            .unwrap();

        let all = store.list("").await.unwrap();
        assert_eq!(all, vec![DocumentId::new("b.md"), DocumentId::new("notes/a.md")]);
        assert_eq!(store.list("notes").await.unwrap(), vec![DocumentId::new("notes/a.md")]);
        assert!(store.exists(".lockdown/registry.json").await.unwrap());
        assert!(store.list("missing").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_watch_reports_changes_after_baseline() {
        let dir = tempdir().unwrap();
        let store = FsDocumentStore::new(dir.path());
        let id = DocumentId::new("a.md");
        store.write(&id, "one").await.unwrap();

        let (mut rx, handle) = store.watch(Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(60)).await;
        store.write(&id, "two").await.unwrap();

        let event = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.id, id);
        assert_eq!(event.content, "two");

        drop(rx);
        handle.abort();
    }
}
