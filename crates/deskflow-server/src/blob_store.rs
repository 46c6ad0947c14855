use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};

use deskflow_store::DocumentStore;
use tokio::fs;
use tracing::{debug, info, warn};

use crate::error::ServiceError;

/// Join `relative` onto `base`, refusing anything that could step outside
/// it (`..`, absolute paths, drive prefixes).
fn ensure_within(base: &Path, relative: &str) -> io::Result<PathBuf> {
    let mut resolved = base.to_path_buf();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(c) => resolved.push(c),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "Path traversal detected",
                ));
            }
        }
    }
    if resolved == base {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "Empty document path"));
    }
    Ok(resolved)
}

/// Pass `written` through, removing the file at `path` first if it failed.
fn remove_if_failed(path: &Path, written: io::Result<()>) -> io::Result<()> {
    if written.is_err() {
        if let Err(e) = std::fs::remove_file(path) {
            warn!(path = %path.display(), error = %e, "Failed to remove partly written document");
        }
    }
    written
}

/// Uploaded documents on the local filesystem.  Recorded paths are relative
/// to `base_path`.
#[derive(Debug, Clone)]
pub struct FsDocumentStore {
    base_path: PathBuf,
}

impl FsDocumentStore {
    pub async fn new(base_path: PathBuf) -> Result<Self, ServiceError> {
        fs::create_dir_all(&base_path).await.map_err(|e| {
            ServiceError::Storage(format!(
                "Failed to create document directory '{}': {}",
                base_path.display(),
                e
            ))
        })?;
        let base_path = fs::canonicalize(&base_path).await.unwrap_or(base_path);

        info!(path = %base_path.display(), "Document store initialized");

        Ok(Self { base_path })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    pub async fn read(&self, stored_path: &str) -> Result<Vec<u8>, ServiceError> {
        let path = ensure_within(&self.base_path, stored_path)
            .map_err(|e| ServiceError::Validation(e.to_string()))?;

        match fs::read(&path).await {
            Ok(data) => {
                debug!(path = %stored_path, size = data.len(), "Read document");
                Ok(data)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                Err(ServiceError::NotFound("document file".into()))
            }
            Err(e) => Err(ServiceError::Storage(format!(
                "Failed to read document {stored_path}: {e}"
            ))),
        }
    }
}

impl DocumentStore for FsDocumentStore {
    fn save(&self, content: &[u8], destination: &str) -> io::Result<String> {
        let path = ensure_within(&self.base_path, destination)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        // create_new: never clobber an existing document.
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)?;
        let written = file.write_all(content).and_then(|()| file.sync_all());
        drop(file);
        remove_if_failed(&path, written)?;

        debug!(path = %destination, size = content.len(), "Stored document");
        Ok(destination.to_string())
    }

    fn remove(&self, stored_path: &str) -> io::Result<()> {
        let path = ensure_within(&self.base_path, stored_path)?;
        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!(path = %stored_path, "Deleted document");
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }
}
