//! In-memory artifact store for tests.

use std::collections::HashMap;
use std::io::Cursor;
use std::path::PathBuf;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::store::{ArtifactReader, ArtifactStore};

/// Fake [`ArtifactStore`] backed by a map.
///
/// `locate` returns paths under a directory that does not exist; tests that
/// need real tool output on disk use `DiskArtifactStore` over a tempdir
/// instead.
pub struct InMemoryArtifactStore {
    files: Mutex<HashMap<String, Vec<u8>>>,
    root: PathBuf,
}

impl InMemoryArtifactStore {
    pub fn new() -> Self {
        Self {
            files: Mutex::new(HashMap::new()),
            root: PathBuf::from("/in-memory-artifacts"),
        }
    }

    /// Seeds the store with a file.
    pub fn insert(&self, file_name: &str, contents: &[u8]) {
        self.files
            .lock()
            .insert(file_name.to_string(), contents.to_vec());
    }
}

impl Default for InMemoryArtifactStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ArtifactStore for InMemoryArtifactStore {
    fn locate(&self, file_name: &str) -> PathBuf {
        self.root.join(file_name)
    }

    async fn exists(&self, file_name: &str) -> bool {
        self.files.lock().contains_key(file_name)
    }

    async fn size(&self, file_name: &str) -> std::io::Result<u64> {
        self.files
            .lock()
            .get(file_name)
            .map(|bytes| bytes.len() as u64)
            .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::NotFound))
    }

    async fn open(&self, file_name: &str) -> std::io::Result<ArtifactReader> {
        let bytes = self
            .files
            .lock()
            .get(file_name)
            .cloned()
            .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::NotFound))?;
        Ok(Box::new(Cursor::new(bytes)))
    }

    async fn remove(&self, file_name: &str) -> std::io::Result<()> {
        self.files.lock().remove(file_name);
        Ok(())
    }

    async fn list_by_prefix(&self, prefix: &str) -> std::io::Result<Vec<String>> {
        Ok(self
            .files
            .lock()
            .keys()
            .filter(|name| name.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn sweep(&self) -> std::io::Result<usize> {
        let mut files = self.files.lock();
        let removed = files.len();
        files.clear();
        Ok(removed)
    }
}
