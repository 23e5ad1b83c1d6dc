//! Artifact store: interface over the shared scratch directory.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncRead;

/// Readable byte source for a stored artifact.
pub type ArtifactReader = Box<dyn AsyncRead + Send + Unpin>;

/// Operations on the single shared scratch directory.
///
/// Injected rather than ambient so pipeline and lifecycle logic can run
/// against an in-memory fake in tests. Writes need no coordination: paths are
/// unique per run by construction, so no two pipeline stages ever write the
/// same path concurrently. Only the startup/shutdown sweep is serialized
/// against in-flight work, at process boundaries.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Absolute path external tools should write the named file to.
    fn locate(&self, file_name: &str) -> PathBuf;

    /// Whether the named file currently exists.
    async fn exists(&self, file_name: &str) -> bool;

    /// Size of the named file in bytes.
    async fn size(&self, file_name: &str) -> std::io::Result<u64>;

    /// Opens the named file for reading.
    async fn open(&self, file_name: &str) -> std::io::Result<ArtifactReader>;

    /// Deletes the named file. Idempotent: deleting an absent file is not an
    /// error, so timer expiry, manual consume, and error-path cleanup may
    /// race freely.
    async fn remove(&self, file_name: &str) -> std::io::Result<()>;

    /// File names sharing a prefix, in no particular order. Used by
    /// error-path cleanup to find every file a failed run may have written.
    async fn list_by_prefix(&self, prefix: &str) -> std::io::Result<Vec<String>>;

    /// Removes every file in the store, returning how many were deleted.
    /// Runs only at process startup and shutdown.
    async fn sweep(&self) -> std::io::Result<usize>;
}

/// Disk-backed store over a dedicated scratch directory.
pub struct DiskArtifactStore {
    root: PathBuf,
}

impl DiskArtifactStore {
    /// Opens the store at `root`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// - `std::io::Error` - Directory could not be created
    pub fn new(root: &Path) -> std::io::Result<Self> {
        std::fs::create_dir_all(root)?;
        Ok(Self {
            root: root.to_path_buf(),
        })
    }
}

#[async_trait]
impl ArtifactStore for DiskArtifactStore {
    fn locate(&self, file_name: &str) -> PathBuf {
        self.root.join(file_name)
    }

    async fn exists(&self, file_name: &str) -> bool {
        tokio::fs::try_exists(self.locate(file_name))
            .await
            .unwrap_or(false)
    }

    async fn size(&self, file_name: &str) -> std::io::Result<u64> {
        let metadata = tokio::fs::metadata(self.locate(file_name)).await?;
        Ok(metadata.len())
    }

    async fn open(&self, file_name: &str) -> std::io::Result<ArtifactReader> {
        let file = tokio::fs::File::open(self.locate(file_name)).await?;
        Ok(Box::new(file))
    }

    async fn remove(&self, file_name: &str) -> std::io::Result<()> {
        match tokio::fs::remove_file(self.locate(file_name)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn list_by_prefix(&self, prefix: &str) -> std::io::Result<Vec<String>> {
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        let mut names = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with(prefix) {
                names.push(name);
            }
        }

        Ok(names)
    }

    async fn sweep(&self) -> std::io::Result<usize> {
        let mut entries = tokio::fs::read_dir(&self.root).await?;
        let mut removed = 0;

        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await.map(|t| t.is_file()).unwrap_or(false) {
                if let Err(e) = tokio::fs::remove_file(entry.path()).await {
                    tracing::warn!(path = %entry.path().display(), "sweep could not remove: {e}");
                } else {
                    removed += 1;
                }
            }
        }

        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[tokio::test]
    async fn test_remove_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = DiskArtifactStore::new(dir.path()).unwrap();

        std::fs::write(store.locate("run.mp3"), b"bytes").unwrap();

        store.remove("run.mp3").await.unwrap();
        assert!(!store.exists("run.mp3").await);

        // Second delete of an absent file is a silent no-op
        store.remove("run.mp3").await.unwrap();
        store.remove("never-existed.mp4").await.unwrap();
    }

    #[tokio::test]
    async fn test_list_by_prefix_scopes_to_run_id() {
        let dir = tempdir().unwrap();
        let store = DiskArtifactStore::new(dir.path()).unwrap();

        std::fs::write(store.locate("abc_11111111.m4a"), b"a").unwrap();
        std::fs::write(store.locate("abc_11111111.mp3"), b"b").unwrap();
        std::fs::write(store.locate("abc_22222222.mp3"), b"c").unwrap();

        let mut names = store.list_by_prefix("abc_11111111").await.unwrap();
        names.sort();
        assert_eq!(names, vec!["abc_11111111.m4a", "abc_11111111.mp3"]);
    }

    #[tokio::test]
    async fn test_sweep_clears_previous_run_leftovers() {
        let dir = tempdir().unwrap();
        let store = DiskArtifactStore::new(dir.path()).unwrap();

        std::fs::write(store.locate("stale_1.mp3"), b"a").unwrap();
        std::fs::write(store.locate("stale_2.mp4"), b"b").unwrap();

        let removed = store.sweep().await.unwrap();

        assert_eq!(removed, 2);
        assert!(store.list_by_prefix("").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_open_and_size_round_trip() {
        use tokio::io::AsyncReadExt;

        let dir = tempdir().unwrap();
        let store = DiskArtifactStore::new(dir.path()).unwrap();
        std::fs::write(store.locate("run.mp3"), b"compressed audio").unwrap();

        assert_eq!(store.size("run.mp3").await.unwrap(), 16);

        let mut reader = store.open("run.mp3").await.unwrap();
        let mut contents = Vec::new();
        reader.read_to_end(&mut contents).await.unwrap();
        assert_eq!(contents, b"compressed audio");
    }
}
