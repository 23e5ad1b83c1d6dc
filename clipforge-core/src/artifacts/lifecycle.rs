//! Lifecycle scheduling: timed expiry and serve-once semantics.
//!
//! Every artifact is armed with a cancellable deletion timer the moment it
//! becomes servable. Consuming it first wins the race and aborts the timer;
//! a timer that fires anyway hits the idempotent delete path and is a silent
//! no-op. Once an id has been consumed or expired, no later lookup for it
//! ever succeeds again.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;

use super::{ArtifactHandle, ArtifactStore, MediaKind};
use crate::{PipelineError, Result};

struct Entry {
    media: MediaKind,
    timer: JoinHandle<()>,
}

/// An artifact claimed for its one-shot serve.
#[derive(Debug, Clone)]
pub struct ServedArtifact {
    pub file_name: String,
    pub media: MediaKind,
}

/// Arms deletion timers and resolves the serve-once path.
///
/// The registry lock is a plain mutex held only for map operations, never
/// across an await point.
pub struct LifecycleScheduler {
    store: Arc<dyn ArtifactStore>,
    retention: Duration,
    entries: Arc<Mutex<HashMap<String, Entry>>>,
}

impl LifecycleScheduler {
    pub fn new(store: Arc<dyn ArtifactStore>, retention: Duration) -> Self {
        Self {
            store,
            retention,
            entries: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Registers a servable artifact and starts its retention timer.
    ///
    /// If the artifact is not consumed before the window elapses, the timer
    /// removes the registry entry and deletes the file.
    pub fn arm(&self, handle: &ArtifactHandle) {
        let store = Arc::clone(&self.store);
        let entries = Arc::clone(&self.entries);
        let file_name = handle.file_name.clone();
        let retention = self.retention;

        let timer = tokio::spawn(async move {
            tokio::time::sleep(retention).await;

            // If consume() got here first the entry is already gone and the
            // delete below is a no-op.
            let was_registered = entries.lock().remove(&file_name).is_some();
            if was_registered {
                tracing::info!(artifact = %file_name, "retention window elapsed, expiring");
            }

            if let Err(e) = store.remove(&file_name).await {
                tracing::warn!(artifact = %file_name, "expiry delete failed: {e}");
            }
        });

        let mut entries = self.entries.lock();
        entries.insert(
            handle.file_name.clone(),
            Entry {
                media: handle.media,
                timer,
            },
        );
        tracing::debug!(
            artifact = %handle.file_name,
            retention_secs = retention.as_secs_f64(),
            "armed artifact expiry"
        );
    }

    /// Claims an artifact for its single serve.
    ///
    /// Transitions Ready to Served: the registry entry is removed and the
    /// timer aborted, so a second claim for the same id can never succeed.
    /// The caller streams the file and deletes it after full delivery.
    ///
    /// # Errors
    ///
    /// - `PipelineError::NotFoundOrExpired` - Id unknown, already served, or
    ///   expired
    pub fn consume(&self, file_name: &str) -> Result<ServedArtifact> {
        let entry = self.entries.lock().remove(file_name).ok_or_else(|| {
            PipelineError::NotFoundOrExpired {
                id: file_name.to_string(),
            }
        })?;

        entry.timer.abort();
        tracing::info!(artifact = %file_name, "artifact claimed for one-shot serve");

        Ok(ServedArtifact {
            file_name: file_name.to_string(),
            media: entry.media,
        })
    }

    /// Number of currently armed artifacts.
    pub fn armed_count(&self) -> usize {
        self.entries.lock().len()
    }

    /// Startup sweep: removes every pre-existing file in the store,
    /// recovering from a prior unclean shutdown. Must run before any
    /// pipeline is in flight.
    ///
    /// # Errors
    ///
    /// - `std::io::Error` - Scratch directory could not be read
    pub async fn startup_sweep(&self) -> std::io::Result<usize> {
        let removed = self.store.sweep().await?;
        if removed > 0 {
            tracing::info!(removed, "startup sweep cleared stale artifacts");
        }
        Ok(removed)
    }

    /// Best-effort shutdown sweep: aborts all timers and clears the store.
    pub async fn shutdown_sweep(&self) {
        let drained: Vec<(String, Entry)> = {
            let mut entries = self.entries.lock();
            entries.drain().collect()
        };
        for (_, entry) in &drained {
            entry.timer.abort();
        }

        match self.store.sweep().await {
            Ok(removed) => tracing::info!(removed, "shutdown sweep complete"),
            Err(e) => tracing::warn!("shutdown sweep failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::test_fixtures::InMemoryArtifactStore;

    fn handle_for(store: &InMemoryArtifactStore, file_name: &str) -> ArtifactHandle {
        ArtifactHandle {
            id: file_name.trim_end_matches(".mp3").to_string(),
            file_name: file_name.to_string(),
            path: store.locate(file_name),
            media: MediaKind::Audio,
        }
    }

    #[tokio::test]
    async fn test_consume_is_strictly_one_shot() {
        let store = Arc::new(InMemoryArtifactStore::new());
        store.insert("abc_1a2b3c4d.mp3", b"audio");
        let scheduler = LifecycleScheduler::new(store.clone(), Duration::from_secs(300));

        scheduler.arm(&handle_for(&store, "abc_1a2b3c4d.mp3"));

        let served = scheduler.consume("abc_1a2b3c4d.mp3").unwrap();
        assert_eq!(served.media, MediaKind::Audio);

        // Second claim observes NotFoundOrExpired, forever
        let second = scheduler.consume("abc_1a2b3c4d.mp3");
        assert!(matches!(
            second,
            Err(PipelineError::NotFoundOrExpired { .. })
        ));
    }

    #[tokio::test]
    async fn test_unknown_id_is_not_found() {
        let store = Arc::new(InMemoryArtifactStore::new());
        let scheduler = LifecycleScheduler::new(store, Duration::from_secs(300));

        assert!(matches!(
            scheduler.consume("nope.mp3"),
            Err(PipelineError::NotFoundOrExpired { .. })
        ));
    }

    #[tokio::test]
    async fn test_timer_expires_unclaimed_artifact() {
        let store = Arc::new(InMemoryArtifactStore::new());
        store.insert("abc_1a2b3c4d.mp3", b"audio");
        let scheduler = LifecycleScheduler::new(store.clone(), Duration::from_millis(30));

        scheduler.arm(&handle_for(&store, "abc_1a2b3c4d.mp3"));
        assert_eq!(scheduler.armed_count(), 1);

        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(scheduler.armed_count(), 0);
        assert!(!store.exists("abc_1a2b3c4d.mp3").await);
        assert!(matches!(
            scheduler.consume("abc_1a2b3c4d.mp3"),
            Err(PipelineError::NotFoundOrExpired { .. })
        ));
    }

    #[tokio::test]
    async fn test_consume_then_late_timer_never_errors() {
        let store = Arc::new(InMemoryArtifactStore::new());
        store.insert("abc_1a2b3c4d.mp3", b"audio");
        let scheduler = LifecycleScheduler::new(store.clone(), Duration::from_millis(20));

        scheduler.arm(&handle_for(&store, "abc_1a2b3c4d.mp3"));
        let served = scheduler.consume("abc_1a2b3c4d.mp3").unwrap();

        // Serving layer deletes after delivery; the (aborted) timer racing in
        // behind it must stay silent either way
        store.remove(&served.file_name).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!store.exists("abc_1a2b3c4d.mp3").await);
    }

    #[tokio::test]
    async fn test_startup_sweep_clears_prior_run_files() {
        let store = Arc::new(InMemoryArtifactStore::new());
        store.insert("stale_11111111.mp3", b"a");
        store.insert("stale_22222222.mp4", b"b");
        let scheduler = LifecycleScheduler::new(store.clone(), Duration::from_secs(300));

        let removed = scheduler.startup_sweep().await.unwrap();

        assert_eq!(removed, 2);
        assert!(!store.exists("stale_11111111.mp3").await);
    }

    #[tokio::test]
    async fn test_shutdown_sweep_aborts_timers_and_clears_store() {
        let store = Arc::new(InMemoryArtifactStore::new());
        store.insert("abc_1a2b3c4d.mp3", b"audio");
        let scheduler = LifecycleScheduler::new(store.clone(), Duration::from_secs(300));
        scheduler.arm(&handle_for(&store, "abc_1a2b3c4d.mp3"));

        scheduler.shutdown_sweep().await;

        assert_eq!(scheduler.armed_count(), 0);
        assert!(!store.exists("abc_1a2b3c4d.mp3").await);
    }
}
