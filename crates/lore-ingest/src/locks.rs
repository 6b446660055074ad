//! Per-filename mutual exclusion.
//!
//! Overwriting a document is a multi-step sequence with no storage-level
//! transaction, so two ingestions of the same filename must never
//! interleave. Different filenames proceed in parallel.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// Held for the duration of one filename's critical section.
pub struct FilenameGuard {
    filename: String,
    _guard: OwnedMutexGuard<()>,
}

impl FilenameGuard {
    pub fn filename(&self) -> &str {
        &self.filename
    }
}

/// A map of named async locks. Cloning shares the map.
#[derive(Clone, Default)]
pub struct FilenameLocks {
    inner: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl FilenameLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other holder has `filename`, then take it.
    pub async fn acquire(&self, filename: &str) -> FilenameGuard {
        let lock = {
            let mut locks = self.inner.lock().await;
            // Only the map itself references an idle lock.
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            Arc::clone(locks.entry(filename.to_string()).or_default())
        };

        let guard = lock.lock_owned().await;
        debug!(filename, "Filename lock acquired");
        FilenameGuard {
            filename: filename.to_string(),
            _guard: guard,
        }
    }

    /// Names currently held or waited on.
    pub async fn active(&self) -> usize {
        self.inner
            .lock()
            .await
            .values()
            .filter(|lock| Arc::strong_count(lock) > 1)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_filename_is_exclusive() {
        let locks = FilenameLocks::new();
        let inside = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let inside = inside.clone();
            let peak = peak.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire("notes.md").await;
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 1);
        assert_eq!(locks.active().await, 0);
    }

    #[tokio::test]
    async fn test_different_filenames_do_not_block() {
        let locks = FilenameLocks::new();
        let first = locks.acquire("a.md").await;
        let second = tokio::time::timeout(Duration::from_secs(1), locks.acquire("b.md"))
            .await
            .expect("second filename should not wait");

        assert_eq!(first.filename(), "a.md");
        assert_eq!(second.filename(), "b.md");
        assert_eq!(locks.active().await, 2);
    }
}
