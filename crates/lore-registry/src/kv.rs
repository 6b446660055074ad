//! Durable key-value storage behind the registry.
//!
//! The registry needs two primitives: `get(key)` and `set(key, bytes, ttl)`.
//! [`FileKvStore`] keeps one file per key under a root directory;
//! [`MemoryKvStore`] keeps everything in process and can simulate an outage.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use tokio::sync::Mutex;

/// Errors from the durable key-value store.
#[derive(Debug, thiserror::Error)]
pub enum KvError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt entry for key {key}: {reason}")]
    Corrupt { key: String, reason: String },

    #[error("Key-value store unavailable: {0}")]
    Unavailable(String),
}

/// Trait for durable key-value backends.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Fetch a value. Expired entries read as absent.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError>;

    /// Store a value that expires after `ttl`.
    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), KvError>;
}

fn expiry_after(ttl: Duration) -> DateTime<Utc> {
    i64::try_from(ttl.as_secs())
        .ok()
        .and_then(TimeDelta::try_seconds)
        .and_then(|delta| Utc::now().checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

// ── In-memory ────────────────────────────────────────────────────

/// Process-local store for tests.
#[derive(Default)]
pub struct MemoryKvStore {
    entries: Mutex<HashMap<String, (Vec<u8>, DateTime<Utc>)>>,
    writes: AtomicUsize,
    unavailable: AtomicBool,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent call fail with [`KvError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Successful `set` calls so far.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Live (unexpired) entries.
    pub async fn len(&self) -> usize {
        let now = Utc::now();
        self.entries
            .lock()
            .await
            .values()
            .filter(|(_, expires_at)| *expires_at > now)
            .count()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn check_available(&self) -> Result<(), KvError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(KvError::Unavailable("memory store offline".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        self.check_available()?;
        let mut entries = self.entries.lock().await;
        let expired = matches!(entries.get(key), Some((_, expires_at)) if *expires_at <= Utc::now());
        if expired {
            entries.remove(key);
            return Ok(None);
        }
        Ok(entries.get(key).map(|(value, _)| value.clone()))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), KvError> {
        self.check_available()?;
        self.entries
            .lock()
            .await
            .insert(key.to_string(), (value.to_vec(), expiry_after(ttl)));
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ── File-backed ──────────────────────────────────────────────────

/// File-system backed store.
///
/// Each key maps to one file named by the BLAKE3 hash of the key:
/// ```text
/// {root}/
///   {blake3(key)}.kv     first line: expiry (RFC 3339), then raw value bytes
/// ```
pub struct FileKvStore {
    root: PathBuf,
}

impl FileKvStore {
    /// Create a store rooted at the given directory, creating it if needed.
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self, KvError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        let name = blake3::hash(key.as_bytes()).to_hex();
        self.root.join(format!("{name}.kv"))
    }
}

#[async_trait]
impl KvStore for FileKvStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, KvError> {
        let path = self.entry_path(key);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let corrupt = |reason: &str| KvError::Corrupt {
            key: key.to_string(),
            reason: reason.to_string(),
        };
        let split = raw
            .iter()
            .position(|b| *b == b'\n')
            .ok_or_else(|| corrupt("missing header"))?;
        let header = std::str::from_utf8(&raw[..split]).map_err(|_| corrupt("header not UTF-8"))?;
        let expires_at = DateTime::parse_from_rfc3339(header)
            .map_err(|_| corrupt("invalid expiry"))?
            .with_timezone(&Utc);

        if expires_at <= Utc::now() {
            tracing::debug!(path = %path.display(), "Removing expired entry");
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            return Ok(None);
        }

        Ok(Some(raw[split + 1..].to_vec()))
    }

    async fn set(&self, key: &str, value: &[u8], ttl: Duration) -> Result<(), KvError> {
        let path = self.entry_path(key);
        let mut contents = expiry_after(ttl).to_rfc3339().into_bytes();
        contents.push(b'\n');
        contents.extend_from_slice(value);

        // Write beside the target and rename so readers never see a torn file.
        let tmp = path.with_extension("kv.tmp");
        tokio::fs::write(&tmp, &contents).await?;
        tokio::fs::rename(&tmp, &path).await?;

        tracing::debug!(path = %path.display(), bytes = value.len(), "Entry stored");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: Duration = Duration::from_secs(86_400);

    #[tokio::test]
    async fn test_memory_roundtrip_and_counts() {
        let store = MemoryKvStore::new();
        assert!(store.get("missing").await.unwrap().is_none());

        store.set("k", b"v", DAY).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), Some(b"v".to_vec()));
        assert_eq!(store.write_count(), 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_memory_expired_entries_read_absent() {
        let store = MemoryKvStore::new();
        store.set("k", b"v", Duration::ZERO).await.unwrap();
        assert!(store.get("k").await.unwrap().is_none());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_memory_outage() {
        let store = MemoryKvStore::new();
        store.set_unavailable(true);
        assert!(matches!(
            store.set("k", b"v", DAY).await,
            Err(KvError::Unavailable(_))
        ));
        store.set_unavailable(false);
        assert!(store.get("k").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_store_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileKvStore::new(tmp.path().join("kv")).await.unwrap();

        store.set("registry:doc:d1", b"{\"a\":1}\nline", DAY).await.unwrap();
        assert_eq!(
            store.get("registry:doc:d1").await.unwrap(),
            Some(b"{\"a\":1}\nline".to_vec())
        );
        assert!(store.get("registry:doc:d2").await.unwrap().is_none());

        // A fresh handle over the same directory sees the same data.
        let reopened = FileKvStore::new(tmp.path().join("kv")).await.unwrap();
        assert!(reopened.get("registry:doc:d1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_file_store_expiry_removes_file() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileKvStore::new(tmp.path()).await.unwrap();

        store.set("k", b"v", Duration::ZERO).await.unwrap();
        assert!(store.get("k").await.unwrap().is_none());
        assert!(!store.entry_path("k").exists());
    }

    #[tokio::test]
    async fn test_file_store_corrupt_entry() {
        let tmp = tempfile::tempdir().unwrap();
        let store = FileKvStore::new(tmp.path()).await.unwrap();
        std::fs::write(store.entry_path("k"), b"not a header").unwrap();

        assert!(matches!(
            store.get("k").await,
            Err(KvError::Corrupt { .. })
        ));
    }
}
