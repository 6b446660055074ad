//! The checksum registry: content fingerprint to ingestion status.
//!
//! Records live in a durable [`KvStore`] under two keys:
//! `registry:checksum:<fingerprint>` holds the record and
//! `registry:doc:<doc_id>` points back at the fingerprint. A read-through
//! cache fronts the store. It is advisory; when the store is unreachable
//! the registry keeps working from the cache and reports itself degraded.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::fingerprint::fingerprint;
use crate::kv::{KvError, KvStore};
use crate::record::{IngestionRecord, RegistryStatus, StatusUpdate};

/// Thirty days.
pub const DEFAULT_TTL_SECS: u64 = 2_592_000;

const CHECKSUM_PREFIX: &str = "registry:checksum:";
const DOC_PREFIX: &str = "registry:doc:";

/// Errors from the checksum registry.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("No registry record for document {doc_id}")]
    UnknownDocument { doc_id: String },

    #[error("Corrupt registry record {key}: {source}")]
    Corrupt {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Corrupt registry entry {key}: {source}")]
    CorruptEntry {
        key: String,
        #[source]
        source: KvError,
    },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Registry configuration (`[registry]` section).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Root directory for the file-backed store. In-memory when unset.
    pub dir: Option<std::path::PathBuf>,
    pub ttl_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            dir: None,
            ttl_secs: DEFAULT_TTL_SECS,
        }
    }
}

struct CachedRecord {
    record: IngestionRecord,
    expires_at: DateTime<Utc>,
}

#[derive(Default)]
struct Cache {
    by_checksum: HashMap<String, CachedRecord>,
    by_doc: HashMap<String, String>,
}

pub struct ChecksumRegistry {
    kv: Arc<dyn KvStore>,
    ttl: Duration,
    cache: RwLock<Cache>,
    degraded: AtomicBool,
}

impl ChecksumRegistry {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self::with_ttl(kv, Duration::from_secs(DEFAULT_TTL_SECS))
    }

    pub fn with_ttl(kv: Arc<dyn KvStore>, ttl: Duration) -> Self {
        Self {
            kv,
            ttl,
            cache: RwLock::new(Cache::default()),
            degraded: AtomicBool::new(false),
        }
    }

    /// Whether any durable read or write has fallen back to the cache.
    /// State recorded while degraded is lost on restart.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    /// Register content for ingestion.
    ///
    /// When content with the same fingerprint is already COMMITTED or
    /// VALIDATED and `force_override` is false, the existing record comes
    /// back with status SKIPPED and nothing is written. Otherwise a new
    /// PENDING record is stored.
    pub async fn register(
        &self,
        doc_id: &str,
        filename: &str,
        content: &[u8],
        force_override: bool,
    ) -> Result<IngestionRecord, RegistryError> {
        let checksum = fingerprint(content);

        if !force_override {
            if let Some(existing) = self.check_exists(&checksum).await? {
                if existing.status.short_circuits() {
                    info!(
                        doc_id,
                        filename,
                        existing_doc_id = %existing.doc_id,
                        status = %existing.status,
                        "Identical content already ingested, skipping"
                    );
                    let mut skipped = existing;
                    skipped.status = RegistryStatus::Skipped;
                    return Ok(skipped);
                }
            }
        }

        let record = IngestionRecord::new(doc_id, filename, &checksum);
        self.persist(&record, true).await?;
        info!(doc_id, filename, checksum = %checksum, force_override, "Document registered");
        Ok(record)
    }

    /// Look up the record for a fingerprint, cache first.
    pub async fn check_exists(
        &self,
        checksum: &str,
    ) -> Result<Option<IngestionRecord>, RegistryError> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.by_checksum.get(checksum) {
                if cached.expires_at > Utc::now() {
                    return Ok(Some(cached.record.clone()));
                }
            }
        }

        let key = format!("{CHECKSUM_PREFIX}{checksum}");
        let Some(bytes) = self.kv_get(&key).await? else {
            return Ok(None);
        };
        let record: IngestionRecord = serde_json::from_slice(&bytes)
            .map_err(|source| RegistryError::Corrupt { key, source })?;

        debug!(checksum, doc_id = %record.doc_id, "Registry cache filled from store");
        self.cache_record(&record).await;
        Ok(Some(record))
    }

    /// Look up the record registered under `doc_id`.
    pub async fn get_by_doc(&self, doc_id: &str) -> Result<Option<IngestionRecord>, RegistryError> {
        let cached = self.cache.read().await.by_doc.get(doc_id).cloned();
        let checksum = match cached {
            Some(checksum) => checksum,
            None => {
                let key = format!("{DOC_PREFIX}{doc_id}");
                match self.kv_get(&key).await? {
                    Some(bytes) => serde_json::from_slice::<String>(&bytes)
                        .map_err(|source| RegistryError::Corrupt { key, source })?,
                    None => return Ok(None),
                }
            }
        };

        Ok(self
            .check_exists(&checksum)
            .await?
            .filter(|record| record.doc_id == doc_id))
    }

    /// Move a document's record to `status`, stamping `started_at` on
    /// PROCESSING and `completed_at` on COMMITTED or FAILED.
    pub async fn update_status(
        &self,
        doc_id: &str,
        status: RegistryStatus,
        update: StatusUpdate,
    ) -> Result<IngestionRecord, RegistryError> {
        let mut record =
            self.get_by_doc(doc_id)
                .await?
                .ok_or_else(|| RegistryError::UnknownDocument {
                    doc_id: doc_id.to_string(),
                })?;

        let from = record.status;
        record.transition(status, update);
        self.persist(&record, false).await?;
        debug!(doc_id, from = %from, to = %status, "Registry status updated");
        Ok(record)
    }

    // ── Storage ──────────────────────────────────────────────────

    async fn persist(&self, record: &IngestionRecord, index: bool) -> Result<(), RegistryError> {
        let bytes = serde_json::to_vec(record)?;
        self.cache_record(record).await;

        self.kv_set(&format!("{CHECKSUM_PREFIX}{}", record.checksum), &bytes)
            .await;
        if index {
            let pointer = serde_json::to_vec(&record.checksum)?;
            self.kv_set(&format!("{DOC_PREFIX}{}", record.doc_id), &pointer)
                .await;
        }
        Ok(())
    }

    async fn cache_record(&self, record: &IngestionRecord) {
        let expires_at = TimeDelta::from_std(self.ttl)
            .ok()
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let mut cache = self.cache.write().await;
        cache
            .by_doc
            .insert(record.doc_id.clone(), record.checksum.clone());
        cache.by_checksum.insert(
            record.checksum.clone(),
            CachedRecord {
                record: record.clone(),
                expires_at,
            },
        );
    }

    /// A corrupt entry is an error; any other store failure reads as absent.
    async fn kv_get(&self, key: &str) -> Result<Option<Vec<u8>>, RegistryError> {
        match self.kv.get(key).await {
            Ok(value) => Ok(value),
            Err(source @ KvError::Corrupt { .. }) => Err(RegistryError::CorruptEntry {
                key: key.to_string(),
                source,
            }),
            Err(e) => {
                self.mark_degraded(key, &e);
                Ok(None)
            }
        }
    }

    async fn kv_set(&self, key: &str, value: &[u8]) {
        if let Err(e) = self.kv.set(key, value, self.ttl).await {
            self.mark_degraded(key, &e);
        }
    }

    fn mark_degraded(&self, key: &str, error: &KvError) {
        self.degraded.store(true, Ordering::SeqCst);
        warn!(key, error = %error, "Registry store unavailable, continuing from cache only");
    }
}
