//! lore-registry: checksum-based idempotency gate for ingestion.
//!
//! Maps a BLAKE3 fingerprint of raw document content to the status of its
//! ingestion, so identical content is never extracted or written twice.

pub mod fingerprint;
pub mod kv;
pub mod record;
pub mod registry;

pub use fingerprint::fingerprint;
pub use kv::{FileKvStore, KvError, KvStore, MemoryKvStore};
pub use record::{IngestionRecord, RegistryStatus, StatusUpdate};
pub use registry::{ChecksumRegistry, RegistryConfig, RegistryError, DEFAULT_TTL_SECS};
