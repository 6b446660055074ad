//! Configuration for the lore-ingest service.
//!
//! Loaded from `lore.toml` (or another prefix given with `--config`) and
//! `LORE__<SECTION>__<KEY>` environment variables, one section per concern.

use serde::Deserialize;

use lore_core::config::{layered, load_section};
use lore_core::LoreError;
use lore_graph::{GraphConfig, DEFAULT_BATCH_SIZE};
use lore_registry::RegistryConfig;
use lore_validate::ValidatorConfig;

/// `[writer]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct WriterConfig {
    /// Rows per grouped statement (default: 100).
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
        }
    }
}

/// `[recovery]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct RecoveryConfig {
    /// PROCESSING documents untouched for longer than this are swept.
    #[serde(default = "default_processing_timeout")]
    pub processing_timeout_secs: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            processing_timeout_secs: default_processing_timeout(),
        }
    }
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_processing_timeout() -> u64 {
    1800
}

/// Every section the binary reads.
#[derive(Debug, Clone, Default)]
pub struct IngestConfig {
    pub neo4j: GraphConfig,
    pub registry: RegistryConfig,
    pub writer: WriterConfig,
    pub validator: ValidatorConfig,
    pub recovery: RecoveryConfig,
}

impl IngestConfig {
    pub fn load(file_prefix: &str) -> Result<Self, LoreError> {
        let cfg = layered(file_prefix)?;
        Ok(Self {
            neo4j: load_section(&cfg, "neo4j")?,
            registry: load_section(&cfg, "registry")?,
            writer: load_section(&cfg, "writer")?,
            validator: load_section(&cfg, "validator")?,
            recovery: load_section(&cfg, "recovery")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_without_file() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("lore");
        let config = IngestConfig::load(prefix.to_str().unwrap()).unwrap();

        assert_eq!(config.writer.batch_size, 100);
        assert_eq!(config.recovery.processing_timeout_secs, 1800);
        assert_eq!(config.registry.ttl_secs, 2_592_000);
        assert!(!config.validator.strict);
        assert!(config.validator.auto_fix);
    }

    #[test]
    fn test_sections_from_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("lore.toml"),
            r#"
[neo4j]
uri = "bolt://graph:7687"

[writer]
batch_size = 25

[validator]
strict = true
strict_rules = ["id_format", "orphan"]

[registry]
dir = "/var/lib/lore/registry"
"#,
        )
        .unwrap();
        let prefix = dir.path().join("lore");
        let config = IngestConfig::load(prefix.to_str().unwrap()).unwrap();

        assert_eq!(config.neo4j.uri, "bolt://graph:7687");
        assert_eq!(config.neo4j.user, "neo4j");
        assert_eq!(config.writer.batch_size, 25);
        assert!(config.validator.strict);
        assert_eq!(config.validator.strict_rules.len(), 2);
        assert_eq!(config.validator.min_description_len, 10);
        assert_eq!(
            config.registry.dir.as_deref(),
            Some(std::path::Path::new("/var/lib/lore/registry"))
        );
    }
}
