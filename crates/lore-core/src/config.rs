//! Configuration management for Lore services.
//!
//! Configuration is loaded from (in priority order):
//! 1. Environment variables (LORE_ prefix, `__` as section separator)
//! 2. Config file (lore.toml, or another prefix given on the command line)
//! 3. Defaults

use serde::de::DeserializeOwned;

use crate::error::LoreError;

/// Environment variable prefix shared by every Lore binary.
pub const ENV_PREFIX: &str = "LORE";

/// Build the layered configuration source for `file_prefix`.
pub fn layered(file_prefix: &str) -> Result<config::Config, LoreError> {
    let cfg = config::Config::builder()
        .add_source(config::File::with_name(file_prefix).required(false))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        )
        .build()?;
    Ok(cfg)
}

/// Load one section, falling back to `T::default()` when it is absent.
///
/// A section that is present but malformed is an error rather than a
/// silent fallback.
pub fn load_section<T>(cfg: &config::Config, section: &str) -> Result<T, LoreError>
where
    T: DeserializeOwned + Default,
{
    match cfg.get::<T>(section) {
        Ok(value) => Ok(value),
        Err(config::ConfigError::NotFound(_)) => {
            tracing::debug!(section, "Config section not set, using defaults");
            Ok(T::default())
        }
        Err(e) => Err(LoreError::Config(e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Default, Deserialize, PartialEq)]
    struct Section {
        #[serde(default)]
        batch_size: usize,
    }

    #[test]
    fn test_missing_section_uses_default() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("absent");
        let cfg = layered(prefix.to_str().unwrap()).unwrap();
        let section: Section = load_section(&cfg, "writer_missing").unwrap();
        assert_eq!(section, Section::default());
    }

    #[test]
    fn test_file_section_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lore.toml");
        std::fs::write(&path, "[writer]\nbatch_size = 25\n").unwrap();
        let prefix = dir.path().join("lore");
        let cfg = layered(prefix.to_str().unwrap()).unwrap();
        let section: Section = load_section(&cfg, "writer").unwrap();
        assert_eq!(section.batch_size, 25);
    }
}
