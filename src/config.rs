//! Layered configuration
//!
//! Built-in defaults, then an optional TOML file, then environment variables
//! of the form `PAGEINDEX__<SECTION>__<FIELD>` (e.g.
//! `PAGEINDEX__INDEX__PAGE_SIZE=500`).

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Default physical page capacity
pub const DEFAULT_PAGE_SIZE: usize = 200;

/// Default presentation window
pub const DEFAULT_LOGICAL_PAGE_SIZE: usize = 20;

/// Top-level settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub index: IndexConfig,
    pub storage: StorageConfig,
    pub catalog: CatalogConfig,
}

/// Index layout configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Page capacity used when the metadata record is first created.
    /// Ignored once the record exists.
    pub page_size: usize,
    /// Namespace for `<prefix>:meta` and `<prefix>:page:<n>`
    pub key_prefix: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            key_prefix: "INDEX".to_string(),
        }
    }
}

/// Durable backend configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    /// fsync after every appended record
    pub sync_writes: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data/pageindex"),
            sync_writes: true,
        }
    }
}

/// Item record configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Namespace for `<prefix>:<id>` item records
    pub record_prefix: String,
    /// Ids per browsed page
    pub logical_page_size: usize,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            record_prefix: "img".to_string(),
            logical_page_size: DEFAULT_LOGICAL_PAGE_SIZE,
        }
    }
}

impl Settings {
    /// Load settings from defaults, an optional file and the environment
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let defaults = Settings::default();

        let mut builder = ::config::Config::builder()
            .set_default("index.page_size", defaults.index.page_size as i64)?
            .set_default("index.key_prefix", defaults.index.key_prefix.clone())?
            .set_default(
                "storage.data_dir",
                defaults.storage.data_dir.to_string_lossy().to_string(),
            )?
            .set_default("storage.sync_writes", defaults.storage.sync_writes)?
            .set_default("catalog.record_prefix", defaults.catalog.record_prefix.clone())?
            .set_default(
                "catalog.logical_page_size",
                defaults.catalog.logical_page_size as i64,
            )?;

        if let Some(path) = path {
            builder = builder.add_source(::config::File::from(path).required(true));
        }

        let settings: Settings = builder
            .add_source(
                ::config::Environment::with_prefix("PAGEINDEX")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    /// Reject values the index cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.index.page_size == 0 {
            return Err(Error::Config("index.page_size must be greater than 0".to_string()));
        }
        if self.index.key_prefix.is_empty() {
            return Err(Error::Config("index.key_prefix must not be empty".to_string()));
        }
        if self.catalog.record_prefix.is_empty() {
            return Err(Error::Config("catalog.record_prefix must not be empty".to_string()));
        }
        if self.catalog.record_prefix == self.index.key_prefix {
            return Err(Error::Config(
                "catalog.record_prefix must differ from index.key_prefix".to_string(),
            ));
        }
        if self.catalog.logical_page_size == 0 {
            return Err(Error::Config(
                "catalog.logical_page_size must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// Render as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() -> Result<()> {
        let settings = Settings::default();
        settings.validate()?;
        assert_eq!(settings.index.page_size, 200);
        assert_eq!(settings.index.key_prefix, "INDEX");
        assert_eq!(settings.catalog.logical_page_size, 20);
        Ok(())
    }

    #[test]
    fn test_zero_page_size_rejected() {
        let mut settings = Settings::default();
        settings.index.page_size = 0;
        assert!(matches!(settings.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_load_from_file() -> Result<()> {
        let path = std::env::temp_dir().join(format!("pageindex_config_{}.toml", std::process::id()));
        std::fs::write(
            &path,
            "[index]\npage_size = 3\n\n[catalog]\nlogical_page_size = 2\n",
        )
        .map_err(|e| Error::Config(e.to_string()))?;

        let settings = Settings::load(Some(&path))?;
        assert_eq!(settings.index.page_size, 3);
        assert_eq!(settings.index.key_prefix, "INDEX");
        assert_eq!(settings.catalog.logical_page_size, 2);
        assert!(settings.storage.sync_writes);

        std::fs::remove_file(path).ok();
        Ok(())
    }

    #[test]
    fn test_toml_rendering_roundtrips() -> Result<()> {
        let settings = Settings::default();
        let rendered = settings.to_toml()?;
        assert!(rendered.contains("page_size = 200"));

        let parsed: Settings =
            toml::from_str(&rendered).map_err(|e| Error::Serialization(e.to_string()))?;
        assert_eq!(parsed, settings);
        Ok(())
    }
}
