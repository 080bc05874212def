// pageindex - paginated item index over a key-value store
// Newest-first id timeline split into fixed-capacity pages

#![warn(rust_2018_idioms)]

pub mod catalog;
pub mod config;
pub mod index;
pub mod metrics;
pub mod storage;

// Re-exports for convenience
pub use crate::catalog::{Catalog, DeleteReport, ItemRecord};
pub use crate::config::Settings;
pub use crate::index::{CompactionReport, IndexMeta, IndexStats, ItemId, LogicalPage, PagedIndex};
pub use crate::storage::{LogStorage, MemoryStorage, Storage, StorageEngine};

/// Index error types
pub mod error {
    use thiserror::Error;

    #[derive(Error, Debug)]
    pub enum Error {
        #[error("Storage error: {0}")]
        Storage(String),

        #[error("Serialization error: {0}")]
        Serialization(String),

        #[error("Corrupted record: {0}")]
        Corrupted(String),

        #[error("Invalid argument: {0}")]
        InvalidArgument(String),

        #[error("Configuration error: {0}")]
        Config(String),

        #[error("Not found: {0}")]
        NotFound(String),
    }

    impl From<serde_json::Error> for Error {
        fn from(e: serde_json::Error) -> Self {
            Error::Serialization(e.to_string())
        }
    }

    impl From<::config::ConfigError> for Error {
        fn from(e: ::config::ConfigError) -> Self {
            Error::Config(e.to_string())
        }
    }

    pub type Result<T> = std::result::Result<T, Error>;
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_format() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_error_display() {
        let err = error::Error::Corrupted("INDEX:meta".to_string());
        assert_eq!(err.to_string(), "Corrupted record: INDEX:meta");
    }
}
