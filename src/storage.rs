//! Storage subsystem
//!
//! This module provides the durable buffer: the disk-backed, ordered store
//! holding captured messages that no consumer has received yet.
//!
//! Components:
//! - `storage_trait`: the `DurableBuffer` trait defining a uniform API.
//! - `types`: the persisted record format.
//! - `file_storage`: JSON Lines file implementation, easy to inspect.
//! - `database_storage`: SQLite implementation using SeaORM.
//! - `db_entities`: SeaORM entity models for the database backend.

pub mod database_storage;
pub mod db_entities;
pub mod file_storage;
pub mod storage_trait;
pub mod types;

use std::sync::Arc;

use log::info;

use crate::configuration::{StorageBackend, StorageConfig};
use crate::error_handling::types::StorageError;

pub use database_storage::DatabaseBuffer;
pub use file_storage::FileBuffer;
pub use storage_trait::DurableBuffer;

/// Opens the backend selected in the configuration.
pub fn open_buffer(config: &StorageConfig) -> Result<Arc<dyn DurableBuffer>, StorageError> {
    info!(
        "Opening {:?} durable buffer under {}",
        config.backend,
        config.path.display()
    );
    Ok(match config.backend {
        StorageBackend::File => Arc::new(FileBuffer::new(&config.path)?),
        StorageBackend::Database => Arc::new(DatabaseBuffer::new_in_dir(&config.path)?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_capture::types::CapturedMessage;
    use tempfile::TempDir;

    #[test]
    fn both_backends_open_from_config() {
        for backend in [StorageBackend::File, StorageBackend::Database] {
            let dir = TempDir::new().unwrap();
            let config = StorageConfig {
                backend,
                path: dir.path().join("buffer"),
            };
            let buffer = open_buffer(&config).unwrap();
            buffer.append(&CapturedMessage::new("A", "x")).unwrap();
            assert_eq!(buffer.len().unwrap(), 1, "{:?}", backend);
        }
    }
}
