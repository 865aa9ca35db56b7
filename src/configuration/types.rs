use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, PartialEq, Eq, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// JSON Lines file in the storage directory
    File,
    /// SQLite database in the storage directory
    Database,
}

impl Default for StorageBackend {
    fn default() -> Self {
        StorageBackend::File
    }
}

impl std::str::FromStr for StorageBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "file" => Ok(StorageBackend::File),
            "database" | "db" | "sqlite" => Ok(StorageBackend::Database),
            other => Err(other.to_string()),
        }
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::File,
            path: PathBuf::from("sms-relay-data"),
        }
    }
}

#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// How many recently delivered messages are remembered to suppress
    /// a second copy captured by the other path.
    pub dedup_capacity: usize,
    /// Keep-alive the fallback path requests before a durable write.
    pub keep_alive_ms: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            dedup_capacity: 64,
            keep_alive_ms: 10_000,
        }
    }
}

#[derive(Debug, PartialEq, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionConfig {
    pub granted: bool,
}
