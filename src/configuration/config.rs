use std::fs;
use std::path::Path;
use std::time::Duration;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use super::types::*;
use crate::error_handling::types::ConfigError;
use crate::storage::file_storage::STORAGE_DIR_ENV;

/// Upper bound for `delivery.dedup_capacity`.
pub const MAX_DEDUP_CAPACITY: usize = 4096;
/// Upper bound for `delivery.keep_alive_ms`.
pub const MAX_KEEP_ALIVE_MS: u64 = 60_000;

/// Runtime configuration of the relay.
///
/// Loaded from a TOML file; every section and field is optional and falls
/// back to its default.
///
/// ```toml
/// [storage]
/// backend = "database"
/// path = "/var/lib/sms-relay"
///
/// [delivery]
/// dedup_capacity = 64
/// keep_alive_ms = 10000
///
/// [permissions]
/// granted = true
/// ```
///
/// # Fields Overview
///
/// - `storage`: where and how the durable buffer is kept
/// - `delivery`: duplicate suppression and fallback keep-alive tuning
/// - `permissions`: initial state of the built-in permission provider
#[derive(Debug, PartialEq, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub delivery: DeliveryConfig,
    pub permissions: PermissionConfig,
}

impl Config {
    /// Reads, applies environment overrides to, and validates a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        info!("Loading configuration from {}", path.display());
        let raw = fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&raw)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Parses TOML without touching the environment or validating.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        toml::from_str(raw).map_err(|e| ConfigError::TomlError(e.to_string()))
    }

    /// `SMS_RELAY_STORAGE_DIR` overrides `storage.path`.
    pub fn apply_env(&mut self) {
        if let Ok(dir) = std::env::var(STORAGE_DIR_ENV) {
            debug!("{} overrides storage path with {}", STORAGE_DIR_ENV, dir);
            self.storage.path = dir.into();
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let capacity = self.delivery.dedup_capacity;
        if capacity == 0 || capacity > MAX_DEDUP_CAPACITY {
            return Err(ConfigError::NotInRange(format!(
                "delivery.dedup_capacity must be within 1..={}, got {}",
                MAX_DEDUP_CAPACITY, capacity
            )));
        }
        if self.delivery.keep_alive_ms > MAX_KEEP_ALIVE_MS {
            return Err(ConfigError::NotInRange(format!(
                "delivery.keep_alive_ms must be at most {}, got {}",
                MAX_KEEP_ALIVE_MS, self.delivery.keep_alive_ms
            )));
        }
        if let Some(parent) = self.storage.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                return Err(ConfigError::DirectoryDoesNotExist(format!(
                    "parent of storage path {} does not exist",
                    self.storage.path.display()
                )));
            }
        }
        Ok(())
    }

    /// Overrides `storage.backend` by name, as given on the command line.
    pub fn set_backend(&mut self, name: &str) -> Result<(), ConfigError> {
        self.storage.backend = name.parse().map_err(ConfigError::UnknownBackend)?;
        Ok(())
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_millis(self.delivery.keep_alive_ms)
    }
}
