use std::fmt;

#[derive(Debug)]
pub enum ConfigError {
    IoError(std::io::Error),
    TomlError(String),
    NotInRange(String),
    DirectoryDoesNotExist(String),
    UnknownBackend(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::IoError(e) => write!(f, "IO error: {}", e),
            ConfigError::TomlError(e) => write!(f, "TOML parsing error: {}", e),
            ConfigError::NotInRange(e) => write!(f, "Value out of range: {}", e),
            ConfigError::DirectoryDoesNotExist(e) => write!(f, "Directory error: {}", e),
            ConfigError::UnknownBackend(e) => write!(f, "Unknown storage backend: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        ConfigError::IoError(err)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    ConnectionFailed,
    WriteFailed,
    ReadFailed,
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::ConnectionFailed => write!(f, "Storage connection failed"),
            StorageError::WriteFailed => write!(f, "Storage write failed"),
            StorageError::ReadFailed => write!(f, "Storage read failed"),
        }
    }
}

impl std::error::Error for StorageError {}

/// Failures on the capture side of the pipeline.
///
/// None of these escape an event callback; they are returned by the
/// `handle` methods of the capture paths and logged by `on_receive`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    MalformedEvent(String),
    PersistenceWriteFailed(StorageError),
    RegistrationFailed(String),
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::MalformedEvent(e) => write!(f, "Malformed capture event: {}", e),
            CaptureError::PersistenceWriteFailed(e) => {
                write!(f, "Durable buffer append failed: {}", e)
            }
            CaptureError::RegistrationFailed(e) => {
                write!(f, "Capture registration failed: {}", e)
            }
        }
    }
}

impl std::error::Error for CaptureError {}

/// Errors surfaced by the application-facing operations of the coordinator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    NotAuthorized,
    CaptureRegistrationFailed(String),
    Storage(StorageError),
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayError::NotAuthorized => write!(f, "Message capture is not authorized"),
            RelayError::CaptureRegistrationFailed(e) => {
                write!(f, "Capture registration failed: {}", e)
            }
            RelayError::Storage(e) => write!(f, "Storage error: {}", e),
        }
    }
}

impl std::error::Error for RelayError {}

impl From<StorageError> for RelayError {
    fn from(err: StorageError) -> Self {
        RelayError::Storage(err)
    }
}

#[derive(Debug)]
pub enum ControllerError {
    ConfigurationError(ConfigError),
    RelayError(RelayError),
    StorageError(StorageError),
    InitializationFailed(String),
    IoFailed(String),
}

impl fmt::Display for ControllerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControllerError::ConfigurationError(e) => write!(f, "Configuration error: {}", e),
            ControllerError::RelayError(e) => write!(f, "Relay error: {}", e),
            ControllerError::StorageError(e) => write!(f, "Storage error: {}", e),
            ControllerError::InitializationFailed(e) => write!(f, "Initialization failed: {}", e),
            ControllerError::IoFailed(e) => write!(f, "I/O failed: {}", e),
        }
    }
}

impl std::error::Error for ControllerError {}

impl From<ConfigError> for ControllerError {
    fn from(err: ConfigError) -> Self {
        ControllerError::ConfigurationError(err)
    }
}

impl From<RelayError> for ControllerError {
    fn from(err: RelayError) -> Self {
        ControllerError::RelayError(err)
    }
}

impl From<StorageError> for ControllerError {
    fn from(err: StorageError) -> Self {
        ControllerError::StorageError(err)
    }
}
