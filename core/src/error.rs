use thiserror::Error;

#[derive(Debug, Error)]
pub enum BlkcryptError {
    #[error("lsblk failed: {0}")]
    ListBlockDevice(String),

    #[error("tune2fs failed: {0}")]
    Tune2fs(String),

    #[error("Invalid identifier type: {0} (expected NAME, LABEL, UUID or KNAME)")]
    InvalidIdentifier(String),

    #[error("Insufficient privileges: {0}")]
    InsufficientPrivileges(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BlkcryptError>;
