//! Error types for the PAR registry.

use acquire_core::{Classify, ErrorKind};
use thiserror::Error;

/// Errors that can occur during registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// No PAR is registered with this uid.
    #[error("no PAR with uid {0}")]
    NotFound(String),

    /// A PAR with this uid is already registered.
    #[error("PAR {0} is already registered")]
    Duplicate(String),

    /// The caller could not prove it holds the PAR.
    #[error("checksum mismatch closing PAR {0}")]
    ChecksumMismatch(String),

    /// Invalid data in storage.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// Lock poisoned.
    #[error("registry lock poisoned")]
    Poisoned,
}

impl Classify for RegistryError {
    fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::ChecksumMismatch(_) => ErrorKind::Permission,
            RegistryError::InvalidData(_) => ErrorKind::Decode,
            RegistryError::Poisoned => ErrorKind::Internal,
            RegistryError::Database(_)
            | RegistryError::NotFound(_)
            | RegistryError::Duplicate(_)
            | RegistryError::Migration(_) => ErrorKind::Storage,
        }
    }

    fn module(&self) -> &'static str {
        "acquire_registry"
    }
}

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;
