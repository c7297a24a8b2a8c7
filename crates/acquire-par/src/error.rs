//! Error types for PARs and their accessors.

use acquire_core::{Classify, CryptoError, ErrorKind};
use acquire_rpc::RpcError;
use thiserror::Error;

/// Errors that can occur while using a PAR.
#[derive(Debug, Error)]
pub enum ParError {
    /// The PAR does not grant the requested capability.
    #[error("permission denied: {0}")]
    Permission(String),

    /// The PAR is too close to (or past) its expiry time.
    #[error("the URL behind this PAR has expired and is no longer valid")]
    Expired,

    /// The PAR is null.
    #[error("you cannot {0} an empty PAR")]
    EmptyPar(&'static str),

    /// Reading from the backing store failed.
    #[error("read failed: {0}")]
    Read(String),

    /// Writing to the backing store failed.
    #[error("write failed: {0}")]
    Write(String),

    /// No backend is configured for the URL's scheme.
    #[error("no storage backend for {0} URLs")]
    NoBackend(&'static str),

    /// Stored data was not in the expected format.
    #[error("decode error: {0}")]
    Decode(String),

    /// Persisted PAR data is invalid.
    #[error("invalid PAR data: {0}")]
    InvalidPar(String),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Rpc(#[from] RpcError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl Classify for ParError {
    fn kind(&self) -> ErrorKind {
        match self {
            ParError::Permission(_) | ParError::EmptyPar(_) => ErrorKind::Permission,
            ParError::Expired => ErrorKind::Expiry,
            ParError::Read(_) | ParError::Write(_) => ErrorKind::Transport,
            ParError::NoBackend(_) | ParError::Io(_) => ErrorKind::Storage,
            ParError::Decode(_) | ParError::InvalidPar(_) => ErrorKind::Decode,
            ParError::Crypto(e) => e.kind(),
            ParError::Rpc(e) => e.kind(),
        }
    }

    fn module(&self) -> &'static str {
        match self {
            ParError::Crypto(e) => e.module(),
            ParError::Rpc(e) => e.module(),
            _ => "acquire_par",
        }
    }
}

/// Result type for PAR operations.
pub type Result<T> = std::result::Result<T, ParError>;
