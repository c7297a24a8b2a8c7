//! Error types for Acquire services.

use acquire_core::{Classify, CryptoError, ErrorKind};
use acquire_envelope::EnvelopeError;
use acquire_par::ParError;
use acquire_registry::RegistryError;
use acquire_rpc::RpcError;
use thiserror::Error;

/// Errors that can occur during service operations.
#[derive(Debug, Error)]
pub enum AcquireError {
    /// Call or dispatch error.
    #[error("rpc error: {0}")]
    Rpc(#[from] RpcError),

    /// Envelope error.
    #[error("envelope error: {0}")]
    Envelope(#[from] EnvelopeError),

    /// PAR error.
    #[error("PAR error: {0}")]
    Par(#[from] ParError),

    /// Registry error.
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    /// Invalid operation.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),
}

impl Classify for AcquireError {
    fn kind(&self) -> ErrorKind {
        match self {
            AcquireError::Rpc(e) => e.kind(),
            AcquireError::Envelope(e) => e.kind(),
            AcquireError::Par(e) => e.kind(),
            AcquireError::Registry(e) => e.kind(),
            AcquireError::Crypto(e) => e.kind(),
            AcquireError::InvalidOperation(_) => ErrorKind::Internal,
        }
    }

    fn module(&self) -> &'static str {
        match self {
            AcquireError::Rpc(e) => e.module(),
            AcquireError::Envelope(e) => e.module(),
            AcquireError::Par(e) => e.module(),
            AcquireError::Registry(e) => e.module(),
            AcquireError::Crypto(e) => e.module(),
            AcquireError::InvalidOperation(_) => "acquire",
        }
    }
}

/// Result type for service operations.
pub type Result<T> = std::result::Result<T, AcquireError>;
