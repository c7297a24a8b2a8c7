//! Error types for the envelope codec.

use acquire_core::{Classify, CryptoError, ErrorKind};
use thiserror::Error;

use crate::outcome::RemoteError;

/// Errors that can occur while packing or unpacking an envelope.
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("decode error: {0}")]
    Decode(String),

    #[error("no payload in envelope: {0}")]
    MissingPayload(String),

    #[error("envelope nests more than {0} encrypted layers")]
    NestingTooDeep(usize),

    #[error("key resolution error: {0}")]
    KeyResolution(String),

    #[error("signature error: {0}")]
    Signature(String),

    #[error("packing error: {0}")]
    Packing(String),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("remote call error: {0}")]
    RemoteCall(String),
}

impl Classify for EnvelopeError {
    fn kind(&self) -> ErrorKind {
        match self {
            EnvelopeError::Decode(_)
            | EnvelopeError::MissingPayload(_)
            | EnvelopeError::NestingTooDeep(_) => ErrorKind::Decode,
            EnvelopeError::KeyResolution(_) => ErrorKind::KeyResolution,
            EnvelopeError::Signature(_) => ErrorKind::Signature,
            EnvelopeError::Packing(_) => ErrorKind::Packing,
            EnvelopeError::Crypto(e) => e.kind(),
            EnvelopeError::Remote(e) => e.kind(),
            EnvelopeError::RemoteCall(_) => ErrorKind::RemoteCall,
        }
    }

    fn module(&self) -> &'static str {
        match self {
            EnvelopeError::Crypto(e) => e.module(),
            _ => "acquire_envelope",
        }
    }
}

/// Result type for envelope operations.
pub type Result<T> = std::result::Result<T, EnvelopeError>;
