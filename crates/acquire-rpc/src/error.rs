//! Error types for RPC dispatch and calls.

use acquire_core::{Classify, ErrorKind};
use acquire_envelope::EnvelopeError;
use thiserror::Error;

/// Errors that can occur while dispatching or making a call.
#[derive(Debug, Error)]
pub enum RpcError {
    /// Envelope could not be packed or unpacked, or the callee reported an error.
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    /// No handler is registered for the function.
    #[error("missing handler: {0}")]
    MissingHandler(String),

    /// The request could not be delivered.
    #[error("transport error: {0}")]
    Transport(String),

    /// The service directory has no entry for a URL.
    #[error("unknown service: {0}")]
    UnknownService(String),

    /// A handler failed.
    #[error("{message}")]
    Handler {
        kind: ErrorKind,
        module: &'static str,
        message: String,
    },
}

impl RpcError {
    /// Wrap a failure raised inside a handler, keeping its classification.
    pub fn handler<E: Classify>(err: E) -> Self {
        RpcError::Handler {
            kind: err.kind(),
            module: err.module(),
            message: err.to_string(),
        }
    }

    /// Arguments a handler cannot use.
    pub fn bad_args(message: impl Into<String>) -> Self {
        RpcError::Handler {
            kind: ErrorKind::Decode,
            module: "acquire_rpc",
            message: message.into(),
        }
    }
}

impl Classify for RpcError {
    fn kind(&self) -> ErrorKind {
        match self {
            RpcError::Envelope(e) => e.kind(),
            RpcError::MissingHandler(_) => ErrorKind::MissingHandler,
            RpcError::Transport(_) => ErrorKind::Transport,
            RpcError::UnknownService(_) => ErrorKind::KeyResolution,
            RpcError::Handler { kind, .. } => *kind,
        }
    }

    fn module(&self) -> &'static str {
        match self {
            RpcError::Envelope(e) => e.module(),
            RpcError::Handler { module, .. } => *module,
            _ => "acquire_rpc",
        }
    }
}

/// Result type for RPC operations.
pub type Result<T> = std::result::Result<T, RpcError>;
