//! Error types for Acquire Core.

use thiserror::Error;

/// Errors raised by the key capability types.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption error: {0}")]
    Encryption(String),

    #[error("decryption error: {0}")]
    Decryption(String),

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("invalid signature")]
    InvalidSignature,

    #[error("malformed ciphertext: {0}")]
    MalformedCiphertext(String),
}

/// Classification of a failure, stable across service boundaries.
///
/// The class name of a kind is what travels on the wire inside an
/// exception payload, so callers can rebuild a typed error from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed binary data.
    Decode,
    /// Fingerprint unknown or mismatched.
    KeyResolution,
    /// Signature missing or invalid.
    Signature,
    /// Capability flag mismatch on a PAR or accessor.
    Permission,
    /// PAR validity window exceeded.
    Expiry,
    /// Network or status-code failure.
    Transport,
    /// Callee-reported failure not otherwise classified.
    RemoteCall,
    /// Unresolvable function name.
    MissingHandler,
    /// Envelope could not be built.
    Packing,
    /// Encryption or decryption failed.
    Crypto,
    /// Backing store failure.
    Storage,
    /// Anything else.
    Internal,
}

impl ErrorKind {
    /// Every kind, in declaration order.
    pub const ALL: [ErrorKind; 12] = [
        ErrorKind::Decode,
        ErrorKind::KeyResolution,
        ErrorKind::Signature,
        ErrorKind::Permission,
        ErrorKind::Expiry,
        ErrorKind::Transport,
        ErrorKind::RemoteCall,
        ErrorKind::MissingHandler,
        ErrorKind::Packing,
        ErrorKind::Crypto,
        ErrorKind::Storage,
        ErrorKind::Internal,
    ];

    /// The class name used on the wire.
    pub const fn class_name(self) -> &'static str {
        match self {
            ErrorKind::Decode => "DecodeError",
            ErrorKind::KeyResolution => "KeyResolutionError",
            ErrorKind::Signature => "SignatureError",
            ErrorKind::Permission => "PermissionError",
            ErrorKind::Expiry => "ExpiryError",
            ErrorKind::Transport => "TransportError",
            ErrorKind::RemoteCall => "RemoteCallError",
            ErrorKind::MissingHandler => "MissingHandlerError",
            ErrorKind::Packing => "PackingError",
            ErrorKind::Crypto => "CryptoError",
            ErrorKind::Storage => "StorageError",
            ErrorKind::Internal => "InternalError",
        }
    }

    /// Look up a kind by its wire class name.
    pub fn from_class_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.class_name() == name)
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.class_name())
    }
}

/// An error that knows its [`ErrorKind`] and originating module.
pub trait Classify: std::error::Error {
    /// The kind of failure.
    fn kind(&self) -> ErrorKind;

    /// The crate the error originated in.
    fn module(&self) -> &'static str;
}

impl Classify for CryptoError {
    fn kind(&self) -> ErrorKind {
        match self {
            CryptoError::InvalidSignature => ErrorKind::Signature,
            CryptoError::InvalidPublicKey(_) => ErrorKind::KeyResolution,
            CryptoError::MalformedCiphertext(_) => ErrorKind::Decode,
            CryptoError::Encryption(_) | CryptoError::Decryption(_) => ErrorKind::Crypto,
        }
    }

    fn module(&self) -> &'static str {
        "acquire_core"
    }
}
