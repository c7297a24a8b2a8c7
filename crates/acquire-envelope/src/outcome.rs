//! Return values and remote exceptions.
//!
//! A callee wraps the outcome of a call in a status record:
//!
//! ```text
//! { status: 0 }                                   no result
//! { status: 0, return: <map> }                    map result
//! { status: 0, return: { result: <value> } }      any other result
//! { status: -1, exception: { class, module, error, traceback } }
//! ```
//!
//! The caller turns an exception record back into a [`RemoteError`].

use acquire_core::value::{entry, get, get_text, text_map};
use acquire_core::{Classify, ErrorKind, Value};
use thiserror::Error;

use crate::wire::keys;

/// Status of a successful call.
pub const STATUS_OK: i64 = 0;

/// Status of a call that raised an error.
pub const STATUS_EXCEPTION: i64 = -1;

/// Class name sent by runtimes whose text decoding failed. Its
/// constructor is incompatible with a plain message, so it is mapped to
/// a decode error rather than rebuilt.
const UNICODE_DECODE_CLASS: &str = "UnicodeDecodeError";

/// Build the status record for a call outcome.
pub fn create_return_value<E: Classify>(result: std::result::Result<Option<Value>, E>) -> Value {
    match result {
        Ok(value) => success_value(value),
        Err(e) => failure_value(&e),
    }
}

/// Status record for a successful call.
pub fn success_value(value: Option<Value>) -> Value {
    match value {
        None | Some(Value::Null) => text_map([(keys::STATUS, Value::from(STATUS_OK))]),
        Some(map @ Value::Map(_)) => text_map([
            (keys::STATUS, Value::from(STATUS_OK)),
            (keys::RETURN, map),
        ]),
        Some(other) => text_map([
            (keys::STATUS, Value::from(STATUS_OK)),
            (keys::RETURN, text_map([(keys::RESULT, other)])),
        ]),
    }
}

/// Status record for a failed call.
pub fn failure_value<E: Classify + ?Sized>(err: &E) -> Value {
    text_map([
        (keys::STATUS, Value::from(STATUS_EXCEPTION)),
        (keys::EXCEPTION, RemoteException::from_error(err).to_value()),
    ])
}

/// The portable form of an error raised by a callee.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteException {
    pub class: String,
    pub module: String,
    pub error: String,
    pub traceback: Vec<String>,
}

impl RemoteException {
    /// Capture an error, walking its source chain for the traceback.
    pub fn from_error<E: Classify + ?Sized>(err: &E) -> Self {
        let mut traceback = Vec::new();
        let mut source = err.source();
        while let Some(s) = source {
            traceback.push(s.to_string());
            source = s.source();
        }

        Self {
            class: err.kind().class_name().to_string(),
            module: err.module().to_string(),
            error: err.to_string(),
            traceback,
        }
    }

    /// Encode as an exception record.
    pub fn to_value(&self) -> Value {
        let frames = self.traceback.iter().map(|f| Value::from(f.as_str())).collect();
        Value::Map(vec![
            entry(keys::CLASS, self.class.as_str()),
            entry(keys::MODULE, self.module.as_str()),
            entry(keys::ERROR, self.error.as_str()),
            entry(
                keys::TRACEBACK,
                text_map([(keys::FRAMES, Value::Array(frames))]),
            ),
        ])
    }

    /// Decode an exception record.
    ///
    /// `class` and `error` are required. A missing or malformed traceback
    /// decodes as empty.
    pub fn from_value(value: &Value) -> std::result::Result<Self, String> {
        let map = value
            .as_map()
            .ok_or_else(|| "exception data is not a map".to_string())?;

        let class = get_text(map, keys::CLASS)
            .ok_or_else(|| "exception data has no class".to_string())?;
        let error = get_text(map, keys::ERROR)
            .ok_or_else(|| "exception data has no error message".to_string())?;
        let module = get_text(map, keys::MODULE).unwrap_or_default();

        let traceback = get(map, keys::TRACEBACK)
            .and_then(Value::as_map)
            .and_then(|tb| get(tb, keys::FRAMES))
            .and_then(Value::as_array)
            .map(|frames| {
                frames
                    .iter()
                    .filter_map(|f| f.as_text().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            class: class.to_string(),
            module: module.to_string(),
            error: error.to_string(),
            traceback,
        })
    }

    /// Rebuild the error on the caller's side, naming the remote call.
    pub fn into_remote_error(self, function: &str, service: &str) -> RemoteError {
        let message = format!(
            "Error calling '{function}' on '{service}': {}",
            self.error
        );

        let known = if self.class == UNICODE_DECODE_CLASS {
            Some(ErrorKind::Decode)
        } else {
            ErrorKind::from_class_name(&self.class)
        };

        match known {
            Some(kind) => RemoteError::Known {
                kind,
                message,
                traceback: self.traceback,
            },
            None => RemoteError::Unrecognized {
                class: self.class,
                module: self.module,
                message,
                traceback: self.traceback,
            },
        }
    }
}

/// An error reported by a remote service.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// A kind this runtime knows.
    #[error("{kind}: {message}")]
    Known {
        kind: ErrorKind,
        message: String,
        traceback: Vec<String>,
    },

    /// A class this runtime does not know, kept by name.
    #[error("{class} ({module}): {message}")]
    Unrecognized {
        class: String,
        module: String,
        message: String,
        traceback: Vec<String>,
    },
}

impl RemoteError {
    /// The kind of the remote failure. Unrecognized classes are `RemoteCall`.
    pub fn kind(&self) -> ErrorKind {
        match self {
            RemoteError::Known { kind, .. } => *kind,
            RemoteError::Unrecognized { .. } => ErrorKind::RemoteCall,
        }
    }

    /// The message, prefixed with the remote function and service.
    pub fn message(&self) -> &str {
        match self {
            RemoteError::Known { message, .. } | RemoteError::Unrecognized { message, .. } => {
                message
            }
        }
    }

    /// The remote error's source chain, outermost first.
    pub fn traceback(&self) -> &[String] {
        match self {
            RemoteError::Known { traceback, .. } | RemoteError::Unrecognized { traceback, .. } => {
                traceback
            }
        }
    }
}
