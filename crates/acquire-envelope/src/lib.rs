//! # Acquire Envelope
//!
//! The secure RPC envelope: how call arguments and return values are
//! serialized, sealed for a recipient, signed, and opened again.
//!
//! ## Overview
//!
//! A caller packs `{payload, function, synctime}` and, optionally, the
//! public key the callee should seal its reply with plus the fingerprint
//! of the certificate the callee should sign it with. When an encryption
//! key is supplied the record is sealed and wrapped in
//! `{data, encrypted, fingerprint, signature?, synctime}`.
//!
//! The callee unpacks, runs the call, wraps the outcome in a status
//! record (see [`outcome`]) and packs it back using the caller's hints.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use acquire_core::{value::text_map, PrivateKey, Value};
//! use acquire_envelope::{pack_arguments, unpack_arguments, PackOptions, UnpackOptions};
//!
//! let service = PrivateKey::generate();
//! let service_public = service.public_key();
//!
//! let args = text_map([("x", Value::from(1))]);
//! let bytes = pack_arguments("add_one", args, &PackOptions::new().encrypt_for(&service_public))?;
//!
//! let call = unpack_arguments(&bytes, &UnpackOptions::new().decrypt_with(&service))?
//!     .expect("non-empty envelope");
//! assert_eq!(call.function.as_deref(), Some("add_one"));
//! # Ok::<(), acquire_envelope::EnvelopeError>(())
//! ```

pub mod error;
pub mod outcome;
pub mod pack;
pub mod unpack;
pub mod wire;

pub use error::{EnvelopeError, Result};
pub use outcome::{
    create_return_value, failure_value, success_value, RemoteError, RemoteException,
    STATUS_EXCEPTION, STATUS_OK,
};
pub use pack::{pack, pack_arguments, pack_failure, pack_return_value, PackOptions};
pub use unpack::{unpack_arguments, unpack_return_value, KeyHints, UnpackOptions, UnpackedCall};
pub use wire::MAX_NESTING_DEPTH;
