//! # Acquire Core
//!
//! Pure primitives shared by every Acquire crate: key capabilities,
//! fingerprints, the cross-service error taxonomy and a few value helpers.
//!
//! This crate contains no I/O, no storage, no networking.
//!
//! ## Key Types
//!
//! - [`PublicKey`] / [`PrivateKey`] - X25519 sealed-box encryption keys
//! - [`PublicCert`] / [`PrivateCert`] - Ed25519 signing certificates
//! - [`Fingerprint`] - Short stable identifier of a public key or cert
//! - [`ErrorKind`] - Error classification carried across service boundaries

pub mod crypto;
pub mod error;
pub mod keyring;
pub mod time;
pub mod value;

pub use crypto::{Fingerprint, PrivateCert, PrivateKey, PublicCert, PublicKey, Signature};
pub use error::{Classify, CryptoError, ErrorKind};
pub use keyring::{CertResolver, KeyResolver, Keyring};
pub use value::Value;
