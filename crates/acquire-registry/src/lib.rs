//! # Acquire Registry
//!
//! Records the PARs a storage service has issued, so that a later
//! `close_par` request can be checked against them.
//!
//! ## Key Types
//!
//! - [`ParRegistry`] - The trait for registry operations
//! - [`SqliteParRegistry`] - SQLite-based persistent registry
//! - [`MemoryParRegistry`] - In-memory registry for tests and embedding
//! - [`ParRecord`] - What is remembered about one PAR
//!
//! ## Design Notes
//!
//! - **No plaintext URLs**: only a checksum of each URL is stored
//! - **Checked close**: a PAR is removed only when the closer presents the
//!   checksum of the URL it decrypted

pub mod error;
pub mod memory;
pub mod migration;
pub mod sqlite;
pub mod traits;

pub use error::{RegistryError, Result};
pub use memory::MemoryParRegistry;
pub use sqlite::SqliteParRegistry;
pub use traits::{ParRecord, ParRegistry};
