//! # Acquire PAR
//!
//! Pre-authenticated resources: time-limited, permission-scoped access to
//! a bucket, a single object or a calculation trigger.
//!
//! ## Overview
//!
//! A [`Par`] holds an access URL encrypted for one private key. Whoever
//! holds that key can open an accessor on it:
//!
//! - [`BucketReader`] / [`BucketWriter`] for a whole bucket
//! - [`ObjectReader`] / [`ObjectWriter`] for one object
//! - [`ComputeRunner`] for a calculation
//!
//! Accessors talk to a [`Storage`], which routes each URL to a local or
//! remote [`StorageBackend`] by scheme.
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use acquire_core::PrivateKey;
//! use acquire_par::{MemoryBackend, ParBuilder, Storage};
//! use chrono::{Duration, Utc};
//!
//! let key = PrivateKey::generate();
//! let par = ParBuilder::new("https://store.example/b/bucket", Utc::now() + Duration::hours(1))
//!     .readable()
//!     .writeable()
//!     .build(&key.public_key())?
//!     .with_private_key(key);
//!
//! let storage = Storage::single(Arc::new(MemoryBackend::new()));
//! let writer = par.write(&storage, None)?.into_bucket().unwrap();
//! writer.set_string_object("hello.txt", "hi")?;
//!
//! let reader = par.read(&storage, None)?.into_bucket().unwrap();
//! assert_eq!(reader.get_string_object("hello.txt")?, "hi");
//! # Ok::<(), acquire_par::ParError>(())
//! ```

pub mod accessor;
pub mod error;
pub mod par;
pub mod storage;

pub use accessor::{
    join_key, BucketReader, BucketWriter, ComputeRunner, ObjectReader, ObjectWriter, Reader,
    Writer,
};
pub use error::{ParError, Result};
pub use par::{checksum, Par, ParBuilder, ParKind, CLOSE_PAR_FUNCTION, DEFAULT_EXPIRY_BUFFER_SECS};
pub use storage::{MemoryBackend, Storage, StorageBackend, LOCAL_SCHEME};
