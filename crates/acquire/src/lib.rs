//! # Acquire
//!
//! Services that talk to each other through signed, encrypted envelopes
//! and hand out pre-authenticated resources (PARs).
//!
//! ## Overview
//!
//! - **Envelopes**: arguments and return values are packed into a binary
//!   map, optionally sealed for the recipient and signed by the sender
//! - **Dispatch**: a service unpacks each request, runs the named handler
//!   and always answers with a well-formed envelope
//! - **PARs**: time-limited, permission-scoped access to a bucket, an
//!   object or a calculation, encrypted for one key holder
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use acquire::{ServiceBuilder, ServiceConfig};
//! use acquire::core::{value::text_map, PrivateKey, Value};
//! use acquire::par::ParBuilder;
//! use acquire::registry::SqliteParRegistry;
//! use acquire::rpc::{CallContext, InProcessTransport, MemoryDirectory};
//! use chrono::{Duration, Utc};
//!
//! fn example() -> acquire::Result<()> {
//!     let service = ServiceBuilder::new(ServiceConfig::new("https://storage.example"))
//!         .handler("echo", |args, _ctx| Ok(Some(args)))
//!         .build(SqliteParRegistry::open("pars.db")?);
//!
//!     let transport = InProcessTransport::new();
//!     let directory = Arc::new(MemoryDirectory::new());
//!     service.install(&transport, &directory)?;
//!
//!     let client = service.client(transport, directory);
//!     let reply = client.call_service(
//!         &CallContext::new(),
//!         "https://storage.example",
//!         "echo",
//!         text_map([("x", Value::from(1))]),
//!     )?;
//!
//!     let key = PrivateKey::generate();
//!     let mut par = service.issue_par(
//!         ParBuilder::new("https://objstore.example/b/results", Utc::now() + Duration::hours(1))
//!             .readable(),
//!         &key.public_key(),
//!     )?;
//!     par.close(&client, &CallContext::new(), Some(&key))?;
//!     Ok(())
//! }
//! ```
//!
//! ## Re-exports
//!
//! - `acquire::core` - Keys, fingerprints, error taxonomy
//! - `acquire::envelope` - Packing and unpacking
//! - `acquire::rpc` - Dispatcher, transports, client
//! - `acquire::par` - PARs and accessors
//! - `acquire::registry` - Records of issued PARs

pub mod error;
pub mod service;

pub use acquire_core as core;
pub use acquire_envelope as envelope;
pub use acquire_par as par;
pub use acquire_registry as registry;
pub use acquire_rpc as rpc;

pub use error::{AcquireError, Result};
pub use service::{Service, ServiceBuilder, ServiceConfig};

pub use acquire_core::{Classify, ErrorKind, PrivateCert, PrivateKey, PublicCert, PublicKey};
pub use acquire_par::{Par, ParBuilder, ParKind};
pub use acquire_rpc::{CallContext, Client, Dispatcher, ServiceKeys};
