//! # Acquire Testkit
//!
//! Testing utilities for Acquire.
//!
//! ## Overview
//!
//! This crate provides:
//!
//! - **Fixtures**: a federation of in-process services and seeded keys
//! - **Generators**: proptest strategies for payloads, keys and PAR parameters
//!
//! ## Test Fixtures
//!
//! ```rust
//! use acquire::{ServiceBuilder, ServiceConfig};
//! use acquire_core::value::empty_map;
//! use acquire_rpc::CallContext;
//! use acquire_testkit::fixtures::TestFederation;
//!
//! let fed = TestFederation::new();
//! fed.add(ServiceBuilder::new(ServiceConfig::new("https://echo.example"))
//!     .handler("echo", |args, _ctx| Ok(Some(args))));
//!
//! let reply = fed
//!     .client()
//!     .call_service(&CallContext::new(), "https://echo.example", "echo", empty_map())
//!     .unwrap();
//! ```
//!
//! ## Property Testing
//!
//! ```rust,ignore
//! use proptest::prelude::*;
//! use acquire_testkit::generators::{function_name, payload};
//!
//! proptest! {
//!     #[test]
//!     fn roundtrip(f in function_name(), p in payload()) {
//!         // pack, unpack, compare
//!     }
//! }
//! ```

pub mod fixtures;
pub mod generators;

pub use fixtures::{seeded_key, seeded_service_keys, TestFederation};
pub use generators::{function_name, payload, CapabilityParams};
