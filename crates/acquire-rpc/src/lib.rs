//! # Acquire RPC
//!
//! Function calls between Acquire services.
//!
//! ## Overview
//!
//! A [`Dispatcher`] is the service side: it takes the raw bytes of a
//! request, unpacks them with the service's keys, runs the handler named
//! in the envelope and packs the outcome for the caller. It never fails;
//! errors travel back inside the reply.
//!
//! A [`Client`] is the caller side: it packs arguments, posts them over a
//! [`Transport`] and unpacks the reply, rebuilding remote errors.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use acquire_core::{value::text_map, Value};
//! use acquire_rpc::{
//!     CallContext, Client, ClientConfig, Dispatcher, DispatcherConfig, HandlerTable,
//!     InProcessTransport, MemoryDirectory, ServiceKeys,
//! };
//!
//! let handlers = HandlerTable::new().with("echo", |args, _ctx| Ok(Some(args)));
//! let service = Arc::new(Dispatcher::new(
//!     "https://echo.example",
//!     ServiceKeys::generate(),
//!     handlers,
//!     DispatcherConfig::default(),
//! ));
//!
//! let transport = InProcessTransport::new();
//! let directory = Arc::new(MemoryDirectory::new());
//! transport.serve(service.clone())?;
//! directory.register(service.info())?;
//!
//! let client = Client::new(transport, directory, ClientConfig::default());
//! let reply = client.call_service(
//!     &CallContext::new(),
//!     "https://echo.example",
//!     "echo",
//!     text_map([("x", Value::from(1))]),
//! )?;
//! # Ok::<(), acquire_rpc::RpcError>(())
//! ```

pub mod client;
pub mod context;
pub mod directory;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod transport;

pub use client::{CallOptions, Client, ClientConfig, FunctionCaller};
pub use context::CallContext;
pub use directory::{MemoryDirectory, ServiceDirectory, ServiceInfo};
pub use dispatcher::{Dispatcher, DispatcherConfig, ServiceKeys};
pub use error::{Result, RpcError};
pub use handler::{Handler, HandlerTable, Router};
pub use transport::{
    http::HttpTransport, memory::InProcessTransport, Transport, TransportResponse,
};
