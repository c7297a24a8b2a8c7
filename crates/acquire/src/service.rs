//! The Service: a dispatcher plus the PARs it has issued.
//!
//! A service answers RPC calls through its [`Dispatcher`], issues PARs
//! to callers and records each one in a [`ParRegistry`], so that only a
//! holder who can decrypt a PAR may later close it.

use std::sync::Arc;

use acquire_core::{value::get_text, PublicKey, Value};
use acquire_par::{Par, ParBuilder, CLOSE_PAR_FUNCTION};
use acquire_registry::{ParRecord, ParRegistry};
use acquire_rpc::{
    CallContext, Client, ClientConfig, Dispatcher, DispatcherConfig, HandlerTable,
    InProcessTransport, MemoryDirectory, RpcError, ServiceDirectory, ServiceInfo, ServiceKeys,
    Transport,
};
use tracing::info;
use uuid::Uuid;

use crate::error::{AcquireError, Result};

/// Configuration for a Service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// The URL the service is reached at.
    pub canonical_url: String,
    /// Dispatcher configuration.
    pub dispatcher: DispatcherConfig,
    /// Configuration for calls this service makes to others.
    pub client: ClientConfig,
}

impl ServiceConfig {
    /// Defaults for a service at `canonical_url`.
    pub fn new(canonical_url: impl Into<String>) -> Self {
        Self {
            canonical_url: canonical_url.into(),
            dispatcher: DispatcherConfig::default(),
            client: ClientConfig::default(),
        }
    }
}

/// Builds a [`Service`].
///
/// The built-in `close_par` and root handlers are added by [`build`](Self::build).
pub struct ServiceBuilder {
    config: ServiceConfig,
    keys: Option<ServiceKeys>,
    handlers: HandlerTable,
}

impl ServiceBuilder {
    pub fn new(config: ServiceConfig) -> Self {
        Self {
            config,
            keys: None,
            handlers: HandlerTable::new(),
        }
    }

    /// Use these keys instead of freshly generated ones.
    pub fn keys(mut self, keys: ServiceKeys) -> Self {
        self.keys = Some(keys);
        self
    }

    /// Register a handler under `name`.
    pub fn handler<F>(mut self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Value, &CallContext) -> acquire_rpc::Result<Option<Value>> + Send + Sync + 'static,
    {
        self.handlers.register(name, handler);
        self
    }

    /// Finish the service, recording issued PARs in `registry`.
    pub fn build<R: ParRegistry + 'static>(self, registry: R) -> Service<R> {
        let keys = self.keys.unwrap_or_else(ServiceKeys::generate);
        let registry = Arc::new(registry);
        let info = ServiceInfo {
            canonical_url: self.config.canonical_url.clone(),
            encryption_key: keys.encryption_key(),
            signing_cert: keys.signing_cert(),
        };

        let mut handlers = self.handlers;
        handlers.register_root(move |_args, _ctx| Ok(Some(info.to_value())));
        if !handlers.contains(CLOSE_PAR_FUNCTION) {
            let registry = registry.clone();
            handlers.register(CLOSE_PAR_FUNCTION, move |args, _ctx| {
                close_par(registry.as_ref(), &args)
            });
        }

        let dispatcher = Arc::new(Dispatcher::new(
            self.config.canonical_url.clone(),
            keys,
            handlers,
            self.config.dispatcher.clone(),
        ));

        Service {
            dispatcher,
            registry,
            config: self.config,
        }
    }
}

/// The `close_par` handler: delete a PAR if the caller proves it can read it.
fn close_par<R: ParRegistry + ?Sized>(
    registry: &R,
    args: &Value,
) -> acquire_rpc::Result<Option<Value>> {
    let map = args
        .as_map()
        .ok_or_else(|| RpcError::bad_args("close_par expects a map"))?;
    let uid = get_text(map, "par_uid").ok_or_else(|| RpcError::bad_args("missing par_uid"))?;
    let checksum =
        get_text(map, "url_checksum").ok_or_else(|| RpcError::bad_args("missing url_checksum"))?;
    let uid = Uuid::parse_str(uid).map_err(|e| RpcError::bad_args(format!("bad par_uid: {e}")))?;

    registry.close(&uid, checksum).map_err(RpcError::handler)?;
    Ok(None)
}

/// A running Acquire service.
pub struct Service<R: ParRegistry> {
    dispatcher: Arc<Dispatcher>,
    registry: Arc<R>,
    config: ServiceConfig,
}

impl<R: ParRegistry> Service<R> {
    pub fn canonical_url(&self) -> &str {
        self.dispatcher.canonical_url()
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn registry(&self) -> &R {
        &self.registry
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// The service's public keys.
    pub fn info(&self) -> ServiceInfo {
        self.dispatcher.info()
    }

    /// Handle one request. Never fails; errors travel in the reply.
    pub fn handle(&self, data: &[u8]) -> Vec<u8> {
        self.dispatcher.handle(data, None)
    }

    /// A client for calls this service makes, using its client configuration.
    pub fn client(
        &self,
        transport: Arc<dyn Transport>,
        directory: Arc<dyn ServiceDirectory>,
    ) -> Client {
        Client::new(transport, directory, self.config.client.clone())
    }

    /// Serve this service in-process and list it in `directory`.
    pub fn install(
        &self,
        transport: &InProcessTransport,
        directory: &MemoryDirectory,
    ) -> Result<()> {
        transport.serve(self.dispatcher.clone())?;
        directory.register_local(self.dispatcher.clone())?;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // PAR Operations
    // ─────────────────────────────────────────────────────────────────────────

    /// Issue a PAR readable only by the holder of `recipient`'s private key.
    ///
    /// The PAR names this service as its storage service, so closing it
    /// comes back here.
    pub fn issue_par(&self, builder: ParBuilder, recipient: &PublicKey) -> Result<Par> {
        let builder = builder.storage_url(self.canonical_url());
        let checksum = builder.url_checksum();
        let par = builder.build(recipient)?;

        let record = ParRecord::new(&par, checksum)
            .ok_or_else(|| AcquireError::InvalidOperation("issued a null PAR".into()))?;
        let uid = record.uid;
        self.registry.register(record)?;

        info!(service = %self.canonical_url(), %uid, "PAR issued");
        Ok(par)
    }

    /// Forget every PAR that has expired.
    pub fn purge_expired(&self) -> Result<usize> {
        Ok(self.registry.purge_expired(acquire_core::time::now())?)
    }
}

impl<R: ParRegistry> std::fmt::Debug for Service<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Service")
            .field("canonical_url", &self.canonical_url())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
