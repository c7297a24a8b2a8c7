//! The service-side entry point: bytes in, bytes out.

use std::panic::{self, AssertUnwindSafe};

use acquire_core::value::empty_map;
use acquire_core::{
    CertResolver, ErrorKind, Fingerprint, KeyResolver, Keyring, PrivateCert, PrivateKey,
    PublicCert, PublicKey, Value,
};
use acquire_envelope::{
    create_return_value, pack_failure, pack_return_value, unpack_arguments, KeyHints,
    UnpackOptions, MAX_NESTING_DEPTH,
};
use tracing::{debug, warn};

use crate::context::CallContext;
use crate::directory::ServiceInfo;
use crate::error::{Result, RpcError};
use crate::handler::{HandlerTable, Router};

/// Configuration for a dispatcher.
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Maximum number of encrypted layers accepted in a request.
    pub max_nesting_depth: usize,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_nesting_depth: MAX_NESTING_DEPTH,
        }
    }
}

/// The long-term key material of a service.
///
/// Holds the current encryption key and signing certificate, plus any
/// retired keys still accepted for decryption.
#[derive(Debug, Clone)]
pub struct ServiceKeys {
    keyring: Keyring,
    encryption_key: PublicKey,
    signing_cert: PublicCert,
}

impl ServiceKeys {
    /// Keys from an encryption key and a signing certificate.
    pub fn new(encryption: PrivateKey, signing: PrivateCert) -> Self {
        let encryption_key = encryption.public_key();
        let signing_cert = signing.public_cert();
        Self {
            keyring: Keyring::new().with_key(encryption).with_cert(signing),
            encryption_key,
            signing_cert,
        }
    }

    /// Fresh random keys.
    pub fn generate() -> Self {
        Self::new(PrivateKey::generate(), PrivateCert::generate())
    }

    /// Keys derived from a seed, for reproducible tests.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let mut cert_seed = seed;
        cert_seed.reverse();
        Self::new(PrivateKey::from_bytes(seed), PrivateCert::from_seed(&cert_seed))
    }

    /// Replace the encryption key, keeping the old one for decryption.
    pub fn rotate_key(&mut self, key: PrivateKey) {
        self.encryption_key = key.public_key();
        self.keyring.add_key(key);
    }

    /// The current public encryption key.
    pub fn encryption_key(&self) -> PublicKey {
        self.encryption_key
    }

    /// The public signing certificate.
    pub fn signing_cert(&self) -> PublicCert {
        self.signing_cert
    }

    /// Fingerprint of the signing certificate.
    pub fn signing_fingerprint(&self) -> Fingerprint {
        self.signing_cert.fingerprint()
    }
}

impl KeyResolver for ServiceKeys {
    fn resolve_key(&self, fingerprint: &Fingerprint) -> Option<PrivateKey> {
        self.keyring.resolve_key(fingerprint)
    }
}

impl CertResolver for ServiceKeys {
    fn resolve_cert(&self, fingerprint: &Fingerprint) -> Option<PrivateCert> {
        self.keyring.resolve_cert(fingerprint)
    }
}

/// Unpacks a request, runs the named handler and packs the reply.
///
/// Holds no per-call state: everything needed for the reply leg comes
/// from the request itself.
#[derive(Debug)]
pub struct Dispatcher {
    canonical_url: String,
    keys: ServiceKeys,
    handlers: HandlerTable,
    config: DispatcherConfig,
}

impl Dispatcher {
    /// Create a dispatcher for the service at `canonical_url`.
    pub fn new(
        canonical_url: impl Into<String>,
        keys: ServiceKeys,
        handlers: HandlerTable,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            canonical_url: canonical_url.into(),
            keys,
            handlers,
            config,
        }
    }

    /// The URL this service is reached at.
    pub fn canonical_url(&self) -> &str {
        &self.canonical_url
    }

    /// The service's key material.
    pub fn keys(&self) -> &ServiceKeys {
        &self.keys
    }

    /// The registered handlers.
    pub fn handlers(&self) -> &HandlerTable {
        &self.handlers
    }

    /// The service's public face.
    pub fn info(&self) -> ServiceInfo {
        ServiceInfo {
            canonical_url: self.canonical_url.clone(),
            encryption_key: self.keys.encryption_key(),
            signing_cert: self.keys.signing_cert(),
        }
    }

    /// Handle a request from outside any service.
    ///
    /// Never fails: whatever goes wrong is reported inside the reply.
    pub fn handle(&self, data: &[u8], router: Option<&dyn Router>) -> Vec<u8> {
        self.handle_in(&CallContext::new(), data, router)
    }

    /// Handle a request made from within `outer`.
    pub fn handle_in(
        &self,
        outer: &CallContext,
        data: &[u8],
        router: Option<&dyn Router>,
    ) -> Vec<u8> {
        let ctx = outer.enter(&self.canonical_url);
        let opts = UnpackOptions::new()
            .decrypt_with(&self.keys)
            .max_depth(self.config.max_nesting_depth);

        let (result, hints) = match unpack_arguments(data, &opts) {
            Ok(Some(call)) => {
                debug!(
                    service = %self.canonical_url,
                    function = call.function.as_deref().unwrap_or("<root>"),
                    depth = ctx.depth(),
                    sent_at = ?call.synctime,
                    "dispatching call"
                );
                let result = self.route(call.function.as_deref(), call.args, &ctx, router);
                (result, call.hints)
            }
            Ok(None) => (
                self.route(None, empty_map(), &ctx, router),
                KeyHints::default(),
            ),
            Err(e) => (Err(RpcError::from(e)), KeyHints::default()),
        };

        if let Err(e) = &result {
            warn!(service = %self.canonical_url, error = %e, "call failed");
        }

        let reply = create_return_value(result);
        match pack_return_value(reply, &hints, Some(&self.keys)) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(
                    service = %self.canonical_url,
                    error = %e,
                    "cannot pack reply with the caller's keys; replying in plaintext"
                );
                pack_failure(&RpcError::from(e))
            }
        }
    }

    fn route(
        &self,
        function: Option<&str>,
        args: Value,
        ctx: &CallContext,
        router: Option<&dyn Router>,
    ) -> Result<Option<Value>> {
        if let Some(handler) = self.handlers.resolve(function) {
            return invoke(|| handler(args, ctx));
        }

        match (function, router) {
            (None, _) => Err(RpcError::MissingHandler(format!(
                "{} has no root handler",
                self.canonical_url
            ))),
            (Some(name), Some(router)) => invoke(|| router.route(name, args, ctx)),
            (Some(name), None) => Err(RpcError::MissingHandler(format!(
                "no function '{name}' on {}",
                self.canonical_url
            ))),
        }
    }
}

/// Run a handler, reporting a panic as an internal error.
fn invoke(f: impl FnOnce() -> Result<Option<Value>>) -> Result<Option<Value>> {
    panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        Err(RpcError::Handler {
            kind: ErrorKind::Internal,
            module: "acquire_rpc",
            message: format!("handler panicked: {message}"),
        })
    })
}
