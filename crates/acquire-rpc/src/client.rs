//! Calling functions on remote services.

use std::sync::Arc;
use std::time::Duration;

use acquire_core::value::empty_map;
use acquire_core::{PrivateKey, PublicCert, PublicKey, Value};
use acquire_envelope::{
    pack, pack_arguments, unpack_return_value, PackOptions, UnpackOptions, MAX_NESTING_DEPTH,
};
use tracing::debug;

use crate::context::CallContext;
use crate::directory::{canonicalize, ServiceDirectory, ServiceInfo};
use crate::dispatcher::Dispatcher;
use crate::error::{Result, RpcError};
use crate::transport::Transport;

/// Configuration for a client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// How long to wait for a service to reply.
    pub timeout: Duration,
    /// Maximum number of encrypted layers accepted in a reply.
    pub max_nesting_depth: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            max_nesting_depth: MAX_NESTING_DEPTH,
        }
    }
}

/// Key material for one call.
#[derive(Debug, Clone, Copy, Default)]
pub struct CallOptions<'a> {
    args_key: Option<&'a PublicKey>,
    response_key: Option<&'a PrivateKey>,
    public_cert: Option<&'a PublicCert>,
}

impl<'a> CallOptions<'a> {
    /// Plaintext call.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seal the arguments for the service holding `key`.
    pub fn encrypt_for(mut self, key: &'a PublicKey) -> Self {
        self.args_key = Some(key);
        self
    }

    /// Ask for the reply to be sealed for `key`, which opens it.
    pub fn respond_with(mut self, key: &'a PrivateKey) -> Self {
        self.response_key = Some(key);
        self
    }

    /// Ask for the reply to be signed, and verify it against `cert`.
    pub fn verify_with(mut self, cert: &'a PublicCert) -> Self {
        self.public_cert = Some(cert);
        self
    }
}

/// Something that can call a function on a service.
pub trait FunctionCaller: Send + Sync {
    /// Call `function` on the service at `service_url`.
    fn call(
        &self,
        ctx: &CallContext,
        service_url: &str,
        function: &str,
        args: Value,
    ) -> Result<Option<Value>>;
}

/// Makes calls over a [`Transport`], looking services up in a [`ServiceDirectory`].
pub struct Client {
    transport: Arc<dyn Transport>,
    directory: Arc<dyn ServiceDirectory>,
    config: ClientConfig,
}

impl Client {
    /// Create a client.
    pub fn new(
        transport: Arc<dyn Transport>,
        directory: Arc<dyn ServiceDirectory>,
        config: ClientConfig,
    ) -> Self {
        Self {
            transport,
            directory,
            config,
        }
    }

    /// The client's configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Call `function` with explicit key material.
    ///
    /// When `ctx` is already running as the target service and that
    /// service lives in this process, the call is made directly on its
    /// dispatcher, unencrypted.
    pub fn call_function(
        &self,
        ctx: &CallContext,
        service_url: &str,
        function: &str,
        args: Value,
        opts: &CallOptions<'_>,
    ) -> Result<Option<Value>> {
        if ctx.is_running_as(service_url) {
            if let Some(local) = self.directory.local(service_url) {
                return call_local(ctx, &local, function, args);
            }
        }

        let response_public = opts.response_key.map(PrivateKey::public_key);

        let mut pack_opts = PackOptions::new();
        if let Some(key) = opts.args_key {
            pack_opts = pack_opts.encrypt_for(key);
        }
        if let Some(key) = response_public.as_ref() {
            pack_opts = pack_opts.respond_with(key);
        }
        if let Some(cert) = opts.public_cert {
            pack_opts = pack_opts.request_signature(cert);
        }

        let body = pack_arguments(function, args, &pack_opts)?;

        debug!(
            service = service_url,
            function,
            encrypted = pack_opts.is_encrypted(),
            "calling remote function"
        );
        let response = self.transport.post(service_url, body, self.config.timeout)?;

        if !response.is_ok() {
            return Err(RpcError::Transport(format!(
                "cannot call remote function '{function}' on '{service_url}': status {} returned: {}",
                response.status_code,
                String::from_utf8_lossy(&response.content)
            )));
        }

        let mut unpack_opts = UnpackOptions::new()
            .calling(function, service_url)
            .max_depth(self.config.max_nesting_depth);
        if let Some(key) = opts.response_key {
            unpack_opts = unpack_opts.decrypt_with(key);
        }
        if let Some(cert) = opts.public_cert {
            unpack_opts = unpack_opts.verify_with(cert);
        }

        Ok(unpack_return_value(&response.content, &unpack_opts)?)
    }

    /// Call `function` on a service known to the directory.
    ///
    /// Arguments are sealed for the service, the reply is sealed for a
    /// fresh one-time key and must be signed by the service's certificate.
    pub fn call_service(
        &self,
        ctx: &CallContext,
        service_url: &str,
        function: &str,
        args: Value,
    ) -> Result<Option<Value>> {
        let service = self.directory.lookup(service_url)?;
        let response_key = PrivateKey::generate();

        let opts = CallOptions::new()
            .encrypt_for(&service.encryption_key)
            .respond_with(&response_key)
            .verify_with(&service.signing_cert);

        self.call_function(ctx, &service.canonical_url, function, args, &opts)
    }

    /// Ask the service at `service_url` for its public keys.
    pub fn discover(&self, service_url: &str) -> Result<ServiceInfo> {
        let body = pack(None, empty_map(), &PackOptions::new())?;
        let response = self.transport.post(service_url, body, self.config.timeout)?;

        if !response.is_ok() {
            return Err(RpcError::Transport(format!(
                "cannot discover '{service_url}': status {} returned",
                response.status_code
            )));
        }

        let opts = UnpackOptions::new().calling("<root>", service_url);
        let value = unpack_return_value(&response.content, &opts)?
            .ok_or_else(|| RpcError::UnknownService(service_url.to_string()))?;
        let info = ServiceInfo::from_value(&value)?;

        if canonicalize(&info.canonical_url) != canonicalize(service_url) {
            return Err(RpcError::UnknownService(format!(
                "{service_url} reports itself as {}",
                info.canonical_url
            )));
        }
        Ok(info)
    }
}

impl FunctionCaller for Client {
    fn call(
        &self,
        ctx: &CallContext,
        service_url: &str,
        function: &str,
        args: Value,
    ) -> Result<Option<Value>> {
        self.call_service(ctx, service_url, function, args)
    }
}

fn call_local(
    ctx: &CallContext,
    dispatcher: &Dispatcher,
    function: &str,
    args: Value,
) -> Result<Option<Value>> {
    debug!(
        service = dispatcher.canonical_url(),
        function, "calling local service directly"
    );
    let body = pack_arguments(function, args, &PackOptions::new())?;
    let reply = dispatcher.handle_in(ctx, &body, None);
    let opts = UnpackOptions::new().calling(function, dispatcher.canonical_url());
    Ok(unpack_return_value(&reply, &opts)?)
}
