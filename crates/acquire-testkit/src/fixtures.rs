//! Test fixtures and helpers.
//!
//! Common setup code for integration tests.

use std::sync::Arc;

use acquire::{Service, ServiceBuilder};
use acquire_core::{PrivateKey, PublicKey};
use acquire_par::{MemoryBackend, Par, ParBuilder, Storage};
use acquire_registry::MemoryParRegistry;
use acquire_rpc::{Client, ClientConfig, InProcessTransport, MemoryDirectory, ServiceKeys};
use chrono::{Duration, Utc};

/// An encryption key derived from a one-byte seed.
pub fn seeded_key(seed: u8) -> PrivateKey {
    PrivateKey::from_bytes([seed; 32])
}

/// Service keys derived from a one-byte seed.
pub fn seeded_service_keys(seed: u8) -> ServiceKeys {
    ServiceKeys::from_seed([seed; 32])
}

/// Services wired together over an in-process transport, plus an
/// in-memory object store for PAR-backed data.
pub struct TestFederation {
    pub transport: Arc<InProcessTransport>,
    pub directory: Arc<MemoryDirectory>,
    pub objects: Arc<MemoryBackend>,
}

impl TestFederation {
    pub fn new() -> Self {
        Self {
            transport: InProcessTransport::new(),
            directory: Arc::new(MemoryDirectory::new()),
            objects: Arc::new(MemoryBackend::new()),
        }
    }

    /// Build a service with an in-memory registry and serve it.
    pub fn add(&self, builder: ServiceBuilder) -> Service<MemoryParRegistry> {
        let service = builder.build(MemoryParRegistry::new());
        service
            .install(&self.transport, &self.directory)
            .expect("in-process install cannot fail");
        service
    }

    /// A client that reaches every service added so far.
    pub fn client(&self) -> Client {
        Client::new(
            self.transport.clone(),
            self.directory.clone(),
            ClientConfig::default(),
        )
    }

    /// Storage routing both schemes to the federation's object store.
    pub fn storage(&self) -> Storage {
        Storage::single(self.objects.clone())
    }
}

impl Default for TestFederation {
    fn default() -> Self {
        Self::new()
    }
}

/// A read-write bucket PAR for `key`, valid for `valid_for`.
pub fn bucket_par(url: &str, key: &PublicKey, valid_for: Duration) -> Par {
    ParBuilder::new(url, Utc::now() + valid_for)
        .readable()
        .writeable()
        .build(key)
        .expect("a readable PAR is always valid")
}

#[cfg(test)]
mod tests {
    use super::*;
    use acquire::ServiceConfig;
    use acquire_core::value::{lookup, text_map};
    use acquire_core::Value;
    use acquire_rpc::CallContext;

    #[test]
    fn test_seeded_keys_are_deterministic() {
        assert_eq!(
            seeded_key(7).public_key().fingerprint(),
            seeded_key(7).public_key().fingerprint()
        );
        assert_ne!(
            seeded_key(7).public_key().fingerprint(),
            seeded_key(8).public_key().fingerprint()
        );
        assert_eq!(
            seeded_service_keys(1).signing_fingerprint(),
            seeded_service_keys(1).signing_fingerprint()
        );
    }

    #[test]
    fn test_federation_call() {
        let fed = TestFederation::new();
        fed.add(
            ServiceBuilder::new(ServiceConfig::new("https://echo.example"))
                .keys(seeded_service_keys(3))
                .handler("echo", |args, _ctx| Ok(Some(args))),
        );

        let reply = fed
            .client()
            .call_service(
                &CallContext::new(),
                "https://echo.example",
                "echo",
                text_map([("hello", Value::from("world"))]),
            )
            .unwrap()
            .unwrap();
        assert_eq!(lookup(&reply, "hello"), Some(&Value::from("world")));
    }

    #[test]
    fn test_bucket_par_over_federation_storage() {
        let fed = TestFederation::new();
        let key = seeded_key(9);
        let par = bucket_par("https://obj/b/test", &key.public_key(), Duration::hours(1))
            .with_private_key(key);

        par.write(&fed.storage(), None)
            .unwrap()
            .into_bucket()
            .unwrap()
            .set_string_object("k", "v")
            .unwrap();
        assert_eq!(fed.objects.len(), 1);
    }
}
