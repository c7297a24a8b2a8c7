//! Service directory: where services live and which keys they publish.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use acquire_core::value::{entry, get, get_text};
use acquire_core::{PublicCert, PublicKey, Value};

use crate::dispatcher::Dispatcher;
use crate::error::{Result, RpcError};

mod keys {
    pub const CANONICAL_URL: &str = "canonical_url";
    pub const ENCRYPTION_PUBLIC_KEY: &str = "encryption_public_key";
    pub const SIGNING_PUBLIC_CERT: &str = "signing_public_cert";
    pub const ENCRYPTION_FINGERPRINT: &str = "encryption_fingerprint";
    pub const SIGNING_FINGERPRINT: &str = "signing_fingerprint";
}

/// The public face of a service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInfo {
    /// The URL the service is reached at.
    pub canonical_url: String,
    /// Key callers seal arguments with.
    pub encryption_key: PublicKey,
    /// Certificate the service signs replies with.
    pub signing_cert: PublicCert,
}

impl ServiceInfo {
    /// Encode for the root handler's reply.
    pub fn to_value(&self) -> Value {
        Value::Map(vec![
            entry(keys::CANONICAL_URL, self.canonical_url.as_str()),
            entry(
                keys::ENCRYPTION_PUBLIC_KEY,
                Value::Bytes(self.encryption_key.as_bytes().to_vec()),
            ),
            entry(
                keys::SIGNING_PUBLIC_CERT,
                Value::Bytes(self.signing_cert.as_bytes().to_vec()),
            ),
            entry(
                keys::ENCRYPTION_FINGERPRINT,
                self.encryption_key.fingerprint().as_str(),
            ),
            entry(
                keys::SIGNING_FINGERPRINT,
                self.signing_cert.fingerprint().as_str(),
            ),
        ])
    }

    /// Decode a root handler's reply.
    pub fn from_value(value: &Value) -> Result<Self> {
        let map = value
            .as_map()
            .ok_or_else(|| RpcError::bad_args("service info is not a map"))?;

        let canonical_url = get_text(map, keys::CANONICAL_URL)
            .ok_or_else(|| RpcError::bad_args("service info has no canonical_url"))?;

        let encryption_key = PublicKey::from_bytes(bytes_field(map, keys::ENCRYPTION_PUBLIC_KEY)?)
            .map_err(RpcError::handler)?;
        let signing_cert = PublicCert::from_bytes(bytes_field(map, keys::SIGNING_PUBLIC_CERT)?)
            .map_err(RpcError::handler)?;

        Ok(Self {
            canonical_url: canonical_url.to_string(),
            encryption_key,
            signing_cert,
        })
    }
}

fn bytes_field<'a>(map: &'a [(Value, Value)], key: &str) -> Result<&'a [u8]> {
    match get(map, key) {
        Some(Value::Bytes(b)) => Ok(b.as_slice()),
        _ => Err(RpcError::bad_args(format!("service info has no {key}"))),
    }
}

/// Normalize a service URL for lookups.
pub fn canonicalize(url: &str) -> &str {
    url.trim_end_matches('/')
}

/// Resolves service URLs to their published keys.
pub trait ServiceDirectory: Send + Sync {
    /// Public keys of the service at `service_url`.
    fn lookup(&self, service_url: &str) -> Result<ServiceInfo>;

    /// The dispatcher for `service_url` if it runs in this process.
    fn local(&self, _service_url: &str) -> Option<Arc<Dispatcher>> {
        None
    }
}

struct DirectoryEntry {
    info: ServiceInfo,
    local: Option<Arc<Dispatcher>>,
}

/// A directory kept in memory, filled at startup.
#[derive(Default)]
pub struct MemoryDirectory {
    entries: RwLock<HashMap<String, DirectoryEntry>>,
}

impl MemoryDirectory {
    /// Create an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a remote service.
    pub fn register(&self, info: ServiceInfo) -> Result<()> {
        self.insert(info, None)
    }

    /// Record a service that runs in this process.
    pub fn register_local(&self, dispatcher: Arc<Dispatcher>) -> Result<()> {
        self.insert(dispatcher.info(), Some(dispatcher))
    }

    fn insert(&self, info: ServiceInfo, local: Option<Arc<Dispatcher>>) -> Result<()> {
        let mut entries = self
            .entries
            .write()
            .map_err(|_| RpcError::Transport("service directory lock poisoned".into()))?;
        entries.insert(
            canonicalize(&info.canonical_url).to_string(),
            DirectoryEntry { info, local },
        );
        Ok(())
    }
}

impl ServiceDirectory for MemoryDirectory {
    fn lookup(&self, service_url: &str) -> Result<ServiceInfo> {
        let entries = self
            .entries
            .read()
            .map_err(|_| RpcError::Transport("service directory lock poisoned".into()))?;
        entries
            .get(canonicalize(service_url))
            .map(|e| e.info.clone())
            .ok_or_else(|| RpcError::UnknownService(service_url.to_string()))
    }

    fn local(&self, service_url: &str) -> Option<Arc<Dispatcher>> {
        let entries = self.entries.read().ok()?;
        entries
            .get(canonicalize(service_url))
            .and_then(|e| e.local.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use acquire_core::{PrivateCert, PrivateKey};

    fn info(url: &str) -> ServiceInfo {
        ServiceInfo {
            canonical_url: url.to_string(),
            encryption_key: PrivateKey::generate().public_key(),
            signing_cert: PrivateCert::generate().public_cert(),
        }
    }

    #[test]
    fn test_info_value_roundtrip() {
        let info = info("https://storage.example");
        assert_eq!(ServiceInfo::from_value(&info.to_value()).unwrap(), info);
    }

    #[test]
    fn test_lookup_ignores_trailing_slash() {
        let directory = MemoryDirectory::new();
        directory.register(info("https://storage.example/")).unwrap();

        assert!(directory.lookup("https://storage.example").is_ok());
        assert!(directory.local("https://storage.example").is_none());
    }

    #[test]
    fn test_unknown_service() {
        let directory = MemoryDirectory::new();
        assert!(matches!(
            directory.lookup("https://nowhere.example"),
            Err(RpcError::UnknownService(_))
        ));
    }
}
