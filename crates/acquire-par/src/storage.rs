//! Backing stores behind PAR URLs.
//!
//! A PAR URL is either a local path (`file://...`) or a remote object-store
//! endpoint. [`Storage`] picks a backend purely from the URL scheme; the
//! backends themselves are supplied by the host.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use bytes::Bytes;

use crate::error::{ParError, Result};

/// Scheme prefix of URLs served by the local backend.
pub const LOCAL_SCHEME: &str = "file://";

/// A store that can read, write and list objects addressed by URL.
pub trait StorageBackend: Send + Sync {
    /// Read the object at `url`.
    fn read(&self, url: &str) -> Result<Bytes>;

    /// Replace the object at `url`.
    fn write(&self, url: &str, data: Bytes) -> Result<()>;

    /// Names of every object under the bucket at `url`, relative to it.
    fn list(&self, url: &str) -> Result<Vec<String>>;
}

/// Whether `url` addresses the local backend.
pub fn is_local(url: &str) -> bool {
    url.starts_with(LOCAL_SCHEME)
}

/// Routes each URL to the local or the remote backend.
#[derive(Clone, Default)]
pub struct Storage {
    local: Option<Arc<dyn StorageBackend>>,
    remote: Option<Arc<dyn StorageBackend>>,
}

impl Storage {
    /// Storage with no backends; every access fails until one is added.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `backend` for `file://` URLs.
    pub fn with_local(mut self, backend: Arc<dyn StorageBackend>) -> Self {
        self.local = Some(backend);
        self
    }

    /// Use `backend` for every other URL.
    pub fn with_remote(mut self, backend: Arc<dyn StorageBackend>) -> Self {
        self.remote = Some(backend);
        self
    }

    /// Serve both schemes from one backend.
    pub fn single(backend: Arc<dyn StorageBackend>) -> Self {
        Self {
            local: Some(backend.clone()),
            remote: Some(backend),
        }
    }

    fn backend(&self, url: &str) -> Result<&dyn StorageBackend> {
        let (backend, scheme) = if is_local(url) {
            (&self.local, "local")
        } else {
            (&self.remote, "remote")
        };
        backend.as_deref().ok_or(ParError::NoBackend(scheme))
    }
}

impl StorageBackend for Storage {
    fn read(&self, url: &str) -> Result<Bytes> {
        self.backend(url)?.read(url)
    }

    fn write(&self, url: &str, data: Bytes) -> Result<()> {
        self.backend(url)?.write(url, data)
    }

    fn list(&self, url: &str) -> Result<Vec<String>> {
        self.backend(url)?.list(url)
    }
}

impl std::fmt::Debug for Storage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Storage")
            .field("local", &self.local.is_some())
            .field("remote", &self.remote.is_some())
            .finish()
    }
}

/// In-memory backend keyed by full URL.
///
/// Can be switched offline to stand in for an unreachable object store.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    objects: RwLock<BTreeMap<String, Bytes>>,
    offline: RwLock<bool>,
}

impl MemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent access fail as if the store were unreachable.
    pub fn set_offline(&self, offline: bool) {
        if let Ok(mut guard) = self.offline.write() {
            *guard = offline;
        }
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.objects.read().map(|o| o.len()).unwrap_or(0)
    }

    /// Whether nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check_online(&self) -> std::result::Result<(), String> {
        match self.offline.read() {
            Ok(guard) if !*guard => Ok(()),
            Ok(_) => Err("store unavailable (status 503)".to_string()),
            Err(_) => Err("lock poisoned".to_string()),
        }
    }
}

impl StorageBackend for MemoryBackend {
    fn read(&self, url: &str) -> Result<Bytes> {
        self.check_online().map_err(ParError::Read)?;
        let objects = self
            .objects
            .read()
            .map_err(|_| ParError::Read("lock poisoned".into()))?;
        objects
            .get(url)
            .cloned()
            .ok_or_else(|| ParError::Read("no object at this location (status 404)".into()))
    }

    fn write(&self, url: &str, data: Bytes) -> Result<()> {
        self.check_online().map_err(ParError::Write)?;
        let mut objects = self
            .objects
            .write()
            .map_err(|_| ParError::Write("lock poisoned".into()))?;
        objects.insert(url.to_string(), data);
        Ok(())
    }

    fn list(&self, url: &str) -> Result<Vec<String>> {
        self.check_online().map_err(ParError::Read)?;
        let objects = self
            .objects
            .read()
            .map_err(|_| ParError::Read("lock poisoned".into()))?;
        let base = format!("{}/", url.trim_end_matches('/'));
        Ok(objects
            .keys()
            .filter_map(|k| k.strip_prefix(&base))
            .map(str::to_string)
            .collect())
    }
}
