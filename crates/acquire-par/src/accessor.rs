//! Capability-checked views over a decrypted PAR URL.
//!
//! Each accessor checks on construction that the PAR grants what it needs,
//! so a held accessor can only perform permitted operations.

use std::collections::BTreeMap;
use std::path::Path;

use acquire_core::PrivateKey;
use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};

use crate::error::{ParError, Result};
use crate::par::Par;
use crate::storage::{Storage, StorageBackend};

/// Join a bucket-relative key onto a base URL without doubling slashes.
pub fn join_key(base: &str, key: &str) -> String {
    let key = key.trim_start_matches('/');
    if base.ends_with('/') {
        format!("{base}{key}")
    } else {
        format!("{base}/{key}")
    }
}

/// Reader returned by [`Par::read`].
#[derive(Debug)]
pub enum Reader {
    Bucket(BucketReader),
    Object(ObjectReader),
}

/// Writer returned by [`Par::write`].
#[derive(Debug)]
pub enum Writer {
    Bucket(BucketWriter),
    Object(ObjectWriter),
}

impl Reader {
    pub fn into_bucket(self) -> Option<BucketReader> {
        match self {
            Reader::Bucket(r) => Some(r),
            Reader::Object(_) => None,
        }
    }

    pub fn into_object(self) -> Option<ObjectReader> {
        match self {
            Reader::Object(r) => Some(r),
            Reader::Bucket(_) => None,
        }
    }
}

impl Writer {
    pub fn into_bucket(self) -> Option<BucketWriter> {
        match self {
            Writer::Bucket(w) => Some(w),
            Writer::Object(_) => None,
        }
    }

    pub fn into_object(self) -> Option<ObjectWriter> {
        match self {
            Writer::Object(w) => Some(w),
            Writer::Bucket(_) => None,
        }
    }
}

/// The decrypted URL plus where to send requests for it.
#[derive(Debug, Clone)]
struct Target {
    par: Par,
    url: String,
    storage: Storage,
}

impl Target {
    fn open(
        par: &Par,
        storage: &Storage,
        decrypt_key: Option<&PrivateKey>,
        accessor: &str,
        check: impl Fn(&Par) -> Option<&'static str>,
    ) -> Result<Self> {
        if par.is_null() {
            return Err(ParError::EmptyPar("open an accessor on"));
        }
        if let Some(missing) = check(par) {
            return Err(ParError::Permission(format!(
                "you cannot create a {accessor} from a PAR that {missing}: {par}"
            )));
        }
        let url = par.url(decrypt_key)?;
        Ok(Self {
            par: par.clone(),
            url,
            storage: storage.clone(),
        })
    }

    fn read(&self, url: &str) -> Result<Bytes> {
        self.storage.read(url)
    }

    fn write(&self, url: &str, data: Bytes) -> Result<()> {
        self.storage.write(url, data)
    }
}

fn to_string(data: Bytes) -> Result<String> {
    String::from_utf8(data.to_vec()).map_err(|e| ParError::Decode(e.to_string()))
}

fn from_json<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    serde_json::from_slice(data).map_err(|e| ParError::Decode(e.to_string()))
}

fn to_json<T: Serialize>(value: &T) -> Result<Bytes> {
    serde_json::to_vec(value)
        .map(Bytes::from)
        .map_err(|e| ParError::Decode(e.to_string()))
}

/// Reads objects from a whole bucket.
#[derive(Debug, Clone)]
pub struct BucketReader {
    target: Target,
}

impl BucketReader {
    pub fn new(par: &Par, storage: &Storage, decrypt_key: Option<&PrivateKey>) -> Result<Self> {
        let target = Target::open(par, storage, decrypt_key, "BucketReader", |p| {
            if !p.is_bucket() {
                Some("is not for a whole bucket")
            } else if !p.is_readable() {
                Some("is not readable")
            } else {
                None
            }
        })?;
        Ok(Self { target })
    }

    pub fn par(&self) -> &Par {
        &self.target.par
    }

    /// The object stored under `key`.
    pub fn get_object(&self, key: &str) -> Result<Bytes> {
        self.target.read(&join_key(&self.target.url, key))
    }

    /// Copy the object stored under `key` into the file at `path`.
    pub fn get_object_as_file(&self, key: &str, path: impl AsRef<Path>) -> Result<()> {
        let data = self.get_object(key)?;
        std::fs::write(path, &data)?;
        Ok(())
    }

    /// The object under `key` as UTF-8 text.
    pub fn get_string_object(&self, key: &str) -> Result<String> {
        to_string(self.get_object(key)?)
    }

    /// The object under `key` parsed as JSON.
    pub fn get_object_from_json<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        from_json(&self.get_object(key)?)
    }

    /// Names of objects in the bucket.
    ///
    /// With a prefix, only names starting with it are returned, with the
    /// prefix and any following `/` removed. The prefix is matched as plain
    /// text, not by path segment: `a/b` also selects `a/bc/x`, as `c/x`.
    pub fn get_all_object_names(&self, prefix: Option<&str>) -> Result<Vec<String>> {
        Ok(self
            .matching(prefix)?
            .into_iter()
            .map(|(name, _)| name)
            .collect())
    }

    /// Every object under `prefix`, keyed by the names
    /// [`get_all_object_names`](Self::get_all_object_names) returns.
    pub fn get_all_objects(&self, prefix: Option<&str>) -> Result<BTreeMap<String, Bytes>> {
        self.matching(prefix)?
            .into_iter()
            .map(|(name, full)| Ok((name, self.get_object(&full)?)))
            .collect()
    }

    /// Every object under `prefix` that is valid UTF-8.
    pub fn get_all_strings(&self, prefix: Option<&str>) -> Result<BTreeMap<String, String>> {
        Ok(self
            .get_all_objects(prefix)?
            .into_iter()
            .filter_map(|(name, data)| to_string(data).ok().map(|s| (name, s)))
            .collect())
    }

    /// (stripped name, full key) pairs for objects under `prefix`.
    fn matching(&self, prefix: Option<&str>) -> Result<Vec<(String, String)>> {
        let names = self.target.storage.list(&self.target.url)?;
        let prefix = prefix.unwrap_or("").trim_start_matches('/');

        if prefix.is_empty() {
            return Ok(names.into_iter().map(|n| (n.clone(), n)).collect());
        }

        Ok(names
            .into_iter()
            .filter_map(|full| {
                let stripped = full.strip_prefix(prefix)?.trim_start_matches('/').to_string();
                Some((stripped, full))
            })
            .collect())
    }
}

/// Writes objects into a whole bucket.
#[derive(Debug, Clone)]
pub struct BucketWriter {
    target: Target,
}

impl BucketWriter {
    pub fn new(par: &Par, storage: &Storage, decrypt_key: Option<&PrivateKey>) -> Result<Self> {
        let target = Target::open(par, storage, decrypt_key, "BucketWriter", |p| {
            if !p.is_bucket() {
                Some("is not for a whole bucket")
            } else if !p.is_writeable() {
                Some("is not writeable")
            } else {
                None
            }
        })?;
        Ok(Self { target })
    }

    pub fn par(&self) -> &Par {
        &self.target.par
    }

    /// Store `data` under `key`, replacing any existing object.
    pub fn set_object(&self, key: &str, data: impl Into<Bytes>) -> Result<()> {
        self.target
            .write(&join_key(&self.target.url, key), data.into())
    }

    pub fn set_object_from_file(&self, key: &str, path: impl AsRef<Path>) -> Result<()> {
        let data = std::fs::read(path)?;
        self.set_object(key, data)
    }

    pub fn set_string_object(&self, key: &str, data: &str) -> Result<()> {
        self.set_object(key, Bytes::copy_from_slice(data.as_bytes()))
    }

    pub fn set_object_from_json<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
        self.set_object(key, to_json(value)?)
    }
}

/// Reads the single object behind a PAR.
#[derive(Debug, Clone)]
pub struct ObjectReader {
    target: Target,
}

impl ObjectReader {
    pub fn new(par: &Par, storage: &Storage, decrypt_key: Option<&PrivateKey>) -> Result<Self> {
        let target = Target::open(par, storage, decrypt_key, "ObjectReader", |p| {
            if !p.is_object() {
                Some("is not for a single object")
            } else if !p.is_readable() {
                Some("is not readable")
            } else {
                None
            }
        })?;
        Ok(Self { target })
    }

    pub fn par(&self) -> &Par {
        &self.target.par
    }

    pub fn get_object(&self) -> Result<Bytes> {
        self.target.read(&self.target.url)
    }

    pub fn get_object_as_file(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, self.get_object()?)?;
        Ok(())
    }

    pub fn get_string_object(&self) -> Result<String> {
        to_string(self.get_object()?)
    }

    pub fn get_object_from_json<T: DeserializeOwned>(&self) -> Result<T> {
        from_json(&self.get_object()?)
    }
}

/// Writes, and reads back, the single object behind a PAR.
#[derive(Debug, Clone)]
pub struct ObjectWriter {
    target: Target,
}

impl ObjectWriter {
    pub fn new(par: &Par, storage: &Storage, decrypt_key: Option<&PrivateKey>) -> Result<Self> {
        let target = Target::open(par, storage, decrypt_key, "ObjectWriter", |p| {
            if !p.is_object() {
                Some("is not for a single object")
            } else if !p.is_writeable() {
                Some("is not writeable")
            } else {
                None
            }
        })?;
        Ok(Self { target })
    }

    pub fn par(&self) -> &Par {
        &self.target.par
    }

    pub fn get_object(&self) -> Result<Bytes> {
        self.target.read(&self.target.url)
    }

    pub fn get_string_object(&self) -> Result<String> {
        to_string(self.get_object()?)
    }

    pub fn get_object_from_json<T: DeserializeOwned>(&self) -> Result<T> {
        from_json(&self.get_object()?)
    }

    pub fn set_object(&self, data: impl Into<Bytes>) -> Result<()> {
        self.target.write(&self.target.url, data.into())
    }

    pub fn set_object_from_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let data = std::fs::read(path)?;
        self.set_object(data)
    }

    pub fn set_string_object(&self, data: &str) -> Result<()> {
        self.set_object(Bytes::copy_from_slice(data.as_bytes()))
    }

    pub fn set_object_from_json<T: Serialize>(&self, value: &T) -> Result<()> {
        self.set_object(to_json(value)?)
    }
}

/// Holds the decrypted trigger URL of a calculation PAR.
#[derive(Debug, Clone)]
pub struct ComputeRunner {
    par: Par,
    url: String,
}

impl ComputeRunner {
    pub fn new(par: &Par, decrypt_key: Option<&PrivateKey>) -> Result<Self> {
        if par.is_null() {
            return Err(ParError::EmptyPar("execute"));
        }
        if !par.is_executable() {
            return Err(ParError::Permission(format!(
                "you cannot create a ComputeRunner from a PAR that is not executable: {par}"
            )));
        }
        Ok(Self {
            par: par.clone(),
            url: par.url(decrypt_key)?,
        })
    }

    pub fn par(&self) -> &Par {
        &self.par
    }

    /// The URL that triggers the calculation.
    pub fn url(&self) -> &str {
        &self.url
    }
}
