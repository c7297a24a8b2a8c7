//! The pre-authenticated resource itself.
//!
//! A [`Par`] carries an access URL encrypted for the holder of one private
//! key, together with the capabilities it grants and when it stops working.
//! Validity is recomputed on every use; nothing is cached.

use std::fmt;

use acquire_core::{value::text_map, PrivateKey, PublicKey, Value};
use acquire_rpc::{CallContext, FunctionCaller};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::accessor::{
    BucketReader, BucketWriter, ComputeRunner, ObjectReader, ObjectWriter, Reader, Writer,
};
use crate::error::{ParError, Result};
use crate::storage::Storage;

/// Seconds of validity a PAR must have left before its URL is handed out.
pub const DEFAULT_EXPIRY_BUFFER_SECS: f64 = 30.0;

/// Name of the remote operation that revokes a PAR.
pub const CLOSE_PAR_FUNCTION: &str = "close_par";

/// What a PAR gives access to. Exactly one holds for any non-null PAR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParKind {
    /// Every object in a bucket.
    Bucket,
    /// A single object.
    Object,
    /// A calculation trigger.
    Calculation,
}

/// Possession proof for a plaintext URL.
pub fn checksum(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ParData {
    /// Hex of the encrypted URL.
    url: String,
    uid: Uuid,
    key: Option<String>,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    driver: Option<String>,
    par_id: Option<String>,
    par_name: Option<String>,
    is_readable: bool,
    is_writeable: bool,
    is_executable: bool,
    storage_url: Option<String>,
}

/// A pre-authenticated resource.
#[derive(Debug, Clone, Default)]
pub struct Par {
    data: Option<ParData>,
    private_key: Option<PrivateKey>,
}

/// Builds a new PAR around a plaintext URL.
#[derive(Debug, Clone)]
pub struct ParBuilder {
    url: String,
    expires_at: DateTime<Utc>,
    created_at: Option<DateTime<Utc>>,
    key: Option<String>,
    readable: bool,
    writeable: bool,
    executable: bool,
    driver: Option<String>,
    par_id: Option<String>,
    par_name: Option<String>,
    storage_url: Option<String>,
}

impl ParBuilder {
    /// Start a PAR for `url`, valid until `expires_at`.
    pub fn new(url: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            url: url.into(),
            expires_at,
            created_at: None,
            key: None,
            readable: false,
            writeable: false,
            executable: false,
            driver: None,
            par_id: None,
            par_name: None,
            storage_url: None,
        }
    }

    /// Restrict the PAR to one object within the bucket.
    pub fn object(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Grant read access.
    pub fn readable(mut self) -> Self {
        self.readable = true;
        self
    }

    /// Grant write access.
    pub fn writeable(mut self) -> Self {
        self.writeable = true;
        self
    }

    /// Make this a calculation trigger. Clears read and write access.
    pub fn executable(mut self) -> Self {
        self.executable = true;
        self
    }

    pub fn created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Free-form tag for the object store behind the URL.
    pub fn driver(mut self, driver: impl Into<String>) -> Self {
        self.driver = Some(driver.into());
        self
    }

    pub fn par_id(mut self, par_id: impl Into<String>) -> Self {
        self.par_id = Some(par_id.into());
        self
    }

    pub fn par_name(mut self, par_name: impl Into<String>) -> Self {
        self.par_name = Some(par_name.into());
        self
    }

    /// The service to call when the PAR is closed.
    pub fn storage_url(mut self, storage_url: impl Into<String>) -> Self {
        self.storage_url = Some(storage_url.into());
        self
    }

    /// Checksum of the plaintext URL, as a closer must later present it.
    pub fn url_checksum(&self) -> String {
        checksum(self.url.as_bytes())
    }

    /// Encrypt the URL for `encrypt_key` and produce the PAR.
    ///
    /// Fails with a permission error if no capability was granted.
    pub fn build(self, encrypt_key: &PublicKey) -> Result<Par> {
        let (readable, writeable) = if self.executable {
            (false, false)
        } else if self.readable || self.writeable {
            (self.readable, self.writeable)
        } else {
            return Err(ParError::Permission(
                "you cannot create a PAR that has no read, write or execute permission".into(),
            ));
        };

        let ciphertext = encrypt_key.encrypt(self.url.as_bytes())?;

        Ok(Par {
            data: Some(ParData {
                url: hex::encode(ciphertext),
                uid: Uuid::new_v4(),
                key: self.key,
                created_at: self.created_at.unwrap_or_else(acquire_core::time::now),
                expires_at: self.expires_at,
                driver: self.driver,
                par_id: self.par_id,
                par_name: self.par_name,
                is_readable: readable,
                is_writeable: writeable,
                is_executable: self.executable,
                storage_url: self.storage_url,
            }),
            private_key: None,
        })
    }
}

impl Par {
    /// The null PAR. Grants nothing.
    pub fn null() -> Self {
        Self::default()
    }

    /// Attach the key that decrypts this PAR, so callers need not pass one.
    pub fn with_private_key(mut self, key: PrivateKey) -> Self {
        self.private_key = Some(key);
        self
    }

    pub fn is_null(&self) -> bool {
        self.data.is_none()
    }

    pub fn uid(&self) -> Option<Uuid> {
        self.data.as_ref().map(|d| d.uid)
    }

    /// Identifier of this PAR for use in authorisations.
    pub fn fingerprint(&self) -> Option<String> {
        self.uid().map(|u| u.to_string())
    }

    /// The object key, or `None` for a whole bucket.
    pub fn key(&self) -> Option<&str> {
        self.data.as_ref().and_then(|d| d.key.as_deref())
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.data.as_ref().map(|d| d.created_at)
    }

    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.data.as_ref().map(|d| d.expires_at)
    }

    pub fn driver(&self) -> Option<&str> {
        self.data.as_ref().and_then(|d| d.driver.as_deref())
    }

    pub fn par_id(&self) -> Option<&str> {
        self.data.as_ref().and_then(|d| d.par_id.as_deref())
    }

    pub fn par_name(&self) -> Option<&str> {
        self.data.as_ref().and_then(|d| d.par_name.as_deref())
    }

    pub fn storage_url(&self) -> Option<&str> {
        self.data.as_ref().and_then(|d| d.storage_url.as_deref())
    }

    pub fn is_readable(&self) -> bool {
        self.data.as_ref().is_some_and(|d| d.is_readable)
    }

    pub fn is_writeable(&self) -> bool {
        self.data.as_ref().is_some_and(|d| d.is_writeable)
    }

    pub fn is_executable(&self) -> bool {
        self.data.as_ref().is_some_and(|d| d.is_executable)
    }

    /// What this PAR gives access to, or `None` if it is null.
    pub fn kind(&self) -> Option<ParKind> {
        self.data.as_ref().map(|d| {
            if d.is_executable {
                ParKind::Calculation
            } else if d.key.is_some() {
                ParKind::Object
            } else {
                ParKind::Bucket
            }
        })
    }

    pub fn is_bucket(&self) -> bool {
        self.kind() == Some(ParKind::Bucket)
    }

    pub fn is_object(&self) -> bool {
        self.kind() == Some(ParKind::Object)
    }

    pub fn is_calculation(&self) -> bool {
        self.kind() == Some(ParKind::Calculation)
    }

    /// Seconds of validity left, less `buffer`, floored at zero.
    pub fn seconds_remaining(&self, buffer: f64) -> f64 {
        self.seconds_remaining_at(acquire_core::time::now(), buffer)
    }

    /// [`seconds_remaining`](Self::seconds_remaining) as seen at `now`.
    pub fn seconds_remaining_at(&self, now: DateTime<Utc>, buffer: f64) -> f64 {
        let Some(data) = &self.data else {
            return 0.0;
        };
        let buffer = if buffer.is_finite() { buffer.max(0.0) } else { 0.0 };
        let delta = (data.expires_at - now).num_microseconds().map_or_else(
            || (data.expires_at - now).num_seconds() as f64,
            |us| us as f64 / 1_000_000.0,
        ) - buffer;
        delta.max(0.0)
    }

    /// Decrypt the access URL.
    ///
    /// Fails with [`ParError::Expired`] once fewer than
    /// [`DEFAULT_EXPIRY_BUFFER_SECS`] seconds of validity remain.
    pub fn url(&self, decrypt_key: Option<&PrivateKey>) -> Result<String> {
        let data = self.data.as_ref().ok_or(ParError::EmptyPar("access"))?;

        if self.seconds_remaining(DEFAULT_EXPIRY_BUFFER_SECS) <= 0.0 {
            return Err(ParError::Expired);
        }

        let key = self.decrypt_key(decrypt_key)?;
        let ciphertext = hex::decode(&data.url)
            .map_err(|e| ParError::InvalidPar(format!("url is not hex: {e}")))?;
        let plaintext = key.decrypt(&ciphertext)?;
        String::from_utf8(plaintext).map_err(|e| ParError::Decode(e.to_string()))
    }

    fn decrypt_key<'a>(&'a self, supplied: Option<&'a PrivateKey>) -> Result<&'a PrivateKey> {
        self.private_key.as_ref().or(supplied).ok_or_else(|| {
            ParError::Permission("you must supply a private key to decrypt this PAR".into())
        })
    }

    /// An accessor for reading through this PAR.
    pub fn read(&self, storage: &Storage, decrypt_key: Option<&PrivateKey>) -> Result<Reader> {
        if self.is_null() {
            return Err(ParError::EmptyPar("read from"));
        }
        if !self.is_readable() {
            return Err(ParError::Permission(format!(
                "you do not have permission to read from this PAR: {self}"
            )));
        }
        if self.is_bucket() {
            BucketReader::new(self, storage, decrypt_key).map(Reader::Bucket)
        } else {
            ObjectReader::new(self, storage, decrypt_key).map(Reader::Object)
        }
    }

    /// An accessor for writing through this PAR.
    pub fn write(&self, storage: &Storage, decrypt_key: Option<&PrivateKey>) -> Result<Writer> {
        if self.is_null() {
            return Err(ParError::EmptyPar("write to"));
        }
        if !self.is_writeable() {
            return Err(ParError::Permission(format!(
                "you do not have permission to write to this PAR: {self}"
            )));
        }
        if self.is_bucket() {
            BucketWriter::new(self, storage, decrypt_key).map(Writer::Bucket)
        } else {
            ObjectWriter::new(self, storage, decrypt_key).map(Writer::Object)
        }
    }

    /// A runner for the calculation behind this PAR.
    pub fn execute(&self, decrypt_key: Option<&PrivateKey>) -> Result<ComputeRunner> {
        if self.is_null() {
            return Err(ParError::EmptyPar("execute"));
        }
        if !self.is_executable() {
            return Err(ParError::Permission(format!(
                "you do not have permission to execute this PAR: {self}"
            )));
        }
        ComputeRunner::new(self, decrypt_key)
    }

    /// Revoke this PAR and reset it to null.
    ///
    /// If the PAR names a storage service, that service is asked to delete
    /// it, proving possession with the checksum of the decrypted URL. A PAR
    /// with no storage service is only reset locally. Closing a null PAR
    /// does nothing.
    pub fn close(
        &mut self,
        caller: &dyn FunctionCaller,
        ctx: &CallContext,
        decrypt_key: Option<&PrivateKey>,
    ) -> Result<()> {
        self.close_at(caller, ctx, decrypt_key, None)
    }

    /// Like [`close`](Self::close), but `storage_url`, when given, names the
    /// service to call in place of the one recorded in the PAR.
    pub fn close_at(
        &mut self,
        caller: &dyn FunctionCaller,
        ctx: &CallContext,
        decrypt_key: Option<&PrivateKey>,
        storage_url: Option<&str>,
    ) -> Result<()> {
        let Some(data) = &self.data else {
            return Ok(());
        };

        match storage_url.or(data.storage_url.as_deref()) {
            Some(storage_url) => {
                let url = self.url(decrypt_key)?;
                let args = text_map([
                    ("par_uid", Value::Text(data.uid.to_string())),
                    ("url_checksum", Value::Text(checksum(url.as_bytes()))),
                ]);
                caller.call(ctx, storage_url, CLOSE_PAR_FUNCTION, args)?;
                info!(uid = %data.uid, service = %storage_url, "PAR closed");
            }
            None => debug!(uid = %data.uid, "closing PAR with no storage service"),
        }

        *self = Par::null();
        Ok(())
    }

    /// Serialize the public part of this PAR. The private key is not included.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        let written = match &self.data {
            Some(data) => ciborium::into_writer(data, &mut out),
            None => ciborium::into_writer(&Value::Map(Vec::new()), &mut out),
        };
        written.expect("CBOR serialization to Vec cannot fail");
        out
    }

    /// Read a PAR written by [`to_bytes`](Self::to_bytes).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let value: Value =
            ciborium::from_reader(bytes).map_err(|e| ParError::InvalidPar(e.to_string()))?;

        if matches!(&value, Value::Map(m) if m.is_empty()) {
            return Ok(Par::null());
        }

        let data: ParData = value
            .deserialized()
            .map_err(|e| ParError::InvalidPar(e.to_string()))?;

        if data.is_executable && (data.is_readable || data.is_writeable) {
            return Err(ParError::InvalidPar(
                "a calculation PAR cannot also be readable or writeable".into(),
            ));
        }
        if !(data.is_executable || data.is_readable || data.is_writeable) {
            return Err(ParError::InvalidPar("PAR grants no capability".into()));
        }

        Ok(Par {
            data: Some(data),
            private_key: None,
        })
    }
}

impl fmt::Display for Par {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.seconds_remaining(DEFAULT_EXPIRY_BUFFER_SECS) < 1.0 {
            return f.write_str("PAR( expired )");
        }
        let remaining = self.seconds_remaining(0.0) as u64;
        match (self.kind(), self.key()) {
            (Some(ParKind::Calculation), _) => {
                write!(f, "PAR( calculation, seconds_remaining={remaining} )")
            }
            (_, Some(key)) => write!(f, "PAR( key={key}, seconds_remaining={remaining} )"),
            _ => write!(f, "PAR( bucket=True, seconds_remaining={remaining} )"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use acquire_core::value::get_text;
    use chrono::Duration;

    const URL: &str = "https://objstore.example/n/acquire/b/bucket";

    fn in_an_hour() -> DateTime<Utc> {
        Utc::now() + Duration::hours(1)
    }

    #[derive(Default)]
    struct RecordingCaller {
        calls: Mutex<Vec<(String, String, Value)>>,
    }

    impl FunctionCaller for RecordingCaller {
        fn call(
            &self,
            _ctx: &CallContext,
            service_url: &str,
            function: &str,
            args: Value,
        ) -> acquire_rpc::Result<Option<Value>> {
            self.calls
                .lock()
                .unwrap()
                .push((service_url.into(), function.into(), args));
            Ok(None)
        }
    }

    #[test]
    fn test_build_and_decrypt() {
        let key = PrivateKey::generate();
        let par = ParBuilder::new(URL, in_an_hour())
            .readable()
            .build(&key.public_key())
            .unwrap();

        assert!(!par.is_null());
        assert!(par.is_bucket());
        assert_eq!(par.url(Some(&key)).unwrap(), URL);
    }

    #[test]
    fn test_url_needs_the_right_key() {
        let key = PrivateKey::generate();
        let par = ParBuilder::new(URL, in_an_hour())
            .readable()
            .build(&key.public_key())
            .unwrap();

        assert!(matches!(par.url(None), Err(ParError::Permission(_))));
        assert!(matches!(
            par.url(Some(&PrivateKey::generate())),
            Err(ParError::Crypto(_))
        ));

        let par = par.with_private_key(key);
        assert_eq!(par.url(None).unwrap(), URL);
    }

    #[test]
    fn test_executable_clears_read_write() {
        let key = PrivateKey::generate();
        let par = ParBuilder::new(URL, in_an_hour())
            .readable()
            .writeable()
            .executable()
            .object("some/key")
            .build(&key.public_key())
            .unwrap();

        assert!(par.is_executable());
        assert!(!par.is_readable());
        assert!(!par.is_writeable());
        assert_eq!(par.kind(), Some(ParKind::Calculation));
        assert!(!par.is_object());
    }

    #[test]
    fn test_no_capability_is_rejected() {
        let key = PrivateKey::generate();
        let err = ParBuilder::new(URL, in_an_hour())
            .build(&key.public_key())
            .unwrap_err();
        assert!(matches!(err, ParError::Permission(_)));
    }

    #[test]
    fn test_expiry_buffer() {
        let key = PrivateKey::generate();
        let par = ParBuilder::new(URL, Utc::now() + Duration::seconds(5))
            .readable()
            .build(&key.public_key())
            .unwrap();

        assert!(par.seconds_remaining(0.0) > 0.0);
        assert_eq!(par.seconds_remaining(DEFAULT_EXPIRY_BUFFER_SECS), 0.0);
        assert!(matches!(par.url(Some(&key)), Err(ParError::Expired)));
    }

    #[test]
    fn test_seconds_remaining_floor() {
        let key = PrivateKey::generate();
        let expires = Utc::now() - Duration::minutes(1);
        let par = ParBuilder::new(URL, expires)
            .readable()
            .build(&key.public_key())
            .unwrap();

        assert_eq!(par.seconds_remaining(0.0), 0.0);
        assert_eq!(par.seconds_remaining(-100.0), 0.0);

        let at = expires - Duration::seconds(100);
        assert_eq!(par.seconds_remaining_at(at, 0.0), 100.0);
        assert_eq!(par.seconds_remaining_at(at, -5.0), 100.0);
        assert_eq!(par.seconds_remaining_at(at, 40.0), 60.0);
    }

    #[test]
    fn test_null_par() {
        let par = Par::null();
        let storage = Storage::new();

        assert!(par.is_null());
        assert_eq!(par.kind(), None);
        assert!(matches!(par.url(None), Err(ParError::EmptyPar(_))));
        assert!(matches!(par.read(&storage, None), Err(ParError::EmptyPar(_))));
        assert!(matches!(par.write(&storage, None), Err(ParError::EmptyPar(_))));
        assert!(matches!(par.execute(None), Err(ParError::EmptyPar(_))));
    }

    #[test]
    fn test_capability_mismatch() {
        let key = PrivateKey::generate();
        let storage = Storage::new();
        let par = ParBuilder::new(URL, in_an_hour())
            .readable()
            .build(&key.public_key())
            .unwrap();

        let err = par.write(&storage, Some(&key)).unwrap_err();
        assert!(matches!(err, ParError::Permission(ref m) if m.contains("PAR( bucket=True")));
        assert!(matches!(par.execute(Some(&key)), Err(ParError::Permission(_))));
    }

    #[test]
    fn test_display() {
        let key = PrivateKey::generate().public_key();
        let object = ParBuilder::new(URL, in_an_hour())
            .object("data.json")
            .readable()
            .build(&key)
            .unwrap();
        let calc = ParBuilder::new(URL, in_an_hour())
            .executable()
            .build(&key)
            .unwrap();
        let stale = ParBuilder::new(URL, Utc::now() + Duration::seconds(10))
            .readable()
            .build(&key)
            .unwrap();

        assert!(object.to_string().starts_with("PAR( key=data.json, seconds_remaining="));
        assert!(calc.to_string().starts_with("PAR( calculation, "));
        assert_eq!(stale.to_string(), "PAR( expired )");
        assert_eq!(Par::null().to_string(), "PAR( expired )");
    }

    #[test]
    fn test_close_calls_storage_service() {
        let key = PrivateKey::generate();
        let mut par = ParBuilder::new(URL, in_an_hour())
            .readable()
            .storage_url("https://storage.example")
            .build(&key.public_key())
            .unwrap();
        let uid = par.uid().unwrap();
        let caller = RecordingCaller::default();

        par.close(&caller, &CallContext::new(), Some(&key)).unwrap();
        assert!(par.is_null());

        let calls = caller.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        let (service, function, args) = &calls[0];
        assert_eq!(service, "https://storage.example");
        assert_eq!(function, CLOSE_PAR_FUNCTION);
        let args = args.as_map().unwrap();
        assert_eq!(get_text(args, "par_uid"), Some(uid.to_string().as_str()));
        assert_eq!(
            get_text(args, "url_checksum"),
            Some(checksum(URL.as_bytes()).as_str())
        );
    }

    #[test]
    fn test_close_without_service_is_local() {
        let key = PrivateKey::generate();
        let mut par = ParBuilder::new(URL, in_an_hour())
            .writeable()
            .build(&key.public_key())
            .unwrap();
        let caller = RecordingCaller::default();

        par.close(&caller, &CallContext::new(), None).unwrap();
        assert!(par.is_null());
        assert!(caller.calls.lock().unwrap().is_empty());

        // closing again is a no-op
        par.close(&caller, &CallContext::new(), None).unwrap();
    }

    #[test]
    fn test_close_at_overrides_service() {
        let key = PrivateKey::generate();
        let issued = ParBuilder::new(URL, in_an_hour())
            .readable()
            .build(&key.public_key())
            .unwrap();
        let mut par = Par::from_bytes(&issued.to_bytes()).unwrap();
        assert_eq!(par.storage_url(), None);
        let caller = RecordingCaller::default();

        par.close_at(
            &caller,
            &CallContext::new(),
            Some(&key),
            Some("https://other-storage.example"),
        )
        .unwrap();
        assert!(par.is_null());

        let calls = caller.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "https://other-storage.example");
        assert_eq!(calls[0].1, CLOSE_PAR_FUNCTION);
    }

    #[test]
    fn test_close_requires_key() {
        let key = PrivateKey::generate();
        let mut par = ParBuilder::new(URL, in_an_hour())
            .readable()
            .storage_url("https://storage.example")
            .build(&key.public_key())
            .unwrap();
        let caller = RecordingCaller::default();

        let err = par.close(&caller, &CallContext::new(), None).unwrap_err();
        assert!(matches!(err, ParError::Permission(_)));
        assert!(!par.is_null());
    }

    #[test]
    fn test_bytes_roundtrip() {
        let key = PrivateKey::generate();
        let par = ParBuilder::new(URL, in_an_hour())
            .object("x/y.txt")
            .readable()
            .writeable()
            .driver("oci")
            .par_name("shared results")
            .storage_url("https://storage.example")
            .build(&key.public_key())
            .unwrap()
            .with_private_key(key.clone());

        let restored = Par::from_bytes(&par.to_bytes()).unwrap();
        assert_eq!(restored.uid(), par.uid());
        assert_eq!(restored.key(), Some("x/y.txt"));
        assert_eq!(restored.driver(), Some("oci"));
        assert_eq!(restored.par_name(), Some("shared results"));
        assert!(restored.is_readable() && restored.is_writeable());

        // the private key stays behind
        assert!(restored.url(None).is_err());
        assert_eq!(restored.url(Some(&key)).unwrap(), URL);
    }

    #[test]
    fn test_null_bytes_roundtrip() {
        let restored = Par::from_bytes(&Par::null().to_bytes()).unwrap();
        assert!(restored.is_null());
    }

    #[test]
    fn test_from_garbage() {
        assert!(matches!(
            Par::from_bytes(b"\xff\x00"),
            Err(ParError::InvalidPar(_))
        ));
    }

    #[test]
    fn test_checksum_is_stable() {
        assert_eq!(checksum(b"abc"), checksum(b"abc"));
        assert_ne!(checksum(b"abc"), checksum(b"abd"));
        assert_eq!(checksum(b"").len(), 64);
    }
}
