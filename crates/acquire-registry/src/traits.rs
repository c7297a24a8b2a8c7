//! ParRegistry trait: what a storage service remembers about the PARs it
//! has issued.

use acquire_par::{Par, ParKind};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;

/// An issued PAR, as the issuing service records it.
///
/// Only the checksum of the plaintext URL is kept, never the URL itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParRecord {
    pub uid: Uuid,
    /// Checksum a closer must present.
    pub url_checksum: String,
    pub kind: ParKind,
    pub key: Option<String>,
    pub is_readable: bool,
    pub is_writeable: bool,
    pub driver: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ParRecord {
    /// Describe `par`, or `None` if it is null.
    pub fn new(par: &Par, url_checksum: impl Into<String>) -> Option<Self> {
        Some(Self {
            uid: par.uid()?,
            url_checksum: url_checksum.into(),
            kind: par.kind()?,
            key: par.key().map(str::to_string),
            is_readable: par.is_readable(),
            is_writeable: par.is_writeable(),
            driver: par.driver().map(str::to_string),
            created_at: par.created_at()?,
            expires_at: par.expires_at()?,
        })
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Persistence for issued PARs.
///
/// # Design Notes
///
/// - **Possession proof**: `close` removes a record only when the caller
///   presents the checksum of the decrypted URL.
/// - **Single use**: a closed PAR is gone; closing it again is `NotFound`.
pub trait ParRegistry: Send + Sync {
    /// Record a newly issued PAR.
    fn register(&self, record: ParRecord) -> Result<()>;

    /// Look up a PAR by uid.
    fn get(&self, uid: &Uuid) -> Result<Option<ParRecord>>;

    /// Remove a PAR, checking the presented URL checksum first.
    fn close(&self, uid: &Uuid, url_checksum: &str) -> Result<ParRecord>;

    /// Every registered PAR, oldest first.
    fn list(&self) -> Result<Vec<ParRecord>>;

    /// Drop every PAR that expired at or before `now`. Returns how many.
    fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize>;
}

/// Stable text form of a [`ParKind`] for storage.
pub(crate) fn kind_to_str(kind: ParKind) -> &'static str {
    match kind {
        ParKind::Bucket => "bucket",
        ParKind::Object => "object",
        ParKind::Calculation => "calculation",
    }
}

pub(crate) fn kind_from_str(s: &str) -> Option<ParKind> {
    match s {
        "bucket" => Some(ParKind::Bucket),
        "object" => Some(ParKind::Object),
        "calculation" => Some(ParKind::Calculation),
        _ => None,
    }
}
