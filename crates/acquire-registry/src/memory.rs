//! In-memory implementation of the ParRegistry trait.
//!
//! Same semantics as SQLite, nothing persisted.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{RegistryError, Result};
use crate::traits::{ParRecord, ParRegistry};

/// In-memory registry. Thread-safe via RwLock.
#[derive(Debug, Default)]
pub struct MemoryParRegistry {
    records: RwLock<HashMap<Uuid, ParRecord>>,
}

impl MemoryParRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ParRegistry for MemoryParRegistry {
    fn register(&self, record: ParRecord) -> Result<()> {
        let mut records = self.records.write().map_err(|_| RegistryError::Poisoned)?;
        if records.contains_key(&record.uid) {
            return Err(RegistryError::Duplicate(record.uid.to_string()));
        }
        debug!(uid = %record.uid, "PAR registered");
        records.insert(record.uid, record);
        Ok(())
    }

    fn get(&self, uid: &Uuid) -> Result<Option<ParRecord>> {
        let records = self.records.read().map_err(|_| RegistryError::Poisoned)?;
        Ok(records.get(uid).cloned())
    }

    fn close(&self, uid: &Uuid, url_checksum: &str) -> Result<ParRecord> {
        let mut records = self.records.write().map_err(|_| RegistryError::Poisoned)?;
        let record = records
            .get(uid)
            .ok_or_else(|| RegistryError::NotFound(uid.to_string()))?;
        if record.url_checksum != url_checksum {
            return Err(RegistryError::ChecksumMismatch(uid.to_string()));
        }
        let record = records
            .remove(uid)
            .ok_or_else(|| RegistryError::NotFound(uid.to_string()))?;
        info!(uid = %uid, "PAR closed");
        Ok(record)
    }

    fn list(&self) -> Result<Vec<ParRecord>> {
        let records = self.records.read().map_err(|_| RegistryError::Poisoned)?;
        let mut all: Vec<_> = records.values().cloned().collect();
        all.sort_by_key(|r| (r.created_at, r.uid));
        Ok(all)
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut records = self.records.write().map_err(|_| RegistryError::Poisoned)?;
        let before = records.len();
        records.retain(|_, r| !r.is_expired_at(now));
        let purged = before - records.len();
        if purged > 0 {
            info!(purged, "expired PARs purged");
        }
        Ok(purged)
    }
}
