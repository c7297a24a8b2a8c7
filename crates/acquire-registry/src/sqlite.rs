//! SQLite implementation of the ParRegistry trait.

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{RegistryError, Result};
use crate::migration;
use crate::traits::{kind_from_str, kind_to_str, ParRecord, ParRegistry};

/// SQLite-backed registry. Thread-safe via internal Mutex.
#[derive(Clone)]
pub struct SqliteParRegistry {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteParRegistry {
    /// Open the registry database at `path`, creating and migrating it as needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let mut conn = Connection::open(path)?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database.
    pub fn open_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()?;
        migration::migrate(&mut conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock().map_err(|_| RegistryError::Poisoned)?;
        f(&mut conn)
    }
}

impl std::fmt::Debug for SqliteParRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteParRegistry").finish_non_exhaustive()
    }
}

fn to_micros(t: DateTime<Utc>) -> i64 {
    t.timestamp_micros()
}

fn from_micros(us: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(
        us.div_euclid(1_000_000),
        (us.rem_euclid(1_000_000) * 1_000) as u32,
    )
}

const COLUMNS: &str = "uid, url_checksum, kind, object_key, is_readable, is_writeable, \
                       driver, created_at, expires_at";

// Raw row, converted outside the rusqlite closure so bad data maps to InvalidData.
struct Row {
    uid: String,
    url_checksum: String,
    kind: String,
    key: Option<String>,
    is_readable: bool,
    is_writeable: bool,
    driver: Option<String>,
    created_at: i64,
    expires_at: i64,
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Row> {
    Ok(Row {
        uid: row.get("uid")?,
        url_checksum: row.get("url_checksum")?,
        kind: row.get("kind")?,
        key: row.get("object_key")?,
        is_readable: row.get("is_readable")?,
        is_writeable: row.get("is_writeable")?,
        driver: row.get("driver")?,
        created_at: row.get("created_at")?,
        expires_at: row.get("expires_at")?,
    })
}

impl TryFrom<Row> for ParRecord {
    type Error = RegistryError;

    fn try_from(row: Row) -> Result<Self> {
        let invalid =
            |what: &str| RegistryError::InvalidData(format!("{what} for PAR {}", row.uid));
        Ok(ParRecord {
            uid: Uuid::parse_str(&row.uid).map_err(|_| invalid("bad uid"))?,
            kind: kind_from_str(&row.kind).ok_or_else(|| invalid("unknown kind"))?,
            created_at: from_micros(row.created_at).ok_or_else(|| invalid("bad created_at"))?,
            expires_at: from_micros(row.expires_at).ok_or_else(|| invalid("bad expires_at"))?,
            url_checksum: row.url_checksum,
            key: row.key,
            is_readable: row.is_readable,
            is_writeable: row.is_writeable,
            driver: row.driver,
        })
    }
}

impl ParRegistry for SqliteParRegistry {
    fn register(&self, record: ParRecord) -> Result<()> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT OR IGNORE INTO pars (uid, url_checksum, kind, object_key, is_readable,
                    is_writeable, driver, created_at, expires_at, registered_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    record.uid.to_string(),
                    record.url_checksum,
                    kind_to_str(record.kind),
                    record.key,
                    record.is_readable,
                    record.is_writeable,
                    record.driver,
                    to_micros(record.created_at),
                    to_micros(record.expires_at),
                    acquire_core::time::now_millis(),
                ],
            )?;
            if inserted == 0 {
                return Err(RegistryError::Duplicate(record.uid.to_string()));
            }
            debug!(uid = %record.uid, "PAR registered");
            Ok(())
        })
    }

    fn get(&self, uid: &Uuid) -> Result<Option<ParRecord>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    &format!("SELECT {COLUMNS} FROM pars WHERE uid = ?1"),
                    params![uid.to_string()],
                    read_row,
                )
                .optional()?;
            row.map(ParRecord::try_from).transpose()
        })
    }

    fn close(&self, uid: &Uuid, url_checksum: &str) -> Result<ParRecord> {
        self.with_conn(|conn| {
            let tx = conn.transaction()?;
            let row = tx
                .query_row(
                    &format!("SELECT {COLUMNS} FROM pars WHERE uid = ?1"),
                    params![uid.to_string()],
                    read_row,
                )
                .optional()?
                .ok_or_else(|| RegistryError::NotFound(uid.to_string()))?;

            if row.url_checksum != url_checksum {
                return Err(RegistryError::ChecksumMismatch(uid.to_string()));
            }

            let record = ParRecord::try_from(row)?;
            tx.execute("DELETE FROM pars WHERE uid = ?1", params![uid.to_string()])?;
            tx.commit()?;

            info!(uid = %uid, "PAR closed");
            Ok(record)
        })
    }

    fn list(&self) -> Result<Vec<ParRecord>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {COLUMNS} FROM pars ORDER BY created_at, uid"))?;
            let rows = stmt
                .query_map([], read_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            rows.into_iter().map(ParRecord::try_from).collect()
        })
    }

    fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        self.with_conn(|conn| {
            let purged = conn.execute(
                "DELETE FROM pars WHERE expires_at <= ?1",
                params![to_micros(now)],
            )?;
            if purged > 0 {
                info!(purged, "expired PARs purged");
            }
            Ok(purged)
        })
    }
}
