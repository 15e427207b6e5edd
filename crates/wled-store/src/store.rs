//! SQLite store implementation.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, OptionalExtension, Row};
use time::OffsetDateTime;
use tracing::{debug, info};

use wled_types::{DeviceAttributes, DeviceId};

use crate::error::{Error, Result};
use crate::models::StoredDevice;
use crate::schema;
use crate::traits::DeviceStore;

const SELECT_DEVICE: &str = "SELECT id, address, custom_name, hidden, attributes, last_refresh, first_seen
     FROM devices";

/// SQLite-backed [`DeviceStore`].
///
/// The connection is guarded by a mutex so the store can be shared between
/// tasks; every write runs in its own transaction.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        info!("Opening device database at {}", path.display());
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        schema::initialize(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open the default database location.
    pub fn open_default() -> Result<Self> {
        Self::open(crate::default_db_path())
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Number of stored devices.
    pub fn count(&self) -> Result<u64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM devices", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| Error::Unavailable("database connection lock poisoned".to_string()))
    }
}

impl DeviceStore for SqliteStore {
    fn upsert(&self, device: &StoredDevice) -> Result<()> {
        let attributes = serde_json::to_string(&device.attributes)?;
        let now = OffsetDateTime::now_utc().unix_timestamp();

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO devices (id, address, custom_name, hidden, attributes, last_refresh,
                first_seen, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(id) DO UPDATE SET
                address = ?2,
                custom_name = ?3,
                hidden = ?4,
                attributes = ?5,
                last_refresh = ?6,
                updated_at = ?8",
            rusqlite::params![
                device.id.as_str(),
                device.address,
                device.custom_name,
                device.hidden,
                attributes,
                device.last_refresh.map(|t| t.unix_timestamp()),
                device.first_seen.unix_timestamp(),
                now,
            ],
        )?;
        tx.commit()?;

        debug!("Stored device {}", device.id);
        Ok(())
    }

    fn delete(&self, id: &DeviceId) -> Result<()> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let removed = tx.execute("DELETE FROM devices WHERE id = ?", [id.as_str()])?;
        if removed == 0 {
            // Dropping the transaction rolls it back
            return Err(Error::DeviceNotFound(id.to_string()));
        }
        tx.commit()?;

        info!("Deleted device {}", id);
        Ok(())
    }

    fn get(&self, id: &DeviceId) -> Result<Option<StoredDevice>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!("{SELECT_DEVICE} WHERE id = ?"))?;
        let raw = stmt.query_row([id.as_str()], RawDevice::from_row).optional()?;
        raw.map(RawDevice::into_stored).transpose()
    }

    fn list(&self) -> Result<Vec<StoredDevice>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!("{SELECT_DEVICE} ORDER BY first_seen, id"))?;
        let rows = stmt
            .query_map([], RawDevice::from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.into_iter().map(RawDevice::into_stored).collect()
    }
}

/// Row values before decoding identity, JSON and timestamps.
struct RawDevice {
    id: String,
    address: String,
    custom_name: Option<String>,
    hidden: bool,
    attributes: String,
    last_refresh: Option<i64>,
    first_seen: i64,
}

impl RawDevice {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            address: row.get(1)?,
            custom_name: row.get(2)?,
            hidden: row.get(3)?,
            attributes: row.get(4)?,
            last_refresh: row.get(5)?,
            first_seen: row.get(6)?,
        })
    }

    fn into_stored(self) -> Result<StoredDevice> {
        let attributes: DeviceAttributes = serde_json::from_str(&self.attributes)?;
        Ok(StoredDevice {
            id: DeviceId::new(&self.id)?,
            address: self.address,
            custom_name: self.custom_name,
            hidden: self.hidden,
            attributes,
            last_refresh: self.last_refresh.map(timestamp).transpose()?,
            first_seen: timestamp(self.first_seen)?,
        })
    }
}

fn timestamp(secs: i64) -> Result<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp(secs).map_err(|e| Error::InvalidTimestamp(e.to_string()))
}
