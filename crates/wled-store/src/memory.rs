//! In-memory store for tests and ephemeral sessions.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use wled_types::DeviceId;

use crate::error::{Error, Result};
use crate::models::StoredDevice;
use crate::traits::DeviceStore;

/// A [`DeviceStore`] kept entirely in memory.
///
/// Supports failure injection so callers can exercise their handling of a
/// backend that rejects writes.
///
/// # Example
///
/// ```
/// use wled_store::{DeviceStore, MemoryStore, StoredDevice};
/// use wled_types::{Device, DeviceId};
///
/// let store = MemoryStore::new();
/// let device = Device::new(DeviceId::new("aabbccddeeff").unwrap(), "10.0.0.2");
/// store.upsert(&StoredDevice::from_device(&device)).unwrap();
///
/// store.set_fail_writes(true);
/// assert!(store.delete(&device.id).is_err());
/// assert!(store.get(&device.id).unwrap().is_some());
/// ```
#[derive(Default)]
pub struct MemoryStore {
    devices: RwLock<BTreeMap<DeviceId, StoredDevice>>,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
    writes: AtomicU64,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("fail_writes", &self.fail_writes.load(Ordering::Relaxed))
            .field("fail_reads", &self.fail_reads.load(Ordering::Relaxed))
            .field("writes", &self.writes.load(Ordering::Relaxed))
            .finish()
    }
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with records.
    pub fn with_devices(devices: impl IntoIterator<Item = StoredDevice>) -> Self {
        let store = Self::new();
        if let Ok(mut map) = store.devices.write() {
            map.extend(devices.into_iter().map(|d| (d.id.clone(), d)));
        }
        store
    }

    /// Make every subsequent write fail with [`Error::Unavailable`].
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent read fail with [`Error::Unavailable`].
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Number of writes that were committed.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Unavailable("injected write failure".to_string()));
        }
        Ok(())
    }

    fn check_readable(&self) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::Unavailable("injected read failure".to_string()));
        }
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<DeviceId, StoredDevice>>> {
        self.devices
            .read()
            .map_err(|_| Error::Unavailable("memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<DeviceId, StoredDevice>>> {
        self.devices
            .write()
            .map_err(|_| Error::Unavailable("memory store lock poisoned".to_string()))
    }
}

impl DeviceStore for MemoryStore {
    fn upsert(&self, device: &StoredDevice) -> Result<()> {
        self.check_writable()?;
        let mut devices = self.write()?;
        let mut record = device.clone();
        if let Some(existing) = devices.get(&device.id) {
            record.first_seen = existing.first_seen;
        }
        devices.insert(record.id.clone(), record);
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn delete(&self, id: &DeviceId) -> Result<()> {
        self.check_writable()?;
        let mut devices = self.write()?;
        devices
            .remove(id)
            .ok_or_else(|| Error::DeviceNotFound(id.to_string()))?;
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn get(&self, id: &DeviceId) -> Result<Option<StoredDevice>> {
        self.check_readable()?;
        Ok(self.read()?.get(id).cloned())
    }

    fn list(&self) -> Result<Vec<StoredDevice>> {
        self.check_readable()?;
        Ok(self.read()?.values().cloned().collect())
    }
}
