//! Storage backend abstraction.

use std::sync::Arc;

use wled_types::DeviceId;

use crate::error::Result;
use crate::models::StoredDevice;

/// A durable, transactional store of device records.
///
/// Every write either commits completely or leaves the previous durable
/// state intact and returns an error. Implementations must be safe to share
/// between threads; callers hold them behind an `Arc`.
pub trait DeviceStore: Send + Sync {
    /// Insert or replace the record for `device.id`.
    fn upsert(&self, device: &StoredDevice) -> Result<()>;

    /// Remove a record.
    ///
    /// Returns [`Error::DeviceNotFound`](crate::Error::DeviceNotFound) if no
    /// record exists for `id`.
    fn delete(&self, id: &DeviceId) -> Result<()>;

    /// Fetch a single record.
    fn get(&self, id: &DeviceId) -> Result<Option<StoredDevice>>;

    /// Fetch every record.
    fn list(&self) -> Result<Vec<StoredDevice>>;
}

impl<T: DeviceStore + ?Sized> DeviceStore for Arc<T> {
    fn upsert(&self, device: &StoredDevice) -> Result<()> {
        (**self).upsert(device)
    }

    fn delete(&self, id: &DeviceId) -> Result<()> {
        (**self).delete(id)
    }

    fn get(&self, id: &DeviceId) -> Result<Option<StoredDevice>> {
        (**self).get(id)
    }

    fn list(&self) -> Result<Vec<StoredDevice>> {
        (**self).list()
    }
}
