//! The device registry: the single source of truth for known devices.
//!
//! [`Registry`] is a write-through cache over a [`DeviceStore`]. Every
//! mutation of durable fields writes to the store first and updates memory
//! only once the write has committed, so a failed write leaves the registry
//! exactly as it was. Volatile fields (reachability, the refreshing flag)
//! live only in memory and never fail.
//!
//! Writes to the store happen while the in-memory write lock is held. That
//! keeps the durable and in-memory views in the same order without a second
//! lock; store calls are short and synchronous.

use std::collections::HashMap;
use std::sync::Arc;

use time::OffsetDateTime;
use tokio::sync::RwLock;
use tracing::{debug, info};

use wled_store::{DeviceStore, MemoryStore, StoredDevice};
use wled_types::{Device, DeviceAttributes, DeviceId, Reachability};

use crate::error::{Error, Result};
use crate::snapshot::RegistrySnapshot;

/// Known devices, keyed by identity.
pub struct Registry {
    devices: RwLock<HashMap<DeviceId, Device>>,
    store: Arc<dyn DeviceStore>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry").finish_non_exhaustive()
    }
}

impl Registry {
    /// Load every persisted device from `store`.
    ///
    /// Loaded devices start with unknown reachability. A load failure is
    /// returned as [`Error::Persistence`].
    pub fn open(store: Arc<dyn DeviceStore>) -> Result<Self> {
        let stored = store.list()?;
        let devices: HashMap<_, _> = stored
            .into_iter()
            .map(|record| {
                let device = record.into_device();
                (device.id.clone(), device)
            })
            .collect();
        info!("Loaded {} device(s) from storage", devices.len());

        Ok(Self {
            devices: RwLock::new(devices),
            store,
        })
    }

    /// An empty registry backed by a [`MemoryStore`].
    pub fn in_memory() -> Self {
        Self {
            devices: RwLock::new(HashMap::new()),
            store: Arc::new(MemoryStore::new()),
        }
    }

    /// Get a copy of one device.
    pub async fn get(&self, id: &DeviceId) -> Option<Device> {
        self.devices.read().await.get(id).cloned()
    }

    /// Whether a device is registered.
    pub async fn contains(&self, id: &DeviceId) -> bool {
        self.devices.read().await.contains_key(id)
    }

    /// Identities of every registered device, sorted.
    pub async fn ids(&self) -> Vec<DeviceId> {
        let mut ids: Vec<_> = self.devices.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Number of registered devices.
    pub async fn len(&self) -> usize {
        self.devices.read().await.len()
    }

    /// Whether no devices are registered.
    pub async fn is_empty(&self) -> bool {
        self.devices.read().await.is_empty()
    }

    /// Take an immutable, point-in-time copy of every device.
    pub async fn list(&self) -> RegistrySnapshot {
        let mut devices: Vec<Device> = self.devices.read().await.values().cloned().collect();
        devices.sort_by(|a, b| a.id.cmp(&b.id));
        RegistrySnapshot::new(devices)
    }

    /// Create a device or merge a report into an existing one.
    ///
    /// On merge the address and attributes are replaced; identity, hidden
    /// flag, custom name and first-seen time are kept. Reachability is not
    /// touched. Applying the same upsert twice is the same as applying it
    /// once.
    pub async fn upsert(
        &self,
        id: DeviceId,
        address: impl Into<String>,
        attributes: DeviceAttributes,
    ) -> Result<Device> {
        self.upsert_with(id, address.into(), attributes, None).await
    }

    /// Upsert the result of a successful probe and mark the device online.
    pub(crate) async fn upsert_refreshed(
        &self,
        id: DeviceId,
        address: impl Into<String>,
        attributes: DeviceAttributes,
        at: OffsetDateTime,
    ) -> Result<Device> {
        self.upsert_with(id, address.into(), attributes, Some(at))
            .await
    }

    async fn upsert_with(
        &self,
        id: DeviceId,
        address: String,
        attributes: DeviceAttributes,
        refreshed_at: Option<OffsetDateTime>,
    ) -> Result<Device> {
        let mut devices = self.devices.write().await;

        let mut next = devices
            .get(&id)
            .cloned()
            .unwrap_or_else(|| Device::new(id.clone(), address.clone()));
        next.address = address;
        next.attributes = attributes;
        if let Some(at) = refreshed_at {
            next.last_refresh = Some(at);
            next.reachability = Reachability::Online;
        }

        let durable_changed = devices
            .get(&id)
            .is_none_or(|current| durable_differs(current, &next));
        if durable_changed {
            self.store.upsert(&StoredDevice::from_device(&next))?;
        }

        devices.insert(id, next.clone());
        Ok(next)
    }

    /// Merge one discovery result.
    ///
    /// Creates the device (visible, reachability unknown) if it is new,
    /// otherwise updates only its address. Returns `true` for a new device.
    pub async fn merge_discovered(&self, id: &DeviceId, address: &str) -> Result<bool> {
        let mut devices = self.devices.write().await;

        match devices.get_mut(id) {
            Some(existing) => {
                if existing.address != address {
                    let mut next = existing.clone();
                    next.address = address.to_string();
                    self.store.upsert(&StoredDevice::from_device(&next))?;
                    debug!("{} moved from {} to {}", id, existing.address, address);
                    existing.address = next.address;
                }
                Ok(false)
            }
            None => {
                let device = Device::new(id.clone(), address);
                self.store.upsert(&StoredDevice::from_device(&device))?;
                info!("Discovered new device {} at {}", id, address);
                devices.insert(id.clone(), device);
                Ok(true)
            }
        }
    }

    /// Apply a successful refresh.
    ///
    /// Replaces the attributes, marks the device online and stamps
    /// `last_refresh`. Returns `Ok(None)` without writing anything if the
    /// device was deleted while the refresh was in flight.
    pub async fn apply_refresh(
        &self,
        id: &DeviceId,
        attributes: DeviceAttributes,
        at: OffsetDateTime,
    ) -> Result<Option<Device>> {
        let mut devices = self.devices.write().await;
        let Some(existing) = devices.get_mut(id) else {
            debug!("Dropping refresh result for deleted device {}", id);
            return Ok(None);
        };

        let mut next = existing.clone();
        next.attributes = attributes;
        next.last_refresh = Some(at);
        self.store.upsert(&StoredDevice::from_device(&next))?;

        next.reachability = Reachability::Online;
        next.refreshing = false;
        *existing = next.clone();
        Ok(Some(next))
    }

    /// Mark a device offline after a failed refresh, keeping its attributes.
    ///
    /// Returns `None` if the device no longer exists.
    pub async fn mark_offline(&self, id: &DeviceId) -> Option<Device> {
        let mut devices = self.devices.write().await;
        let device = devices.get_mut(id)?;
        device.reachability = Reachability::Offline;
        device.refreshing = false;
        Some(device.clone())
    }

    /// Mark a device online without changing anything durable.
    ///
    /// Used when the device answered but its new attributes could not be
    /// persisted.
    pub(crate) async fn settle_online(&self, id: &DeviceId) -> Option<Device> {
        let mut devices = self.devices.write().await;
        let device = devices.get_mut(id)?;
        device.reachability = Reachability::Online;
        device.refreshing = false;
        Some(device.clone())
    }

    /// Set or clear the in-flight flag. Returns `false` if the device is gone.
    pub(crate) async fn set_refreshing(&self, id: &DeviceId, refreshing: bool) -> bool {
        match self.devices.write().await.get_mut(id) {
            Some(device) => {
                device.refreshing = refreshing;
                true
            }
            None => false,
        }
    }

    /// Delete a device durably.
    ///
    /// The device stays registered if the store rejects the delete.
    pub async fn delete(&self, id: &DeviceId) -> Result<Device> {
        let mut devices = self.devices.write().await;
        if !devices.contains_key(id) {
            return Err(Error::not_found(id));
        }

        match self.store.delete(id) {
            Ok(()) => {}
            // Already gone from the store; finish the delete in memory.
            Err(e) if e.is_not_found() => debug!("{} was not in the store", id),
            Err(e) => return Err(e.into()),
        }

        let removed = devices.remove(id).ok_or_else(|| Error::not_found(id))?;
        info!("Deleted device {}", id);
        Ok(removed)
    }

    /// Set the user's hidden flag.
    pub async fn set_hidden(&self, id: &DeviceId, hidden: bool) -> Result<Device> {
        self.update_user_settings(id, |device| device.hidden = hidden)
            .await
    }

    /// Set or clear the user's display name. Blank names clear it.
    pub async fn rename(&self, id: &DeviceId, name: Option<String>) -> Result<Device> {
        let name = name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty());
        self.update_user_settings(id, move |device| device.custom_name = name)
            .await
    }

    async fn update_user_settings(
        &self,
        id: &DeviceId,
        apply: impl FnOnce(&mut Device),
    ) -> Result<Device> {
        let mut devices = self.devices.write().await;
        let existing = devices.get_mut(id).ok_or_else(|| Error::not_found(id))?;

        let mut next = existing.clone();
        apply(&mut next);
        if durable_differs(existing, &next) {
            self.store.upsert(&StoredDevice::from_device(&next))?;
            *existing = next.clone();
        }
        Ok(next)
    }
}

fn durable_differs(current: &Device, next: &Device) -> bool {
    StoredDevice::from_device(current) != StoredDevice::from_device(next)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: &str) -> DeviceId {
        DeviceId::new(raw).unwrap()
    }

    fn attrs(name: &str) -> DeviceAttributes {
        DeviceAttributes {
            name: Some(name.to_string()),
            firmware: Some("0.14.4".to_string()),
            ..Default::default()
        }
    }

    fn registry_with_store() -> (Registry, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let registry = Registry::open(store.clone()).unwrap();
        (registry, store)
    }

    #[tokio::test]
    async fn test_open_loads_devices_as_unknown() {
        let mut device = Device::new(id("aabbccddeeff"), "10.0.0.2");
        device.reachability = Reachability::Online;
        device.hidden = true;
        let store = Arc::new(MemoryStore::with_devices([StoredDevice::from_device(
            &device,
        )]));

        let registry = Registry::open(store).unwrap();
        let loaded = registry.get(&device.id).await.unwrap();
        assert_eq!(loaded.reachability, Reachability::Unknown);
        assert!(loaded.hidden);
    }

    #[tokio::test]
    async fn test_open_reports_load_failure() {
        let store = Arc::new(MemoryStore::new());
        store.set_fail_reads(true);
        let err = Registry::open(store).unwrap_err();
        assert!(err.is_persistence());
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let (registry, store) = registry_with_store();
        let first = registry
            .upsert(id("aabbccddeeff"), "10.0.0.2", attrs("Desk"))
            .await
            .unwrap();
        let second = registry
            .upsert(id("aabbccddeeff"), "10.0.0.2", attrs("Desk"))
            .await
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(registry.len().await, 1);
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_store_writes_only_on_durable_change() {
        let (registry, store) = registry_with_store();
        let device_id = id("aabbccddeeff");
        registry.merge_discovered(&device_id, "10.0.0.2").await.unwrap();
        assert_eq!(store.write_count(), 1);

        // Same address, same settings: nothing to write.
        registry.merge_discovered(&device_id, "10.0.0.2").await.unwrap();
        registry.set_hidden(&device_id, false).await.unwrap();
        registry.rename(&device_id, None).await.unwrap();
        assert_eq!(store.write_count(), 1);

        // Every successful refresh stamps a new last_refresh.
        let at = OffsetDateTime::now_utc();
        registry
            .apply_refresh(&device_id, attrs("Desk"), at)
            .await
            .unwrap();
        registry
            .apply_refresh(&device_id, attrs("Desk"), at + time::Duration::seconds(30))
            .await
            .unwrap();
        assert_eq!(store.write_count(), 3);
    }

    #[tokio::test]
    async fn test_upsert_keeps_user_settings() {
        let (registry, _) = registry_with_store();
        let device_id = id("aabbccddeeff");
        registry
            .upsert(device_id.clone(), "10.0.0.2", attrs("Desk"))
            .await
            .unwrap();
        registry.set_hidden(&device_id, true).await.unwrap();
        registry
            .rename(&device_id, Some("Office".to_string()))
            .await
            .unwrap();
        let first_seen = registry.get(&device_id).await.unwrap().first_seen;

        let merged = registry
            .upsert(device_id.clone(), "10.0.0.9", attrs("Renamed on device"))
            .await
            .unwrap();
        assert!(merged.hidden);
        assert_eq!(merged.custom_name.as_deref(), Some("Office"));
        assert_eq!(merged.first_seen, first_seen);
        assert_eq!(merged.address, "10.0.0.9");
        assert_eq!(merged.attributes.name.as_deref(), Some("Renamed on device"));
    }

    #[tokio::test]
    async fn test_merge_discovered_updates_address_only() {
        let (registry, _) = registry_with_store();
        let device_id = id("aabbccddeeff");
        assert!(registry.merge_discovered(&device_id, "10.0.0.2").await.unwrap());

        registry
            .apply_refresh(&device_id, attrs("Desk"), OffsetDateTime::now_utc())
            .await
            .unwrap();
        assert!(!registry.merge_discovered(&device_id, "10.0.0.3").await.unwrap());

        let device = registry.get(&device_id).await.unwrap();
        assert_eq!(device.address, "10.0.0.3");
        assert_eq!(device.attributes.name.as_deref(), Some("Desk"));
        assert_eq!(device.reachability, Reachability::Online);
    }

    #[tokio::test]
    async fn test_apply_refresh_after_delete_is_dropped() {
        let (registry, store) = registry_with_store();
        let device_id = id("aabbccddeeff");
        registry.merge_discovered(&device_id, "10.0.0.2").await.unwrap();
        registry.delete(&device_id).await.unwrap();

        let applied = registry
            .apply_refresh(&device_id, attrs("Desk"), OffsetDateTime::now_utc())
            .await
            .unwrap();
        assert!(applied.is_none());
        assert!(!registry.contains(&device_id).await);
        assert!(store.get(&device_id).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_apply_refresh_failure_leaves_attributes() {
        let (registry, store) = registry_with_store();
        let device_id = id("aabbccddeeff");
        registry
            .upsert(device_id.clone(), "10.0.0.2", attrs("Old"))
            .await
            .unwrap();

        store.set_fail_writes(true);
        let result = registry
            .apply_refresh(&device_id, attrs("New"), OffsetDateTime::now_utc())
            .await;
        assert!(result.unwrap_err().is_persistence());

        let device = registry.get(&device_id).await.unwrap();
        assert_eq!(device.attributes.name.as_deref(), Some("Old"));
        assert!(device.last_refresh.is_none());
    }

    #[tokio::test]
    async fn test_mark_offline_keeps_attributes() {
        let (registry, _) = registry_with_store();
        let device_id = id("aabbccddeeff");
        registry
            .upsert(device_id.clone(), "10.0.0.2", attrs("Desk"))
            .await
            .unwrap();

        let device = registry.mark_offline(&device_id).await.unwrap();
        assert_eq!(device.reachability, Reachability::Offline);
        assert_eq!(device.attributes.name.as_deref(), Some("Desk"));
        assert!(registry.mark_offline(&id("001122334455")).await.is_none());
    }

    #[tokio::test]
    async fn test_delete_with_failing_store_keeps_device() {
        let (registry, store) = registry_with_store();
        let device_id = id("aabbccddeeff");
        registry.merge_discovered(&device_id, "10.0.0.2").await.unwrap();

        store.set_fail_writes(true);
        let err = registry.delete(&device_id).await.unwrap_err();
        assert!(err.is_persistence());
        assert!(registry.contains(&device_id).await);
    }

    #[tokio::test]
    async fn test_delete_unknown_is_not_found() {
        let registry = Registry::in_memory();
        let err = registry.delete(&id("aabbccddeeff")).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_rename_blank_clears_name() {
        let (registry, _) = registry_with_store();
        let device_id = id("aabbccddeeff");
        registry.merge_discovered(&device_id, "10.0.0.2").await.unwrap();

        let named = registry
            .rename(&device_id, Some("  Porch  ".to_string()))
            .await
            .unwrap();
        assert_eq!(named.custom_name.as_deref(), Some("Porch"));

        let cleared = registry
            .rename(&device_id, Some("   ".to_string()))
            .await
            .unwrap();
        assert!(cleared.custom_name.is_none());
    }

    #[tokio::test]
    async fn test_set_hidden_failure_is_not_applied() {
        let (registry, store) = registry_with_store();
        let device_id = id("aabbccddeeff");
        registry.merge_discovered(&device_id, "10.0.0.2").await.unwrap();

        store.set_fail_writes(true);
        assert!(registry.set_hidden(&device_id, true).await.is_err());
        assert!(!registry.get(&device_id).await.unwrap().hidden);
    }

    #[tokio::test]
    async fn test_list_is_a_copy() {
        let (registry, _) = registry_with_store();
        let device_id = id("aabbccddeeff");
        registry.merge_discovered(&device_id, "10.0.0.2").await.unwrap();

        let snapshot = registry.list().await;
        registry.delete(&device_id).await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert!(registry.list().await.is_empty());
    }
}
