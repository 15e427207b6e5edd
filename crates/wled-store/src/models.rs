//! Data models for stored data.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use wled_types::{Device, DeviceAttributes, DeviceId, Reachability};

/// The durable part of a [`Device`].
///
/// Reachability and the in-flight flag are volatile and never stored; a
/// device loaded from the store starts out [`Reachability::Unknown`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDevice {
    /// Device identity.
    pub id: DeviceId,
    /// Last-seen network address.
    pub address: String,
    /// User-chosen display name.
    pub custom_name: Option<String>,
    /// User-set hidden flag.
    pub hidden: bool,
    /// Last-known attributes.
    pub attributes: DeviceAttributes,
    /// Last successful refresh.
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_refresh: Option<OffsetDateTime>,
    /// First time this device was seen.
    #[serde(with = "time::serde::rfc3339")]
    pub first_seen: OffsetDateTime,
}

impl StoredDevice {
    /// Capture the durable fields of a device.
    pub fn from_device(device: &Device) -> Self {
        Self {
            id: device.id.clone(),
            address: device.address.clone(),
            custom_name: device.custom_name.clone(),
            hidden: device.hidden,
            attributes: device.attributes.clone(),
            last_refresh: device.last_refresh,
            first_seen: device.first_seen,
        }
    }

    /// Rebuild a device with volatile state reset.
    pub fn into_device(self) -> Device {
        Device {
            id: self.id,
            address: self.address,
            custom_name: self.custom_name,
            hidden: self.hidden,
            reachability: Reachability::Unknown,
            refreshing: false,
            last_refresh: self.last_refresh,
            first_seen: self.first_seen,
            attributes: self.attributes,
        }
    }
}

impl From<&Device> for StoredDevice {
    fn from(device: &Device) -> Self {
        Self::from_device(device)
    }
}
