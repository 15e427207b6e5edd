//! Point-in-time registry views with filtering and sorting.
//!
//! A [`RegistrySnapshot`] is an owned copy of every device, so readers never
//! hold a registry lock while rendering. The online and offline lists are
//! recomputed from it on every call; nothing is cached.
//!
//! Devices whose reachability is still unknown are listed with the offline
//! devices.

use std::cmp::Ordering;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use wled_types::Device;

/// Order of the online and offline lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SortOrder {
    /// Display name, case-insensitive.
    #[default]
    Name,
    /// Network address; IP addresses compare numerically.
    Address,
    /// Most recently refreshed first; never-refreshed devices last.
    LastRefresh,
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name => write!(f, "name"),
            Self::Address => write!(f, "address"),
            Self::LastRefresh => write!(f, "last-refresh"),
        }
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "name" => Ok(Self::Name),
            "address" | "ip" => Ok(Self::Address),
            "last-refresh" | "last_refresh" | "refresh" => Ok(Self::LastRefresh),
            other => Err(format!(
                "unknown sort order '{other}' (expected name, address or last-refresh)"
            )),
        }
    }
}

/// Filter and sort settings for the device lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ListFilter {
    /// Include devices the user has hidden.
    pub show_hidden_devices: bool,
    /// Order of each list.
    pub sort: SortOrder,
}

impl ListFilter {
    /// Filter that also lists hidden devices.
    pub fn showing_hidden(mut self, show: bool) -> Self {
        self.show_hidden_devices = show;
        self
    }

    /// Filter with a different sort order.
    pub fn sorted_by(mut self, sort: SortOrder) -> Self {
        self.sort = sort;
        self
    }

    fn admits(&self, device: &Device) -> bool {
        self.show_hidden_devices || !device.hidden
    }
}

/// An immutable copy of the registry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegistrySnapshot {
    devices: Vec<Device>,
    #[serde(with = "time::serde::rfc3339")]
    taken_at: OffsetDateTime,
}

impl RegistrySnapshot {
    /// Wrap a set of devices taken now.
    pub fn new(devices: Vec<Device>) -> Self {
        Self {
            devices,
            taken_at: OffsetDateTime::now_utc(),
        }
    }

    /// Every device, in identity order, regardless of filter.
    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    /// When the snapshot was taken.
    pub fn taken_at(&self) -> OffsetDateTime {
        self.taken_at
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Online devices admitted by `filter`, sorted.
    pub fn online(&self, filter: &ListFilter) -> Vec<&Device> {
        self.partition(filter, true)
    }

    /// Offline and never-refreshed devices admitted by `filter`, sorted.
    pub fn offline(&self, filter: &ListFilter) -> Vec<&Device> {
        self.partition(filter, false)
    }

    /// Number of devices hidden by the user.
    pub fn hidden_count(&self) -> usize {
        self.devices.iter().filter(|d| d.hidden).count()
    }

    fn partition(&self, filter: &ListFilter, online: bool) -> Vec<&Device> {
        let mut devices: Vec<&Device> = self
            .devices
            .iter()
            .filter(|d| d.is_online() == online && filter.admits(d))
            .collect();
        devices.sort_by(|a, b| compare(a, b, filter.sort));
        devices
    }
}

/// Online devices of `snapshot` admitted by `filter`.
pub fn compute_online<'a>(snapshot: &'a RegistrySnapshot, filter: &ListFilter) -> Vec<&'a Device> {
    snapshot.online(filter)
}

/// Offline and never-refreshed devices of `snapshot` admitted by `filter`.
pub fn compute_offline<'a>(
    snapshot: &'a RegistrySnapshot,
    filter: &ListFilter,
) -> Vec<&'a Device> {
    snapshot.offline(filter)
}

fn compare(a: &Device, b: &Device, sort: SortOrder) -> Ordering {
    let primary = match sort {
        SortOrder::Name => a
            .display_name()
            .to_lowercase()
            .cmp(&b.display_name().to_lowercase()),
        SortOrder::Address => compare_addresses(&a.address, &b.address),
        // Newest first, None last.
        SortOrder::LastRefresh => match (a.last_refresh, b.last_refresh) {
            (Some(x), Some(y)) => y.cmp(&x),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        },
    };
    primary.then_with(|| a.id.cmp(&b.id))
}

fn compare_addresses(a: &str, b: &str) -> Ordering {
    match (host_ip(a), host_ip(b)) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.to_lowercase().cmp(&b.to_lowercase()),
    }
}

fn host_ip(address: &str) -> Option<IpAddr> {
    address.parse().ok().or_else(|| {
        let (host, _port) = address.rsplit_once(':')?;
        host.trim_start_matches('[').trim_end_matches(']').parse().ok()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;
    use wled_types::{DeviceId, Reachability};

    fn device(mac: &str, address: &str, name: &str, reachability: Reachability) -> Device {
        let mut device = Device::new(DeviceId::new(mac).unwrap(), address);
        device.attributes.name = Some(name.to_string());
        device.reachability = reachability;
        device
    }

    #[test]
    fn test_partition_and_hidden_filter() {
        let mut hidden = device("000000000003", "10.0.0.3", "C", Reachability::Online);
        hidden.hidden = true;
        let snapshot = RegistrySnapshot::new(vec![
            device("000000000001", "10.0.0.1", "A", Reachability::Online),
            device("000000000002", "10.0.0.2", "B", Reachability::Offline),
            hidden,
        ]);

        let filter = ListFilter::default();
        let online: Vec<_> = snapshot.online(&filter).iter().map(|d| d.display_name()).collect();
        let offline: Vec<_> = snapshot.offline(&filter).iter().map(|d| d.display_name()).collect();
        assert_eq!(online, vec!["A"]);
        assert_eq!(offline, vec!["B"]);

        let filter = filter.showing_hidden(true);
        let online: Vec<_> = snapshot.online(&filter).iter().map(|d| d.display_name()).collect();
        assert_eq!(online, vec!["A", "C"]);
        assert_eq!(snapshot.hidden_count(), 1);
    }

    #[test]
    fn test_unknown_devices_are_listed_offline() {
        let snapshot = RegistrySnapshot::new(vec![device(
            "000000000001",
            "10.0.0.1",
            "A",
            Reachability::Unknown,
        )]);
        let filter = ListFilter::default();
        assert!(compute_online(&snapshot, &filter).is_empty());
        assert_eq!(compute_offline(&snapshot, &filter).len(), 1);
    }

    #[test]
    fn test_name_sort_is_case_insensitive_with_id_tiebreak() {
        let snapshot = RegistrySnapshot::new(vec![
            device("000000000003", "10.0.0.3", "beta", Reachability::Online),
            device("000000000002", "10.0.0.2", "Alpha", Reachability::Online),
            device("000000000001", "10.0.0.1", "alpha", Reachability::Online),
        ]);
        let ids: Vec<_> = snapshot
            .online(&ListFilter::default())
            .iter()
            .map(|d| d.id.as_str().to_string())
            .collect();
        assert_eq!(ids, vec!["000000000001", "000000000002", "000000000003"]);
    }

    #[test]
    fn test_address_sort_is_numeric() {
        let snapshot = RegistrySnapshot::new(vec![
            device("000000000001", "10.0.0.10", "x", Reachability::Offline),
            device("000000000002", "10.0.0.9", "y", Reachability::Offline),
            device("000000000003", "wled-porch.local", "z", Reachability::Offline),
            device("000000000004", "10.0.0.9:8080", "w", Reachability::Offline),
        ]);
        let filter = ListFilter::default().sorted_by(SortOrder::Address);
        let addresses: Vec<_> = snapshot
            .offline(&filter)
            .iter()
            .map(|d| d.address.as_str())
            .collect();
        assert_eq!(
            addresses,
            vec!["10.0.0.9", "10.0.0.9:8080", "10.0.0.10", "wled-porch.local"]
        );
    }

    #[test]
    fn test_last_refresh_sort_newest_first() {
        let now = OffsetDateTime::now_utc();
        let mut old = device("000000000001", "10.0.0.1", "old", Reachability::Online);
        old.last_refresh = Some(now - Duration::minutes(5));
        let mut new = device("000000000002", "10.0.0.2", "new", Reachability::Online);
        new.last_refresh = Some(now);
        let never = device("000000000003", "10.0.0.3", "never", Reachability::Online);

        let snapshot = RegistrySnapshot::new(vec![never, old, new]);
        let filter = ListFilter::default().sorted_by(SortOrder::LastRefresh);
        let names: Vec<_> = snapshot.online(&filter).iter().map(|d| d.display_name()).collect();
        assert_eq!(names, vec!["new", "old", "never"]);
    }

    #[test]
    fn test_sort_order_parse_and_display() {
        assert_eq!("Last-Refresh".parse::<SortOrder>().unwrap(), SortOrder::LastRefresh);
        assert_eq!("ip".parse::<SortOrder>().unwrap(), SortOrder::Address);
        assert!("size".parse::<SortOrder>().is_err());
        assert_eq!(SortOrder::LastRefresh.to_string(), "last-refresh");
        assert_eq!(
            serde_json::to_string(&SortOrder::LastRefresh).unwrap(),
            "\"last-refresh\""
        );
    }
}
