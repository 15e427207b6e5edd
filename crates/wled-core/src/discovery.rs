//! Discovery scanners.
//!
//! - [`AddressScanner`] probes a fixed list of addresses.
//! - [`ChainScanner`] runs several scanners and concatenates their results.
//! - [`MdnsScanner`] (feature `mdns`) browses for `_wled._tcp` services.

use std::net::IpAddr;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use tracing::{debug, warn};

use wled_types::DeviceId;

use crate::error::ScanError;
use crate::traits::{DeviceClient, Discovered, DiscoveryScanner, DiscoveryStream};

/// Finds devices by probing configured addresses.
///
/// Addresses that do not answer, or answer without an identity, are
/// skipped. The scan itself never fails.
pub struct AddressScanner {
    addresses: Vec<String>,
    client: Arc<dyn DeviceClient>,
}

impl std::fmt::Debug for AddressScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AddressScanner")
            .field("addresses", &self.addresses)
            .finish_non_exhaustive()
    }
}

impl AddressScanner {
    pub fn new(addresses: impl IntoIterator<Item = String>, client: Arc<dyn DeviceClient>) -> Self {
        Self {
            addresses: addresses.into_iter().collect(),
            client,
        }
    }

    /// The configured addresses.
    pub fn addresses(&self) -> &[String] {
        &self.addresses
    }
}

#[async_trait]
impl DiscoveryScanner for AddressScanner {
    async fn scan(&self) -> Result<DiscoveryStream, ScanError> {
        let probes = self.addresses.iter().map(|address| async move {
            match self.client.probe(address).await {
                Ok(report) => match report.id {
                    Some(id) => Some(Discovered::new(id, address.clone())),
                    None => {
                        warn!("{} answered without a device identity, skipping", address);
                        None
                    }
                },
                Err(e) => {
                    debug!("No device at {}: {}", address, e);
                    None
                }
            }
        });

        let found: Vec<Discovered> = join_all(probes).await.into_iter().flatten().collect();
        Ok(Box::pin(stream::iter(found)))
    }
}

/// Runs several scanners in order and concatenates their results.
///
/// Fails only if every scanner fails to start.
#[derive(Default)]
pub struct ChainScanner {
    scanners: Vec<Arc<dyn DiscoveryScanner>>,
}

impl std::fmt::Debug for ChainScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainScanner")
            .field("scanners", &self.scanners.len())
            .finish()
    }
}

impl ChainScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a scanner.
    pub fn with(mut self, scanner: Arc<dyn DiscoveryScanner>) -> Self {
        self.scanners.push(scanner);
        self
    }

    pub fn len(&self) -> usize {
        self.scanners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scanners.is_empty()
    }
}

#[async_trait]
impl DiscoveryScanner for ChainScanner {
    async fn scan(&self) -> Result<DiscoveryStream, ScanError> {
        let mut streams = Vec::new();
        let mut errors = Vec::new();

        for scanner in &self.scanners {
            match scanner.scan().await {
                Ok(stream) => streams.push(stream),
                Err(e) => {
                    warn!("Discovery source failed: {}", e);
                    errors.push(e.to_string());
                }
            }
        }

        if streams.is_empty() && !errors.is_empty() {
            return Err(ScanError::AllFailed(errors.join("; ")));
        }
        Ok(Box::pin(stream::iter(streams).flatten()))
    }
}

/// Network address for a service: the bare IP on port 80, `ip:port`
/// otherwise. IPv6 addresses are bracketed when a port is added.
pub fn service_address(ip: IpAddr, port: u16) -> String {
    match (ip, port) {
        (_, 80) => ip.to_string(),
        (IpAddr::V4(v4), _) => format!("{}:{}", v4, port),
        (IpAddr::V6(v6), _) => format!("[{}]:{}", v6, port),
    }
}

/// Identity of an advertised service: its `mac` TXT record, or else the
/// instance part of its full name.
pub fn service_identity(mac: Option<&str>, fullname: &str, service_type: &str) -> Option<DeviceId> {
    if let Some(mac) = mac
        && let Ok(id) = DeviceId::new(mac)
    {
        return Some(id);
    }
    let instance = fullname
        .strip_suffix(service_type)
        .unwrap_or(fullname)
        .trim_end_matches('.');
    DeviceId::new(instance).ok()
}

#[cfg(feature = "mdns")]
pub use mdns::{MdnsScanner, WLED_SERVICE_TYPE};

#[cfg(feature = "mdns")]
mod mdns {
    use std::collections::HashSet;
    use std::net::IpAddr;
    use std::time::{Duration, Instant};

    use async_trait::async_trait;
    use futures::stream;
    use mdns_sd::{ServiceDaemon, ServiceEvent, ServiceInfo};
    use tokio::sync::mpsc;
    use tracing::{debug, info, warn};

    use super::{service_address, service_identity};
    use crate::error::ScanError;
    use crate::traits::{Discovered, DiscoveryScanner, DiscoveryStream};

    /// Service type WLED advertises.
    pub const WLED_SERVICE_TYPE: &str = "_wled._tcp.local.";

    /// Finds devices by browsing mDNS for a bounded time.
    #[derive(Debug, Clone)]
    pub struct MdnsScanner {
        duration: Duration,
        service_type: String,
    }

    impl MdnsScanner {
        /// Browse for `duration` per scan.
        pub fn new(duration: Duration) -> Self {
            Self {
                duration,
                service_type: WLED_SERVICE_TYPE.to_string(),
            }
        }

        /// Browse a different service type.
        pub fn with_service_type(mut self, service_type: impl Into<String>) -> Self {
            self.service_type = service_type.into();
            self
        }
    }

    fn discovered_from(info: &ServiceInfo, service_type: &str) -> Option<Discovered> {
        let ip = info
            .get_addresses()
            .iter()
            .copied()
            .min_by_key(|ip| matches!(ip, IpAddr::V6(_)))?;
        let id = service_identity(
            info.get_property_val_str("mac"),
            info.get_fullname(),
            service_type,
        )?;
        Some(Discovered::new(id, service_address(ip, info.get_port())))
    }

    #[async_trait]
    impl DiscoveryScanner for MdnsScanner {
        async fn scan(&self) -> Result<DiscoveryStream, ScanError> {
            let daemon = ServiceDaemon::new().map_err(|e| ScanError::Daemon(e.to_string()))?;
            let receiver = daemon
                .browse(&self.service_type)
                .map_err(|e| ScanError::NetworkUnavailable(e.to_string()))?;
            debug!("Browsing {} for {:?}", self.service_type, self.duration);

            let (tx, rx) = mpsc::channel(32);
            let deadline = Instant::now() + self.duration;
            let service_type = self.service_type.clone();

            // The daemon's receiver is blocking; drain it off the runtime.
            tokio::task::spawn_blocking(move || {
                let mut seen = HashSet::new();
                loop {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        break;
                    }
                    match receiver.recv_timeout(remaining) {
                        Ok(ServiceEvent::ServiceResolved(info)) => {
                            let Some(found) = discovered_from(&info, &service_type) else {
                                debug!("Ignoring unusable service {}", info.get_fullname());
                                continue;
                            };
                            if seen.insert(found.id.clone()) && tx.blocking_send(found).is_err() {
                                break;
                            }
                        }
                        Ok(_) => {}
                        Err(_) => break,
                    }
                }

                info!("mDNS browse finished, {} device(s) resolved", seen.len());
                if let Err(e) = daemon.stop_browse(&service_type) {
                    debug!("Failed to stop mDNS browse: {}", e);
                }
                if let Err(e) = daemon.shutdown() {
                    warn!("Failed to shut down mDNS daemon: {}", e);
                }
            });

            Ok(Box::pin(stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|found| (found, rx))
            })))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockClient, MockScanner};
    use std::net::{Ipv4Addr, Ipv6Addr};

    fn id(raw: &str) -> DeviceId {
        DeviceId::new(raw).unwrap()
    }

    #[test]
    fn test_service_address() {
        let v4 = IpAddr::V4(Ipv4Addr::new(192, 168, 1, 40));
        assert_eq!(service_address(v4, 80), "192.168.1.40");
        assert_eq!(service_address(v4, 8080), "192.168.1.40:8080");
        let v6 = IpAddr::V6(Ipv6Addr::LOCALHOST);
        assert_eq!(service_address(v6, 8080), "[::1]:8080");
    }

    #[test]
    fn test_service_identity_prefers_mac() {
        let from_mac = service_identity(
            Some("a8032a6c11f0"),
            "wled-kitchen._wled._tcp.local.",
            "_wled._tcp.local.",
        );
        assert_eq!(from_mac, Some(id("a8032a6c11f0")));

        let from_name = service_identity(None, "WLED-Kitchen._wled._tcp.local.", "_wled._tcp.local.");
        assert_eq!(from_name, Some(id("wled-kitchen")));

        let blank_mac = service_identity(Some(""), "Porch._wled._tcp.local.", "_wled._tcp.local.");
        assert_eq!(blank_mac, Some(id("porch")));
    }

    #[tokio::test]
    async fn test_address_scanner_skips_unreachable() {
        let client = Arc::new(MockClient::new());
        client.set_online("10.0.0.1", id("000000000001"));
        let scanner = AddressScanner::new(
            ["10.0.0.1".to_string(), "10.0.0.2".to_string()],
            client.clone(),
        );

        let found: Vec<_> = scanner.scan().await.unwrap().collect().await;
        assert_eq!(found, vec![Discovered::new(id("000000000001"), "10.0.0.1")]);
        assert_eq!(client.call_count(), 2);
    }

    #[tokio::test]
    async fn test_chain_concatenates_and_tolerates_one_failure() {
        let good = Arc::new(MockScanner::with_devices([Discovered::new(
            id("000000000001"),
            "10.0.0.1",
        )]));
        let bad = Arc::new(MockScanner::new());
        bad.set_failure(Some(ScanError::Daemon("socket error".to_string())));

        let chain = ChainScanner::new().with(bad.clone()).with(good);
        let found: Vec<_> = chain.scan().await.unwrap().collect().await;
        assert_eq!(found.len(), 1);

        let all_bad = ChainScanner::new().with(bad);
        assert!(matches!(
            all_bad.scan().await,
            Err(ScanError::AllFailed(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_chain_finds_nothing() {
        let chain = ChainScanner::new();
        assert!(chain.is_empty());
        let found: Vec<_> = chain.scan().await.unwrap().collect().await;
        assert!(found.is_empty());
    }
}
