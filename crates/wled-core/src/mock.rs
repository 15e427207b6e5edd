//! Scriptable network collaborators for testing.
//!
//! [`MockClient`] answers per address with scripted reports or errors and
//! records how it was called. [`MockScanner`] yields a scripted list of
//! devices or fails on demand.
//!
//! # Features
//!
//! - **Failure injection**: script a [`ClientError`] for any address, or make
//!   a scan fail with a [`ScanError`]
//! - **Latency simulation**: add a delay to every request
//! - **Call accounting**: total and per-address call counts, plus the peak
//!   number of requests that were running at the same time

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream;

use wled_types::{DeviceAttributes, DeviceId};

use crate::error::{ClientError, ScanError};
use crate::traits::{DeviceClient, DeviceReport, Discovered, DiscoveryScanner, DiscoveryStream};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A mock [`DeviceClient`].
///
/// Addresses without a scripted response are unreachable.
///
/// # Example
///
/// ```
/// use wled_core::{ClientError, DeviceClient, MockClient};
/// use wled_types::DeviceId;
///
/// #[tokio::main]
/// async fn main() {
///     let client = MockClient::new();
///     client.set_online("10.0.0.5", DeviceId::new("aabbccddeeff").unwrap());
///     client.set_failure("10.0.0.6", ClientError::protocol("10.0.0.6", "HTTP 500"));
///
///     assert!(client.probe("10.0.0.5").await.is_ok());
///     assert!(client.probe("10.0.0.6").await.is_err());
///     assert!(client.probe("10.0.0.7").await.is_err());
///     assert_eq!(client.call_count(), 3);
/// }
/// ```
#[derive(Default)]
pub struct MockClient {
    responses: Mutex<HashMap<String, Result<DeviceReport, ClientError>>>,
    calls: Mutex<HashMap<String, u32>>,
    total_calls: AtomicU32,
    /// Simulated request latency in milliseconds (0 = no delay).
    latency_ms: AtomicU64,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl std::fmt::Debug for MockClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockClient")
            .field("scripted", &lock(&self.responses).len())
            .field("total_calls", &self.total_calls.load(Ordering::Relaxed))
            .field("latency_ms", &self.latency_ms.load(Ordering::Relaxed))
            .finish()
    }
}

impl MockClient {
    /// Create a client where every address is unreachable.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer at `address` as device `id` with a default set of attributes.
    pub fn set_online(&self, address: impl Into<String>, id: DeviceId) {
        let raw = id.as_str();
        let suffix = raw.get(raw.len().saturating_sub(4)..).unwrap_or(raw);
        let attributes = DeviceAttributes {
            name: Some(format!("WLED-{}", suffix)),
            firmware: Some("0.14.4".to_string()),
            brand: Some("WLED".to_string()),
            led_count: Some(30),
            is_on: Some(true),
            brightness: Some(128),
            ..Default::default()
        };
        self.set_report(address, DeviceReport::new(id, attributes));
    }

    /// Answer at `address` with `report`.
    pub fn set_report(&self, address: impl Into<String>, report: DeviceReport) {
        lock(&self.responses).insert(address.into(), Ok(report));
    }

    /// Fail every request to `address` with `error`.
    pub fn set_failure(&self, address: impl Into<String>, error: ClientError) {
        lock(&self.responses).insert(address.into(), Err(error));
    }

    /// Make `address` unreachable again.
    pub fn clear(&self, address: &str) {
        lock(&self.responses).remove(address);
    }

    /// Delay every request by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    /// Total number of requests made.
    pub fn call_count(&self) -> u32 {
        self.total_calls.load(Ordering::SeqCst)
    }

    /// Number of requests made to `address`.
    pub fn calls_to(&self, address: &str) -> u32 {
        lock(&self.calls).get(address).copied().unwrap_or(0)
    }

    /// Highest number of requests that were running at the same time.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// Reset call counters and the concurrency gauge.
    pub fn reset_counts(&self) {
        lock(&self.calls).clear();
        self.total_calls.store(0, Ordering::SeqCst);
        self.peak.store(0, Ordering::SeqCst);
    }
}

/// Decrements the active-request gauge even if the request is cancelled.
struct ActiveGuard<'a>(&'a AtomicUsize);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl DeviceClient for MockClient {
    async fn probe(&self, address: &str) -> Result<DeviceReport, ClientError> {
        self.total_calls.fetch_add(1, Ordering::SeqCst);
        *lock(&self.calls).entry(address.to_string()).or_insert(0) += 1;

        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(active, Ordering::SeqCst);
        let _active = ActiveGuard(&self.active);

        let latency = self.latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        // Looked up after the delay so a test can change the script mid-flight.
        let response = lock(&self.responses).get(address).cloned();
        response.unwrap_or_else(|| Err(ClientError::unreachable(address, "no route to host")))
    }
}

/// A mock [`DiscoveryScanner`].
#[derive(Default)]
pub struct MockScanner {
    devices: Mutex<Vec<Discovered>>,
    failure: Mutex<Option<ScanError>>,
    scans: AtomicU32,
}

impl std::fmt::Debug for MockScanner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockScanner")
            .field("devices", &lock(&self.devices).len())
            .field("scans", &self.scans.load(Ordering::Relaxed))
            .finish()
    }
}

impl MockScanner {
    /// Create a scanner that finds nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a scanner that finds `devices`.
    pub fn with_devices(devices: impl IntoIterator<Item = Discovered>) -> Self {
        let scanner = Self::new();
        scanner.set_devices(devices);
        scanner
    }

    /// Replace the devices every scan finds.
    pub fn set_devices(&self, devices: impl IntoIterator<Item = Discovered>) {
        *lock(&self.devices) = devices.into_iter().collect();
    }

    /// Make every scan fail with `error`, or succeed again with `None`.
    pub fn set_failure(&self, error: Option<ScanError>) {
        *lock(&self.failure) = error;
    }

    /// Number of scans started.
    pub fn scan_count(&self) -> u32 {
        self.scans.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DiscoveryScanner for MockScanner {
    async fn scan(&self) -> Result<DiscoveryStream, ScanError> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = lock(&self.failure).clone() {
            return Err(error);
        }
        let devices = lock(&self.devices).clone();
        Ok(Box::pin(stream::iter(devices)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::sync::Arc;

    fn id(raw: &str) -> DeviceId {
        DeviceId::new(raw).unwrap()
    }

    #[tokio::test]
    async fn test_unscripted_address_is_unreachable() {
        let client = MockClient::new();
        let err = client.probe("10.0.0.1").await.unwrap_err();
        assert!(matches!(err, ClientError::Unreachable { .. }));
        assert_eq!(client.calls_to("10.0.0.1"), 1);
    }

    #[tokio::test]
    async fn test_set_online_reports_identity() {
        let client = MockClient::new();
        client.set_online("10.0.0.1", id("aabbccddeeff"));
        let report = client.probe("10.0.0.1").await.unwrap();
        assert_eq!(report.id, Some(id("aabbccddeeff")));
        assert_eq!(report.attributes.name.as_deref(), Some("WLED-eeff"));

        client.clear("10.0.0.1");
        assert!(client.probe("10.0.0.1").await.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_peak_concurrency_gauge() {
        let client = Arc::new(MockClient::new());
        client.set_latency(Duration::from_millis(100));

        let tasks: Vec<_> = (0..3)
            .map(|i| {
                let client = Arc::clone(&client);
                tokio::spawn(async move { client.probe(&format!("10.0.0.{i}")).await })
            })
            .collect();
        for task in tasks {
            let _ = task.await;
        }

        assert_eq!(client.peak_concurrency(), 3);
        assert_eq!(client.call_count(), 3);
        client.reset_counts();
        assert_eq!(client.call_count(), 0);
    }

    #[tokio::test]
    async fn test_scanner_yields_devices_then_fails() {
        let scanner = MockScanner::with_devices([Discovered::new(id("aabbccddeeff"), "10.0.0.1")]);
        let found: Vec<_> = scanner.scan().await.unwrap().collect().await;
        assert_eq!(found.len(), 1);

        scanner.set_failure(Some(ScanError::NetworkUnavailable("down".to_string())));
        assert!(scanner.scan().await.is_err());
        assert_eq!(scanner.scan_count(), 2);
    }
}
