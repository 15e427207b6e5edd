//! Refresh coordination.
//!
//! [`RefreshCoordinator`] is the only writer of the [`Registry`]. It decides
//! when each device is refreshed, makes sure at most one refresh per device
//! is in flight, bounds how many run at once and turns results into registry
//! updates.
//!
//! # Coalescing
//!
//! Every refresh first claims the device's identity in a shared in-flight
//! set. Periodic, manual and scan-triggered refreshes all use the same set,
//! so a request for a device that is already being refreshed is dropped and
//! reported as [`RefreshOutcome::AlreadyRefreshing`]. Requests are never
//! queued. The claim is released by a drop guard, so a task that panics or
//! is cancelled cannot leave a device stuck in flight.
//!
//! # Failures
//!
//! A failed refresh is state, not an error: the device goes offline and
//! keeps its last-known attributes. It is retried on the next periodic tick.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use wled_core::{CoordinatorConfig, MockClient, RefreshCoordinator, RefreshOutcome, Registry};
//! use wled_types::DeviceId;
//!
//! # async fn example() -> wled_core::Result<()> {
//! let registry = Arc::new(Registry::in_memory());
//! let client = Arc::new(MockClient::new());
//! let id = DeviceId::new("aabbccddeeff")?;
//! client.set_online("10.0.0.5", id.clone());
//!
//! let coordinator = RefreshCoordinator::new(registry, client, CoordinatorConfig::default());
//! coordinator.add_device("10.0.0.5").await?;
//!
//! let report = coordinator.refresh_all().await;
//! assert_eq!(report.get(&id), Some(&RefreshOutcome::Online));
//! # Ok(())
//! # }
//! ```

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures::StreamExt;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tracing::{debug, error, info, warn};

use wled_types::{Device, DeviceId};

use crate::error::{ClientError, Error, Result};
use crate::events::{EventDispatcher, RegistryEvent};
use crate::registry::Registry;
use crate::traits::{DeviceClient, DiscoveryScanner};

/// Consecutive failures logged at `warn` before a device goes quiet.
const LOUD_FAILURES: u32 = 3;

/// Configuration for the refresh coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Maximum number of device requests running at the same time.
    pub max_in_flight: usize,
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 4,
            event_capacity: 100,
        }
    }
}

impl CoordinatorConfig {
    /// Check the configuration for values the coordinator cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_in_flight == 0 {
            return Err(Error::invalid_config("max_in_flight must be at least 1"));
        }
        if self.event_capacity == 0 {
            return Err(Error::invalid_config("event_capacity must be at least 1"));
        }
        Ok(())
    }
}

/// Result of refreshing one device.
#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    /// The device answered; its attributes were replaced.
    Online,
    /// The device did not answer properly; it is now offline.
    Offline(ClientError),
    /// A refresh for this device was already in flight; nothing was sent.
    AlreadyRefreshing,
    /// No device with this identity is registered.
    NotFound,
    /// The device was deleted while its refresh was in flight; the result
    /// was dropped.
    Removed,
    /// The device answered but its new attributes could not be stored. It is
    /// marked online with its previous attributes.
    PersistenceFailed(String),
}

impl RefreshOutcome {
    /// Whether the device answered.
    pub fn is_online(&self) -> bool {
        matches!(self, Self::Online | Self::PersistenceFailed(_))
    }

    /// Whether the device was actually contacted by this request.
    pub fn was_attempted(&self) -> bool {
        matches!(
            self,
            Self::Online | Self::Offline(_) | Self::Removed | Self::PersistenceFailed(_)
        )
    }
}

/// Per-device outcomes of one refresh request.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RefreshReport {
    outcomes: BTreeMap<DeviceId, RefreshOutcome>,
}

impl RefreshReport {
    /// Outcome for one device.
    pub fn get(&self, id: &DeviceId) -> Option<&RefreshOutcome> {
        self.outcomes.get(id)
    }

    /// All outcomes in identity order.
    pub fn iter(&self) -> impl Iterator<Item = (&DeviceId, &RefreshOutcome)> {
        self.outcomes.iter()
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Number of devices that answered.
    pub fn online_count(&self) -> usize {
        self.outcomes.values().filter(|o| o.is_online()).count()
    }

    /// Number of devices that failed to answer.
    pub fn offline_count(&self) -> usize {
        self.outcomes
            .values()
            .filter(|o| matches!(o, RefreshOutcome::Offline(_)))
            .count()
    }

    fn insert(&mut self, id: DeviceId, outcome: RefreshOutcome) {
        self.outcomes.insert(id, outcome);
    }
}

/// Result of a scan followed by a refresh.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanReport {
    /// Distinct devices the scan reported.
    pub discovered: usize,
    /// Devices that were not registered before the scan.
    pub new: Vec<DeviceId>,
    /// Outcomes of the refresh that followed.
    pub refresh: RefreshReport,
}

type InFlight = Arc<Mutex<HashSet<DeviceId>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Exclusive right to refresh one device.
///
/// Dropping the claim releases the identity. If the refresh never settled
/// (the task was cancelled or panicked), the device's refreshing flag is
/// cleared in the background.
struct RefreshClaim {
    id: DeviceId,
    in_flight: InFlight,
    registry: Arc<Registry>,
    settled: bool,
}

impl RefreshClaim {
    fn try_acquire(in_flight: &InFlight, registry: &Arc<Registry>, id: &DeviceId) -> Option<Self> {
        if !lock(in_flight).insert(id.clone()) {
            return None;
        }
        Some(Self {
            id: id.clone(),
            in_flight: Arc::clone(in_flight),
            registry: Arc::clone(registry),
            settled: false,
        })
    }

    fn settle(mut self) {
        self.settled = true;
    }
}

impl Drop for RefreshClaim {
    fn drop(&mut self) {
        lock(&self.in_flight).remove(&self.id);
        if self.settled {
            return;
        }

        let id = self.id.clone();
        let in_flight = Arc::clone(&self.in_flight);
        let registry = Arc::clone(&self.registry);
        if let Ok(handle) = Handle::try_current() {
            handle.spawn(async move {
                // A newer refresh owns the flag now.
                if lock(&in_flight).contains(&id) {
                    return;
                }
                registry.set_refreshing(&id, false).await;
            });
        } else {
            warn!("No tokio runtime available to clear refresh state of {}", id);
        }
    }
}

/// Coordinates discovery and refreshes over a shared registry.
pub struct RefreshCoordinator {
    registry: Arc<Registry>,
    client: Arc<dyn DeviceClient>,
    scanner: Option<Arc<dyn DiscoveryScanner>>,
    in_flight: InFlight,
    permits: Semaphore,
    failures: Mutex<HashMap<DeviceId, u32>>,
    events: EventDispatcher,
    config: CoordinatorConfig,
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("config", &self.config)
            .field("in_flight", &lock(&self.in_flight).len())
            .field("has_scanner", &self.scanner.is_some())
            .finish()
    }
}

impl RefreshCoordinator {
    /// Create a coordinator without a discovery scanner.
    ///
    /// A `max_in_flight` of zero is raised to one.
    pub fn new(
        registry: Arc<Registry>,
        client: Arc<dyn DeviceClient>,
        config: CoordinatorConfig,
    ) -> Self {
        let max_in_flight = config.max_in_flight.max(1);
        Self {
            registry,
            client,
            scanner: None,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            permits: Semaphore::new(max_in_flight),
            failures: Mutex::new(HashMap::new()),
            events: EventDispatcher::new(config.event_capacity),
            config: CoordinatorConfig {
                max_in_flight,
                ..config
            },
        }
    }

    /// Use `scanner` for [`scan_and_refresh`](Self::scan_and_refresh).
    pub fn with_scanner(mut self, scanner: Arc<dyn DiscoveryScanner>) -> Self {
        self.scanner = Some(scanner);
        self
    }

    /// The registry this coordinator writes to.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Get the event dispatcher.
    pub fn events(&self) -> &EventDispatcher {
        &self.events
    }

    /// Get the configuration.
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Number of refreshes currently claimed.
    pub fn in_flight_count(&self) -> usize {
        lock(&self.in_flight).len()
    }

    /// Refresh exactly the given devices and wait for all of them.
    ///
    /// Duplicate identities in `ids` are refreshed once. Devices already in
    /// flight are not refreshed again.
    pub async fn refresh_devices(&self, ids: impl IntoIterator<Item = DeviceId>) -> RefreshReport {
        let ids: BTreeSet<DeviceId> = ids.into_iter().collect();
        let mut report = RefreshReport::default();
        let mut claims = Vec::new();

        for id in ids {
            match self.begin(&id).await {
                Ok(claim) => claims.push(claim),
                Err(outcome) => report.insert(id, outcome),
            }
        }

        let results = join_all(claims.into_iter().map(|claim| async move {
            let id = claim.id.clone();
            (id, self.run(claim).await)
        }))
        .await;

        for (id, outcome) in results {
            report.insert(id, outcome);
        }
        report
    }

    /// Refresh every known device and wait for all of them.
    pub async fn refresh_all(&self) -> RefreshReport {
        let ids = self.registry.ids().await;
        self.refresh_devices(ids).await
    }

    /// Start a background refresh of every known device not already in
    /// flight.
    ///
    /// Returns as soon as the work is spawned, with the number of refreshes
    /// started. Must be called from within a tokio runtime.
    pub async fn trigger_periodic(self: &Arc<Self>) -> usize {
        let mut started = 0;
        for id in self.registry.ids().await {
            let Ok(claim) = self.begin(&id).await else {
                continue;
            };
            let coordinator = Arc::clone(self);
            tokio::spawn(async move {
                coordinator.run(claim).await;
            });
            started += 1;
        }
        debug!("Periodic refresh started {} task(s)", started);
        started
    }

    /// Run a discovery scan, merge its results, then refresh every known
    /// device.
    ///
    /// All merges complete before any refresh of this cycle starts. A scan
    /// that cannot start is returned as [`Error::Scan`] and leaves the
    /// registry untouched.
    pub async fn scan_and_refresh(&self) -> Result<ScanReport> {
        let scanner = self
            .scanner
            .as_ref()
            .ok_or_else(|| Error::invalid_config("no discovery scanner configured"))?;

        self.events.send(RegistryEvent::ScanStarted);
        let mut stream = match scanner.scan().await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("Discovery scan failed: {}", e);
                self.events.send(RegistryEvent::ScanFailed {
                    error: e.to_string(),
                });
                return Err(e.into());
            }
        };

        let mut seen = HashSet::new();
        let mut new = Vec::new();
        while let Some(found) = stream.next().await {
            if !seen.insert(found.id.clone()) {
                continue;
            }
            match self.registry.merge_discovered(&found.id, &found.address).await {
                Ok(is_new) => {
                    if is_new {
                        new.push(found.id.clone());
                    }
                    self.events.send(RegistryEvent::Discovered {
                        id: found.id,
                        address: found.address,
                        new: is_new,
                    });
                }
                Err(e) => warn!("Could not record discovered device {}: {}", found.id, e),
            }
        }

        info!(
            "Scan found {} device(s), {} new",
            seen.len(),
            new.len()
        );
        self.events.send(RegistryEvent::ScanCompleted {
            found: seen.len(),
            new: new.len(),
        });

        let refresh = self.refresh_all().await;
        Ok(ScanReport {
            discovered: seen.len(),
            new,
            refresh,
        })
    }

    /// Add the device answering at `address`.
    ///
    /// The device is probed first; its reported identity becomes the
    /// registry key. An existing device with that identity is updated and
    /// keeps its user settings.
    pub async fn add_device(&self, address: &str) -> Result<Device> {
        let address = normalize_address(address)?;

        let report = self.client.probe(&address).await.map_err(|source| Error::Probe {
            address: address.clone(),
            source,
        })?;
        let Some(id) = report.id else {
            return Err(Error::Probe {
                source: ClientError::protocol(&address, "response carried no device identity"),
                address,
            });
        };

        let device = self
            .registry
            .upsert_refreshed(id.clone(), &address, report.attributes, OffsetDateTime::now_utc())
            .await?;
        lock(&self.failures).remove(&id);
        info!("Added {} ({}) at {}", device.display_name(), id, address);

        self.events.send(RegistryEvent::Added {
            id: id.clone(),
            address,
        });
        self.events.send(RegistryEvent::Online { id });
        Ok(device)
    }

    /// Delete a device. A refresh still in flight for it is dropped when it
    /// completes.
    pub async fn delete_device(&self, id: &DeviceId) -> Result<Device> {
        let removed = self.registry.delete(id).await?;
        lock(&self.failures).remove(id);
        self.events.send(RegistryEvent::Removed { id: id.clone() });
        Ok(removed)
    }

    /// Hide or unhide a device.
    pub async fn set_hidden(&self, id: &DeviceId, hidden: bool) -> Result<Device> {
        let device = self.registry.set_hidden(id, hidden).await?;
        self.events.send(RegistryEvent::Updated { id: id.clone() });
        Ok(device)
    }

    /// Set or clear a device's display name.
    pub async fn rename_device(&self, id: &DeviceId, name: Option<String>) -> Result<Device> {
        let device = self.registry.rename(id, name).await?;
        self.events.send(RegistryEvent::Updated { id: id.clone() });
        Ok(device)
    }

    /// Claim a device and mark it refreshing.
    async fn begin(&self, id: &DeviceId) -> std::result::Result<RefreshClaim, RefreshOutcome> {
        if !self.registry.contains(id).await {
            return Err(RefreshOutcome::NotFound);
        }
        let Some(claim) = RefreshClaim::try_acquire(&self.in_flight, &self.registry, id) else {
            debug!("Refresh of {} already in flight, coalescing", id);
            return Err(RefreshOutcome::AlreadyRefreshing);
        };
        if !self.registry.set_refreshing(id, true).await {
            return Err(RefreshOutcome::NotFound);
        }
        self.events.send(RegistryEvent::RefreshStarted { id: id.clone() });
        Ok(claim)
    }

    /// Refresh a claimed device and apply the result.
    async fn run(&self, claim: RefreshClaim) -> RefreshOutcome {
        let outcome = self.refresh_claimed(&claim.id).await;
        claim.settle();
        outcome
    }

    async fn refresh_claimed(&self, id: &DeviceId) -> RefreshOutcome {
        let Ok(_permit) = self.permits.acquire().await else {
            // Only a closed semaphore fails, and this one is never closed.
            return RefreshOutcome::Removed;
        };

        // Read after waiting for a permit so a rediscovered address is used.
        let Some(device) = self.registry.get(id).await else {
            return RefreshOutcome::Removed;
        };

        let result = match self.client.refresh(&device).await {
            Ok(report) => match report.id {
                Some(reported) if &reported != id => Err(ClientError::protocol(
                    &device.address,
                    format!("device reported identity {} instead of {}", reported, id),
                )),
                _ => Ok(report.attributes),
            },
            Err(e) => Err(e),
        };

        match result {
            Ok(attributes) => {
                match self
                    .registry
                    .apply_refresh(id, attributes, OffsetDateTime::now_utc())
                    .await
                {
                    Ok(Some(_)) => {
                        self.record_success(id);
                        self.events.send(RegistryEvent::Online { id: id.clone() });
                        RefreshOutcome::Online
                    }
                    Ok(None) => RefreshOutcome::Removed,
                    Err(e) => {
                        error!("Failed to store refresh of {}: {}", id, e);
                        if self.registry.settle_online(id).await.is_none() {
                            return RefreshOutcome::Removed;
                        }
                        self.record_success(id);
                        self.events.send(RegistryEvent::Online { id: id.clone() });
                        RefreshOutcome::PersistenceFailed(e.to_string())
                    }
                }
            }
            Err(e) => {
                if self.registry.mark_offline(id).await.is_none() {
                    return RefreshOutcome::Removed;
                }
                self.record_failure(id, &e);
                self.events.send(RegistryEvent::Offline {
                    id: id.clone(),
                    error: e.to_string(),
                });
                RefreshOutcome::Offline(e)
            }
        }
    }

    fn record_success(&self, id: &DeviceId) {
        if let Some(failures) = lock(&self.failures).remove(id) {
            info!("{} is back online after {} failed refresh(es)", id, failures);
        }
    }

    fn record_failure(&self, id: &DeviceId, e: &ClientError) {
        let consecutive = {
            let mut failures = lock(&self.failures);
            let count = failures.entry(id.clone()).or_insert(0);
            *count += 1;
            *count
        };

        if consecutive <= LOUD_FAILURES {
            warn!(
                "Failed to refresh {}: {} (attempt {})",
                id, e, consecutive
            );
        } else if consecutive == LOUD_FAILURES + 1 {
            error!(
                "Device {} has failed {} consecutive refreshes, suppressing further warnings",
                id, consecutive
            );
        } else {
            debug!("Failed to refresh {}: {}", id, e);
        }
    }
}

/// Trim an address and strip a URL scheme or trailing path.
fn normalize_address(address: &str) -> Result<String> {
    let trimmed = address.trim();
    let without_scheme = trimmed
        .strip_prefix("http://")
        .or_else(|| trimmed.strip_prefix("https://"))
        .unwrap_or(trimmed);
    let host = without_scheme
        .split('/')
        .next()
        .unwrap_or_default()
        .trim();

    if host.is_empty() || host.contains(char::is_whitespace) {
        return Err(Error::InvalidAddress(address.to_string()));
    }
    Ok(host.to_string())
}
