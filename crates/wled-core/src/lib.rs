//! Device registry and refresh coordinator for WLED lighting controllers.
//!
//! This crate keeps track of known WLED controllers and their online/offline
//! state, refreshes them over the network without overlapping or starving
//! requests, merges discovery results, and serves consistent snapshots to
//! front ends.
//!
//! # Features
//!
//! - **Registry**: a write-through cache over a [`wled_store::DeviceStore`];
//!   durable writes happen before anything becomes visible
//! - **Coalesced refreshes**: at most one request per device in flight,
//!   bounded overall concurrency
//! - **Discovery**: mDNS browsing, fixed address lists, or both
//! - **Snapshots**: online/offline lists with a hidden-device filter and a
//!   choice of sort order
//! - **Events**: a broadcast channel of [`RegistryEvent`]s
//!
//! # Cargo features
//!
//! | Feature | Enables |
//! |---------|---------|
//! | `http` | [`WledHttpClient`], the WLED JSON API client |
//! | `mdns` | [`MdnsScanner`], mDNS discovery of `_wled._tcp` services |
//!
//! # Quick Start
//!
//! With the `http` feature enabled:
//!
//! ```ignore
//! use std::sync::Arc;
//! use std::time::Duration;
//! use wled_core::{
//!     CoordinatorConfig, ListFilter, RefreshCoordinator, RefreshScheduler, Registry,
//!     WledHttpClient,
//! };
//! use wled_store::SqliteStore;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let registry = Arc::new(Registry::open(Arc::new(SqliteStore::open_default()?))?);
//!     let client = Arc::new(WledHttpClient::new(Duration::from_secs(5))?);
//!     let coordinator = Arc::new(RefreshCoordinator::new(
//!         registry.clone(),
//!         client,
//!         CoordinatorConfig::default(),
//!     ));
//!
//!     coordinator.add_device("192.168.1.40").await?;
//!
//!     let mut scheduler = RefreshScheduler::new(coordinator.clone(), Duration::from_secs(30));
//!     scheduler.start();
//!
//!     let snapshot = registry.list().await;
//!     for device in snapshot.online(&ListFilter::default()) {
//!         println!("{} at {}", device.display_name(), device.address);
//!     }
//!
//!     scheduler.stop().await;
//!     Ok(())
//! }
//! ```

pub mod coordinator;
pub mod discovery;
pub mod error;
pub mod events;
#[cfg(feature = "http")]
pub mod http;
pub mod mock;
pub mod registry;
pub mod scheduler;
pub mod snapshot;
pub mod traits;
pub mod wled;

pub use coordinator::{
    CoordinatorConfig, RefreshCoordinator, RefreshOutcome, RefreshReport, ScanReport,
};
pub use discovery::{AddressScanner, ChainScanner};
#[cfg(feature = "mdns")]
pub use discovery::{MdnsScanner, WLED_SERVICE_TYPE};
pub use error::{ClientError, Error, Result, ScanError};
pub use events::{EventDispatcher, EventReceiver, EventSender, RegistryEvent};
#[cfg(feature = "http")]
pub use http::WledHttpClient;
pub use mock::{MockClient, MockScanner};
pub use registry::Registry;
pub use scheduler::{DEFAULT_REFRESH_INTERVAL, RefreshScheduler};
pub use snapshot::{ListFilter, RegistrySnapshot, SortOrder, compute_offline, compute_online};
pub use traits::{DeviceClient, DeviceReport, Discovered, DiscoveryScanner, DiscoveryStream};

// Re-export from wled-types
pub use wled_types::{Device, DeviceAttributes, DeviceId, DeviceState, Reachability, Rgb};
