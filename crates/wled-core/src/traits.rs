//! Collaborator traits for the network side of the registry.
//!
//! The coordinator talks to the network only through these two traits.
//! Real implementations live in [`crate::http`] and [`crate::discovery`];
//! scriptable ones for tests live in [`crate::mock`].
//!
//! # Example
//!
//! ```
//! use wled_core::{DeviceClient, MockClient};
//! use wled_types::DeviceId;
//!
//! # async fn example() -> Result<(), wled_core::ClientError> {
//! let client = MockClient::new();
//! client.set_online("10.0.0.5", DeviceId::new("aabbccddeeff").unwrap());
//!
//! let report = client.probe("10.0.0.5").await?;
//! assert_eq!(report.id.unwrap().as_str(), "aabbccddeeff");
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use futures::stream::BoxStream;

use wled_types::{Device, DeviceAttributes, DeviceId};

use crate::error::{ClientError, ScanError};

/// What a device said about itself in response to a status request.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeviceReport {
    /// Identity reported by the device, if the response carried one.
    pub id: Option<DeviceId>,
    /// Attributes parsed from the response.
    pub attributes: DeviceAttributes,
}

impl DeviceReport {
    /// Create a report carrying an identity.
    pub fn new(id: DeviceId, attributes: DeviceAttributes) -> Self {
        Self {
            id: Some(id),
            attributes,
        }
    }
}

/// One candidate yielded by a discovery scan.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Discovered {
    pub id: DeviceId,
    pub address: String,
}

impl Discovered {
    pub fn new(id: DeviceId, address: impl Into<String>) -> Self {
        Self {
            id,
            address: address.into(),
        }
    }
}

/// Sends status requests to a device and parses the response.
///
/// Implementations perform only the network call: they never touch the
/// registry or the store, and they enforce their own per-request timeout,
/// surfacing it as [`ClientError::Timeout`].
#[async_trait]
pub trait DeviceClient: Send + Sync {
    /// Refresh a known device.
    ///
    /// The default sends a probe to the device's last-seen address.
    async fn refresh(&self, device: &Device) -> Result<DeviceReport, ClientError> {
        self.probe(&device.address).await
    }

    /// Query whatever device answers at `address`.
    async fn probe(&self, address: &str) -> Result<DeviceReport, ClientError>;
}

/// A lazy, finite sequence of discovery results.
pub type DiscoveryStream = BoxStream<'static, Discovered>;

/// Searches the network for devices.
#[async_trait]
pub trait DiscoveryScanner: Send + Sync {
    /// Start a scan.
    ///
    /// Failing to start (no network, backend down) is an error; the returned
    /// stream itself ends when the scan window closes.
    async fn scan(&self) -> Result<DiscoveryStream, ScanError>;
}
