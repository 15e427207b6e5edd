//! Error types for wled-core.
//!
//! Errors fall into two groups with different propagation rules.
//!
//! ## Absorbed into device state
//!
//! [`ClientError`] describes a failed refresh of one device. The coordinator
//! never returns it to callers of the refresh operations; it marks the device
//! offline, keeps its last-known attributes and reports the failure as a
//! per-device [`RefreshOutcome`](crate::RefreshOutcome).
//!
//! | Error | Meaning |
//! |-------|---------|
//! | [`ClientError::Unreachable`] | Connection refused, no route, DNS failure |
//! | [`ClientError::Timeout`] | The client's per-request deadline elapsed |
//! | [`ClientError::Protocol`] | Bad status, malformed body, identity mismatch |
//!
//! ## Surfaced to callers
//!
//! [`Error`] is returned by operations whose failure the caller must see:
//!
//! | Error | Meaning | Registry effect |
//! |-------|---------|-----------------|
//! | [`Error::NotFound`] | Unknown identity | none |
//! | [`Error::Persistence`] | Durable write failed | in-memory state unchanged |
//! | [`Error::Scan`] | Discovery failed | none |
//! | [`Error::Probe`] | Adding a device by address failed | none |
//!
//! Nothing here is fatal to the process. A persistence failure while
//! loading the registry at startup is the one case a front end should treat
//! as fatal.

use std::time::Duration;

use thiserror::Error;

use wled_types::DeviceId;

/// Failure of a single request to a device.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ClientError {
    /// The device could not be reached.
    #[error("{address} unreachable: {reason}")]
    Unreachable { address: String, reason: String },

    /// The request did not complete within the client's timeout.
    #[error("request to {address} timed out after {duration:?}")]
    Timeout { address: String, duration: Duration },

    /// The device answered with something that is not a valid response.
    #[error("protocol error from {address}: {message}")]
    Protocol { address: String, message: String },
}

impl ClientError {
    /// Create an unreachable error.
    pub fn unreachable(address: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Unreachable {
            address: address.into(),
            reason: reason.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(address: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            address: address.into(),
            duration,
        }
    }

    /// Create a protocol error.
    pub fn protocol(address: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Protocol {
            address: address.into(),
            message: message.into(),
        }
    }

    /// Short, stable name of the failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Unreachable { .. } => "unreachable",
            Self::Timeout { .. } => "timeout",
            Self::Protocol { .. } => "protocol",
        }
    }
}

/// Failure of a discovery scan.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ScanError {
    /// No usable network interface.
    #[error("network unavailable: {0}")]
    NetworkUnavailable(String),

    /// The discovery backend failed to start or browse.
    #[error("discovery backend error: {0}")]
    Daemon(String),

    /// Every configured discovery source failed.
    #[error("all discovery sources failed: {0}")]
    AllFailed(String),
}

/// Errors returned by registry and coordinator operations.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// No device with this identity is registered.
    #[error("Device not found: {0}")]
    NotFound(DeviceId),

    /// The durable write or load failed; in-memory state was not changed.
    #[error("Persistence error: {0}")]
    Persistence(#[from] wled_store::Error),

    /// Discovery failed; the registry is unaffected.
    #[error("Discovery failed: {0}")]
    Scan(#[from] ScanError),

    /// A device could not be added because probing its address failed.
    #[error("Could not add device at {address}: {source}")]
    Probe {
        address: String,
        #[source]
        source: ClientError,
    },

    /// An identity string could not be parsed.
    #[error("Invalid device identity: {0}")]
    InvalidIdentity(#[from] wled_types::ParseError),

    /// An address was empty or malformed.
    #[error("Invalid device address: {0:?}")]
    InvalidAddress(String),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl Error {
    /// Create a not-found error.
    pub fn not_found(id: &DeviceId) -> Self {
        Self::NotFound(id.clone())
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Whether this is a persistence failure.
    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::Persistence(_))
    }
}

/// Result type alias using wled-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_display() {
        let err = ClientError::timeout("10.0.0.5", Duration::from_secs(5));
        assert!(err.to_string().contains("10.0.0.5"));
        assert!(err.to_string().contains("5s"));
        assert_eq!(err.kind(), "timeout");

        let err = ClientError::unreachable("10.0.0.5", "connection refused");
        assert_eq!(err.to_string(), "10.0.0.5 unreachable: connection refused");
        assert_eq!(err.kind(), "unreachable");

        let err = ClientError::protocol("10.0.0.5", "HTTP 500");
        assert_eq!(err.kind(), "protocol");
    }

    #[test]
    fn test_store_error_converts_to_persistence() {
        let err: Error = wled_store::Error::Unavailable("disk full".to_string()).into();
        assert!(err.is_persistence());
        assert!(err.to_string().contains("disk full"));
    }

    #[test]
    fn test_probe_error_keeps_source() {
        use std::error::Error as _;

        let err = Error::Probe {
            address: "10.0.0.5".to_string(),
            source: ClientError::unreachable("10.0.0.5", "no route to host"),
        };
        assert!(err.to_string().contains("10.0.0.5"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_not_found_display() {
        let id = DeviceId::new("AA:BB:CC:DD:EE:FF").unwrap();
        assert_eq!(
            Error::not_found(&id).to_string(),
            "Device not found: aabbccddeeff"
        );
    }
}
