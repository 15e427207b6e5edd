//! Core types for WLED device records.

use core::fmt;
use std::collections::BTreeMap;
use std::str::FromStr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::{ParseError, ParseResult};

/// Stable identity of a WLED controller.
///
/// WLED reports its MAC address as the identity. MAC-shaped input is
/// normalised to 12 lowercase hex digits without separators, so
/// `AA:BB:CC:DD:EE:FF`, `aa-bb-cc-dd-ee-ff` and `aabbccddeeff` are the same
/// device. Any other non-empty string is kept trimmed and lowercased.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
pub struct DeviceId(String);

impl DeviceId {
    /// Parse and normalise a device identity.
    ///
    /// # Examples
    ///
    /// ```
    /// use wled_types::DeviceId;
    ///
    /// let id = DeviceId::new("AA:BB:CC:DD:EE:FF").unwrap();
    /// assert_eq!(id.as_str(), "aabbccddeeff");
    /// assert!(DeviceId::new("   ").is_err());
    /// ```
    pub fn new(raw: impl AsRef<str>) -> ParseResult<Self> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(ParseError::InvalidIdentity(raw.as_ref().to_string()));
        }

        let compact: String = trimmed
            .chars()
            .filter(|c| !matches!(c, ':' | '-' | '.'))
            .collect();
        if compact.len() == 12 && compact.chars().all(|c| c.is_ascii_hexdigit()) {
            return Ok(Self(compact.to_ascii_lowercase()));
        }

        Ok(Self(trimmed.to_lowercase()))
    }

    /// The normalised identity string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the identity is a normalised MAC address.
    #[must_use]
    pub fn is_mac(&self) -> bool {
        self.0.len() == 12 && self.0.chars().all(|c| c.is_ascii_hexdigit())
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for DeviceId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for DeviceId {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DeviceId> for String {
    fn from(id: DeviceId) -> Self {
        id.0
    }
}

impl AsRef<str> for DeviceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// An RGB colour as reported by the controller's primary segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    /// Create a colour from its components.
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

impl fmt::Display for Rgb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Last-known attributes reported by a controller.
///
/// The registry treats this as an opaque payload: it is replaced wholesale by
/// a successful refresh and never modified otherwise.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct DeviceAttributes {
    /// Name configured on the controller itself.
    pub name: Option<String>,
    /// Firmware version string (e.g. `0.14.4`).
    pub firmware: Option<String>,
    /// Brand reported by the firmware.
    pub brand: Option<String>,
    /// Product reported by the firmware.
    pub product: Option<String>,
    /// Chip architecture (e.g. `esp32`).
    pub arch: Option<String>,
    /// Number of configured LEDs.
    pub led_count: Option<u32>,
    /// Whether the output is switched on.
    pub is_on: Option<bool>,
    /// Master brightness, 0-255.
    pub brightness: Option<u8>,
    /// Primary colour of the main segment.
    pub color: Option<Rgb>,
    /// Wi-Fi signal strength in dBm.
    pub rssi: Option<i32>,
    /// Any other reported fields, rendered as strings.
    pub extra: BTreeMap<String, String>,
}

/// Settled reachability of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Reachability {
    /// Never refreshed since the registry was loaded or the device was found.
    #[default]
    Unknown,
    /// The last refresh succeeded.
    Online,
    /// The last refresh failed.
    Offline,
}

impl fmt::Display for Reachability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Online => write!(f, "online"),
            Self::Offline => write!(f, "offline"),
        }
    }
}

/// Per-device refresh state machine.
///
/// `Unknown -> Refreshing -> {Online, Offline}`, and back to `Refreshing` on
/// the next trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum DeviceState {
    Unknown,
    Refreshing,
    Online,
    Offline,
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Refreshing => write!(f, "refreshing"),
            Self::Online => write!(f, "online"),
            Self::Offline => write!(f, "offline"),
        }
    }
}

/// A WLED controller known to the registry.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Device {
    /// Stable identity. Never changes after creation.
    pub id: DeviceId,
    /// Last-seen network address (`host` or `host:port`).
    pub address: String,
    /// Display name chosen by the user, if any.
    pub custom_name: Option<String>,
    /// Hidden devices are excluded from listings unless asked for.
    pub hidden: bool,
    /// Settled reachability. Volatile: not persisted.
    pub reachability: Reachability,
    /// Whether a refresh is currently in flight. Volatile: not persisted.
    pub refreshing: bool,
    /// Time of the last successful refresh.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339::option"))]
    pub last_refresh: Option<OffsetDateTime>,
    /// When the device was first added to the registry.
    #[cfg_attr(feature = "serde", serde(with = "time::serde::rfc3339"))]
    pub first_seen: OffsetDateTime,
    /// Last-known attributes reported by the controller.
    pub attributes: DeviceAttributes,
}

impl Device {
    /// Create a device that has just been seen at `address`.
    pub fn new(id: DeviceId, address: impl Into<String>) -> Self {
        Self {
            id,
            address: address.into(),
            custom_name: None,
            hidden: false,
            reachability: Reachability::Unknown,
            refreshing: false,
            last_refresh: None,
            first_seen: OffsetDateTime::now_utc(),
            attributes: DeviceAttributes::default(),
        }
    }

    /// Name to show in listings: custom name, then reported name, then address.
    pub fn display_name(&self) -> &str {
        self.custom_name
            .as_deref()
            .or(self.attributes.name.as_deref())
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.address)
    }

    /// Whether the last refresh succeeded.
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.reachability == Reachability::Online
    }

    /// Current position in the refresh state machine.
    #[must_use]
    pub fn state(&self) -> DeviceState {
        if self.refreshing {
            return DeviceState::Refreshing;
        }
        match self.reachability {
            Reachability::Unknown => DeviceState::Unknown,
            Reachability::Online => DeviceState::Online,
            Reachability::Offline => DeviceState::Offline,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(raw: &str) -> DeviceId {
        DeviceId::new(raw).unwrap()
    }

    #[test]
    fn test_device_id_normalises_mac_forms() {
        assert_eq!(id("AA:BB:CC:DD:EE:FF"), id("aabbccddeeff"));
        assert_eq!(id("aa-bb-cc-dd-ee-ff"), id("AABBCCDDEEFF"));
        assert_eq!(id(" a0b1.c2d3.e4f5 ").as_str(), "a0b1c2d3e4f5");
        assert!(id("a0b1c2d3e4f5").is_mac());
    }

    #[test]
    fn test_device_id_keeps_other_identities() {
        let serial = id("  WLED-Kitchen ");
        assert_eq!(serial.as_str(), "wled-kitchen");
        assert!(!serial.is_mac());
    }

    #[test]
    fn test_device_id_rejects_empty() {
        assert!(matches!(
            DeviceId::new(""),
            Err(ParseError::InvalidIdentity(_))
        ));
        assert!(DeviceId::new(" \t").is_err());
    }

    #[test]
    fn test_display_name_precedence() {
        let mut device = Device::new(id("aabbccddeeff"), "192.168.1.20");
        assert_eq!(device.display_name(), "192.168.1.20");

        device.attributes.name = Some("Desk".to_string());
        assert_eq!(device.display_name(), "Desk");

        device.custom_name = Some("Office strip".to_string());
        assert_eq!(device.display_name(), "Office strip");
    }

    #[test]
    fn test_empty_reported_name_falls_back_to_address() {
        let mut device = Device::new(id("aabbccddeeff"), "10.0.0.7");
        device.attributes.name = Some(String::new());
        assert_eq!(device.display_name(), "10.0.0.7");
    }

    #[test]
    fn test_state_machine_projection() {
        let mut device = Device::new(id("aabbccddeeff"), "10.0.0.7");
        assert_eq!(device.state(), DeviceState::Unknown);

        device.refreshing = true;
        assert_eq!(device.state(), DeviceState::Refreshing);

        device.refreshing = false;
        device.reachability = Reachability::Online;
        assert_eq!(device.state(), DeviceState::Online);
        assert!(device.is_online());

        device.reachability = Reachability::Offline;
        assert_eq!(device.state(), DeviceState::Offline);
        assert!(!device.is_online());
    }

    #[test]
    fn test_rgb_display() {
        assert_eq!(Rgb::new(255, 160, 0).to_string(), "#ffa000");
    }
}
