//! Parsing of WLED JSON API responses.
//!
//! WLED answers `GET /json/si` with an object holding `state` and `info`,
//! and `GET /json/info` with the `info` object alone. Both are accepted.
//! Only the fields the registry shows are decoded; unknown fields are
//! ignored, and a handful of useful scalars are kept in
//! [`DeviceAttributes::extra`].

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::Value;

use wled_types::{DeviceAttributes, DeviceId, Rgb};

use crate::traits::DeviceReport;

/// Path of the combined state and info endpoint.
pub const STATE_INFO_PATH: &str = "/json/si";

/// Path of the info-only endpoint.
pub const INFO_PATH: &str = "/json/info";

/// Info fields copied into `extra` when present.
const EXTRA_FIELDS: &[&str] = &["ip", "uptime", "fxcount", "palcount", "freeheap", "vid"];

#[derive(Debug, Deserialize)]
struct StateInfo {
    state: Option<State>,
    info: Option<Info>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct State {
    on: Option<bool>,
    bri: Option<u8>,
    seg: Vec<Segment>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Segment {
    col: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Info {
    ver: Option<String>,
    name: Option<String>,
    brand: Option<String>,
    product: Option<String>,
    arch: Option<String>,
    mac: Option<String>,
    leds: Option<Leds>,
    wifi: Option<Wifi>,
    #[serde(flatten)]
    rest: BTreeMap<String, Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Leds {
    count: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Wifi {
    rssi: Option<i32>,
}

/// Parse a `/json/si` or `/json/info` response body.
///
/// The report's identity comes from the `mac` field; a response without
/// one has no identity. Returns a description of the problem if the body is
/// not a WLED response.
///
/// # Example
///
/// ```
/// use wled_core::wled::parse_report;
///
/// let body = r#"{"info":{"ver":"0.14.4","name":"Desk","mac":"a8032a6c11f0","leds":{"count":60}}}"#;
/// let report = parse_report(body).unwrap();
/// assert_eq!(report.id.unwrap().as_str(), "a8032a6c11f0");
/// assert_eq!(report.attributes.led_count, Some(60));
/// ```
pub fn parse_report(body: &str) -> Result<DeviceReport, String> {
    let value: Value = serde_json::from_str(body).map_err(|e| format!("invalid JSON: {e}"))?;
    if !value.is_object() {
        return Err("expected a JSON object".to_string());
    }

    let (state, info) = if value.get("info").is_some() {
        let si: StateInfo =
            serde_json::from_value(value).map_err(|e| format!("unexpected response: {e}"))?;
        (si.state.unwrap_or_default(), si.info.unwrap_or_default())
    } else {
        let info: Info =
            serde_json::from_value(value).map_err(|e| format!("unexpected response: {e}"))?;
        if info.ver.is_none() && info.mac.is_none() {
            return Err("response is not from a WLED device".to_string());
        }
        (State::default(), info)
    };

    let id = match info.mac.as_deref().map(str::trim) {
        Some(mac) if !mac.is_empty() => {
            Some(DeviceId::new(mac).map_err(|e| format!("bad mac field: {e}"))?)
        }
        _ => None,
    };

    let extra = EXTRA_FIELDS
        .iter()
        .filter_map(|key| {
            let value = info.rest.get(*key)?;
            let text = match value {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => return None,
            };
            Some((key.to_string(), text))
        })
        .collect();

    let attributes = DeviceAttributes {
        name: info.name,
        firmware: info.ver,
        brand: info.brand,
        product: info.product,
        arch: info.arch,
        led_count: info.leds.and_then(|l| l.count),
        is_on: state.on,
        brightness: state.bri,
        color: state.seg.first().and_then(primary_color),
        rssi: info.wifi.and_then(|w| w.rssi),
        extra,
    };

    Ok(DeviceReport { id, attributes })
}

/// First colour slot of a segment, given as `[r, g, b]` or `[r, g, b, w]`.
fn primary_color(segment: &Segment) -> Option<Rgb> {
    let slot = segment.col.first()?.as_array()?;
    let channel = |i: usize| -> Option<u8> {
        slot.get(i)?.as_u64().map(|v| v.min(255) as u8)
    };
    Some(Rgb::new(channel(0)?, channel(1)?, channel(2)?))
}
