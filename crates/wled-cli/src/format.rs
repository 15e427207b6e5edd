//! Output formatting utilities for text, JSON, and CSV output.

use anyhow::Result;
use owo_colors::OwoColorize;
use serde::Serialize;
use tabled::settings::Style;
use tabled::{Table, Tabled};
use time::OffsetDateTime;

use wled_core::{Device, DeviceState, RefreshOutcome, RefreshReport, RegistryEvent, ScanReport};

/// Formatting options for output.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormatOptions {
    /// Disable colored output.
    pub no_color: bool,
    /// Omit header row in CSV output.
    pub no_header: bool,
    /// Use compact JSON output (no pretty-printing).
    pub compact: bool,
}

impl FormatOptions {
    pub fn new(no_color: bool) -> Self {
        Self {
            no_color,
            ..Self::default()
        }
    }

    /// Create with no_header option for CSV output.
    pub fn with_no_header(mut self, no_header: bool) -> Self {
        self.no_header = no_header;
        self
    }

    /// Create with compact JSON option.
    pub fn with_compact(mut self, compact: bool) -> Self {
        self.compact = compact;
        self
    }

    /// Serialize value to JSON string, respecting compact option.
    pub fn as_json<T: Serialize>(&self, value: &T) -> Result<String> {
        let json = if self.compact {
            serde_json::to_string(value)?
        } else {
            serde_json::to_string_pretty(value)?
        };
        Ok(json + "\n")
    }

    fn table(&self, table: &mut Table) {
        if self.no_color {
            table.with(Style::blank());
        } else {
            table.with(Style::rounded());
        }
    }
}

/// Escape a string for CSV output.
/// Wraps the value in quotes if it contains commas, quotes, or newlines.
/// Double quotes are escaped by doubling them.
#[must_use]
pub fn csv_escape(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') || s.contains('\r') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

/// Format a device state with color.
#[must_use]
pub fn format_state(state: DeviceState, no_color: bool) -> String {
    let label = state.to_string();
    if no_color {
        return label;
    }
    match state {
        DeviceState::Online => label.green().to_string(),
        DeviceState::Offline => label.red().to_string(),
        DeviceState::Refreshing => label.yellow().to_string(),
        DeviceState::Unknown => label.dimmed().to_string(),
    }
}

/// Format the time since `then`, e.g. `42s ago`.
#[must_use]
pub fn format_age(then: Option<OffsetDateTime>, now: OffsetDateTime) -> String {
    let Some(then) = then else {
        return "never".to_string();
    };
    let secs = (now - then).whole_seconds();
    match secs {
        s if s < 1 => "just now".to_string(),
        s if s < 60 => format!("{}s ago", s),
        s if s < 3600 => format!("{}m ago", s / 60),
        s if s < 86_400 => format!("{}h ago", s / 3600),
        s => format!("{}d ago", s / 86_400),
    }
}

fn format_power(device: &Device) -> String {
    let attrs = &device.attributes;
    match (attrs.is_on, attrs.brightness) {
        (Some(true), Some(bri)) => format!("on {}%", (u32::from(bri) * 100 + 127) / 255),
        (Some(true), None) => "on".to_string(),
        (Some(false), _) => "off".to_string(),
        (None, _) => "-".to_string(),
    }
}

fn or_dash<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

// ============================================================================
// Device list formatting
// ============================================================================

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "State")]
    state: String,
    #[tabled(rename = "Power")]
    power: String,
    #[tabled(rename = "LEDs")]
    leds: String,
    #[tabled(rename = "Firmware")]
    firmware: String,
    #[tabled(rename = "Refreshed")]
    refreshed: String,
    #[tabled(rename = "Identity")]
    id: String,
}

fn device_table(devices: &[&Device], now: OffsetDateTime, opts: &FormatOptions) -> String {
    let rows: Vec<DeviceRow> = devices
        .iter()
        .map(|d| {
            let mut name = d.display_name().to_string();
            if d.hidden {
                name.push_str(" (hidden)");
            }
            DeviceRow {
                name: if opts.no_color {
                    name
                } else {
                    name.cyan().to_string()
                },
                address: d.address.clone(),
                state: format_state(d.state(), opts.no_color),
                power: format_power(d),
                leds: or_dash(d.attributes.led_count),
                firmware: or_dash(d.attributes.firmware.as_deref()),
                refreshed: format_age(d.last_refresh, now),
                id: d.id.to_string(),
            }
        })
        .collect();

    let mut table = Table::new(rows);
    opts.table(&mut table);
    format!("{}\n", table)
}

fn section_title(title: &str, count: usize, opts: &FormatOptions) -> String {
    if opts.no_color {
        format!("{} ({})\n", title, count)
    } else {
        format!("{} ({})\n", title.bold(), count)
    }
}

/// Format the online and offline device lists as tables.
#[must_use]
pub fn format_devices_text(
    online: &[&Device],
    offline: &[&Device],
    hidden_count: usize,
    opts: &FormatOptions,
) -> String {
    if online.is_empty() && offline.is_empty() && hidden_count == 0 {
        return "No devices known. Run 'wled scan' to discover devices, or 'wled add ADDRESS'.\n"
            .to_string();
    }

    let now = OffsetDateTime::now_utc();
    let mut output = String::new();
    for (title, devices) in [("Online", online), ("Offline", offline)] {
        if devices.is_empty() {
            continue;
        }
        if !output.is_empty() {
            output.push('\n');
        }
        output.push_str(&section_title(title, devices.len(), opts));
        output.push_str(&device_table(devices, now, opts));
    }

    if hidden_count > 0 {
        if !output.is_empty() {
            output.push('\n');
        }
        let note = format!(
            "{} hidden device(s) not shown. Use --show-hidden to include them.",
            hidden_count
        );
        if opts.no_color {
            output.push_str(&note);
        } else {
            output.push_str(&note.dimmed().to_string());
        }
        output.push('\n');
    }
    output
}

/// Format the device lists as a JSON object with `online` and `offline` arrays.
pub fn format_devices_json(
    online: &[&Device],
    offline: &[&Device],
    hidden_count: usize,
    opts: &FormatOptions,
) -> Result<String> {
    #[derive(Serialize)]
    struct DeviceLists<'a> {
        online: &'a [&'a Device],
        offline: &'a [&'a Device],
        hidden: usize,
    }

    opts.as_json(&DeviceLists {
        online,
        offline,
        hidden: hidden_count,
    })
}

/// Format the device lists as CSV, online devices first.
#[must_use]
pub fn format_devices_csv(online: &[&Device], offline: &[&Device], opts: &FormatOptions) -> String {
    let mut output = if opts.no_header {
        String::new()
    } else {
        "id,name,address,state,hidden,is_on,brightness,led_count,firmware,last_refresh\n"
            .to_string()
    };
    for device in online.iter().chain(offline) {
        let last_refresh = device
            .last_refresh
            .and_then(|t| t.format(&time::format_description::well_known::Rfc3339).ok())
            .unwrap_or_default();
        output.push_str(&format!(
            "{},{},{},{},{},{},{},{},{},{}\n",
            csv_escape(device.id.as_str()),
            csv_escape(device.display_name()),
            csv_escape(&device.address),
            device.state(),
            device.hidden,
            device
                .attributes
                .is_on
                .map(|b| b.to_string())
                .unwrap_or_default(),
            device
                .attributes
                .brightness
                .map(|b| b.to_string())
                .unwrap_or_default(),
            device
                .attributes
                .led_count
                .map(|c| c.to_string())
                .unwrap_or_default(),
            csv_escape(device.attributes.firmware.as_deref().unwrap_or("")),
            last_refresh,
        ));
    }
    output
}

// ============================================================================
// Refresh and scan formatting
// ============================================================================

/// Short label for a refresh outcome.
#[must_use]
pub fn outcome_label(outcome: &RefreshOutcome) -> &'static str {
    match outcome {
        RefreshOutcome::Online => "online",
        RefreshOutcome::Offline(_) => "offline",
        RefreshOutcome::AlreadyRefreshing => "already-refreshing",
        RefreshOutcome::NotFound => "not-found",
        RefreshOutcome::Removed => "removed",
        RefreshOutcome::PersistenceFailed(_) => "persistence-failed",
    }
}

fn outcome_detail(outcome: &RefreshOutcome) -> Option<String> {
    match outcome {
        RefreshOutcome::Offline(e) => Some(e.to_string()),
        RefreshOutcome::PersistenceFailed(e) => Some(e.clone()),
        _ => None,
    }
}

#[derive(Serialize)]
struct OutcomeRow {
    id: String,
    outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn outcome_rows(report: &RefreshReport) -> Vec<OutcomeRow> {
    report
        .iter()
        .map(|(id, outcome)| OutcomeRow {
            id: id.to_string(),
            outcome: outcome_label(outcome),
            error: outcome_detail(outcome),
        })
        .collect()
}

/// Format a refresh report, one line per device.
#[must_use]
pub fn format_refresh_text(report: &RefreshReport, opts: &FormatOptions) -> String {
    if report.is_empty() {
        return "No devices to refresh.\n".to_string();
    }

    let mut output = String::new();
    for (id, outcome) in report.iter() {
        let label = outcome_label(outcome);
        let label = match (opts.no_color, outcome) {
            (true, _) => label.to_string(),
            (false, RefreshOutcome::Online) => label.green().to_string(),
            (false, RefreshOutcome::Offline(_) | RefreshOutcome::PersistenceFailed(_)) => {
                label.red().to_string()
            }
            (false, _) => label.dimmed().to_string(),
        };
        match outcome_detail(outcome) {
            Some(detail) => output.push_str(&format!("{:<20} {}  {}\n", id, label, detail)),
            None => output.push_str(&format!("{:<20} {}\n", id, label)),
        }
    }
    output.push_str(&format!(
        "\n{} online, {} offline\n",
        report.online_count(),
        report.offline_count()
    ));
    output
}

pub fn format_refresh_json(report: &RefreshReport, opts: &FormatOptions) -> Result<String> {
    opts.as_json(&outcome_rows(report))
}

#[must_use]
pub fn format_refresh_csv(report: &RefreshReport, opts: &FormatOptions) -> String {
    let mut output = if opts.no_header {
        String::new()
    } else {
        "id,outcome,error\n".to_string()
    };
    for row in outcome_rows(report) {
        output.push_str(&format!(
            "{},{},{}\n",
            csv_escape(&row.id),
            row.outcome,
            csv_escape(row.error.as_deref().unwrap_or(""))
        ));
    }
    output
}

/// Format a scan report: what was found, then the refresh outcomes.
#[must_use]
pub fn format_scan_text(report: &ScanReport, opts: &FormatOptions) -> String {
    let count = if opts.no_color {
        report.discovered.to_string()
    } else {
        report.discovered.to_string().green().bold().to_string()
    };
    let mut output = format!(
        "Found {} WLED device(s), {} new\n",
        count,
        report.new.len()
    );
    for id in &report.new {
        output.push_str(&format!("  + {}\n", id));
    }
    if !report.refresh.is_empty() {
        output.push('\n');
        output.push_str(&format_refresh_text(&report.refresh, opts));
    }
    output
}

pub fn format_scan_json(report: &ScanReport, opts: &FormatOptions) -> Result<String> {
    #[derive(Serialize)]
    struct ScanJson {
        discovered: usize,
        new: Vec<String>,
        refresh: Vec<OutcomeRow>,
    }

    opts.as_json(&ScanJson {
        discovered: report.discovered,
        new: report.new.iter().map(ToString::to_string).collect(),
        refresh: outcome_rows(&report.refresh),
    })
}

// ============================================================================
// Event formatting
// ============================================================================

/// Format an event as one line of text, or `None` if it is not worth
/// printing.
#[must_use]
pub fn format_event_text(event: &RegistryEvent, at: OffsetDateTime, opts: &FormatOptions) -> Option<String> {
    let message = match event {
        RegistryEvent::Discovered { id, address, new } => {
            if *new {
                format!("found new device {} at {}", id, address)
            } else {
                format!("found {} at {}", id, address)
            }
        }
        RegistryEvent::Added { id, address } => format!("added {} at {}", id, address),
        RegistryEvent::Online { id } => {
            if opts.no_color {
                format!("{} online", id)
            } else {
                format!("{} {}", id, "online".green())
            }
        }
        RegistryEvent::Offline { id, error } => {
            if opts.no_color {
                format!("{} offline: {}", id, error)
            } else {
                format!("{} {}: {}", id, "offline".red(), error)
            }
        }
        RegistryEvent::Updated { id } => format!("{} updated", id),
        RegistryEvent::Removed { id } => format!("{} removed", id),
        RegistryEvent::ScanStarted => "scan started".to_string(),
        RegistryEvent::ScanCompleted { found, new } => {
            format!("scan completed: {} found, {} new", found, new)
        }
        RegistryEvent::ScanFailed { error } => format!("scan failed: {}", error),
        _ => return None,
    };

    let stamp = format!("{:02}:{:02}:{:02}", at.hour(), at.minute(), at.second());
    let stamp = if opts.no_color {
        stamp
    } else {
        stamp.dimmed().to_string()
    };
    Some(format!("{}  {}\n", stamp, message))
}

/// Format an event as a single JSON line.
pub fn format_event_json(event: &RegistryEvent) -> Result<String> {
    Ok(serde_json::to_string(event)? + "\n")
}
