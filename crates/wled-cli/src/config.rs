//! Configuration file management.
//!
//! Settings live in `~/.config/wled/config.toml`. Every section is optional
//! and falls back to its defaults; command-line flags override the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use wled_core::{CoordinatorConfig, SortOrder};

/// Allowed refresh interval range, in seconds.
const INTERVAL_RANGE: std::ops::RangeInclusive<u64> = 5..=3600;
/// Allowed concurrent refresh range.
const IN_FLIGHT_RANGE: std::ops::RangeInclusive<usize> = 1..=64;

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Device database settings.
    #[serde(default)]
    pub storage: StorageConfig,
    /// Refresh timing and limits.
    #[serde(default)]
    pub refresh: RefreshConfig,
    /// How devices are discovered.
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    /// Listing defaults.
    #[serde(default)]
    pub display: DisplayConfig,
}

impl Config {
    /// Load configuration from the default path, or defaults if the file is
    /// missing.
    pub fn load_default() -> Result<Self, ConfigError> {
        let path = default_config_path();
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source: e,
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Load and validate configuration from a file.
    pub fn load_validated<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        std::fs::write(path.as_ref(), content).map_err(|e| ConfigError::Write {
            path: path.as_ref().to_path_buf(),
            source: e,
        })
    }

    /// Validate the configuration and return every problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();
        errors.extend(self.storage.validate());
        errors.extend(self.refresh.validate());
        errors.extend(self.discovery.validate());

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

/// Device database configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Database path. `~` is expanded; unset means the platform default.
    pub path: Option<String>,
}

impl StorageConfig {
    /// Resolved database path, if one is configured.
    pub fn resolved_path(&self) -> Option<PathBuf> {
        self.path.as_deref().map(expand_home)
    }

    fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if self.path.as_deref().is_some_and(|p| p.trim().is_empty()) {
            errors.push(ValidationError {
                field: "storage.path".to_string(),
                message: "path cannot be empty (remove it to use the default)".to_string(),
            });
        }
        errors
    }
}

/// Refresh configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// Seconds between periodic refreshes.
    pub interval_secs: u64,
    /// Maximum number of devices refreshed at once.
    pub max_in_flight: usize,
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            max_in_flight: 4,
            request_timeout_secs: 5,
        }
    }
}

impl RefreshConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Coordinator settings derived from this section.
    pub fn coordinator(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            max_in_flight: self.max_in_flight,
            ..CoordinatorConfig::default()
        }
    }

    fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        errors.extend(check_interval("refresh.interval_secs", self.interval_secs));
        if !IN_FLIGHT_RANGE.contains(&self.max_in_flight) {
            errors.push(ValidationError {
                field: "refresh.max_in_flight".to_string(),
                message: format!(
                    "must be between {} and {}, got {}",
                    IN_FLIGHT_RANGE.start(),
                    IN_FLIGHT_RANGE.end(),
                    self.max_in_flight
                ),
            });
        }
        if self.request_timeout_secs == 0 {
            errors.push(ValidationError {
                field: "refresh.request_timeout_secs".to_string(),
                message: "timeout must be at least 1 second".to_string(),
            });
        }
        errors
    }
}

/// Check a refresh interval against the allowed range.
///
/// Shared by the config file and the `--interval` flag.
pub fn check_interval(field: &str, secs: u64) -> Option<ValidationError> {
    if INTERVAL_RANGE.contains(&secs) {
        return None;
    }
    Some(ValidationError {
        field: field.to_string(),
        message: format!(
            "interval must be between {} and {} seconds, got {}",
            INTERVAL_RANGE.start(),
            INTERVAL_RANGE.end(),
            secs
        ),
    })
}

/// Discovery configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Browse mDNS for `_wled._tcp` services.
    pub mdns: bool,
    /// How long each mDNS browse lasts, in seconds.
    pub scan_duration_secs: u64,
    /// Addresses probed directly on every scan.
    pub addresses: Vec<String>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            mdns: true,
            scan_duration_secs: 3,
            addresses: Vec::new(),
        }
    }
}

impl DiscoveryConfig {
    pub fn scan_duration(&self) -> Duration {
        Duration::from_secs(self.scan_duration_secs)
    }

    fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        if self.mdns && self.scan_duration_secs == 0 {
            errors.push(ValidationError {
                field: "discovery.scan_duration_secs".to_string(),
                message: "scan duration must be at least 1 second".to_string(),
            });
        }
        let mut seen = std::collections::HashSet::new();
        for (i, address) in self.addresses.iter().enumerate() {
            let field = format!("discovery.addresses[{}]", i);
            if address.trim().is_empty() {
                errors.push(ValidationError {
                    field,
                    message: "address cannot be empty".to_string(),
                });
            } else if !seen.insert(address.trim()) {
                errors.push(ValidationError {
                    field,
                    message: format!("duplicate address '{}'", address),
                });
            }
        }
        errors
    }
}

/// Listing defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Include hidden devices in listings.
    pub show_hidden: bool,
    /// Listing order.
    pub sort: SortOrder,
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    #[error("Failed to serialize config: {0}")]
    Serialize(toml::ser::Error),
    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Configuration validation failed:\n{}", format_validation_errors(.0))]
    Validation(Vec<ValidationError>),
}

/// A single validation error with context.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    /// The field path (e.g., `refresh.interval_secs`).
    pub field: String,
    /// Description of the validation failure.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

fn format_validation_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| format!("  - {}", e))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Default configuration file path.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("wled")
        .join("config.toml")
}

/// Expand a leading `~` to the home directory.
fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/")
        && let Some(home) = dirs::home_dir()
    {
        return home.join(rest);
    }
    if path == "~"
        && let Some(home) = dirs::home_dir()
    {
        return home;
    }
    PathBuf::from(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.refresh.interval_secs, 30);
        assert_eq!(config.refresh.max_in_flight, 4);
        assert!(config.discovery.mdns);
        assert!(!config.display.show_hidden);
        assert_eq!(config.display.sort, SortOrder::Name);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: Config = toml::from_str(
            r#"
            [refresh]
            interval_secs = 60

            [display]
            sort = "last-refresh"
            "#,
        )
        .unwrap();
        assert_eq!(config.refresh.interval_secs, 60);
        assert_eq!(config.refresh.max_in_flight, 4);
        assert_eq!(config.display.sort, SortOrder::LastRefresh);
        assert!(config.storage.path.is_none());
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let mut config = Config::default();
        config.refresh.interval_secs = 1;
        config.refresh.max_in_flight = 0;
        config.discovery.addresses = vec!["10.0.0.1".into(), "".into(), "10.0.0.1".into()];

        let Err(ConfigError::Validation(errors)) = config.validate() else {
            panic!("expected validation errors");
        };
        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            vec![
                "refresh.interval_secs",
                "refresh.max_in_flight",
                "discovery.addresses[1]",
                "discovery.addresses[2]",
            ]
        );
    }

    #[test]
    fn test_check_interval_bounds() {
        assert!(check_interval("--interval", 5).is_none());
        assert!(check_interval("--interval", 3600).is_none());

        let err = check_interval("--interval", 1).unwrap();
        assert_eq!(err.field, "--interval");
        assert!(err.message.contains("between 5 and 3600"));
        assert!(check_interval("--interval", 3601).is_some());
    }

    #[test]
    fn test_validation_message_lists_fields() {
        let mut config = Config::default();
        config.refresh.request_timeout_secs = 0;
        let message = config.validate().unwrap_err().to_string();
        assert!(message.contains("refresh.request_timeout_secs"));
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.storage.path = Some("/tmp/devices.db".to_string());
        config.discovery.addresses = vec!["192.168.1.50".to_string()];
        config.display.show_hidden = true;
        config.save(&path).unwrap();

        let loaded = Config::load_validated(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_load_reports_parse_errors() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[refresh\ninterval_secs = 5").unwrap();
        assert!(matches!(Config::load(&path), Err(ConfigError::Parse { .. })));
        assert!(matches!(
            Config::load(dir.path().join("missing.toml")),
            Err(ConfigError::Read { .. })
        ));
    }

    #[test]
    fn test_expand_home() {
        let storage = StorageConfig {
            path: Some("/var/lib/wled.db".to_string()),
        };
        assert_eq!(storage.resolved_path(), Some(PathBuf::from("/var/lib/wled.db")));

        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/wled.db"), home.join("wled.db"));
        }
    }

    #[test]
    fn test_coordinator_config_from_refresh() {
        let refresh = RefreshConfig {
            max_in_flight: 8,
            ..RefreshConfig::default()
        };
        assert_eq!(refresh.coordinator().max_in_flight, 8);
        assert_eq!(refresh.request_timeout(), Duration::from_secs(5));
    }
}
