//! Command implementations.
//!
//! Each command opens the device database, builds a coordinator around it
//! and runs one operation. The registry is the only state shared between
//! steps; everything else is rebuilt per invocation.

mod add;
mod list;
mod manage;
mod refresh;
mod scan;
mod watch;

pub use add::cmd_add;
pub use list::cmd_list;
pub use manage::{cmd_delete, cmd_rename, cmd_set_hidden};
pub use refresh::cmd_refresh;
pub use scan::cmd_scan;
pub use watch::cmd_watch;

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result, bail};
use tracing::debug;

use wled_core::{
    AddressScanner, ChainScanner, DeviceClient, DeviceId, MdnsScanner, RefreshCoordinator, Registry,
    WledHttpClient,
};
use wled_store::SqliteStore;

use crate::config::Config;
use crate::format::FormatOptions;

/// Settings shared by every command.
#[derive(Debug, Clone)]
pub struct Context {
    pub config: Config,
    /// Database path from the command line, overriding the config file.
    pub database: Option<PathBuf>,
    pub opts: FormatOptions,
    pub quiet: bool,
}

impl Context {
    /// Database path: command line, then config file, then platform default.
    pub fn database_path(&self) -> PathBuf {
        self.database
            .clone()
            .or_else(|| self.config.storage.resolved_path())
            .unwrap_or_else(wled_store::default_db_path)
    }

    /// Open the device database and load the registry from it.
    pub fn open_registry(&self) -> Result<Arc<Registry>> {
        let path = self.database_path();
        debug!("Opening device database at {}", path.display());
        let store = SqliteStore::open(&path)
            .with_context(|| format!("Failed to open device database {}", path.display()))?;
        let registry = Registry::open(Arc::new(store)).context("Failed to load devices")?;
        Ok(Arc::new(registry))
    }

    /// HTTP client for the WLED JSON API.
    pub fn client(&self) -> Result<Arc<dyn DeviceClient>> {
        let client = WledHttpClient::new(self.config.refresh.request_timeout())
            .context("Failed to create HTTP client")?;
        Ok(Arc::new(client))
    }

    /// Discovery sources enabled in the config.
    ///
    /// `scan_duration` overrides the configured mDNS browse time.
    pub fn scanner(
        &self,
        client: Arc<dyn DeviceClient>,
        scan_duration: Option<Duration>,
    ) -> ChainScanner {
        let discovery = &self.config.discovery;
        let mut chain = ChainScanner::new();
        if discovery.mdns {
            let duration = scan_duration.unwrap_or_else(|| discovery.scan_duration());
            chain = chain.with(Arc::new(MdnsScanner::new(duration)));
        }
        if !discovery.addresses.is_empty() {
            chain = chain.with(Arc::new(AddressScanner::new(
                discovery.addresses.iter().cloned(),
                client,
            )));
        }
        chain
    }

    /// Coordinator over the on-disk registry, with discovery attached when
    /// any source is configured.
    pub fn coordinator(&self, scan_duration: Option<Duration>) -> Result<Arc<RefreshCoordinator>> {
        let registry = self.open_registry()?;
        let client = self.client()?;
        let scanner = self.scanner(Arc::clone(&client), scan_duration);

        let mut coordinator =
            RefreshCoordinator::new(registry, client, self.config.refresh.coordinator());
        if !scanner.is_empty() {
            coordinator = coordinator.with_scanner(Arc::new(scanner));
        }
        Ok(Arc::new(coordinator))
    }
}

/// Find a device by identity, or by a unique case-insensitive display name.
pub async fn resolve_device(registry: &Registry, arg: &str) -> Result<DeviceId> {
    if let Ok(id) = DeviceId::new(arg)
        && registry.contains(&id).await
    {
        return Ok(id);
    }

    let wanted = arg.trim().to_lowercase();
    let snapshot = registry.list().await;
    let matches: Vec<_> = snapshot
        .devices()
        .iter()
        .filter(|d| d.display_name().to_lowercase() == wanted)
        .collect();

    match matches.as_slice() {
        [device] => Ok(device.id.clone()),
        [] => bail!(
            "No device matches '{}'.\nRun 'wled list --show-hidden' to see known devices.",
            arg
        ),
        several => {
            let ids: Vec<_> = several.iter().map(|d| d.id.to_string()).collect();
            bail!(
                "'{}' matches several devices ({}); use the identity instead",
                arg,
                ids.join(", ")
            )
        }
    }
}

/// Write command output to stdout.
pub fn write_output(content: &str) -> Result<()> {
    let mut stdout = io::stdout().lock();
    stdout.write_all(content.as_bytes())?;
    stdout.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use wled_core::DeviceAttributes;

    fn context() -> Context {
        Context {
            config: Config::default(),
            database: None,
            opts: FormatOptions::new(true),
            quiet: false,
        }
    }

    #[test]
    fn test_database_path_precedence() {
        let mut ctx = context();
        ctx.config.storage.path = Some("/from/config.db".to_string());
        assert_eq!(ctx.database_path(), PathBuf::from("/from/config.db"));

        ctx.database = Some(PathBuf::from("/from/flag.db"));
        assert_eq!(ctx.database_path(), PathBuf::from("/from/flag.db"));

        ctx.config.storage.path = None;
        ctx.database = None;
        assert_eq!(ctx.database_path(), wled_store::default_db_path());
    }

    #[test]
    fn test_scanner_sources_follow_config() {
        let mut ctx = context();
        let client: Arc<dyn DeviceClient> = Arc::new(wled_core::MockClient::new());
        assert_eq!(ctx.scanner(Arc::clone(&client), None).len(), 1);

        ctx.config.discovery.addresses = vec!["10.0.0.5".to_string()];
        assert_eq!(ctx.scanner(Arc::clone(&client), None).len(), 2);

        ctx.config.discovery.mdns = false;
        ctx.config.discovery.addresses.clear();
        assert!(ctx.scanner(client, None).is_empty());
    }

    #[tokio::test]
    async fn test_resolve_by_identity_or_name() {
        let registry = Registry::in_memory();
        let desk = DeviceId::new("000000000001").unwrap();
        let porch = DeviceId::new("000000000002").unwrap();
        let attrs = |name: &str| DeviceAttributes {
            name: Some(name.to_string()),
            ..Default::default()
        };
        registry.upsert(desk.clone(), "10.0.0.1", attrs("Desk")).await.unwrap();
        registry.upsert(porch.clone(), "10.0.0.2", attrs("Porch")).await.unwrap();

        assert_eq!(resolve_device(&registry, "00:00:00:00:00:01").await.unwrap(), desk);
        assert_eq!(resolve_device(&registry, "porch").await.unwrap(), porch);
        assert!(resolve_device(&registry, "garage").await.is_err());
    }

    #[tokio::test]
    async fn test_resolve_rejects_ambiguous_names() {
        let registry = Registry::in_memory();
        for raw in ["000000000001", "000000000002"] {
            let attrs = DeviceAttributes {
                name: Some("Strip".to_string()),
                ..Default::default()
            };
            registry
                .upsert(DeviceId::new(raw).unwrap(), "10.0.0.1", attrs)
                .await
                .unwrap();
        }
        let err = resolve_device(&registry, "strip").await.unwrap_err();
        assert!(err.to_string().contains("several devices"));
    }
}
