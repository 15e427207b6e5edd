//! Durable device records for the WLED registry.
//!
//! This crate is the persistence boundary of the registry: a small
//! [`DeviceStore`] capability (`upsert`, `delete`, `get`, `list`) with a
//! SQLite backend for real use and an in-memory backend for tests.
//!
//! Only the durable part of a device is stored: identity, address, user
//! settings (hidden flag, custom name), last-known attributes and
//! timestamps. Reachability is volatile and always starts out unknown.
//!
//! # Example
//!
//! ```no_run
//! use wled_store::{DeviceStore, SqliteStore};
//!
//! let store = SqliteStore::open_default()?;
//! for device in store.list()? {
//!     println!("{} at {}", device.id, device.address);
//! }
//! # Ok::<(), wled_store::Error>(())
//! ```

mod error;
mod memory;
mod models;
mod schema;
mod store;
mod traits;

pub use error::{Error, Result};
pub use memory::MemoryStore;
pub use models::StoredDevice;
pub use store::SqliteStore;
pub use traits::DeviceStore;

/// Default database path following platform conventions.
///
/// - Linux: `~/.local/share/wled/devices.db`
/// - macOS: `~/Library/Application Support/wled/devices.db`
/// - Windows: `C:\Users\<user>\AppData\Local\wled\devices.db`
pub fn default_db_path() -> std::path::PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join("wled")
        .join("devices.db")
}
