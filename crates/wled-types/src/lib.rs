//! Platform-agnostic types for WLED lighting controllers.
//!
//! This crate holds the device model shared by the store, the core
//! coordinator and front ends. It has no I/O and no async runtime.
//!
//! # Example
//!
//! ```
//! use wled_types::{Device, DeviceId, Reachability};
//!
//! let id = DeviceId::new("A8:03:2A:6C:11:F0").unwrap();
//! let device = Device::new(id, "192.168.1.40");
//!
//! assert_eq!(device.reachability, Reachability::Unknown);
//! assert_eq!(device.display_name(), "192.168.1.40");
//! ```

pub mod error;
pub mod types;

pub use error::{ParseError, ParseResult};
pub use types::{Device, DeviceAttributes, DeviceId, DeviceState, Reachability, Rgb};


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Normalising an identity is idempotent.
        #[test]
        fn device_id_normalisation_is_idempotent(raw in "[ -~]{1,24}") {
            if let Ok(id) = DeviceId::new(&raw) {
                let again = DeviceId::new(id.as_str()).unwrap();
                prop_assert_eq!(again, id);
            }
        }

        /// Every separator style of the same MAC maps to one identity.
        #[test]
        fn mac_separators_do_not_matter(bytes in proptest::array::uniform6(any::<u8>())) {
            let colon = bytes.iter().map(|b| format!("{:02X}", b)).collect::<Vec<_>>().join(":");
            let dash = bytes.iter().map(|b| format!("{:02x}", b)).collect::<Vec<_>>().join("-");
            prop_assert_eq!(DeviceId::new(&colon).unwrap(), DeviceId::new(&dash).unwrap());
        }
    }
}
