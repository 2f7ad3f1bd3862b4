//! Paired device descriptors and link constants.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Name of the serial bridge module the vehicle carries.
pub const DEFAULT_DEVICE_NAME: &str = "HC-05";

/// RFCOMM Serial Port Profile service class
/// (`00001101-0000-1000-8000-00805F9B34FB`).
pub const SERIAL_PORT_PROFILE_UUID: Uuid = Uuid::from_u128(0x0000_1101_0000_1000_8000_0080_5f9b_34fb);

/// A device bonded at the OS level.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PairedDevice {
    /// Remote name as reported by the platform (e.g. "HC-05").
    pub name: String,
    /// Platform address, opaque to the core (e.g. "98:D3:31:F5:1A:2B").
    pub address: String,
}

impl PairedDevice {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
        }
    }

    /// Exact, ASCII case-insensitive name comparison.
    pub fn matches_name(&self, target: &str) -> bool {
        self.name.eq_ignore_ascii_case(target)
    }
}

impl std::fmt::Display for PairedDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.name, self.address)
    }
}
