//! Manager configuration.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{BluetoothError, Result};

/// Default BlueZ adapter object path.
pub const DEFAULT_ADAPTER_PATH: &str = "/org/bluez/hci0";

/// Default discovery window in seconds.
pub const DEFAULT_DISCOVERY_WINDOW_SECS: u64 = 10;

/// Configuration for the session manager.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Adapter alias advertised to peers.
    pub name: String,
    /// Object path of the adapter to manage.
    pub adapter_path: String,
    /// How long a discovery window stays open.
    pub discovery_window_secs: u64,
    /// PIN code for legacy pairing, if required.
    pub pincode: Option<String>,
    /// Reconnect to the last trusted device on startup.
    pub autoconnect: bool,
    /// Volume pushed to a newly connected peer, if set.
    pub initial_volume: Option<u16>,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            name: "Bluetooth Audio".to_string(),
            adapter_path: DEFAULT_ADAPTER_PATH.to_string(),
            discovery_window_secs: DEFAULT_DISCOVERY_WINDOW_SECS,
            pincode: None,
            autoconnect: false,
            initial_volume: None,
        }
    }
}

impl ManagerConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| BluetoothError::Config(format!("{}: {e}", path.display())))?;
        toml::from_str(&raw)
            .map_err(|e| BluetoothError::Config(format!("{}: {e}", path.display())))
    }

    pub fn discovery_window(&self) -> Duration {
        Duration::from_secs(self.discovery_window_secs)
    }
}
