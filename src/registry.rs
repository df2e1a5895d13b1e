//! In-memory cache of known devices.

use std::collections::HashMap;

use crate::device::DeviceInfo;
use crate::transport::{ManagedObjects, PropertyMap, DEVICE_INTERFACE};

/// Cache of discovered/known devices keyed by object path.
///
/// Refreshed wholesale from bulk enumerations and updated incrementally from
/// property-change deltas. Connection-state invariants are enforced by the
/// session manager, not here.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: HashMap<String, DeviceInfo>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the cache from a bulk enumeration and return the device list.
    ///
    /// Only `Device1` objects that have resolved a name are kept, matching
    /// what scans are expected to surface.
    pub fn refresh(&mut self, objects: &ManagedObjects) -> Vec<DeviceInfo> {
        self.devices.clear();
        for (path, interfaces) in objects {
            if let Some(props) = interfaces.get(DEVICE_INTERFACE) {
                let device = DeviceInfo::from_properties(path.clone(), props);
                if device.has_name() {
                    self.devices.insert(path.clone(), device);
                }
            }
        }
        self.list()
    }

    /// Merge a property delta; unknown devices are inserted fresh.
    pub fn upsert(&mut self, path: &str, props: &PropertyMap) -> &DeviceInfo {
        let device = self
            .devices
            .entry(path.to_string())
            .or_insert_with(|| DeviceInfo::from_properties(path, &PropertyMap::new()));
        device.apply(props);
        device
    }

    /// Evict a device from the cache.
    pub fn remove(&mut self, path: &str) -> Option<DeviceInfo> {
        self.devices.remove(path)
    }

    /// Cached record for a path, if any.
    pub fn get(&self, path: &str) -> Option<&DeviceInfo> {
        self.devices.get(path)
    }

    /// All cached devices, ordered by path for stable output.
    pub fn list(&self) -> Vec<DeviceInfo> {
        let mut devices: Vec<_> = self.devices.values().cloned().collect();
        devices.sort_by(|a, b| a.path.cmp(&b.path));
        devices
    }

    /// Paths of every device currently marked connected.
    pub fn connected_paths(&self) -> Vec<String> {
        self.devices
            .values()
            .filter(|d| d.connected)
            .map(|d| d.path.clone())
            .collect()
    }

    /// The device currently marked connected, if any.
    pub fn connected_device(&self) -> Option<&DeviceInfo> {
        self.devices.values().find(|d| d.connected)
    }

    /// Clear the connected flag on every device except `keep`.
    ///
    /// Local reconciliation after an exclusivity sweep; the remote side may
    /// still be catching up.
    pub fn mark_exclusive(&mut self, keep: &str) {
        for device in self.devices.values_mut() {
            if device.path != keep {
                device.connected = false;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::PropertyValue;

    fn device_entry(name: &str, connected: bool) -> HashMap<String, PropertyMap> {
        let mut props = PropertyMap::new();
        props.insert("Name".to_string(), PropertyValue::from(name));
        props.insert("Connected".to_string(), PropertyValue::Bool(connected));
        let mut interfaces = HashMap::new();
        interfaces.insert(DEVICE_INTERFACE.to_string(), props);
        interfaces
    }

    fn sample_objects() -> ManagedObjects {
        let mut objects = ManagedObjects::new();
        objects.insert("/hci0/dev_A".to_string(), device_entry("Speaker", false));
        objects.insert("/hci0/dev_B".to_string(), device_entry("Phone", true));
        // Nameless device: filtered out of refresh results.
        objects.insert("/hci0/dev_C".to_string(), {
            let mut interfaces = HashMap::new();
            interfaces.insert(DEVICE_INTERFACE.to_string(), PropertyMap::new());
            interfaces
        });
        objects
    }

    #[test]
    fn refresh_keeps_named_devices_only() {
        let mut registry = DeviceRegistry::new();
        let devices = registry.refresh(&sample_objects());
        assert_eq!(devices.len(), 2);
        assert_eq!(devices[0].path, "/hci0/dev_A");
        assert_eq!(devices[1].name, "Phone");
    }

    #[test]
    fn upsert_inserts_unknown_devices() {
        let mut registry = DeviceRegistry::new();
        let mut delta = PropertyMap::new();
        delta.insert("Connected".to_string(), PropertyValue::Bool(true));

        let device = registry.upsert("/hci0/dev_X", &delta);
        assert!(device.connected);
        assert_eq!(registry.connected_paths(), vec!["/hci0/dev_X".to_string()]);
    }

    #[test]
    fn remove_evicts() {
        let mut registry = DeviceRegistry::new();
        registry.refresh(&sample_objects());
        assert!(registry.remove("/hci0/dev_A").is_some());
        assert!(registry.get("/hci0/dev_A").is_none());
        assert_eq!(registry.list().len(), 1);
    }

    #[test]
    fn mark_exclusive_clears_other_devices() {
        let mut registry = DeviceRegistry::new();
        registry.refresh(&sample_objects());

        let mut delta = PropertyMap::new();
        delta.insert("Connected".to_string(), PropertyValue::Bool(true));
        registry.upsert("/hci0/dev_A", &delta);
        assert_eq!(registry.connected_paths().len(), 2);

        registry.mark_exclusive("/hci0/dev_A");
        assert_eq!(registry.connected_paths(), vec!["/hci0/dev_A".to_string()]);
        assert_eq!(
            registry.connected_device().map(|d| d.name.clone()),
            Some("Speaker".to_string())
        );
    }
}
