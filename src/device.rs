//! Bluetooth device representation.

use serde::Serialize;

use crate::transport::{PropertyMap, PropertyValue};

/// A remote Bluetooth peer known to the adapter.
///
/// Built from `org.bluez.Device1` property maps; updated in place as
/// property-change deltas arrive.
#[derive(Debug, Clone, Serialize)]
pub struct DeviceInfo {
    /// Stable object path on the bus.
    pub path: String,
    /// Hardware address (e.g. "AA:BB:CC:DD:EE:FF").
    pub address: String,
    /// Device name as reported by the peer.
    pub name: String,
    /// User-friendly alias, if set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
    /// Icon hint (e.g. "phone", "audio-card").
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    /// Device class bits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub class: Option<u32>,
    pub paired: bool,
    pub trusted: bool,
    pub bonded: bool,
    pub connected: bool,
}

impl DeviceInfo {
    /// Build a device record from a full `Device1` property map.
    pub fn from_properties(path: impl Into<String>, props: &PropertyMap) -> Self {
        let mut device = Self::placeholder(path);
        device.apply(props);
        device
    }

    fn placeholder(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            address: String::new(),
            name: String::new(),
            alias: None,
            icon: None,
            class: None,
            paired: false,
            trusted: false,
            bonded: false,
            connected: false,
        }
    }

    /// Merge a property delta into this record.
    ///
    /// Unknown keys are ignored; absent keys leave fields untouched.
    pub fn apply(&mut self, props: &PropertyMap) {
        if let Some(v) = props.get("Address").and_then(PropertyValue::as_str) {
            self.address = v.to_string();
        }
        if let Some(v) = props.get("Name").and_then(PropertyValue::as_str) {
            self.name = v.to_string();
        }
        if let Some(v) = props.get("Alias").and_then(PropertyValue::as_str) {
            self.alias = Some(v.to_string());
        }
        if let Some(v) = props.get("Icon").and_then(PropertyValue::as_str) {
            self.icon = Some(v.to_string());
        }
        if let Some(v) = props.get("Class").and_then(PropertyValue::as_u32) {
            self.class = Some(v);
        }
        if let Some(v) = props.get("Paired").and_then(PropertyValue::as_bool) {
            self.paired = v;
        }
        if let Some(v) = props.get("Trusted").and_then(PropertyValue::as_bool) {
            self.trusted = v;
        }
        if let Some(v) = props.get("Bonded").and_then(PropertyValue::as_bool) {
            self.bonded = v;
        }
        if let Some(v) = props.get("Connected").and_then(PropertyValue::as_bool) {
            self.connected = v;
        }
    }

    /// Display name (alias if available, otherwise name).
    pub fn display_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    /// Whether the peer has reported a resolvable name yet.
    pub fn has_name(&self) -> bool {
        !self.name.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn sample_props() -> PropertyMap {
        let mut props = HashMap::new();
        props.insert("Address".to_string(), PropertyValue::from("AA:BB:CC:DD:EE:FF"));
        props.insert("Name".to_string(), PropertyValue::from("My Phone"));
        props.insert("Icon".to_string(), PropertyValue::from("phone"));
        props.insert("Class".to_string(), PropertyValue::U32(0x5a020c));
        props.insert("Paired".to_string(), PropertyValue::Bool(true));
        props.insert("Connected".to_string(), PropertyValue::Bool(true));
        props
    }

    #[test]
    fn builds_from_full_property_map() {
        let device = DeviceInfo::from_properties("/org/bluez/hci0/dev_AA", &sample_props());
        assert_eq!(device.path, "/org/bluez/hci0/dev_AA");
        assert_eq!(device.address, "AA:BB:CC:DD:EE:FF");
        assert_eq!(device.name, "My Phone");
        assert_eq!(device.icon.as_deref(), Some("phone"));
        assert_eq!(device.class, Some(0x5a020c));
        assert!(device.paired);
        assert!(device.connected);
        assert!(!device.trusted);
    }

    #[test]
    fn apply_merges_delta_without_clearing() {
        let mut device = DeviceInfo::from_properties("/d", &sample_props());

        let mut delta = HashMap::new();
        delta.insert("Connected".to_string(), PropertyValue::Bool(false));
        device.apply(&delta);

        assert!(!device.connected);
        // Untouched fields survive the merge.
        assert_eq!(device.name, "My Phone");
        assert!(device.paired);
    }

    #[test]
    fn display_name_prefers_alias() {
        let mut device = DeviceInfo::from_properties("/d", &sample_props());
        assert_eq!(device.display_name(), "My Phone");

        let mut delta = HashMap::new();
        delta.insert("Alias".to_string(), PropertyValue::from("Kitchen Phone"));
        device.apply(&delta);
        assert_eq!(device.display_name(), "Kitchen Phone");
    }

    #[test]
    fn serializes_without_empty_options() {
        let device = DeviceInfo::from_properties("/d", &PropertyMap::new());
        let json = serde_json::to_value(&device).unwrap();
        assert!(json.get("icon").is_none());
        assert!(json.get("class").is_none());
        assert_eq!(json["connected"], false);
    }
}
