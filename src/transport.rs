//! Transport seam between the session manager and the system Bluetooth
//! service.
//!
//! Everything above this module is bus-agnostic: the policy engine, registry
//! and playback bridge only ever see [`PropertyValue`] maps and the
//! [`Transport`] trait. The zbus-backed implementation lives in
//! [`crate::dbus`]; tests drive the engine through an in-memory mock.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::Result;

/// Well-known BlueZ interface names.
pub const ADAPTER_INTERFACE: &str = "org.bluez.Adapter1";
pub const DEVICE_INTERFACE: &str = "org.bluez.Device1";
pub const MEDIA_PLAYER_INTERFACE: &str = "org.bluez.MediaPlayer1";
pub const MEDIA_TRANSPORT_INTERFACE: &str = "org.bluez.MediaTransport1";

/// A property value crossing the transport seam.
///
/// Mirrors the handful of D-Bus variant shapes BlueZ actually emits.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Bool(bool),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    I64(i64),
    F64(f64),
    Str(String),
    ObjectPath(String),
    Bytes(Vec<u8>),
    List(Vec<PropertyValue>),
    Dict(HashMap<String, PropertyValue>),
}

/// Property name → value mapping for one interface.
pub type PropertyMap = HashMap<String, PropertyValue>;

/// Bulk enumeration result: object path → interface → properties.
pub type ManagedObjects = HashMap<String, HashMap<String, PropertyMap>>;

impl PropertyValue {
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(v) | Self::ObjectPath(v) => Some(v),
            _ => None,
        }
    }

    /// Numeric widening across the unsigned/signed variants BlueZ uses.
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Self::U8(v) => Some(u32::from(*v)),
            Self::U16(v) => Some(u32::from(*v)),
            Self::U32(v) => Some(*v),
            Self::U64(v) => u32::try_from(*v).ok(),
            Self::I64(v) => u32::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::U8(v) => Some(i64::from(*v)),
            Self::U16(v) => Some(i64::from(*v)),
            Self::U32(v) => Some(i64::from(*v)),
            Self::U64(v) => i64::try_from(*v).ok(),
            Self::I64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Bytes(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&HashMap<String, PropertyValue>> {
        match self {
            Self::Dict(v) => Some(v),
            _ => None,
        }
    }

    /// Lossless conversion for raw event passthrough and RPC results.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::{json, Value};
        match self {
            Self::Bool(v) => json!(v),
            Self::U8(v) => json!(v),
            Self::U16(v) => json!(v),
            Self::U32(v) => json!(v),
            Self::U64(v) => json!(v),
            Self::I64(v) => json!(v),
            Self::F64(v) => json!(v),
            Self::Str(v) | Self::ObjectPath(v) => json!(v),
            Self::Bytes(v) => json!(v),
            Self::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Dict(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

impl From<u8> for PropertyValue {
    fn from(v: u8) -> Self {
        Self::U8(v)
    }
}

impl From<u16> for PropertyValue {
    fn from(v: u16) -> Self {
        Self::U16(v)
    }
}

impl From<u32> for PropertyValue {
    fn from(v: u32) -> Self {
        Self::U32(v)
    }
}

impl From<Vec<u8>> for PropertyValue {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

/// Find the first object under `root` (by path order) exposing `interface`.
///
/// This is the capability query used before invoking media methods: branch
/// on declared interface presence instead of speculative invocation.
pub fn find_interface_under<'a>(
    objects: &'a ManagedObjects,
    root: &str,
    interface: &str,
) -> Option<&'a str> {
    let prefix = format!("{root}/");
    let mut candidates: Vec<&str> = objects
        .iter()
        .filter(|(path, interfaces)| {
            (path.as_str() == root || path.starts_with(&prefix))
                && interfaces.contains_key(interface)
        })
        .map(|(path, _)| path.as_str())
        .collect();
    candidates.sort_unstable();
    candidates.first().copied()
}

/// One `PropertiesChanged` notification from the bus.
#[derive(Debug, Clone)]
pub struct PropertiesChanged {
    /// Object path the change originated from.
    pub path: String,
    /// Interface the changed properties belong to.
    pub interface: String,
    /// Changed property values.
    pub changed: PropertyMap,
    /// Properties invalidated without a new value.
    pub invalidated: Vec<String>,
}

/// Thin IPC binding to the system Bluetooth service.
///
/// Method calls and property access may block on I/O; callers must not hold
/// shared state locks across them. Notifications from [`subscribe`] are
/// delivered through a single channel in arrival order.
///
/// [`subscribe`]: Transport::subscribe
#[async_trait]
pub trait Transport: Send + Sync {
    /// Invoke a method on a remote object.
    ///
    /// Fails with [`crate::BluetoothError::Transport`] on IPC failure and
    /// [`crate::BluetoothError::DeviceNotFound`] when the object is gone.
    async fn call(
        &self,
        path: &str,
        interface: &str,
        method: &str,
        args: &[PropertyValue],
    ) -> Result<()>;

    /// Read a single property.
    async fn get_property(&self, path: &str, interface: &str, name: &str)
        -> Result<PropertyValue>;

    /// Write a single property.
    async fn set_property(
        &self,
        path: &str,
        interface: &str,
        name: &str,
        value: PropertyValue,
    ) -> Result<()>;

    /// Read all properties of one interface on one object.
    async fn get_all(&self, path: &str, interface: &str) -> Result<PropertyMap>;

    /// Enumerate every object the service manages.
    async fn managed_objects(&self) -> Result<ManagedObjects>;

    /// Subscribe to property-change notifications.
    ///
    /// The receiver sees every matching notification exactly once, serially.
    async fn subscribe(&self) -> Result<mpsc::Receiver<PropertiesChanged>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    mod property_value {
        use super::*;

        #[test]
        fn numeric_widening() {
            assert_eq!(PropertyValue::U8(7).as_u32(), Some(7));
            assert_eq!(PropertyValue::U16(300).as_u32(), Some(300));
            assert_eq!(PropertyValue::U32(70_000).as_u32(), Some(70_000));
            assert_eq!(PropertyValue::I64(-1).as_u32(), None);
            assert_eq!(PropertyValue::Str("5".to_string()).as_u32(), None);
        }

        #[test]
        fn string_accessor_covers_object_paths() {
            let path = PropertyValue::ObjectPath("/org/bluez/hci0".to_string());
            assert_eq!(path.as_str(), Some("/org/bluez/hci0"));
            assert_eq!(PropertyValue::Bool(true).as_str(), None);
        }

        #[test]
        fn json_conversion_preserves_structure() {
            let mut dict = HashMap::new();
            dict.insert("Title".to_string(), PropertyValue::from("song"));
            dict.insert("TrackNumber".to_string(), PropertyValue::U32(3));
            let value = PropertyValue::Dict(dict);

            let json = value.to_json();
            assert_eq!(json["Title"], "song");
            assert_eq!(json["TrackNumber"], 3);
        }

        #[test]
        fn find_interface_under_prefers_lowest_path() {
            let mut objects = ManagedObjects::new();
            let player = |n: u32| {
                let mut interfaces = HashMap::new();
                interfaces.insert(MEDIA_PLAYER_INTERFACE.to_string(), PropertyMap::new());
                (format!("/hci0/dev_A/player{n}"), interfaces)
            };
            let (p1, i1) = player(1);
            let (p0, i0) = player(0);
            objects.insert(p1, i1);
            objects.insert(p0, i0);
            objects.insert("/hci0/dev_B/player0".to_string(), {
                let mut interfaces = HashMap::new();
                interfaces.insert(MEDIA_PLAYER_INTERFACE.to_string(), PropertyMap::new());
                interfaces
            });

            assert_eq!(
                find_interface_under(&objects, "/hci0/dev_A", MEDIA_PLAYER_INTERFACE),
                Some("/hci0/dev_A/player0")
            );
            assert_eq!(
                find_interface_under(&objects, "/hci0/dev_C", MEDIA_PLAYER_INTERFACE),
                None
            );
        }

        #[test]
        fn from_impls_build_expected_variants() {
            assert_eq!(PropertyValue::from(true), PropertyValue::Bool(true));
            assert_eq!(
                PropertyValue::from("x"),
                PropertyValue::Str("x".to_string())
            );
            assert_eq!(
                PropertyValue::from(vec![1u8, 2]),
                PropertyValue::Bytes(vec![1, 2])
            );
        }
    }
}
