//! zbus-backed transport against the BlueZ system service.
//!
//! All zvariant handling is confined to this module; the rest of the crate
//! only sees [`PropertyValue`] maps.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::debug;
use zbus::fdo::{ObjectManagerProxy, PropertiesProxy};
use zbus::names::InterfaceName;
use zbus::zvariant::{ObjectPath, OwnedValue, Value};
use zbus::{Connection, MatchRule, MessageStream, Proxy};

use crate::error::{BluetoothError, Result};
use crate::transport::{
    ManagedObjects, PropertiesChanged, PropertyMap, PropertyValue, Transport,
};

/// Well-known bus name of the BlueZ service.
pub const BLUEZ_SERVICE: &str = "org.bluez";

/// Capacity of the notification queue feeding the session manager.
const NOTIFICATION_QUEUE: usize = 64;

/// Transport over the system D-Bus.
pub struct DbusTransport {
    connection: Connection,
}

impl DbusTransport {
    /// Connect to the system bus.
    pub async fn system() -> Result<Self> {
        let connection = Connection::system()
            .await
            .map_err(|e| BluetoothError::Transport(format!("system bus: {e}")))?;
        Ok(Self { connection })
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    async fn properties_proxy(&self, path: &str) -> Result<PropertiesProxy<'static>> {
        PropertiesProxy::builder(&self.connection)
            .destination(BLUEZ_SERVICE)
            .map_err(|e| map_zbus_error(path, e))?
            .path(path.to_string())
            .map_err(|e| map_zbus_error(path, e))?
            .build()
            .await
            .map_err(|e| map_zbus_error(path, e))
    }
}

#[async_trait]
impl Transport for DbusTransport {
    async fn call(
        &self,
        path: &str,
        interface: &str,
        method: &str,
        args: &[PropertyValue],
    ) -> Result<()> {
        let proxy = Proxy::new(
            &self.connection,
            BLUEZ_SERVICE,
            path.to_string(),
            interface.to_string(),
        )
        .await
        .map_err(|e| map_zbus_error(path, e))?;

        match args {
            [] => proxy
                .call::<_, _, ()>(method, &())
                .await
                .map_err(|e| map_zbus_error(path, e)),
            [PropertyValue::ObjectPath(target)] => {
                let target = ObjectPath::try_from(target.as_str())
                    .map_err(|e| BluetoothError::Transport(e.to_string()))?;
                proxy
                    .call::<_, _, ()>(method, &(target,))
                    .await
                    .map_err(|e| map_zbus_error(path, e))
            }
            _ => Err(BluetoothError::Transport(format!(
                "unsupported argument shape for {interface}.{method}"
            ))),
        }
    }

    async fn get_property(
        &self,
        path: &str,
        interface: &str,
        name: &str,
    ) -> Result<PropertyValue> {
        let proxy = self.properties_proxy(path).await?;
        let interface = InterfaceName::try_from(interface)
            .map_err(|e| BluetoothError::Transport(e.to_string()))?;
        let value = proxy
            .get(interface, name)
            .await
            .map_err(|e| map_fdo_error(path, e))?;
        from_variant(&value).ok_or_else(|| {
            BluetoothError::Transport(format!("unrepresentable value for property {name}"))
        })
    }

    async fn set_property(
        &self,
        path: &str,
        interface: &str,
        name: &str,
        value: PropertyValue,
    ) -> Result<()> {
        let proxy = self.properties_proxy(path).await?;
        let interface = InterfaceName::try_from(interface)
            .map_err(|e| BluetoothError::Transport(e.to_string()))?;
        proxy
            .set(interface, name, to_variant(&value)?)
            .await
            .map_err(|e| map_fdo_error(path, e))
    }

    async fn get_all(&self, path: &str, interface: &str) -> Result<PropertyMap> {
        let proxy = self.properties_proxy(path).await?;
        let interface = InterfaceName::try_from(interface)
            .map_err(|e| BluetoothError::Transport(e.to_string()))?;
        let props = proxy
            .get_all(interface)
            .await
            .map_err(|e| map_fdo_error(path, e))?;
        Ok(convert_properties(&props))
    }

    async fn managed_objects(&self) -> Result<ManagedObjects> {
        let proxy = ObjectManagerProxy::builder(&self.connection)
            .destination(BLUEZ_SERVICE)
            .map_err(|e| map_zbus_error("/", e))?
            .path("/")
            .map_err(|e| map_zbus_error("/", e))?
            .build()
            .await
            .map_err(|e| map_zbus_error("/", e))?;

        let objects = proxy
            .get_managed_objects()
            .await
            .map_err(|e| map_fdo_error("/", e))?;

        let mut result = ManagedObjects::new();
        for (path, interfaces) in objects {
            let mut converted = HashMap::new();
            for (interface, props) in interfaces {
                converted.insert(interface.to_string(), convert_properties(&props));
            }
            result.insert(path.to_string(), converted);
        }
        Ok(result)
    }

    async fn subscribe(&self) -> Result<mpsc::Receiver<PropertiesChanged>> {
        let rule = MatchRule::builder()
            .msg_type(zbus::message::Type::Signal)
            .sender(BLUEZ_SERVICE)
            .map_err(|e| BluetoothError::Transport(e.to_string()))?
            .interface("org.freedesktop.DBus.Properties")
            .map_err(|e| BluetoothError::Transport(e.to_string()))?
            .member("PropertiesChanged")
            .map_err(|e| BluetoothError::Transport(e.to_string()))?
            .build();

        let mut stream =
            MessageStream::for_match_rule(rule, &self.connection, Some(NOTIFICATION_QUEUE))
                .await
                .map_err(|e| BluetoothError::Transport(e.to_string()))?;

        let (tx, rx) = mpsc::channel(NOTIFICATION_QUEUE);
        tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                let Ok(message) = message else { continue };
                let Some(change) = parse_notification(&message) else { continue };
                if tx.send(change).await.is_err() {
                    break;
                }
            }
            debug!("properties-changed stream ended");
        });
        Ok(rx)
    }
}

fn parse_notification(message: &zbus::Message) -> Option<PropertiesChanged> {
    let header = message.header();
    let path = header.path()?.to_string();
    let body = message.body();
    let (interface, changed, invalidated): (String, HashMap<String, OwnedValue>, Vec<String>) =
        body.deserialize().ok()?;
    Some(PropertiesChanged {
        path,
        interface,
        changed: convert_properties(&changed),
        invalidated,
    })
}

fn convert_properties(props: &HashMap<String, OwnedValue>) -> PropertyMap {
    props
        .iter()
        .filter_map(|(name, value)| from_variant(value).map(|v| (name.clone(), v)))
        .collect()
}

/// Convert a D-Bus value into the transport's value model.
///
/// Returns `None` for shapes BlueZ never emits (file descriptors, nested
/// structures with non-string keys).
fn from_variant(value: &Value<'_>) -> Option<PropertyValue> {
    Some(match value {
        Value::Bool(v) => PropertyValue::Bool(*v),
        Value::U8(v) => PropertyValue::U8(*v),
        Value::U16(v) => PropertyValue::U16(*v),
        Value::U32(v) => PropertyValue::U32(*v),
        Value::U64(v) => PropertyValue::U64(*v),
        Value::I16(v) => PropertyValue::I64(i64::from(*v)),
        Value::I32(v) => PropertyValue::I64(i64::from(*v)),
        Value::I64(v) => PropertyValue::I64(*v),
        Value::F64(v) => PropertyValue::F64(*v),
        Value::Str(v) => PropertyValue::Str(v.to_string()),
        Value::Signature(v) => PropertyValue::Str(v.to_string()),
        Value::ObjectPath(v) => PropertyValue::ObjectPath(v.to_string()),
        Value::Value(inner) => from_variant(inner)?,
        Value::Array(array) => {
            let owned = value.try_to_owned().ok()?;
            if array.element_signature().to_string() == "y" {
                PropertyValue::Bytes(Vec::<u8>::try_from(owned).ok()?)
            } else {
                let items = Vec::<OwnedValue>::try_from(owned).ok()?;
                PropertyValue::List(items.iter().filter_map(|v| from_variant(v)).collect())
            }
        }
        Value::Dict(_) => {
            let owned = value.try_to_owned().ok()?;
            let map = HashMap::<String, OwnedValue>::try_from(owned).ok()?;
            PropertyValue::Dict(
                map.iter()
                    .filter_map(|(k, v)| from_variant(v).map(|pv| (k.clone(), pv)))
                    .collect(),
            )
        }
        _ => return None,
    })
}

/// Convert a transport value into a D-Bus value for property writes.
fn to_variant(value: &PropertyValue) -> Result<Value<'static>> {
    Ok(match value {
        PropertyValue::Bool(v) => Value::from(*v),
        PropertyValue::U8(v) => Value::from(*v),
        PropertyValue::U16(v) => Value::from(*v),
        PropertyValue::U32(v) => Value::from(*v),
        PropertyValue::U64(v) => Value::from(*v),
        PropertyValue::I64(v) => Value::from(*v),
        PropertyValue::F64(v) => Value::from(*v),
        PropertyValue::Str(v) => Value::from(v.clone()),
        PropertyValue::ObjectPath(v) => Value::ObjectPath(
            ObjectPath::try_from(v.clone())
                .map_err(|e| BluetoothError::Transport(e.to_string()))?,
        ),
        PropertyValue::Bytes(v) => Value::from(v.clone()),
        PropertyValue::List(_) | PropertyValue::Dict(_) => {
            return Err(BluetoothError::Transport(
                "compound property writes are not supported".to_string(),
            ))
        }
    })
}

fn map_zbus_error(path: &str, err: zbus::Error) -> BluetoothError {
    if let zbus::Error::MethodError(name, _, _) = &err {
        if is_not_found_error(name.as_str()) {
            return BluetoothError::DeviceNotFound(path.to_string());
        }
    }
    BluetoothError::Transport(err.to_string())
}

fn map_fdo_error(path: &str, err: zbus::fdo::Error) -> BluetoothError {
    match &err {
        zbus::fdo::Error::UnknownObject(_) => BluetoothError::DeviceNotFound(path.to_string()),
        zbus::fdo::Error::ZBus(inner) => {
            if let zbus::Error::MethodError(name, _, _) = inner {
                if is_not_found_error(name.as_str()) {
                    return BluetoothError::DeviceNotFound(path.to_string());
                }
            }
            BluetoothError::Transport(err.to_string())
        }
        _ => BluetoothError::Transport(err.to_string()),
    }
}

fn is_not_found_error(name: &str) -> bool {
    matches!(
        name,
        "org.freedesktop.DBus.Error.UnknownObject" | "org.bluez.Error.DoesNotExist"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_round_trip() {
        let cases = [
            PropertyValue::Bool(true),
            PropertyValue::U16(900),
            PropertyValue::Str("hci0".to_string()),
            PropertyValue::Bytes(vec![0x21, 0x15]),
        ];
        for case in cases {
            let variant = to_variant(&case).unwrap();
            assert_eq!(from_variant(&variant), Some(case));
        }
    }

    #[test]
    fn nested_variant_is_unwrapped() {
        let inner = Value::from("playing");
        let wrapped = Value::Value(Box::new(inner));
        assert_eq!(
            from_variant(&wrapped),
            Some(PropertyValue::Str("playing".to_string()))
        );
    }

    #[test]
    fn object_path_conversion_validates() {
        let ok = PropertyValue::ObjectPath("/org/bluez/hci0".to_string());
        assert!(to_variant(&ok).is_ok());

        let bad = PropertyValue::ObjectPath("not a path".to_string());
        assert!(to_variant(&bad).is_err());
    }

    #[test]
    fn not_found_error_names() {
        assert!(is_not_found_error("org.freedesktop.DBus.Error.UnknownObject"));
        assert!(is_not_found_error("org.bluez.Error.DoesNotExist"));
        assert!(!is_not_found_error("org.bluez.Error.Failed"));
    }

    #[tokio::test]
    #[ignore = "requires BlueZ on the system bus"]
    async fn system_bus_connects() {
        let transport = DbusTransport::system().await;
        assert!(transport.is_ok());
    }
}
