//! Flat RPC command table.
//!
//! Maps `bluetooth.*` command names to control-surface operations with JSON
//! params and results, shaped for a JSON-RPC host boundary. The HTTP
//! transport itself belongs to the host, not to this crate.

use serde::Serialize;
use serde_json::{json, Value};

use crate::control::Controller;
use crate::error::BluetoothError;

/// JSON-RPC-shaped error object.
#[derive(Debug, Clone, Serialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    pub fn unknown_method(method: &str) -> Self {
        Self {
            code: -32601,
            message: format!("unknown method: {method}"),
        }
    }

    pub fn invalid_params(detail: &str) -> Self {
        Self {
            code: -32602,
            message: format!("invalid params: {detail}"),
        }
    }
}

impl From<BluetoothError> for RpcError {
    fn from(err: BluetoothError) -> Self {
        let code = match &err {
            BluetoothError::DeviceNotFound(_) => -32001,
            BluetoothError::Transport(_) => -32002,
            BluetoothError::AdapterOperationFailed { .. } => -32003,
            BluetoothError::MetadataParse { .. } => -32004,
            BluetoothError::AdapterNotFound | BluetoothError::Config(_) => -32000,
        };
        Self {
            code,
            message: err.to_string(),
        }
    }
}

/// Command names served by [`CommandTable::dispatch`].
pub const COMMANDS: &[&str] = &[
    "bluetooth.adapter.power",
    "bluetooth.adapter.set_name",
    "bluetooth.adapter.set_discoverable",
    "bluetooth.devices.scan",
    "bluetooth.devices.list",
    "bluetooth.devices.get",
    "bluetooth.devices.connect",
    "bluetooth.devices.disconnect",
    "bluetooth.devices.trust",
    "bluetooth.devices.remove",
    "bluetooth.player.get",
    "bluetooth.player.pcm_info",
    "bluetooth.player.play",
    "bluetooth.player.pause",
    "bluetooth.player.stop",
    "bluetooth.player.previous",
    "bluetooth.player.next",
];

/// Flat command namespace over one [`Controller`].
#[derive(Clone)]
pub struct CommandTable {
    controller: Controller,
}

impl CommandTable {
    pub fn new(controller: Controller) -> Self {
        Self { controller }
    }

    /// Invoke one command with keyed JSON arguments.
    pub async fn dispatch(&self, method: &str, params: &Value) -> Result<Value, RpcError> {
        let c = &self.controller;
        match method {
            "bluetooth.adapter.power" => {
                let powered = bool_param(params, "powered")?;
                c.adapter_power(powered).await?;
                Ok(ok_result())
            }
            "bluetooth.adapter.set_name" => {
                let name = str_param(params, "name")?;
                c.adapter_set_name(name).await?;
                Ok(ok_result())
            }
            "bluetooth.adapter.set_discoverable" => {
                c.set_discoverable().await?;
                Ok(ok_result())
            }
            "bluetooth.devices.scan" => {
                let devices = c.discover_devices().await?;
                Ok(json!({ "devices": devices }))
            }
            "bluetooth.devices.list" => {
                let devices = c.list_devices().await?;
                Ok(json!({ "devices": devices }))
            }
            "bluetooth.devices.get" => {
                let device = c.get_device(opt_str_param(params, "path")).await?;
                Ok(json!({ "device": device }))
            }
            "bluetooth.devices.connect" => {
                let device = c.connect_device(str_param(params, "path")?).await?;
                Ok(json!({ "device": device }))
            }
            "bluetooth.devices.disconnect" => {
                c.disconnect_device(str_param(params, "path")?).await?;
                Ok(ok_result())
            }
            "bluetooth.devices.trust" => {
                c.trust_device(str_param(params, "path")?).await?;
                Ok(ok_result())
            }
            "bluetooth.devices.remove" => {
                c.remove_device(str_param(params, "path")?).await?;
                Ok(ok_result())
            }
            "bluetooth.player.get" => {
                let player = c.get_player(opt_str_param(params, "path")).await?;
                Ok(json!({ "player": player }))
            }
            "bluetooth.player.pcm_info" => {
                let info = c.get_audio_pcm_info(opt_str_param(params, "path")).await?;
                Ok(json!({ "pcm": info }))
            }
            "bluetooth.player.play" => issued(c.play(opt_str_param(params, "path")).await?),
            "bluetooth.player.pause" => issued(c.pause(opt_str_param(params, "path")).await?),
            "bluetooth.player.stop" => issued(c.stop(opt_str_param(params, "path")).await?),
            "bluetooth.player.previous" => {
                issued(c.previous(opt_str_param(params, "path")).await?)
            }
            "bluetooth.player.next" => issued(c.next(opt_str_param(params, "path")).await?),
            other => Err(RpcError::unknown_method(other)),
        }
    }
}

fn ok_result() -> Value {
    json!({ "ok": true })
}

fn issued(sent: bool) -> Result<Value, RpcError> {
    Ok(json!({ "issued": sent }))
}

fn opt_str_param<'a>(params: &'a Value, key: &str) -> Option<&'a str> {
    params.get(key).and_then(Value::as_str)
}

fn str_param<'a>(params: &'a Value, key: &str) -> Result<&'a str, RpcError> {
    opt_str_param(params, key).ok_or_else(|| RpcError::invalid_params(key))
}

fn bool_param(params: &Value, key: &str) -> Result<bool, RpcError> {
    params
        .get(key)
        .and_then(Value::as_bool)
        .ok_or_else(|| RpcError::invalid_params(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_by_taxonomy() {
        let err: RpcError = BluetoothError::DeviceNotFound("/x".to_string()).into();
        assert_eq!(err.code, -32001);

        let err: RpcError = BluetoothError::Transport("down".to_string()).into();
        assert_eq!(err.code, -32002);

        let err: RpcError = BluetoothError::operation(
            "connect",
            "/x",
            BluetoothError::Transport("down".to_string()),
        )
        .into();
        assert_eq!(err.code, -32003);
        assert!(err.message.contains("connect failed"));
    }

    #[test]
    fn param_extraction() {
        let params = json!({ "path": "/hci0/dev_A", "powered": true });
        assert_eq!(str_param(&params, "path").unwrap(), "/hci0/dev_A");
        assert!(bool_param(&params, "powered").unwrap());
        assert!(opt_str_param(&params, "missing").is_none());

        let err = str_param(&params, "missing").unwrap_err();
        assert_eq!(err.code, -32602);
    }

    #[test]
    fn command_list_is_flat_bluetooth_namespace() {
        assert!(COMMANDS.iter().all(|name| name.starts_with("bluetooth.")));
        assert!(COMMANDS.contains(&"bluetooth.devices.connect"));
    }
}
