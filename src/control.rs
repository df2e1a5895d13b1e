//! Command surface exposed to the host's RPC layer.
//!
//! Thin wrapper over the session manager. Mutating media commands against a
//! peer that vanished (or never had a media player) degrade to a safe no-op;
//! explicit connect/trust/remove propagate typed errors instead.

use serde_json::{json, Value};
use tracing::debug;

use crate::codec::parse_a2dp_config;
use crate::device::DeviceInfo;
use crate::error::Result;
use crate::session::SessionManager;
use crate::transport::{
    find_interface_under, MEDIA_PLAYER_INTERFACE, MEDIA_TRANSPORT_INTERFACE,
};

/// Control surface over one managed adapter.
#[derive(Clone)]
pub struct Controller {
    manager: SessionManager,
}

impl Controller {
    pub fn new(manager: SessionManager) -> Self {
        Self { manager }
    }

    pub fn manager(&self) -> &SessionManager {
        &self.manager
    }

    // Adapter -----------------------------------------------------------

    pub async fn adapter_power(&self, powered: bool) -> Result<()> {
        self.manager.adapter_power(powered).await
    }

    pub async fn adapter_set_name(&self, name: &str) -> Result<()> {
        self.manager.adapter_set_name(name).await
    }

    pub async fn set_discoverable(&self) -> Result<()> {
        self.manager.set_discoverable().await
    }

    // Devices -----------------------------------------------------------

    pub async fn discover_devices(&self) -> Result<Vec<DeviceInfo>> {
        self.manager.discover_devices().await
    }

    pub async fn list_devices(&self) -> Result<Vec<DeviceInfo>> {
        self.manager.list_devices().await
    }

    pub async fn get_device(&self, path: Option<&str>) -> Result<Option<DeviceInfo>> {
        self.manager.get_device(path).await
    }

    pub async fn connect_device(&self, path: &str) -> Result<DeviceInfo> {
        self.manager.connect(path).await
    }

    pub async fn disconnect_device(&self, path: &str) -> Result<()> {
        self.manager.disconnect(path).await
    }

    pub async fn trust_device(&self, path: &str) -> Result<()> {
        self.manager.trust(path).await
    }

    pub async fn remove_device(&self, path: &str) -> Result<()> {
        self.manager.remove(path).await
    }

    // Media player ------------------------------------------------------

    /// Current media-player properties of a device, or `None` when the
    /// device exposes no player.
    pub async fn get_player(&self, device: Option<&str>) -> Result<Option<Value>> {
        let Some(player) = self.find_player(device).await? else {
            return Ok(None);
        };
        match self
            .manager
            .transport()
            .get_all(&player, MEDIA_PLAYER_INTERFACE)
            .await
        {
            Ok(props) => {
                let fields: serde_json::Map<String, Value> = props
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect();
                Ok(Some(json!({ "path": player, "properties": fields })))
            }
            Err(err) if err.is_not_found() => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Negotiated PCM parameters of the active media transport.
    pub async fn get_audio_pcm_info(&self, device: Option<&str>) -> Result<Option<Value>> {
        let Some(device_path) = self.resolve_device(device).await? else {
            return Ok(None);
        };
        let objects = self.manager.transport().managed_objects().await?;
        let Some(media) =
            find_interface_under(&objects, &device_path, MEDIA_TRANSPORT_INTERFACE)
        else {
            return Ok(None);
        };
        let media = media.to_string();

        let transport = self.manager.transport();
        let codec = match transport
            .get_property(&media, MEDIA_TRANSPORT_INTERFACE, "Codec")
            .await
        {
            Ok(value) => value.as_u32().unwrap_or_default() as u8,
            Err(err) if err.is_not_found() => return Ok(None),
            Err(err) => return Err(err),
        };
        let configuration = transport
            .get_property(&media, MEDIA_TRANSPORT_INTERFACE, "Configuration")
            .await
            .ok()
            .and_then(|v| v.as_bytes().map(<[u8]>::to_vec))
            .unwrap_or_default();

        let profile = parse_a2dp_config(codec, &configuration);
        Ok(Some(json!({
            "transport": media,
            "codec": profile.codec.to_string(),
            "sample_rate": profile.sample_rate,
            "channel_mode": profile.channel_mode.map(|m| m.to_string()),
        })))
    }

    // Transport controls ------------------------------------------------
    //
    // All of these return Ok(false) when the target has no active player or
    // vanished between enumeration and action.

    pub async fn play(&self, device: Option<&str>) -> Result<bool> {
        self.player_command("Play", device).await
    }

    pub async fn pause(&self, device: Option<&str>) -> Result<bool> {
        self.player_command("Pause", device).await
    }

    pub async fn stop(&self, device: Option<&str>) -> Result<bool> {
        self.player_command("Stop", device).await
    }

    pub async fn previous(&self, device: Option<&str>) -> Result<bool> {
        self.player_command("Previous", device).await
    }

    pub async fn next(&self, device: Option<&str>) -> Result<bool> {
        self.player_command("Next", device).await
    }

    async fn player_command(&self, method: &str, device: Option<&str>) -> Result<bool> {
        let Some(player) = self.find_player(device).await? else {
            debug!("{method}: no active media player, ignoring");
            return Ok(false);
        };
        match self
            .manager
            .transport()
            .call(&player, MEDIA_PLAYER_INTERFACE, method, &[])
            .await
        {
            Ok(()) => Ok(true),
            Err(err) if err.is_not_found() => {
                debug!("{method}: player {player} vanished, ignoring");
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    /// Resolve a device argument: explicit path, or the session owner.
    async fn resolve_device(&self, device: Option<&str>) -> Result<Option<String>> {
        match device {
            Some(path) => Ok(Some(path.to_string())),
            None => Ok(self.manager.connected_device().map(|d| d.path)),
        }
    }

    /// Locate the media player object under a device, by declared interface.
    async fn find_player(&self, device: Option<&str>) -> Result<Option<String>> {
        let Some(device_path) = self.resolve_device(device).await? else {
            return Ok(None);
        };
        let objects = self.manager.transport().managed_objects().await?;
        Ok(
            find_interface_under(&objects, &device_path, MEDIA_PLAYER_INTERFACE)
                .map(str::to_string),
        )
    }
}
