//! Session policy engine.
//!
//! Owns the single-active-device policy: incoming connections are
//! auto-trusted and every other connected peer is swept off, discovery runs
//! in fixed blocking windows, and raw property-change notifications are
//! mapped to registry updates, playback transitions and host events.
//!
//! Concurrency model: one dedicated worker drains the transport's
//! notification channel serially; commands run on their callers' tasks. The
//! registry, link state and playback session share one mutex, held only for
//! in-memory mutation and never across an IPC round-trip.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::ManagerConfig;
use crate::device::DeviceInfo;
use crate::error::{BluetoothError, Result};
use crate::events::{EventSink, SessionEvent};
use crate::playback::{PlaybackSession, PlaybackTarget, Track};
use crate::registry::DeviceRegistry;
use crate::transport::{
    find_interface_under, PropertiesChanged, PropertyMap, PropertyValue, Transport,
    ADAPTER_INTERFACE, DEVICE_INTERFACE, MEDIA_TRANSPORT_INTERFACE,
};

/// Link state of the managed adapter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkState {
    /// No device connected, no discovery running.
    Idle,
    /// A discovery window is open.
    Discovering,
    /// One device owns the session.
    Connected(String),
}

struct SessionState {
    registry: DeviceRegistry,
    link: LinkState,
    session: PlaybackSession,
}

/// Supervisory layer over the system Bluetooth service.
///
/// Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct SessionManager {
    transport: Arc<dyn Transport>,
    events: Arc<dyn EventSink>,
    playback: Arc<dyn PlaybackTarget>,
    config: ManagerConfig,
    state: Arc<Mutex<SessionState>>,
}

impl SessionManager {
    pub fn new(
        transport: Arc<dyn Transport>,
        events: Arc<dyn EventSink>,
        playback: Arc<dyn PlaybackTarget>,
        config: ManagerConfig,
    ) -> Self {
        Self {
            transport,
            events,
            playback,
            config,
            state: Arc::new(Mutex::new(SessionState {
                registry: DeviceRegistry::new(),
                link: LinkState::Idle,
                session: PlaybackSession::new(),
            })),
        }
    }

    /// Bring up the adapter and start the notification worker.
    pub async fn start(&self) -> Result<()> {
        let name = self.config.name.clone();
        self.adapter_set_name(&name).await?;
        self.adapter_power(true).await?;
        self.set_discoverable().await?;

        let rx = self.transport.subscribe().await?;
        let worker = self.clone();
        tokio::spawn(async move {
            worker.notification_loop(rx).await;
        });

        if self.config.autoconnect {
            let manager = self.clone();
            tokio::spawn(async move {
                manager.autoconnect_last_device().await;
            });
        }

        info!("Bluetooth session manager started");
        Ok(())
    }

    /// Access the underlying transport (shared with the control surface).
    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::clone(&self.transport)
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Current link state snapshot.
    pub fn link_state(&self) -> LinkState {
        self.lock().link.clone()
    }

    /// The registry's current view of the connected device, if any.
    pub fn connected_device(&self) -> Option<DeviceInfo> {
        self.lock().registry.connected_device().cloned()
    }

    // Adapter commands --------------------------------------------------

    pub async fn adapter_power(&self, powered: bool) -> Result<()> {
        let path = self.config.adapter_path.clone();
        self.transport
            .set_property(&path, ADAPTER_INTERFACE, "Powered", powered.into())
            .await
            .map_err(|e| BluetoothError::operation("power", path, e))?;
        debug!("adapter powered {}", if powered { "on" } else { "off" });
        Ok(())
    }

    pub async fn adapter_set_name(&self, name: &str) -> Result<()> {
        let path = self.config.adapter_path.clone();
        self.transport
            .set_property(&path, ADAPTER_INTERFACE, "Alias", name.into())
            .await
            .map_err(|e| BluetoothError::operation("set_name", path, e))?;
        info!("adapter alias set to {name}");
        Ok(())
    }

    /// Make the adapter discoverable and pairable.
    pub async fn set_discoverable(&self) -> Result<()> {
        let path = self.config.adapter_path.clone();
        self.transport
            .set_property(&path, ADAPTER_INTERFACE, "Discoverable", true.into())
            .await
            .map_err(|e| BluetoothError::operation("set_discoverable", path.clone(), e))?;
        self.transport
            .set_property(&path, ADAPTER_INTERFACE, "Pairable", true.into())
            .await
            .map_err(|e| BluetoothError::operation("set_discoverable", path, e))?;
        Ok(())
    }

    // Discovery ---------------------------------------------------------

    /// Run one blocking discovery window and return the device snapshot.
    ///
    /// The window always terminates: StopDiscovery runs unconditionally once
    /// the timer fires, even when no devices appeared.
    pub async fn discover_devices(&self) -> Result<Vec<DeviceInfo>> {
        let adapter = self.config.adapter_path.clone();

        self.lock().link = LinkState::Discovering;
        let result = self.run_discovery_window(&adapter).await;

        let mut state = self.lock();
        state.link = match state.registry.connected_device() {
            Some(device) => LinkState::Connected(device.path.clone()),
            None => LinkState::Idle,
        };
        drop(state);

        result
    }

    async fn run_discovery_window(&self, adapter: &str) -> Result<Vec<DeviceInfo>> {
        self.adapter_power(true).await?;
        self.set_discoverable().await?;

        self.transport
            .call(adapter, ADAPTER_INTERFACE, "StartDiscovery", &[])
            .await
            .map_err(|e| BluetoothError::operation("discover", adapter.to_string(), e))?;

        info!(
            "scanning for Bluetooth devices ({}s window)",
            self.config.discovery_window_secs
        );
        tokio::time::sleep(self.config.discovery_window()).await;

        if let Err(err) = self
            .transport
            .call(adapter, ADAPTER_INTERFACE, "StopDiscovery", &[])
            .await
        {
            warn!("failed to stop discovery: {err}");
        }

        let objects = self
            .transport
            .managed_objects()
            .await
            .map_err(|e| BluetoothError::operation("discover", adapter.to_string(), e))?;

        let devices = self.lock().registry.refresh(&objects);
        info!("found {} Bluetooth devices", devices.len());
        Ok(devices)
    }

    // Registry views ----------------------------------------------------

    /// Re-enumerate the bus and return the rebuilt device list.
    pub async fn list_devices(&self) -> Result<Vec<DeviceInfo>> {
        let objects = self.transport.managed_objects().await?;
        Ok(self.lock().registry.refresh(&objects))
    }

    /// Live device lookup.
    ///
    /// With a path, queries the bus directly and fails with `DeviceNotFound`
    /// for stale paths. Without one, returns the currently connected device.
    pub async fn get_device(&self, path: Option<&str>) -> Result<Option<DeviceInfo>> {
        match path {
            Some(path) => {
                let props = self.transport.get_all(path, DEVICE_INTERFACE).await?;
                let device = DeviceInfo::from_properties(path, &props);
                self.lock().registry.upsert(path, &props);
                Ok(Some(device))
            }
            None => {
                let objects = self.transport.managed_objects().await?;
                let mut state = self.lock();
                state.registry.refresh(&objects);
                Ok(state.registry.connected_device().cloned())
            }
        }
    }

    // Device commands ---------------------------------------------------

    /// Explicitly connect a device, enforcing single-active-device policy.
    pub async fn connect(&self, path: &str) -> Result<DeviceInfo> {
        self.establish_session(path, true).await
    }

    /// Disconnect a device. A vanished peer is a tolerated no-op.
    pub async fn disconnect(&self, path: &str) -> Result<()> {
        match self
            .transport
            .call(path, DEVICE_INTERFACE, "Disconnect", &[])
            .await
        {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {
                debug!("disconnect: {path} already gone");
            }
            Err(err) => {
                return Err(BluetoothError::operation("disconnect", path.to_string(), err))
            }
        }
        // Local catch-up; the bus notification confirms it asynchronously.
        self.close_session(path, false).await;
        Ok(())
    }

    /// Mark a device trusted.
    pub async fn trust(&self, path: &str) -> Result<()> {
        self.transport
            .set_property(path, DEVICE_INTERFACE, "Trusted", true.into())
            .await
            .map_err(|e| BluetoothError::operation("trust", path.to_string(), e))
    }

    /// Remove a device at the adapter level and evict it from the registry.
    ///
    /// Removing the session owner also tears down the playback session.
    pub async fn remove(&self, path: &str) -> Result<()> {
        let adapter = self.config.adapter_path.clone();
        self.transport
            .call(
                &adapter,
                ADAPTER_INTERFACE,
                "RemoveDevice",
                &[PropertyValue::ObjectPath(path.to_string())],
            )
            .await
            .map_err(|e| BluetoothError::operation("remove", path.to_string(), e))?;

        let events = {
            let mut state = self.lock();
            state.registry.remove(path);
            if state.link == LinkState::Connected(path.to_string()) {
                state.link = LinkState::Idle;
                state.session.teardown()
            } else {
                Vec::new()
            }
        };
        if !events.is_empty() {
            self.playback.stop().await;
            self.playback.set_metadata(None).await;
        }
        for event in &events {
            self.events.emit(event).await;
        }
        info!("removed device {path}");
        Ok(())
    }

    // Session transitions -----------------------------------------------

    /// Make `path` the session owner: trust it, sweep every other connected
    /// peer, and finalize registry/link state.
    async fn establish_session(&self, path: &str, explicit: bool) -> Result<DeviceInfo> {
        match self
            .transport
            .set_property(path, DEVICE_INTERFACE, "Trusted", true.into())
            .await
        {
            Ok(()) => {}
            Err(err) if explicit => {
                return Err(BluetoothError::operation("trust", path.to_string(), err))
            }
            Err(err) => warn!("failed to trust {path}: {err}"),
        }

        if explicit {
            self.transport
                .call(path, DEVICE_INTERFACE, "Connect", &[])
                .await
                .map_err(|e| BluetoothError::operation("connect", path.to_string(), e))?;
        }

        self.exclusivity_sweep(path).await;

        // Enrich the record from live properties before finalizing.
        let live_props = self.transport.get_all(path, DEVICE_INTERFACE).await.ok();

        let device = {
            let mut state = self.lock();
            if let Some(props) = &live_props {
                state.registry.upsert(path, props);
            }
            let mut connected = PropertyMap::new();
            connected.insert("Connected".to_string(), PropertyValue::Bool(true));
            state.registry.upsert(path, &connected);
            state.registry.mark_exclusive(path);
            state.link = LinkState::Connected(path.to_string());
            state
                .registry
                .get(path)
                .cloned()
                .unwrap_or_else(|| DeviceInfo::from_properties(path, &PropertyMap::new()))
        };

        if let Some(volume) = self.config.initial_volume {
            self.apply_initial_volume(path, volume).await;
        }

        info!("device {} owns the session", device.display_name());
        self.events
            .emit(&SessionEvent::DeviceConnected(device.clone()))
            .await;
        Ok(device)
    }

    /// Disconnect every other device whose connected flag is set.
    ///
    /// Best-effort: a stale peer that refuses to disconnect never aborts the
    /// new session.
    async fn exclusivity_sweep(&self, keep: &str) {
        let objects = match self.transport.managed_objects().await {
            Ok(objects) => objects,
            Err(err) => {
                warn!("exclusivity sweep skipped, enumeration failed: {err}");
                return;
            }
        };

        for (path, interfaces) in &objects {
            if path == keep {
                continue;
            }
            let connected = interfaces
                .get(DEVICE_INTERFACE)
                .and_then(|props| props.get("Connected"))
                .and_then(PropertyValue::as_bool)
                .unwrap_or(false);
            if !connected {
                continue;
            }
            info!("disconnecting stale peer {path}");
            if let Err(err) = self
                .transport
                .call(path, DEVICE_INTERFACE, "Disconnect", &[])
                .await
            {
                warn!("failed to disconnect stale peer {path}: {err}");
            }
        }
    }

    /// Tear down state for a disconnected peer.
    async fn close_session(&self, path: &str, from_notification: bool) {
        let (was_owner, events) = {
            let mut state = self.lock();
            let mut disconnected = PropertyMap::new();
            disconnected.insert("Connected".to_string(), PropertyValue::Bool(false));
            state.registry.upsert(path, &disconnected);

            let was_owner = state.link == LinkState::Connected(path.to_string());
            if was_owner {
                state.link = LinkState::Idle;
                (true, state.session.teardown())
            } else {
                (false, Vec::new())
            }
        };

        if was_owner {
            self.playback.stop().await;
            self.playback.set_metadata(None).await;
        }
        for event in &events {
            self.events.emit(event).await;
        }
        if from_notification {
            self.events
                .emit(&SessionEvent::DeviceDisconnected {
                    path: path.to_string(),
                })
                .await;
        }
    }

    async fn apply_initial_volume(&self, device_path: &str, volume: u16) {
        let objects = match self.transport.managed_objects().await {
            Ok(objects) => objects,
            Err(_) => return,
        };
        let Some(transport_path) =
            find_interface_under(&objects, device_path, MEDIA_TRANSPORT_INTERFACE)
        else {
            return;
        };
        let transport_path = transport_path.to_string();
        if let Err(err) = self
            .transport
            .set_property(&transport_path, MEDIA_TRANSPORT_INTERFACE, "Volume", volume.into())
            .await
        {
            debug!("could not push initial volume to {transport_path}: {err}");
        }
    }

    async fn autoconnect_last_device(&self) {
        let objects = match self.transport.managed_objects().await {
            Ok(objects) => objects,
            Err(err) => {
                warn!("autoconnect skipped, enumeration failed: {err}");
                return;
            }
        };
        let mut candidates: Vec<&String> = objects
            .iter()
            .filter(|(_, interfaces)| {
                interfaces.get(DEVICE_INTERFACE).is_some_and(|props| {
                    props.get("Trusted").and_then(PropertyValue::as_bool) == Some(true)
                        && props.get("Paired").and_then(PropertyValue::as_bool) == Some(true)
                })
            })
            .map(|(path, _)| path)
            .collect();
        candidates.sort();

        if let Some(path) = candidates.first() {
            info!("autoconnecting trusted device {path}");
            if let Err(err) = self.connect(path).await {
                warn!("autoconnect to {path} failed: {err}");
            }
        }
    }

    // Notification handling ---------------------------------------------

    async fn notification_loop(self, mut rx: mpsc::Receiver<PropertiesChanged>) {
        while let Some(change) = rx.recv().await {
            self.handle_notification(change).await;
        }
        debug!("notification stream closed");
    }

    /// Dispatch one property-change notification.
    ///
    /// Keys are interpreted independently of arrival order; a single
    /// notification may trigger several branches, and a failure handling one
    /// key never prevents the sibling keys from running.
    async fn handle_notification(&self, change: PropertiesChanged) {
        if change.interface == DEVICE_INTERFACE {
            self.lock().registry.upsert(&change.path, &change.changed);
        }

        if let Some(state) = change.changed.get("State").and_then(PropertyValue::as_str) {
            self.events
                .emit(&SessionEvent::PlaybackStateChanged(state.to_string()))
                .await;
        }

        if let Some(status) = change.changed.get("Status").and_then(PropertyValue::as_str) {
            self.handle_status(status).await;
        }

        if let Some(connected) = change
            .changed
            .get("Connected")
            .and_then(PropertyValue::as_bool)
        {
            if change.changed.contains_key("Player") {
                // Media-player handshake on an existing session, not a new
                // peer; a second sweep here would be spurious.
                debug!("connected flag bundled with player path, ignoring");
            } else if connected {
                if let Err(err) = self.establish_session(&change.path, false).await {
                    warn!("incoming connection from {} failed: {err}", change.path);
                }
            } else {
                self.close_session(&change.path, true).await;
            }
        }

        if let Some(track) = change.changed.get("Track") {
            let metadata = track.as_dict().cloned().unwrap_or_default();
            self.handle_track(&metadata).await;
        }

        if let Some(volume) = change
            .changed
            .get("Volume")
            .and_then(PropertyValue::as_u32)
        {
            self.events.emit(&SessionEvent::VolumeChanged(volume)).await;
        }

        if let Some(discovering) = change
            .changed
            .get("Discovering")
            .and_then(PropertyValue::as_bool)
        {
            self.events
                .emit(&SessionEvent::DiscoveryStateChanged(discovering))
                .await;
        }

        if let Some(discoverable) = change
            .changed
            .get("Discoverable")
            .and_then(PropertyValue::as_bool)
        {
            self.events
                .emit(&SessionEvent::DiscoverableChanged(discoverable))
                .await;
        }
    }

    async fn handle_status(&self, status: &str) {
        let state = self.lock().session.apply_status(status);
        self.playback.set_state(state).await;
        self.events
            .emit(&SessionEvent::PlaybackStatusChanged {
                status: status.to_string(),
                state,
            })
            .await;
    }

    async fn handle_track(&self, metadata: &PropertyMap) {
        let track = Track::from_metadata(metadata);
        let events = self.lock().session.begin_track(track.clone());
        self.playback.set_metadata(Some(track)).await;
        for event in &events {
            self.events.emit(event).await;
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
