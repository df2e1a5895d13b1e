//! # bluetooth-manager
//!
//! Bluetooth device/session manager for a host media player.
//!
//! Supervises the system Bluetooth service (BlueZ over D-Bus): tracks the
//! adapter and known peers, reacts to asynchronous property-change
//! notifications, and exposes a command surface for scanning, connecting and
//! transport control. The one policy it owns outright is *single active
//! device*: whenever a peer becomes the session owner, every other connected
//! peer is swept off, and newly connecting peers are trusted automatically so
//! reconnects need no interactive confirmation.
//!
//! This crate is a supervisory layer, not a Bluetooth stack: pairing,
//! encryption and the audio-profile state machine stay in the system daemon.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use bluetooth_manager::{
//!     Controller, DbusTransport, ManagerConfig, NoOpSink, NullPlayback, SessionManager,
//! };
//!
//! async fn example() -> bluetooth_manager::Result<()> {
//!     let transport = Arc::new(DbusTransport::system().await?);
//!     let manager = SessionManager::new(
//!         transport,
//!         Arc::new(NoOpSink),
//!         Arc::new(NullPlayback),
//!         ManagerConfig::default(),
//!     );
//!     manager.start().await?;
//!
//!     let controller = Controller::new(manager);
//!     for device in controller.discover_devices().await? {
//!         println!("{} ({})", device.display_name(), device.address);
//!     }
//!     Ok(())
//! }
//! ```

pub mod codec;
pub mod config;
pub mod control;
pub mod dbus;
pub mod device;
pub mod error;
pub mod events;
pub mod playback;
pub mod registry;
pub mod rpc;
pub mod session;
pub mod transport;

// Re-exports for convenience
pub use codec::{parse_a2dp_config, AudioProfile, ChannelMode, Codec};
pub use config::ManagerConfig;
pub use control::Controller;
pub use dbus::DbusTransport;
pub use device::DeviceInfo;
pub use error::{BluetoothError, Result};
pub use events::{CallbackSink, EventSink, FanoutSink, NoOpSink, SessionEvent};
pub use playback::{NullPlayback, PlaybackSession, PlaybackState, PlaybackTarget, Track};
pub use registry::DeviceRegistry;
pub use rpc::{CommandTable, RpcError};
pub use session::{LinkState, SessionManager};
pub use transport::{
    ManagedObjects, PropertiesChanged, PropertyMap, PropertyValue, Transport,
};
