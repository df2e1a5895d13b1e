//! Session events and their fan-out to host listeners.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::device::DeviceInfo;
use crate::playback::{PlaybackState, Track};

/// State changes published to the host's listener mechanism.
///
/// Fire-and-forget, at-most-once per underlying notification.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// Raw adapter/media state text, passed through untouched.
    PlaybackStateChanged(String),
    /// Player status changed, with the derived host state.
    PlaybackStatusChanged {
        status: String,
        state: PlaybackState,
    },
    /// A peer became the active session device.
    DeviceConnected(DeviceInfo),
    /// A peer disconnected.
    DeviceDisconnected { path: String },
    /// A new track opened.
    TrackStarted { track: Track, sequence: u64 },
    /// A previously started track closed out.
    TrackEnded { track: Track, sequence: u64 },
    /// Peer volume level changed.
    VolumeChanged(u32),
    /// Adapter discovery started or stopped.
    DiscoveryStateChanged(bool),
    /// Adapter discoverable flag flipped.
    DiscoverableChanged(bool),
}

impl SessionEvent {
    /// Stable wire name for the host event bus.
    pub fn name(&self) -> &'static str {
        match self {
            Self::PlaybackStateChanged(_) => "playback_state_changed",
            Self::PlaybackStatusChanged { .. } => "playback_status_changed",
            Self::DeviceConnected(_) => "device_connected",
            Self::DeviceDisconnected { .. } => "device_disconnected",
            Self::TrackStarted { .. } => "track_started",
            Self::TrackEnded { .. } => "track_ended",
            Self::VolumeChanged(_) => "volume_changed",
            Self::DiscoveryStateChanged(_) => "discovery_state_changed",
            Self::DiscoverableChanged(_) => "discoverable_changed",
        }
    }

    /// Keyed payload for the host event bus.
    pub fn payload(&self) -> Value {
        match self {
            Self::PlaybackStateChanged(state) => json!({ "state": state }),
            Self::PlaybackStatusChanged { status, state } => {
                json!({ "status": status, "state": state })
            }
            Self::DeviceConnected(device) => json!({ "device": device }),
            Self::DeviceDisconnected { path } => json!({ "path": path }),
            Self::TrackStarted { track, sequence } | Self::TrackEnded { track, sequence } => {
                json!({ "track": track, "sequence": sequence })
            }
            Self::VolumeChanged(volume) => json!({ "volume": volume }),
            Self::DiscoveryStateChanged(discovering) => json!({ "discovering": discovering }),
            Self::DiscoverableChanged(discoverable) => json!({ "discoverable": discoverable }),
        }
    }
}

/// Sink for session events.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Deliver one event. No acknowledgment, no retry.
    async fn emit(&self, event: &SessionEvent);
}

/// Sink that discards all events.
pub struct NoOpSink;

#[async_trait]
impl EventSink for NoOpSink {
    async fn emit(&self, _event: &SessionEvent) {}
}

/// Callback-based sink.
pub struct CallbackSink<F>
where
    F: Fn(&SessionEvent) + Send + Sync,
{
    callback: F,
}

impl<F> CallbackSink<F>
where
    F: Fn(&SessionEvent) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

#[async_trait]
impl<F> EventSink for CallbackSink<F>
where
    F: Fn(&SessionEvent) + Send + Sync,
{
    async fn emit(&self, event: &SessionEvent) {
        (self.callback)(event);
    }
}

/// Fan-out to several sinks in registration order.
#[derive(Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl FanoutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sink: Arc<dyn EventSink>) {
        self.sinks.push(sink);
    }
}

#[async_trait]
impl EventSink for FanoutSink {
    async fn emit(&self, event: &SessionEvent) {
        for sink in &self.sinks {
            sink.emit(event).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn names_are_stable() {
        assert_eq!(
            SessionEvent::PlaybackStateChanged("idle".to_string()).name(),
            "playback_state_changed"
        );
        assert_eq!(SessionEvent::VolumeChanged(40).name(), "volume_changed");
        assert_eq!(
            SessionEvent::DiscoveryStateChanged(true).name(),
            "discovery_state_changed"
        );
    }

    #[test]
    fn payloads_carry_keyed_fields() {
        let event = SessionEvent::VolumeChanged(64);
        assert_eq!(event.payload()["volume"], 64);

        let event = SessionEvent::PlaybackStatusChanged {
            status: "playing".to_string(),
            state: PlaybackState::Playing,
        };
        let payload = event.payload();
        assert_eq!(payload["status"], "playing");
        assert_eq!(payload["state"], "playing");

        let event = SessionEvent::DeviceDisconnected {
            path: "/hci0/dev_A".to_string(),
        };
        assert_eq!(event.payload()["path"], "/hci0/dev_A");
    }

    #[tokio::test]
    async fn callback_sink_invokes_callback() {
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);
        let sink = CallbackSink::new(move |_event| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        sink.emit(&SessionEvent::DiscoverableChanged(true)).await;
        sink.emit(&SessionEvent::DiscoverableChanged(false)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn fanout_reaches_every_sink() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut fanout = FanoutSink::new();
        for _ in 0..3 {
            let count_clone = Arc::clone(&count);
            fanout.push(Arc::new(CallbackSink::new(move |_| {
                count_clone.fetch_add(1, Ordering::SeqCst);
            })));
        }

        fanout.emit(&SessionEvent::DiscoveryStateChanged(false)).await;
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }
}
