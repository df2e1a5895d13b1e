//! Playback bridge: maps Bluetooth media-player state into the host's
//! playback model.

use async_trait::async_trait;
use serde::Serialize;
use tracing::warn;

use crate::error::{BluetoothError, Result};
use crate::events::SessionEvent;
use crate::transport::{PropertyMap, PropertyValue};

/// Title used when the peer reports a track with no title.
pub const PLACEHOLDER_TITLE: &str = "Unknown Title";
/// Artist sentinel used when the peer reports no artist.
pub const UNKNOWN_ARTIST: &str = "Unknown";

/// Host-facing playback state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
}

impl PlaybackState {
    /// Map the raw BlueZ `Status` string; anything unrecognized is Stopped.
    pub fn from_status(status: &str) -> Self {
        match status {
            "playing" => Self::Playing,
            "paused" => Self::Paused,
            _ => Self::Stopped,
        }
    }
}

/// Track metadata derived from a BlueZ `Track` blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Track {
    pub title: String,
    pub artist: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub album: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub track_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u32>,
}

impl Track {
    /// Build a track from a metadata blob.
    ///
    /// An empty blob is valid and denotes a placeholder/unknown track.
    /// Malformed numeric fields are logged and left unset, never fatal.
    pub fn from_metadata(props: &PropertyMap) -> Self {
        let title = props
            .get("Title")
            .and_then(PropertyValue::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or(PLACEHOLDER_TITLE)
            .to_string();
        let artist = props
            .get("Artist")
            .and_then(PropertyValue::as_str)
            .filter(|s| !s.is_empty())
            .unwrap_or(UNKNOWN_ARTIST)
            .to_string();
        let album = props
            .get("Album")
            .and_then(PropertyValue::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Self {
            title,
            artist,
            album,
            track_number: parse_numeric_field(props, "TrackNumber"),
            duration_ms: parse_numeric_field(props, "Duration"),
        }
    }
}

/// Parse an integer metadata field, tolerating numeric strings.
///
/// Non-numeric values surface as a logged [`BluetoothError::MetadataParse`]
/// and the field is treated as absent.
fn parse_numeric_field(props: &PropertyMap, field: &str) -> Option<u32> {
    let value = props.get(field)?;
    match try_numeric(field, value) {
        Ok(parsed) => Some(parsed),
        Err(err) => {
            warn!("ignoring malformed metadata field: {err}");
            None
        }
    }
}

fn try_numeric(field: &str, value: &PropertyValue) -> Result<u32> {
    if let Some(n) = value.as_u32() {
        return Ok(n);
    }
    if let Some(s) = value.as_str() {
        if let Ok(n) = s.trim().parse::<u32>() {
            return Ok(n);
        }
    }
    Err(BluetoothError::MetadataParse {
        field: field.to_string(),
        value: format!("{value:?}"),
    })
}

/// The bridge's view of current playback for the active session.
///
/// The sequence token increments with every new track so ended events can be
/// correlated to the track they close out.
#[derive(Debug, Default)]
pub struct PlaybackSession {
    pub state: PlaybackState,
    pub track: Option<Track>,
    pub sequence: u64,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self::Stopped
    }
}

impl PlaybackSession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a raw `Status` string; returns the resulting state.
    pub fn apply_status(&mut self, status: &str) -> PlaybackState {
        self.state = PlaybackState::from_status(status);
        self.state
    }

    /// Close out the current track (if any) and open a new one.
    ///
    /// Returns the events to publish, ended-before-started, so every started
    /// track gets exactly one matching ended event.
    pub fn begin_track(&mut self, track: Track) -> Vec<SessionEvent> {
        let mut events = Vec::with_capacity(2);
        if let Some(previous) = self.track.take() {
            events.push(SessionEvent::TrackEnded {
                track: previous,
                sequence: self.sequence,
            });
        }
        self.sequence += 1;
        events.push(SessionEvent::TrackStarted {
            track: track.clone(),
            sequence: self.sequence,
        });
        self.track = Some(track);
        events
    }

    /// Reset to stopped and clear metadata, closing any open track.
    pub fn teardown(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::with_capacity(1);
        if let Some(previous) = self.track.take() {
            events.push(SessionEvent::TrackEnded {
                track: previous,
                sequence: self.sequence,
            });
        }
        self.state = PlaybackState::Stopped;
        events
    }
}

/// The host's playback subsystem.
///
/// Called synchronously from within the notification-handling path.
#[async_trait]
pub trait PlaybackTarget: Send + Sync {
    async fn set_state(&self, state: PlaybackState);
    async fn set_metadata(&self, track: Option<Track>);
    async fn stop(&self);
}

/// Playback target that discards everything (headless operation).
pub struct NullPlayback;

#[async_trait]
impl PlaybackTarget for NullPlayback {
    async fn set_state(&self, _state: PlaybackState) {}
    async fn set_metadata(&self, _track: Option<Track>) {}
    async fn stop(&self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    mod playback_state {
        use super::*;

        #[test]
        fn maps_status_strings() {
            assert_eq!(PlaybackState::from_status("playing"), PlaybackState::Playing);
            assert_eq!(PlaybackState::from_status("paused"), PlaybackState::Paused);
            assert_eq!(PlaybackState::from_status("stopped"), PlaybackState::Stopped);
            assert_eq!(PlaybackState::from_status("forward-seek"), PlaybackState::Stopped);
        }
    }

    mod track {
        use super::*;

        #[test]
        fn empty_blob_yields_placeholder_track() {
            let track = Track::from_metadata(&HashMap::new());
            assert_eq!(track.title, PLACEHOLDER_TITLE);
            assert_eq!(track.artist, UNKNOWN_ARTIST);
            assert!(track.album.is_none());
            assert!(track.track_number.is_none());
            assert!(track.duration_ms.is_none());
        }

        #[test]
        fn full_blob_parses_all_fields() {
            let mut props = PropertyMap::new();
            props.insert("Title".to_string(), PropertyValue::from("Song"));
            props.insert("Artist".to_string(), PropertyValue::from("Band"));
            props.insert("Album".to_string(), PropertyValue::from("Album"));
            props.insert("TrackNumber".to_string(), PropertyValue::U32(4));
            props.insert("Duration".to_string(), PropertyValue::U32(215_000));

            let track = Track::from_metadata(&props);
            assert_eq!(track.title, "Song");
            assert_eq!(track.artist, "Band");
            assert_eq!(track.album.as_deref(), Some("Album"));
            assert_eq!(track.track_number, Some(4));
            assert_eq!(track.duration_ms, Some(215_000));
        }

        #[test]
        fn numeric_strings_are_tolerated() {
            let mut props = PropertyMap::new();
            props.insert("TrackNumber".to_string(), PropertyValue::from("12"));
            let track = Track::from_metadata(&props);
            assert_eq!(track.track_number, Some(12));
        }

        #[test]
        fn malformed_numeric_field_is_dropped_not_fatal() {
            let mut props = PropertyMap::new();
            props.insert("Title".to_string(), PropertyValue::from("Song"));
            props.insert("Duration".to_string(), PropertyValue::from("three minutes"));
            let track = Track::from_metadata(&props);
            assert_eq!(track.title, "Song");
            assert!(track.duration_ms.is_none());
        }

        #[test]
        fn empty_strings_fall_back_to_defaults() {
            let mut props = PropertyMap::new();
            props.insert("Title".to_string(), PropertyValue::from(""));
            props.insert("Artist".to_string(), PropertyValue::from(""));
            let track = Track::from_metadata(&props);
            assert_eq!(track.title, PLACEHOLDER_TITLE);
            assert_eq!(track.artist, UNKNOWN_ARTIST);
        }
    }

    mod session {
        use super::*;

        fn track(title: &str) -> Track {
            Track {
                title: title.to_string(),
                artist: UNKNOWN_ARTIST.to_string(),
                album: None,
                track_number: None,
                duration_ms: None,
            }
        }

        #[test]
        fn first_track_emits_started_only() {
            let mut session = PlaybackSession::new();
            let events = session.begin_track(track("one"));
            assert_eq!(events.len(), 1);
            assert!(matches!(
                &events[0],
                SessionEvent::TrackStarted { sequence: 1, .. }
            ));
        }

        #[test]
        fn replacement_closes_previous_track_first() {
            let mut session = PlaybackSession::new();
            session.begin_track(track("one"));
            let events = session.begin_track(track("two"));

            assert_eq!(events.len(), 2);
            match &events[0] {
                SessionEvent::TrackEnded { track, sequence } => {
                    assert_eq!(track.title, "one");
                    assert_eq!(*sequence, 1);
                }
                other => panic!("expected TrackEnded, got {other:?}"),
            }
            match &events[1] {
                SessionEvent::TrackStarted { track, sequence } => {
                    assert_eq!(track.title, "two");
                    assert_eq!(*sequence, 2);
                }
                other => panic!("expected TrackStarted, got {other:?}"),
            }
        }

        #[test]
        fn teardown_closes_open_track_and_stops() {
            let mut session = PlaybackSession::new();
            session.apply_status("playing");
            session.begin_track(track("one"));

            let events = session.teardown();
            assert_eq!(events.len(), 1);
            assert!(matches!(&events[0], SessionEvent::TrackEnded { .. }));
            assert_eq!(session.state, PlaybackState::Stopped);
            assert!(session.track.is_none());
        }

        #[test]
        fn teardown_without_track_emits_nothing() {
            let mut session = PlaybackSession::new();
            assert!(session.teardown().is_empty());
        }
    }
}
