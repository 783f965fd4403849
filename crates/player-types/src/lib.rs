//! Shared value types for the playback engine.
//!
//! These are plain serde DTOs used across the engine, the persistence
//! layer, and external session surfaces.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// One playable track. Immutable value type; metadata edits elsewhere
/// replace the whole entry, they never mutate it in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Stable identity.
    pub id: u64,
    pub title: String,
    pub artist: String,
    pub album: String,
    /// Absolute file path; also the queue's uniqueness key.
    pub path: PathBuf,
    /// Duration in milliseconds (best-effort).
    pub duration_ms: Option<u64>,
    /// When the track was added to the library (unix millis).
    pub added_at_ms: i64,
}

impl Track {
    /// Build a minimal track from a file path, using the file name as title.
    pub fn from_path(id: u64, path: PathBuf) -> Self {
        let title = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("unknown")
            .to_string();
        Self {
            id,
            title,
            artist: String::new(),
            album: String::new(),
            path,
            duration_ms: None,
            added_at_ms: 0,
        }
    }
}

/// Playback state owned by the controller; all transitions happen on
/// the controller thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    Idle,
    Preparing,
    Playing,
    Paused,
    Stopped,
}

/// What happens when a track finishes unassisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopMode {
    /// Play next or stop at the end of the queue; never wrap silently.
    #[default]
    None,
    /// Replay the current track.
    Track,
    /// Advance with wraparound.
    Playlist,
}

impl LoopMode {
    /// Cycle order used by the session surface's loop affordance.
    pub fn cycled(self) -> Self {
        match self {
            LoopMode::None => LoopMode::Track,
            LoopMode::Track => LoopMode::Playlist,
            LoopMode::Playlist => LoopMode::None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LoopMode::None => "none",
            LoopMode::Track => "track",
            LoopMode::Playlist => "playlist",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "none" => Some(LoopMode::None),
            "track" => Some(LoopMode::Track),
            "playlist" => Some(LoopMode::Playlist),
            _ => None,
        }
    }
}

/// Audio-output grant state, written only by the focus arbiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FocusState {
    #[default]
    None,
    Granted,
    TransientlyLost,
    Lost,
}

/// Durable snapshot of where playback should continue after a restart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeCursor {
    /// Path of the track the cursor refers to.
    pub track_path: PathBuf,
    pub position_ms: u64,
    pub loop_mode: LoopMode,
    pub liked: bool,
}

/// Number of equalizer bands carried by the config.
pub const EQ_BANDS: usize = 5;

/// Bass boost strength range midpoint, used as the seeded default.
pub const BASS_STRENGTH_MID: u16 = 500;

/// Equalizer / pitch-speed settings, re-applied to every new render
/// session (effect bindings do not survive resource teardown).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EqualizerConfig {
    /// Per-band gain in millibels.
    pub band_levels: [i16; EQ_BANDS],
    /// Bass boost strength, 0..=1000.
    pub bass_strength: u16,
    /// Reverb preset index (backend-defined).
    pub reverb_preset: u8,
    pub pitch: f32,
    pub speed: f32,
    pub enabled: bool,
}

impl Default for EqualizerConfig {
    fn default() -> Self {
        Self {
            band_levels: [0; EQ_BANDS],
            bass_strength: BASS_STRENGTH_MID,
            reverb_preset: 0,
            pitch: 1.0,
            speed: 1.0,
            enabled: false,
        }
    }
}

/// Snapshot published to the external session/notification surface.
///
/// Regenerated wholesale from controller state on every transition so
/// the surface can never accumulate drift.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub state: PlaybackState,
    pub track: Option<Track>,
    pub loop_mode: LoopMode,
    pub liked: bool,
    pub position_ms: Option<u64>,
    pub duration_ms: Option<u64>,
}
