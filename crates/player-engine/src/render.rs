//! Render resource abstraction.
//!
//! A backend turns a track into an owned render session; the session is
//! the RAII handle over the underlying decode/output resource, and all
//! asynchronous callbacks (ready/completed/failed) are delivered into
//! the controller channel tagged with the load generation.

use std::path::PathBuf;

use crossbeam_channel::Sender;
use player_types::{EqualizerConfig, Track};

use crate::command::EngineMessage;

/// How a new session should come up.
#[derive(Debug, Clone)]
pub struct RenderOptions {
    /// Land paused once ready instead of auto-playing.
    pub start_paused: bool,
    /// Seek before first output (cold-start resume).
    pub seek_ms: Option<u64>,
    /// Initial output level, `0.0..=1.0`.
    pub volume: f32,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            start_paused: false,
            seek_ms: None,
            volume: 1.0,
        }
    }
}

/// Resource (re)initialization failure. Retried once by the controller,
/// then surfaced to the user.
#[derive(Debug)]
pub enum RenderError {
    Open { path: PathBuf, reason: String },
    Unsupported { path: PathBuf, reason: String },
    Device { reason: String },
}

impl std::fmt::Display for RenderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderError::Open { path, reason } => {
                write!(f, "failed to open {}: {reason}", path.display())
            }
            RenderError::Unsupported { path, reason } => {
                write!(f, "unsupported media {}: {reason}", path.display())
            }
            RenderError::Device { reason } => write!(f, "output device error: {reason}"),
        }
    }
}

impl std::error::Error for RenderError {}

/// An effect the session cannot host. Logged and swallowed by the
/// equalizer pipeline; never blocks playback.
#[derive(Debug)]
pub enum EffectError {
    Unsupported(&'static str),
}

impl std::fmt::Display for EffectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EffectError::Unsupported(effect) => write!(f, "effect not supported: {effect}"),
        }
    }
}

/// Owned handle over one active render resource.
///
/// Dropping the session cancels it and releases the underlying resource
/// on every exit path; no manual null-checking at call sites.
pub trait RenderSession: Send {
    fn pause(&self);
    fn resume(&self);
    /// Output level, `0.0..=1.0` (used for focus ducking).
    fn set_volume(&self, volume: f32);
    /// Current position within the track, in milliseconds.
    fn position_ms(&self) -> u64;
    /// Bind equalizer/pitch-speed settings to this session. Bindings do
    /// not survive session teardown and must be re-applied per session.
    fn apply_effects(&self, config: &EqualizerConfig) -> Result<(), EffectError>;
}

/// Factory for render sessions.
pub trait RenderBackend: Send {
    /// Begin a session for `track`. The session comes up paused; the
    /// backend sends `RenderEvent::Ready { generation }` on `events`
    /// once output can start, `Completed` when the track finishes
    /// unassisted, and `Failed` on a fatal mid-session error.
    fn begin(
        &self,
        track: &Track,
        generation: u64,
        options: RenderOptions,
        events: Sender<EngineMessage>,
    ) -> Result<Box<dyn RenderSession>, RenderError>;
}
