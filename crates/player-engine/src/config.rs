//! Configuration loading and parsing.
//!
//! Defines the player config schema and resolves defaults.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Top-level player configuration loaded from TOML. Every field is
/// optional; resolution methods supply the defaults.
#[derive(Debug, Default, Deserialize)]
pub struct PlayerConfig {
    /// Full path to the SQLite state DB file.
    pub state_db_path: Option<String>,
    /// Land paused when resuming a cold-start cursor.
    pub resume_paused: Option<bool>,
    /// Output level while focus is transiently lost with ducking allowed.
    pub duck_volume: Option<f32>,
    /// Render tuning knobs.
    pub render: Option<RenderTuning>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RenderTuning {
    /// Seconds of decoded audio to keep buffered ahead of the output.
    pub buffer_seconds: Option<f32>,
    /// Maximum frames the output callback pulls per refill.
    pub refill_max_frames: Option<usize>,
}

/// Resolved render tuning passed to the local backend.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    pub buffer_seconds: f32,
    pub refill_max_frames: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            buffer_seconds: 2.0,
            refill_max_frames: 4096,
        }
    }
}

impl PlayerConfig {
    /// Load configuration from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        let cfg = toml::from_str::<PlayerConfig>(&raw)
            .with_context(|| format!("parse config {:?}", path))?;
        Ok(cfg)
    }

    pub fn state_db_path(&self) -> PathBuf {
        self.state_db_path
            .as_deref()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("player-state.db"))
    }

    pub fn resume_paused(&self) -> bool {
        self.resume_paused.unwrap_or(true)
    }

    pub fn duck_volume(&self) -> f32 {
        self.duck_volume.unwrap_or(0.3).clamp(0.0, 1.0)
    }

    pub fn render_config(&self) -> RenderConfig {
        let defaults = RenderConfig::default();
        let tuning = self.render.clone().unwrap_or_default();
        RenderConfig {
            buffer_seconds: tuning
                .buffer_seconds
                .filter(|secs| secs.is_finite() && *secs > 0.0)
                .unwrap_or(defaults.buffer_seconds),
            refill_max_frames: tuning
                .refill_max_frames
                .filter(|frames| *frames > 0)
                .unwrap_or(defaults.refill_max_frames),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_fields_are_absent() {
        let cfg: PlayerConfig = toml::from_str("").unwrap();
        assert_eq!(cfg.state_db_path(), PathBuf::from("player-state.db"));
        assert!(cfg.resume_paused());
        assert_eq!(cfg.duck_volume(), 0.3);
        assert_eq!(cfg.render_config().refill_max_frames, 4096);
    }

    #[test]
    fn explicit_fields_override_defaults() {
        let cfg: PlayerConfig = toml::from_str(
            r#"
            state_db_path = "/var/lib/player/state.db"
            resume_paused = false
            duck_volume = 0.5

            [render]
            buffer_seconds = 1.0
            refill_max_frames = 2048
            "#,
        )
        .unwrap();
        assert_eq!(cfg.state_db_path(), PathBuf::from("/var/lib/player/state.db"));
        assert!(!cfg.resume_paused());
        assert_eq!(cfg.duck_volume(), 0.5);
        let render = cfg.render_config();
        assert_eq!(render.buffer_seconds, 1.0);
        assert_eq!(render.refill_max_frames, 2048);
    }

    #[test]
    fn bogus_render_values_fall_back() {
        let cfg: PlayerConfig = toml::from_str(
            r#"
            duck_volume = 7.0

            [render]
            buffer_seconds = -3.0
            refill_max_frames = 0
            "#,
        )
        .unwrap();
        assert_eq!(cfg.duck_volume(), 1.0);
        let render = cfg.render_config();
        assert_eq!(render.buffer_seconds, 2.0);
        assert_eq!(render.refill_max_frames, 4096);
    }
}
