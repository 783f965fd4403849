//! Equalizer / pitch-speed pipeline.
//!
//! Effect bindings live on a render session and die with it, so the
//! pipeline keeps the authoritative config and re-attaches it to every
//! new session. Attach failures are logged, never surfaced: the
//! equalizer is a best-effort enhancement and must not block playback.

use std::sync::Arc;

use player_types::EqualizerConfig;

use crate::persistence::PersistenceGateway;
use crate::render::RenderSession;

const PITCH_SPEED_MIN: f32 = 0.25;
const PITCH_SPEED_MAX: f32 = 4.0;

pub struct EqualizerPipeline {
    gateway: Arc<dyn PersistenceGateway>,
    /// Lazily populated on first use: saved config or seeded defaults.
    config: Option<EqualizerConfig>,
}

impl EqualizerPipeline {
    pub fn new(gateway: Arc<dyn PersistenceGateway>) -> Self {
        Self {
            gateway,
            config: None,
        }
    }

    fn load_or_seed(&mut self) -> &mut EqualizerConfig {
        if self.config.is_none() {
            let loaded = match self.gateway.load_equalizer() {
                Ok(config) => config,
                Err(err) => {
                    tracing::warn!("failed to load equalizer config: {err:#}");
                    None
                }
            };
            self.config = Some(loaded.unwrap_or_default());
        }
        self.config.as_mut().expect("config populated above")
    }

    pub fn config(&mut self) -> EqualizerConfig {
        self.load_or_seed().clone()
    }

    /// Bind the stored settings to `session`. Must be called every time
    /// the render resource is recreated (track change, focus-loss
    /// teardown, error recovery).
    pub fn attach(&mut self, session: &dyn RenderSession) {
        let config = self.load_or_seed().clone();
        if let Err(err) = session.apply_effects(&config) {
            tracing::info!("equalizer attach degraded: {err}");
        }
    }

    /// Replace the whole config, persist it durably, and re-apply it to
    /// the active session when one exists.
    pub fn apply_config(&mut self, config: EqualizerConfig, session: Option<&dyn RenderSession>) {
        if let Err(err) = self.gateway.store_equalizer(&config) {
            tracing::warn!("failed to persist equalizer config: {err:#}");
        }
        self.config = Some(config);
        if let Some(session) = session {
            self.attach(session);
        }
    }

    /// Update pitch and/or speed. Each knob is independent: a `None`
    /// leaves the other knob exactly as last set.
    pub fn set_pitch_speed(
        &mut self,
        pitch: Option<f32>,
        speed: Option<f32>,
        session: Option<&dyn RenderSession>,
    ) {
        let config = self.load_or_seed();
        if let Some(pitch) = pitch {
            config.pitch = pitch.clamp(PITCH_SPEED_MIN, PITCH_SPEED_MAX);
        }
        if let Some(speed) = speed {
            config.speed = speed.clamp(PITCH_SPEED_MIN, PITCH_SPEED_MAX);
        }
        let config = config.clone();
        self.apply_config(config, session);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use anyhow::Result;
    use player_types::{LoopMode, ResumeCursor, Track};

    use crate::render::EffectError;

    #[derive(Default)]
    struct MemoryGateway {
        equalizer: Mutex<Option<EqualizerConfig>>,
    }

    impl PersistenceGateway for MemoryGateway {
        fn load_resume_cursor(&self) -> Result<Option<ResumeCursor>> {
            Ok(None)
        }

        fn store_resume_cursor(&self, _cursor: &ResumeCursor) -> Result<()> {
            Ok(())
        }

        fn load_equalizer(&self) -> Result<Option<EqualizerConfig>> {
            Ok(self.equalizer.lock().unwrap().clone())
        }

        fn store_equalizer(&self, config: &EqualizerConfig) -> Result<()> {
            *self.equalizer.lock().unwrap() = Some(config.clone());
            Ok(())
        }

        fn load_loop_mode(&self) -> Result<Option<LoopMode>> {
            Ok(None)
        }

        fn store_loop_mode(&self, _mode: LoopMode) -> Result<()> {
            Ok(())
        }
    }

    struct RecordingSession {
        applied: Mutex<Vec<EqualizerConfig>>,
        reject: bool,
    }

    impl RecordingSession {
        fn new(reject: bool) -> Self {
            Self {
                applied: Mutex::new(Vec::new()),
                reject,
            }
        }
    }

    impl RenderSession for RecordingSession {
        fn pause(&self) {}
        fn resume(&self) {}
        fn set_volume(&self, _volume: f32) {}

        fn position_ms(&self) -> u64 {
            0
        }

        fn apply_effects(&self, config: &EqualizerConfig) -> Result<(), EffectError> {
            self.applied.lock().unwrap().push(config.clone());
            if self.reject {
                Err(EffectError::Unsupported("band_equalizer"))
            } else {
                Ok(())
            }
        }
    }

    fn pipeline() -> EqualizerPipeline {
        EqualizerPipeline::new(Arc::new(MemoryGateway::default()))
    }

    #[test]
    fn first_attach_seeds_defaults() {
        let mut eq = pipeline();
        let session = RecordingSession::new(false);
        eq.attach(&session);

        let applied = session.applied.lock().unwrap();
        assert_eq!(applied.len(), 1);
        assert_eq!(applied[0], EqualizerConfig::default());
    }

    #[test]
    fn attach_loads_saved_config_once() {
        let gateway = Arc::new(MemoryGateway::default());
        let saved = EqualizerConfig {
            bass_strength: 900,
            enabled: true,
            ..EqualizerConfig::default()
        };
        gateway.store_equalizer(&saved).unwrap();

        let mut eq = EqualizerPipeline::new(gateway);
        let session = RecordingSession::new(false);
        eq.attach(&session);
        assert_eq!(session.applied.lock().unwrap()[0].bass_strength, 900);
    }

    #[test]
    fn setting_speed_preserves_pitch_and_vice_versa() {
        let mut eq = pipeline();
        eq.set_pitch_speed(Some(1.2), None, None);
        eq.set_pitch_speed(None, Some(1.5), None);

        let config = eq.config();
        assert_eq!(config.pitch, 1.2);
        assert_eq!(config.speed, 1.5);

        eq.set_pitch_speed(Some(0.8), None, None);
        let config = eq.config();
        assert_eq!(config.pitch, 0.8);
        assert_eq!(config.speed, 1.5);
    }

    #[test]
    fn pitch_speed_values_are_clamped() {
        let mut eq = pipeline();
        eq.set_pitch_speed(Some(100.0), Some(0.0), None);
        let config = eq.config();
        assert_eq!(config.pitch, PITCH_SPEED_MAX);
        assert_eq!(config.speed, PITCH_SPEED_MIN);
    }

    #[test]
    fn rejected_attach_is_swallowed() {
        let mut eq = pipeline();
        let session = RecordingSession::new(true);
        eq.attach(&session);
        // Still applied on the next session; config intact.
        assert_eq!(eq.config(), EqualizerConfig::default());
    }

    #[test]
    fn apply_config_persists_and_reattaches() {
        let gateway = Arc::new(MemoryGateway::default());
        let mut eq = EqualizerPipeline::new(gateway.clone());
        let session = RecordingSession::new(false);
        let config = EqualizerConfig {
            band_levels: [100, 0, -100, 0, 100],
            enabled: true,
            ..EqualizerConfig::default()
        };
        eq.apply_config(config.clone(), Some(&session));

        assert_eq!(gateway.load_equalizer().unwrap(), Some(config.clone()));
        assert_eq!(session.applied.lock().unwrap().as_slice(), &[config]);
    }
}
