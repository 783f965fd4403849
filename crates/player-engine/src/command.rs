//! Message surface of the playback controller.
//!
//! Every state-mutating entry point — user commands, system signals,
//! render callbacks — is delivered as one message on a single channel
//! consumed by the controller thread.

use crossbeam_channel::Sender;
use player_types::{EqualizerConfig, LoopMode, Track};

use crate::focus::FocusChange;

/// User/session control commands. Idempotent to repeated delivery.
#[derive(Debug, Clone)]
pub enum PlayerCommand {
    Play,
    Pause,
    Next,
    Previous,
    Stop,
    /// Make `track` current and (re)initialize the render resource for it.
    Load(Track),
    SetLoopMode(LoopMode),
    ToggleLike,
    /// Dismiss from the notification surface; behaves like `Stop`.
    RemoveSession,
    /// Each knob is independent; `None` leaves the other untouched.
    SetPitchSpeed {
        pitch: Option<f32>,
        speed: Option<f32>,
    },
    SetEqualizer(EqualizerConfig),
    Shutdown,
}

/// OS-level interruptions mapped to controller events.
#[derive(Debug, Clone, Copy)]
pub enum SystemSignal {
    FocusChanged(FocusChange),
    CallStarted,
    CallEnded,
    /// Output device removed (headphones unplugged).
    BecameNoisy,
    LowMemory,
}

/// Asynchronous callbacks from the render backend's delivery thread.
///
/// Each carries the generation it was issued under so the controller
/// can discard events from a superseded load.
#[derive(Debug, Clone)]
pub enum RenderEvent {
    Ready { generation: u64 },
    Completed { generation: u64 },
    Failed { generation: u64, reason: String },
}

#[derive(Debug, Clone)]
pub enum EngineMessage {
    Command(PlayerCommand),
    Signal(SystemSignal),
    Render(RenderEvent),
}

/// Handle for sending messages to the controller thread.
#[derive(Clone)]
pub struct PlayerHandle {
    tx: Sender<EngineMessage>,
}

impl PlayerHandle {
    pub(crate) fn new(tx: Sender<EngineMessage>) -> Self {
        Self { tx }
    }

    /// Raw sender for render backends and system-signal glue.
    pub fn sender(&self) -> Sender<EngineMessage> {
        self.tx.clone()
    }

    pub fn command(&self, command: PlayerCommand) {
        if self.tx.send(EngineMessage::Command(command)).is_err() {
            tracing::debug!("controller channel closed; command dropped");
        }
    }

    pub fn signal(&self, signal: SystemSignal) {
        if self.tx.send(EngineMessage::Signal(signal)).is_err() {
            tracing::debug!("controller channel closed; signal dropped");
        }
    }

    pub fn play(&self) {
        self.command(PlayerCommand::Play);
    }

    pub fn pause(&self) {
        self.command(PlayerCommand::Pause);
    }

    pub fn next(&self) {
        self.command(PlayerCommand::Next);
    }

    pub fn previous(&self) {
        self.command(PlayerCommand::Previous);
    }

    pub fn stop(&self) {
        self.command(PlayerCommand::Stop);
    }

    pub fn set_loop_mode(&self, mode: LoopMode) {
        self.command(PlayerCommand::SetLoopMode(mode));
    }

    pub fn toggle_like(&self) {
        self.command(PlayerCommand::ToggleLike);
    }

    pub fn set_pitch_speed(&self, pitch: Option<f32>, speed: Option<f32>) {
        self.command(PlayerCommand::SetPitchSpeed { pitch, speed });
    }

    pub fn shutdown(&self) {
        self.command(PlayerCommand::Shutdown);
    }
}
