//! Audio-focus arbitration.
//!
//! Requests and releases the platform's exclusive audio-output grant and
//! tracks revocation state. Only the arbiter writes `FocusState`; the
//! controller reads it and reacts to `FocusChange` signals.

use player_types::FocusState;

/// Outcome of a focus request. `Denied` is a normal refusal, not an
/// error: the caller must not start hardware playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusGrant {
    Granted,
    Denied,
}

/// Asynchronous revocation delivered by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FocusChange {
    /// Permanent loss: stop and tear down, keep the resume cursor.
    Lost,
    /// Brief loss: pause, keep the resource.
    TransientlyLost,
    /// Brief loss where lowering the output level is acceptable.
    TransientlyLostCanDuck,
    /// Grant returned. Never auto-resumes playback.
    Regained,
}

/// Platform glue for the audio-output grant.
pub trait FocusBackend: Send {
    fn request(&self) -> FocusGrant;
    fn release(&self);
}

/// Backend for platforms without output arbitration: every request is
/// granted and release is a no-op.
pub struct UncontestedFocus;

impl FocusBackend for UncontestedFocus {
    fn request(&self) -> FocusGrant {
        FocusGrant::Granted
    }

    fn release(&self) {}
}

pub struct FocusArbiter {
    backend: Box<dyn FocusBackend>,
    state: FocusState,
}

impl FocusArbiter {
    pub fn new(backend: Box<dyn FocusBackend>) -> Self {
        Self {
            backend,
            state: FocusState::None,
        }
    }

    pub fn state(&self) -> FocusState {
        self.state
    }

    /// Request the grant. On denial the state is left untouched so an
    /// existing grant (if any) survives the failed attempt.
    pub fn request(&mut self) -> FocusGrant {
        match self.backend.request() {
            FocusGrant::Granted => {
                self.state = FocusState::Granted;
                FocusGrant::Granted
            }
            FocusGrant::Denied => {
                tracing::info!("audio focus request denied");
                FocusGrant::Denied
            }
        }
    }

    /// Relinquish the grant. Idempotent.
    pub fn release(&mut self) {
        if self.state != FocusState::None {
            self.backend.release();
            self.state = FocusState::None;
        }
    }

    /// Record an asynchronous revocation/regain from the platform.
    pub fn note_change(&mut self, change: FocusChange) {
        self.state = match change {
            FocusChange::Lost => FocusState::Lost,
            FocusChange::TransientlyLost | FocusChange::TransientlyLostCanDuck => {
                FocusState::TransientlyLost
            }
            FocusChange::Regained => FocusState::Granted,
        };
    }
}
