//! In-process event bus for engine-side updates.
//!
//! Provides a lightweight broadcast channel for UI subscriptions.

use std::path::PathBuf;

use player_types::PlaybackState;
use tokio::sync::broadcast;

/// Engine event payloads published by the controller.
#[derive(Debug, Clone)]
pub enum PlayerEvent {
    StateChanged(PlaybackState),
    /// The queue cursor moved on natural completion; lets the UI layer
    /// follow the highlight.
    TrackAdvanced { path: PathBuf },
    QueueChanged,
    /// User-visible notice: the track could not be rendered even after
    /// the automatic retry.
    TrackFailed { path: PathBuf, reason: String },
    SettingsChanged,
}

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<PlayerEvent>,
}

impl EventBus {
    /// Create a new event bus with a bounded broadcast channel.
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(64);
        Self { sender }
    }

    /// Subscribe to the event stream.
    pub fn subscribe(&self) -> broadcast::Receiver<PlayerEvent> {
        self.sender.subscribe()
    }

    pub fn state_changed(&self, state: PlaybackState) {
        let _ = self.sender.send(PlayerEvent::StateChanged(state));
    }

    pub fn track_advanced(&self, path: PathBuf) {
        let _ = self.sender.send(PlayerEvent::TrackAdvanced { path });
    }

    pub fn queue_changed(&self) {
        let _ = self.sender.send(PlayerEvent::QueueChanged);
    }

    pub fn track_failed(&self, path: PathBuf, reason: String) {
        let _ = self.sender.send(PlayerEvent::TrackFailed { path, reason });
    }

    pub fn settings_changed(&self) {
        let _ = self.sender.send(PlayerEvent::SettingsChanged);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subscribers_receive_published_events() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe();
        bus.state_changed(PlaybackState::Playing);
        match rx.try_recv().unwrap() {
            PlayerEvent::StateChanged(state) => assert_eq!(state, PlaybackState::Playing),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn publishing_without_subscribers_is_fine() {
        let bus = EventBus::new();
        bus.queue_changed();
        bus.track_failed(PathBuf::from("/m/a.mp3"), "probe failed".to_string());
    }
}
