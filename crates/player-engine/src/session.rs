//! External session/notification surface.
//!
//! The publisher mirrors controller state outward. Every publish
//! regenerates the full snapshot from current state and the favourites
//! store, so the surface can never accumulate drift; on stop the
//! surface is removed entirely, not blanked.

use std::sync::Arc;

use player_types::{LoopMode, PlaybackState, SessionSnapshot, Track};

use crate::persistence::Favorites;

/// The one UI-facing boundary the engine depends on. Implementations
/// forward inbound control actions through a cloned
/// [`crate::command::PlayerHandle`]; the surface holds no playback
/// logic of its own.
pub trait SessionSurface: Send {
    fn publish(&self, snapshot: &SessionSnapshot);
    /// Remove the externally visible surface entirely.
    fn remove(&self);
}

pub struct SessionPublisher {
    surface: Box<dyn SessionSurface>,
    favorites: Arc<dyn Favorites>,
}

impl SessionPublisher {
    pub fn new(surface: Box<dyn SessionSurface>, favorites: Arc<dyn Favorites>) -> Self {
        Self { surface, favorites }
    }

    /// Idempotent; always safe to call after any transition.
    pub fn publish(
        &self,
        state: PlaybackState,
        track: Option<&Track>,
        loop_mode: LoopMode,
        position_ms: Option<u64>,
    ) {
        let liked = track
            .map(|t| self.favorites.is_liked(&t.path))
            .unwrap_or(false);
        let snapshot = SessionSnapshot {
            state,
            track: track.cloned(),
            loop_mode,
            liked,
            position_ms,
            duration_ms: track.and_then(|t| t.duration_ms),
        };
        self.surface.publish(&snapshot);
    }

    pub fn remove(&self) {
        self.surface.remove();
    }
}

/// Surface that mirrors snapshots into the log stream; used by the CLI
/// binary where there is no notification shade to publish into.
pub struct LogSurface;

impl SessionSurface for LogSurface {
    fn publish(&self, snapshot: &SessionSnapshot) {
        tracing::info!(
            state = ?snapshot.state,
            track = snapshot
                .track
                .as_ref()
                .map(|t| t.path.display().to_string())
                .unwrap_or_else(|| "-".to_string()),
            loop_mode = snapshot.loop_mode.as_str(),
            liked = snapshot.liked,
            position_ms = ?snapshot.position_ms,
            "session update"
        );
    }

    fn remove(&self) {
        tracing::info!("session surface removed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    use anyhow::Result;

    struct RecordingSurface {
        snapshots: Arc<Mutex<Vec<SessionSnapshot>>>,
        removed: Arc<AtomicBool>,
    }

    impl SessionSurface for RecordingSurface {
        fn publish(&self, snapshot: &SessionSnapshot) {
            self.snapshots.lock().unwrap().push(snapshot.clone());
        }

        fn remove(&self) {
            self.removed.store(true, Ordering::Relaxed);
        }
    }

    struct OneLiked(PathBuf);

    impl Favorites for OneLiked {
        fn is_liked(&self, path: &Path) -> bool {
            path == self.0
        }

        fn add_like(&self, _track: &Track) -> Result<()> {
            Ok(())
        }

        fn remove_like(&self, _path: &Path) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn snapshot_is_regenerated_from_state_and_favourites() {
        let snapshots = Arc::new(Mutex::new(Vec::new()));
        let removed = Arc::new(AtomicBool::new(false));
        let publisher = SessionPublisher::new(
            Box::new(RecordingSurface {
                snapshots: snapshots.clone(),
                removed: removed.clone(),
            }),
            Arc::new(OneLiked(PathBuf::from("/m/liked.mp3"))),
        );

        let liked = Track::from_path(1, PathBuf::from("/m/liked.mp3"));
        let other = Track::from_path(2, PathBuf::from("/m/other.mp3"));
        publisher.publish(PlaybackState::Playing, Some(&liked), LoopMode::Track, Some(10));
        publisher.publish(PlaybackState::Paused, Some(&other), LoopMode::Track, Some(20));

        let snaps = snapshots.lock().unwrap();
        assert!(snaps[0].liked);
        assert!(!snaps[1].liked);
        assert_eq!(snaps[1].state, PlaybackState::Paused);
        assert_eq!(snaps[1].position_ms, Some(20));
    }

    #[test]
    fn remove_reaches_the_surface() {
        let removed = Arc::new(AtomicBool::new(false));
        let publisher = SessionPublisher::new(
            Box::new(RecordingSurface {
                snapshots: Arc::new(Mutex::new(Vec::new())),
                removed: removed.clone(),
            }),
            Arc::new(OneLiked(PathBuf::from("/m/liked.mp3"))),
        );
        publisher.remove();
        assert!(removed.load(Ordering::Relaxed));
    }

    #[test]
    fn empty_track_publishes_unliked_snapshot() {
        let snapshots = Arc::new(Mutex::new(Vec::new()));
        let publisher = SessionPublisher::new(
            Box::new(RecordingSurface {
                snapshots: snapshots.clone(),
                removed: Arc::new(AtomicBool::new(false)),
            }),
            Arc::new(OneLiked(PathBuf::from("/m/liked.mp3"))),
        );
        publisher.publish(PlaybackState::Idle, None, LoopMode::None, None);

        let snaps = snapshots.lock().unwrap();
        assert!(!snaps[0].liked);
        assert!(snaps[0].track.is_none());
        assert_eq!(snaps[0].duration_ms, None);
    }
}
