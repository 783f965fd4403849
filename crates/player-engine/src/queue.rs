//! Ordered, path-deduplicated track queue with a current-position cursor.
//!
//! Owned by the session; the controller reads the cursor and advances it
//! on skip, external collaborators (library/playlist UI) mutate entries.

use std::path::Path;

use player_types::Track;

#[derive(Debug, PartialEq, Eq)]
pub enum QueueError {
    Empty,
}

impl std::fmt::Display for QueueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueError::Empty => write!(f, "queue is empty"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Next,
    Prev,
}

/// Invariant: `cursor` is in `[0, tracks.len())` whenever the queue is
/// non-empty, and no two entries share a path.
#[derive(Debug, Default)]
pub struct TrackQueue {
    tracks: Vec<Track>,
    cursor: usize,
}

impl TrackQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// The track under the cursor.
    pub fn current(&self) -> Result<&Track, QueueError> {
        self.tracks.get(self.cursor).ok_or(QueueError::Empty)
    }

    /// Whether the cursor sits on the last entry (the `PLAY_NEXT_OR_STOP`
    /// boundary for natural completion without looping).
    pub fn at_end(&self) -> bool {
        !self.tracks.is_empty() && self.cursor + 1 == self.tracks.len()
    }

    /// Move the cursor with wraparound. No-op on an empty queue.
    pub fn advance(&mut self, direction: Direction) {
        if self.tracks.is_empty() {
            return;
        }
        self.cursor = match direction {
            Direction::Next => (self.cursor + 1) % self.tracks.len(),
            Direction::Prev => (self.cursor + self.tracks.len() - 1) % self.tracks.len(),
        };
    }

    /// Point the cursor at the entry with `path`, if present.
    pub fn select(&mut self, path: &Path) -> bool {
        if let Some(pos) = self.tracks.iter().position(|t| t.path == path) {
            self.cursor = pos;
            return true;
        }
        false
    }

    /// Add a track, replacing any existing entry with the same path in
    /// place (preserving its position) instead of duplicating.
    pub fn upsert(&mut self, track: Track) {
        if let Some(pos) = self.tracks.iter().position(|t| t.path == track.path) {
            self.tracks[pos] = track;
        } else {
            self.tracks.push(track);
        }
    }

    /// Swap the entry at `old_path` for `track` (metadata edited
    /// elsewhere). An unknown `old_path` degrades to `upsert`. The
    /// cursor stays put: neither arm removes the current entry.
    pub fn replace(&mut self, old_path: &Path, track: Track) {
        match self.tracks.iter().position(|t| t.path == old_path) {
            Some(pos) => self.tracks[pos] = track,
            None => self.upsert(track),
        }
    }

    /// Remove the entry with `path`, keeping the cursor valid: entries
    /// before the cursor shift it down, removing the last entry while
    /// current wraps it to 0.
    pub fn remove(&mut self, path: &Path) -> bool {
        let Some(pos) = self.tracks.iter().position(|t| t.path == path) else {
            return false;
        };
        self.tracks.remove(pos);
        if self.tracks.is_empty() {
            self.cursor = 0;
        } else if pos < self.cursor {
            self.cursor -= 1;
        } else if self.cursor >= self.tracks.len() {
            self.cursor = 0;
        }
        true
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn track(id: u64, path: &str) -> Track {
        Track::from_path(id, PathBuf::from(path))
    }

    fn queue_of(paths: &[&str]) -> TrackQueue {
        let mut queue = TrackQueue::new();
        for (idx, path) in paths.iter().enumerate() {
            queue.upsert(track(idx as u64, path));
        }
        queue
    }

    #[test]
    fn current_fails_on_empty_queue() {
        let queue = TrackQueue::new();
        assert_eq!(queue.current().unwrap_err(), QueueError::Empty);
    }

    #[test]
    fn advance_on_empty_queue_is_a_noop() {
        let mut queue = TrackQueue::new();
        queue.advance(Direction::Next);
        assert_eq!(queue.cursor(), 0);
    }

    #[test]
    fn cursor_stays_in_range_for_any_advance_sequence() {
        let mut queue = queue_of(&["/m/a.mp3", "/m/b.mp3", "/m/c.mp3"]);
        let moves = [
            Direction::Next,
            Direction::Next,
            Direction::Prev,
            Direction::Next,
            Direction::Next,
            Direction::Next,
            Direction::Prev,
            Direction::Prev,
            Direction::Prev,
            Direction::Prev,
        ];
        for direction in moves {
            queue.advance(direction);
            assert!(queue.cursor() < queue.len());
        }
    }

    #[test]
    fn n_next_then_n_prev_returns_to_start() {
        let mut queue = queue_of(&["/m/a.mp3", "/m/b.mp3", "/m/c.mp3", "/m/d.mp3"]);
        queue.advance(Direction::Next);
        let start = queue.cursor();
        for _ in 0..queue.len() {
            queue.advance(Direction::Next);
        }
        for _ in 0..queue.len() {
            queue.advance(Direction::Prev);
        }
        assert_eq!(queue.cursor(), start);
    }

    #[test]
    fn advance_wraps_both_directions() {
        let mut queue = queue_of(&["/m/a.mp3", "/m/b.mp3"]);
        queue.advance(Direction::Prev);
        assert_eq!(queue.cursor(), 1);
        queue.advance(Direction::Next);
        assert_eq!(queue.cursor(), 0);
    }

    #[test]
    fn upsert_never_duplicates_a_path() {
        let mut queue = queue_of(&["/m/a.mp3", "/m/b.mp3"]);
        let mut edited = track(9, "/m/a.mp3");
        edited.title = "renamed".to_string();
        queue.upsert(edited);

        assert_eq!(queue.len(), 2);
        assert_eq!(queue.tracks()[0].title, "renamed");
    }

    #[test]
    fn replace_preserves_position_when_found() {
        let mut queue = queue_of(&["/m/a.mp3", "/m/b.mp3", "/m/c.mp3"]);
        queue.advance(Direction::Next);
        queue.replace(Path::new("/m/b.mp3"), track(9, "/m/b2.mp3"));

        assert_eq!(queue.cursor(), 1);
        assert_eq!(queue.current().unwrap().path, PathBuf::from("/m/b2.mp3"));
    }

    #[test]
    fn replace_of_missing_entry_appends_without_moving_cursor() {
        let mut queue = queue_of(&["/m/a.mp3", "/m/b.mp3", "/m/c.mp3"]);
        queue.advance(Direction::Next);
        queue.advance(Direction::Next);
        queue.replace(Path::new("/m/gone.mp3"), track(9, "/m/d.mp3"));

        assert_eq!(queue.len(), 4);
        assert_eq!(queue.cursor(), 2);
        assert_eq!(queue.current().unwrap().path, PathBuf::from("/m/c.mp3"));
    }

    #[test]
    fn remove_last_current_entry_wraps_cursor_to_zero() {
        let mut queue = queue_of(&["/m/a.mp3", "/m/b.mp3", "/m/c.mp3"]);
        queue.advance(Direction::Next);
        queue.advance(Direction::Next);
        assert!(queue.remove(Path::new("/m/c.mp3")));

        assert_eq!(queue.cursor(), 0);
        assert_eq!(queue.current().unwrap().path, PathBuf::from("/m/a.mp3"));
    }

    #[test]
    fn remove_before_cursor_shifts_it_down() {
        let mut queue = queue_of(&["/m/a.mp3", "/m/b.mp3", "/m/c.mp3"]);
        queue.advance(Direction::Next);
        queue.advance(Direction::Next);
        assert!(queue.remove(Path::new("/m/a.mp3")));

        assert_eq!(queue.current().unwrap().path, PathBuf::from("/m/c.mp3"));
    }

    #[test]
    fn select_moves_cursor_to_path() {
        let mut queue = queue_of(&["/m/a.mp3", "/m/b.mp3", "/m/c.mp3"]);
        assert!(queue.select(Path::new("/m/c.mp3")));
        assert_eq!(queue.cursor(), 2);
        assert!(!queue.select(Path::new("/m/x.mp3")));
        assert_eq!(queue.cursor(), 2);
    }
}
