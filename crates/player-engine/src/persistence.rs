//! Durable engine state: resume cursor, loop mode, equalizer settings,
//! favourites.
//!
//! Provides pooled SQLite connections and schema bootstrap. Loop-mode
//! and equalizer writes are synchronous and flushed before returning;
//! resume-cursor writes go through a coalescing background worker and
//! are best-effort.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result};
use crossbeam_channel::Sender;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{OptionalExtension, params};

use player_types::{EqualizerConfig, LoopMode, ResumeCursor, Track};

const SCHEMA_VERSION: i32 = 1;

/// External collaborator contract for durable playback state. Absence
/// (first run) is reported as `Ok(None)`, never as an error.
pub trait PersistenceGateway: Send + Sync {
    fn load_resume_cursor(&self) -> Result<Option<ResumeCursor>>;
    fn store_resume_cursor(&self, cursor: &ResumeCursor) -> Result<()>;
    fn load_equalizer(&self) -> Result<Option<EqualizerConfig>>;
    fn store_equalizer(&self, config: &EqualizerConfig) -> Result<()>;
    fn load_loop_mode(&self) -> Result<Option<LoopMode>>;
    fn store_loop_mode(&self, mode: LoopMode) -> Result<()>;
}

/// Favourites store consulted for the like affordance and `ToggleLike`.
pub trait Favorites: Send + Sync {
    fn is_liked(&self, path: &Path) -> bool;
    fn add_like(&self, track: &Track) -> Result<()>;
    fn remove_like(&self, path: &Path) -> Result<()>;
}

#[derive(Clone)]
pub struct SqliteStateStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteStateStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create state dir {:?}", parent))?;
        }
        let manager = SqliteConnectionManager::file(db_path).with_init(|conn| {
            conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")?;
            Ok(())
        });
        Self::from_manager(manager)
    }

    /// In-memory store; a single pooled connection so every caller sees
    /// the same database.
    pub fn open_in_memory() -> Result<Self> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .context("build in-memory sqlite pool")?;
        let store = Self { pool };
        store.bootstrap_schema()?;
        Ok(store)
    }

    fn from_manager(manager: SqliteConnectionManager) -> Result<Self> {
        let pool = Pool::builder()
            .max_size(4)
            .build(manager)
            .context("build sqlite pool")?;
        let store = Self { pool };
        store.bootstrap_schema()?;
        Ok(store)
    }

    fn bootstrap_schema(&self) -> Result<()> {
        let conn = self.pool.get().context("get sqlite connection")?;
        let version: i32 = conn
            .query_row("PRAGMA user_version", [], |row| row.get(0))
            .context("read schema version")?;
        if version < SCHEMA_VERSION {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS player_state (
                    key TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                );
                CREATE TABLE IF NOT EXISTS likes (
                    path TEXT PRIMARY KEY,
                    track_id INTEGER NOT NULL,
                    title TEXT NOT NULL,
                    artist TEXT NOT NULL,
                    album TEXT NOT NULL,
                    liked_at_ms INTEGER NOT NULL
                );
                "#,
            )
            .context("bootstrap schema")?;
            conn.pragma_update(None, "user_version", SCHEMA_VERSION)
                .context("set schema version")?;
        }
        Ok(())
    }

    fn get_value(&self, key: &str) -> Result<Option<String>> {
        let conn = self.pool.get().context("get sqlite connection")?;
        conn.query_row(
            "SELECT value FROM player_state WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()
        .with_context(|| format!("read state key {key}"))
    }

    fn set_value(&self, key: &str, value: &str) -> Result<()> {
        let conn = self.pool.get().context("get sqlite connection")?;
        conn.execute(
            "INSERT INTO player_state (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )
        .with_context(|| format!("write state key {key}"))?;
        Ok(())
    }
}

impl PersistenceGateway for SqliteStateStore {
    fn load_resume_cursor(&self) -> Result<Option<ResumeCursor>> {
        let Some(raw) = self.get_value("resume_cursor")? else {
            return Ok(None);
        };
        let cursor = serde_json::from_str(&raw).context("parse resume cursor")?;
        Ok(Some(cursor))
    }

    fn store_resume_cursor(&self, cursor: &ResumeCursor) -> Result<()> {
        let raw = serde_json::to_string(cursor).context("encode resume cursor")?;
        self.set_value("resume_cursor", &raw)
    }

    fn load_equalizer(&self) -> Result<Option<EqualizerConfig>> {
        let Some(raw) = self.get_value("equalizer")? else {
            return Ok(None);
        };
        let config = serde_json::from_str(&raw).context("parse equalizer config")?;
        Ok(Some(config))
    }

    fn store_equalizer(&self, config: &EqualizerConfig) -> Result<()> {
        let raw = serde_json::to_string(config).context("encode equalizer config")?;
        self.set_value("equalizer", &raw)
    }

    fn load_loop_mode(&self) -> Result<Option<LoopMode>> {
        Ok(self
            .get_value("loop_mode")?
            .and_then(|raw| LoopMode::parse(&raw)))
    }

    fn store_loop_mode(&self, mode: LoopMode) -> Result<()> {
        self.set_value("loop_mode", mode.as_str())
    }
}

impl Favorites for SqliteStateStore {
    fn is_liked(&self, path: &Path) -> bool {
        let Ok(conn) = self.pool.get() else {
            return false;
        };
        conn.query_row(
            "SELECT 1 FROM likes WHERE path = ?1",
            params![path.to_string_lossy()],
            |_| Ok(()),
        )
        .optional()
        .ok()
        .flatten()
        .is_some()
    }

    fn add_like(&self, track: &Track) -> Result<()> {
        let conn = self.pool.get().context("get sqlite connection")?;
        conn.execute(
            "INSERT OR REPLACE INTO likes (path, track_id, title, artist, album, liked_at_ms)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                track.path.to_string_lossy(),
                track.id as i64,
                track.title,
                track.artist,
                track.album,
                track.added_at_ms,
            ],
        )
        .context("insert like")?;
        Ok(())
    }

    fn remove_like(&self, path: &Path) -> Result<()> {
        let conn = self.pool.get().context("get sqlite connection")?;
        conn.execute(
            "DELETE FROM likes WHERE path = ?1",
            params![path.to_string_lossy()],
        )
        .context("delete like")?;
        Ok(())
    }
}

/// Spawn the resume-cursor writer.
///
/// The worker drains every pending write and persists only the most
/// recent cursor, so a burst of position updates collapses into one
/// disk write. Losing the last few hundred milliseconds on a crash is
/// acceptable; failures are logged and never propagate to playback.
pub fn spawn_resume_writer(gateway: Arc<dyn PersistenceGateway>) -> Sender<ResumeCursor> {
    let (tx, rx) = crossbeam_channel::unbounded::<ResumeCursor>();
    thread::spawn(move || {
        while let Ok(first) = rx.recv() {
            let mut latest = first;
            while let Ok(newer) = rx.try_recv() {
                latest = newer;
            }
            if let Err(err) = gateway.store_resume_cursor(&latest) {
                tracing::warn!("resume cursor write failed: {err:#}");
            }
        }
    });
    tx
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn store() -> SqliteStateStore {
        SqliteStateStore::open_in_memory().unwrap()
    }

    #[test]
    fn first_run_returns_none_for_everything() {
        let store = store();
        assert!(store.load_resume_cursor().unwrap().is_none());
        assert!(store.load_equalizer().unwrap().is_none());
        assert!(store.load_loop_mode().unwrap().is_none());
    }

    #[test]
    fn resume_cursor_round_trips_exactly() {
        let store = store();
        let cursor = ResumeCursor {
            track_path: PathBuf::from("/music/b.flac"),
            position_ms: 73_421,
            loop_mode: LoopMode::Playlist,
            liked: true,
        };
        store.store_resume_cursor(&cursor).unwrap();
        assert_eq!(store.load_resume_cursor().unwrap(), Some(cursor));
    }

    #[test]
    fn equalizer_config_round_trips_exactly() {
        let store = store();
        let config = EqualizerConfig {
            band_levels: [-200, 0, 150, 300, -50],
            bass_strength: 780,
            reverb_preset: 3,
            pitch: 1.2,
            speed: 0.9,
            enabled: true,
        };
        store.store_equalizer(&config).unwrap();
        assert_eq!(store.load_equalizer().unwrap(), Some(config));
    }

    #[test]
    fn loop_mode_overwrites_previous_value() {
        let store = store();
        store.store_loop_mode(LoopMode::Track).unwrap();
        store.store_loop_mode(LoopMode::Playlist).unwrap();
        assert_eq!(store.load_loop_mode().unwrap(), Some(LoopMode::Playlist));
    }

    #[test]
    fn likes_round_trip_by_path() {
        let store = store();
        let track = Track::from_path(3, PathBuf::from("/music/c.mp3"));
        assert!(!store.is_liked(&track.path));
        store.add_like(&track).unwrap();
        assert!(store.is_liked(&track.path));
        store.remove_like(&track.path).unwrap();
        assert!(!store.is_liked(&track.path));
    }

    #[test]
    fn resume_writer_persists_latest_cursor() {
        let store = Arc::new(store());
        let tx = spawn_resume_writer(store.clone());
        for position_ms in [1_000u64, 2_000, 3_000] {
            tx.send(ResumeCursor {
                track_path: PathBuf::from("/music/a.mp3"),
                position_ms,
                loop_mode: LoopMode::None,
                liked: false,
            })
            .unwrap();
        }

        let mut stored = None;
        for _ in 0..50 {
            stored = store.load_resume_cursor().unwrap();
            if stored.as_ref().map(|c| c.position_ms) == Some(3_000) {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(stored.map(|c| c.position_ms), Some(3_000));
    }
}
