use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use player_engine::config::PlayerConfig;
use player_engine::controller::{self, ControllerConfig, ControllerParts};
use player_engine::events::EventBus;
use player_engine::focus::{FocusArbiter, UncontestedFocus};
use player_engine::local_render::LocalRenderBackend;
use player_engine::persistence::SqliteStateStore;
use player_engine::queue::TrackQueue;
use player_engine::session::{LogSurface, SessionPublisher};
use player_types::{LoopMode, Track};

#[derive(Parser, Debug)]
#[command(name = "pocket-player")]
struct Args {
    /// Audio files to queue, in order
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Path to a TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the saved loop mode: none, track or playlist
    #[arg(long)]
    loop_mode: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = match &args.config {
        Some(path) => PlayerConfig::load(path)?,
        None => PlayerConfig::default(),
    };
    let loop_mode = args
        .loop_mode
        .as_deref()
        .map(|raw| LoopMode::parse(raw).ok_or_else(|| anyhow!("unknown loop mode: {raw}")))
        .transpose()?;

    let store = Arc::new(SqliteStateStore::open(&config.state_db_path())?);

    let mut queue = TrackQueue::new();
    for (idx, path) in args.files.iter().enumerate() {
        let path = std::fs::canonicalize(path).with_context(|| format!("resolve {:?}", path))?;
        queue.upsert(Track::from_path(idx as u64 + 1, path));
    }

    tracing::info!(
        tracks = queue.len(),
        state_db = %config.state_db_path().display(),
        "starting pocket-player"
    );

    let publisher = SessionPublisher::new(Box::new(LogSurface), store.clone());
    let (handle, join) = controller::spawn(ControllerParts {
        queue: Arc::new(Mutex::new(queue)),
        backend: Box::new(LocalRenderBackend::new(config.render_config())),
        focus: FocusArbiter::new(Box::new(UncontestedFocus)),
        gateway: store.clone(),
        favorites: store,
        publisher,
        events: EventBus::new(),
        config: ControllerConfig {
            resume_paused: config.resume_paused(),
            duck_volume: config.duck_volume(),
        },
    });

    if let Some(mode) = loop_mode {
        handle.set_loop_mode(mode);
    }

    let ctrlc_handle = handle.clone();
    let _ = ctrlc::set_handler(move || {
        ctrlc_handle.stop();
        ctrlc_handle.shutdown();
    });

    handle.play();

    if join.join().is_err() {
        tracing::error!("controller thread panicked");
    }
    Ok(())
}
