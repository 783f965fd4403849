//! Playback controller: the state machine owning the render resource.
//!
//! One thread consumes a single message channel; user commands, system
//! signals, and render callbacks are all serialized through it, so at
//! most one resource (re)initialization is ever in flight and no
//! callback can race a command. Every load bumps a generation counter
//! and render events from superseded loads are discarded.

use std::sync::{Arc, Mutex};
use std::thread;

use crossbeam_channel::Sender;
use player_types::{FocusState, LoopMode, PlaybackState, ResumeCursor, Track};

use crate::command::{EngineMessage, PlayerCommand, PlayerHandle, RenderEvent, SystemSignal};
use crate::equalizer::EqualizerPipeline;
use crate::events::EventBus;
use crate::focus::{FocusArbiter, FocusChange, FocusGrant};
use crate::persistence::{Favorites, PersistenceGateway, spawn_resume_writer};
use crate::queue::{Direction, TrackQueue};
use crate::render::{RenderBackend, RenderOptions, RenderSession};
use crate::session::SessionPublisher;

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Land paused when resuming a cold-start cursor.
    pub resume_paused: bool,
    /// Output level while transiently ducked.
    pub duck_volume: f32,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            resume_paused: true,
            duck_volume: 0.3,
        }
    }
}

/// Everything the controller needs to run.
pub struct ControllerParts {
    pub queue: Arc<Mutex<TrackQueue>>,
    pub backend: Box<dyn RenderBackend>,
    pub focus: FocusArbiter,
    pub gateway: Arc<dyn PersistenceGateway>,
    pub favorites: Arc<dyn Favorites>,
    pub publisher: SessionPublisher,
    pub events: EventBus,
    pub config: ControllerConfig,
}

/// Spawn the controller thread. The returned handle is the only way in;
/// the join handle completes after a `Shutdown` command.
pub fn spawn(parts: ControllerParts) -> (PlayerHandle, thread::JoinHandle<()>) {
    let (tx, rx) = crossbeam_channel::unbounded::<EngineMessage>();
    let handle = PlayerHandle::new(tx.clone());
    let mut controller = Controller::new(parts, tx);
    let join = thread::spawn(move || {
        while let Ok(msg) = rx.recv() {
            if !controller.handle_message(msg) {
                break;
            }
        }
        tracing::info!("playback controller stopped");
    });
    (handle, join)
}

struct ActiveSession {
    session: Box<dyn RenderSession>,
    generation: u64,
    track: Track,
    /// Land paused once the session reports ready.
    start_paused: bool,
    /// This load already is the automatic retry.
    retried: bool,
}

struct Controller {
    queue: Arc<Mutex<TrackQueue>>,
    backend: Box<dyn RenderBackend>,
    focus: FocusArbiter,
    gateway: Arc<dyn PersistenceGateway>,
    favorites: Arc<dyn Favorites>,
    publisher: SessionPublisher,
    events: EventBus,
    config: ControllerConfig,
    eq: EqualizerPipeline,
    msg_tx: Sender<EngineMessage>,
    resume_tx: Sender<ResumeCursor>,

    state: PlaybackState,
    loop_mode: LoopMode,
    active: Option<ActiveSession>,
    generation: u64,
    /// Cold-start cursor, consumed by the first load.
    cold_resume: Option<ResumeCursor>,
    /// In-process position restore after a teardown that kept state
    /// (permanent focus loss, low memory).
    pending_seek: Option<ResumeCursor>,
    resume_after_call: bool,
    ducked: bool,
}

impl Controller {
    fn new(parts: ControllerParts, msg_tx: Sender<EngineMessage>) -> Self {
        let loop_mode = match parts.gateway.load_loop_mode() {
            Ok(mode) => mode.unwrap_or_default(),
            Err(err) => {
                tracing::warn!("failed to load loop mode: {err:#}");
                LoopMode::default()
            }
        };
        let cold_resume = match parts.gateway.load_resume_cursor() {
            Ok(cursor) => cursor,
            Err(err) => {
                tracing::warn!("failed to load resume cursor: {err:#}");
                None
            }
        };
        if let Some(cursor) = cold_resume.as_ref() {
            parts
                .queue
                .lock()
                .expect("queue lock")
                .select(&cursor.track_path);
        }
        let resume_tx = spawn_resume_writer(parts.gateway.clone());
        let eq = EqualizerPipeline::new(parts.gateway.clone());

        Self {
            queue: parts.queue,
            backend: parts.backend,
            focus: parts.focus,
            gateway: parts.gateway,
            favorites: parts.favorites,
            publisher: parts.publisher,
            events: parts.events,
            config: parts.config,
            eq,
            msg_tx,
            resume_tx,
            state: PlaybackState::Idle,
            loop_mode,
            active: None,
            generation: 0,
            cold_resume,
            pending_seek: None,
            resume_after_call: false,
            ducked: false,
        }
    }

    /// Returns `false` when the controller should exit its loop.
    fn handle_message(&mut self, msg: EngineMessage) -> bool {
        match msg {
            EngineMessage::Command(cmd) => self.handle_command(cmd),
            EngineMessage::Signal(signal) => {
                self.handle_signal(signal);
                true
            }
            EngineMessage::Render(event) => {
                self.handle_render(event);
                true
            }
        }
    }

    fn handle_command(&mut self, cmd: PlayerCommand) -> bool {
        match cmd {
            PlayerCommand::Play => self.play(),
            PlayerCommand::Pause => self.pause(),
            PlayerCommand::Next => self.skip(Direction::Next),
            PlayerCommand::Previous => self.skip(Direction::Prev),
            PlayerCommand::Stop | PlayerCommand::RemoveSession => self.stop(),
            PlayerCommand::Load(track) => {
                {
                    let mut queue = self.queue.lock().expect("queue lock");
                    queue.upsert(track.clone());
                    queue.select(&track.path);
                }
                self.events.queue_changed();
                self.load_track(track, true, false);
            }
            PlayerCommand::SetLoopMode(mode) => {
                self.loop_mode = mode;
                if let Err(err) = self.gateway.store_loop_mode(mode) {
                    tracing::warn!("failed to persist loop mode: {err:#}");
                }
                self.events.settings_changed();
                self.publish();
            }
            PlayerCommand::ToggleLike => self.toggle_like(),
            PlayerCommand::SetPitchSpeed { pitch, speed } => {
                let session = self.active.as_ref().map(|a| a.session.as_ref());
                self.eq.set_pitch_speed(pitch, speed, session);
                self.events.settings_changed();
            }
            PlayerCommand::SetEqualizer(config) => {
                let session = self.active.as_ref().map(|a| a.session.as_ref());
                self.eq.apply_config(config, session);
                self.events.settings_changed();
            }
            PlayerCommand::Shutdown => {
                self.persist_cursor();
                self.teardown_active();
                self.focus.release();
                return false;
            }
        }
        true
    }

    fn play(&mut self) {
        match self.state {
            PlaybackState::Playing => {
                self.publish();
            }
            PlaybackState::Preparing => {
                // Queued rather than applied to a half-initialized
                // resource: the ready handler honors the intent. The
                // in-flight load may have started without a grant, so
                // the grant is re-checked here, not at ready time.
                if self.focus.state() != FocusState::Granted
                    && self.focus.request() == FocusGrant::Denied
                {
                    self.persist_cursor();
                    return;
                }
                if let Some(active) = self.active.as_mut() {
                    active.start_paused = false;
                }
            }
            _ => {
                if self.focus.request() == FocusGrant::Denied {
                    self.persist_cursor();
                    return;
                }
                if let Some(active) = self.active.as_ref() {
                    active.session.resume();
                    self.state = PlaybackState::Playing;
                    self.publish();
                    self.persist_cursor();
                } else {
                    let track = {
                        let queue = self.queue.lock().expect("queue lock");
                        queue.current().ok().cloned()
                    };
                    match track {
                        Some(track) => self.load_track(track, true, false),
                        None => {
                            tracing::info!("play requested with an empty queue");
                            self.focus.release();
                        }
                    }
                }
            }
        }
    }

    fn pause(&mut self) {
        match self.state {
            PlaybackState::Playing => {
                if let Some(active) = self.active.as_ref() {
                    active.session.pause();
                }
                self.state = PlaybackState::Paused;
                self.persist_cursor();
                self.publish();
            }
            PlaybackState::Preparing => {
                if let Some(active) = self.active.as_mut() {
                    active.start_paused = true;
                }
            }
            _ => {}
        }
    }

    fn skip(&mut self, direction: Direction) {
        let track = {
            let mut queue = self.queue.lock().expect("queue lock");
            if queue.is_empty() {
                return;
            }
            queue.advance(direction);
            queue.current().expect("non-empty queue").clone()
        };
        self.events.queue_changed();
        self.load_track(track.clone(), true, false);
        self.persist_cursor_for(&track, 0);
    }

    fn stop(&mut self) {
        if self.state == PlaybackState::Idle {
            return;
        }
        self.persist_cursor();
        self.state = PlaybackState::Stopped;
        self.events.state_changed(self.state);
        self.teardown_active();
        self.focus.release();
        self.publisher.remove();
        self.state = PlaybackState::Idle;
        self.events.state_changed(self.state);
    }

    fn toggle_like(&mut self) {
        let track = match self.active.as_ref() {
            Some(active) => Some(active.track.clone()),
            None => {
                let queue = self.queue.lock().expect("queue lock");
                queue.current().ok().cloned()
            }
        };
        let Some(track) = track else {
            return;
        };
        let result = if self.favorites.is_liked(&track.path) {
            self.favorites.remove_like(&track.path)
        } else {
            self.favorites.add_like(&track)
        };
        if let Err(err) = result {
            tracing::warn!(path = %track.path.display(), "like toggle failed: {err:#}");
        }
        self.publish();
    }

    fn handle_signal(&mut self, signal: SystemSignal) {
        match signal {
            SystemSignal::FocusChanged(change) => self.focus_changed(change),
            SystemSignal::CallStarted => {
                if self.state == PlaybackState::Playing {
                    self.resume_after_call = true;
                    if let Some(active) = self.active.as_ref() {
                        active.session.pause();
                    }
                    self.state = PlaybackState::Paused;
                    self.persist_cursor();
                    self.publish();
                }
            }
            SystemSignal::CallEnded => {
                if self.resume_after_call {
                    self.resume_after_call = false;
                    if self.state == PlaybackState::Paused {
                        if let Some(active) = self.active.as_ref() {
                            active.session.resume();
                            self.state = PlaybackState::Playing;
                            self.publish();
                        }
                    }
                }
            }
            SystemSignal::BecameNoisy => {
                if self.state == PlaybackState::Playing {
                    self.pause();
                }
            }
            SystemSignal::LowMemory => {
                if self.state != PlaybackState::Playing
                    && self.state != PlaybackState::Preparing
                    && self.active.is_some()
                {
                    tracing::info!("low memory: releasing idle render resource");
                    self.pending_seek = self.current_cursor();
                    self.persist_cursor();
                    self.teardown_active();
                }
            }
        }
    }

    fn focus_changed(&mut self, change: FocusChange) {
        self.focus.note_change(change);
        match change {
            FocusChange::Lost => {
                if self.active.is_some() {
                    self.pending_seek = self.current_cursor();
                    self.persist_cursor();
                    self.teardown_active();
                }
                if self.state != PlaybackState::Idle {
                    self.state = PlaybackState::Paused;
                    self.publish();
                }
            }
            FocusChange::TransientlyLost => {
                if self.state == PlaybackState::Playing {
                    if let Some(active) = self.active.as_ref() {
                        active.session.pause();
                    }
                    self.state = PlaybackState::Paused;
                    self.persist_cursor();
                    self.publish();
                }
            }
            FocusChange::TransientlyLostCanDuck => {
                if self.state == PlaybackState::Playing {
                    if let Some(active) = self.active.as_ref() {
                        active.session.set_volume(self.config.duck_volume);
                        self.ducked = true;
                    }
                }
            }
            FocusChange::Regained => {
                // Intentionally no auto-resume; the user must press play.
                if self.ducked {
                    if let Some(active) = self.active.as_ref() {
                        active.session.set_volume(1.0);
                    }
                    self.ducked = false;
                }
            }
        }
    }

    fn handle_render(&mut self, event: RenderEvent) {
        match event {
            RenderEvent::Ready { generation } => self.render_ready(generation),
            RenderEvent::Completed { generation } => self.render_completed(generation),
            RenderEvent::Failed { generation, reason } => self.render_failed(generation, reason),
        }
    }

    fn generation_matches(&self, generation: u64) -> bool {
        self.active
            .as_ref()
            .map(|a| a.generation == generation)
            .unwrap_or(false)
    }

    fn render_ready(&mut self, generation: u64) {
        if !self.generation_matches(generation) {
            tracing::debug!(generation, "discarding stale render-ready");
            return;
        }
        if self.state != PlaybackState::Preparing {
            tracing::debug!(state = ?self.state, "render-ready outside preparing");
            return;
        }
        // Effects first: bindings must be in place before output starts.
        if let Some(active) = self.active.as_ref() {
            self.eq.attach(active.session.as_ref());
        }
        let active = self.active.as_ref().expect("generation matched");
        if active.start_paused {
            active.session.pause();
            self.state = PlaybackState::Paused;
        } else {
            active.session.resume();
            self.state = PlaybackState::Playing;
        }
        self.publish();
    }

    fn render_completed(&mut self, generation: u64) {
        if !self.generation_matches(generation) {
            tracing::debug!(generation, "discarding stale render-completed");
            return;
        }
        match self.loop_mode {
            LoopMode::Track => {
                let track = self.active.as_ref().expect("generation matched").track.clone();
                self.load_track(track, true, false);
            }
            LoopMode::Playlist => {
                let track = {
                    let mut queue = self.queue.lock().expect("queue lock");
                    queue.advance(Direction::Next);
                    queue.current().expect("non-empty queue").clone()
                };
                self.events.track_advanced(track.path.clone());
                self.load_track(track.clone(), true, false);
                self.persist_cursor_for(&track, 0);
            }
            LoopMode::None => {
                // PLAY_NEXT_OR_STOP: never wrap silently back to track 1.
                let next = {
                    let mut queue = self.queue.lock().expect("queue lock");
                    if queue.at_end() {
                        None
                    } else {
                        queue.advance(Direction::Next);
                        Some(queue.current().expect("non-empty queue").clone())
                    }
                };
                match next {
                    Some(track) => {
                        self.events.queue_changed();
                        self.load_track(track.clone(), true, false);
                        self.persist_cursor_for(&track, 0);
                    }
                    None => self.stop(),
                }
            }
        }
    }

    fn render_failed(&mut self, generation: u64, reason: String) {
        if !self.generation_matches(generation) {
            tracing::debug!(generation, "discarding stale render-failure");
            return;
        }
        let active = self.active.take().expect("generation matched");
        let position_ms = active.session.position_ms();
        let intent_play = !active.start_paused;
        tracing::warn!(
            path = %active.track.path.display(),
            retried = active.retried,
            "render session failed: {reason}"
        );
        if !active.retried {
            drop(active.session);
            self.load_track(active.track, intent_play, true);
        } else {
            self.persist_cursor_for(&active.track, position_ms);
            self.fail_to_idle(active.track, reason);
        }
    }

    fn fail_to_idle(&mut self, track: Track, reason: String) {
        self.focus.release();
        self.events.track_failed(track.path.clone(), reason);
        self.state = PlaybackState::Idle;
        self.publish();
    }

    /// Tear down any current session and begin a new one for `track`.
    /// The whole init sequence runs here, on the controller thread, so
    /// at most one (re)initialization is in flight at a time.
    fn load_track(&mut self, track: Track, intent_play: bool, retried: bool) {
        if self.active.is_some() {
            self.persist_cursor();
        }
        self.teardown_active();
        self.generation += 1;

        let mut options = RenderOptions {
            start_paused: !intent_play,
            ..RenderOptions::default()
        };
        if let Some(cursor) = self
            .cold_resume
            .take_if(|cursor| cursor.track_path == track.path)
        {
            options.seek_ms = Some(cursor.position_ms);
            if self.config.resume_paused {
                options.start_paused = true;
            }
        }
        if options.seek_ms.is_none() {
            if let Some(cursor) = self
                .pending_seek
                .take_if(|cursor| cursor.track_path == track.path)
            {
                options.seek_ms = Some(cursor.position_ms);
            }
        }
        if intent_play && self.focus.state() != FocusState::Granted {
            if self.focus.request() == FocusGrant::Denied {
                options.start_paused = true;
            }
        }

        let start_paused = options.start_paused;
        match self
            .backend
            .begin(&track, self.generation, options, self.msg_tx.clone())
        {
            Ok(session) => {
                tracing::debug!(
                    path = %track.path.display(),
                    generation = self.generation,
                    "render session starting"
                );
                self.active = Some(ActiveSession {
                    session,
                    generation: self.generation,
                    track,
                    start_paused,
                    retried,
                });
                self.state = PlaybackState::Preparing;
                self.publish();
            }
            Err(err) => {
                tracing::warn!(path = %track.path.display(), "render init failed: {err}");
                if !retried {
                    self.load_track(track, intent_play, true);
                } else {
                    self.fail_to_idle(track, err.to_string());
                }
            }
        }
    }

    fn teardown_active(&mut self) {
        if let Some(active) = self.active.take() {
            tracing::debug!(generation = active.generation, "render session torn down");
            drop(active);
        }
    }

    fn current_cursor(&self) -> Option<ResumeCursor> {
        let active = self.active.as_ref()?;
        Some(ResumeCursor {
            track_path: active.track.path.clone(),
            position_ms: active.session.position_ms(),
            loop_mode: self.loop_mode,
            liked: self.favorites.is_liked(&active.track.path),
        })
    }

    /// Best-effort, coalesced by the resume writer.
    fn persist_cursor(&self) {
        if let Some(cursor) = self.current_cursor() {
            let _ = self.resume_tx.send(cursor);
        }
    }

    fn persist_cursor_for(&self, track: &Track, position_ms: u64) {
        let cursor = ResumeCursor {
            track_path: track.path.clone(),
            position_ms,
            loop_mode: self.loop_mode,
            liked: self.favorites.is_liked(&track.path),
        };
        let _ = self.resume_tx.send(cursor);
    }

    fn publish(&self) {
        let track = self.active.as_ref().map(|a| &a.track);
        let position_ms = self.active.as_ref().map(|a| a.session.position_ms());
        self.publisher
            .publish(self.state, track, self.loop_mode, position_ms);
        self.events.state_changed(self.state);
    }
}
