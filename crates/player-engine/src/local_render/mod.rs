//! Local render backend: Symphonia decode into a CPAL output stream.
//!
//! `begin` probes the file synchronously, then hands the rest to a
//! supervisor thread that owns the CPAL stream (streams are not `Send`)
//! and reports ready/completed/failed into the controller channel. The
//! returned session is a handle of atomics; dropping it cancels the
//! supervisor and decode threads and releases the device.

mod buffer;
mod decode;
mod device;
mod output;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread;
use std::time::Duration;

use cpal::traits::StreamTrait;
use crossbeam_channel::Sender;
use player_types::{EqualizerConfig, Track};

use crate::command::{EngineMessage, RenderEvent};
use crate::config::RenderConfig;
use crate::render::{EffectError, RenderBackend, RenderError, RenderOptions, RenderSession};
use buffer::SampleQueue;
use output::ControlBlock;

const SUPERVISOR_POLL: Duration = Duration::from_millis(25);
const RATE_MIN: f32 = 0.25;
const RATE_MAX: f32 = 4.0;

pub struct LocalRenderBackend {
    render: RenderConfig,
}

impl LocalRenderBackend {
    pub fn new(render: RenderConfig) -> Self {
        Self { render }
    }
}

impl RenderBackend for LocalRenderBackend {
    fn begin(
        &self,
        track: &Track,
        generation: u64,
        options: RenderOptions,
        events: Sender<EngineMessage>,
    ) -> Result<Box<dyn RenderSession>, RenderError> {
        let source = decode::open_source(&track.path, options.seek_ms)?;
        let sample_rate = source.sample_rate;
        let channels = source.channels;
        tracing::debug!(
            path = %track.path.display(),
            sample_rate,
            channels,
            duration_ms = ?source.duration_ms,
            "probed source"
        );

        let max_samples =
            buffer::max_buffered_samples(sample_rate, channels, self.render.buffer_seconds);
        let queue = Arc::new(SampleQueue::new(channels, max_samples));
        let control = Arc::new(ControlBlock::new(options.volume));

        decode::spawn_decoder(source, queue.clone());

        let supervisor = {
            let queue = queue.clone();
            let control = control.clone();
            let refill_max_frames = self.render.refill_max_frames;
            thread::spawn(move || {
                run_supervisor(queue, control, refill_max_frames, sample_rate, generation, events)
            })
        };

        Ok(Box::new(LocalRenderSession {
            control,
            queue,
            base_ms: options.seek_ms.unwrap_or(0),
            sample_rate,
            supervisor: Some(supervisor),
        }))
    }
}

/// Owns the CPAL stream for one session and reports its lifecycle.
fn run_supervisor(
    queue: Arc<SampleQueue>,
    control: Arc<ControlBlock>,
    refill_max_frames: usize,
    sample_rate: u32,
    generation: u64,
    events: Sender<EngineMessage>,
) {
    let fail = |reason: String| {
        let _ = events.send(EngineMessage::Render(RenderEvent::Failed {
            generation,
            reason,
        }));
    };

    let host = cpal::default_host();
    let device = match device::default_output_device(&host) {
        Ok(d) => d,
        Err(err) => return fail(err.to_string()),
    };
    let supported = match device::pick_output_config(&device, sample_rate) {
        Ok(c) => c,
        Err(err) => return fail(err.to_string()),
    };
    let stream = match output::build_output_stream(
        &device,
        &supported,
        queue,
        control.clone(),
        refill_max_frames,
    ) {
        Ok(s) => s,
        Err(err) => return fail(err.to_string()),
    };
    // The callback runs from here on; the paused flag keeps it silent
    // until the controller starts output.
    if let Err(err) = stream.play() {
        return fail(err.to_string());
    }

    let _ = events.send(EngineMessage::Render(RenderEvent::Ready { generation }));

    loop {
        if control.cancel.load(Ordering::Relaxed) {
            break;
        }
        if control.finished.load(Ordering::Relaxed) {
            let _ = events.send(EngineMessage::Render(RenderEvent::Completed { generation }));
            break;
        }
        thread::sleep(SUPERVISOR_POLL);
    }

    drop(stream);
}

struct LocalRenderSession {
    control: Arc<ControlBlock>,
    queue: Arc<SampleQueue>,
    base_ms: u64,
    sample_rate: u32,
    supervisor: Option<thread::JoinHandle<()>>,
}

impl RenderSession for LocalRenderSession {
    fn pause(&self) {
        self.control.paused.store(true, Ordering::Relaxed);
    }

    fn resume(&self) {
        self.control.paused.store(false, Ordering::Relaxed);
    }

    fn set_volume(&self, volume: f32) {
        self.control.set_volume(volume);
    }

    fn position_ms(&self) -> u64 {
        let consumed = self.control.consumed_src_frames();
        self.base_ms + consumed.saturating_mul(1000) / self.sample_rate.max(1) as u64
    }

    fn apply_effects(&self, config: &EqualizerConfig) -> Result<(), EffectError> {
        self.control
            .set_rate((config.pitch * config.speed).clamp(RATE_MIN, RATE_MAX));
        // Varispeed is the only effect this host can realize; band EQ,
        // bass boost and reverb need a platform effect chain.
        if config.enabled {
            return Err(EffectError::Unsupported("band_equalizer"));
        }
        Ok(())
    }
}

impl Drop for LocalRenderSession {
    fn drop(&mut self) {
        self.control.cancel.store(true, Ordering::Relaxed);
        self.queue.close();
        if let Some(handle) = self.supervisor.take() {
            let _ = handle.join();
        }
    }
}
