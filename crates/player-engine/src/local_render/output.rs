//! Output stage: the CPAL callback with varispeed and volume.
//!
//! The callback pulls source-rate samples from the queue, resamples them
//! by linear interpolation at the current playback rate (pitch times
//! speed), applies the output level, and maps channels to the device
//! layout. While paused it outputs silence without draining the queue,
//! so resuming picks up exactly where playback stopped.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use cpal::traits::DeviceTrait;

use super::buffer::SampleQueue;
use crate::render::RenderError;

/// Shared knobs between the session handle and the output callback.
pub(crate) struct ControlBlock {
    pub(crate) cancel: AtomicBool,
    pub(crate) paused: AtomicBool,
    /// Set by the callback once the queue is closed and drained.
    pub(crate) finished: AtomicBool,
    volume_bits: AtomicU32,
    rate_bits: AtomicU32,
    /// Source frames consumed so far; drives position reporting.
    pub(crate) consumed_src_frames: AtomicU64,
}

impl ControlBlock {
    pub(crate) fn new(volume: f32) -> Self {
        Self {
            cancel: AtomicBool::new(false),
            paused: AtomicBool::new(true),
            finished: AtomicBool::new(false),
            volume_bits: AtomicU32::new(volume.clamp(0.0, 1.0).to_bits()),
            rate_bits: AtomicU32::new(1.0f32.to_bits()),
            consumed_src_frames: AtomicU64::new(0),
        }
    }

    pub(crate) fn volume(&self) -> f32 {
        f32::from_bits(self.volume_bits.load(Ordering::Relaxed))
    }

    pub(crate) fn set_volume(&self, volume: f32) {
        self.volume_bits
            .store(volume.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    pub(crate) fn rate(&self) -> f32 {
        f32::from_bits(self.rate_bits.load(Ordering::Relaxed))
    }

    pub(crate) fn set_rate(&self, rate: f32) {
        self.rate_bits.store(rate.to_bits(), Ordering::Relaxed);
    }

    pub(crate) fn consumed_src_frames(&self) -> u64 {
        self.consumed_src_frames.load(Ordering::Relaxed)
    }
}

/// Linear-interpolation varispeed reader over chunks popped from the
/// sample queue. Needs one frame of lookahead, so the final source frame
/// of a track is never emitted; at audio rates that is inaudible.
pub(crate) struct Varispeed {
    channels: usize,
    src: Vec<f32>,
    /// Integer frame position within `src`.
    pos: usize,
    /// Fractional position between `pos` and `pos + 1`.
    frac: f64,
    consumed: u64,
}

impl Varispeed {
    pub(crate) fn new(channels: usize) -> Self {
        Self {
            channels,
            src: Vec::new(),
            pos: 0,
            frac: 0.0,
            consumed: 0,
        }
    }

    /// Drop consumed frames and append a fresh chunk.
    pub(crate) fn refill(&mut self, chunk: &[f32]) {
        self.src.drain(..self.pos * self.channels);
        self.pos = 0;
        self.src.extend_from_slice(chunk);
    }

    /// Produce one interpolated output frame into `out`, advancing the
    /// source position by `rate` frames. Returns `false` when more
    /// source data is needed first.
    pub(crate) fn next_frame(&mut self, rate: f64, out: &mut [f32]) -> bool {
        if (self.pos + 2) * self.channels > self.src.len() {
            return false;
        }
        let a = self.pos * self.channels;
        let b = a + self.channels;
        let t = self.frac as f32;
        for ch in 0..self.channels {
            out[ch] = self.src[a + ch] + (self.src[b + ch] - self.src[a + ch]) * t;
        }
        self.frac += rate;
        let advance = self.frac as usize;
        if advance > 0 {
            self.pos += advance;
            self.frac -= advance as f64;
            self.consumed += advance as u64;
        }
        true
    }

    pub(crate) fn take_consumed(&mut self) -> u64 {
        std::mem::take(&mut self.consumed)
    }
}

/// One source frame mapped to a destination channel: mono is duplicated,
/// stereo is downmixed to mono by averaging, anything else clamps to the
/// available channels.
fn map_channel(frame: &[f32], dst_ch: usize) -> f32 {
    match frame.len() {
        0 => 0.0,
        1 => frame[0],
        2 if dst_ch == 0 || dst_ch == 1 => frame[dst_ch],
        _ => frame[dst_ch.min(frame.len() - 1)],
    }
}

fn downmix_to_mono(frame: &[f32]) -> f32 {
    match frame.len() {
        0 => 0.0,
        1 => frame[0],
        2 => 0.5 * (frame[0] + frame[1]),
        n => frame.iter().sum::<f32>() / n as f32,
    }
}

pub(crate) fn build_output_stream(
    device: &cpal::Device,
    supported: &cpal::SupportedStreamConfig,
    queue: Arc<SampleQueue>,
    control: Arc<ControlBlock>,
    refill_max_frames: usize,
) -> Result<cpal::Stream, RenderError> {
    let config = supported.config();
    match supported.sample_format() {
        cpal::SampleFormat::F32 => build_stream::<f32>(device, &config, queue, control, refill_max_frames),
        cpal::SampleFormat::I32 => build_stream::<i32>(device, &config, queue, control, refill_max_frames),
        cpal::SampleFormat::I16 => build_stream::<i16>(device, &config, queue, control, refill_max_frames),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, &config, queue, control, refill_max_frames),
        other => Err(RenderError::Device {
            reason: format!("unsupported sample format: {other:?}"),
        }),
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    queue: Arc<SampleQueue>,
    control: Arc<ControlBlock>,
    refill_max_frames: usize,
) -> Result<cpal::Stream, RenderError>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32> + Send + 'static,
{
    let out_channels = config.channels as usize;
    let src_channels = queue.channels();
    let refill_max_frames = refill_max_frames.max(1);

    let state = Arc::new(Mutex::new(Varispeed::new(src_channels)));
    let mut frame = vec![0.0f32; src_channels];

    let err_fn = |err| tracing::warn!("output stream error: {err}");
    let silence = <T as cpal::Sample>::from_sample::<f32>(0.0);

    let stream = device
        .build_output_stream(
            config,
            move |data: &mut [T], _| {
                if control.cancel.load(Ordering::Relaxed)
                    || control.paused.load(Ordering::Relaxed)
                {
                    data.fill(silence);
                    return;
                }

                let rate = control.rate() as f64;
                let volume = control.volume();
                let mut st = state.lock().expect("varispeed lock");

                let frames = data.len() / out_channels;
                'frames: for out_frame in 0..frames {
                    while !st.next_frame(rate, &mut frame) {
                        match queue.pop_chunk(refill_max_frames) {
                            Some(chunk) => st.refill(&chunk),
                            None => {
                                if queue.is_done() {
                                    control.finished.store(true, Ordering::Relaxed);
                                }
                                // Underrun or end of stream: silence out.
                                for idx in (out_frame * out_channels)..data.len() {
                                    data[idx] = silence;
                                }
                                break 'frames;
                            }
                        }
                    }
                    for ch in 0..out_channels {
                        let sample = if out_channels == 1 {
                            downmix_to_mono(&frame)
                        } else {
                            map_channel(&frame, ch)
                        };
                        data[out_frame * out_channels + ch] =
                            <T as cpal::Sample>::from_sample::<f32>(sample * volume);
                    }
                }

                let consumed = st.take_consumed();
                if consumed > 0 {
                    control
                        .consumed_src_frames
                        .fetch_add(consumed, Ordering::Relaxed);
                }
            },
            err_fn,
            None,
        )
        .map_err(|err| RenderError::Device {
            reason: err.to_string(),
        })?;

    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interleave(frames: &[[f32; 2]]) -> Vec<f32> {
        frames.iter().flatten().copied().collect()
    }

    #[test]
    fn unit_rate_passes_frames_through() {
        let mut vs = Varispeed::new(2);
        vs.refill(&interleave(&[[0.1, 0.2], [0.3, 0.4], [0.5, 0.6]]));

        let mut out = [0.0f32; 2];
        assert!(vs.next_frame(1.0, &mut out));
        assert_eq!(out, [0.1, 0.2]);
        assert!(vs.next_frame(1.0, &mut out));
        assert_eq!(out, [0.3, 0.4]);
        // One frame of lookahead is required, so the last frame waits
        // for more data.
        assert!(!vs.next_frame(1.0, &mut out));
        assert_eq!(vs.take_consumed(), 2);
    }

    #[test]
    fn double_rate_consumes_two_source_frames_per_output_frame() {
        let mut vs = Varispeed::new(1);
        vs.refill(&[0.0, 1.0, 2.0, 3.0, 4.0]);

        let mut out = [0.0f32; 1];
        assert!(vs.next_frame(2.0, &mut out));
        assert_eq!(out, [0.0]);
        assert!(vs.next_frame(2.0, &mut out));
        assert_eq!(out, [2.0]);
        assert_eq!(vs.take_consumed(), 4);
    }

    #[test]
    fn half_rate_interpolates_between_frames() {
        let mut vs = Varispeed::new(1);
        vs.refill(&[0.0, 1.0, 2.0]);

        let mut out = [0.0f32; 1];
        assert!(vs.next_frame(0.5, &mut out));
        assert_eq!(out, [0.0]);
        assert!(vs.next_frame(0.5, &mut out));
        assert_eq!(out, [0.5]);
        assert!(vs.next_frame(0.5, &mut out));
        assert_eq!(out, [1.0]);
        assert_eq!(vs.take_consumed(), 1);
    }

    #[test]
    fn refill_keeps_position_across_chunks() {
        let mut vs = Varispeed::new(1);
        vs.refill(&[0.0, 1.0]);

        let mut out = [0.0f32; 1];
        assert!(vs.next_frame(1.0, &mut out));
        assert!(!vs.next_frame(1.0, &mut out));
        vs.refill(&[2.0, 3.0]);
        assert!(vs.next_frame(1.0, &mut out));
        assert_eq!(out, [1.0]);
        assert!(vs.next_frame(1.0, &mut out));
        assert_eq!(out, [2.0]);
    }

    #[test]
    fn channel_mapping_covers_mono_and_stereo() {
        assert_eq!(map_channel(&[0.7], 0), 0.7);
        assert_eq!(map_channel(&[0.7], 1), 0.7);
        assert_eq!(map_channel(&[0.2, 0.8], 0), 0.2);
        assert_eq!(map_channel(&[0.2, 0.8], 1), 0.8);
        assert_eq!(downmix_to_mono(&[0.2, 0.8]), 0.5);
    }

    #[test]
    fn control_block_round_trips_volume_and_rate() {
        let control = ControlBlock::new(0.9);
        assert_eq!(control.volume(), 0.9);
        control.set_volume(2.0);
        assert_eq!(control.volume(), 1.0);
        control.set_rate(1.8);
        assert_eq!(control.rate(), 1.8);
        assert!(control.paused.load(Ordering::Relaxed));
    }
}
