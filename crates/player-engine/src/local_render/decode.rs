//! Streaming decode stage.
//!
//! Probes the container/codec with Symphonia, seeks to the requested
//! start position, and feeds interleaved `f32` samples into the bounded
//! queue from a background thread. The queue is closed on EOF or a
//! decoder error, which is how the output stage learns the track ended.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use std::thread;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CodecParameters, DecoderOptions};
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;

use super::buffer::SampleQueue;
use crate::render::RenderError;

/// A probed source ready for the decode thread.
pub(crate) struct ProbedSource {
    format: Box<dyn FormatReader>,
    codec_params: CodecParameters,
    pub(crate) channels: usize,
    pub(crate) sample_rate: u32,
    pub(crate) duration_ms: Option<u64>,
}

impl std::fmt::Debug for ProbedSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProbedSource")
            .field("channels", &self.channels)
            .field("sample_rate", &self.sample_rate)
            .field("duration_ms", &self.duration_ms)
            .finish_non_exhaustive()
    }
}

/// Open and probe `path`, seeking to `seek_ms` when requested.
pub(crate) fn open_source(path: &Path, seek_ms: Option<u64>) -> Result<ProbedSource, RenderError> {
    let file = File::open(path).map_err(|err| RenderError::Open {
        path: path.to_path_buf(),
        reason: err.to_string(),
    })?;

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let mss = MediaSourceStream::new(Box::new(file), Default::default());
    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|err| RenderError::Unsupported {
            path: path.to_path_buf(),
            reason: err.to_string(),
        })?;

    let mut format = probed.format;
    if let Some(ms) = seek_ms {
        if ms > 0 {
            let time = Time::new(ms / 1000, (ms % 1000) as f64 / 1000.0);
            // Best-effort: an unseekable source simply starts at zero.
            let _ = format.seek(
                SeekMode::Accurate,
                SeekTo::Time {
                    time,
                    track_id: None,
                },
            );
        }
    }

    let unsupported = |reason: &str| RenderError::Unsupported {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    };
    let track = format
        .default_track()
        .ok_or_else(|| unsupported("no default audio track"))?;
    let channels = track
        .codec_params
        .channels
        .ok_or_else(|| unsupported("unknown channel layout"))?
        .count();
    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| unsupported("unknown sample rate"))?;

    let codec_params = track.codec_params.clone();
    let duration_ms = duration_ms_from_codec_params(&codec_params);

    Ok(ProbedSource {
        format,
        codec_params,
        channels,
        sample_rate,
        duration_ms,
    })
}

/// Start the decode thread for a probed source.
pub(crate) fn spawn_decoder(source: ProbedSource, queue: Arc<SampleQueue>) {
    thread::spawn(move || {
        if let Err(err) = decode_loop(source.format, source.codec_params, &queue) {
            tracing::error!("decoder thread error: {err}");
        }
        queue.close();
    });
}

fn decode_loop(
    mut format: Box<dyn FormatReader>,
    codec_params: CodecParameters,
    queue: &Arc<SampleQueue>,
) -> Result<(), symphonia::core::errors::Error> {
    let mut decoder =
        symphonia::default::get_codecs().make(&codec_params, &DecoderOptions::default())?;

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(_) => break, // EOF
        };
        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(_) => continue, // skip corrupt packets
        };

        let mut sample_buf = SampleBuffer::<f32>::new(decoded.frames() as u64, *decoded.spec());
        sample_buf.copy_interleaved_ref(decoded);
        queue.push_blocking(sample_buf.samples());
    }

    Ok(())
}

/// Best-effort track duration from codec metadata.
fn duration_ms_from_codec_params(codec_params: &CodecParameters) -> Option<u64> {
    let frames = codec_params.n_frames?;
    let rate = codec_params.sample_rate? as u64;
    if rate == 0 {
        return None;
    }
    Some(frames.saturating_mul(1000) / rate)
}
