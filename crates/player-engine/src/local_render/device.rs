//! Output device and stream-config selection.

use cpal::traits::{DeviceTrait, HostTrait};

use crate::render::RenderError;

pub(crate) fn default_output_device(host: &cpal::Host) -> Result<cpal::Device, RenderError> {
    host.default_output_device().ok_or(RenderError::Device {
        reason: "no default output device".to_string(),
    })
}

/// Pick the output config closest to `source_rate`, preferring an exact
/// rate match and `f32` samples. Running the device at the source rate
/// lets the varispeed stage be the only resampler in the path.
pub(crate) fn pick_output_config(
    device: &cpal::Device,
    source_rate: u32,
) -> Result<cpal::SupportedStreamConfig, RenderError> {
    let ranges: Vec<cpal::SupportedStreamConfigRange> = device
        .supported_output_configs()
        .map_err(|err| RenderError::Device {
            reason: err.to_string(),
        })?
        .collect();
    if ranges.is_empty() {
        return Err(RenderError::Device {
            reason: "no supported output configs".to_string(),
        });
    }

    let mut best: Option<(u32, u8, cpal::SupportedStreamConfig)> = None;
    for range in ranges {
        let rate = clamp_rate(range.min_sample_rate(), range.max_sample_rate(), source_rate);
        let distance = rate.abs_diff(source_rate);
        let rank = sample_format_rank(range.sample_format());
        let replace = match &best {
            None => true,
            Some((b_distance, b_rank, _)) => {
                distance < *b_distance || (distance == *b_distance && rank < *b_rank)
            }
        };
        if replace {
            best = Some((distance, rank, range.with_sample_rate(rate)));
        }
    }

    Ok(best.expect("non-empty ranges").2)
}

fn clamp_rate(min: u32, max: u32, target: u32) -> u32 {
    target.clamp(min, max)
}

fn sample_format_rank(format: cpal::SampleFormat) -> u8 {
    match format {
        cpal::SampleFormat::F32 => 0,
        cpal::SampleFormat::I32 => 1,
        cpal::SampleFormat::I16 => 2,
        cpal::SampleFormat::U16 => 3,
        _ => 10,
    }
}
