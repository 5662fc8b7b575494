//! Output device discovery and selection.
//!
//! Thin wrappers around CPAL: list output devices, pick one by substring
//! match (or the host default), and choose an output config close to the
//! source sample rate.

use anyhow::{Context, Result, anyhow};
use cpal::traits::{DeviceTrait, HostTrait};

/// Pick the first output device whose name contains `needle`
/// (case-insensitive), or the host default device when `needle` is `None`.
pub fn pick_device(host: &cpal::Host, needle: Option<&str>) -> Result<cpal::Device> {
    let mut devices: Vec<cpal::Device> = host
        .output_devices()
        .context("No output devices")?
        .collect();

    if let Some(needle) = needle {
        if let Some(d) = devices.drain(..).find(|d| {
            d.description()
                .ok()
                .map(|n| name_matches(&n.name(), needle))
                .unwrap_or(false)
        }) {
            return Ok(d);
        }
        return Err(anyhow!("No output device matched: {needle}"));
    }

    host.default_output_device()
        .ok_or_else(|| anyhow!("No default output device"))
}

/// Choose an output config for `target_rate`.
///
/// Prefers an exact rate match, then the nearest supported rate, with `f32`
/// sample formats ranked above integer ones.
pub fn pick_output_config(
    device: &cpal::Device,
    target_rate: Option<u32>,
) -> Result<cpal::SupportedStreamConfig> {
    let ranges: Vec<cpal::SupportedStreamConfigRange> =
        device.supported_output_configs()?.collect();
    if ranges.is_empty() {
        return Err(anyhow!("No supported output configs"));
    }

    let mut best: Option<(u64, cpal::SupportedStreamConfig)> = None;
    for range in ranges {
        let rate = rate_for_range(range.min_sample_rate(), range.max_sample_rate(), target_rate);
        let distance = target_rate
            .map(|t| rate.abs_diff(t) as u64)
            .unwrap_or(u32::MAX.abs_diff(rate) as u64);
        let score = distance * 10 + format_rank(range.sample_format()) as u64;
        let cfg = range.with_sample_rate(rate);
        if best.as_ref().map(|(s, _)| score < *s).unwrap_or(true) {
            best = Some((score, cfg));
        }
    }

    Ok(best.unwrap().1)
}

/// Prefer a fixed buffer size when the device advertises a range, capped so
/// latency stays reasonable. `None` keeps the device default.
pub fn pick_buffer_size(config: &cpal::SupportedStreamConfig) -> Option<cpal::BufferSize> {
    match config.buffer_size() {
        cpal::SupportedBufferSize::Range { min, max } => {
            const MAX_FRAMES: u32 = 16_384;
            let chosen = if *max > MAX_FRAMES {
                if *min > MAX_FRAMES { *min } else { MAX_FRAMES }
            } else {
                *max
            };
            Some(cpal::BufferSize::Fixed(chosen))
        }
        cpal::SupportedBufferSize::Unknown => None,
    }
}

/// Print available output devices to stdout (CLI `--list-devices`).
pub fn list_devices(host: &cpal::Host) -> Result<()> {
    let devices = host.output_devices().context("No output devices")?;
    for (i, d) in devices.enumerate() {
        println!("#{i}: {}", d.description()?);
    }
    Ok(())
}

/// Whether the host exposes at least one output device.
pub fn any_output_device(host: &cpal::Host) -> bool {
    host.output_devices()
        .map(|mut devices| devices.next().is_some())
        .unwrap_or(false)
}

fn rate_for_range(min: u32, max: u32, target_rate: Option<u32>) -> u32 {
    match target_rate {
        Some(t) if t < min => min,
        Some(t) if t > max => max,
        Some(t) => t,
        None => max,
    }
}

fn format_rank(format: cpal::SampleFormat) -> u8 {
    match format {
        cpal::SampleFormat::F32 => 0,
        cpal::SampleFormat::I32 => 1,
        cpal::SampleFormat::I16 => 2,
        cpal::SampleFormat::U16 => 3,
        _ => 9,
    }
}

fn name_matches(name: &str, needle: &str) -> bool {
    let needle = needle.trim();
    if needle.is_empty() {
        return false;
    }
    name.to_lowercase().contains(&needle.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_for_range_prefers_target_in_range() {
        assert_eq!(rate_for_range(44_100, 96_000, Some(48_000)), 48_000);
    }

    #[test]
    fn rate_for_range_clamps() {
        assert_eq!(rate_for_range(44_100, 96_000, Some(22_050)), 44_100);
        assert_eq!(rate_for_range(44_100, 96_000, Some(192_000)), 96_000);
    }

    #[test]
    fn rate_for_range_defaults_to_max() {
        assert_eq!(rate_for_range(44_100, 96_000, None), 96_000);
    }

    #[test]
    fn format_rank_prefers_f32() {
        assert!(format_rank(cpal::SampleFormat::F32) < format_rank(cpal::SampleFormat::I16));
    }

    #[test]
    fn name_matches_is_case_insensitive() {
        assert!(name_matches("USB DAC", "dac"));
        assert!(!name_matches("USB DAC", "speaker"));
        assert!(!name_matches("USB DAC", ""));
    }
}
