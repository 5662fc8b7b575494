//! Playback stage (CPAL output stream).
//!
//! Builds the CPAL output stream and provides the real-time audio callback.
//! The callback:
//! - refills a small local buffer from the shared queue without blocking
//! - applies the session gain
//! - applies basic channel mapping (mono↔stereo, best-effort otherwise)
//! - converts `f32` samples to the device sample format

use std::sync::{Arc, Mutex};

use anyhow::{Result, anyhow};
use cpal::traits::DeviceTrait;

use crate::gain::Gain;
use crate::queue::SampleQueue;

/// Output callback options.
#[derive(Clone, Debug)]
pub struct OutputOptions {
    /// Maximum number of frames to pull from the queue per refill.
    pub refill_max_frames: usize,
    /// Live gain applied to every sample.
    pub gain: Gain,
}

/// Build a CPAL output stream that plays audio from `dstq`.
///
/// `dstq` must contain interleaved `f32` samples already at the device
/// sample rate. Underruns are filled with silence; the callback never blocks
/// on the queue.
pub fn build_output_stream(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    sample_format: cpal::SampleFormat,
    dstq: &Arc<SampleQueue>,
    opts: OutputOptions,
) -> Result<cpal::Stream> {
    match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(device, config, dstq, opts),
        cpal::SampleFormat::I16 => build_stream::<i16>(device, config, dstq, opts),
        cpal::SampleFormat::I32 => build_stream::<i32>(device, config, dstq, opts),
        cpal::SampleFormat::U16 => build_stream::<u16>(device, config, dstq, opts),
        other => Err(anyhow!("Unsupported sample format: {other:?}")),
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    dstq: &Arc<SampleQueue>,
    opts: OutputOptions,
) -> Result<cpal::Stream>
where
    T: cpal::Sample + cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels_out = config.channels as usize;
    let refill_max_frames = opts.refill_max_frames.max(1);
    let gain = opts.gain.clone();

    let state = Arc::new(Mutex::new(RefillState {
        pos: 0,
        src_channels: dstq.channels(),
        src: Vec::new(),
    }));

    let dstq_cb = dstq.clone();
    let state_cb = state.clone();
    let err_fn = |err| tracing::warn!("stream error: {err}");

    let stream = device.build_output_stream(
        config,
        move |data: &mut [T], _| {
            let mut st = state_cb.lock().unwrap();
            let level = gain.get();

            let frames = data.len() / channels_out;
            for frame in 0..frames {
                if st.pos >= st.src.len() {
                    st.pos = 0;
                    st.src.clear();
                    match dstq_cb.try_pop(refill_max_frames) {
                        Some(v) => st.src = v,
                        None => {
                            // No more audio ready; fill the rest with silence.
                            for idx in (frame * channels_out)..data.len() {
                                data[idx] = <T as cpal::Sample>::from_sample::<f32>(0.0);
                            }
                            return;
                        }
                    }
                }
                for ch in 0..channels_out {
                    let sample = level * next_mapped_sample(&mut st, channels_out, ch);
                    data[frame * channels_out + ch] =
                        <T as cpal::Sample>::from_sample::<f32>(sample);
                }
            }
        },
        err_fn,
        None,
    )?;

    Ok(stream)
}

/// Local refill buffer for the output callback.
struct RefillState {
    pos: usize,
    src_channels: usize,
    src: Vec<f32>,
}

/// Read one output sample for `dst_ch`, applying a simple channel mapping.
///
/// Mapping rules:
/// - mono → stereo: duplicate channel 0
/// - stereo → mono: average L/R
/// - matching layouts: pass-through
/// - other layouts: clamp to available channels
///
/// `st.pos` advances once per destination frame (after the last channel).
fn next_mapped_sample(st: &mut RefillState, dst_channels: usize, dst_ch: usize) -> f32 {
    if st.pos >= st.src.len() {
        return 0.0;
    }

    let frame_start = st.pos;
    let get_src = |ch: usize, st: &RefillState| -> f32 {
        if ch < st.src_channels && frame_start + ch < st.src.len() {
            st.src[frame_start + ch]
        } else {
            0.0
        }
    };

    let out = match (st.src_channels, dst_channels) {
        (1, 1) => get_src(0, st),
        (2, 2) => get_src(dst_ch.min(1), st),
        (2, 1) => 0.5 * (get_src(0, st) + get_src(1, st)),
        (1, 2) => get_src(0, st),
        _ => get_src(dst_ch.min(st.src_channels.saturating_sub(1)), st),
    };

    if dst_ch + 1 == dst_channels {
        st.pos += st.src_channels;
    }
    out
}
