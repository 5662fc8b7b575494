//! Streaming resample stage.
//!
//! Converts decoded interleaved `f32` audio from the source rate to the
//! output device rate with Rubato's streaming sinc resampler. Runs in a
//! background thread between the decode queue and the playback queue.

use std::sync::Arc;
use std::thread;

use anyhow::Result;
use audioadapter_buffers::direct::InterleavedSlice;
use rubato::{
    Async, FixedAsync, Indexing, Resampler, SincInterpolationParameters, SincInterpolationType,
    WindowFunction, calculate_cutoff,
};
use symphonia::core::audio::SignalSpec;

use crate::queue::{SampleQueue, samples_for_seconds};

/// Resampler stage options.
#[derive(Clone, Copy, Debug)]
pub struct ResampleOptions {
    /// Input chunk size in frames for the steady-state loop.
    pub chunk_frames: usize,
    /// Target buffering (seconds) for the output queue.
    pub buffer_seconds: f32,
}

/// Start a background resampler thread reading from `srcq` (at
/// `src_spec.rate`) and producing samples at `dst_rate` into a new queue.
///
/// The output queue closes when the input queue closes and its tail has been
/// processed, or on a resampler error. Closing the output queue early (from
/// the consumer side) does not stop the input; sessions close both.
pub fn start_resampler(
    srcq: Arc<SampleQueue>,
    src_spec: SignalSpec,
    dst_rate: u32,
    opts: ResampleOptions,
) -> Result<Arc<SampleQueue>> {
    let channels = src_spec.channels.count();
    let chunk_frames = opts.chunk_frames.max(1);

    let dstq = Arc::new(SampleQueue::new(
        channels,
        samples_for_seconds(dst_rate, channels, opts.buffer_seconds),
    ));

    let f_ratio = dst_rate as f64 / src_spec.rate as f64;
    let sinc_len = 128;
    let window = WindowFunction::BlackmanHarris2;
    let params = SincInterpolationParameters {
        sinc_len,
        f_cutoff: calculate_cutoff(sinc_len, window),
        interpolation: SincInterpolationType::Cubic,
        oversampling_factor: 256,
        window,
    };

    let dstq_thread = dstq.clone();
    thread::spawn(move || {
        let mut resampler: Box<dyn Resampler<f32>> = match Async::<f32>::new_sinc(
            f_ratio,
            1.1,
            &params,
            chunk_frames,
            channels,
            FixedAsync::Input,
        ) {
            Ok(r) => Box::new(r),
            Err(e) => {
                tracing::error!("resampler init error: {e:#}");
                dstq_thread.close();
                return;
            }
        };

        let mut out = vec![0.0f32; channels * chunk_frames * 3];

        // Steady state: whole chunks. Once the input closes, drain whatever
        // partial tail is left.
        while let Some(chunk) = srcq.pop_exact(chunk_frames) {
            if !push_resampled(&mut resampler, &chunk, chunk_frames, false, &mut out, channels, &dstq_thread) {
                break;
            }
            if dstq_thread.is_closed() {
                break;
            }
        }
        while let Some(tail) = srcq.pop_up_to(chunk_frames) {
            let tail_frames = tail.len() / channels;
            if tail_frames == 0 {
                continue;
            }
            if !push_resampled(&mut resampler, &tail, tail_frames, true, &mut out, channels, &dstq_thread) {
                break;
            }
        }

        dstq_thread.close();
    });

    Ok(dstq)
}

/// Resample one input block and push the produced frames downstream.
///
/// Returns `false` when the stage should stop (adapter or process error).
fn push_resampled(
    resampler: &mut Box<dyn Resampler<f32>>,
    input: &[f32],
    input_frames: usize,
    partial: bool,
    out: &mut [f32],
    channels: usize,
    dstq: &Arc<SampleQueue>,
) -> bool {
    let input_adapter = match InterleavedSlice::new(input, channels, input_frames) {
        Ok(a) => a,
        Err(e) => {
            tracing::error!("interleaved slice (input) error: {e:#}");
            return false;
        }
    };
    let out_capacity_frames = out.len() / channels;
    let mut output_adapter = match InterleavedSlice::new_mut(out, channels, out_capacity_frames) {
        Ok(a) => a,
        Err(e) => {
            tracing::error!("interleaved slice (output) error: {e:#}");
            return false;
        }
    };

    let indexing = Indexing {
        input_offset: 0,
        output_offset: 0,
        active_channels_mask: None,
        partial_len: partial.then_some(input_frames),
    };

    let (_consumed, produced) =
        match resampler.process_into_buffer(&input_adapter, &mut output_adapter, Some(&indexing)) {
            Ok(x) => x,
            Err(e) => {
                tracing::error!("resampler process error: {e:#}");
                return false;
            }
        };

    let produced_samples = produced * channels;
    if produced_samples > 0 {
        dstq.push_blocking(&out[..produced_samples]);
    }
    true
}
