//! Streaming audio decode stage.
//!
//! Uses Symphonia to probe a local file and decode packets into interleaved
//! `f32` samples pushed into a bounded [`SampleQueue`] from a background
//! thread. A looping decode seeks back to zero at EOF instead of closing the
//! queue, so a background track plays continuously without a gap.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use std::thread;

use anyhow::{Context, Result, anyhow};
use symphonia::core::audio::{SampleBuffer, SignalSpec};
use symphonia::core::codecs::{CodecParameters, DecoderOptions};
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;

use crate::queue::{SampleQueue, samples_for_seconds};

/// Decode stage options.
#[derive(Clone, Debug)]
pub struct DecodeOptions {
    /// Target buffer duration used to size the output queue.
    pub buffer_seconds: f32,
    /// Seek back to the start at EOF instead of finishing.
    pub looping: bool,
}

/// Start a background decoder thread streaming samples from `path`.
///
/// Returns the source signal spec, the queue the thread fills, and the track
/// duration when the container reports one. The queue is closed on EOF
/// (non-looping), on a decode error, or when the consumer closes it first
/// (which is how sessions cancel a looping decode).
pub fn start_decode(
    path: &Path,
    opts: &DecodeOptions,
) -> Result<(SignalSpec, Arc<SampleQueue>, Option<u64>)> {
    let file = File::open(path).with_context(|| format!("open {:?}", path))?;

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let mss = MediaSourceStream::new(Box::new(file), Default::default());
    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;

    let format = probed.format;
    let track = format
        .default_track()
        .ok_or_else(|| anyhow!("No default audio track"))?;
    let channels = track
        .codec_params
        .channels
        .ok_or_else(|| anyhow!("Unknown channels"))?
        .count();
    let rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| anyhow!("Unknown sample rate"))?;
    let spec = SignalSpec::new(rate, track.codec_params.channels.unwrap());

    let codec_params = track.codec_params.clone();
    let duration_ms = duration_ms_from_codec_params(&codec_params);

    let queue = Arc::new(SampleQueue::new(
        channels,
        samples_for_seconds(rate, channels, opts.buffer_seconds),
    ));

    let queue_thread = queue.clone();
    let looping = opts.looping;
    thread::spawn(move || {
        if let Err(e) = decode_loop(format, codec_params, &queue_thread, looping) {
            tracing::error!("decoder thread error: {e:#}");
        }
        queue_thread.close();
    });

    Ok((spec, queue, duration_ms))
}

/// Decode packets and push interleaved `f32` into `queue` until EOF or until
/// the queue is closed from the consumer side.
fn decode_loop(
    mut format: Box<dyn FormatReader>,
    codec_params: CodecParameters,
    queue: &Arc<SampleQueue>,
    looping: bool,
) -> Result<()> {
    let mut decoder =
        symphonia::default::get_codecs().make(&codec_params, &DecoderOptions::default())?;

    loop {
        if queue.is_closed() {
            return Ok(());
        }

        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(_) => {
                // EOF: either finish the session or rewind for a gapless loop.
                if !looping {
                    return Ok(());
                }
                format
                    .seek(
                        SeekMode::Accurate,
                        SeekTo::Time {
                            time: Time::new(0, 0.0),
                            track_id: None,
                        },
                    )
                    .context("seek to start for loop")?;
                decoder.reset();
                continue;
            }
        };

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(_) => continue,
        };

        let mut sample_buf = SampleBuffer::<f32>::new(decoded.frames() as u64, *decoded.spec());
        sample_buf.copy_interleaved_ref(decoded);
        queue.push_blocking(sample_buf.samples());
    }
}

/// Best-effort duration in milliseconds from codec metadata.
fn duration_ms_from_codec_params(codec_params: &CodecParameters) -> Option<u64> {
    let frames = codec_params.n_frames?;
    let rate = codec_params.sample_rate? as u64;
    if rate == 0 {
        return None;
    }
    Some(frames.saturating_mul(1000) / rate)
}
