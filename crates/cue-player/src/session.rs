//! Playback sessions.
//!
//! A [`PlaybackSession`] owns one decode → (resample) → output pipeline for a
//! single file. Sessions are started from a controller thread, polled for
//! completion (`is_active`), and cancelled without blocking the caller. All
//! pipeline work happens on background threads; the controller only touches
//! the handle and the shared [`Gain`].

use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::Result;

use crate::config::PlaybackTuning;
use crate::decode::{self, DecodeOptions};
use crate::device;
use crate::gain::Gain;
use crate::playback::{self, OutputOptions};
use crate::resample::{self, ResampleOptions};

/// Options for a single playback session.
#[derive(Clone, Debug)]
pub struct SessionOptions {
    /// Optional output device substring match.
    pub device: Option<String>,
    /// Loop seamlessly at EOF until cancelled.
    pub looping: bool,
    /// Live gain handle shared with the controller.
    pub gain: Gain,
    /// Stage tuning.
    pub tuning: PlaybackTuning,
}

/// Handle to a running (or finished) playback session.
pub struct PlaybackSession {
    cancel: Arc<AtomicBool>,
    done: Arc<AtomicBool>,
    join: Option<JoinHandle<()>>,
}

impl PlaybackSession {
    /// Start playing `path` on a background thread.
    ///
    /// Pipeline failures (missing device, decode error) are logged by the
    /// session thread and surface as the session going inactive; the caller
    /// polls [`is_active`](Self::is_active) either way.
    pub fn start(path: PathBuf, opts: SessionOptions) -> Self {
        let cancel = Arc::new(AtomicBool::new(false));
        let done = Arc::new(AtomicBool::new(false));

        let cancel_thread = cancel.clone();
        let done_thread = done.clone();
        let join = thread::spawn(move || {
            if let Err(e) = run_session(&path, &opts, &cancel_thread) {
                tracing::warn!(path = ?path, "playback session error: {e:#}");
            }
            done_thread.store(true, Ordering::Relaxed);
        });

        Self {
            cancel,
            done,
            join: Some(join),
        }
    }

    /// Whether the session is still rendering audio.
    pub fn is_active(&self) -> bool {
        !self.done.load(Ordering::Relaxed)
    }

    /// Request cancellation without blocking the caller.
    ///
    /// The pipeline notices the flag within its drain poll interval; the
    /// session thread is joined from a detached helper so a controller tick
    /// never waits on it.
    pub fn stop(&mut self) {
        self.cancel.store(true, Ordering::Relaxed);
        if let Some(join) = self.join.take() {
            thread::spawn(move || {
                let _ = join.join();
            });
        }
    }
}

/// Run one session pipeline to completion or cancellation.
fn run_session(path: &PathBuf, opts: &SessionOptions, cancel: &Arc<AtomicBool>) -> Result<()> {
    let (src_spec, srcq, duration_ms) = decode::start_decode(
        path,
        &DecodeOptions {
            buffer_seconds: opts.tuning.buffer_seconds,
            looping: opts.looping,
        },
    )?;

    let host = cpal::default_host();
    let device = device::pick_device(&host, opts.device.as_deref())?;
    let config = device::pick_output_config(&device, Some(src_spec.rate))?;
    let mut stream_config: cpal::StreamConfig = config.clone().into();
    if let Some(buf) = device::pick_buffer_size(&config) {
        stream_config.buffer_size = buf;
    }

    let dstq = if src_spec.rate == stream_config.sample_rate {
        srcq.clone()
    } else {
        resample::start_resampler(
            srcq.clone(),
            src_spec,
            stream_config.sample_rate,
            ResampleOptions {
                chunk_frames: opts.tuning.chunk_frames,
                buffer_seconds: opts.tuning.buffer_seconds,
            },
        )?
    };

    tracing::debug!(
        path = ?path,
        rate_hz = src_spec.rate,
        output_rate_hz = stream_config.sample_rate,
        duration_ms = ?duration_ms,
        looping = opts.looping,
        "playback session start"
    );

    let stream = playback::build_output_stream(
        &device,
        &stream_config,
        config.sample_format(),
        &dstq,
        OutputOptions {
            refill_max_frames: opts.tuning.refill_max_frames,
            gain: opts.gain.clone(),
        },
    )?;

    {
        use cpal::traits::StreamTrait;
        stream.play()?;
    }

    let drained = dstq.wait_drained(cancel);
    if !drained {
        srcq.close();
        dstq.close();
    }

    // Let the device play out its last buffer before the stream drops.
    thread::sleep(Duration::from_millis(100));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_session_goes_inactive() {
        let mut session = PlaybackSession::start(
            PathBuf::from("/nonexistent/clip.flac"),
            SessionOptions {
                device: None,
                looping: false,
                gain: Gain::default(),
                tuning: PlaybackTuning::default(),
            },
        );
        // The session thread fails fast on the open; give it a moment.
        for _ in 0..100 {
            if !session.is_active() {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }
        assert!(!session.is_active());
        session.stop();
    }
}
