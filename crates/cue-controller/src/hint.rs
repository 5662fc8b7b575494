//! Hint track ownership.
//!
//! A hint is a transient cue played over the background: one short audio
//! clip or one video. At most one hint renders at a time; queued requests
//! wait in a FIFO that the engine drains when the channel goes idle. The
//! track has no timers of its own; completion is observed by the engine
//! tick polling [`HintTrack::poll_finished`], because neither the audio
//! session nor the child process delivers a finish callback.

use std::collections::VecDeque;

use cue_player::config::PlaybackTuning;
use cue_player::gain::{Gain, clamp01};
use cue_player::session::{PlaybackSession, SessionOptions};

use crate::assets::{AssetKind, CueAsset};
use crate::config::{AudioConfig, VideoConfig};
use crate::video::{PlayerProcess, VideoLauncher};

pub struct HintTrack {
    default_volume: f32,
    device: Option<String>,
    tuning: PlaybackTuning,
    launcher: VideoLauncher,

    current: Option<CueAsset>,
    audio: Option<PlaybackSession>,
    video: Option<PlayerProcess>,
    queue: VecDeque<(CueAsset, f32)>,
    playing: bool,
}

impl HintTrack {
    pub fn new(audio: &AudioConfig, video: &VideoConfig) -> Self {
        Self {
            default_volume: audio.hint_default_volume,
            device: audio.device.clone(),
            tuning: PlaybackTuning::default(),
            launcher: VideoLauncher::new(video),
            current: None,
            audio: None,
            video: None,
            queue: VecDeque::new(),
            playing: false,
        }
    }

    /// Start rendering `asset` on the hint channel.
    ///
    /// Returns `false` when the cue could not start (video spawn failure);
    /// the engine then restores the background instead of leaving it ducked.
    pub fn start(&mut self, asset: CueAsset, volume: Option<f32>) -> bool {
        let vol = clamp01(volume.unwrap_or(self.default_volume));
        match asset.kind {
            AssetKind::Video => match self.launcher.launch(&asset.path, false) {
                Ok(proc) => {
                    tracing::info!(file = %asset.name, "hint video play");
                    self.video = Some(proc);
                }
                Err(e) => {
                    tracing::warn!(file = %asset.name, "hint video start failed: {e:#}");
                    return false;
                }
            },
            AssetKind::Audio => {
                tracing::info!(file = %asset.name, volume = vol, "hint play");
                self.audio = Some(PlaybackSession::start(
                    asset.path.clone(),
                    SessionOptions {
                        device: self.device.clone(),
                        looping: false,
                        gain: Gain::new(vol),
                        tuning: self.tuning.clone(),
                    },
                ));
            }
        }
        self.current = Some(asset);
        self.playing = true;
        true
    }

    /// Whether the hint channel is still rendering.
    pub fn is_busy(&mut self) -> bool {
        if !self.playing {
            return false;
        }
        if let Some(session) = self.audio.as_ref() {
            return session.is_active();
        }
        if let Some(video) = self.video.as_mut() {
            return video.is_running();
        }
        false
    }

    /// Detect the first tick on which a playing hint stopped being busy.
    ///
    /// Clears the hint state and returns `true` exactly once per finished
    /// cue; the engine performs the background restore on that edge.
    pub fn poll_finished(&mut self) -> bool {
        if !self.playing || self.is_busy() {
            return false;
        }
        tracing::info!(file = self.current.as_ref().map(|a| a.name.as_str()), "hint finished");
        self.clear_current();
        true
    }

    /// Stop whatever is rendering now. Queue is left untouched.
    pub fn stop_current(&mut self) {
        if let Some(mut session) = self.audio.take() {
            session.stop();
        }
        if let Some(proc) = self.video.take() {
            proc.terminate();
        }
        self.current = None;
        self.playing = false;
    }

    pub fn enqueue(&mut self, asset: CueAsset, volume: Option<f32>) {
        let vol = clamp01(volume.unwrap_or(self.default_volume));
        tracing::info!(file = %asset.name, depth = self.queue.len() + 1, "hint queued");
        self.queue.push_back((asset, vol));
    }

    pub fn dequeue(&mut self) -> Option<(CueAsset, f32)> {
        self.queue.pop_front()
    }

    pub fn clear_queue(&mut self) {
        if !self.queue.is_empty() {
            tracing::info!(dropped = self.queue.len(), "hint queue cleared");
            self.queue.clear();
        }
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    /// Whether the hint currently holds the video output.
    pub fn video_busy(&mut self) -> bool {
        self.playing && self.video.as_mut().is_some_and(|v| v.is_running())
    }

    #[cfg(test)]
    pub(crate) fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn current_file(&self) -> Option<&str> {
        self.current.as_ref().map(|a| a.name.as_str())
    }

    /// Unconditional reset: current cue stopped, queue discarded.
    pub fn panic(&mut self) {
        self.stop_current();
        self.clear_queue();
    }

    fn clear_current(&mut self) {
        self.audio = None;
        self.video = None;
        self.current = None;
        self.playing = false;
    }
}
