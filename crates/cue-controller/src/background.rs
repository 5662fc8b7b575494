//! Background track ownership.
//!
//! The background track is the continuous layer: a looping audio bed or a
//! looping video. It owns the audio session, the video child process, the
//! volume gain, and any in-flight ramp. All mutation happens from the engine
//! tick context; nothing here blocks except bounded video teardown.
//!
//! A software crossfade (`switch`) is resumable state: the fade-out ramp and
//! the pending target asset live here and the tick performs the hand-off
//! when the ramp lands, so a fade never stalls command intake.

use std::time::{Duration, Instant};

use cue_player::config::PlaybackTuning;
use cue_player::gain::{Gain, clamp01};
use cue_player::session::{PlaybackSession, SessionOptions};

use crate::assets::{AssetKind, CueAsset};
use crate::config::{AudioConfig, VideoConfig};
use crate::fade::{DEFAULT_STEPS, VolumeRamp};
use crate::video::{PlayerProcess, VideoLauncher};

/// Minimum spacing between automatic restarts of a looping session that
/// keeps dying (bad file, device gone).
const RESTART_COOLDOWN: Duration = Duration::from_secs(5);

pub struct BackgroundTrack {
    default_volume: f32,
    bg_fade_ms: u64,
    device: Option<String>,
    tuning: PlaybackTuning,
    launcher: VideoLauncher,

    gain: Gain,
    current: Option<CueAsset>,
    audio: Option<PlaybackSession>,
    video: Option<PlayerProcess>,
    ramp: Option<VolumeRamp>,
    pending_switch: Option<(CueAsset, Duration)>,
    video_suspended: bool,
    looping: bool,
    last_restart: Option<Instant>,
}

impl BackgroundTrack {
    pub fn new(audio: &AudioConfig, video: &VideoConfig) -> Self {
        Self {
            default_volume: audio.bg_default_volume,
            bg_fade_ms: audio.bg_fade_ms,
            device: audio.device.clone(),
            tuning: PlaybackTuning::default(),
            launcher: VideoLauncher::new(video),
            gain: Gain::new(audio.bg_default_volume),
            current: None,
            audio: None,
            video: None,
            ramp: None,
            pending_switch: None,
            video_suspended: false,
            looping: false,
            last_restart: None,
        }
    }

    /// Start a new background asset, replacing whatever is playing.
    pub fn start(&mut self, asset: CueAsset, volume: Option<f32>, looping: bool) {
        self.ramp = None;
        self.pending_switch = None;
        self.video_suspended = false;
        self.looping = looping;

        match asset.kind {
            AssetKind::Video => {
                self.stop_audio();
                self.stop_video();
                match self.launcher.launch(&asset.path, looping) {
                    Ok(proc) => {
                        tracing::info!(file = %asset.name, "background video start");
                        self.video = Some(proc);
                        self.current = Some(asset);
                    }
                    Err(e) => {
                        tracing::warn!(file = %asset.name, "background video start failed: {e:#}");
                        self.current = None;
                    }
                }
            }
            AssetKind::Audio => {
                self.stop_video();
                self.stop_audio();
                let vol = clamp01(volume.unwrap_or(self.default_volume));
                self.gain.set(vol);
                tracing::info!(file = %asset.name, volume = vol, "background start");
                self.audio = Some(PlaybackSession::start(
                    asset.path.clone(),
                    SessionOptions {
                        device: self.device.clone(),
                        looping,
                        gain: self.gain.clone(),
                        tuning: self.tuning.clone(),
                    },
                ));
                self.current = Some(asset);
            }
        }
    }

    /// Stop audio and/or video playback and clear track state.
    pub fn stop(&mut self) {
        tracing::info!("background stop");
        self.stop_audio();
        self.stop_video();
        self.ramp = None;
        self.pending_switch = None;
        self.current = None;
        self.video_suspended = false;
    }

    /// Change the background asset.
    ///
    /// Crossfades are only possible between two audio beds; any video on
    /// either side is a hard stop+start (no fade exists across a process
    /// boundary).
    pub fn switch(&mut self, asset: CueAsset, fade_ms: Option<u64>) {
        if asset.kind == AssetKind::Video || self.video.is_some() || self.video_suspended {
            tracing::info!(file = %asset.name, "background switch (hard)");
            self.stop();
            self.start(asset, None, true);
            return;
        }
        if self.audio.is_none() {
            self.start(asset, None, true);
            return;
        }

        let fade = Duration::from_millis(fade_ms.unwrap_or(self.bg_fade_ms));
        tracing::info!(file = %asset.name, fade_ms = fade.as_millis() as u64, "background switch");
        self.ramp = Some(VolumeRamp::new(self.gain.get(), 0.0, fade, DEFAULT_STEPS));
        self.pending_switch = Some((asset, fade));
    }

    /// Ramp the audio gain down to `to`. A video background is not ducked;
    /// hints either leave it running (audio hint) or suspend it (video hint).
    pub fn duck(&mut self, to: f32, fade: Duration) {
        if self.video.is_some() || self.video_suspended {
            return;
        }
        self.finish_pending_switch();
        self.ramp = Some(VolumeRamp::new(self.gain.get(), clamp01(to), fade, DEFAULT_STEPS));
    }

    /// Ramp the audio gain back to the default volume.
    pub fn restore(&mut self, fade: Duration) {
        if self.video.is_some() || self.video_suspended {
            return;
        }
        self.finish_pending_switch();
        self.ramp = Some(VolumeRamp::new(
            self.gain.get(),
            self.default_volume,
            fade,
            DEFAULT_STEPS,
        ));
    }

    /// Unconditional reset: everything stopped, volume back at the default
    /// with no ramp.
    pub fn panic(&mut self) {
        self.stop_audio();
        self.stop_video();
        self.ramp = None;
        self.pending_switch = None;
        self.current = None;
        self.video_suspended = false;
        self.gain.set(self.default_volume);
    }

    /// Stop the background video for the duration of a video hint, keeping
    /// the asset so it can be relaunched afterwards.
    pub fn suspend_video(&mut self) {
        if let Some(proc) = self.video.take() {
            tracing::info!("background video suspended for hint");
            proc.terminate();
            self.video_suspended = true;
        }
    }

    /// Adopt a video asset without launching it: the hint track holds the
    /// display right now, and the engine resumes this when it lets go.
    pub fn adopt_suspended_video(&mut self, asset: CueAsset, looping: bool) {
        self.stop_audio();
        self.stop_video();
        self.ramp = None;
        self.pending_switch = None;
        tracing::info!(file = %asset.name, "background video deferred behind hint");
        self.current = Some(asset);
        self.looping = looping;
        self.video_suspended = true;
    }

    /// Relaunch a suspended background video from the start.
    pub fn resume_suspended(&mut self) {
        if !self.video_suspended {
            return;
        }
        self.video_suspended = false;
        if let Some(asset) = self.current.clone() {
            match self.launcher.launch(&asset.path, self.looping) {
                Ok(proc) => {
                    tracing::info!(file = %asset.name, "background video resumed");
                    self.video = Some(proc);
                }
                Err(e) => {
                    tracing::warn!(file = %asset.name, "background video resume failed: {e:#}");
                    self.current = None;
                }
            }
        }
    }

    /// Advance ramps, complete crossfade hand-offs, reap dead processes.
    pub fn tick(&mut self) {
        if let Some(ramp) = self.ramp.clone() {
            self.gain.set(ramp.current());
            if ramp.is_finished() {
                self.gain.set(ramp.target());
                self.ramp = None;
                if let Some((next, fade)) = self.pending_switch.take() {
                    self.stop_audio();
                    self.start(next, Some(0.0), true);
                    self.ramp = Some(VolumeRamp::new(0.0, self.default_volume, fade, DEFAULT_STEPS));
                }
            }
        }

        if let Some(video) = self.video.as_mut() {
            if !video.is_running() {
                tracing::warn!("background video exited unexpectedly");
                self.video = None;
                self.current = None;
            }
        }

        self.restart_dead_audio();
    }

    /// Whether a video background is currently rendering.
    pub fn video_active(&mut self) -> bool {
        self.video.as_mut().map(|v| v.is_running()).unwrap_or(false)
    }

    pub fn is_video_suspended(&self) -> bool {
        self.video_suspended
    }

    #[cfg(test)]
    pub(crate) fn has_audio(&self) -> bool {
        self.audio.is_some()
    }

    #[cfg(test)]
    pub(crate) fn volume(&self) -> f32 {
        self.gain.get()
    }

    #[cfg(test)]
    pub(crate) fn default_volume(&self) -> f32 {
        self.default_volume
    }

    #[cfg(test)]
    pub(crate) fn current_file(&self) -> Option<&str> {
        self.current.as_ref().map(|a| a.name.as_str())
    }

    /// Apply a pending crossfade hand-off immediately (hard cut) so a new
    /// ramp request cannot strand the queued switch target.
    fn finish_pending_switch(&mut self) {
        if let Some((next, _)) = self.pending_switch.take() {
            self.ramp = None;
            self.stop_audio();
            self.start(next, None, true);
        }
    }

    fn restart_dead_audio(&mut self) {
        if self.pending_switch.is_some() {
            return;
        }
        let dead = matches!(self.audio.as_ref(), Some(s) if !s.is_active());
        if !dead {
            return;
        }
        if !self.looping {
            // A one-shot bed ending is a normal completion, not a fault.
            tracing::info!(file = ?self.current.as_ref().map(|a| a.name.as_str()), "background finished");
            self.audio = None;
            self.current = None;
            return;
        }
        let Some(asset) = self.current.clone() else {
            self.audio = None;
            return;
        };
        if asset.kind != AssetKind::Audio {
            return;
        }

        let recently = self
            .last_restart
            .is_some_and(|t| t.elapsed() < RESTART_COOLDOWN);
        if recently {
            tracing::warn!(file = %asset.name, "background session died again; giving up");
            self.audio = None;
            self.current = None;
            return;
        }

        tracing::warn!(file = %asset.name, "background session died; restarting");
        self.last_restart = Some(Instant::now());
        // Keep whatever ramp is in flight; a restart must not jump the volume.
        let ramp = self.ramp.take();
        let volume = self.gain.get();
        self.start(asset, Some(volume), true);
        self.ramp = ramp;
    }

    fn stop_audio(&mut self) {
        if let Some(mut session) = self.audio.take() {
            session.stop();
        }
    }

    fn stop_video(&mut self) {
        if let Some(proc) = self.video.take() {
            proc.terminate();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use std::fs;

    /// Track backed by a temp dir with stub media files. The stubs are not
    /// decodable, so sessions die in their pipeline thread; the crossfade
    /// state machine and gain under test don't care.
    fn track_with_assets(bg_fade_ms: u64) -> (BackgroundTrack, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        for name in ["bed.mp3", "next.mp3"] {
            fs::write(dir.path().join(name), b"stub").unwrap();
        }
        let mut cfg = Config::defaults();
        cfg.audio.base_path = dir.path().to_path_buf();
        cfg.audio.bg_fade_ms = bg_fade_ms;
        (BackgroundTrack::new(&cfg.audio, &cfg.video), dir)
    }

    fn audio_asset(dir: &tempfile::TempDir, name: &str) -> CueAsset {
        CueAsset {
            name: name.to_string(),
            path: dir.path().join(name),
            kind: AssetKind::Audio,
        }
    }

    #[test]
    fn start_sets_requested_volume() {
        let (mut track, dir) = track_with_assets(50);
        track.start(audio_asset(&dir, "bed.mp3"), Some(0.4), true);
        assert_eq!(track.volume(), 0.4);
        assert!(track.has_audio());
        assert_eq!(track.current_file(), Some("bed.mp3"));
    }

    #[test]
    fn audio_switch_crossfades_and_lands_on_default() {
        let (mut track, dir) = track_with_assets(50);
        track.start(audio_asset(&dir, "bed.mp3"), None, true);
        track.switch(audio_asset(&dir, "next.mp3"), Some(50));

        // Hand-off is deferred until the fade-out ramp lands.
        assert_eq!(track.current_file(), Some("bed.mp3"));

        std::thread::sleep(Duration::from_millis(80));
        track.tick();
        assert_eq!(track.current_file(), Some("next.mp3"));

        std::thread::sleep(Duration::from_millis(80));
        track.tick();
        assert_eq!(track.volume(), track.default_volume());
    }

    #[test]
    fn duck_then_panic_resets_volume_immediately() {
        let (mut track, dir) = track_with_assets(50);
        track.start(audio_asset(&dir, "bed.mp3"), None, true);
        track.duck(0.15, Duration::from_millis(400));

        // Ride the ramp partway down, then panic mid-flight.
        std::thread::sleep(Duration::from_millis(100));
        track.tick();
        assert!(track.volume() < track.default_volume());

        track.panic();
        assert_eq!(track.volume(), track.default_volume());
        assert!(!track.has_audio());
        assert!(track.current_file().is_none());
    }

    #[test]
    fn stop_clears_track_state() {
        let (mut track, dir) = track_with_assets(50);
        track.start(audio_asset(&dir, "bed.mp3"), None, true);
        track.stop();
        assert!(!track.has_audio());
        assert!(track.current_file().is_none());
    }
}
