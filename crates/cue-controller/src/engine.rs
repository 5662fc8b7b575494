//! The cue engine: command dispatch and the owning tick context.
//!
//! All mutable playback state (both tracks, ramps, process handles) is owned
//! here and touched only from the thread driving [`Engine::handle`] and
//! [`Engine::tick`]. The tick is the heartbeat that advances fades, detects
//! hint completion, and drains the hint queue. Command arrival timing never
//! drives a transition directly.

use std::time::Duration;

use crate::assets::{AssetKind, AssetResolver, CueAsset};
use crate::background::BackgroundTrack;
use crate::command::{BackgroundCommand, Command, HintCommand, HintMode};
use crate::config::Config;
use crate::hint::HintTrack;

pub struct Engine {
    resolver: AssetResolver,
    background: BackgroundTrack,
    hint: HintTrack,
    duck_volume: f32,
    duck_fade: Duration,
    restore_fade: Duration,
}

impl Engine {
    pub fn new(cfg: &Config) -> Self {
        Self {
            resolver: AssetResolver::new(cfg.audio.base_path.clone(), &cfg.video),
            background: BackgroundTrack::new(&cfg.audio, &cfg.video),
            hint: HintTrack::new(&cfg.audio, &cfg.video),
            duck_volume: cfg.audio.duck_volume,
            duck_fade: Duration::from_millis(cfg.audio.duck_fade_ms),
            restore_fade: Duration::from_millis(cfg.audio.restore_fade_ms),
        }
    }

    /// Apply one validated command. Never fails; bad assets degrade to a
    /// logged no-op that preserves the current state.
    pub fn handle(&mut self, cmd: Command) {
        match cmd {
            Command::Panic => self.panic(),
            Command::Background(cmd) => self.handle_background(cmd),
            Command::Hint(cmd) => self.handle_hint(cmd),
        }
    }

    /// One scheduler cycle: advance ramps, observe completions, drain the
    /// hint queue.
    pub fn tick(&mut self) {
        self.background.tick();

        if self.hint.poll_finished() {
            self.after_hint();
        }

        // At most one queued hint starts per tick, and only on an idle channel.
        if !self.hint.is_playing() {
            if let Some((asset, volume)) = self.hint.dequeue() {
                self.start_hint(asset, Some(volume));
            }
        }
    }

    /// Unconditional recovery to rest state. Always succeeds.
    pub fn panic(&mut self) {
        tracing::warn!("panic: resetting both tracks");
        self.hint.panic();
        self.background.panic();
    }

    /// Quiet teardown on process exit (Ctrl-C / SIGTERM).
    pub fn shutdown(&mut self) {
        tracing::info!("engine shutdown");
        self.hint.panic();
        self.background.stop();
    }

    fn handle_background(&mut self, cmd: BackgroundCommand) {
        match cmd {
            BackgroundCommand::Start {
                file,
                volume,
                looping,
            } => match self.resolver.resolve(&file) {
                Ok(asset) if self.must_defer_video(&asset) => {
                    self.background.adopt_suspended_video(asset, looping);
                }
                Ok(asset) => self.background.start(asset, volume, looping),
                Err(e) => tracing::warn!("background start dropped: {e:#}"),
            },
            BackgroundCommand::Stop => self.background.stop(),
            BackgroundCommand::Switch { file, fade_ms } => match self.resolver.resolve(&file) {
                Ok(asset) if self.must_defer_video(&asset) => {
                    self.background.adopt_suspended_video(asset, true);
                }
                Ok(asset) => self.background.switch(asset, fade_ms),
                Err(e) => tracing::warn!("background switch dropped: {e:#}"),
            },
        }
    }

    /// A background video cannot take the display while a video hint holds
    /// it; the asset is adopted suspended and launched when the hint ends.
    fn must_defer_video(&mut self, asset: &CueAsset) -> bool {
        asset.kind == AssetKind::Video && self.hint.video_busy()
    }

    fn handle_hint(&mut self, cmd: HintCommand) {
        match cmd {
            HintCommand::Play { file, volume, mode } => match self.resolver.resolve(&file) {
                Ok(asset) => match mode {
                    HintMode::Interrupt => {
                        if let Some(replaced) = self.hint.current_file() {
                            tracing::debug!(replaced, "hint interrupted");
                        }
                        self.hint.stop_current();
                        self.hint.clear_queue();
                        self.start_hint(asset, volume);
                    }
                    HintMode::Queue => self.hint.enqueue(asset, volume),
                },
                Err(e) => tracing::warn!("hint play dropped: {e:#}"),
            },
            HintCommand::Stop => {
                self.hint.stop_current();
                self.hint.clear_queue();
                self.after_hint();
            }
        }
    }

    /// Duck (or suspend) the background, then start the hint.
    ///
    /// A video hint over a video background cannot share the display, so the
    /// background video is suspended and relaunched afterwards; an audio bed
    /// is volume-ducked instead.
    fn start_hint(&mut self, asset: CueAsset, volume: Option<f32>) {
        if asset.kind == AssetKind::Video && self.background.video_active() {
            self.background.suspend_video();
        } else {
            self.background.duck(self.duck_volume, self.duck_fade);
        }

        if !self.hint.start(asset, volume) {
            // Failed launch: don't leave the background ducked/suspended.
            self.after_hint();
        }
    }

    fn after_hint(&mut self) {
        if self.background.is_video_suspended() {
            self.background.resume_suspended();
        } else {
            self.background.restore(self.restore_fade);
        }
    }

    #[cfg(test)]
    pub(crate) fn background_mut(&mut self) -> &mut BackgroundTrack {
        &mut self.background
    }

    #[cfg(test)]
    pub(crate) fn hint_mut(&mut self) -> &mut HintTrack {
        &mut self.hint
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{BackgroundCommand, HintCommand, HintMode};
    use std::fs;

    /// Engine wired against a temp media dir. The dummy files are not valid
    /// audio, so sessions fail fast in the pipeline thread; the state
    /// machine under test is unaffected.
    fn engine_with_files(files: &[&str]) -> (Engine, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        for f in files {
            fs::write(dir.path().join(f), b"stub").unwrap();
        }
        let mut cfg = Config::defaults();
        cfg.audio.base_path = dir.path().to_path_buf();
        cfg.video.base_path = dir.path().to_path_buf();
        (Engine::new(&cfg), dir)
    }

    #[test]
    fn missing_file_is_a_no_op() {
        let (mut engine, _dir) = engine_with_files(&[]);
        engine.handle(Command::Background(BackgroundCommand::Start {
            file: "missing.mp3".into(),
            volume: None,
            looping: true,
        }));
        assert!(!engine.background_mut().has_audio());
    }

    #[test]
    fn interrupt_replaces_current_hint() {
        let (mut engine, _dir) = engine_with_files(&["a.mp3", "b.mp3"]);
        engine.handle(Command::Hint(HintCommand::Play {
            file: "a.mp3".into(),
            volume: None,
            mode: HintMode::Interrupt,
        }));
        engine.handle(Command::Hint(HintCommand::Play {
            file: "b.mp3".into(),
            volume: None,
            mode: HintMode::Interrupt,
        }));
        assert_eq!(engine.hint_mut().current_file(), Some("b.mp3"));
        assert!(engine.hint_mut().is_playing());
    }

    #[test]
    fn queued_hints_drain_one_per_tick() {
        let (mut engine, _dir) = engine_with_files(&["a.mp3", "b.mp3"]);
        engine.handle(Command::Hint(HintCommand::Play {
            file: "a.mp3".into(),
            volume: None,
            mode: HintMode::Queue,
        }));
        engine.handle(Command::Hint(HintCommand::Play {
            file: "b.mp3".into(),
            volume: None,
            mode: HintMode::Queue,
        }));
        assert!(!engine.hint_mut().is_playing());
        assert_eq!(engine.hint_mut().queue_len(), 2);

        engine.tick();
        assert_eq!(engine.hint_mut().current_file(), Some("a.mp3"));
        assert_eq!(engine.hint_mut().queue_len(), 1);
    }

    #[test]
    fn second_queued_hint_waits_for_first_to_finish() {
        let (mut engine, _dir) = engine_with_files(&["a.mp3", "b.mp3"]);
        for f in ["a.mp3", "b.mp3"] {
            engine.handle(Command::Hint(HintCommand::Play {
                file: f.into(),
                volume: None,
                mode: HintMode::Queue,
            }));
        }
        engine.tick();
        assert_eq!(engine.hint_mut().current_file(), Some("a.mp3"));

        // The stub session for "a" dies quickly; ticking must observe the
        // completion edge before promoting "b".
        for _ in 0..200 {
            engine.tick();
            if engine.hint_mut().current_file() == Some("b.mp3") {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(engine.hint_mut().current_file(), Some("b.mp3"));
        assert_eq!(engine.hint_mut().queue_len(), 0);
    }

    #[test]
    fn background_restores_after_hint_completes() {
        let dir = tempfile::tempdir().unwrap();
        for f in ["bed.mp3", "hint.mp3"] {
            fs::write(dir.path().join(f), b"stub").unwrap();
        }
        let mut cfg = Config::defaults();
        cfg.audio.base_path = dir.path().to_path_buf();
        cfg.video.base_path = dir.path().to_path_buf();
        cfg.audio.duck_fade_ms = 40;
        cfg.audio.restore_fade_ms = 40;
        let mut engine = Engine::new(&cfg);

        engine.handle(Command::Background(BackgroundCommand::Start {
            file: "bed.mp3".into(),
            volume: None,
            looping: true,
        }));
        engine.handle(Command::Hint(HintCommand::Play {
            file: "hint.mp3".into(),
            volume: None,
            mode: HintMode::Interrupt,
        }));

        let default = engine.background_mut().default_volume();
        let mut restored = false;
        for _ in 0..200 {
            engine.tick();
            if !engine.hint_mut().is_playing() && engine.background_mut().volume() == default {
                restored = true;
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(restored, "background volume never returned to default");
    }

    #[test]
    fn interrupt_discards_pending_queue() {
        let (mut engine, _dir) = engine_with_files(&["a.mp3", "b.mp3", "c.mp3"]);
        engine.handle(Command::Hint(HintCommand::Play {
            file: "a.mp3".into(),
            volume: None,
            mode: HintMode::Queue,
        }));
        engine.handle(Command::Hint(HintCommand::Play {
            file: "b.mp3".into(),
            volume: None,
            mode: HintMode::Queue,
        }));
        engine.handle(Command::Hint(HintCommand::Play {
            file: "c.mp3".into(),
            volume: None,
            mode: HintMode::Interrupt,
        }));
        assert_eq!(engine.hint_mut().queue_len(), 0);
        assert_eq!(engine.hint_mut().current_file(), Some("c.mp3"));
    }

    #[test]
    fn panic_resets_both_tracks_to_defaults() {
        let (mut engine, _dir) = engine_with_files(&["bed.mp3", "hint.mp3"]);
        engine.handle(Command::Background(BackgroundCommand::Start {
            file: "bed.mp3".into(),
            volume: Some(0.9),
            looping: true,
        }));
        engine.handle(Command::Hint(HintCommand::Play {
            file: "hint.mp3".into(),
            volume: None,
            mode: HintMode::Interrupt,
        }));

        engine.panic();

        let default = engine.background_mut().default_volume();
        assert_eq!(engine.background_mut().volume(), default);
        assert!(!engine.background_mut().has_audio());
        assert!(engine.background_mut().current_file().is_none());
        assert!(!engine.hint_mut().is_playing());
        assert_eq!(engine.hint_mut().queue_len(), 0);
    }

    #[test]
    fn hint_over_audio_bed_schedules_duck() {
        let (mut engine, _dir) = engine_with_files(&["bed.mp3", "hint.mp3"]);
        engine.handle(Command::Background(BackgroundCommand::Start {
            file: "bed.mp3".into(),
            volume: None,
            looping: true,
        }));
        let before = engine.background_mut().volume();
        engine.handle(Command::Hint(HintCommand::Play {
            file: "hint.mp3".into(),
            volume: None,
            mode: HintMode::Interrupt,
        }));
        // The duck is a ramp, not a jump: volume unchanged until ticks run.
        assert_eq!(engine.background_mut().volume(), before);
        // Ride the ramp past its end; volume must land on the duck target.
        std::thread::sleep(Duration::from_millis(450));
        engine.tick();
        assert!((engine.background_mut().volume() - 0.15).abs() < 1e-6);
    }

    #[cfg(unix)]
    #[test]
    fn panic_during_duck_ramp_and_video_hint_resets_everything() {
        let dir = tempfile::tempdir().unwrap();
        for f in ["bed.mp3", "clip.mp4"] {
            fs::write(dir.path().join(f), b"stub").unwrap();
        }
        let mut cfg = Config::defaults();
        cfg.audio.base_path = dir.path().to_path_buf();
        cfg.video.base_path = dir.path().to_path_buf();
        // Stand-in player that stays alive until terminated.
        cfg.video.player_cmd = Some(vec!["sh".into(), "-c".into(), "sleep 30".into()]);
        let mut engine = Engine::new(&cfg);

        engine.handle(Command::Background(BackgroundCommand::Start {
            file: "bed.mp3".into(),
            volume: None,
            looping: true,
        }));
        engine.handle(Command::Hint(HintCommand::Play {
            file: "clip.mp4".into(),
            volume: None,
            mode: HintMode::Interrupt,
        }));
        assert!(engine.hint_mut().is_busy());

        engine.panic();

        assert!(!engine.hint_mut().is_playing());
        assert!(!engine.hint_mut().is_busy());
        let default = engine.background_mut().default_volume();
        assert_eq!(engine.background_mut().volume(), default);
        assert!(engine.background_mut().current_file().is_none());
    }

    #[cfg(unix)]
    #[test]
    fn background_video_defers_while_hint_video_holds_display() {
        let dir = tempfile::tempdir().unwrap();
        for f in ["hint.mp4", "loop.mp4"] {
            fs::write(dir.path().join(f), b"stub").unwrap();
        }
        let mut cfg = Config::defaults();
        cfg.audio.base_path = dir.path().to_path_buf();
        cfg.video.base_path = dir.path().to_path_buf();
        cfg.video.player_cmd = Some(vec!["sh".into(), "-c".into(), "sleep 30".into()]);
        let mut engine = Engine::new(&cfg);

        engine.handle(Command::Hint(HintCommand::Play {
            file: "hint.mp4".into(),
            volume: None,
            mode: HintMode::Interrupt,
        }));
        engine.handle(Command::Background(BackgroundCommand::Start {
            file: "loop.mp4".into(),
            volume: None,
            looping: true,
        }));

        // The hint keeps the display; the background waits, suspended.
        assert!(engine.hint_mut().video_busy());
        assert!(engine.background_mut().is_video_suspended());
        assert!(!engine.background_mut().video_active());

        engine.handle(Command::Hint(HintCommand::Stop));
        assert!(engine.background_mut().video_active());
        engine.background_mut().stop();
    }

    #[test]
    fn path_resolution_never_escapes_base() {
        let (mut engine, dir) = engine_with_files(&[]);
        // Both traversal shapes resolve under base and (absent the file)
        // drop the command without touching state.
        engine.handle(Command::Background(BackgroundCommand::Start {
            file: "../../etc/passwd".into(),
            volume: None,
            looping: true,
        }));
        engine.handle(Command::Background(BackgroundCommand::Start {
            file: "/etc/passwd".into(),
            volume: None,
            looping: true,
        }));
        assert!(!engine.background_mut().has_audio());
        drop(dir);
    }
}
