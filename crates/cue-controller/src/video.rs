//! External video player supervision.
//!
//! Launches mpv for video cues, polls it for exit, and tears it down with a
//! bounded graceful-terminate escalation. Kiosk hosts without a graphical
//! session get a direct-rendering (DRM) launch; when the display mode is
//! `auto`, a failed DRM launch falls back to a plain windowed command so a
//! desktop dev machine still plays the cue.

use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};

use anyhow::{Context, Result, bail};

use crate::config::{DisplayMode, VideoConfig};

const TERMINATE_WAIT: Duration = Duration::from_secs(2);

/// Builds and spawns video player commands from the configured display mode.
#[derive(Clone, Debug)]
pub struct VideoLauncher {
    mode: DisplayMode,
    connector: String,
    player_cmd: Option<Vec<String>>,
}

/// A supervised video player child process.
#[derive(Debug)]
pub struct PlayerProcess {
    child: Child,
}

impl VideoLauncher {
    pub fn new(cfg: &VideoConfig) -> Self {
        Self {
            mode: cfg.mode,
            connector: cfg.connector.clone(),
            player_cmd: cfg.player_cmd.clone(),
        }
    }

    /// Launch the player for `path`.
    ///
    /// In `auto` mode a DRM launch failure is retried once with the DRM flags
    /// stripped. Every attempted command line is logged; an error is returned
    /// only when all attempts fail to spawn.
    pub fn launch(&self, path: &Path, looping: bool) -> Result<PlayerProcess> {
        let mut cmd = self.base_command();
        if looping {
            cmd.push("--loop=inf".to_string());
        }
        cmd.push(path.display().to_string());

        let mut candidates = vec![cmd];
        if self.mode == DisplayMode::Auto {
            if let Some(fallback) = strip_drm_flags(&candidates[0]) {
                candidates.push(fallback);
            }
        }

        for candidate in &candidates {
            match spawn_quiet(candidate) {
                Ok(child) => {
                    tracing::info!(path = %path.display(), looping, "video player started");
                    return Ok(PlayerProcess { child });
                }
                Err(e) => {
                    tracing::warn!(cmd = ?candidate, "video player spawn failed: {e:#}");
                }
            }
        }

        bail!("no video player command could be started for {}", path.display());
    }

    fn base_command(&self) -> Vec<String> {
        if let Some(cmd) = &self.player_cmd {
            return cmd.clone();
        }

        let mut cmd: Vec<String> = ["mpv", "--fs", "--no-terminal", "--really-quiet"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        if drm_selected(self.mode, has_graphical_display()) {
            cmd.push("--vo=gpu".to_string());
            cmd.push("--gpu-context=drm".to_string());
            if let Some(connector) = self.resolve_connector() {
                cmd.push(format!("--drm-connector={connector}"));
            }
        }
        cmd
    }

    /// The connector to pin the DRM output to: the configured name, or the
    /// first connected display the kernel reports when left on `auto`.
    fn resolve_connector(&self) -> Option<String> {
        let configured = self.connector.trim();
        if !configured.is_empty() && !configured.eq_ignore_ascii_case("auto") {
            return Some(configured.to_string());
        }
        detect_connector()
    }
}

impl PlayerProcess {
    /// Non-blocking poll of the child's exit status.
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    /// Graceful teardown: SIGTERM, wait up to 2 s, then force kill.
    ///
    /// The only place the controller is allowed to block, and only for the
    /// bounded wait.
    pub fn terminate(mut self) {
        if !self.is_running() {
            return;
        }

        send_term(&self.child);
        let deadline = Instant::now() + TERMINATE_WAIT;
        while Instant::now() < deadline {
            if !self.is_running() {
                return;
            }
            std::thread::sleep(Duration::from_millis(50));
        }

        tracing::warn!(pid = self.child.id(), "video player ignored terminate; killing");
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn spawn_quiet(cmd: &[String]) -> Result<Child> {
    let (program, args) = cmd.split_first().context("empty player command")?;
    Command::new(program)
        .args(args)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .with_context(|| format!("spawn {program}"))
}

#[cfg(unix)]
fn send_term(child: &Child) {
    unsafe {
        libc::kill(child.id() as libc::pid_t, libc::SIGTERM);
    }
}

#[cfg(not(unix))]
fn send_term(_child: &Child) {}

/// Whether a DRM launch should be used for the given mode and environment.
fn drm_selected(mode: DisplayMode, has_graphical_display: bool) -> bool {
    match mode {
        DisplayMode::Drm => true,
        DisplayMode::Windowed => false,
        DisplayMode::Auto => !has_graphical_display,
    }
}

fn has_graphical_display() -> bool {
    std::env::var_os("DISPLAY").is_some_and(|v| !v.is_empty())
        || std::env::var_os("WAYLAND_DISPLAY").is_some_and(|v| !v.is_empty())
}

/// First connected DRM output in sysfs, or `None` off-Linux / headless.
fn detect_connector() -> Option<String> {
    let entries = std::fs::read_dir("/sys/class/drm").ok()?;
    let mut connected: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter_map(|e| {
            let name = e.file_name().into_string().ok()?;
            let status = std::fs::read_to_string(e.path().join("status")).ok()?;
            (status.trim() == "connected").then_some(name)
        })
        .collect();
    connected.sort();
    connected
        .into_iter()
        .next()
        .and_then(|entry| connector_from_entry(&entry))
}

/// Sysfs entries are `card<N>-<connector>`; strip the card prefix.
fn connector_from_entry(entry: &str) -> Option<String> {
    entry.split_once('-').map(|(_, c)| c.to_string())
}

/// Remove the DRM-specific flags from a command line.
///
/// Returns `None` when the command carries none (no distinct fallback).
fn strip_drm_flags(cmd: &[String]) -> Option<Vec<String>> {
    let stripped: Vec<String> = cmd
        .iter()
        .filter(|part| {
            part.as_str() != "--vo=gpu"
                && part.as_str() != "--gpu-context=drm"
                && !part.starts_with("--drm-connector=")
        })
        .cloned()
        .collect();
    if stripped.len() == cmd.len() {
        None
    } else {
        Some(stripped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn launcher(mode: DisplayMode) -> VideoLauncher {
        VideoLauncher {
            mode,
            connector: "HDMI-A-1".to_string(),
            player_cmd: None,
        }
    }

    #[test]
    fn drm_selection_follows_mode_and_environment() {
        assert!(drm_selected(DisplayMode::Drm, true));
        assert!(!drm_selected(DisplayMode::Windowed, false));
        assert!(drm_selected(DisplayMode::Auto, false));
        assert!(!drm_selected(DisplayMode::Auto, true));
    }

    #[test]
    fn strip_drm_flags_removes_only_drm_parts() {
        let cmd: Vec<String> = [
            "mpv",
            "--fs",
            "--vo=gpu",
            "--gpu-context=drm",
            "--drm-connector=HDMI-A-1",
            "clip.mp4",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let fallback = strip_drm_flags(&cmd).unwrap();
        assert_eq!(fallback, vec!["mpv", "--fs", "clip.mp4"]);
    }

    #[test]
    fn strip_drm_flags_none_without_drm() {
        let cmd: Vec<String> = ["mpv", "--fs", "clip.mp4"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert!(strip_drm_flags(&cmd).is_none());
    }

    #[test]
    fn configured_player_cmd_wins() {
        let l = VideoLauncher {
            mode: DisplayMode::Drm,
            connector: "HDMI-A-1".to_string(),
            player_cmd: Some(vec!["cvlc".to_string(), "--fullscreen".to_string()]),
        };
        assert_eq!(l.base_command(), vec!["cvlc", "--fullscreen"]);
    }

    #[test]
    fn drm_mode_includes_connector_flag() {
        let cmd = launcher(DisplayMode::Drm).base_command();
        assert!(cmd.contains(&"--gpu-context=drm".to_string()));
        assert!(cmd.contains(&"--drm-connector=HDMI-A-1".to_string()));
    }

    #[test]
    fn windowed_mode_has_no_drm_flags() {
        let cmd = launcher(DisplayMode::Windowed).base_command();
        assert!(!cmd.iter().any(|p| p.contains("drm")));
    }

    #[test]
    fn connector_entry_strips_card_prefix() {
        assert_eq!(
            connector_from_entry("card0-HDMI-A-1"),
            Some("HDMI-A-1".to_string())
        );
        assert_eq!(
            connector_from_entry("card1-DP-2"),
            Some("DP-2".to_string())
        );
        assert_eq!(connector_from_entry("card0"), None);
    }

    #[test]
    fn configured_connector_wins_over_detection() {
        let l = launcher(DisplayMode::Drm);
        assert_eq!(l.resolve_connector(), Some("HDMI-A-1".to_string()));
    }

    #[test]
    fn launch_failure_reports_error() {
        let l = VideoLauncher {
            mode: DisplayMode::Windowed,
            connector: String::new(),
            player_cmd: Some(vec!["definitely-not-a-player-binary".to_string()]),
        };
        assert!(l.launch(&PathBuf::from("/tmp/clip.mp4"), false).is_err());
    }

    #[cfg(unix)]
    #[test]
    fn terminate_stops_a_live_child() {
        let child = spawn_quiet(&["sleep".to_string(), "30".to_string()]).unwrap();
        let mut proc = PlayerProcess { child };
        assert!(proc.is_running());
        proc.terminate();
    }
}
