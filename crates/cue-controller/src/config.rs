//! Configuration loading and parsing.
//!
//! The on-disk schema is TOML with every field optional; loading resolves it
//! into a fully-defaulted [`Config`] so the rest of the controller never
//! handles `Option`s for tuning values.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use cue_player::gain::clamp01;

/// Raw TOML schema.
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    mqtt: Option<RawMqtt>,
    audio: Option<RawAudio>,
    video: Option<RawVideo>,
    web: Option<RawWeb>,
}

#[derive(Debug, Default, Deserialize)]
struct RawMqtt {
    host: Option<String>,
    port: Option<u16>,
    qos: Option<u8>,
    client_id: Option<String>,
    topics: Option<RawTopics>,
}

#[derive(Debug, Default, Deserialize)]
struct RawTopics {
    background: Option<String>,
    hint: Option<String>,
    panic: Option<String>,
    status: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawAudio {
    base_path: Option<PathBuf>,
    device: Option<String>,
    bg_default_volume: Option<f32>,
    hint_default_volume: Option<f32>,
    duck_volume: Option<f32>,
    duck_fade_ms: Option<u64>,
    restore_fade_ms: Option<u64>,
    bg_fade_ms: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawVideo {
    base_path: Option<PathBuf>,
    extensions: Option<Vec<String>>,
    mode: Option<String>,
    connector: Option<String>,
    player_cmd: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct RawWeb {
    enabled: Option<bool>,
    bind: Option<String>,
}

/// Resolved controller configuration.
#[derive(Clone, Debug)]
pub struct Config {
    pub mqtt: MqttConfig,
    pub audio: AudioConfig,
    pub video: VideoConfig,
    pub web: WebConfig,
}

#[derive(Clone, Debug)]
pub struct MqttConfig {
    pub host: String,
    pub port: u16,
    pub qos: u8,
    pub client_id: String,
    pub topics: Topics,
}

#[derive(Clone, Debug)]
pub struct Topics {
    pub background: String,
    pub hint: String,
    pub panic: String,
    pub status: String,
}

#[derive(Clone, Debug)]
pub struct AudioConfig {
    pub base_path: PathBuf,
    pub device: Option<String>,
    pub bg_default_volume: f32,
    pub hint_default_volume: f32,
    pub duck_volume: f32,
    pub duck_fade_ms: u64,
    pub restore_fade_ms: u64,
    pub bg_fade_ms: u64,
}

/// How the external video player is launched.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum DisplayMode {
    /// DRM when no graphical session is detected, windowed otherwise.
    #[default]
    Auto,
    /// Always direct-rendering (kiosk hosts).
    Drm,
    /// Always windowed.
    Windowed,
}

#[derive(Clone, Debug)]
pub struct VideoConfig {
    pub base_path: PathBuf,
    pub extensions: Vec<String>,
    pub mode: DisplayMode,
    pub connector: String,
    pub player_cmd: Option<Vec<String>>,
}

#[derive(Clone, Debug)]
pub struct WebConfig {
    pub enabled: bool,
    pub bind: SocketAddr,
}

const DEFAULT_VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "mov", "avi", "webm", "m4v"];

impl Config {
    /// Load configuration from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        let raw = toml::from_str::<RawConfig>(&raw)
            .with_context(|| format!("parse config {:?}", path))?;
        Self::resolve(raw)
    }

    /// Resolved defaults without a config file.
    pub fn defaults() -> Self {
        Self::resolve(RawConfig::default()).expect("defaults resolve")
    }

    fn resolve(raw: RawConfig) -> Result<Self> {
        let mqtt = raw.mqtt.unwrap_or_default();
        let topics = mqtt.topics.unwrap_or_default();
        let audio = raw.audio.unwrap_or_default();
        let video = raw.video.unwrap_or_default();
        let web = raw.web.unwrap_or_default();

        let audio_base = audio
            .base_path
            .unwrap_or_else(|| PathBuf::from("/var/lib/cue/audio"));

        let bind = web.bind.as_deref().unwrap_or("0.0.0.0:8080");
        let bind: SocketAddr = bind.parse().with_context(|| format!("parse web bind {bind}"))?;

        Ok(Self {
            mqtt: MqttConfig {
                host: mqtt.host.unwrap_or_else(|| "127.0.0.1".to_string()),
                port: mqtt.port.unwrap_or(1883),
                qos: mqtt.qos.unwrap_or(0).min(2),
                client_id: mqtt
                    .client_id
                    .unwrap_or_else(|| "cue-controller".to_string()),
                topics: Topics {
                    background: topics
                        .background
                        .unwrap_or_else(|| "cue/background".to_string()),
                    hint: topics.hint.unwrap_or_else(|| "cue/hint".to_string()),
                    panic: topics.panic.unwrap_or_else(|| "cue/panic".to_string()),
                    status: topics.status.unwrap_or_else(|| "cue/status".to_string()),
                },
            },
            audio: AudioConfig {
                base_path: audio_base.clone(),
                device: audio.device.filter(|d| !d.trim().is_empty()),
                bg_default_volume: clamp01(audio.bg_default_volume.unwrap_or(0.6)),
                hint_default_volume: clamp01(audio.hint_default_volume.unwrap_or(1.0)),
                duck_volume: clamp01(audio.duck_volume.unwrap_or(0.15)),
                duck_fade_ms: audio.duck_fade_ms.unwrap_or(400),
                restore_fade_ms: audio.restore_fade_ms.unwrap_or(800),
                bg_fade_ms: audio.bg_fade_ms.unwrap_or(1200),
            },
            video: VideoConfig {
                base_path: video.base_path.unwrap_or(audio_base),
                extensions: video.extensions.map_or_else(
                    || DEFAULT_VIDEO_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
                    |exts| exts.into_iter().map(|e| e.to_lowercase()).collect(),
                ),
                mode: parse_display_mode(video.mode.as_deref())?,
                connector: video
                    .connector
                    .map(|c| c.trim().to_string())
                    .unwrap_or_else(|| "auto".to_string()),
                player_cmd: video.player_cmd.filter(|cmd| !cmd.is_empty()),
            },
            web: WebConfig {
                enabled: web.enabled.unwrap_or(true),
                bind,
            },
        })
    }
}

fn parse_display_mode(mode: Option<&str>) -> Result<DisplayMode> {
    match mode.map(str::to_lowercase).as_deref() {
        None | Some("auto") => Ok(DisplayMode::Auto),
        Some("drm") => Ok(DisplayMode::Drm),
        Some("windowed") => Ok(DisplayMode::Windowed),
        Some(other) => anyhow::bail!("unknown video mode {other:?} (auto|drm|windowed)"),
    }
}
