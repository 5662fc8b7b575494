//! Inbound command normalization.
//!
//! The bus delivers raw payloads per channel (background / hint / panic).
//! Payloads are either JSON (`{"cmd": "start", "file": "intro.mp3", ...}`)
//! or the legacy plain-text form (`"start intro.mp3"`). Both normalize into
//! the same closed [`Command`] variant here, with required-field validation
//! at this boundary so the tracks never see a half-formed request.

use anyhow::{Result, anyhow, bail};
use serde::Deserialize;

/// Logical channel a payload arrived on.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Channel {
    Background,
    Hint,
    Panic,
}

/// How a hint interacts with a hint already playing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum HintMode {
    #[default]
    Interrupt,
    Queue,
}

/// A validated command, ready for dispatch.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Background(BackgroundCommand),
    Hint(HintCommand),
    Panic,
}

#[derive(Clone, Debug, PartialEq)]
pub enum BackgroundCommand {
    Start {
        file: String,
        volume: Option<f32>,
        looping: bool,
    },
    Stop,
    Switch {
        file: String,
        fade_ms: Option<u64>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub enum HintCommand {
    Play {
        file: String,
        volume: Option<f32>,
        mode: HintMode,
    },
    Stop,
}

/// Wire payload accepted on the command topics.
#[derive(Debug, Default, Deserialize)]
struct RawPayload {
    cmd: Option<String>,
    file: Option<String>,
    volume: Option<f32>,
    fade_ms: Option<u64>,
    #[serde(rename = "loop")]
    looping: Option<bool>,
    mode: Option<String>,
}

/// Normalize one payload from `channel` into a [`Command`].
///
/// Panic payloads are accepted regardless of content. Everything else must
/// carry a known verb and its required fields, or the payload is rejected
/// (the bus logs and drops it; parse failures never reach the engine).
pub fn parse(channel: Channel, payload: &[u8]) -> Result<Command> {
    if channel == Channel::Panic {
        return Ok(Command::Panic);
    }

    let text = String::from_utf8_lossy(payload);
    let text = text.trim();
    let raw = if text.starts_with('{') {
        serde_json::from_str::<RawPayload>(text)
            .map_err(|e| anyhow!("invalid json payload: {e}"))?
    } else {
        parse_legacy(text)
    };

    let cmd = raw
        .cmd
        .as_deref()
        .map(str::to_lowercase)
        .unwrap_or_default();

    match channel {
        Channel::Background => match cmd.as_str() {
            "start" => Ok(Command::Background(BackgroundCommand::Start {
                file: require_file(&raw)?,
                volume: raw.volume,
                looping: raw.looping.unwrap_or(true),
            })),
            "stop" => Ok(Command::Background(BackgroundCommand::Stop)),
            "switch" | "play" => Ok(Command::Background(BackgroundCommand::Switch {
                file: require_file(&raw)?,
                fade_ms: raw.fade_ms,
            })),
            other => bail!("unknown background cmd: {other:?}"),
        },
        Channel::Hint => match cmd.as_str() {
            "play" => Ok(Command::Hint(HintCommand::Play {
                file: require_file(&raw)?,
                volume: raw.volume,
                mode: parse_mode(raw.mode.as_deref())?,
            })),
            "stop" => Ok(Command::Hint(HintCommand::Stop)),
            other => bail!("unknown hint cmd: {other:?}"),
        },
        Channel::Panic => unreachable!("handled above"),
    }
}

/// Legacy plain-text form: `"<cmd> <file>"`.
fn parse_legacy(text: &str) -> RawPayload {
    let mut parts = text.split_whitespace();
    RawPayload {
        cmd: parts.next().map(str::to_string),
        file: parts.next().map(str::to_string),
        ..Default::default()
    }
}

fn require_file(raw: &RawPayload) -> Result<String> {
    match raw.file.as_deref().map(str::trim) {
        Some(f) if !f.is_empty() => Ok(f.to_string()),
        _ => bail!("missing file"),
    }
}

fn parse_mode(mode: Option<&str>) -> Result<HintMode> {
    match mode.map(str::to_lowercase).as_deref() {
        None | Some("interrupt") => Ok(HintMode::Interrupt),
        Some("queue") => Ok(HintMode::Queue),
        Some(other) => bail!("unknown hint mode: {other:?}"),
    }
}
