//! Cue controller: drives a two-track audio/video prop, a continuous
//! background loop and transient hint cues that duck it.
//!
//! ## Structure
//! 1. **Bus**: an MQTT thread normalizes payloads into commands and feeds a
//!    channel; it never touches playback state.
//! 2. **Engine**: the single owning tick loop applies commands, advances
//!    volume ramps, and polls hint/subprocess completion every ~20 ms.
//! 3. **Player**: the `cue-player` pipeline renders audio; video cues run in
//!    a supervised external player process.

mod assets;
mod background;
mod bus;
mod cli;
mod command;
mod config;
mod engine;
mod fade;
mod hint;
mod readiness;
mod video;
mod web;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use crossbeam_channel::RecvTimeoutError;
use tracing_subscriber::EnvFilter;

use crate::assets::{AssetKind, AssetResolver};
use crate::config::Config;
use crate::engine::Engine;

/// Tick period; bounds fade granularity and hint-restore latency.
const TICK: Duration = Duration::from_millis(20);

fn main() -> Result<()> {
    let args = cli::Args::parse();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,cue_controller=info")),
        )
        .init();

    if args.list_devices {
        let host = cpal::default_host();
        return cue_player::device::list_devices(&host);
    }

    let cfg = if args.config.exists() {
        Config::load(&args.config)?
    } else {
        tracing::warn!(path = ?args.config, "config file not found; using defaults");
        Config::defaults()
    };

    match args.cmd.unwrap_or(cli::Command::Run) {
        cli::Command::Run => run(cfg),
        cli::Command::Wait { timeout_secs } => {
            readiness::wait_for_ready(&cfg, Duration::from_secs(timeout_secs))
        }
        cli::Command::PlayVideo { file, looping } => play_video(&cfg, &file, looping),
    }
}

/// Main service loop: bus in, tick loop owning all playback state.
fn run(cfg: Config) -> Result<()> {
    let running = install_signal_flag();

    let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
    let client = bus::spawn(cfg.mqtt.clone(), cmd_tx);
    let _web = cfg
        .web
        .enabled
        .then(|| web::spawn_admin_server(cfg.web.bind));

    let mut engine = Engine::new(&cfg);
    tracing::info!(
        broker = %format!("{}:{}", cfg.mqtt.host, cfg.mqtt.port),
        audio_dir = %cfg.audio.base_path.display(),
        "controller ready"
    );

    while running.load(Ordering::Relaxed) {
        match cmd_rx.recv_timeout(TICK) {
            Ok(cmd) => {
                engine.handle(cmd);
                // Drain the rest of the burst before the tick.
                while let Ok(cmd) = cmd_rx.try_recv() {
                    engine.handle(cmd);
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
        engine.tick();
    }

    engine.shutdown();
    let _ = client.disconnect();
    Ok(())
}

/// One-shot video playback (the `play-video` subcommand).
fn play_video(cfg: &Config, file: &str, looping: bool) -> Result<()> {
    let resolver = AssetResolver::new(cfg.audio.base_path.clone(), &cfg.video);
    let asset = resolver.resolve(file)?;
    anyhow::ensure!(asset.kind == AssetKind::Video, "not a video file: {file}");

    let launcher = video::VideoLauncher::new(&cfg.video);
    let mut player = launcher.launch(&asset.path, looping)?;

    let running = install_signal_flag();
    while running.load(Ordering::Relaxed) && player.is_running() {
        std::thread::sleep(Duration::from_millis(100));
    }
    player.terminate();
    Ok(())
}

fn install_signal_flag() -> Arc<AtomicBool> {
    let running = Arc::new(AtomicBool::new(true));
    let flag = running.clone();
    let _ = ctrlc::set_handler(move || {
        flag.store(false, Ordering::Relaxed);
    });
    running
}
