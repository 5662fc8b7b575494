//! Startup readiness probe.
//!
//! Headless prop hosts race the controller against the broker and the audio
//! stack at boot. The `wait` subcommand blocks until both are usable so a
//! service unit can order itself after real readiness instead of sleeping.

use std::net::{TcpStream, ToSocketAddrs};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Result, bail};

use crate::config::Config;

const CHECK_INTERVAL: Duration = Duration::from_secs(1);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(1);

/// Poll until the MQTT broker accepts connections and an audio output
/// device exists, or `timeout` elapses.
pub fn wait_for_ready(cfg: &Config, timeout: Duration) -> Result<()> {
    let addr = format!("{}:{}", cfg.mqtt.host, cfg.mqtt.port);
    let deadline = Instant::now() + timeout;
    tracing::info!(broker = %addr, "waiting for system readiness");

    loop {
        let broker = broker_reachable(&addr);
        let audio = cue_player::device::any_output_device(&cpal::default_host());

        if broker && audio {
            tracing::info!("broker and audio output are ready");
            return Ok(());
        }
        if Instant::now() >= deadline {
            bail!("timed out waiting for readiness (broker={broker}, audio={audio})");
        }
        thread::sleep(CHECK_INTERVAL);
    }
}

fn broker_reachable(addr: &str) -> bool {
    let Ok(mut resolved) = addr.to_socket_addrs() else {
        return false;
    };
    resolved.any(|a| TcpStream::connect_timeout(&a, CONNECT_TIMEOUT).is_ok())
}
