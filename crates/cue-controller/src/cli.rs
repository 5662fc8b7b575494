use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "cue-controller", version)]
pub struct Args {
    /// Controller config file (TOML)
    #[arg(long, default_value = "/etc/cue-controller/config.toml")]
    pub config: PathBuf,

    /// List output devices and exit
    #[arg(long)]
    pub list_devices: bool,

    #[command(subcommand)]
    pub cmd: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the controller (default)
    Run,

    /// Block until the broker and audio output are ready
    Wait {
        /// Give up after this many seconds
        #[arg(long, default_value_t = 120)]
        timeout_secs: u64,
    },

    /// Play a single video file and wait for it to finish
    PlayVideo {
        /// Video filename, resolved under the configured video directory
        file: String,

        /// Loop until interrupted
        #[arg(long)]
        looping: bool,
    },
}
