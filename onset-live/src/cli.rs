use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "onset-live", about = "Turns notes played into the default microphone into MIDI notes")]
pub struct Cli {
    /// JSON configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Requested sample rate in Hz (the device may pick a different one)
    #[arg(long)]
    pub sample_rate: Option<u32>,

    /// Samples per analysis frame
    #[arg(short, long)]
    pub window_size: Option<usize>,

    /// Velocity of emitted notes (0-127)
    #[arg(long)]
    pub velocity: Option<u8>,

    /// Print detected notes without playing them
    #[arg(long)]
    pub mute: bool,

    /// Write the effective configuration to this file and exit
    #[arg(long)]
    pub write_config: Option<PathBuf>,
}
