use clap::{Args, Subcommand};
use std::path::PathBuf;

use crate::exit::CliResult;
use crate::output::OutputFormat;

pub mod listen;
pub mod stream;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Bind a socket and print each frame a producer sends.
    Listen(ListenArgs),
    /// Stream an image file as frames through a capture session.
    Stream(StreamArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Listen(args) => listen::run(args, format),
        Command::Stream(args) => stream::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    /// Socket path to bind.
    #[arg(env = "FRAMECAST_SOCKET")]
    pub path: PathBuf,
    /// Exit after receiving N frames.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct StreamArgs {
    /// Socket path of the consumer.
    #[arg(env = "FRAMECAST_SOCKET")]
    pub path: PathBuf,
    /// Encoded image to send as every frame.
    #[arg(long)]
    pub file: PathBuf,
    #[arg(long, default_value_t = 1920)]
    pub width: u32,
    #[arg(long, default_value_t = 1080)]
    pub height: u32,
    /// Image orientation code (1-8, 0 = unknown).
    #[arg(long, default_value_t = 1)]
    pub orientation: u32,
    /// Captured frames per second.
    #[arg(long, default_value_t = 30)]
    pub fps: u32,
    /// Number of captured frames to generate.
    #[arg(long, default_value_t = 90)]
    pub frames: u64,
    /// Offer every Nth captured frame for upload.
    #[arg(long, default_value_t = 3)]
    pub stride: u64,
    /// Give up if the consumer is not listening within this time (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub connect_timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}
