use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::config::Config;
use crate::field::Preset;

#[derive(Parser, Debug)]
#[command(name = "nebula", about = "Audio-reactive particle nebula")]
pub struct Cli {
    /// Config file (default: ./nebula.toml, then the platform config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Render an audio file to a video
    Render(RenderArgs),
    /// Drive the field in real time from the microphone or a looped file
    Live(LiveArgs),
}

/// Flags shared by both commands. Anything left unset keeps the config value.
#[derive(Args, Debug, Clone, Default)]
pub struct FieldArgs {
    /// Visual preset
    #[arg(long, value_enum, default_value_t = Preset::Nebula)]
    pub preset: Preset,

    /// Number of aggregated frequency bins
    #[arg(long)]
    pub bins: Option<usize>,

    /// Particles per bin
    #[arg(long)]
    pub multiplier: Option<usize>,

    /// Trail/history depth
    #[arg(long)]
    pub history: Option<usize>,

    /// Input gain applied to bins and bands (floored at 0.1)
    #[arg(long)]
    pub sensitivity: Option<f32>,

    /// Frames per second
    #[arg(long)]
    pub fps: Option<u32>,
}

#[derive(Args, Debug)]
pub struct RenderArgs {
    /// Input audio file (WAV, MP3, FLAC, OGG)
    pub input: PathBuf,

    /// Output video file
    #[arg(short, long, default_value = "nebula.mp4")]
    pub output: PathBuf,

    #[command(flatten)]
    pub field: FieldArgs,

    /// Video width in pixels
    #[arg(long)]
    pub width: Option<u32>,

    /// Video height in pixels
    #[arg(long)]
    pub height: Option<u32>,

    /// TTF font for the centroid/flatness readout; no readout without it
    #[arg(long)]
    pub hud_font: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct LiveArgs {
    /// Play this file in a loop instead of listening to the microphone
    #[arg(long)]
    pub file: Option<PathBuf>,

    /// Stop after this many seconds (runs until interrupted otherwise)
    #[arg(long)]
    pub seconds: Option<f32>,

    /// Also encode the rendered frames to this video file
    #[arg(long)]
    pub record: Option<PathBuf>,

    #[command(flatten)]
    pub field: FieldArgs,

    /// Frame width in pixels
    #[arg(long)]
    pub width: Option<u32>,

    /// Frame height in pixels
    #[arg(long)]
    pub height: Option<u32>,
}

impl FieldArgs {
    pub fn apply(&self, config: &mut Config) {
        if let Some(bins) = self.bins {
            config.audio.bins = bins;
        }
        if let Some(multiplier) = self.multiplier {
            config.field.multiplier = multiplier;
        }
        if let Some(history) = self.history {
            config.field.history = history;
        }
        if let Some(sensitivity) = self.sensitivity {
            config.audio.sensitivity = sensitivity;
        }
        if let Some(fps) = self.fps {
            config.output.fps = fps;
        }
    }
}

fn apply_size(width: Option<u32>, height: Option<u32>, config: &mut Config) {
    if let Some(width) = width {
        config.output.width = width;
    }
    if let Some(height) = height {
        config.output.height = height;
    }
}

impl RenderArgs {
    pub fn apply(&self, config: &mut Config) {
        self.field.apply(config);
        apply_size(self.width, self.height, config);
    }
}

impl LiveArgs {
    pub fn apply(&self, config: &mut Config) {
        self.field.apply(config);
        apply_size(self.width, self.height, config);
    }
}
