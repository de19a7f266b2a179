use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use encodeq_core::config::AppConfig;
use encodeq_core::models::OutputModuleId;
use encodeq_core::modules::ErrorAction;

#[derive(Parser, Debug)]
#[command(name = "encodeq", version, about = "Batch audio encoder with dependency-aware scheduling")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// JSON configuration file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Print the final report as JSON instead of text.
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Encode audio files.
    Encode(EncodeArgs),
    /// Extract and encode tracks from an audio CD.
    Rip(RipArgs),
    /// List output modules.
    Modules,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnError {
    Continue,
    Skip,
    Stop,
}

impl From<OnError> for ErrorAction {
    fn from(value: OnError) -> Self {
        match value {
            OnError::Continue => ErrorAction::Continue,
            OnError::Skip => ErrorAction::SkipFile,
            OnError::Stop => ErrorAction::StopEncode,
        }
    }
}

#[derive(ClapArgs, Debug, Clone, Default)]
pub struct OutputArgs {
    #[arg(long, short = 'o')]
    pub output_dir: Option<PathBuf>,

    /// Output module key or file extension (mp3, ogg, flac, ...).
    #[arg(long, short = 'm')]
    pub module: Option<OutputModuleId>,

    #[arg(long, short = 'j')]
    pub workers: Option<usize>,

    /// Gapless LAME encoding; files are encoded one after another.
    #[arg(long)]
    pub nogap: bool,

    /// Write a playlist with this file name into the output directory.
    #[arg(long)]
    pub playlist: Option<String>,

    #[arg(long)]
    pub overwrite: bool,

    #[arg(long)]
    pub delete_after_encode: bool,

    #[arg(long, value_enum)]
    pub on_error: Option<OnError>,
}

impl OutputArgs {
    pub fn apply(&self, config: &mut AppConfig) {
        if let Some(output_dir) = &self.output_dir {
            config.output_dir = Some(output_dir.clone());
        }
        if let Some(module) = self.module {
            config.output_module = module;
        }
        if let Some(workers) = self.workers {
            config.workers = Some(workers);
        }
        if let Some(playlist) = &self.playlist {
            config.create_playlist = true;
            config.playlist_filename = playlist.clone();
        }
        if let Some(on_error) = self.on_error {
            config.on_error = on_error.into();
        }
        config.nogap |= self.nogap;
        config.overwrite_existing |= self.overwrite;
        config.delete_after_encode |= self.delete_after_encode;
    }
}

#[derive(ClapArgs, Debug, Clone)]
pub struct EncodeArgs {
    #[arg(required = true)]
    pub files: Vec<PathBuf>,

    #[command(flatten)]
    pub output: OutputArgs,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RipArgs {
    /// Track titles in disc order; one per track.
    #[arg(long = "track", required = true)]
    pub tracks: Vec<String>,

    /// One-based track numbers to leave out.
    #[arg(long)]
    pub skip: Vec<u32>,

    #[arg(long)]
    pub artist: Option<String>,

    #[arg(long)]
    pub album: Option<String>,

    #[arg(long)]
    pub year: Option<u32>,

    #[arg(long)]
    pub genre: Option<String>,

    #[arg(long)]
    pub various_artists: bool,

    #[arg(long)]
    pub device: Option<String>,

    #[command(flatten)]
    pub output: OutputArgs,
}
