use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::execution::CommandSpec;
use crate::models::{CoreError, CoreErrorKind, CoreResult, OutputModuleId};
use crate::modules::{CommandEncoder, CommandExtractor, ErrorAction, ModuleRegistry};
use crate::orchestration::default_worker_count;
use crate::submission::{DEFAULT_PLAYLIST_FILENAME, JobSettings};
use crate::title::{DEFAULT_ALBUM_TRACK_FORMAT, DEFAULT_VARIOUS_TRACK_FORMAT};

pub const WORKERS_ENV: &str = "ENCODEQ_WORKERS";
pub const OUTPUT_DIR_ENV: &str = "ENCODEQ_OUTPUT_DIR";
pub const CD_DEVICE_ENV: &str = "ENCODEQ_CD_DEVICE";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub workers: Option<usize>,
    pub output_dir: Option<PathBuf>,
    pub temp_dir: Option<PathBuf>,
    pub output_module: OutputModuleId,
    pub overwrite_existing: bool,
    pub delete_after_encode: bool,
    pub nogap: bool,
    pub create_playlist: bool,
    pub playlist_filename: String,
    pub on_error: ErrorAction,
    pub cdrip_format_album_track: String,
    pub cdrip_format_various_track: String,
    pub cd_device: Option<String>,
    pub encoders: BTreeMap<OutputModuleId, CommandSpec>,
    pub extractor: CommandSpec,
    /// Extra `{key}` values handed to every encoder command.
    pub parameters: BTreeMap<String, String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workers: None,
            output_dir: None,
            temp_dir: None,
            output_module: OutputModuleId::Lame,
            overwrite_existing: false,
            delete_after_encode: false,
            nogap: false,
            create_playlist: false,
            playlist_filename: DEFAULT_PLAYLIST_FILENAME.to_string(),
            on_error: ErrorAction::SkipFile,
            cdrip_format_album_track: DEFAULT_ALBUM_TRACK_FORMAT.to_string(),
            cdrip_format_various_track: DEFAULT_VARIOUS_TRACK_FORMAT.to_string(),
            cd_device: None,
            encoders: default_encoders(),
            extractor: CommandSpec::new("cdparanoia").args(["-q", "{track}", "{output}"]),
            parameters: BTreeMap::new(),
        }
    }
}

impl AppConfig {
    pub fn load(path: &Path) -> CoreResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|error| {
            CoreError::new(
                CoreErrorKind::Io,
                format!("failed to read config {}: {error}", path.display()),
            )
        })?;
        Self::from_json(&raw)
            .map_err(|error| config_error(format!("{}: {}", path.display(), error.message)))
    }

    /// Configured encoders are merged over the built-in command templates.
    pub fn from_json(raw: &str) -> CoreResult<Self> {
        let mut config: Self = serde_json::from_str(raw)
            .map_err(|error| config_error(format!("invalid config: {error}")))?;
        for (module, spec) in default_encoders() {
            config.encoders.entry(module).or_insert(spec);
        }
        Ok(config)
    }

    pub fn apply_env(&mut self) -> CoreResult<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    pub fn apply_env_from(&mut self, lookup: impl Fn(&str) -> Option<String>) -> CoreResult<()> {
        if let Some(value) = non_empty(lookup(WORKERS_ENV)) {
            let workers = value.parse::<usize>().ok().filter(|workers| *workers > 0);
            let Some(workers) = workers else {
                return Err(config_error(format!(
                    "{WORKERS_ENV} must be a positive integer, got '{value}'"
                )));
            };
            self.workers = Some(workers);
        }
        if let Some(value) = non_empty(lookup(OUTPUT_DIR_ENV)) {
            self.output_dir = Some(PathBuf::from(value));
        }
        if let Some(value) = non_empty(lookup(CD_DEVICE_ENV)) {
            self.cd_device = Some(value);
        }
        Ok(())
    }

    pub fn worker_count(&self) -> usize {
        self.workers
            .filter(|workers| *workers > 0)
            .unwrap_or_else(default_worker_count)
    }

    pub fn job_settings(&self) -> JobSettings {
        JobSettings {
            output_dir: self.output_dir.clone(),
            temp_dir: self.temp_dir.clone().unwrap_or_else(std::env::temp_dir),
            output_module: self.output_module,
            overwrite_existing: self.overwrite_existing,
            delete_after_encode: self.delete_after_encode,
            nogap: self.nogap,
            create_playlist: self.create_playlist,
            playlist_filename: self.playlist_filename.clone(),
            cdrip_format_album_track: self.cdrip_format_album_track.clone(),
            cdrip_format_various_track: self.cdrip_format_various_track.clone(),
            cd_device: self.cd_device.clone(),
            parameters: self.parameters.clone(),
        }
    }

    pub fn module_registry(&self) -> CoreResult<ModuleRegistry> {
        let mut registry = ModuleRegistry::new();
        for (module, spec) in &self.encoders {
            spec.validate()?;
            registry.register(
                *module,
                Arc::new(CommandEncoder::new(module.key(), spec.clone())),
            )?;
        }
        Ok(registry)
    }

    pub fn track_extractor(&self) -> CoreResult<CommandExtractor> {
        self.extractor.validate()?;
        Ok(CommandExtractor::new("cdrip", self.extractor.clone()))
    }
}

fn default_encoders() -> BTreeMap<OutputModuleId, CommandSpec> {
    let ffmpeg = |codec: &str| {
        CommandSpec::new("ffmpeg").args([
            "-nostdin",
            "-loglevel",
            "error",
            "-y",
            "-i",
            "{input}",
            "-c:a",
            codec,
            "{output}",
        ])
    };

    BTreeMap::from([
        (
            OutputModuleId::Lame,
            CommandSpec::new("lame").args(["--quiet", "{input}", "{output}"]),
        ),
        (
            OutputModuleId::OggVorbis,
            CommandSpec::new("oggenc").args(["-Q", "-o", "{output}", "{input}"]),
        ),
        (OutputModuleId::Aac, ffmpeg("aac")),
        (
            OutputModuleId::Opus,
            CommandSpec::new("opusenc").args(["--quiet", "{input}", "{output}"]),
        ),
        (
            OutputModuleId::Flac,
            CommandSpec::new("flac").args(["-s", "-f", "-o", "{output}", "{input}"]),
        ),
        (OutputModuleId::Wave, ffmpeg("pcm_s16le")),
        (OutputModuleId::Wma, ffmpeg("wmav2")),
    ])
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|value| !value.trim().is_empty())
}

fn config_error(message: impl Into<String>) -> CoreError {
    CoreError::new(CoreErrorKind::Config, message)
}
