//! Turns a user's selection (input files or CD tracks) into a task graph.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::models::{
    CdDiscInfo, CdTrackInfo, CoreError, CoreErrorKind, CoreResult, OutputModuleId, TaskId,
    TrackInfo,
};
use crate::modules::{ErrorHandler, ModuleRegistry, RecordingErrorHandler, TrackExtractor};
use crate::orchestration::TaskManager;
use crate::tasks::{
    EncoderTask, EncoderTaskSettings, ExtractTask, ExtractTaskSettings, PlaylistEntry,
    PlaylistTask, Task,
};
use crate::title::{DEFAULT_ALBUM_TRACK_FORMAT, DEFAULT_VARIOUS_TRACK_FORMAT, format_title};

pub const DEFAULT_PLAYLIST_FILENAME: &str = "playlist.m3u";
const VARIOUS_ARTISTS: &str = "Various Artists";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncoderJob {
    pub input_path: PathBuf,
    pub track_info: TrackInfo,
    /// Filled in once the job was submitted.
    pub output_path: Option<PathBuf>,
}

impl EncoderJob {
    pub fn new(input_path: impl Into<PathBuf>) -> Self {
        Self {
            input_path: input_path.into(),
            track_info: TrackInfo::default(),
            output_path: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CdReadJob {
    pub disc: CdDiscInfo,
    pub track: CdTrackInfo,
    /// Temporary file the extract task writes, filled in on submission.
    pub output_path: Option<PathBuf>,
}

impl CdReadJob {
    pub fn new(disc: CdDiscInfo, track: CdTrackInfo) -> Self {
        Self {
            disc,
            track,
            output_path: None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SubmittedBatch {
    pub task_ids: Vec<TaskId>,
    pub last_task_id: Option<TaskId>,
    pub playlist_task_id: Option<TaskId>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct JobSettings {
    /// Output directory; `None` writes next to each input file.
    pub output_dir: Option<PathBuf>,
    pub temp_dir: PathBuf,
    pub output_module: OutputModuleId,
    pub overwrite_existing: bool,
    pub delete_after_encode: bool,
    pub nogap: bool,
    pub create_playlist: bool,
    pub playlist_filename: String,
    pub cdrip_format_album_track: String,
    pub cdrip_format_various_track: String,
    pub cd_device: Option<String>,
    pub parameters: BTreeMap<String, String>,
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            output_dir: None,
            temp_dir: std::env::temp_dir(),
            output_module: OutputModuleId::Lame,
            overwrite_existing: false,
            delete_after_encode: false,
            nogap: false,
            create_playlist: false,
            playlist_filename: DEFAULT_PLAYLIST_FILENAME.to_string(),
            cdrip_format_album_track: DEFAULT_ALBUM_TRACK_FORMAT.to_string(),
            cdrip_format_various_track: DEFAULT_VARIOUS_TRACK_FORMAT.to_string(),
            cd_device: None,
            parameters: BTreeMap::new(),
        }
    }
}

impl JobSettings {
    fn uses_nogap_chain(&self) -> bool {
        self.nogap && self.output_module == OutputModuleId::Lame
    }

    fn cd_title_format(&self, disc: &CdDiscInfo) -> &str {
        if disc.various_artists {
            &self.cdrip_format_various_track
        } else {
            &self.cdrip_format_album_track
        }
    }
}

pub struct JobSubmitter<'a> {
    manager: &'a TaskManager,
    modules: &'a ModuleRegistry,
    settings: &'a JobSettings,
    error_handler: Arc<dyn ErrorHandler>,
}

impl<'a> JobSubmitter<'a> {
    pub fn new(manager: &'a TaskManager, modules: &'a ModuleRegistry, settings: &'a JobSettings) -> Self {
        Self {
            manager,
            modules,
            settings,
            error_handler: Arc::new(RecordingErrorHandler::always_skip()),
        }
    }

    pub fn with_error_handler(mut self, error_handler: Arc<dyn ErrorHandler>) -> Self {
        self.error_handler = error_handler;
        self
    }

    /// One encode task per file; with no-gap LAME encoding each task waits
    /// for the previous one.
    pub fn submit_input_files(&self, jobs: &mut [EncoderJob]) -> CoreResult<SubmittedBatch> {
        let module = self.settings.output_module;
        let encoder = self.modules.resolve(module)?;
        let chain = self.settings.uses_nogap_chain();

        let mut batch = SubmittedBatch::default();
        let mut entries = Vec::with_capacity(jobs.len());
        for job in jobs.iter_mut() {
            let output_path =
                output_path_for(&job.input_path, self.settings.output_dir.as_deref(), module);
            let mut settings =
                EncoderTaskSettings::new(job.input_path.clone(), output_path.clone(), module);
            settings.track_info = job.track_info.clone();
            settings.parameters = self.settings.parameters.clone();
            settings.overwrite_existing = self.settings.overwrite_existing;
            settings.delete_after_encode = self.settings.delete_after_encode;

            entries.push(PlaylistEntry {
                title: job
                    .track_info
                    .title
                    .clone()
                    .unwrap_or_else(|| file_stem(&job.input_path)),
                path: output_path.clone(),
            });

            let mut task = Task::from(EncoderTask::new(
                settings,
                encoder.clone(),
                self.error_handler.clone(),
            ));
            if chain && let Some(previous) = batch.last_task_id {
                task = task.depends_on(previous);
            }
            let task_id = self.manager.add_task(task)?;
            job.output_path = Some(output_path);
            batch.task_ids.push(task_id);
            batch.last_task_id = Some(task_id);
        }

        self.finish_batch(&mut batch, entries)?;
        tracing::info!(
            tasks = batch.task_ids.len(),
            module = module.key(),
            nogap = chain,
            "submitted input files"
        );
        Ok(batch)
    }

    /// Extract and encode task per active track. Extraction is serialized
    /// through the drive; each encode waits for its own extraction.
    pub fn submit_cd_tracks(
        &self,
        extractor: Arc<dyn TrackExtractor>,
        jobs: &mut [CdReadJob],
    ) -> CoreResult<SubmittedBatch> {
        let module = self.settings.output_module;
        let encoder = self.modules.resolve(module)?;
        let output_dir = self
            .settings
            .output_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."));

        let mut batch = SubmittedBatch::default();
        let mut entries = Vec::new();
        let mut last_extract: Option<TaskId> = None;
        for job in jobs.iter_mut().filter(|job| job.track.active) {
            let title = format_title(self.settings.cd_title_format(&job.disc), &job.disc, &job.track);
            let temp_path = self.settings.temp_dir.join(format!(
                "encodeq-track{:02}-{title}.wav",
                job.track.track_number()
            ));

            let mut extract = Task::from(ExtractTask::new(
                ExtractTaskSettings {
                    title: title.clone(),
                    track: job.track.track_number(),
                    output_path: temp_path.clone(),
                    device: self.settings.cd_device.clone(),
                },
                extractor.clone(),
            ));
            if let Some(previous) = last_extract {
                extract = extract.depends_on(previous);
            }
            let extract_id = self.manager.add_task(extract)?;
            job.output_path = Some(temp_path.clone());
            last_extract = Some(extract_id);

            let output_path = output_dir.join(format!("{title}.{}", module.extension()));
            let mut settings = EncoderTaskSettings::new(temp_path, output_path.clone(), module);
            settings.title = title.clone();
            settings.track_info = track_info_from_cd(&job.disc, &job.track);
            settings.parameters = self.settings.parameters.clone();
            settings.overwrite_existing = self.settings.overwrite_existing;
            settings.remove_input_on_exit = true;

            let encode = Task::from(EncoderTask::new(
                settings,
                encoder.clone(),
                self.error_handler.clone(),
            ))
            .depends_on(extract_id);
            let encode_id = self.manager.add_task(encode)?;

            entries.push(PlaylistEntry {
                title,
                path: output_path,
            });
            batch.task_ids.extend([extract_id, encode_id]);
            batch.last_task_id = Some(encode_id);
        }

        self.finish_batch(&mut batch, entries)?;
        tracing::info!(
            tasks = batch.task_ids.len(),
            module = module.key(),
            "submitted CD tracks"
        );
        Ok(batch)
    }

    fn finish_batch(
        &self,
        batch: &mut SubmittedBatch,
        entries: Vec<PlaylistEntry>,
    ) -> CoreResult<()> {
        if !self.settings.create_playlist || batch.task_ids.is_empty() {
            return Ok(());
        }
        if self.settings.playlist_filename.trim().is_empty() {
            return Err(CoreError::new(
                CoreErrorKind::InvalidInput,
                "playlist filename must not be empty",
            ));
        }

        let playlist_dir = self
            .settings
            .output_dir
            .clone()
            .or_else(|| {
                entries
                    .first()
                    .and_then(|entry| entry.path.parent())
                    .map(Path::to_path_buf)
            })
            .unwrap_or_else(|| PathBuf::from("."));
        let playlist_path = playlist_dir.join(&self.settings.playlist_filename);

        let task = Task::from(PlaylistTask::new(playlist_path, entries))
            .depends_on_all(batch.task_ids.iter().copied());
        let task_id = self.manager.add_task(task)?;
        batch.playlist_task_id = Some(task_id);
        batch.last_task_id = Some(task_id);
        Ok(())
    }
}

/// `<dir>/<input stem>.<module extension>`, where `dir` defaults to the
/// input's own directory.
pub fn output_path_for(input: &Path, output_dir: Option<&Path>, module: OutputModuleId) -> PathBuf {
    let dir = output_dir
        .map(Path::to_path_buf)
        .or_else(|| input.parent().map(Path::to_path_buf))
        .unwrap_or_default();
    dir.join(format!("{}.{}", file_stem(input), module.extension()))
}

/// Inputs that would be replaced by their own encoded output.
pub fn is_overwriting_original_files(jobs: &[EncoderJob], settings: &JobSettings) -> Vec<PathBuf> {
    jobs.iter()
        .filter(|job| {
            output_path_for(
                &job.input_path,
                settings.output_dir.as_deref(),
                settings.output_module,
            ) == job.input_path
        })
        .map(|job| job.input_path.clone())
        .collect()
}

pub fn track_info_from_cd(disc: &CdDiscInfo, track: &CdTrackInfo) -> TrackInfo {
    let artist = if disc.various_artists {
        VARIOUS_ARTISTS.to_string()
    } else {
        disc.disc_artist.clone()
    };
    TrackInfo {
        title: Some(track.title.clone()),
        artist: Some(artist),
        album: Some(disc.disc_title.clone()),
        year: (disc.year != 0).then_some(disc.year),
        track: Some(track.track_number()),
        genre: (!disc.genre.is_empty()).then(|| disc.genre.clone()),
    }
}

fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_default()
}
