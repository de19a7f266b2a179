use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use crate::models::{TaskDescriptor, TaskErrorInfo, TaskKindTag};
use crate::modules::ModuleError;
use crate::task_context::TaskContext;
use crate::tasks::TaskOutcome;

const MODULE_NAME: &str = "playlist";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlaylistEntry {
    pub title: String,
    pub path: PathBuf,
}

/// Writes an extended M3U playlist of the files produced by a batch.
pub struct PlaylistTask {
    playlist_path: PathBuf,
    entries: Vec<PlaylistEntry>,
}

impl PlaylistTask {
    pub fn new(playlist_path: PathBuf, entries: Vec<PlaylistEntry>) -> Self {
        Self {
            playlist_path,
            entries,
        }
    }

    pub fn playlist_path(&self) -> &Path {
        &self.playlist_path
    }

    pub fn entries(&self) -> &[PlaylistEntry] {
        &self.entries
    }

    pub fn descriptor(&self) -> TaskDescriptor {
        let name = self
            .playlist_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.playlist_path.display().to_string());
        TaskDescriptor {
            kind: TaskKindTag::WritingPlaylist,
            name,
        }
    }

    pub fn run(&self, context: &TaskContext) -> TaskOutcome {
        let base_dir = self.playlist_path.parent().unwrap_or_else(|| Path::new(""));
        let total = self.entries.len().max(1) as f32;

        let mut contents = String::from("#EXTM3U\n");
        for (index, entry) in self.entries.iter().enumerate() {
            if context.checkpoint().is_err() {
                return TaskOutcome::Stopped;
            }
            let path = entry.path.strip_prefix(base_dir).unwrap_or(&entry.path);
            let _ = writeln!(contents, "#EXTINF:-1,{}", entry.title);
            let _ = writeln!(contents, "{}", path.display());
            context.report_progress((index + 1) as f32 / total);
        }

        if context.checkpoint().is_err() {
            return TaskOutcome::Stopped;
        }

        match write_playlist(&self.playlist_path, &contents) {
            Ok(()) => {
                tracing::info!(
                    task_id = context.task_id().0,
                    playlist = %self.playlist_path.display(),
                    entries = self.entries.len(),
                    "wrote playlist"
                );
                context.report_progress(1.0);
                TaskOutcome::Completed
            }
            Err(error) => TaskOutcome::failed(TaskErrorInfo {
                input_file: self.playlist_path.clone(),
                module_name: MODULE_NAME.to_string(),
                code: error.raw_os_error().unwrap_or(ModuleError::IO),
                message: format!("failed to write playlist: {error}"),
            }),
        }
    }
}

fn write_playlist(path: &Path, contents: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, contents)
}
