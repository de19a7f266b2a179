use std::path::PathBuf;
use std::sync::Arc;

use crate::models::{TaskDescriptor, TaskErrorInfo, TaskKindTag};
use crate::modules::{ExtractRequest, TrackExtractor};
use crate::task_context::TaskContext;
use crate::tasks::TaskOutcome;
use crate::tasks::encoder::remove_partial_output;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtractTaskSettings {
    pub title: String,
    /// One-based track number on the disc.
    pub track: u32,
    pub output_path: PathBuf,
    pub device: Option<String>,
}

/// Rips one CD track to a temporary file for a later encode task.
pub struct ExtractTask {
    settings: ExtractTaskSettings,
    extractor: Arc<dyn TrackExtractor>,
}

impl ExtractTask {
    pub fn new(settings: ExtractTaskSettings, extractor: Arc<dyn TrackExtractor>) -> Self {
        Self {
            settings,
            extractor,
        }
    }

    pub fn settings(&self) -> &ExtractTaskSettings {
        &self.settings
    }

    pub fn descriptor(&self) -> TaskDescriptor {
        TaskDescriptor {
            kind: TaskKindTag::Extracting,
            name: self.settings.title.clone(),
        }
    }

    pub fn run(&self, context: &TaskContext) -> TaskOutcome {
        if context.checkpoint().is_err() {
            return TaskOutcome::Stopped;
        }

        let request = ExtractRequest {
            device: self.settings.device.clone(),
            track_number: self.settings.track,
            output_path: self.settings.output_path.clone(),
        };
        tracing::debug!(
            task_id = context.task_id().0,
            track = request.track_number,
            output = %request.output_path.display(),
            "extracting CD track"
        );

        match self.extractor.extract(&request, context) {
            Ok(()) if context.is_cancelled() => {
                remove_partial_output(&self.settings.output_path);
                TaskOutcome::Stopped
            }
            Ok(()) => {
                context.report_progress(1.0);
                TaskOutcome::Completed
            }
            Err(_) if context.is_cancelled() => {
                remove_partial_output(&self.settings.output_path);
                TaskOutcome::Stopped
            }
            Err(error) => TaskOutcome::failed(TaskErrorInfo {
                input_file: PathBuf::from(&self.settings.title),
                module_name: self.extractor.module_name().to_string(),
                code: error.code,
                message: error.message,
            }),
        }
    }
}
