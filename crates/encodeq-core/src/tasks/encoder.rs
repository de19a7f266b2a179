use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::models::{OutputModuleId, TaskDescriptor, TaskErrorInfo, TaskKindTag, TrackInfo};
use crate::modules::{AudioEncoder, EncodeRequest, ErrorAction, ErrorHandler, ModuleError};
use crate::task_context::TaskContext;
use crate::tasks::TaskOutcome;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncoderTaskSettings {
    pub title: String,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub track_info: TrackInfo,
    pub module: OutputModuleId,
    pub parameters: BTreeMap<String, String>,
    pub overwrite_existing: bool,
    pub delete_after_encode: bool,
    /// The input is a temporary file owned by this task. It is removed once
    /// the task is done with it, whatever the outcome, including when the
    /// task is stopped before it ever runs.
    pub remove_input_on_exit: bool,
}

impl EncoderTaskSettings {
    pub fn new(
        input_path: impl Into<PathBuf>,
        output_path: impl Into<PathBuf>,
        module: OutputModuleId,
    ) -> Self {
        let input_path = input_path.into();
        let title = input_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| input_path.display().to_string());
        Self {
            title,
            input_path,
            output_path: output_path.into(),
            track_info: TrackInfo::default(),
            module,
            parameters: BTreeMap::new(),
            overwrite_existing: false,
            delete_after_encode: false,
            remove_input_on_exit: false,
        }
    }
}

/// Encodes one input file with one output module.
pub struct EncoderTask {
    settings: EncoderTaskSettings,
    encoder: Arc<dyn AudioEncoder>,
    error_handler: Arc<dyn ErrorHandler>,
}

impl EncoderTask {
    pub fn new(
        settings: EncoderTaskSettings,
        encoder: Arc<dyn AudioEncoder>,
        error_handler: Arc<dyn ErrorHandler>,
    ) -> Self {
        Self {
            settings,
            encoder,
            error_handler,
        }
    }

    pub fn settings(&self) -> &EncoderTaskSettings {
        &self.settings
    }

    pub fn descriptor(&self) -> TaskDescriptor {
        TaskDescriptor {
            kind: TaskKindTag::Encoding,
            name: self.settings.title.clone(),
        }
    }

    pub fn run(&self, context: &TaskContext) -> TaskOutcome {
        if context.checkpoint().is_err() {
            return TaskOutcome::Stopped;
        }

        let settings = &self.settings;
        if !settings.overwrite_existing && settings.output_path.exists() {
            let error = ModuleError::new(
                ModuleError::OUTPUT_EXISTS,
                format!(
                    "output file {} already exists",
                    settings.output_path.display()
                ),
            );
            return self.resolve_error(context, error);
        }

        let request = EncodeRequest {
            input_path: settings.input_path.clone(),
            output_path: settings.output_path.clone(),
            track_info: settings.track_info.clone(),
            parameters: settings.parameters.clone(),
        };

        tracing::debug!(
            task_id = context.task_id().0,
            module = self.encoder.module_name(),
            input = %settings.input_path.display(),
            output = %settings.output_path.display(),
            "encoding file"
        );

        match self.encoder.encode(&request, context) {
            Ok(()) => {
                if settings.delete_after_encode {
                    remove_input(context, &settings.input_path);
                }
                context.report_progress(1.0);
                TaskOutcome::Completed
            }
            Err(_) if context.is_cancelled() => {
                remove_partial_output(&settings.output_path);
                TaskOutcome::Stopped
            }
            Err(error) => self.resolve_error(context, error),
        }
    }

    fn resolve_error(&self, context: &TaskContext, error: ModuleError) -> TaskOutcome {
        let info = TaskErrorInfo {
            input_file: self.settings.input_path.clone(),
            module_name: self.encoder.module_name().to_string(),
            code: error.code,
            message: error.message,
        };

        match self.error_handler.handle_error(&info) {
            ErrorAction::Continue => {
                tracing::warn!(
                    task_id = context.task_id().0,
                    input = %info.input_file.display(),
                    code = info.code,
                    "continuing after encoder error"
                );
                context.report_progress(1.0);
                TaskOutcome::Completed
            }
            ErrorAction::SkipFile => TaskOutcome::failed(info),
            ErrorAction::StopEncode => TaskOutcome::Failed {
                error: info,
                stop_all: true,
            },
        }
    }
}

impl Drop for EncoderTask {
    fn drop(&mut self) {
        let input_path = &self.settings.input_path;
        if !self.settings.remove_input_on_exit || !input_path.is_file() {
            return;
        }
        match std::fs::remove_file(input_path) {
            Ok(()) => tracing::debug!(input = %input_path.display(), "removed temporary input"),
            Err(error) => tracing::warn!(
                input = %input_path.display(),
                error = %error,
                "failed to remove temporary input"
            ),
        }
    }
}

fn remove_input(context: &TaskContext, input_path: &Path) {
    if let Err(error) = std::fs::remove_file(input_path) {
        tracing::warn!(
            task_id = context.task_id().0,
            input = %input_path.display(),
            error = %error,
            "failed to delete input file after encoding"
        );
    }
}

pub(crate) fn remove_partial_output(output_path: &Path) {
    if output_path.is_file() {
        let _ = std::fs::remove_file(output_path);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{EncoderTask, EncoderTaskSettings};
    use crate::models::{OutputModuleId, TaskErrorInfo, TaskId};
    use crate::modules::{
        AudioEncoder, EncodeRequest, ErrorAction, ModuleError, RecordingErrorHandler,
    };
    use crate::task_context::TaskContext;
    use crate::tasks::TaskOutcome;

    struct WritingEncoder;

    impl AudioEncoder for WritingEncoder {
        fn module_name(&self) -> &str {
            "writer"
        }

        fn encode(&self, request: &EncodeRequest, context: &TaskContext) -> Result<(), ModuleError> {
            context.report_progress(0.5);
            std::fs::write(&request.output_path, b"encoded")
                .map_err(|error| ModuleError::new(ModuleError::IO, error.to_string()))
        }
    }

    struct BrokenEncoder;

    impl AudioEncoder for BrokenEncoder {
        fn module_name(&self) -> &str {
            "broken"
        }

        fn encode(&self, _: &EncodeRequest, _: &TaskContext) -> Result<(), ModuleError> {
            Err(ModuleError::new(42, "unsupported sample rate"))
        }
    }

    fn settings(dir: &std::path::Path) -> EncoderTaskSettings {
        let input = dir.join("song.wav");
        std::fs::write(&input, b"RIFF").unwrap();
        EncoderTaskSettings::new(input, dir.join("song.mp3"), OutputModuleId::Lame)
    }

    #[test]
    fn successful_encode_completes_and_deletes_input_when_asked() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings(dir.path());
        settings.delete_after_encode = true;
        let input = settings.input_path.clone();
        let task = EncoderTask::new(
            settings,
            Arc::new(WritingEncoder),
            Arc::new(RecordingErrorHandler::always_skip()),
        );
        let context = TaskContext::standalone(TaskId(1));

        assert_eq!(task.run(&context), TaskOutcome::Completed);
        assert_eq!(context.progress(), 1.0);
        assert!(!input.exists());
        assert!(dir.path().join("song.mp3").exists());
    }

    #[test]
    fn existing_output_goes_through_error_policy() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path());
        std::fs::write(&settings.output_path, b"old").unwrap();
        let handler = Arc::new(RecordingErrorHandler::always_skip());
        let task = EncoderTask::new(settings, Arc::new(WritingEncoder), handler.clone());

        let outcome = task.run(&TaskContext::standalone(TaskId(2)));

        let TaskOutcome::Failed { error, stop_all } = outcome else {
            panic!("expected failure, got {outcome:?}");
        };
        assert_eq!(error.code, ModuleError::OUTPUT_EXISTS);
        assert!(!stop_all);
        assert_eq!(handler.errors().len(), 1);
        assert_eq!(
            std::fs::read(dir.path().join("song.mp3")).unwrap(),
            b"old".to_vec()
        );
    }

    #[test]
    fn continue_policy_completes_without_deleting_source() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = settings(dir.path());
        settings.delete_after_encode = true;
        let input = settings.input_path.clone();
        let task = EncoderTask::new(
            settings,
            Arc::new(BrokenEncoder),
            Arc::new(|_: &TaskErrorInfo| ErrorAction::Continue),
        );

        assert_eq!(
            task.run(&TaskContext::standalone(TaskId(3))),
            TaskOutcome::Completed
        );
        assert!(input.exists());
    }

    #[test]
    fn temporary_input_is_removed_whatever_the_outcome() {
        let dir = tempfile::tempdir().unwrap();
        let mut failing = settings(dir.path());
        failing.remove_input_on_exit = true;
        let input = failing.input_path.clone();
        let task = EncoderTask::new(
            failing,
            Arc::new(BrokenEncoder),
            Arc::new(RecordingErrorHandler::always_skip()),
        );
        let outcome = task.run(&TaskContext::standalone(TaskId(5)));
        assert!(matches!(outcome, TaskOutcome::Failed { .. }));
        assert!(input.exists());
        drop(task);
        assert!(!input.exists());

        let mut never_run = settings(dir.path());
        never_run.remove_input_on_exit = true;
        drop(EncoderTask::new(
            never_run,
            Arc::new(WritingEncoder),
            Arc::new(RecordingErrorHandler::always_skip()),
        ));
        assert!(!input.exists());

        let kept = settings(dir.path());
        drop(EncoderTask::new(
            kept,
            Arc::new(BrokenEncoder),
            Arc::new(RecordingErrorHandler::always_skip()),
        ));
        assert!(input.exists());
    }

    #[test]
    fn stop_encode_policy_requests_stop_all() {
        let dir = tempfile::tempdir().unwrap();
        let task = EncoderTask::new(
            settings(dir.path()),
            Arc::new(BrokenEncoder),
            Arc::new(|_: &TaskErrorInfo| ErrorAction::StopEncode),
        );

        let outcome = task.run(&TaskContext::standalone(TaskId(4)));
        let TaskOutcome::Failed { error, stop_all } = outcome else {
            panic!("expected failure, got {outcome:?}");
        };
        assert!(stop_all);
        assert_eq!(error.code, 42);
        assert_eq!(error.module_name, "broken");
    }

    #[test]
    fn cancelled_before_start_is_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let task = EncoderTask::new(
            settings(dir.path()),
            Arc::new(WritingEncoder),
            Arc::new(RecordingErrorHandler::always_skip()),
        );
        let context = TaskContext::standalone(TaskId(5));
        context.cancellation_token().cancel();

        assert_eq!(task.run(&context), TaskOutcome::Stopped);
        assert!(!dir.path().join("song.mp3").exists());
    }
}
