use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};

use crate::models::TaskErrorInfo;

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorAction {
    /// Treat the error as a warning and keep going.
    Continue,
    /// Fail this file only.
    #[default]
    SkipFile,
    /// Fail this file and stop every other task.
    StopEncode,
}

pub trait ErrorHandler: Send + Sync {
    fn handle_error(&self, error: &TaskErrorInfo) -> ErrorAction;
}

impl<F> ErrorHandler for F
where
    F: Fn(&TaskErrorInfo) -> ErrorAction + Send + Sync,
{
    fn handle_error(&self, error: &TaskErrorInfo) -> ErrorAction {
        self(error)
    }
}

/// Answers every error with one fixed action and keeps a log of what it saw.
#[derive(Debug, Default)]
pub struct RecordingErrorHandler {
    action: ErrorAction,
    errors: Mutex<Vec<TaskErrorInfo>>,
}

impl RecordingErrorHandler {
    pub fn new(action: ErrorAction) -> Self {
        Self {
            action,
            errors: Mutex::new(Vec::new()),
        }
    }

    pub fn always_skip() -> Self {
        Self::new(ErrorAction::SkipFile)
    }

    pub fn errors(&self) -> Vec<TaskErrorInfo> {
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl ErrorHandler for RecordingErrorHandler {
    fn handle_error(&self, error: &TaskErrorInfo) -> ErrorAction {
        tracing::warn!(
            input = %error.input_file.display(),
            module = %error.module_name,
            code = error.code,
            message = %error.message,
            action = ?self.action,
            "encoder reported an error"
        );
        self.errors
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(error.clone());
        self.action
    }
}
