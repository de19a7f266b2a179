use thiserror::Error;

use crate::models::TaskId;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum CoreErrorKind {
    InvalidInput,
    UnknownTask,
    InvalidTransition,
    Unsupported,
    Cancelled,
    Timeout,
    Io,
    Config,
    Internal,
}

#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error("{kind:?}: {message}")]
pub struct CoreError {
    pub task: Option<TaskId>,
    pub kind: CoreErrorKind,
    pub message: String,
}

impl CoreError {
    pub fn new(kind: CoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            task: None,
            kind,
            message: message.into(),
        }
    }

    pub fn for_task(task: TaskId, kind: CoreErrorKind, message: impl Into<String>) -> Self {
        Self {
            task: Some(task),
            kind,
            message: message.into(),
        }
    }
}

pub type CoreResult<T> = Result<T, CoreError>;
