//! Concrete units of work the scheduler runs.
//!
//! Every variant runs synchronously on a worker thread and reports through a
//! [`TaskContext`]; the scheduler only sees the shared contract on [`Task`].

pub mod encoder;
pub mod extract;
pub mod playlist;

use std::path::PathBuf;

use crate::models::{TaskDescriptor, TaskErrorInfo, TaskId};
use crate::task_context::TaskContext;

pub use encoder::{EncoderTask, EncoderTaskSettings};
pub use extract::{ExtractTask, ExtractTaskSettings};
pub use playlist::{PlaylistEntry, PlaylistTask};

/// How a task left the Running state.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum TaskOutcome {
    Completed,
    Failed {
        error: TaskErrorInfo,
        /// Set when the error policy asked for the whole run to stop.
        stop_all: bool,
    },
    Stopped,
}

impl TaskOutcome {
    pub(crate) fn failed(error: TaskErrorInfo) -> Self {
        Self::Failed {
            error,
            stop_all: false,
        }
    }
}

pub enum TaskKind {
    Encode(EncoderTask),
    Extract(ExtractTask),
    Playlist(PlaylistTask),
}

pub struct Task {
    depends_on: Vec<TaskId>,
    kind: TaskKind,
}

impl Task {
    pub fn new(kind: TaskKind) -> Self {
        Self {
            depends_on: Vec::new(),
            kind,
        }
    }

    /// Adds a prerequisite; the task will not start before `task_id`
    /// completes.
    pub fn depends_on(mut self, task_id: TaskId) -> Self {
        if !self.depends_on.contains(&task_id) {
            self.depends_on.push(task_id);
        }
        self
    }

    pub fn depends_on_all(self, task_ids: impl IntoIterator<Item = TaskId>) -> Self {
        task_ids
            .into_iter()
            .fold(self, |task, task_id| task.depends_on(task_id))
    }

    pub fn prerequisites(&self) -> &[TaskId] {
        &self.depends_on
    }

    pub fn kind(&self) -> &TaskKind {
        &self.kind
    }

    pub fn descriptor(&self) -> TaskDescriptor {
        match &self.kind {
            TaskKind::Encode(task) => task.descriptor(),
            TaskKind::Extract(task) => task.descriptor(),
            TaskKind::Playlist(task) => task.descriptor(),
        }
    }

    pub fn supports_pause(&self) -> bool {
        matches!(self.kind, TaskKind::Encode(_))
    }

    /// File the task reads from, used to attribute failures.
    pub fn source_path(&self) -> PathBuf {
        match &self.kind {
            TaskKind::Encode(task) => task.settings().input_path.clone(),
            TaskKind::Extract(task) => PathBuf::from(&task.settings().title),
            TaskKind::Playlist(task) => task.playlist_path().to_path_buf(),
        }
    }

    pub fn run(&self, context: &TaskContext) -> TaskOutcome {
        match &self.kind {
            TaskKind::Encode(task) => task.run(context),
            TaskKind::Extract(task) => task.run(context),
            TaskKind::Playlist(task) => task.run(context),
        }
    }
}

impl From<EncoderTask> for Task {
    fn from(task: EncoderTask) -> Self {
        Self::new(TaskKind::Encode(task))
    }
}

impl From<ExtractTask> for Task {
    fn from(task: ExtractTask) -> Self {
        Self::new(TaskKind::Extract(task))
    }
}

impl From<PlaylistTask> for Task {
    fn from(task: PlaylistTask) -> Self {
        Self::new(TaskKind::Playlist(task))
    }
}
