use std::fmt::{Display, Formatter};
use std::path::PathBuf;

use serde::Serialize;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize)]
pub struct TaskId(pub u64);

impl Display for TaskId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
#[repr(u8)]
pub enum TaskState {
    Waiting = 0,
    Ready = 1,
    Running = 2,
    Paused = 3,
    Completed = 4,
    Failed = 5,
    Stopped = 6,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Stopped)
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Waiting,
            1 => Self::Ready,
            2 => Self::Running,
            3 => Self::Paused,
            4 => Self::Completed,
            5 => Self::Failed,
            _ => Self::Stopped,
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize)]
pub enum TaskKindTag {
    Encoding,
    Extracting,
    WritingPlaylist,
}

impl TaskKindTag {
    pub fn label(self) -> &'static str {
        match self {
            Self::Encoding => "Encoding",
            Self::Extracting => "Extracting",
            Self::WritingPlaylist => "Writing Playlist",
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct TaskDescriptor {
    pub kind: TaskKindTag,
    pub name: String,
}

/// Point-in-time view of one task, safe to take while the task runs.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TaskInfo {
    pub id: TaskId,
    pub descriptor: TaskDescriptor,
    pub state: TaskState,
    pub progress: f32,
    pub depends_on: Vec<TaskId>,
}

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct TaskErrorInfo {
    pub input_file: PathBuf,
    pub module_name: String,
    pub code: i32,
    pub message: String,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct AggregateProgress {
    pub total: usize,
    pub waiting: usize,
    pub ready: usize,
    pub running: usize,
    pub paused: usize,
    pub completed: usize,
    pub failed: usize,
    pub stopped: usize,
    pub fraction: f32,
}

impl AggregateProgress {
    pub fn count(&self, state: TaskState) -> usize {
        match state {
            TaskState::Waiting => self.waiting,
            TaskState::Ready => self.ready,
            TaskState::Running => self.running,
            TaskState::Paused => self.paused,
            TaskState::Completed => self.completed,
            TaskState::Failed => self.failed,
            TaskState::Stopped => self.stopped,
        }
    }

    pub fn terminal(&self) -> usize {
        self.completed + self.failed + self.stopped
    }

    /// True once every registered task reached a terminal state.
    pub fn is_finished(&self) -> bool {
        self.terminal() == self.total
    }

    pub(crate) fn record(&mut self, state: TaskState, progress: f32) {
        self.total += 1;
        match state {
            TaskState::Waiting => self.waiting += 1,
            TaskState::Ready => self.ready += 1,
            TaskState::Running => self.running += 1,
            TaskState::Paused => self.paused += 1,
            TaskState::Completed => self.completed += 1,
            TaskState::Failed => self.failed += 1,
            TaskState::Stopped => self.stopped += 1,
        }
        self.fraction += progress;
    }

    pub(crate) fn finalize(mut self) -> Self {
        self.fraction = if self.total == 0 {
            0.0
        } else {
            self.fraction / self.total as f32
        };
        self
    }
}
