use std::cell::Cell;
use std::sync::Arc;
use std::time::Duration;

use crate::models::{
    CoreError, CoreErrorKind, CoreResult, TaskDescriptor, TaskId, TaskKindTag, TaskState,
};
use crate::orchestration::TaskCancellationToken;
use crate::orchestration::control::TaskControl;

/// Interval at which blocking task code is expected to poll its context.
pub const CHECKPOINT_INTERVAL: Duration = Duration::from_millis(50);

thread_local! {
    static CURRENT_TASK_ID: Cell<Option<u64>> = const { Cell::new(None) };
}

/// Id of the task executing on this worker thread, if any.
pub fn current_task_id() -> Option<TaskId> {
    CURRENT_TASK_ID.with(|slot| slot.get().map(TaskId))
}

pub(crate) fn with_task_id<R>(task_id: TaskId, operation: impl FnOnce() -> R) -> R {
    CURRENT_TASK_ID.with(|slot| {
        let previous = slot.replace(Some(task_id.0));
        let result = operation();
        slot.set(previous);
        result
    })
}

/// Handle a running task uses to report progress and observe stop/pause
/// requests.
#[derive(Clone, Debug)]
pub struct TaskContext {
    control: Arc<TaskControl>,
}

impl TaskContext {
    pub(crate) fn new(control: Arc<TaskControl>) -> Self {
        Self { control }
    }

    /// Context that is not registered with any manager, for driving
    /// collaborators directly.
    pub fn standalone(task_id: TaskId) -> Self {
        Self::new(Arc::new(TaskControl::new(
            task_id,
            TaskDescriptor {
                kind: TaskKindTag::Encoding,
                name: String::new(),
            },
            Vec::new(),
            true,
            TaskState::Running,
        )))
    }

    pub fn task_id(&self) -> TaskId {
        self.control.id
    }

    pub fn is_cancelled(&self) -> bool {
        self.control.cancellation().is_cancelled()
    }

    /// Non-blocking view of the pause flag, for code that must react to a
    /// pause itself instead of blocking in [`TaskContext::checkpoint`].
    pub fn is_paused(&self) -> bool {
        self.control.is_paused()
    }

    #[cfg(test)]
    pub(crate) fn set_paused(&self, paused: bool) {
        self.control.set_paused(paused);
    }

    pub fn cancellation_token(&self) -> TaskCancellationToken {
        self.control.cancellation().clone()
    }

    pub fn progress(&self) -> f32 {
        self.control.progress()
    }

    pub fn report_progress(&self, fraction: f32) {
        self.control.advance_progress(fraction);
    }

    /// Returns `Cancelled` once stop was requested; blocks while the task is
    /// paused.
    pub fn checkpoint(&self) -> CoreResult<()> {
        loop {
            if self.is_cancelled() {
                return Err(CoreError::for_task(
                    self.task_id(),
                    CoreErrorKind::Cancelled,
                    "task stop requested",
                ));
            }
            if !self.control.is_paused() {
                return Ok(());
            }
            std::thread::sleep(CHECKPOINT_INTERVAL);
        }
    }
}
