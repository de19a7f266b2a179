use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;

use crate::models::{
    AggregateProgress, CoreError, CoreErrorKind, TaskErrorInfo, TaskId, TaskInfo,
};
use crate::modules::ModuleError;
use crate::orchestration::OrchestrationResult;
use crate::orchestration::control::TaskControl;
use crate::orchestration::scheduler::{Dispatch, SchedulerState};
use crate::task_context::{TaskContext, with_task_id};
use crate::tasks::{Task, TaskOutcome};

/// Number of workers used when none is configured.
pub fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|count| count.get())
        .unwrap_or(1)
        .max(1)
}

/// Dependency-aware scheduler running tasks on tokio's blocking pool.
///
/// Cloning the manager clones a handle to the same scheduler.
#[derive(Clone)]
pub struct TaskManager {
    inner: Arc<ManagerInner>,
}

struct ManagerInner {
    runtime: Handle,
    state: Mutex<SchedulerState>,
    snapshots: RwLock<Vec<Arc<TaskControl>>>,
    events: watch::Sender<u64>,
}

impl TaskManager {
    /// Creates a manager bound to the current tokio runtime.
    pub fn new(workers: usize) -> OrchestrationResult<Self> {
        let runtime = Handle::try_current().map_err(|error| {
            CoreError::new(
                CoreErrorKind::Internal,
                format!("task manager requires a tokio runtime: {error}"),
            )
        })?;
        Self::with_runtime(workers, runtime)
    }

    pub fn with_runtime(workers: usize, runtime: Handle) -> OrchestrationResult<Self> {
        if workers == 0 {
            return Err(CoreError::new(
                CoreErrorKind::InvalidInput,
                "worker count must be at least 1",
            ));
        }
        let (events, _) = watch::channel(0);
        Ok(Self {
            inner: Arc::new(ManagerInner {
                runtime,
                state: Mutex::new(SchedulerState::new(workers)),
                snapshots: RwLock::new(Vec::new()),
                events,
            }),
        })
    }

    pub fn workers(&self) -> OrchestrationResult<usize> {
        Ok(self.inner.lock_state()?.workers())
    }

    pub fn is_stop_requested(&self) -> OrchestrationResult<bool> {
        Ok(self.inner.lock_state()?.is_stop_requested())
    }

    pub fn add_task(&self, task: Task) -> OrchestrationResult<TaskId> {
        let (task_id, dispatched, discarded) = {
            let mut state = self.inner.lock_state()?;
            let control = state.register(task);
            self.inner
                .snapshots
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .push(control.clone());
            (control.id, state.take_dispatchable(), state.take_discarded())
        };

        self.inner.launch(dispatched);
        drop(discarded);
        self.inner.notify();
        Ok(task_id)
    }

    pub fn stop_all(&self) -> OrchestrationResult<()> {
        let discarded = {
            let mut state = self.inner.lock_state()?;
            if !state.is_stop_requested() {
                tracing::info!("stopping all tasks");
            }
            state.stop_all();
            state.take_discarded()
        };
        drop(discarded);
        self.inner.notify();
        Ok(())
    }

    pub fn stop_task(&self, task_id: TaskId) -> OrchestrationResult<()> {
        self.update(|state| state.stop_task(task_id))
    }

    pub fn pause_task(&self, task_id: TaskId) -> OrchestrationResult<()> {
        self.update(|state| state.pause_task(task_id))
    }

    pub fn resume_task(&self, task_id: TaskId) -> OrchestrationResult<()> {
        self.update(|state| state.resume_task(task_id))
    }

    pub fn len(&self) -> usize {
        self.inner.read_snapshots().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn task_info(&self, task_id: TaskId) -> OrchestrationResult<TaskInfo> {
        self.inner.control(task_id).map(|control| control.info())
    }

    /// Snapshots of every task in submission order.
    pub fn task_infos(&self) -> Vec<TaskInfo> {
        self.inner
            .read_snapshots()
            .iter()
            .map(|control| control.info())
            .collect()
    }

    pub fn task_error(&self, task_id: TaskId) -> OrchestrationResult<Option<TaskErrorInfo>> {
        self.inner.control(task_id).map(|control| control.error())
    }

    pub fn aggregate_progress(&self) -> AggregateProgress {
        let mut progress = AggregateProgress::default();
        for control in self.inner.read_snapshots().iter() {
            progress.record(control.state(), control.progress());
        }
        progress.finalize()
    }

    pub async fn wait_for_terminal(
        &self,
        task_id: TaskId,
        timeout: Duration,
    ) -> OrchestrationResult<TaskInfo> {
        let control = self.inner.control(task_id)?;
        self.wait_until(timeout, || control.state().is_terminal())
            .await
            .map_err(|error| CoreError {
                task: Some(task_id),
                ..error
            })?;
        Ok(control.info())
    }

    /// Waits until every registered task reached a terminal state.
    pub async fn wait_idle(&self, timeout: Duration) -> OrchestrationResult<AggregateProgress> {
        self.wait_until(timeout, || self.aggregate_progress().is_finished())
            .await?;
        Ok(self.aggregate_progress())
    }

    async fn wait_until(
        &self,
        timeout: Duration,
        mut condition: impl FnMut() -> bool,
    ) -> OrchestrationResult<()> {
        let mut events = self.inner.events.subscribe();
        let wait = async {
            while !condition() {
                if events.changed().await.is_err() {
                    return Err(CoreError::new(
                        CoreErrorKind::Internal,
                        "task manager event channel closed",
                    ));
                }
            }
            Ok(())
        };

        tokio::time::timeout(timeout, wait).await.map_err(|_| {
            CoreError::new(
                CoreErrorKind::Timeout,
                format!("tasks did not finish within {timeout:?}"),
            )
        })?
    }

    fn update(
        &self,
        operation: impl FnOnce(&mut SchedulerState) -> OrchestrationResult<()>,
    ) -> OrchestrationResult<()> {
        let (dispatched, discarded) = {
            let mut state = self.inner.lock_state()?;
            operation(&mut state)?;
            (state.take_dispatchable(), state.take_discarded())
        };
        self.inner.launch(dispatched);
        drop(discarded);
        self.inner.notify();
        Ok(())
    }
}

impl ManagerInner {
    fn lock_state(&self) -> OrchestrationResult<MutexGuard<'_, SchedulerState>> {
        self.state.lock().map_err(|_| {
            CoreError::new(CoreErrorKind::Internal, "task scheduler lock poisoned")
        })
    }

    fn read_snapshots(&self) -> std::sync::RwLockReadGuard<'_, Vec<Arc<TaskControl>>> {
        self.snapshots.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn control(&self, task_id: TaskId) -> OrchestrationResult<Arc<TaskControl>> {
        let index = task_id.0.checked_sub(1).map(|index| index as usize);
        index
            .and_then(|index| self.read_snapshots().get(index).cloned())
            .ok_or_else(|| {
                CoreError::for_task(
                    task_id,
                    CoreErrorKind::UnknownTask,
                    format!("task {task_id} is not registered"),
                )
            })
    }

    fn notify(&self) {
        self.events
            .send_modify(|generation| *generation = generation.wrapping_add(1));
    }

    fn launch(self: &Arc<Self>, dispatched: Vec<Dispatch>) {
        for dispatch in dispatched {
            let task_id = dispatch.control.id;
            tracing::info!(
                task_id = task_id.0,
                kind = dispatch.control.descriptor.kind.label(),
                name = %dispatch.control.descriptor.name,
                "starting task"
            );

            let inner = self.clone();
            self.runtime.spawn_blocking(move || {
                let outcome = execute(dispatch);
                inner.on_task_terminal(task_id, outcome);
            });
        }
    }

    fn on_task_terminal(self: &Arc<Self>, task_id: TaskId, outcome: TaskOutcome) {
        match &outcome {
            TaskOutcome::Completed => {
                tracing::info!(task_id = task_id.0, "task completed");
            }
            TaskOutcome::Failed { error, stop_all } => tracing::warn!(
                task_id = task_id.0,
                input = %error.input_file.display(),
                module = %error.module_name,
                code = error.code,
                message = %error.message,
                stop_all,
                "task failed"
            ),
            TaskOutcome::Stopped => {
                tracing::info!(task_id = task_id.0, "task stopped");
            }
        }

        let (dispatched, discarded) = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if state.finish(task_id, outcome) {
                tracing::warn!(task_id = task_id.0, "error policy stopped all tasks");
            }
            tracing::debug!(
                running = state.running(),
                idle = state.is_idle(),
                "scheduler pass"
            );
            (state.take_dispatchable(), state.take_discarded())
        };
        self.launch(dispatched);
        drop(discarded);
        self.notify();
    }
}

fn execute(dispatch: Dispatch) -> TaskOutcome {
    let Dispatch { control, task } = dispatch;
    let context = TaskContext::new(control.clone());
    let source = task.source_path();

    let result = with_task_id(control.id, || {
        panic::catch_unwind(AssertUnwindSafe(|| task.run(&context)))
    });
    match result {
        Ok(outcome) => outcome,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|message| message.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "task panicked".to_string());
            TaskOutcome::failed(TaskErrorInfo {
                input_file: source,
                module_name: control.descriptor.kind.label().to_string(),
                code: ModuleError::PANICKED,
                message,
            })
        }
    }
}

impl std::fmt::Debug for TaskManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskManager")
            .field("tasks", &self.len())
            .finish_non_exhaustive()
    }
}
