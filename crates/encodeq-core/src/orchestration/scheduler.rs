use std::collections::BTreeSet;
use std::sync::Arc;

use crate::models::{CoreError, CoreErrorKind, TaskId, TaskState};
use crate::orchestration::OrchestrationResult;
use crate::orchestration::control::TaskControl;
use crate::tasks::{Task, TaskOutcome};

struct Entry {
    control: Arc<TaskControl>,
    task: Option<Task>,
}

/// A task moved out of the registry, ready to be handed to a worker.
pub(crate) struct Dispatch {
    pub(crate) control: Arc<TaskControl>,
    pub(crate) task: Task,
}

/// Registry, ready queue and slot accounting. Every method runs under the
/// manager's scheduling lock.
pub(crate) struct SchedulerState {
    entries: Vec<Entry>,
    ready: BTreeSet<TaskId>,
    running: usize,
    workers: usize,
    stop_requested: bool,
    discarded: Vec<Task>,
}

impl SchedulerState {
    pub(crate) fn new(workers: usize) -> Self {
        Self {
            entries: Vec::new(),
            ready: BTreeSet::new(),
            running: 0,
            workers: workers.max(1),
            stop_requested: false,
            discarded: Vec::new(),
        }
    }

    pub(crate) fn workers(&self) -> usize {
        self.workers
    }

    pub(crate) fn running(&self) -> usize {
        self.running
    }

    pub(crate) fn is_stop_requested(&self) -> bool {
        self.stop_requested
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.entries
            .iter()
            .all(|entry| entry.control.state().is_terminal())
    }

    pub(crate) fn register(&mut self, task: Task) -> Arc<TaskControl> {
        let id = TaskId(self.entries.len() as u64 + 1);
        let mut depends_on = Vec::with_capacity(task.prerequisites().len());
        for prerequisite in task.prerequisites() {
            if self.control(*prerequisite).is_some() {
                depends_on.push(*prerequisite);
            } else {
                tracing::warn!(
                    task_id = id.0,
                    prerequisite = prerequisite.0,
                    "ignoring unknown prerequisite"
                );
            }
        }

        let state = if self.stop_requested {
            TaskState::Stopped
        } else {
            self.resolve(&depends_on)
        };
        let control = Arc::new(TaskControl::new(
            id,
            task.descriptor(),
            depends_on,
            task.supports_pause(),
            state,
        ));

        let task = match state {
            TaskState::Ready => {
                self.ready.insert(id);
                Some(task)
            }
            TaskState::Waiting => Some(task),
            _ => {
                self.discarded.push(task);
                None
            }
        };
        tracing::debug!(
            task_id = id.0,
            kind = control.descriptor.kind.label(),
            state = ?state,
            "registered task"
        );
        self.entries.push(Entry {
            control: control.clone(),
            task,
        });
        control
    }

    /// Moves ready tasks into free worker slots, lowest id first.
    pub(crate) fn take_dispatchable(&mut self) -> Vec<Dispatch> {
        let mut dispatched = Vec::new();
        while !self.stop_requested && self.running < self.workers {
            let Some(id) = self.ready.pop_first() else {
                break;
            };
            let Some(entry) = self.entries.get_mut(index_of(id)) else {
                continue;
            };
            if entry.control.state() != TaskState::Ready {
                continue;
            }
            let Some(task) = entry.task.take() else {
                continue;
            };

            entry.control.set_state(TaskState::Running);
            self.running += 1;
            dispatched.push(Dispatch {
                control: entry.control.clone(),
                task,
            });
        }
        dispatched
    }

    /// Tasks stopped before they ran. The manager drops them once the
    /// scheduling lock is released.
    pub(crate) fn take_discarded(&mut self) -> Vec<Task> {
        std::mem::take(&mut self.discarded)
    }

    /// Records the outcome reported by a worker. Returns true when the
    /// outcome also stopped every other task.
    pub(crate) fn finish(&mut self, id: TaskId, outcome: TaskOutcome) -> bool {
        let Some(control) = self.control(id) else {
            tracing::warn!(task_id = id.0, "outcome reported for unknown task");
            return false;
        };
        let current = control.state();
        if !matches!(current, TaskState::Running | TaskState::Paused) {
            tracing::warn!(
                task_id = id.0,
                state = ?current,
                "ignoring outcome for task that is not running"
            );
            return false;
        }

        self.running = self.running.saturating_sub(1);
        control.set_paused(false);
        let mut stop_all = false;
        let state = match outcome {
            TaskOutcome::Completed => {
                control.advance_progress(1.0);
                TaskState::Completed
            }
            TaskOutcome::Failed {
                error,
                stop_all: stop,
            } => {
                control.record_error(error);
                stop_all = stop;
                TaskState::Failed
            }
            TaskOutcome::Stopped => TaskState::Stopped,
        };
        control.set_state(state);
        tracing::debug!(task_id = id.0, state = ?state, "task finished");

        self.cascade(id);
        if stop_all {
            self.stop_all();
        }
        stop_all
    }

    pub(crate) fn stop_all(&mut self) {
        self.stop_requested = true;
        self.ready.clear();
        for entry in &mut self.entries {
            match entry.control.state() {
                TaskState::Running | TaskState::Paused => entry.control.cancel(),
                TaskState::Waiting | TaskState::Ready => {
                    entry.control.set_state(TaskState::Stopped);
                    self.discarded.extend(entry.task.take());
                }
                _ => {}
            }
        }
    }

    pub(crate) fn stop_task(&mut self, id: TaskId) -> OrchestrationResult<()> {
        let control = self.control(id).ok_or_else(|| unknown_task(id))?;
        match control.state() {
            TaskState::Running | TaskState::Paused => control.cancel(),
            TaskState::Waiting | TaskState::Ready => {
                self.stop_pending(id);
                self.cascade(id);
            }
            _ => {}
        }
        Ok(())
    }

    pub(crate) fn pause_task(&mut self, id: TaskId) -> OrchestrationResult<()> {
        let control = self.control(id).ok_or_else(|| unknown_task(id))?;
        if !control.pausable {
            return Err(CoreError::for_task(
                id,
                CoreErrorKind::Unsupported,
                format!("{} tasks cannot be paused", control.descriptor.kind.label()),
            ));
        }
        match control.state() {
            TaskState::Running => {
                control.set_paused(true);
                control.set_state(TaskState::Paused);
                Ok(())
            }
            TaskState::Paused => Ok(()),
            state => Err(invalid_transition(id, state, TaskState::Paused)),
        }
    }

    pub(crate) fn resume_task(&mut self, id: TaskId) -> OrchestrationResult<()> {
        let control = self.control(id).ok_or_else(|| unknown_task(id))?;
        match control.state() {
            TaskState::Paused
                if self.stop_requested || control.cancellation().is_cancelled() =>
            {
                Err(invalid_transition(id, TaskState::Paused, TaskState::Running))
            }
            TaskState::Paused => {
                control.set_state(TaskState::Running);
                control.set_paused(false);
                Ok(())
            }
            TaskState::Running => Ok(()),
            state => Err(invalid_transition(id, state, TaskState::Running)),
        }
    }

    fn control(&self, id: TaskId) -> Option<Arc<TaskControl>> {
        if id.0 == 0 {
            return None;
        }
        self.entries
            .get(index_of(id))
            .map(|entry| entry.control.clone())
    }

    fn resolve(&self, depends_on: &[TaskId]) -> TaskState {
        let mut pending = false;
        for prerequisite in depends_on {
            let Some(control) = self.control(*prerequisite) else {
                continue;
            };
            match control.state() {
                TaskState::Completed => {}
                TaskState::Failed | TaskState::Stopped => return TaskState::Stopped,
                _ => pending = true,
            }
        }
        if pending {
            TaskState::Waiting
        } else {
            TaskState::Ready
        }
    }

    fn stop_pending(&mut self, id: TaskId) {
        self.ready.remove(&id);
        if let Some(entry) = self.entries.get_mut(index_of(id)) {
            entry.control.set_state(TaskState::Stopped);
            self.discarded.extend(entry.task.take());
        }
    }

    /// Re-evaluates every waiting dependent of `finished`, transitively
    /// stopping the ones that can no longer run.
    fn cascade(&mut self, finished: TaskId) {
        let mut worklist = vec![finished];
        while let Some(prerequisite) = worklist.pop() {
            // Dependents always have larger ids than their prerequisites.
            let start = (prerequisite.0 as usize).min(self.entries.len());
            let dependents: Vec<Arc<TaskControl>> = self.entries[start..]
                .iter()
                .filter(|entry| {
                    entry.control.state() == TaskState::Waiting
                        && entry.control.depends_on.contains(&prerequisite)
                })
                .map(|entry| entry.control.clone())
                .collect();

            for dependent in dependents {
                match self.resolve(&dependent.depends_on) {
                    TaskState::Ready if !self.stop_requested => {
                        dependent.set_state(TaskState::Ready);
                        self.ready.insert(dependent.id);
                    }
                    TaskState::Waiting => {}
                    _ => {
                        tracing::debug!(
                            task_id = dependent.id.0,
                            prerequisite = prerequisite.0,
                            "stopping task after prerequisite did not complete"
                        );
                        self.stop_pending(dependent.id);
                        worklist.push(dependent.id);
                    }
                }
            }
        }
    }
}

fn index_of(id: TaskId) -> usize {
    id.0.saturating_sub(1) as usize
}

fn unknown_task(id: TaskId) -> CoreError {
    CoreError::for_task(id, CoreErrorKind::UnknownTask, format!("task {id} is not registered"))
}

fn invalid_transition(id: TaskId, from: TaskState, to: TaskState) -> CoreError {
    CoreError::for_task(
        id,
        CoreErrorKind::InvalidTransition,
        format!("task {id} cannot move from {from:?} to {to:?}"),
    )
}
