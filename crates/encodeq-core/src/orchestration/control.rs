use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::models::{TaskDescriptor, TaskErrorInfo, TaskId, TaskInfo, TaskState};

#[derive(Clone, Debug, Default)]
pub struct TaskCancellationToken {
    flag: Arc<AtomicBool>,
}

impl TaskCancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

/// Per-task state shared between the scheduler, the worker and readers.
///
/// `state` is only written while the scheduling lock is held; every field can
/// be read without it.
#[derive(Debug)]
pub(crate) struct TaskControl {
    pub(crate) id: TaskId,
    pub(crate) descriptor: TaskDescriptor,
    pub(crate) depends_on: Vec<TaskId>,
    pub(crate) pausable: bool,
    state: AtomicU8,
    progress: AtomicU32,
    paused: AtomicBool,
    cancellation: TaskCancellationToken,
    error: Mutex<Option<TaskErrorInfo>>,
}

impl TaskControl {
    pub(crate) fn new(
        id: TaskId,
        descriptor: TaskDescriptor,
        depends_on: Vec<TaskId>,
        pausable: bool,
        state: TaskState,
    ) -> Self {
        Self {
            id,
            descriptor,
            depends_on,
            pausable,
            state: AtomicU8::new(state as u8),
            progress: AtomicU32::new(0.0f32.to_bits()),
            paused: AtomicBool::new(false),
            cancellation: TaskCancellationToken::new(),
            error: Mutex::new(None),
        }
    }

    pub(crate) fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub(crate) fn set_state(&self, state: TaskState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    pub(crate) fn progress(&self) -> f32 {
        f32::from_bits(self.progress.load(Ordering::SeqCst))
    }

    /// Raises progress to `fraction`; lower values are ignored.
    pub(crate) fn advance_progress(&self, fraction: f32) {
        if fraction.is_nan() || fraction <= 0.0 {
            return;
        }
        // Positive floats order the same way as their bit patterns.
        let bits = fraction.min(1.0).to_bits();
        self.progress.fetch_max(bits, Ordering::SeqCst);
    }

    pub(crate) fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }

    pub(crate) fn set_paused(&self, paused: bool) {
        self.paused.store(paused, Ordering::SeqCst);
    }

    pub(crate) fn cancellation(&self) -> &TaskCancellationToken {
        &self.cancellation
    }

    pub(crate) fn cancel(&self) {
        self.cancellation.cancel();
        self.set_paused(false);
    }

    pub(crate) fn record_error(&self, error: TaskErrorInfo) {
        let mut slot = self.error.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(error);
    }

    pub(crate) fn error(&self) -> Option<TaskErrorInfo> {
        self.error
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn info(&self) -> TaskInfo {
        TaskInfo {
            id: self.id,
            descriptor: self.descriptor.clone(),
            state: self.state(),
            progress: self.progress(),
            depends_on: self.depends_on.clone(),
        }
    }
}
