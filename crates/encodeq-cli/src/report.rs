use std::io::Write;
use std::time::Duration;

use encodeq_core::models::{AggregateProgress, TaskErrorInfo, TaskId, TaskInfo, TaskState};
use encodeq_core::orchestration::TaskManager;
use serde::Serialize;

const PROGRESS_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Serialize)]
pub struct FailedTask {
    pub id: TaskId,
    pub name: String,
    pub error: TaskErrorInfo,
}

#[derive(Debug, Serialize)]
pub struct RunReport {
    pub progress: AggregateProgress,
    pub stopped_by_user: bool,
    pub tasks: Vec<TaskInfo>,
    pub failures: Vec<FailedTask>,
}

impl RunReport {
    pub fn collect(manager: &TaskManager, stopped_by_user: bool) -> Self {
        let tasks = manager.task_infos();
        let failures = tasks
            .iter()
            .filter(|info| info.state == TaskState::Failed)
            .filter_map(|info| {
                let error = manager.task_error(info.id).ok().flatten()?;
                Some(FailedTask {
                    id: info.id,
                    name: info.descriptor.name.clone(),
                    error,
                })
            })
            .collect();
        Self {
            progress: manager.aggregate_progress(),
            stopped_by_user,
            tasks,
            failures,
        }
    }

    pub fn is_success(&self) -> bool {
        !self.stopped_by_user && self.progress.failed == 0 && self.progress.stopped == 0
    }

    pub fn render_text(&self) -> String {
        let progress = &self.progress;
        let mut out = format!(
            "{} tasks: {} completed, {} failed, {} stopped\n",
            progress.total, progress.completed, progress.failed, progress.stopped
        );
        for failure in &self.failures {
            out.push_str(&format!(
                "  {} {}: {} error {} on {}: {}\n",
                failure.id,
                failure.name,
                failure.error.module_name,
                failure.error.code,
                failure.error.input_file.display(),
                failure.error.message
            ));
        }
        if self.stopped_by_user {
            out.push_str("run was cancelled\n");
        }
        out
    }
}

pub fn progress_line(progress: &AggregateProgress) -> String {
    format!(
        "[{:>5.1}%] {}/{} done, {} running, {} queued, {} failed",
        progress.fraction * 100.0,
        progress.terminal(),
        progress.total,
        progress.running + progress.paused,
        progress.waiting + progress.ready,
        progress.failed
    )
}

/// Polls progress until every task is terminal. Ctrl-C stops the run; the
/// function still waits for running tasks to wind down.
pub async fn watch(manager: &TaskManager, quiet: bool) -> RunReport {
    let mut ticker = tokio::time::interval(PROGRESS_INTERVAL);
    let mut stopped_by_user = false;
    let mut signal_done = false;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let progress = manager.aggregate_progress();
                if !quiet {
                    eprint!("\r{}", progress_line(&progress));
                    let _ = std::io::stderr().flush();
                }
                if progress.is_finished() {
                    break;
                }
            }
            result = &mut ctrl_c, if !signal_done => {
                signal_done = true;
                if let Err(error) = result {
                    tracing::warn!(error = %error, "failed to listen for ctrl-c");
                    continue;
                }
                stopped_by_user = true;
                tracing::info!("interrupted, stopping all tasks");
                if let Err(error) = manager.stop_all() {
                    tracing::error!(error = %error, "failed to stop tasks");
                }
            }
        }
    }
    if !quiet {
        eprintln!();
    }
    RunReport::collect(manager, stopped_by_user)
}
