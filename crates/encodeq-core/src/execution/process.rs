use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::JoinHandle;

use crate::execution::CommandSpec;
use crate::modules::ModuleError;
use crate::task_context::{CHECKPOINT_INTERVAL, TaskContext};

/// Runs `spec` to completion on the calling thread, polling `context` between
/// exit checks. On unix the child runs in its own process group, which is
/// suspended while the task is paused and killed when the task is stopped.
pub fn run_cancellable(spec: &CommandSpec, context: &TaskContext) -> Result<(), ModuleError> {
    spec.validate()
        .map_err(|error| ModuleError::new(ModuleError::SPAWN_FAILED, error.message))?;

    let mut command = Command::new(&spec.program);
    command
        .args(&spec.args)
        .envs(&spec.env)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());
    if let Some(working_dir) = &spec.working_dir {
        command.current_dir(working_dir);
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::CommandExt;
        command.process_group(0);
    }

    let mut child = command.spawn().map_err(|error| {
        ModuleError::new(
            ModuleError::SPAWN_FAILED,
            format!("failed to spawn '{}': {error}", spec.program.display()),
        )
    })?;

    tracing::debug!(
        task_id = context.task_id().0,
        program = %spec.program.display(),
        pid = child.id(),
        "spawned external module process"
    );

    let stderr = collect_stderr(&mut child);
    let status = wait_or_kill(&mut child, context);
    let stderr = stderr
        .and_then(|reader| reader.join().ok())
        .unwrap_or_default();

    let status = status?;
    if status.success() {
        return Ok(());
    }

    let last_line = stderr
        .lines()
        .rev()
        .find(|line| !line.trim().is_empty())
        .unwrap_or("no diagnostic output");
    Err(ModuleError::new(
        status.code().unwrap_or(ModuleError::PROCESS_FAILED),
        format!(
            "'{}' exited with {status}: {last_line}",
            spec.program.display()
        ),
    ))
}

fn collect_stderr(child: &mut Child) -> Option<JoinHandle<String>> {
    let mut stderr = child.stderr.take()?;
    Some(std::thread::spawn(move || {
        let mut buffer = Vec::new();
        let _ = stderr.read_to_end(&mut buffer);
        String::from_utf8_lossy(&buffer).into_owned()
    }))
}

fn wait_or_kill(child: &mut Child, context: &TaskContext) -> Result<ExitStatus, ModuleError> {
    let mut suspended = false;
    loop {
        if context.is_cancelled() {
            kill_group(child);
            let _ = child.wait();
            return Err(ModuleError::new(
                ModuleError::CANCELLED,
                "external module process was stopped",
            ));
        }

        let paused = context.is_paused();
        if paused != suspended && signal_group(child, paused) {
            tracing::debug!(
                task_id = context.task_id().0,
                pid = child.id(),
                paused,
                "external module process {}",
                if paused { "suspended" } else { "resumed" }
            );
            suspended = paused;
        }

        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => std::thread::sleep(CHECKPOINT_INTERVAL),
            Err(error) => {
                kill_group(child);
                return Err(ModuleError::new(
                    ModuleError::PROCESS_FAILED,
                    format!("failed to wait for external module process: {error}"),
                ));
            }
        }
    }
}

#[cfg(unix)]
fn signal_group(child: &Child, suspend: bool) -> bool {
    let signal = if suspend { libc::SIGSTOP } else { libc::SIGCONT };
    let pgid = -(child.id() as libc::pid_t);
    let result = unsafe { libc::kill(pgid, signal) };
    if result != 0 {
        let os_error = std::io::Error::last_os_error();
        tracing::warn!(
            pid = child.id(),
            signal,
            error = %os_error,
            "failed to signal external module process group"
        );
        return false;
    }
    true
}

#[cfg(not(unix))]
fn signal_group(_: &Child, _: bool) -> bool {
    false
}

#[cfg(unix)]
fn kill_group(child: &mut Child) {
    let pgid = -(child.id() as libc::pid_t);
    unsafe {
        libc::kill(pgid, libc::SIGKILL);
    }
    let _ = child.kill();
}

#[cfg(not(unix))]
fn kill_group(child: &mut Child) {
    let _ = child.kill();
}
