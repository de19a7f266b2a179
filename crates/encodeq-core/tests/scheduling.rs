mod common;

use std::time::Duration;

use common::{FakeEncoder, WAIT, encode_task, eventually, state};
use encodeq_core::models::{CoreErrorKind, TaskId, TaskKindTag, TaskState};
use encodeq_core::modules::ModuleError;
use encodeq_core::orchestration::TaskManager;

#[tokio::test]
async fn manager_requires_at_least_one_worker() {
    let error = TaskManager::new(0).unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::InvalidInput);
}

#[tokio::test]
async fn empty_manager_reports_zero_progress() {
    let manager = TaskManager::new(2).unwrap();
    let progress = manager.aggregate_progress();

    assert_eq!(progress.total, 0);
    assert_eq!(progress.fraction, 0.0);
    assert!(manager.is_empty());
    manager.wait_idle(WAIT).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn independent_task_is_ready_while_slots_are_busy() {
    let encoder = FakeEncoder::gated();
    let manager = TaskManager::new(1).unwrap();

    let first = manager.add_task(encode_task(&encoder, "a.wav")).unwrap();
    let second = manager.add_task(encode_task(&encoder, "b.wav")).unwrap();

    assert_eq!(first, TaskId(1));
    assert_eq!(second, TaskId(2));
    assert_eq!(state(&manager, first), TaskState::Running);
    assert_eq!(state(&manager, second), TaskState::Ready);

    encoder.release();
    let progress = manager.wait_idle(WAIT).await.unwrap();
    assert_eq!(progress.completed, 2);
    assert_eq!(progress.fraction, 1.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dependent_waits_for_unfinished_prerequisite() {
    let encoder = FakeEncoder::gated();
    let manager = TaskManager::new(4).unwrap();

    let first = manager.add_task(encode_task(&encoder, "a.wav")).unwrap();
    let second = manager
        .add_task(encode_task(&encoder, "b.wav").depends_on(first))
        .unwrap();

    eventually(|| encoder.started().len() == 1).await;
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(state(&manager, second), TaskState::Waiting);
    assert_eq!(encoder.started(), vec!["a.wav"]);

    encoder.release();
    manager.wait_idle(WAIT).await.unwrap();
    assert_eq!(state(&manager, second), TaskState::Completed);
    assert_eq!(encoder.started(), vec!["a.wav", "b.wav"]);
    assert_eq!(manager.task_info(second).unwrap().depends_on, vec![first]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn task_added_after_prerequisite_completed_starts_immediately() {
    let encoder = FakeEncoder::open(Duration::ZERO);
    let manager = TaskManager::new(1).unwrap();

    let first = manager.add_task(encode_task(&encoder, "a.wav")).unwrap();
    manager.wait_for_terminal(first, WAIT).await.unwrap();

    let second = manager
        .add_task(encode_task(&encoder, "b.wav").depends_on(first))
        .unwrap();
    assert_ne!(state(&manager, second), TaskState::Waiting);
    let info = manager.wait_for_terminal(second, WAIT).await.unwrap();
    assert_eq!(info.state, TaskState::Completed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn running_tasks_never_exceed_worker_count() {
    let encoder = FakeEncoder::open(Duration::from_millis(25));
    let manager = TaskManager::new(2).unwrap();

    for index in 0..6 {
        manager
            .add_task(encode_task(&encoder, &format!("{index}.wav")))
            .unwrap();
        assert!(manager.aggregate_progress().running <= 2);
    }

    let progress = manager.wait_idle(WAIT).await.unwrap();
    assert_eq!(progress.completed, 6);
    assert!(encoder.peak() <= 2, "peak concurrency was {}", encoder.peak());
    assert_eq!(encoder.peak(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn single_worker_completes_tasks_in_submission_order() {
    let encoder = FakeEncoder::open(Duration::from_millis(5));
    let manager = TaskManager::new(1).unwrap();

    for name in ["a.wav", "b.wav", "c.wav"] {
        manager.add_task(encode_task(&encoder, name)).unwrap();
    }
    manager.wait_idle(WAIT).await.unwrap();

    assert_eq!(encoder.started(), vec!["a.wav", "b.wav", "c.wav"]);
    assert_eq!(encoder.finished(), vec!["a.wav", "b.wav", "c.wav"]);
    assert_eq!(encoder.peak(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn failed_prerequisite_stops_dependents_transitively() {
    let encoder = FakeEncoder::open(Duration::ZERO);
    encoder.fail_on("a.wav", 3);
    let manager = TaskManager::new(2).unwrap();

    let a = manager.add_task(encode_task(&encoder, "a.wav")).unwrap();
    let b = manager
        .add_task(encode_task(&encoder, "b.wav").depends_on(a))
        .unwrap();
    let c = manager
        .add_task(encode_task(&encoder, "c.wav").depends_on(b))
        .unwrap();
    let d = manager.add_task(encode_task(&encoder, "d.wav")).unwrap();

    manager.wait_idle(WAIT).await.unwrap();

    assert_eq!(state(&manager, a), TaskState::Failed);
    assert_eq!(state(&manager, b), TaskState::Stopped);
    assert_eq!(state(&manager, c), TaskState::Stopped);
    assert_eq!(state(&manager, d), TaskState::Completed);
    assert!(!encoder.started().contains(&"b.wav".to_string()));
    assert!(!encoder.started().contains(&"c.wav".to_string()));

    let error = manager.task_error(a).unwrap().unwrap();
    assert_eq!(error.code, 3);
    assert_eq!(error.module_name, "fake");
    assert!(manager.task_error(d).unwrap().is_none());

    let late = manager
        .add_task(encode_task(&encoder, "e.wav").depends_on(c))
        .unwrap();
    assert_eq!(state(&manager, late), TaskState::Stopped);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_all_stops_pending_and_signals_running_tasks() {
    let encoder = FakeEncoder::gated();
    let manager = TaskManager::new(1).unwrap();

    let running = manager.add_task(encode_task(&encoder, "a.wav")).unwrap();
    let ready = manager.add_task(encode_task(&encoder, "b.wav")).unwrap();
    let waiting = manager
        .add_task(encode_task(&encoder, "c.wav").depends_on(running))
        .unwrap();
    eventually(|| encoder.running() == 1).await;

    manager.stop_all().unwrap();
    manager.stop_all().unwrap();
    assert_eq!(state(&manager, ready), TaskState::Stopped);
    assert_eq!(state(&manager, waiting), TaskState::Stopped);

    let progress = manager.wait_idle(WAIT).await.unwrap();
    assert_eq!(progress.stopped, 3);
    assert_eq!(state(&manager, running), TaskState::Stopped);
    assert!(manager.is_stop_requested().unwrap());

    let late = manager.add_task(encode_task(&encoder, "d.wav")).unwrap();
    assert_eq!(state(&manager, late), TaskState::Stopped);
    assert_eq!(encoder.started(), vec!["a.wav"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_task_cancels_one_task_and_its_dependents() {
    let encoder = FakeEncoder::gated();
    let manager = TaskManager::new(2).unwrap();

    let a = manager.add_task(encode_task(&encoder, "a.wav")).unwrap();
    let b = manager
        .add_task(encode_task(&encoder, "b.wav").depends_on(a))
        .unwrap();
    let other = manager.add_task(encode_task(&encoder, "x.wav")).unwrap();

    manager.stop_task(a).unwrap();
    let info = manager.wait_for_terminal(a, WAIT).await.unwrap();
    assert_eq!(info.state, TaskState::Stopped);
    assert_eq!(state(&manager, b), TaskState::Stopped);
    assert_eq!(state(&manager, other), TaskState::Running);

    manager.stop_task(a).unwrap();
    encoder.release();
    manager.wait_idle(WAIT).await.unwrap();
    assert_eq!(state(&manager, other), TaskState::Completed);
    assert!(!manager.is_stop_requested().unwrap());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn per_task_progress_never_decreases() {
    let encoder = FakeEncoder::open(Duration::from_millis(60));
    let manager = TaskManager::new(1).unwrap();
    let task = manager.add_task(encode_task(&encoder, "a.wav")).unwrap();

    let mut last = 0.0f32;
    loop {
        let info = manager.task_info(task).unwrap();
        assert!(info.progress >= last, "{} < {last}", info.progress);
        last = info.progress;
        if info.state.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(3)).await;
    }
    assert_eq!(last, 1.0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn pause_holds_an_encode_task_until_resumed() {
    let encoder = FakeEncoder::gated();
    let manager = TaskManager::new(1).unwrap();
    let task = manager.add_task(encode_task(&encoder, "a.wav")).unwrap();
    eventually(|| encoder.running() == 1).await;

    manager.pause_task(task).unwrap();
    manager.pause_task(task).unwrap();
    assert_eq!(state(&manager, task), TaskState::Paused);
    assert_eq!(manager.aggregate_progress().paused, 1);

    encoder.release();
    tokio::time::sleep(Duration::from_millis(80)).await;
    assert_eq!(state(&manager, task), TaskState::Paused);
    assert!(encoder.finished().is_empty());

    manager.resume_task(task).unwrap();
    let info = manager.wait_for_terminal(task, WAIT).await.unwrap();
    assert_eq!(info.state, TaskState::Completed);

    let error = manager.pause_task(task).unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::InvalidTransition);
    assert_eq!(error.task, Some(task));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn paused_task_can_be_stopped() {
    let encoder = FakeEncoder::gated();
    let manager = TaskManager::new(1).unwrap();
    let task = manager.add_task(encode_task(&encoder, "a.wav")).unwrap();
    eventually(|| encoder.running() == 1).await;

    manager.pause_task(task).unwrap();
    manager.stop_all().unwrap();

    let error = manager.resume_task(task).unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::InvalidTransition);
    assert_ne!(state(&manager, task), TaskState::Running);

    let info = manager.wait_for_terminal(task, WAIT).await.unwrap();
    assert_eq!(info.state, TaskState::Stopped);
    assert!(encoder.finished().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unknown_ids_and_timeouts_are_reported() {
    let encoder = FakeEncoder::gated();
    let manager = TaskManager::new(1).unwrap();

    assert_eq!(
        manager.task_info(TaskId(7)).unwrap_err().kind,
        CoreErrorKind::UnknownTask
    );
    assert_eq!(
        manager.stop_task(TaskId(0)).unwrap_err().kind,
        CoreErrorKind::UnknownTask
    );

    let task = manager
        .add_task(encode_task(&encoder, "a.wav").depends_on(TaskId(42)))
        .unwrap();
    assert!(manager.task_info(task).unwrap().depends_on.is_empty());

    let error = manager
        .wait_for_terminal(task, Duration::from_millis(50))
        .await
        .unwrap_err();
    assert_eq!(error.kind, CoreErrorKind::Timeout);
    assert_eq!(error.task, Some(task));

    manager.stop_all().unwrap();
    manager.wait_idle(WAIT).await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn panicking_task_is_recorded_as_failed() {
    let encoder = FakeEncoder::open(Duration::ZERO);
    encoder.panic_on("bad.wav");
    let manager = TaskManager::new(1).unwrap();

    let bad = manager.add_task(encode_task(&encoder, "bad.wav")).unwrap();
    let dependent = manager
        .add_task(encode_task(&encoder, "next.wav").depends_on(bad))
        .unwrap();
    let good = manager.add_task(encode_task(&encoder, "good.wav")).unwrap();

    manager.wait_idle(WAIT).await.unwrap();

    let error = manager.task_error(bad).unwrap().unwrap();
    assert_eq!(error.code, ModuleError::PANICKED);
    assert!(error.message.contains("bad.wav"));
    assert_eq!(state(&manager, dependent), TaskState::Stopped);
    assert_eq!(state(&manager, good), TaskState::Completed);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn task_infos_follow_submission_order() {
    let encoder = FakeEncoder::open(Duration::ZERO);
    let manager = TaskManager::new(3).unwrap();
    for name in ["x.wav", "y.wav", "z.wav"] {
        manager.add_task(encode_task(&encoder, name)).unwrap();
    }
    manager.wait_idle(WAIT).await.unwrap();

    let infos = manager.task_infos();
    let names: Vec<&str> = infos
        .iter()
        .map(|info| info.descriptor.name.as_str())
        .collect();
    assert_eq!(names, vec!["x.wav", "y.wav", "z.wav"]);
    assert!(
        infos
            .iter()
            .all(|info| info.descriptor.kind == TaskKindTag::Encoding)
    );
    assert_eq!(manager.len(), 3);
}
