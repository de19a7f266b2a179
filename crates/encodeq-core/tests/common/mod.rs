#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use encodeq_core::models::{OutputModuleId, TaskId, TaskState};
use encodeq_core::modules::{
    AudioEncoder, EncodeRequest, ErrorHandler, ExtractRequest, ModuleError,
    RecordingErrorHandler, TrackExtractor,
};
use encodeq_core::orchestration::TaskManager;
use encodeq_core::task_context::TaskContext;
use encodeq_core::tasks::{EncoderTask, EncoderTaskSettings, Task};

pub const WAIT: Duration = Duration::from_secs(10);

pub type EventLog = Arc<Mutex<Vec<String>>>;

/// Encoder double. Tasks block until the gate is opened, record start order
/// and peak concurrency, and honour stop and pause requests.
pub struct FakeEncoder {
    open: AtomicBool,
    work: Duration,
    failures: Mutex<HashMap<String, i32>>,
    panics: Mutex<HashSet<String>>,
    started: Mutex<Vec<String>>,
    finished: Mutex<Vec<String>>,
    current: AtomicUsize,
    peak: AtomicUsize,
    log: EventLog,
}

impl FakeEncoder {
    pub fn gated() -> Arc<Self> {
        Arc::new(Self::build(false, Duration::ZERO, EventLog::default()))
    }

    pub fn open(work: Duration) -> Arc<Self> {
        Arc::new(Self::build(true, work, EventLog::default()))
    }

    pub fn with_log(work: Duration, log: EventLog) -> Arc<Self> {
        Arc::new(Self::build(true, work, log))
    }

    fn build(open: bool, work: Duration, log: EventLog) -> Self {
        Self {
            open: AtomicBool::new(open),
            work,
            failures: Mutex::new(HashMap::new()),
            panics: Mutex::new(HashSet::new()),
            started: Mutex::new(Vec::new()),
            finished: Mutex::new(Vec::new()),
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            log,
        }
    }

    pub fn fail_on(&self, name: &str, code: i32) {
        self.failures
            .lock()
            .unwrap()
            .insert(name.to_string(), code);
    }

    pub fn panic_on(&self, name: &str) {
        self.panics.lock().unwrap().insert(name.to_string());
    }

    pub fn release(&self) {
        self.open.store(true, Ordering::SeqCst);
    }

    pub fn started(&self) -> Vec<String> {
        self.started.lock().unwrap().clone()
    }

    pub fn finished(&self) -> Vec<String> {
        self.finished.lock().unwrap().clone()
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn running(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    fn work(&self, name: &str, context: &TaskContext) -> Result<(), ModuleError> {
        if self.panics.lock().unwrap().contains(name) {
            panic!("encoder crashed on {name}");
        }
        let failure = self.failures.lock().unwrap().get(name).copied();

        let deadline = Instant::now() + self.work;
        loop {
            if context.checkpoint().is_err() {
                return Err(ModuleError::new(ModuleError::CANCELLED, "stopped"));
            }
            if let Some(code) = failure {
                return Err(ModuleError::new(code, format!("cannot encode {name}")));
            }
            if self.open.load(Ordering::SeqCst) && Instant::now() >= deadline {
                break;
            }
            context.report_progress(0.5);
            std::thread::sleep(Duration::from_millis(2));
        }
        context.report_progress(1.0);
        Ok(())
    }
}

impl AudioEncoder for FakeEncoder {
    fn module_name(&self) -> &str {
        "fake"
    }

    fn encode(&self, request: &EncodeRequest, context: &TaskContext) -> Result<(), ModuleError> {
        let name = file_name(&request.input_path);
        self.started.lock().unwrap().push(name.clone());
        self.log.lock().unwrap().push(format!("encode {name}"));
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let result = self.work(&name, context);

        self.current.fetch_sub(1, Ordering::SeqCst);
        if result.is_ok() {
            self.finished.lock().unwrap().push(name);
        }
        result
    }
}

/// Extractor double that writes the temporary track file; fails for the
/// configured one-based track numbers after a partial write.
pub struct FakeExtractor {
    failing_tracks: HashSet<u32>,
    log: EventLog,
}

impl FakeExtractor {
    pub fn new(log: EventLog) -> Arc<Self> {
        Self::failing(log, [])
    }

    pub fn failing(log: EventLog, tracks: impl IntoIterator<Item = u32>) -> Arc<Self> {
        Arc::new(Self {
            failing_tracks: tracks.into_iter().collect(),
            log,
        })
    }
}

impl TrackExtractor for FakeExtractor {
    fn module_name(&self) -> &str {
        "fake-cd"
    }

    fn extract(&self, request: &ExtractRequest, context: &TaskContext) -> Result<(), ModuleError> {
        std::thread::sleep(Duration::from_millis(10));
        if context.checkpoint().is_err() {
            return Err(ModuleError::new(ModuleError::CANCELLED, "stopped"));
        }
        if let Some(parent) = request.output_path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&request.output_path, b"RIFF").unwrap();
        if self.failing_tracks.contains(&request.track_number) {
            return Err(ModuleError::new(11, "read error"));
        }
        self.log
            .lock()
            .unwrap()
            .push(format!("extracted {}", request.track_number));
        Ok(())
    }
}

pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

pub fn encode_task(encoder: &Arc<FakeEncoder>, name: &str) -> Task {
    encode_task_with_handler(
        encoder,
        name,
        Arc::new(RecordingErrorHandler::always_skip()),
    )
}

pub fn encode_task_with_handler(
    encoder: &Arc<FakeEncoder>,
    name: &str,
    handler: Arc<dyn ErrorHandler>,
) -> Task {
    let input = PathBuf::from("/encodeq-test/in").join(name);
    let output = PathBuf::from("/encodeq-test/out").join(format!("{name}.mp3"));
    Task::from(EncoderTask::new(
        EncoderTaskSettings::new(input, output, OutputModuleId::Lame),
        encoder.clone(),
        handler,
    ))
}

pub fn state(manager: &TaskManager, task_id: TaskId) -> TaskState {
    manager.task_info(task_id).unwrap().state
}

/// Polls until `condition` holds; panics after [`WAIT`].
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + WAIT;
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
