pub mod command;
pub mod error_policy;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use crate::models::{
    CoreError, CoreErrorKind, CoreResult, OutputModuleId, TrackInfo, is_lossy_input,
};
use crate::task_context::TaskContext;

pub use command::{CommandEncoder, CommandExtractor};
pub use error_policy::{ErrorAction, ErrorHandler, RecordingErrorHandler};

/// Per-file failure reported by an encoder or extractor.
#[derive(Clone, Debug, Eq, PartialEq, Error)]
#[error("module error {code}: {message}")]
pub struct ModuleError {
    pub code: i32,
    pub message: String,
}

impl ModuleError {
    pub const PANICKED: i32 = -1;
    pub const OUTPUT_EXISTS: i32 = 1;
    pub const SPAWN_FAILED: i32 = 2;
    pub const PROCESS_FAILED: i32 = 3;
    pub const IO: i32 = 4;
    pub const CANCELLED: i32 = 5;

    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EncodeRequest {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub track_info: TrackInfo,
    pub parameters: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ExtractRequest {
    pub device: Option<String>,
    /// One-based track number on the disc.
    pub track_number: u32,
    pub output_path: PathBuf,
}

pub trait AudioEncoder: Send + Sync {
    fn module_name(&self) -> &str;

    /// Encodes one file, reporting fractional progress through `context` and
    /// polling it for stop requests.
    fn encode(&self, request: &EncodeRequest, context: &TaskContext) -> Result<(), ModuleError>;
}

pub trait TrackExtractor: Send + Sync {
    fn module_name(&self) -> &str;

    fn extract(&self, request: &ExtractRequest, context: &TaskContext) -> Result<(), ModuleError>;
}

/// Output modules available to job submission, in registration order.
#[derive(Clone, Default)]
pub struct ModuleRegistry {
    modules: Vec<(OutputModuleId, Arc<dyn AudioEncoder>)>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        module: OutputModuleId,
        encoder: Arc<dyn AudioEncoder>,
    ) -> CoreResult<()> {
        if self.contains(module) {
            return Err(CoreError::new(
                CoreErrorKind::InvalidInput,
                format!("duplicate encoder registration for module '{}'", module.key()),
            ));
        }
        self.modules.push((module, encoder));
        Ok(())
    }

    pub fn contains(&self, module: OutputModuleId) -> bool {
        self.modules.iter().any(|(id, _)| *id == module)
    }

    pub fn modules(&self) -> impl Iterator<Item = OutputModuleId> + '_ {
        self.modules.iter().map(|(id, _)| *id)
    }

    pub fn resolve(&self, module: OutputModuleId) -> CoreResult<Arc<dyn AudioEncoder>> {
        self.modules
            .iter()
            .find(|(id, _)| *id == module)
            .map(|(_, encoder)| encoder.clone())
            .ok_or_else(|| {
                CoreError::new(
                    CoreErrorKind::Unsupported,
                    format!("no encoder is registered for module '{}'", module.key()),
                )
            })
    }

    /// True when a lossy source would be re-encoded with a lossy output
    /// module.
    pub fn is_transcoding_lossy<'a>(
        &self,
        inputs: impl IntoIterator<Item = &'a PathBuf>,
        output: OutputModuleId,
    ) -> bool {
        output.is_lossy() && inputs.into_iter().any(|input| is_lossy_input(input))
    }
}
