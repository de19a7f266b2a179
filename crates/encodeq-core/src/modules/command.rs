use std::collections::BTreeMap;
use std::path::Path;

use crate::execution::{CommandSpec, run_cancellable};
use crate::modules::{AudioEncoder, EncodeRequest, ExtractRequest, ModuleError, TrackExtractor};
use crate::task_context::TaskContext;

/// Encoder backed by an external program.
///
/// Placeholders: `{input}`, `{output}`, the tag fields `{title}`, `{artist}`,
/// `{album}`, `{year}`, `{track}`, `{genre}` (empty when unknown), and every
/// key of the request parameters.
#[derive(Clone, Debug)]
pub struct CommandEncoder {
    name: String,
    template: CommandSpec,
}

impl CommandEncoder {
    pub fn new(name: impl Into<String>, template: CommandSpec) -> Self {
        Self {
            name: name.into(),
            template,
        }
    }

    pub fn template(&self) -> &CommandSpec {
        &self.template
    }

    fn placeholders(request: &EncodeRequest) -> BTreeMap<String, String> {
        let mut values = request.parameters.clone();
        let info = &request.track_info;
        values.insert("input".to_string(), path_value(&request.input_path));
        values.insert("output".to_string(), path_value(&request.output_path));
        values.insert("title".to_string(), info.title.clone().unwrap_or_default());
        values.insert("artist".to_string(), info.artist.clone().unwrap_or_default());
        values.insert("album".to_string(), info.album.clone().unwrap_or_default());
        values.insert("genre".to_string(), info.genre.clone().unwrap_or_default());
        values.insert(
            "year".to_string(),
            info.year.map(|year| year.to_string()).unwrap_or_default(),
        );
        values.insert(
            "track".to_string(),
            info.track.map(|track| track.to_string()).unwrap_or_default(),
        );
        values
    }
}

impl AudioEncoder for CommandEncoder {
    fn module_name(&self) -> &str {
        &self.name
    }

    fn encode(&self, request: &EncodeRequest, context: &TaskContext) -> Result<(), ModuleError> {
        ensure_parent_dir(&request.output_path)?;
        let spec = self.template.render(&Self::placeholders(request));
        run_cancellable(&spec, context)?;
        context.report_progress(1.0);
        Ok(())
    }
}

/// CD track extractor backed by an external ripper.
///
/// Placeholders: `{device}` (dropped when no device is configured),
/// `{track}` and `{output}`.
#[derive(Clone, Debug)]
pub struct CommandExtractor {
    name: String,
    template: CommandSpec,
}

impl CommandExtractor {
    pub fn new(name: impl Into<String>, template: CommandSpec) -> Self {
        Self {
            name: name.into(),
            template,
        }
    }
}

impl TrackExtractor for CommandExtractor {
    fn module_name(&self) -> &str {
        &self.name
    }

    fn extract(&self, request: &ExtractRequest, context: &TaskContext) -> Result<(), ModuleError> {
        ensure_parent_dir(&request.output_path)?;
        let mut values = BTreeMap::new();
        values.insert("device".to_string(), request.device.clone().unwrap_or_default());
        values.insert("track".to_string(), request.track_number.to_string());
        values.insert("output".to_string(), path_value(&request.output_path));

        let spec = self.template.render(&values);
        run_cancellable(&spec, context)?;
        context.report_progress(1.0);
        Ok(())
    }
}

fn path_value(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn ensure_parent_dir(path: &Path) -> Result<(), ModuleError> {
    let Some(parent) = path.parent() else {
        return Ok(());
    };
    if parent.as_os_str().is_empty() || parent.exists() {
        return Ok(());
    }
    std::fs::create_dir_all(parent).map_err(|error| {
        ModuleError::new(
            ModuleError::IO,
            format!("failed to create output directory {}: {error}", parent.display()),
        )
    })
}
