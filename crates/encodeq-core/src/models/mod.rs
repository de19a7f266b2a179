pub mod error;
pub mod module;
pub mod task;
pub mod track;

pub use error::{CoreError, CoreErrorKind, CoreResult};
pub use module::{OutputModuleId, is_lossy_input};
pub use task::{
    AggregateProgress, TaskDescriptor, TaskErrorInfo, TaskId, TaskInfo, TaskKindTag, TaskState,
};
pub use track::{CdDiscInfo, CdTrackInfo, TrackInfo};
