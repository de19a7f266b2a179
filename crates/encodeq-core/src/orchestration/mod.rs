pub(crate) mod control;
pub mod manager;
pub(crate) mod scheduler;

pub use control::TaskCancellationToken;
pub use manager::{TaskManager, default_worker_count};

use crate::models::CoreError;

pub type OrchestrationResult<T> = Result<T, CoreError>;
