pub mod entities;
pub mod repositories;

pub use entities::*;
pub use repositories::*;
pub use orchestrator_errors::{SchedulerError, SchedulerResult};
