pub mod daemon;
pub mod expiring;
pub mod scheduling;

pub use daemon::{Daemon, ErrorCallback, TickWorker};
pub use expiring::ExpiringDaemon;
pub use scheduling::SchedulingDaemon;

use orchestrator_domain::entities::Task;
use std::sync::Arc;

/// 任务回调：调度/过期守护进程在状态持久化之后逐任务触发。
/// 回调是即发即弃的，不会被等待，也不允许抛出影响守护进程。
pub type TaskCallback = Arc<dyn Fn(Task) + Send + Sync>;
