pub mod advisory_lock;
pub mod schedule_repository;
pub mod scheduling_store;
pub mod task_repository;

pub use schedule_repository::PostgresScheduleRepository;
pub use scheduling_store::{PostgresSchedulingStore, SCHEDULING_LOCK_KEY};
pub use task_repository::PostgresTaskRepository;
