pub mod database;

pub use database::postgres::{
    PostgresScheduleRepository, PostgresSchedulingStore, PostgresTaskRepository,
    SCHEDULING_LOCK_KEY,
};
