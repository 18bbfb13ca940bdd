//! Test data builders for creating test entities
//!
//! This module provides builder patterns for creating test data with
//! sensible defaults and easy customization.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use orchestrator_domain::entities::{Schedule, ScheduleState, Task, TaskState};

/// Builder for creating test Task entities
pub struct TaskBuilder {
    task: Task,
}

impl TaskBuilder {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            task: Task {
                id: Uuid::new_v4(),
                name: "test_task".to_string(),
                schedule_id: None,
                payload: serde_json::json!({}),
                group_key: "test_group".to_string(),
                group_max_concurrency: 0,
                owner_key: None,
                state: TaskState::Created,
                retry_count: 0,
                retry_max: 0,
                starts_after: now,
                created_to_started_timeout_secs: 30,
                started_to_completed_timeout_secs: 600,
                heartbeat_timeout_secs: 60,
                created_at: now,
                last_heartbeat_at: now,
                last_state_transition_at: now,
            },
        }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.task.id = id;
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.task.name = name.to_string();
        self
    }

    pub fn with_schedule_id(mut self, schedule_id: Uuid) -> Self {
        self.task.schedule_id = Some(schedule_id);
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.task.payload = payload;
        self
    }

    pub fn with_group_key(mut self, group_key: &str) -> Self {
        self.task.group_key = group_key.to_string();
        self
    }

    pub fn with_owner_key(mut self, owner_key: &str) -> Self {
        self.task.owner_key = Some(owner_key.to_string());
        self
    }

    pub fn with_state(mut self, state: TaskState) -> Self {
        self.task.state = state;
        self
    }

    pub fn with_retry_max(mut self, retry_max: i32) -> Self {
        self.task.retry_max = retry_max;
        self
    }

    pub fn with_starts_after(mut self, starts_after: DateTime<Utc>) -> Self {
        self.task.starts_after = starts_after;
        self
    }

    pub fn with_created_to_started_timeout_secs(mut self, secs: i32) -> Self {
        self.task.created_to_started_timeout_secs = secs;
        self
    }

    pub fn with_started_to_completed_timeout_secs(mut self, secs: i32) -> Self {
        self.task.started_to_completed_timeout_secs = secs;
        self
    }

    pub fn with_heartbeat_timeout_secs(mut self, secs: i32) -> Self {
        self.task.heartbeat_timeout_secs = secs;
        self
    }

    pub fn with_last_heartbeat_at(mut self, at: DateTime<Utc>) -> Self {
        self.task.last_heartbeat_at = at;
        self
    }

    pub fn with_last_state_transition_at(mut self, at: DateTime<Utc>) -> Self {
        self.task.last_state_transition_at = at;
        self
    }

    pub fn build(self) -> Task {
        self.task
    }
}

impl Default for TaskBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for creating test Schedule entities
pub struct ScheduleBuilder {
    schedule: Schedule,
}

impl ScheduleBuilder {
    pub fn new() -> Self {
        let now = Utc::now();
        Self {
            schedule: Schedule {
                id: Uuid::new_v4(),
                name: "test_schedule".to_string(),
                state: ScheduleState::Enabled,
                payload: serde_json::json!({}),
                group_key: "test_group".to_string(),
                retry_max: 0,
                created_to_started_timeout_secs: 30,
                started_to_completed_timeout_secs: 600,
                heartbeat_timeout_secs: 60,
                frequency_secs: 3600,
                last_scheduled_task_id: None,
                created_at: now,
                updated_at: now,
            },
        }
    }

    pub fn with_id(mut self, id: Uuid) -> Self {
        self.schedule.id = id;
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.schedule.name = name.to_string();
        self
    }

    pub fn with_state(mut self, state: ScheduleState) -> Self {
        self.schedule.state = state;
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.schedule.payload = payload;
        self
    }

    pub fn with_group_key(mut self, group_key: &str) -> Self {
        self.schedule.group_key = group_key.to_string();
        self
    }

    pub fn with_retry_max(mut self, retry_max: i32) -> Self {
        self.schedule.retry_max = retry_max;
        self
    }

    pub fn with_frequency_secs(mut self, frequency_secs: i64) -> Self {
        self.schedule.frequency_secs = frequency_secs;
        self
    }

    pub fn with_last_scheduled_task_id(mut self, task_id: Uuid) -> Self {
        self.schedule.last_scheduled_task_id = Some(task_id);
        self
    }

    pub fn paused(mut self) -> Self {
        self.schedule.state = ScheduleState::Paused;
        self
    }

    pub fn build(self) -> Schedule {
        self.schedule
    }
}

impl Default for ScheduleBuilder {
    fn default() -> Self {
        Self::new()
    }
}
