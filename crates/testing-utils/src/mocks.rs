//! Mock implementations for the repository traits
//!
//! This module provides in-memory mock implementations that can be used
//! for unit testing without requiring an actual database.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use uuid::Uuid;

use orchestrator_domain::entities::{
    Schedule, ScheduleCreate, ScheduleFilter, ScheduleState, ScheduleUpdate, SchedulingTick, Task,
    TaskCreate, TaskFilter, TaskState,
};
use orchestrator_domain::repositories::{ScheduleRepository, SchedulingStore, TaskRepository};
use orchestrator_errors::{SchedulerError, SchedulerResult};

/// Mock implementation of TaskRepository for testing
#[derive(Debug, Clone, Default)]
pub struct MockTaskRepository {
    tasks: Arc<Mutex<HashMap<Uuid, Task>>>,
    fail_expire: Arc<Mutex<bool>>,
}

impl MockTaskRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tasks(tasks: Vec<Task>) -> Self {
        let map = tasks.into_iter().map(|t| (t.id, t)).collect();
        Self {
            tasks: Arc::new(Mutex::new(map)),
            fail_expire: Arc::new(Mutex::new(false)),
        }
    }

    /// Make the next expire_timed_out calls fail until reset
    pub fn set_fail_expire(&self, fail: bool) {
        *self.fail_expire.lock().unwrap() = fail;
    }

    pub fn count(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }

    pub fn get_all_tasks(&self) -> Vec<Task> {
        self.tasks.lock().unwrap().values().cloned().collect()
    }
}

#[async_trait]
impl TaskRepository for MockTaskRepository {
    async fn create(&self, input: &TaskCreate) -> SchedulerResult<Task> {
        let now = Utc::now();
        let task = Task {
            id: Uuid::new_v4(),
            name: input.name.clone(),
            schedule_id: input.schedule_id,
            payload: input.payload.clone(),
            group_key: input.group_key.clone(),
            group_max_concurrency: input.group_max_concurrency,
            owner_key: input.owner_key.clone(),
            state: TaskState::Created,
            retry_count: input.retry_count,
            retry_max: input.retry_max,
            starts_after: input.starts_after,
            created_to_started_timeout_secs: input.created_to_started_timeout_secs,
            started_to_completed_timeout_secs: input.started_to_completed_timeout_secs,
            heartbeat_timeout_secs: input.heartbeat_timeout_secs,
            created_at: now,
            last_heartbeat_at: now,
            last_state_transition_at: now,
        };
        self.tasks.lock().unwrap().insert(task.id, task.clone());
        Ok(task)
    }

    async fn get_by_id(&self, id: Uuid) -> SchedulerResult<Option<Task>> {
        Ok(self.tasks.lock().unwrap().get(&id).cloned())
    }

    async fn list(&self, filter: &TaskFilter) -> SchedulerResult<Vec<Task>> {
        let tasks = self.tasks.lock().unwrap();
        let mut result: Vec<Task> = tasks.values().cloned().collect();

        if let Some(state) = filter.state {
            result.retain(|t| t.state == state);
        }
        if let Some(group_key) = &filter.group_key {
            result.retain(|t| t.group_key == *group_key);
        }
        if let Some(schedule_id) = filter.schedule_id {
            result.retain(|t| t.schedule_id == Some(schedule_id));
        }
        result.sort_by_key(|t| t.created_at);
        if let Some(limit) = filter.limit {
            result.truncate(limit as usize);
        }
        Ok(result)
    }

    async fn transition_state(&self, id: Uuid, to: TaskState) -> SchedulerResult<Task> {
        let mut tasks = self.tasks.lock().unwrap();
        let task = tasks
            .get_mut(&id)
            .ok_or(SchedulerError::TaskNotFound { id })?;

        if !task.state.can_transition_to(to) {
            return Err(SchedulerError::InvalidTaskTransition {
                from: task.state.to_string(),
                to: to.to_string(),
            });
        }
        task.state = to;
        task.last_state_transition_at = Utc::now();
        Ok(task.clone())
    }

    async fn heartbeat(&self, id: Uuid) -> SchedulerResult<Task> {
        let mut tasks = self.tasks.lock().unwrap();
        let task = tasks
            .get_mut(&id)
            .ok_or(SchedulerError::TaskNotFound { id })?;

        if task.state != TaskState::Started {
            return Err(SchedulerError::DatabaseOperation(format!(
                "task {} is in state {}, heartbeat rejected",
                id, task.state
            )));
        }
        task.last_heartbeat_at = Utc::now();
        Ok(task.clone())
    }

    async fn expire_timed_out(&self) -> SchedulerResult<Vec<Task>> {
        if *self.fail_expire.lock().unwrap() {
            return Err(SchedulerError::database_error("simulated failure"));
        }

        let now = Utc::now();
        let mut tasks = self.tasks.lock().unwrap();
        let mut expired = Vec::new();

        for task in tasks.values_mut() {
            let timed_out = match task.state {
                TaskState::Created => {
                    task.starts_after + Duration::seconds(task.created_to_started_timeout_secs as i64)
                        < now
                }
                TaskState::Started => {
                    task.last_heartbeat_at
                        + Duration::seconds(task.heartbeat_timeout_secs as i64)
                        < now
                        || task.last_state_transition_at
                            + Duration::seconds(task.started_to_completed_timeout_secs as i64)
                            < now
                }
                _ => false,
            };
            if timed_out {
                task.state = TaskState::Expired;
                task.last_state_transition_at = now;
                expired.push(task.clone());
            }
        }
        Ok(expired)
    }
}

/// Mock implementation of ScheduleRepository for testing
#[derive(Debug, Clone, Default)]
pub struct MockScheduleRepository {
    schedules: Arc<Mutex<HashMap<Uuid, Schedule>>>,
}

impl MockScheduleRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schedules(schedules: Vec<Schedule>) -> Self {
        let map = schedules.into_iter().map(|s| (s.id, s)).collect();
        Self {
            schedules: Arc::new(Mutex::new(map)),
        }
    }

    pub fn count(&self) -> usize {
        self.schedules.lock().unwrap().len()
    }
}

#[async_trait]
impl ScheduleRepository for MockScheduleRepository {
    async fn create(&self, input: &ScheduleCreate) -> SchedulerResult<Schedule> {
        let mut schedules = self.schedules.lock().unwrap();
        if schedules.values().any(|s| s.name == input.name) {
            return Err(SchedulerError::DatabaseOperation(format!(
                "duplicate schedule name: {}",
                input.name
            )));
        }

        let now = Utc::now();
        let schedule = Schedule {
            id: Uuid::new_v4(),
            name: input.name.clone(),
            state: input.state,
            payload: input.payload.clone(),
            group_key: input.group_key.clone(),
            retry_max: input.retry_max,
            created_to_started_timeout_secs: input.created_to_started_timeout_secs,
            started_to_completed_timeout_secs: input.started_to_completed_timeout_secs,
            heartbeat_timeout_secs: input.heartbeat_timeout_secs,
            frequency_secs: input.frequency_secs,
            last_scheduled_task_id: None,
            created_at: now,
            updated_at: now,
        };
        schedules.insert(schedule.id, schedule.clone());
        Ok(schedule)
    }

    async fn get_by_id(&self, id: Uuid) -> SchedulerResult<Option<Schedule>> {
        Ok(self.schedules.lock().unwrap().get(&id).cloned())
    }

    async fn get_by_name(&self, name: &str) -> SchedulerResult<Option<Schedule>> {
        Ok(self
            .schedules
            .lock()
            .unwrap()
            .values()
            .find(|s| s.name == name)
            .cloned())
    }

    async fn list(&self, filter: &ScheduleFilter) -> SchedulerResult<Vec<Schedule>> {
        let schedules = self.schedules.lock().unwrap();
        let mut result: Vec<Schedule> = schedules.values().cloned().collect();

        if let Some(state) = filter.state {
            result.retain(|s| s.state == state);
        }
        if let Some(pattern) = &filter.name_pattern {
            result.retain(|s| s.name.contains(pattern.as_str()));
        }
        result.sort_by(|a, b| a.name.cmp(&b.name));
        if let Some(limit) = filter.limit {
            result.truncate(limit as usize);
        }
        Ok(result)
    }

    async fn update(&self, id: Uuid, changes: &ScheduleUpdate) -> SchedulerResult<Schedule> {
        let mut schedules = self.schedules.lock().unwrap();
        let schedule = schedules
            .get_mut(&id)
            .filter(|s| s.state != ScheduleState::Deleted)
            .ok_or(SchedulerError::ScheduleNotFound { id })?;

        if let Some(payload) = &changes.payload {
            schedule.payload = payload.clone();
        }
        if let Some(frequency_secs) = changes.frequency_secs {
            schedule.frequency_secs = frequency_secs;
        }
        if let Some(secs) = changes.created_to_started_timeout_secs {
            schedule.created_to_started_timeout_secs = secs;
        }
        if let Some(secs) = changes.started_to_completed_timeout_secs {
            schedule.started_to_completed_timeout_secs = secs;
        }
        if let Some(secs) = changes.heartbeat_timeout_secs {
            schedule.heartbeat_timeout_secs = secs;
        }
        if let Some(retry_max) = changes.retry_max {
            schedule.retry_max = retry_max;
        }
        schedule.updated_at = Utc::now();
        Ok(schedule.clone())
    }

    async fn transition_state(&self, id: Uuid, to: ScheduleState) -> SchedulerResult<Schedule> {
        let mut schedules = self.schedules.lock().unwrap();
        let schedule = schedules
            .get_mut(&id)
            .ok_or(SchedulerError::ScheduleNotFound { id })?;

        if !schedule.state.can_transition_to(to) {
            return Err(SchedulerError::InvalidScheduleTransition {
                from: schedule.state.to_string(),
                to: to.to_string(),
            });
        }
        schedule.state = to;
        schedule.updated_at = Utc::now();
        Ok(schedule.clone())
    }

    async fn set_last_scheduled_task(&self, id: Uuid, task_id: Uuid) -> SchedulerResult<()> {
        let mut schedules = self.schedules.lock().unwrap();
        let schedule = schedules
            .get_mut(&id)
            .ok_or(SchedulerError::ScheduleNotFound { id })?;
        schedule.last_scheduled_task_id = Some(task_id);
        schedule.updated_at = Utc::now();
        Ok(())
    }
}

/// Mock implementation of SchedulingStore with scripted outcomes
#[derive(Default)]
pub struct MockSchedulingStore {
    outcomes: Mutex<VecDeque<SchedulerResult<SchedulingTick>>>,
    calls: Mutex<usize>,
}

impl MockSchedulingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the outcome of the next schedule_due_tasks call
    pub fn push_outcome(&self, outcome: SchedulerResult<SchedulingTick>) {
        self.outcomes.lock().unwrap().push_back(outcome);
    }

    pub fn calls(&self) -> usize {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl SchedulingStore for MockSchedulingStore {
    async fn schedule_due_tasks(&self) -> SchedulerResult<SchedulingTick> {
        *self.calls.lock().unwrap() += 1;
        match self.outcomes.lock().unwrap().pop_front() {
            Some(outcome) => outcome,
            // Nothing scripted: an uneventful committed tick
            None => Ok(SchedulingTick::Completed {
                created: vec![],
                failures: vec![],
            }),
        }
    }
}
