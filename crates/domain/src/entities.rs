use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 任务：一次可执行的工作单元，由调度计划派生或临时创建
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub name: String,
    pub schedule_id: Option<Uuid>, // 临时任务为 None
    pub payload: serde_json::Value,
    pub group_key: String,
    pub group_max_concurrency: i32, // 0 = 不限制，由执行层实施
    pub owner_key: Option<String>,  // 被 worker 认领前为 None
    pub state: TaskState,
    pub retry_count: i32,
    pub retry_max: i32,
    pub starts_after: DateTime<Utc>,
    pub created_to_started_timeout_secs: i32,
    pub started_to_completed_timeout_secs: i32,
    pub heartbeat_timeout_secs: i32,
    pub created_at: DateTime<Utc>,
    pub last_heartbeat_at: DateTime<Utc>,
    pub last_state_transition_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TaskState {
    #[serde(rename = "CREATED")]
    Created,
    #[serde(rename = "STARTED")]
    Started,
    #[serde(rename = "SUCCEEDED")]
    Succeeded,
    #[serde(rename = "FAILED")]
    Failed,
    #[serde(rename = "EXPIRED")]
    Expired,
    #[serde(rename = "CANCELLED")]
    Cancelled,
}

impl TaskState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Created => "CREATED",
            TaskState::Started => "STARTED",
            TaskState::Succeeded => "SUCCEEDED",
            TaskState::Failed => "FAILED",
            TaskState::Expired => "EXPIRED",
            TaskState::Cancelled => "CANCELLED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Succeeded | TaskState::Failed | TaskState::Expired | TaskState::Cancelled
        )
    }

    /// 状态机只允许前进，不允许回到 CREATED/STARTED
    pub fn can_transition_to(&self, to: TaskState) -> bool {
        use TaskState::*;
        matches!(
            (self, to),
            (Created, Started)
                | (Created, Cancelled)
                | (Created, Expired)
                | (Started, Succeeded)
                | (Started, Failed)
                | (Started, Cancelled)
                | (Started, Expired)
        )
    }

    /// 能够合法进入 `to` 状态的来源状态集合，用于 UPDATE 的 WHERE 条件
    pub fn valid_sources(to: TaskState) -> &'static [TaskState] {
        use TaskState::*;
        match to {
            Created => &[],
            Started => &[Created],
            Succeeded | Failed => &[Started],
            Expired | Cancelled => &[Created, Started],
        }
    }
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl sqlx::Type<sqlx::Postgres> for TaskState {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        sqlx::postgres::PgTypeInfo::with_name("VARCHAR")
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Postgres> for TaskState {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        match s {
            "CREATED" => Ok(TaskState::Created),
            "STARTED" => Ok(TaskState::Started),
            "SUCCEEDED" => Ok(TaskState::Succeeded),
            "FAILED" => Ok(TaskState::Failed),
            "EXPIRED" => Ok(TaskState::Expired),
            "CANCELLED" => Ok(TaskState::Cancelled),
            _ => Err(format!("Invalid task state: {s}").into()),
        }
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Postgres> for TaskState {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Postgres>>::encode(self.as_str(), buf)
    }
}

/// 创建任务的输入参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskCreate {
    pub name: String,
    pub schedule_id: Option<Uuid>,
    pub payload: serde_json::Value,
    pub group_key: String,
    pub group_max_concurrency: i32,
    pub owner_key: Option<String>,
    pub retry_count: i32,
    pub retry_max: i32,
    pub starts_after: DateTime<Utc>,
    pub created_to_started_timeout_secs: i32,
    pub started_to_completed_timeout_secs: i32,
    pub heartbeat_timeout_secs: i32,
}

impl TaskCreate {
    /// 由到期的调度计划派生任务，payload/分组/超时/重试上限逐字拷贝
    pub fn from_schedule(schedule: &Schedule, now: DateTime<Utc>) -> Self {
        Self {
            name: format!(
                "{}:{}",
                schedule.name,
                now.to_rfc3339_opts(SecondsFormat::Millis, true)
            ),
            schedule_id: Some(schedule.id),
            payload: schedule.payload.clone(),
            group_key: schedule.group_key.clone(),
            group_max_concurrency: 0,
            owner_key: None,
            retry_count: 0,
            retry_max: schedule.retry_max,
            starts_after: now,
            created_to_started_timeout_secs: schedule.created_to_started_timeout_secs,
            started_to_completed_timeout_secs: schedule.started_to_completed_timeout_secs,
            heartbeat_timeout_secs: schedule.heartbeat_timeout_secs,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct TaskFilter {
    pub state: Option<TaskState>,
    pub group_key: Option<String>,
    pub schedule_id: Option<Uuid>,
    pub limit: Option<i64>,
}

impl Task {
    pub fn is_terminated(&self) -> bool {
        self.state.is_terminal()
    }
    pub fn entity_description(&self) -> String {
        match self.schedule_id {
            Some(schedule_id) => format!(
                "任务 '{}' (ID: {}, 调度计划: {})",
                self.name, self.id, schedule_id
            ),
            None => format!("任务 '{}' (ID: {})", self.name, self.id),
        }
    }
}

/// 调度计划：按固定节拍派生任务的周期性定义
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    pub id: Uuid,
    pub name: String,
    pub state: ScheduleState,
    pub payload: serde_json::Value,
    pub group_key: String,
    pub retry_max: i32,
    pub created_to_started_timeout_secs: i32,
    pub started_to_completed_timeout_secs: i32,
    pub heartbeat_timeout_secs: i32,
    pub frequency_secs: i64,
    pub last_scheduled_task_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ScheduleState {
    #[serde(rename = "ENABLED")]
    Enabled,
    #[serde(rename = "PAUSED")]
    Paused,
    #[serde(rename = "DELETED")]
    Deleted,
}

impl ScheduleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduleState::Enabled => "ENABLED",
            ScheduleState::Paused => "PAUSED",
            ScheduleState::Deleted => "DELETED",
        }
    }

    /// DELETED 是终态，不允许复活
    pub fn can_transition_to(&self, to: ScheduleState) -> bool {
        use ScheduleState::*;
        matches!(
            (self, to),
            (Enabled, Paused) | (Enabled, Deleted) | (Paused, Enabled) | (Paused, Deleted)
        )
    }

    pub fn valid_sources(to: ScheduleState) -> &'static [ScheduleState] {
        use ScheduleState::*;
        match to {
            Enabled => &[Paused],
            Paused => &[Enabled],
            Deleted => &[Enabled, Paused],
        }
    }
}

impl std::fmt::Display for ScheduleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl sqlx::Type<sqlx::Postgres> for ScheduleState {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        sqlx::postgres::PgTypeInfo::with_name("VARCHAR")
    }
}

impl<'r> sqlx::Decode<'r, sqlx::Postgres> for ScheduleState {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        match s {
            "ENABLED" => Ok(ScheduleState::Enabled),
            "PAUSED" => Ok(ScheduleState::Paused),
            "DELETED" => Ok(ScheduleState::Deleted),
            _ => Err(format!("Invalid schedule state: {s}").into()),
        }
    }
}

impl<'q> sqlx::Encode<'q, sqlx::Postgres> for ScheduleState {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::Postgres>>::encode(self.as_str(), buf)
    }
}

/// 创建调度计划的输入参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleCreate {
    pub name: String,
    pub state: ScheduleState,
    pub payload: serde_json::Value,
    pub group_key: String,
    pub retry_max: i32,
    pub created_to_started_timeout_secs: i32,
    pub started_to_completed_timeout_secs: i32,
    pub heartbeat_timeout_secs: i32,
    pub frequency_secs: i64,
}

/// 调度计划的部分更新，None 字段保持原值
#[derive(Debug, Clone, Default)]
pub struct ScheduleUpdate {
    pub payload: Option<serde_json::Value>,
    pub frequency_secs: Option<i64>,
    pub created_to_started_timeout_secs: Option<i32>,
    pub started_to_completed_timeout_secs: Option<i32>,
    pub heartbeat_timeout_secs: Option<i32>,
    pub retry_max: Option<i32>,
}

#[derive(Debug, Clone, Default)]
pub struct ScheduleFilter {
    pub state: Option<ScheduleState>,
    pub name_pattern: Option<String>,
    pub limit: Option<i64>,
}

impl Schedule {
    pub fn is_enabled(&self) -> bool {
        matches!(self.state, ScheduleState::Enabled)
    }
    pub fn entity_description(&self) -> String {
        format!(
            "调度计划 '{}' (ID: {}, 频率: {}秒)",
            self.name, self.id, self.frequency_secs
        )
    }
}

/// 单个调度计划派生任务失败的记录
#[derive(Debug)]
pub struct ScheduleFailure {
    pub schedule_id: Uuid,
    pub schedule_name: String,
    pub error: orchestrator_errors::SchedulerError,
}

/// 一次调度临界区的结果
#[derive(Debug)]
pub enum SchedulingTick {
    /// 其它实例持有咨询锁，本轮什么都不做
    LockNotGranted,
    /// 临界区已提交，created 中的任务均已持久化
    Completed {
        created: Vec<Task>,
        failures: Vec<ScheduleFailure>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_state_forward_only() {
        use TaskState::*;
        assert!(Created.can_transition_to(Started));
        assert!(Created.can_transition_to(Cancelled));
        assert!(Created.can_transition_to(Expired));
        assert!(Started.can_transition_to(Succeeded));
        assert!(Started.can_transition_to(Failed));
        assert!(Started.can_transition_to(Expired));

        // 不允许回退或跳过 STARTED 成功
        assert!(!Created.can_transition_to(Succeeded));
        assert!(!Created.can_transition_to(Failed));
        assert!(!Started.can_transition_to(Created));
        assert!(!Succeeded.can_transition_to(Started));
        assert!(!Expired.can_transition_to(Started));
        assert!(!Cancelled.can_transition_to(Created));
    }

    #[test]
    fn test_task_state_terminal() {
        assert!(!TaskState::Created.is_terminal());
        assert!(!TaskState::Started.is_terminal());
        assert!(TaskState::Succeeded.is_terminal());
        assert!(TaskState::Failed.is_terminal());
        assert!(TaskState::Expired.is_terminal());
        assert!(TaskState::Cancelled.is_terminal());
    }

    #[test]
    fn test_valid_sources_match_can_transition() {
        use TaskState::*;
        for to in [Created, Started, Succeeded, Failed, Expired, Cancelled] {
            for from in [Created, Started, Succeeded, Failed, Expired, Cancelled] {
                let listed = TaskState::valid_sources(to).contains(&from);
                assert_eq!(
                    listed,
                    from.can_transition_to(to),
                    "不一致: {from} -> {to}"
                );
            }
        }
    }

    #[test]
    fn test_schedule_state_no_resurrection() {
        use ScheduleState::*;
        assert!(Enabled.can_transition_to(Paused));
        assert!(Paused.can_transition_to(Enabled));
        assert!(Enabled.can_transition_to(Deleted));
        assert!(Paused.can_transition_to(Deleted));
        assert!(!Deleted.can_transition_to(Enabled));
        assert!(!Deleted.can_transition_to(Paused));
    }

    #[test]
    fn test_task_create_from_schedule() {
        let now = Utc::now();
        let schedule = Schedule {
            id: Uuid::new_v4(),
            name: "sync-contacts".to_string(),
            state: ScheduleState::Enabled,
            payload: serde_json::json!({"connection": 42}),
            group_key: "sync".to_string(),
            retry_max: 3,
            created_to_started_timeout_secs: 30,
            started_to_completed_timeout_secs: 600,
            heartbeat_timeout_secs: 60,
            frequency_secs: 3600,
            last_scheduled_task_id: None,
            created_at: now,
            updated_at: now,
        };

        let input = TaskCreate::from_schedule(&schedule, now);
        assert_eq!(
            input.name,
            format!(
                "sync-contacts:{}",
                now.to_rfc3339_opts(SecondsFormat::Millis, true)
            )
        );
        assert_eq!(input.schedule_id, Some(schedule.id));
        assert_eq!(input.payload, schedule.payload);
        assert_eq!(input.group_key, "sync");
        assert_eq!(input.group_max_concurrency, 0);
        assert_eq!(input.owner_key, None);
        assert_eq!(input.retry_count, 0);
        assert_eq!(input.retry_max, 3);
        assert_eq!(input.starts_after, now);
        assert_eq!(input.created_to_started_timeout_secs, 30);
    }

    #[test]
    fn test_state_serde_rename() {
        let json = serde_json::to_string(&TaskState::Created).unwrap();
        assert_eq!(json, "\"CREATED\"");
        let state: TaskState = serde_json::from_str("\"EXPIRED\"").unwrap();
        assert_eq!(state, TaskState::Expired);

        let json = serde_json::to_string(&ScheduleState::Paused).unwrap();
        assert_eq!(json, "\"PAUSED\"");
    }
}
