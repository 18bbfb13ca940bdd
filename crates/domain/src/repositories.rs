//! 领域仓储抽象
//!
//! 定义数据访问的抽象接口，遵循依赖倒置原则

use async_trait::async_trait;
use uuid::Uuid;

use crate::entities::{
    Schedule, ScheduleCreate, ScheduleFilter, ScheduleState, ScheduleUpdate, SchedulingTick, Task,
    TaskCreate, TaskFilter, TaskState,
};
use orchestrator_errors::SchedulerResult;

/// 任务仓储抽象
#[async_trait]
pub trait TaskRepository: Send + Sync {
    async fn create(&self, input: &TaskCreate) -> SchedulerResult<Task>;
    async fn get_by_id(&self, id: Uuid) -> SchedulerResult<Option<Task>>;
    async fn list(&self, filter: &TaskFilter) -> SchedulerResult<Vec<Task>>;
    /// 原子状态转换，只允许状态机定义的前进方向
    async fn transition_state(&self, id: Uuid, to: TaskState) -> SchedulerResult<Task>;
    /// 刷新 STARTED 任务的心跳时间戳
    async fn heartbeat(&self, id: Uuid) -> SchedulerResult<Task>;
    /// 原子地把所有超时的 CREATED/STARTED 任务转为 EXPIRED 并返回受影响的行
    async fn expire_timed_out(&self) -> SchedulerResult<Vec<Task>>;
}

/// 调度计划仓储抽象
#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    async fn create(&self, input: &ScheduleCreate) -> SchedulerResult<Schedule>;
    async fn get_by_id(&self, id: Uuid) -> SchedulerResult<Option<Schedule>>;
    async fn get_by_name(&self, name: &str) -> SchedulerResult<Option<Schedule>>;
    async fn list(&self, filter: &ScheduleFilter) -> SchedulerResult<Vec<Schedule>>;
    async fn update(&self, id: Uuid, changes: &ScheduleUpdate) -> SchedulerResult<Schedule>;
    async fn transition_state(&self, id: Uuid, to: ScheduleState) -> SchedulerResult<Schedule>;
    async fn set_last_scheduled_task(&self, id: Uuid, task_id: Uuid) -> SchedulerResult<()>;
}

/// 调度临界区抽象：在单个事务内完成"抢锁 -> 查询到期计划 -> 派生任务"
#[async_trait]
pub trait SchedulingStore: Send + Sync {
    /// 尝试获取集群级咨询锁并把到期的调度计划物化为任务。
    /// 锁未授予时立即返回 `SchedulingTick::LockNotGranted`；
    /// 返回 `Completed` 时事务已提交。
    async fn schedule_due_tasks(&self) -> SchedulerResult<SchedulingTick>;
}
