use async_trait::async_trait;
use chrono::Utc;
use orchestrator_domain::{
    entities::{Schedule, ScheduleFailure, SchedulingTick, Task, TaskCreate},
    repositories::SchedulingStore,
};
use orchestrator_errors::SchedulerResult;
use sqlx::{Acquire, PgPool, Postgres, Transaction};
use tracing::{debug, instrument};

use super::advisory_lock;
use super::schedule_repository::row_to_schedule;
use super::task_repository::insert_task;

/// 调度临界区使用的集群级咨询锁键，所有实例必须一致
pub const SCHEDULING_LOCK_KEY: i64 = 72_114_001;

pub struct PostgresSchedulingStore {
    pool: PgPool,
}

impl PostgresSchedulingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// 到期的调度计划：启用中，且从未派生过任务或距上次派生已满一个周期
async fn due_schedules(tx: &mut Transaction<'_, Postgres>) -> SchedulerResult<Vec<Schedule>> {
    let rows = sqlx::query(
        r#"
        SELECT s.id, s.name, s.state, s.payload, s.group_key, s.retry_max,
               s.created_to_started_timeout_secs, s.started_to_completed_timeout_secs,
               s.heartbeat_timeout_secs, s.frequency_secs, s.last_scheduled_task_id,
               s.created_at, s.updated_at
        FROM schedules s
        LEFT JOIN tasks t ON t.id = s.last_scheduled_task_id
        WHERE s.state = 'ENABLED'
          AND (s.last_scheduled_task_id IS NULL
               OR t.created_at + make_interval(secs => s.frequency_secs) <= now())
        "#,
    )
    .fetch_all(&mut **tx)
    .await?;

    rows.iter().map(row_to_schedule).collect()
}

/// 在保存点内派生一个任务并回写 last_scheduled_task_id。
/// 失败只回滚本计划的工作，外层事务不受污染。
async fn create_for_schedule(
    tx: &mut Transaction<'_, Postgres>,
    schedule: &Schedule,
    input: &TaskCreate,
) -> SchedulerResult<Task> {
    let mut sp = tx.begin().await?;

    let task = match insert_task(&mut *sp, input).await {
        Ok(task) => task,
        Err(e) => {
            sp.rollback().await?;
            return Err(e);
        }
    };

    if let Err(e) = sqlx::query(
        "UPDATE schedules SET last_scheduled_task_id = $2, updated_at = now() WHERE id = $1",
    )
    .bind(schedule.id)
    .bind(task.id)
    .execute(&mut *sp)
    .await
    {
        sp.rollback().await?;
        return Err(e.into());
    }

    sp.commit().await?;
    Ok(task)
}

#[async_trait]
impl SchedulingStore for PostgresSchedulingStore {
    #[instrument(skip(self))]
    async fn schedule_due_tasks(&self) -> SchedulerResult<SchedulingTick> {
        let mut tx = self.pool.begin().await?;

        // 非阻塞抢锁；未授予说明另一实例正在调度，这是预期内的竞争
        if !advisory_lock::try_xact_lock(&mut tx, SCHEDULING_LOCK_KEY).await? {
            tx.rollback().await?;
            return Ok(SchedulingTick::LockNotGranted);
        }

        let due = due_schedules(&mut tx).await?;
        debug!("发现 {} 个到期的调度计划", due.len());

        let now = Utc::now();
        let mut created = Vec::new();
        let mut failures = Vec::new();

        for schedule in &due {
            let input = TaskCreate::from_schedule(schedule, now);
            match create_for_schedule(&mut tx, schedule, &input).await {
                Ok(task) => created.push(task),
                Err(error) => failures.push(ScheduleFailure {
                    schedule_id: schedule.id,
                    schedule_name: schedule.name.clone(),
                    error,
                }),
            }
        }

        // 锁随提交自动释放
        tx.commit().await?;

        Ok(SchedulingTick::Completed { created, failures })
    }
}
