use async_trait::async_trait;
use orchestrator_domain::{
    entities::{Task, TaskCreate, TaskFilter, TaskState},
    repositories::TaskRepository,
};
use orchestrator_errors::{SchedulerError, SchedulerResult};
use sqlx::{PgPool, QueryBuilder, Row};
use tracing::{debug, instrument};
use uuid::Uuid;

pub struct PostgresTaskRepository {
    pool: PgPool,
}

impl PostgresTaskRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

pub(crate) fn row_to_task(row: &sqlx::postgres::PgRow) -> SchedulerResult<Task> {
    Ok(Task {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        schedule_id: row.try_get("schedule_id")?,
        payload: row.try_get("payload")?,
        group_key: row.try_get("group_key")?,
        group_max_concurrency: row.try_get("group_max_concurrency")?,
        owner_key: row.try_get("owner_key")?,
        state: row.try_get("state")?,
        retry_count: row.try_get("retry_count")?,
        retry_max: row.try_get("retry_max")?,
        starts_after: row.try_get("starts_after")?,
        created_to_started_timeout_secs: row.try_get("created_to_started_timeout_secs")?,
        started_to_completed_timeout_secs: row.try_get("started_to_completed_timeout_secs")?,
        heartbeat_timeout_secs: row.try_get("heartbeat_timeout_secs")?,
        created_at: row.try_get("created_at")?,
        last_heartbeat_at: row.try_get("last_heartbeat_at")?,
        last_state_transition_at: row.try_get("last_state_transition_at")?,
    })
}

/// 插入一行任务，调度临界区和池级 create 共用
pub(crate) async fn insert_task<'e, E>(executor: E, input: &TaskCreate) -> SchedulerResult<Task>
where
    E: sqlx::PgExecutor<'e>,
{
    let row = sqlx::query(
        r#"
        INSERT INTO tasks (
            name, schedule_id, payload, group_key, group_max_concurrency, owner_key,
            state, retry_count, retry_max, starts_after,
            created_to_started_timeout_secs, started_to_completed_timeout_secs, heartbeat_timeout_secs
        )
        VALUES ($1, $2, $3, $4, $5, $6, 'CREATED', $7, $8, $9, $10, $11, $12)
        RETURNING id, name, schedule_id, payload, group_key, group_max_concurrency, owner_key,
                  state, retry_count, retry_max, starts_after,
                  created_to_started_timeout_secs, started_to_completed_timeout_secs, heartbeat_timeout_secs,
                  created_at, last_heartbeat_at, last_state_transition_at
        "#,
    )
    .bind(&input.name)
    .bind(input.schedule_id)
    .bind(&input.payload)
    .bind(&input.group_key)
    .bind(input.group_max_concurrency)
    .bind(&input.owner_key)
    .bind(input.retry_count)
    .bind(input.retry_max)
    .bind(input.starts_after)
    .bind(input.created_to_started_timeout_secs)
    .bind(input.started_to_completed_timeout_secs)
    .bind(input.heartbeat_timeout_secs)
    .fetch_one(executor)
    .await?;

    row_to_task(&row)
}

#[async_trait]
impl TaskRepository for PostgresTaskRepository {
    #[instrument(skip(self, input), fields(task_name = %input.name))]
    async fn create(&self, input: &TaskCreate) -> SchedulerResult<Task> {
        let task = insert_task(&self.pool, input).await?;
        debug!("创建任务成功: {}", task.entity_description());
        Ok(task)
    }

    #[instrument(skip(self), fields(task_id = %id))]
    async fn get_by_id(&self, id: Uuid) -> SchedulerResult<Option<Task>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, schedule_id, payload, group_key, group_max_concurrency, owner_key,
                   state, retry_count, retry_max, starts_after,
                   created_to_started_timeout_secs, started_to_completed_timeout_secs, heartbeat_timeout_secs,
                   created_at, last_heartbeat_at, last_state_transition_at
            FROM tasks WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(row_to_task(&row)?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, filter), fields(
        state = ?filter.state,
        group_key = ?filter.group_key,
        limit = ?filter.limit,
    ))]
    async fn list(&self, filter: &TaskFilter) -> SchedulerResult<Vec<Task>> {
        let mut builder = QueryBuilder::new(
            r#"SELECT id, name, schedule_id, payload, group_key, group_max_concurrency, owner_key,
                      state, retry_count, retry_max, starts_after,
                      created_to_started_timeout_secs, started_to_completed_timeout_secs, heartbeat_timeout_secs,
                      created_at, last_heartbeat_at, last_state_transition_at
               FROM tasks WHERE 1 = 1"#,
        );

        if let Some(state) = filter.state {
            builder.push(" AND state = ").push_bind(state);
        }
        if let Some(group_key) = &filter.group_key {
            builder.push(" AND group_key = ").push_bind(group_key.clone());
        }
        if let Some(schedule_id) = filter.schedule_id {
            builder.push(" AND schedule_id = ").push_bind(schedule_id);
        }
        builder.push(" ORDER BY created_at");
        if let Some(limit) = filter.limit {
            builder.push(" LIMIT ").push_bind(limit);
        }

        let rows = builder.build().fetch_all(&self.pool).await?;
        let tasks: SchedulerResult<Vec<Task>> = rows.iter().map(row_to_task).collect();
        let result = tasks?;
        debug!("查询任务列表成功，返回 {} 个任务", result.len());
        Ok(result)
    }

    #[instrument(skip(self), fields(task_id = %id, target_state = %to))]
    async fn transition_state(&self, id: Uuid, to: TaskState) -> SchedulerResult<Task> {
        let sources: Vec<String> = TaskState::valid_sources(to)
            .iter()
            .map(|s| s.to_string())
            .collect();

        // 来源状态集合写进 WHERE，状态机约束由这一条语句原子实施
        let row = sqlx::query(
            r#"
            UPDATE tasks
            SET state = $2, last_state_transition_at = now()
            WHERE id = $1 AND state = ANY($3)
            RETURNING id, name, schedule_id, payload, group_key, group_max_concurrency, owner_key,
                      state, retry_count, retry_max, starts_after,
                      created_to_started_timeout_secs, started_to_completed_timeout_secs, heartbeat_timeout_secs,
                      created_at, last_heartbeat_at, last_state_transition_at
            "#,
        )
        .bind(id)
        .bind(to)
        .bind(&sources)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let task = row_to_task(&row)?;
                debug!("任务状态转换成功: {} -> {}", task.id, to);
                Ok(task)
            }
            None => match self.get_by_id(id).await? {
                Some(task) => Err(SchedulerError::InvalidTaskTransition {
                    from: task.state.to_string(),
                    to: to.to_string(),
                }),
                None => Err(SchedulerError::task_not_found(id)),
            },
        }
    }

    #[instrument(skip(self), fields(task_id = %id))]
    async fn heartbeat(&self, id: Uuid) -> SchedulerResult<Task> {
        let row = sqlx::query(
            r#"
            UPDATE tasks
            SET last_heartbeat_at = now()
            WHERE id = $1 AND state = 'STARTED'
            RETURNING id, name, schedule_id, payload, group_key, group_max_concurrency, owner_key,
                      state, retry_count, retry_max, starts_after,
                      created_to_started_timeout_secs, started_to_completed_timeout_secs, heartbeat_timeout_secs,
                      created_at, last_heartbeat_at, last_state_transition_at
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row_to_task(&row),
            None => match self.get_by_id(id).await? {
                Some(task) => Err(SchedulerError::DatabaseOperation(format!(
                    "任务 {} 处于 {} 状态，无法接收心跳",
                    id, task.state
                ))),
                None => Err(SchedulerError::task_not_found(id)),
            },
        }
    }

    #[instrument(skip(self))]
    async fn expire_timed_out(&self) -> SchedulerResult<Vec<Task>> {
        // 选取与转换必须是同一条语句：FOR UPDATE SKIP LOCKED 保证并发过期器
        // 不会重复处理同一行，心跳/完成更新也无法与过期交错
        let rows = sqlx::query(
            r#"
            UPDATE tasks
            SET state = 'EXPIRED', last_state_transition_at = now()
            WHERE id IN (
                SELECT id FROM tasks
                WHERE (state = 'CREATED'
                       AND starts_after + make_interval(secs => created_to_started_timeout_secs) < now())
                   OR (state = 'STARTED'
                       AND last_heartbeat_at + make_interval(secs => heartbeat_timeout_secs) < now())
                   OR (state = 'STARTED'
                       AND last_state_transition_at + make_interval(secs => started_to_completed_timeout_secs) < now())
                FOR UPDATE SKIP LOCKED
            )
            RETURNING id, name, schedule_id, payload, group_key, group_max_concurrency, owner_key,
                      state, retry_count, retry_max, starts_after,
                      created_to_started_timeout_secs, started_to_completed_timeout_secs, heartbeat_timeout_secs,
                      created_at, last_heartbeat_at, last_state_transition_at
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let tasks: SchedulerResult<Vec<Task>> = rows.iter().map(row_to_task).collect();
        tasks
    }
}
