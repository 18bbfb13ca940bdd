use async_trait::async_trait;
use orchestrator_domain::{
    entities::{Schedule, ScheduleCreate, ScheduleFilter, ScheduleState, ScheduleUpdate},
    repositories::ScheduleRepository,
};
use orchestrator_errors::{SchedulerError, SchedulerResult};
use sqlx::{PgPool, QueryBuilder, Row};
use tracing::{debug, instrument};
use uuid::Uuid;

pub struct PostgresScheduleRepository {
    pool: PgPool,
}

impl PostgresScheduleRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

pub(crate) fn row_to_schedule(row: &sqlx::postgres::PgRow) -> SchedulerResult<Schedule> {
    Ok(Schedule {
        id: row.try_get("id")?,
        name: row.try_get("name")?,
        state: row.try_get("state")?,
        payload: row.try_get("payload")?,
        group_key: row.try_get("group_key")?,
        retry_max: row.try_get("retry_max")?,
        created_to_started_timeout_secs: row.try_get("created_to_started_timeout_secs")?,
        started_to_completed_timeout_secs: row.try_get("started_to_completed_timeout_secs")?,
        heartbeat_timeout_secs: row.try_get("heartbeat_timeout_secs")?,
        frequency_secs: row.try_get("frequency_secs")?,
        last_scheduled_task_id: row.try_get("last_scheduled_task_id")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl ScheduleRepository for PostgresScheduleRepository {
    #[instrument(skip(self, input), fields(schedule_name = %input.name))]
    async fn create(&self, input: &ScheduleCreate) -> SchedulerResult<Schedule> {
        let row = sqlx::query(
            r#"
            INSERT INTO schedules (
                name, state, payload, group_key, retry_max,
                created_to_started_timeout_secs, started_to_completed_timeout_secs,
                heartbeat_timeout_secs, frequency_secs
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING id, name, state, payload, group_key, retry_max,
                      created_to_started_timeout_secs, started_to_completed_timeout_secs,
                      heartbeat_timeout_secs, frequency_secs, last_scheduled_task_id,
                      created_at, updated_at
            "#,
        )
        .bind(&input.name)
        .bind(input.state)
        .bind(&input.payload)
        .bind(&input.group_key)
        .bind(input.retry_max)
        .bind(input.created_to_started_timeout_secs)
        .bind(input.started_to_completed_timeout_secs)
        .bind(input.heartbeat_timeout_secs)
        .bind(input.frequency_secs)
        .fetch_one(&self.pool)
        .await?;

        let schedule = row_to_schedule(&row)?;
        debug!("创建调度计划成功: {}", schedule.entity_description());
        Ok(schedule)
    }

    #[instrument(skip(self), fields(schedule_id = %id))]
    async fn get_by_id(&self, id: Uuid) -> SchedulerResult<Option<Schedule>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, state, payload, group_key, retry_max,
                   created_to_started_timeout_secs, started_to_completed_timeout_secs,
                   heartbeat_timeout_secs, frequency_secs, last_scheduled_task_id,
                   created_at, updated_at
            FROM schedules WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(row_to_schedule(&row)?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self), fields(schedule_name = %name))]
    async fn get_by_name(&self, name: &str) -> SchedulerResult<Option<Schedule>> {
        let row = sqlx::query(
            r#"
            SELECT id, name, state, payload, group_key, retry_max,
                   created_to_started_timeout_secs, started_to_completed_timeout_secs,
                   heartbeat_timeout_secs, frequency_secs, last_scheduled_task_id,
                   created_at, updated_at
            FROM schedules WHERE name = $1
            "#,
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(Some(row_to_schedule(&row)?)),
            None => Ok(None),
        }
    }

    #[instrument(skip(self, filter), fields(state = ?filter.state, limit = ?filter.limit))]
    async fn list(&self, filter: &ScheduleFilter) -> SchedulerResult<Vec<Schedule>> {
        let mut builder = QueryBuilder::new(
            r#"SELECT id, name, state, payload, group_key, retry_max,
                      created_to_started_timeout_secs, started_to_completed_timeout_secs,
                      heartbeat_timeout_secs, frequency_secs, last_scheduled_task_id,
                      created_at, updated_at
               FROM schedules WHERE 1 = 1"#,
        );

        if let Some(state) = filter.state {
            builder.push(" AND state = ").push_bind(state);
        }
        if let Some(pattern) = &filter.name_pattern {
            builder
                .push(" AND name LIKE ")
                .push_bind(format!("%{pattern}%"));
        }
        builder.push(" ORDER BY name");
        if let Some(limit) = filter.limit {
            builder.push(" LIMIT ").push_bind(limit);
        }

        let rows = builder.build().fetch_all(&self.pool).await?;
        let schedules: SchedulerResult<Vec<Schedule>> = rows.iter().map(row_to_schedule).collect();
        schedules
    }

    #[instrument(skip(self, changes), fields(schedule_id = %id))]
    async fn update(&self, id: Uuid, changes: &ScheduleUpdate) -> SchedulerResult<Schedule> {
        let row = sqlx::query(
            r#"
            UPDATE schedules
            SET payload = COALESCE($2, payload),
                frequency_secs = COALESCE($3, frequency_secs),
                created_to_started_timeout_secs = COALESCE($4, created_to_started_timeout_secs),
                started_to_completed_timeout_secs = COALESCE($5, started_to_completed_timeout_secs),
                heartbeat_timeout_secs = COALESCE($6, heartbeat_timeout_secs),
                retry_max = COALESCE($7, retry_max),
                updated_at = now()
            WHERE id = $1 AND state <> 'DELETED'
            RETURNING id, name, state, payload, group_key, retry_max,
                      created_to_started_timeout_secs, started_to_completed_timeout_secs,
                      heartbeat_timeout_secs, frequency_secs, last_scheduled_task_id,
                      created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(changes.payload.as_ref())
        .bind(changes.frequency_secs)
        .bind(changes.created_to_started_timeout_secs)
        .bind(changes.started_to_completed_timeout_secs)
        .bind(changes.heartbeat_timeout_secs)
        .bind(changes.retry_max)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let schedule = row_to_schedule(&row)?;
                debug!("更新调度计划成功: {}", schedule.entity_description());
                Ok(schedule)
            }
            None => Err(SchedulerError::schedule_not_found(id)),
        }
    }

    #[instrument(skip(self), fields(schedule_id = %id, target_state = %to))]
    async fn transition_state(&self, id: Uuid, to: ScheduleState) -> SchedulerResult<Schedule> {
        let sources: Vec<String> = ScheduleState::valid_sources(to)
            .iter()
            .map(|s| s.to_string())
            .collect();

        let row = sqlx::query(
            r#"
            UPDATE schedules
            SET state = $2, updated_at = now()
            WHERE id = $1 AND state = ANY($3)
            RETURNING id, name, state, payload, group_key, retry_max,
                      created_to_started_timeout_secs, started_to_completed_timeout_secs,
                      heartbeat_timeout_secs, frequency_secs, last_scheduled_task_id,
                      created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(to)
        .bind(&sources)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => row_to_schedule(&row),
            None => match self.get_by_id(id).await? {
                Some(schedule) => Err(SchedulerError::InvalidScheduleTransition {
                    from: schedule.state.to_string(),
                    to: to.to_string(),
                }),
                None => Err(SchedulerError::schedule_not_found(id)),
            },
        }
    }

    #[instrument(skip(self), fields(schedule_id = %id, task_id = %task_id))]
    async fn set_last_scheduled_task(&self, id: Uuid, task_id: Uuid) -> SchedulerResult<()> {
        let result = sqlx::query(
            "UPDATE schedules SET last_scheduled_task_id = $2, updated_at = now() WHERE id = $1",
        )
        .bind(id)
        .bind(task_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(SchedulerError::schedule_not_found(id));
        }
        Ok(())
    }
}
