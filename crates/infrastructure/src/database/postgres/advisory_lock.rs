use sqlx::{PgConnection, Row};

use orchestrator_errors::SchedulerResult;

/// 尝试获取事务级咨询锁，非阻塞，立即返回是否授予。
/// 锁在所属事务提交或回滚时由 Postgres 自动释放，没有显式解锁。
pub async fn try_xact_lock(conn: &mut PgConnection, key: i64) -> SchedulerResult<bool> {
    let row = sqlx::query("SELECT pg_try_advisory_xact_lock($1) AS granted")
        .bind(key)
        .fetch_one(conn)
        .await?;
    Ok(row.try_get("granted")?)
}
