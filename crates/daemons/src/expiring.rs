use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, instrument};

use orchestrator_domain::repositories::TaskRepository;
use orchestrator_errors::SchedulerResult;

use crate::daemon::TickWorker;
use crate::TaskCallback;

/// 过期守护进程：每轮用一条原子语句把超时的 CREATED/STARTED 任务
/// 转为 EXPIRED 并逐个回调。EXPIRED 转换只有这里会写。
pub struct ExpiringDaemon {
    tasks: Arc<dyn TaskRepository>,
    on_expiring: TaskCallback,
}

impl ExpiringDaemon {
    pub fn new(tasks: Arc<dyn TaskRepository>, on_expiring: TaskCallback) -> Self {
        Self { tasks, on_expiring }
    }
}

#[async_trait]
impl TickWorker for ExpiringDaemon {
    #[instrument(name = "expiring_tick", skip(self))]
    async fn tick(&self) -> SchedulerResult<()> {
        let expired = self.tasks.expire_timed_out().await?;
        if !expired.is_empty() {
            let ids: Vec<_> = expired.iter().map(|t| t.id).collect();
            info!("过期任务: {ids:?}");
            for task in expired {
                (self.on_expiring)(task);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration as ChronoDuration, Utc};
    use orchestrator_domain::entities::{Task, TaskState};
    use orchestrator_testing_utils::{MockTaskRepository, TaskBuilder};
    use std::sync::Mutex;

    fn collecting_callback() -> (TaskCallback, Arc<Mutex<Vec<Task>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = seen.clone();
        let callback: TaskCallback = Arc::new(move |task| {
            seen_clone.lock().unwrap().push(task);
        });
        (callback, seen)
    }

    #[tokio::test]
    async fn test_expired_tasks_trigger_callback_once_each() {
        let stale = TaskBuilder::new()
            .with_name("stale")
            .with_starts_after(Utc::now() - ChronoDuration::seconds(120))
            .with_created_to_started_timeout_secs(30)
            .build();
        let fresh = TaskBuilder::new()
            .with_name("fresh")
            .with_created_to_started_timeout_secs(3600)
            .build();

        let repo = Arc::new(MockTaskRepository::with_tasks(vec![stale.clone(), fresh]));
        let (callback, seen) = collecting_callback();
        let daemon = ExpiringDaemon::new(repo.clone(), callback);

        daemon.tick().await.unwrap();
        {
            let seen = seen.lock().unwrap();
            assert_eq!(seen.len(), 1);
            assert_eq!(seen[0].id, stale.id);
            assert_eq!(seen[0].state, TaskState::Expired);
        }

        // 第二轮不会重复过期同一任务
        daemon.tick().await.unwrap();
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_heartbeat_staves_off_expiry() {
        let started = TaskBuilder::new()
            .with_name("beating")
            .with_state(TaskState::Started)
            .with_heartbeat_timeout_secs(60)
            .with_last_heartbeat_at(Utc::now())
            .build();

        let repo = Arc::new(MockTaskRepository::with_tasks(vec![started]));
        let (callback, seen) = collecting_callback();
        let daemon = ExpiringDaemon::new(repo, callback);

        daemon.tick().await.unwrap();
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_started_task_with_stale_heartbeat_expires() {
        let stalled = TaskBuilder::new()
            .with_name("stalled")
            .with_state(TaskState::Started)
            .with_heartbeat_timeout_secs(30)
            .with_last_heartbeat_at(Utc::now() - ChronoDuration::seconds(90))
            .build();

        let repo = Arc::new(MockTaskRepository::with_tasks(vec![stalled.clone()]));
        let (callback, seen) = collecting_callback();
        let daemon = ExpiringDaemon::new(repo, callback);

        daemon.tick().await.unwrap();
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].id, stalled.id);
    }

    #[tokio::test]
    async fn test_repository_error_propagates() {
        let repo = Arc::new(MockTaskRepository::new());
        repo.set_fail_expire(true);

        let (callback, seen) = collecting_callback();
        let daemon = ExpiringDaemon::new(repo, callback);

        assert!(daemon.tick().await.is_err());
        assert!(seen.lock().unwrap().is_empty());
    }
}
