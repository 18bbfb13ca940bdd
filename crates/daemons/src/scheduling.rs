use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, error, info, instrument};

use orchestrator_domain::{entities::SchedulingTick, repositories::SchedulingStore};
use orchestrator_errors::SchedulerResult;

use crate::daemon::TickWorker;
use crate::TaskCallback;

/// 抢锁失败后的固定退避，竞争是设计内的常态而非故障
const LOCK_CONTENTION_BACKOFF: Duration = Duration::from_secs(1);

/// 调度守护进程：每轮在单个事务里抢集群级咨询锁，
/// 把到期的调度计划物化为任务，并在事务提交后逐个回调。
pub struct SchedulingDaemon {
    store: Arc<dyn SchedulingStore>,
    on_scheduling: TaskCallback,
    contention_backoff: Duration,
}

impl SchedulingDaemon {
    pub fn new(store: Arc<dyn SchedulingStore>, on_scheduling: TaskCallback) -> Self {
        Self {
            store,
            on_scheduling,
            contention_backoff: LOCK_CONTENTION_BACKOFF,
        }
    }

    /// 测试用：缩短竞争退避
    pub fn with_contention_backoff(mut self, backoff: Duration) -> Self {
        self.contention_backoff = backoff;
        self
    }
}

#[async_trait]
impl TickWorker for SchedulingDaemon {
    #[instrument(name = "scheduling_tick", skip(self))]
    async fn tick(&self) -> SchedulerResult<()> {
        match self.store.schedule_due_tasks().await? {
            SchedulingTick::LockNotGranted => {
                debug!("调度锁被其它实例持有，本轮跳过");
                tokio::time::sleep(self.contention_backoff).await;
            }
            SchedulingTick::Completed { created, failures } => {
                for failure in &failures {
                    error!(
                        "调度计划 {} ({}) 派生任务失败: {}",
                        failure.schedule_name, failure.schedule_id, failure.error
                    );
                }
                if !created.is_empty() {
                    info!("本轮派生 {} 个任务", created.len());
                }
                // 事务已提交，此时回调才是安全的
                for task in created {
                    (self.on_scheduling)(task);
                }
            }
        }
        Ok(())
    }
}
