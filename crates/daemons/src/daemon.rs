use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::{error, info};

use orchestrator_errors::{SchedulerError, SchedulerResult};

/// 单次节拍的工作单元。具体守护进程以组合方式提供实现，
/// 要求幂等：一轮失败后下一轮重跑必须是安全的。
#[async_trait]
pub trait TickWorker: Send + Sync {
    async fn tick(&self) -> SchedulerResult<()>;
}

pub type ErrorCallback = Arc<dyn Fn(&SchedulerError) + Send + Sync>;

/// 固定节拍的守护进程循环：等待一个间隔，执行一次 tick，周而复始。
/// 单轮失败只记录并上报，不会终止循环；关闭信号在节拍之间生效，
/// 进行中的一轮允许执行完毕。
pub struct Daemon {
    name: String,
    tick_interval: Duration,
    worker: Arc<dyn TickWorker>,
    on_error: ErrorCallback,
}

impl Daemon {
    pub fn new(
        name: impl Into<String>,
        tick_interval: Duration,
        worker: Arc<dyn TickWorker>,
        on_error: ErrorCallback,
    ) -> Self {
        Self {
            name: name.into(),
            tick_interval,
            worker,
            on_error,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn run(&self, mut shutdown_rx: broadcast::Receiver<()>) {
        info!(
            "守护进程 {} 启动，节拍间隔 {:?}",
            self.name, self.tick_interval
        );

        // 先等待一个完整间隔再执行第一轮
        let start = tokio::time::Instant::now() + self.tick_interval;
        let mut interval = tokio::time::interval_at(start, self.tick_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.worker.tick().await {
                        error!("守护进程 {} 本轮执行失败: {}", self.name, e);
                        (self.on_error)(&e);
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("守护进程 {} 收到关闭信号", self.name);
                    break;
                }
            }
        }

        info!("守护进程 {} 已停止", self.name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingWorker {
        ticks: AtomicUsize,
    }

    #[async_trait]
    impl TickWorker for CountingWorker {
        async fn tick(&self) -> SchedulerResult<()> {
            self.ticks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingWorker;

    #[async_trait]
    impl TickWorker for FailingWorker {
        async fn tick(&self) -> SchedulerResult<()> {
            Err(SchedulerError::database_error("模拟的数据库故障"))
        }
    }

    struct SlowWorker {
        started: AtomicUsize,
        finished: AtomicUsize,
    }

    #[async_trait]
    impl TickWorker for SlowWorker {
        async fn tick(&self) -> SchedulerResult<()> {
            self.started.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(100)).await;
            self.finished.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn noop_error_callback() -> ErrorCallback {
        Arc::new(|_| {})
    }

    #[tokio::test]
    async fn test_daemon_ticks_repeatedly() {
        let worker = Arc::new(CountingWorker {
            ticks: AtomicUsize::new(0),
        });
        let daemon = Daemon::new(
            "Counting",
            Duration::from_millis(10),
            worker.clone(),
            noop_error_callback(),
        );

        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(async move { daemon.run(rx).await });

        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(()).unwrap();
        handle.await.unwrap();

        // 100ms 内 10ms 的节拍至少应该走若干轮
        assert!(worker.ticks.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test]
    async fn test_daemon_waits_one_interval_before_first_tick() {
        let worker = Arc::new(CountingWorker {
            ticks: AtomicUsize::new(0),
        });
        let daemon = Daemon::new(
            "Counting",
            Duration::from_millis(200),
            worker.clone(),
            noop_error_callback(),
        );

        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(async move { daemon.run(rx).await });

        // 第一个间隔尚未到期，不应执行任何一轮
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(worker.ticks.load(Ordering::SeqCst), 0);

        tx.send(()).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_failed_tick_is_isolated_and_reported() {
        let errors = Arc::new(AtomicUsize::new(0));
        let errors_clone = errors.clone();
        let on_error: ErrorCallback = Arc::new(move |e| {
            assert!(e.is_retryable());
            errors_clone.fetch_add(1, Ordering::SeqCst);
        });

        let daemon = Daemon::new(
            "Failing",
            Duration::from_millis(10),
            Arc::new(FailingWorker),
            on_error,
        );

        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(async move { daemon.run(rx).await });

        tokio::time::sleep(Duration::from_millis(100)).await;
        tx.send(()).unwrap();
        handle.await.unwrap();

        // 每轮都失败，但循环继续并逐轮上报
        assert!(errors.load(Ordering::SeqCst) >= 3);
    }

    #[tokio::test]
    async fn test_shutdown_lets_in_flight_tick_finish() {
        let worker = Arc::new(SlowWorker {
            started: AtomicUsize::new(0),
            finished: AtomicUsize::new(0),
        });
        let daemon = Daemon::new(
            "Slow",
            Duration::from_millis(10),
            worker.clone(),
            noop_error_callback(),
        );

        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(async move { daemon.run(rx).await });

        // 等到一轮开始执行后再发关闭信号
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(worker.started.load(Ordering::SeqCst) >= 1);
        tx.send(()).unwrap();
        handle.await.unwrap();

        // 进行中的一轮执行完毕，没有被中途丢弃
        assert_eq!(
            worker.started.load(Ordering::SeqCst),
            worker.finished.load(Ordering::SeqCst)
        );
    }

    #[tokio::test]
    async fn test_shutdown_before_first_tick() {
        let worker = Arc::new(CountingWorker {
            ticks: AtomicUsize::new(0),
        });
        let daemon = Daemon::new(
            "Counting",
            Duration::from_secs(3600),
            worker.clone(),
            noop_error_callback(),
        );

        let (tx, rx) = broadcast::channel(1);
        let handle = tokio::spawn(async move { daemon.run(rx).await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        tx.send(()).unwrap();

        // 即便间隔很长，关闭也应及时生效
        tokio::time::timeout(Duration::from_millis(500), handle)
            .await
            .expect("守护进程未及时停止")
            .unwrap();
        assert_eq!(worker.ticks.load(Ordering::SeqCst), 0);
    }
}
