use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),
    #[error("数据库操作错误: {0}")]
    DatabaseOperation(String),
    #[error("任务未找到: {id}")]
    TaskNotFound { id: Uuid },
    #[error("调度计划未找到: {id}")]
    ScheduleNotFound { id: Uuid },
    #[error("无效的任务状态转换: {from} -> {to}")]
    InvalidTaskTransition { from: String, to: String },
    #[error("无效的调度计划状态转换: {from} -> {to}")]
    InvalidScheduleTransition { from: String, to: String },
    #[error("序列化错误: {0}")]
    Serialization(String),
    #[error("配置错误: {0}")]
    Configuration(String),
    #[error("内部错误: {0}")]
    Internal(String),
}

pub type SchedulerResult<T> = Result<T, SchedulerError>;

impl SchedulerError {
    pub fn database_error<S: Into<String>>(msg: S) -> Self {
        Self::DatabaseOperation(msg.into())
    }
    pub fn task_not_found(id: Uuid) -> Self {
        Self::TaskNotFound { id }
    }
    pub fn schedule_not_found(id: Uuid) -> Self {
        Self::ScheduleNotFound { id }
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SchedulerError::Database(_) | SchedulerError::DatabaseOperation(_)
        )
    }
}

impl From<serde_json::Error> for SchedulerError {
    fn from(err: serde_json::Error) -> Self {
        SchedulerError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for SchedulerError {
    fn from(err: anyhow::Error) -> Self {
        SchedulerError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let id = Uuid::new_v4();
        let err = SchedulerError::task_not_found(id);
        assert_eq!(err.to_string(), format!("任务未找到: {id}"));

        let err = SchedulerError::InvalidTaskTransition {
            from: "SUCCEEDED".to_string(),
            to: "STARTED".to_string(),
        };
        assert_eq!(err.to_string(), "无效的任务状态转换: SUCCEEDED -> STARTED");
    }

    #[test]
    fn test_is_retryable() {
        assert!(SchedulerError::database_error("connection reset").is_retryable());
        assert!(SchedulerError::Database(sqlx::Error::PoolTimedOut).is_retryable());
        assert!(!SchedulerError::config_error("bad url").is_retryable());
        assert!(!SchedulerError::task_not_found(Uuid::new_v4()).is_retryable());
    }

    #[test]
    fn test_from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: SchedulerError = json_err.into();
        assert!(matches!(err, SchedulerError::Serialization(_)));
    }
}
