pub mod app_config;
pub mod validation;

pub use app_config::{AppConfig, DatabaseConfig, SchedulerConfig};
pub use validation::{ConfigValidator, ValidationUtils};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("配置验证失败: {0}")]
    Validation(String),
    #[error("配置加载失败: {0}")]
    Load(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;
