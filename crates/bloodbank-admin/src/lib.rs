//! # 血库管理模块
//!
//! 提供运维相关功能：分层配置加载与校验、日志初始化

pub mod config;
pub mod logging;

pub use config::{
    AssistantConfig, AuthConfig, BloodBankConfig, CliOverrides, ConfigManager, ConfigValidator,
    DatabaseConfig, InventoryConfig, LoggingConfig, ServerConfig, WebConfig,
};
pub use logging::{init_logging, LogFormat};
