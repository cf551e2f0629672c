//! 配置管理
//!
//! 配置按层叠加：内置默认值 → 可选 TOML 文件 → 环境变量（`BLOODBANK__SECTION__KEY`）→ 命令行参数。

use anyhow::{Context, Result};
pub use bloodbank_core::utils::DEV_JWT_SECRET;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

/// 血库系统完整配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct BloodBankConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub assistant: AssistantConfig,
    pub inventory: InventoryConfig,
    pub web: WebConfig,
    pub logging: LoggingConfig,
}

/// 服务器配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 服务器名称
    pub name: String,
    /// 监听主机
    pub host: String,
    /// 监听端口
    pub port: u16,
}

/// 数据库配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// PostgreSQL 连接串，为空时使用内存存储
    pub url: Option<String>,
    /// 最大连接数
    pub max_connections: u32,
    /// 获取连接超时（秒）
    pub acquire_timeout_secs: u64,
    /// 启动时建表
    pub run_migrations: bool,
}

/// 认证配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub jwt_secret: String,
    /// 令牌有效期（小时）
    pub token_ttl_hours: i64,
    /// 验证码有效期（分钟）
    pub otp_ttl_minutes: i64,
    /// 单个验证码允许的错误次数
    pub otp_max_attempts: u32,
    /// 注册后是否需要邮箱验证
    pub require_email_verification: bool,
}

/// 聊天助手配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssistantConfig {
    pub gemini_api_key: Option<String>,
    pub gemini_model: String,
    pub azure_endpoint: Option<String>,
    pub azure_api_key: Option<String>,
    pub azure_deployment: Option<String>,
    pub azure_api_version: String,
    /// 调用超时（秒）
    pub timeout_secs: u64,
}

/// 库存配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InventoryConfig {
    /// 低库存阈值（单位数）
    pub low_stock_threshold: usize,
    /// 临期窗口（天）
    pub expiring_days: i64,
    /// 分析窗口（天）
    pub analytics_days: i64,
    /// 过期扫描间隔（秒）
    pub expiry_sweep_interval_secs: u64,
}

/// Web服务配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    /// 启用CORS
    pub enable_cors: bool,
    /// CORS允许的源
    pub cors_allowed_origins: Vec<String>,
    /// 推送通道缓冲区大小
    pub notification_capacity: usize,
}

/// 日志配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别
    pub level: String,
    /// 日志格式：pretty 或 json
    pub format: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "BloodBank-Server".to_string(),
            host: "0.0.0.0".to_string(),
            port: 5000,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
            acquire_timeout_secs: 10,
            run_migrations: true,
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: DEV_JWT_SECRET.to_string(),
            token_ttl_hours: 24,
            otp_ttl_minutes: 10,
            otp_max_attempts: 5,
            require_email_verification: true,
        }
    }
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            gemini_model: "gemini-2.5-flash".to_string(),
            azure_endpoint: None,
            azure_api_key: None,
            azure_deployment: None,
            azure_api_version: "2024-10-21".to_string(),
            timeout_secs: 30,
        }
    }
}

impl Default for InventoryConfig {
    fn default() -> Self {
        Self {
            low_stock_threshold: 5,
            expiring_days: 7,
            analytics_days: 30,
            expiry_sweep_interval_secs: 3600,
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            enable_cors: true,
            cors_allowed_origins: vec!["*".to_string()],
            notification_capacity: 256,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// 命令行覆盖项
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database_url: Option<String>,
    pub log_level: Option<String>,
}

/// 配置管理器
#[derive(Debug)]
pub struct ConfigManager {
    config: BloodBankConfig,
    config_path: Option<String>,
    validator: ConfigValidator,
}

impl ConfigManager {
    /// 加载配置，`config_path` 为空时只使用默认值与环境变量
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let config = Self::load_config(config_path)?;

        Ok(Self {
            config,
            config_path: config_path.map(str::to_string),
            validator: ConfigValidator::new(),
        })
    }

    fn load_config(config_path: Option<&str>) -> Result<BloodBankConfig> {
        let defaults = Config::try_from(&BloodBankConfig::default())
            .context("Failed to build default configuration")?;

        let mut builder = Config::builder().add_source(defaults);
        if let Some(path) = config_path {
            builder = builder.add_source(File::with_name(path).required(true));
        }

        let settings = builder
            .add_source(
                Environment::with_prefix("BLOODBANK")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("web.cors_allowed_origins"),
            )
            .build()
            .context("Failed to load configuration sources")?;

        let config: BloodBankConfig = settings
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        match config_path {
            Some(path) => info!("Configuration loaded successfully from: {}", path),
            None => info!("Configuration loaded from defaults and environment"),
        }
        Ok(config)
    }

    pub fn config(&self) -> &BloodBankConfig {
        &self.config
    }

    pub fn into_config(self) -> BloodBankConfig {
        self.config
    }

    pub fn config_path(&self) -> Option<&str> {
        self.config_path.as_deref()
    }

    /// 应用命令行参数
    pub fn apply_overrides(&mut self, overrides: CliOverrides) {
        if let Some(host) = overrides.host {
            self.config.server.host = host;
        }
        if let Some(port) = overrides.port {
            self.config.server.port = port;
        }
        if let Some(url) = overrides.database_url {
            self.config.database.url = Some(url);
        }
        if let Some(level) = overrides.log_level {
            self.config.logging.level = level;
        }
    }

    /// 验证配置
    pub fn validate(&self) -> Result<()> {
        self.validator.validate(&self.config)?;

        if self.config.auth.jwt_secret == DEV_JWT_SECRET {
            warn!("Using the built-in development JWT secret; set BLOODBANK__AUTH__JWT_SECRET in production");
        }
        Ok(())
    }

    /// 以 TOML 格式输出当前生效的配置
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(&self.config).context("Failed to serialize configuration")
    }
}

/// 配置验证器
#[derive(Debug)]
pub struct ConfigValidator {
    validation_rules: Vec<ValidationRule>,
}

#[derive(Debug)]
struct ValidationRule {
    field_path: &'static str,
    validator: fn(&BloodBankConfig) -> bool,
    error_message: &'static str,
}

impl ConfigValidator {
    pub fn new() -> Self {
        let validation_rules = vec![
            ValidationRule {
                field_path: "server.port",
                validator: |config| config.server.port != 0,
                error_message: "Server port cannot be 0",
            },
            ValidationRule {
                field_path: "database.max_connections",
                validator: |config| config.database.max_connections != 0,
                error_message: "Database max connections cannot be 0",
            },
            ValidationRule {
                field_path: "auth.jwt_secret",
                validator: |config| !config.auth.jwt_secret.trim().is_empty(),
                error_message: "JWT secret cannot be empty",
            },
            ValidationRule {
                field_path: "auth.token_ttl_hours",
                validator: |config| config.auth.token_ttl_hours > 0,
                error_message: "Token lifetime must be positive",
            },
            ValidationRule {
                field_path: "auth.otp_ttl_minutes",
                validator: |config| config.auth.otp_ttl_minutes > 0,
                error_message: "OTP lifetime must be positive",
            },
            ValidationRule {
                field_path: "auth.otp_max_attempts",
                validator: |config| config.auth.otp_max_attempts > 0,
                error_message: "OTP attempts must be positive",
            },
            ValidationRule {
                field_path: "logging.format",
                validator: |config| matches!(config.logging.format.as_str(), "pretty" | "json"),
                error_message: "Log format must be 'pretty' or 'json'",
            },
        ];

        Self { validation_rules }
    }

    pub fn validate(&self, config: &BloodBankConfig) -> Result<()> {
        for rule in &self.validation_rules {
            if !(rule.validator)(config) {
                error!("Configuration validation failed for {}", rule.field_path);
                return Err(anyhow::anyhow!("{}: {}", rule.field_path, rule.error_message));
            }
        }

        info!("Configuration validation passed");
        Ok(())
    }
}

impl Default for ConfigValidator {
    fn default() -> Self {
        Self::new()
    }
}
