//! 错误定义模块

use thiserror::Error;
use uuid::Uuid;

/// 血库系统统一错误类型
#[derive(Error, Debug)]
pub enum BloodBankError {
    #[error("配置错误: {0}")]
    Config(String),

    #[error("数据库错误: {0}")]
    Database(String),

    #[error("验证错误: {0}")]
    Validation(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    #[error("资源冲突: {0}")]
    Conflict(String),

    #[error("认证失败: {0}")]
    Unauthorized(String),

    #[error("权限错误: {0}")]
    Permission(String),

    #[error("邮箱尚未验证: {email}")]
    EmailNotVerified { hospital_id: Uuid, email: String },

    #[error("验证码已过期，请重新获取")]
    OtpExpired,

    #[error("没有可用的 {blood_type} 兼容血液单位")]
    NoAvailableUnits { blood_type: String },

    #[error("无效状态转换: 从 {from} 到 {event}")]
    InvalidStateTransition { from: String, event: String },

    #[error("外部服务错误: {0}")]
    ExternalService(String),

    #[error("序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO错误: {0}")]
    Io(#[from] std::io::Error),

    #[error("系统内部错误: {0}")]
    Internal(String),
}

impl BloodBankError {
    /// 是否为用户可纠正的业务条件（而非系统故障）
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            BloodBankError::Validation(_)
                | BloodBankError::NotFound(_)
                | BloodBankError::Conflict(_)
                | BloodBankError::EmailNotVerified { .. }
                | BloodBankError::OtpExpired
                | BloodBankError::NoAvailableUnits { .. }
                | BloodBankError::InvalidStateTransition { .. }
        )
    }
}

#[cfg(feature = "database")]
impl From<sqlx::Error> for BloodBankError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => BloodBankError::NotFound("row not found".to_string()),
            sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505") => {
                BloodBankError::Conflict(db_err.message().to_string())
            }
            other => BloodBankError::Database(other.to_string()),
        }
    }
}

/// 血库系统统一结果类型
pub type Result<T> = std::result::Result<T, BloodBankError>;
