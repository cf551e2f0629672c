//! 通用工具函数

use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;

/// 开发环境默认的 JWT 密钥，生产环境必须覆盖
pub const DEV_JWT_SECRET: &str = "bloodbank-dev-secret-change-me";

/// 生成血液单位编号，形如 `BLD-20250601-1A2B3C4D`
pub fn generate_blood_id(collection_date: NaiveDate) -> String {
    let suffix = Uuid::new_v4().simple().to_string()[..8].to_ascii_uppercase();
    format!("BLD-{}-{}", collection_date.format("%Y%m%d"), suffix)
}

/// 验证血液单位编号格式
pub fn is_valid_blood_id(blood_id: &str) -> bool {
    let parts: Vec<&str> = blood_id.split('-').collect();
    parts.len() == 3
        && parts[0] == "BLD"
        && parts[1].len() == 8
        && parts[1].chars().all(|c| c.is_ascii_digit())
        && parts[2].len() == 8
        && parts[2].chars().all(|c| c.is_ascii_hexdigit())
}

/// 时钟抽象，业务逻辑通过它获取“今天”，便于测试固定日期
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// 系统时钟
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// 固定日期时钟（测试与数据回放）
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    today: NaiveDate,
}

impl FixedClock {
    pub fn new(today: NaiveDate) -> Self {
        Self { today }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.today.and_hms_opt(12, 0, 0).unwrap_or_default().and_utc()
    }

    fn today(&self) -> NaiveDate {
        self.today
    }
}
