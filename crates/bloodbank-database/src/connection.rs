//! 数据库连接管理

use std::time::Duration;

use bloodbank_core::{BloodBankError, Result};
use sqlx::postgres::{PgPool, PgPoolOptions};

use crate::queries::DatabaseQueries;

/// 数据库连接池
#[derive(Debug, Clone)]
pub struct DatabasePool {
    pool: PgPool,
}

impl DatabasePool {
    /// 连接 PostgreSQL
    pub async fn connect(url: &str, max_connections: u32, acquire_timeout_secs: u64) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(acquire_timeout_secs))
            .connect(url)
            .await
            .map_err(|e| BloodBankError::Database(e.to_string()))?;

        tracing::info!("Connected to PostgreSQL (max_connections={})", max_connections);
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn queries(&self) -> DatabaseQueries<'_> {
        DatabaseQueries::new(self)
    }

    /// 建表并创建索引
    pub async fn migrate(&self) -> Result<()> {
        self.queries().create_tables().await
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}
