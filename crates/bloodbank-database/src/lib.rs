//! # 血库数据库模块
//!
//! 负责医院、献血者、血液单位、用血请求和调拨记录的持久化。
//! 业务层只依赖 [`BloodBankStore`] 接口，生产环境使用 PostgreSQL，开发与测试使用内存实现。

pub mod connection;
pub mod memory;
pub mod models;
pub mod queries;
pub mod store;

// 重新导出主要类型
pub use connection::DatabasePool;
pub use memory::MemoryStore;
pub use models::*;
pub use queries::DatabaseQueries;
pub use store::BloodBankStore;
