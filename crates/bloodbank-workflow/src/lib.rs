//! # 血库业务流程模块
//!
//! 提供血库的核心业务规则，包括：
//! - 血型相容性：根据受血者血型给出可安全输注的献血者血型
//! - 有效期计算：按成分类型的保存期推算血液单位的过期日期
//! - 调拨候选筛选：为用血请求列出可供人工挑选的在库血液单位
//! - 请求状态机：管理用血请求的完整生命周期
//! - 库存统计：看板统计、低库存、临期与趋势分析

pub mod allocation;
pub mod compatibility;
pub mod expiry;
pub mod inventory;
pub mod state_machine;

// 重新导出主要类型
pub use allocation::{candidates_for_types, transfer_candidates, validate_selection};
pub use compatibility::{can_receive, compatible_donor_labels, compatible_donor_types};
pub use expiry::{calculate_expiry, days_until_expiry, is_expired, parse_collection_date, shelf_life_days};
pub use inventory::{
    AnalyticsReport, DailyDonations, DashboardStats, DonorActivity, ExpiringUnit, InventorySnapshot,
    LowStockItem, ProfileStats, RecentDonation,
};
pub use state_machine::{RequestEvent, RequestStateMachine};
