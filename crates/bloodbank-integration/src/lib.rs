//! # 血库集成模块
//!
//! 提供与外部系统的集成功能，包括：
//! - 按医院隔离的实时推送通知中心
//! - Webhook事件通知，带签名的 JSON 推送
//! - 生成式 AI 提供方（Google Gemini、Azure OpenAI）

pub mod ai;
pub mod notifications;
pub mod webhook;

pub use ai::{backends_from_settings, AiSettings, AzureOpenAiBackend, GeminiBackend};
pub use notifications::{HospitalSubscription, Notification, NotificationHub, NotificationKind};
pub use webhook::{WebhookEvent, WebhookManager, WebhookSubscription, WebhookSubscriptionRequest};
