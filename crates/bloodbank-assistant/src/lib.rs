//! # 血库库存助手
//!
//! 聊天助手由三部分组成：
//! - 意图识别：按固定优先级排列的正则规则表，首个命中者胜出
//! - 模板回复：基于医院实时数据生成 Markdown 回复
//! - 生成式后端：配置后优先调用，失败时回退到模板回复

pub mod intent;
pub mod provider;
pub mod reply;

pub use intent::{classify, rules, Intent, IntentRule};
pub use provider::{system_prompt, Assistant, AssistantReply, GenerativeBackend, PATTERN_MATCHING};
pub use reply::{build_reply, AssistantContext};
