//! 生成式后端与回退策略

use std::sync::Arc;

use async_trait::async_trait;
use bloodbank_core::{BloodType, Result};
use serde::Serialize;
use tracing::{debug, warn};

use crate::intent::{classify, Intent};
use crate::reply::{build_reply, AssistantContext, ML_PER_UNIT};

/// 模板回复的提供方名称
pub const PATTERN_MATCHING: &str = "Pattern Matching";

/// 生成式 AI 后端
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    /// 展示给用户的提供方名称
    fn name(&self) -> &str;

    async fn generate(&self, system_prompt: &str, user_message: &str) -> Result<String>;
}

/// 助手回复
#[derive(Debug, Clone, Serialize)]
pub struct AssistantReply {
    pub reply: String,
    pub intent: Intent,
    pub provider: String,
}

/// 系统提示词，汇总医院实时数据
pub fn system_prompt(context: Option<&AssistantContext>) -> String {
    let data = match context {
        Some(ctx) => {
            let inventory = BloodType::ALL
                .iter()
                .map(|t| {
                    let volume = ctx.stats.blood_type_inventory.get(&t.label()).copied().unwrap_or(0);
                    format!("{}: {} units", t, volume / ML_PER_UNIT)
                })
                .collect::<Vec<_>>()
                .join(", ");

            let recent = ctx
                .transfers
                .iter()
                .take(3)
                .map(|t| {
                    format!(
                        "{} ({}ml) to {} on {}",
                        t.blood_type.map(|b| b.label()).unwrap_or_else(|| "unknown".to_string()),
                        t.volume_ml.unwrap_or(0),
                        t.patient_name.as_deref().unwrap_or("recipient"),
                        t.transfer.transfer_date.format("%Y-%m-%d")
                    )
                })
                .collect::<Vec<_>>()
                .join("; ");

            format!(
                "Current Hospital Data:\n\
                 - Total Blood Units: {}\n\
                 - Registered Donors: {}\n\
                 - Pending Requests: {}\n\
                 - Urgent Requests: {}\n\
                 - Blood Inventory: {}\n\
                 - Recent Transfers: {}\n\
                 - Recent Donations: {} in last 7 days",
                ctx.stats.total_units,
                ctx.stats.donor_count,
                ctx.stats.pending_requests,
                ctx.stats.urgent_requests,
                inventory,
                if recent.is_empty() { "No recent transfers".to_string() } else { recent },
                ctx.donor_activity.total_donations()
            )
        }
        None => "Current Hospital Data: unavailable".to_string(),
    };

    format!(
        "You are an AI assistant for a blood bank inventory management system. You help hospital staff manage blood inventory, track transfers, analyze donor activity, and ensure patient safety.\n\n\
         {}\n\n\
         Guidelines:\n\
         1. Be concise and professional\n\
         2. Prioritize patient safety in recommendations\n\
         3. Highlight critical shortages (< 5 units)\n\
         4. Suggest actionable next steps\n\
         5. Use medical terminology appropriately\n\
         6. Format responses with bullet points and sections for readability\n\n\
         Respond to the user's query with accurate, data-driven insights.",
        data
    )
}

/// 库存助手
///
/// 依次尝试已配置的生成式后端，全部失败或返回空内容时回退到模板回复。
#[derive(Clone, Default)]
pub struct Assistant {
    backends: Vec<Arc<dyn GenerativeBackend>>,
}

impl Assistant {
    pub fn new(backends: Vec<Arc<dyn GenerativeBackend>>) -> Self {
        Self { backends }
    }

    /// 只使用模板回复
    pub fn pattern_only() -> Self {
        Self::default()
    }

    /// 当前首选的提供方
    pub fn provider_name(&self) -> &str {
        self.backends.first().map(|b| b.name()).unwrap_or(PATTERN_MATCHING)
    }

    pub async fn respond(&self, message: &str, context: Option<&AssistantContext>) -> AssistantReply {
        let intent = classify(message);

        if !self.backends.is_empty() {
            let prompt = system_prompt(context);
            for backend in &self.backends {
                match backend.generate(&prompt, message).await {
                    Ok(reply) if !reply.trim().is_empty() => {
                        debug!("Assistant reply generated by {}", backend.name());
                        return AssistantReply {
                            reply,
                            intent,
                            provider: backend.name().to_string(),
                        };
                    }
                    Ok(_) => warn!("{} returned an empty reply, trying next provider", backend.name()),
                    Err(e) => warn!("{} failed: {}, trying next provider", backend.name(), e),
                }
            }
            warn!("All generative providers failed, falling back to pattern matching");
        }

        AssistantReply {
            reply: build_reply(message, context),
            intent,
            provider: PATTERN_MATCHING.to_string(),
        }
    }
}

impl std::fmt::Debug for Assistant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.backends.iter().map(|b| b.name()).collect();
        f.debug_struct("Assistant").field("backends", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bloodbank_core::BloodBankError;
    use bloodbank_workflow::{DashboardStats, DonorActivity};
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FailingBackend {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl GenerativeBackend for FailingBackend {
        fn name(&self) -> &str {
            "Failing"
        }

        async fn generate(&self, _system_prompt: &str, _user_message: &str) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(BloodBankError::ExternalService("quota exceeded".to_string()))
        }
    }

    struct EchoBackend {
        reply: String,
    }

    #[async_trait]
    impl GenerativeBackend for EchoBackend {
        fn name(&self) -> &str {
            "Echo"
        }

        async fn generate(&self, system_prompt: &str, user_message: &str) -> Result<String> {
            assert!(system_prompt.contains("blood bank"));
            Ok(format!("{}{}", self.reply, user_message))
        }
    }

    fn context() -> AssistantContext {
        AssistantContext {
            stats: DashboardStats {
                total_units: 4,
                total_volume: 1400,
                donor_count: 3,
                pending_transfers: 0,
                urgent_requests: 1,
                pending_requests: 2,
                blood_type_inventory: BTreeMap::from([("O-".to_string(), 1400)]),
            },
            transfers: vec![],
            donor_activity: DonorActivity {
                total_donors: 3,
                donations_per_day: vec![],
                recent_donations: vec![],
            },
        }
    }

    #[tokio::test]
    async fn test_pattern_only() {
        let assistant = Assistant::pattern_only();
        let ctx = context();
        let reply = assistant.respond("What's our current inventory status?", Some(&ctx)).await;
        assert_eq!(reply.provider, PATTERN_MATCHING);
        assert_eq!(reply.intent, Intent::Inventory);
        assert!(reply.reply.contains("Total Blood Units: 4"));
    }

    #[tokio::test]
    async fn test_backend_failure_falls_back() {
        let failing = Arc::new(FailingBackend { calls: AtomicUsize::new(0) });
        let assistant = Assistant::new(vec![failing.clone() as Arc<dyn GenerativeBackend>]);
        let ctx = context();

        let reply = assistant.respond("hello", Some(&ctx)).await;
        assert_eq!(failing.calls.load(Ordering::SeqCst), 1);
        assert_eq!(reply.provider, PATTERN_MATCHING);
        assert!(!reply.reply.is_empty());
    }

    #[tokio::test]
    async fn test_first_working_backend_answers() {
        let failing = Arc::new(FailingBackend { calls: AtomicUsize::new(0) });
        let echo = Arc::new(EchoBackend { reply: "AI: ".to_string() });
        let assistant = Assistant::new(vec![
            failing as Arc<dyn GenerativeBackend>,
            echo as Arc<dyn GenerativeBackend>,
        ]);
        assert_eq!(assistant.provider_name(), "Failing");

        let reply = assistant.respond("Show my recent transfers", None).await;
        assert_eq!(reply.provider, "Echo");
        assert_eq!(reply.reply, "AI: Show my recent transfers");
        assert_eq!(reply.intent, Intent::Transfers);
    }

    #[tokio::test]
    async fn test_empty_generation_falls_back() {
        let echo: Arc<dyn GenerativeBackend> = Arc::new(EchoBackend { reply: String::new() });
        let assistant = Assistant::new(vec![echo]);
        let reply = assistant.respond("   ", None).await;
        assert_eq!(reply.provider, PATTERN_MATCHING);
        assert!(reply.reply.contains("Unable to fetch real-time inventory data"));
    }

    #[test]
    fn test_system_prompt_summarises_data() {
        let ctx = context();
        let prompt = system_prompt(Some(&ctx));
        assert!(prompt.contains("Total Blood Units: 4"));
        assert!(prompt.contains("O-: 4 units"));
        assert!(prompt.contains("A+: 0 units"));
        assert!(prompt.contains("No recent transfers"));
    }

    #[tokio::test]
    async fn test_prompt_and_reply_use_same_unit_size() {
        let mut ctx = context();
        ctx.stats.blood_type_inventory.insert("B+".to_string(), 3 * ML_PER_UNIT + 10);

        let prompt = system_prompt(Some(&ctx));
        let reply = Assistant::pattern_only()
            .respond("What's our current inventory status?", Some(&ctx))
            .await;
        assert!(prompt.contains("B+: 3 units"));
        assert!(reply.reply.contains(&format!("B+: 3 units ({}ml)", 3 * ML_PER_UNIT + 10)));
    }
}
