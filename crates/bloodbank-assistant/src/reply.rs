//! 模板回复
//!
//! 未配置生成式后端或后端失败时使用。回复一定非空。

use bloodbank_core::{BloodType, TransferDetails};
use bloodbank_workflow::{DashboardStats, DonorActivity};

use crate::intent::{classify, Intent};

/// 按单位折算体积（ml）
pub(crate) const ML_PER_UNIT: i64 = 350;
const CRITICAL_UNITS: i64 = 5;
const LOW_UNITS: i64 = 20;
const RECENT_TRANSFERS: usize = 5;

const NO_DATA: &str =
    "Unable to fetch real-time inventory data. Please check your connection and try again.";

/// 回复所需的医院实时数据
#[derive(Debug, Clone)]
pub struct AssistantContext {
    pub stats: DashboardStats,
    /// 新调拨在前
    pub transfers: Vec<TransferDetails>,
    pub donor_activity: DonorActivity,
}

/// 某血型的库存水平分级
struct StockLevels {
    critical: Vec<String>,
    low: Vec<String>,
    stable: Vec<String>,
}

impl StockLevels {
    fn from_stats(stats: &DashboardStats) -> Self {
        let mut levels = StockLevels { critical: Vec::new(), low: Vec::new(), stable: Vec::new() };

        for blood_type in BloodType::ALL {
            let label = blood_type.label();
            let volume = stats.blood_type_inventory.get(&label).copied().unwrap_or(0);
            let line = format!("{}: {} units ({}ml)", label, volume / ML_PER_UNIT, volume);
            if volume < CRITICAL_UNITS * ML_PER_UNIT {
                levels.critical.push(line);
            } else if volume < LOW_UNITS * ML_PER_UNIT {
                levels.low.push(line);
            } else {
                levels.stable.push(line);
            }
        }
        levels
    }
}

/// 千位分隔
fn group_thousands(value: i64) -> String {
    let digits = value.unsigned_abs().to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    if value < 0 {
        out.insert(0, '-');
    }
    out
}

fn transfers_reply(transfers: &[TransferDetails]) -> String {
    if transfers.is_empty() {
        return "📦 **No Transfer History**\n\nYou haven't made any blood transfers yet. Transfers are created when you fulfill blood requests from other hospitals or patients.".to_string();
    }

    let recent = &transfers[..transfers.len().min(RECENT_TRANSFERS)];
    let mut blocks = vec![format!("📦 **Recent Transfers (Last {})**\n", recent.len())];

    for (idx, t) in recent.iter().enumerate() {
        let blood_type = t.blood_type.map(|b| b.label()).unwrap_or_else(|| "Unknown".to_string());
        let recipient = t.patient_name.as_deref().unwrap_or("N/A");
        let urgency = t
            .urgency
            .map(|u| format!("[{}]", u.as_str().to_uppercase()))
            .unwrap_or_default();
        blocks.push(format!(
            "{}. **{}** - {}ml\n   To: {} {}\n   Date: {}\n   Blood ID: {}",
            idx + 1,
            blood_type,
            t.volume_ml.unwrap_or(0),
            recipient,
            urgency,
            t.transfer.transfer_date.format("%Y-%m-%d"),
            t.transfer.blood_id
        ));
    }

    let total_volume: i64 = transfers.iter().map(|t| i64::from(t.volume_ml.unwrap_or(0))).sum();
    blocks.push(format!(
        "\n**Total Transfers:** {}\n**Total Volume Transferred:** {}ml",
        transfers.len(),
        group_thousands(total_volume)
    ));
    blocks.join("\n\n")
}

fn donor_analytics_reply(activity: &DonorActivity) -> String {
    let mut blocks = vec![format!(
        "📊 **Donor Activity Analysis**\n\n**Total Registered Donors:** {}",
        activity.total_donors
    )];

    let total = activity.total_donations();
    if total > 0 {
        blocks.push("\n**Donations Per Day (Last 7 Days):**".to_string());
        for day in &activity.donations_per_day {
            blocks.push(format!(
                "• {}: {} donation{}",
                day.date.format("%b %-d"),
                day.count,
                if day.count == 1 { "" } else { "s" }
            ));
        }
        blocks.push(format!("\n**Average:** {:.1} donations/day", activity.average_per_day()));
    } else {
        blocks.push("\n⚠️ No donation activity in the last 7 days.".to_string());
    }

    if !activity.recent_donations.is_empty() {
        blocks.push("\n**Recent Donors (Last 5):**".to_string());
        for (idx, donation) in activity.recent_donations.iter().enumerate() {
            blocks.push(format!(
                "{}. {} ({}) - {}",
                idx + 1,
                donation.donor_name,
                donation.blood_type,
                donation.collection_date.format("%Y-%m-%d")
            ));
        }
    }

    blocks.push("\n💡 **Insights:**".to_string());
    if total < 5 {
        blocks.push("• Consider organizing a donor drive to increase donations".to_string());
    } else if total > 20 {
        blocks.push("• Excellent donor engagement! Keep up the momentum".to_string());
    } else {
        blocks.push("• Donation volume is steady; keep scheduling regular drives".to_string());
    }

    blocks.join("\n\n")
}

/// 生成模板回复
///
/// 没有上下文数据时返回无法获取数据的提示。
pub fn build_reply(prompt: &str, context: Option<&AssistantContext>) -> String {
    let Some(context) = context else {
        return NO_DATA.to_string();
    };

    let intent = classify(prompt);
    match intent {
        Intent::Transfers => return transfers_reply(&context.transfers),
        Intent::DonorAnalytics => return donor_analytics_reply(&context.donor_activity),
        _ => {}
    }

    let text = prompt.to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| text.contains(w));
    let stats = &context.stats;
    let levels = StockLevels::from_stats(stats);
    let mut blocks: Vec<String> = Vec::new();

    if intent == Intent::Inventory || has(&["inventory", "stock", "status", "current"]) {
        blocks.push(format!(
            "📊 **Current Inventory Overview:**\n• Total Blood Units: {}\n• Total Volume: {}ml\n• Registered Donors: {}",
            stats.total_units,
            group_thousands(stats.total_volume),
            stats.donor_count
        ));
        if !levels.critical.is_empty() {
            blocks.push(format!("🚨 **CRITICAL Levels:**\n{}", levels.critical.join("\n")));
        }
        if !levels.low.is_empty() {
            blocks.push(format!("⚠️ **Low Stock:**\n{}", levels.low.join("\n")));
        }
        if levels.critical.is_empty() && levels.low.is_empty() && !levels.stable.is_empty() {
            blocks.push(format!(
                "✅ **All blood types are at healthy levels!**\n{}",
                levels.stable.iter().take(3).cloned().collect::<Vec<_>>().join("\n")
            ));
        }
        blocks.push(format!(
            "📋 **Action Items:**\n• Pending Requests: {}\n• Urgent Requests: {}\n• Pending Transfers: {}",
            stats.pending_requests, stats.urgent_requests, stats.pending_transfers
        ));
    }

    if intent == Intent::Critical || has(&["critical", "shortage", "low"]) {
        if !levels.critical.is_empty() {
            blocks.push(format!(
                "🚨 **CRITICAL Blood Type Shortages:**\n{}\n\n**Immediate Actions Needed:**\n1. Activate emergency donor outreach\n2. Contact nearby hospitals for transfer\n3. Postpone non-urgent procedures requiring these types",
                levels.critical.join("\n")
            ));
        } else if !levels.low.is_empty() {
            blocks.push(format!(
                "⚠️ **Low Stock Alerts:**\n{}\n\n**Recommended Actions:**\n1. Schedule donor drives for these blood types\n2. Monitor daily usage closely\n3. Prepare transfer requests if levels drop further",
                levels.low.join("\n")
            ));
        } else {
            blocks.push("✅ **Good News!** All blood types are currently at healthy levels. No critical shortages detected.".to_string());
        }
    }

    if intent == Intent::DonorOutreach || has(&["donor", "outreach"]) {
        let urgent: Vec<&String> = levels.critical.iter().chain(levels.low.iter()).collect();
        if let Some(first) = urgent.first() {
            let subject = if urgent.len() > 1 {
                "Your Blood Type".to_string()
            } else {
                first.split(':').next().unwrap_or("Your Blood Type").to_string()
            };
            let listed = urgent.iter().take(3).map(|s| s.as_str()).collect::<Vec<_>>().join("\n");
            blocks.push(format!(
                "📧 **Donor Outreach Template:**\n\nSubject: Urgent: Help Save Lives - We Need {}\n\nDear Donor,\n\nOur hospital currently faces critical shortages in the following blood types:\n{}\n\nYour donation could save lives today. We have appointment slots available:\n• Walk-in: Monday-Friday, 8 AM - 6 PM\n• Schedule: Call (XXX) XXX-XXXX or visit our portal\n\nDonation takes just 20 minutes and one unit can save up to 3 lives.\n\nThank you for your lifesaving support!\n\nBest regards,\nBlood Bank Team",
                subject, listed
            ));
        } else {
            blocks.push(format!(
                "📧 **Donor Appreciation Template:**\n\nSubject: Thank You - Our Blood Bank is Healthy!\n\nDear Valued Donor,\n\nThanks to generous donors like you, we currently have healthy stock levels across all blood types ({} units).\n\nWe encourage you to schedule your next donation to maintain this positive status.\n\nThank you for being a lifesaver!",
                stats.total_units
            ));
        }
    }

    if intent == Intent::Requests || has(&["transfer", "hospital", "request"]) {
        blocks.push(format!(
            "📦 **Transfer & Request Overview:**\n• Pending Blood Requests: {}\n• Urgent Requests: {}\n• Pending Transfers: {}\n\n**How to Process:**\n1. Navigate to Dashboard → Transfers/Requests\n2. Review request details and patient urgency\n3. Check inventory availability\n4. Approve or arrange inter-hospital transfer\n5. Confirm courier and tracking info",
            stats.pending_requests, stats.urgent_requests, stats.pending_transfers
        ));
    }

    if intent == Intent::QualityAssurance || has(&["qa", "checklist", "quality", "compliance"]) {
        blocks.push(format!(
            "✅ **Daily QA Checklist:**\n\n**Morning (8 AM):**\n1. Verify cold-chain temperature logs (2-6°C)\n2. Check expiry dates - rotate stock ({} units to review)\n3. Reconcile overnight transactions\n\n**Midday (12 PM):**\n4. Review pending requests ({} pending)\n5. Confirm serology test results\n6. Update inventory system\n\n**Evening (6 PM):**\n7. Validate all transfers logged\n8. Quarantine expired/rejected units\n9. Export daily audit trail\n10. Prepare next day's donor schedule",
            stats.total_units, stats.pending_requests
        ));
    }

    if has(&["help", "what can", "how"]) {
        blocks.push("🤖 **I'm an AI-Powered Inventory Assistant**\n\n📊 **Real-Time Data Analysis:**\n• Current inventory levels by blood type\n• Critical shortage alerts\n• Pending requests and transfers\n• Transfer history and tracking\n• Donor activity analytics\n\n📝 **Natural Language Understanding:**\nJust ask me naturally! I understand questions like:\n• \"Show my recent transfers\"\n• \"Analyze donor activity per day\"\n• \"What's our O- status?\"\n• \"List all pending requests\"\n\n💡 **Templates & Guidance:**\n• Donor outreach messages\n• Transfer procedures\n• Quality assurance checklists\n\n🔍 **Try asking:**\n\"Show my last 5 transfers\"\n\"How many donors donated this week?\"\n\"What blood types are critically low?\"".to_string());
    }

    if blocks.is_empty() {
        blocks.push(format!(
            "I'm an AI-powered assistant with natural language understanding. I can analyze your hospital's real-time data and answer questions naturally.\n\n**Try asking:**\n• \"Show my recent transfers\"\n• \"Analyze donor activity this week\"\n• \"What's our inventory status?\"\n• \"Which blood types are critical?\"\n\n**Current Stats:** {} units | {} donors | {} pending requests",
            stats.total_units, stats.donor_count, stats.pending_requests
        ));
    }

    blocks.join("\n\n")
}
