//! 意图识别
//!
//! 规则表按优先级排列，逐条匹配，首个命中的规则决定意图；都不命中则为 `General`。

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// 聊天意图
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Transfers,
    DonorAnalytics,
    Inventory,
    Critical,
    DonorOutreach,
    Requests,
    #[serde(rename = "qa")]
    QualityAssurance,
    General,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Transfers => "transfers",
            Intent::DonorAnalytics => "donor_analytics",
            Intent::Inventory => "inventory",
            Intent::Critical => "critical",
            Intent::DonorOutreach => "donor_outreach",
            Intent::Requests => "requests",
            Intent::QualityAssurance => "qa",
            Intent::General => "general",
        }
    }
}

/// 一条识别规则
#[derive(Debug)]
pub struct IntentRule {
    pub intent: Intent,
    pub pattern: Regex,
}

static RULES: Lazy<Vec<IntentRule>> = Lazy::new(|| {
    [
        (
            Intent::Transfers,
            r"(?i)(show|list|get|view|display).*transfer|transfer.*history|recent transfer|my transfer",
        ),
        (
            Intent::DonorAnalytics,
            r"(?i)donor.*per day|donor.*daily|donor.*analysis|donor.*trend|donor.*activity|donation.*per day",
        ),
        (
            Intent::Inventory,
            r"(?i)inventory|stock|current.*level|how much|how many.*unit",
        ),
        (
            Intent::Critical,
            r"(?i)critical|shortage|low.*stock|emergency|urgent.*need",
        ),
        (
            Intent::DonorOutreach,
            r"(?i)donor.*outreach|donor.*message|donor.*template|contact.*donor",
        ),
        (
            Intent::Requests,
            r"(?i)pending.*request|blood.*request|how.*process|transfer.*step",
        ),
        (
            Intent::QualityAssurance,
            r"(?i)qa|quality|checklist|compliance|audit|procedure",
        ),
    ]
    .into_iter()
    .map(|(intent, pattern)| IntentRule {
        intent,
        pattern: Regex::new(pattern).expect("intent pattern must compile"),
    })
    .collect()
});

/// 有序规则表
pub fn rules() -> &'static [IntentRule] {
    &RULES
}

/// 识别文本意图
pub fn classify(text: &str) -> Intent {
    rules()
        .iter()
        .find(|rule| rule.pattern.is_match(text))
        .map(|rule| rule.intent)
        .unwrap_or(Intent::General)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rule_order() {
        let order: Vec<Intent> = rules().iter().map(|r| r.intent).collect();
        assert_eq!(
            order,
            vec![
                Intent::Transfers,
                Intent::DonorAnalytics,
                Intent::Inventory,
                Intent::Critical,
                Intent::DonorOutreach,
                Intent::Requests,
                Intent::QualityAssurance,
            ]
        );
    }

    #[test]
    fn test_classify_examples() {
        assert_eq!(classify("Show my recent transfers"), Intent::Transfers);
        assert_eq!(classify("What's our current inventory status?"), Intent::Inventory);
        assert_eq!(classify("Analyze donor activity per day"), Intent::DonorAnalytics);
        assert_eq!(classify("Which types face a SHORTAGE?"), Intent::Critical);
        assert_eq!(classify("Write a donor outreach email"), Intent::DonorOutreach);
        assert_eq!(classify("List all pending requests"), Intent::Requests);
        assert_eq!(classify("daily QA checklist"), Intent::QualityAssurance);
    }

    #[test]
    fn test_unmatched_is_general() {
        assert_eq!(classify(""), Intent::General);
        assert_eq!(classify("hello there"), Intent::General);
    }

    #[test]
    fn test_precedence_first_match_wins() {
        // 同时命中调拨与紧急短缺，调拨优先
        assert_eq!(classify("show transfers for the critical shortage"), Intent::Transfers);
        // "stock" 先于 "low.*stock" 命中库存规则
        assert_eq!(classify("low stock"), Intent::Inventory);
        // 献血者分析先于库存
        assert_eq!(classify("donor trend and stock"), Intent::DonorAnalytics);
    }

    #[test]
    fn test_intent_serializes_as_str() {
        for intent in rules().iter().map(|r| r.intent).chain([Intent::General]) {
            let json = serde_json::to_string(&intent).unwrap();
            assert_eq!(json, format!("\"{}\"", intent.as_str()));
        }
    }
}
