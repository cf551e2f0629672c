//! 有效期计算
//!
//! 过期日期 = 采集日期 + 成分保存期。只做日历日期运算，不涉及时刻与时区。

use bloodbank_core::{BloodBankError, ComponentType, Result};
use chrono::{Duration, NaiveDate};

/// 未知成分类型按全血处理
const DEFAULT_SHELF_LIFE_DAYS: i64 = 35;

/// 成分保存期（天）
pub fn shelf_life_days(component: &str) -> i64 {
    ComponentType::from_label(component)
        .map(|c| c.shelf_life_days())
        .unwrap_or(DEFAULT_SHELF_LIFE_DAYS)
}

/// 计算血液单位的过期日期
pub fn calculate_expiry(component: &str, collection_date: NaiveDate) -> NaiveDate {
    collection_date + Duration::days(shelf_life_days(component))
}

/// 解析 `YYYY-MM-DD` 格式的采集日期
pub fn parse_collection_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d").map_err(|_| {
        BloodBankError::Validation(format!("Invalid date '{}', expected YYYY-MM-DD", value))
    })
}

/// 距离过期的天数，已过期为负数
pub fn days_until_expiry(expiry_date: NaiveDate, today: NaiveDate) -> i64 {
    (expiry_date - today).num_days()
}

/// 过期日当天仍可使用，次日起视为过期
pub fn is_expired(expiry_date: NaiveDate, today: NaiveDate) -> bool {
    today > expiry_date
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_shelf_life_table() {
        assert_eq!(shelf_life_days("Whole Blood"), 35);
        assert_eq!(shelf_life_days("Red Blood Cells"), 42);
        assert_eq!(shelf_life_days("Platelets"), 5);
        assert_eq!(shelf_life_days("Fresh Frozen Plasma"), 365);
        assert_eq!(shelf_life_days("Cryoprecipitate"), 365);
        assert_eq!(shelf_life_days("Granulocytes"), 35);
    }

    #[test]
    fn test_known_expiry_dates() {
        assert_eq!(calculate_expiry("Platelets", date(2025, 1, 1)), date(2025, 1, 6));
        assert_eq!(calculate_expiry("Whole Blood", date(2025, 1, 1)), date(2025, 2, 5));
        assert_eq!(calculate_expiry("Red Blood Cells", date(2025, 6, 1)), date(2025, 7, 13));
        // 跨闰年
        assert_eq!(calculate_expiry("Fresh Frozen Plasma", date(2024, 1, 1)), date(2024, 12, 31));
    }

    #[test]
    fn test_parse_collection_date() {
        assert_eq!(parse_collection_date("2025-06-01").unwrap(), date(2025, 6, 1));
        assert!(parse_collection_date("06/01/2025").is_err());
        assert!(parse_collection_date("2025-02-30").is_err());
    }

    #[test]
    fn test_expiry_boundaries() {
        let expiry = date(2025, 1, 6);
        assert!(!is_expired(expiry, date(2025, 1, 6)));
        assert!(is_expired(expiry, date(2025, 1, 7)));
        assert_eq!(days_until_expiry(expiry, date(2025, 1, 1)), 5);
        assert_eq!(days_until_expiry(expiry, date(2025, 1, 8)), -2);
    }

    proptest! {
        #[test]
        fn prop_expiry_is_deterministic(offset in 0i64..20_000, idx in 0usize..6) {
            let components = ["Whole Blood", "Red Blood Cells", "Platelets", "Fresh Frozen Plasma", "Cryoprecipitate", "Other"];
            let collected = date(2000, 1, 1) + Duration::days(offset);
            let first = calculate_expiry(components[idx], collected);
            prop_assert_eq!(first, calculate_expiry(components[idx], collected));
            prop_assert_eq!(days_until_expiry(first, collected), shelf_life_days(components[idx]));
        }
    }
}
