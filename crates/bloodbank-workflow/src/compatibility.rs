//! 血型相容性
//!
//! 受血者血型 -> 可安全输注的献血者血型集合

use bloodbank_core::{AboGroup, BloodType, RhFactor};

const AB_POS_DONORS: [BloodType; 8] = BloodType::ALL;
const AB_NEG_DONORS: [BloodType; 4] = [
    BloodType::A_NEG,
    BloodType::B_NEG,
    BloodType::AB_NEG,
    BloodType::O_NEG,
];
const A_POS_DONORS: [BloodType; 4] = [
    BloodType::A_POS,
    BloodType::A_NEG,
    BloodType::O_POS,
    BloodType::O_NEG,
];
const A_NEG_DONORS: [BloodType; 2] = [BloodType::A_NEG, BloodType::O_NEG];
const B_POS_DONORS: [BloodType; 4] = [
    BloodType::B_POS,
    BloodType::B_NEG,
    BloodType::O_POS,
    BloodType::O_NEG,
];
const B_NEG_DONORS: [BloodType; 2] = [BloodType::B_NEG, BloodType::O_NEG];
const O_POS_DONORS: [BloodType; 2] = [BloodType::O_POS, BloodType::O_NEG];
const O_NEG_DONORS: [BloodType; 1] = [BloodType::O_NEG];

/// 受血者可接受的献血者血型
///
/// AB+ 为万能受血者；O- 只能接受 O-。
pub fn compatible_donor_types(recipient: BloodType) -> &'static [BloodType] {
    match (recipient.group, recipient.rh) {
        (AboGroup::AB, RhFactor::Positive) => &AB_POS_DONORS,
        (AboGroup::AB, RhFactor::Negative) => &AB_NEG_DONORS,
        (AboGroup::A, RhFactor::Positive) => &A_POS_DONORS,
        (AboGroup::A, RhFactor::Negative) => &A_NEG_DONORS,
        (AboGroup::B, RhFactor::Positive) => &B_POS_DONORS,
        (AboGroup::B, RhFactor::Negative) => &B_NEG_DONORS,
        (AboGroup::O, RhFactor::Positive) => &O_POS_DONORS,
        (AboGroup::O, RhFactor::Negative) => &O_NEG_DONORS,
    }
}

/// 以标签形式查询相容血型
///
/// 无法识别的血型只与自身相容，返回 `[recipient]`。
pub fn compatible_donor_labels(recipient: &str) -> Vec<String> {
    match recipient.parse::<BloodType>() {
        Ok(blood_type) => compatible_donor_types(blood_type)
            .iter()
            .map(BloodType::label)
            .collect(),
        Err(_) => {
            tracing::debug!("Unrecognised recipient blood type '{}', using same-type only", recipient);
            vec![recipient.to_string()]
        }
    }
}

/// 判断献血者血型能否输给受血者
pub fn can_receive(recipient: BloodType, donor: BloodType) -> bool {
    compatible_donor_types(recipient).contains(&donor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn labels(recipient: &str) -> BTreeSet<String> {
        compatible_donor_labels(recipient).into_iter().collect()
    }

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_canonical_table() {
        assert_eq!(labels("AB+"), set(&["A+", "A-", "B+", "B-", "AB+", "AB-", "O+", "O-"]));
        assert_eq!(labels("AB-"), set(&["A-", "B-", "AB-", "O-"]));
        assert_eq!(labels("A+"), set(&["A+", "A-", "O+", "O-"]));
        assert_eq!(labels("A-"), set(&["A-", "O-"]));
        assert_eq!(labels("B+"), set(&["B+", "B-", "O+", "O-"]));
        assert_eq!(labels("B-"), set(&["B-", "O-"]));
        assert_eq!(labels("O+"), set(&["O+", "O-"]));
        assert_eq!(labels("O-"), set(&["O-"]));
    }

    #[test]
    fn test_unknown_type_falls_back_to_itself() {
        assert_eq!(compatible_donor_labels("Bombay"), vec!["Bombay".to_string()]);
        assert_eq!(compatible_donor_labels(""), vec![String::new()]);
    }

    #[test]
    fn test_can_receive() {
        assert!(can_receive(BloodType::AB_POS, BloodType::O_NEG));
        assert!(can_receive(BloodType::A_POS, BloodType::O_POS));
        assert!(!can_receive(BloodType::O_NEG, BloodType::O_POS));
        assert!(!can_receive(BloodType::A_NEG, BloodType::B_NEG));
    }

    fn any_blood_type() -> impl Strategy<Value = BloodType> {
        prop::sample::select(BloodType::ALL.to_vec())
    }

    proptest! {
        #[test]
        fn prop_self_and_o_negative_always_compatible(recipient in any_blood_type()) {
            prop_assert!(can_receive(recipient, recipient));
            prop_assert!(can_receive(recipient, BloodType::O_NEG));
        }

        #[test]
        fn prop_rh_negative_recipient_never_gets_positive(recipient in any_blood_type(), donor in any_blood_type()) {
            if recipient.rh == RhFactor::Negative && donor.rh == RhFactor::Positive {
                prop_assert!(!can_receive(recipient, donor));
            }
        }

        #[test]
        fn prop_abo_antigens_respected(recipient in any_blood_type(), donor in any_blood_type()) {
            let has_a = |g: AboGroup| matches!(g, AboGroup::A | AboGroup::AB);
            let has_b = |g: AboGroup| matches!(g, AboGroup::B | AboGroup::AB);
            if can_receive(recipient, donor) {
                prop_assert!(!has_a(donor.group) || has_a(recipient.group));
                prop_assert!(!has_b(donor.group) || has_b(recipient.group));
            }
        }
    }
}
