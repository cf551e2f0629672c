//! 调拨候选筛选
//!
//! 列出可满足用血请求的在库血液单位，由操作人员最终选定。
//! 结果按过期日期升序排列以便人工执行先到期先出（FEFO），系统不做自动挑选。

use std::collections::HashSet;

use bloodbank_core::{BloodBankError, BloodRequest, Donation, DonationStatus, RequestStatus, Result};
use chrono::NaiveDate;

use crate::compatibility::compatible_donor_labels;
use crate::expiry::is_expired;

/// 判断单位当前是否可调拨
fn is_allocatable(donation: &Donation, linked_blood_ids: &HashSet<String>, today: NaiveDate) -> bool {
    donation.status == DonationStatus::Available
        && !is_expired(donation.expiry_date, today)
        && !linked_blood_ids.contains(&donation.blood_id)
}

/// 为受血者血型筛选候选血液单位（不限成分类型）
pub fn transfer_candidates(
    recipient_blood_type: &str,
    donations: &[Donation],
    linked_blood_ids: &HashSet<String>,
    today: NaiveDate,
) -> Vec<Donation> {
    let compatible = compatible_donor_labels(recipient_blood_type);
    candidates_for_types(&compatible, donations, linked_blood_ids, today)
}

/// 按显式给出的献血者血型集合筛选
pub fn candidates_for_types(
    donor_types: &[String],
    donations: &[Donation],
    linked_blood_ids: &HashSet<String>,
    today: NaiveDate,
) -> Vec<Donation> {
    let mut candidates: Vec<Donation> = donations
        .iter()
        .filter(|d| donor_types.contains(&d.blood_type.label()))
        .filter(|d| is_allocatable(d, linked_blood_ids, today))
        .cloned()
        .collect();

    candidates.sort_by(|a, b| {
        a.expiry_date
            .cmp(&b.expiry_date)
            .then_with(|| a.blood_id.cmp(&b.blood_id))
    });
    candidates
}

/// 校验操作人员为请求选定的血液单位
pub fn validate_selection(
    request: &BloodRequest,
    donation: &Donation,
    already_linked: bool,
    today: NaiveDate,
) -> Result<()> {
    if request.status != RequestStatus::Approved {
        return Err(BloodBankError::InvalidStateTransition {
            from: request.status.as_str().to_string(),
            event: "fulfill".to_string(),
        });
    }

    if donation.hospital_id != request.hospital_id {
        return Err(BloodBankError::Permission(format!(
            "Blood unit {} does not belong to this hospital",
            donation.blood_id
        )));
    }

    if already_linked || donation.status == DonationStatus::Transferred {
        return Err(BloodBankError::Conflict(format!(
            "Blood unit {} is already linked to a transfer",
            donation.blood_id
        )));
    }

    if donation.status == DonationStatus::Expired || is_expired(donation.expiry_date, today) {
        return Err(BloodBankError::Validation(format!(
            "Blood unit {} expired on {}",
            donation.blood_id, donation.expiry_date
        )));
    }

    let compatible = compatible_donor_labels(&request.blood_type);
    if !compatible.contains(&donation.blood_type.label()) {
        return Err(BloodBankError::Validation(format!(
            "Blood type {} is not compatible with recipient {}",
            donation.blood_type, request.blood_type
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bloodbank_core::{BloodType, Urgency};
    use chrono::Utc;
    use proptest::prelude::*;
    use uuid::Uuid;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn unit(hospital_id: Uuid, blood_id: &str, blood_type: BloodType, expiry: NaiveDate) -> Donation {
        Donation {
            blood_id: blood_id.to_string(),
            donor_id: Uuid::new_v4(),
            hospital_id,
            blood_type,
            component_type: "Red Blood Cells".to_string(),
            volume_ml: 350,
            collection_date: expiry - chrono::Duration::days(42),
            expiry_date: expiry,
            storage_location: None,
            status: DonationStatus::Available,
            created_at: Utc::now(),
        }
    }

    fn request(hospital_id: Uuid, blood_type: &str, status: RequestStatus) -> BloodRequest {
        BloodRequest {
            request_id: Uuid::new_v4(),
            hospital_id,
            patient_name: "Jane Roe".to_string(),
            patient_age: Some(40),
            blood_type: blood_type.to_string(),
            urgency: Urgency::Urgent,
            units_needed: 1,
            contact_number: "555-0100".to_string(),
            address: None,
            medical_notes: None,
            requester_name: None,
            requester_email: None,
            status,
            hospital_notes: None,
            created_at: Utc::now(),
            responded_at: None,
        }
    }

    #[test]
    fn test_candidates_filter_and_order() {
        let hospital = Uuid::new_v4();
        let today = date(2025, 6, 10);
        let mut transferred = unit(hospital, "T", BloodType::O_NEG, date(2025, 7, 1));
        transferred.status = DonationStatus::Transferred;

        let donations = vec![
            unit(hospital, "LATE", BloodType::O_POS, date(2025, 7, 20)),
            unit(hospital, "SOON", BloodType::A_NEG, date(2025, 6, 12)),
            unit(hospital, "WRONG", BloodType::B_POS, date(2025, 6, 15)),
            unit(hospital, "EXPIRED", BloodType::O_NEG, date(2025, 6, 9)),
            unit(hospital, "LINKED", BloodType::A_POS, date(2025, 6, 20)),
            transferred,
        ];
        let linked: HashSet<String> = ["LINKED".to_string()].into_iter().collect();

        let ids: Vec<String> = transfer_candidates("A+", &donations, &linked, today)
            .into_iter()
            .map(|d| d.blood_id)
            .collect();
        assert_eq!(ids, vec!["SOON".to_string(), "LATE".to_string()]);
    }

    #[test]
    fn test_no_candidates_for_o_negative_without_stock() {
        let hospital = Uuid::new_v4();
        let donations = vec![unit(hospital, "X", BloodType::O_POS, date(2025, 7, 1))];
        let found = transfer_candidates("O-", &donations, &HashSet::new(), date(2025, 6, 1));
        assert!(found.is_empty());
    }

    #[test]
    fn test_validate_selection() {
        let hospital = Uuid::new_v4();
        let today = date(2025, 6, 10);
        let donation = unit(hospital, "U1", BloodType::O_POS, date(2025, 7, 1));

        let approved = request(hospital, "A+", RequestStatus::Approved);
        assert!(validate_selection(&approved, &donation, false, today).is_ok());

        let pending = request(hospital, "A+", RequestStatus::Pending);
        assert!(matches!(
            validate_selection(&pending, &donation, false, today),
            Err(BloodBankError::InvalidStateTransition { .. })
        ));

        assert!(matches!(
            validate_selection(&approved, &donation, true, today),
            Err(BloodBankError::Conflict(_))
        ));

        let incompatible = request(hospital, "O-", RequestStatus::Approved);
        assert!(matches!(
            validate_selection(&incompatible, &donation, false, today),
            Err(BloodBankError::Validation(_))
        ));

        let other_hospital = request(Uuid::new_v4(), "A+", RequestStatus::Approved);
        assert!(matches!(
            validate_selection(&other_hospital, &donation, false, today),
            Err(BloodBankError::Permission(_))
        ));

        assert!(matches!(
            validate_selection(&approved, &donation, false, date(2025, 7, 2)),
            Err(BloodBankError::Validation(_))
        ));
    }

    proptest! {
        #[test]
        fn prop_candidates_are_compatible_and_unlinked(
            recipient in prop::sample::select(BloodType::ALL.to_vec()),
            types in prop::collection::vec(prop::sample::select(BloodType::ALL.to_vec()), 0..24),
            linked_mask in prop::collection::vec(any::<bool>(), 24),
        ) {
            let hospital = Uuid::new_v4();
            let today = date(2025, 6, 1);
            let donations: Vec<Donation> = types
                .iter()
                .enumerate()
                .map(|(i, t)| unit(hospital, &format!("U{}", i), *t, date(2025, 6, 1 + (i as u32 % 20))))
                .collect();
            let linked: HashSet<String> = donations
                .iter()
                .enumerate()
                .filter(|(i, _)| linked_mask[*i])
                .map(|(_, d)| d.blood_id.clone())
                .collect();

            let compatible = compatible_donor_labels(&recipient.label());
            for candidate in transfer_candidates(&recipient.label(), &donations, &linked, today) {
                prop_assert!(compatible.contains(&candidate.blood_type.label()));
                prop_assert!(!linked.contains(&candidate.blood_id));
            }
        }
    }
}
