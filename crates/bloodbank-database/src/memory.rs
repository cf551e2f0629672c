//! 内存存储
//!
//! 开发模式与测试使用，进程退出即丢失。所有表共用一把写锁，调拨的原子性由此保证。

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use bloodbank_core::{
    BloodBankError, BloodRequest, Donation, DonationRecord, DonationStatus, Donor, Hospital,
    RequestStatus, Result, Transfer, TransferDetails,
};
use chrono::{NaiveDate, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::{NewBloodRequest, NewDonation, NewDonor, NewHospital, NewTransfer, RequestStatusChange};
use crate::store::BloodBankStore;

#[derive(Debug, Default)]
struct Tables {
    hospitals: HashMap<Uuid, Hospital>,
    // 按插入顺序保存，列表时倒序输出
    donors: Vec<Donor>,
    donations: Vec<Donation>,
    requests: Vec<BloodRequest>,
    transfers: Vec<Transfer>,
}

impl Tables {
    fn donor_name(&self, donor_id: Uuid) -> Option<String> {
        self.donors
            .iter()
            .find(|d| d.donor_id == donor_id)
            .map(Donor::full_name)
    }
}

/// 内存存储实现
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn newest_first<T>(items: impl DoubleEndedIterator<Item = T>) -> Vec<T> {
    items.rev().collect()
}

#[async_trait]
impl BloodBankStore for MemoryStore {
    async fn create_hospital(&self, mut hospital: NewHospital) -> Result<Hospital> {
        let mut tables = self.tables.write().await;
        hospital.email = hospital.email.trim().to_lowercase();

        if tables.hospitals.values().any(|h| h.email == hospital.email) {
            return Err(BloodBankError::Conflict(format!(
                "Email {} is already registered",
                hospital.email
            )));
        }

        let hospital = hospital.into_hospital(Utc::now());
        tables.hospitals.insert(hospital.hospital_id, hospital.clone());
        Ok(hospital)
    }

    async fn get_hospital(&self, hospital_id: Uuid) -> Result<Option<Hospital>> {
        Ok(self.tables.read().await.hospitals.get(&hospital_id).cloned())
    }

    async fn find_hospital_by_email(&self, email: &str) -> Result<Option<Hospital>> {
        let email = email.trim().to_lowercase();
        Ok(self
            .tables
            .read()
            .await
            .hospitals
            .values()
            .find(|h| h.email == email)
            .cloned())
    }

    async fn set_email_verified(&self, hospital_id: Uuid) -> Result<()> {
        let mut tables = self.tables.write().await;
        let hospital = tables
            .hospitals
            .get_mut(&hospital_id)
            .ok_or_else(|| BloodBankError::NotFound(format!("Hospital {}", hospital_id)))?;
        hospital.email_verified = true;
        Ok(())
    }

    async fn update_password(&self, hospital_id: Uuid, password_hash: &str) -> Result<()> {
        let mut tables = self.tables.write().await;
        let hospital = tables
            .hospitals
            .get_mut(&hospital_id)
            .ok_or_else(|| BloodBankError::NotFound(format!("Hospital {}", hospital_id)))?;
        hospital.password_hash = password_hash.to_string();
        Ok(())
    }

    async fn create_donor(&self, donor: NewDonor) -> Result<Donor> {
        let mut tables = self.tables.write().await;
        if !tables.hospitals.contains_key(&donor.hospital_id) {
            return Err(BloodBankError::NotFound(format!("Hospital {}", donor.hospital_id)));
        }

        let donor = donor.into_donor(Utc::now());
        tables.donors.push(donor.clone());
        Ok(donor)
    }

    async fn list_donors(&self, hospital_id: Uuid) -> Result<Vec<Donor>> {
        let tables = self.tables.read().await;
        Ok(newest_first(
            tables.donors.iter().filter(|d| d.hospital_id == hospital_id).cloned(),
        ))
    }

    async fn get_donor(&self, hospital_id: Uuid, donor_id: Uuid) -> Result<Option<Donor>> {
        let tables = self.tables.read().await;
        Ok(tables
            .donors
            .iter()
            .find(|d| d.hospital_id == hospital_id && d.donor_id == donor_id)
            .cloned())
    }

    async fn create_donation(&self, donation: NewDonation) -> Result<Donation> {
        let mut tables = self.tables.write().await;
        if tables.donations.iter().any(|d| d.blood_id == donation.blood_id) {
            return Err(BloodBankError::Conflict(format!(
                "Blood unit {} already exists",
                donation.blood_id
            )));
        }
        if !tables
            .donors
            .iter()
            .any(|d| d.donor_id == donation.donor_id && d.hospital_id == donation.hospital_id)
        {
            return Err(BloodBankError::NotFound(format!("Donor {}", donation.donor_id)));
        }

        let donation = donation.into_donation(Utc::now());
        tables.donations.push(donation.clone());
        Ok(donation)
    }

    async fn list_donations(&self, hospital_id: Uuid) -> Result<Vec<Donation>> {
        let tables = self.tables.read().await;
        Ok(newest_first(
            tables.donations.iter().filter(|d| d.hospital_id == hospital_id).cloned(),
        ))
    }

    async fn list_donation_records(&self, hospital_id: Uuid) -> Result<Vec<DonationRecord>> {
        let tables = self.tables.read().await;
        Ok(newest_first(
            tables
                .donations
                .iter()
                .filter(|d| d.hospital_id == hospital_id)
                .map(|d| DonationRecord {
                    donor_name: tables.donor_name(d.donor_id),
                    donation: d.clone(),
                }),
        ))
    }

    async fn get_donation(&self, hospital_id: Uuid, blood_id: &str) -> Result<Option<Donation>> {
        let tables = self.tables.read().await;
        Ok(tables
            .donations
            .iter()
            .find(|d| d.hospital_id == hospital_id && d.blood_id == blood_id)
            .cloned())
    }

    async fn mark_expired_donations(&self, today: NaiveDate) -> Result<u64> {
        let mut tables = self.tables.write().await;
        let mut updated = 0;
        for donation in tables
            .donations
            .iter_mut()
            .filter(|d| d.status == DonationStatus::Available && d.expiry_date < today)
        {
            donation.status = DonationStatus::Expired;
            updated += 1;
        }
        Ok(updated)
    }

    async fn create_request(&self, request: NewBloodRequest) -> Result<BloodRequest> {
        let mut tables = self.tables.write().await;
        if !tables.hospitals.contains_key(&request.hospital_id) {
            return Err(BloodBankError::NotFound(format!("Hospital {}", request.hospital_id)));
        }

        let request = request.into_request(Utc::now());
        tables.requests.push(request.clone());
        Ok(request)
    }

    async fn list_requests(&self, hospital_id: Uuid, status: Option<RequestStatus>) -> Result<Vec<BloodRequest>> {
        let tables = self.tables.read().await;
        Ok(newest_first(
            tables
                .requests
                .iter()
                .filter(|r| r.hospital_id == hospital_id)
                .filter(|r| status.map_or(true, |s| r.status == s))
                .cloned(),
        ))
    }

    async fn get_request(&self, hospital_id: Uuid, request_id: Uuid) -> Result<Option<BloodRequest>> {
        let tables = self.tables.read().await;
        Ok(tables
            .requests
            .iter()
            .find(|r| r.hospital_id == hospital_id && r.request_id == request_id)
            .cloned())
    }

    async fn update_request_status(&self, change: RequestStatusChange) -> Result<BloodRequest> {
        let mut tables = self.tables.write().await;
        let request = tables
            .requests
            .iter_mut()
            .find(|r| r.hospital_id == change.hospital_id && r.request_id == change.request_id)
            .ok_or_else(|| BloodBankError::NotFound(format!("Request {}", change.request_id)))?;

        if request.status != change.expected {
            return Err(BloodBankError::Conflict(format!(
                "Request {} is no longer {}",
                change.request_id,
                change.expected.as_str()
            )));
        }

        request.status = change.status;
        if change.hospital_notes.is_some() {
            request.hospital_notes = change.hospital_notes;
        }
        request.responded_at = Some(change.responded_at);
        Ok(request.clone())
    }

    async fn fulfill_request(&self, transfer: NewTransfer) -> Result<Transfer> {
        let mut tables = self.tables.write().await;

        if tables.transfers.iter().any(|t| t.blood_id == transfer.blood_id) {
            return Err(BloodBankError::Conflict(format!(
                "Blood unit {} is already linked to a transfer",
                transfer.blood_id
            )));
        }

        // 先检查两侧条件，全部满足后再修改，保证失败时不留半截状态
        let unit_idx = tables
            .donations
            .iter()
            .position(|d| {
                d.blood_id == transfer.blood_id
                    && d.hospital_id == transfer.hospital_id
                    && d.status == DonationStatus::Available
            })
            .ok_or_else(|| {
                BloodBankError::Conflict(format!("Blood unit {} is not available", transfer.blood_id))
            })?;

        let request_idx = tables
            .requests
            .iter()
            .position(|r| {
                r.request_id == transfer.request_id
                    && r.hospital_id == transfer.hospital_id
                    && r.status == RequestStatus::Approved
            })
            .ok_or_else(|| {
                BloodBankError::Conflict(format!(
                    "Request {} is not awaiting fulfilment",
                    transfer.request_id
                ))
            })?;

        let responded_at = transfer.transfer_date;
        tables.donations[unit_idx].status = DonationStatus::Transferred;
        tables.requests[request_idx].status = RequestStatus::Fulfilled;
        tables.requests[request_idx].responded_at = Some(responded_at);

        let transfer = transfer.into_transfer(Utc::now());
        tables.transfers.push(transfer.clone());
        Ok(transfer)
    }

    async fn list_transfers(&self, hospital_id: Uuid) -> Result<Vec<TransferDetails>> {
        let tables = self.tables.read().await;
        let mut details: Vec<TransferDetails> = tables
            .transfers
            .iter()
            .filter(|t| t.hospital_id == hospital_id)
            .map(|t| {
                let unit = tables.donations.iter().find(|d| d.blood_id == t.blood_id);
                let request = tables.requests.iter().find(|r| r.request_id == t.request_id);
                TransferDetails {
                    transfer: t.clone(),
                    donor_id: unit.map(|d| d.donor_id),
                    blood_type: unit.map(|d| d.blood_type),
                    component_type: unit.map(|d| d.component_type.clone()),
                    volume_ml: unit.map(|d| d.volume_ml),
                    patient_name: request.map(|r| r.patient_name.clone()),
                    requested_blood_type: request.map(|r| r.blood_type.clone()),
                    urgency: request.map(|r| r.urgency),
                }
            })
            .collect();

        details.reverse();
        // 稳定排序：同一时刻的调拨保持新插入在前
        details.sort_by(|a, b| b.transfer.transfer_date.cmp(&a.transfer.transfer_date));
        Ok(details)
    }

    async fn linked_blood_ids(&self, hospital_id: Uuid) -> Result<HashSet<String>> {
        let tables = self.tables.read().await;
        Ok(tables
            .transfers
            .iter()
            .filter(|t| t.hospital_id == hospital_id)
            .map(|t| t.blood_id.clone())
            .collect())
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bloodbank_core::{BloodType, Urgency};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    async fn seed_hospital(store: &MemoryStore, email: &str) -> Hospital {
        store
            .create_hospital(NewHospital {
                hospital_id: Uuid::new_v4(),
                name: "General Hospital".to_string(),
                email: email.to_string(),
                phone: None,
                address: None,
                city: None,
                state: None,
                postal_code: None,
                email_verified: false,
                password_hash: "hash".to_string(),
            })
            .await
            .unwrap()
    }

    async fn seed_donor(store: &MemoryStore, hospital_id: Uuid) -> Donor {
        store
            .create_donor(NewDonor {
                donor_id: Uuid::new_v4(),
                hospital_id,
                first_name: "Ada".to_string(),
                last_name: "Lovelace".to_string(),
                date_of_birth: None,
                gender: None,
                phone: None,
                email: None,
                address: None,
                city: None,
                state: None,
                postal_code: None,
            })
            .await
            .unwrap()
    }

    async fn seed_unit(store: &MemoryStore, donor: &Donor, blood_id: &str, expiry: NaiveDate) -> Donation {
        store
            .create_donation(NewDonation {
                blood_id: blood_id.to_string(),
                donor_id: donor.donor_id,
                hospital_id: donor.hospital_id,
                blood_type: BloodType::O_NEG,
                component_type: "Red Blood Cells".to_string(),
                volume_ml: 350,
                collection_date: expiry - chrono::Duration::days(42),
                expiry_date: expiry,
                storage_location: None,
            })
            .await
            .unwrap()
    }

    async fn seed_request(store: &MemoryStore, hospital_id: Uuid) -> BloodRequest {
        store
            .create_request(NewBloodRequest {
                request_id: Uuid::new_v4(),
                hospital_id,
                patient_name: "John".to_string(),
                patient_age: Some(52),
                blood_type: "A+".to_string(),
                urgency: Urgency::Critical,
                units_needed: 1,
                contact_number: "555-0101".to_string(),
                address: None,
                medical_notes: None,
                requester_name: None,
                requester_email: None,
            })
            .await
            .unwrap()
    }

    async fn approve(store: &MemoryStore, request: &BloodRequest) {
        store
            .update_request_status(RequestStatusChange {
                hospital_id: request.hospital_id,
                request_id: request.request_id,
                expected: RequestStatus::Pending,
                status: RequestStatus::Approved,
                hospital_notes: Some("ok".to_string()),
                responded_at: Utc::now(),
            })
            .await
            .unwrap();
    }

    fn transfer_for(unit: &Donation, request: &BloodRequest) -> NewTransfer {
        NewTransfer {
            transfer_id: Uuid::new_v4(),
            blood_id: unit.blood_id.clone(),
            request_id: request.request_id,
            hospital_id: request.hospital_id,
            transfer_date: Utc::now(),
            notes: None,
        }
    }

    #[tokio::test]
    async fn test_hospital_email_is_unique_case_insensitive() {
        let store = MemoryStore::new();
        seed_hospital(&store, "Admin@Example.org").await;

        let found = store.find_hospital_by_email("admin@example.ORG").await.unwrap();
        assert!(found.is_some());

        let err = store
            .create_hospital(NewHospital {
                hospital_id: Uuid::new_v4(),
                name: "Other".to_string(),
                email: "ADMIN@example.org".to_string(),
                phone: None,
                address: None,
                city: None,
                state: None,
                postal_code: None,
                email_verified: false,
                password_hash: "x".to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, BloodBankError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_records_are_scoped_by_hospital() {
        let store = MemoryStore::new();
        let a = seed_hospital(&store, "a@example.org").await;
        let b = seed_hospital(&store, "b@example.org").await;
        let donor = seed_donor(&store, a.hospital_id).await;
        seed_unit(&store, &donor, "BLD-A", date(2025, 7, 1)).await;

        assert_eq!(store.list_donors(a.hospital_id).await.unwrap().len(), 1);
        assert!(store.list_donors(b.hospital_id).await.unwrap().is_empty());
        assert!(store.get_donation(b.hospital_id, "BLD-A").await.unwrap().is_none());

        let records = store.list_donation_records(a.hospital_id).await.unwrap();
        assert_eq!(records[0].donor_name.as_deref(), Some("Ada Lovelace"));
    }

    #[tokio::test]
    async fn test_update_request_status_detects_stale_state() {
        let store = MemoryStore::new();
        let hospital = seed_hospital(&store, "h@example.org").await;
        let request = seed_request(&store, hospital.hospital_id).await;
        approve(&store, &request).await;

        let err = store
            .update_request_status(RequestStatusChange {
                hospital_id: hospital.hospital_id,
                request_id: request.request_id,
                expected: RequestStatus::Pending,
                status: RequestStatus::Rejected,
                hospital_notes: None,
                responded_at: Utc::now(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, BloodBankError::Conflict(_)));

        let stored = store.get_request(hospital.hospital_id, request.request_id).await.unwrap().unwrap();
        assert_eq!(stored.status, RequestStatus::Approved);
        assert_eq!(stored.hospital_notes.as_deref(), Some("ok"));
    }

    #[tokio::test]
    async fn test_fulfill_request_is_atomic() {
        let store = MemoryStore::new();
        let hospital = seed_hospital(&store, "h@example.org").await;
        let donor = seed_donor(&store, hospital.hospital_id).await;
        let unit = seed_unit(&store, &donor, "BLD-1", date(2025, 7, 1)).await;
        let request = seed_request(&store, hospital.hospital_id).await;

        // 未批准时失败，单位保持可用
        let err = store.fulfill_request(transfer_for(&unit, &request)).await.unwrap_err();
        assert!(matches!(err, BloodBankError::Conflict(_)));
        let still = store.get_donation(hospital.hospital_id, "BLD-1").await.unwrap().unwrap();
        assert_eq!(still.status, DonationStatus::Available);

        approve(&store, &request).await;
        store.fulfill_request(transfer_for(&unit, &request)).await.unwrap();

        let unit_after = store.get_donation(hospital.hospital_id, "BLD-1").await.unwrap().unwrap();
        assert_eq!(unit_after.status, DonationStatus::Transferred);
        let request_after = store.get_request(hospital.hospital_id, request.request_id).await.unwrap().unwrap();
        assert_eq!(request_after.status, RequestStatus::Fulfilled);

        let linked = store.linked_blood_ids(hospital.hospital_id).await.unwrap();
        assert!(linked.contains("BLD-1"));

        let transfers = store.list_transfers(hospital.hospital_id).await.unwrap();
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].patient_name.as_deref(), Some("John"));
        assert_eq!(transfers[0].blood_type, Some(BloodType::O_NEG));

        // 同一单位不能再次调拨
        let second = seed_request(&store, hospital.hospital_id).await;
        approve(&store, &second).await;
        let err = store.fulfill_request(transfer_for(&unit, &second)).await.unwrap_err();
        assert!(matches!(err, BloodBankError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_mark_expired_donations() {
        let store = MemoryStore::new();
        let hospital = seed_hospital(&store, "h@example.org").await;
        let donor = seed_donor(&store, hospital.hospital_id).await;
        seed_unit(&store, &donor, "OLD", date(2025, 6, 1)).await;
        seed_unit(&store, &donor, "TODAY", date(2025, 6, 2)).await;

        assert_eq!(store.mark_expired_donations(date(2025, 6, 2)).await.unwrap(), 1);
        let old = store.get_donation(hospital.hospital_id, "OLD").await.unwrap().unwrap();
        assert_eq!(old.status, DonationStatus::Expired);
        assert_eq!(store.mark_expired_donations(date(2025, 6, 2)).await.unwrap(), 0);
    }
}
