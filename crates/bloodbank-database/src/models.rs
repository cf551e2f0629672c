//! 数据库模型

use bloodbank_core::models::*;
use bloodbank_core::{BloodBankError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::FromRow;
use uuid::Uuid;

// 数据库表模型 - 使用FromRow trait用于SQL查询

/// 数据库医院表
#[derive(Debug, FromRow)]
pub struct DbHospital {
    pub hospital_id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub email_verified: bool,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

impl From<DbHospital> for Hospital {
    fn from(db: DbHospital) -> Self {
        Hospital {
            hospital_id: db.hospital_id,
            name: db.name,
            email: db.email,
            phone: db.phone,
            address: db.address,
            city: db.city,
            state: db.state,
            postal_code: db.postal_code,
            email_verified: db.email_verified,
            password_hash: db.password_hash,
            created_at: db.created_at,
        }
    }
}

/// 数据库献血者表
#[derive(Debug, FromRow)]
pub struct DbDonor {
    pub donor_id: Uuid,
    pub hospital_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<DbDonor> for Donor {
    fn from(db: DbDonor) -> Self {
        Donor {
            donor_id: db.donor_id,
            hospital_id: db.hospital_id,
            first_name: db.first_name,
            last_name: db.last_name,
            date_of_birth: db.date_of_birth,
            gender: db.gender,
            phone: db.phone,
            email: db.email,
            address: db.address,
            city: db.city,
            state: db.state,
            postal_code: db.postal_code,
            created_at: db.created_at,
        }
    }
}

/// 数据库血液单位表，血型与状态存储为字符串
#[derive(Debug, FromRow)]
pub struct DbDonation {
    pub blood_id: String,
    pub donor_id: Uuid,
    pub hospital_id: Uuid,
    pub blood_type: String,
    pub component_type: String,
    pub volume_ml: i32,
    pub collection_date: NaiveDate,
    pub expiry_date: NaiveDate,
    pub storage_location: Option<String>,
    pub status: String,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<DbDonation> for Donation {
    type Error = BloodBankError;

    fn try_from(db: DbDonation) -> Result<Self> {
        Ok(Donation {
            blood_type: db.blood_type.parse()?,
            status: db.status.parse()?,
            blood_id: db.blood_id,
            donor_id: db.donor_id,
            hospital_id: db.hospital_id,
            component_type: db.component_type,
            volume_ml: db.volume_ml,
            collection_date: db.collection_date,
            expiry_date: db.expiry_date,
            storage_location: db.storage_location,
            created_at: db.created_at,
        })
    }
}

/// 献血记录联查献血者姓名
#[derive(Debug, FromRow)]
pub struct DbDonationRecord {
    #[sqlx(flatten)]
    pub donation: DbDonation,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

impl TryFrom<DbDonationRecord> for DonationRecord {
    type Error = BloodBankError;

    fn try_from(db: DbDonationRecord) -> Result<Self> {
        let donor_name = match (db.first_name, db.last_name) {
            (Some(first), Some(last)) => Some(format!("{} {}", first, last).trim().to_string()),
            (Some(name), None) | (None, Some(name)) => Some(name),
            (None, None) => None,
        };
        Ok(DonationRecord {
            donation: Donation::try_from(db.donation)?,
            donor_name,
        })
    }
}

/// 数据库用血请求表
#[derive(Debug, FromRow)]
pub struct DbBloodRequest {
    pub request_id: Uuid,
    pub hospital_id: Uuid,
    pub patient_name: String,
    pub patient_age: Option<i32>,
    pub blood_type: String,
    pub urgency: String,
    pub units_needed: i32,
    pub contact_number: String,
    pub address: Option<String>,
    pub medical_notes: Option<String>,
    pub requester_name: Option<String>,
    pub requester_email: Option<String>,
    pub status: String,
    pub hospital_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

impl TryFrom<DbBloodRequest> for BloodRequest {
    type Error = BloodBankError;

    fn try_from(db: DbBloodRequest) -> Result<Self> {
        Ok(BloodRequest {
            urgency: db.urgency.parse()?,
            status: db.status.parse()?,
            request_id: db.request_id,
            hospital_id: db.hospital_id,
            patient_name: db.patient_name,
            patient_age: db.patient_age,
            blood_type: db.blood_type,
            units_needed: db.units_needed,
            contact_number: db.contact_number,
            address: db.address,
            medical_notes: db.medical_notes,
            requester_name: db.requester_name,
            requester_email: db.requester_email,
            hospital_notes: db.hospital_notes,
            created_at: db.created_at,
            responded_at: db.responded_at,
        })
    }
}

/// 数据库调拨表
#[derive(Debug, FromRow)]
pub struct DbTransfer {
    pub transfer_id: Uuid,
    pub blood_id: String,
    pub request_id: Uuid,
    pub hospital_id: Uuid,
    pub transfer_date: DateTime<Utc>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<DbTransfer> for Transfer {
    fn from(db: DbTransfer) -> Self {
        Transfer {
            transfer_id: db.transfer_id,
            blood_id: db.blood_id,
            request_id: db.request_id,
            hospital_id: db.hospital_id,
            transfer_date: db.transfer_date,
            notes: db.notes,
            created_at: db.created_at,
        }
    }
}

/// 调拨联查视图
#[derive(Debug, FromRow)]
pub struct DbTransferDetails {
    #[sqlx(flatten)]
    pub transfer: DbTransfer,
    pub donor_id: Option<Uuid>,
    pub blood_type: Option<String>,
    pub component_type: Option<String>,
    pub volume_ml: Option<i32>,
    pub patient_name: Option<String>,
    pub requested_blood_type: Option<String>,
    pub urgency: Option<String>,
}

impl From<DbTransferDetails> for TransferDetails {
    fn from(db: DbTransferDetails) -> Self {
        TransferDetails {
            transfer: Transfer::from(db.transfer),
            donor_id: db.donor_id,
            blood_type: db.blood_type.and_then(|t| t.parse().ok()),
            component_type: db.component_type,
            volume_ml: db.volume_ml,
            patient_name: db.patient_name,
            requested_blood_type: db.requested_blood_type,
            urgency: db.urgency.and_then(|u| u.parse().ok()),
        }
    }
}

// 插入模型 - 用于创建新记录

/// 新医院插入模型
#[derive(Debug, Clone)]
pub struct NewHospital {
    pub hospital_id: Uuid,
    pub name: String,
    /// 已规范化为小写
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub email_verified: bool,
    pub password_hash: String,
}

impl NewHospital {
    pub fn into_hospital(self, created_at: DateTime<Utc>) -> Hospital {
        Hospital {
            hospital_id: self.hospital_id,
            name: self.name,
            email: self.email,
            phone: self.phone,
            address: self.address,
            city: self.city,
            state: self.state,
            postal_code: self.postal_code,
            email_verified: self.email_verified,
            password_hash: self.password_hash,
            created_at,
        }
    }
}

/// 新献血者插入模型
#[derive(Debug, Clone)]
pub struct NewDonor {
    pub donor_id: Uuid,
    pub hospital_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
}

impl NewDonor {
    pub fn into_donor(self, created_at: DateTime<Utc>) -> Donor {
        Donor {
            donor_id: self.donor_id,
            hospital_id: self.hospital_id,
            first_name: self.first_name,
            last_name: self.last_name,
            date_of_birth: self.date_of_birth,
            gender: self.gender,
            phone: self.phone,
            email: self.email,
            address: self.address,
            city: self.city,
            state: self.state,
            postal_code: self.postal_code,
            created_at,
        }
    }
}

/// 新血液单位插入模型，过期日期由调用方按成分推算
#[derive(Debug, Clone)]
pub struct NewDonation {
    pub blood_id: String,
    pub donor_id: Uuid,
    pub hospital_id: Uuid,
    pub blood_type: BloodType,
    pub component_type: String,
    pub volume_ml: i32,
    pub collection_date: NaiveDate,
    pub expiry_date: NaiveDate,
    pub storage_location: Option<String>,
}

impl NewDonation {
    pub fn into_donation(self, created_at: DateTime<Utc>) -> Donation {
        Donation {
            blood_id: self.blood_id,
            donor_id: self.donor_id,
            hospital_id: self.hospital_id,
            blood_type: self.blood_type,
            component_type: self.component_type,
            volume_ml: self.volume_ml,
            collection_date: self.collection_date,
            expiry_date: self.expiry_date,
            storage_location: self.storage_location,
            status: DonationStatus::Available,
            created_at,
        }
    }
}

/// 新用血请求插入模型，初始状态为 pending
#[derive(Debug, Clone)]
pub struct NewBloodRequest {
    pub request_id: Uuid,
    pub hospital_id: Uuid,
    pub patient_name: String,
    pub patient_age: Option<i32>,
    pub blood_type: String,
    pub urgency: Urgency,
    pub units_needed: i32,
    pub contact_number: String,
    pub address: Option<String>,
    pub medical_notes: Option<String>,
    pub requester_name: Option<String>,
    pub requester_email: Option<String>,
}

impl NewBloodRequest {
    pub fn into_request(self, created_at: DateTime<Utc>) -> BloodRequest {
        BloodRequest {
            request_id: self.request_id,
            hospital_id: self.hospital_id,
            patient_name: self.patient_name,
            patient_age: self.patient_age,
            blood_type: self.blood_type,
            urgency: self.urgency,
            units_needed: self.units_needed,
            contact_number: self.contact_number,
            address: self.address,
            medical_notes: self.medical_notes,
            requester_name: self.requester_name,
            requester_email: self.requester_email,
            status: RequestStatus::Pending,
            hospital_notes: None,
            created_at,
            responded_at: None,
        }
    }
}

/// 新调拨插入模型
#[derive(Debug, Clone)]
pub struct NewTransfer {
    pub transfer_id: Uuid,
    pub blood_id: String,
    pub request_id: Uuid,
    pub hospital_id: Uuid,
    pub transfer_date: DateTime<Utc>,
    pub notes: Option<String>,
}

impl NewTransfer {
    pub fn into_transfer(self, created_at: DateTime<Utc>) -> Transfer {
        Transfer {
            transfer_id: self.transfer_id,
            blood_id: self.blood_id,
            request_id: self.request_id,
            hospital_id: self.hospital_id,
            transfer_date: self.transfer_date,
            notes: self.notes,
            created_at,
        }
    }
}

/// 请求状态变更
#[derive(Debug, Clone)]
pub struct RequestStatusChange {
    pub hospital_id: Uuid,
    pub request_id: Uuid,
    /// 变更前必须处于的状态，不符则视为并发冲突
    pub expected: RequestStatus,
    pub status: RequestStatus,
    pub hospital_notes: Option<String>,
    pub responded_at: DateTime<Utc>,
}
