//! 持久化接口

use std::collections::HashSet;

use async_trait::async_trait;
use bloodbank_core::{
    BloodRequest, Donation, DonationRecord, Donor, Hospital, RequestStatus, Result, Transfer,
    TransferDetails,
};
use chrono::NaiveDate;
use uuid::Uuid;

use crate::models::{NewBloodRequest, NewDonation, NewDonor, NewHospital, NewTransfer, RequestStatusChange};

/// 血库存储接口
///
/// 除医院账户本身外，所有查询都按 `hospital_id` 限定范围。
#[async_trait]
pub trait BloodBankStore: Send + Sync {
    // ========== 医院 ==========

    /// 邮箱重复返回 `Conflict`
    async fn create_hospital(&self, hospital: NewHospital) -> Result<Hospital>;
    async fn get_hospital(&self, hospital_id: Uuid) -> Result<Option<Hospital>>;
    /// 邮箱不区分大小写
    async fn find_hospital_by_email(&self, email: &str) -> Result<Option<Hospital>>;
    async fn set_email_verified(&self, hospital_id: Uuid) -> Result<()>;
    async fn update_password(&self, hospital_id: Uuid, password_hash: &str) -> Result<()>;

    // ========== 献血者 ==========

    async fn create_donor(&self, donor: NewDonor) -> Result<Donor>;
    /// 新登记在前
    async fn list_donors(&self, hospital_id: Uuid) -> Result<Vec<Donor>>;
    async fn get_donor(&self, hospital_id: Uuid, donor_id: Uuid) -> Result<Option<Donor>>;

    // ========== 血液单位 ==========

    async fn create_donation(&self, donation: NewDonation) -> Result<Donation>;
    async fn list_donations(&self, hospital_id: Uuid) -> Result<Vec<Donation>>;
    /// 联查献血者姓名，新记录在前
    async fn list_donation_records(&self, hospital_id: Uuid) -> Result<Vec<DonationRecord>>;
    async fn get_donation(&self, hospital_id: Uuid, blood_id: &str) -> Result<Option<Donation>>;
    /// 把已过期的 available 单位标记为 expired，返回更新条数
    async fn mark_expired_donations(&self, today: NaiveDate) -> Result<u64>;

    // ========== 用血请求 ==========

    async fn create_request(&self, request: NewBloodRequest) -> Result<BloodRequest>;
    async fn list_requests(&self, hospital_id: Uuid, status: Option<RequestStatus>) -> Result<Vec<BloodRequest>>;
    async fn get_request(&self, hospital_id: Uuid, request_id: Uuid) -> Result<Option<BloodRequest>>;
    /// 当前状态与 `expected` 不符时返回 `Conflict`
    async fn update_request_status(&self, change: RequestStatusChange) -> Result<BloodRequest>;

    // ========== 调拨 ==========

    /// 原子地写入调拨、把单位标为 transferred、把请求标为 fulfilled
    async fn fulfill_request(&self, transfer: NewTransfer) -> Result<Transfer>;
    async fn list_transfers(&self, hospital_id: Uuid) -> Result<Vec<TransferDetails>>;
    /// 已关联调拨的血液单位编号
    async fn linked_blood_ids(&self, hospital_id: Uuid) -> Result<HashSet<String>>;

    /// 存储是否可用
    async fn health_check(&self) -> Result<()>;
}
