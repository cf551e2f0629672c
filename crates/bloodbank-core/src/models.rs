//! 核心数据模型定义

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::BloodBankError;

/// ABO 血型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AboGroup {
    A,
    B,
    AB,
    O,
}

impl AboGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            AboGroup::A => "A",
            AboGroup::B => "B",
            AboGroup::AB => "AB",
            AboGroup::O => "O",
        }
    }
}

/// Rh 因子
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RhFactor {
    Positive,
    Negative,
}

impl RhFactor {
    pub fn as_str(&self) -> &'static str {
        match self {
            RhFactor::Positive => "+",
            RhFactor::Negative => "-",
        }
    }
}

/// 完整血型（ABO + Rh），序列化为 "A+"、"O-" 等标签
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct BloodType {
    pub group: AboGroup,
    pub rh: RhFactor,
}

impl BloodType {
    pub const A_POS: BloodType = BloodType::new(AboGroup::A, RhFactor::Positive);
    pub const A_NEG: BloodType = BloodType::new(AboGroup::A, RhFactor::Negative);
    pub const B_POS: BloodType = BloodType::new(AboGroup::B, RhFactor::Positive);
    pub const B_NEG: BloodType = BloodType::new(AboGroup::B, RhFactor::Negative);
    pub const AB_POS: BloodType = BloodType::new(AboGroup::AB, RhFactor::Positive);
    pub const AB_NEG: BloodType = BloodType::new(AboGroup::AB, RhFactor::Negative);
    pub const O_POS: BloodType = BloodType::new(AboGroup::O, RhFactor::Positive);
    pub const O_NEG: BloodType = BloodType::new(AboGroup::O, RhFactor::Negative);

    /// 全部八种血型，按看板展示顺序排列
    pub const ALL: [BloodType; 8] = [
        BloodType::A_POS,
        BloodType::A_NEG,
        BloodType::B_POS,
        BloodType::B_NEG,
        BloodType::AB_POS,
        BloodType::AB_NEG,
        BloodType::O_POS,
        BloodType::O_NEG,
    ];

    pub const fn new(group: AboGroup, rh: RhFactor) -> Self {
        Self { group, rh }
    }

    /// 由分开存储的 ABO 与 Rh 字段组合（如登记表单中的 "O" 与 "+"）
    pub fn from_parts(group: &str, rh: &str) -> Result<Self, BloodBankError> {
        format!("{}{}", group.trim(), rh.trim()).parse()
    }

    pub fn label(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for BloodType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.group.as_str(), self.rh.as_str())
    }
}

impl FromStr for BloodType {
    type Err = BloodBankError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase();
        let (group, rh) = match normalized.char_indices().last() {
            Some((idx, '+')) => (&normalized[..idx], RhFactor::Positive),
            Some((idx, '-')) => (&normalized[..idx], RhFactor::Negative),
            _ => return Err(BloodBankError::Validation(format!("Unknown blood type: {}", s))),
        };

        let group = match group.trim() {
            "A" => AboGroup::A,
            "B" => AboGroup::B,
            "AB" => AboGroup::AB,
            "O" => AboGroup::O,
            _ => return Err(BloodBankError::Validation(format!("Unknown blood type: {}", s))),
        };

        Ok(BloodType::new(group, rh))
    }
}

impl TryFrom<String> for BloodType {
    type Error = BloodBankError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<BloodType> for String {
    fn from(value: BloodType) -> Self {
        value.to_string()
    }
}

/// 血液成分类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentType {
    WholeBlood,
    RedBloodCells,
    Platelets,
    FreshFrozenPlasma,
    Cryoprecipitate,
}

impl ComponentType {
    pub const ALL: [ComponentType; 5] = [
        ComponentType::WholeBlood,
        ComponentType::RedBloodCells,
        ComponentType::Platelets,
        ComponentType::FreshFrozenPlasma,
        ComponentType::Cryoprecipitate,
    ];

    /// 登记表单与数据库使用的显示名称
    pub fn label(&self) -> &'static str {
        match self {
            ComponentType::WholeBlood => "Whole Blood",
            ComponentType::RedBloodCells => "Red Blood Cells",
            ComponentType::Platelets => "Platelets",
            ComponentType::FreshFrozenPlasma => "Fresh Frozen Plasma",
            ComponentType::Cryoprecipitate => "Cryoprecipitate",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.label() == label.trim())
    }

    /// 保存期（天），遵循 FDA/AABB 常用标准
    pub fn shelf_life_days(&self) -> i64 {
        match self {
            ComponentType::WholeBlood => 35,
            ComponentType::RedBloodCells => 42,
            ComponentType::Platelets => 5,
            ComponentType::FreshFrozenPlasma => 365,
            ComponentType::Cryoprecipitate => 365,
        }
    }
}

impl fmt::Display for ComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// 医院（账户）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hospital {
    pub hospital_id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub email_verified: bool,
    #[serde(skip)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

/// 献血者
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Donor {
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

impl Donor {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }
}

/// 血液单位状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DonationStatus {
    Available,   // 在库可用
    Transferred, // 已调拨
    Expired,     // 已过期
}

impl DonationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DonationStatus::Available => "available",
            DonationStatus::Transferred => "transferred",
            DonationStatus::Expired => "expired",
        }
    }
}

impl FromStr for DonationStatus {
    type Err = BloodBankError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "available" => Ok(DonationStatus::Available),
            "transferred" => Ok(DonationStatus::Transferred),
            "expired" => Ok(DonationStatus::Expired),
            other => Err(BloodBankError::Validation(format!("Unknown donation status: {}", other))),
        }
    }
}

/// 献血记录 / 血液单位
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Donation {
    pub blood_id: String,
    pub donor_id: Uuid,
    pub hospital_id: Uuid,
    pub blood_type: BloodType,
    pub component_type: String,
    pub volume_ml: i32,
    pub collection_date: NaiveDate,
    pub expiry_date: NaiveDate,
    pub storage_location: Option<String>,
    pub status: DonationStatus,
    pub created_at: DateTime<Utc>,
}

/// 带献血者姓名的献血记录（列表展示用）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DonationRecord {
    #[serde(flatten)]
    pub donation: Donation,
    pub donor_name: Option<String>,
}

/// 用血请求紧急程度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Urgency {
    Routine,
    Urgent,
    Critical,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Routine => "routine",
            Urgency::Urgent => "urgent",
            Urgency::Critical => "critical",
        }
    }
}

impl FromStr for Urgency {
    type Err = BloodBankError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "routine" => Ok(Urgency::Routine),
            "urgent" => Ok(Urgency::Urgent),
            "critical" => Ok(Urgency::Critical),
            other => Err(BloodBankError::Validation(format!("Unknown urgency: {}", other))),
        }
    }
}

/// 用血请求状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,   // 待处理
    Approved,  // 已批准
    Rejected,  // 已拒绝
    Fulfilled, // 已完成调拨
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
            RequestStatus::Fulfilled => "fulfilled",
        }
    }
}

impl FromStr for RequestStatus {
    type Err = BloodBankError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pending" => Ok(RequestStatus::Pending),
            "approved" => Ok(RequestStatus::Approved),
            "rejected" => Ok(RequestStatus::Rejected),
            "fulfilled" => Ok(RequestStatus::Fulfilled),
            other => Err(BloodBankError::Validation(format!("Unknown request status: {}", other))),
        }
    }
}

/// 用血请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BloodRequest {
    pub request_id: Uuid,
    pub hospital_id: Uuid,
    pub patient_name: String,
    pub patient_age: Option<i32>,
    /// 受血者血型原始标签，可能无法识别
    pub blood_type: String,
    pub urgency: Urgency,
    pub units_needed: i32,
    pub contact_number: String,
    pub address: Option<String>,
    pub medical_notes: Option<String>,
    pub requester_name: Option<String>,
    pub requester_email: Option<String>,
    pub status: RequestStatus,
    pub hospital_notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

/// 调拨记录
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transfer {
    pub transfer_id: Uuid,
    pub blood_id: String,
    pub request_id: Uuid,
    pub hospital_id: Uuid,
    pub transfer_date: DateTime<Utc>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// 调拨详情视图（关联血液单位与请求）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferDetails {
    #[serde(flatten)]
    pub transfer: Transfer,
    pub donor_id: Option<Uuid>,
    pub blood_type: Option<BloodType>,
    pub component_type: Option<String>,
    pub volume_ml: Option<i32>,
    pub patient_name: Option<String>,
    pub requested_blood_type: Option<String>,
    pub urgency: Option<Urgency>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blood_type_parse_and_display() {
        for label in ["A+", "A-", "B+", "B-", "AB+", "AB-", "O+", "O-"] {
            let parsed: BloodType = label.parse().unwrap();
            assert_eq!(parsed.to_string(), label);
        }

        assert_eq!(" ab- ".parse::<BloodType>().unwrap(), BloodType::AB_NEG);
        assert_eq!(BloodType::from_parts("O", "+").unwrap(), BloodType::O_POS);
    }

    #[test]
    fn test_blood_type_rejects_unknown() {
        assert!("C+".parse::<BloodType>().is_err());
        assert!("A".parse::<BloodType>().is_err());
        assert!("".parse::<BloodType>().is_err());
    }

    #[test]
    fn test_blood_type_serde_as_label() {
        let json = serde_json::to_string(&BloodType::AB_POS).unwrap();
        assert_eq!(json, "\"AB+\"");

        let back: BloodType = serde_json::from_str("\"O-\"").unwrap();
        assert_eq!(back, BloodType::O_NEG);
        assert!(serde_json::from_str::<BloodType>("\"Q+\"").is_err());
    }

    #[test]
    fn test_component_labels() {
        assert_eq!(
            ComponentType::from_label("Red Blood Cells"),
            Some(ComponentType::RedBloodCells)
        );
        assert_eq!(ComponentType::from_label("Buffy Coat"), None);
        assert_eq!(ComponentType::Platelets.shelf_life_days(), 5);
    }

    #[test]
    fn test_status_round_trip_strings() {
        assert_eq!("approved".parse::<RequestStatus>().unwrap(), RequestStatus::Approved);
        assert_eq!(DonationStatus::Transferred.as_str(), "transferred");
        assert_eq!("CRITICAL".parse::<Urgency>().unwrap(), Urgency::Critical);
    }
}
