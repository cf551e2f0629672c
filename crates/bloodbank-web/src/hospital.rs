//! 医院端处理器：资料、用血请求、调拨与库存报表

use axum::{extract::State, Extension};
use bloodbank_core::{BloodBankError, BloodRequest, BloodType, Donation, Hospital, RequestStatus, TransferDetails, Transfer, Urgency};
use bloodbank_database::{NewBloodRequest, NewTransfer, RequestStatusChange};
use bloodbank_integration::NotificationKind;
use bloodbank_workflow::{
    candidates_for_types, transfer_candidates, validate_selection, AnalyticsReport, ExpiringUnit,
    InventorySnapshot, LowStockItem, ProfileStats, RequestEvent, RequestStateMachine,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::error::{ApiResponse, ApiResult};
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::handlers::{clean, require_fields};
use crate::session::AuthContext;
use crate::state::AppState;

// ========== 医院资料 ==========

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HospitalProfile {
    #[serde(flatten)]
    pub hospital: Hospital,
    pub stats: ProfileStats,
    pub account_type: &'static str,
}

pub async fn profile(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<ApiResponse<HospitalProfile>> {
    // 先取版本号再读数据，响应的版本号不会比数据新
    let revision = state.hub.current();
    let hospital = state.auth.current_hospital(&auth).await?;
    let records = state.hospital_records(auth.hospital_id).await?;
    let snapshot = InventorySnapshot::new(
        &records.donations,
        &records.donors,
        &records.requests,
        state.today(),
    );

    Ok(ApiResponse::new(
        HospitalProfile {
            hospital,
            stats: snapshot.profile_stats(),
            account_type: "hospital",
        },
        revision,
    ))
}

// ========== 用血请求 ==========

#[derive(Debug, Deserialize)]
pub struct RequestFilter {
    pub status: Option<String>,
}

pub async fn list_requests(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiQuery(filter): ApiQuery<RequestFilter>,
) -> ApiResult<ApiResponse<Vec<BloodRequest>>> {
    let revision = state.hub.current();
    let status = clean(filter.status)
        .map(|s| s.parse::<RequestStatus>())
        .transpose()?;
    let requests = state.store.list_requests(auth.hospital_id, status).await?;
    Ok(ApiResponse::new(requests, revision))
}

/// 求助端提交的用血请求
#[derive(Debug, Deserialize)]
pub struct CreateBloodRequest {
    pub hospital_id: Option<Uuid>,
    pub patient_name: Option<String>,
    pub patient_age: Option<i32>,
    pub blood_type: Option<String>,
    pub urgency: Option<String>,
    pub units_needed: Option<i32>,
    pub contact_number: Option<String>,
    pub address: Option<String>,
    pub medical_notes: Option<String>,
    pub requester_name: Option<String>,
    pub requester_email: Option<String>,
}

/// 受理用血请求（求助端入口，无需登录）
pub async fn create_request(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<CreateBloodRequest>,
) -> ApiResult<ApiResponse<BloodRequest>> {
    let patient_name = clean(request.patient_name);
    let blood_type = clean(request.blood_type);
    let contact_number = clean(request.contact_number);
    require_fields(&[
        ("hospital_id", request.hospital_id.is_some()),
        ("patient_name", patient_name.is_some()),
        ("blood_type", blood_type.is_some()),
        ("contact_number", contact_number.is_some()),
    ])?;

    let (Some(hospital_id), Some(patient_name), Some(blood_type), Some(contact_number)) =
        (request.hospital_id, patient_name, blood_type, contact_number)
    else {
        return Err(BloodBankError::Validation("Missing required fields".to_string()).into());
    };

    let urgency = match clean(request.urgency) {
        Some(u) => u.parse::<Urgency>()?,
        None => Urgency::Routine,
    };
    let units_needed = request.units_needed.unwrap_or(1);
    if units_needed < 1 {
        return Err(BloodBankError::Validation("units_needed must be at least 1".to_string()).into());
    }
    if matches!(request.patient_age, Some(age) if !(0..=150).contains(&age)) {
        return Err(BloodBankError::Validation("patient_age is out of range".to_string()).into());
    }

    state
        .store
        .get_hospital(hospital_id)
        .await?
        .ok_or_else(|| BloodBankError::NotFound(format!("Hospital {} not found", hospital_id)))?;

    let created = state
        .store
        .create_request(NewBloodRequest {
            request_id: Uuid::new_v4(),
            hospital_id,
            patient_name,
            patient_age: request.patient_age,
            blood_type,
            urgency,
            units_needed,
            contact_number,
            address: clean(request.address),
            medical_notes: clean(request.medical_notes),
            requester_name: clean(request.requester_name),
            requester_email: clean(request.requester_email),
        })
        .await?;

    info!(
        "Blood request {} ({} {}) received for hospital {}",
        created.request_id,
        created.blood_type,
        created.urgency.as_str(),
        hospital_id
    );

    let revision = state.notify(NotificationKind::NewRequest, hospital_id, json!(created));
    Ok(ApiResponse::new(created, revision).with_message("Request submitted"))
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: Option<String>,
    pub notes: Option<String>,
}

/// 批准或拒绝用血请求
pub async fn update_request_status(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath(request_id): ApiPath<Uuid>,
    ApiJson(body): ApiJson<UpdateStatusRequest>,
) -> ApiResult<ApiResponse<BloodRequest>> {
    let target = clean(body.status)
        .ok_or_else(|| BloodBankError::Validation("Missing required fields: status".to_string()))?
        .parse::<RequestStatus>()?;
    let event = RequestEvent::from_target_status(target)?;

    let current = state
        .store
        .get_request(auth.hospital_id, request_id)
        .await?
        .ok_or_else(|| BloodBankError::NotFound(format!("Request {} not found", request_id)))?;

    let next = RequestStateMachine::new().transition(current.status, event)?;
    let updated = state
        .store
        .update_request_status(RequestStatusChange {
            hospital_id: auth.hospital_id,
            request_id,
            expected: current.status,
            status: next,
            hospital_notes: clean(body.notes),
            responded_at: Utc::now(),
        })
        .await?;

    info!(
        "Request {} moved {} -> {} by hospital {}",
        request_id,
        current.status.as_str(),
        next.as_str(),
        auth.hospital_id
    );

    let revision = if next == RequestStatus::Rejected {
        state.notify(
            NotificationKind::RequestRemoved,
            auth.hospital_id,
            json!({ "request_id": request_id, "reason": "rejected" }),
        )
    } else {
        state.hub.bump()
    };

    Ok(ApiResponse::new(updated, revision))
}

// ========== 调拨 ==========

#[derive(Debug, Deserialize)]
pub struct AvailableQuery {
    pub request_id: Option<Uuid>,
    pub blood_type: Option<String>,
    /// 逗号分隔的献血者血型列表
    pub blood_types: Option<String>,
}

/// 列出可调拨的候选血液单位
pub async fn available_donations(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiQuery(query): ApiQuery<AvailableQuery>,
) -> ApiResult<ApiResponse<Vec<Donation>>> {
    let revision = state.hub.current();
    let donations = state.store.list_donations(auth.hospital_id).await?;
    let linked = state.store.linked_blood_ids(auth.hospital_id).await?;
    let today = state.today();

    let candidates = if let Some(request_id) = query.request_id {
        let request = state
            .store
            .get_request(auth.hospital_id, request_id)
            .await?
            .ok_or_else(|| BloodBankError::NotFound(format!("Request {} not found", request_id)))?;
        transfer_candidates(&request.blood_type, &donations, &linked, today)
    } else if let Some(recipient) = clean(query.blood_type) {
        transfer_candidates(&recipient, &donations, &linked, today)
    } else if let Some(list) = clean(query.blood_types) {
        let types = list
            .split(',')
            .map(|t| t.parse::<BloodType>().map(|bt| bt.label()))
            .collect::<Result<Vec<_>, _>>()?;
        candidates_for_types(&types, &donations, &linked, today)
    } else {
        return Err(BloodBankError::Validation(
            "One of request_id, blood_type or blood_types is required".to_string(),
        )
        .into());
    };

    if candidates.is_empty() {
        Ok(ApiResponse::new(candidates, revision).with_message("No available units"))
    } else {
        Ok(ApiResponse::new(candidates, revision))
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateTransferRequest {
    pub blood_id: Option<String>,
    pub request_id: Option<Uuid>,
    pub notes: Option<String>,
}

/// 以选定的血液单位完成用血请求
pub async fn create_transfer(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiJson(body): ApiJson<CreateTransferRequest>,
) -> ApiResult<ApiResponse<Transfer>> {
    let blood_id = clean(body.blood_id);
    require_fields(&[
        ("blood_id", blood_id.is_some()),
        ("request_id", body.request_id.is_some()),
    ])?;
    let (Some(blood_id), Some(request_id)) = (blood_id, body.request_id) else {
        return Err(BloodBankError::Validation("Missing required fields".to_string()).into());
    };

    let request = state
        .store
        .get_request(auth.hospital_id, request_id)
        .await?
        .ok_or_else(|| BloodBankError::NotFound(format!("Request {} not found", request_id)))?;

    let today = state.today();
    let donations = state.store.list_donations(auth.hospital_id).await?;
    let linked = state.store.linked_blood_ids(auth.hospital_id).await?;

    if transfer_candidates(&request.blood_type, &donations, &linked, today).is_empty() {
        return Err(BloodBankError::NoAvailableUnits {
            blood_type: request.blood_type.clone(),
        }
        .into());
    }

    let donation = donations
        .iter()
        .find(|d| d.blood_id == blood_id)
        .ok_or_else(|| BloodBankError::NotFound(format!("Blood unit {} not found", blood_id)))?;

    validate_selection(&request, donation, linked.contains(&blood_id), today)?;

    let transfer = state
        .store
        .fulfill_request(NewTransfer {
            transfer_id: Uuid::new_v4(),
            blood_id: blood_id.clone(),
            request_id,
            hospital_id: auth.hospital_id,
            transfer_date: Utc::now(),
            notes: clean(body.notes),
        })
        .await?;

    info!(
        "Transfer {}: unit {} ({}) fulfils request {}",
        transfer.transfer_id, blood_id, donation.blood_type, request_id
    );

    state.notify(NotificationKind::TransferCreated, auth.hospital_id, json!(transfer));
    let revision = state.notify(
        NotificationKind::RequestRemoved,
        auth.hospital_id,
        json!({ "request_id": request_id, "reason": "fulfilled" }),
    );

    Ok(ApiResponse::new(transfer, revision).with_message("Transfer completed"))
}

pub async fn list_transfers(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<ApiResponse<Vec<TransferDetails>>> {
    let revision = state.hub.current();
    let transfers = state.store.list_transfers(auth.hospital_id).await?;
    Ok(ApiResponse::new(transfers, revision))
}

// ========== 库存报表 ==========

#[derive(Debug, Deserialize)]
pub struct ThresholdQuery {
    pub threshold: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct DaysQuery {
    pub days: Option<i64>,
}

fn positive_days(days: Option<i64>, default: i64) -> Result<i64, BloodBankError> {
    match days {
        Some(d) if d < 0 => Err(BloodBankError::Validation("days must not be negative".to_string())),
        Some(d) => Ok(d),
        None => Ok(default),
    }
}

pub async fn low_stock(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiQuery(query): ApiQuery<ThresholdQuery>,
) -> ApiResult<ApiResponse<Vec<LowStockItem>>> {
    let revision = state.hub.current();
    let threshold = query.threshold.unwrap_or(state.settings.low_stock_threshold);
    let records = state.hospital_records(auth.hospital_id).await?;
    let snapshot = InventorySnapshot::new(
        &records.donations,
        &records.donors,
        &records.requests,
        state.today(),
    );
    Ok(ApiResponse::new(snapshot.low_stock(threshold), revision))
}

pub async fn expiring_blood(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiQuery(query): ApiQuery<DaysQuery>,
) -> ApiResult<ApiResponse<Vec<ExpiringUnit>>> {
    let revision = state.hub.current();
    let days = positive_days(query.days, state.settings.expiring_days)?;
    let records = state.hospital_records(auth.hospital_id).await?;
    let snapshot = InventorySnapshot::new(
        &records.donations,
        &records.donors,
        &records.requests,
        state.today(),
    );
    Ok(ApiResponse::new(snapshot.expiring_units(days), revision))
}

pub async fn analytics(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiQuery(query): ApiQuery<DaysQuery>,
) -> ApiResult<ApiResponse<AnalyticsReport>> {
    let revision = state.hub.current();
    let days = positive_days(query.days, state.settings.analytics_days)?.max(1);
    let records = state.hospital_records(auth.hospital_id).await?;
    let snapshot = InventorySnapshot::new(
        &records.donations,
        &records.donors,
        &records.requests,
        state.today(),
    );
    Ok(ApiResponse::new(snapshot.analytics(days), revision))
}
