//! HTTP处理器：献血者、献血记录、看板、聊天助手与 Webhook 订阅

use axum::{
    extract::State,
    response::IntoResponse,
    Extension, Json,
};
use bloodbank_assistant::{AssistantContext, AssistantReply};
use bloodbank_core::{utils::generate_blood_id, BloodBankError, BloodType, DonationRecord, Donor};
use bloodbank_database::{NewDonation, NewDonor};
use bloodbank_integration::{NotificationKind, WebhookSubscription, WebhookSubscriptionRequest};
use bloodbank_workflow::{calculate_expiry, parse_collection_date, DashboardStats, InventorySnapshot};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ApiResponse, ApiResult};
use crate::extract::{ApiJson, ApiPath};
use crate::session::AuthContext;
use crate::state::AppState;

const MAX_VOLUME_ML: i32 = 1000;

/// 去掉首尾空白，空串视为缺失
pub(crate) fn clean(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// 缺失的必填字段统一报 400
pub(crate) fn require_fields(fields: &[(&str, bool)]) -> Result<(), BloodBankError> {
    let missing: Vec<&str> = fields
        .iter()
        .filter(|(_, present)| !present)
        .map(|(name, _)| *name)
        .collect();
    if missing.is_empty() {
        Ok(())
    } else {
        Err(BloodBankError::Validation(format!(
            "Missing required fields: {}",
            missing.join(", ")
        )))
    }
}

/// 服务描述
pub async fn api_root() -> impl IntoResponse {
    Json(json!({
        "service": "Blood Bank Inventory API",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "running",
        "endpoints": {
            "health": "/health",
            "api": "/api",
            "websocket": "/api/ws"
        }
    }))
}

/// 健康检查
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let database = match state.store.health_check().await {
        Ok(()) => "healthy",
        Err(_) => "unavailable",
    };

    Json(json!({
        "status": if database == "healthy" { "healthy" } else { "degraded" },
        "database": database,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "revision": state.hub.current(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

// ========== 献血者 ==========

#[derive(Debug, Deserialize)]
pub struct CreateDonorRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub date_of_birth: Option<String>,
    pub gender: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
}

pub async fn list_donors(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<ApiResponse<Vec<Donor>>> {
    // 先取版本号再读数据，响应的版本号不会比数据新
    let revision = state.hub.current();
    let donors = state.store.list_donors(auth.hospital_id).await?;
    Ok(ApiResponse::new(donors, revision))
}

pub async fn create_donor(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiJson(request): ApiJson<CreateDonorRequest>,
) -> ApiResult<ApiResponse<Donor>> {
    let first_name = clean(request.first_name);
    let last_name = clean(request.last_name);
    require_fields(&[
        ("first_name", first_name.is_some()),
        ("last_name", last_name.is_some()),
    ])?;

    let date_of_birth = clean(request.date_of_birth)
        .map(|d| {
            NaiveDate::parse_from_str(&d, "%Y-%m-%d")
                .map_err(|_| BloodBankError::Validation(format!("Invalid date_of_birth: {}", d)))
        })
        .transpose()?;

    let donor = state
        .store
        .create_donor(NewDonor {
            donor_id: Uuid::new_v4(),
            hospital_id: auth.hospital_id,
            first_name: first_name.unwrap_or_default(),
            last_name: last_name.unwrap_or_default(),
            date_of_birth,
            gender: clean(request.gender),
            phone: clean(request.phone),
            email: clean(request.email),
            address: clean(request.address),
            city: clean(request.city),
            state: clean(request.state),
            postal_code: clean(request.postal_code),
        })
        .await?;

    info!("Donor {} registered for hospital {}", donor.donor_id, auth.hospital_id);
    Ok(ApiResponse::new(donor, state.hub.bump()).with_message("Donor registered"))
}

// ========== 献血记录 ==========

/// 登记献血；过期日期总是由服务端推算，请求中的 `expiry_date` 不会被读取
#[derive(Debug, Deserialize)]
pub struct CreateDonationRequest {
    pub donor_id: Option<Uuid>,
    /// 完整标签（"O-"）或只含 ABO 组（配合 `rh_factor`）
    pub blood_type: Option<String>,
    pub rh_factor: Option<String>,
    pub component_type: Option<String>,
    pub volume_ml: Option<i32>,
    pub collection_date: Option<String>,
    pub storage_location: Option<String>,
}

fn parse_donation_blood_type(blood_type: &str, rh_factor: Option<&str>) -> Result<BloodType, BloodBankError> {
    match rh_factor {
        Some(rh) => BloodType::from_parts(blood_type, rh),
        None => blood_type.parse(),
    }
}

pub async fn list_donations(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<ApiResponse<Vec<DonationRecord>>> {
    let revision = state.hub.current();
    let records = state.store.list_donation_records(auth.hospital_id).await?;
    Ok(ApiResponse::new(records, revision))
}

pub async fn create_donation(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiJson(request): ApiJson<CreateDonationRequest>,
) -> ApiResult<ApiResponse<DonationRecord>> {
    let blood_type = clean(request.blood_type);
    let component_type = clean(request.component_type);
    let collection_date = clean(request.collection_date);
    require_fields(&[
        ("donor_id", request.donor_id.is_some()),
        ("blood_type", blood_type.is_some()),
        ("component_type", component_type.is_some()),
        ("volume_ml", request.volume_ml.is_some()),
        ("collection_date", collection_date.is_some()),
    ])?;

    let (Some(donor_id), Some(blood_type), Some(component_type), Some(volume_ml), Some(collection_date)) = (
        request.donor_id,
        blood_type,
        component_type,
        request.volume_ml,
        collection_date,
    ) else {
        return Err(BloodBankError::Validation("Missing required fields".to_string()).into());
    };

    let rh_factor = clean(request.rh_factor);
    let blood_type = parse_donation_blood_type(&blood_type, rh_factor.as_deref())?;
    let collection_date = parse_collection_date(&collection_date)?;

    if !(1..=MAX_VOLUME_ML).contains(&volume_ml) {
        return Err(BloodBankError::Validation(format!(
            "volume_ml must be between 1 and {}",
            MAX_VOLUME_ML
        ))
        .into());
    }
    if collection_date > state.today() {
        return Err(BloodBankError::Validation("collection_date cannot be in the future".to_string()).into());
    }

    let donor = state
        .store
        .get_donor(auth.hospital_id, donor_id)
        .await?
        .ok_or_else(|| BloodBankError::NotFound(format!("Donor {} not found", donor_id)))?;

    let expiry_date = calculate_expiry(&component_type, collection_date);
    let donation = state
        .store
        .create_donation(NewDonation {
            blood_id: generate_blood_id(collection_date),
            donor_id,
            hospital_id: auth.hospital_id,
            blood_type,
            component_type,
            volume_ml,
            collection_date,
            expiry_date,
            storage_location: clean(request.storage_location),
        })
        .await?;

    info!(
        "Donation {} ({} {}) recorded for hospital {}",
        donation.blood_id, donation.blood_type, donation.component_type, auth.hospital_id
    );

    let record = DonationRecord {
        donation,
        donor_name: Some(donor.full_name()),
    };
    let revision = state.notify(
        NotificationKind::DonationRecorded,
        auth.hospital_id,
        json!(record),
    );
    Ok(ApiResponse::new(record, revision).with_message("Donation recorded"))
}

// ========== 看板 ==========

pub async fn dashboard_stats(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<ApiResponse<DashboardStats>> {
    let revision = state.hub.current();
    let records = state.hospital_records(auth.hospital_id).await?;
    let snapshot = InventorySnapshot::new(
        &records.donations,
        &records.donors,
        &records.requests,
        state.today(),
    );
    Ok(ApiResponse::new(snapshot.dashboard_stats(), revision))
}

// ========== 聊天助手 ==========

#[derive(Debug, Deserialize)]
pub struct ChatMessageRequest {
    pub message: Option<String>,
}

async fn assistant_context(state: &AppState, hospital_id: Uuid) -> bloodbank_core::Result<AssistantContext> {
    let records = state.hospital_records(hospital_id).await?;
    let transfers = state.store.list_transfers(hospital_id).await?;
    let snapshot = InventorySnapshot::new(
        &records.donations,
        &records.donors,
        &records.requests,
        state.today(),
    );
    Ok(AssistantContext {
        stats: snapshot.dashboard_stats(),
        transfers,
        donor_activity: snapshot.donor_activity(),
    })
}

pub async fn chatbot_message(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiJson(request): ApiJson<ChatMessageRequest>,
) -> ApiResult<ApiResponse<AssistantReply>> {
    let revision = state.hub.current();
    let message = clean(request.message)
        .ok_or_else(|| BloodBankError::Validation("Message is required".to_string()))?;

    // 数据读取失败时助手仍然作答，只是没有实时数据
    let context = match assistant_context(&state, auth.hospital_id).await {
        Ok(context) => Some(context),
        Err(e) => {
            warn!("Chatbot data unavailable for hospital {}: {}", auth.hospital_id, e);
            None
        }
    };

    debug!("Chatbot message for hospital {}", auth.hospital_id);
    let reply = state.assistant.respond(&message, context.as_ref()).await;
    Ok(ApiResponse::new(reply, revision))
}

// ========== Webhook 订阅 ==========

pub async fn list_webhooks(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
) -> ApiResult<ApiResponse<Vec<WebhookSubscription>>> {
    let revision = state.hub.current();
    let subscriptions = state.webhooks.list_subscriptions(auth.hospital_id).await;
    Ok(ApiResponse::new(subscriptions, revision))
}

pub async fn create_webhook(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiJson(request): ApiJson<WebhookSubscriptionRequest>,
) -> ApiResult<ApiResponse<WebhookSubscription>> {
    let subscription = state
        .webhooks
        .subscribe(auth.hospital_id, request)
        .await
        .map_err(|e| BloodBankError::Validation(e.to_string()))?;
    Ok(ApiResponse::new(subscription, state.hub.current()))
}

pub async fn delete_webhook(
    State(state): State<AppState>,
    Extension(auth): Extension<AuthContext>,
    ApiPath(subscription_id): ApiPath<String>,
) -> ApiResult<ApiResponse<Value>> {
    state
        .webhooks
        .unsubscribe(auth.hospital_id, &subscription_id)
        .await
        .map_err(|e| BloodBankError::NotFound(e.to_string()))?;
    Ok(ApiResponse::new(json!({ "id": subscription_id }), state.hub.current()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_fields_lists_missing() {
        assert!(require_fields(&[("a", true), ("b", true)]).is_ok());
        let err = require_fields(&[("a", false), ("b", true), ("c", false)]).unwrap_err();
        assert_eq!(err.to_string(), "验证错误: Missing required fields: a, c");
    }

    #[test]
    fn test_parse_donation_blood_type() {
        assert_eq!(parse_donation_blood_type("O", Some("-")).unwrap(), BloodType::O_NEG);
        assert_eq!(parse_donation_blood_type("AB+", None).unwrap(), BloodType::AB_POS);
        assert!(parse_donation_blood_type("C", Some("+")).is_err());
        assert!(parse_donation_blood_type("AB", None).is_err());
    }

    #[test]
    fn test_clean() {
        assert_eq!(clean(Some("  x ".to_string())), Some("x".to_string()));
        assert_eq!(clean(Some("   ".to_string())), None);
        assert_eq!(clean(None), None);
    }
}
