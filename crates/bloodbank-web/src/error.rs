//! HTTP 响应封装
//!
//! 成功：`{"success": true, "data": ..., "revision": n}`
//! 失败：`{"success": false, "error": "...", "status": code}`

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use bloodbank_core::BloodBankError;
use serde::Serialize;
use serde_json::json;
use tracing::{error, warn};

/// 成功响应
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
    pub revision: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(data: T, revision: u64) -> Self {
        Self {
            success: true,
            data,
            revision,
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

/// API 错误，包装统一错误类型
#[derive(Debug)]
pub struct ApiError(pub BloodBankError);

pub type ApiResult<T> = std::result::Result<T, ApiError>;

impl<E> From<E> for ApiError
where
    E: Into<BloodBankError>,
{
    fn from(err: E) -> Self {
        ApiError(err.into())
    }
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match &self.0 {
            BloodBankError::Validation(_) => StatusCode::BAD_REQUEST,
            BloodBankError::NotFound(_) => StatusCode::NOT_FOUND,
            BloodBankError::Conflict(_) => StatusCode::CONFLICT,
            BloodBankError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            BloodBankError::Permission(_) => StatusCode::FORBIDDEN,
            BloodBankError::EmailNotVerified { .. } => StatusCode::FORBIDDEN,
            BloodBankError::OtpExpired => StatusCode::GONE,
            BloodBankError::NoAvailableUnits { .. } => StatusCode::CONFLICT,
            BloodBankError::InvalidStateTransition { .. } => StatusCode::CONFLICT,
            BloodBankError::ExternalService(_) => StatusCode::BAD_GATEWAY,
            BloodBankError::Config(_)
            | BloodBankError::Database(_)
            | BloodBankError::Serialization(_)
            | BloodBankError::Io(_)
            | BloodBankError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.0.to_string();

        if status.is_server_error() {
            error!("Request failed: {}", message);
        } else {
            warn!("Request rejected ({}): {}", status.as_u16(), message);
        }

        let mut body = json!({
            "success": false,
            "error": message,
            "status": status.as_u16(),
        });

        match &self.0 {
            BloodBankError::EmailNotVerified { hospital_id, email } => {
                body["requiresVerification"] = json!(true);
                body["hospital_id"] = json!(hospital_id);
                body["email"] = json!(email);
            }
            BloodBankError::OtpExpired => {
                body["remedy"] = json!("Request a new OTP");
            }
            BloodBankError::NoAvailableUnits { blood_type } => {
                body["blood_type"] = json!(blood_type);
                body["remedy"] = json!("Register compatible donations or choose another request");
            }
            _ => {}
        }

        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (BloodBankError::Validation("x".into()), 400),
            (BloodBankError::Unauthorized("x".into()), 401),
            (BloodBankError::Permission("x".into()), 403),
            (BloodBankError::NotFound("x".into()), 404),
            (BloodBankError::Conflict("x".into()), 409),
            (BloodBankError::NoAvailableUnits { blood_type: "O-".into() }, 409),
            (BloodBankError::OtpExpired, 410),
            (BloodBankError::Database("x".into()), 500),
        ];
        for (err, code) in cases {
            assert_eq!(ApiError(err).status_code().as_u16(), code);
        }
    }

    #[tokio::test]
    async fn test_verification_error_body() {
        let hospital_id = Uuid::new_v4();
        let response = ApiError(BloodBankError::EmailNotVerified {
            hospital_id,
            email: "a@b.org".to_string(),
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["status"], 403);
        assert_eq!(body["requiresVerification"], true);
        assert_eq!(body["hospital_id"], hospital_id.to_string());
    }
}
