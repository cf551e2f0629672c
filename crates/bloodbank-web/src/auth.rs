//! 医院账户认证
//!
//! 注册、登录、邮箱验证码、重置密码，以及 Bearer 令牌中间件。

use std::collections::HashMap;
use std::sync::Arc;

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
    Argon2, PasswordHash, PasswordVerifier,
};
use async_trait::async_trait;
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
    Extension,
};
use bloodbank_core::{utils::DEV_JWT_SECRET, BloodBankError, Hospital, Result};
use bloodbank_database::{BloodBankStore, NewHospital};
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{ApiResponse, ApiResult};
use crate::extract::ApiJson;
use crate::handlers::clean;
use crate::session::{AuthContext, Session, SessionManager};
use crate::state::AppState;

const MIN_PASSWORD_LEN: usize = 6;
const MAX_OTP_ISSUES: u32 = 5;

/// 认证配置
#[derive(Debug, Clone)]
pub struct AuthSettings {
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
    pub otp_ttl_minutes: i64,
    pub otp_max_attempts: u32,
    pub require_email_verification: bool,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            jwt_secret: DEV_JWT_SECRET.to_string(),
            token_ttl_hours: 24,
            otp_ttl_minutes: 10,
            otp_max_attempts: 5,
            require_email_verification: true,
        }
    }
}

// ========== 密码 ==========

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| BloodBankError::Internal(format!("Failed to hash password: {}", e)))
}

pub fn verify_password(password: &str, password_hash: &str) -> bool {
    PasswordHash::new(password_hash)
        .map(|parsed| Argon2::default().verify_password(password.as_bytes(), &parsed).is_ok())
        .unwrap_or(false)
}

// ========== 验证码 ==========

/// 验证码用途
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OtpPurpose {
    EmailVerification,
    PasswordReset,
}

impl OtpPurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            OtpPurpose::EmailVerification => "email verification",
            OtpPurpose::PasswordReset => "password reset",
        }
    }
}

/// 验证码投递通道
#[async_trait]
pub trait OtpDelivery: Send + Sync {
    async fn deliver(&self, email: &str, code: &str, purpose: OtpPurpose) -> Result<()>;
}

/// 默认投递方式：写入日志
#[derive(Debug, Default)]
pub struct LoggingOtpDelivery;

#[async_trait]
impl OtpDelivery for LoggingOtpDelivery {
    async fn deliver(&self, email: &str, code: &str, purpose: OtpPurpose) -> Result<()> {
        info!("OTP for {} ({}): {}", email, purpose.as_str(), code);
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct OtpEntry {
    code: String,
    expires_at: DateTime<Utc>,
    /// 窗口内累计的错误次数，重发不清零
    failed_attempts: u32,
    issued: u32,
    window_ends: DateTime<Utc>,
}

/// 验证码存储，每个邮箱每种用途同时只有一个有效验证码
///
/// 限额按窗口计算（窗口长度等于验证码有效期）：窗口内最多签发
/// `MAX_OTP_ISSUES` 次，错误次数跨重发累计，用尽后到窗口结束前不再签发。
pub struct OtpStore {
    entries: RwLock<HashMap<(String, OtpPurpose), OtpEntry>>,
    ttl: Duration,
    max_attempts: u32,
}

impl OtpStore {
    pub fn new(ttl_minutes: i64, max_attempts: u32) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl: Duration::minutes(ttl_minutes),
            max_attempts,
        }
    }

    fn generate_code() -> String {
        format!("{:06}", rand::thread_rng().gen_range(0..1_000_000))
    }

    /// 签发新验证码，替换旧的
    pub async fn issue(&self, email: &str, purpose: OtpPurpose, now: DateTime<Utc>) -> Result<String> {
        let code = Self::generate_code();
        let mut entries = self.entries.write().await;

        match entries.get_mut(&(email.to_string(), purpose)) {
            Some(entry) if entry.window_ends > now => {
                if entry.issued >= MAX_OTP_ISSUES || entry.failed_attempts >= self.max_attempts {
                    warn!("OTP limit reached for {} ({})", email, purpose.as_str());
                    return Err(BloodBankError::Validation(
                        "Too many OTP requests, try again later".to_string(),
                    ));
                }
                entry.code = code.clone();
                entry.expires_at = now + self.ttl;
                entry.issued += 1;
            }
            _ => {
                entries.insert(
                    (email.to_string(), purpose),
                    OtpEntry {
                        code: code.clone(),
                        expires_at: now + self.ttl,
                        failed_attempts: 0,
                        issued: 1,
                        window_ends: now + self.ttl,
                    },
                );
            }
        }
        Ok(code)
    }

    /// 校验验证码，成功后作废
    pub async fn verify(
        &self,
        email: &str,
        purpose: OtpPurpose,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let key = (email.to_string(), purpose);
        let mut entries = self.entries.write().await;

        let entry = entries.get_mut(&key).ok_or_else(|| {
            BloodBankError::Validation("No pending OTP for this email, request a new one".to_string())
        })?;

        if entry.failed_attempts >= self.max_attempts {
            return Err(BloodBankError::Validation(
                "Too many invalid attempts, request a new OTP later".to_string(),
            ));
        }

        if entry.expires_at <= now {
            // 窗口未结束时保留计数
            if entry.window_ends <= now {
                entries.remove(&key);
            }
            return Err(BloodBankError::OtpExpired);
        }

        if entry.code != code.trim() {
            entry.failed_attempts += 1;
            if entry.failed_attempts >= self.max_attempts {
                return Err(BloodBankError::Validation(
                    "Too many invalid attempts, request a new OTP later".to_string(),
                ));
            }
            return Err(BloodBankError::Validation("Invalid OTP".to_string()));
        }

        entries.remove(&key);
        Ok(())
    }
}

// ========== 认证服务 ==========

/// 注册请求
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub hospital_name: String,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    #[serde(alias = "postal_code")]
    pub postal_code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyOtpRequest {
    pub email: String,
    pub otp: String,
}

#[derive(Debug, Deserialize)]
pub struct EmailRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    pub email: String,
    pub new_password: String,
    pub otp: Option<String>,
}

/// 登录成功的返回
#[derive(Debug, Serialize)]
pub struct SessionResponse {
    #[serde(flatten)]
    pub session: Session,
    pub hospital: Hospital,
}

/// 需要邮箱验证时的返回
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationRequired {
    pub requires_verification: bool,
    #[serde(rename = "hospital_id")]
    pub hospital_id: Uuid,
    pub email: String,
}

/// 注册结果
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum RegisterOutcome {
    VerificationRequired(VerificationRequired),
    Session(SessionResponse),
}

fn normalize_email(email: &str) -> Result<String> {
    let email = email.trim().to_lowercase();
    let valid = email
        .split_once('@')
        .map(|(local, domain)| !local.is_empty() && domain.contains('.'))
        .unwrap_or(false);
    if !valid {
        return Err(BloodBankError::Validation(format!("Invalid email address: {}", email)));
    }
    Ok(email)
}

fn check_password(password: &str) -> Result<()> {
    if password.len() < MIN_PASSWORD_LEN {
        return Err(BloodBankError::Validation(format!(
            "Password must be at least {} characters",
            MIN_PASSWORD_LEN
        )));
    }
    Ok(())
}

/// 认证服务
pub struct AuthService {
    store: Arc<dyn BloodBankStore>,
    sessions: SessionManager,
    otps: OtpStore,
    delivery: Arc<dyn OtpDelivery>,
    require_email_verification: bool,
}

impl AuthService {
    pub fn new(store: Arc<dyn BloodBankStore>, settings: &AuthSettings) -> Self {
        Self {
            store,
            sessions: SessionManager::new(&settings.jwt_secret, settings.token_ttl_hours),
            otps: OtpStore::new(settings.otp_ttl_minutes, settings.otp_max_attempts),
            delivery: Arc::new(LoggingOtpDelivery),
            require_email_verification: settings.require_email_verification,
        }
    }

    pub fn with_delivery(mut self, delivery: Arc<dyn OtpDelivery>) -> Self {
        self.delivery = delivery;
        self
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    async fn send_otp(&self, email: &str, purpose: OtpPurpose) -> Result<()> {
        let code = self.otps.issue(email, purpose, Utc::now()).await?;
        self.delivery.deliver(email, &code, purpose).await
    }

    async fn hospital_by_email(&self, email: &str) -> Result<Hospital> {
        self.store
            .find_hospital_by_email(email)
            .await?
            .ok_or_else(|| BloodBankError::NotFound(format!("No account registered for {}", email)))
    }

    async fn open_session(&self, hospital: Hospital) -> Result<SessionResponse> {
        let session = self.sessions.issue(&hospital).await?;
        Ok(SessionResponse { session, hospital })
    }

    pub async fn register(&self, request: RegisterRequest) -> Result<RegisterOutcome> {
        let email = normalize_email(&request.email)?;
        check_password(&request.password)?;
        let name = request.hospital_name.trim().to_string();
        if name.is_empty() {
            return Err(BloodBankError::Validation("Hospital name is required".to_string()));
        }

        let hospital = self
            .store
            .create_hospital(NewHospital {
                hospital_id: Uuid::new_v4(),
                name,
                email: email.clone(),
                phone: clean(request.phone),
                address: clean(request.address),
                city: clean(request.city),
                state: clean(request.state),
                postal_code: clean(request.postal_code),
                email_verified: !self.require_email_verification,
                password_hash: hash_password(&request.password)?,
            })
            .await?;

        info!("Registered hospital {} ({})", hospital.name, hospital.hospital_id);

        if self.require_email_verification {
            self.send_otp(&email, OtpPurpose::EmailVerification).await?;
            return Ok(RegisterOutcome::VerificationRequired(VerificationRequired {
                requires_verification: true,
                hospital_id: hospital.hospital_id,
                email,
            }));
        }

        Ok(RegisterOutcome::Session(self.open_session(hospital).await?))
    }

    pub async fn login(&self, request: LoginRequest) -> Result<SessionResponse> {
        let email = request.email.trim().to_lowercase();
        let invalid = || BloodBankError::Unauthorized("Invalid email or password".to_string());

        let hospital = self.store.find_hospital_by_email(&email).await?.ok_or_else(invalid)?;
        if !verify_password(&request.password, &hospital.password_hash) {
            warn!("Failed login for {}", email);
            return Err(invalid());
        }

        if !hospital.email_verified {
            self.send_otp(&email, OtpPurpose::EmailVerification).await?;
            return Err(BloodBankError::EmailNotVerified {
                hospital_id: hospital.hospital_id,
                email,
            });
        }

        info!("Hospital {} logged in", hospital.hospital_id);
        self.open_session(hospital).await
    }

    pub async fn verify_otp(&self, request: VerifyOtpRequest) -> Result<SessionResponse> {
        let email = request.email.trim().to_lowercase();
        let hospital = self.hospital_by_email(&email).await?;

        self.otps
            .verify(&email, OtpPurpose::EmailVerification, &request.otp, Utc::now())
            .await?;

        if !hospital.email_verified {
            self.store.set_email_verified(hospital.hospital_id).await?;
            info!("Email verified for hospital {}", hospital.hospital_id);
        }

        let hospital = Hospital {
            email_verified: true,
            ..hospital
        };
        self.open_session(hospital).await
    }

    pub async fn resend_otp(&self, request: EmailRequest) -> Result<String> {
        let email = request.email.trim().to_lowercase();
        let hospital = self.hospital_by_email(&email).await?;
        if hospital.email_verified {
            return Err(BloodBankError::Conflict("Email is already verified".to_string()));
        }
        self.send_otp(&email, OtpPurpose::EmailVerification).await?;
        Ok(email)
    }

    /// 两步重置：无验证码时发送验证码；带验证码时校验并更新密码
    pub async fn reset_password(&self, request: ResetPasswordRequest) -> Result<Option<VerificationRequired>> {
        let email = request.email.trim().to_lowercase();
        check_password(&request.new_password)?;
        let hospital = self.hospital_by_email(&email).await?;

        let Some(otp) = request.otp.filter(|o| !o.trim().is_empty()) else {
            self.send_otp(&email, OtpPurpose::PasswordReset).await?;
            return Ok(Some(VerificationRequired {
                requires_verification: true,
                hospital_id: hospital.hospital_id,
                email,
            }));
        };

        self.otps
            .verify(&email, OtpPurpose::PasswordReset, &otp, Utc::now())
            .await?;

        let hash = hash_password(&request.new_password)?;
        self.store.update_password(hospital.hospital_id, &hash).await?;
        let revoked = self.sessions.revoke_all(hospital.hospital_id).await;
        info!(
            "Password reset for hospital {}, {} sessions revoked",
            hospital.hospital_id, revoked
        );
        Ok(None)
    }

    pub async fn current_hospital(&self, context: &AuthContext) -> Result<Hospital> {
        self.store
            .get_hospital(context.hospital_id)
            .await?
            .ok_or_else(|| BloodBankError::Unauthorized("Account no longer exists".to_string()))
    }
}

// ========== 中间件 ==========

pub fn bearer_token(request: &Request) -> Option<&str> {
    request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// 认证中间件，把 [`AuthContext`] 放入请求扩展
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> ApiResult<Response> {
    let token = bearer_token(&request)
        .ok_or_else(|| BloodBankError::Unauthorized("Missing bearer token".to_string()))?;

    let context = state.auth.sessions().validate(token).await?;
    request.extensions_mut().insert(context);
    Ok(next.run(request).await)
}

// ========== 处理器 ==========

pub async fn register_handler(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<RegisterRequest>,
) -> ApiResult<ApiResponse<RegisterOutcome>> {
    let outcome = state.auth.register(request).await?;
    let revision = state.hub.bump();
    let response = ApiResponse::new(outcome, revision);
    Ok(match &response.data {
        RegisterOutcome::VerificationRequired(_) => {
            response.with_message("Registration successful, check your email for the OTP")
        }
        RegisterOutcome::Session(_) => response.with_message("Registration successful"),
    })
}

pub async fn login_handler(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<LoginRequest>,
) -> ApiResult<ApiResponse<SessionResponse>> {
    let session = state.auth.login(request).await?;
    Ok(ApiResponse::new(session, state.hub.current()))
}

pub async fn verify_otp_handler(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<VerifyOtpRequest>,
) -> ApiResult<ApiResponse<SessionResponse>> {
    let session = state.auth.verify_otp(request).await?;
    Ok(ApiResponse::new(session, state.hub.bump()).with_message("Email verified"))
}

pub async fn resend_otp_handler(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<EmailRequest>,
) -> ApiResult<ApiResponse<Value>> {
    let email = state.auth.resend_otp(request).await?;
    Ok(ApiResponse::new(json!({ "email": email }), state.hub.current()).with_message("OTP sent"))
}

pub async fn reset_password_handler(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<ResetPasswordRequest>,
) -> ApiResult<ApiResponse<Value>> {
    match state.auth.reset_password(request).await? {
        Some(pending) => Ok(ApiResponse::new(json!(pending), state.hub.current())
            .with_message("OTP sent, submit it with the new password")),
        None => Ok(ApiResponse::new(json!({ "reset": true }), state.hub.bump())
            .with_message("Password updated")),
    }
}

pub async fn refresh_handler(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
) -> ApiResult<ApiResponse<SessionResponse>> {
    let hospital = state.auth.current_hospital(&context).await?;
    let session = state.auth.sessions().refresh(&context, &hospital).await?;
    Ok(ApiResponse::new(SessionResponse { session, hospital }, state.hub.current()))
}

pub async fn logout_handler(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
) -> ApiResult<ApiResponse<Value>> {
    state.auth.sessions().revoke(&context.session_id).await;
    info!("Hospital {} logged out", context.hospital_id);
    Ok(ApiResponse::new(json!({ "loggedOut": true }), state.hub.current()))
}

pub async fn me_handler(
    State(state): State<AppState>,
    Extension(context): Extension<AuthContext>,
) -> ApiResult<ApiResponse<Hospital>> {
    let hospital = state.auth.current_hospital(&context).await?;
    Ok(ApiResponse::new(hospital, state.hub.current()))
}
