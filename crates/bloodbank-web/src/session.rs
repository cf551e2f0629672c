//! 会话管理
//!
//! 会话生命周期：登录签发 → 刷新轮换 → 过期或注销。
//! 令牌为 HS256 JWT，服务端同时维护活动会话表，注销与刷新会使旧令牌立即失效。

use std::collections::HashMap;

use bloodbank_core::{BloodBankError, Hospital, Result};
use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

/// JWT Claims
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // 医院ID
    pub email: String,
    pub jti: String,
    pub iat: i64,
    pub exp: i64,
}

/// 已签发的会话
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// 当前请求的认证上下文
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub hospital_id: Uuid,
    pub email: String,
    pub session_id: String,
}

#[derive(Debug, Clone)]
struct SessionRecord {
    hospital_id: Uuid,
    expires_at: DateTime<Utc>,
}

/// 会话管理器
pub struct SessionManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    ttl: Duration,
    sessions: RwLock<HashMap<String, SessionRecord>>,
}

impl SessionManager {
    pub fn new(secret: &str, ttl_hours: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            ttl: Duration::hours(ttl_hours),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// 为医院签发新会话
    pub async fn issue(&self, hospital: &Hospital) -> Result<Session> {
        let now = Utc::now();
        let expires_at = now + self.ttl;
        let jti = Uuid::new_v4().to_string();

        let claims = Claims {
            sub: hospital.hospital_id.to_string(),
            email: hospital.email.clone(),
            jti: jti.clone(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| BloodBankError::Internal(format!("Failed to encode JWT: {}", e)))?;

        self.sessions.write().await.insert(
            jti,
            SessionRecord {
                hospital_id: hospital.hospital_id,
                expires_at,
            },
        );

        debug!("Issued session for hospital {}", hospital.hospital_id);
        Ok(Session { token, expires_at })
    }

    fn decode_claims(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(token, &self.decoding_key, &Validation::default())
            .map(|data| data.claims)
            .map_err(|e| BloodBankError::Unauthorized(format!("Invalid token: {}", e)))
    }

    /// 校验令牌：签名、有效期以及会话是否仍然活动
    pub async fn validate(&self, token: &str) -> Result<AuthContext> {
        let claims = self.decode_claims(token)?;

        let hospital_id = Uuid::parse_str(&claims.sub)
            .map_err(|_| BloodBankError::Unauthorized("Invalid token subject".to_string()))?;

        let sessions = self.sessions.read().await;
        match sessions.get(&claims.jti) {
            Some(record) if record.hospital_id == hospital_id && record.expires_at > Utc::now() => {
                Ok(AuthContext {
                    hospital_id,
                    email: claims.email,
                    session_id: claims.jti,
                })
            }
            _ => Err(BloodBankError::Unauthorized("Session expired or revoked".to_string())),
        }
    }

    /// 轮换令牌：旧会话失效，签发新会话
    pub async fn refresh(&self, context: &AuthContext, hospital: &Hospital) -> Result<Session> {
        self.revoke(&context.session_id).await;
        let session = self.issue(hospital).await?;
        info!("Session refreshed for hospital {}", context.hospital_id);
        Ok(session)
    }

    /// 注销会话，返回会话是否存在
    pub async fn revoke(&self, session_id: &str) -> bool {
        self.sessions.write().await.remove(session_id).is_some()
    }

    /// 注销医院的全部会话（例如重置密码后）
    pub async fn revoke_all(&self, hospital_id: Uuid) -> usize {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, record| record.hospital_id != hospital_id);
        before - sessions.len()
    }

    /// 清理已过期的会话记录
    pub async fn purge_expired(&self) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, record| record.expires_at > now);
        before - sessions.len()
    }

    pub async fn active_sessions(&self) -> usize {
        self.sessions.read().await.len()
    }
}
