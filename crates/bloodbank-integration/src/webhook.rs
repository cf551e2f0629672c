//! 外部 Webhook 转发
//!
//! 将推送中心的事件以带签名的 JSON POST 转发给外部系统：
//! - 订阅按医院隔离，可选择事件类型
//! - `X-BloodBank-Signature: sha256=...` 签名头
//! - 发送失败只记录日志，不重试

use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::notifications::{Notification, NotificationKind};

pub const SIGNATURE_HEADER: &str = "X-BloodBank-Signature";
pub const EVENT_HEADER: &str = "X-BloodBank-Event";

/// Webhook事件数据
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    pub id: String,
    pub event_type: NotificationKind,
    pub hospital_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub revision: u64,
    pub data: serde_json::Value,
    pub source: String,
}

impl From<&Notification> for WebhookEvent {
    fn from(notification: &Notification) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            event_type: notification.event,
            hospital_id: notification.hospital_id,
            timestamp: notification.timestamp,
            revision: notification.revision,
            data: notification.data.clone(),
            source: "bloodbank".to_string(),
        }
    }
}

/// Webhook订阅配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookSubscription {
    pub id: String,
    pub hospital_id: Uuid,
    pub url: String,
    pub events: Vec<NotificationKind>,
    #[serde(skip_serializing)]
    pub secret: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl WebhookSubscription {
    pub fn new(
        hospital_id: Uuid,
        url: String,
        events: Vec<NotificationKind>,
        secret: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            hospital_id,
            url,
            events,
            secret,
            active: true,
            created_at: Utc::now(),
        }
    }

    /// 检查是否对指定事件感兴趣
    pub fn is_interested_in(&self, event: &WebhookEvent) -> bool {
        self.active && self.hospital_id == event.hospital_id && self.events.contains(&event.event_type)
    }

    /// 生成签名
    pub fn generate_signature(&self, payload: &str) -> Option<String> {
        use sha2::{Digest, Sha256};

        self.secret.as_ref().map(|secret| {
            let mut hasher = Sha256::new();
            hasher.update(payload);
            hasher.update(secret);
            format!("sha256={:x}", hasher.finalize())
        })
    }
}

/// Webhook订阅请求
#[derive(Debug, Clone, Deserialize)]
pub struct WebhookSubscriptionRequest {
    pub url: String,
    pub events: Vec<String>,
    pub secret: Option<String>,
    pub active: Option<bool>,
}

/// Webhook管理器
pub struct WebhookManager {
    subscriptions: RwLock<HashMap<String, WebhookSubscription>>,
    client: reqwest::Client,
}

impl WebhookManager {
    pub fn new() -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            client: reqwest::Client::new(),
        }
    }

    /// 订阅Webhook事件
    pub async fn subscribe(
        &self,
        hospital_id: Uuid,
        request: WebhookSubscriptionRequest,
    ) -> Result<WebhookSubscription> {
        if !(request.url.starts_with("http://") || request.url.starts_with("https://")) {
            return Err(anyhow::anyhow!("Webhook URL must be http(s): {}", request.url));
        }

        let mut events = Vec::new();
        for event_str in &request.events {
            match NotificationKind::try_from(event_str.as_str()) {
                Ok(kind) if !events.contains(&kind) => events.push(kind),
                Ok(_) => {}
                Err(e) => warn!("Invalid event type '{}': {}", event_str, e),
            }
        }

        if events.is_empty() {
            return Err(anyhow::anyhow!("No valid event types specified"));
        }

        let mut subscription =
            WebhookSubscription::new(hospital_id, request.url, events, request.secret);
        subscription.active = request.active.unwrap_or(true);

        self.subscriptions
            .write()
            .await
            .insert(subscription.id.clone(), subscription.clone());

        info!(
            "Created webhook subscription {} for hospital {}",
            subscription.id, hospital_id
        );
        Ok(subscription)
    }

    /// 取消订阅，只能删除本医院的订阅
    pub async fn unsubscribe(&self, hospital_id: Uuid, subscription_id: &str) -> Result<()> {
        let mut subscriptions = self.subscriptions.write().await;
        match subscriptions.get(subscription_id) {
            Some(sub) if sub.hospital_id == hospital_id => {
                subscriptions.remove(subscription_id);
                info!("Webhook subscription {} removed by hospital {}", subscription_id, hospital_id);
                Ok(())
            }
            _ => Err(anyhow::anyhow!("Subscription not found: {}", subscription_id)),
        }
    }

    /// 列出某医院的订阅
    pub async fn list_subscriptions(&self, hospital_id: Uuid) -> Vec<WebhookSubscription> {
        let subscriptions = self.subscriptions.read().await;
        let mut result: Vec<WebhookSubscription> = subscriptions
            .values()
            .filter(|sub| sub.hospital_id == hospital_id)
            .cloned()
            .collect();
        result.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        result
    }

    /// 发送事件到所有感兴趣的订阅者，返回成功投递数
    pub async fn emit_event(&self, event: WebhookEvent) -> Result<usize> {
        let interested: Vec<WebhookSubscription> = self
            .subscriptions
            .read()
            .await
            .values()
            .filter(|sub| sub.is_interested_in(&event))
            .cloned()
            .collect();

        if interested.is_empty() {
            return Ok(0);
        }

        let payload = serde_json::to_string(&event)?;

        let mut handles = Vec::with_capacity(interested.len());
        for subscription in interested {
            let payload = payload.clone();
            let client = self.client.clone();
            let event_name = event.event_type.as_str();

            handles.push(tokio::spawn(async move {
                Self::send_webhook(&client, &subscription, event_name, &payload).await
            }));
        }

        let mut delivered = 0;
        for handle in handles {
            match handle.await {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(_)) => {}
                Err(e) => error!("Webhook delivery task panicked: {}", e),
            }
        }

        debug!(
            "Event {} (revision {}) delivered to {} webhook(s)",
            event.event_type.as_str(),
            event.revision,
            delivered
        );
        Ok(delivered)
    }

    async fn send_webhook(
        client: &reqwest::Client,
        subscription: &WebhookSubscription,
        event_name: &str,
        payload: &str,
    ) -> Result<()> {
        let mut request = client
            .post(&subscription.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header("User-Agent", "BloodBank-Webhook/1.0")
            .header(EVENT_HEADER, event_name)
            .body(payload.to_string());

        if let Some(signature) = subscription.generate_signature(payload) {
            request = request.header(SIGNATURE_HEADER, signature);
        }

        let response = request.send().await.map_err(|e| {
            warn!("Webhook {} unreachable at {}: {}", subscription.id, subscription.url, e);
            anyhow::anyhow!("Webhook {} unreachable: {}", subscription.id, e)
        })?;

        let status = response.status();
        if !status.is_success() {
            warn!("Webhook {} rejected {} with HTTP {}", subscription.id, event_name, status);
            return Err(anyhow::anyhow!("Webhook {} returned HTTP {}", subscription.id, status));
        }

        debug!("Delivered {} to webhook {}", event_name, subscription.id);
        Ok(())
    }
}

impl Default for WebhookManager {
    fn default() -> Self {
        Self::new()
    }
}
