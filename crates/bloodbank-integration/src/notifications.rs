//! 实时推送通知中心
//!
//! 基于 tokio broadcast 通道，事件带医院 ID，订阅方只收到本医院的事件。
//! 每次数据变更都会递增全局修订号，客户端据此丢弃过期响应。

use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};
use uuid::Uuid;

/// 推送事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotificationKind {
    NewRequest,
    RequestRemoved,
    TransferCreated,
    DonationRecorded,
}

impl NotificationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NewRequest => "new-request",
            Self::RequestRemoved => "request-removed",
            Self::TransferCreated => "transfer-created",
            Self::DonationRecorded => "donation-recorded",
        }
    }
}

impl TryFrom<&str> for NotificationKind {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self> {
        match value {
            "new-request" => Ok(Self::NewRequest),
            "request-removed" => Ok(Self::RequestRemoved),
            "transfer-created" => Ok(Self::TransferCreated),
            "donation-recorded" => Ok(Self::DonationRecorded),
            _ => Err(anyhow::anyhow!("Unknown event type: {}", value)),
        }
    }
}

/// 推送事件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub event: NotificationKind,
    pub hospital_id: Uuid,
    pub data: serde_json::Value,
    pub revision: u64,
    pub timestamp: DateTime<Utc>,
}

/// 通知中心
pub struct NotificationHub {
    sender: broadcast::Sender<Notification>,
    revision: AtomicU64,
}

impl NotificationHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            revision: AtomicU64::new(0),
        }
    }

    /// 递增修订号并返回新值
    pub fn bump(&self) -> u64 {
        self.revision.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn current(&self) -> u64 {
        self.revision.load(Ordering::SeqCst)
    }

    /// 发布事件，同时递增修订号
    pub fn publish(
        &self,
        event: NotificationKind,
        hospital_id: Uuid,
        data: serde_json::Value,
    ) -> Notification {
        let notification = Notification {
            event,
            hospital_id,
            data,
            revision: self.bump(),
            timestamp: Utc::now(),
        };

        match self.sender.send(notification.clone()) {
            Ok(receivers) => debug!(
                "Published {} for hospital {} to {} receivers",
                event.as_str(),
                hospital_id,
                receivers
            ),
            Err(_) => debug!("No live subscribers for {}", event.as_str()),
        }

        notification
    }

    /// 订阅某医院的事件
    pub fn subscribe(&self, hospital_id: Uuid) -> HospitalSubscription {
        HospitalSubscription {
            hospital_id,
            receiver: self.sender.subscribe(),
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for NotificationHub {
    fn default() -> Self {
        Self::new(256)
    }
}

/// 单个医院的事件订阅
pub struct HospitalSubscription {
    hospital_id: Uuid,
    receiver: broadcast::Receiver<Notification>,
}

impl HospitalSubscription {
    pub fn hospital_id(&self) -> Uuid {
        self.hospital_id
    }

    /// 等待下一条本医院事件；通道关闭时返回 `None`
    pub async fn recv(&mut self) -> Option<Notification> {
        loop {
            match self.receiver.recv().await {
                Ok(notification) if notification.hospital_id == self.hospital_id => {
                    return Some(notification)
                }
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(
                        "Subscriber for hospital {} lagged, skipped {} events",
                        self.hospital_id, skipped
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;

    #[test]
    fn test_kind_names() {
        for kind in [
            NotificationKind::NewRequest,
            NotificationKind::RequestRemoved,
            NotificationKind::TransferCreated,
            NotificationKind::DonationRecorded,
        ] {
            assert_eq!(NotificationKind::try_from(kind.as_str()).unwrap(), kind);
            assert_eq!(serde_json::to_value(kind).unwrap(), json!(kind.as_str()));
        }
        assert!(NotificationKind::try_from("join-hospital").is_err());
    }

    #[test]
    fn test_revision_is_monotonic() {
        let hub = NotificationHub::default();
        assert_eq!(hub.current(), 0);
        assert_eq!(hub.bump(), 1);
        let n = hub.publish(NotificationKind::NewRequest, Uuid::new_v4(), json!({}));
        assert_eq!(n.revision, 2);
        assert_eq!(hub.current(), 2);
    }

    #[tokio::test]
    async fn test_subscription_is_scoped_to_hospital() {
        let hub = NotificationHub::default();
        let mine = Uuid::new_v4();
        let other = Uuid::new_v4();
        let mut subscription = hub.subscribe(mine);

        hub.publish(NotificationKind::NewRequest, other, json!({"request_id": "x"}));
        hub.publish(NotificationKind::RequestRemoved, mine, json!({"reason": "fulfilled"}));

        let received = tokio::time::timeout(Duration::from_secs(1), subscription.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(received.event, NotificationKind::RequestRemoved);
        assert_eq!(received.hospital_id, mine);
        assert_eq!(received.data["reason"], "fulfilled");
        assert_eq!(received.revision, 2);
    }

    #[tokio::test]
    async fn test_lagging_subscriber_keeps_going() {
        let hub = NotificationHub::new(2);
        let hospital = Uuid::new_v4();
        let mut subscription = hub.subscribe(hospital);

        for i in 0..5 {
            hub.publish(NotificationKind::DonationRecorded, hospital, json!({ "n": i }));
        }

        let next = subscription.recv().await.unwrap();
        assert_eq!(next.data["n"], 3);
        let last = subscription.recv().await.unwrap();
        assert_eq!(last.data["n"], 4);
    }

    #[tokio::test]
    async fn test_closed_hub_ends_subscription() {
        let hub = NotificationHub::default();
        let mut subscription = hub.subscribe(Uuid::new_v4());
        drop(hub);
        assert!(subscription.recv().await.is_none());
    }
}
