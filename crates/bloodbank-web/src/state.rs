//! 应用共享状态

use std::sync::Arc;

use bloodbank_assistant::Assistant;
use bloodbank_core::{BloodRequest, Clock, Donation, Donor, Result, SystemClock};
use bloodbank_database::BloodBankStore;
use bloodbank_integration::{NotificationHub, NotificationKind, WebhookEvent, WebhookManager};
use chrono::NaiveDate;
use tracing::warn;
use uuid::Uuid;

use crate::auth::{AuthService, AuthSettings, OtpDelivery};

/// Web 层配置
#[derive(Debug, Clone)]
pub struct WebSettings {
    pub low_stock_threshold: usize,
    pub expiring_days: i64,
    pub analytics_days: i64,
    pub enable_cors: bool,
    pub cors_allowed_origins: Vec<String>,
}

impl Default for WebSettings {
    fn default() -> Self {
        Self {
            low_stock_threshold: 5,
            expiring_days: 7,
            analytics_days: 30,
            enable_cors: true,
            cors_allowed_origins: vec!["*".to_string()],
        }
    }
}

/// 单家医院的库存数据
pub struct HospitalRecords {
    pub donations: Vec<Donation>,
    pub donors: Vec<Donor>,
    pub requests: Vec<BloodRequest>,
}

/// 处理器共享状态
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn BloodBankStore>,
    pub auth: Arc<AuthService>,
    pub hub: Arc<NotificationHub>,
    pub webhooks: Arc<WebhookManager>,
    pub assistant: Arc<Assistant>,
    pub clock: Arc<dyn Clock>,
    pub settings: Arc<WebSettings>,
}

impl AppState {
    pub fn new(store: Arc<dyn BloodBankStore>, auth_settings: &AuthSettings) -> Self {
        Self {
            auth: Arc::new(AuthService::new(store.clone(), auth_settings)),
            store,
            hub: Arc::new(NotificationHub::default()),
            webhooks: Arc::new(WebhookManager::new()),
            assistant: Arc::new(Assistant::pattern_only()),
            clock: Arc::new(SystemClock),
            settings: Arc::new(WebSettings::default()),
        }
    }

    pub fn with_settings(mut self, settings: WebSettings) -> Self {
        self.settings = Arc::new(settings);
        self
    }

    pub fn with_assistant(mut self, assistant: Assistant) -> Self {
        self.assistant = Arc::new(assistant);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_hub(mut self, hub: Arc<NotificationHub>) -> Self {
        self.hub = hub;
        self
    }

    /// 替换验证码投递方式（需在共享前调用）
    pub fn with_otp_delivery(mut self, settings: &AuthSettings, delivery: Arc<dyn OtpDelivery>) -> Self {
        self.auth = Arc::new(AuthService::new(self.store.clone(), settings).with_delivery(delivery));
        self
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    /// 发布推送事件并转发给 Webhook 订阅者，返回新的修订号
    pub fn notify(&self, kind: NotificationKind, hospital_id: Uuid, data: serde_json::Value) -> u64 {
        let notification = self.hub.publish(kind, hospital_id, data);
        let event = WebhookEvent::from(&notification);
        let webhooks = self.webhooks.clone();

        tokio::spawn(async move {
            if let Err(e) = webhooks.emit_event(event).await {
                warn!("Webhook delivery failed: {}", e);
            }
        });

        notification.revision
    }

    /// 读取计算统计所需的记录
    pub async fn hospital_records(&self, hospital_id: Uuid) -> Result<HospitalRecords> {
        let donations = self.store.list_donations(hospital_id).await?;
        let donors = self.store.list_donors(hospital_id).await?;
        let requests = self.store.list_requests(hospital_id, None).await?;
        Ok(HospitalRecords {
            donations,
            donors,
            requests,
        })
    }
}
