//! WebSocket 推送通道
//!
//! 握手时以查询参数中的会话令牌认证，随后把本医院的事件以 JSON 文本帧推送给客户端。

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::{IntoResponse, Response},
};
use bloodbank_core::BloodBankError;
use bloodbank_integration::HospitalSubscription;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::error::ApiResult;
use crate::extract::ApiQuery;
use crate::session::AuthContext;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
}

pub async fn ws_handler(
    State(state): State<AppState>,
    ApiQuery(query): ApiQuery<WsQuery>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> ApiResult<Response> {
    // 先认证再检查升级头，未带令牌的请求一律 401
    let token = query
        .token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| BloodBankError::Unauthorized("Missing token".to_string()))?;
    let context = state.auth.sessions().validate(&token).await?;
    let ws = ws.map_err(|rejection| BloodBankError::Validation(rejection.body_text()))?;

    // 升级前订阅，握手期间发布的事件不会丢失
    let subscription = state.hub.subscribe(context.hospital_id);
    let revision = state.hub.current();

    Ok(ws
        .on_upgrade(move |socket| forward_events(socket, context, subscription, revision))
        .into_response())
}

async fn forward_events(
    mut socket: WebSocket,
    context: AuthContext,
    mut subscription: HospitalSubscription,
    revision: u64,
) {
    info!("WebSocket connected for hospital {}", context.hospital_id);

    let hello = json!({
        "event": "connected",
        "hospital_id": context.hospital_id,
        "revision": revision,
    });
    if socket.send(Message::Text(hello.to_string())).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            notification = subscription.recv() => {
                let Some(notification) = notification else { break };
                let payload = match serde_json::to_string(&notification) {
                    Ok(payload) => payload,
                    Err(e) => {
                        warn!("Failed to encode notification: {}", e);
                        continue;
                    }
                };
                if socket.send(Message::Text(payload)).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    Some(Ok(_)) => debug!("Ignoring client frame from hospital {}", context.hospital_id),
                }
            }
        }
    }

    info!("WebSocket closed for hospital {}", context.hospital_id);
}
