//! Web服务器

use std::net::SocketAddr;

use axum::{
    http::HeaderValue,
    middleware::from_fn_with_state,
    routing::{delete, get, post, put},
    Router,
};
use bloodbank_core::Result;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::auth::{
    auth_middleware, login_handler, logout_handler, me_handler, refresh_handler, register_handler,
    resend_otp_handler, reset_password_handler, verify_otp_handler,
};
use crate::handlers::{
    api_root, chatbot_message, create_donation, create_donor, create_webhook, dashboard_stats,
    delete_webhook, health, list_donations, list_donors, list_webhooks,
};
use crate::hospital;
use crate::state::{AppState, WebSettings};
use crate::ws::ws_handler;

pub struct WebServer {
    addr: SocketAddr,
    app: Router,
}

impl WebServer {
    pub fn new(addr: SocketAddr, state: AppState) -> Self {
        Self {
            addr,
            app: router(state),
        }
    }

    pub async fn run(self) -> Result<()> {
        info!("Starting web server on {}", self.addr);

        let listener = tokio::net::TcpListener::bind(self.addr).await?;
        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("Web server stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

/// 组装完整路由
pub fn router(state: AppState) -> Router {
    let cors = cors_layer(&state.settings);

    let mut app = Router::new()
        .route("/", get(api_root))
        .route("/health", get(health))
        .nest("/api", api_routes(state.clone()))
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()));

    if let Some(cors) = cors {
        app = app.layer(cors);
    }
    app
}

/// `/api` 下的路由
fn api_routes(state: AppState) -> Router<AppState> {
    let require_session = from_fn_with_state(state.clone(), auth_middleware);

    // 需要认证的路由
    let protected = Router::new()
        .route("/auth/refresh", post(refresh_handler))
        .route("/auth/logout", post(logout_handler))
        .route("/auth/me", get(me_handler))
        .route("/donors", get(list_donors).post(create_donor))
        .route("/donations", get(list_donations).post(create_donation))
        .route("/dashboard/stats", get(dashboard_stats))
        .route("/hospital/profile", get(hospital::profile))
        .route("/hospital/requests/:id/status", put(hospital::update_request_status))
        .route("/hospital/donations/available", get(hospital::available_donations))
        .route(
            "/hospital/transfers",
            get(hospital::list_transfers).post(hospital::create_transfer),
        )
        .route("/hospital/low-stock", get(hospital::low_stock))
        .route("/hospital/expiring-blood", get(hospital::expiring_blood))
        .route("/hospital/analytics", get(hospital::analytics))
        .route("/chatbot/message", post(chatbot_message))
        .route("/webhooks", get(list_webhooks).post(create_webhook))
        .route("/webhooks/:id", delete(delete_webhook))
        .route_layer(require_session.clone());

    Router::new()
        .route("/", get(api_root))
        .route("/health", get(health))
        .route("/auth/register", post(register_handler))
        .route("/auth/login", post(login_handler))
        .route("/auth/verify-otp", post(verify_otp_handler))
        .route("/auth/resend-otp", post(resend_otp_handler))
        .route("/auth/reset-password", post(reset_password_handler))
        // 列表需要会话，受理来自求助端无需登录
        .route(
            "/hospital/requests",
            get(hospital::list_requests)
                .route_layer(require_session)
                .post(hospital::create_request),
        )
        .route("/ws", get(ws_handler))
        .merge(protected)
}

fn cors_layer(settings: &WebSettings) -> Option<CorsLayer> {
    if !settings.enable_cors {
        return None;
    }

    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if settings.cors_allowed_origins.iter().any(|o| o == "*") {
        return Some(layer.allow_origin(Any));
    }

    let origins: Vec<HeaderValue> = settings
        .cors_allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("Ignoring invalid CORS origin: {}", origin);
                None
            }
        })
        .collect();
    Some(layer.allow_origin(AllowOrigin::list(origins)))
}
