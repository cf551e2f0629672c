//! # 血库 Web 服务
//!
//! 基于 axum 的 REST API 与 WebSocket 推送通道。

pub mod auth;
pub mod error;
pub mod extract;
pub mod handlers;
pub mod hospital;
pub mod server;
pub mod session;
pub mod state;
pub mod ws;

pub use auth::{AuthService, AuthSettings, LoggingOtpDelivery, OtpDelivery, OtpPurpose};
pub use error::{ApiError, ApiResponse, ApiResult};
pub use extract::{ApiJson, ApiPath, ApiQuery};
pub use server::{router, WebServer};
pub use session::{AuthContext, Session, SessionManager};
pub use state::{AppState, WebSettings};
