//! HTTP front door: `POST /api/chat` and `GET /health`.
//!
//! The caller is authenticated upstream and identified by the
//! `x-user-id` / `x-tenant-id` headers.

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, StatusCode},
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};

use crate::chat::{ChatRequest, ChatResponse, ChatService, RequestScope};
use crate::config::Config;
use crate::Result;

pub const USER_HEADER: &str = "x-user-id";
pub const TENANT_HEADER: &str = "x-tenant-id";

type SharedService = Arc<ChatService>;

/// Build the router around a chat service.
pub fn build_router(service: SharedService) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/chat", post(chat_handler))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(service)
}

/// Bind and serve until the process is stopped.
pub async fn serve(config: Config) -> Result<()> {
    let addr = format!("{}:{}", config.server.host, config.server.port);
    let service = Arc::new(ChatService::from_config(config)?);
    let app = build_router(service);

    info!(addr = %addr, "Chat server listening");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_handler() -> Json<Value> {
    Json(json!({"status": "ok", "version": env!("CARGO_PKG_VERSION")}))
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

async fn chat_handler(
    State(service): State<SharedService>,
    headers: HeaderMap,
    body: std::result::Result<Json<ChatRequest>, JsonRejection>,
) -> (StatusCode, Json<ChatResponse>) {
    let request = match body {
        Ok(Json(request)) => request,
        Err(rejection) => {
            warn!(error = %rejection.body_text(), "Rejected chat request body");
            return (
                StatusCode::BAD_REQUEST,
                Json(ChatResponse::Error {
                    error: rejection.body_text(),
                }),
            );
        }
    };

    let (Some(user_id), Some(tenant_id)) = (header(&headers, USER_HEADER), header(&headers, TENANT_HEADER)) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ChatResponse::Error {
                error: format!("missing {} or {} header", USER_HEADER, TENANT_HEADER),
            }),
        );
    };

    let scope = RequestScope::new(user_id, tenant_id);
    let (status, body) = service.respond(request, &scope).await;
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(body))
}
