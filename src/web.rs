//! HTTP 接口（axum）
//!
//! - POST /chat/chat  `{session_id, input}` → `{session_id, respuesta}`
//! - GET  /health     → "OK"
//!
//! 所有路由都需要请求头 X-API-Key 与 server.api_key 一致；未配置 api_key 时不校验。

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::{self as axum_middleware, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};

use crate::agent::{ChatAgent, ChatRequest, ChatResponse};

/// API Key 请求头
pub const API_KEY_HEADER: &str = "x-api-key";

/// 处理器共享状态
#[derive(Clone)]
pub struct AppState {
    pub agent: Arc<ChatAgent>,
}

/// 鉴权配置
#[derive(Clone)]
pub struct ApiKeyAuth {
    pub api_key: Option<String>,
}

impl std::fmt::Debug for ApiKeyAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyAuth")
            .field("api_key", &self.api_key.as_ref().map(|_| "[redacted]"))
            .finish()
    }
}

/// X-API-Key 校验中间件，失败返回 403
pub async fn api_key_middleware(
    State(auth): State<ApiKeyAuth>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = auth.api_key.as_deref() else {
        return next.run(request).await;
    };

    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());
    if provided == Some(expected) {
        next.run(request).await
    } else {
        tracing::warn!("Rejected request to {} with missing or invalid API key", request.uri().path());
        (StatusCode::FORBIDDEN, "Acceso denegado").into_response()
    }
}

/// 构建路由
pub fn router(state: AppState, auth: ApiKeyAuth) -> Router {
    if auth.api_key.is_none() {
        tracing::warn!("server.api_key is not set, API key check is disabled");
    }
    Router::new()
        .route("/chat/chat", post(chat))
        .route("/health", get(health))
        .route_layer(axum_middleware::from_fn_with_state(auth, api_key_middleware))
        .with_state(state)
}

async fn health() -> &'static str {
    "OK"
}

async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, String)> {
    tracing::info!(
        "Chat request for session '{}'",
        if request.session_id.is_empty() { "<new>" } else { request.session_id.as_str() }
    );

    match state.agent.handle(request).await {
        Ok(response) => Ok(Json(response)),
        // 模型与检索失败已在执行器内转为致歉回复，走到这里的只有存储错误
        Err(e) => {
            tracing::error!("Chat request failed: {}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error interno al guardar la conversación".to_string(),
            ))
        }
    }
}
