use crate::client_ip::TunnelClientIpKeyExtractor;
use crate::config::Config;
use crate::forwarder::Forwarder;
use crate::sources::{ValidationError, feishu};
use anyhow::{Result, anyhow};
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use std::sync::Arc;
use ticket_core::error::ForwardError;
use ticket_core::model::{Acknowledgment, ItemType};
use tower_governor::GovernorLayer;
use tower_governor::governor::GovernorConfigBuilder;
use tracing::{info, warn};

pub struct AppState {
    pub config: Config,
    pub forwarder: Forwarder,
}

pub fn build_router(state: Arc<AppState>) -> Result<Router> {
    let period_ms = ip_refill_period_ms(state.config.ip_limit_per_minute);
    let mut governor_builder = GovernorConfigBuilder::default()
        .key_extractor(TunnelClientIpKeyExtractor::from_config(&state.config))
        .use_headers();
    governor_builder
        .per_millisecond(period_ms)
        .burst_size(state.config.ip_limit_per_minute)
        .methods(vec![Method::POST]);
    let governor_config = Arc::new(
        governor_builder
            .finish()
            .ok_or_else(|| anyhow!("build governor config"))?,
    );

    let router = Router::new()
        .route(&state.config.webhook_path, post(webhook_handler))
        .route("/api/create/{item_type}", post(create_handler))
        .route("/api/workitem-types", get(workitem_types))
        .route("/health", get(health))
        .route("/ready", get(ready))
        .layer(DefaultBodyLimit::max(state.config.max_payload_bytes))
        .layer(GovernorLayer::new(governor_config))
        .with_state(state);

    Ok(router)
}

async fn webhook_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    if let Err(error) = feishu::validate(
        state.config.feishu_verification_token.as_deref(),
        &headers,
        &body,
    ) {
        return validation_response(error);
    }

    let payload: Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(_error) => return validation_response(ValidationError::BadRequest("invalid json payload")),
    };

    let callback = match feishu::parse_request(payload) {
        Ok(feishu::FeishuRequest::Challenge(challenge)) => {
            info!("answered feishu url verification");
            return (StatusCode::OK, Json(json!({ "challenge": challenge })));
        }
        Ok(feishu::FeishuRequest::Callback(callback)) => callback,
        Err(error) => return validation_response(error),
    };

    info!(
        item_type = %callback.item_type,
        field_count = callback.fields.len(),
        "received feishu callback"
    );
    forward_response(state.forwarder.handle(callback).await)
}

async fn create_handler(
    State(state): State<Arc<AppState>>,
    Path(item_type): Path<String>,
    body: Bytes,
) -> impl IntoResponse {
    let payload: Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(_error) => return validation_response(ValidationError::BadRequest("invalid json payload")),
    };

    let callback = match feishu::parse_record(&item_type, payload) {
        Ok(callback) => callback,
        Err(error) => return validation_response(error),
    };

    forward_response(state.forwarder.handle(callback).await)
}

async fn workitem_types(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({ "types": state.forwarder.mappings().workitem_types() })),
    )
}

async fn health() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({"status": "ok"})))
}

async fn ready(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let config = &state.config;
    (
        StatusCode::OK,
        Json(json!({
            "status": "ready",
            "bind": config.bind_addr,
            "webhook_path": config.webhook_path,
            "tapd": {
                "api_base": config.tapd_api_base,
                "workspace_id": config.tapd_workspace_id,
                "api_user_set": !config.tapd_api_user.is_empty(),
                "api_password_set": !config.tapd_api_password.is_empty(),
            },
            "feishu": {
                "signature_verification": config.feishu_verification_token.is_some(),
            },
            "workitem_types": state.forwarder.mappings().workitem_types().len(),
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

fn forward_response(result: Result<Acknowledgment, ForwardError>) -> (StatusCode, Json<Value>) {
    match result {
        Ok(ack) => (StatusCode::OK, Json(success_body(&ack))),
        Err(error) => (status_for(&error), Json(error_body(&error))),
    }
}

fn validation_response(error: ValidationError) -> (StatusCode, Json<Value>) {
    match error {
        ValidationError::Unauthorized(reason) => {
            warn!(reason, "feishu authentication failed");
            (
                StatusCode::UNAUTHORIZED,
                Json(json!({"status": "error", "code": -1, "error": "unauthorized", "message": "unauthorized", "data": null})),
            )
        }
        ValidationError::BadRequest(message) => (
            StatusCode::BAD_REQUEST,
            Json(json!({"status": "error", "code": -1, "error": "bad_request", "message": message, "data": null})),
        ),
    }
}

/// Feishu automations read the created id back from `data.Story.id` or
/// `data.Bug.id`.
fn success_body(ack: &Acknowledgment) -> Value {
    let entity = json!({ "id": ack.ticket_id });
    json!({
        "status": "success",
        "code": 0,
        "message": "ticket created",
        "data": {
            "request_id": ack.request_id,
            "ticket_id": ack.ticket_id,
            "ticket_url": ack.ticket_url,
            "ticket_type": ack.item_type,
            "received_at": ack.received_at,
            "Story": if ack.item_type == ItemType::Story { entity.clone() } else { Value::Null },
            "Bug": if ack.item_type == ItemType::Bug { entity } else { Value::Null },
        }
    })
}

fn error_body(error: &ForwardError) -> Value {
    let mut body = json!({
        "status": "error",
        "code": -1,
        "error": error.kind(),
        "message": error.to_string(),
        "data": null,
    });
    match error {
        ForwardError::MissingRequiredField(field) => body["field"] = json!(field),
        ForwardError::UpstreamRejected { status, .. } => body["upstream_status"] = json!(status),
        _ => {}
    }
    body
}

fn status_for(error: &ForwardError) -> StatusCode {
    if error.is_validation() {
        return StatusCode::BAD_REQUEST;
    }

    match error {
        ForwardError::UpstreamRejected { .. } => StatusCode::BAD_GATEWAY,
        ForwardError::Transport(_) => StatusCode::GATEWAY_TIMEOUT,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn ip_refill_period_ms(limit_per_minute: u32) -> u64 {
    if limit_per_minute == 0 {
        return 1;
    }

    let period = 60_000u64 / u64::from(limit_per_minute);
    period.max(1)
}
