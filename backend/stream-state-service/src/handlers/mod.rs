//! HTTP handlers
//!
//! Webhook endpoints called by the media server, the publish auth check, and
//! the read-side listing used by dashboards.

use std::sync::Arc;
use std::time::Instant;

use actix_web::{web, HttpResponse};
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::error::Result;
use crate::metrics;
use crate::services::auth::PublishAuth;
use crate::services::reconciler::{
    keys, EventOutcome, ReconcilerHandle, StateStore, StreamEvent, StreamRecord,
};

pub struct AppState {
    pub reconciler: ReconcilerHandle,
    pub auth: PublishAuth,
    pub store: Arc<dyn StateStore>,
}

#[derive(Debug, Deserialize)]
pub struct StreamStartPayload {
    #[serde(default)]
    pub stream_key: String,
    #[serde(default)]
    pub path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct StreamEventPayload {
    #[serde(default)]
    pub stream_key: String,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub ip: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AuthRequest {
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub action: String,
    #[serde(default)]
    pub query: String,
}

pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({"status": "healthy"}))
}

pub async fn stream_start(
    state: web::Data<AppState>,
    payload: web::Json<StreamStartPayload>,
) -> Result<HttpResponse> {
    let event = StreamEvent::Start {
        stream_key: payload.stream_key.trim().to_string(),
    };
    apply_lifecycle_event(&state, event).await?;
    Ok(HttpResponse::Ok().json(json!({"status": "ok"})))
}

pub async fn stream_stop(
    state: web::Data<AppState>,
    payload: web::Json<StreamEventPayload>,
) -> Result<HttpResponse> {
    let event = StreamEvent::Stop {
        stream_key: payload.stream_key.trim().to_string(),
    };
    apply_lifecycle_event(&state, event).await?;
    Ok(HttpResponse::Ok().json(json!({"status": "ok"})))
}

pub async fn viewer_join(
    state: web::Data<AppState>,
    payload: web::Json<StreamEventPayload>,
) -> Result<HttpResponse> {
    let event = StreamEvent::ViewerJoin {
        stream_key: payload.stream_key.trim().to_string(),
        viewer: payload.ip.as_deref().unwrap_or_default().trim().to_string(),
    };
    respond_with_count(apply_lifecycle_event(&state, event).await?)
}

pub async fn viewer_leave(
    state: web::Data<AppState>,
    payload: web::Json<StreamEventPayload>,
) -> Result<HttpResponse> {
    let event = StreamEvent::ViewerLeave {
        stream_key: payload.stream_key.trim().to_string(),
        viewer: payload.ip.as_deref().unwrap_or_default().trim().to_string(),
    };
    respond_with_count(apply_lifecycle_event(&state, event).await?)
}

/// Apply an event through the reconciler, observing the webhook duration
/// whether or not it was accepted.
async fn apply_lifecycle_event(state: &AppState, event: StreamEvent) -> Result<EventOutcome> {
    let started = Instant::now();
    let kind = event.kind();
    let result = state.reconciler.apply_event(event).await;
    metrics::observe_webhook(kind, started.elapsed());
    result
}

fn respond_with_count(outcome: EventOutcome) -> Result<HttpResponse> {
    match outcome {
        EventOutcome::ViewerCount(count) => {
            Ok(HttpResponse::Ok().json(json!({"status": "ok", "viewer_count": count})))
        }
        _ => Ok(HttpResponse::Ok().json(json!({"status": "ok"}))),
    }
}

pub async fn auth_publish(
    state: web::Data<AppState>,
    payload: web::Json<AuthRequest>,
) -> Result<HttpResponse> {
    let request = payload.into_inner();
    debug!(
        user = %request.user,
        path = %request.path,
        action = %request.action,
        ip = %request.ip,
        "publish auth request"
    );

    let allowed = state
        .auth
        .authorize(&request.action, &request.path, &request.user, &request.password)
        .await?;

    if allowed {
        Ok(HttpResponse::Ok().json(json!({"status": "ok"})))
    } else {
        Ok(HttpResponse::Unauthorized().json(json!({"error": "invalid credentials"})))
    }
}

/// Read side for dashboards: every live stream with its last known state.
pub async fn list_live_streams(state: web::Data<AppState>) -> Result<HttpResponse> {
    let live_keys = state.store.set_members(keys::LIVE_STREAMS).await?;

    let mut streams = Vec::with_capacity(live_keys.len());
    for stream_key in live_keys {
        if let Some(raw) = state.store.get(&keys::stream_record(&stream_key)).await? {
            if let Ok(record) = serde_json::from_str::<StreamRecord>(&raw) {
                streams.push(record);
            }
        }
    }
    streams.sort_by(|a, b| a.stream_key.cmp(&b.stream_key));

    Ok(HttpResponse::Ok().json(streams))
}
