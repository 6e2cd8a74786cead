//! Operator routes: list channels, enable or disable one by hand

use axum::body::Bytes;
use axum::extract::{Path, Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use switchboard_channel::{ChannelHealth, ChannelId, ChannelSnapshot, ChannelStatus, Transition};

use crate::error::ServerError;
use crate::identity::is_admin;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct DisableBody {
    reason: Option<String>,
}

#[derive(Debug, Serialize)]
struct StatusChange {
    id: ChannelId,
    status: ChannelStatus,
    changed: bool,
}

pub fn admin_router(health: ChannelHealth, admin_token: SecretString) -> Router {
    Router::new()
        .route("/admin/channels", routing::get(list_channels))
        .route("/admin/channels/{id}/enable", routing::post(enable_channel))
        .route("/admin/channels/{id}/disable", routing::post(disable_channel))
        .with_state(health)
        .layer(axum::middleware::from_fn(move |req, next| {
            let token = admin_token.clone();
            async move { require_admin(token, req, next).await }
        }))
}

async fn require_admin(admin_token: SecretString, request: Request, next: Next) -> Response {
    if !is_admin(request.headers(), Some(&admin_token)) {
        return ServerError::Unauthorized.into_response();
    }

    next.run(request).await
}

/// Handle `GET /admin/channels`
async fn list_channels(State(health): State<ChannelHealth>) -> Json<Vec<ChannelSnapshot>> {
    Json(health.registry().list())
}

/// Handle `POST /admin/channels/{id}/enable`
async fn enable_channel(State(health): State<ChannelHealth>, Path(id): Path<u32>) -> Result<Json<StatusChange>, ServerError> {
    let id = ChannelId::new(id);
    let transition = health.enable_manual(id).await?;

    tracing::info!(channel_id = %id, changed = transition.changed(), "channel enabled by operator");
    status_change(&health, id, transition)
}

/// Handle `POST /admin/channels/{id}/disable`
async fn disable_channel(
    State(health): State<ChannelHealth>,
    Path(id): Path<u32>,
    body: Bytes,
) -> Result<Json<StatusChange>, ServerError> {
    let id = ChannelId::new(id);
    let body: DisableBody = if body.is_empty() {
        DisableBody::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ServerError::BadRequest(format!("invalid body: {e}")))?
    };

    let transition = health.disable_manual(id, body.reason).await?;

    tracing::info!(channel_id = %id, changed = transition.changed(), "channel disabled by operator");
    status_change(&health, id, transition)
}

fn status_change(health: &ChannelHealth, id: ChannelId, transition: Transition) -> Result<Json<StatusChange>, ServerError> {
    let slot = health.registry().slot(id)?;

    Ok(Json(StatusChange {
        id,
        status: slot.status(),
        changed: transition.changed(),
    }))
}
