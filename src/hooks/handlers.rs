use axum::{extract::State, Json};
use serde::Serialize;
use std::sync::Arc;

use super::auth::HookAuth;
use super::{ApiError, HookState};
use crate::jobs::hooks::{self, WebhookPayload};
use crate::models::DeviceOutcome;

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub nautobot: String,
    pub nautobot_reachable: bool,
}

pub async fn health(State(state): State<Arc<HookState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        nautobot: state.ctx.nautobot.base_url().to_string(),
        nautobot_reachable: state.ctx.nautobot.test_connection().await,
    })
}

pub async fn device_hook(
    auth: HookAuth,
    Json(payload): Json<WebhookPayload>,
) -> Json<MessageResponse> {
    tracing::debug!("Device hook from {}", auth.claims.sub);
    Json(MessageResponse { message: hooks::device_hook(&payload) })
}

pub async fn interface_hook(
    auth: HookAuth,
    State(state): State<Arc<HookState>>,
    Json(payload): Json<WebhookPayload>,
) -> Result<Json<DeviceOutcome>, ApiError> {
    tracing::debug!("Interface hook from {}", auth.claims.sub);
    let outcome = hooks::interface_hook(&state.ctx, &payload, state.commit).await?;
    Ok(Json(outcome))
}
