//! Object-change receiver: HTTP endpoints for Nautobot webhooks plus an
//! optional cron-driven device status monitor.

pub mod auth;
pub mod handlers;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use croner::Cron;
use serde::Serialize;
use std::sync::Arc;
use tokio::signal;
use tower_http::trace::TraceLayer;

use crate::jobs::{device_status_monitor, JobContext};
use crate::nautobot::NotFoundError;

/// State shared by the hook handlers
pub struct HookState {
    pub ctx: JobContext,
    pub jwt_secret: String,
    /// Push interface changes to devices; `false` only logs them
    pub commit: bool,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self { error: error.into() }
    }
}

pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorResponse::new(self.message))).into_response()
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        let status = if err.downcast_ref::<NotFoundError>().is_some() {
            StatusCode::NOT_FOUND
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        Self { status, message: err.to_string() }
    }
}

pub fn router(state: Arc<HookState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/hooks/device", post(handlers::device_hook))
        .route("/hooks/interface", post(handlers::interface_hook))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Parse `MONITOR_SCHEDULE`; empty disables the monitor
pub fn parse_schedule(expr: &str) -> anyhow::Result<Option<Cron>> {
    let expr = expr.trim();
    if expr.is_empty() {
        return Ok(None);
    }
    Cron::new(expr)
        .parse()
        .map(Some)
        .map_err(|e| anyhow::anyhow!("Invalid MONITOR_SCHEDULE '{}': {}", expr, e))
}

/// Run the device status monitor whenever `cron` comes due
pub fn start_monitor(state: Arc<HookState>, cron: Cron) {
    tokio::spawn(async move {
        use std::time::Duration;

        let mut last_run = chrono::Utc::now();
        let mut interval = tokio::time::interval(Duration::from_secs(30));
        loop {
            interval.tick().await;

            let next = match cron.find_next_occurrence(&last_run, false) {
                Ok(n) => n,
                Err(e) => {
                    tracing::warn!("Monitor: no next occurrence for schedule: {}", e);
                    return;
                }
            };
            let now = chrono::Utc::now();
            if next > now {
                continue;
            }

            last_run = now;
            tracing::info!("Monitor: running scheduled device status check");
            match device_status_monitor::run(&state.ctx, &device_status_monitor::Options::default()).await {
                Ok(results) => tracing::info!("Monitor: checked {} devices", results.len()),
                Err(e) => tracing::error!("Monitor: status check failed: {}", e),
            }
        }
    });
}

/// Serve the hook endpoints until Ctrl-C or SIGTERM
pub async fn serve(ctx: JobContext, commit: bool) -> anyhow::Result<()> {
    let schedule = parse_schedule(&ctx.config.monitor_schedule)?;
    let listen_addr = ctx.config.listen_addr.clone();

    let mut jwt_secret = ctx.config.hook_jwt_secret.clone();
    if jwt_secret.is_empty() {
        tracing::warn!("HOOK_JWT_SECRET not set - generating random secret (hook tokens will not survive a restart)");
        jwt_secret = uuid::Uuid::new_v4().to_string();
    }

    let state = Arc::new(HookState { ctx, jwt_secret, commit });

    if let Some(cron) = schedule {
        tracing::info!("Device status monitor scheduled: {}", state.ctx.config.monitor_schedule);
        start_monitor(state.clone(), cron);
    }

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
    tracing::info!("Hook receiver listening on {}", listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Hook receiver shutting down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::testing;
    use axum::body::Body;
    use axum::http::Request;
    use httpmock::prelude::*;
    use tower::ServiceExt;

    const SECRET: &str = "test-secret";

    fn app(nautobot_url: &str) -> Router {
        router(Arc::new(HookState {
            ctx: testing::context(nautobot_url, 1),
            jwt_secret: SECRET.to_string(),
            commit: true,
        }))
    }

    fn post_json(uri: &str, token: Option<&str>, body: serde_json::Value) -> Request<Body> {
        let mut builder = Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json");
        if let Some(t) = token {
            builder = builder.header("authorization", format!("Bearer {}", t));
        }
        builder.body(Body::from(body.to_string())).unwrap()
    }

    async fn json_body(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_health_needs_no_token() {
        let resp = app("http://127.0.0.1:1")
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = json_body(resp).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["nautobot_reachable"], false);
    }

    #[tokio::test]
    async fn test_missing_token_rejected() {
        let body = serde_json::json!({"event": "created", "data": {"id": "d1", "name": "access1"}});
        let resp = app("http://127.0.0.1:1")
            .oneshot(post_json("/hooks/device", None, body))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(json_body(resp).await["error"], "Missing authentication token");
    }

    #[tokio::test]
    async fn test_token_signed_with_other_secret_rejected() {
        let token = auth::mint_token("other-secret", "nautobot", 1).unwrap();
        let body = serde_json::json!({"event": "created", "data": {"id": "d1"}});
        let resp = app("http://127.0.0.1:1")
            .oneshot(post_json("/hooks/device", Some(&token), body))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_expired_token_rejected() {
        let token = auth::mint_token(SECRET, "nautobot", -2).unwrap();
        let body = serde_json::json!({"event": "created", "data": {"id": "d1"}});
        let resp = app("http://127.0.0.1:1")
            .oneshot(post_json("/hooks/device", Some(&token), body))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_device_hook_logs_change() {
        let token = auth::mint_token(SECRET, "nautobot", 1).unwrap();
        let body = serde_json::json!({
            "event": "updated",
            "model": "device",
            "data": {"id": "d1", "name": "access1"},
            "snapshots": {"prechange": {"serial": ""}, "postchange": {"serial": "ABC"}}
        });
        let resp = app("http://127.0.0.1:1")
            .oneshot(post_json("/hooks/device", Some(&token), body))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            json_body(resp).await["message"],
            "Device updated: access1 (d1); changes={\"serial\":\"ABC\"}"
        );
    }

    #[tokio::test]
    async fn test_interface_delete_is_skipped() {
        let token = auth::mint_token(SECRET, "nautobot", 1).unwrap();
        let body = serde_json::json!({"event": "deleted", "model": "interface", "data": {"id": "i1", "display": "Ethernet3"}});
        let resp = app("http://127.0.0.1:1")
            .oneshot(post_json("/hooks/interface", Some(&token), body))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let outcome = json_body(resp).await;
        assert_eq!(outcome["status"], "skipped");
        assert_eq!(outcome["device"], "Ethernet3");
    }

    #[tokio::test]
    async fn test_unknown_interface_is_not_found() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(GET).path("/api/dcim/interfaces/missing/");
                then.status(404).json_body(serde_json::json!({"detail": "Not found."}));
            })
            .await;

        let token = auth::mint_token(SECRET, "nautobot", 1).unwrap();
        let body = serde_json::json!({"event": "created", "data": {"id": "missing"}});
        let resp = app(&server.base_url())
            .oneshot(post_json("/hooks/interface", Some(&token), body))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_parse_schedule() {
        assert!(parse_schedule("").unwrap().is_none());
        assert!(parse_schedule("*/5 * * * *").unwrap().is_some());
        assert!(parse_schedule("not a cron").is_err());
    }
}
