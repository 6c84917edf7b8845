use std::sync::Arc;

use axum::{
    extract::State,
    http::HeaderMap,
    routing::post,
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::signal::{
    ctrl_c,
    unix::{signal, SignalKind},
};
use tracing::{info, warn};

use crate::config::Config;
use crate::db::Repository;
use crate::engine::dispatch::{run_dispatch, RunReport};
use crate::error::{AppError, Result};
use crate::models::NotificationPayload;
use crate::push::{FanoutReport, PushSender};

pub struct AppState {
    pub config: Config,
    pub repo: Repository,
    pub sender: PushSender,
}

pub async fn start_server(state: Arc<AppState>) -> Result<()> {
    let address = format!("0.0.0.0:{}", state.config.port);
    let app = router(state);

    info!("Binding to {address}");
    let listener = TcpListener::bind(&address).await?;
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutting down");
    Ok(())
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/dispatch-run", post(dispatch_run_handler))
        .route("/push-send", post(push_send_handler))
        .with_state(state)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        ctrl_c().await.expect("Failed to install Ctrl+C handler");
        info!("Received Ctrl+C, shutting down");
    };

    let terminate = async {
        signal(SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
        info!("Received terminate signal, shutting down");
    };

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Both endpoints are service-role only; no side effects happen before
/// this check passes.
fn require_service_role(state: &AppState, headers: &HeaderMap) -> Result<()> {
    let expected = state
        .config
        .service_token
        .as_deref()
        .ok_or_else(|| AppError::Auth("Service token is not configured".to_string()))?;

    let provided = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or_else(|| AppError::Auth("Missing service token".to_string()))?;

    if provided != expected {
        return Err(AppError::Auth("Invalid service token".to_string()));
    }
    Ok(())
}

async fn dispatch_run_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<RunReport>> {
    require_service_role(&state, &headers)?;
    let report = run_dispatch(&state.repo, &state.sender).await?;
    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
pub struct PushSendRequest {
    pub user_id: Option<String>,
    pub title: Option<String>,
    pub body: Option<String>,
    pub data: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub struct PushSendResponse {
    pub ok: bool,
    #[serde(flatten)]
    pub fanout: FanoutReport,
    pub sent_at: DateTime<Utc>,
}

/// Direct send to one user, bypassing scoring and quota. Used by other
/// services for operational messages.
async fn push_send_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(request): Json<PushSendRequest>,
) -> Result<Json<PushSendResponse>> {
    require_service_role(&state, &headers)?;

    let user_id = required(request.user_id, "user_id")?;
    let title = required(request.title, "title")?;
    let body = required(request.body, "body")?;

    // Missing keys are fatal before any send; only signing failures with
    // keys present degrade to a per-subscription outcome
    state.sender.ensure_configured()?;

    let subscriptions = state.repo.subscriptions_for_user(&user_id).await?;
    if subscriptions.is_empty() {
        return Err(AppError::NotFound(
            "No subscriptions found for user".to_string(),
        ));
    }

    let payload = NotificationPayload {
        title,
        body,
        data: request.data.unwrap_or_else(|| serde_json::json!({})),
    };

    let fanout = state.sender.fan_out(subscriptions, &payload).await;

    // Stale endpoints leave the active set now; physical deletion is a
    // follow-up after the response, outside the send path
    state
        .repo
        .mark_pending_delete(fanout.to_delete_ids.clone())
        .await?;
    let purge_state = state.clone();
    tokio::spawn(async move {
        if let Err(e) = purge_state.repo.purge_pending_deletes().await {
            warn!("Failed to purge stale subscriptions: {e}");
        }
    });

    Ok(Json(PushSendResponse {
        ok: true,
        fanout,
        sent_at: Utc::now(),
    }))
}

fn required(value: Option<String>, field: &str) -> Result<String> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(AppError::Validation(format!(
            "Missing required field: {field}"
        ))),
    }
}
