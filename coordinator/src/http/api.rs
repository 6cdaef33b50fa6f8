//! Remote-control API: host state, on-demand updates and action execution.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use hostctl_remote::{ActionOutput, HostSnapshot};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::{app::AppState, websocket::WsMessage};

pub(crate) fn routes() -> Router<AppState> {
    Router::new()
        .route("/remote", post(get_remote_state))
        .route("/remote/update", post(handle_remote_update))
        .route("/remote/control", post(handle_remote_control))
}

/// Body of `POST /remote`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateResponse {
    pub hosts: Vec<HostSnapshot>,
}

/// Body of `POST /remote/update`: hosts whose reachability flipped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateResponse {
    pub update: Vec<HostSnapshot>,
}

/// Body accepted by `POST /remote/control`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlRequest {
    /// Host name.
    pub target: String,
    /// Action name, case-insensitive.
    pub action: String,
}

/// Body of a completed `POST /remote/control`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlResponse {
    /// Exit code, `null` if the command was killed by a signal.
    pub code: Option<i32>,
    /// Decoded stdout.
    pub message: String,
    /// Decoded stderr.
    pub error: String,
}

impl From<ActionOutput> for ControlResponse {
    fn from(output: ActionOutput) -> Self {
        Self {
            code: output.code,
            message: output.stdout,
            error: output.stderr,
        }
    }
}

/// Opaque failure returned to remote callers; details only go to the log.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Unavailable;

impl IntoResponse for Unavailable {
    fn into_response(self) -> Response {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "error": "Service unavailable" })),
        )
            .into_response()
    }
}

/// Returns a snapshot of every registered host.
#[axum::debug_handler]
async fn get_remote_state(State(state): State<AppState>) -> Json<StateResponse> {
    Json(StateResponse {
        hosts: state.controller.get_state(),
    })
}

/// Probes all hosts right away and returns those that changed.
///
/// The poll loop won't see these flips again, so they are also pushed to
/// websocket clients here.
#[axum::debug_handler]
async fn handle_remote_update(State(state): State<AppState>) -> Json<UpdateResponse> {
    let update = state.controller.update_once().await;
    if !update.is_empty() && state.ws_tx.send(WsMessage::RemoteState(update.clone())).is_err() {
        debug!("No Websocket Subscribers");
    }
    Json(UpdateResponse { update })
}

/// Runs an action and returns its exit code and output.
///
/// Every core failure maps to `503 Service Unavailable`. The poll loop is woken
/// after a completed action so state changes it caused show up promptly.
#[axum::debug_handler]
async fn handle_remote_control(
    State(state): State<AppState>,
    Json(ControlRequest { target, action }): Json<ControlRequest>,
) -> Result<Json<ControlResponse>, Unavailable> {
    match state.controller.perform(&target, &action).await {
        Ok(output) => {
            info!(host = %target, %action, code = ?output.code, "Action completed");
            state.controller.wake();
            Ok(Json(output.into()))
        }
        Err(e) => {
            error!(
                host = %target,
                %action,
                "Remote control failed: {:?}",
                eyre::Report::new(e)
            );
            Err(Unavailable)
        }
    }
}
