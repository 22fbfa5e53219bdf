// SPDX-License-Identifier: MIT OR Apache-2.0
//! The agent's local RPC surface: a single sync trigger.

use crate::error::SyncError;
use crate::worker::Agent;
use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Json;
use plantr_proto as proto;
use plantr_telemetry::BodyLogging;
use serde_json::json;
use std::sync::Arc;
use tracing::error;

/// Shared handler state.
#[derive(Clone)]
struct ServiceState {
    agent: Arc<Agent>,
}

/// Build the agent's router.
pub fn build_router(agent: Arc<Agent>, body_logging: BodyLogging) -> Router {
    Router::new()
        .route(proto::AGENT_SYNC, post(cmd_sync))
        .layer(axum::middleware::from_fn_with_state(
            body_logging,
            plantr_telemetry::request_logger,
        ))
        .with_state(ServiceState { agent })
}

struct ServiceError {
    status: StatusCode,
    message: String,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "message": self.message }));
        (self.status, body).into_response()
    }
}

async fn cmd_sync(
    State(state): State<ServiceState>,
    Json(_req): Json<proto::SyncRequest>,
) -> Result<Json<proto::SyncResponse>, ServiceError> {
    let agent = state.agent.clone();
    let result = tokio::task::spawn_blocking(move || agent.sync()).await;

    match result {
        Ok(Ok(())) => Ok(Json(proto::SyncResponse {})),
        Ok(Err(SyncError::InProgress)) => Err(ServiceError {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: "sync already in progress".into(),
        }),
        Ok(Err(err)) => {
            error!(error = %err, "error syncing");
            Err(ServiceError {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: err.to_string(),
            })
        }
        Err(join) => Err(ServiceError {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: format!("sync task failed: {join}"),
        }),
    }
}
