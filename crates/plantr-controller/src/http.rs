// SPDX-License-Identifier: MIT OR Apache-2.0
//! HTTP surface: RPC routes, the auth middleware, and the webhook.

use crate::controller::Controller;
use crate::error::ControllerError;
use axum::body::Bytes;
use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Extension, Json, Router};
use plantr_auth::Claims;
use plantr_proto as proto;
use plantr_telemetry::BodyLogging;
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

/// Routes that skip bearer-token auth: login (bootstraps the token) and
/// the webhook (validated by HMAC signature instead).
const OPEN_ROUTES: &[&str] = &[proto::CONTROLLER_LOGIN, proto::GITHUB_WEBHOOK];

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    /// The control plane.
    pub controller: Arc<Controller>,
}

/// Build the controller's router.
pub fn build_router(controller: Arc<Controller>, body_logging: BodyLogging) -> Router {
    let state = AppState { controller };
    Router::new()
        .route(proto::CONTROLLER_LOGIN, post(cmd_login))
        .route(proto::CONTROLLER_GET_SYNC_DATA, post(cmd_get_sync_data))
        .route(proto::CONTROLLER_FORCE_REFRESH, post(cmd_force_refresh))
        .route(proto::GITHUB_WEBHOOK, post(cmd_webhook))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .layer(axum::middleware::from_fn_with_state(
            body_logging,
            plantr_telemetry::request_logger,
        ))
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Errors at the boundary
// ---------------------------------------------------------------------------

/// Transport-level error body.
#[derive(Debug)]
pub struct RpcError {
    /// HTTP status.
    pub status: StatusCode,
    /// Stable machine-readable code.
    pub code: &'static str,
    /// Human-readable message.
    pub message: String,
}

impl RpcError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    /// 400: the request was malformed or invalid.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_argument", message)
    }

    /// 401: no credentials presented.
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "unauthenticated", message)
    }

    /// 403: credentials presented but rejected.
    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "permission_denied", message)
    }

    /// 500: anything the caller cannot fix.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
    }
}

impl IntoResponse for RpcError {
    fn into_response(self) -> Response {
        let body = Json(json!({ "code": self.code, "message": self.message }));
        (self.status, body).into_response()
    }
}

impl From<ControllerError> for RpcError {
    fn from(err: ControllerError) -> Self {
        match &err {
            // Auth failures are opaque to callers; the detail is logged.
            ControllerError::UnknownNodeId(_)
            | ControllerError::UnknownChallengeId
            | ControllerError::IncorrectChallengeValue
            | ControllerError::WebhookSignature
            | ControllerError::WebhookNotConfigured => {
                warn!(error = %err, "rejecting request");
                RpcError::permission_denied("permission denied")
            }
            ControllerError::Parse(_)
            | ControllerError::Seed(_)
            | ControllerError::WebhookPayload(_) => RpcError::invalid_argument(err.to_string()),
            _ => RpcError::internal(err.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Middleware
// ---------------------------------------------------------------------------

/// Require a valid bearer token on everything outside [`OPEN_ROUTES`],
/// attaching the verified claims as a request extension.
pub(crate) async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, RpcError> {
    if OPEN_ROUTES.contains(&req.uri().path()) {
        return Ok(next.run(req).await);
    }

    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| RpcError::unauthenticated("no token provided"))?;

    let claims = plantr_auth::verify(token, state.controller.signing_key()).map_err(|err| {
        warn!(error = %err, "token rejected");
        RpcError::permission_denied("permission denied")
    })?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn cmd_login(
    State(state): State<AppState>,
    Json(req): Json<proto::LoginRequest>,
) -> Result<Json<proto::LoginResponse>, RpcError> {
    let resp = state.controller.login(&req).await?;
    Ok(Json(resp))
}

async fn cmd_get_sync_data(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(_req): Json<proto::GetSyncDataRequest>,
) -> Result<Json<proto::GetSyncDataResponse>, RpcError> {
    let seeds = state.controller.get_sync_data(&claims.node_id).await?;
    Ok(Json(proto::GetSyncDataResponse { seeds }))
}

async fn cmd_force_refresh(
    State(state): State<AppState>,
    Json(_req): Json<proto::ForceRefreshRequest>,
) -> Result<Json<proto::ForceRefreshResponse>, RpcError> {
    state.controller.force_refresh().await?;
    Ok(Json(proto::ForceRefreshResponse {}))
}

async fn cmd_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, RpcError> {
    let signature = headers
        .get("x-hub-signature-256")
        .and_then(|value| value.to_str().ok());
    state.controller.handle_webhook(signature, &body).await?;
    Ok(StatusCode::OK)
}
