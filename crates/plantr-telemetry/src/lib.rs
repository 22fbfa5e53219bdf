// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

use axum::body::{Body, to_bytes};
use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use std::str::FromStr;
use std::time::Instant;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

// ---------------------------------------------------------------------------
// Bootstrap
// ---------------------------------------------------------------------------

/// Log verbosity, lowest to highest.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogLevel {
    /// Everything, including per-request noise.
    Trace,
    /// Developer detail.
    Debug,
    /// Normal operation.
    #[default]
    Info,
    /// Something looks off.
    Warn,
    /// Something is broken.
    Error,
}

impl LogLevel {
    /// Directive string fed to the env filter.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl FromStr for LogLevel {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => Err(TelemetryError::UnknownLevel(other.to_string())),
        }
    }
}

/// Output encoding for log lines.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// One JSON object per line; the default for daemons.
    #[default]
    Json,
    /// Compact human-readable lines; the default for the CLI.
    Human,
}

impl FromStr for LogFormat {
    type Err = TelemetryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "json" => Ok(Self::Json),
            "human" => Ok(Self::Human),
            other => Err(TelemetryError::UnknownFormat(other.to_string())),
        }
    }
}

/// Errors from telemetry configuration.
#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    /// `LOG_LEVEL` holds an unknown value.
    #[error("unknown log level '{0}'")]
    UnknownLevel(String),
    /// `LOG_FORMAT` holds an unknown value.
    #[error("unknown log format '{0}'")]
    UnknownFormat(String),
}

/// Install the global tracing subscriber.
///
/// Safe to call more than once; later calls are no-ops, which keeps test
/// binaries from panicking when several tests initialize logging.
pub fn init(level: LogLevel, format: LogFormat) {
    let filter = EnvFilter::new(level.as_str());
    let result = match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .try_init(),
        LogFormat::Human => tracing_subscriber::fmt().with_env_filter(filter).try_init(),
    };
    // Already-set errors are expected under test harnesses.
    drop(result);
}

// ---------------------------------------------------------------------------
// Request logging middleware
// ---------------------------------------------------------------------------

/// Body logging switches, off by default.
///
/// Status-line logging is always on; bodies are opt-in because they can
/// carry rendered secrets.
#[derive(Clone, Copy, Debug, Default)]
pub struct BodyLogging {
    /// Log request bodies at debug.
    pub requests: bool,
    /// Log response bodies at debug.
    pub responses: bool,
}

/// Axum middleware logging method, path, status, and duration per request,
/// plus bodies when enabled via [`BodyLogging`].
pub async fn request_logger(
    State(cfg): State<BodyLogging>,
    req: Request,
    next: Next,
) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let start = Instant::now();

    let req = if cfg.requests {
        let (parts, body) = req.into_parts();
        match to_bytes(body, usize::MAX).await {
            Ok(bytes) => {
                debug!(
                    http.method = %method,
                    http.path = %path,
                    body = %String::from_utf8_lossy(&bytes),
                    "request body"
                );
                Request::from_parts(parts, Body::from(bytes))
            }
            Err(_) => Request::from_parts(parts, Body::empty()),
        }
    } else {
        req
    };

    let resp = next.run(req).await;
    let status = resp.status().as_u16();
    let duration_ms = start.elapsed().as_millis() as u64;

    let resp = if cfg.responses {
        let (parts, body) = resp.into_parts();
        match to_bytes(body, usize::MAX).await {
            Ok(bytes) => {
                debug!(
                    http.method = %method,
                    http.path = %path,
                    body = %String::from_utf8_lossy(&bytes),
                    "response body"
                );
                Response::from_parts(parts, Body::from(bytes))
            }
            Err(_) => Response::from_parts(parts, Body::empty()),
        }
    } else {
        resp
    };

    info!(
        http.method = %method,
        http.path = %path,
        http.status = status,
        http.duration_ms = duration_ms,
        "request completed"
    );

    resp
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::routing::post;
    use tower::ServiceExt as _;

    #[test]
    fn log_level_parses_known_values() {
        assert_eq!("trace".parse::<LogLevel>().unwrap(), LogLevel::Trace);
        assert_eq!("info".parse::<LogLevel>().unwrap(), LogLevel::Info);
        assert_eq!("error".parse::<LogLevel>().unwrap(), LogLevel::Error);
        assert!("verbose".parse::<LogLevel>().is_err());
    }

    #[test]
    fn log_format_parses_known_values() {
        assert_eq!("json".parse::<LogFormat>().unwrap(), LogFormat::Json);
        assert_eq!("human".parse::<LogFormat>().unwrap(), LogFormat::Human);
        assert!("logfmt".parse::<LogFormat>().is_err());
    }

    #[tokio::test]
    async fn request_logger_preserves_bodies() {
        let app = Router::new()
            .route("/echo", post(|body: String| async move { body }))
            .layer(axum::middleware::from_fn_with_state(
                BodyLogging {
                    requests: true,
                    responses: true,
                },
                request_logger,
            ));

        let resp = app
            .oneshot(
                axum::http::Request::builder()
                    .method("POST")
                    .uri("/echo")
                    .body(Body::from("ping"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(resp.status(), 200);
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"ping");
    }
}
