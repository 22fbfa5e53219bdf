// SPDX-License-Identifier: MIT OR Apache-2.0
//! Blocking RPC client for the controller.

use plantr_proto as proto;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

/// Errors from controller RPC calls.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The request never completed.
    #[error("error calling {path}: {source}")]
    Request {
        /// RPC route.
        path: String,
        /// Underlying transport error.
        #[source]
        source: reqwest::Error,
    },

    /// The controller answered with a non-success status.
    #[error("controller answered {status} on {path}: {message}")]
    Status {
        /// RPC route.
        path: String,
        /// HTTP status code.
        status: u16,
        /// Response body, usually a JSON error envelope.
        message: String,
    },

    /// The response body did not decode as the expected message.
    #[error("error decoding response from {path}: {source}")]
    Decode {
        /// RPC route.
        path: String,
        /// Underlying decode error.
        #[source]
        source: reqwest::Error,
    },
}

/// Blocking JSON-over-HTTP client for [`proto`] routes.
pub struct ControllerClient {
    base: String,
    http: reqwest::blocking::Client,
}

impl ControllerClient {
    /// Build a client against `address` (scheme + host + port).
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            base: address.into(),
            http: reqwest::blocking::Client::new(),
        }
    }

    fn post<Req, Resp>(
        &self,
        path: &str,
        token: Option<&str>,
        body: &Req,
    ) -> Result<Resp, ClientError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let url = format!("{}{path}", self.base.trim_end_matches('/'));
        debug!(%url, "calling controller");

        let mut request = self.http.post(&url).json(body);
        if let Some(token) = token {
            request = request.header("authorization", token);
        }

        let response = request.send().map_err(|source| ClientError::Request {
            path: path.to_string(),
            source,
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status {
                path: path.to_string(),
                status: status.as_u16(),
                message: response.text().unwrap_or_default(),
            });
        }

        response.json().map_err(|source| ClientError::Decode {
            path: path.to_string(),
            source,
        })
    }

    /// Either phase of the login exchange.
    pub fn login(&self, req: &proto::LoginRequest) -> Result<proto::LoginResponse, ClientError> {
        self.post(proto::CONTROLLER_LOGIN, None, req)
    }

    /// Fetch the rendered seed list.
    pub fn get_sync_data(&self, token: &str) -> Result<proto::GetSyncDataResponse, ClientError> {
        self.post(
            proto::CONTROLLER_GET_SYNC_DATA,
            Some(token),
            &proto::GetSyncDataRequest {},
        )
    }

    /// Ask the controller to re-clone its configuration.
    pub fn force_refresh(&self, token: &str) -> Result<(), ClientError> {
        let _resp: proto::ForceRefreshResponse = self.post(
            proto::CONTROLLER_FORCE_REFRESH,
            Some(token),
            &proto::ForceRefreshRequest {},
        )?;
        Ok(())
    }
}
