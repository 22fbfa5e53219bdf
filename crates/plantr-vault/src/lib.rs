// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::debug;

/// A snapshot of secret data, keyed by name.
pub type SecretData = BTreeMap<String, serde_json::Value>;

/// Errors from the vault layer.
#[derive(Debug, thiserror::Error)]
pub enum VaultError {
    /// The vault could not be reached or answered with an error status.
    #[error("error reading secret data: {0}")]
    Request(#[from] reqwest::Error),

    /// The response body was not the expected KV v2 shape.
    #[error("unexpected secret payload: {0}")]
    Payload(String),
}

/// A source of secret data for template rendering.
///
/// Values are fetched fresh on every render call; implementations do not
/// cache.
#[async_trait]
pub trait VaultClient: Send + Sync {
    /// Read the current secret snapshot.
    async fn read_secret_data(&self) -> Result<SecretData, VaultError>;
}

// ---------------------------------------------------------------------------
// Noop
// ---------------------------------------------------------------------------

/// Vault that serves a fixed map. Used when no vault is configured and in
/// tests.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopVault;

#[async_trait]
impl VaultClient for NoopVault {
    async fn read_secret_data(&self) -> Result<SecretData, VaultError> {
        debug!("noop vault client, returning static secret data");
        let mut data = SecretData::new();
        data.insert("foo".into(), serde_json::Value::String("static-foo-value".into()));
        Ok(data)
    }
}

// ---------------------------------------------------------------------------
// HashiCorp KV v2
// ---------------------------------------------------------------------------

/// HashiCorp Vault KV v2 client.
pub struct HashicorpVault {
    address: String,
    token: String,
    secret_path: String,
    http: reqwest::Client,
}

impl HashicorpVault {
    /// Build a client against `address` (e.g. `https://vault.internal:8200`)
    /// reading the secret mounted at `secret/data/<secret_path>`.
    pub fn new(address: impl Into<String>, token: impl Into<String>, secret_path: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            token: token.into(),
            secret_path: secret_path.into(),
            http: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl VaultClient for HashicorpVault {
    async fn read_secret_data(&self) -> Result<SecretData, VaultError> {
        // KV v2 wraps the user payload in data.data.
        #[derive(Deserialize)]
        struct Outer {
            data: Inner,
        }
        #[derive(Deserialize)]
        struct Inner {
            data: SecretData,
        }

        let url = format!(
            "{}/v1/secret/data/{}",
            self.address.trim_end_matches('/'),
            self.secret_path
        );
        debug!(%url, "reading secret data");

        let resp = self
            .http
            .get(&url)
            .header("X-Vault-Token", &self.token)
            .send()
            .await?
            .error_for_status()?;

        let outer: Outer = resp
            .json()
            .await
            .map_err(|err| VaultError::Payload(err.to_string()))?;
        Ok(outer.data.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn noop_vault_returns_static_map() {
        let data = NoopVault.read_secret_data().await.unwrap();
        assert_eq!(data["foo"], serde_json::json!("static-foo-value"));
    }

    #[tokio::test]
    async fn hashicorp_vault_unwraps_kv_v2_payload() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v1/secret/data/plantr"))
            .and(header("X-Vault-Token", "root-token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": { "data": { "db_password": "hunter2" } }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let vault = HashicorpVault::new(server.uri(), "root-token", "plantr");
        let data = vault.read_secret_data().await.unwrap();
        assert_eq!(data["db_password"], serde_json::json!("hunter2"));
    }

    #[tokio::test]
    async fn hashicorp_vault_propagates_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403))
            .mount(&server)
            .await;

        let vault = HashicorpVault::new(server.uri(), "bad-token", "plantr");
        let err = vault.read_secret_data().await.unwrap_err();
        assert!(matches!(err, VaultError::Request(_)));
    }
}
