// SPDX-License-Identifier: MIT OR Apache-2.0
//! Controller state and the operations behind every RPC.

use crate::assets::AssetResolver;
use crate::error::ControllerError;
use crate::render;
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use plantr_core::{Config, Node, Seed, SeedKind};
use plantr_git::GitClient;
use plantr_proto as proto;
use plantr_storage::{Challenge, StorageClient};
use plantr_vault::{SecretData, VaultClient};
use serde::Deserialize;
use sha2::Sha256;
use std::collections::BTreeSet;
use std::sync::Arc;
use subtle::ConstantTimeEq as _;
use tokio::sync::RwLock;
use tracing::{info, warn};
use uuid::Uuid;

/// Only pushes to this ref trigger a reload.
const DEPLOY_REF: &str = "refs/heads/main";

/// Everything needed to build a [`Controller`].
pub struct ControllerConfig {
    /// Configuration repository URL.
    pub repo_url: String,
    /// HS256 signing key for bearer tokens.
    pub jwt_signing_key: Vec<u8>,
    /// Token lifetime.
    pub jwt_duration: Duration,
    /// Repository access.
    pub git: Arc<dyn GitClient>,
    /// Challenge store and release-asset cache.
    pub storage: Arc<dyn StorageClient>,
    /// Secret source for template rendering.
    pub vault: Arc<dyn VaultClient>,
    /// Token for release-asset API calls and agent downloads.
    pub github_release_token: Option<String>,
    /// Shared secret validating webhook deliveries.
    pub github_webhook_secret: Option<String>,
    /// Override the GitHub API base URL (tests).
    pub github_api_base: Option<String>,
}

/// The control plane. One instance per process, shared across request
/// handlers behind an `Arc`.
pub struct Controller {
    repo_url: String,
    jwt_signing_key: Vec<u8>,
    jwt_duration: Duration,
    git: Arc<dyn GitClient>,
    storage: Arc<dyn StorageClient>,
    vault: Arc<dyn VaultClient>,
    github_release_token: Option<String>,
    webhook_secret: Option<String>,
    resolver: AssetResolver,

    /// Parsed configuration; replaced wholesale, never mutated.
    config: RwLock<Option<Arc<Config>>>,
}

impl Controller {
    /// Build a controller.
    pub fn new(conf: ControllerConfig) -> Self {
        let mut resolver =
            AssetResolver::new(conf.storage.clone(), conf.github_release_token.clone());
        if let Some(base) = &conf.github_api_base {
            resolver = resolver.with_api_base(base.clone());
        }

        Self {
            repo_url: conf.repo_url,
            jwt_signing_key: conf.jwt_signing_key,
            jwt_duration: conf.jwt_duration,
            git: conf.git,
            storage: conf.storage,
            vault: conf.vault,
            github_release_token: conf.github_release_token,
            webhook_secret: conf.github_webhook_secret,
            resolver,
            config: RwLock::new(None),
        }
    }

    pub(crate) fn signing_key(&self) -> &[u8] {
        &self.jwt_signing_key
    }

    // -- Config pipeline -----------------------------------------------------

    /// Return the live configuration, loading it on first use.
    pub async fn ensure_config(&self) -> Result<Arc<Config>, ControllerError> {
        if let Some(config) = self.config.read().await.clone() {
            return Ok(config);
        }
        self.load_config().await
    }

    /// Unconditionally reload from the repository's latest commit.
    pub async fn load_config(&self) -> Result<Arc<Config>, ControllerError> {
        let commit = self.git.latest_commit(&self.repo_url).await?;
        self.load_config_at(&commit).await
    }

    /// Reload from a specific commit and swap it in.
    pub async fn load_config_at(&self, commit: &str) -> Result<Arc<Config>, ControllerError> {
        info!(commit, "loading config");
        let checkout = self.git.clone_at_commit(&self.repo_url, commit).await?;

        // The loader reads template files synchronously; keep it off the
        // request threads.
        let parsed = tokio::task::spawn_blocking(move || {
            let config = plantr_core::load_config(checkout.path());
            drop(checkout);
            config
        })
        .await
        .map_err(|err| ControllerError::LoadTask(err.to_string()))??;

        let config = Arc::new(parsed);
        *self.config.write().await = Some(config.clone());
        info!(
            nodes = config.nodes.len(),
            roles = config.roles.len(),
            "config loaded"
        );
        Ok(config)
    }

    /// Operator-triggered reload.
    pub async fn force_refresh(&self) -> Result<(), ControllerError> {
        self.load_config().await.map(|_| ())
    }

    // -- Login ---------------------------------------------------------------

    /// Handle either phase of the login exchange.
    pub async fn login(
        &self,
        req: &proto::LoginRequest,
    ) -> Result<proto::LoginResponse, ControllerError> {
        if req.is_challenge_response() {
            self.login_challenge_response(req).await
        } else {
            self.login_issue_challenge(req).await
        }
    }

    async fn login_issue_challenge(
        &self,
        req: &proto::LoginRequest,
    ) -> Result<proto::LoginResponse, ControllerError> {
        let config = self.ensure_config().await?;
        let node = config
            .node(&req.node_id)
            .ok_or_else(|| ControllerError::UnknownNodeId(req.node_id.clone()))?;

        let challenge = Challenge {
            id: Uuid::new_v4().to_string(),
            value: Uuid::new_v4().to_string(),
        };
        let sealed = plantr_auth::seal_value(&node.public_key, &challenge.value)?;
        self.storage.write_challenge(&challenge)?;

        info!(node_id = req.node_id, "issued login challenge");
        Ok(proto::LoginResponse::Challenge {
            challenge_id: challenge.id,
            sealed_challenge: sealed,
        })
    }

    async fn login_challenge_response(
        &self,
        req: &proto::LoginRequest,
    ) -> Result<proto::LoginResponse, ControllerError> {
        // is_challenge_response() guarantees both fields.
        let (Some(challenge_id), Some(challenge_value)) =
            (&req.challenge_id, &req.challenge_value)
        else {
            return Err(ControllerError::UnknownChallengeId);
        };

        let challenge = self
            .storage
            .read_challenge(challenge_id)?
            .ok_or(ControllerError::UnknownChallengeId)?;

        let matches: bool = challenge
            .value
            .as_bytes()
            .ct_eq(challenge_value.as_bytes())
            .into();
        if !matches {
            return Err(ControllerError::IncorrectChallengeValue);
        }

        // Challenges are single-use.
        self.storage.delete_challenge(challenge_id)?;

        let expires_at = Utc::now() + self.jwt_duration;
        let token = plantr_auth::mint(&self.jwt_signing_key, &req.node_id, expires_at)?;
        info!(node_id = req.node_id, "login complete");
        Ok(proto::LoginResponse::Token { token })
    }

    // -- Sync data -----------------------------------------------------------

    /// Collect and render the seed list for an authenticated node.
    pub async fn get_sync_data(
        &self,
        node_id: &str,
    ) -> Result<Vec<proto::Seed>, ControllerError> {
        let (seeds, node) = self.collect_seeds(node_id).await?;
        self.render_seeds(&node, &seeds).await
    }

    /// Flatten the node's roles into the raw, ordered seed list.
    ///
    /// Deduplication belongs to rendering; collection keeps every
    /// occurrence so fingerprints see the same inputs regardless of which
    /// role contributed a seed.
    async fn collect_seeds(&self, node_id: &str) -> Result<(Vec<Seed>, Node), ControllerError> {
        let config = self.ensure_config().await?;
        let node = config
            .node(node_id)
            .ok_or_else(|| ControllerError::UnknownNodeId(node_id.to_string()))?
            .clone();

        let mut seeds = Vec::new();
        for role in &node.roles {
            let role_seeds = config
                .roles
                .get(role)
                .ok_or_else(|| ControllerError::UnknownRole {
                    node: node.id.clone(),
                    role: role.clone(),
                })?;
            seeds.extend(role_seeds.iter().cloned());
        }

        Ok((seeds, node))
    }

    /// Render seeds in order, dropping repeat fingerprints.
    async fn render_seeds(
        &self,
        node: &Node,
        seeds: &[Seed],
    ) -> Result<Vec<proto::Seed>, ControllerError> {
        // One vault snapshot per render call, not per seed.
        let vault_data = self.vault.read_secret_data().await?;

        // Snapshot of every named seed, so HasSeed sees a consistent view
        // no matter where in the list a template sits.
        let named_seeds: BTreeSet<String> = seeds
            .iter()
            .filter_map(|seed| seed.meta.name.clone())
            .collect();

        let mut rendered = Vec::with_capacity(seeds.len());
        let mut seen = BTreeSet::new();

        for seed in seeds {
            let hash = seed.fingerprint(node)?;
            if !seen.insert(hash.clone()) {
                continue;
            }

            let element = self
                .render_element(seed, node, &vault_data, &named_seeds, &hash)
                .await?;
            rendered.push(proto::Seed {
                metadata: proto::SeedMetadata {
                    display_name: seed.display_name(node),
                    hash,
                },
                element,
            });
        }

        Ok(rendered)
    }

    async fn render_element(
        &self,
        seed: &Seed,
        node: &Node,
        vault: &SecretData,
        named_seeds: &BTreeSet<String>,
        hash: &str,
    ) -> Result<proto::SeedElement, ControllerError> {
        let element = match &seed.kind {
            SeedKind::ConfigFile(file) => proto::SeedElement::ConfigFile(
                render::render_config_file(file, node, vault, named_seeds)?,
            ),
            SeedKind::GithubRelease(release) => {
                let download_url = self.resolver.resolve(release, node, hash).await?;
                proto::SeedElement::GithubRelease(proto::Download {
                    download_url,
                    destination_directory: node.bin_dir.display().to_string(),
                    name_override: release.name_override.clone(),
                    archive_release: release.archive_release,
                    binary_regex: release.binary_regex.clone(),
                    auth_header: self.github_release_token.clone(),
                })
            }
            SeedKind::SystemPackage(package) => {
                proto::SeedElement::SystemPackage(render::render_system_package(package, node)?)
            }
            SeedKind::GitRepo(repo) => {
                proto::SeedElement::GitRepo(render::render_git_repo(repo, node))
            }
            SeedKind::Golang(golang) => proto::SeedElement::Golang(render::render_golang(golang)),
            SeedKind::GoInstall(install) => {
                proto::SeedElement::GoInstall(render::render_go_install(install))
            }
            SeedKind::UrlDownload(download) => {
                proto::SeedElement::UrlDownload(render::render_url_download(download, node)?)
            }
        };
        Ok(element)
    }

    // -- Webhook -------------------------------------------------------------

    /// Validate and act on a GitHub push webhook delivery.
    pub async fn handle_webhook(
        &self,
        signature: Option<&str>,
        body: &[u8],
    ) -> Result<(), ControllerError> {
        let secret = self
            .webhook_secret
            .as_deref()
            .ok_or(ControllerError::WebhookNotConfigured)?;
        let signature = signature.ok_or(ControllerError::WebhookSignature)?;
        verify_webhook_signature(secret, signature, body)?;

        #[derive(Deserialize)]
        struct PushEvent {
            #[serde(rename = "ref")]
            git_ref: String,
            after: String,
        }

        let event: PushEvent = serde_json::from_slice(body)
            .map_err(|err| ControllerError::WebhookPayload(err.to_string()))?;

        if event.git_ref != DEPLOY_REF {
            info!(git_ref = event.git_ref, "ignoring push to non-deploy ref");
            return Ok(());
        }

        self.load_config_at(&event.after).await?;
        Ok(())
    }
}

/// Check an `X-Hub-Signature-256` header against the body.
pub(crate) fn verify_webhook_signature(
    secret: &str,
    header: &str,
    body: &[u8],
) -> Result<(), ControllerError> {
    let hex_digest = header.strip_prefix("sha256=").unwrap_or(header);
    let expected = hex::decode(hex_digest).map_err(|_| {
        warn!("webhook signature is not valid hex");
        ControllerError::WebhookSignature
    })?;

    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|_| ControllerError::WebhookSignature)?;
    mac.update(body);
    mac.verify_slice(&expected).map_err(|_| {
        warn!("webhook signature mismatch");
        ControllerError::WebhookSignature
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use plantr_git::StaticGitClient;
    use plantr_storage::SqliteStorage;
    use plantr_vault::NoopVault;
    use std::fs;
    use tempfile::TempDir;

    /// The GitHub docs' worked signature example (invariant for the
    /// validation algorithm).
    const DOCS_SECRET: &str = "It's a Secret to Everybody";
    const DOCS_BODY: &[u8] = b"Hello, World!";
    const DOCS_SIGNATURE: &str =
        "sha256=757107ea0eb2509fc211221cce984b8a37570b6d7586c22c46f4379c8b043e17";

    fn write_repo(files: &[(&str, &str)]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for (path, content) in files {
            let full = dir.path().join(path);
            if let Some(parent) = full.parent() {
                fs::create_dir_all(parent).unwrap();
            }
            fs::write(full, content).unwrap();
        }
        dir
    }

    fn controller_over(repo: &TempDir) -> Controller {
        controller_with(repo, None, None)
    }

    fn controller_with(
        repo: &TempDir,
        webhook_secret: Option<&str>,
        github_api_base: Option<String>,
    ) -> Controller {
        Controller::new(ControllerConfig {
            repo_url: "https://github.com/example/config.git".into(),
            jwt_signing_key: b"controller-test-signing-key".to_vec(),
            jwt_duration: Duration::hours(4),
            git: Arc::new(StaticGitClient::new(repo.path()).unwrap()),
            storage: Arc::new(SqliteStorage::open_in_memory().unwrap()),
            vault: Arc::new(NoopVault),
            github_release_token: None,
            github_webhook_secret: webhook_secret.map(String::from),
            github_api_base,
        })
    }

    fn keypair() -> plantr_auth::Keypair {
        plantr_auth::generate_keypair(2048).unwrap()
    }

    fn node_yaml(public_pem: &str, roles: &str) -> String {
        use base64::Engine as _;
        format!(
            "  - id: vm-1\n    hostname: vm-1.local\n    public_key_b64: {}\n    roles: {roles}\n    user_home: /tmp/u\n    os: linux\n    arch: amd64\n    package_manager: apt\n",
            base64::engine::general_purpose::STANDARD.encode(public_pem)
        )
    }

    // -- login ---------------------------------------------------------------

    #[tokio::test]
    async fn login_roundtrip_mints_token_for_node() {
        let pair = keypair();
        let yaml = format!("nodes:\n{}roles: {{}}\n", node_yaml(&pair.public_pem, "[]"));
        let repo = write_repo(&[("plantr.yaml", &yaml)]);
        let controller = controller_over(&repo);

        // Phase 1.
        let resp = controller
            .login(&proto::LoginRequest {
                node_id: "vm-1".into(),
                challenge_id: None,
                challenge_value: None,
            })
            .await
            .unwrap();
        let proto::LoginResponse::Challenge {
            challenge_id,
            sealed_challenge,
        } = resp
        else {
            panic!("expected challenge response");
        };

        // The agent decrypts with its private key.
        let value = plantr_auth::open_value(&pair.private_pem, &sealed_challenge).unwrap();

        // Phase 2.
        let before = Utc::now();
        let resp = controller
            .login(&proto::LoginRequest {
                node_id: "vm-1".into(),
                challenge_id: Some(challenge_id),
                challenge_value: Some(value),
            })
            .await
            .unwrap();
        let proto::LoginResponse::Token { token } = resp else {
            panic!("expected token response");
        };

        let claims = plantr_auth::verify(&token, b"controller-test-signing-key").unwrap();
        assert_eq!(claims.node_id, "vm-1");
        let expected = (before + Duration::hours(4)).timestamp();
        assert!((claims.exp - expected).abs() <= 2, "exp drifted: {}", claims.exp);
    }

    #[tokio::test]
    async fn login_unknown_node_is_rejected() {
        let repo = write_repo(&[("plantr.yaml", "nodes: []\nroles: {}\n")]);
        let controller = controller_over(&repo);

        let err = controller
            .login(&proto::LoginRequest {
                node_id: "ghost".into(),
                challenge_id: None,
                challenge_value: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ControllerError::UnknownNodeId(_)));
    }

    #[tokio::test]
    async fn login_wrong_challenge_value_is_rejected() {
        let pair = keypair();
        let yaml = format!("nodes:\n{}roles: {{}}\n", node_yaml(&pair.public_pem, "[]"));
        let repo = write_repo(&[("plantr.yaml", &yaml)]);
        let controller = controller_over(&repo);

        let resp = controller
            .login(&proto::LoginRequest {
                node_id: "vm-1".into(),
                challenge_id: None,
                challenge_value: None,
            })
            .await
            .unwrap();
        let proto::LoginResponse::Challenge { challenge_id, .. } = resp else {
            panic!("expected challenge response");
        };

        let err = controller
            .login(&proto::LoginRequest {
                node_id: "vm-1".into(),
                challenge_id: Some(challenge_id),
                challenge_value: Some("wrong".into()),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ControllerError::IncorrectChallengeValue));
    }

    #[tokio::test]
    async fn challenges_are_single_use() {
        let pair = keypair();
        let yaml = format!("nodes:\n{}roles: {{}}\n", node_yaml(&pair.public_pem, "[]"));
        let repo = write_repo(&[("plantr.yaml", &yaml)]);
        let controller = controller_over(&repo);

        let proto::LoginResponse::Challenge {
            challenge_id,
            sealed_challenge,
        } = controller
            .login(&proto::LoginRequest {
                node_id: "vm-1".into(),
                challenge_id: None,
                challenge_value: None,
            })
            .await
            .unwrap()
        else {
            panic!("expected challenge response");
        };
        let value = plantr_auth::open_value(&pair.private_pem, &sealed_challenge).unwrap();

        let phase2 = proto::LoginRequest {
            node_id: "vm-1".into(),
            challenge_id: Some(challenge_id),
            challenge_value: Some(value),
        };
        controller.login(&phase2).await.unwrap();

        // Replay.
        let err = controller.login(&phase2).await.unwrap_err();
        assert!(matches!(err, ControllerError::UnknownChallengeId));
    }

    // -- sync data -----------------------------------------------------------

    #[tokio::test]
    async fn sync_data_renders_templates_with_has_seed() {
        let pair = keypair();
        let yaml = format!(
            "nodes:\n{}roles:\n  workstation:\n    - name: seed-one\n      config_file:\n        path: templates/one\n        destination: ~/seed-one\n    - config_file:\n        path: templates/two\n        destination: ~/seed-two\n",
            node_yaml(&pair.public_pem, "[workstation]")
        );
        let repo = write_repo(&[
            ("plantr.yaml", &yaml),
            ("templates/one", "seed-one-content"),
            (
                "templates/two",
                "{% if HasSeed(\"seed-one\") %}seed-one-installed{% endif %}",
            ),
        ]);
        let controller = controller_over(&repo);

        let seeds = controller.get_sync_data("vm-1").await.unwrap();
        assert_eq!(seeds.len(), 2);

        let proto::SeedElement::ConfigFile(first) = &seeds[0].element else {
            panic!("expected config file");
        };
        assert_eq!(first.destination, "/tmp/u/seed-one");
        assert_eq!(first.content, "seed-one-content");

        let proto::SeedElement::ConfigFile(second) = &seeds[1].element else {
            panic!("expected config file");
        };
        assert_eq!(second.destination, "/tmp/u/seed-two");
        assert_eq!(second.content, "seed-one-installed");
    }

    #[tokio::test]
    async fn sync_data_drops_duplicate_fingerprints_across_roles() {
        let pair = keypair();
        let yaml = format!(
            "nodes:\n{}roles:\n  a:\n    - system_package:\n        apt: {{ name: git }}\n    - system_package:\n        apt: {{ name: jq }}\n  b:\n    - system_package:\n        apt: {{ name: git }}\n",
            node_yaml(&pair.public_pem, "[a, b]")
        );
        let repo = write_repo(&[("plantr.yaml", &yaml)]);
        let controller = controller_over(&repo);

        let seeds = controller.get_sync_data("vm-1").await.unwrap();
        let names: Vec<&str> = seeds
            .iter()
            .map(|s| match &s.element {
                proto::SeedElement::SystemPackage(p) => p.name(),
                other => panic!("wrong kind: {other:?}"),
            })
            .collect();
        assert_eq!(names, vec!["git", "jq"]);

        // Hashes are pairwise distinct in the rendered list.
        let mut hashes: Vec<&str> = seeds.iter().map(|s| s.metadata.hash.as_str()).collect();
        hashes.sort_unstable();
        hashes.dedup();
        assert_eq!(hashes.len(), seeds.len());
    }

    #[tokio::test]
    async fn sync_data_unknown_role_is_fatal() {
        let pair = keypair();
        let yaml = format!(
            "nodes:\n{}roles: {{}}\n",
            node_yaml(&pair.public_pem, "[missing-role]")
        );
        let repo = write_repo(&[("plantr.yaml", &yaml)]);
        let controller = controller_over(&repo);

        let err = controller.get_sync_data("vm-1").await.unwrap_err();
        assert!(matches!(err, ControllerError::UnknownRole { .. }));
    }

    #[tokio::test]
    async fn release_assets_are_cached_across_sync_calls() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/repos/BurntSushi/ripgrep/releases/tags/14.1.1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "assets": [
                    {
                        "name": "ripgrep-14.1.1-x86_64-unknown-linux-musl.tar.gz",
                        "browser_download_url": "https://example.com/rg-musl.tar.gz"
                    },
                    {
                        "name": "ripgrep-14.1.1-aarch64-apple-darwin.tar.gz",
                        "browser_download_url": "https://example.com/rg-darwin.tar.gz"
                    }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let pair = keypair();
        let yaml = format!(
            "nodes:\n{}roles:\n  tools:\n    - github_release:\n        repo: BurntSushi/ripgrep\n        tag: 14.1.1\n",
            node_yaml(&pair.public_pem, "[tools]")
        );
        let repo = write_repo(&[("plantr.yaml", &yaml)]);
        let controller = controller_with(&repo, None, Some(server.uri()));

        // Two consecutive polls; the mock's expect(1) asserts the API was
        // hit exactly once.
        for _ in 0..2 {
            let seeds = controller.get_sync_data("vm-1").await.unwrap();
            let proto::SeedElement::GithubRelease(download) = &seeds[0].element else {
                panic!("expected github release");
            };
            assert_eq!(download.download_url, "https://example.com/rg-musl.tar.gz");
        }
    }

    // -- webhook -------------------------------------------------------------

    #[test]
    fn webhook_signature_accepts_github_docs_example() {
        verify_webhook_signature(DOCS_SECRET, DOCS_SIGNATURE, DOCS_BODY).unwrap();
    }

    #[test]
    fn webhook_signature_rejects_tampered_body() {
        let err =
            verify_webhook_signature(DOCS_SECRET, DOCS_SIGNATURE, b"Hello, World?").unwrap_err();
        assert!(matches!(err, ControllerError::WebhookSignature));
    }

    #[test]
    fn webhook_signature_rejects_wrong_secret() {
        let err = verify_webhook_signature("another secret", DOCS_SIGNATURE, DOCS_BODY)
            .unwrap_err();
        assert!(matches!(err, ControllerError::WebhookSignature));
    }

    #[tokio::test]
    async fn webhook_ignores_non_main_refs() {
        let repo = write_repo(&[("plantr.yaml", "nodes: []\nroles: {}\n")]);
        let controller = controller_with(&repo, Some("hook-secret"), None);

        let body = serde_json::to_vec(&serde_json::json!({
            "ref": "refs/heads/feature",
            "after": "abc123"
        }))
        .unwrap();
        let signature = {
            let mut mac = Hmac::<Sha256>::new_from_slice(b"hook-secret").unwrap();
            mac.update(&body);
            format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
        };

        controller
            .handle_webhook(Some(&signature), &body)
            .await
            .unwrap();
        // Nothing was loaded.
        assert!(controller.config.read().await.is_none());
    }

    #[tokio::test]
    async fn webhook_on_main_reloads_config() {
        let repo = write_repo(&[("plantr.yaml", "nodes: []\nroles: {}\n")]);
        let controller = controller_with(&repo, Some("hook-secret"), None);

        let body = serde_json::to_vec(&serde_json::json!({
            "ref": "refs/heads/main",
            "after": "abc123"
        }))
        .unwrap();
        let signature = {
            let mut mac = Hmac::<Sha256>::new_from_slice(b"hook-secret").unwrap();
            mac.update(&body);
            format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
        };

        controller
            .handle_webhook(Some(&signature), &body)
            .await
            .unwrap();
        assert!(controller.config.read().await.is_some());
    }

    #[tokio::test]
    async fn webhook_without_secret_configured_is_rejected() {
        let repo = write_repo(&[("plantr.yaml", "nodes: []\nroles: {}\n")]);
        let controller = controller_over(&repo);

        let err = controller
            .handle_webhook(Some("sha256=00"), b"{}")
            .await
            .unwrap_err();
        assert!(matches!(err, ControllerError::WebhookNotConfigured));
    }
}
