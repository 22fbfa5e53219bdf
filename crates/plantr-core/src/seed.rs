// SPDX-License-Identifier: MIT OR Apache-2.0
//! Seed variants and their per-kind behavior: display names and
//! content-derived fingerprints.

use crate::model::{Arch, Node, Os, PackageManager};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised when resolving a seed against a concrete node.
#[derive(Debug, thiserror::Error)]
pub enum SeedError {
    /// A `system_package` seed defines no package for the node's manager.
    #[error("no {manager} package defined for node '{node}'")]
    NoPackageForManager {
        /// The node's package manager.
        manager: PackageManager,
        /// The node id.
        node: String,
    },

    /// A `url_download` seed has no URL for the node's platform.
    #[error("no download URL for platform {os}/{arch}")]
    NoUrlForPlatform {
        /// The node's operating system.
        os: Os,
        /// The node's architecture.
        arch: Arch,
    },
}

// ---------------------------------------------------------------------------
// Variant payloads
// ---------------------------------------------------------------------------

/// A templated file rendered on the controller and written by the agent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Raw template text, read from the repository at parse time.
    pub template_content: String,
    /// Destination path on the node. A leading `~` expands to the node's
    /// home directory at render time.
    pub destination: String,
    /// Optional octal file mode (e.g. `0o600`).
    pub mode: Option<u32>,
}

/// A binary (or tree) taken from a GitHub release.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GithubRelease {
    /// `owner/name` repository slug.
    pub repo: String,
    /// Release tag.
    pub tag: String,
    /// Optional per-OS, per-arch asset name patterns. Validated at parse
    /// time; stored as source strings so the model stays comparable.
    pub asset_patterns: BTreeMap<Os, BTreeMap<Arch, String>>,
    /// Rename the installed binary or directory.
    pub name_override: Option<String>,
    /// Extract the whole archive tree instead of a single binary.
    pub archive_release: bool,
    /// Pattern selecting the one executable when extracting a binary.
    pub binary_regex: Option<String>,
}

impl GithubRelease {
    /// The user-supplied asset pattern for a platform, if any.
    pub fn asset_pattern(&self, os: Os, arch: Arch) -> Option<&str> {
        self.asset_patterns
            .get(&os)
            .and_then(|by_arch| by_arch.get(&arch))
            .map(String::as_str)
    }
}

/// A package name under one specific manager.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageSpec {
    /// Name as the manager knows it.
    pub name: String,
}

/// A system package, described per package manager. At least one of the
/// fields is set.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemPackage {
    /// apt package.
    pub apt: Option<PackageSpec>,
    /// Homebrew package.
    pub brew: Option<PackageSpec>,
    /// pacman package.
    pub pacman: Option<PackageSpec>,
}

impl SystemPackage {
    /// The package definition matching a node's manager, if present.
    pub fn for_manager(&self, manager: PackageManager) -> Option<&PackageSpec> {
        match manager {
            PackageManager::Apt => self.apt.as_ref(),
            PackageManager::Brew => self.brew.as_ref(),
            PackageManager::Pacman => self.pacman.as_ref(),
        }
    }
}

/// Which ref of a git repository to pin.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GitRef {
    /// A tag name, resolved to a commit on the node.
    Tag(String),
    /// A full commit hash.
    Commit(String),
}

impl GitRef {
    /// The raw ref value, tag name or commit hash.
    pub fn value(&self) -> &str {
        match self {
            Self::Tag(v) | Self::Commit(v) => v,
        }
    }
}

/// A git repository cloned and pinned on the node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitRepo {
    /// Clone URL.
    pub url: String,
    /// Checkout location on the node. A leading `~` expands at render time.
    pub location: String,
    /// Pinned ref.
    pub reference: GitRef,
}

/// The Go toolchain at a specific version.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Golang {
    /// Toolchain version, e.g. `1.23.4`.
    pub version: String,
}

/// A `go install`-able package.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoInstall {
    /// Package path, e.g. `github.com/foo/bar/cmd/bar`.
    pub package: String,
    /// Pinned version. `None` means `@latest` and is re-run every sync.
    pub version: Option<String>,
}

/// A binary (or tree) downloaded from an arbitrary URL.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlDownload {
    /// Rename the installed binary or directory.
    pub name_override: Option<String>,
    /// Per-OS, per-arch download URLs. At least one entry exists.
    pub urls: BTreeMap<Os, BTreeMap<Arch, String>>,
    /// Extract the whole archive tree instead of a single binary.
    pub archive_release: bool,
}

impl UrlDownload {
    /// The download URL for a platform, if one is configured.
    pub fn url_for(&self, os: Os, arch: Arch) -> Option<&str> {
        self.urls
            .get(&os)
            .and_then(|by_arch| by_arch.get(&arch))
            .map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// Seed
// ---------------------------------------------------------------------------

/// Optional metadata carried by any seed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeedMeta {
    /// Cross-reference name, usable from templates via `HasSeed`.
    pub name: Option<String>,
}

/// The tagged union of seed kinds.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeedKind {
    /// Rendered configuration file.
    ConfigFile(ConfigFile),
    /// GitHub release asset.
    GithubRelease(GithubRelease),
    /// System package install.
    SystemPackage(SystemPackage),
    /// Pinned git checkout.
    GitRepo(GitRepo),
    /// Go toolchain install.
    Golang(Golang),
    /// `go install` of a package.
    GoInstall(GoInstall),
    /// Download from an arbitrary URL.
    UrlDownload(UrlDownload),
}

/// One unit of declarative work, applied to every node carrying a role that
/// lists it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Seed {
    /// Optional metadata.
    pub meta: SeedMeta,
    /// The concrete work item.
    pub kind: SeedKind,
}

impl Seed {
    /// Wrap a kind with empty metadata.
    pub fn new(kind: SeedKind) -> Self {
        Self {
            meta: SeedMeta::default(),
            kind,
        }
    }

    /// Wrap a kind with a cross-reference name.
    pub fn named(name: impl Into<String>, kind: SeedKind) -> Self {
        Self {
            meta: SeedMeta {
                name: Some(name.into()),
            },
            kind,
        }
    }

    /// Whether the inventory must be bypassed for this seed.
    ///
    /// An unpinned `go_install` tracks `@latest`, so there is no stable
    /// content to key idempotence on.
    pub fn skips_inventory(&self) -> bool {
        matches!(
            &self.kind,
            SeedKind::GoInstall(GoInstall { version: None, .. })
        )
    }

    /// Human-readable name used in logs and error attribution.
    ///
    /// `meta.name` wins when present; otherwise each kind derives a name
    /// from its most identifying field.
    pub fn display_name(&self, node: &Node) -> String {
        if let Some(name) = &self.meta.name {
            return name.clone();
        }

        match &self.kind {
            SeedKind::ConfigFile(f) => f.destination.clone(),
            SeedKind::GithubRelease(r) => format!("{}@{}", r.repo, r.tag),
            SeedKind::SystemPackage(p) => match p.for_manager(node.package_manager) {
                Some(spec) => format!("PKG:{}", spec.name),
                None => format!("PKG:<no {} package>", node.package_manager),
            },
            SeedKind::GitRepo(r) => format!("{}@{}", r.url, r.reference.value()),
            SeedKind::Golang(g) => format!("go@{}", g.version),
            SeedKind::GoInstall(g) => format!(
                "{}@{}",
                g.package,
                g.version.as_deref().unwrap_or("latest")
            ),
            SeedKind::UrlDownload(u) => match u.url_for(node.os, node.arch) {
                Some(url) => url.to_string(),
                None => format!("URL:<no {}/{} url>", node.os, node.arch),
            },
        }
    }

    /// Content-derived fingerprint used for idempotence.
    ///
    /// MD5 over a kind-tagged concatenation of the seed's semantic fields.
    /// Node-independent except for `system_package` (the node's manager
    /// selects the package) and `url_download` (the resolved URL).
    /// Metadata never participates, so equal seeds listed by multiple roles
    /// fingerprint identically.
    pub fn fingerprint(&self, node: &Node) -> Result<String, SeedError> {
        let mut parts: Vec<String> = Vec::new();

        match &self.kind {
            SeedKind::ConfigFile(f) => {
                parts.push("ConfigFile".into());
                parts.push(f.template_content.clone());
                parts.push(f.destination.clone());
            }
            SeedKind::GithubRelease(r) => {
                parts.push("GithubRelease".into());
                parts.push(r.repo.clone());
                parts.push(r.tag.clone());
            }
            SeedKind::SystemPackage(p) => {
                let spec = p.for_manager(node.package_manager).ok_or_else(|| {
                    SeedError::NoPackageForManager {
                        manager: node.package_manager,
                        node: node.id.clone(),
                    }
                })?;
                parts.push("SystemPackage".into());
                parts.push(node.package_manager.as_str().to_uppercase());
                parts.push(spec.name.clone());
            }
            SeedKind::GitRepo(r) => {
                parts.push("GitRepo".into());
                parts.push(r.url.clone());
                parts.push(r.location.clone());
                parts.push(r.reference.value().to_string());
            }
            SeedKind::Golang(g) => {
                parts.push("Golang".into());
                parts.push(g.version.clone());
            }
            SeedKind::GoInstall(g) => {
                parts.push("GoInstall".into());
                parts.push(g.package.clone());
                if let Some(version) = &g.version {
                    parts.push(version.clone());
                }
            }
            SeedKind::UrlDownload(u) => {
                let url = u
                    .url_for(node.os, node.arch)
                    .ok_or(SeedError::NoUrlForPlatform {
                        os: node.os,
                        arch: node.arch,
                    })?;
                parts.push("UrlDownload".into());
                parts.push(url.to_string());
            }
        }

        Ok(format!("{:x}", md5::compute(parts.concat())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(manager: PackageManager) -> Node {
        Node {
            id: "test-node".into(),
            hostname: "test-node.local".into(),
            public_key: "not-a-key".into(),
            roles: vec![],
            user_home: "/home/me".into(),
            bin_dir: "/home/me/bin".into(),
            os: Os::Linux,
            arch: Arch::Amd64,
            package_manager: manager,
        }
    }

    fn config_file(destination: &str) -> Seed {
        Seed::new(SeedKind::ConfigFile(ConfigFile {
            template_content: "content".into(),
            destination: destination.into(),
            mode: None,
        }))
    }

    // --- fingerprints ---

    #[test]
    fn fingerprint_is_deterministic() {
        let n = node(PackageManager::Apt);
        let seed = config_file("~/.bashrc");
        assert_eq!(
            seed.fingerprint(&n).unwrap(),
            seed.fingerprint(&n).unwrap()
        );
    }

    #[test]
    fn fingerprint_ignores_metadata() {
        let n = node(PackageManager::Apt);
        let anonymous = config_file("~/.bashrc");
        let named = Seed::named(
            "bashrc",
            SeedKind::ConfigFile(ConfigFile {
                template_content: "content".into(),
                destination: "~/.bashrc".into(),
                mode: None,
            }),
        );
        assert_eq!(
            anonymous.fingerprint(&n).unwrap(),
            named.fingerprint(&n).unwrap()
        );
    }

    #[test]
    fn config_file_fingerprint_ignores_mode() {
        // Content and destination identify the seed; a mode-only edit must
        // not look like new work.
        let n = node(PackageManager::Apt);
        let plain = config_file("~/.bashrc");
        let moded = Seed::new(SeedKind::ConfigFile(ConfigFile {
            template_content: "content".into(),
            destination: "~/.bashrc".into(),
            mode: Some(0o600),
        }));
        assert_eq!(
            plain.fingerprint(&n).unwrap(),
            moded.fingerprint(&n).unwrap()
        );
    }

    #[test]
    fn fingerprint_distinguishes_kinds_with_equal_fields() {
        let n = node(PackageManager::Apt);
        let golang = Seed::new(SeedKind::Golang(Golang {
            version: "1.23.4".into(),
        }));
        let install = Seed::new(SeedKind::GoInstall(GoInstall {
            package: "1.23.4".into(),
            version: None,
        }));
        assert_ne!(
            golang.fingerprint(&n).unwrap(),
            install.fingerprint(&n).unwrap()
        );
    }

    #[test]
    fn fingerprint_node_independent_for_config_file() {
        let apt = node(PackageManager::Apt);
        let brew = node(PackageManager::Brew);
        let seed = config_file("~/.bashrc");
        assert_eq!(
            seed.fingerprint(&apt).unwrap(),
            seed.fingerprint(&brew).unwrap()
        );
    }

    #[test]
    fn system_package_fingerprint_follows_manager() {
        let seed = Seed::new(SeedKind::SystemPackage(SystemPackage {
            apt: Some(PackageSpec { name: "ripgrep".into() }),
            brew: Some(PackageSpec { name: "rg".into() }),
            pacman: None,
        }));
        let apt = node(PackageManager::Apt);
        let brew = node(PackageManager::Brew);
        assert_ne!(
            seed.fingerprint(&apt).unwrap(),
            seed.fingerprint(&brew).unwrap()
        );
    }

    #[test]
    fn system_package_fingerprint_errors_without_manager_entry() {
        let seed = Seed::new(SeedKind::SystemPackage(SystemPackage {
            apt: Some(PackageSpec { name: "ripgrep".into() }),
            ..SystemPackage::default()
        }));
        let err = seed.fingerprint(&node(PackageManager::Pacman)).unwrap_err();
        assert!(matches!(err, SeedError::NoPackageForManager { .. }));
    }

    #[test]
    fn url_download_fingerprint_follows_resolved_url() {
        let mut urls = BTreeMap::new();
        urls.insert(Os::Linux, {
            let mut by_arch = BTreeMap::new();
            by_arch.insert(Arch::Amd64, "https://example.com/a-linux".to_string());
            by_arch.insert(Arch::Arm64, "https://example.com/a-arm".to_string());
            by_arch
        });
        let seed = Seed::new(SeedKind::UrlDownload(UrlDownload {
            name_override: None,
            urls,
            archive_release: false,
        }));

        let amd = node(PackageManager::Apt);
        let mut arm = node(PackageManager::Apt);
        arm.arch = Arch::Arm64;

        assert_ne!(
            seed.fingerprint(&amd).unwrap(),
            seed.fingerprint(&arm).unwrap()
        );

        let mut darwin = node(PackageManager::Brew);
        darwin.os = Os::Darwin;
        assert!(matches!(
            seed.fingerprint(&darwin).unwrap_err(),
            SeedError::NoUrlForPlatform { .. }
        ));
    }

    #[test]
    fn pinned_and_unpinned_go_install_fingerprint_differently() {
        let n = node(PackageManager::Apt);
        let pinned = Seed::new(SeedKind::GoInstall(GoInstall {
            package: "github.com/foo/bar".into(),
            version: Some("v1.2.3".into()),
        }));
        let latest = Seed::new(SeedKind::GoInstall(GoInstall {
            package: "github.com/foo/bar".into(),
            version: None,
        }));
        assert_ne!(
            pinned.fingerprint(&n).unwrap(),
            latest.fingerprint(&n).unwrap()
        );
    }

    // --- skip-inventory advertisement ---

    #[test]
    fn only_unpinned_go_install_skips_inventory() {
        let latest = Seed::new(SeedKind::GoInstall(GoInstall {
            package: "github.com/foo/bar".into(),
            version: None,
        }));
        let pinned = Seed::new(SeedKind::GoInstall(GoInstall {
            package: "github.com/foo/bar".into(),
            version: Some("v1.2.3".into()),
        }));
        assert!(latest.skips_inventory());
        assert!(!pinned.skips_inventory());
        assert!(!config_file("~/.bashrc").skips_inventory());
    }

    // --- display names ---

    #[test]
    fn display_names_per_kind() {
        let n = node(PackageManager::Apt);

        assert_eq!(config_file("~/.bashrc").display_name(&n), "~/.bashrc");

        let release = Seed::new(SeedKind::GithubRelease(GithubRelease {
            repo: "BurntSushi/ripgrep".into(),
            tag: "14.1.1".into(),
            asset_patterns: BTreeMap::new(),
            name_override: None,
            archive_release: false,
            binary_regex: None,
        }));
        assert_eq!(release.display_name(&n), "BurntSushi/ripgrep@14.1.1");

        let package = Seed::new(SeedKind::SystemPackage(SystemPackage {
            apt: Some(PackageSpec { name: "ripgrep".into() }),
            ..SystemPackage::default()
        }));
        assert_eq!(package.display_name(&n), "PKG:ripgrep");

        let repo = Seed::new(SeedKind::GitRepo(GitRepo {
            url: "https://github.com/foo/dotfiles.git".into(),
            location: "~/dotfiles".into(),
            reference: GitRef::Tag("v2".into()),
        }));
        assert_eq!(
            repo.display_name(&n),
            "https://github.com/foo/dotfiles.git@v2"
        );

        let go = Seed::new(SeedKind::Golang(Golang { version: "1.23.4".into() }));
        assert_eq!(go.display_name(&n), "go@1.23.4");

        let install = Seed::new(SeedKind::GoInstall(GoInstall {
            package: "github.com/foo/bar".into(),
            version: None,
        }));
        assert_eq!(install.display_name(&n), "github.com/foo/bar@latest");
    }

    #[test]
    fn metadata_name_overrides_display_name() {
        let n = node(PackageManager::Apt);
        let seed = Seed::named(
            "my-bashrc",
            SeedKind::ConfigFile(ConfigFile {
                template_content: "content".into(),
                destination: "~/.bashrc".into(),
                mode: None,
            }),
        );
        assert_eq!(seed.display_name(&n), "my-bashrc");
    }
}
