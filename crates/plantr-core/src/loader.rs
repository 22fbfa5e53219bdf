// SPDX-License-Identifier: MIT OR Apache-2.0
//! Repository loader: `plantr.yaml` plus referenced templates in, validated
//! [`Config`] out.

use crate::error::ParseError;
use crate::model::{Arch, Config, Node, Os, PackageManager};
use crate::seed::{
    ConfigFile, GitRef, GitRepo, GithubRelease, GoInstall, Golang, PackageSpec, Seed, SeedKind,
    SeedMeta, SystemPackage, UrlDownload,
};
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::str::FromStr;

/// Name of the document at the repository root.
const ROOT_FILE: &str = "plantr.yaml";

// ---------------------------------------------------------------------------
// Raw document model
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default)]
    nodes: Vec<RawNode>,
    #[serde(default)]
    roles: BTreeMap<String, Vec<RawSeed>>,
}

#[derive(Debug, Deserialize)]
struct RawNode {
    #[serde(default)]
    id: String,
    #[serde(default)]
    hostname: String,
    #[serde(default)]
    public_key_b64: String,
    #[serde(default)]
    roles: Vec<String>,
    #[serde(default)]
    user_home: String,
    #[serde(default)]
    bin_dir: Option<String>,
    #[serde(default)]
    os: Option<String>,
    #[serde(default)]
    arch: Option<String>,
    #[serde(default)]
    package_manager: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSeed {
    #[serde(default)]
    name: Option<String>,
    #[serde(flatten)]
    element: RawElement,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum RawElement {
    ConfigFile(RawConfigFile),
    GithubRelease(RawGithubRelease),
    SystemPackage(RawSystemPackage),
    GitRepo(RawGitRepo),
    Golang(RawGolang),
    GoInstall(RawGoInstall),
    UrlDownload(RawUrlDownload),
    RoleGroup(RawRoleGroup),
}

#[derive(Debug, Deserialize)]
struct RawConfigFile {
    #[serde(default)]
    path: String,
    #[serde(default)]
    destination: String,
    #[serde(default)]
    mode: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawGithubRelease {
    #[serde(default)]
    repo: String,
    #[serde(default)]
    tag: String,
    #[serde(default)]
    asset_patterns: BTreeMap<String, BTreeMap<String, String>>,
    #[serde(default)]
    name_override: Option<String>,
    #[serde(default)]
    archive_release: bool,
    #[serde(default)]
    binary_regex: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPackage {
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct RawSystemPackage {
    #[serde(default)]
    apt: Option<RawPackage>,
    #[serde(default)]
    brew: Option<RawPackage>,
    #[serde(default)]
    pacman: Option<RawPackage>,
}

#[derive(Debug, Deserialize)]
struct RawGitRepo {
    #[serde(default)]
    url: String,
    #[serde(default)]
    location: String,
    #[serde(default)]
    tag: Option<String>,
    #[serde(default)]
    commit: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawGolang {
    #[serde(default)]
    version: String,
}

#[derive(Debug, Deserialize)]
struct RawGoInstall {
    #[serde(default)]
    package: String,
    #[serde(default)]
    version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawUrlDownload {
    #[serde(default)]
    name_override: Option<String>,
    #[serde(default)]
    urls: BTreeMap<String, BTreeMap<String, String>>,
    #[serde(default)]
    archive_release: bool,
}

#[derive(Debug, Deserialize)]
struct RawRoleGroup {
    #[serde(default)]
    roles: Vec<String>,
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// One parsed role entry before group expansion.
enum Entry {
    Seed(Seed),
    Group(Vec<String>),
}

/// Parse the repository checkout rooted at `root` into a [`Config`].
///
/// Role groups are expanded here, so every role in the result is a flat,
/// ordered seed list. Reference cycles and dangling role references are
/// rejected.
pub fn load_config(root: &Path) -> Result<Config, ParseError> {
    let path = root.join(ROOT_FILE);
    let text = fs::read_to_string(&path).map_err(|source| ParseError::Io {
        path: path.clone(),
        source,
    })?;
    let doc: RawConfig = serde_yaml::from_str(&text)?;

    let mut nodes = Vec::with_capacity(doc.nodes.len());
    for (index, raw) in doc.nodes.iter().enumerate() {
        nodes.push(parse_node(index, raw)?);
    }

    let mut parsed: BTreeMap<String, Vec<Entry>> = BTreeMap::new();
    for (role, seeds) in &doc.roles {
        let mut entries = Vec::with_capacity(seeds.len());
        for (index, seed) in seeds.iter().enumerate() {
            let entity = format!("role '{role}' seed {index}");
            entries.push(parse_seed(root, &entity, seed)?);
        }
        parsed.insert(role.clone(), entries);
    }

    let mut roles = BTreeMap::new();
    for role in parsed.keys() {
        let seeds = expand_role(role, &parsed, &mut BTreeMap::new(), &mut Vec::new())?;
        roles.insert(role.clone(), seeds);
    }

    Ok(Config { roles, nodes })
}

fn parse_node(index: usize, raw: &RawNode) -> Result<Node, ParseError> {
    let entity = if raw.id.is_empty() {
        format!("node {index}")
    } else {
        format!("node '{}'", raw.id)
    };

    if raw.id.is_empty() {
        return Err(ParseError::MissingField { entity, field: "id" });
    }
    if raw.public_key_b64.is_empty() {
        return Err(ParseError::MissingField {
            entity,
            field: "public_key_b64",
        });
    }
    if raw.user_home.is_empty() {
        return Err(ParseError::MissingField {
            entity,
            field: "user_home",
        });
    }

    let os = parse_enum::<Os>(&entity, "os", raw.os.as_deref())?;
    let arch = parse_enum::<Arch>(&entity, "arch", raw.arch.as_deref())?;
    let package_manager =
        parse_enum::<PackageManager>(&entity, "package_manager", raw.package_manager.as_deref())?;

    let key_bytes = {
        use base64::Engine as _;
        base64::engine::general_purpose::STANDARD
            .decode(&raw.public_key_b64)
            .map_err(|err| ParseError::PublicKeyDecode {
                node: raw.id.clone(),
                reason: err.to_string(),
            })?
    };
    let public_key = String::from_utf8(key_bytes).map_err(|err| ParseError::PublicKeyDecode {
        node: raw.id.clone(),
        reason: err.to_string(),
    })?;

    let user_home = std::path::PathBuf::from(&raw.user_home);
    let bin_dir = match &raw.bin_dir {
        Some(dir) => dir.into(),
        None => user_home.join("bin"),
    };

    Ok(Node {
        id: raw.id.clone(),
        hostname: raw.hostname.clone(),
        public_key,
        roles: raw.roles.clone(),
        user_home,
        bin_dir,
        os,
        arch,
        package_manager,
    })
}

fn parse_enum<T: FromStr>(
    entity: &str,
    field: &'static str,
    value: Option<&str>,
) -> Result<T, ParseError> {
    let value = value.filter(|v| !v.is_empty()).ok_or(ParseError::MissingField {
        entity: entity.to_string(),
        field,
    })?;
    value.parse().map_err(|_| ParseError::UnknownValue {
        entity: entity.to_string(),
        field,
        value: value.to_string(),
    })
}

fn parse_seed(root: &Path, entity: &str, raw: &RawSeed) -> Result<Entry, ParseError> {
    let kind = match &raw.element {
        RawElement::ConfigFile(f) => SeedKind::ConfigFile(parse_config_file(root, entity, f)?),
        RawElement::GithubRelease(r) => SeedKind::GithubRelease(parse_github_release(entity, r)?),
        RawElement::SystemPackage(p) => SeedKind::SystemPackage(parse_system_package(entity, p)?),
        RawElement::GitRepo(r) => SeedKind::GitRepo(parse_git_repo(entity, r)?),
        RawElement::Golang(g) => {
            if g.version.is_empty() {
                return Err(ParseError::MissingField {
                    entity: entity.to_string(),
                    field: "version",
                });
            }
            SeedKind::Golang(Golang {
                version: g.version.clone(),
            })
        }
        RawElement::GoInstall(g) => {
            if g.package.is_empty() {
                return Err(ParseError::MissingField {
                    entity: entity.to_string(),
                    field: "package",
                });
            }
            SeedKind::GoInstall(GoInstall {
                package: g.package.clone(),
                version: g.version.clone(),
            })
        }
        RawElement::UrlDownload(u) => SeedKind::UrlDownload(parse_url_download(entity, u)?),
        RawElement::RoleGroup(g) => return Ok(Entry::Group(g.roles.clone())),
    };

    Ok(Entry::Seed(Seed {
        meta: SeedMeta {
            name: raw.name.clone(),
        },
        kind,
    }))
}

fn parse_config_file(root: &Path, entity: &str, raw: &RawConfigFile) -> Result<ConfigFile, ParseError> {
    if raw.path.is_empty() {
        return Err(ParseError::MissingField {
            entity: entity.to_string(),
            field: "path",
        });
    }
    if raw.destination.is_empty() {
        return Err(ParseError::MissingField {
            entity: entity.to_string(),
            field: "destination",
        });
    }

    let mode = match &raw.mode {
        None => None,
        Some(text) => Some(parse_mode(entity, text)?),
    };

    let template_content =
        fs::read_to_string(root.join(&raw.path)).map_err(|source| ParseError::TemplateRead {
            path: raw.path.clone(),
            source,
        })?;

    Ok(ConfigFile {
        template_content,
        destination: raw.destination.clone(),
        mode,
    })
}

fn parse_mode(entity: &str, text: &str) -> Result<u32, ParseError> {
    let valid = text.len() == 3 && text.chars().all(|c| ('0'..='7').contains(&c));
    if !valid {
        return Err(ParseError::InvalidMode {
            entity: entity.to_string(),
            value: text.to_string(),
        });
    }
    // Cannot fail after the digit check.
    Ok(u32::from_str_radix(text, 8).unwrap_or(0))
}

fn parse_github_release(entity: &str, raw: &RawGithubRelease) -> Result<GithubRelease, ParseError> {
    if raw.repo.is_empty() {
        return Err(ParseError::MissingField {
            entity: entity.to_string(),
            field: "repo",
        });
    }
    if raw.tag.is_empty() {
        return Err(ParseError::MissingField {
            entity: entity.to_string(),
            field: "tag",
        });
    }

    let asset_patterns = parse_platform_map(entity, "asset_patterns", &raw.asset_patterns)?;
    for by_arch in asset_patterns.values() {
        for pattern in by_arch.values() {
            check_regex(entity, pattern)?;
        }
    }
    if let Some(pattern) = &raw.binary_regex {
        check_regex(entity, pattern)?;
    }

    Ok(GithubRelease {
        repo: raw.repo.clone(),
        tag: raw.tag.clone(),
        asset_patterns,
        name_override: raw.name_override.clone(),
        archive_release: raw.archive_release,
        binary_regex: raw.binary_regex.clone(),
    })
}

fn check_regex(entity: &str, pattern: &str) -> Result<(), ParseError> {
    Regex::new(pattern).map_err(|source| ParseError::InvalidRegex {
        entity: entity.to_string(),
        pattern: pattern.to_string(),
        source,
    })?;
    Ok(())
}

fn parse_system_package(entity: &str, raw: &RawSystemPackage) -> Result<SystemPackage, ParseError> {
    let package = SystemPackage {
        apt: raw.apt.as_ref().map(|p| PackageSpec { name: p.name.clone() }),
        brew: raw.brew.as_ref().map(|p| PackageSpec { name: p.name.clone() }),
        pacman: raw.pacman.as_ref().map(|p| PackageSpec { name: p.name.clone() }),
    };
    if package.apt.is_none() && package.brew.is_none() && package.pacman.is_none() {
        return Err(ParseError::EmptyPackage {
            entity: entity.to_string(),
        });
    }
    Ok(package)
}

fn parse_git_repo(entity: &str, raw: &RawGitRepo) -> Result<GitRepo, ParseError> {
    if raw.url.is_empty() {
        return Err(ParseError::MissingField {
            entity: entity.to_string(),
            field: "url",
        });
    }
    if raw.location.is_empty() {
        return Err(ParseError::MissingField {
            entity: entity.to_string(),
            field: "location",
        });
    }

    let reference = match (&raw.tag, &raw.commit) {
        (Some(tag), None) => GitRef::Tag(tag.clone()),
        (None, Some(commit)) => GitRef::Commit(commit.clone()),
        _ => {
            return Err(ParseError::GitRepoRef {
                entity: entity.to_string(),
            });
        }
    };

    Ok(GitRepo {
        url: raw.url.clone(),
        location: raw.location.clone(),
        reference,
    })
}

fn parse_url_download(entity: &str, raw: &RawUrlDownload) -> Result<UrlDownload, ParseError> {
    let urls = parse_platform_map(entity, "urls", &raw.urls)?;
    if urls.values().all(|by_arch| by_arch.is_empty()) {
        return Err(ParseError::NoUrls {
            entity: entity.to_string(),
        });
    }

    Ok(UrlDownload {
        name_override: raw.name_override.clone(),
        urls,
        archive_release: raw.archive_release,
    })
}

fn parse_platform_map(
    entity: &str,
    field: &'static str,
    raw: &BTreeMap<String, BTreeMap<String, String>>,
) -> Result<BTreeMap<Os, BTreeMap<Arch, String>>, ParseError> {
    let mut out = BTreeMap::new();
    for (os_key, by_arch) in raw {
        let os: Os = os_key.parse().map_err(|_| ParseError::UnknownValue {
            entity: entity.to_string(),
            field,
            value: os_key.clone(),
        })?;
        let mut arches = BTreeMap::new();
        for (arch_key, value) in by_arch {
            let arch: Arch = arch_key.parse().map_err(|_| ParseError::UnknownValue {
                entity: entity.to_string(),
                field,
                value: arch_key.clone(),
            })?;
            arches.insert(arch, value.clone());
        }
        out.insert(os, arches);
    }
    Ok(out)
}

fn expand_role(
    role: &str,
    parsed: &BTreeMap<String, Vec<Entry>>,
    done: &mut BTreeMap<String, Vec<Seed>>,
    stack: &mut Vec<String>,
) -> Result<Vec<Seed>, ParseError> {
    if let Some(seeds) = done.get(role) {
        return Ok(seeds.clone());
    }
    if stack.iter().any(|r| r == role) {
        let mut chain = stack.clone();
        chain.push(role.to_string());
        return Err(ParseError::RoleCycle {
            chain: chain.join(" -> "),
        });
    }

    stack.push(role.to_string());
    // Presence is guaranteed by the callers, which only recurse into names
    // they have already checked against `parsed`.
    let entries = parsed.get(role).expect("role presence checked by caller");

    let mut out = Vec::new();
    for entry in entries {
        match entry {
            Entry::Seed(seed) => out.push(seed.clone()),
            Entry::Group(refs) => {
                for sub in refs {
                    if !parsed.contains_key(sub) {
                        return Err(ParseError::UnknownRole {
                            role: sub.clone(),
                            referenced_by: role.to_string(),
                        });
                    }
                    out.extend(expand_role(sub, parsed, done, stack)?);
                }
            }
        }
    }
    stack.pop();

    done.insert(role.to_string(), out.clone());
    Ok(out)
}
