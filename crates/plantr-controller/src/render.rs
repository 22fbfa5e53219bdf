// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-kind seed rendering: typed configuration seeds in, wire seeds out.

use crate::error::ControllerError;
use minijinja::value::Rest;
use minijinja::{Environment, context};
use plantr_core::{
    ConfigFile, GitRef, GitRepo, GoInstall, Golang, Node, PackageManager, SystemPackage,
    UrlDownload,
};
use plantr_core::SeedError;
use plantr_proto as proto;
use plantr_vault::SecretData;
use std::collections::BTreeSet;

/// Render a `config_file` seed: evaluate the template, then expand a
/// leading `~` in the destination.
pub(crate) fn render_config_file(
    file: &ConfigFile,
    node: &Node,
    vault: &SecretData,
    named_seeds: &BTreeSet<String>,
) -> Result<proto::ConfigFile, ControllerError> {
    let content = render_template(&file.template_content, node, vault, named_seeds)?;
    Ok(proto::ConfigFile {
        content,
        destination: expand_home(&file.destination, node),
        mode: file.mode,
    })
}

/// Evaluate a template with the cross-seed helpers bound.
///
/// Templates see `vault` (the secret snapshot) and `vars` (`home`,
/// `bin_dir`), plus three functions: `HasRole(name)`, `NodeIsOneOf(id...)`,
/// and `HasSeed(name)` over the render call's name snapshot.
pub(crate) fn render_template(
    content: &str,
    node: &Node,
    vault: &SecretData,
    named_seeds: &BTreeSet<String>,
) -> Result<String, ControllerError> {
    let mut env = Environment::new();

    let roles = node.roles.clone();
    env.add_function("HasRole", move |name: String| roles.contains(&name));

    let node_id = node.id.clone();
    env.add_function("NodeIsOneOf", move |ids: Rest<String>| {
        ids.iter().any(|id| *id == node_id)
    });

    let named = named_seeds.clone();
    env.add_function("HasSeed", move |name: String| named.contains(&name));

    env.add_template("seed", content)?;
    let template = env.get_template("seed")?;
    let rendered = template.render(context! {
        vault => vault,
        vars => context! {
            home => node.user_home.display().to_string(),
            bin_dir => node.bin_dir.display().to_string(),
        },
    })?;
    Ok(rendered)
}

/// Render a `system_package` seed down to the node's manager.
pub(crate) fn render_system_package(
    package: &SystemPackage,
    node: &Node,
) -> Result<proto::SystemPackage, ControllerError> {
    let spec = package
        .for_manager(node.package_manager)
        .ok_or(SeedError::NoPackageForManager {
            manager: node.package_manager,
            node: node.id.clone(),
        })?;

    let name = spec.name.clone();
    Ok(match node.package_manager {
        PackageManager::Apt => proto::SystemPackage::Apt { name },
        PackageManager::Brew => proto::SystemPackage::Brew { name },
        PackageManager::Pacman => proto::SystemPackage::Pacman { name },
    })
}

/// Render a `git_repo` seed: expand `~` in the checkout location.
pub(crate) fn render_git_repo(repo: &GitRepo, node: &Node) -> proto::GitRepo {
    proto::GitRepo {
        url: repo.url.clone(),
        location: expand_home(&repo.location, node),
        reference: match &repo.reference {
            GitRef::Tag(tag) => proto::GitRef::Tag(tag.clone()),
            GitRef::Commit(commit) => proto::GitRef::Commit(commit.clone()),
        },
    }
}

/// Render a `golang` seed (pass-through).
pub(crate) fn render_golang(golang: &Golang) -> proto::Golang {
    proto::Golang {
        version: golang.version.clone(),
    }
}

/// Render a `go_install` seed (pass-through).
pub(crate) fn render_go_install(install: &GoInstall) -> proto::GoInstall {
    proto::GoInstall {
        package: install.package.clone(),
        version: install.version.clone(),
    }
}

/// Render a `url_download` seed: pick the node's platform URL.
pub(crate) fn render_url_download(
    download: &UrlDownload,
    node: &Node,
) -> Result<proto::Download, ControllerError> {
    let url = download
        .url_for(node.os, node.arch)
        .ok_or(SeedError::NoUrlForPlatform {
            os: node.os,
            arch: node.arch,
        })?;

    Ok(proto::Download {
        download_url: url.to_string(),
        destination_directory: node.bin_dir.display().to_string(),
        name_override: download.name_override.clone(),
        archive_release: download.archive_release,
        binary_regex: None,
        auth_header: None,
    })
}

/// Replace a leading `~` with the node's home directory.
pub(crate) fn expand_home(path: &str, node: &Node) -> String {
    match path.strip_prefix('~') {
        Some(rest) => format!("{}{}", node.user_home.display(), rest),
        None => path.to_string(),
    }
}
