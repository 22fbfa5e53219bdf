// SPDX-License-Identifier: MIT OR Apache-2.0
//! Per-kind seed handlers.
//!
//! Every handler returns the inventory row to record on success (hash
//! filled in by the caller), or `None` when there is nothing to record.

use crate::exec::{CommandRunner, run_checked, run_shell};
use anyhow::{Context, Result, bail};
use plantr_download::DownloadRequest;
use plantr_inventory::InventoryRow;
use plantr_proto as proto;
use std::fs;
use std::io;
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::path::Path;
use tracing::info;

const GO_ROOT: &str = "/usr/local/go";

/// Write a rendered configuration file into place.
pub(crate) fn config_file(file: &proto::ConfigFile) -> Result<Option<InventoryRow>> {
    let destination = Path::new(&file.destination);
    if let Some(parent) = destination.parent() {
        let mut builder = fs::DirBuilder::new();
        builder.recursive(true).mode(0o755);
        builder
            .create(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }

    fs::write(destination, &file.content)
        .with_context(|| format!("writing {}", destination.display()))?;
    fs::set_permissions(
        destination,
        fs::Permissions::from_mode(file.mode.unwrap_or(0o644)),
    )
    .context("setting file mode")?;

    Ok(Some(InventoryRow {
        path: Some(file.destination.clone()),
        ..InventoryRow::default()
    }))
}

/// Install a downloaded binary or tree (github_release and url_download).
pub(crate) fn download(
    client: &reqwest::blocking::Client,
    spec: &proto::Download,
) -> Result<Option<InventoryRow>> {
    let path = plantr_download::download_from_url(&DownloadRequest {
        client,
        url: &spec.download_url,
        destination_dir: Path::new(&spec.destination_directory),
        preserve_archive: spec.archive_release,
        name_override: spec.name_override.as_deref(),
        binary_regex: spec.binary_regex.as_deref(),
        auth_header: spec.auth_header.as_deref(),
    })?;

    Ok(Some(InventoryRow {
        path: Some(path.display().to_string()),
        ..InventoryRow::default()
    }))
}

/// Install a system package with the node's manager.
pub(crate) fn system_package(
    runner: &dyn CommandRunner,
    package: &proto::SystemPackage,
) -> Result<Option<InventoryRow>> {
    match package {
        proto::SystemPackage::Apt { name } => {
            run_shell(
                runner,
                &format!("sudo DEBIAN_FRONTEND=noninteractive apt install -y {name}"),
            )
            .context("installing apt package")?;
        }
        proto::SystemPackage::Brew { name } => {
            run_checked(runner, "brew", &["install", name]).context("installing brew package")?;
        }
        proto::SystemPackage::Pacman { name } => {
            run_shell(runner, &format!("sudo pacman -S --noconfirm {name}"))
                .context("installing pacman package")?;
        }
    }

    Ok(Some(InventoryRow {
        package: Some(package.name().to_string()),
        ..InventoryRow::default()
    }))
}

/// Install the Go toolchain at `/usr/local/go`.
///
/// The tarball is downloaded and extracted into a staging directory first;
/// the old toolchain is only deleted once extraction has succeeded, so a
/// failed download cannot leave the node without Go.
pub(crate) fn golang(
    runner: &dyn CommandRunner,
    client: &reqwest::blocking::Client,
    golang: &proto::Golang,
) -> Result<Option<InventoryRow>> {
    if !cfg!(target_os = "linux") {
        bail!("golang seeds are only supported on linux");
    }
    let arch = match std::env::consts::ARCH {
        "x86_64" => "amd64",
        "aarch64" => "arm64",
        other => bail!("unsupported architecture '{other}'"),
    };

    let tarball_name = format!("go{}.linux-{arch}.tar.gz", golang.version);
    let url = format!("https://go.dev/dl/{tarball_name}");
    info!(%url, "downloading go toolchain");

    let staging = tempfile::Builder::new().prefix("plantr-golang").tempdir()?;
    let tarball = staging.path().join(&tarball_name);
    let mut response = client
        .get(&url)
        .send()
        .and_then(|resp| resp.error_for_status())
        .context("downloading go tarball")?;
    let mut file = fs::File::create(&tarball)?;
    io::copy(&mut response, &mut file)?;
    drop(file);

    let staging_dir = staging.path().to_string_lossy().into_owned();
    let tarball_path = tarball.to_string_lossy().into_owned();

    // Extract into staging, then swap the real install.
    run_checked(runner, "sudo", &["tar", "-C", &staging_dir, "-xzf", &tarball_path])
        .context("extracting go tarball")?;
    run_checked(runner, "sudo", &["rm", "-rf", GO_ROOT]).context("removing old toolchain")?;
    let staged_go = format!("{staging_dir}/go");
    run_checked(runner, "sudo", &["mv", &staged_go, GO_ROOT]).context("installing toolchain")?;

    Ok(Some(InventoryRow {
        path: Some(GO_ROOT.to_string()),
        ..InventoryRow::default()
    }))
}

/// `go install` a package.
pub(crate) fn go_install(
    runner: &dyn CommandRunner,
    install: &proto::GoInstall,
) -> Result<Option<InventoryRow>> {
    let go = runner
        .look_path("go")
        .context("locating go on PATH")?;
    let go = go.to_string_lossy().into_owned();

    let spec = format!(
        "{}@{}",
        install.package,
        install.version.as_deref().unwrap_or("latest")
    );
    run_checked(runner, &go, &["install", &spec]).context("running go install")?;

    Ok(Some(InventoryRow {
        package: Some(install.package.clone()),
        ..InventoryRow::default()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_file_writes_content_mode_and_parents() {
        let dir = tempfile::TempDir::new().unwrap();
        let destination = dir.path().join("nested/config/settings.conf");

        let row = config_file(&proto::ConfigFile {
            content: "key = value\n".into(),
            destination: destination.display().to_string(),
            mode: Some(0o600),
        })
        .unwrap()
        .unwrap();

        assert_eq!(row.path.as_deref(), Some(destination.to_str().unwrap()));
        assert_eq!(fs::read_to_string(&destination).unwrap(), "key = value\n");
        let mode = fs::metadata(&destination).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
    }

    #[test]
    fn config_file_defaults_mode_to_644() {
        let dir = tempfile::TempDir::new().unwrap();
        let destination = dir.path().join("plain.conf");

        config_file(&proto::ConfigFile {
            content: "x".into(),
            destination: destination.display().to_string(),
            mode: None,
        })
        .unwrap();

        let mode = fs::metadata(&destination).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o644);
    }
}
