// SPDX-License-Identifier: MIT OR Apache-2.0
//! The `git_repo` seed handler: keep a checkout pinned to a ref.

use anyhow::{Context, Result};
use git2::{Oid, Repository};
use plantr_inventory::InventoryRow;
use plantr_proto as proto;
use std::fs;
use std::os::unix::fs::DirBuilderExt;
use std::path::Path;
use tracing::{debug, info};

/// Clone-or-open the repo at its pinned location, fetch, and make `HEAD`
/// match the requested ref. The worktree is untouched when it already does.
pub(crate) fn execute(spec: &proto::GitRepo) -> Result<Option<InventoryRow>> {
    let location = Path::new(&spec.location);

    let repo = if location.exists() {
        Repository::open(location).context("opening existing repo")?
    } else {
        if let Some(parent) = location.parent() {
            let mut builder = fs::DirBuilder::new();
            builder.recursive(true).mode(0o775);
            builder
                .create(parent)
                .context("creating containing directories")?;
        }
        info!(url = spec.url, location = spec.location, "cloning repo");
        Repository::clone(&spec.url, location).context("cloning repo")?
    };

    fetch_latest(&repo)?;

    let wanted = resolve_ref(&repo, &spec.reference)?;
    let head = repo.head().ok().and_then(|head| head.target());
    if head == Some(wanted) {
        debug!(location = spec.location, "already at desired commit");
        return Ok(Some(row(spec)));
    }

    checkout_commit(&repo, wanted)?;
    Ok(Some(row(spec)))
}

fn row(spec: &proto::GitRepo) -> InventoryRow {
    InventoryRow {
        path: Some(spec.location.clone()),
        ..InventoryRow::default()
    }
}

/// Fetch so tag resolution sees refs created since the clone. Repos
/// without an origin remote (local development) are left as-is.
fn fetch_latest(repo: &Repository) -> Result<()> {
    let mut remote = match repo.find_remote("origin") {
        Ok(remote) => remote,
        Err(_) => return Ok(()),
    };
    remote
        .fetch(&[] as &[&str], None, None)
        .context("fetching latest")?;
    Ok(())
}

/// Translate the pinned ref into a commit id.
fn resolve_ref(repo: &Repository, reference: &proto::GitRef) -> Result<Oid> {
    match reference {
        proto::GitRef::Commit(commit) => Oid::from_str(commit).context("parsing commit hash"),
        proto::GitRef::Tag(tag) => {
            let object = repo
                .revparse_single(tag)
                .with_context(|| format!("resolving tag '{tag}'"))?;
            let commit = object.peel_to_commit().context("peeling tag to commit")?;
            Ok(commit.id())
        }
    }
}

fn checkout_commit(repo: &Repository, oid: Oid) -> Result<()> {
    let commit = repo.find_commit(oid).context("finding desired commit")?;
    let mut checkout = git2::build::CheckoutBuilder::new();
    checkout.force();
    repo.checkout_tree(commit.as_object(), Some(&mut checkout))
        .context("executing checkout")?;
    repo.set_head_detached(oid).context("detaching head")?;
    Ok(())
}
