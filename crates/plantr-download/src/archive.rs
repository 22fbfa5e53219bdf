// SPDX-License-Identifier: MIT OR Apache-2.0
//! Uniform iteration over tar.gz / tar.xz / zip members.

use crate::DownloadError;
use flate2::read::GzDecoder;
use std::fs;
use std::io::Read;
use std::path::Path;
use xz2::read::XzDecoder;

/// Supported archive containers, keyed off the payload extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum ArchiveKind {
    /// Gzip-compressed tarball (`.gz`, `.tgz`).
    TarGz,
    /// Xz-compressed tarball (`.xz`, `.txz`).
    TarXz,
    /// Zip archive.
    Zip,
}

impl ArchiveKind {
    /// Map an already-validated archive extension to its kind.
    pub(crate) fn from_extension(ext: &str) -> Self {
        match ext {
            "zip" => Self::Zip,
            "xz" | "txz" => Self::TarXz,
            _ => Self::TarGz,
        }
    }
}

/// One archive member as seen by the visitor.
pub(crate) struct Entry {
    /// Full name inside the archive.
    pub name: String,
    /// Whether the member is a directory.
    pub is_dir: bool,
    /// Whether the member is a regular file (excludes links and specials).
    pub is_file: bool,
    /// Unix mode bits, zero when the archive carries none.
    pub mode: u32,
}

impl Entry {
    /// The member's mode, or `fallback` when the archive carries none.
    pub(crate) fn mode_or(&self, fallback: u32) -> u32 {
        if self.mode == 0 { fallback } else { self.mode }
    }
}

/// Visit every member of the archive at `path` in order.
pub(crate) fn walk_archive(
    kind: ArchiveKind,
    path: &Path,
    visit: &mut dyn FnMut(&Entry, &mut dyn Read) -> Result<(), DownloadError>,
) -> Result<(), DownloadError> {
    match kind {
        ArchiveKind::TarGz => {
            let file = fs::File::open(path)?;
            walk_tar(tar::Archive::new(GzDecoder::new(file)), visit)
        }
        ArchiveKind::TarXz => {
            let file = fs::File::open(path)?;
            walk_tar(tar::Archive::new(XzDecoder::new(file)), visit)
        }
        ArchiveKind::Zip => walk_zip(path, visit),
    }
}

fn walk_tar<R: Read>(
    mut archive: tar::Archive<R>,
    visit: &mut dyn FnMut(&Entry, &mut dyn Read) -> Result<(), DownloadError>,
) -> Result<(), DownloadError> {
    let entries = archive
        .entries()
        .map_err(|err| DownloadError::Archive(err.to_string()))?;

    for entry in entries {
        let mut entry = entry.map_err(|err| DownloadError::Archive(err.to_string()))?;
        let name = entry
            .path()
            .map_err(|err| DownloadError::Archive(err.to_string()))?
            .to_string_lossy()
            .into_owned();
        let entry_type = entry.header().entry_type();
        let info = Entry {
            name,
            is_dir: entry_type.is_dir(),
            is_file: entry_type.is_file(),
            mode: entry.header().mode().unwrap_or(0),
        };
        visit(&info, &mut entry)?;
    }

    Ok(())
}

fn walk_zip(
    path: &Path,
    visit: &mut dyn FnMut(&Entry, &mut dyn Read) -> Result<(), DownloadError>,
) -> Result<(), DownloadError> {
    let file = fs::File::open(path)?;
    let mut archive =
        zip::ZipArchive::new(file).map_err(|err| DownloadError::Archive(err.to_string()))?;

    for index in 0..archive.len() {
        let mut member = archive
            .by_index(index)
            .map_err(|err| DownloadError::Archive(err.to_string()))?;
        let info = Entry {
            name: member.name().to_string(),
            is_dir: member.is_dir(),
            is_file: member.is_file(),
            mode: member.unix_mode().unwrap_or(0),
        };
        visit(&info, &mut member)?;
    }

    Ok(())
}
