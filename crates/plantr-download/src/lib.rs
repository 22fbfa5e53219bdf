// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod archive;

use archive::{ArchiveKind, Entry, walk_archive};
use regex::Regex;
use std::fs;
use std::io::{self, Read};
use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
use std::path::{Path, PathBuf};
use tracing::trace;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors from the download engine.
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    /// The download request itself failed.
    #[error("error executing download request: {0}")]
    Network(#[from] reqwest::Error),

    /// The payload could not be read as the archive its extension claims.
    #[error("error reading archive: {0}")]
    Archive(String),

    /// Single-binary extraction found the wrong number of candidates.
    #[error("expected to find 1 executable file, instead found {found}")]
    AmbiguousBinary {
        /// How many executables matched.
        found: usize,
    },

    /// Local filesystem work failed.
    #[error("filesystem error: {0}")]
    Filesystem(#[from] io::Error),

    /// The user-supplied binary regex failed to compile.
    #[error("error compiling binary regex: {0}")]
    Regex(#[from] regex::Error),
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// One download-and-install operation.
pub struct DownloadRequest<'a> {
    /// Shared HTTP client.
    pub client: &'a reqwest::blocking::Client,
    /// Source URL. The final path segment names the payload.
    pub url: &'a str,
    /// Directory to install into; created if absent.
    pub destination_dir: &'a Path,
    /// Extract the whole archive tree instead of a single binary.
    pub preserve_archive: bool,
    /// Rename the installed binary or directory.
    pub name_override: Option<&'a str>,
    /// Pattern selecting the one executable when extracting a binary.
    pub binary_regex: Option<&'a str>,
    /// `Authorization` header for the request.
    pub auth_header: Option<&'a str>,
}

/// Extensions treated as archives. Everything else installs as a plain
/// binary, `.tar.bz2` included.
const ARCHIVE_EXTENSIONS: &[&str] = &["gz", "tgz", "zip", "xz", "txz"];

/// Execute a download request, returning the final on-disk path.
pub fn download_from_url(req: &DownloadRequest<'_>) -> Result<PathBuf, DownloadError> {
    trace!(url = req.url, "ensuring destination directory");
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true).mode(0o775);
    builder.create(req.destination_dir)?;

    trace!("creating temp directory to land download");
    let tmp_dir = tempfile::Builder::new().prefix("plantr-agent").tempdir()?;

    let filename = basename(req.url);
    let tmp_path = tmp_dir.path().join(&filename);

    trace!("executing request");
    let mut request = req.client.get(req.url);
    if let Some(auth) = req.auth_header {
        request = request.header("authorization", auth);
    }
    let mut response = request.send()?.error_for_status()?;
    let mut file = fs::File::create(&tmp_path)?;
    io::copy(&mut response, &mut file)?;
    drop(file);

    let kind = Path::new(&filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| ARCHIVE_EXTENSIONS.contains(ext))
        .map(ArchiveKind::from_extension);

    match kind {
        Some(kind) if req.preserve_archive => extract_tree(req, kind, &tmp_path, &filename),
        Some(kind) => extract_binary(req, kind, &tmp_path),
        None => install_plain(req, &tmp_path, &filename),
    }
}

/// The payload is already a single binary; install it as-is.
fn install_plain(
    req: &DownloadRequest<'_>,
    tmp_path: &Path,
    filename: &str,
) -> Result<PathBuf, DownloadError> {
    let dest_name = req.name_override.unwrap_or(filename);
    let out_path = req.destination_dir.join(dest_name);

    fs::copy(tmp_path, &out_path)?;
    fs::set_permissions(&out_path, fs::Permissions::from_mode(0o755))?;
    Ok(out_path)
}

/// Recreate the archive's tree under the destination, dropping the
/// redundant top-level directory most release tarballs carry.
fn extract_tree(
    req: &DownloadRequest<'_>,
    kind: ArchiveKind,
    tmp_path: &Path,
    filename: &str,
) -> Result<PathBuf, DownloadError> {
    let archive_name = strip_all_extensions(filename);
    let target_dir = req.name_override.unwrap_or(&archive_name);
    let target_path = req.destination_dir.join(target_dir);

    let mut builder = fs::DirBuilder::new();
    builder.recursive(true).mode(0o775);
    builder.create(&target_path)?;

    let prefix = format!("{archive_name}/");
    walk_archive(kind, tmp_path, &mut |entry: &Entry, reader: &mut dyn Read| {
        let inner = entry.name.strip_prefix(&prefix).unwrap_or(&entry.name);
        // The top-level directory itself.
        if inner.is_empty() {
            return Ok(());
        }

        let dst = target_path.join(inner);
        if entry.is_dir {
            let mut builder = fs::DirBuilder::new();
            builder.recursive(true).mode(entry.mode_or(0o755));
            builder.create(&dst)?;
            return Ok(());
        }

        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = fs::File::create(&dst)?;
        io::copy(reader, &mut out)?;
        fs::set_permissions(&dst, fs::Permissions::from_mode(entry.mode_or(0o644)))?;
        Ok(())
    })?;

    Ok(target_path)
}

/// Pull exactly one owner-executable file out of the archive.
fn extract_binary(
    req: &DownloadRequest<'_>,
    kind: ArchiveKind,
    tmp_path: &Path,
) -> Result<PathBuf, DownloadError> {
    let pattern = req.binary_regex.map(Regex::new).transpose()?;

    let mut executables: Vec<(String, Vec<u8>)> = Vec::new();
    walk_archive(kind, tmp_path, &mut |entry: &Entry, reader: &mut dyn Read| {
        if entry.is_dir || !entry.is_file {
            return Ok(());
        }
        if entry.mode & 0o100 == 0 {
            return Ok(());
        }
        if let Some(pattern) = &pattern {
            if !pattern.is_match(&entry.name) {
                return Ok(());
            }
        }

        let mut content = Vec::new();
        reader.read_to_end(&mut content)?;
        executables.push((entry.name.clone(), content));
        Ok(())
    })?;

    if executables.len() != 1 {
        return Err(DownloadError::AmbiguousBinary {
            found: executables.len(),
        });
    }
    let (name, content) = executables.remove(0);

    let dest_name = match req.name_override {
        Some(name) => name.to_string(),
        None => basename(&name),
    };
    let out_path = req.destination_dir.join(dest_name);

    fs::write(&out_path, content)?;
    fs::set_permissions(&out_path, fs::Permissions::from_mode(0o755))?;
    Ok(out_path)
}

/// The final path segment of a URL or archive member name.
fn basename(path: &str) -> String {
    path.rsplit('/').next().unwrap_or(path).to_string()
}

/// Repeatedly strip extensions: `nvim-linux64.tar.gz` -> `nvim-linux64`.
fn strip_all_extensions(name: &str) -> String {
    let mut base = name;
    loop {
        match Path::new(base).file_stem().and_then(|stem| stem.to_str()) {
            Some(stem) if stem != base => base = stem,
            _ => break,
        }
    }
    base.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::io::Write as _;
    use std::thread;

    /// Serve `body` for a single request, returning the URL under `filename`.
    fn serve(filename: &str, body: Vec<u8>) -> String {
        let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
        let url = format!("http://{}/{filename}", server.server_addr());
        thread::spawn(move || {
            if let Ok(request) = server.recv() {
                let _ = request.respond(tiny_http::Response::from_data(body));
            }
        });
        url
    }

    struct TarEntry {
        name: &'static str,
        content: &'static [u8],
        mode: u32,
        dir: bool,
    }

    fn tar_gz(entries: &[TarEntry]) -> Vec<u8> {
        let encoder = GzEncoder::new(Vec::new(), Compression::default());
        let mut builder = tar::Builder::new(encoder);
        for entry in entries {
            let mut header = tar::Header::new_gnu();
            if entry.dir {
                header.set_entry_type(tar::EntryType::Directory);
                header.set_size(0);
            } else {
                header.set_entry_type(tar::EntryType::Regular);
                header.set_size(entry.content.len() as u64);
            }
            header.set_mode(entry.mode);
            header.set_cksum();
            builder
                .append_data(&mut header, entry.name, entry.content)
                .unwrap();
        }
        builder.into_inner().unwrap().finish().unwrap()
    }

    fn request<'a>(
        client: &'a reqwest::blocking::Client,
        url: &'a str,
        dest: &'a Path,
    ) -> DownloadRequest<'a> {
        DownloadRequest {
            client,
            url,
            destination_dir: dest,
            preserve_archive: false,
            name_override: None,
            binary_regex: None,
            auth_header: None,
        }
    }

    fn is_executable(path: &Path) -> bool {
        fs::metadata(path).unwrap().permissions().mode() & 0o100 != 0
    }

    #[test]
    fn plain_binary_installs_with_exec_bit() {
        let client = reqwest::blocking::Client::new();
        let dest = tempfile::TempDir::new().unwrap();
        let url = serve("somebin", b"#!/bin/sh\necho hi\n".to_vec());

        let path = download_from_url(&request(&client, &url, dest.path())).unwrap();

        assert_eq!(path, dest.path().join("somebin"));
        assert!(is_executable(&path));
    }

    #[test]
    fn plain_binary_honors_name_override() {
        let client = reqwest::blocking::Client::new();
        let dest = tempfile::TempDir::new().unwrap();
        let url = serve("somebin-v1.2.3-linux", b"bits".to_vec());

        let mut req = request(&client, &url, dest.path());
        req.name_override = Some("somebin");
        let path = download_from_url(&req).unwrap();

        assert_eq!(path, dest.path().join("somebin"));
    }

    #[test]
    fn single_executable_is_pulled_from_archive() {
        let archive = tar_gz(&[
            TarEntry {
                name: "bat-v0.24.0-x86_64-unknown-linux-gnu/",
                content: b"",
                mode: 0o755,
                dir: true,
            },
            TarEntry {
                name: "bat-v0.24.0-x86_64-unknown-linux-gnu/README.md",
                content: b"docs",
                mode: 0o644,
                dir: false,
            },
            TarEntry {
                name: "bat-v0.24.0-x86_64-unknown-linux-gnu/bat",
                content: b"\x7fELF-bat",
                mode: 0o755,
                dir: false,
            },
        ]);
        let client = reqwest::blocking::Client::new();
        let dest = tempfile::TempDir::new().unwrap();
        let url = serve("bat.tar.gz", archive);

        let path = download_from_url(&request(&client, &url, dest.path())).unwrap();

        assert_eq!(path, dest.path().join("bat"));
        assert!(is_executable(&path));
        assert_eq!(fs::read(&path).unwrap(), b"\x7fELF-bat");
    }

    #[test]
    fn multiple_executables_without_regex_is_ambiguous() {
        let archive = tar_gz(&[
            TarEntry { name: "pkg/a", content: b"a", mode: 0o755, dir: false },
            TarEntry { name: "pkg/b", content: b"b", mode: 0o755, dir: false },
        ]);
        let client = reqwest::blocking::Client::new();
        let dest = tempfile::TempDir::new().unwrap();
        let url = serve("pkg.tar.gz", archive);

        let err = download_from_url(&request(&client, &url, dest.path())).unwrap_err();
        assert!(matches!(err, DownloadError::AmbiguousBinary { found: 2 }));
    }

    #[test]
    fn zero_executables_is_ambiguous_too() {
        let archive = tar_gz(&[TarEntry {
            name: "pkg/README.md",
            content: b"docs",
            mode: 0o644,
            dir: false,
        }]);
        let client = reqwest::blocking::Client::new();
        let dest = tempfile::TempDir::new().unwrap();
        let url = serve("pkg.tar.gz", archive);

        let err = download_from_url(&request(&client, &url, dest.path())).unwrap_err();
        assert!(matches!(err, DownloadError::AmbiguousBinary { found: 0 }));
    }

    #[test]
    fn binary_regex_disambiguates() {
        let archive = tar_gz(&[
            TarEntry { name: "pkg/helper.sh", content: b"#!/bin/sh", mode: 0o755, dir: false },
            TarEntry { name: "pkg/tool", content: b"the tool", mode: 0o755, dir: false },
        ]);
        let client = reqwest::blocking::Client::new();
        let dest = tempfile::TempDir::new().unwrap();
        let url = serve("pkg.tar.gz", archive);

        let mut req = request(&client, &url, dest.path());
        req.binary_regex = Some("tool$");
        let path = download_from_url(&req).unwrap();

        assert_eq!(path, dest.path().join("tool"));
    }

    #[test]
    fn preserve_archive_rebuilds_tree_without_top_dir() {
        let archive = tar_gz(&[
            TarEntry { name: "nvim-linux64/", content: b"", mode: 0o755, dir: true },
            TarEntry { name: "nvim-linux64/bin/", content: b"", mode: 0o755, dir: true },
            TarEntry {
                name: "nvim-linux64/bin/nvim",
                content: b"\x7fELF-nvim",
                mode: 0o755,
                dir: false,
            },
            TarEntry {
                name: "nvim-linux64/share/nvim/runtime/doc.txt",
                content: b"help",
                mode: 0o644,
                dir: false,
            },
        ]);
        let client = reqwest::blocking::Client::new();
        let dest = tempfile::TempDir::new().unwrap();
        let url = serve("nvim-linux64.tar.gz", archive);

        let mut req = request(&client, &url, dest.path());
        req.preserve_archive = true;
        req.name_override = Some("neovim");
        let path = download_from_url(&req).unwrap();

        assert_eq!(path, dest.path().join("neovim"));
        assert!(path.is_dir());
        assert!(path.join("bin/nvim").is_file());
        assert!(is_executable(&path.join("bin/nvim")));
        assert!(path.join("share/nvim/runtime/doc.txt").is_file());
    }

    #[test]
    fn zip_single_binary_extraction() {
        let mut buffer = Vec::new();
        {
            let mut writer = zip::ZipWriter::new(std::io::Cursor::new(&mut buffer));
            let exec = zip::write::SimpleFileOptions::default().unix_permissions(0o755);
            let plain = zip::write::SimpleFileOptions::default().unix_permissions(0o644);
            writer.start_file("tool/tool", exec).unwrap();
            writer.write_all(b"zip tool").unwrap();
            writer.start_file("tool/README", plain).unwrap();
            writer.write_all(b"docs").unwrap();
            writer.finish().unwrap();
        }
        let client = reqwest::blocking::Client::new();
        let dest = tempfile::TempDir::new().unwrap();
        let url = serve("tool.zip", buffer);

        let path = download_from_url(&request(&client, &url, dest.path())).unwrap();

        assert_eq!(path, dest.path().join("tool"));
        assert_eq!(fs::read(&path).unwrap(), b"zip tool");
    }

    #[test]
    fn failed_request_is_a_network_error() {
        let server = tiny_http::Server::http("127.0.0.1:0").unwrap();
        let url = format!("http://{}/gone", server.server_addr());
        thread::spawn(move || {
            if let Ok(request) = server.recv() {
                let _ = request.respond(tiny_http::Response::empty(404));
            }
        });

        let client = reqwest::blocking::Client::new();
        let dest = tempfile::TempDir::new().unwrap();
        let err = download_from_url(&request(&client, &url, dest.path())).unwrap_err();
        assert!(matches!(err, DownloadError::Network(_)));
    }

    #[test]
    fn strip_all_extensions_handles_double_extensions() {
        assert_eq!(strip_all_extensions("nvim-linux64.tar.gz"), "nvim-linux64");
        assert_eq!(strip_all_extensions("tool.zip"), "tool");
        assert_eq!(strip_all_extensions("plain"), "plain");
    }
}
