// SPDX-License-Identifier: MIT OR Apache-2.0
//! Loader error type.

use std::path::PathBuf;

/// Everything that can go wrong turning a repository checkout into a
/// [`Config`](crate::Config).
///
/// I/O failures keep their own variants (`Io`, `TemplateRead`) so callers
/// can tell user-input problems from environmental ones.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// The repository root file could not be read.
    #[error("error reading {}: {source}", path.display())]
    Io {
        /// Path that failed to read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The root file is not valid YAML for the expected document shape.
    #[error("error unmarshalling config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A required field is absent or empty.
    #[error("{entity}: {field} is required")]
    MissingField {
        /// What was being parsed, e.g. `node 'vm-1'`.
        entity: String,
        /// The missing field.
        field: &'static str,
    },

    /// A field holds a value outside its enumerated set.
    #[error("{entity}: unknown {field} '{value}'")]
    UnknownValue {
        /// What was being parsed.
        entity: String,
        /// The offending field.
        field: &'static str,
        /// The rejected value.
        value: String,
    },

    /// A node's `public_key_b64` did not decode to a PEM string.
    #[error("node '{node}': error decoding public key: {reason}")]
    PublicKeyDecode {
        /// The node id.
        node: String,
        /// Decode failure detail.
        reason: String,
    },

    /// A `config_file` template could not be read from the checkout.
    #[error("error reading template '{path}': {source}")]
    TemplateRead {
        /// Template path relative to the repository root.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A `config_file` mode is not three octal digits.
    #[error("{entity}: invalid mode '{value}', expected three octal digits")]
    InvalidMode {
        /// What was being parsed.
        entity: String,
        /// The rejected mode string.
        value: String,
    },

    /// A user-supplied pattern failed to compile.
    #[error("{entity}: invalid regex '{pattern}': {source}")]
    InvalidRegex {
        /// What was being parsed.
        entity: String,
        /// The rejected pattern.
        pattern: String,
        /// Compile error.
        #[source]
        source: regex::Error,
    },

    /// A `git_repo` seed must pin exactly one of `tag` or `commit`.
    #[error("{entity}: exactly one of tag or commit is required")]
    GitRepoRef {
        /// What was being parsed.
        entity: String,
    },

    /// A `system_package` seed names no package under any manager.
    #[error("{entity}: at least one of apt, brew, or pacman is required")]
    EmptyPackage {
        /// What was being parsed.
        entity: String,
    },

    /// A `url_download` seed has no URLs at all.
    #[error("{entity}: at least one download URL is required")]
    NoUrls {
        /// What was being parsed.
        entity: String,
    },

    /// A `role_group` references a role that does not exist.
    #[error("role '{referenced_by}' references unknown role '{role}'")]
    UnknownRole {
        /// The missing role.
        role: String,
        /// The role containing the reference.
        referenced_by: String,
    },

    /// Role groups form a reference cycle.
    #[error("role group cycle detected: {chain}")]
    RoleCycle {
        /// The cycle, e.g. `a -> b -> a`.
        chain: String,
    },
}
