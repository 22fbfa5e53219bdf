// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node and configuration types shared between the controller and tooling.

use crate::seed::Seed;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// Platform enums
// ---------------------------------------------------------------------------

/// Operating systems a node may run.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Os {
    /// Linux.
    Linux,
    /// macOS.
    Darwin,
}

impl Os {
    /// Canonical lowercase name, as used in config files and cache rows.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Linux => "linux",
            Self::Darwin => "darwin",
        }
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Os {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "linux" => Ok(Self::Linux),
            "darwin" => Ok(Self::Darwin),
            other => Err(format!("unknown os '{other}'")),
        }
    }
}

/// CPU architectures a node may run on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Arch {
    /// 64-bit x86.
    Amd64,
    /// 64-bit ARM.
    Arm64,
}

impl Arch {
    /// Canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Amd64 => "amd64",
            Self::Arm64 => "arm64",
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Arch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "amd64" => Ok(Self::Amd64),
            "arm64" => Ok(Self::Arm64),
            other => Err(format!("unknown arch '{other}'")),
        }
    }
}

/// Package managers the agent knows how to drive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageManager {
    /// Debian/Ubuntu apt.
    Apt,
    /// Homebrew.
    Brew,
    /// Arch pacman.
    Pacman,
}

impl PackageManager {
    /// Canonical lowercase name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Apt => "apt",
            Self::Brew => "brew",
            Self::Pacman => "pacman",
        }
    }
}

impl fmt::Display for PackageManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PackageManager {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "apt" => Ok(Self::Apt),
            "brew" => Ok(Self::Brew),
            "pacman" => Ok(Self::Pacman),
            other => Err(format!("unknown package manager '{other}'")),
        }
    }
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// A managed machine. Immutable between configuration reloads.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Stable unique identifier.
    pub id: String,
    /// Advisory hostname.
    pub hostname: String,
    /// PEM-encoded RSA public key used to seal login challenges.
    pub public_key: String,
    /// Role names applied to this node, in application order.
    pub roles: Vec<String>,
    /// Absolute path to the login user's home directory.
    pub user_home: PathBuf,
    /// Directory binaries are installed into. Defaults to `user_home/bin`.
    pub bin_dir: PathBuf,
    /// Operating system.
    pub os: Os,
    /// CPU architecture.
    pub arch: Arch,
    /// Package manager driven by `system_package` seeds.
    pub package_manager: PackageManager,
}

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// The parsed repository configuration.
///
/// Roles hold flat seed lists: `role_group` references are in-lined by the
/// loader, so consumers never see them. Replaced wholesale on refresh, never
/// mutated in place.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Config {
    /// Role name to ordered seed list.
    pub roles: BTreeMap<String, Vec<Seed>>,
    /// All known nodes.
    pub nodes: Vec<Node>,
}

impl Config {
    /// Look up a node by id.
    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn platform_enums_roundtrip_from_str() {
        assert_eq!("linux".parse::<Os>().unwrap(), Os::Linux);
        assert_eq!("darwin".parse::<Os>().unwrap(), Os::Darwin);
        assert_eq!("amd64".parse::<Arch>().unwrap(), Arch::Amd64);
        assert_eq!("arm64".parse::<Arch>().unwrap(), Arch::Arm64);
        assert_eq!("apt".parse::<PackageManager>().unwrap(), PackageManager::Apt);
        assert_eq!("brew".parse::<PackageManager>().unwrap(), PackageManager::Brew);
        assert_eq!(
            "pacman".parse::<PackageManager>().unwrap(),
            PackageManager::Pacman
        );
    }

    #[test]
    fn platform_enums_reject_unknown_values() {
        assert!("windows".parse::<Os>().is_err());
        assert!("i386".parse::<Arch>().is_err());
        assert!("yum".parse::<PackageManager>().is_err());
    }

    #[test]
    fn display_matches_as_str() {
        assert_eq!(Os::Darwin.to_string(), "darwin");
        assert_eq!(Arch::Arm64.to_string(), "arm64");
        assert_eq!(PackageManager::Pacman.to_string(), "pacman");
    }

    #[test]
    fn config_node_lookup() {
        let config = Config {
            roles: BTreeMap::new(),
            nodes: vec![Node {
                id: "vm-1".into(),
                hostname: "vm-1.local".into(),
                public_key: "not-a-key".into(),
                roles: vec![],
                user_home: "/home/me".into(),
                bin_dir: "/home/me/bin".into(),
                os: Os::Linux,
                arch: Arch::Amd64,
                package_manager: PackageManager::Apt,
            }],
        };

        assert!(config.node("vm-1").is_some());
        assert!(config.node("vm-2").is_none());
    }
}
