// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod loader;
mod model;
mod seed;

pub use error::ParseError;
pub use loader::load_config;
pub use model::{Arch, Config, Node, Os, PackageManager};
pub use seed::{
    ConfigFile, GitRef, GitRepo, GithubRelease, GoInstall, Golang, PackageSpec, Seed, SeedError,
    SeedKind, SeedMeta, SystemPackage, UrlDownload,
};
