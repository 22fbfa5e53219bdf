// SPDX-License-Identifier: MIT OR Apache-2.0
#![doc = include_str!("../README.md")]
#![deny(unsafe_code)]

mod client;
mod error;
mod exec;
mod git_repo;
mod handlers;
mod service;
mod worker;

pub use client::{ClientError, ControllerClient};
pub use error::{SeedFailures, SyncError};
pub use exec::{CommandOutput, CommandRunner, ShellRunner};
pub use service::build_router;
pub use worker::{Agent, AgentConfig};
