// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use plantr_telemetry::{LogFormat, LogLevel};

#[derive(Parser, Debug)]
#[command(name = "plantr", version, about = "plantr operator CLI")]
struct Cli {
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    /// The CLI defaults to human-readable logs, unlike the daemons.
    #[arg(long, env = "LOG_FORMAT", default_value = "human", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run one sync against the controller, in this process.
    Sync(commands::AgentArgs),
    /// Ask the controller to re-clone its configuration repository.
    ForceRefresh(commands::AgentArgs),
    /// Generate a node keypair as `key` / `key.pub`.
    GenerateKeypair(commands::GenerateKeypairArgs),
    /// Write the agent environment file for this node.
    Init(commands::InitArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    plantr_telemetry::init(cli.log_level, cli.log_format);

    match cli.command {
        Command::Sync(args) => commands::sync(&args),
        Command::ForceRefresh(args) => commands::force_refresh(&args),
        Command::GenerateKeypair(args) => commands::generate_keypair(&args),
        Command::Init(args) => commands::init(&args),
    }
}
