// SPDX-License-Identifier: MIT OR Apache-2.0
//! OS command execution behind a trait, so seed handlers are testable
//! without touching the machine.

use std::io;
use std::path::PathBuf;
use std::process::Command;
use tracing::debug;

/// Captured output of a finished command.
#[derive(Clone, Debug, Default)]
pub struct CommandOutput {
    /// Captured stdout.
    pub stdout: String,
    /// Captured stderr.
    pub stderr: String,
    /// Whether the command exited zero.
    pub success: bool,
}

/// Runs OS commands for seed handlers.
pub trait CommandRunner: Send + Sync {
    /// Run `program` with `args`, capturing output.
    fn run(&self, program: &str, args: &[&str]) -> io::Result<CommandOutput>;

    /// Locate `program` on `PATH`.
    fn look_path(&self, program: &str) -> Option<PathBuf>;
}

/// The real thing.
#[derive(Clone, Copy, Debug, Default)]
pub struct ShellRunner;

impl CommandRunner for ShellRunner {
    fn run(&self, program: &str, args: &[&str]) -> io::Result<CommandOutput> {
        debug!(program, ?args, "executing command");
        let output = Command::new(program).args(args).output()?;
        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            success: output.status.success(),
        })
    }

    fn look_path(&self, program: &str) -> Option<PathBuf> {
        let path = std::env::var_os("PATH")?;
        for dir in std::env::split_paths(&path) {
            let candidate = dir.join(program);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
        None
    }
}

/// Run a full shell line (needed when a command carries env-var prefixes
/// like `DEBIAN_FRONTEND=...`), failing on non-zero exit.
pub(crate) fn run_shell(runner: &dyn CommandRunner, line: &str) -> anyhow::Result<CommandOutput> {
    let output = runner.run("/bin/sh", &["-c", line])?;
    if !output.success {
        anyhow::bail!("command '{line}' failed: {}", output.stderr.trim());
    }
    Ok(output)
}

/// Run a program directly, failing on non-zero exit.
pub(crate) fn run_checked(
    runner: &dyn CommandRunner,
    program: &str,
    args: &[&str],
) -> anyhow::Result<CommandOutput> {
    let output = runner.run(program, args)?;
    if !output.success {
        anyhow::bail!(
            "command '{program} {}' failed: {}",
            args.join(" "),
            output.stderr.trim()
        );
    }
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_runner_captures_output_and_status() {
        let runner = ShellRunner;
        let output = runner.run("/bin/sh", &["-c", "echo out; echo err >&2"]).unwrap();
        assert!(output.success);
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");

        let failed = runner.run("/bin/sh", &["-c", "exit 3"]).unwrap();
        assert!(!failed.success);
    }

    #[test]
    fn look_path_finds_sh() {
        // /bin/sh exists on every target platform.
        assert!(ShellRunner.look_path("sh").is_some());
        assert!(ShellRunner.look_path("definitely-not-a-real-binary").is_none());
    }

    #[test]
    fn run_shell_surfaces_stderr_on_failure() {
        let err = run_shell(&ShellRunner, "echo boom >&2; exit 1").unwrap_err();
        assert!(err.to_string().contains("boom"));
    }
}
