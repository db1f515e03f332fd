//! Blocking execution of external commands.
//!
//! Every host and runtime invocation goes through a [`CommandRunner`], so
//! tests can script the runtime's answers without spawning processes.

use std::process::Command;

use dockhand_common::error::{DockhandError, Result};

/// Output from a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Standard output from the command.
    pub stdout: String,
    /// Standard error from the command.
    pub stderr: String,
    /// Exit code returned by the command (`-1` when killed by a signal).
    pub exit_code: i32,
}

impl CommandOutput {
    /// Builds a successful output with the given stdout.
    #[must_use]
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: 0,
        }
    }

    /// Builds a failed output with the given status and stderr.
    #[must_use]
    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code,
        }
    }

    /// Returns whether the command exited with status zero.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Runs a program to completion and captures its output.
///
/// Implementations block until the process exits; there is no timeout.
pub trait CommandRunner: Send + Sync {
    /// Runs `program` with `args`.
    ///
    /// A non-zero exit is reported through [`CommandOutput::exit_code`],
    /// not as an error.
    ///
    /// # Errors
    ///
    /// Returns an error only if the process cannot be spawned.
    fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput>;
}

/// Runner that spawns real processes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
        tracing::debug!(program, ?args, "spawning command");
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|e| DockhandError::io(program, e))?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }
}

/// Renders a command line for messages and logs.
#[must_use]
pub fn render(program: &str, args: &[String]) -> String {
    std::iter::once(program)
        .chain(args.iter().map(String::as_str))
        .collect::<Vec<_>>()
        .join(" ")
}
