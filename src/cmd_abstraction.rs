//! Command execution abstraction for the cloud provider CLIs.
//!
//! Providers run `aws`, `gcloud` and `az` through the [`CommandExecutor`]
//! trait so unit tests can feed canned CLI output instead of spawning
//! processes.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::process::{Command, Stdio};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::error::AsmError;

/// Output from command execution
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    /// Standard output from the command
    pub stdout: String,
    /// Standard error from the command
    pub stderr: String,
    /// Whether the command succeeded (exit code 0)
    pub success: bool,
    /// The exit code, if available
    pub code: Option<i32>,
}

/// Trait for command execution, allowing dependency injection for testing.
#[cfg_attr(test, automock)]
pub trait CommandExecutor: Send + Sync {
    /// Execute a command with the given arguments.
    ///
    /// # Arguments
    /// * `cmd` - The command to execute (e.g., "aws")
    /// * `args` - The arguments to pass to the command
    fn execute(&self, cmd: &str, args: &[String]) -> Result<CommandOutput>;
}

/// Real implementation of CommandExecutor that runs actual system commands.
#[derive(Debug, Clone, Default)]
pub struct RealCommandExecutor;

impl RealCommandExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl CommandExecutor for RealCommandExecutor {
    fn execute(&self, cmd: &str, args: &[String]) -> Result<CommandOutput> {
        debug!("Running {} {}", cmd, args.join(" "));
        let output = Command::new(cmd)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .with_context(|| format!("Failed to execute {} (is it installed?)", cmd))?;

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            success: output.status.success(),
            code: output.status.code(),
        })
    }
}

/// Helper function to convert a slice of &str to Vec<String>.
///
/// mockall has issues with lifetimes in `&[&str]`, so the trait takes
/// `&[String]` instead.
pub fn args_to_strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

/// Run a command and return its stdout, failing on a non-zero exit.
pub fn run_checked(executor: &dyn CommandExecutor, cmd: &str, args: &[&str]) -> Result<String> {
    let output = executor.execute(cmd, &args_to_strings(args))?;
    if !output.success {
        return Err(AsmError::CommandFailed {
            program: format!("{} {}", cmd, args.join(" ")),
            stderr: output.stderr.trim().to_string(),
        }
        .into());
    }
    Ok(output.stdout)
}

/// Run a command that prints JSON and deserialize its stdout.
pub fn run_json<T: DeserializeOwned>(
    executor: &dyn CommandExecutor,
    cmd: &str,
    args: &[&str],
) -> Result<T> {
    let stdout = run_checked(executor, cmd, args)?;
    serde_json::from_str(&stdout)
        .with_context(|| format!("Malformed JSON from {} {}", cmd, args.join(" ")))
}
