//! Process execution behind a trait so infrastructure can be swapped or
//! mocked in tests.

use std::process::ExitStatus;

use anyhow::{Context, Result};

/// Generic external command execution. The production implementation uses
/// tokio; test doubles return canned statuses without spawning processes.
#[allow(async_fn_in_trait)]
pub trait CommandRunner {
    /// Run a command with inherited stdio and return its exit status.
    /// No timeout — used for interactive, operator-visible subprocesses.
    async fn run_status(&self, program: &str, args: &[&str]) -> Result<ExitStatus>;
}

/// Production `CommandRunner` backed by `tokio::process`.
pub struct TokioCommandRunner;

impl CommandRunner for TokioCommandRunner {
    async fn run_status(&self, program: &str, args: &[&str]) -> Result<ExitStatus> {
        let mut child = tokio::process::Command::new(program)
            .args(args)
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn {program}"))?;

        child
            .wait()
            .await
            .with_context(|| format!("waiting for {program}"))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[tokio::test]
    async fn run_status_reports_exit_codes() {
        let runner = TokioCommandRunner;
        let ok = runner.run_status("sh", &["-c", "exit 0"]).await.unwrap();
        assert!(ok.success());

        let failed = runner.run_status("sh", &["-c", "exit 3"]).await.unwrap();
        assert_eq!(failed.code(), Some(3));
    }

    #[tokio::test]
    async fn missing_program_is_a_spawn_error() {
        let runner = TokioCommandRunner;
        let err = runner
            .run_status("definitely-not-a-real-binary", &[])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("failed to spawn"));
    }
}
