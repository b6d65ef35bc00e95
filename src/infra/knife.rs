//! Knife bootstrap adapter — builds the two external invocation shapes
//! and runs them through the `CommandRunner` port with inherited stdio,
//! so the operator sees the tool's output live.

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::application::ports::{BootstrapMode, BootstrapRequest, Provisioner};
use crate::domain::error::HostError;
use crate::infra::command_runner::{CommandRunner, TokioCommandRunner};

/// Stock login user of the Ubuntu images this tool targets.
const REMOTE_USER: &str = "ubuntu";

/// Routes bootstrap invocations through a `CommandRunner`. Generic so
/// tests can inject a runner that records instead of spawning.
pub struct KnifeRunner<R: CommandRunner> {
    runner: R,
}

impl<R: CommandRunner> KnifeRunner<R> {
    pub fn new(runner: R) -> Self {
        Self { runner }
    }
}

impl KnifeRunner<TokioCommandRunner> {
    /// Convenience constructor for production use.
    #[must_use]
    pub fn default_runner() -> Self {
        Self::new(TokioCommandRunner)
    }
}

impl<R: CommandRunner> Provisioner for KnifeRunner<R> {
    async fn bootstrap(&self, request: &BootstrapRequest<'_>) -> Result<()> {
        let args = build_args(request);
        let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
        tracing::info!(node = request.node_name, "running knife bootstrap");
        let status = self
            .runner
            .run_status("knife", &arg_refs)
            .await
            .context("running knife")?;
        if !status.success() {
            return Err(HostError::ProvisionFailed {
                code: status.code().unwrap_or(-1),
            }
            .into());
        }
        Ok(())
    }
}

/// Identity file conventionally kept alongside the user's SSH keys.
fn identity_file(key_name: &str) -> PathBuf {
    dirs::home_dir()
        .unwrap_or_default()
        .join(".ssh")
        .join(format!("{key_name}.pem"))
}

fn build_args(request: &BootstrapRequest<'_>) -> Vec<String> {
    let identity = identity_file(request.key_name).display().to_string();
    let mut args = match request.mode {
        BootstrapMode::Solo { attributes } => vec![
            "solo".to_string(),
            "bootstrap".to_string(),
            format!("{REMOTE_USER}@{}", request.address),
            attributes.to_string(),
        ],
        BootstrapMode::Direct => vec![
            "bootstrap".to_string(),
            request.address.to_string(),
            "--ssh-user".to_string(),
            REMOTE_USER.to_string(),
            "--sudo".to_string(),
        ],
    };
    args.extend([
        "--identity-file".to_string(),
        identity,
        "--node-name".to_string(),
        request.node_name.to_string(),
        "--run-list".to_string(),
        request.runlist.to_string(),
    ]);
    args
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::process::ExitStatus;
    use std::sync::Mutex;

    use super::*;

    fn request<'a>(mode: BootstrapMode<'a>) -> BootstrapRequest<'a> {
        BootstrapRequest {
            address: "203.0.113.10",
            key_name: "staging-deploy",
            node_name: "app",
            runlist: "role[app]",
            mode,
        }
    }

    #[test]
    fn direct_bootstrap_shape() {
        let args = build_args(&request(BootstrapMode::Direct));
        assert_eq!(args[0], "bootstrap");
        assert_eq!(args[1], "203.0.113.10");
        assert_eq!(&args[2..5], ["--ssh-user", "ubuntu", "--sudo"]);
        assert!(args.contains(&"--node-name".to_string()));
        assert!(args.contains(&"role[app]".to_string()));
        let identity = &args[args.iter().position(|a| a == "--identity-file").unwrap() + 1];
        assert!(identity.ends_with(".ssh/staging-deploy.pem"), "got {identity}");
    }

    #[test]
    fn solo_bootstrap_shape() {
        let args = build_args(&request(BootstrapMode::Solo {
            attributes: "nodes/app.json",
        }));
        assert_eq!(&args[..4], [
            "solo",
            "bootstrap",
            "ubuntu@203.0.113.10",
            "nodes/app.json",
        ]);
        assert!(!args.contains(&"--sudo".to_string()));
        assert!(args.contains(&"--run-list".to_string()));
    }

    #[cfg(unix)]
    fn exit_status(code: i32) -> ExitStatus {
        use std::os::unix::process::ExitStatusExt;
        ExitStatus::from_raw(code << 8)
    }

    struct CannedRunner {
        status: ExitStatus,
        seen: Mutex<Vec<(String, Vec<String>)>>,
    }

    impl CommandRunner for CannedRunner {
        async fn run_status(&self, program: &str, args: &[&str]) -> Result<ExitStatus> {
            self.seen.lock().unwrap().push((
                program.to_string(),
                args.iter().map(ToString::to_string).collect(),
            ));
            Ok(self.status)
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn bootstrap_invokes_knife_once() {
        let runner = CannedRunner {
            status: exit_status(0),
            seen: Mutex::new(Vec::new()),
        };
        let knife = KnifeRunner::new(runner);
        knife.bootstrap(&request(BootstrapMode::Direct)).await.unwrap();

        let seen = knife.runner.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "knife");
        assert_eq!(seen[0].1[0], "bootstrap");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn nonzero_exit_propagates_as_provision_failure() {
        let runner = CannedRunner {
            status: exit_status(2),
            seen: Mutex::new(Vec::new()),
        };
        let knife = KnifeRunner::new(runner);
        let err = knife
            .bootstrap(&request(BootstrapMode::Direct))
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<HostError>().unwrap(),
            HostError::ProvisionFailed { code: 2 }
        ));
    }
}
