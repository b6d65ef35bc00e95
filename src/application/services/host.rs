//! Host lifecycle — replace-semantics instance creation and external
//! provisioning.
//!
//! State machine per host name: `absent → (spinup) running → (provision)
//! provisioned`; `destroy` from any state returns to `absent`. `create`
//! is spinup then provision, strictly sequential.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.

use std::time::Duration;

use anyhow::{Context, Result};

use crate::application::ports::{
    BootstrapMode, BootstrapRequest, ComputeApi, Instance, InstanceState, LaunchRequest,
    ProgressReporter, Provisioner,
};
use crate::domain::error::HostError;
use crate::domain::spec::{HostSpec, ProfileDefaults};

/// Readiness polling bounds. The timeout is operator-configurable; the
/// interval is fixed.
#[derive(Debug, Clone, Copy)]
pub struct WaitSettings {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for WaitSettings {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            timeout: Duration::from_secs(600),
        }
    }
}

/// Outcome of a `provision` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provisioning {
    /// Empty runlist and no knife-solo flag — nothing to do, by contract.
    Skipped,
    Applied,
}

/// Launch a fresh instance for `spec`, replacing any running one.
///
/// An existing instance is terminated first — replace, not update: no
/// attempt is made to reconcile a live instance's configuration in place.
/// Blocks until the new instance reports running, bounded by
/// `wait.timeout`.
///
/// # Errors
///
/// Returns [`HostError::ReadinessTimeout`] when the instance does not
/// reach running in time, [`HostError::UnexpectedState`] if it lands in a
/// terminal state, and propagates provider failures.
pub async fn spinup(
    api: &impl ComputeApi,
    reporter: &impl ProgressReporter,
    spec: &HostSpec,
    defaults: &ProfileDefaults,
    wait: WaitSettings,
) -> Result<Instance> {
    if let Some(existing) = api.find_running(&spec.name).await? {
        reporter.step(&format!(
            "replacing running instance {} for host '{}'...",
            existing.id, spec.name
        ));
        api.terminate(&existing.id)
            .await
            .with_context(|| format!("terminating instance {}", existing.id))?;
    }

    let request = LaunchRequest {
        name: &spec.name,
        security_groups: &spec.security_groups,
        key_name: resolve(&spec.options.key_name, &defaults.key_name, spec, "key_name")?,
        image_id: resolve(&spec.options.image_id, &defaults.image_id, spec, "image_id")?,
        size: resolve(&spec.options.size, &defaults.size, spec, "size")?,
    };
    let instance = api
        .launch(&request)
        .await
        .with_context(|| format!("launching host '{}'", spec.name))?;

    reporter.step(&format!("waiting for instance {} to be ready...", instance.id));
    wait_ready(api, &instance.id, wait).await?;
    reporter.success(&format!("host '{}' running as {}", spec.name, instance.id));
    Ok(instance)
}

/// Run the external bootstrap tool against the host's running instance.
///
/// No-op iff the runlist is empty and `knife_solo` is unset. Otherwise
/// exactly one external command runs; a non-zero exit propagates as
/// [`HostError::ProvisionFailed`].
///
/// # Errors
///
/// Returns [`HostError::NotRunning`] when no running instance carries the
/// host's name tag, and propagates bootstrap failures.
pub async fn provision(
    api: &impl ComputeApi,
    provisioner: &impl Provisioner,
    reporter: &impl ProgressReporter,
    spec: &HostSpec,
    defaults: &ProfileDefaults,
) -> Result<Provisioning> {
    if spec.runlist.is_empty() && !spec.options.knife_solo {
        reporter.step(&format!("host '{}' declares no runlist, skipping provisioning", spec.name));
        return Ok(Provisioning::Skipped);
    }

    let instance = api
        .find_running(&spec.name)
        .await?
        .ok_or_else(|| HostError::NotRunning(spec.name.clone()))?;
    let address = instance
        .public_address
        .as_deref()
        .ok_or_else(|| HostError::NoAddress(spec.name.clone()))?;

    let mode = if spec.options.knife_solo {
        let attributes = spec
            .options
            .attributes
            .as_deref()
            .ok_or_else(|| HostError::MissingAttributes(spec.name.clone()))?;
        BootstrapMode::Solo { attributes }
    } else {
        BootstrapMode::Direct
    };

    reporter.step(&format!("provisioning '{}' at {address}...", spec.name));
    provisioner
        .bootstrap(&BootstrapRequest {
            address,
            key_name: resolve(&spec.options.key_name, &defaults.key_name, spec, "key_name")?,
            node_name: &spec.name,
            runlist: &spec.runlist,
            mode,
        })
        .await?;
    reporter.success(&format!("host '{}' provisioned", spec.name));
    Ok(Provisioning::Applied)
}

/// Terminate the host's running instance; absent instances are a no-op.
///
/// # Errors
///
/// Propagates provider failures from the lookup or termination.
pub async fn destroy(
    api: &impl ComputeApi,
    reporter: &impl ProgressReporter,
    spec: &HostSpec,
) -> Result<()> {
    match api.find_running(&spec.name).await? {
        Some(instance) => {
            api.terminate(&instance.id)
                .await
                .with_context(|| format!("terminating instance {}", instance.id))?;
            reporter.success(&format!("host '{}' terminated", spec.name));
        }
        None => reporter.step(&format!("host '{}' already absent", spec.name)),
    }
    Ok(())
}

/// Poll the instance state at a fixed interval until it reports running.
async fn wait_ready(api: &impl ComputeApi, instance_id: &str, wait: WaitSettings) -> Result<()> {
    let started = std::time::Instant::now();
    loop {
        match api.instance_state(instance_id).await? {
            InstanceState::Running => return Ok(()),
            InstanceState::Pending => {}
            other => {
                return Err(HostError::UnexpectedState {
                    instance_id: instance_id.to_string(),
                    state: other.to_string(),
                }
                .into());
            }
        }
        if started.elapsed() >= wait.timeout {
            return Err(HostError::ReadinessTimeout {
                instance_id: instance_id.to_string(),
                waited_secs: wait.timeout.as_secs(),
            }
            .into());
        }
        tokio::time::sleep(wait.poll_interval).await;
    }
}

fn resolve<'a>(
    option: &'a Option<String>,
    default: &'a Option<String>,
    spec: &HostSpec,
    what: &'static str,
) -> Result<&'a str> {
    option
        .as_deref()
        .or(default.as_deref())
        .ok_or_else(|| {
            HostError::MissingOption {
                host: spec.name.clone(),
                option: what,
            }
            .into()
        })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::application::services::test_support::{
        FakeCloud, RecordedMode, RecordingProvisioner, ReporterStub,
    };
    use crate::domain::spec::HostOptions;

    fn app_spec() -> HostSpec {
        HostSpec {
            name: "app".into(),
            security_groups: vec!["web".into()],
            runlist: "role[app]".into(),
            options: HostOptions::default(),
        }
    }

    fn defaults() -> ProfileDefaults {
        ProfileDefaults {
            key_name: Some("staging-deploy".into()),
            image_id: Some("ami-0123456789abcdef0".into()),
            size: Some("t3.small".into()),
        }
    }

    fn fast_wait() -> WaitSettings {
        WaitSettings {
            poll_interval: Duration::from_millis(1),
            timeout: Duration::from_millis(50),
        }
    }

    #[tokio::test]
    async fn spinup_with_no_prior_instance_launches_once() {
        let cloud = FakeCloud::default();
        let instance = spinup(&cloud, &ReporterStub, &app_spec(), &defaults(), fast_wait())
            .await
            .unwrap();

        assert_eq!(cloud.terminate_calls(), 0);
        assert_eq!(cloud.running_named("app").len(), 1);
        assert_eq!(cloud.running_named("app")[0], instance.id);
    }

    #[tokio::test]
    async fn spinup_replaces_a_running_instance() {
        let cloud = FakeCloud::default();
        let old_id = cloud.seed_instance("app");

        let instance = spinup(&cloud, &ReporterStub, &app_spec(), &defaults(), fast_wait())
            .await
            .unwrap();

        let running = cloud.running_named("app");
        assert_eq!(running.len(), 1, "exactly one running instance named 'app'");
        assert_ne!(running[0], old_id, "replacement must have a new identity");
        assert_eq!(running[0], instance.id);
        assert_eq!(cloud.terminate_calls(), 1);
    }

    #[tokio::test]
    async fn spinup_resolves_options_with_defaults() {
        let cloud = FakeCloud::default();
        let mut spec = app_spec();
        spec.options.size = Some("c5.xlarge".into());

        spinup(&cloud, &ReporterStub, &spec, &defaults(), fast_wait())
            .await
            .unwrap();

        let launch = cloud.last_launch().unwrap();
        assert_eq!(launch.key_name, "staging-deploy");
        assert_eq!(launch.image_id, "ami-0123456789abcdef0");
        assert_eq!(launch.size, "c5.xlarge");
        assert_eq!(launch.security_groups, vec!["web"]);
    }

    #[tokio::test]
    async fn spinup_without_image_anywhere_fails() {
        let cloud = FakeCloud::default();
        let mut missing = defaults();
        missing.image_id = None;

        let err = spinup(&cloud, &ReporterStub, &app_spec(), &missing, fast_wait())
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<HostError>().unwrap(),
            HostError::MissingOption { option: "image_id", .. }
        ));
    }

    #[tokio::test]
    async fn spinup_times_out_when_instance_never_readies() {
        let cloud = FakeCloud::default();
        cloud.set_ready_after(usize::MAX);

        let err = spinup(&cloud, &ReporterStub, &app_spec(), &defaults(), fast_wait())
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<HostError>().unwrap(),
            HostError::ReadinessTimeout { .. }
        ));
    }

    #[tokio::test]
    async fn spinup_waits_through_pending_polls() {
        let cloud = FakeCloud::default();
        cloud.set_ready_after(3);

        spinup(&cloud, &ReporterStub, &app_spec(), &defaults(), fast_wait())
            .await
            .unwrap();
        assert!(cloud.state_polls() >= 4, "polled through pending states");
    }

    #[tokio::test]
    async fn provision_skips_when_runlist_empty_and_not_solo() {
        let cloud = FakeCloud::default();
        let knife = RecordingProvisioner::default();
        let mut spec = app_spec();
        spec.runlist = String::new();

        let outcome = provision(&cloud, &knife, &ReporterStub, &spec, &defaults())
            .await
            .unwrap();
        assert_eq!(outcome, Provisioning::Skipped);
        assert_eq!(knife.calls(), 0, "no external invocation on the no-op path");
    }

    #[tokio::test]
    async fn provision_runs_exactly_one_command() {
        let cloud = FakeCloud::default();
        cloud.seed_instance("app");
        let knife = RecordingProvisioner::default();

        let outcome = provision(&cloud, &knife, &ReporterStub, &app_spec(), &defaults())
            .await
            .unwrap();
        assert_eq!(outcome, Provisioning::Applied);
        assert_eq!(knife.calls(), 1);

        let call = knife.last_call().unwrap();
        assert_eq!(call.node_name, "app");
        assert_eq!(call.runlist, "role[app]");
        assert_eq!(call.key_name, "staging-deploy");
        assert!(matches!(call.mode, RecordedMode::Direct));
    }

    #[tokio::test]
    async fn provision_solo_with_empty_runlist_still_runs() {
        let cloud = FakeCloud::default();
        cloud.seed_instance("app");
        let knife = RecordingProvisioner::default();
        let mut spec = app_spec();
        spec.runlist = String::new();
        spec.options.knife_solo = true;
        spec.options.attributes = Some("nodes/app.json".into());

        let outcome = provision(&cloud, &knife, &ReporterStub, &spec, &defaults())
            .await
            .unwrap();
        assert_eq!(outcome, Provisioning::Applied);
        assert_eq!(knife.calls(), 1);
        assert!(matches!(
            knife.last_call().unwrap().mode,
            RecordedMode::Solo { ref attributes } if attributes == "nodes/app.json"
        ));
    }

    #[tokio::test]
    async fn provision_solo_without_attributes_fails() {
        let cloud = FakeCloud::default();
        cloud.seed_instance("app");
        let knife = RecordingProvisioner::default();
        let mut spec = app_spec();
        spec.options.knife_solo = true;

        let err = provision(&cloud, &knife, &ReporterStub, &spec, &defaults())
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<HostError>().unwrap(),
            HostError::MissingAttributes(_)
        ));
        assert_eq!(knife.calls(), 0);
    }

    #[tokio::test]
    async fn provision_without_running_instance_fails() {
        let cloud = FakeCloud::default();
        let knife = RecordingProvisioner::default();

        let err = provision(&cloud, &knife, &ReporterStub, &app_spec(), &defaults())
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<HostError>().unwrap(),
            HostError::NotRunning(name) if name == "app"
        ));
    }

    #[tokio::test]
    async fn provision_propagates_bootstrap_failure() {
        let cloud = FakeCloud::default();
        cloud.seed_instance("app");
        let knife = RecordingProvisioner::failing(1);

        let err = provision(&cloud, &knife, &ReporterStub, &app_spec(), &defaults())
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<HostError>().unwrap(),
            HostError::ProvisionFailed { code: 1 }
        ));
    }

    #[tokio::test]
    async fn destroy_terminates_running_instance() {
        let cloud = FakeCloud::default();
        cloud.seed_instance("app");

        destroy(&cloud, &ReporterStub, &app_spec()).await.unwrap();
        assert!(cloud.running_named("app").is_empty());
        assert_eq!(cloud.terminate_calls(), 1);
    }

    #[tokio::test]
    async fn destroy_of_absent_host_is_a_noop() {
        let cloud = FakeCloud::default();
        destroy(&cloud, &ReporterStub, &app_spec()).await.unwrap();
        assert_eq!(cloud.terminate_calls(), 0);
    }
}
