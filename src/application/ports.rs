//! Port trait definitions for the application layer.
//!
//! Ports are the contracts infrastructure must fulfill. This file imports
//! only from `crate::domain` — never from `crate::infra`, `crate::commands`,
//! or `crate::output`.

use anyhow::Result;

use crate::domain::spec::PortRange;

/// CIDR used for rules open to the internet.
pub const PUBLIC_CIDR: &str = "0.0.0.0/0";

// ── Value types ───────────────────────────────────────────────────────────────

/// The owner+name pair identifying another group in a peer-scoped rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupRef {
    pub owner_id: String,
    pub name: String,
}

/// One ingress rule as enumerated from the provider. A rule carries either
/// source CIDRs ("self" rule) or peer group references, or both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupRule {
    /// Wire protocol as reported by the provider, e.g. `"tcp"`.
    pub protocol: String,
    pub range: PortRange,
    pub cidrs: Vec<String>,
    pub peers: Vec<GroupRef>,
}

/// Remote security group state, fetched fresh on every operation.
#[derive(Debug, Clone)]
pub struct RemoteGroup {
    pub id: String,
    pub name: String,
    pub owner_id: String,
    pub rules: Vec<GroupRule>,
}

/// The source a single authorize/revoke call is scoped to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleSource<'a> {
    Cidr(&'a str),
    Peer(&'a GroupRef),
}

/// Remote compute instance, located by its `Name` tag.
#[derive(Debug, Clone)]
pub struct Instance {
    pub id: String,
    pub public_address: Option<String>,
}

/// Instance lifecycle state as observed from the provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceState {
    Pending,
    Running,
    Terminated,
    Other(String),
}

impl std::fmt::Display for InstanceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Terminated => write!(f, "terminated"),
            Self::Other(state) => write!(f, "{state}"),
        }
    }
}

/// Launch parameters. Struct-based to avoid breaking test doubles on
/// future parameter additions.
pub struct LaunchRequest<'a> {
    pub name: &'a str,
    pub security_groups: &'a [String],
    pub key_name: &'a str,
    pub image_id: &'a str,
    pub size: &'a str,
}

// ── Cloud port traits ─────────────────────────────────────────────────────────

/// Security group operations against the provider.
#[allow(async_fn_in_trait)]
pub trait SecurityGroupApi {
    /// Fetch a group by name, including its current rule set.
    async fn find_group(&self, name: &str) -> Result<Option<RemoteGroup>>;
    /// Create an empty group and return its id.
    async fn create_group(&self, name: &str, description: &str) -> Result<String>;
    async fn delete_group(&self, group_id: &str) -> Result<()>;
    /// Authorize one TCP range from one source.
    async fn authorize(
        &self,
        group_id: &str,
        range: PortRange,
        source: RuleSource<'_>,
    ) -> Result<()>;
    /// Revoke one range from one source. `protocol` echoes what the
    /// provider reported for the rule being removed.
    async fn revoke(
        &self,
        group_id: &str,
        protocol: &str,
        range: PortRange,
        source: RuleSource<'_>,
    ) -> Result<()>;
}

/// Compute instance operations against the provider.
#[allow(async_fn_in_trait)]
pub trait ComputeApi {
    /// Locate the running instance tagged with `name`. When the provider
    /// holds several, the first returned is addressed.
    async fn find_running(&self, name: &str) -> Result<Option<Instance>>;
    async fn launch(&self, request: &LaunchRequest<'_>) -> Result<Instance>;
    async fn instance_state(&self, instance_id: &str) -> Result<InstanceState>;
    async fn terminate(&self, instance_id: &str) -> Result<()>;
}

/// Composite trait — any type implementing both cloud sub-traits is a `CloudApi`.
pub trait CloudApi: SecurityGroupApi + ComputeApi {}

impl<T> CloudApi for T where T: SecurityGroupApi + ComputeApi {}

// ── Provisioning port ─────────────────────────────────────────────────────────

/// How the bootstrap command addresses the configuration source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapMode<'a> {
    /// Bootstrap against the orchestration server.
    Direct,
    /// Bootstrap from a local attributes file.
    Solo { attributes: &'a str },
}

/// Parameters for one external bootstrap invocation.
#[derive(Debug, Clone, Copy)]
pub struct BootstrapRequest<'a> {
    pub address: &'a str,
    /// SSH key name; the adapter derives the identity-file path from it.
    pub key_name: &'a str,
    pub node_name: &'a str,
    pub runlist: &'a str,
    pub mode: BootstrapMode<'a>,
}

/// Abstracts the external configuration-management bootstrap tool so
/// services can be tested without spawning processes.
#[allow(async_fn_in_trait)]
pub trait Provisioner {
    /// Run one bootstrap command synchronously. A non-zero exit is an error.
    async fn bootstrap(&self, request: &BootstrapRequest<'_>) -> Result<()>;
}

// ── Progress reporting port ───────────────────────────────────────────────────

/// Abstracts progress reporting so services can emit events without
/// depending on the presentation layer. Sync trait — no async needed.
pub trait ProgressReporter {
    /// Emit an in-progress step message.
    fn step(&self, message: &str);
    /// Emit a success message.
    fn success(&self, message: &str);
    /// Emit a warning message.
    fn warn(&self, message: &str);
}
