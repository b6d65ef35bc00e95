//! Resource graph — a statically typed operation registry.
//!
//! Each declared resource registers namespaced lifecycle targets
//! (`security:<name>:create`, `host:<name>:spinup`, …) which fold into the
//! two aggregate entry points `up` and `down`. Execution is straight-line
//! in declaration order; no cross-resource edges are inferred.

use std::collections::HashMap;
use std::fmt;

use anyhow::Result;

use crate::application::ports::{CloudApi, ProgressReporter, Provisioner};
use crate::application::services::host::{self, WaitSettings};
use crate::application::services::security_group;
use crate::domain::error::GraphError;
use crate::domain::spec::{HostSpec, ProfileDefaults, SecurityGroupSpec};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupOp {
    Create,
    Destroy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostOp {
    Spinup,
    Provision,
    Create,
    Destroy,
}

/// One executable node of the graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Group { name: String, op: GroupOp },
    Host { name: String, op: HostOp },
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Group { name, op } => {
                let op = match op {
                    GroupOp::Create => "create",
                    GroupOp::Destroy => "destroy",
                };
                write!(f, "security:{name}:{op}")
            }
            Self::Host { name, op } => {
                let op = match op {
                    HostOp::Spinup => "spinup",
                    HostOp::Provision => "provision",
                    HostOp::Create => "create",
                    HostOp::Destroy => "destroy",
                };
                write!(f, "host:{name}:{op}")
            }
        }
    }
}

fn parse_target(raw: &str) -> Option<Target> {
    let mut parts = raw.splitn(3, ':');
    let kind = parts.next()?;
    let name = parts.next()?.to_string();
    let op = parts.next()?;
    if name.is_empty() {
        return None;
    }
    match kind {
        "security" => {
            let op = match op {
                "create" => GroupOp::Create,
                "destroy" => GroupOp::Destroy,
                _ => return None,
            };
            Some(Target::Group { name, op })
        }
        "host" => {
            let op = match op {
                "spinup" => HostOp::Spinup,
                "provision" => HostOp::Provision,
                "create" => HostOp::Create,
                "destroy" => HostOp::Destroy,
                _ => return None,
            };
            Some(Target::Host { name, op })
        }
        _ => None,
    }
}

/// Registry of declared resources and the two aggregate target lists.
///
/// Re-registering a name overwrites its spec (the name is the sole
/// identity) but the aggregate lists stay additive; executing a duplicate
/// entry twice is safe because the underlying operations are idempotent.
#[derive(Default)]
pub struct ResourceGraph {
    groups: HashMap<String, SecurityGroupSpec>,
    hosts: HashMap<String, HostSpec>,
    up: Vec<Target>,
    down: Vec<Target>,
}

impl ResourceGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a security group's create/destroy targets. Returns the
    /// resource's namespace key.
    pub fn security(&mut self, spec: SecurityGroupSpec) -> String {
        let name = spec.name.clone();
        self.groups.insert(name.clone(), spec);
        self.up.push(Target::Group {
            name: name.clone(),
            op: GroupOp::Create,
        });
        self.down.push(Target::Group {
            name: name.clone(),
            op: GroupOp::Destroy,
        });
        format!("security:{name}")
    }

    /// Register a host's lifecycle targets. Returns the resource's
    /// namespace key.
    pub fn host(&mut self, spec: HostSpec) -> String {
        let name = spec.name.clone();
        self.hosts.insert(name.clone(), spec);
        self.up.push(Target::Host {
            name: name.clone(),
            op: HostOp::Create,
        });
        self.down.push(Target::Host {
            name: name.clone(),
            op: HostOp::Destroy,
        });
        format!("host:{name}")
    }

    /// Resolve an invocation string (`up`, `down`, or a namespaced target)
    /// to the list of targets it executes.
    ///
    /// # Errors
    ///
    /// Returns [`GraphError::UnknownTarget`] for malformed names and for
    /// resources that were never registered.
    pub fn resolve(&self, raw: &str) -> Result<Vec<Target>, GraphError> {
        match raw {
            "up" => Ok(self.up.clone()),
            "down" => Ok(self.down.clone()),
            _ => {
                let target = parse_target(raw)
                    .ok_or_else(|| GraphError::UnknownTarget(raw.to_string()))?;
                let registered = match &target {
                    Target::Group { name, .. } => self.groups.contains_key(name),
                    Target::Host { name, .. } => self.hosts.contains_key(name),
                };
                if !registered {
                    return Err(GraphError::UnknownTarget(raw.to_string()));
                }
                Ok(vec![target])
            }
        }
    }

    /// Every fine-grained target name, in declaration order.
    #[must_use]
    pub fn targets(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        let mut names = Vec::new();
        for target in &self.up {
            match target {
                Target::Group { name, .. } => {
                    if seen.insert(format!("security:{name}")) {
                        names.push(format!("security:{name}:create"));
                        names.push(format!("security:{name}:destroy"));
                    }
                }
                Target::Host { name, .. } => {
                    if seen.insert(format!("host:{name}")) {
                        for op in ["spinup", "provision", "create", "destroy"] {
                            names.push(format!("host:{name}:{op}"));
                        }
                    }
                }
            }
        }
        names
    }

    #[must_use]
    pub fn group_spec(&self, name: &str) -> Option<&SecurityGroupSpec> {
        self.groups.get(name)
    }

    #[must_use]
    pub fn host_spec(&self, name: &str) -> Option<&HostSpec> {
        self.hosts.get(name)
    }
}

/// Drives resolved targets against the injected collaborator ports.
pub struct Executor<'a, C, P, R> {
    pub cloud: &'a C,
    pub provisioner: &'a P,
    pub reporter: &'a R,
    pub defaults: &'a ProfileDefaults,
    pub wait: WaitSettings,
}

impl<C, P, R> Executor<'_, C, P, R>
where
    C: CloudApi,
    P: Provisioner,
    R: ProgressReporter,
{
    /// Execute targets strictly in order, aborting on the first failure.
    /// Already-completed targets are not rolled back.
    ///
    /// # Errors
    ///
    /// Propagates the first failing target's error.
    pub async fn execute(&self, graph: &ResourceGraph, targets: &[Target]) -> Result<()> {
        for target in targets {
            self.run_target(graph, target).await?;
        }
        Ok(())
    }

    async fn run_target(&self, graph: &ResourceGraph, target: &Target) -> Result<()> {
        match target {
            Target::Group { name, op } => {
                let spec = graph
                    .group_spec(name)
                    .ok_or_else(|| GraphError::UnknownTarget(target.to_string()))?;
                match op {
                    GroupOp::Create => {
                        security_group::create(self.cloud, self.reporter, spec).await
                    }
                    GroupOp::Destroy => {
                        security_group::destroy(self.cloud, self.reporter, name).await
                    }
                }
            }
            Target::Host { name, op } => {
                let spec = graph
                    .host_spec(name)
                    .ok_or_else(|| GraphError::UnknownTarget(target.to_string()))?;
                match op {
                    HostOp::Spinup => {
                        host::spinup(self.cloud, self.reporter, spec, self.defaults, self.wait)
                            .await
                            .map(|_| ())
                    }
                    HostOp::Provision => host::provision(
                        self.cloud,
                        self.provisioner,
                        self.reporter,
                        spec,
                        self.defaults,
                    )
                    .await
                    .map(|_| ()),
                    HostOp::Create => {
                        host::spinup(self.cloud, self.reporter, spec, self.defaults, self.wait)
                            .await?;
                        host::provision(
                            self.cloud,
                            self.provisioner,
                            self.reporter,
                            spec,
                            self.defaults,
                        )
                        .await
                        .map(|_| ())
                    }
                    HostOp::Destroy => host::destroy(self.cloud, self.reporter, spec).await,
                }
            }
        }
    }
}
