//! Shared test doubles for service tests.
//!
//! `FakeCloud` is an in-memory provider; `RecordingProvisioner` captures
//! bootstrap invocations. Both can share an event log so ordering across
//! ports is observable.

#![allow(clippy::unwrap_used)]

use std::sync::{Arc, Mutex};

use anyhow::Result;

use crate::application::ports::{
    BootstrapRequest, ComputeApi, GroupRef, GroupRule, Instance, InstanceState, LaunchRequest,
    ProgressReporter, RemoteGroup, RuleSource, SecurityGroupApi,
};
use crate::domain::error::HostError;
use crate::domain::spec::PortRange;

pub type EventLog = Arc<Mutex<Vec<String>>>;

const OWNER_ID: &str = "123456789012";

/// One stored ingress rule; each authorize call creates exactly one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeRule {
    pub protocol: String,
    pub range: PortRange,
    pub cidr: Option<String>,
    pub peer: Option<GroupRef>,
}

impl FakeRule {
    pub fn cidr(protocol: &str, range: PortRange, cidr: &str) -> Self {
        Self {
            protocol: protocol.into(),
            range,
            cidr: Some(cidr.into()),
            peer: None,
        }
    }

    pub fn peer(protocol: &str, range: PortRange, owner_id: &str, name: &str) -> Self {
        Self {
            protocol: protocol.into(),
            range,
            cidr: None,
            peer: Some(GroupRef {
                owner_id: owner_id.into(),
                name: name.into(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FakeInstanceStatus {
    Pending(usize),
    Running,
    Terminated,
}

#[derive(Debug, Clone)]
struct FakeInstance {
    id: String,
    name: String,
    status: FakeInstanceStatus,
}

/// Captured launch parameters, owned for later assertions.
#[derive(Debug, Clone)]
pub struct RecordedLaunch {
    pub name: String,
    pub security_groups: Vec<String>,
    pub key_name: String,
    pub image_id: String,
    pub size: String,
}

#[derive(Default)]
struct CloudState {
    groups: Vec<(String, Vec<FakeRule>)>,
    instances: Vec<FakeInstance>,
    launches: Vec<RecordedLaunch>,
    next_instance: usize,
    ready_after: usize,
    delete_group_calls: usize,
    terminate_calls: usize,
    state_polls: usize,
}

/// In-memory stand-in for the cloud provider.
pub struct FakeCloud {
    state: Mutex<CloudState>,
    events: EventLog,
}

impl Default for FakeCloud {
    fn default() -> Self {
        Self {
            state: Mutex::new(CloudState::default()),
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl FakeCloud {
    pub fn owner_id(&self) -> String {
        OWNER_ID.to_string()
    }

    /// Handle to the event log, for sharing with other fakes.
    pub fn events_handle(&self) -> EventLog {
        Arc::clone(&self.events)
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    pub fn seed_group(&self, name: &str, rules: Vec<FakeRule>) {
        self.state.lock().unwrap().groups.push((name.to_string(), rules));
    }

    pub fn group_exists(&self, name: &str) -> bool {
        self.state.lock().unwrap().groups.iter().any(|(n, _)| n == name)
    }

    pub fn group_rules(&self, name: &str) -> Vec<FakeRule> {
        self.state
            .lock()
            .unwrap()
            .groups
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, rules)| rules.clone())
            .unwrap_or_default()
    }

    pub fn delete_group_calls(&self) -> usize {
        self.state.lock().unwrap().delete_group_calls
    }

    /// Insert a running instance and return its id.
    pub fn seed_instance(&self, name: &str) -> String {
        let mut state = self.state.lock().unwrap();
        state.next_instance += 1;
        let id = format!("i-{:08x}", state.next_instance);
        state.instances.push(FakeInstance {
            id: id.clone(),
            name: name.to_string(),
            status: FakeInstanceStatus::Running,
        });
        id
    }

    /// Ids of running instances carrying `name`, in creation order.
    pub fn running_named(&self, name: &str) -> Vec<String> {
        self.state
            .lock()
            .unwrap()
            .instances
            .iter()
            .filter(|i| i.name == name && i.status == FakeInstanceStatus::Running)
            .map(|i| i.id.clone())
            .collect()
    }

    pub fn terminate_calls(&self) -> usize {
        self.state.lock().unwrap().terminate_calls
    }

    pub fn last_launch(&self) -> Option<RecordedLaunch> {
        self.state.lock().unwrap().launches.last().cloned()
    }

    /// Future launches report pending for this many state polls.
    pub fn set_ready_after(&self, polls: usize) {
        self.state.lock().unwrap().ready_after = polls;
    }

    pub fn state_polls(&self) -> usize {
        self.state.lock().unwrap().state_polls
    }

    fn push_event(&self, event: String) {
        self.events.lock().unwrap().push(event);
    }
}

impl SecurityGroupApi for FakeCloud {
    async fn find_group(&self, name: &str) -> Result<Option<RemoteGroup>> {
        let state = self.state.lock().unwrap();
        Ok(state.groups.iter().find(|(n, _)| n == name).map(|(n, rules)| RemoteGroup {
            id: format!("sg-{n}"),
            name: n.clone(),
            owner_id: OWNER_ID.to_string(),
            rules: rules
                .iter()
                .map(|r| GroupRule {
                    protocol: r.protocol.clone(),
                    range: r.range,
                    cidrs: r.cidr.iter().cloned().collect(),
                    peers: r.peer.iter().cloned().collect(),
                })
                .collect(),
        }))
    }

    async fn create_group(&self, name: &str, _description: &str) -> Result<String> {
        self.push_event(format!("create_group:{name}"));
        let mut state = self.state.lock().unwrap();
        state.groups.push((name.to_string(), Vec::new()));
        Ok(format!("sg-{name}"))
    }

    async fn delete_group(&self, group_id: &str) -> Result<()> {
        self.push_event(format!("delete_group:{group_id}"));
        let mut state = self.state.lock().unwrap();
        state.delete_group_calls += 1;
        let name = group_id.trim_start_matches("sg-").to_string();
        state.groups.retain(|(n, _)| *n != name);
        Ok(())
    }

    async fn authorize(
        &self,
        group_id: &str,
        range: PortRange,
        source: RuleSource<'_>,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let name = group_id.trim_start_matches("sg-");
        let Some((_, rules)) = state.groups.iter_mut().find(|(n, _)| n == name) else {
            anyhow::bail!("no such group {group_id}");
        };
        rules.push(match source {
            RuleSource::Cidr(cidr) => FakeRule::cidr("tcp", range, cidr),
            RuleSource::Peer(peer) => FakeRule::peer("tcp", range, &peer.owner_id, &peer.name),
        });
        Ok(())
    }

    async fn revoke(
        &self,
        group_id: &str,
        protocol: &str,
        range: PortRange,
        source: RuleSource<'_>,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        let name = group_id.trim_start_matches("sg-");
        let Some((_, rules)) = state.groups.iter_mut().find(|(n, _)| n == name) else {
            anyhow::bail!("no such group {group_id}");
        };
        let matches = |r: &FakeRule| {
            r.protocol == protocol
                && r.range == range
                && match source {
                    RuleSource::Cidr(cidr) => r.cidr.as_deref() == Some(cidr),
                    RuleSource::Peer(peer) => r.peer.as_ref() == Some(peer),
                }
        };
        let Some(position) = rules.iter().position(matches) else {
            anyhow::bail!("revoke of rule not present on {group_id}: {protocol} {range}");
        };
        rules.remove(position);
        Ok(())
    }
}

impl ComputeApi for FakeCloud {
    async fn find_running(&self, name: &str) -> Result<Option<Instance>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .instances
            .iter()
            .find(|i| i.name == name && i.status == FakeInstanceStatus::Running)
            .map(|i| Instance {
                id: i.id.clone(),
                public_address: Some("203.0.113.10".to_string()),
            }))
    }

    async fn launch(&self, request: &LaunchRequest<'_>) -> Result<Instance> {
        self.push_event(format!("launch:{}", request.name));
        let mut state = self.state.lock().unwrap();
        state.launches.push(RecordedLaunch {
            name: request.name.to_string(),
            security_groups: request.security_groups.to_vec(),
            key_name: request.key_name.to_string(),
            image_id: request.image_id.to_string(),
            size: request.size.to_string(),
        });
        state.next_instance += 1;
        let id = format!("i-{:08x}", state.next_instance);
        let pending = state.ready_after;
        state.instances.push(FakeInstance {
            id: id.clone(),
            name: request.name.to_string(),
            status: FakeInstanceStatus::Pending(pending),
        });
        Ok(Instance {
            id,
            public_address: None,
        })
    }

    async fn instance_state(&self, instance_id: &str) -> Result<InstanceState> {
        let (observed, became_ready) = {
            let mut state = self.state.lock().unwrap();
            state.state_polls += 1;
            let Some(instance) = state.instances.iter_mut().find(|i| i.id == instance_id) else {
                anyhow::bail!("no such instance {instance_id}");
            };
            match instance.status {
                FakeInstanceStatus::Pending(0) => {
                    instance.status = FakeInstanceStatus::Running;
                    (InstanceState::Running, true)
                }
                FakeInstanceStatus::Pending(left) => {
                    instance.status = FakeInstanceStatus::Pending(left - 1);
                    (InstanceState::Pending, false)
                }
                FakeInstanceStatus::Running => (InstanceState::Running, false),
                FakeInstanceStatus::Terminated => (InstanceState::Terminated, false),
            }
        };
        if became_ready {
            self.push_event(format!("ready:{instance_id}"));
        }
        Ok(observed)
    }

    async fn terminate(&self, instance_id: &str) -> Result<()> {
        self.push_event(format!("terminate:{instance_id}"));
        let mut state = self.state.lock().unwrap();
        state.terminate_calls += 1;
        if let Some(instance) = state.instances.iter_mut().find(|i| i.id == instance_id) {
            instance.status = FakeInstanceStatus::Terminated;
        }
        Ok(())
    }
}

// ── Provisioner double ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedMode {
    Direct,
    Solo { attributes: String },
}

#[derive(Debug, Clone)]
pub struct RecordedBootstrap {
    pub address: String,
    pub key_name: String,
    pub node_name: String,
    pub runlist: String,
    pub mode: RecordedMode,
}

/// Captures bootstrap invocations; optionally fails with a fixed exit code.
pub struct RecordingProvisioner {
    calls: Mutex<Vec<RecordedBootstrap>>,
    fail_code: Option<i32>,
    events: EventLog,
}

impl Default for RecordingProvisioner {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail_code: None,
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl RecordingProvisioner {
    pub fn failing(code: i32) -> Self {
        Self {
            fail_code: Some(code),
            ..Self::default()
        }
    }

    /// Record into an existing event log (typically the cloud's).
    pub fn sharing(events: EventLog) -> Self {
        Self {
            events,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn last_call(&self) -> Option<RecordedBootstrap> {
        self.calls.lock().unwrap().last().cloned()
    }
}

impl crate::application::ports::Provisioner for RecordingProvisioner {
    async fn bootstrap(&self, request: &BootstrapRequest<'_>) -> Result<()> {
        self.events
            .lock()
            .unwrap()
            .push(format!("bootstrap:{}", request.node_name));
        self.calls.lock().unwrap().push(RecordedBootstrap {
            address: request.address.to_string(),
            key_name: request.key_name.to_string(),
            node_name: request.node_name.to_string(),
            runlist: request.runlist.to_string(),
            mode: match request.mode {
                crate::application::ports::BootstrapMode::Direct => RecordedMode::Direct,
                crate::application::ports::BootstrapMode::Solo { attributes } => {
                    RecordedMode::Solo {
                        attributes: attributes.to_string(),
                    }
                }
            },
        });
        if let Some(code) = self.fail_code {
            return Err(HostError::ProvisionFailed { code }.into());
        }
        Ok(())
    }
}

// ── Reporter stub ─────────────────────────────────────────────────────────────

pub struct ReporterStub;

impl ProgressReporter for ReporterStub {
    fn step(&self, _: &str) {}
    fn success(&self, _: &str) {}
    fn warn(&self, _: &str) {}
}
