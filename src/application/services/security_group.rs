//! Security group reconciliation — converge a remote group's rule set to
//! exactly the declared spec, regardless of prior state.
//!
//! Imports only from `crate::domain` and `crate::application::ports`.

use anyhow::{Context, Result};

use crate::application::ports::{
    GroupRef, ProgressReporter, RuleSource, SecurityGroupApi, PUBLIC_CIDR,
};
use crate::domain::error::GroupError;
use crate::domain::spec::SecurityGroupSpec;

/// Converge the remote group named in `spec` to the declared rule set.
///
/// If the group exists its rules are fully replaced — every existing rule
/// is revoked (per source CIDR for self rules, per peer for peer rules)
/// before the declared set is authorized. No incremental diff is computed.
///
/// # Errors
///
/// Returns [`GroupError::PeerNotFound`] when a declared peer group does
/// not exist remotely, and propagates any provider failure.
pub async fn create(
    api: &impl SecurityGroupApi,
    reporter: &impl ProgressReporter,
    spec: &SecurityGroupSpec,
) -> Result<()> {
    let group_id = match api.find_group(&spec.name).await? {
        Some(group) => {
            strip_rules(api, &group.id, &group.rules).await?;
            group.id
        }
        None => {
            reporter.step(&format!("creating security group '{}'...", spec.name));
            api.create_group(&spec.name, &format!("{} (managed by convoy)", spec.name))
                .await
                .with_context(|| format!("creating security group '{}'", spec.name))?
        }
    };

    for range in &spec.public_ports {
        api.authorize(&group_id, *range, RuleSource::Cidr(PUBLIC_CIDR))
            .await
            .with_context(|| format!("authorizing {range} on '{}'", spec.name))?;
    }

    for (peer_name, ranges) in &spec.peer_ports {
        let peer = api
            .find_group(peer_name)
            .await?
            .ok_or_else(|| GroupError::PeerNotFound(peer_name.clone()))?;
        let peer_ref = GroupRef {
            owner_id: peer.owner_id,
            name: peer.name,
        };
        for range in ranges {
            api.authorize(&group_id, *range, RuleSource::Peer(&peer_ref))
                .await
                .with_context(|| {
                    format!("authorizing {range} from peer '{peer_name}' on '{}'", spec.name)
                })?;
        }
    }

    reporter.success(&format!("security group '{}' converged", spec.name));
    Ok(())
}

/// Delete the group if it exists; absent groups are a no-op.
///
/// # Errors
///
/// Propagates provider failures from the lookup or deletion.
pub async fn destroy(
    api: &impl SecurityGroupApi,
    reporter: &impl ProgressReporter,
    name: &str,
) -> Result<()> {
    match api.find_group(name).await? {
        Some(group) => {
            api.delete_group(&group.id)
                .await
                .with_context(|| format!("deleting security group '{name}'"))?;
            reporter.success(&format!("security group '{name}' deleted"));
        }
        None => reporter.step(&format!("security group '{name}' already absent")),
    }
    Ok(())
}

/// Revoke every rule the provider reported, leaving the group empty.
async fn strip_rules(
    api: &impl SecurityGroupApi,
    group_id: &str,
    rules: &[crate::application::ports::GroupRule],
) -> Result<()> {
    for rule in rules {
        for cidr in &rule.cidrs {
            api.revoke(group_id, &rule.protocol, rule.range, RuleSource::Cidr(cidr))
                .await
                .with_context(|| format!("revoking {} from {cidr}", rule.range))?;
        }
        for peer in &rule.peers {
            api.revoke(group_id, &rule.protocol, rule.range, RuleSource::Peer(peer))
                .await
                .with_context(|| format!("revoking {} from peer '{}'", rule.range, peer.name))?;
        }
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::application::services::test_support::{FakeCloud, FakeRule, ReporterStub};
    use crate::domain::spec::PortRange;

    fn web_spec() -> SecurityGroupSpec {
        SecurityGroupSpec {
            name: "web".into(),
            public_ports: vec![PortRange::single(80), PortRange::single(443)],
            peer_ports: BTreeMap::new(),
        }
    }

    fn declared_web_rules() -> Vec<FakeRule> {
        vec![
            FakeRule::cidr("tcp", PortRange::single(80), PUBLIC_CIDR),
            FakeRule::cidr("tcp", PortRange::single(443), PUBLIC_CIDR),
        ]
    }

    #[tokio::test]
    async fn create_builds_group_with_declared_rules() {
        let cloud = FakeCloud::default();
        create(&cloud, &ReporterStub, &web_spec()).await.unwrap();

        assert_eq!(cloud.group_rules("web"), declared_web_rules());
        assert!(cloud.group_rules("web").iter().all(|r| r.peer.is_none()));
    }

    #[tokio::test]
    async fn create_replaces_whatever_rules_existed() {
        let cloud = FakeCloud::default();
        cloud.seed_group("web", vec![
            FakeRule::cidr("tcp", PortRange::single(22), PUBLIC_CIDR),
            FakeRule::cidr("udp", PortRange::single(514), "10.0.0.0/8"),
        ]);

        create(&cloud, &ReporterStub, &web_spec()).await.unwrap();
        assert_eq!(cloud.group_rules("web"), declared_web_rules());
    }

    #[tokio::test]
    async fn create_twice_is_idempotent() {
        let cloud = FakeCloud::default();
        cloud.seed_group("web", vec![FakeRule::cidr(
            "tcp",
            PortRange { min: 9000, max: 9100 },
            PUBLIC_CIDR,
        )]);

        create(&cloud, &ReporterStub, &web_spec()).await.unwrap();
        let after_first = cloud.group_rules("web");
        create(&cloud, &ReporterStub, &web_spec()).await.unwrap();
        let after_second = cloud.group_rules("web");

        assert_eq!(after_first, declared_web_rules());
        assert_eq!(after_first, after_second);
    }

    #[tokio::test]
    async fn peer_rule_is_scoped_to_peer_identifier() {
        let cloud = FakeCloud::default();
        cloud.seed_group("web", Vec::new());

        let spec = SecurityGroupSpec {
            name: "internal".into(),
            public_ports: Vec::new(),
            peer_ports: BTreeMap::from([("web".to_string(), vec![PortRange::single(8080)])]),
        };
        create(&cloud, &ReporterStub, &spec).await.unwrap();

        let rules = cloud.group_rules("internal");
        assert_eq!(rules.len(), 1);
        let peer = rules[0].peer.clone().unwrap();
        assert_eq!(peer.name, "web");
        assert_eq!(peer.owner_id, cloud.owner_id());
        assert_eq!(rules[0].range, PortRange::single(8080));
    }

    #[tokio::test]
    async fn missing_peer_group_is_a_hard_failure() {
        let cloud = FakeCloud::default();
        let spec = SecurityGroupSpec {
            name: "internal".into(),
            public_ports: Vec::new(),
            peer_ports: BTreeMap::from([("web".to_string(), vec![PortRange::single(8080)])]),
        };

        let err = create(&cloud, &ReporterStub, &spec).await.unwrap_err();
        let group_err = err.downcast_ref::<GroupError>().unwrap();
        assert!(matches!(group_err, GroupError::PeerNotFound(name) if name == "web"));
    }

    #[tokio::test]
    async fn destroy_deletes_existing_group() {
        let cloud = FakeCloud::default();
        cloud.seed_group("web", Vec::new());

        destroy(&cloud, &ReporterStub, "web").await.unwrap();
        assert!(!cloud.group_exists("web"));
        assert_eq!(cloud.delete_group_calls(), 1);
    }

    #[tokio::test]
    async fn destroy_of_absent_group_is_a_noop() {
        let cloud = FakeCloud::default();
        destroy(&cloud, &ReporterStub, "web").await.unwrap();
        assert_eq!(cloud.delete_group_calls(), 0);
    }
}
