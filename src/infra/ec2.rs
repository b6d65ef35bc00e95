//! EC2 implementation of the cloud port traits.
//!
//! Remote state is never cached — every operation issues fresh describe
//! calls, keeping the provider the single source of truth.

use anyhow::{Context, Result};
use aws_sdk_ec2::types::{
    Filter, InstanceStateName, InstanceType, IpPermission, IpRange, ResourceType, Tag,
    TagSpecification, UserIdGroupPair,
};
use tracing::{debug, info};

use crate::application::ports::{
    ComputeApi, GroupRef, GroupRule, Instance, InstanceState, LaunchRequest, RemoteGroup,
    RuleSource, SecurityGroupApi,
};
use crate::domain::spec::PortRange;

/// Cloud adapter backed by `aws-sdk-ec2`.
pub struct Ec2Cloud {
    client: aws_sdk_ec2::Client,
}

impl Ec2Cloud {
    #[must_use]
    pub fn new(client: aws_sdk_ec2::Client) -> Self {
        Self { client }
    }
}

fn port(value: Option<i32>) -> u16 {
    value.and_then(|p| u16::try_from(p).ok()).unwrap_or(0)
}

/// Scope a permission to one rule source. VPC groups report peers by id
/// rather than name; `GroupRef::name` carries whichever handle the
/// provider gave us, so route `sg-` handles through the id field.
fn scoped_permission(protocol: &str, range: PortRange, source: RuleSource<'_>) -> IpPermission {
    let builder = IpPermission::builder()
        .ip_protocol(protocol)
        .from_port(i32::from(range.min))
        .to_port(i32::from(range.max));
    match source {
        RuleSource::Cidr(cidr) => builder.ip_ranges(IpRange::builder().cidr_ip(cidr).build()),
        RuleSource::Peer(peer) => {
            let pair = UserIdGroupPair::builder().user_id(&peer.owner_id);
            let pair = if peer.name.starts_with("sg-") {
                pair.group_id(&peer.name)
            } else {
                pair.group_name(&peer.name)
            };
            builder.user_id_group_pairs(pair.build())
        }
    }
    .build()
}

impl SecurityGroupApi for Ec2Cloud {
    async fn find_group(&self, name: &str) -> Result<Option<RemoteGroup>> {
        let response = self
            .client
            .describe_security_groups()
            .filters(Filter::builder().name("group-name").values(name).build())
            .send()
            .await
            .context("describing security groups")?;

        let Some(group) = response.security_groups().first() else {
            return Ok(None);
        };

        let rules = group
            .ip_permissions()
            .iter()
            .map(|permission| GroupRule {
                protocol: permission.ip_protocol().unwrap_or("tcp").to_string(),
                range: PortRange {
                    min: port(permission.from_port()),
                    max: port(permission.to_port()),
                },
                cidrs: permission
                    .ip_ranges()
                    .iter()
                    .filter_map(|r| r.cidr_ip().map(String::from))
                    .collect(),
                peers: permission
                    .user_id_group_pairs()
                    .iter()
                    .filter_map(|pair| {
                        let owner_id = pair.user_id()?.to_string();
                        let name = pair.group_name().or(pair.group_id())?.to_string();
                        Some(GroupRef { owner_id, name })
                    })
                    .collect(),
            })
            .collect();

        Ok(Some(RemoteGroup {
            id: group.group_id().context("security group has no id")?.to_string(),
            name: group.group_name().unwrap_or(name).to_string(),
            owner_id: group.owner_id().context("security group has no owner")?.to_string(),
            rules,
        }))
    }

    async fn create_group(&self, name: &str, description: &str) -> Result<String> {
        info!(name, "creating security group");
        let response = self
            .client
            .create_security_group()
            .group_name(name)
            .description(description)
            .send()
            .await
            .context("creating security group")?;
        response
            .group_id()
            .context("no security group id in response")
            .map(String::from)
    }

    async fn delete_group(&self, group_id: &str) -> Result<()> {
        info!(group_id, "deleting security group");
        self.client
            .delete_security_group()
            .group_id(group_id)
            .send()
            .await
            .context("deleting security group")?;
        Ok(())
    }

    async fn authorize(
        &self,
        group_id: &str,
        range: PortRange,
        source: RuleSource<'_>,
    ) -> Result<()> {
        debug!(group_id, %range, "authorizing ingress");
        self.client
            .authorize_security_group_ingress()
            .group_id(group_id)
            .ip_permissions(scoped_permission("tcp", range, source))
            .send()
            .await
            .context("authorizing ingress rule")?;
        Ok(())
    }

    async fn revoke(
        &self,
        group_id: &str,
        protocol: &str,
        range: PortRange,
        source: RuleSource<'_>,
    ) -> Result<()> {
        debug!(group_id, %range, protocol, "revoking ingress");
        self.client
            .revoke_security_group_ingress()
            .group_id(group_id)
            .ip_permissions(scoped_permission(protocol, range, source))
            .send()
            .await
            .context("revoking ingress rule")?;
        Ok(())
    }
}

impl ComputeApi for Ec2Cloud {
    async fn find_running(&self, name: &str) -> Result<Option<Instance>> {
        let response = self
            .client
            .describe_instances()
            .filters(Filter::builder().name("tag:Name").values(name).build())
            .filters(
                Filter::builder()
                    .name("instance-state-name")
                    .values("running")
                    .build(),
            )
            .send()
            .await
            .context("describing instances")?;

        // When the provider holds several, only the first returned is
        // addressed.
        Ok(response
            .reservations()
            .first()
            .and_then(|r| r.instances().first())
            .and_then(|i| i.instance_id().map(|id| (id, i)))
            .map(|(id, i)| Instance {
                id: id.to_string(),
                public_address: i.public_ip_address().map(String::from),
            }))
    }

    async fn launch(&self, request: &LaunchRequest<'_>) -> Result<Instance> {
        let instance_type: InstanceType = request
            .size
            .parse()
            .map_err(|_| anyhow::anyhow!("invalid instance size: {}", request.size))?;

        info!(
            name = request.name,
            image = request.image_id,
            size = request.size,
            "launching instance"
        );

        let response = self
            .client
            .run_instances()
            .image_id(request.image_id)
            .instance_type(instance_type)
            .key_name(request.key_name)
            .min_count(1)
            .max_count(1)
            .set_security_groups(Some(request.security_groups.to_vec()))
            .tag_specifications(
                TagSpecification::builder()
                    .resource_type(ResourceType::Instance)
                    .tags(Tag::builder().key("Name").value(request.name).build())
                    .build(),
            )
            .send()
            .await
            .context("launching instance")?;

        let instance = response.instances().first().context("no instance returned")?;
        let id = instance.instance_id().context("no instance id")?.to_string();
        info!(instance_id = %id, "instance launched");

        Ok(Instance {
            id,
            public_address: instance.public_ip_address().map(String::from),
        })
    }

    async fn instance_state(&self, instance_id: &str) -> Result<InstanceState> {
        let response = self
            .client
            .describe_instances()
            .instance_ids(instance_id)
            .send()
            .await
            .context("describing instance state")?;

        let instance = response
            .reservations()
            .first()
            .and_then(|r| r.instances().first())
            .with_context(|| format!("instance {instance_id} not found"))?;

        let state = match instance.state().and_then(|s| s.name()) {
            Some(InstanceStateName::Running) => InstanceState::Running,
            Some(InstanceStateName::Pending) | None => InstanceState::Pending,
            Some(InstanceStateName::Terminated) => InstanceState::Terminated,
            Some(other) => InstanceState::Other(other.as_str().to_string()),
        };
        debug!(instance_id, ?state, "observed instance state");
        Ok(state)
    }

    async fn terminate(&self, instance_id: &str) -> Result<()> {
        info!(instance_id, "terminating instance");
        self.client
            .terminate_instances()
            .instance_ids(instance_id)
            .send()
            .await
            .context("terminating instance")?;
        Ok(())
    }
}
