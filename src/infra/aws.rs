//! AWS configuration context — loads SDK configuration once for an
//! explicitly selected credential profile and hands out service clients.
//!
//! The profile is threaded in from the CLI at startup; nothing deeper in
//! the stack performs ambient credential lookup.

use anyhow::Result;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use tracing::debug;

use crate::domain::error::CredentialError;
use crate::infra::ec2::Ec2Cloud;

/// Loaded SDK configuration for one profile and region.
pub struct AwsContext {
    config: SdkConfig,
}

impl AwsContext {
    /// Load configuration and verify the profile yields usable credentials
    /// with a single STS identity call.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::Missing`] when the identity check fails.
    pub async fn connect(profile: &str, region: &str) -> Result<Self> {
        let config = aws_config::defaults(BehaviorVersion::latest())
            .profile_name(profile)
            .region(Region::new(region.to_string()))
            .load()
            .await;

        let sts = aws_sdk_sts::Client::new(&config);
        let identity = sts.get_caller_identity().send().await.map_err(|err| {
            debug!(error = %err, profile, "credential check failed");
            CredentialError::Missing(profile.to_string())
        })?;
        debug!(
            account = identity.account().unwrap_or("unknown"),
            profile, region, "credentials verified"
        );

        Ok(Self { config })
    }

    /// Create the EC2 cloud adapter from this context.
    #[must_use]
    pub fn ec2(&self) -> Ec2Cloud {
        Ec2Cloud::new(aws_sdk_ec2::Client::new(&self.config))
    }
}
