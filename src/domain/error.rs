//! Typed domain error enums.
//!
//! This module has zero imports from `crate::infra`, `crate::application`,
//! `tokio`, or the AWS SDK. All error types implement `thiserror::Error`
//! and convert to `anyhow::Error` via the `?` operator.

use thiserror::Error;

// ── Security group errors ─────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum GroupError {
    #[error("peer security group '{0}' does not exist. Create it first: convoy run security:{0}:create")]
    PeerNotFound(String),
}

// ── Host errors ───────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum HostError {
    #[error("no running instance named '{0}'. Run 'convoy run host:{0}:spinup' first.")]
    NotRunning(String),

    #[error("instance '{instance_id}' not ready after {waited_secs}s")]
    ReadinessTimeout { instance_id: String, waited_secs: u64 },

    #[error("instance '{instance_id}' entered unexpected state '{state}' while waiting for it to start")]
    UnexpectedState { instance_id: String, state: String },

    #[error("instance '{0}' has no public address to provision against")]
    NoAddress(String),

    #[error("host '{host}' does not set '{option}' and the manifest declares no default for it")]
    MissingOption { host: String, option: &'static str },

    #[error("host '{0}' sets knife_solo but no 'attributes' file")]
    MissingAttributes(String),

    #[error("provisioning command exited with status {code}")]
    ProvisionFailed { code: i32 },
}

// ── Graph errors ──────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("unknown target '{0}'. Run 'convoy list' to see registered targets.")]
    UnknownTarget(String),
}

// ── Credential errors ─────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("no usable AWS credentials for profile '{0}'. Check ~/.aws/credentials or AWS_PROFILE.")]
    Missing(String),
}
