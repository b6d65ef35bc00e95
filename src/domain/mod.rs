//! Domain layer — pure value types, manifest parsing, and typed errors.
//!
//! This module has zero imports from `crate::infra`, `crate::application`,
//! `tokio`, `std::process`, or the AWS SDK.

pub mod error;
pub mod manifest;
pub mod spec;

pub use error::{CredentialError, GraphError, GroupError, HostError};
pub use manifest::Manifest;
pub use spec::{HostOptions, HostSpec, PortRange, ProfileDefaults, SecurityGroupSpec};
