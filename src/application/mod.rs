//! Application layer — port trait definitions and use-case orchestration.
//!
//! This module depends only on `crate::domain` — never on `crate::infra`
//! or `crate::output`.

pub mod ports;
pub mod services;

#[allow(unused_imports)]
pub use ports::{
    BootstrapMode, BootstrapRequest, CloudApi, ComputeApi, GroupRef, GroupRule, Instance,
    InstanceState, LaunchRequest, ProgressReporter, Provisioner, RemoteGroup, RuleSource,
    SecurityGroupApi, PUBLIC_CIDR,
};
