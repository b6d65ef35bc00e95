//! Resource specifications — the declared shape of the fleet.
//!
//! Specs are immutable value objects built once at declaration time.
//! Port normalization happens here, at the deserialization boundary, so
//! everything downstream works with a single `PortRange` value type.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, Deserializer};
use serde::Deserialize;

/// An inclusive TCP port interval. A scalar port `p` is the canonical
/// form `{p, p}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PortRange {
    pub min: u16,
    pub max: u16,
}

impl PortRange {
    /// Build a range, rejecting `min > max`.
    ///
    /// # Errors
    ///
    /// Returns an error describing the inverted bounds.
    pub fn new(min: u16, max: u16) -> Result<Self, String> {
        if min > max {
            return Err(format!("invalid port range {min}-{max}: min exceeds max"));
        }
        Ok(Self { min, max })
    }

    /// Canonical form of a scalar port.
    #[must_use]
    pub fn single(port: u16) -> Self {
        Self { min: port, max: port }
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.min == self.max {
            write!(f, "{}", self.min)
        } else {
            write!(f, "{}-{}", self.min, self.max)
        }
    }
}

/// Accepts either a bare port (`443`) or an interval string (`"8000-8999"`).
impl<'de> Deserialize<'de> for PortRange {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Scalar(u16),
            Interval(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Scalar(port) => Ok(Self::single(port)),
            Raw::Interval(text) => parse_interval(&text).map_err(de::Error::custom),
        }
    }
}

fn parse_interval(text: &str) -> Result<PortRange, String> {
    let parse_port = |part: &str| {
        part.trim()
            .parse::<u16>()
            .map_err(|_| format!("invalid port '{part}' in range '{text}'"))
    };
    match text.split_once('-') {
        Some((lo, hi)) => PortRange::new(parse_port(lo)?, parse_port(hi)?),
        None => Ok(PortRange::single(parse_port(text)?)),
    }
}

/// Declared rule set for one security group. The name is the sole
/// identity: re-declaring a name overwrites the prior spec.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SecurityGroupSpec {
    pub name: String,
    /// Ranges opened to the internet.
    #[serde(default)]
    pub public_ports: Vec<PortRange>,
    /// Ranges opened to traffic from another named group.
    #[serde(default)]
    pub peer_ports: BTreeMap<String, Vec<PortRange>>,
}

/// Declared shape of one compute host.
#[derive(Debug, Clone, Deserialize)]
pub struct HostSpec {
    pub name: String,
    /// Security group names, referenced not owned.
    pub security_groups: Vec<String>,
    /// Opaque run list handed to the provisioning tool. May be empty.
    #[serde(default)]
    pub runlist: String,
    #[serde(flatten)]
    pub options: HostOptions,
}

/// Per-host overrides; unset fields fall back to [`ProfileDefaults`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct HostOptions {
    #[serde(default)]
    pub key_name: Option<String>,
    #[serde(default)]
    pub image_id: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
    /// Bootstrap with a local attributes file instead of a Chef server.
    #[serde(default)]
    pub knife_solo: bool,
    /// Attributes filename; meaningful only when `knife_solo` is set.
    #[serde(default)]
    pub attributes: Option<String>,
}

/// Manifest-level fallbacks for host options.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProfileDefaults {
    #[serde(default)]
    pub key_name: Option<String>,
    #[serde(default)]
    pub image_id: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
}
