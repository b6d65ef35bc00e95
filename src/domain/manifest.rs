//! Manifest loading — the declaration front-end binding.
//!
//! A `convoy.yaml` file declares security groups and hosts; entries are
//! registered into the resource graph in file order. The loader only
//! parses and forwards — all semantics live in the services.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::domain::spec::{HostSpec, ProfileDefaults, SecurityGroupSpec};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    /// Provider region; the CLI flag takes precedence.
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub defaults: ProfileDefaults,
    #[serde(default)]
    pub security: Vec<SecurityGroupSpec>,
    #[serde(default)]
    pub hosts: Vec<HostSpec>,
}

impl Manifest {
    /// Read and parse a manifest file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid YAML.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading manifest {}", path.display()))?;
        serde_yaml::from_str(&text)
            .with_context(|| format!("parsing manifest {}", path.display()))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io::Write as _;

    use super::*;
    use crate::domain::spec::PortRange;

    const SAMPLE: &str = "\
region: us-west-2
defaults:
  key_name: staging-deploy
  image_id: ami-0123456789abcdef0
  size: t3.small
security:
  - name: web
    public_ports: [80, 443, \"8000-8999\"]
  - name: internal
    peer_ports:
      web: [8080]
hosts:
  - name: app
    security_groups: [web]
    runlist: \"role[app]\"
  - name: batch
    security_groups: [web, internal]
    runlist: \"role[batch]\"
    knife_solo: true
    attributes: nodes/batch.json
    size: c5.large
";

    fn write_manifest(text: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        file
    }

    #[test]
    fn parses_full_manifest() {
        let file = write_manifest(SAMPLE);
        let manifest = Manifest::load(file.path()).unwrap();

        assert_eq!(manifest.region.as_deref(), Some("us-west-2"));
        assert_eq!(manifest.defaults.key_name.as_deref(), Some("staging-deploy"));

        assert_eq!(manifest.security.len(), 2);
        let web = &manifest.security[0];
        assert_eq!(web.name, "web");
        assert_eq!(
            web.public_ports,
            vec![
                PortRange::single(80),
                PortRange::single(443),
                PortRange { min: 8000, max: 8999 },
            ]
        );
        assert!(web.peer_ports.is_empty());

        let internal = &manifest.security[1];
        assert_eq!(internal.peer_ports["web"], vec![PortRange::single(8080)]);

        assert_eq!(manifest.hosts.len(), 2);
        let app = &manifest.hosts[0];
        assert_eq!(app.security_groups, vec!["web"]);
        assert_eq!(app.runlist, "role[app]");
        assert!(!app.options.knife_solo);
        assert!(app.options.size.is_none());

        let batch = &manifest.hosts[1];
        assert!(batch.options.knife_solo);
        assert_eq!(batch.options.attributes.as_deref(), Some("nodes/batch.json"));
        assert_eq!(batch.options.size.as_deref(), Some("c5.large"));
    }

    #[test]
    fn empty_sections_default() {
        let file = write_manifest("security: []\n");
        let manifest = Manifest::load(file.path()).unwrap();
        assert!(manifest.security.is_empty());
        assert!(manifest.hosts.is_empty());
        assert!(manifest.region.is_none());
        assert!(manifest.defaults.key_name.is_none());
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = Manifest::load(Path::new("/nonexistent/convoy.yaml")).unwrap_err();
        assert!(err.to_string().contains("reading manifest"));
    }

    #[test]
    fn unknown_top_level_key_is_rejected() {
        let file = write_manifest("fleet: []\n");
        assert!(Manifest::load(file.path()).is_err());
    }
}
