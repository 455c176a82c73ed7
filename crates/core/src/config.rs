//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup from a static JSON file and then passed
//! into services as `Arc<CoreConfig>`. Request handling never reads environment variables.

use crate::constants::{
    CONFIG_PATH_ENV, DEFAULT_CONFIG_PATH, DEFAULT_REQUEST_TIMEOUT_SECS, DEFAULT_SYNOPSIS_MAX,
    DEFAULT_TOKEN_TTL_SECS,
};
use crate::{CdrError, CdrResult};
use fhir::DiscoveryConfig;
use openehr::{HeadingRegistry, HostConfig};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// On-disk shape of the configuration file.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub openehr: OpenEhrSection,
    pub discovery: DiscoverySection,
    pub headings: Vec<String>,
    #[serde(default = "default_synopsis_max")]
    pub synopsis_max: usize,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpenEhrSection {
    pub default_host: String,
    pub hosts: BTreeMap<String, HostConfig>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DiscoverySection {
    pub service: DiscoveryConfig,
    #[serde(default = "default_token_ttl_secs")]
    pub token_ttl_secs: u64,
    /// Heading name -> FHIR resource name merged into that heading.
    #[serde(default)]
    pub headings: BTreeMap<String, String>,
}

fn default_synopsis_max() -> usize {
    DEFAULT_SYNOPSIS_MAX
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_token_ttl_secs() -> u64 {
    DEFAULT_TOKEN_TTL_SECS
}

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    openehr_hosts: BTreeMap<String, HostConfig>,
    default_host: String,
    discovery: DiscoveryConfig,
    token_ttl: Duration,
    discovery_headings: BTreeMap<String, String>,
    headings: Vec<String>,
    synopsis_max: usize,
    request_timeout: Duration,
}

impl CoreConfig {
    /// Create a validated `CoreConfig` from a parsed configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`CdrError::Config`] if:
    /// - no openEHR hosts are configured, or a host name contains `_`,
    /// - the default host is not one of the configured hosts,
    /// - no headings are enabled,
    /// - a discovery heading is not an enabled heading,
    /// - the token TTL is zero.
    pub fn new(file: ConfigFile) -> CdrResult<Self> {
        if file.openehr.hosts.is_empty() {
            return Err(CdrError::Config("at least one openEHR host is required".into()));
        }

        if let Some(bad) = file.openehr.hosts.keys().find(|h| h.contains('_')) {
            return Err(CdrError::Config(format!(
                "openEHR host name {bad} must not contain '_'"
            )));
        }

        if !file.openehr.hosts.contains_key(&file.openehr.default_host) {
            return Err(CdrError::Config(format!(
                "default host {} is not a configured openEHR host",
                file.openehr.default_host
            )));
        }

        if file.headings.is_empty() {
            return Err(CdrError::Config("at least one heading must be enabled".into()));
        }

        if let Some(bad) = file
            .discovery
            .headings
            .keys()
            .find(|h| !file.headings.contains(h))
        {
            return Err(CdrError::Config(format!(
                "discovery heading {bad} is not an enabled heading"
            )));
        }

        if file.discovery.token_ttl_secs == 0 {
            return Err(CdrError::Config("token_ttl_secs must be greater than zero".into()));
        }

        Ok(Self {
            openehr_hosts: file.openehr.hosts,
            default_host: file.openehr.default_host,
            discovery: file.discovery.service,
            token_ttl: Duration::from_secs(file.discovery.token_ttl_secs),
            discovery_headings: file.discovery.headings,
            headings: file.headings,
            synopsis_max: file.synopsis_max,
            request_timeout: Duration::from_secs(file.request_timeout_secs),
        })
    }

    /// Parse and validate configuration JSON.
    pub fn from_json_str(json: &str) -> CdrResult<Self> {
        let file: ConfigFile = serde_json::from_str(json).map_err(CdrError::ConfigParse)?;
        Self::new(file)
    }

    /// Read, parse and validate a configuration file.
    pub fn load(path: &Path) -> CdrResult<Self> {
        let text = std::fs::read_to_string(path).map_err(CdrError::ConfigRead)?;
        Self::from_json_str(&text)
    }

    /// Check every enabled heading has a definition in `registry`.
    pub fn check_headings(&self, registry: &HeadingRegistry) -> CdrResult<()> {
        match self.headings.iter().find(|h| !registry.contains(h)) {
            Some(missing) => Err(CdrError::Config(format!(
                "enabled heading {missing} has no definition"
            ))),
            None => Ok(()),
        }
    }

    pub fn openehr_hosts(&self) -> &BTreeMap<String, HostConfig> {
        &self.openehr_hosts
    }

    /// Names of the configured openEHR hosts.
    pub fn host_names(&self) -> impl Iterator<Item = &str> {
        self.openehr_hosts.keys().map(String::as_str)
    }

    /// Host that new records are written to.
    pub fn default_host(&self) -> &str {
        &self.default_host
    }

    pub fn discovery(&self) -> &DiscoveryConfig {
        &self.discovery
    }

    pub fn token_ttl(&self) -> Duration {
        self.token_ttl
    }

    /// Heading name -> FHIR resource name for discovery merging.
    pub fn discovery_headings(&self) -> &BTreeMap<String, String> {
        &self.discovery_headings
    }

    pub fn headings(&self) -> &[String] {
        &self.headings
    }

    pub fn is_heading_enabled(&self, heading: &str) -> bool {
        self.headings.iter().any(|h| h == heading)
    }

    pub fn synopsis_max(&self) -> usize {
        self.synopsis_max
    }

    pub fn request_timeout(&self) -> Duration {
        self.request_timeout
    }
}

/// Resolve the configuration file path from an optional `CDR_CONFIG` value.
pub fn resolve_config_path(value: Option<String>) -> PathBuf {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Name of the environment variable read by [`resolve_config_path`] callers.
pub fn config_path_env() -> &'static str {
    CONFIG_PATH_ENV
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    pub(crate) const SAMPLE: &str = r#"{
        "openehr": {
            "default_host": "ethercis",
            "hosts": {
                "ethercis": { "url": "http://ethercis:8080", "username": "guest", "password": "guest" },
                "marand": { "url": "https://marand.example.org", "username": "u", "password": "p" }
            }
        },
        "discovery": {
            "service": {
                "fhir_url": "http://discovery:8080",
                "auth_url": "http://auth:8080/token",
                "client_id": "cdr",
                "client_secret": "secret"
            },
            "headings": { "problems": "Condition" }
        },
        "headings": ["allergies", "problems"]
    }"#;

    #[test]
    fn parses_sample_with_defaults() {
        let cfg = CoreConfig::from_json_str(SAMPLE).expect("valid config");
        assert_eq!(cfg.default_host(), "ethercis");
        assert_eq!(cfg.host_names().collect::<Vec<_>>(), vec!["ethercis", "marand"]);
        assert_eq!(cfg.token_ttl(), Duration::from_secs(DEFAULT_TOKEN_TTL_SECS));
        assert_eq!(cfg.synopsis_max(), DEFAULT_SYNOPSIS_MAX);
        assert_eq!(
            cfg.request_timeout(),
            Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS)
        );
        assert!(cfg.is_heading_enabled("problems"));
        assert!(!cfg.is_heading_enabled("contacts"));
    }

    #[test]
    fn rejects_unknown_default_host() {
        let json = SAMPLE.replace(r#""default_host": "ethercis""#, r#""default_host": "nowhere""#);
        let err = CoreConfig::from_json_str(&json).expect_err("should reject");
        assert!(matches!(err, CdrError::Config(msg) if msg.contains("nowhere")));
    }

    #[test]
    fn rejects_discovery_heading_that_is_not_enabled() {
        let json = SAMPLE.replace(r#""problems": "Condition""#, r#""vaccinations": "Immunization""#);
        let err = CoreConfig::from_json_str(&json).expect_err("should reject");
        assert!(matches!(err, CdrError::Config(msg) if msg.contains("vaccinations")));
    }

    #[test]
    fn rejects_unknown_keys() {
        let json = SAMPLE.replacen('{', r#"{ "unexpected": 1,"#, 1);
        let err = CoreConfig::from_json_str(&json).expect_err("should reject");
        assert!(matches!(err, CdrError::ConfigParse(_)));
    }

    #[test]
    fn check_headings_against_registry() {
        let cfg = CoreConfig::from_json_str(SAMPLE).expect("valid config");
        let registry = HeadingRegistry::builtin().expect("builtin headings");
        cfg.check_headings(&registry).expect("all headings defined");

        let empty = HeadingRegistry::default();
        assert!(cfg.check_headings(&empty).is_err());
    }

    #[test]
    fn loads_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(SAMPLE.as_bytes()).expect("write config");

        let cfg = CoreConfig::load(file.path()).expect("load config");
        assert_eq!(cfg.discovery().client_id, "cdr");
        assert_eq!(cfg.discovery_headings().get("problems").map(String::as_str), Some("Condition"));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let err = CoreConfig::load(Path::new("/definitely/not/here.json")).expect_err("missing");
        assert!(matches!(err, CdrError::ConfigRead(_)));
    }

    #[test]
    fn resolve_config_path_falls_back_to_default() {
        assert_eq!(resolve_config_path(None), PathBuf::from(DEFAULT_CONFIG_PATH));
        assert_eq!(resolve_config_path(Some("  ".into())), PathBuf::from(DEFAULT_CONFIG_PATH));
        assert_eq!(
            resolve_config_path(Some("/etc/cdr.json".into())),
            PathBuf::from("/etc/cdr.json")
        );
    }
}
