// SPDX-License-Identifier: MIT

//! Offload configuration - YAML loading, environment overrides and validation
//!
//! The configuration is an explicit value handed to backend selection. Nothing here
//! is cached process-wide, so tests can build whatever configuration they need.

use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::error::OffloadError;

pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;
pub const DEFAULT_CHUNK_THRESHOLD: usize = 2 * 1024 * 1024;
pub const DEFAULT_LMO_THRESHOLD: usize = 256 << 10;
pub const DEFAULT_DEADLINE_SECS: u64 = 120;

/// Root configuration for both backends
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OffloadConfig {
    #[serde(default)]
    pub remote: RemoteStoreConfig,
    #[serde(default)]
    pub local: LocalStoreConfig,
}

/// Remote chunk store settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RemoteStoreConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Base URL of the chunk host, e.g. `http://127.0.0.1:7420`
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_chunk_threshold")]
    pub threshold: usize,
    /// Maximum bytes per chunk, both directions
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Deadline for one whole store or fetch sequence
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,
}

/// Local file-backed store settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LocalStoreConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_local_root")]
    pub root: PathBuf,
    /// Owner scope; records live under `<root>/<tenant>/`
    #[serde(default = "default_tenant")]
    pub tenant: String,
    #[serde(default = "default_lmo_threshold")]
    pub threshold: usize,
    #[serde(default = "default_deadline_secs")]
    pub deadline_secs: u64,
}

fn default_chunk_threshold() -> usize {
    DEFAULT_CHUNK_THRESHOLD
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_lmo_threshold() -> usize {
    DEFAULT_LMO_THRESHOLD
}

fn default_deadline_secs() -> u64 {
    DEFAULT_DEADLINE_SECS
}

fn default_local_root() -> PathBuf {
    env::temp_dir().join("offload")
}

fn default_tenant() -> String {
    "default".to_string()
}

impl Default for RemoteStoreConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            threshold: DEFAULT_CHUNK_THRESHOLD,
            chunk_size: DEFAULT_CHUNK_SIZE,
            deadline_secs: DEFAULT_DEADLINE_SECS,
        }
    }
}

impl RemoteStoreConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }
}

impl Default for LocalStoreConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            root: default_local_root(),
            tenant: default_tenant(),
            threshold: DEFAULT_LMO_THRESHOLD,
            deadline_secs: DEFAULT_DEADLINE_SECS,
        }
    }
}

impl LocalStoreConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.deadline_secs)
    }

    /// Directory holding this tenant's records
    pub fn tenant_dir(&self) -> PathBuf {
        self.root.join(&self.tenant)
    }
}

/// A tenant names a single directory under the local root
pub fn validate_tenant(tenant: &str) -> Result<(), OffloadError> {
    if tenant.is_empty()
        || tenant == "."
        || tenant.contains("..")
        || tenant.contains('/')
        || tenant.contains('\\')
    {
        return Err(OffloadError::config(format!("invalid tenant id: {:?}", tenant)));
    }
    Ok(())
}

/// What the host said it can do
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub remote_store: bool,
    pub local_store: bool,
}

impl OffloadConfig {
    /// Load a configuration from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, OffloadError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| OffloadError::config(format!("{}: {}", path.display(), e)))?;
        Self::parse_yaml(&content)
    }

    /// Parse a configuration from a YAML string
    pub fn parse_yaml(content: &str) -> Result<Self, OffloadError> {
        serde_yaml::from_str(content).map_err(|e| OffloadError::config(e.to_string()))
    }

    /// Apply `OFFLOAD_*` environment overrides
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(endpoint) = env::var("OFFLOAD_REMOTE_ENDPOINT") {
            self.remote.endpoint = Some(endpoint);
            self.remote.enabled = true;
        }
        if let Ok(root) = env::var("OFFLOAD_LOCAL_ROOT") {
            self.local.root = PathBuf::from(root);
        }
        if let Ok(tenant) = env::var("OFFLOAD_TENANT") {
            self.local.tenant = tenant;
        }
        self
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            remote_store: self.remote.enabled,
            local_store: self.local.enabled,
        }
    }

    pub fn validate(&self) -> Result<(), OffloadError> {
        if self.remote.enabled {
            if self.remote.endpoint.as_deref().map_or(true, str::is_empty) {
                return Err(OffloadError::config(
                    "remote store enabled without an endpoint",
                ));
            }
            if self.remote.threshold == 0 || self.remote.chunk_size == 0 {
                return Err(OffloadError::config(
                    "remote threshold and chunk_size must be positive",
                ));
            }
            if self.remote.deadline_secs == 0 {
                return Err(OffloadError::config("remote deadline_secs must be positive"));
            }
        }

        if self.local.enabled {
            if self.local.threshold == 0 {
                return Err(OffloadError::config("local threshold must be positive"));
            }
            if self.local.deadline_secs == 0 {
                return Err(OffloadError::config("local deadline_secs must be positive"));
            }
            validate_tenant(&self.local.tenant)?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = OffloadConfig::default();
        assert_eq!(config.remote.threshold, 2 * 1024 * 1024);
        assert_eq!(config.remote.chunk_size, 1024 * 1024);
        assert_eq!(config.remote.deadline(), Duration::from_secs(120));
        assert_eq!(config.local.threshold, 256 * 1024);
        assert_eq!(config.capabilities(), Capabilities::default());
    }

    #[test]
    fn test_parse_full_yaml() {
        let yaml = r#"
remote:
  enabled: true
  endpoint: http://127.0.0.1:7420
  threshold: 4096
  chunk_size: 1024
  deadline_secs: 5
local:
  enabled: true
  root: /var/tmp/offload
  tenant: robot-7
  threshold: 512
"#;
        let config = OffloadConfig::parse_yaml(yaml).unwrap();
        assert!(config.remote.enabled);
        assert_eq!(config.remote.endpoint.as_deref(), Some("http://127.0.0.1:7420"));
        assert_eq!(config.remote.chunk_size, 1024);
        assert_eq!(config.remote.deadline(), Duration::from_secs(5));
        assert_eq!(
            config.local.tenant_dir(),
            PathBuf::from("/var/tmp/offload/robot-7")
        );
        // Unset fields fall back to defaults
        assert_eq!(config.local.deadline_secs, DEFAULT_DEADLINE_SECS);
        assert_eq!(
            config.capabilities(),
            Capabilities {
                remote_store: true,
                local_store: true
            }
        );
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_empty_yaml_uses_defaults() {
        let config = OffloadConfig::parse_yaml("{}").unwrap();
        assert!(!config.remote.enabled);
        assert!(!config.local.enabled);
        config.validate().unwrap();
    }

    #[test]
    fn test_invalid_yaml() {
        let err = OffloadConfig::parse_yaml("remote: [").unwrap_err();
        assert!(matches!(err, OffloadError::Config(_)));
    }

    #[test]
    fn test_remote_without_endpoint_is_rejected() {
        let mut config = OffloadConfig::default();
        config.remote.enabled = true;
        assert!(matches!(config.validate(), Err(OffloadError::Config(_))));
    }

    #[test]
    fn test_zero_chunk_size_is_rejected() {
        let mut config = OffloadConfig::default();
        config.remote.enabled = true;
        config.remote.endpoint = Some("http://localhost:1".into());
        config.remote.chunk_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tenant_traversal_is_rejected() {
        for tenant in ["", "..", "../etc", "a/b", "a\\b"] {
            let mut config = OffloadConfig::default();
            config.local.enabled = true;
            config.local.tenant = tenant.to_string();
            assert!(config.validate().is_err(), "tenant {:?} accepted", tenant);
        }
    }
}
