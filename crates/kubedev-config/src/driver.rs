//! Kubernetes driver configuration
//!
//! Located at `~/.config/kubedev/config.toml`. Every field can also be set
//! through the environment variables the workspace manager passes to providers
//! (`KUBERNETES_NAMESPACE`, `NODE_SELECTOR`, ...); those win over the file.

use crate::{ConfigError, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Driver settings, read-only for the lifetime of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KubernetesConfig {
    /// kubectl binary
    pub kubectl_path: String,
    /// kubeconfig context
    pub context: Option<String>,
    /// Path to a kubeconfig file
    pub kubeconfig: Option<String>,
    /// Namespace for all resources (kubectl default when unset)
    pub namespace: Option<String>,
    /// Create the namespace before the first resource
    pub create_namespace: bool,
    /// Service account attached to the pod, created if missing
    pub service_account: Option<String>,
    /// `key=value[,key=value]` node selector
    pub node_selector: Option<String>,
    /// `requests.cpu=1,limits.memory=2Gi` style resource string
    pub resources: Option<String>,
    /// Requested size of the persistent volume claim
    pub disk_size: String,
    /// Storage class for the claim (cluster default when unset)
    pub storage_class: Option<String>,
    /// How long to wait for the pod to reach Running
    pub pod_timeout_secs: u64,
}

impl Default for KubernetesConfig {
    fn default() -> Self {
        Self {
            kubectl_path: "kubectl".to_string(),
            context: None,
            kubeconfig: None,
            namespace: None,
            create_namespace: false,
            service_account: None,
            node_selector: None,
            resources: None,
            disk_size: "10Gi".to_string(),
            storage_class: None,
            pod_timeout_secs: 600,
        }
    }
}

impl KubernetesConfig {
    /// Load from the default path, then apply environment overrides
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = Self::load_from(&path)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Load configuration from a specific path
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::debug!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::TomlParseError {
            path: path.to_path_buf(),
            source: e,
        })?;

        tracing::debug!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Apply overrides from a variable lookup (normally the process environment).
    /// Empty values are treated as unset.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("KUBECTL_PATH") {
            self.kubectl_path = v;
        }
        if let Some(v) = get("KUBERNETES_CONTEXT") {
            self.context = Some(v);
        }
        if let Some(v) = get("KUBERNETES_CONFIG") {
            self.kubeconfig = Some(v);
        }
        if let Some(v) = get("KUBERNETES_NAMESPACE") {
            self.namespace = Some(v);
        }
        if let Some(v) = get("CREATE_NAMESPACE") {
            self.create_namespace = parse_bool("CREATE_NAMESPACE", &v)?;
        }
        if let Some(v) = get("SERVICE_ACCOUNT") {
            self.service_account = Some(v);
        }
        if let Some(v) = get("NODE_SELECTOR") {
            self.node_selector = Some(v);
        }
        if let Some(v) = get("RESOURCES") {
            self.resources = Some(v);
        }
        if let Some(v) = get("DISK_SIZE") {
            self.disk_size = v;
        }
        if let Some(v) = get("STORAGE_CLASS") {
            self.storage_class = Some(v);
        }
        if let Some(v) = get("POD_TIMEOUT") {
            self.pod_timeout_secs = parse_duration_secs(&v)?;
        }

        Ok(())
    }

    /// Namespace, if one is configured
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref().filter(|ns| !ns.is_empty())
    }

    /// Service account, if one is configured
    pub fn service_account(&self) -> Option<&str> {
        self.service_account.as_deref().filter(|sa| !sa.is_empty())
    }

    pub fn pod_timeout(&self) -> Duration {
        Duration::from_secs(self.pod_timeout_secs)
    }

    /// Get the default config file path
    pub fn config_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("", "", "kubedev").ok_or(ConfigError::NoConfigDir)?;
        Ok(dirs.config_dir().join("config.toml"))
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(ConfigError::Invalid(format!(
            "{} must be true or false, got '{}'",
            key, other
        ))),
    }
}

/// Parse `600`, `90s`, `10m` or `1h` into seconds
fn parse_duration_secs(value: &str) -> Result<u64> {
    let value = value.trim();
    let (digits, multiplier) = match value.char_indices().last() {
        Some((idx, 's')) => (&value[..idx], 1),
        Some((idx, 'm')) => (&value[..idx], 60),
        Some((idx, 'h')) => (&value[..idx], 3600),
        _ => (value, 1),
    };

    let n = digits
        .parse::<u64>()
        .map_err(|_| ConfigError::Invalid(format!("invalid POD_TIMEOUT '{}'", value)))?;
    n.checked_mul(multiplier)
        .ok_or_else(|| ConfigError::Invalid(format!("POD_TIMEOUT '{}' is too large", value)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = KubernetesConfig::default();
        assert_eq!(config.kubectl_path, "kubectl");
        assert_eq!(config.disk_size, "10Gi");
        assert_eq!(config.pod_timeout(), Duration::from_secs(600));
        assert!(config.namespace().is_none());
        assert!(!config.create_namespace);
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
namespace = "devpod"
create_namespace = true
service_account = "devpod-sa"
node_selector = "disktype=ssd"
resources = "requests.cpu=1"
storage_class = "fast"
pod_timeout_secs = 120
"#;

        let config: KubernetesConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.namespace(), Some("devpod"));
        assert!(config.create_namespace);
        assert_eq!(config.service_account(), Some("devpod-sa"));
        assert_eq!(config.node_selector.as_deref(), Some("disktype=ssd"));
        assert_eq!(config.storage_class.as_deref(), Some("fast"));
        assert_eq!(config.pod_timeout_secs, 120);
        // unspecified fields keep their defaults
        assert_eq!(config.disk_size, "10Gi");
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = KubernetesConfig::load_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(config, KubernetesConfig::default());
    }

    #[test]
    fn test_load_invalid_toml_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "namespace = [").unwrap();
        let err = KubernetesConfig::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TomlParseError { .. }));
    }

    #[test]
    fn test_env_overrides() {
        let mut config = KubernetesConfig::default();
        config
            .apply_overrides(lookup(&[
                ("KUBERNETES_NAMESPACE", "team-a"),
                ("CREATE_NAMESPACE", "true"),
                ("NODE_SELECTOR", "zone=a"),
                ("DISK_SIZE", "50Gi"),
                ("POD_TIMEOUT", "5m"),
                ("SERVICE_ACCOUNT", ""),
            ]))
            .unwrap();

        assert_eq!(config.namespace(), Some("team-a"));
        assert!(config.create_namespace);
        assert_eq!(config.node_selector.as_deref(), Some("zone=a"));
        assert_eq!(config.disk_size, "50Gi");
        assert_eq!(config.pod_timeout_secs, 300);
        assert!(config.service_account().is_none());
    }

    #[test]
    fn test_env_override_invalid_bool() {
        let mut config = KubernetesConfig::default();
        let result = config.apply_overrides(lookup(&[("CREATE_NAMESPACE", "maybe")]));
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_parse_duration_secs() {
        assert_eq!(parse_duration_secs("600").unwrap(), 600);
        assert_eq!(parse_duration_secs("90s").unwrap(), 90);
        assert_eq!(parse_duration_secs("10m").unwrap(), 600);
        assert_eq!(parse_duration_secs("1h").unwrap(), 3600);
        assert!(parse_duration_secs("soon").is_err());
        assert!(parse_duration_secs("").is_err());
    }

    #[test]
    fn test_env_override_timeout_overflow() {
        let mut config = KubernetesConfig::default();
        let result = config.apply_overrides(lookup(&[("POD_TIMEOUT", "9999999999999999h")]));
        assert!(matches!(result, Err(ConfigError::Invalid(ref msg)) if msg.contains("too large")));
        assert_eq!(config.pod_timeout_secs, 600);
    }
}
