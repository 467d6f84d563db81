//! Controller configuration loaded from environment variables.

use crate::error::ControllerError;
use std::env;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_PLUGIN_NAMESPACE: &str = "oran-hwmgr-plugin";
pub const DEFAULT_RECONCILE_CONCURRENCY: u16 = 3;
pub const DEFAULT_RECONCILE_DEBOUNCE_SECS: u64 = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Namespace holding HardwareManagers, HardwareProfiles and the loopback
    /// inventory
    pub plugin_namespace: String,
    /// Namespace watched for NodePools, all namespaces when unset
    pub watch_namespace: Option<String>,
    /// Token for the vendor hardware manager API when the HardwareManager
    /// names no auth secret
    pub hwmgr_token: Option<String>,
    pub reconcile_concurrency: u16,
    pub reconcile_debounce: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            plugin_namespace: DEFAULT_PLUGIN_NAMESPACE.to_string(),
            watch_namespace: None,
            hwmgr_token: None,
            reconcile_concurrency: DEFAULT_RECONCILE_CONCURRENCY,
            reconcile_debounce: Duration::from_secs(DEFAULT_RECONCILE_DEBOUNCE_SECS),
        }
    }
}

impl ControllerConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through `lookup`. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        Ok(Self {
            plugin_namespace: get("PLUGIN_NAMESPACE").unwrap_or(defaults.plugin_namespace),
            watch_namespace: get("WATCH_NAMESPACE"),
            hwmgr_token: get("HWMGR_TOKEN"),
            reconcile_concurrency: parse(get("RECONCILE_CONCURRENCY"), "RECONCILE_CONCURRENCY")?
                .unwrap_or(defaults.reconcile_concurrency),
            reconcile_debounce: parse(get("RECONCILE_DEBOUNCE_SECS"), "RECONCILE_DEBOUNCE_SECS")?
                .map_or(defaults.reconcile_debounce, Duration::from_secs),
        })
    }
}

fn parse<T: FromStr>(value: Option<String>, key: &str) -> Result<Option<T>, ControllerError> {
    value
        .map(|v| {
            v.parse::<T>().map_err(|_| {
                ControllerError::InvalidConfig(format!("{} must be a non-negative integer, got {:?}", key, v))
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<ControllerConfig, ControllerError> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        ControllerConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[]).expect("defaults");
        assert_eq!(config, ControllerConfig::default());
        assert_eq!(config.plugin_namespace, "oran-hwmgr-plugin");
        assert_eq!(config.reconcile_concurrency, 3);
        assert_eq!(config.reconcile_debounce, Duration::from_secs(5));
    }

    #[test]
    fn test_overrides() {
        let config = load(&[
            ("PLUGIN_NAMESPACE", "hwmgr"),
            ("WATCH_NAMESPACE", "clusters"),
            ("HWMGR_TOKEN", " abc123 "),
            ("RECONCILE_CONCURRENCY", "8"),
            ("RECONCILE_DEBOUNCE_SECS", "0"),
        ])
        .expect("valid config");
        assert_eq!(config.plugin_namespace, "hwmgr");
        assert_eq!(config.watch_namespace.as_deref(), Some("clusters"));
        assert_eq!(config.hwmgr_token.as_deref(), Some("abc123"));
        assert_eq!(config.reconcile_concurrency, 8);
        assert_eq!(config.reconcile_debounce, Duration::ZERO);
    }

    #[test]
    fn test_empty_values_are_unset() {
        let config = load(&[("PLUGIN_NAMESPACE", ""), ("WATCH_NAMESPACE", "  ")]).expect("valid config");
        assert_eq!(config.plugin_namespace, DEFAULT_PLUGIN_NAMESPACE);
        assert_eq!(config.watch_namespace, None);
    }

    #[test]
    fn test_invalid_numbers_rejected() {
        let err = load(&[("RECONCILE_CONCURRENCY", "many")]).expect_err("not a number");
        assert!(matches!(err, ControllerError::InvalidConfig(msg) if msg.contains("RECONCILE_CONCURRENCY")));

        assert!(load(&[("RECONCILE_DEBOUNCE_SECS", "-1")]).is_err());
    }
}
