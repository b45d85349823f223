//! Gateway configuration: deserialization and validation.
//!
//! Every key is optional; an absent `kubegate.toml` is equivalent to the
//! built-in defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;

use crate::error::KubegateError;
use crate::exec::policy::is_safe_selector;

/// Top-level kubegate configuration, parsed from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub defaults: DefaultsConfig,
    pub executor: ExecutorConfig,
    pub cluster: ClusterSourceConfig,
    pub history: HistoryConfig,
    pub policy: PolicyConfig,
}

/// Selectors applied when a request leaves namespace or context empty.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DefaultsConfig {
    pub namespace: String,
    pub context: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            context: "minikube".to_string(),
        }
    }
}

/// Process executor settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// kubectl binary used for metadata queries (contexts, pods, probes).
    pub kubectl: String,
    /// Shell used to run composed invocations (`<shell> -c <invocation>`).
    pub shell: String,
    /// Per-command timeout in milliseconds.
    pub timeout_ms: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            kubectl: "kubectl".to_string(),
            shell: "sh".to_string(),
            timeout_ms: 10_000,
        }
    }
}

impl ExecutorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Where cluster metadata comes from and how it is refreshed.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClusterSourceConfig {
    /// JSON cluster config (`{"contexts": [...], "namespaces": {...}}`).
    /// Relative paths resolve against the directory of kubegate.toml.
    pub config_path: Option<PathBuf>,
    /// Reload on file change notifications.
    pub watch: bool,
    /// Periodic modification-time check; 0 disables it.
    pub refresh_interval_secs: u64,
    /// Timeout for each `kubectl cluster-info` liveness probe.
    pub probe_timeout_ms: u64,
    /// Probe every known context once at startup.
    pub probe_on_start: bool,
}

impl Default for ClusterSourceConfig {
    fn default() -> Self {
        Self {
            config_path: None,
            watch: true,
            refresh_interval_secs: 0,
            probe_timeout_ms: 5_000,
            probe_on_start: true,
        }
    }
}

impl ClusterSourceConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn refresh_interval(&self) -> Option<Duration> {
        (self.refresh_interval_secs > 0).then(|| Duration::from_secs(self.refresh_interval_secs))
    }
}

/// In-memory command history settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Maximum number of records kept; the oldest are evicted first.
    pub limit: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self { limit: 500 }
    }
}

/// Additional deny rules layered on the built-in policy.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Case-insensitive regexes; a matching command is rejected.
    pub extra_deny: Vec<String>,
}

impl GatewayConfig {
    /// Read and parse a kubegate.toml file, then validate it.
    ///
    /// A relative `cluster.config_path` is resolved against the directory
    /// containing the TOML file.
    pub async fn load(path: &Path) -> crate::Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| KubegateError::ConfigLoad(path.display().to_string(), e.to_string()))?;
        let mut config: GatewayConfig = toml::from_str(&content)
            .map_err(|e| KubegateError::ConfigLoad(path.display().to_string(), e.to_string()))?;

        if let (Some(cluster_path), Some(base)) = (&config.cluster.config_path, path.parent()) {
            if cluster_path.is_relative() {
                config.cluster.config_path = Some(base.join(cluster_path));
            }
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the config, failing fast before anything is spawned.
    pub fn validate(&self) -> crate::Result<()> {
        // 1. Default selectors end up inside shell strings
        for (key, value) in [
            ("namespace", &self.defaults.namespace),
            ("context", &self.defaults.context),
        ] {
            if !is_safe_selector(value) {
                return Err(KubegateError::InvalidConfig(
                    "defaults".to_string(),
                    format!("{} '{}' is not a valid selector", key, value),
                ));
            }
        }

        // 2. Executor
        if self.executor.kubectl.trim().is_empty() {
            return Err(KubegateError::InvalidConfig(
                "executor".to_string(),
                "kubectl must not be empty".to_string(),
            ));
        }
        if self.executor.shell.trim().is_empty() {
            return Err(KubegateError::InvalidConfig(
                "executor".to_string(),
                "shell must not be empty".to_string(),
            ));
        }
        if self.executor.timeout_ms == 0 {
            return Err(KubegateError::InvalidConfig(
                "executor".to_string(),
                "timeout_ms must be greater than 0".to_string(),
            ));
        }

        // 3. Cluster source
        if self.cluster.probe_timeout_ms == 0 {
            return Err(KubegateError::InvalidConfig(
                "cluster".to_string(),
                "probe_timeout_ms must be greater than 0".to_string(),
            ));
        }

        // 4. History
        if self.history.limit == 0 {
            return Err(KubegateError::InvalidConfig(
                "history".to_string(),
                "limit must be greater than 0".to_string(),
            ));
        }

        // 5. Extra deny patterns must compile
        for pattern in &self.policy.extra_deny {
            if let Err(e) = Regex::new(pattern) {
                return Err(KubegateError::InvalidConfig(
                    "policy".to_string(),
                    format!("extra_deny pattern '{}' does not compile: {}", pattern, e),
                ));
            }
        }

        Ok(())
    }
}
