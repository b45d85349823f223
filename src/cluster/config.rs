//! File-backed cluster config: known contexts and per-context namespaces.
//!
//! ```json
//! { "contexts": ["minikube"], "namespaces": { "minikube": ["default"] } }
//! ```
//!
//! Loading never fails. A missing or malformed file yields the built-in
//! defaults; a missing key falls back to its own default.

use std::collections::HashMap;
use std::path::Path;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::error::KubegateError;

/// Contexts offered when no cluster config is available.
pub const DEFAULT_CONTEXTS: &[&str] = &["minikube", "docker-desktop", "production"];

/// Namespaces offered for any context the cluster config does not list.
pub const DEFAULT_NAMESPACES: &[&str] = &["default", "kube-system", "kube-public"];

pub fn default_contexts() -> Vec<String> {
    DEFAULT_CONTEXTS.iter().map(|s| s.to_string()).collect()
}

pub fn default_namespaces() -> Vec<String> {
    DEFAULT_NAMESPACES.iter().map(|s| s.to_string()).collect()
}

/// Contexts and namespaces offered to selectors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterConfig {
    #[serde(default = "default_contexts")]
    pub contexts: Vec<String>,
    #[serde(default)]
    pub namespaces: HashMap<String, Vec<String>>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            contexts: default_contexts(),
            namespaces: HashMap::new(),
        }
    }
}

impl ClusterConfig {
    /// Namespaces listed for `context`, if the config has an entry for it.
    pub fn namespaces_for(&self, context: &str) -> Option<&[String]> {
        self.namespaces.get(context).map(Vec::as_slice)
    }
}

/// Outcome of reading the cluster config file.
#[derive(Debug, Clone)]
pub struct LoadedClusterConfig {
    pub config: ClusterConfig,
    /// True if `config` came from the file rather than the fallback.
    pub from_file: bool,
    /// Modification time of the file when it was read.
    pub modified: Option<SystemTime>,
}

impl LoadedClusterConfig {
    fn fallback(modified: Option<SystemTime>) -> Self {
        Self {
            config: ClusterConfig::default(),
            from_file: false,
            modified,
        }
    }
}

/// Modification time of `path`, if it exists and the platform reports one.
pub async fn modified_time(path: &Path) -> Option<SystemTime> {
    tokio::fs::metadata(path)
        .await
        .ok()
        .and_then(|meta| meta.modified().ok())
}

/// Read the cluster config at `path`, falling back to defaults on any failure.
pub async fn load_or_default(path: Option<&Path>) -> LoadedClusterConfig {
    let Some(path) = path else {
        return LoadedClusterConfig::fallback(None);
    };

    let modified = modified_time(path).await;

    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "cluster config unreadable, using default contexts and namespaces"
            );
            return LoadedClusterConfig::fallback(modified);
        }
    };

    match serde_json::from_str::<ClusterConfig>(&content) {
        Ok(config) => LoadedClusterConfig {
            config,
            from_file: true,
            modified,
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "cluster config malformed, using default contexts and namespaces"
            );
            LoadedClusterConfig::fallback(modified)
        }
    }
}

/// Write `config` to `path` as pretty-printed JSON.
pub async fn save(path: &Path, config: &ClusterConfig) -> crate::Result<()> {
    let body = serde_json::to_string_pretty(config).map_err(|e| {
        KubegateError::ClusterConfigSave(path.display().to_string(), e.to_string())
    })?;
    tokio::fs::write(path, body)
        .await
        .map_err(|e| KubegateError::ClusterConfigSave(path.display().to_string(), e.to_string()))
}
