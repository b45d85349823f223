//! Cluster metadata cache: contexts (with liveness), namespaces and pods.
//!
//! State lives in an immutable `ClusterSnapshot` behind
//! `RwLock<Arc<ClusterSnapshot>>`. Reloads and probes build a new snapshot
//! and swap it in under the write lock, so each read sees one consistent
//! snapshot. Read operations never fail; they degrade to defaults.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use futures::future::join_all;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};

use crate::cluster::config::{self, default_namespaces, ClusterConfig};
use crate::cluster::kubectl::KubectlQueries;
use crate::error::KubegateError;
use crate::exec::policy::is_safe_selector;

/// A context name annotated with its last probed liveness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextDescriptor {
    pub name: String,
    pub available: bool,
}

/// Immutable view of cluster metadata, swapped whole on reload.
#[derive(Debug, Clone, Default)]
pub struct ClusterSnapshot {
    pub config: ClusterConfig,
    /// True if `config` was read from the backing file.
    pub from_file: bool,
    /// Modification time of the backing file at the last reload.
    pub modified: Option<SystemTime>,
    /// Liveness probe results by context name. Absent means unavailable.
    pub context_status: HashMap<String, bool>,
}

impl ClusterSnapshot {
    pub fn is_available(&self, context: &str) -> bool {
        self.context_status.get(context).copied().unwrap_or(false)
    }
}

/// Owns cluster metadata for the process lifetime.
///
/// Instances are independent: tests build their own with a scripted runner
/// and a temporary config file.
pub struct ClusterMetadataCache {
    config_path: Option<PathBuf>,
    queries: KubectlQueries,
    snapshot: RwLock<Arc<ClusterSnapshot>>,
    // Held across read-and-swap so concurrent reloads install in file order
    reload_lock: Mutex<()>,
}

impl ClusterMetadataCache {
    /// Create a cache holding the default snapshot. Performs no I/O; call
    /// `reload` or `refresh` to read the backing file.
    pub fn new(config_path: Option<PathBuf>, queries: KubectlQueries) -> Self {
        Self {
            config_path,
            queries,
            snapshot: RwLock::new(Arc::new(ClusterSnapshot::default())),
            reload_lock: Mutex::new(()),
        }
    }

    /// Create a cache and read the backing file once.
    pub async fn load(config_path: Option<PathBuf>, queries: KubectlQueries) -> Self {
        let cache = Self::new(config_path, queries);
        cache.reload().await;
        cache
    }

    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Current snapshot.
    pub async fn snapshot(&self) -> Arc<ClusterSnapshot> {
        self.snapshot.read().await.clone()
    }

    /// Effective cluster config (file contents or defaults).
    pub async fn current_config(&self) -> ClusterConfig {
        self.snapshot().await.config.clone()
    }

    /// List contexts, annotated with cached liveness.
    ///
    /// `live = true` asks kubectl for the kubeconfig's contexts (empty on
    /// failure); otherwise the cluster config's contexts are returned.
    pub async fn list_contexts(&self, live: bool) -> Vec<ContextDescriptor> {
        let snapshot = self.snapshot().await;
        let names = if live {
            self.queries.context_names().await.unwrap_or_default()
        } else {
            snapshot.config.contexts.clone()
        };
        names
            .into_iter()
            .map(|name| ContextDescriptor {
                available: snapshot.is_available(&name),
                name,
            })
            .collect()
    }

    /// Namespaces for `context`: snapshot first, then one reload of the
    /// backing file, then the default namespace set.
    pub async fn list_namespaces(&self, context: &str) -> Vec<String> {
        if let Some(namespaces) = self.snapshot().await.config.namespaces_for(context) {
            return namespaces.to_vec();
        }

        if self.config_path.is_some() {
            tracing::debug!(context = %context, "namespace cache miss, reloading cluster config");
            let snapshot = self.reload().await;
            if let Some(namespaces) = snapshot.config.namespaces_for(context) {
                return namespaces.to_vec();
            }
        }

        default_namespaces()
    }

    /// Pods in `namespace` on `context`, always queried live. Empty on failure.
    pub async fn list_pods(&self, namespace: &str, context: &str) -> Vec<String> {
        self.queries.pod_names(namespace, context).await
    }

    /// Re-read the backing file and swap in a new snapshot. Liveness results
    /// carry over. Returns the snapshot now in place.
    pub async fn reload(&self) -> Arc<ClusterSnapshot> {
        let _reloading = self.reload_lock.lock().await;
        let loaded = config::load_or_default(self.config_path.as_deref()).await;

        let mut guard = self.snapshot.write().await;
        let next = Arc::new(ClusterSnapshot {
            config: loaded.config,
            from_file: loaded.from_file,
            modified: loaded.modified,
            context_status: guard.context_status.clone(),
        });
        *guard = next.clone();
        drop(guard);

        tracing::info!(
            path = ?self.config_path,
            contexts = %next.config.contexts.len(),
            from_file = %next.from_file,
            "cluster config reloaded"
        );
        next
    }

    /// Reload only if the backing file's modification time changed since the
    /// last reload. Returns true if a reload happened.
    pub async fn reload_if_changed(&self) -> bool {
        let Some(path) = self.config_path.as_deref() else {
            return false;
        };
        let current = config::modified_time(path).await;
        if current == self.snapshot().await.modified {
            return false;
        }
        self.reload().await;
        true
    }

    /// Probe every known context (config contexts plus the kubeconfig's
    /// contexts when that query succeeds) and swap in the results.
    pub async fn probe_contexts(&self) -> HashMap<String, bool> {
        let mut names: BTreeSet<String> =
            self.snapshot().await.config.contexts.iter().cloned().collect();
        if let Some(live) = self.queries.context_names().await {
            names.extend(live);
        }

        let probes = names.into_iter().map(|name| async move {
            let available = self.queries.probe(&name).await;
            (name, available)
        });
        let status: HashMap<String, bool> = join_all(probes).await.into_iter().collect();

        let mut guard = self.snapshot.write().await;
        let mut next = ClusterSnapshot::clone(&guard);
        next.context_status = status.clone();
        *guard = Arc::new(next);
        drop(guard);

        let up = status.values().filter(|&&v| v).count();
        tracing::info!(probed = %status.len(), available = %up, "context liveness probed");
        status
    }

    /// Reload the backing file, then re-probe contexts.
    pub async fn refresh(&self) {
        self.reload().await;
        self.probe_contexts().await;
    }

    /// Replace the backing file with `config` and reload from it.
    pub async fn save_config(&self, config: &ClusterConfig) -> crate::Result<Arc<ClusterSnapshot>> {
        let path = self
            .config_path
            .as_deref()
            .ok_or(KubegateError::NoClusterConfigFile)?;

        for context in &config.contexts {
            if !is_safe_selector(context) {
                return Err(KubegateError::InvalidConfig(
                    "cluster".to_string(),
                    format!("context '{}' is not a valid selector", context),
                ));
            }
        }

        config::save(path, config).await?;
        Ok(self.reload().await)
    }
}
