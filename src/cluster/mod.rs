//! Cluster metadata: the file-backed cluster config, live kubectl queries,
//! the snapshot cache that combines them, and the tasks that refresh it.

pub mod config;
pub mod kubectl;
pub mod metadata;
pub mod watch;

pub use config::{ClusterConfig, DEFAULT_CONTEXTS, DEFAULT_NAMESPACES};
pub use kubectl::KubectlQueries;
pub use metadata::{ClusterMetadataCache, ClusterSnapshot, ContextDescriptor};
pub use watch::{run_config_watch, run_periodic_refresh};
