//! Error types for kubegate operations.
//!
//! Command execution never surfaces these: policy rejections, timeouts and
//! spawn faults are folded into an `ExecutionResult`. These errors cover the
//! fallible edges around it (configuration, cluster config persistence, file
//! watching).

use thiserror::Error;

/// Main error type for kubegate operations
#[derive(Error, Debug)]
pub enum KubegateError {
    /// Invalid value in a named configuration section
    #[error("invalid config in [{0}]: {1}")]
    InvalidConfig(String, String),

    /// Configuration file could not be read or parsed
    #[error("failed to load config '{0}': {1}")]
    ConfigLoad(String, String),

    /// Cluster config could not be written back to its file
    #[error("failed to save cluster config '{0}': {1}")]
    ClusterConfigSave(String, String),

    /// No backing file is configured for the cluster config
    #[error("no cluster config file is configured")]
    NoClusterConfigFile,

    /// File watcher could not be set up
    #[error("file watch failed for '{0}': {1}")]
    Watch(String, String),
}

/// Result type alias for kubegate operations
pub type Result<T> = std::result::Result<T, KubegateError>;
