//! kubegate — guarded kubectl execution for browser terminals.
//! Validates free-text commands against a deny policy, targets them at a
//! namespace/context (optionally inside a pod), runs them with a timeout and
//! serves cluster metadata for the selectors around the terminal.

pub mod cluster;
pub mod config;
pub mod error;
pub mod exec;
pub mod history;
pub mod server;

pub use cluster::{ClusterConfig, ClusterMetadataCache, ContextDescriptor, KubectlQueries};
pub use config::GatewayConfig;
pub use error::{KubegateError, Result};
pub use exec::{
    CommandRequest, CommandRunner, ExecutionPipeline, ExecutionResult, PolicyValidator,
    ShellRunner,
};
pub use history::{CommandRecord, HistoryStore, MemoryHistory};
pub use server::{AppState, router};
