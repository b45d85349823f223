//! Command history, where execution results are handed after each request.
//!
//! `HistoryStore` is the seam; `MemoryHistory` keeps a bounded, newest-first
//! list in memory. Durable storage is left to other implementations.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::Serialize;
use tokio::sync::RwLock;

use crate::exec::executor::ExecutionResult;
use crate::exec::target::ExecutionTarget;

/// Outcome label stored with each record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandStatus {
    Success,
    Error,
}

/// A command as it was run, with its result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandRecord {
    pub id: u64,
    pub command: String,
    pub output: String,
    pub error: String,
    pub status: CommandStatus,
    pub namespace: String,
    pub context: String,
    pub pod: Option<String>,
    pub executed_at: DateTime<Utc>,
}

/// Everything needed to record one execution.
#[derive(Debug, Clone)]
pub struct NewCommandRecord {
    pub command: String,
    pub target: ExecutionTarget,
    pub result: ExecutionResult,
}

/// Persists execution results.
pub trait HistoryStore: Send + Sync {
    fn record(&self, entry: NewCommandRecord) -> BoxFuture<'_, CommandRecord>;

    /// All records, newest first.
    fn list(&self) -> BoxFuture<'_, Vec<CommandRecord>>;

    fn clear(&self) -> BoxFuture<'_, ()>;
}

/// Bounded in-memory history; the oldest record is evicted past `limit`.
pub struct MemoryHistory {
    limit: usize,
    next_id: AtomicU64,
    // Newest at the front
    records: RwLock<VecDeque<CommandRecord>>,
}

impl MemoryHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            next_id: AtomicU64::new(1),
            records: RwLock::new(VecDeque::new()),
        }
    }
}

impl HistoryStore for MemoryHistory {
    fn record(&self, entry: NewCommandRecord) -> BoxFuture<'_, CommandRecord> {
        Box::pin(async move {
            let status = if entry.result.is_error() {
                CommandStatus::Error
            } else {
                CommandStatus::Success
            };
            let record = CommandRecord {
                id: self.next_id.fetch_add(1, Ordering::Relaxed),
                command: entry.command,
                output: entry.result.stdout,
                error: entry.result.stderr,
                status,
                namespace: entry.target.namespace,
                context: entry.target.context,
                pod: entry.target.pod,
                executed_at: Utc::now(),
            };

            let mut records = self.records.write().await;
            records.push_front(record.clone());
            records.truncate(self.limit);
            record
        })
    }

    fn list(&self) -> BoxFuture<'_, Vec<CommandRecord>> {
        Box::pin(async move { self.records.read().await.iter().cloned().collect() })
    }

    fn clear(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            self.records.write().await.clear();
        })
    }
}
