//! Live kubectl queries backing the metadata cache.
//!
//! All queries go through the same `CommandRunner` as user commands. Output
//! is requested with `-o name` and the resource prefix is stripped.

use std::sync::Arc;
use std::time::Duration;

use crate::exec::executor::{CommandRunner, ExecutionResult};
use crate::exec::policy::is_safe_selector;

/// Issues metadata queries against the configured kubectl binary.
#[derive(Clone)]
pub struct KubectlQueries {
    kubectl: String,
    runner: Arc<dyn CommandRunner>,
    timeout: Duration,
}

impl KubectlQueries {
    pub fn new(kubectl: impl Into<String>, runner: Arc<dyn CommandRunner>, timeout: Duration) -> Self {
        Self {
            kubectl: kubectl.into(),
            runner,
            timeout,
        }
    }

    /// Context names from the active kubeconfig, or `None` if the query failed.
    pub async fn context_names(&self) -> Option<Vec<String>> {
        let invocation = format!("{} config get-contexts -o name", self.kubectl);
        let result = self.runner.run(&invocation, self.timeout).await;
        if result.failed {
            tracing::warn!(error = %result.stderr, "listing kubeconfig contexts failed");
            return None;
        }
        if result.stdout.trim().is_empty() && !result.stderr.trim().is_empty() {
            tracing::warn!(error = %result.stderr.trim(), "listing kubeconfig contexts failed");
            return None;
        }
        Some(parse_names(&result.stdout, ""))
    }

    /// Probe a context with `kubectl cluster-info`. A completed run with an
    /// empty stderr counts as reachable.
    pub async fn probe(&self, context: &str) -> bool {
        if !is_safe_selector(context) {
            return false;
        }
        let invocation = format!("{} cluster-info --context={}", self.kubectl, context);
        let result = self.runner.run(&invocation, self.timeout).await;
        let available = is_clean_success(&result);
        tracing::debug!(context = %context, available = %available, "context liveness probe");
        available
    }

    /// Pod names in `namespace` on `context`. Empty on any failure.
    pub async fn pod_names(&self, namespace: &str, context: &str) -> Vec<String> {
        if !is_safe_selector(namespace) || !is_safe_selector(context) {
            tracing::warn!(
                namespace = %namespace,
                context = %context,
                "refusing pod listing for invalid selector"
            );
            return Vec::new();
        }
        let invocation = format!(
            "{} get pods --namespace={} --context={} -o name",
            self.kubectl, namespace, context
        );
        let result = self.runner.run(&invocation, self.timeout).await;
        if result.failed {
            tracing::warn!(
                namespace = %namespace,
                context = %context,
                error = %result.stderr,
                "listing pods failed"
            );
            return Vec::new();
        }
        if result.stdout.trim().is_empty() && !result.stderr.trim().is_empty() {
            tracing::debug!(stderr = %result.stderr.trim(), "pod listing returned no names");
        }
        parse_names(&result.stdout, "pod/")
    }
}

fn is_clean_success(result: &ExecutionResult) -> bool {
    !result.failed && result.stderr.trim().is_empty()
}

/// Split `-o name` output into names, dropping blank lines and `prefix`.
fn parse_names(stdout: &str, prefix: &str) -> Vec<String> {
    stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(|line| line.strip_prefix(prefix).unwrap_or(line).to_string())
        .collect()
}
