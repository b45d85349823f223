//! Target resolution. Turns a request's selectors into a resolution plan.
//!
//! Namespace/context idempotency checks are plain substring tests on the raw
//! command, not a flag parser. A command that merely mentions `--namespace`
//! or `-n ` anywhere (an argument value, a grep pattern) is treated as
//! already namespaced. Existing callers depend on this, so it stays naive.

use serde::{Deserialize, Serialize};

/// Fallback selectors used when a request leaves namespace or context empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDefaults {
    pub namespace: String,
    pub context: String,
}

impl Default for TargetDefaults {
    fn default() -> Self {
        Self {
            namespace: "default".to_string(),
            context: "minikube".to_string(),
        }
    }
}

impl From<&crate::config::DefaultsConfig> for TargetDefaults {
    fn from(config: &crate::config::DefaultsConfig) -> Self {
        Self {
            namespace: config.namespace.clone(),
            context: config.context.clone(),
        }
    }
}

/// A caller's request to run one command.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRequest {
    pub raw_command: String,
    /// Empty means "use the default namespace".
    pub namespace: String,
    /// Empty means "use the default context".
    pub context: String,
    pub pod: Option<String>,
}

impl CommandRequest {
    pub fn new(raw_command: impl Into<String>) -> Self {
        Self {
            raw_command: raw_command.into(),
            ..Default::default()
        }
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    pub fn pod(mut self, pod: impl Into<String>) -> Self {
        self.pod = Some(pod.into());
        self
    }
}

/// Resolved selectors for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionTarget {
    pub namespace: String,
    pub context: String,
    pub pod: Option<String>,
}

impl ExecutionTarget {
    /// Fill empty selectors from `defaults`; an empty pod counts as no pod.
    pub fn from_request(request: &CommandRequest, defaults: &TargetDefaults) -> Self {
        let pick = |value: &str, fallback: &str| {
            let value = value.trim();
            if value.is_empty() {
                fallback.to_string()
            } else {
                value.to_string()
            }
        };
        Self {
            namespace: pick(&request.namespace, &defaults.namespace),
            context: pick(&request.context, &defaults.context),
            pod: request
                .pod
                .as_deref()
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string),
        }
    }
}

/// How the final invocation is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolutionPlan {
    /// Run the raw command inside the pod via `kubectl exec`; selectors go on
    /// the outer exec.
    PodExec {
        pod: String,
        namespace: String,
        context: String,
        inner: String,
    },
    /// Run the raw command as-is, appending whichever selector flags it lacks.
    Direct {
        command: String,
        namespace: Option<String>,
        context: Option<String>,
    },
}

/// Returns true if the command is already a `kubectl exec` (or bare `exec`) call.
fn is_exec_call(raw_command: &str) -> bool {
    let mut tokens = raw_command.split_whitespace();
    match tokens.next() {
        Some("exec") => true,
        Some("kubectl") => tokens.next() == Some("exec"),
        _ => false,
    }
}

/// Decide how to compose the invocation for `raw_command` against `target`.
pub fn resolve(target: &ExecutionTarget, raw_command: &str) -> ResolutionPlan {
    if let Some(pod) = &target.pod {
        if !is_exec_call(raw_command) {
            return ResolutionPlan::PodExec {
                pod: pod.clone(),
                namespace: target.namespace.clone(),
                context: target.context.clone(),
                inner: raw_command.to_string(),
            };
        }
    }

    let has_namespace = raw_command.contains("--namespace") || raw_command.contains("-n ");
    let has_context = raw_command.contains("--context");

    ResolutionPlan::Direct {
        command: raw_command.to_string(),
        namespace: (!has_namespace).then(|| target.namespace.clone()),
        context: (!has_context).then(|| target.context.clone()),
    }
}
