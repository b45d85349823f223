//! Execution pipeline: validate, resolve, compose, execute.
//!
//! Every failure mode is converted into an `ExecutionResult`; nothing escapes
//! to the caller as an error or panic.

use std::sync::Arc;
use std::time::Duration;

use crate::config::GatewayConfig;
use crate::exec::compose::compose;
use crate::exec::executor::{CommandRunner, ExecutionResult, ShellRunner, DEFAULT_TIMEOUT};
use crate::exec::policy::{PolicyValidator, PolicyViolation, REJECTION_MESSAGE};
use crate::exec::target::{resolve, CommandRequest, ExecutionTarget, TargetDefaults};

/// Orchestrates one command request from raw text to structured result.
///
/// Holds no per-request state; a single instance serves concurrent requests.
#[derive(Clone)]
pub struct ExecutionPipeline {
    policy: Arc<PolicyValidator>,
    runner: Arc<dyn CommandRunner>,
    defaults: TargetDefaults,
    timeout: Duration,
}

impl ExecutionPipeline {
    pub fn new(policy: PolicyValidator, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            policy: Arc::new(policy),
            runner,
            defaults: TargetDefaults::default(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Build the production pipeline (shell runner, configured policy and
    /// defaults) from gateway config.
    pub fn from_config(config: &GatewayConfig) -> crate::Result<Self> {
        let policy = PolicyValidator::with_extra_deny(&config.policy.extra_deny)?;
        let runner: Arc<dyn CommandRunner> = Arc::new(ShellRunner::new(&config.executor.shell));
        Ok(Self::new(policy, runner)
            .with_defaults(TargetDefaults::from(&config.defaults))
            .with_timeout(config.executor.timeout()))
    }

    pub fn with_defaults(mut self, defaults: TargetDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn defaults(&self) -> &TargetDefaults {
        &self.defaults
    }

    /// Validate and compose the invocation for `request` without running it.
    pub fn plan(&self, request: &CommandRequest) -> std::result::Result<String, PolicyViolation> {
        let target = ExecutionTarget::from_request(request, &self.defaults);
        self.policy
            .check_selectors(&target.namespace, &target.context, target.pod.as_deref())?;
        self.policy.check(&request.raw_command)?;
        Ok(compose(&resolve(&target, &request.raw_command)))
    }

    /// Run `request` end to end. Rejected commands never spawn a process.
    pub async fn execute(&self, request: &CommandRequest) -> ExecutionResult {
        let invocation = match self.plan(request) {
            Ok(invocation) => invocation,
            Err(violation) => {
                tracing::warn!(
                    command = %request.raw_command,
                    reason = %violation,
                    "command rejected by policy"
                );
                return ExecutionResult::failure(REJECTION_MESSAGE);
            }
        };

        tracing::debug!(invocation = %invocation, "executing composed invocation");
        self.runner.run(&invocation, self.timeout).await
    }
}
