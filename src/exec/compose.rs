//! Renders a resolution plan into the final invocation string.

use crate::exec::target::ResolutionPlan;

/// Build the invocation for `plan`. Pure and deterministic.
pub fn compose(plan: &ResolutionPlan) -> String {
    match plan {
        ResolutionPlan::PodExec {
            pod,
            namespace,
            context,
            inner,
        } => format!(
            "kubectl exec -i {} --namespace={} --context={} -- {}",
            pod, namespace, context, inner
        ),
        ResolutionPlan::Direct {
            command,
            namespace,
            context,
        } => {
            let mut invocation = command.clone();
            if let Some(ns) = namespace {
                invocation.push_str(" --namespace=");
                invocation.push_str(ns);
            }
            if let Some(ctx) = context {
                invocation.push_str(" --context=");
                invocation.push_str(ctx);
            }
            invocation
        }
    }
}
