//! Command execution modules — the path a raw kubectl command takes from
//! free text to a structured result.
//!
//! Policy check, target resolution and composition are pure functions of
//! their inputs. Only the executor touches the outside world, through a
//! shell with timeout-kill semantics.

pub mod compose;
pub mod executor;
pub mod pipeline;
pub mod policy;
pub mod target;

pub use compose::compose;
pub use executor::{CommandRunner, ExecutionResult, ShellRunner};
pub use pipeline::ExecutionPipeline;
pub use policy::{is_safe_selector, PolicyValidator, PolicyViolation, REJECTION_MESSAGE};
pub use target::{resolve, CommandRequest, ExecutionTarget, ResolutionPlan, TargetDefaults};
