//! Pull secret reconciliation
//!
//! A pass runs classifier → aggregator → evaluator → actuator, in that
//! order, and holds no state between passes.

mod actuator;
mod classifier;
#[cfg(test)]
mod fake;
mod managed;
mod namespace;
mod state;
mod workload;

pub use actuator::{converge, ConvergenceAction, Outcome};
pub use classifier::{classify, Trigger};
pub use managed::{ExternalSecretKind, ManagedKind, TargetSecretKind, FIELD_MANAGER};
pub use namespace::{
    error_policy, reconcile, reconcile_namespace, reconcile_workload, Context, ContextBuilder,
    CONTROLLER_NAME, REQUEUE_ERROR_SECS, REQUEUE_SUCCESS_SECS,
};
pub use state::{DesiredState, NamespaceSnapshot};
pub use workload::{KubeWorkloadClient, Workload, WorkloadClient, WorkloadObservation};
