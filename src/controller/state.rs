//! Namespace aggregation and desired-state evaluation

use tracing::debug;

use super::managed::ManagedKind;
use super::workload::{Workload, WorkloadClient};
use crate::Error;

/// Full view of one namespace, taken fresh on every pass
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NamespaceSnapshot {
    /// Namespace the snapshot was taken in
    pub namespace: String,
    /// Every workload listed in the namespace
    pub workloads: Vec<Workload>,
    /// Names of every managed-kind object listed in the namespace
    pub managed: Vec<String>,
}

/// The two facts convergence is decided on
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DesiredState {
    /// Some workload references the trigger secret
    pub required: bool,
    /// The managed resource is present
    pub exists: bool,
}

impl NamespaceSnapshot {
    /// List workloads and managed objects in `namespace`
    ///
    /// Either list failing aborts the snapshot; a partial view is never returned.
    pub async fn observe(
        workloads: &dyn WorkloadClient,
        managed: &dyn ManagedKind,
        namespace: &str,
    ) -> Result<Self, Error> {
        let workloads = workloads.list_workloads(namespace).await?;
        let managed = managed.list(namespace).await?;
        debug!(
            namespace,
            workloads = workloads.len(),
            managed = managed.len(),
            "observed namespace"
        );
        Ok(Self {
            namespace: namespace.to_string(),
            workloads,
            managed,
        })
    }

    /// Reduce the snapshot to `(required, exists)`
    ///
    /// Terminating workloads still count toward `required`; the managed
    /// resource is only released once they are gone from the listing.
    pub fn evaluate(&self, trigger: &str, identity: &str) -> DesiredState {
        DesiredState {
            required: self.workloads.iter().any(|w| w.references(trigger)),
            exists: self.managed.iter().any(|name| name == identity),
        }
    }
}
