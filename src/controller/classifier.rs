//! Decides whether a single workload event warrants a namespace pass

use super::workload::WorkloadObservation;

/// Classification of one workload observation
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trigger {
    /// The workload is gone; its removal may have cleared the requirement
    Removed,
    /// The workload references the trigger secret
    References,
    /// The workload is mid-teardown; wait for it to disappear
    Terminating,
    /// The workload does not reference the trigger secret
    Unrelated,
}

impl Trigger {
    /// Whether the namespace should be reconciled
    pub fn is_relevant(self) -> bool {
        matches!(self, Trigger::Removed | Trigger::References)
    }
}

/// Classify a workload observation against the trigger secret name
pub fn classify(observation: &WorkloadObservation, trigger: &str) -> Trigger {
    match observation {
        WorkloadObservation::Absent => Trigger::Removed,
        WorkloadObservation::Present(w) if w.deleting => Trigger::Terminating,
        WorkloadObservation::Present(w) if w.references(trigger) => Trigger::References,
        WorkloadObservation::Present(_) => Trigger::Unrelated,
    }
}
