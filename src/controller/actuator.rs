//! Turns a desired state into at most one write

use tracing::{debug, info, warn};

use super::managed::ManagedKind;
use super::state::DesiredState;
use crate::Error;

/// The single write a pass may perform
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConvergenceAction {
    /// Required but missing
    Create,
    /// Present but no longer required
    Delete,
    /// Already converged
    Noop,
}

impl ConvergenceAction {
    /// Pick the action for a desired state
    pub fn plan(state: DesiredState) -> Self {
        match (state.required, state.exists) {
            (true, false) => ConvergenceAction::Create,
            (false, true) => ConvergenceAction::Delete,
            (true, true) | (false, false) => ConvergenceAction::Noop,
        }
    }
}

impl std::fmt::Display for ConvergenceAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConvergenceAction::Create => write!(f, "create"),
            ConvergenceAction::Delete => write!(f, "delete"),
            ConvergenceAction::Noop => write!(f, "noop"),
        }
    }
}

/// Result of a convergence attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The write was issued and accepted
    Applied(ConvergenceAction),
    /// Nothing to do
    AlreadyInDesiredState,
    /// The write lost a race; the store already holds the target state.
    /// The next pass re-verifies.
    Conflict(ConvergenceAction),
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Applied(action) => write!(f, "applied {}", action),
            Outcome::AlreadyInDesiredState => write!(f, "already in desired state"),
            Outcome::Conflict(action) => write!(f, "{} raced with another writer", action),
        }
    }
}

/// Perform the action implied by `state` in `namespace`
///
/// Issues at most one create or delete and never retries; retry timing
/// belongs to the dispatcher.
pub async fn converge(
    kind: &dyn ManagedKind,
    namespace: &str,
    state: DesiredState,
) -> Result<Outcome, Error> {
    let action = ConvergenceAction::plan(state);
    let result = match action {
        ConvergenceAction::Create => kind.create(namespace).await,
        ConvergenceAction::Delete => kind.delete(namespace).await,
        ConvergenceAction::Noop => return Ok(Outcome::AlreadyInDesiredState),
    };

    match result {
        Ok(()) => {
            info!(namespace, kind = %kind.kind(), %action, "converged managed resource");
            Ok(Outcome::Applied(action))
        }
        Err(Error::NotFound { .. }) if !kind.lists_written_object() => {
            debug!(
                namespace,
                identity = %kind.identity(),
                "identity is present but holds nothing this controller wrote"
            );
            Ok(Outcome::AlreadyInDesiredState)
        }
        Err(e) if e.is_race() => {
            warn!(namespace, %action, error = %e, "write raced with another writer");
            Ok(Outcome::Conflict(action))
        }
        Err(e) => Err(e),
    }
}
