//! Namespace reconciliation
//!
//! Every pass lists the namespace from scratch, reduces it to
//! `(required, exists)` and issues at most one write. Missed or duplicated
//! events cannot desynchronize anything because no state survives a pass.

use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::core::v1::{Namespace, ObjectReference};
use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::{Client, Resource, ResourceExt};
use tracing::{debug, error, info, instrument};

use super::actuator::{converge, ConvergenceAction, Outcome};
use super::classifier::classify;
use super::managed::{ExternalSecretKind, ManagedKind, TargetSecretKind};
use super::state::NamespaceSnapshot;
use super::workload::{KubeWorkloadClient, WorkloadClient, WorkloadObservation};
use crate::config::{ControllerConfig, MatchMode};
use crate::error::FailureClass;
use crate::events::{actions, reasons, EventPublisher, KubeEventPublisher};
use crate::Error;

/// Name reported as the reporting component on Events
pub const CONTROLLER_NAME: &str = "pullsecret-controller";

/// Periodic re-verification interval after a successful pass
pub const REQUEUE_SUCCESS_SECS: u64 = 300;

/// Retry interval after a transient failure
pub const REQUEUE_ERROR_SECS: u64 = 10;

/// Controller context shared across all reconciliation calls
///
/// Use [`ContextBuilder`] to construct instances:
///
/// ```ignore
/// let ctx = Context::builder(client, &config).build();
/// ```
pub struct Context {
    /// Workload reads (trait object for testability)
    pub workloads: Arc<dyn WorkloadClient>,
    /// Managed kind capabilities
    pub managed: Arc<dyn ManagedKind>,
    /// Kubernetes Event publisher
    pub events: Arc<dyn EventPublisher>,
    /// Image pull secret name that activates the managed resource
    pub trigger_secret_name: String,
    /// Deadline for one pass
    pub reconcile_timeout: Duration,
}

impl Context {
    /// Create a builder for constructing a Context
    pub fn builder(client: Client, config: &ControllerConfig) -> ContextBuilder {
        ContextBuilder::new(client, config)
    }

    /// Create a context for testing with custom store clients
    #[cfg(test)]
    pub fn for_testing(
        workloads: Arc<dyn WorkloadClient>,
        managed: Arc<dyn ManagedKind>,
        events: Arc<dyn EventPublisher>,
        trigger_secret_name: &str,
    ) -> Self {
        Self {
            workloads,
            managed,
            events,
            trigger_secret_name: trigger_secret_name.to_string(),
            reconcile_timeout: crate::config::DEFAULT_RECONCILE_TIMEOUT,
        }
    }
}

/// Builder for constructing [`Context`] instances
///
/// The managed kind defaults to the strategy selected by the config's
/// [`MatchMode`]; any seam can be overridden.
pub struct ContextBuilder {
    client: Client,
    config: ControllerConfig,
    workloads: Option<Arc<dyn WorkloadClient>>,
    managed: Option<Arc<dyn ManagedKind>>,
    events: Option<Arc<dyn EventPublisher>>,
}

impl ContextBuilder {
    fn new(client: Client, config: &ControllerConfig) -> Self {
        Self {
            client,
            config: config.clone(),
            workloads: None,
            managed: None,
            events: None,
        }
    }

    /// Override the workload client
    pub fn workload_client(mut self, workloads: Arc<dyn WorkloadClient>) -> Self {
        self.workloads = Some(workloads);
        self
    }

    /// Override the managed kind
    pub fn managed_kind(mut self, managed: Arc<dyn ManagedKind>) -> Self {
        self.managed = Some(managed);
        self
    }

    /// Override the event publisher
    pub fn event_publisher(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.events = Some(events);
        self
    }

    /// Build the Context
    pub fn build(self) -> Context {
        let client = self.client;
        let config = self.config;

        let managed = self.managed.unwrap_or_else(|| {
            let kind: Arc<dyn ManagedKind> = match config.match_mode {
                MatchMode::ExternalSecret => Arc::new(ExternalSecretKind::new(
                    client.clone(),
                    config.template.clone(),
                )),
                MatchMode::TargetSecret => Arc::new(TargetSecretKind::new(
                    client.clone(),
                    config.template.clone(),
                    config.trigger_secret_name.clone(),
                )),
            };
            kind
        });

        Context {
            workloads: self
                .workloads
                .unwrap_or_else(|| Arc::new(KubeWorkloadClient::new(client.clone()))),
            managed,
            events: self
                .events
                .unwrap_or_else(|| Arc::new(KubeEventPublisher::new(client, CONTROLLER_NAME))),
            trigger_secret_name: config.trigger_secret_name,
            reconcile_timeout: config.reconcile_timeout,
        }
    }
}

/// One full pass over a namespace: aggregate, evaluate, converge
pub async fn reconcile_namespace(ctx: &Context, namespace: &str) -> Result<Outcome, Error> {
    let snapshot =
        NamespaceSnapshot::observe(ctx.workloads.as_ref(), ctx.managed.as_ref(), namespace)
            .await?;
    let state = snapshot.evaluate(&ctx.trigger_secret_name, &ctx.managed.identity());
    debug!(
        namespace,
        required = state.required,
        exists = state.exists,
        "evaluated namespace"
    );
    converge(ctx.managed.as_ref(), namespace, state).await
}

/// Handle a change to a single workload
///
/// Returns `Ok(None)` when the classifier defers: the workload is unrelated
/// or still terminating.
pub async fn reconcile_workload(
    ctx: &Context,
    namespace: &str,
    name: &str,
) -> Result<Option<Outcome>, Error> {
    let observation = WorkloadObservation::from(ctx.workloads.get_workload(namespace, name).await?);
    let trigger = classify(&observation, &ctx.trigger_secret_name);
    if !trigger.is_relevant() {
        debug!(namespace, workload = name, ?trigger, "workload change is not relevant");
        return Ok(None);
    }
    debug!(namespace, workload = name, ?trigger, "workload change triggers reconciliation");
    reconcile_namespace(ctx, namespace).await.map(Some)
}

/// Reconcile a Namespace
///
/// Entry point for the kube-rs controller. Terminating namespaces are left
/// to the garbage collector.
#[instrument(skip(namespace, ctx), fields(namespace = %namespace.name_any()))]
pub async fn reconcile(namespace: Arc<Namespace>, ctx: Arc<Context>) -> Result<Action, Error> {
    let name = namespace.name_any();
    if namespace.meta().deletion_timestamp.is_some() {
        debug!("namespace is terminating, skipping");
        return Ok(Action::await_change());
    }

    let object_ref = namespace.object_ref(&());
    let pass = tokio::time::timeout(ctx.reconcile_timeout, reconcile_namespace(&ctx, &name));
    let result = match pass.await {
        Ok(result) => result,
        Err(_) => Err(Error::Timeout {
            namespace: name.clone(),
            after: ctx.reconcile_timeout,
        }),
    };

    match result {
        Ok(outcome) => {
            publish_outcome(&ctx, &object_ref, outcome).await;
            Ok(Action::requeue(Duration::from_secs(REQUEUE_SUCCESS_SECS)))
        }
        Err(e) => {
            ctx.events
                .publish(
                    &object_ref,
                    EventType::Warning,
                    reasons::RECONCILE_FAILED,
                    actions::RECONCILE,
                    Some(e.to_string()),
                )
                .await;
            Err(e)
        }
    }
}

async fn publish_outcome(ctx: &Context, object_ref: &ObjectReference, outcome: Outcome) {
    let kind = ctx.managed.kind();
    let identity = ctx.managed.identity();
    let (reason, note) = match outcome {
        Outcome::AlreadyInDesiredState => return,
        Outcome::Applied(ConvergenceAction::Create) => (
            reasons::MANAGED_RESOURCE_CREATED,
            format!("Created {} {}", kind, identity),
        ),
        Outcome::Applied(ConvergenceAction::Delete) => (
            reasons::MANAGED_RESOURCE_DELETED,
            format!("Deleted {} {}", kind, identity),
        ),
        Outcome::Applied(ConvergenceAction::Noop) => return,
        Outcome::Conflict(action) => (
            reasons::CONVERGENCE_RACED,
            format!("{} of {} {} raced with another writer", action, kind, identity),
        ),
    };
    info!(reason, "{}", note);
    ctx.events
        .publish(
            object_ref,
            EventType::Normal,
            reason,
            actions::RECONCILE,
            Some(note),
        )
        .await;
}

/// Error policy for the controller
///
/// Transient failures are retried after [`REQUEUE_ERROR_SECS`]; fatal ones
/// wait for the namespace to change.
pub fn error_policy(namespace: Arc<Namespace>, error: &Error, _ctx: Arc<Context>) -> Action {
    error!(
        ?error,
        namespace = %namespace.name_any(),
        "reconciliation failed"
    );

    match error.failure_class() {
        FailureClass::Transient => Action::requeue(Duration::from_secs(REQUEUE_ERROR_SECS)),
        FailureClass::Fatal => Action::await_change(),
    }
}
