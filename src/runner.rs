//! Controller runner - wires the namespace reconciler into kube-rs
//!
//! The controller is keyed by Namespace so the runtime serializes passes per
//! namespace. Pods and the managed kind are secondary watches that map back
//! to their namespace. Pod events go through the classifier first; deleted
//! pods are still delivered because the watch event carries the last known
//! object, which is all the classifier needs to map a tombstone.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::{future, Stream, StreamExt, TryStreamExt};
use k8s_openapi::api::core::v1::{Namespace, Pod, Secret};
use kube::api::DynamicObject;
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::{self, Config as WatcherConfig};
use kube::runtime::{Controller, WatchStreamExt};
use kube::{Api, Client, ResourceExt};
use tracing::{debug, info};

use crate::config::{ControllerConfig, MatchMode};
use crate::controller::{
    classify, error_policy, reconcile, Context, Workload, WorkloadObservation,
};

/// Watcher timeout (seconds) - must be less than client read_timeout (30s)
/// This forces the API server to close the watch before the client times out,
/// preventing "body read timed out" errors on idle watches.
const WATCH_TIMEOUT_SECS: u32 = 25;

fn watcher_config() -> WatcherConfig {
    WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS)
}

/// Map any namespaced object to the Namespace that owns it
fn owning_namespace<K: ResourceExt>(obj: K) -> Option<ObjectRef<Namespace>> {
    obj.namespace().map(|ns| ObjectRef::new(&ns))
}

/// Keep only the pod events the classifier says are worth a pass
///
/// Delete events are observed as absence. Init markers carry no object.
pub(crate) fn relevant_pod(event: watcher::Event<Pod>, trigger: &str) -> Option<Pod> {
    let (pod, observation) = match event {
        watcher::Event::Delete(pod) => (pod, WorkloadObservation::Absent),
        watcher::Event::Apply(pod) | watcher::Event::InitApply(pod) => {
            let observation = WorkloadObservation::Present(Workload::from(&pod));
            (pod, observation)
        }
        watcher::Event::Init | watcher::Event::InitDone => return None,
    };

    let verdict = classify(&observation, trigger);
    if verdict.is_relevant() {
        debug!(
            namespace = ?pod.namespace(),
            pod = %pod.name_any(),
            ?verdict,
            "pod event triggers namespace reconciliation"
        );
        Some(pod)
    } else {
        None
    }
}

/// Pod watch filtered through the classifier
fn relevant_pod_events(
    pods: Api<Pod>,
    trigger: String,
) -> impl Stream<Item = Result<Pod, watcher::Error>> + Send + 'static {
    watcher::watcher(pods, watcher_config())
        .default_backoff()
        .try_filter_map(move |event| future::ready(Ok(relevant_pod(event, &trigger))))
}

/// Build the namespace controller future
pub fn build_controller(
    client: Client,
    config: &ControllerConfig,
    ctx: Arc<Context>,
) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    let namespaces: Api<Namespace> = Api::all(client.clone());
    let pods: Api<Pod> = Api::all(client.clone());
    let identity = format!("metadata.name={}", config.managed_identity());

    info!(
        trigger = %config.trigger_secret_name,
        managed_kind = %config.template.kind(),
        managed_name = %config.template.name(),
        match_mode = %config.match_mode,
        "- Namespace pull secret controller"
    );

    let controller = Controller::new(namespaces, watcher_config()).watches_stream(
        relevant_pod_events(pods, config.trigger_secret_name.clone()),
        owning_namespace,
    );

    let controller = match config.match_mode {
        MatchMode::ExternalSecret => {
            let ar = config.template.api_resource().clone();
            let managed: Api<DynamicObject> = Api::all_with(client, &ar);
            controller.watches_with(
                managed,
                ar,
                watcher_config().fields(&identity),
                owning_namespace,
            )
        }
        MatchMode::TargetSecret => {
            let secrets: Api<Secret> = Api::all(client);
            controller.watches(secrets, watcher_config().fields(&identity), owning_namespace)
        }
    };

    Box::pin(
        controller
            .shutdown_on_signal()
            .run(reconcile, error_policy, ctx)
            .for_each(log_reconcile_result("Namespace")),
    )
}

/// Run the controller until a shutdown signal arrives
pub async fn run(client: Client, config: &ControllerConfig, ctx: Arc<Context>) {
    build_controller(client, config, ctx).await;
    info!("pull secret controller shutting down");
}

fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => tracing::error!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}
