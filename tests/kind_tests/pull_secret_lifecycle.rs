//! Integration tests for the pull secret lifecycle
//!
//! These tests tell the story of a team deploying a pod that pulls from a
//! private registry: the controller hands their namespace an ExternalSecret
//! while the pod exists and takes it away once the pod is gone.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use k8s_openapi::api::core::v1::{Container, LocalObjectReference, Pod, PodSpec, Secret};
use kube::api::{Api, DeleteParams, DynamicObject, ListParams, ObjectMeta, PostParams};
use kube::{Client, ResourceExt};

use pullsecret::config::{ControllerConfig, MatchMode, DEFAULT_RECONCILE_TIMEOUT};
use pullsecret::controller::{
    reconcile_namespace, reconcile_workload, ConvergenceAction, Context, Outcome,
};
use pullsecret::events::NoopEventPublisher;
use pullsecret::template::ManagedTemplate;

use super::helpers::{cleanup_namespace, ensure_test_cluster, fresh_namespace, wait_until};

const TRIGGER: &str = "test-secret";
const MANAGED_NAME: &str = "test-es";

const TEMPLATE: &str = r#"
apiVersion: external-secrets.io/v1beta1
kind: ExternalSecret
metadata:
  name: test-es
spec:
  refreshInterval: 1h
  secretStoreRef:
    kind: ClusterSecretStore
    name: registry
  target:
    name: test-secret
  dataFrom:
    - extract:
        key: registry/dockerconfig
"#;

// =============================================================================
// Test Fixtures
// =============================================================================

fn test_config() -> ControllerConfig {
    config_with_mode(MatchMode::ExternalSecret)
}

fn config_with_mode(match_mode: MatchMode) -> ControllerConfig {
    let template = ManagedTemplate::from_yaml(TEMPLATE).expect("template should parse");
    ControllerConfig::new(TRIGGER, template, match_mode, DEFAULT_RECONCILE_TIMEOUT)
        .expect("config should be valid")
}

/// An opaque Secret created by hand, not by the controller
fn hand_made_secret(name: &str) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        string_data: Some(BTreeMap::from([(
            "token".to_string(),
            "hand-made".to_string(),
        )])),
        ..Default::default()
    }
}

/// A busybox pod pulling with the given secrets
fn sample_pod(name: &str, pull_secrets: &[&str]) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        spec: Some(PodSpec {
            containers: vec![Container {
                name: "busybox".to_string(),
                image: Some("busybox".to_string()),
                command: Some(vec!["sleep".to_string(), "3600".to_string()]),
                ..Default::default()
            }],
            image_pull_secrets: Some(
                pull_secrets
                    .iter()
                    .map(|s| LocalObjectReference {
                        name: s.to_string(),
                    })
                    .collect(),
            ),
            termination_grace_period_seconds: Some(0),
            ..Default::default()
        }),
        status: None,
    }
}

fn managed_api(client: &Client, config: &ControllerConfig, namespace: &str) -> Api<DynamicObject> {
    Api::namespaced_with(client.clone(), namespace, config.template.api_resource())
}

async fn managed_names(api: &Api<DynamicObject>) -> Vec<String> {
    api.list(&ListParams::default())
        .await
        .expect("failed to list ExternalSecrets")
        .items
        .iter()
        .map(|o| o.name_any())
        .collect()
}

/// Delete a pod and wait until the API server no longer returns it
async fn delete_pod_and_wait(pods: &Api<Pod>, name: &str) {
    pods.delete(name, &DeleteParams::default().grace_period(0))
        .await
        .expect("failed to delete pod");
    wait_until(Duration::from_secs(60), move || async move {
        matches!(pods.get_opt(name).await, Ok(None))
    })
    .await
    .expect("pod was not removed");
}

// =============================================================================
// Single-Pass Stories
// =============================================================================

/// Story: A team deploys a pod pulling with the trigger secret
///
/// Expected behavior:
/// - A pass triggered by the pod creates the ExternalSecret in the namespace
/// - The created object carries the template's name and spec
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_referencing_pod_gets_external_secret() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let namespace = "pullsecret-story-create";
    fresh_namespace(&client, namespace).await;

    let config = test_config();
    let ctx = Context::builder(client.clone(), &config)
        .event_publisher(Arc::new(NoopEventPublisher))
        .build();
    let pods: Api<Pod> = Api::namespaced(client.clone(), namespace);

    // Act: the team deploys their pod
    pods.create(&PostParams::default(), &sample_pod("test-pod", &[TRIGGER]))
        .await
        .expect("failed to create pod");
    let outcome = reconcile_workload(&ctx, namespace, "test-pod")
        .await
        .expect("reconcile should succeed");

    // Assert: the ExternalSecret now exists
    assert_eq!(outcome, Some(Outcome::Applied(ConvergenceAction::Create)));
    let es = managed_api(&client, &config, namespace)
        .get(MANAGED_NAME)
        .await
        .expect("ExternalSecret should exist");
    assert_eq!(es.namespace().as_deref(), Some(namespace));
    assert_eq!(es.data["spec"]["target"]["name"], "test-secret");

    // A second pass changes nothing
    let outcome = reconcile_workload(&ctx, namespace, "test-pod")
        .await
        .expect("reconcile should succeed");
    assert_eq!(outcome, Some(Outcome::AlreadyInDesiredState));

    cleanup_namespace(&client, namespace).await;
}

/// Story: The team removes the pod again
///
/// Expected behavior:
/// - The pass triggered by the pod's disappearance deletes the ExternalSecret
/// - No managed objects remain in the namespace
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_removed_pod_takes_external_secret_away() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let namespace = "pullsecret-story-delete";
    fresh_namespace(&client, namespace).await;

    let config = test_config();
    let ctx = Context::builder(client.clone(), &config)
        .event_publisher(Arc::new(NoopEventPublisher))
        .build();
    let pods: Api<Pod> = Api::namespaced(client.clone(), namespace);
    let managed = managed_api(&client, &config, namespace);

    pods.create(&PostParams::default(), &sample_pod("test-pod", &[TRIGGER]))
        .await
        .expect("failed to create pod");
    reconcile_workload(&ctx, namespace, "test-pod")
        .await
        .expect("reconcile should succeed");
    assert_eq!(managed_names(&managed).await, vec![MANAGED_NAME]);

    // Act: the pod goes away and its tombstone is processed
    delete_pod_and_wait(&pods, "test-pod").await;
    let outcome = reconcile_workload(&ctx, namespace, "test-pod")
        .await
        .expect("reconcile should succeed");

    // Assert: nothing managed is left behind
    assert_eq!(outcome, Some(Outcome::Applied(ConvergenceAction::Delete)));
    assert!(managed_names(&managed).await.is_empty());

    cleanup_namespace(&client, namespace).await;
}

/// Story: A namespace already holds a Secret named like the trigger, made by
/// hand, while the controller runs in target-secret mode
///
/// Expected behavior:
/// - Without referencing pods, repeated passes settle without writing
/// - A referencing pod is satisfied by the existing Secret
/// - Once the Secret is gone, the pass creates the ExternalSecret
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_target_secret_mode_respects_existing_secret() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let namespace = "pullsecret-story-target";
    fresh_namespace(&client, namespace).await;

    let config = config_with_mode(MatchMode::TargetSecret);
    let ctx = Context::builder(client.clone(), &config)
        .event_publisher(Arc::new(NoopEventPublisher))
        .build();
    let pods: Api<Pod> = Api::namespaced(client.clone(), namespace);
    let secrets: Api<Secret> = Api::namespaced(client.clone(), namespace);
    let managed = managed_api(&client, &config, namespace);

    secrets
        .create(&PostParams::default(), &hand_made_secret(TRIGGER))
        .await
        .expect("failed to create secret");

    // Nothing references it yet, and nothing of ours is there to delete
    for _ in 0..2 {
        let outcome = reconcile_namespace(&ctx, namespace)
            .await
            .expect("reconcile should succeed");
        assert_eq!(outcome, Outcome::AlreadyInDesiredState);
    }
    assert!(managed_names(&managed).await.is_empty());

    // A referencing pod finds the Secret already in place
    pods.create(&PostParams::default(), &sample_pod("test-pod", &[TRIGGER]))
        .await
        .expect("failed to create pod");
    let outcome = reconcile_workload(&ctx, namespace, "test-pod")
        .await
        .expect("reconcile should succeed");
    assert_eq!(outcome, Some(Outcome::AlreadyInDesiredState));
    assert!(managed_names(&managed).await.is_empty());

    // Without the Secret, the ExternalSecret is created to provide it
    secrets
        .delete(TRIGGER, &DeleteParams::default())
        .await
        .expect("failed to delete secret");
    let secrets = &secrets;
    wait_until(Duration::from_secs(30), move || async move {
        matches!(secrets.get_opt(TRIGGER).await, Ok(None))
    })
    .await
    .expect("secret was not removed");
    let outcome = reconcile_namespace(&ctx, namespace)
        .await
        .expect("reconcile should succeed");
    assert_eq!(outcome, Outcome::Applied(ConvergenceAction::Create));
    assert_eq!(managed_names(&managed).await, vec![MANAGED_NAME]);

    cleanup_namespace(&client, namespace).await;
}

// =============================================================================
// Running Controller Stories
// =============================================================================

/// Story: With the controller running, the ExternalSecret follows the pod
/// without anyone invoking a pass by hand
#[tokio::test]
#[ignore = "requires kind cluster - run with: cargo test --test kind -- --ignored"]
async fn story_running_controller_follows_pod_lifecycle() {
    let client = ensure_test_cluster()
        .await
        .expect("failed to setup cluster");
    let namespace = "pullsecret-story-controller";
    fresh_namespace(&client, namespace).await;

    let config = test_config();
    let ctx = Arc::new(
        Context::builder(client.clone(), &config)
            .event_publisher(Arc::new(NoopEventPublisher))
            .build(),
    );
    let controller = tokio::spawn(pullsecret::runner::build_controller(
        client.clone(),
        &config,
        ctx,
    ));

    let pods: Api<Pod> = Api::namespaced(client.clone(), namespace);
    let managed = managed_api(&client, &config, namespace);
    let managed = &managed;

    // An unrelated pod alone does not get one
    pods.create(&PostParams::default(), &sample_pod("unrelated", &["other"]))
        .await
        .expect("failed to create pod");

    pods.create(&PostParams::default(), &sample_pod("test-pod", &[TRIGGER]))
        .await
        .expect("failed to create pod");
    wait_until(Duration::from_secs(60), move || async move {
        managed_names(managed).await == vec![MANAGED_NAME]
    })
    .await
    .expect("controller should create the ExternalSecret");

    // Hand-deleting the managed object is corrected
    managed
        .delete(MANAGED_NAME, &DeleteParams::default())
        .await
        .expect("failed to delete ExternalSecret");
    wait_until(Duration::from_secs(60), move || async move {
        managed_names(managed).await == vec![MANAGED_NAME]
    })
    .await
    .expect("controller should recreate the ExternalSecret");

    delete_pod_and_wait(&pods, "test-pod").await;
    wait_until(Duration::from_secs(60), move || async move {
        managed_names(managed).await.is_empty()
    })
    .await
    .expect("controller should delete the ExternalSecret");

    controller.abort();
    cleanup_namespace(&client, namespace).await;
}
