//! Shared Kubernetes utilities using kube-rs
//!
//! Client construction, API resource building for template-defined kinds,
//! and classification of API status codes the controller cares about.

use std::path::Path;
use std::time::Duration;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::discovery::ApiResource;
use kube::{Client, Config};

use crate::Error;

/// Default connection timeout for kube clients
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Default read timeout for kube clients
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP status the API server returns when a get/delete target is missing
const STATUS_NOT_FOUND: u16 = 404;
/// HTTP status the API server returns when a create target already exists
const STATUS_CONFLICT: u16 = 409;
/// Status reason the API server attaches to a create of an existing name
const REASON_ALREADY_EXISTS: &str = "AlreadyExists";

/// Create a kube client from optional kubeconfig path with default timeouts
pub async fn create_client(kubeconfig: Option<&Path>) -> Result<Client, Error> {
    create_client_with_timeout(kubeconfig, DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT).await
}

/// Create a kube client from optional kubeconfig path with custom timeouts
pub async fn create_client_with_timeout(
    kubeconfig: Option<&Path>,
    connect_timeout: Duration,
    read_timeout: Duration,
) -> Result<Client, Error> {
    let mut config = match kubeconfig {
        Some(path) => {
            let kubeconfig = Kubeconfig::read_from(path).map_err(|e| {
                Error::configuration(format!(
                    "failed to read kubeconfig {}: {}",
                    path.display(),
                    e
                ))
            })?;
            Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                .await
                .map_err(|e| Error::configuration(format!("failed to load kubeconfig: {}", e)))?
        }
        None => Config::infer()
            .await
            .map_err(|e| Error::configuration(format!("failed to infer config: {}", e)))?,
    };
    config.connect_timeout = Some(connect_timeout);
    config.read_timeout = Some(read_timeout);
    Client::try_from(config)
        .map_err(|e| Error::configuration(format!("failed to create client: {}", e)))
}

/// Build an ApiResource from an apiVersion/kind pair.
///
/// The version is used exactly as given, so it must be one the API server
/// serves for the kind.
pub fn build_api_resource(api_version: &str, kind: &str) -> ApiResource {
    let (group, version) = parse_api_version(api_version);
    ApiResource {
        group,
        version,
        kind: kind.to_string(),
        api_version: api_version.to_string(),
        plural: pluralize_kind(kind),
    }
}

/// Split an apiVersion into group and version; the core group is empty.
pub fn parse_api_version(api_version: &str) -> (String, String) {
    match api_version.split_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), api_version.to_string()),
    }
}

/// Known pluralizations that the suffix rules below get wrong or that we
/// want pinned explicitly.
const KIND_PLURALS: &[(&str, &str)] = &[
    ("externalsecret", "externalsecrets"),
    ("clusterexternalsecret", "clusterexternalsecrets"),
    ("pushsecret", "pushsecrets"),
    ("secretstore", "secretstores"),
    ("clustersecretstore", "clustersecretstores"),
    ("secret", "secrets"),
];

/// Pluralize a Kubernetes resource kind
///
/// Uses a lookup table for known kinds, falling back to simple
/// pluralization rules for unknown ones.
pub fn pluralize_kind(kind: &str) -> String {
    let lower = kind.to_lowercase();

    for (singular, plural) in KIND_PLURALS {
        if *singular == lower {
            return (*plural).to_string();
        }
    }

    if lower.ends_with('s') || lower.ends_with("ch") || lower.ends_with("sh") {
        format!("{}es", lower)
    } else if lower.ends_with('y') && !lower.ends_with("ay") && !lower.ends_with("ey") {
        format!("{}ies", &lower[..lower.len() - 1])
    } else {
        format!("{}s", lower)
    }
}

/// Strip metadata the API server owns so the object can be submitted again.
///
/// Removes uid, resourceVersion, creationTimestamp, managedFields,
/// generation and deletionTimestamp.
pub fn strip_server_metadata(meta: &mut ObjectMeta) {
    meta.uid = None;
    meta.resource_version = None;
    meta.creation_timestamp = None;
    meta.managed_fields = None;
    meta.generation = None;
    meta.deletion_timestamp = None;
    meta.deletion_grace_period_seconds = None;
}

/// Check if a kube error is an API response with the given HTTP status
pub fn is_api_status(err: &kube::Error, code: u16) -> bool {
    matches!(err, kube::Error::Api(ae) if ae.code == code)
}

/// Check if a kube error means the target object does not exist
pub fn is_not_found(err: &kube::Error) -> bool {
    is_api_status(err, STATUS_NOT_FOUND)
}

/// Check if a kube error means the target object already exists
///
/// Other 409s (e.g. a stale resourceVersion) do not count.
pub fn is_already_exists(err: &kube::Error) -> bool {
    matches!(
        err,
        kube::Error::Api(ae) if ae.code == STATUS_CONFLICT && ae.reason == REASON_ALREADY_EXISTS
    )
}
