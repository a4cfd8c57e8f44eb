//! Workload resources (pods) and their image pull secret references

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams};
use kube::{Client, ResourceExt};

#[cfg(test)]
use mockall::automock;

use crate::Error;

/// The parts of a pod the controller reasons about
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Workload {
    /// Namespace the pod lives in
    pub namespace: String,
    /// Pod name
    pub name: String,
    /// `spec.imagePullSecrets[*].name`, in declaration order
    pub credential_refs: Vec<String>,
    /// `metadata.deletionTimestamp` is set
    pub deleting: bool,
}

impl Workload {
    /// Whether any image pull secret reference names `trigger`
    pub fn references(&self, trigger: &str) -> bool {
        self.credential_refs.iter().any(|r| r == trigger)
    }
}

impl From<&Pod> for Workload {
    fn from(pod: &Pod) -> Self {
        let credential_refs = pod
            .spec
            .as_ref()
            .and_then(|s| s.image_pull_secrets.as_ref())
            .map(|refs| refs.iter().map(|r| r.name.clone()).collect())
            .unwrap_or_default();

        Self {
            namespace: pod.namespace().unwrap_or_default(),
            name: pod.name_any(),
            credential_refs,
            deleting: pod.metadata.deletion_timestamp.is_some(),
        }
    }
}

/// What a lookup of a single workload found
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkloadObservation {
    /// The workload is in the store
    Present(Workload),
    /// The workload is gone, either a tombstone or a not-found read
    Absent,
}

impl From<Option<Workload>> for WorkloadObservation {
    fn from(workload: Option<Workload>) -> Self {
        match workload {
            Some(w) => WorkloadObservation::Present(w),
            None => WorkloadObservation::Absent,
        }
    }
}

/// Read access to workloads
///
/// Not-found on `get_workload` is `Ok(None)`, never an error.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait WorkloadClient: Send + Sync {
    /// Fetch one workload by identity
    async fn get_workload(&self, namespace: &str, name: &str) -> Result<Option<Workload>, Error>;

    /// List every workload in a namespace
    async fn list_workloads(&self, namespace: &str) -> Result<Vec<Workload>, Error>;
}

/// Pod-backed [`WorkloadClient`]
pub struct KubeWorkloadClient {
    client: Client,
}

impl KubeWorkloadClient {
    /// Create a new client wrapper
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl WorkloadClient for KubeWorkloadClient {
    async fn get_workload(&self, namespace: &str, name: &str) -> Result<Option<Workload>, Error> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let pod = api.get_opt(name).await?;
        Ok(pod.as_ref().map(Workload::from))
    }

    async fn list_workloads(&self, namespace: &str) -> Result<Vec<Workload>, Error> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let pods = api.list(&ListParams::default()).await?;
        Ok(pods.items.iter().map(Workload::from).collect())
    }
}
