//! In-memory cluster used by controller tests
//!
//! Implements both store seams over the same state so whole passes can run
//! without an API server, and counts every write.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use async_trait::async_trait;

use super::managed::ManagedKind;
use super::workload::{Workload, WorkloadClient};
use crate::Error;

pub(crate) const TRIGGER: &str = "test-secret";
pub(crate) const IDENTITY: &str = "test-es";

#[derive(Default)]
struct State {
    pods: BTreeMap<(String, String), Workload>,
    managed: BTreeSet<String>,
    writes: usize,
    fail_lists: bool,
}

#[derive(Default)]
pub(crate) struct FakeCluster {
    state: Mutex<State>,
}

impl FakeCluster {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Add a pod; an existing pod with the same name is left untouched
    pub(crate) fn add_pod(&self, namespace: &str, name: &str, refs: &[&str]) {
        let mut state = self.state.lock().unwrap();
        state
            .pods
            .entry((namespace.to_string(), name.to_string()))
            .or_insert_with(|| Workload {
                namespace: namespace.to_string(),
                name: name.to_string(),
                credential_refs: refs.iter().map(|s| s.to_string()).collect(),
                deleting: false,
            });
    }

    pub(crate) fn workload(&self, namespace: &str, name: &str) -> Option<Workload> {
        let state = self.state.lock().unwrap();
        state
            .pods
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub(crate) fn start_deleting(&self, namespace: &str, name: &str) {
        let mut state = self.state.lock().unwrap();
        if let Some(pod) = state
            .pods
            .get_mut(&(namespace.to_string(), name.to_string()))
        {
            pod.deleting = true;
        }
    }

    pub(crate) fn remove_pod(&self, namespace: &str, name: &str) {
        let mut state = self.state.lock().unwrap();
        state
            .pods
            .remove(&(namespace.to_string(), name.to_string()));
    }

    /// Put the managed resource in place without counting a write
    pub(crate) fn seed_managed(&self, namespace: &str) {
        self.state
            .lock()
            .unwrap()
            .managed
            .insert(namespace.to_string());
    }

    pub(crate) fn fail_lists(&self, fail: bool) {
        self.state.lock().unwrap().fail_lists = fail;
    }

    pub(crate) fn managed_exists(&self, namespace: &str) -> bool {
        self.state.lock().unwrap().managed.contains(namespace)
    }

    /// Whether any live pod in the namespace references the trigger
    pub(crate) fn required(&self, namespace: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .pods
            .values()
            .any(|w| w.namespace == namespace && !w.deleting && w.references(TRIGGER))
    }

    pub(crate) fn writes(&self) -> usize {
        self.state.lock().unwrap().writes
    }
}

fn unavailable() -> Error {
    Error::from(kube::Error::Api(kube::error::ErrorResponse {
        status: "Failure".to_string(),
        message: "the server is currently unable to handle the request".to_string(),
        reason: "ServiceUnavailable".to_string(),
        code: 503,
    }))
}

#[async_trait]
impl WorkloadClient for FakeCluster {
    async fn get_workload(&self, namespace: &str, name: &str) -> Result<Option<Workload>, Error> {
        Ok(self.workload(namespace, name))
    }

    async fn list_workloads(&self, namespace: &str) -> Result<Vec<Workload>, Error> {
        let state = self.state.lock().unwrap();
        if state.fail_lists {
            return Err(unavailable());
        }
        Ok(state
            .pods
            .values()
            .filter(|w| w.namespace == namespace)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ManagedKind for FakeCluster {
    fn kind(&self) -> String {
        "ExternalSecret".to_string()
    }

    fn identity(&self) -> String {
        IDENTITY.to_string()
    }

    async fn list(&self, namespace: &str) -> Result<Vec<String>, Error> {
        let state = self.state.lock().unwrap();
        if state.fail_lists {
            return Err(unavailable());
        }
        Ok(if state.managed.contains(namespace) {
            vec![IDENTITY.to_string()]
        } else {
            vec![]
        })
    }

    async fn create(&self, namespace: &str) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap();
        state.writes += 1;
        if !state.managed.insert(namespace.to_string()) {
            return Err(Error::already_exists("ExternalSecret", namespace, IDENTITY));
        }
        Ok(())
    }

    async fn delete(&self, namespace: &str) -> Result<(), Error> {
        let mut state = self.state.lock().unwrap();
        state.writes += 1;
        if !state.managed.remove(namespace) {
            return Err(Error::not_found("ExternalSecret", namespace, IDENTITY));
        }
        Ok(())
    }
}
