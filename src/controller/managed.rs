//! The managed resource kind: how instances are listed, created and deleted
//!
//! Two existence strategies share one writer. Both create and delete the
//! namespaced template clone; they differ only in what `list` reports and
//! which name counts as "present".

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{Api, DeleteParams, DynamicObject, ListParams, PostParams};
use kube::{Client, ResourceExt};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use crate::kube_utils::{is_already_exists, is_not_found};
use crate::template::ManagedTemplate;
use crate::Error;

/// Field manager recorded on objects this controller creates
pub const FIELD_MANAGER: &str = "pullsecret-controller";

/// Capabilities the controller needs over the managed kind
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ManagedKind: Send + Sync {
    /// Kind name used in logs, events and errors
    fn kind(&self) -> String;

    /// Name whose presence in `list` means the managed resource exists
    fn identity(&self) -> String;

    /// Whether `list` reports the object that `create` and `delete` write
    ///
    /// When it does not, a delete that finds nothing is the settled state of
    /// a namespace holding an identity this controller never wrote.
    fn lists_written_object(&self) -> bool {
        true
    }

    /// Names of every object of the matched kind in a namespace
    async fn list(&self, namespace: &str) -> Result<Vec<String>, Error>;

    /// Create the namespaced template clone
    ///
    /// Returns [`Error::AlreadyExists`] when another writer got there first.
    async fn create(&self, namespace: &str) -> Result<(), Error>;

    /// Delete the namespaced template clone by identity
    ///
    /// Returns [`Error::NotFound`] when it is already gone.
    async fn delete(&self, namespace: &str) -> Result<(), Error>;
}

/// Writes template clones through the dynamic API
#[derive(Clone)]
struct TemplateWriter {
    client: Client,
    template: Arc<ManagedTemplate>,
}

impl TemplateWriter {
    fn api(&self, namespace: &str) -> Api<DynamicObject> {
        Api::namespaced_with(self.client.clone(), namespace, self.template.api_resource())
    }

    async fn create(&self, namespace: &str) -> Result<(), Error> {
        let obj = self.template.instantiate(namespace);
        let params = PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        };
        self.api(namespace)
            .create(&params, &obj)
            .await
            .map(|_| ())
            .map_err(|e| create_error(e, &self.template, namespace))
    }

    async fn delete(&self, namespace: &str) -> Result<(), Error> {
        self.api(namespace)
            .delete(&self.template.name(), &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(|e| delete_error(e, &self.template, namespace))
    }
}

/// Map a failed create, treating a name collision as a lost race
fn create_error(err: kube::Error, template: &ManagedTemplate, namespace: &str) -> Error {
    if is_already_exists(&err) {
        Error::already_exists(template.kind(), namespace, template.name())
    } else {
        err.into()
    }
}

/// Map a failed delete, treating a missing object as a lost race
fn delete_error(err: kube::Error, template: &ManagedTemplate, namespace: &str) -> Error {
    if is_not_found(&err) {
        Error::not_found(template.kind(), namespace, template.name())
    } else {
        err.into()
    }
}

/// Existence is judged by listing the template's own kind
pub struct ExternalSecretKind {
    writer: TemplateWriter,
}

impl ExternalSecretKind {
    /// Create a managed kind backed by the template's API resource
    pub fn new(client: Client, template: Arc<ManagedTemplate>) -> Self {
        Self {
            writer: TemplateWriter { client, template },
        }
    }
}

#[async_trait]
impl ManagedKind for ExternalSecretKind {
    fn kind(&self) -> String {
        self.writer.template.kind().to_string()
    }

    fn identity(&self) -> String {
        self.writer.template.name()
    }

    async fn list(&self, namespace: &str) -> Result<Vec<String>, Error> {
        let list = self
            .writer
            .api(namespace)
            .list_metadata(&ListParams::default())
            .await?;
        let names: Vec<String> = list.items.iter().map(|o| o.name_any()).collect();
        debug!(namespace, kind = %self.kind(), count = names.len(), "listed managed objects");
        Ok(names)
    }

    async fn create(&self, namespace: &str) -> Result<(), Error> {
        self.writer.create(namespace).await
    }

    async fn delete(&self, namespace: &str) -> Result<(), Error> {
        self.writer.delete(namespace).await
    }
}

/// Existence is judged by the Secret the managed resource materializes
///
/// The trigger secret itself is the target, so a namespace is satisfied as
/// soon as a Secret with that name is listed, regardless of who wrote it.
pub struct TargetSecretKind {
    writer: TemplateWriter,
    secret_name: String,
}

impl TargetSecretKind {
    /// Create a managed kind that checks for the Secret named `secret_name`
    pub fn new(
        client: Client,
        template: Arc<ManagedTemplate>,
        secret_name: impl Into<String>,
    ) -> Self {
        Self {
            writer: TemplateWriter { client, template },
            secret_name: secret_name.into(),
        }
    }
}

#[async_trait]
impl ManagedKind for TargetSecretKind {
    fn kind(&self) -> String {
        self.writer.template.kind().to_string()
    }

    fn identity(&self) -> String {
        self.secret_name.clone()
    }

    fn lists_written_object(&self) -> bool {
        false
    }

    async fn list(&self, namespace: &str) -> Result<Vec<String>, Error> {
        let api: Api<Secret> = Api::namespaced(self.writer.client.clone(), namespace);
        let list = api.list_metadata(&ListParams::default()).await?;
        let names: Vec<String> = list.items.iter().map(|s| s.name_any()).collect();
        debug!(namespace, count = names.len(), "listed secrets");
        Ok(names)
    }

    async fn create(&self, namespace: &str) -> Result<(), Error> {
        self.writer.create(namespace).await
    }

    async fn delete(&self, namespace: &str) -> Result<(), Error> {
        self.writer.delete(namespace).await
    }
}
