//! The managed resource template
//!
//! One template per controller. It is loaded once, stripped of anything the
//! API server owns, and cloned per namespace; the clone is what gets submitted.

use std::path::Path;

use kube::api::DynamicObject;
use kube::discovery::ApiResource;
use kube::ResourceExt;
use tracing::debug;

use crate::kube_utils::{build_api_resource, strip_server_metadata};
use crate::Error;

/// Immutable blueprint for the managed resource
#[derive(Clone, Debug)]
pub struct ManagedTemplate {
    object: DynamicObject,
    api_resource: ApiResource,
}

impl ManagedTemplate {
    /// Parse a template from a YAML manifest
    ///
    /// The manifest must carry `apiVersion`, `kind` and `metadata.name`.
    /// Any `metadata.namespace` and `status` are discarded.
    pub fn from_yaml(yaml: &str) -> Result<Self, Error> {
        let value: serde_yaml::Value = serde_yaml::from_str(yaml)
            .map_err(|e| Error::configuration(format!("invalid template YAML: {}", e)))?;

        let api_version = required_str(&value["apiVersion"], "apiVersion")?;
        let kind = required_str(&value["kind"], "kind")?;
        required_str(&value["metadata"]["name"], "metadata.name")?;

        let mut object: DynamicObject = serde_yaml::from_value(value.clone())
            .map_err(|e| Error::configuration(format!("invalid template: {}", e)))?;

        strip_server_metadata(&mut object.metadata);
        object.metadata.namespace = None;
        if let Some(data) = object.data.as_object_mut() {
            data.remove("status");
        }

        let api_resource = build_api_resource(api_version, kind);
        debug!(
            api_version,
            kind,
            name = %object.name_any(),
            "Loaded managed resource template"
        );

        Ok(Self {
            object,
            api_resource,
        })
    }

    /// Read and parse a template file
    pub async fn from_file(path: &Path) -> Result<Self, Error> {
        let yaml = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::configuration(format!(
                "failed to read template {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_yaml(&yaml)
    }

    /// Name every managed instance is created under
    pub fn name(&self) -> String {
        self.object.name_any()
    }

    /// Kind of the managed resource, e.g. `ExternalSecret`
    pub fn kind(&self) -> &str {
        &self.api_resource.kind
    }

    /// API resource used to address the managed kind
    pub fn api_resource(&self) -> &ApiResource {
        &self.api_resource
    }

    /// Clone the template scoped to `namespace`
    pub fn instantiate(&self, namespace: &str) -> DynamicObject {
        let mut obj = self.object.clone();
        obj.metadata.namespace = Some(namespace.to_string());
        obj
    }

    /// Render the namespaced instance as YAML
    pub fn render(&self, namespace: &str) -> Result<String, Error> {
        serde_yaml::to_string(&self.instantiate(namespace))
            .map_err(|e| Error::serialization(format!("failed to render template: {}", e)))
    }
}

fn required_str<'a>(value: &'a serde_yaml::Value, field: &str) -> Result<&'a str, Error> {
    match value.as_str() {
        Some(s) if !s.trim().is_empty() => Ok(s),
        _ => Err(Error::configuration(format!("template is missing {}", field))),
    }
}
