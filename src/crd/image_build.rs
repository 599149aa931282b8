//! ImageBuild Custom Resource Definition
//!
//! An ImageBuild describes a container image to build from a git repository.
//! The controller materializes one worker pod per ImageBuild and mirrors the
//! pod's phase into `status.state`.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ResourceRequirements;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{RegistryCredentials, RepositorySpec};

/// Build context used when `context` is unset or empty
pub const DEFAULT_BUILD_CONTEXT: &str = ".";

/// Specification for an ImageBuild
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "img.k8s.io",
    version = "v1alpha1",
    kind = "ImageBuild",
    plural = "imagebuilds",
    shortname = "ib",
    status = "ImageBuildStatus",
    namespaced,
    printcolumn = r#"{"name":"Image","type":"string","jsonPath":".spec.imageName"}"#,
    printcolumn = r#"{"name":"State","type":"string","jsonPath":".status.state"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ImageBuildSpec {
    /// Image reference to tag (and push, when registry credentials are enabled)
    #[serde(default)]
    pub image_name: String,

    /// Build context inside the cloned repository
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,

    /// Dockerfile path passed to the builder with `-f`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dockerfile: Option<String>,

    /// Repository to clone
    #[serde(default)]
    pub repository: RepositorySpec,

    /// Run the build step as root with a privileged security context
    #[serde(default)]
    pub privileged: bool,

    /// Node selector copied onto the worker pod
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,

    /// Annotations copied onto the worker pod
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,

    /// Labels copied onto the worker pod
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,

    /// Registry login/push configuration
    #[serde(default, rename = "registry")]
    pub registry_credentials: RegistryCredentials,

    /// Resource requirements for the build container
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
}

impl ImageBuildSpec {
    /// Validate the fields the worker cannot run without
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.image_name.is_empty() {
            return Err(crate::Error::validation("image name must be specified"));
        }
        if self.repository.url.is_empty() {
            return Err(crate::Error::validation("repository url must be specified"));
        }
        Ok(())
    }

    /// Build context directory, defaulting to `.`
    pub fn context_dir(&self) -> &str {
        self.context
            .as_deref()
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_BUILD_CONTEXT)
    }

    /// Dockerfile path, treating an empty string as absent
    pub fn dockerfile_path(&self) -> Option<&str> {
        self.dockerfile.as_deref().filter(|d| !d.is_empty())
    }
}

/// Status for an ImageBuild
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ImageBuildStatus {
    /// Last observed phase of the worker pod (Pending, Running, Succeeded, ...)
    #[serde(default)]
    pub state: String,
}

impl ImageBuildStatus {
    /// Create a status carrying the given state
    pub fn with_state(state: impl Into<String>) -> Self {
        Self {
            state: state.into(),
        }
    }
}
