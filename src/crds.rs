//! ImageBuild CRD registration
//!
//! The CRD is generated from the Rust types and applied with server-side
//! apply, so upgrading the controller also upgrades the schema.

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, CustomResourceExt, ResourceExt};
use tracing::info;

use crate::crd::ImageBuild;
use crate::retry::{retry_with_backoff, RetryConfig};
use crate::{Error, CONTROLLER_NAME};

/// The ImageBuild CRD as applied to the cluster
pub fn image_build_crd() -> CustomResourceDefinition {
    ImageBuild::crd()
}

/// The ImageBuild CRD rendered as YAML, for `--crd`
pub fn crd_yaml() -> Result<String, Error> {
    serde_yaml::to_string(&image_build_crd()).map_err(|e| Error::serialization(e.to_string()))
}

/// Apply the ImageBuild CRD, retrying while the API server is unavailable
pub async fn ensure_installed(client: &Client, retry: &RetryConfig) -> Result<(), Error> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let crd = image_build_crd();
    let name = crd.name_any();
    let params = PatchParams::apply(CONTROLLER_NAME).force();

    retry_with_backoff(retry, "install ImageBuild CRD", || async {
        crds.patch(&name, &params, &Patch::Apply(&crd)).await
    })
    .await?;

    info!(crd = %name, "CRD installed");
    Ok(())
}
