//! Reconciliation of ImageBuilds and their worker pods
//!
//! The controller is level-triggered: every call re-derives the whole
//! decision from the build, its worker and the worker's phase, regardless of
//! which change caused the call.

use std::sync::Arc;

use k8s_openapi::api::core::v1::Pod;
use kube::runtime::controller::Action;
use kube::runtime::events::EventType;
use kube::runtime::reflector::ObjectRef;
use kube::{Resource, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

use super::{BuildCache, Context};
use crate::crd::{ImageBuild, ImageBuildStatus};
use crate::events::{actions, reasons, resource_exists_message};
use crate::identity::{build_ref_for_worker, worker_name};
use crate::status::{pod_phase, project_phase};
use crate::workload::build_worker_pod;
use crate::Error;

/// What to do with a valid ImageBuild whose worker pod exists
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
    /// A same-named pod exists that this build does not control
    OwnershipConflict {
        /// Name of the foreign pod
        worker: String,
    },
    /// Mirror the worker's phase into the build's status
    ProjectStatus {
        /// New value for `status.state`
        state: String,
    },
}

/// True when `pod` carries a controller owner reference to exactly `build`
pub fn is_controlled_by(pod: &Pod, build: &ImageBuild) -> bool {
    let Some(uid) = build.uid() else {
        return false;
    };
    pod.owner_references()
        .iter()
        .any(|owner| owner.controller == Some(true) && owner.uid == uid)
}

/// Decide what to do with a build given its worker pod
pub fn decide(build: &ImageBuild, worker: &Pod) -> Decision {
    if !is_controlled_by(worker, build) {
        return Decision::OwnershipConflict {
            worker: worker.name_any(),
        };
    }
    Decision::ProjectStatus {
        state: project_phase(pod_phase(worker)),
    }
}

/// Bring one ImageBuild's worker and status in line with the cluster
///
/// `None`, or a build that is being deleted, is a no-op: the worker is
/// removed by owner-reference garbage collection. An invalid spec is
/// reported and left alone until it is edited.
pub async fn reconcile_build(build: Option<&ImageBuild>, ctx: &Context) -> Result<(), Error> {
    let Some(build) = build.filter(|b| b.meta().deletion_timestamp.is_none()) else {
        debug!("build deleted, nothing to do");
        return Ok(());
    };

    if let Err(e) = build.spec.validate() {
        error!(error = %e, "invalid ImageBuild, skipping until edited");
        ctx.events
            .publish(
                &build.object_ref(&()),
                EventType::Warning,
                reasons::VALIDATION_FAILED,
                actions::RECONCILE,
                Some(e.to_string()),
            )
            .await;
        return Ok(());
    }

    let namespace = build
        .namespace()
        .ok_or(Error::MissingField("metadata.namespace"))?;
    if build.uid().is_none() {
        return Err(Error::MissingField("metadata.uid"));
    }

    let name = worker_name(build);
    let worker = match ctx.client.cached_worker(&namespace, &name) {
        Some(worker) => worker,
        None => create_worker(build, &namespace, ctx).await?,
    };

    match decide(build, &worker) {
        Decision::OwnershipConflict { worker } => {
            warn!(%worker, "worker pod exists but is not controlled by this build");
            ctx.events
                .publish(
                    &build.object_ref(&()),
                    EventType::Warning,
                    reasons::RESOURCE_EXISTS,
                    actions::RECONCILE,
                    Some(resource_exists_message(&worker)),
                )
                .await;
        }
        Decision::ProjectStatus { state } => {
            let mut updated = build.clone();
            updated.status = Some(ImageBuildStatus::with_state(state.as_str()));
            ctx.client.update_status(&updated).await?;
            debug!(%state, "status updated");
        }
    }

    Ok(())
}

/// Create the worker pod, falling back to the live object if it already exists
///
/// An AlreadyExists response means the pod cache is behind the API server.
/// The live pod goes through the same ownership check as a cached one.
async fn create_worker(build: &ImageBuild, namespace: &str, ctx: &Context) -> Result<Pod, Error> {
    let pod = build_worker_pod(build, &ctx.config.worker);
    let name = pod.name_any();

    match ctx.client.create_worker(&pod).await {
        Ok(created) => {
            info!(worker = %name, "created worker pod");
            ctx.events
                .publish(
                    &build.object_ref(&()),
                    EventType::Normal,
                    reasons::WORKER_CREATED,
                    actions::RECONCILE,
                    Some(format!("Created pod {:?}", name)),
                )
                .await;
            Ok(created)
        }
        Err(e) if e.is_already_exists() => {
            debug!(worker = %name, "worker pod already exists, reading live object");
            ctx.client.get_worker(namespace, &name).await
        }
        Err(e) => Err(e),
    }
}

/// Reconcile entry point for the kube `Controller`
///
/// Every successful outcome waits for the next change: worker pod changes
/// re-enqueue the build through [`on_worker_changed`].
#[instrument(
    skip(build, ctx),
    fields(build = %build.name_any(), namespace = %build.namespace().unwrap_or_default())
)]
pub async fn reconcile(build: Arc<ImageBuild>, ctx: Arc<Context>) -> Result<Action, Error> {
    reconcile_build(Some(&build), &ctx).await?;
    Ok(Action::await_change())
}

/// Requeue a failed reconcile after the configured delay
pub fn error_policy(build: Arc<ImageBuild>, error: &Error, ctx: Arc<Context>) -> Action {
    error!(
        ?error,
        build = %build.name_any(),
        namespace = %build.namespace().unwrap_or_default(),
        "reconciliation failed"
    );
    Action::requeue(ctx.config.error_requeue)
}

/// Map a changed pod to the ImageBuild that should be reconciled
///
/// A terminating pod is still a worker: its final phase and its removal both
/// enqueue the build. Pods with no ImageBuild controller, or whose ImageBuild
/// is not in the cache, map to nothing.
pub fn on_worker_changed(
    pod: Option<&Pod>,
    builds: &impl BuildCache,
) -> Option<ObjectRef<ImageBuild>> {
    let pod = pod?;

    let owned_by_build = pod
        .owner_references()
        .iter()
        .find(|owner| owner.controller == Some(true))
        .is_some_and(|owner| owner.kind == ImageBuild::kind(&()));
    if !owned_by_build {
        debug!(
            worker = %pod.name_any(),
            namespace = %pod.namespace().unwrap_or_default(),
            "pod not controlled by an ImageBuild, ignoring"
        );
        return None;
    }

    let reference = build_ref_for_worker(pod)?;
    let namespace = reference.namespace.as_deref().unwrap_or_default();
    match builds.get_build(namespace, &reference.name) {
        Some(build) => Some(ObjectRef::from_obj(build.as_ref())),
        None => {
            debug!(
                worker = %reference.name,
                namespace,
                "worker pod has no cached ImageBuild, ignoring"
            );
            None
        }
    }
}
