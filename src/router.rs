//! Wires the handlers to their watches
//!
//! Produces two futures:
//! - a pod reflector feeding the worker cache read by the reconciler
//! - the ImageBuild `Controller`, which also watches pods and maps each change
//!   back to its ImageBuild through [`on_worker_changed`]
//!
//! Reconciles do not start until the worker cache has synced, so an existing
//! worker is never mistaken for a missing one after a restart.

use std::future::{ready, Future};
use std::pin::Pin;
use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::core::v1::Pod;
use k8s_openapi::NamespaceResourceScope;
use kube::runtime::controller::Config as ControllerRunConfig;
use kube::runtime::reflector::{self, Store};
use kube::runtime::watcher::{self, Config as WatcherConfig};
use kube::runtime::{Controller, WatchStreamExt};
use kube::{Api, Client, Resource};
use tracing::{info, warn};

use crate::config::ControllerConfig;
use crate::controller::{error_policy, on_worker_changed, reconcile, Context};
use crate::crd::ImageBuild;

/// Watcher timeout (seconds); must stay below the client read timeout (30s)
/// so idle watches are closed by the API server first.
const WATCH_TIMEOUT_SECS: u32 = 25;

/// A controller future ready to be polled
pub type ControllerFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

fn watcher_config() -> WatcherConfig {
    WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS)
}

/// Api handle scoped to `namespace`, or cluster-wide
fn scoped_api<K>(client: Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<Scope = NamespaceResourceScope>,
    K::DynamicType: Default,
{
    match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    }
}

/// Controller runtime settings derived from [`ControllerConfig`]
pub fn run_config(config: &ControllerConfig) -> ControllerRunConfig {
    ControllerRunConfig::default().concurrency(config.concurrency)
}

/// Build the pod reflector and ImageBuild controller futures
pub fn build_controllers(client: Client, config: ControllerConfig) -> Vec<ControllerFuture> {
    let namespace = config.namespace.clone();
    let pods: Api<Pod> = scoped_api(client.clone(), namespace.as_deref());
    let builds: Api<ImageBuild> = scoped_api(client.clone(), namespace.as_deref());

    match namespace.as_deref() {
        Some(ns) => info!(namespace = ns, "watching ImageBuilds in one namespace"),
        None => info!("watching ImageBuilds in all namespaces"),
    }

    let (workers, writer) = reflector::store::<Pod>();
    let pod_reflector = watcher::watcher(pods.clone(), watcher_config())
        .default_backoff()
        .reflect(writer)
        .applied_objects()
        .for_each(|event| {
            if let Err(e) = event {
                warn!(error = %e, "pod watch error");
            }
            ready(())
        });

    let ctx = Arc::new(
        Context::builder(client, workers.clone())
            .config(config.clone())
            .build(),
    );

    let controller = Controller::new(builds, watcher_config()).with_config(run_config(&config));
    let build_cache = controller.store();
    let build_controller = controller
        .watches(pods, watcher_config(), move |pod| {
            on_worker_changed(Some(&pod), &build_cache)
        })
        .shutdown_on_signal()
        .run(reconcile, error_policy, ctx)
        .for_each(log_reconcile_result("ImageBuild"));

    let pod_reflector: ControllerFuture = Box::pin(pod_reflector);
    let build_controller: ControllerFuture = Box::pin(after_sync(workers, build_controller));
    vec![pod_reflector, build_controller]
}

/// Run `controller` once `workers` has seen its first full list
async fn after_sync(workers: Store<Pod>, controller: impl Future<Output = ()>) {
    if workers.wait_until_ready().await.is_err() {
        warn!("pod reflector stopped before syncing");
        return;
    }
    info!("worker cache synced, starting ImageBuild controller");
    controller.await;
}

fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => tracing::error!(error = ?e, "{} reconciliation error", controller_name),
        }
        ready(())
    }
}
