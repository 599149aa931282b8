//! ImageBuild controller
//!
//! Reconciliation is split in two:
//! - [`decide`] computes what to do from a build and its cached worker, with no I/O
//! - [`reconcile_build`] performs the create/status/event calls around it
//!
//! Cluster access goes through the [`BuildClient`] and [`BuildCache`] traits so
//! the handlers can be driven by mocks in tests.

mod image_build;

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::runtime::reflector::{ObjectRef, Store};
use kube::{Client, ResourceExt};

#[cfg(test)]
use mockall::automock;

use crate::config::ControllerConfig;
use crate::crd::ImageBuild;
use crate::events::{EventPublisher, KubeEventPublisher};
use crate::{Error, CONTROLLER_NAME};

pub use image_build::{
    decide, error_policy, is_controlled_by, on_worker_changed, reconcile, reconcile_build,
    Decision,
};

/// Cluster operations the ImageBuild handler needs
#[cfg_attr(test, automock)]
#[async_trait]
pub trait BuildClient: Send + Sync {
    /// Look up a worker pod in the local cache
    fn cached_worker(&self, namespace: &str, name: &str) -> Option<Pod>;

    /// Read a worker pod from the API server, bypassing the cache
    async fn get_worker(&self, namespace: &str, name: &str) -> Result<Pod, Error>;

    /// Create a worker pod, returning the object as persisted
    async fn create_worker(&self, pod: &Pod) -> Result<Pod, Error>;

    /// Persist the status of `build`
    ///
    /// Only the status subresource is written. The build's resourceVersion is
    /// sent along, so a concurrent writer surfaces as a conflict error.
    async fn update_status(&self, build: &ImageBuild) -> Result<ImageBuild, Error>;
}

/// Read access to cached ImageBuilds, used when mapping pod events
#[cfg_attr(test, automock)]
pub trait BuildCache: Send + Sync {
    /// Look up an ImageBuild by namespace and name
    fn get_build(&self, namespace: &str, name: &str) -> Option<Arc<ImageBuild>>;
}

impl BuildCache for Store<ImageBuild> {
    fn get_build(&self, namespace: &str, name: &str) -> Option<Arc<ImageBuild>> {
        self.get(&ObjectRef::new(name).within(namespace))
    }
}

/// [`BuildClient`] backed by a pod reflector store and the API server
pub struct KubeBuildClient {
    client: Client,
    workers: Store<Pod>,
}

impl KubeBuildClient {
    /// Create a client reading workers from `workers`
    pub fn new(client: Client, workers: Store<Pod>) -> Self {
        Self { client, workers }
    }
}

#[async_trait]
impl BuildClient for KubeBuildClient {
    fn cached_worker(&self, namespace: &str, name: &str) -> Option<Pod> {
        self.workers
            .get(&ObjectRef::new(name).within(namespace))
            .map(|pod| (*pod).clone())
    }

    async fn get_worker(&self, namespace: &str, name: &str) -> Result<Pod, Error> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        Ok(api.get(name).await?)
    }

    async fn create_worker(&self, pod: &Pod) -> Result<Pod, Error> {
        let namespace = pod.namespace().ok_or(Error::MissingField("metadata.namespace"))?;
        let api: Api<Pod> = Api::namespaced(self.client.clone(), &namespace);
        Ok(api.create(&PostParams::default(), pod).await?)
    }

    async fn update_status(&self, build: &ImageBuild) -> Result<ImageBuild, Error> {
        let namespace = build
            .namespace()
            .ok_or(Error::MissingField("metadata.namespace"))?;
        let api: Api<ImageBuild> = Api::namespaced(self.client.clone(), &namespace);

        let patch = serde_json::json!({
            "metadata": { "resourceVersion": build.resource_version() },
            "status": build.status,
        });

        Ok(api
            .patch_status(
                &build.name_any(),
                &PatchParams::default(),
                &Patch::Merge(&patch),
            )
            .await?)
    }
}

/// Shared state for every reconcile call
///
/// Build with [`Context::builder`]:
///
/// ```ignore
/// let ctx = Context::builder(client, workers)
///     .config(config)
///     .build();
/// ```
pub struct Context {
    /// Cluster access (trait object for testability)
    pub client: Arc<dyn BuildClient>,
    /// Kubernetes Event sink
    pub events: Arc<dyn EventPublisher>,
    /// Runtime settings
    pub config: ControllerConfig,
}

impl Context {
    /// Create a builder for a kube-backed context
    pub fn builder(client: Client, workers: Store<Pod>) -> ContextBuilder {
        ContextBuilder::new(client, workers)
    }

    /// Create a context from already-constructed collaborators
    ///
    /// Intended for unit tests driving the handlers with mocks.
    #[cfg(test)]
    pub fn for_testing(
        client: Arc<dyn BuildClient>,
        events: Arc<dyn EventPublisher>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            client,
            events,
            config,
        }
    }
}

/// Builder for [`Context`]
pub struct ContextBuilder {
    client: Client,
    workers: Store<Pod>,
    events: Option<Arc<dyn EventPublisher>>,
    config: ControllerConfig,
}

impl ContextBuilder {
    fn new(client: Client, workers: Store<Pod>) -> Self {
        Self {
            client,
            workers,
            events: None,
            config: ControllerConfig::default(),
        }
    }

    /// Set runtime settings
    pub fn config(mut self, config: ControllerConfig) -> Self {
        self.config = config;
        self
    }

    /// Override the event publisher
    pub fn event_publisher(mut self, events: Arc<dyn EventPublisher>) -> Self {
        self.events = Some(events);
        self
    }

    /// Build the Context
    pub fn build(self) -> Context {
        let events = self.events.unwrap_or_else(|| {
            Arc::new(KubeEventPublisher::new(
                self.client.clone(),
                CONTROLLER_NAME,
            ))
        });
        Context {
            client: Arc::new(KubeBuildClient::new(self.client, self.workers)),
            events,
            config: self.config,
        }
    }
}
