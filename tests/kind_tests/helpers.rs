//! Shared setup for cluster-backed tests

use std::future::Future;
use std::time::Duration;

use k8s_openapi::api::core::v1::Namespace;
use kube::api::{Api, ObjectMeta, PostParams};
use kube::Client;

use img_controller::config::ControllerConfig;
use img_controller::crds;
use img_controller::retry::RetryConfig;
use img_controller::router::build_controllers;

/// Namespace every e2e object lives in
pub const TEST_NAMESPACE: &str = "img-controller-e2e";

/// Client for the current kubeconfig, with the CRD installed
pub async fn test_client() -> Client {
    let _ = rustls::crypto::ring::default_provider().install_default();

    let client = Client::try_default()
        .await
        .expect("a cluster must be reachable from the current kubeconfig");
    crds::ensure_installed(&client, &RetryConfig::startup())
        .await
        .expect("CRD install should succeed");
    ensure_namespace(&client, TEST_NAMESPACE).await;
    client
}

/// Create `name` if it does not exist yet
pub async fn ensure_namespace(client: &Client, name: &str) {
    let namespaces: Api<Namespace> = Api::all(client.clone());
    let ns = Namespace {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        ..Default::default()
    };
    match namespaces.create(&PostParams::default(), &ns).await {
        Ok(_) => {}
        Err(kube::Error::Api(ae)) if ae.code == 409 => {}
        Err(e) => panic!("failed to create namespace {name}: {e}"),
    }
}

/// Run the controller against the test namespace until the test ends
pub fn spawn_controller(client: Client) -> tokio::task::JoinHandle<()> {
    let config = ControllerConfig {
        namespace: Some(TEST_NAMESPACE.to_string()),
        error_requeue: Duration::from_secs(2),
        ..Default::default()
    };
    tokio::spawn(async move {
        futures::future::select_all(build_controllers(client, config)).await;
    })
}

/// Poll `check` every second until it yields a value or `timeout` passes
pub async fn wait_for<T, F, Fut>(what: &str, timeout: Duration, mut check: F) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Some(value) = check().await {
            return value;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out after {timeout:?} waiting for {what}");
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}
