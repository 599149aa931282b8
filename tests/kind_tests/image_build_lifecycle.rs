//! ImageBuild lifecycle against a live cluster
//!
//! Each test uses its own ImageBuild name so they can share the namespace.

use std::time::Duration;

use k8s_openapi::api::core::v1::{Container, Pod, PodSpec};
use k8s_openapi::api::events::v1::Event;
use kube::api::{Api, DeleteParams, ListParams, ObjectMeta, PostParams};
use kube::ResourceExt;

use img_controller::crd::{ImageBuild, ImageBuildSpec, RepositorySpec};
use img_controller::events::reasons;
use img_controller::workload::{BUILD_CONTAINER, FETCH_CONTAINER};

use super::helpers::{spawn_controller, test_client, wait_for, TEST_NAMESPACE};

const TIMEOUT: Duration = Duration::from_secs(90);

fn sample_build(name: &str) -> ImageBuild {
    ImageBuild::new(
        name,
        ImageBuildSpec {
            image_name: format!("localhost/e2e/{name}:latest"),
            repository: RepositorySpec {
                url: "https://github.com/mudler/img-controller".to_string(),
                checkout: None,
            },
            ..Default::default()
        },
    )
}

async fn cleanup(builds: &Api<ImageBuild>, pods: &Api<Pod>, name: &str) {
    let _ = builds.delete(name, &DeleteParams::default()).await;
    let _ = pods.delete(name, &DeleteParams::background()).await;
}

/// A user applies an ImageBuild and gets exactly one owned worker pod whose
/// phase shows up in the build's status
#[tokio::test]
#[ignore]
async fn story_build_gets_worker_and_mirrored_status() {
    let client = test_client().await;
    let builds: Api<ImageBuild> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let pods: Api<Pod> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let name = "e2e-happy-path";
    cleanup(&builds, &pods, name).await;

    let controller = spawn_controller(client.clone());

    let build = builds
        .create(&PostParams::default(), &sample_build(name))
        .await
        .expect("ImageBuild create should succeed");

    let worker = wait_for("worker pod", TIMEOUT, || async {
        pods.get_opt(name).await.ok().flatten()
    })
    .await;

    let owner = &worker.owner_references()[0];
    assert_eq!(owner.kind, "ImageBuild");
    assert_eq!(Some(owner.uid.clone()), build.uid());
    assert_eq!(owner.controller, Some(true));

    let spec = worker.spec.as_ref().unwrap();
    assert_eq!(spec.init_containers.as_ref().unwrap()[0].name, FETCH_CONTAINER);
    assert_eq!(spec.containers[0].name, BUILD_CONTAINER);

    let state = wait_for("status.state", TIMEOUT, || async {
        builds
            .get(name)
            .await
            .ok()
            .and_then(|b| b.status)
            .map(|s| s.state)
            .filter(|s| !s.is_empty())
    })
    .await;
    assert!(
        ["Pending", "Running", "Succeeded", "Failed"].contains(&state.as_str()),
        "unexpected state {state}"
    );

    // Deleting the build garbage-collects the worker
    builds
        .delete(name, &DeleteParams::foreground())
        .await
        .expect("ImageBuild delete should succeed");
    wait_for("worker deletion", TIMEOUT, || async {
        match pods.get_opt(name).await {
            Ok(None) => Some(()),
            _ => None,
        }
    })
    .await;

    controller.abort();
}

/// A pod with the build's name that someone else created is left untouched,
/// and the user is told about it with a warning event
#[tokio::test]
#[ignore]
async fn story_foreign_pod_is_reported_not_adopted() {
    let client = test_client().await;
    let builds: Api<ImageBuild> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let pods: Api<Pod> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let events: Api<Event> = Api::namespaced(client.clone(), TEST_NAMESPACE);
    let name = "e2e-foreign-pod";
    cleanup(&builds, &pods, name).await;

    let squatter = Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        spec: Some(PodSpec {
            containers: vec![Container {
                name: "sleep".to_string(),
                image: Some("busybox:1.36".to_string()),
                command: Some(vec!["sleep".to_string(), "3600".to_string()]),
                ..Default::default()
            }],
            ..Default::default()
        }),
        ..Default::default()
    };
    pods.create(&PostParams::default(), &squatter)
        .await
        .expect("squatter pod create should succeed");

    let controller = spawn_controller(client.clone());
    builds
        .create(&PostParams::default(), &sample_build(name))
        .await
        .expect("ImageBuild create should succeed");

    let warning = wait_for("ErrResourceExists event", TIMEOUT, || async {
        events
            .list(&ListParams::default())
            .await
            .ok()?
            .items
            .into_iter()
            .find(|e| {
                e.reason.as_deref() == Some(reasons::RESOURCE_EXISTS)
                    && e.regarding.as_ref().and_then(|r| r.name.as_deref()) == Some(name)
            })
    })
    .await;
    assert_eq!(warning.type_.as_deref(), Some("Warning"));

    let pod = pods.get(name).await.expect("squatter pod should still exist");
    assert!(pod.owner_references().is_empty());

    let build = builds.get(name).await.unwrap();
    assert!(build.status.map(|s| s.state).unwrap_or_default().is_empty());

    cleanup(&builds, &pods, name).await;
    controller.abort();
}
