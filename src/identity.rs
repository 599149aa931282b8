//! Naming scheme shared by an ImageBuild and its worker pod
//!
//! The worker pod carries exactly the ImageBuild's name, in the same
//! namespace. The controller relies on this in both directions: to find the
//! worker for a build, and to find the build for a changed pod. Both
//! directions live here so the coupling is a single pair of functions.

use k8s_openapi::api::core::v1::Pod;
use kube::runtime::reflector::ObjectRef;
use kube::ResourceExt;

use crate::crd::ImageBuild;

/// Name of the worker pod for an ImageBuild
pub fn worker_name(build: &ImageBuild) -> String {
    build.name_any()
}

/// Reference to the ImageBuild a worker pod was created for
///
/// Returns `None` for pods without a namespace; every pod the API server
/// delivers has one.
pub fn build_ref_for_worker(pod: &Pod) -> Option<ObjectRef<ImageBuild>> {
    let namespace = pod.namespace()?;
    Some(ObjectRef::new(&pod.name_any()).within(&namespace))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::ImageBuildSpec;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn build(name: &str, namespace: &str) -> ImageBuild {
        let mut build = ImageBuild::new(name, ImageBuildSpec::default());
        build.metadata.namespace = Some(namespace.to_string());
        build
    }

    #[test]
    fn worker_name_is_build_name() {
        assert_eq!(worker_name(&build("api-server", "ci")), "api-server");
    }

    #[test]
    fn worker_maps_back_to_its_build() {
        let build = build("api-server", "ci");
        let pod = Pod {
            metadata: ObjectMeta {
                name: Some(worker_name(&build)),
                namespace: Some("ci".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };

        let reference = build_ref_for_worker(&pod).unwrap();
        assert_eq!(reference.name, "api-server");
        assert_eq!(reference.namespace.as_deref(), Some("ci"));
    }

    #[test]
    fn pod_without_namespace_has_no_build() {
        let pod = Pod {
            metadata: ObjectMeta {
                name: Some("api-server".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(build_ref_for_worker(&pod).is_none());
    }
}
