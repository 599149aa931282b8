//! Worker pod synthesis
//!
//! Builds the one-shot pod that fetches an ImageBuild's repository and builds
//! (and optionally pushes) its image:
//! - init container `spec-fetch`: clones the repository into a shared emptyDir
//! - container `spec-build`: runs `img build`, wrapped in `img login`/`img push`
//!   when registry credentials are enabled
//!
//! Everything here is a pure function of the ImageBuild and [`WorkerConfig`].

use std::borrow::Cow;
use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    Container, EmptyDirVolumeSource, EnvVar, EnvVarSource, Pod, PodSecurityContext, PodSpec,
    SecretKeySelector, SecurityContext, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::{Resource, ResourceExt};

use crate::crd::{ImageBuild, ImageBuildSpec};
use crate::identity::worker_name;

/// Default image for both worker containers (ships git, bash and img)
pub const DEFAULT_WORKER_IMAGE: &str = "quay.io/mudler/img-controller:latest";

/// Name of the init container that clones the repository
pub const FETCH_CONTAINER: &str = "spec-fetch";

/// Name of the container that builds and pushes the image
pub const BUILD_CONTAINER: &str = "spec-build";

/// Shared volume holding the cloned repository
pub const REPOSITORY_VOLUME: &str = "repository";

/// Mount path of the shared repository volume in both containers
pub const REPOSITORY_PATH: &str = "/repository";

/// Env var carrying the registry username
pub const ENV_REGISTRY_USERNAME: &str = "REGISTRY_USERNAME";
/// Env var carrying the registry password
pub const ENV_REGISTRY_PASSWORD: &str = "REGISTRY_PASSWORD";
/// Env var carrying the registry URI
pub const ENV_REGISTRY_URI: &str = "REGISTRY_URI";

/// Secret key holding the registry username
pub const SECRET_KEY_USERNAME: &str = "registryUsername";
/// Secret key holding the registry password
pub const SECRET_KEY_PASSWORD: &str = "registryPassword";
/// Secret key holding the registry URI
pub const SECRET_KEY_URI: &str = "registryUri";

/// User name img runs as inside the build container
const BUILD_USER: &str = "img";

/// UID for unprivileged builds
const UNPRIVILEGED_UID: i64 = 1000;

/// img needs to inspect its own /proc to set up its sandbox
const PROC_MOUNT_UNMASKED: &str = "Unmasked";

/// Annotations img needs for nested sandboxing, keyed to the build container
pub const APPARMOR_ANNOTATION: &str = "container.apparmor.security.beta.kubernetes.io/spec-build";
/// Seccomp counterpart of [`APPARMOR_ANNOTATION`]
pub const SECCOMP_ANNOTATION: &str = "container.seccomp.security.alpha.kubernetes.io/spec-build";
const UNCONFINED: &str = "unconfined";

/// Settings for worker pods that do not come from the ImageBuild
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Image for the fetch and build containers
    pub image: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            image: DEFAULT_WORKER_IMAGE.to_string(),
        }
    }
}

/// Shell command for the fetch container
///
/// Clones into the shared volume and, when a checkout ref is given, creates
/// and switches to a local `build` branch at that ref.
pub fn fetch_command(spec: &ImageBuildSpec) -> String {
    let url = shell_quote(&spec.repository.url);
    match spec.repository.checkout_ref() {
        None => format!("git clone {} {}", url, REPOSITORY_PATH),
        Some(checkout) => format!(
            "git clone {url} {path} && cd {path} && git checkout -b build {checkout}",
            path = REPOSITORY_PATH,
            checkout = shell_quote(checkout),
        ),
    }
}

/// Shell command for the build container
///
/// `img build` runs from the cloned tree. With credentials enabled the build
/// is preceded by `img login` and followed by `img push`, chained with `&&`
/// so any failing step fails the container.
pub fn build_command(spec: &ImageBuildSpec) -> String {
    let mut steps = Vec::with_capacity(4);

    if spec.registry_credentials.enabled {
        steps.push(format!(
            "img login -u ${} -p ${} ${}",
            ENV_REGISTRY_USERNAME, ENV_REGISTRY_PASSWORD, ENV_REGISTRY_URI
        ));
    }

    steps.push(format!("cd {}", REPOSITORY_PATH));

    let image = shell_quote(&spec.image_name);
    let mut build = format!("img build -t {}", image);
    if let Some(dockerfile) = spec.dockerfile_path() {
        build.push_str(" -f ");
        build.push_str(&shell_quote(dockerfile));
    }
    build.push(' ');
    build.push_str(&shell_quote(spec.context_dir()));
    steps.push(build);

    if spec.registry_credentials.enabled {
        steps.push(format!("img push {}", image));
    }

    steps.join(" && ")
}

/// Quote `value` as a single bash word
///
/// Values made only of characters bash never interprets are returned as is.
/// Anything else is single-quoted, with embedded quotes spelled `'\''`.
fn shell_quote(value: &str) -> Cow<'_, str> {
    let is_plain = |c: char| c.is_ascii_alphanumeric() || "_@%+=:,./-".contains(c);
    if !value.is_empty() && value.chars().all(is_plain) {
        return Cow::Borrowed(value);
    }
    Cow::Owned(format!("'{}'", value.replace('\'', r"'\''")))
}

/// Registry credential env vars for the build container
///
/// Values reference the configured Secret when `fromSecret` is set and are
/// taken from the literal `username`, `password` and `registry` fields otherwise.
pub fn registry_env(spec: &ImageBuildSpec) -> Vec<EnvVar> {
    let creds = &spec.registry_credentials;
    match creds.secret_name() {
        Some(secret) => vec![
            secret_env(ENV_REGISTRY_USERNAME, secret, SECRET_KEY_USERNAME),
            secret_env(ENV_REGISTRY_PASSWORD, secret, SECRET_KEY_PASSWORD),
            secret_env(ENV_REGISTRY_URI, secret, SECRET_KEY_URI),
        ],
        None => vec![
            literal_env(ENV_REGISTRY_USERNAME, creds.username.as_deref()),
            literal_env(ENV_REGISTRY_PASSWORD, creds.password.as_deref()),
            literal_env(ENV_REGISTRY_URI, creds.registry.as_deref()),
        ],
    }
}

fn secret_env(name: &str, secret: &str, key: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value_from: Some(EnvVarSource {
            secret_key_ref: Some(SecretKeySelector {
                name: secret.to_string(),
                key: key.to_string(),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn literal_env(name: &str, value: Option<&str>) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.unwrap_or_default().to_string()),
        ..Default::default()
    }
}

/// Full env for the build container: registry credentials plus `USER`
pub fn build_env(spec: &ImageBuildSpec) -> Vec<EnvVar> {
    let mut env = registry_env(spec);
    env.push(literal_env("USER", Some(BUILD_USER)));
    env
}

/// Pod annotations: the caller's, with the AppArmor/seccomp opt-outs forced on
pub fn worker_annotations(spec: &ImageBuildSpec) -> BTreeMap<String, String> {
    let mut annotations = spec.annotations.clone();
    annotations.insert(APPARMOR_ANNOTATION.to_string(), UNCONFINED.to_string());
    annotations.insert(SECCOMP_ANNOTATION.to_string(), UNCONFINED.to_string());
    annotations
}

/// Security context for the build container
pub fn build_security_context(spec: &ImageBuildSpec) -> SecurityContext {
    SecurityContext {
        run_as_user: Some(run_as_user(spec)),
        privileged: Some(spec.privileged),
        proc_mount: Some(PROC_MOUNT_UNMASKED.to_string()),
        ..Default::default()
    }
}

fn run_as_user(spec: &ImageBuildSpec) -> i64 {
    if spec.privileged {
        0
    } else {
        UNPRIVILEGED_UID
    }
}

/// Controller owner reference pointing at the ImageBuild
pub fn owner_reference(build: &ImageBuild) -> OwnerReference {
    OwnerReference {
        api_version: ImageBuild::api_version(&()).to_string(),
        kind: ImageBuild::kind(&()).to_string(),
        name: build.name_any(),
        uid: build.uid().unwrap_or_default(),
        controller: Some(true),
        block_owner_deletion: Some(true),
    }
}

fn repository_mount() -> VolumeMount {
    VolumeMount {
        name: REPOSITORY_VOLUME.to_string(),
        mount_path: REPOSITORY_PATH.to_string(),
        ..Default::default()
    }
}

/// Build the worker pod for an ImageBuild
///
/// The pod:
/// - is named by [`worker_name`] in the build's namespace
/// - is controlled by the ImageBuild (garbage collected with it)
/// - never restarts, so each ImageBuild runs at most once
/// - does not mount a service account token
pub fn build_worker_pod(build: &ImageBuild, config: &WorkerConfig) -> Pod {
    let spec = &build.spec;

    let fetch = Container {
        name: FETCH_CONTAINER.to_string(),
        image: Some(config.image.clone()),
        image_pull_policy: Some("IfNotPresent".to_string()),
        command: Some(vec!["/bin/bash".to_string(), "-cxe".to_string()]),
        args: Some(vec![fetch_command(spec)]),
        volume_mounts: Some(vec![repository_mount()]),
        ..Default::default()
    };

    let build_container = Container {
        name: BUILD_CONTAINER.to_string(),
        image: Some(config.image.clone()),
        image_pull_policy: Some("Always".to_string()),
        command: Some(vec!["/bin/bash".to_string(), "-ce".to_string()]),
        args: Some(vec![build_command(spec)]),
        env: Some(build_env(spec)),
        resources: spec.resources.clone(),
        security_context: Some(build_security_context(spec)),
        volume_mounts: Some(vec![repository_mount()]),
        ..Default::default()
    };

    Pod {
        metadata: ObjectMeta {
            name: Some(worker_name(build)),
            namespace: build.namespace(),
            annotations: Some(worker_annotations(spec)),
            labels: (!spec.labels.is_empty()).then(|| spec.labels.clone()),
            owner_references: Some(vec![owner_reference(build)]),
            ..Default::default()
        },
        spec: Some(PodSpec {
            automount_service_account_token: Some(false),
            node_selector: (!spec.node_selector.is_empty()).then(|| spec.node_selector.clone()),
            init_containers: Some(vec![fetch]),
            containers: vec![build_container],
            security_context: Some(PodSecurityContext {
                run_as_user: Some(run_as_user(spec)),
                ..Default::default()
            }),
            restart_policy: Some("Never".to_string()),
            volumes: Some(vec![Volume {
                name: REPOSITORY_VOLUME.to_string(),
                empty_dir: Some(EmptyDirVolumeSource::default()),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}
