//! img-controller - builds container images from git repositories on Kubernetes
//!
//! An `ImageBuild` names a repository and an image. For each ImageBuild the
//! controller creates one worker pod that clones the repository and runs
//! `img build` (plus `img login`/`img push` when registry credentials are
//! enabled), then mirrors the pod's phase into `status.state`.
//!
//! # Modules
//!
//! - [`crd`] - the ImageBuild custom resource
//! - [`identity`] - naming shared by a build and its worker
//! - [`workload`] - worker pod synthesis
//! - [`status`] - pod phase to status projection
//! - [`controller`] - reconciliation logic
//! - [`events`] - Kubernetes Event publishing
//! - [`router`] - watches and controller wiring
//! - [`crds`] - CRD generation and installation
//! - [`config`] - command-line and environment configuration
//! - [`telemetry`] - logging setup
//! - [`retry`] - backoff for startup calls
//! - [`error`] - error types

#![deny(missing_docs)]

pub mod config;
pub mod controller;
pub mod crd;
pub mod crds;
pub mod error;
pub mod events;
pub mod identity;
pub mod retry;
pub mod router;
pub mod status;
pub mod telemetry;
pub mod workload;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Name the controller reports as, in Events and server-side apply field managers
pub const CONTROLLER_NAME: &str = "img-controller";
