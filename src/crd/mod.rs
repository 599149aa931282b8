//! Custom Resource Definitions for the image build controller

mod image_build;
mod types;

pub use image_build::{ImageBuild, ImageBuildSpec, ImageBuildStatus, DEFAULT_BUILD_CONTEXT};
pub use types::{RegistryCredentials, RepositorySpec};
