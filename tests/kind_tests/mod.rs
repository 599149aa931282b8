//! Cluster-backed tests for the ImageBuild controller
//!
//! - `helpers`: client setup, namespaces, polling and an in-process controller
//! - `image_build_lifecycle`: worker creation, status mirroring, garbage
//!   collection and the foreign-pod conflict, as a user sees them via the API

mod helpers;
mod image_build_lifecycle;
