//! Core logic for the kubedev Kubernetes driver
//!
//! This crate provides:
//! - Deterministic resource naming from workspace labels
//! - The persistent volume that owns a workspace and its configuration snapshot
//! - Translation of devcontainer configuration into a pod spec
//! - Waiting for the pod and seeding it with local data on first run
//! - The `run` / `start` lifecycle tying these together

mod driver;
mod entrypoint;
mod error;
mod identity;
mod pod;
mod readiness;
mod seed;
mod snapshot;
mod volume;

pub use driver::*;
pub use entrypoint::*;
pub use error::*;
pub use identity::*;
pub use pod::*;
pub use readiness::*;
pub use seed::*;
pub use snapshot::*;
pub use volume::*;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
