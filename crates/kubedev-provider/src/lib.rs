//! Kubernetes client for kubedev
//!
//! This crate provides the narrow orchestrator surface the driver needs
//! (namespaces, persistent volume claims, service accounts, pods and file
//! copies) behind a trait, plus a kubectl-backed implementation.

mod error;
mod kubectl;
mod types;

pub use error::*;
pub use kubectl::KubectlClient;
pub use types::*;

use async_trait::async_trait;
use std::path::Path;

/// Trait for Kubernetes clients
#[async_trait]
pub trait KubernetesClient: Send + Sync {
    /// Create a namespace. Fails if it already exists.
    async fn ensure_namespace(&self, name: &str) -> Result<()>;

    /// Get a persistent volume claim by name, `None` if it does not exist
    async fn get_volume(&self, name: &str) -> Result<Option<PersistentVolumeClaim>>;

    /// Create a persistent volume claim
    async fn create_volume(&self, claim: &PersistentVolumeClaim) -> Result<()>;

    /// Create a service account; an existing one is not an error
    async fn create_service_account(&self, name: &str) -> Result<()>;

    /// Submit a pod, returning kubectl's raw output
    async fn submit_pod(&self, pod: &Pod) -> Result<String>;

    /// Get a pod (including status) by name, `None` if it does not exist
    async fn get_pod(&self, name: &str) -> Result<Option<Pod>>;

    /// Copy a local path into a container of a running pod.
    ///
    /// `workdir` is the directory relative `src` paths are resolved against.
    async fn copy_into_pod(
        &self,
        pod: &str,
        container: &str,
        src: &str,
        dest: &str,
        workdir: Option<&Path>,
    ) -> Result<()>;
}
