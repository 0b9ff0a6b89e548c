//! First-run copy of local data into the pod

use crate::{DriverError, Result, CONTAINER_NAME};
use kubedev_config::Mount;
use kubedev_provider::KubernetesClient;
use std::path::Path;

/// Copies mount sources into a running pod, in order
pub struct DataSeeder<'a> {
    client: &'a dyn KubernetesClient,
}

impl<'a> DataSeeder<'a> {
    pub fn new(client: &'a dyn KubernetesClient) -> Self {
        Self { client }
    }

    /// Copy the contents of each mount's source to its target in pod `id`.
    ///
    /// Relative sources resolve against `workdir`. Stops at the first
    /// failure; whatever was copied before stays in the pod.
    pub async fn seed(&self, id: &str, mounts: &[Mount], workdir: Option<&Path>) -> Result<()> {
        for mount in mounts {
            if mount.source.is_empty() {
                tracing::warn!("Mount '{}' has no source, will skip", mount);
                continue;
            }

            let local = trim_trailing_slash(&mount.source);
            let target = trim_trailing_slash(&mount.target);
            let target = if target.is_empty() { "/" } else { target };

            tracing::info!("Copy {} into DevContainer {}", local, target);
            self.client
                .copy_into_pod(
                    id,
                    CONTAINER_NAME,
                    &format!("{}/.", local),
                    target,
                    workdir,
                )
                .await
                .map_err(|e| DriverError::Copy {
                    local: local.to_string(),
                    target: target.to_string(),
                    source: e,
                })?;
        }
        Ok(())
    }
}

fn trim_trailing_slash(path: &str) -> &str {
    path.trim_end_matches('/')
}
