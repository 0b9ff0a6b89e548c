//! The configuration snapshot a workspace was first created with

use crate::Result;
use async_trait::async_trait;
use kubedev_config::{DevContainerConfig, ImageDetails, MergedDevContainerConfig};
use serde::{Deserialize, Serialize};

/// Everything needed to recreate the pod for a workspace.
///
/// Recorded once when the volume is created and never rewritten; `start`
/// rebuilds the pod from it, so later edits to devcontainer.json only take
/// effect once the volume is deleted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct ContainerInfo {
    pub parsed_config: DevContainerConfig,
    pub merged_config: MergedDevContainerConfig,
    pub image_details: ImageDetails,
    pub image_name: String,
    pub workspace_mount: String,
    pub labels: Vec<String>,
}

impl ContainerInfo {
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn decode(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}

/// Storage for snapshots, keyed by workspace identity.
///
/// `put` happens once per identity and establishes the workspace; a store
/// must reject (not overwrite) a second `put` for the same identity.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// The snapshot for `id`, `None` if absent or unreadable
    async fn get(&self, id: &str) -> Result<Option<ContainerInfo>>;

    /// Record the snapshot for a new workspace
    async fn put(&self, id: &str, info: &ContainerInfo) -> Result<()>;
}
