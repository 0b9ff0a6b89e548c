//! Persistent volume claims that own a workspace
//!
//! The claim outlives every pod created for the workspace and carries the
//! configuration snapshot as an annotation.

use crate::{ContainerInfo, DriverError, ResourceLabels, Result, SnapshotStore};
use async_trait::async_trait;
use kubedev_config::KubernetesConfig;
use kubedev_provider::{
    KubernetesClient, ObjectMeta, PersistentVolumeClaim, PersistentVolumeClaimSpec,
    ResourceRequirements,
};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Annotation holding the serialized [`ContainerInfo`]
pub const INFO_ANNOTATION: &str = "devpod.sh/info";

/// Snapshot store backed by persistent volume claim annotations
pub struct VolumeManager {
    client: Arc<dyn KubernetesClient>,
    disk_size: String,
    storage_class: Option<String>,
    labels: ResourceLabels,
}

impl VolumeManager {
    pub fn new(
        client: Arc<dyn KubernetesClient>,
        config: &KubernetesConfig,
        labels: ResourceLabels,
    ) -> Self {
        Self {
            client,
            disk_size: config.disk_size.clone(),
            storage_class: config.storage_class.clone().filter(|s| !s.is_empty()),
            labels,
        }
    }

    /// The claim `put` submits for a new workspace
    pub fn claim_for(&self, id: &str, info: &ContainerInfo) -> Result<PersistentVolumeClaim> {
        let metadata = ObjectMeta {
            name: id.to_string(),
            labels: self.labels.to_map(),
            annotations: BTreeMap::from([(INFO_ANNOTATION.to_string(), info.encode()?)]),
            ..Default::default()
        };

        let spec = PersistentVolumeClaimSpec {
            access_modes: vec!["ReadWriteOnce".to_string()],
            resources: ResourceRequirements {
                requests: BTreeMap::from([("storage".to_string(), self.disk_size.clone())]),
                ..Default::default()
            },
            storage_class_name: self.storage_class.clone(),
        };

        Ok(PersistentVolumeClaim::new(metadata, spec))
    }
}

#[async_trait]
impl SnapshotStore for VolumeManager {
    async fn get(&self, id: &str) -> Result<Option<ContainerInfo>> {
        let claim = self
            .client
            .get_volume(id)
            .await
            .map_err(|e| DriverError::Lookup {
                id: id.to_string(),
                source: e,
            })?;

        let Some(claim) = claim else {
            return Ok(None);
        };

        let Some(raw) = claim.metadata.annotations.get(INFO_ANNOTATION) else {
            tracing::warn!(
                "Persistent volume '{}' has no {} annotation, treating as missing",
                id,
                INFO_ANNOTATION
            );
            return Ok(None);
        };

        match ContainerInfo::decode(raw) {
            Ok(info) => Ok(Some(info)),
            Err(e) => {
                tracing::warn!(
                    "Persistent volume '{}' has an unreadable snapshot ({}), treating as missing",
                    id,
                    e
                );
                Ok(None)
            }
        }
    }

    async fn put(&self, id: &str, info: &ContainerInfo) -> Result<()> {
        let claim = self.claim_for(id, info)?;

        tracing::info!("Create Persistent Volume '{}'", id);
        self.client
            .create_volume(&claim)
            .await
            .map_err(|e| DriverError::Create {
                kind: "persistent volume claim",
                name: id.to_string(),
                source: e,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MockCall, MockClient};
    use kubedev_provider::ProviderError;

    fn manager(client: &Arc<MockClient>, config: &KubernetesConfig) -> VolumeManager {
        VolumeManager::new(client.clone(), config, ResourceLabels::default())
    }

    fn info() -> ContainerInfo {
        ContainerInfo {
            image_name: "alpine".to_string(),
            workspace_mount: "type=bind,source=/src,target=/ws".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_claim_carries_snapshot_and_labels() {
        let client = Arc::new(MockClient::new());
        let config = KubernetesConfig {
            disk_size: "20Gi".to_string(),
            storage_class: Some("fast".to_string()),
            ..Default::default()
        };
        let claim = manager(&client, &config).claim_for("devpod-ws", &info()).unwrap();

        assert_eq!(claim.kind, "PersistentVolumeClaim");
        assert_eq!(claim.metadata.name, "devpod-ws");
        assert_eq!(claim.metadata.labels, ResourceLabels::default().to_map());
        assert_eq!(claim.spec.resources.requests["storage"], "20Gi");
        assert_eq!(claim.spec.storage_class_name.as_deref(), Some("fast"));
        assert_eq!(claim.spec.access_modes, vec!["ReadWriteOnce".to_string()]);

        let raw = &claim.metadata.annotations[INFO_ANNOTATION];
        assert_eq!(ContainerInfo::decode(raw).unwrap(), info());
    }

    #[test]
    fn test_empty_storage_class_uses_cluster_default() {
        let client = Arc::new(MockClient::new());
        let config = KubernetesConfig {
            storage_class: Some(String::new()),
            ..Default::default()
        };
        let claim = manager(&client, &config).claim_for("devpod-ws", &info()).unwrap();
        assert!(claim.spec.storage_class_name.is_none());
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let client = Arc::new(MockClient::new());
        let volumes = manager(&client, &KubernetesConfig::default());

        assert!(volumes.get("devpod-ws").await.unwrap().is_none());
        volumes.put("devpod-ws", &info()).await.unwrap();
        assert_eq!(volumes.get("devpod-ws").await.unwrap(), Some(info()));

        assert_eq!(
            client.get_calls(),
            vec![
                MockCall::GetVolume { name: "devpod-ws".into() },
                MockCall::CreateVolume { name: "devpod-ws".into() },
                MockCall::GetVolume { name: "devpod-ws".into() },
            ]
        );
    }

    #[tokio::test]
    async fn test_second_put_is_rejected() {
        let client = Arc::new(MockClient::new());
        let volumes = manager(&client, &KubernetesConfig::default());

        volumes.put("devpod-ws", &info()).await.unwrap();
        let err = volumes.put("devpod-ws", &info()).await.unwrap_err();
        assert!(matches!(err, DriverError::Create { kind: "persistent volume claim", .. }));
    }

    #[tokio::test]
    async fn test_claim_without_annotation_is_missing() {
        let client = Arc::new(MockClient::new());
        client.insert_volume(PersistentVolumeClaim::new(
            ObjectMeta {
                name: "devpod-ws".to_string(),
                ..Default::default()
            },
            PersistentVolumeClaimSpec::default(),
        ));

        let volumes = manager(&client, &KubernetesConfig::default());
        assert!(volumes.get("devpod-ws").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unreadable_snapshot_is_missing() {
        let client = Arc::new(MockClient::new());
        client.insert_volume(PersistentVolumeClaim::new(
            ObjectMeta {
                name: "devpod-ws".to_string(),
                annotations: BTreeMap::from([(INFO_ANNOTATION.to_string(), "{broken".to_string())]),
                ..Default::default()
            },
            PersistentVolumeClaimSpec::default(),
        ));

        let volumes = manager(&client, &KubernetesConfig::default());
        assert!(volumes.get("devpod-ws").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_lookup_failure_is_lookup_error() {
        let client = Arc::new(MockClient::new());
        *client.get_volume_error.lock().unwrap() = Some(ProviderError::CommandFailed {
            command: "get pvc devpod-ws".to_string(),
            output: "Unable to connect to the server".to_string(),
        });

        let volumes = manager(&client, &KubernetesConfig::default());
        let err = volumes.get("devpod-ws").await.unwrap_err();
        assert!(matches!(err, DriverError::Lookup { .. }));
        assert_eq!(err.output(), Some("Unable to connect to the server"));
    }
}
