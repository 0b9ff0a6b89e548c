//! The `run` / `start` lifecycle
//!
//! A workspace is established by its persistent volume claim. The first
//! `run` creates the claim with a snapshot of the inputs, starts the pod and
//! seeds it with local data. Every later `run` or `start` only replaces the
//! pod; the data already in the volume is left alone.

use crate::{
    derive_identity, ContainerInfo, DataSeeder, DriverError, PodRequest, PodSpecBuilder,
    ReadinessWaiter, ResourceLabels, Result, SnapshotStore, VolumeManager,
};
use kubedev_config::{DevContainerConfig, ImageDetails, KubernetesConfig, MergedDevContainerConfig};
use kubedev_provider::KubernetesClient;
use std::sync::Arc;
use std::time::Duration;

/// Kubernetes devcontainer driver
pub struct KubernetesDriver {
    client: Arc<dyn KubernetesClient>,
    store: Arc<dyn SnapshotStore>,
    config: KubernetesConfig,
    labels: ResourceLabels,
    poll_interval: Option<Duration>,
}

impl KubernetesDriver {
    /// Create a driver that keeps snapshots on the workspace volume claims
    pub fn new(client: Arc<dyn KubernetesClient>, config: KubernetesConfig) -> Self {
        let labels = ResourceLabels::default();
        let store = Arc::new(VolumeManager::new(client.clone(), &config, labels.clone()));
        Self {
            client,
            store,
            config,
            labels,
            poll_interval: None,
        }
    }

    /// Use a different snapshot store
    pub fn with_store(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.store = store;
        self
    }

    /// Override how often the pod is polled while waiting for it to run
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Create or resume the devcontainer for a workspace.
    ///
    /// Returns the workspace identity. Only the run that creates the volume
    /// copies local data into the pod.
    pub async fn run(
        &self,
        parsed_config: &DevContainerConfig,
        merged_config: &MergedDevContainerConfig,
        image_name: &str,
        workspace_mount: &str,
        labels: &[String],
        image_details: &ImageDetails,
    ) -> Result<String> {
        let id = derive_identity(labels);
        PodSpecBuilder::new(&self.config, &self.labels).validate(workspace_mount)?;

        self.ensure_namespace().await;

        let info = ContainerInfo {
            parsed_config: parsed_config.clone(),
            merged_config: merged_config.clone(),
            image_details: image_details.clone(),
            image_name: image_name.to_string(),
            workspace_mount: workspace_mount.to_string(),
            labels: labels.to_vec(),
        };

        let initialize = match self.store.get(&id).await? {
            Some(_) => {
                tracing::debug!("Persistent volume '{}' exists, resuming", id);
                false
            }
            None => {
                self.store.put(&id, &info).await?;
                true
            }
        };

        self.run_container(&id, &info, initialize).await?;
        Ok(id)
    }

    /// Recreate the pod of an existing workspace from its snapshot
    pub async fn start(&self, id: &str, labels: &[String]) -> Result<()> {
        let Some(info) = self.store.get(id).await? else {
            return Err(DriverError::NotFound(id.to_string()));
        };

        if !labels.is_empty() && labels != info.labels.as_slice() {
            tracing::debug!("Ignoring labels for '{}', using the recorded ones", id);
        }

        self.run_container(id, &info, false).await
    }

    async fn ensure_namespace(&self) {
        let Some(namespace) = self.config.namespace() else {
            return;
        };
        if !self.config.create_namespace {
            return;
        }

        tracing::debug!("Create namespace '{}'", namespace);
        if let Err(e) = self.client.ensure_namespace(namespace).await {
            tracing::debug!("Error creating namespace: {}", e);
        }
    }

    async fn run_container(&self, id: &str, info: &ContainerInfo, initialize: bool) -> Result<()> {
        let plan = PodSpecBuilder::new(&self.config, &self.labels).build(&PodRequest {
            id,
            merged_config: &info.merged_config,
            image_name: &info.image_name,
            workspace_mount: &info.workspace_mount,
            image_details: &info.image_details,
            initialize,
        })?;

        if let Some(account) = self.config.service_account() {
            self.client
                .create_service_account(account)
                .await
                .map_err(|e| DriverError::Create {
                    kind: "service account",
                    name: account.to_string(),
                    source: e,
                })?;
        }

        tracing::info!("Create Pod '{}'", id);
        let output = self
            .client
            .submit_pod(&plan.pod)
            .await
            .map_err(|e| DriverError::Create {
                kind: "pod",
                name: id.to_string(),
                source: e,
            })?;
        tracing::debug!("{}", output.trim());

        let mut waiter = ReadinessWaiter::new(self.client.as_ref(), self.config.pod_timeout());
        if let Some(interval) = self.poll_interval {
            waiter = waiter.with_poll_interval(interval);
        }
        waiter.wait_running(id).await?;

        if initialize {
            DataSeeder::new(self.client.as_ref())
                .seed(id, &plan.copy_mounts, info.parsed_config.origin_dir())
                .await?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{command_failed, waiting_status, MockCall, MockClient};
    use crate::INFO_ANNOTATION;
    use async_trait::async_trait;
    use kubedev_config::Mount;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// Snapshot store kept in memory, counting calls
    #[derive(Default)]
    struct MemoryStore {
        snapshots: Mutex<HashMap<String, ContainerInfo>>,
        gets: Mutex<usize>,
        puts: Mutex<usize>,
    }

    #[async_trait]
    impl SnapshotStore for MemoryStore {
        async fn get(&self, id: &str) -> Result<Option<ContainerInfo>> {
            *self.gets.lock().unwrap() += 1;
            Ok(self.snapshots.lock().unwrap().get(id).cloned())
        }

        async fn put(&self, id: &str, info: &ContainerInfo) -> Result<()> {
            *self.puts.lock().unwrap() += 1;
            self.snapshots
                .lock()
                .unwrap()
                .insert(id.to_string(), info.clone());
            Ok(())
        }
    }

    const WORKSPACE: &str = "type=bind,source=/home/me/project,target=/workspaces/project";

    fn labels() -> Vec<String> {
        vec!["dev.containers.id=project".to_string()]
    }

    fn parsed() -> DevContainerConfig {
        DevContainerConfig {
            image: Some("alpine:3".to_string()),
            origin: Some(PathBuf::from("/home/me/project/.devcontainer/devcontainer.json")),
            ..Default::default()
        }
    }

    fn merged() -> MergedDevContainerConfig {
        MergedDevContainerConfig {
            mounts: vec![
                Mount::parse("type=bind,source=/data,target=/mnt/data"),
                Mount::parse("type=volume,source=cache,target=/cache"),
            ],
            ..Default::default()
        }
    }

    fn driver_with(client: &Arc<MockClient>, config: KubernetesConfig) -> KubernetesDriver {
        KubernetesDriver::new(client.clone(), config).with_poll_interval(Duration::from_millis(1))
    }

    fn driver(client: &Arc<MockClient>) -> KubernetesDriver {
        driver_with(client, KubernetesConfig::default())
    }

    async fn run(driver: &KubernetesDriver, workspace_mount: &str) -> Result<String> {
        driver
            .run(
                &parsed(),
                &merged(),
                "alpine:3",
                workspace_mount,
                &labels(),
                &ImageDetails::default(),
            )
            .await
    }

    fn copies(client: &MockClient) -> Vec<MockCall> {
        client
            .get_calls()
            .into_iter()
            .filter(|c| matches!(c, MockCall::CopyIntoPod { .. }))
            .collect()
    }

    /// Simulate the pod going away while the volume remains
    fn delete_pod(client: &MockClient, id: &str) {
        client.pods.lock().unwrap().remove(id);
    }

    #[tokio::test]
    async fn test_first_run_creates_and_seeds() {
        let client = Arc::new(MockClient::new());
        let id = run(&driver(&client), WORKSPACE).await.unwrap();
        assert_eq!(id, "devpod-project");

        let workdir = Some(PathBuf::from("/home/me/project/.devcontainer"));
        let calls = client.get_calls();
        assert_eq!(calls[0], MockCall::GetVolume { name: id.clone() });
        assert_eq!(calls[1], MockCall::CreateVolume { name: id.clone() });
        assert_eq!(calls[2], MockCall::SubmitPod { name: id.clone() });
        assert_eq!(calls[3], MockCall::GetPod { name: id.clone() });
        assert_eq!(
            &calls[4..],
            [
                MockCall::CopyIntoPod {
                    pod: id.clone(),
                    container: "devpod".to_string(),
                    src: "/home/me/project/.".to_string(),
                    dest: "/workspaces/project".to_string(),
                    workdir: workdir.clone(),
                },
                MockCall::CopyIntoPod {
                    pod: id.clone(),
                    container: "devpod".to_string(),
                    src: "/data/.".to_string(),
                    dest: "/mnt/data".to_string(),
                    workdir,
                },
            ]
        );

        let pod = client.pod(&id).unwrap();
        assert_eq!(pod.spec.init_containers.len(), 1);
    }

    #[tokio::test]
    async fn test_first_run_records_snapshot() {
        let client = Arc::new(MockClient::new());
        let id = run(&driver(&client), WORKSPACE).await.unwrap();

        let claim = client.volume(&id).unwrap();
        let info = ContainerInfo::decode(&claim.metadata.annotations[INFO_ANNOTATION]).unwrap();
        assert_eq!(info.image_name, "alpine:3");
        assert_eq!(info.workspace_mount, WORKSPACE);
        assert_eq!(info.labels, labels());
        assert_eq!(info.merged_config, merged());
    }

    #[tokio::test]
    async fn test_second_run_never_seeds_or_recreates_volume() {
        let client = Arc::new(MockClient::new());
        let driver = driver(&client);
        let id = run(&driver, WORKSPACE).await.unwrap();

        delete_pod(&client, &id);
        client.clear_calls();
        run(&driver, WORKSPACE).await.unwrap();

        let calls = client.get_calls();
        assert!(!calls.iter().any(|c| matches!(c, MockCall::CreateVolume { .. })));
        assert!(copies(&client).is_empty());
        assert!(client.was_called(&MockCall::SubmitPod { name: id.clone() }));
        assert!(client.pod(&id).unwrap().spec.init_containers.is_empty());
    }

    #[tokio::test]
    async fn test_start_rebuilds_from_snapshot() {
        let client = Arc::new(MockClient::new());
        let driver = driver(&client);
        let id = run(&driver, WORKSPACE).await.unwrap();

        delete_pod(&client, &id);
        client.clear_calls();
        driver.start(&id, &[]).await.unwrap();

        assert_eq!(
            client.get_calls()[..2],
            [
                MockCall::GetVolume { name: id.clone() },
                MockCall::SubmitPod { name: id.clone() },
            ]
        );
        assert!(copies(&client).is_empty());

        let pod = client.pod(&id).unwrap();
        assert_eq!(pod.spec.containers[0].image, "alpine:3");
        assert_eq!(pod.spec.containers[0].volume_mounts.len(), 3);
    }

    #[tokio::test]
    async fn test_start_unknown_workspace_is_not_found() {
        let client = Arc::new(MockClient::new());
        let err = driver(&client).start("devpod-missing", &labels()).await.unwrap_err();

        assert!(matches!(err, DriverError::NotFound(ref id) if id == "devpod-missing"));
        assert_eq!(client.creation_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_workspace_target_makes_no_remote_calls() {
        let client = Arc::new(MockClient::new());
        let config = KubernetesConfig {
            namespace: Some("dev".to_string()),
            create_namespace: true,
            ..Default::default()
        };
        let err = run(&driver_with(&client, config), "type=bind,source=/src")
            .await
            .unwrap_err();

        assert!(matches!(err, DriverError::Config(_)));
        assert!(client.get_calls().is_empty());
    }

    #[tokio::test]
    async fn test_namespace_failure_is_swallowed() {
        let client = Arc::new(MockClient::new());
        *client.ensure_namespace_error.lock().unwrap() = Some(command_failed(
            "create namespace dev",
            "namespaces \"dev\" already exists",
        ));
        let config = KubernetesConfig {
            namespace: Some("dev".to_string()),
            create_namespace: true,
            ..Default::default()
        };

        run(&driver_with(&client, config), WORKSPACE).await.unwrap();
        assert_eq!(
            client.get_calls()[0],
            MockCall::EnsureNamespace {
                name: "dev".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_namespace_left_alone_unless_requested() {
        let client = Arc::new(MockClient::new());
        let config = KubernetesConfig {
            namespace: Some("dev".to_string()),
            ..Default::default()
        };
        run(&driver_with(&client, config), WORKSPACE).await.unwrap();
        assert!(!client
            .get_calls()
            .iter()
            .any(|c| matches!(c, MockCall::EnsureNamespace { .. })));
    }

    #[tokio::test]
    async fn test_service_account_created_before_pod() {
        let client = Arc::new(MockClient::new());
        let config = KubernetesConfig {
            service_account: Some("devpod-sa".to_string()),
            ..Default::default()
        };
        let id = run(&driver_with(&client, config), WORKSPACE).await.unwrap();

        let calls = client.get_calls();
        let sa = calls
            .iter()
            .position(|c| matches!(c, MockCall::CreateServiceAccount { .. }))
            .unwrap();
        let pod = calls
            .iter()
            .position(|c| matches!(c, MockCall::SubmitPod { .. }))
            .unwrap();
        assert!(sa < pod);
        assert_eq!(
            client.pod(&id).unwrap().spec.service_account_name.as_deref(),
            Some("devpod-sa")
        );
    }

    #[tokio::test]
    async fn test_service_account_failure_is_create_error() {
        let client = Arc::new(MockClient::new());
        *client.service_account_error.lock().unwrap() =
            Some(command_failed("create serviceaccount", "forbidden"));
        let config = KubernetesConfig {
            service_account: Some("devpod-sa".to_string()),
            ..Default::default()
        };

        let err = run(&driver_with(&client, config), WORKSPACE).await.unwrap_err();
        assert!(matches!(err, DriverError::Create { kind: "service account", .. }));
        assert_eq!(err.output(), Some("forbidden"));
        assert!(!client
            .get_calls()
            .iter()
            .any(|c| matches!(c, MockCall::SubmitPod { .. })));
    }

    #[tokio::test]
    async fn test_pod_submit_failure_keeps_volume() {
        let client = Arc::new(MockClient::new());
        *client.submit_pod_error.lock().unwrap() = Some(command_failed(
            "create -f -",
            "admission webhook denied the request",
        ));

        let err = run(&driver(&client), WORKSPACE).await.unwrap_err();
        assert!(matches!(err, DriverError::Create { kind: "pod", .. }));
        assert_eq!(err.output(), Some("admission webhook denied the request"));
        assert!(client.volume("devpod-project").is_some());
    }

    #[tokio::test]
    async fn test_startup_failure_skips_seeding() {
        let client = Arc::new(MockClient::new());
        client.push_pod_status(waiting_status("ErrImagePull", "manifest unknown"));

        let err = run(&driver(&client), WORKSPACE).await.unwrap_err();
        assert!(matches!(err, DriverError::Startup { .. }));
        assert!(copies(&client).is_empty());
    }

    #[tokio::test]
    async fn test_copy_failure_is_copy_error() {
        let client = Arc::new(MockClient::new());
        client.fail_copy_to("/mnt/data", command_failed("cp", "no such file"));

        let err = run(&driver(&client), WORKSPACE).await.unwrap_err();
        assert!(matches!(err, DriverError::Copy { ref target, .. } if target == "/mnt/data"));
        assert_eq!(copies(&client).len(), 2);
    }

    #[tokio::test]
    async fn test_lookup_failure_stops_run() {
        let client = Arc::new(MockClient::new());
        *client.get_volume_error.lock().unwrap() =
            Some(command_failed("get persistentvolumeclaim", "Unauthorized"));

        let err = run(&driver(&client), WORKSPACE).await.unwrap_err();
        assert!(matches!(err, DriverError::Lookup { .. }));
        assert_eq!(client.creation_count(), 0);
    }

    #[tokio::test]
    async fn test_lifecycle_with_other_snapshot_store() {
        let client = Arc::new(MockClient::new());
        let store = Arc::new(MemoryStore::default());
        let driver = driver(&client).with_store(store.clone());

        let id = run(&driver, WORKSPACE).await.unwrap();
        assert_eq!(*store.puts.lock().unwrap(), 1);
        assert_eq!(copies(&client).len(), 2);
        assert!(store.snapshots.lock().unwrap().contains_key(&id));

        delete_pod(&client, &id);
        client.clear_calls();
        run(&driver, WORKSPACE).await.unwrap();
        assert_eq!(*store.puts.lock().unwrap(), 1);
        assert!(copies(&client).is_empty());

        delete_pod(&client, &id);
        client.clear_calls();
        driver.start(&id, &[]).await.unwrap();
        assert_eq!(*store.gets.lock().unwrap(), 3);
        assert!(copies(&client).is_empty());
        assert!(client.was_called(&MockCall::SubmitPod { name: id.clone() }));

        let calls = client.get_calls();
        assert!(!calls
            .iter()
            .any(|c| matches!(c, MockCall::GetVolume { .. } | MockCall::CreateVolume { .. })));
        assert!(client.volume(&id).is_none());
    }
}
