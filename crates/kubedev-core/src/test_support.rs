//! Test support utilities for kubedev-core
//!
//! Provides MockClient and helpers for unit testing the driver without a
//! cluster or a kubectl binary.

use async_trait::async_trait;
use kubedev_provider::*;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Records which methods were called on the mock
#[derive(Debug, Clone, PartialEq)]
pub enum MockCall {
    EnsureNamespace { name: String },
    GetVolume { name: String },
    CreateVolume { name: String },
    CreateServiceAccount { name: String },
    SubmitPod { name: String },
    GetPod { name: String },
    CopyIntoPod {
        pod: String,
        container: String,
        src: String,
        dest: String,
        workdir: Option<PathBuf>,
    },
}

/// Configurable in-memory Kubernetes client for testing
///
/// Volumes and pods are kept in maps so `get_*` sees what `create_*`
/// stored. Pod status is served from `pod_statuses`: each `get_pod` pops the
/// front entry and the last entry repeats. An empty queue means Running.
pub struct MockClient {
    pub calls: Arc<Mutex<Vec<MockCall>>>,
    pub volumes: Arc<Mutex<HashMap<String, PersistentVolumeClaim>>>,
    pub pods: Arc<Mutex<HashMap<String, Pod>>>,
    pub pod_statuses: Arc<Mutex<VecDeque<PodStatus>>>,
    /// Error for ensure_namespace calls
    pub ensure_namespace_error: Arc<Mutex<Option<ProviderError>>>,
    /// Error for get_volume calls
    pub get_volume_error: Arc<Mutex<Option<ProviderError>>>,
    /// Error for create_volume calls
    pub create_volume_error: Arc<Mutex<Option<ProviderError>>>,
    /// Error for create_service_account calls
    pub service_account_error: Arc<Mutex<Option<ProviderError>>>,
    /// Error for submit_pod calls
    pub submit_pod_error: Arc<Mutex<Option<ProviderError>>>,
    /// Error for get_pod calls
    pub get_pod_error: Arc<Mutex<Option<ProviderError>>>,
    /// Errors for copy_into_pod calls, keyed by destination
    pub copy_errors: Arc<Mutex<HashMap<String, ProviderError>>>,
}

impl Default for MockClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockClient {
    /// Create a new mock client with an empty cluster
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            volumes: Arc::new(Mutex::new(HashMap::new())),
            pods: Arc::new(Mutex::new(HashMap::new())),
            pod_statuses: Arc::new(Mutex::new(VecDeque::new())),
            ensure_namespace_error: Arc::new(Mutex::new(None)),
            get_volume_error: Arc::new(Mutex::new(None)),
            create_volume_error: Arc::new(Mutex::new(None)),
            service_account_error: Arc::new(Mutex::new(None)),
            submit_pod_error: Arc::new(Mutex::new(None)),
            get_pod_error: Arc::new(Mutex::new(None)),
            copy_errors: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Record a call
    fn record(&self, call: MockCall) {
        self.calls.lock().unwrap().push(call);
    }

    /// Get all recorded calls
    pub fn get_calls(&self) -> Vec<MockCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Check if a specific call was made
    pub fn was_called(&self, call: &MockCall) -> bool {
        self.calls.lock().unwrap().contains(call)
    }

    /// Forget recorded calls
    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Pre-populate a volume claim
    pub fn insert_volume(&self, claim: PersistentVolumeClaim) {
        self.volumes
            .lock()
            .unwrap()
            .insert(claim.metadata.name.clone(), claim);
    }

    /// The claim stored under `name`
    pub fn volume(&self, name: &str) -> Option<PersistentVolumeClaim> {
        self.volumes.lock().unwrap().get(name).cloned()
    }

    /// The pod submitted under `name`
    pub fn pod(&self, name: &str) -> Option<Pod> {
        self.pods.lock().unwrap().get(name).cloned()
    }

    /// Queue pod statuses returned by successive `get_pod` calls
    pub fn push_pod_status(&self, status: PodStatus) {
        self.pod_statuses.lock().unwrap().push_back(status);
    }

    /// Make copies into `dest` fail
    pub fn fail_copy_to(&self, dest: &str, err: ProviderError) {
        self.copy_errors.lock().unwrap().insert(dest.to_string(), err);
    }

    /// Number of create calls of any kind
    pub fn creation_count(&self) -> usize {
        self.get_calls()
            .iter()
            .filter(|c| {
                matches!(
                    c,
                    MockCall::CreateVolume { .. }
                        | MockCall::CreateServiceAccount { .. }
                        | MockCall::SubmitPod { .. }
                )
            })
            .count()
    }

    fn next_status(&self) -> PodStatus {
        let mut queue = self.pod_statuses.lock().unwrap();
        if queue.len() > 1 {
            return queue.pop_front().unwrap_or_default();
        }
        queue.front().cloned().unwrap_or_else(|| pod_status("Running"))
    }
}

fn take_error(slot: &Arc<Mutex<Option<ProviderError>>>) -> Result<()> {
    match slot.lock().unwrap().as_ref() {
        Some(e) => Err(clone_provider_error(e)),
        None => Ok(()),
    }
}

/// Clone a ProviderError (thiserror types don't implement Clone)
pub fn clone_provider_error(e: &ProviderError) -> ProviderError {
    match e {
        ProviderError::ConnectionError(s) => ProviderError::ConnectionError(s.clone()),
        ProviderError::CommandFailed { command, output } => ProviderError::CommandFailed {
            command: command.clone(),
            output: output.clone(),
        },
        ProviderError::AlreadyExists(s) => ProviderError::AlreadyExists(s.clone()),
        ProviderError::InvalidOutput(s) => ProviderError::InvalidOutput(s.clone()),
        ProviderError::Encode(e) => ProviderError::InvalidOutput(e.to_string()),
        ProviderError::IoError(e) => ProviderError::ConnectionError(e.to_string()),
    }
}

/// A kubectl failure with the given output
pub fn command_failed(command: &str, output: &str) -> ProviderError {
    ProviderError::CommandFailed {
        command: command.to_string(),
        output: output.to_string(),
    }
}

/// A pod status in the given phase
pub fn pod_status(phase: &str) -> PodStatus {
    PodStatus {
        phase: Some(phase.to_string()),
        ..Default::default()
    }
}

/// A pending pod whose main container is waiting for `reason`
pub fn waiting_status(reason: &str, message: &str) -> PodStatus {
    PodStatus {
        phase: Some("Pending".to_string()),
        container_statuses: vec![ContainerStatus {
            name: "devpod".to_string(),
            ready: false,
            state: Some(ContainerState {
                waiting: Some(ContainerStateWaiting {
                    reason: Some(reason.to_string()),
                    message: Some(message.to_string()),
                }),
                ..Default::default()
            }),
        }],
        ..Default::default()
    }
}

#[async_trait]
impl KubernetesClient for MockClient {
    async fn ensure_namespace(&self, name: &str) -> Result<()> {
        self.record(MockCall::EnsureNamespace {
            name: name.to_string(),
        });
        take_error(&self.ensure_namespace_error)
    }

    async fn get_volume(&self, name: &str) -> Result<Option<PersistentVolumeClaim>> {
        self.record(MockCall::GetVolume {
            name: name.to_string(),
        });
        take_error(&self.get_volume_error)?;
        Ok(self.volume(name))
    }

    async fn create_volume(&self, claim: &PersistentVolumeClaim) -> Result<()> {
        let name = claim.metadata.name.clone();
        self.record(MockCall::CreateVolume { name: name.clone() });
        take_error(&self.create_volume_error)?;

        let mut volumes = self.volumes.lock().unwrap();
        if volumes.contains_key(&name) {
            return Err(command_failed(
                "create -f -",
                &format!(
                    "Error from server (AlreadyExists): persistentvolumeclaims \"{}\" already exists",
                    name
                ),
            ));
        }
        volumes.insert(name, claim.clone());
        Ok(())
    }

    async fn create_service_account(&self, name: &str) -> Result<()> {
        self.record(MockCall::CreateServiceAccount {
            name: name.to_string(),
        });
        take_error(&self.service_account_error)
    }

    async fn submit_pod(&self, pod: &Pod) -> Result<String> {
        let name = pod.metadata.name.clone();
        self.record(MockCall::SubmitPod { name: name.clone() });
        take_error(&self.submit_pod_error)?;

        let mut pods = self.pods.lock().unwrap();
        if pods.contains_key(&name) {
            return Err(command_failed(
                "create -f -",
                &format!("Error from server (AlreadyExists): pods \"{}\" already exists", name),
            ));
        }
        pods.insert(name.clone(), pod.clone());
        Ok(format!("pod/{} created", name))
    }

    async fn get_pod(&self, name: &str) -> Result<Option<Pod>> {
        self.record(MockCall::GetPod {
            name: name.to_string(),
        });
        take_error(&self.get_pod_error)?;

        let Some(mut pod) = self.pod(name) else {
            return Ok(None);
        };
        pod.status = Some(self.next_status());
        Ok(Some(pod))
    }

    async fn copy_into_pod(
        &self,
        pod: &str,
        container: &str,
        src: &str,
        dest: &str,
        workdir: Option<&Path>,
    ) -> Result<()> {
        self.record(MockCall::CopyIntoPod {
            pod: pod.to_string(),
            container: container.to_string(),
            src: src.to_string(),
            dest: dest.to_string(),
            workdir: workdir.map(Path::to_path_buf),
        });
        match self.copy_errors.lock().unwrap().get(dest) {
            Some(e) => Err(clone_provider_error(e)),
            None => Ok(()),
        }
    }
}
