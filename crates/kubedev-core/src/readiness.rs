//! Waiting for a submitted pod to reach `Running`

use crate::{DriverError, Result};
use kubedev_provider::{ContainerStatus, KubernetesClient, Pod, PodPhase};
use std::time::Duration;

/// Waiting reasons that will not resolve on their own
const FATAL_WAITING_REASONS: &[&str] = &[
    "ErrImagePull",
    "ImagePullBackOff",
    "CrashLoopBackOff",
    "CreateContainerConfigError",
    "CreateContainerError",
    "InvalidImageName",
];

const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Polls a pod until it runs, fails, or the timeout expires
pub struct ReadinessWaiter<'a> {
    client: &'a dyn KubernetesClient,
    timeout: Duration,
    poll_interval: Duration,
}

/// Outcome of inspecting one pod observation
enum PodProgress {
    Running,
    Waiting,
    Failed(String),
}

impl<'a> ReadinessWaiter<'a> {
    pub fn new(client: &'a dyn KubernetesClient, timeout: Duration) -> Self {
        Self {
            client,
            timeout,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Wait for pod `id` to be running.
    ///
    /// Dropping the returned future stops polling. The pod is left as is on
    /// every failure.
    pub async fn wait_running(&self, id: &str) -> Result<Pod> {
        match tokio::time::timeout(self.timeout, self.poll(id)).await {
            Ok(result) => result,
            Err(_) => Err(DriverError::Startup {
                id: id.to_string(),
                reason: format!("timed out after {}s waiting for pod to run", self.timeout.as_secs()),
            }),
        }
    }

    async fn poll(&self, id: &str) -> Result<Pod> {
        loop {
            let pod = self.client.get_pod(id).await.map_err(|e| DriverError::Startup {
                id: id.to_string(),
                reason: e.to_string(),
            })?;

            match pod {
                Some(pod) => match inspect(&pod) {
                    PodProgress::Running => return Ok(pod),
                    PodProgress::Failed(reason) => {
                        return Err(DriverError::Startup {
                            id: id.to_string(),
                            reason,
                        })
                    }
                    PodProgress::Waiting => {
                        tracing::debug!("Pod '{}' is {}, waiting", id, pod.phase());
                    }
                },
                None => tracing::debug!("Pod '{}' not visible yet", id),
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

fn inspect(pod: &Pod) -> PodProgress {
    match pod.phase() {
        PodPhase::Running => return PodProgress::Running,
        phase @ (PodPhase::Failed | PodPhase::Succeeded) => {
            let detail = pod
                .status
                .as_ref()
                .and_then(|s| s.message.as_deref().or(s.reason.as_deref()))
                .map(|m| format!(": {}", m))
                .unwrap_or_default();
            return PodProgress::Failed(format!("pod {}{}", phase, detail));
        }
        PodPhase::Pending | PodPhase::Unknown => {}
    }

    let Some(status) = pod.status.as_ref() else {
        return PodProgress::Waiting;
    };

    status
        .init_container_statuses
        .iter()
        .chain(&status.container_statuses)
        .find_map(fatal_reason)
        .map_or(PodProgress::Waiting, PodProgress::Failed)
}

fn fatal_reason(status: &ContainerStatus) -> Option<String> {
    let waiting = status.waiting()?;
    let reason = waiting.reason.as_deref()?;
    if !FATAL_WAITING_REASONS.contains(&reason) {
        return None;
    }

    Some(match waiting.message.as_deref() {
        Some(message) if !message.is_empty() => {
            format!("container '{}' {}: {}", status.name, reason, message)
        }
        _ => format!("container '{}' {}", status.name, reason),
    })
}
