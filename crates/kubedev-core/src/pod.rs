//! Translation of devcontainer configuration into a pod spec
//!
//! All mounts share one persistent volume claim. Each mount gets its own
//! sub-path inside it: the workspace mount is slot 0, declared mounts follow
//! in order. Named volumes use their name instead of the slot number so they
//! keep their data when mounts are reordered.

use crate::{container_entrypoint_and_args, ResourceLabels, Result};
use kubedev_config::{
    parse_labels, parse_resources, ConfigError, ImageDetails, KubernetesConfig,
    MergedDevContainerConfig, Mount, MountType,
};
use kubedev_provider::{
    Capabilities, Container, EnvVar, ObjectMeta, PersistentVolumeClaimVolumeSource, Pod, PodSpec,
    ResourceRequirements, SecurityContext, Volume, VolumeMount,
};
use std::collections::BTreeMap;

/// Name of the main container (also the target of `kubectl cp -c`)
pub const CONTAINER_NAME: &str = "devpod";

/// Init container that populates named volumes from the image
pub const INIT_CONTAINER_NAME: &str = "devpod-init";

/// Name of the pod volume backed by the workspace claim
pub const VOLUME_NAME: &str = "devpod";

const INIT_MOUNT_ROOT: &str = "/devpod-init";

/// Inputs for one pod
#[derive(Debug, Clone, Copy)]
pub struct PodRequest<'a> {
    pub id: &'a str,
    pub merged_config: &'a MergedDevContainerConfig,
    pub image_name: &'a str,
    pub workspace_mount: &'a str,
    pub image_details: &'a ImageDetails,
    /// First run for this workspace
    pub initialize: bool,
}

/// A pod ready to submit, plus the mounts to seed once it runs
#[derive(Debug, Clone)]
pub struct PodPlan {
    pub pod: Pod,
    /// Workspace mount first, then bind mounts in declared order
    pub copy_mounts: Vec<Mount>,
}

/// Parse the workspace mount string, rejecting one without a target
pub fn parse_workspace_mount(workspace_mount: &str) -> Result<Mount> {
    let mount = Mount::parse(workspace_mount);
    if mount.target.is_empty() {
        return Err(ConfigError::Invalid("workspace mount target is empty".to_string()).into());
    }
    Ok(mount)
}

/// Sub-path of a mount inside the shared volume
pub fn mount_sub_path(slot: usize, mount: &Mount) -> String {
    match mount.mount_type {
        MountType::Volume if !mount.source.is_empty() => format!("devpod/{}", mount.source),
        _ => format!("devpod/{}", slot),
    }
}

fn volume_mount(slot: usize, mount: &Mount) -> VolumeMount {
    VolumeMount {
        name: VOLUME_NAME.to_string(),
        mount_path: mount.target.clone(),
        sub_path: Some(mount_sub_path(slot, mount)),
    }
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

/// Builds pod specs from configuration. Pure: no calls to the cluster.
pub struct PodSpecBuilder<'a> {
    config: &'a KubernetesConfig,
    labels: &'a ResourceLabels,
}

impl<'a> PodSpecBuilder<'a> {
    pub fn new(config: &'a KubernetesConfig, labels: &'a ResourceLabels) -> Self {
        Self { config, labels }
    }

    /// Check the parts of the configuration that can fail, without building
    pub fn validate(&self, workspace_mount: &str) -> Result<()> {
        parse_workspace_mount(workspace_mount)?;
        self.node_selector()?;
        Ok(())
    }

    pub fn build(&self, req: &PodRequest<'_>) -> Result<PodPlan> {
        let workspace = parse_workspace_mount(req.workspace_mount)?;
        let merged = req.merged_config;

        let mut copy_mounts = vec![workspace.clone()];
        let mut volume_mounts = vec![volume_mount(0, &workspace)];
        for (idx, mount) in merged.mounts.iter().enumerate() {
            let slot = idx + 1;
            match &mount.mount_type {
                MountType::Bind => {
                    copy_mounts.push(mount.clone());
                    volume_mounts.push(volume_mount(slot, mount));
                }
                MountType::Volume => volume_mounts.push(volume_mount(slot, mount)),
                MountType::Other(kind) => {
                    tracing::warn!(
                        "Unsupported mount type '{}' in mount '{}', will skip",
                        kind,
                        mount
                    );
                }
            }
        }

        let capabilities = (!merged.cap_add.is_empty()).then(|| Capabilities {
            add: merged.cap_add.clone(),
        });

        let mut env: Vec<EnvVar> = merged
            .container_env
            .iter()
            .map(|(name, value)| EnvVar {
                name: name.clone(),
                value: value.clone(),
            })
            .collect();
        env.sort_by(|a, b| a.name.cmp(&b.name));

        let (entrypoint, args) = container_entrypoint_and_args(merged, req.image_details);

        let container = Container {
            name: CONTAINER_NAME.to_string(),
            image: req.image_name.to_string(),
            command: vec![entrypoint],
            args,
            env,
            resources: self.resources(),
            volume_mounts,
            security_context: Some(SecurityContext {
                capabilities,
                privileged: merged.privileged,
                ..SecurityContext::root()
            }),
        };

        let init_containers = if req.initialize {
            self.init_container(merged, req.image_name)
                .into_iter()
                .collect()
        } else {
            Vec::new()
        };

        let spec = PodSpec {
            service_account_name: self.config.service_account().map(str::to_string),
            init_containers,
            containers: vec![container],
            restart_policy: Some("Never".to_string()),
            volumes: vec![Volume {
                name: VOLUME_NAME.to_string(),
                persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                    claim_name: req.id.to_string(),
                }),
            }],
            node_selector: self.node_selector()?,
        };

        let metadata = ObjectMeta {
            name: req.id.to_string(),
            labels: self.labels.to_map(),
            ..Default::default()
        };

        Ok(PodPlan {
            pod: Pod::new(metadata, spec),
            copy_mounts,
        })
    }

    fn node_selector(&self) -> Result<BTreeMap<String, String>> {
        match self.config.node_selector.as_deref() {
            Some(selector) if !selector.trim().is_empty() => Ok(parse_labels(selector)?),
            _ => Ok(BTreeMap::new()),
        }
    }

    fn resources(&self) -> Option<ResourceRequirements> {
        let parsed = parse_resources(self.config.resources.as_deref().unwrap_or_default());
        (!parsed.is_empty()).then(|| ResourceRequirements {
            requests: parsed.requests,
            limits: parsed.limits,
        })
    }

    /// Copies what the image has at each named volume's target into the
    /// volume before the main container mounts over it.
    fn init_container(&self, merged: &MergedDevContainerConfig, image_name: &str) -> Option<Container> {
        let mut commands = Vec::new();
        let mut volume_mounts = Vec::new();

        for (idx, mount) in merged.mounts.iter().enumerate() {
            if mount.mount_type != MountType::Volume {
                continue;
            }

            let slot = idx + 1;
            let mut init_mount = volume_mount(slot, mount);
            init_mount.mount_path = format!("{}/{}", INIT_MOUNT_ROOT, slot);
            commands.push(format!(
                "cp -a {}/. {}/ || true",
                shell_quote(mount.target.trim_end_matches('/')),
                shell_quote(&init_mount.mount_path)
            ));
            volume_mounts.push(init_mount);
        }

        if volume_mounts.is_empty() {
            return None;
        }

        Some(Container {
            name: INIT_CONTAINER_NAME.to_string(),
            image: image_name.to_string(),
            command: vec!["sh".to_string()],
            args: vec!["-c".to_string(), commands.join("\n")],
            volume_mounts,
            security_context: Some(SecurityContext::root()),
            ..Default::default()
        })
    }
}
