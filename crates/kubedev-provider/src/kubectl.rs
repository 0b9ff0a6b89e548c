//! kubectl-based Kubernetes client
//!
//! Uses the kubectl CLI rather than the API directly so the user's kubeconfig,
//! auth plugins and contexts work exactly as they do in their shell.

use crate::{KubernetesClient, PersistentVolumeClaim, Pod, ProviderError, Result};
use async_trait::async_trait;
use kubedev_config::KubernetesConfig;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::process::{Output, Stdio};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// kubectl-backed client
pub struct KubectlClient {
    /// kubectl binary
    cmd: String,
    /// `--context`, `--kubeconfig` and `--namespace` flags added to every call
    global_args: Vec<String>,
}

impl KubectlClient {
    pub fn new(config: &KubernetesConfig) -> Self {
        let mut global_args = Vec::new();
        if let Some(ref context) = config.context {
            global_args.push(format!("--context={}", context));
        }
        if let Some(ref kubeconfig) = config.kubeconfig {
            global_args.push(format!("--kubeconfig={}", kubeconfig));
        }
        if let Some(namespace) = config.namespace() {
            global_args.push(format!("--namespace={}", namespace));
        }

        Self {
            cmd: config.kubectl_path.clone(),
            global_args,
        }
    }

    fn full_args(&self, args: &[&str]) -> Vec<String> {
        self.global_args
            .iter()
            .cloned()
            .chain(args.iter().map(|a| a.to_string()))
            .collect()
    }

    fn build_command(&self, args: &[&str], workdir: Option<&Path>) -> Command {
        let mut cmd = Command::new(&self.cmd);
        cmd.args(self.full_args(args))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(dir) = workdir {
            cmd.current_dir(dir);
        }
        cmd
    }

    /// Run a command and get its stdout
    async fn run_cmd(&self, args: &[&str]) -> Result<String> {
        self.run_cmd_in(args, None).await
    }

    async fn run_cmd_in(&self, args: &[&str], workdir: Option<&Path>) -> Result<String> {
        tracing::debug!("Running {} {}", self.cmd, args.join(" "));
        let output = self
            .build_command(args, workdir)
            .output()
            .await
            .map_err(|e| ProviderError::ConnectionError(format!("{}: {}", self.cmd, e)))?;

        Self::check_output(args, output)
    }

    /// Run a command with `input` piped to stdin
    async fn run_cmd_with_input(&self, args: &[&str], input: &[u8]) -> Result<String> {
        tracing::debug!("Running {} {} (stdin)", self.cmd, args.join(" "));
        let mut child = self
            .build_command(args, None)
            .stdin(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ProviderError::ConnectionError(format!("{}: {}", self.cmd, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(input).await?;
        }

        let output = child.wait_with_output().await?;
        Self::check_output(args, output)
    }

    fn check_output(args: &[&str], output: Output) -> Result<String> {
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ProviderError::CommandFailed {
                command: args.join(" "),
                output: format!("{}{}", stdout, stderr).trim().to_string(),
            });
        }

        Ok(stdout)
    }

    /// `kubectl get <kind> <name> -o json`, `None` when not found
    async fn get_json<T: DeserializeOwned>(&self, kind: &str, name: &str) -> Result<Option<T>> {
        let stdout = self
            .run_cmd(&["get", kind, name, "-o", "json", "--ignore-not-found"])
            .await?;

        if stdout.trim().is_empty() {
            return Ok(None);
        }

        serde_json::from_str(&stdout)
            .map(Some)
            .map_err(|e| ProviderError::InvalidOutput(format!("{} {}: {}", kind, name, e)))
    }
}

fn is_already_exists(err: &ProviderError) -> bool {
    err.output()
        .is_some_and(|out| out.contains("AlreadyExists") || out.contains("already exists"))
}

#[async_trait]
impl KubernetesClient for KubectlClient {
    async fn ensure_namespace(&self, name: &str) -> Result<()> {
        match self.run_cmd(&["create", "namespace", name]).await {
            Ok(_) => Ok(()),
            Err(e) if is_already_exists(&e) => Err(ProviderError::AlreadyExists(name.to_string())),
            Err(e) => Err(e),
        }
    }

    async fn get_volume(&self, name: &str) -> Result<Option<PersistentVolumeClaim>> {
        self.get_json("pvc", name).await
    }

    async fn create_volume(&self, claim: &PersistentVolumeClaim) -> Result<()> {
        let raw = serde_json::to_vec(claim)?;
        self.run_cmd_with_input(&["create", "-f", "-"], &raw).await?;
        Ok(())
    }

    async fn create_service_account(&self, name: &str) -> Result<()> {
        match self.run_cmd(&["create", "serviceaccount", name]).await {
            Ok(_) => Ok(()),
            Err(e) if is_already_exists(&e) => {
                tracing::debug!("Service account '{}' already exists", name);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn submit_pod(&self, pod: &Pod) -> Result<String> {
        let raw = serde_json::to_vec(pod)?;
        self.run_cmd_with_input(&["create", "-f", "-"], &raw).await
    }

    async fn get_pod(&self, name: &str) -> Result<Option<Pod>> {
        self.get_json("pod", name).await
    }

    async fn copy_into_pod(
        &self,
        pod: &str,
        container: &str,
        src: &str,
        dest: &str,
        workdir: Option<&Path>,
    ) -> Result<()> {
        let target = format!("{}:{}", pod, dest);
        self.run_cmd_in(&["cp", "-c", container, src, target.as_str()], workdir)
            .await?;
        Ok(())
    }
}
