//! Command implementations

use anyhow::{Context, Result};
use kubedev_config::{DevContainerConfig, ImageDetails, KubernetesConfig, MergedDevContainerConfig};
use kubedev_core::KubernetesDriver;
use kubedev_provider::KubectlClient;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct RunArgs {
    pub devcontainer: PathBuf,
    pub image: String,
    pub workspace_mount: String,
    pub labels: Vec<String>,
    pub merged_config: Option<PathBuf>,
    pub image_details: Option<PathBuf>,
}

fn driver(config: KubernetesConfig) -> KubernetesDriver {
    let client = Arc::new(KubectlClient::new(&config));
    KubernetesDriver::new(client, config)
}

/// Create or resume a workspace pod
pub async fn run(config: KubernetesConfig, args: RunArgs) -> Result<()> {
    let parsed = DevContainerConfig::load_from(&args.devcontainer)?;
    let merged = match &args.merged_config {
        Some(path) => MergedDevContainerConfig::load_from(path)?,
        None => MergedDevContainerConfig::from(&parsed),
    };
    let image_details = match &args.image_details {
        Some(path) => ImageDetails::load_from(path)?,
        None => ImageDetails::default(),
    };

    let id = driver(config)
        .run(
            &parsed,
            &merged,
            &args.image,
            &args.workspace_mount,
            &args.labels,
            &image_details,
        )
        .await
        .context("Failed to run devcontainer")?;

    println!("{}", id);
    Ok(())
}

/// Recreate the pod of an existing workspace
pub async fn start(config: KubernetesConfig, id: &str, labels: &[String]) -> Result<()> {
    driver(config)
        .start(id, labels)
        .await
        .with_context(|| format!("Failed to start devcontainer '{}'", id))?;

    println!("{}", id);
    Ok(())
}

/// Print the effective configuration
pub fn config(config: &KubernetesConfig, path: Option<&Path>) -> Result<()> {
    let config_path = match path {
        Some(p) => p.to_path_buf(),
        None => KubernetesConfig::config_path()?,
    };

    if config_path.exists() {
        println!("# Config file: {:?}\n", config_path);
    } else {
        println!("# Config file: {:?} (not created yet, using defaults)\n", config_path);
    }
    print!("{}", toml::to_string_pretty(config)?);
    Ok(())
}
