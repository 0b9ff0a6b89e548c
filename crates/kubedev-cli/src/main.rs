//! kubedev - Kubernetes devcontainer driver CLI

mod commands;

use clap::{Parser, Subcommand};
use kubedev_config::KubernetesConfig;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "kubedev")]
#[command(author, version, about = "Kubernetes Dev Container Driver", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the config file (defaults to the user config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or resume the devcontainer pod for a workspace
    Run {
        /// Path to devcontainer.json
        #[arg(long)]
        devcontainer: PathBuf,
        /// Image to run
        #[arg(long)]
        image: String,
        /// Workspace mount, e.g. type=bind,source=.,target=/workspaces/app
        #[arg(long)]
        workspace_mount: String,
        /// Workspace label (key=value), repeatable
        #[arg(long = "label", value_parser = parse_label)]
        labels: Vec<String>,
        /// Merged configuration JSON (defaults to the devcontainer.json settings)
        #[arg(long)]
        merged_config: Option<PathBuf>,
        /// Image metadata JSON
        #[arg(long)]
        image_details: Option<PathBuf>,
    },

    /// Recreate the pod of an existing workspace
    Start {
        /// Workspace id (the persistent volume claim name)
        id: String,
        /// Workspace label (key=value), repeatable
        #[arg(long = "label", value_parser = parse_label)]
        labels: Vec<String>,
    },

    /// Show the effective configuration
    Config,
}

fn parse_label(s: &str) -> Result<String, String> {
    match s.split_once('=') {
        Some((key, _)) if !key.trim().is_empty() => Ok(s.to_string()),
        _ => Err(format!("invalid label '{}', expected key=value", s)),
    }
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let Cli {
        config: config_path,
        command,
        ..
    } = cli;
    let config = load_config(config_path.as_deref())?;
    tracing::debug!(
        "Using kubectl '{}' (namespace: {})",
        config.kubectl_path,
        config.namespace().unwrap_or("<kubeconfig default>")
    );

    let work = async move {
        match command {
            Commands::Run {
                devcontainer,
                image,
                workspace_mount,
                labels,
                merged_config,
                image_details,
            } => {
                commands::run(
                    config,
                    commands::RunArgs {
                        devcontainer,
                        image,
                        workspace_mount,
                        labels,
                        merged_config,
                        image_details,
                    },
                )
                .await
            }
            Commands::Start { id, labels } => commands::start(config, &id, &labels).await,
            Commands::Config => commands::config(&config, config_path.as_deref()),
        }
    };

    tokio::select! {
        result = work => result,
        _ = tokio::signal::ctrl_c() => anyhow::bail!("Interrupted"),
    }
}

fn load_config(path: Option<&std::path::Path>) -> anyhow::Result<KubernetesConfig> {
    let Some(path) = path else {
        return Ok(KubernetesConfig::load()?);
    };

    let mut config = KubernetesConfig::load_from(path)?;
    config.apply_overrides(|key| std::env::var(key).ok())?;
    Ok(config)
}
