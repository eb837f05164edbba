mod config;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use kubesnap_k8s::{ExecError, KubeClient};

/// Kubesnap - Fault-tolerant cluster snapshots built from kubectl and helm
#[derive(Parser, Debug)]
#[command(name = "kubesnap")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Config file (defaults to ~/.kubesnap/config.toml)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Kubeconfig exported to kubectl and helm
    #[arg(long, global = true, value_name = "PATH")]
    kubeconfig: Option<PathBuf>,

    /// Per-attempt timeout in seconds
    #[arg(long, global = true, value_name = "SECS")]
    timeout: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List contexts from the kubeconfig
    Contexts,
    /// Namespaces, nodes and helm releases of a context
    Cluster { context: String },
    /// Everything in one namespace
    Namespace { context: String, namespace: String },
    /// One pod with its events and usage
    Pod {
        context: String,
        namespace: String,
        name: String,
    },
    /// Nodes with allocation, usage and kubelet statistics
    Nodes { context: String },
    /// Helm releases across all namespaces
    Releases { context: String },
    /// Whether the current user may read the given secrets
    Secrets {
        context: String,
        namespace: String,
        #[arg(required = true)]
        names: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr so stdout stays valid JSON
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = run(args).await;

    if let Err(e) = &result {
        eprintln!("Error: {:#}", e);
        if let Some(output) = e.downcast_ref::<ExecError>().and_then(ExecError::output) {
            eprintln!("{output}");
        }
    }

    result
}

async fn run(args: Args) -> Result<()> {
    let config_path = match args.config {
        Some(path) => path,
        None => config::default_path().context("Could not determine home directory")?,
    };
    let mut client_config = config::load(&config_path)?;
    if let Some(kubeconfig) = args.kubeconfig {
        client_config.kubeconfig = Some(kubeconfig);
    }
    if let Some(timeout) = args.timeout {
        client_config.retry.timeout_secs = timeout;
    }

    let client = KubeClient::new(&client_config);

    let cancel = client.cancellation_token().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupted, cancelling");
            cancel.cancel();
        }
    });

    match args.command {
        Command::Contexts => print(&client.contexts().await?),
        Command::Cluster { context } => print(&client.cluster_snapshot(&context).await?),
        Command::Namespace { context, namespace } => {
            print(&client.namespace_snapshot(&context, &namespace).await?)
        }
        Command::Pod {
            context,
            namespace,
            name,
        } => print(&client.pod_detail(&context, &namespace, &name).await?),
        Command::Nodes { context } => print(&client.node_inventory(&context).await?),
        Command::Releases { context } => print(&client.helm_releases(&context).await?),
        Command::Secrets {
            context,
            namespace,
            names,
        } => print(
            &client
                .secret_permissions(&context, &namespace, &names)
                .await?,
        ),
    }
}

fn print<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to encode snapshot")?;
    println!("{json}");
    Ok(())
}
