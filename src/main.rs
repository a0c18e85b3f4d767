//! Gantry - GCE machine actuator and preemption handler

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use kube::CustomResourceExt;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use gantry_common::crd::Machine;
use gantry_common::kube_utils::create_client;
use gantry_common::telemetry::{init_telemetry, LogFormat, TelemetryConfig};
use gantry_termination::{KubeNodeStore, TerminationConfig, TerminationHandler};

/// Gantry - machine lifecycle tooling for Google Compute Engine
#[derive(Parser, Debug)]
#[command(name = "gantry", version, about, long_about = None)]
struct Cli {
    /// Log output format (json or text)
    #[arg(long, env = "LOG_FORMAT", default_value = "json", global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Watch the metadata server and mark this node when the instance is preempted
    ///
    /// Runs on every node. When the instance is scheduled for termination the
    /// node gets a `Terminating` condition so the machine can be replaced.
    TerminationHandler(TerminationArgs),

    /// Print the Machine CRD manifest and exit
    Crd,
}

/// Termination handler arguments
#[derive(Parser, Debug)]
struct TerminationArgs {
    /// Name of the node backed by this instance
    #[arg(long, env = "NODE_NAME")]
    node_name: String,

    /// Namespace of the machine objects
    #[arg(long, env = "NAMESPACE", default_value = "")]
    namespace: String,

    /// Seconds between termination endpoint checks
    #[arg(long, env = "POLL_INTERVAL_SECONDS", default_value = "5")]
    poll_interval: u64,

    /// Path to a kubeconfig; the in-cluster config is used when unset
    #[arg(long)]
    kubeconfig: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Crd => {
            let crd = serde_yaml::to_string(&Machine::crd())
                .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
            println!("{crd}");
            Ok(())
        }
        Commands::TerminationHandler(args) => {
            init_telemetry(TelemetryConfig {
                service_name: "gantry-termination-handler".to_string(),
                format: cli.log_format,
            })?;
            run_termination_handler(args).await
        }
    }
}

/// Run the termination handler until the node is marked or a signal arrives
async fn run_termination_handler(args: TerminationArgs) -> anyhow::Result<()> {
    let client = create_client(args.kubeconfig.as_deref()).await?;

    let config = TerminationConfig {
        namespace: args.namespace,
        poll_interval: Duration::from_secs(args.poll_interval),
        ..TerminationConfig::new(args.node_name)
    };
    info!(
        node = %config.node_name,
        poll_interval = ?config.poll_interval,
        "Starting termination handler"
    );

    let handler = TerminationHandler::new(Arc::new(KubeNodeStore::new(client)), config)?;

    let stop = CancellationToken::new();
    let signal_stop = stop.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_stop.cancel();
    });

    handler.run(stop).await?;
    info!("Termination handler finished");
    Ok(())
}

/// Wait for SIGINT or SIGTERM
async fn shutdown_signal() {
    tokio::select! {
        _ = until_signal("SIGINT", tokio::signal::ctrl_c()) => {}
        _ = terminate() => {}
    }
}

#[cfg(unix)]
fn terminate() -> impl Future<Output = ()> {
    use tokio::signal::unix::{signal, SignalKind};

    until_signal("SIGTERM", async {
        let mut term = signal(SignalKind::terminate())?;
        term.recv().await;
        Ok::<(), std::io::Error>(())
    })
}

#[cfg(not(unix))]
async fn terminate() {
    std::future::pending::<()>().await
}

/// Resolve once `received` reports the signal.
///
/// A listener that cannot be installed never resolves, so shutdown is left
/// to the remaining signals.
async fn until_signal<F>(name: &'static str, received: F)
where
    F: Future<Output = std::io::Result<()>>,
{
    match received.await {
        Ok(()) => info!(signal = name, "Received shutdown signal"),
        Err(e) => {
            warn!(signal = name, error = %e, "Failed to install signal handler");
            std::future::pending::<()>().await
        }
    }
}
