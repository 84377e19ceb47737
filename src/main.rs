//! Kube Storage Version Migrator Operator
//!
//! ## Usage
//!
//! ```bash
//! # Run the operator (requires kubeconfig)
//! IMAGE=quay.io/migrator:v1 OPERATOR_IMAGE=quay.io/operator:v1 storage-version-migrator-operator
//!
//! # Run with custom log level
//! RUST_LOG=debug storage-version-migrator-operator --image ... --operator-image ...
//! ```

use clap::{Parser, ValueEnum};
use kube::runtime::events::Reporter;
use kube::Client;
use std::sync::Arc;
use std::time::Duration;
use storage_version_migrator_operator::leader_election::{self, LeaderElector};
use storage_version_migrator_operator::{OperatorConfig, TargetController, VersionRecorder};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Json,
    Text,
}

/// Kube Storage Version Migrator Operator
#[derive(Parser, Debug)]
#[command(name = "storage-version-migrator-operator")]
#[command(version, about = "Kubernetes operator for the kube-storage-version-migrator")]
struct Args {
    /// Pull spec of the migrator operand image
    #[arg(long, env = "IMAGE")]
    image: String,

    /// Pull spec of this operator's image
    #[arg(long, env = "OPERATOR_IMAGE")]
    operator_image: String,

    /// Seconds between reconcile passes once the operand has settled
    #[arg(long, default_value_t = 300)]
    resync_seconds: u64,

    /// Enable leader election for HA deployments
    #[arg(long, default_value = "false")]
    leader_election: bool,

    /// Namespace for the leader election Lease (auto-detected if empty)
    #[arg(long, default_value = "")]
    leader_election_namespace: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Json)]
    log_format: LogFormat,
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);

    let config = OperatorConfig::new(
        args.image,
        args.operator_image,
        Duration::from_secs(args.resync_seconds),
    )?;

    info!("Starting kube-storage-version-migrator operator");
    info!(
        image = %config.image_pull_spec,
        operator_image = %config.operator_image_pull_spec,
        leader_election = args.leader_election,
        "Operator configuration"
    );

    let client = Client::try_default().await?;
    info!("Connected to Kubernetes API server");

    // Leader election, acquired before the controller starts
    let elector = if args.leader_election {
        let ns = leader_election::detect_namespace(&args.leader_election_namespace);
        info!("Leader election namespace: {}", ns);
        let elector = LeaderElector::new(client.clone(), &ns);
        elector.acquire().await?;
        Some(Arc::new(elector))
    } else {
        None
    };

    let versions = VersionRecorder::new();
    versions
        .set_version("operator", env!("CARGO_PKG_VERSION"))
        .await;

    let reporter = Reporter {
        controller: "kube-storage-version-migrator-operator".to_string(),
        instance: std::env::var("POD_NAME").ok(),
    };
    let controller = Arc::new(TargetController::new(client.clone(), config, versions, reporter));
    let controller_handle = tokio::spawn(async move {
        if let Err(e) = controller.run().await {
            error!("Target controller error: {}", e);
        }
    });

    // Periodic lease renewal (pending forever when leader election is disabled)
    let elector_for_renew = elector.clone();
    let renew_handle = tokio::spawn(async move {
        match elector_for_renew {
            Some(e) => loop {
                tokio::time::sleep(e.renew_interval()).await;
                match e.renew().await {
                    Ok(true) => {}
                    Ok(false) => {
                        error!("Lost leader lease");
                        break;
                    }
                    Err(err) => {
                        error!("Failed to renew leader lease: {}", err);
                        break;
                    }
                }
            },
            None => std::future::pending::<()>().await,
        }
    });

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
        }
        result = controller_handle => {
            if let Err(e) = result {
                error!("Target controller task failed: {}", e);
            }
        }
        _ = renew_handle => {
            error!("Leader lease lost, initiating shutdown");
        }
    }

    if let Some(e) = &elector {
        e.release().await;
    }

    info!("kube-storage-version-migrator operator shutting down");
    Ok(())
}
