//! License controller: keeps the cluster license's status annotation current.
//!
//! Loads the trust anchor, connects to the Kubernetes API (in-cluster or via
//! kubeconfig), and reconciles the license Secret against the node list
//! until interrupted.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use clap::{Parser, ValueEnum};
use cluster_license_core::{
    ControllerConfig, KubeStore, LicenseController, LicenseVerifier, RetryPolicy,
    StaticMembership, DEFAULT_STATUS_ANNOTATION,
};
use cluster_license_crypto::TrustAnchor;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

/// Enforce a signed cluster license against live node usage.
#[derive(Debug, Parser)]
#[command(name = "license-controller")]
#[command(version = VERSION)]
#[command(long_about = None)]
struct Cli {
    /// PEM certificate or public key licenses must be signed with
    #[arg(long, env = "LICENSE_TRUST_ANCHOR")]
    trust_anchor: PathBuf,

    /// Namespace of the license Secret
    #[arg(long, env = "LICENSE_NAMESPACE", default_value = "license-system")]
    namespace: String,

    /// Name of the license Secret
    #[arg(long, env = "LICENSE_SECRET", default_value = "cluster-license")]
    secret: String,

    /// Secret data key holding the license document
    #[arg(long, env = "LICENSE_DATA_KEY", default_value = "license")]
    data_key: String,

    /// Annotation the status is written under
    #[arg(long, env = "LICENSE_STATUS_ANNOTATION", default_value = DEFAULT_STATUS_ANNOTATION)]
    status_annotation: String,

    /// Clusters covered by this installation
    #[arg(long, env = "LICENSE_CLUSTER_COUNT", default_value_t = 1)]
    clusters: u64,

    /// Seconds between passes when nothing changes
    #[arg(long, env = "LICENSE_RESYNC_SECS", default_value_t = 3600)]
    resync_secs: u64,

    /// Retries for a store call failing transiently
    #[arg(long, env = "LICENSE_STORE_RETRIES", default_value_t = 3)]
    store_retries: u32,

    /// Passes attempted when the status write keeps conflicting
    #[arg(long, env = "LICENSE_CONFLICT_RETRIES", default_value_t = 5)]
    conflict_retries: u32,

    /// Log output format
    #[arg(long, env = "LICENSE_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

impl Cli {
    fn controller_config(&self) -> ControllerConfig {
        let defaults = ControllerConfig::default();
        ControllerConfig {
            namespace: self.namespace.clone(),
            record_name: self.secret.clone(),
            data_key: self.data_key.clone(),
            store_retry: RetryPolicy {
                max_retries: self.store_retries,
                ..defaults.store_retry
            },
            max_conflict_retries: self.conflict_retries,
            resync_interval: Duration::from_secs(self.resync_secs),
            ..defaults
        }
    }
}

fn setup_logging(format: LogFormat) {
    use tracing_subscriber::filter::{EnvFilter, LevelFilter};

    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    let fmt = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_file(false)
        .with_line_number(false);

    match format {
        LogFormat::Json => fmt.json().init(),
        LogFormat::Text => fmt.init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.log_format);

    let anchor = TrustAnchor::load(&cli.trust_anchor)
        .with_context(|| format!("loading trust anchor {}", cli.trust_anchor.display()))?;
    let config = cli.controller_config();

    let client = kube::Client::try_default()
        .await
        .context("connecting to the Kubernetes API")?;
    let store = KubeStore::new(client, &cli.status_annotation);

    let controller = LicenseController::new(
        config,
        Arc::new(store),
        Arc::new(StaticMembership::new(cli.clusters)),
        LicenseVerifier::new(anchor),
    );

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "Cannot listen for interrupts; running until killed");
                return;
            }
            info!("Interrupt received, shutting down");
            shutdown.cancel();
        }
    });

    controller.run(shutdown).await;
    Ok(())
}
