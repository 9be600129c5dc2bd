//! StaticPage operator - serves `StaticPage` resources through nginx deployments

use clap::Parser;
use kube::CustomResourceExt;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use staticpage_operator::{ControllerConfig, Operator, StaticPage};

/// Reconciles StaticPage resources into a ConfigMap and an nginx Deployment.
///
/// Runtime settings come from the environment: WATCH_NAMESPACE,
/// OWNER_REFERENCES, ERROR_REQUEUE_SECS, RESYNC_SECS and FIELD_MANAGER.
#[derive(Parser, Debug)]
#[command(name = "staticpage-operator", version, about, long_about = None)]
struct Cli {
    /// Print the StaticPage CRD manifest and exit
    #[arg(long)]
    crd: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    if cli.crd {
        let crd = serde_yaml::to_string(&StaticPage::crd())
            .map_err(|e| anyhow::anyhow!("Failed to serialize CRD: {}", e))?;
        println!("{crd}");
        return Ok(());
    }

    let config = ControllerConfig::from_env()?;
    Operator::new(config).run().await?;
    Ok(())
}
