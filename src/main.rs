//! img-controller - ImageBuild operator

use clap::Parser;
use kube::Client;

use img_controller::config::{ControllerArgs, ControllerConfig};
use img_controller::crds;
use img_controller::retry::RetryConfig;
use img_controller::router::build_controllers;
use img_controller::telemetry::init_telemetry;

/// Builds container images from git repositories, one worker pod per ImageBuild
#[derive(Parser, Debug)]
#[command(name = "img-controller", version, about, long_about = None)]
struct Cli {
    /// Print the ImageBuild CRD manifest and exit
    #[arg(long)]
    crd: bool,

    #[command(flatten)]
    controller: ControllerArgs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = rustls::crypto::ring::default_provider().install_default() {
        eprintln!("failed to install rustls crypto provider: {:?}", e);
        std::process::exit(1);
    }

    let cli = Cli::parse();

    if cli.crd {
        println!("{}", crds::crd_yaml()?);
        return Ok(());
    }

    init_telemetry(cli.controller.log_format)?;

    let config = ControllerConfig::from(&cli.controller);
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        worker_image = %config.worker.image,
        concurrency = config.concurrency,
        "starting img-controller"
    );

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("failed to create Kubernetes client: {}", e))?;

    if cli.controller.skip_crd_install {
        tracing::info!("skipping CRD installation");
    } else {
        crds::ensure_installed(&client, &RetryConfig::startup())
            .await
            .map_err(|e| anyhow::anyhow!("failed to install ImageBuild CRD: {}", e))?;
    }

    let (_, _, _) = futures::future::select_all(build_controllers(client, config)).await;

    tracing::info!("img-controller shutting down");
    Ok(())
}
