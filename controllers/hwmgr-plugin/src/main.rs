//! Hardware Manager Plugin Controller binary

use hwmgr_plugin::config::ControllerConfig;
use hwmgr_plugin::controller::Controller;
use hwmgr_plugin::error::ControllerError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // kube and reqwest both link rustls; pin the process-wide provider
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        warn!("rustls crypto provider already installed");
    }

    info!("Starting hardware manager plugin controller");

    let config = ControllerConfig::from_env()?;
    info!("Configuration:");
    info!("  Plugin namespace: {}", config.plugin_namespace);
    info!(
        "  Watch namespace: {}",
        config.watch_namespace.as_deref().unwrap_or("all namespaces")
    );
    info!("  Hardware manager token: {}", if config.hwmgr_token.is_some() { "set" } else { "unset" });
    info!(
        "  Reconcile concurrency: {}, debounce: {}s",
        config.reconcile_concurrency,
        config.reconcile_debounce.as_secs()
    );

    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
