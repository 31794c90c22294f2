//! Load-Balancer Controller
//!
//! Reconciles `VirtualServer` and `TransportServer` resources onto an AS3
//! load-balancing device:
//! - every change produces a new declaration generation for the device
//! - one worker per device posts declarations strictly in order
//! - outcomes are matched against the latest generation: stale outcomes are
//!   dropped, failed tenants of the current generation are retried
//! - successful posts report status back and clean up orphaned IPAM entries

mod config;
mod controller;
mod declaration;
mod error;
mod ipam_cache;
mod metrics;
mod post_manager;
mod priority;
mod request_handler;
mod request_tracker;
mod response_handler;
mod snapshot;
mod status;
mod test_utils;
mod types;
mod watcher;

use crate::config::ControllerConfig;
use crate::controller::Controller;
use crate::error::ControllerError;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    // Install the ring crypto provider before any TLS client is built
    let _ = rustls::crypto::ring::default_provider().install_default();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting Load-Balancer Controller");

    let config = ControllerConfig::from_env()?;

    info!("Configuration:");
    info!("  Device URL: {}", config.bigip_url);
    info!("  Namespace: {}", config.watch_namespace.as_deref().unwrap_or("all namespaces"));
    info!(
        "  IPAM: {}",
        config
            .ipam_namespace
            .as_deref()
            .map_or_else(|| "disabled".to_string(), |ns| format!("{}/{}", ns, config.ipam_name))
    );
    info!("  Retry delay: {:?}", config.retry_delay);

    let user_agent = format!("lb-controller/{}", env!("CARGO_PKG_VERSION"));
    let controller = Controller::new(config, user_agent).await?;
    controller.run().await?;

    Ok(())
}
