//! NVIDIA BMM Controller
//!
//! Cluster API infrastructure provider for NVIDIA bare-metal manager sites:
//! - NvidiaBMMCluster: VPC, IP block, subnets and network security group
//! - NvidiaBMMMachine: one bare-metal instance per Cluster API Machine
//!
//! Both kinds are driven by level-triggered reconcile loops that keep the
//! remote identifiers they create in the objects' status.

mod backoff;
mod cidr;
mod config;
mod controller;
mod error;
mod health;
mod persist;
mod providerid;
mod reconcile_helpers;
mod reconciler;
mod scope;
mod secrets;
mod watcher;

#[cfg(test)]
mod test_utils;

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use controller::Controller;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    if let Err(e) = rustls::crypto::ring::default_provider().install_default() {
        warn!("rustls crypto provider already installed: {:?}", e);
    }

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    info!("Starting NVIDIA BMM Controller");

    let config = ControllerConfig::from_env()?;

    info!("Configuration:");
    info!("  Namespace: {}", config.watch_namespace.as_deref().unwrap_or("all namespaces"));
    info!("  Reconcile timeout: {:?}", config.reconcile_timeout);
    info!("  Concurrency: {}", config.concurrency);
    info!("  Debounce: {:?}", config.debounce);
    info!("  Backoff: {:?} to {:?}", config.backoff_min, config.backoff_max);
    info!("  Resync interval: {:?}", config.resync_interval);
    info!("  Health port: {}", config.health_port);

    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
