//! Main controller implementation.
//!
//! The `Controller` struct spawns the NvidiaBMMCluster and NvidiaBMMMachine
//! watchers together with the health endpoint, and exits as soon as any of
//! them does.

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::health::{self, ReconcileMetrics};
use crate::reconciler::Reconciler;
use crate::watcher::Watcher;
use kube::Client;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

/// Main controller for the NVIDIA BMM infrastructure provider.
#[derive(Debug)]
pub struct Controller {
    cluster_watcher: JoinHandle<Result<(), ControllerError>>,
    machine_watcher: JoinHandle<Result<(), ControllerError>>,
    health_server: JoinHandle<Result<(), ControllerError>>,
}

impl Controller {
    /// Creates a new controller instance.
    pub async fn new(config: ControllerConfig) -> Result<Self, ControllerError> {
        info!("Initializing NVIDIA BMM Controller");

        let kube_client = Client::try_default().await?;
        let metrics = ReconcileMetrics::new()?;
        let health_port = config.health_port;

        let reconciler = Arc::new(Reconciler::new(kube_client.clone(), config, metrics.clone()));
        let watcher_instance = Arc::new(Watcher::new(reconciler, kube_client));

        let cluster_watcher = {
            let watcher = watcher_instance.clone();
            tokio::spawn(async move { watcher.watch_clusters().await })
        };

        let machine_watcher = {
            let watcher = watcher_instance.clone();
            tokio::spawn(async move { watcher.watch_machines().await })
        };

        let health_server = tokio::spawn(health::serve(health_port, metrics));

        Ok(Self {
            cluster_watcher,
            machine_watcher,
            health_server,
        })
    }

    /// Runs until a watcher stops (shutdown signal) or any task fails.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("NVIDIA BMM Controller running");

        tokio::select! {
            result = &mut self.cluster_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("NvidiaBMMCluster watcher panicked: {}", e)))?
                    .map_err(|e| ControllerError::Watch(format!("NvidiaBMMCluster watcher error: {}", e)))?;
            }
            result = &mut self.machine_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("NvidiaBMMMachine watcher panicked: {}", e)))?
                    .map_err(|e| ControllerError::Watch(format!("NvidiaBMMMachine watcher error: {}", e)))?;
            }
            result = &mut self.health_server => {
                result.map_err(|e| ControllerError::Watch(format!("health server panicked: {}", e)))??;
            }
        }

        info!("NVIDIA BMM Controller stopped");
        Ok(())
    }
}
