//! Reconciliation logic for the provider's custom resources.
//!
//! - `cluster`: NvidiaBMMCluster network topology (VPC, IP block, subnets, NSG)
//! - `machine`: NvidiaBMMMachine instance lifecycle
//!
//! The state machines in the submodules work on scopes and never talk to the
//! Kubernetes API. [`Reconciler`] fetches the related objects, builds the
//! scope, runs one pass under the configured deadline and persists whatever
//! the pass changed.

pub mod cluster;
pub mod machine;

use crate::backoff::ExponentialBackoff;
use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::health::ReconcileMetrics;
use crate::persist::{self, KubeWriter};
use crate::scope::{ClusterScope, MachineScope, resolve_credentials};
use crate::secrets::KubeSecretReader;
use crds::capi::{self, MachineSpec};
use crds::{Condition, NvidiaBMMCluster, NvidiaBMMMachine, READY_CONDITION, reasons, set_condition};
use kube::{Api, Client, ResourceExt};
use kube_runtime::controller::Action;
use std::collections::HashMap;
use std::fmt::Debug;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Delay while waiting on another object (cluster readiness, bootstrap data)
/// and after submitting an instance
pub const DEPENDENCY_REQUEUE: Duration = Duration::from_secs(10);

/// Delay between instance status polls
pub const POLL_REQUEUE: Duration = Duration::from_secs(30);

/// What a successful pass asks of the scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Converged; verify again after the resync interval
    Done,
    /// Run again straight away (finalizer just added)
    RequeueNow,
    /// Expected transient state; run again after the delay
    RequeueAfter(Duration),
}

impl ReconcileOutcome {
    pub fn into_action(self, resync_interval: Duration) -> Action {
        match self {
            Self::Done => Action::requeue(resync_interval),
            Self::RequeueNow => Action::requeue(Duration::ZERO),
            Self::RequeueAfter(delay) => Action::requeue(delay),
        }
    }
}

/// Run `fut`, failing with [`ControllerError::Timeout`] once `deadline` passes.
///
/// Dropping the future on expiry aborts any remote call still in flight.
pub async fn with_deadline<T, F>(deadline: Duration, fut: F) -> Result<T, ControllerError>
where
    F: Future<Output = Result<T, ControllerError>>,
{
    match tokio::time::timeout(deadline, fut).await {
        Ok(result) => result,
        Err(_) => Err(ControllerError::Timeout(deadline)),
    }
}

/// Backoff state for a resource
#[derive(Debug, Clone)]
struct BackoffState {
    backoff: ExponentialBackoff,
    error_count: u32,
}

impl BackoffState {
    fn new(min: Duration, max: Duration) -> Self {
        Self {
            backoff: ExponentialBackoff::new(min, max),
            error_count: 0,
        }
    }

    fn increment_error(&mut self) {
        self.error_count += 1;
    }
}

/// Failure history of every object that is currently failing
#[derive(Debug)]
struct BackoffTracker {
    min: Duration,
    max: Duration,
    /// kind/namespace/name -> BackoffState
    states: Mutex<HashMap<String, BackoffState>>,
}

impl BackoffTracker {
    fn new(min: Duration, max: Duration) -> Self {
        Self {
            min,
            max,
            states: Mutex::new(HashMap::new()),
        }
    }

    fn next(&self, resource_key: &str) -> Duration {
        match self.states.lock() {
            Ok(mut states) => {
                let state = states
                    .entry(resource_key.to_string())
                    .or_insert_with(|| BackoffState::new(self.min, self.max));
                state.increment_error();
                let delay = state.backoff.next_backoff();
                debug!("{} failed {} time(s), retrying in {:?}", resource_key, state.error_count, delay);
                delay
            }
            Err(e) => {
                warn!("Failed to lock backoff states: {}, using maximum backoff", e);
                self.max
            }
        }
    }

    fn clear(&self, resource_key: &str) {
        if let Ok(mut states) = self.states.lock() {
            if states.remove(resource_key).is_some() {
                debug!("Cleared backoff state for {}", resource_key);
            }
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.states.lock().map(|states| states.len()).unwrap_or_default()
    }
}

/// Key used for per-object backoff tracking
pub fn resource_key(kind: &str, namespace: &str, name: &str) -> String {
    format!("{}/{}/{}", kind, namespace, name)
}

/// Reconciles NvidiaBMMCluster and NvidiaBMMMachine resources.
pub struct Reconciler {
    client: Client,
    config: ControllerConfig,
    metrics: ReconcileMetrics,
    secrets: KubeSecretReader,
    backoff: BackoffTracker,
}

impl Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler").field("config", &self.config).finish_non_exhaustive()
    }
}

impl Reconciler {
    pub fn new(client: Client, config: ControllerConfig, metrics: ReconcileMetrics) -> Self {
        Self {
            secrets: KubeSecretReader::new(client.clone()),
            backoff: BackoffTracker::new(config.backoff_min, config.backoff_max),
            client,
            config,
            metrics,
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn metrics(&self) -> &ReconcileMetrics {
        &self.metrics
    }

    /// Record a failure and return how long to wait before retrying
    pub fn next_backoff(&self, resource_key: &str) -> Duration {
        self.backoff.next(resource_key)
    }

    /// Forget the failure history of a resource (on successful reconciliation)
    pub fn reset_backoff(&self, resource_key: &str) {
        self.backoff.clear(resource_key);
    }

    /// Reconcile one NvidiaBMMCluster
    pub async fn reconcile_cluster(&self, cluster: Arc<NvidiaBMMCluster>) -> Result<Action, ControllerError> {
        let name = cluster.name_any();
        let namespace = cluster.namespace().unwrap_or_default();
        let api: Api<NvidiaBMMCluster> = Api::namespaced(self.client.clone(), &namespace);
        let deleting = cluster.metadata.deletion_timestamp.is_some();

        let owner = match capi::owner_name(&cluster.metadata, "Cluster") {
            Some(owner_name) => {
                Api::<capi::Cluster>::namespaced(self.client.clone(), &namespace)
                    .get_opt(owner_name)
                    .await?
            }
            None => None,
        };
        match &owner {
            Some(owner) if capi::is_paused(owner, &cluster.metadata) => {
                info!("Cluster {}/{} is paused, skipping NvidiaBMMCluster reconcile", namespace, owner.name_any());
                return Ok(Action::await_change());
            }
            None if !deleting => {
                info!("NvidiaBMMCluster {}/{} has no owning Cluster yet, waiting", namespace, name);
                return Ok(Action::await_change());
            }
            _ => {}
        }

        let mut working = (*cluster).clone();
        let result = match ClusterScope::new(&mut working, &self.secrets).await {
            Ok(mut scope) => with_deadline(self.config.reconcile_timeout, cluster::reconcile(&mut scope)).await,
            Err(e) => Err(e),
        };

        if let Err(e) = &result {
            let reason = match e {
                ControllerError::Credentials(_) => Some(reasons::CREDENTIALS_INVALID),
                ControllerError::Timeout(_) => Some(reasons::RECONCILE_FAILED),
                _ => None,
            };
            if let Some(reason) = reason {
                let status = working.status.get_or_insert_with(Default::default);
                status.ready = false;
                set_condition(&mut status.conditions, Condition::false_(READY_CONDITION, reason, e.to_string()));
            }
        }

        let writer = KubeWriter::new(api, &name);
        let persisted = persist::apply(
            &writer,
            persist::cluster_steps(&cluster, &working),
            cluster.metadata.resource_version.clone(),
        )
        .await;
        if let Err(e) = &persisted {
            error!("Failed to persist NvidiaBMMCluster {}/{}: {}", namespace, name, e);
        }
        let outcome = result?;
        persisted?;
        Ok(outcome.into_action(self.config.resync_interval))
    }

    /// Reconcile one NvidiaBMMMachine
    pub async fn reconcile_machine(&self, machine: Arc<NvidiaBMMMachine>) -> Result<Action, ControllerError> {
        let name = machine.name_any();
        let namespace = machine.namespace().unwrap_or_default();
        let api: Api<NvidiaBMMMachine> = Api::namespaced(self.client.clone(), &namespace);
        let owners: Api<capi::Machine> = Api::namespaced(self.client.clone(), &namespace);
        let deleting = machine.metadata.deletion_timestamp.is_some();

        let owner = match capi::owner_name(&machine.metadata, "Machine") {
            Some(owner_name) => owners.get_opt(owner_name).await?,
            None => None,
        };
        let owner_present = owner.is_some();
        let mut owner = match owner {
            Some(owner) => owner,
            None if deleting => {
                warn!("NvidiaBMMMachine {}/{} has no owning Machine, deleting without it", namespace, name);
                capi::Machine::new(&name, MachineSpec::default())
            }
            None => {
                info!("NvidiaBMMMachine {}/{} has no owning Machine yet, waiting", namespace, name);
                return Ok(Action::await_change());
            }
        };

        let cluster_name = capi::cluster_name_label(&machine.metadata)
            .map(str::to_string)
            .or_else(|| Some(owner.spec.cluster_name.clone()).filter(|n| !n.is_empty()));
        let Some(cluster_name) = cluster_name else {
            info!("NvidiaBMMMachine {}/{} is not yet associated with a Cluster, waiting", namespace, name);
            return Ok(Action::await_change());
        };

        let capi_cluster = Api::<capi::Cluster>::namespaced(self.client.clone(), &namespace)
            .get_opt(&cluster_name)
            .await?;
        match &capi_cluster {
            Some(capi_cluster) if capi::is_paused(capi_cluster, &machine.metadata) => {
                info!("Cluster {}/{} is paused, skipping NvidiaBMMMachine {}", namespace, cluster_name, name);
                return Ok(Action::await_change());
            }
            None if !deleting => {
                info!("Cluster {}/{} not found yet, waiting", namespace, cluster_name);
                return Ok(Action::requeue(DEPENDENCY_REQUEUE));
            }
            _ => {}
        }

        let infra_name = capi_cluster
            .as_ref()
            .and_then(|c| c.spec.infrastructure_ref.as_ref())
            .map(|r| r.name.clone())
            .unwrap_or_else(|| cluster_name.clone());
        let Some(infra_cluster) = Api::<NvidiaBMMCluster>::namespaced(self.client.clone(), &namespace)
            .get_opt(&infra_name)
            .await?
        else {
            info!("NvidiaBMMCluster {}/{} not found yet, waiting", namespace, infra_name);
            return Ok(Action::requeue(DEPENDENCY_REQUEUE));
        };

        let mut working = (*machine).clone();
        let owner_before = owner.clone();
        let result = match resolve_credentials(&infra_cluster, &self.secrets).await {
            Ok(credentials) => match credentials.connect() {
                Ok(bmm) => {
                    let mut scope = MachineScope::new(
                        &mut working,
                        &mut owner,
                        &infra_cluster,
                        &self.secrets,
                        bmm,
                        credentials.org_name,
                    );
                    with_deadline(self.config.reconcile_timeout, machine::reconcile(&mut scope)).await
                }
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };

        if let Err(e) = &result {
            let reason = match e {
                ControllerError::Credentials(_) => Some(reasons::CREDENTIALS_INVALID),
                ControllerError::Timeout(_) => Some(reasons::RECONCILE_FAILED),
                _ => None,
            };
            if let Some(reason) = reason {
                let status = working.status.get_or_insert_with(Default::default);
                status.ready = false;
                set_condition(&mut status.conditions, Condition::false_(READY_CONDITION, reason, e.to_string()));
            }
        }

        let adopted_endpoint = result.as_ref().ok().and_then(|outcome| outcome.adopted_endpoint.as_ref());
        let owner_change = owner_present.then_some((&owner_before, &owner));
        let steps = persist::machine_steps(&machine, &working, owner_change, adopted_endpoint);

        let mut writer = KubeWriter::new(api, &name)
            .with_cluster(Api::namespaced(self.client.clone(), &namespace), &infra_name);
        if owner_present {
            writer = writer.with_owner(owners, owner.name_any());
        }
        let persisted = persist::apply(&writer, steps, machine.metadata.resource_version.clone()).await;
        if let Err(e) = &persisted {
            error!("Failed to persist NvidiaBMMMachine {}/{}: {}", namespace, name, e);
        }

        let outcome = result?;
        persisted?;
        Ok(outcome.outcome.into_action(self.config.resync_interval))
    }
}
