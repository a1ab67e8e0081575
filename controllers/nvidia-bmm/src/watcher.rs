//! Kubernetes resource watchers.
//!
//! One `kube_runtime::Controller` per provider kind. Each also watches the
//! generic Cluster API record that points at it through `infrastructureRef`,
//! so pausing a Cluster or a bootstrap provider filling in a Machine
//! triggers a pass without waiting for the requeue.

use crate::error::ControllerError;
use crate::reconciler::{Reconciler, resource_key};
use crds::capi;
use crds::{NvidiaBMMCluster, NvidiaBMMMachine};
use futures::StreamExt;
use k8s_openapi::NamespaceResourceScope;
use kube::{Api, Client, Resource, ResourceExt};
use kube_runtime::controller::{Action, Config as RuntimeConfig};
use kube_runtime::reflector::ObjectRef;
use kube_runtime::{Controller, watcher};
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Drive a configured controller until shutdown.
///
/// Successful passes reset the per-object backoff; failures requeue with the
/// next exponential delay for that object.
async fn run_controller<K, F, Fut>(
    controller: Controller<K>,
    reconciler: Arc<Reconciler>,
    reconcile_fn: F,
    kind: &'static str,
) -> Result<(), ControllerError>
where
    K: Resource<DynamicType = ()> + Clone + Send + Sync + Debug + DeserializeOwned + 'static,
    F: Fn(Arc<Reconciler>, Arc<K>) -> Fut + Send + Sync + Clone + 'static,
    Fut: Future<Output = Result<Action, ControllerError>> + Send + 'static,
{
    info!("Starting {} watcher", kind);

    let error_policy = move |obj: Arc<K>, error: &ControllerError, ctx: Arc<Reconciler>| {
        let key = resource_key(kind, &obj.namespace().unwrap_or_default(), &obj.name_any());
        let delay = ctx.next_backoff(&key);
        warn!("Reconciliation of {} failed: {}, retrying in {:?}", key, error, delay);
        Action::requeue(delay)
    };

    let reconcile = move |obj: Arc<K>, ctx: Arc<Reconciler>| {
        let reconcile_fn = reconcile_fn.clone();
        async move {
            let key = resource_key(kind, &obj.namespace().unwrap_or_default(), &obj.name_any());
            debug!("Reconciling {}", key);
            let started = Instant::now();

            match reconcile_fn(ctx.clone(), obj).await {
                Ok(action) => {
                    ctx.reset_backoff(&key);
                    ctx.metrics().record_success(kind, started.elapsed());
                    Ok(action)
                }
                Err(e) => {
                    ctx.metrics().record_failure(kind, &e, started.elapsed());
                    error!("Reconciliation failed for {}: {}", key, e);
                    Err(e)
                }
            }
        }
    };

    let config = reconciler.config();
    let controller_config = RuntimeConfig::default()
        .debounce(config.debounce)
        .concurrency(config.concurrency);

    controller
        .with_config(controller_config)
        .shutdown_on_signal()
        .run(reconcile, error_policy, reconciler)
        .for_each(|res| async move {
            if let Err(e) = res {
                debug!("Controller event for {}: {}", kind, e);
            }
        })
        .await;

    info!("{} watcher stopped", kind);
    Ok(())
}

/// Object to requeue when a Cluster API record references a provider object
fn infrastructure_target<K>(meta_namespace: Option<String>, infra: Option<&capi::ContractVersionedObjectReference>) -> Option<ObjectRef<K>>
where
    K: Resource<DynamicType = ()>,
{
    let namespace = meta_namespace?;
    let infra = infra?;
    (infra.kind == K::kind(&()) && !infra.name.is_empty()).then(|| ObjectRef::new(&infra.name).within(&namespace))
}

/// Watches Kubernetes resources for changes.
#[derive(Clone)]
pub struct Watcher {
    reconciler: Arc<Reconciler>,
    client: Client,
}

impl Watcher {
    pub fn new(reconciler: Arc<Reconciler>, client: Client) -> Self {
        Self { reconciler, client }
    }

    fn api<K>(&self) -> Api<K>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
    {
        match self.reconciler.config().watch_namespace.as_deref() {
            Some(namespace) => Api::namespaced(self.client.clone(), namespace),
            None => Api::all(self.client.clone()),
        }
    }

    /// Starts watching NvidiaBMMCluster resources.
    pub async fn watch_clusters(&self) -> Result<(), ControllerError> {
        let controller = Controller::new(self.api::<NvidiaBMMCluster>(), watcher::Config::default()).watches(
            self.api::<capi::Cluster>(),
            watcher::Config::default(),
            |cluster: capi::Cluster| {
                infrastructure_target::<NvidiaBMMCluster>(cluster.namespace(), cluster.spec.infrastructure_ref.as_ref())
            },
        );

        run_controller(
            controller,
            self.reconciler.clone(),
            |reconciler, cluster| async move { reconciler.reconcile_cluster(cluster).await },
            "NvidiaBMMCluster",
        )
        .await
    }

    /// Starts watching NvidiaBMMMachine resources.
    pub async fn watch_machines(&self) -> Result<(), ControllerError> {
        let controller = Controller::new(self.api::<NvidiaBMMMachine>(), watcher::Config::default()).watches(
            self.api::<capi::Machine>(),
            watcher::Config::default(),
            |machine: capi::Machine| {
                infrastructure_target::<NvidiaBMMMachine>(machine.namespace(), Some(&machine.spec.infrastructure_ref))
            },
        );

        run_controller(
            controller,
            self.reconciler.clone(),
            |reconciler, machine| async move { reconciler.reconcile_machine(machine).await },
            "NvidiaBMMMachine",
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference(kind: &str, name: &str) -> capi::ContractVersionedObjectReference {
        capi::ContractVersionedObjectReference {
            api_group: "infrastructure.cluster.x-k8s.io".to_string(),
            kind: kind.to_string(),
            name: name.to_string(),
        }
    }

    #[test]
    fn test_infrastructure_target_matches_kind() {
        let infra = reference("NvidiaBMMCluster", "workload");
        let target = infrastructure_target::<NvidiaBMMCluster>(Some("capi".to_string()), Some(&infra)).unwrap();
        assert_eq!(target.name, "workload");
        assert_eq!(target.namespace.as_deref(), Some("capi"));
    }

    #[test]
    fn test_infrastructure_target_ignores_other_providers() {
        let infra = reference("AWSCluster", "workload");
        assert!(infrastructure_target::<NvidiaBMMCluster>(Some("capi".to_string()), Some(&infra)).is_none());
        assert!(infrastructure_target::<NvidiaBMMMachine>(Some("capi".to_string()), None).is_none());

        let machine_ref = reference("NvidiaBMMMachine", "");
        assert!(infrastructure_target::<NvidiaBMMMachine>(Some("capi".to_string()), Some(&machine_ref)).is_none());
        let machine_ref = reference("NvidiaBMMMachine", "cp-0");
        assert!(infrastructure_target::<NvidiaBMMMachine>(None, Some(&machine_ref)).is_none());
    }
}
