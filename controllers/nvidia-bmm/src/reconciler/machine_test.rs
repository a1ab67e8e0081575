//! Unit tests for the NvidiaBMMMachine reconciler

use super::*;
use crate::test_utils::{
    CLUSTER_NAMESPACE, MockSecretReader, TEST_TENANT_ID, create_test_capi_machine, create_test_machine,
    create_test_ready_cluster, deletion_timestamp,
};
use bmm_client::{MockBmmClient, Operation, ResourceKind};
use crds::capi;
use crds::{
    AdditionalInterface, ConditionStatus, MACHINE_FINALIZER, MachineAddressType, NvidiaBMMCluster, NvidiaBMMMachine,
    NvidiaBMMMachineStatus, find_condition,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use uuid::Uuid;

struct Fixture {
    machine: NvidiaBMMMachine,
    owner: capi::Machine,
    cluster: NvidiaBMMCluster,
    secrets: MockSecretReader,
    mock: MockBmmClient,
}

impl Fixture {
    fn new(name: &str, control_plane: bool) -> Self {
        let bootstrap = format!("{}-bootstrap", name);
        Self {
            machine: create_test_machine(name, CLUSTER_NAMESPACE, "cp"),
            owner: create_test_capi_machine(name, CLUSTER_NAMESPACE, "workload", Some(&bootstrap), control_plane),
            cluster: create_test_ready_cluster("workload", CLUSTER_NAMESPACE, &["cp", "workers"]),
            secrets: MockSecretReader::new().with_secret(CLUSTER_NAMESPACE, &bootstrap, &[("value", "#cloud-config")]),
            mock: MockBmmClient::default(),
        }
    }

    fn worker() -> Self {
        Self::new("worker-0", false)
    }

    fn with_finalizer(mut self) -> Self {
        self.machine.metadata.finalizers = Some(vec![MACHINE_FINALIZER.to_string()]);
        self
    }

    async fn run(&mut self) -> Result<MachineOutcome, ControllerError> {
        let mut scope = MachineScope::new(
            &mut self.machine,
            &mut self.owner,
            &self.cluster,
            &self.secrets,
            Arc::new(self.mock.clone()),
            "acme",
        );
        reconcile(&mut scope).await
    }

    /// Finalizer pass, then the create pass; returns the new instance ID
    async fn provision(&mut self) -> Uuid {
        assert_eq!(self.run().await.unwrap().outcome, ReconcileOutcome::RequeueNow);
        assert_eq!(
            self.run().await.unwrap().outcome,
            ReconcileOutcome::RequeueAfter(DEPENDENCY_REQUEUE)
        );
        self.instance_id()
    }

    /// Provision, then report the instance Ready with one address
    async fn provision_ready(&mut self, address: &str) -> MachineOutcome {
        let instance_id = self.provision().await;
        self.mock.set_instance_status(instance_id, InstanceStatus::Ready);
        self.mock.set_instance_addresses(instance_id, &[address]);
        self.run().await.unwrap()
    }

    fn status(&self) -> &NvidiaBMMMachineStatus {
        self.machine.status.as_ref().unwrap()
    }

    fn instance_id(&self) -> Uuid {
        Uuid::parse_str(self.status().instance_id.as_deref().unwrap()).unwrap()
    }

    fn condition(&self, type_: &str) -> Option<(ConditionStatus, String)> {
        find_condition(&self.status().conditions, type_).map(|c| (c.status, c.reason.clone()))
    }

    fn cluster_subnet(&self, name: &str) -> Uuid {
        let ids = &self.cluster.status.as_ref().unwrap().network_status.subnet_ids;
        Uuid::parse_str(&ids[name]).unwrap()
    }
}

#[tokio::test]
async fn test_waits_for_cluster_ready() {
    let mut fixture = Fixture::worker();
    fixture.cluster.status.as_mut().unwrap().ready = false;

    let outcome = fixture.run().await.unwrap();
    assert_eq!(outcome.outcome, ReconcileOutcome::RequeueAfter(DEPENDENCY_REQUEUE));
    assert_eq!(outcome.adopted_endpoint, None);
    assert!(fixture.machine.metadata.finalizers.is_none());
    assert!(fixture.status().instance_id.is_none());
    assert!(fixture.mock.calls().is_empty());
}

#[tokio::test]
async fn test_waits_for_bootstrap_data() {
    let mut fixture = Fixture::worker();
    fixture.owner.spec.bootstrap.data_secret_name = None;

    let outcome = fixture.run().await.unwrap();
    assert_eq!(outcome.outcome, ReconcileOutcome::RequeueAfter(DEPENDENCY_REQUEUE));
    assert!(fixture.machine.metadata.finalizers.is_none());
    assert!(fixture.mock.calls().is_empty());
}

#[tokio::test]
async fn test_creates_instance_by_type() {
    let mut fixture = Fixture::worker();
    let instance_id = fixture.provision().await;

    let requests = fixture.mock.instance_requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.name, "worker-0");
    assert_eq!(request.tenant_id.to_string(), TEST_TENANT_ID);
    assert_eq!(
        Some(request.vpc_id.to_string()),
        fixture.cluster.status.as_ref().unwrap().vpc_id
    );
    assert_eq!(
        request.instance_type_id.map(|id| id.to_string()),
        fixture.machine.spec.instance_type.id
    );
    assert_eq!(request.machine_id, None);
    assert_eq!(request.allow_unhealthy_machine, None);
    assert_eq!(request.user_data.as_deref(), Some("#cloud-config"));
    assert_eq!(request.phone_home_enabled, Some(true));
    assert_eq!(request.ssh_key_group_ids, None);
    assert_eq!(request.labels, None);
    assert_eq!(
        request.interfaces,
        vec![InterfaceCreateRequest {
            subnet_id: fixture.cluster_subnet("cp"),
            is_physical: false,
        }]
    );

    let status = fixture.status();
    assert_eq!(status.instance_state, Some(InstanceState::Provisioning));
    assert!(status.machine_id.is_some());
    assert!(!status.ready);
    assert_eq!(
        fixture.condition(INSTANCE_PROVISIONED_CONDITION).unwrap(),
        (ConditionStatus::True, reasons::PROVISIONED.to_string())
    );

    let provider_id = fixture.machine.spec.provider_id.clone().unwrap();
    assert!(provider_id.starts_with("nvidia-bmm://acme/"));
    assert!(provider_id.ends_with(&instance_id.to_string()));
    assert_eq!(fixture.owner.spec.provider_id, Some(provider_id));
}

#[tokio::test]
async fn test_creates_instance_on_specific_machine() {
    let mut fixture = Fixture::worker().with_finalizer();
    let ssh_group = Uuid::new_v4();
    let spec = &mut fixture.machine.spec;
    spec.instance_type.id = None;
    spec.instance_type.machine_id = Some("fm100-07".to_string());
    spec.instance_type.allow_unhealthy_machine = true;
    spec.network.additional_interfaces = vec![AdditionalInterface {
        subnet_name: "workers".to_string(),
        is_physical: true,
    }];
    spec.ssh_key_groups = vec![ssh_group.to_string()];
    spec.labels = BTreeMap::from([("pool".to_string(), "gpu".to_string())]);

    fixture.run().await.unwrap();
    let request = fixture.mock.instance_requests().remove(0);
    assert_eq!(request.instance_type_id, None);
    assert_eq!(request.machine_id.as_deref(), Some("fm100-07"));
    assert_eq!(request.allow_unhealthy_machine, Some(true));
    assert_eq!(request.ssh_key_group_ids, Some(vec![ssh_group]));
    assert_eq!(request.labels.unwrap()["pool"], "gpu");
    assert_eq!(request.interfaces.len(), 2);
    assert!(!request.interfaces[0].is_physical);
    assert_eq!(request.interfaces[1].subnet_id, fixture.cluster_subnet("workers"));
    assert!(request.interfaces[1].is_physical);
    assert_eq!(fixture.status().machine_id.as_deref(), Some("fm100-07"));
}

#[tokio::test]
async fn test_invalid_ssh_key_group_is_configuration_error() {
    let mut fixture = Fixture::worker().with_finalizer();
    fixture.machine.spec.ssh_key_groups = vec!["admins".to_string()];

    let err = fixture.run().await.unwrap_err();
    assert!(err.is_configuration());
    assert_eq!(fixture.mock.count(Operation::Create, ResourceKind::Instance), 0);
    assert_eq!(
        fixture.condition(INSTANCE_PROVISIONED_CONDITION).unwrap(),
        (ConditionStatus::False, reasons::INVALID_CONFIGURATION.to_string())
    );
    assert!(fixture.status().instance_id.is_none());
}

#[tokio::test]
async fn test_unknown_subnet_is_configuration_error() {
    let mut fixture = Fixture::worker().with_finalizer();
    fixture.machine.spec.network.subnet_name = "storage".to_string();

    let err = fixture.run().await.unwrap_err();
    assert!(err.is_configuration());
    assert_eq!(fixture.mock.count(Operation::Create, ResourceKind::Instance), 0);
}

#[tokio::test]
async fn test_create_failure_is_reported() {
    let mut fixture = Fixture::worker().with_finalizer();
    fixture.mock.fail(Operation::Create, ResourceKind::Instance);

    let err = fixture.run().await.unwrap_err();
    assert!(matches!(err, ControllerError::Bmm(_)));
    assert!(fixture.status().instance_id.is_none());
    assert_eq!(
        fixture.condition(READY_CONDITION).unwrap(),
        (ConditionStatus::False, reasons::INSTANCE_CREATION_FAILED.to_string())
    );
}

#[tokio::test]
async fn test_polls_until_ready() {
    let mut fixture = Fixture::worker();
    let instance_id = fixture.provision().await;

    let outcome = fixture.run().await.unwrap();
    assert_eq!(outcome.outcome, ReconcileOutcome::RequeueAfter(POLL_REQUEUE));
    assert!(!fixture.status().ready);
    assert!(fixture.status().addresses.is_empty());
    let (status, reason) = fixture.condition(READY_CONDITION).unwrap();
    assert_eq!(status, ConditionStatus::False);
    assert_eq!(reason, reasons::INSTANCE_NOT_READY);
    assert!(fixture.condition(NETWORK_CONFIGURED_CONDITION).is_none());

    fixture.mock.set_instance_status(instance_id, InstanceStatus::Ready);
    fixture.mock.set_instance_addresses(instance_id, &["10.0.1.10"]);
    let outcome = fixture.run().await.unwrap();
    assert_eq!(outcome.outcome, ReconcileOutcome::Done);
    assert_eq!(outcome.adopted_endpoint, None);

    let status = fixture.status();
    assert!(status.ready);
    assert_eq!(status.instance_state, Some(InstanceState::Ready));
    assert_eq!(status.addresses.len(), 1);
    assert_eq!(status.addresses[0].address_type, MachineAddressType::InternalIP);
    assert_eq!(status.addresses[0].address, "10.0.1.10");
    assert_eq!(fixture.owner.status.as_ref().unwrap().addresses, status.addresses);
    assert_eq!(fixture.condition(READY_CONDITION).unwrap().0, ConditionStatus::True);
    assert_eq!(
        fixture.condition(NETWORK_CONFIGURED_CONDITION).unwrap(),
        (ConditionStatus::True, reasons::ADDRESSES_ASSIGNED.to_string())
    );
    assert_eq!(fixture.mock.count(Operation::Create, ResourceKind::Instance), 1);
}

#[tokio::test]
async fn test_polling_restores_missing_provider_id() {
    let mut fixture = Fixture::worker();
    fixture.provision().await;
    let expected = fixture.machine.spec.provider_id.take();

    fixture.run().await.unwrap();
    assert_eq!(fixture.machine.spec.provider_id, expected);
}

#[tokio::test]
async fn test_vanished_instance_is_not_recreated() {
    let mut fixture = Fixture::worker();
    let instance_id = fixture.provision().await;
    fixture.mock.remove(ResourceKind::Instance, instance_id);

    let err = fixture.run().await.unwrap_err();
    assert!(matches!(err, ControllerError::Bmm(BmmError::NotFound(_))));
    assert_eq!(fixture.instance_id(), instance_id);
    assert_eq!(fixture.mock.count(Operation::Create, ResourceKind::Instance), 1);
    assert_eq!(
        fixture.condition(READY_CONDITION).unwrap(),
        (ConditionStatus::False, reasons::INSTANCE_NOT_FOUND.to_string())
    );
}

#[tokio::test]
async fn test_query_failure_is_reported() {
    let mut fixture = Fixture::worker();
    fixture.provision().await;
    fixture.mock.fail(Operation::Get, ResourceKind::Instance);

    assert!(fixture.run().await.is_err());
    assert_eq!(
        fixture.condition(INSTANCE_PROVISIONED_CONDITION).unwrap(),
        (ConditionStatus::False, reasons::INSTANCE_QUERY_FAILED.to_string())
    );
}

#[tokio::test]
async fn test_unreadable_instance_id_fails_pass() {
    let mut fixture = Fixture::worker().with_finalizer();
    fixture.machine.status = Some(NvidiaBMMMachineStatus {
        instance_id: Some("i-123".to_string()),
        ..Default::default()
    });

    let err = fixture.run().await.unwrap_err();
    assert!(err.is_configuration());
    assert!(fixture.mock.calls().is_empty());
    assert_eq!(
        fixture.condition(READY_CONDITION).unwrap(),
        (ConditionStatus::False, reasons::INVALID_CONFIGURATION.to_string())
    );
}

#[tokio::test]
async fn test_first_ready_control_plane_adopts_endpoint() {
    let mut first = Fixture::new("cp-0", true);
    let outcome = first.provision_ready("10.0.1.10").await;
    let endpoint = outcome.adopted_endpoint.unwrap();
    assert_eq!(endpoint.host, "10.0.1.10");
    assert_eq!(endpoint.port, ENDPOINT_PORT);

    // the caller records the endpoint on the cluster
    let mut cluster = first.cluster.clone();
    cluster.spec.control_plane_endpoint = Some(endpoint);

    for (name, address) in [("cp-1", "10.0.1.11"), ("cp-2", "10.0.1.12")] {
        let mut other = Fixture::new(name, true);
        other.cluster = cluster.clone();
        let outcome = other.provision_ready(address).await;
        assert_eq!(outcome.outcome, ReconcileOutcome::Done);
        assert_eq!(outcome.adopted_endpoint, None, "{} adopted a second endpoint", name);
    }
}

#[tokio::test]
async fn test_ready_control_plane_without_address_adopts_nothing() {
    let mut fixture = Fixture::new("cp-0", true);
    let instance_id = fixture.provision().await;
    fixture.mock.set_instance_status(instance_id, InstanceStatus::Ready);

    let outcome = fixture.run().await.unwrap();
    assert_eq!(outcome.outcome, ReconcileOutcome::Done);
    assert_eq!(outcome.adopted_endpoint, None);
}

#[tokio::test]
async fn test_delete_terminates_instance() {
    let mut fixture = Fixture::worker();
    let instance_id = fixture.provision().await;
    fixture.machine.metadata.deletion_timestamp = Some(deletion_timestamp());

    assert_eq!(fixture.run().await.unwrap().outcome, ReconcileOutcome::Done);
    assert!(!fixture.mock.contains(ResourceKind::Instance, instance_id));
    assert_eq!(fixture.mock.instance_delete_requests(), vec![InstanceDeleteRequest::default()]);
    assert!(fixture.status().instance_id.is_none());
    assert_eq!(fixture.status().instance_state, Some(InstanceState::Terminating));
    assert!(!fixture.status().ready);
    assert!(fixture.machine.metadata.finalizers.as_ref().unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_ignores_gates() {
    let mut fixture = Fixture::worker();
    let instance_id = fixture.provision().await;
    fixture.cluster.status.as_mut().unwrap().ready = false;
    fixture.owner.spec.bootstrap.data_secret_name = None;
    fixture.machine.metadata.deletion_timestamp = Some(deletion_timestamp());

    fixture.run().await.unwrap();
    assert!(fixture.mock.position(Operation::Delete, instance_id).is_some());
}

#[tokio::test]
async fn test_delete_tolerates_missing_instance() {
    let mut fixture = Fixture::worker();
    let instance_id = fixture.provision().await;
    fixture.mock.remove(ResourceKind::Instance, instance_id);
    fixture.machine.metadata.deletion_timestamp = Some(deletion_timestamp());

    assert_eq!(fixture.run().await.unwrap().outcome, ReconcileOutcome::Done);
    assert!(fixture.machine.metadata.finalizers.as_ref().unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_without_instance() {
    let mut fixture = Fixture::worker().with_finalizer();
    fixture.machine.metadata.deletion_timestamp = Some(deletion_timestamp());

    assert_eq!(fixture.run().await.unwrap().outcome, ReconcileOutcome::Done);
    assert!(fixture.mock.calls().is_empty());
    assert!(fixture.machine.metadata.finalizers.as_ref().unwrap().is_empty());
}

#[tokio::test]
async fn test_delete_with_unreadable_instance_id_keeps_finalizer() {
    let mut fixture = Fixture::worker().with_finalizer();
    fixture.machine.status = Some(NvidiaBMMMachineStatus {
        instance_id: Some("i-123".to_string()),
        ..Default::default()
    });
    fixture.machine.metadata.deletion_timestamp = Some(deletion_timestamp());

    let err = fixture.run().await.unwrap_err();
    assert!(err.is_configuration());
    assert_eq!(fixture.mock.count(Operation::Delete, ResourceKind::Instance), 0);
    assert_eq!(fixture.status().instance_id.as_deref(), Some("i-123"));
    assert_eq!(fixture.machine.metadata.finalizers, Some(vec![MACHINE_FINALIZER.to_string()]));
    assert_eq!(
        fixture.condition(READY_CONDITION).unwrap(),
        (ConditionStatus::False, reasons::DELETION_FAILED.to_string())
    );
}

#[tokio::test]
async fn test_delete_failure_keeps_finalizer() {
    let mut fixture = Fixture::worker();
    let instance_id = fixture.provision().await;
    fixture.mock.fail(Operation::Delete, ResourceKind::Instance);
    fixture.machine.metadata.deletion_timestamp = Some(deletion_timestamp());

    assert!(fixture.run().await.is_err());
    assert_eq!(fixture.instance_id(), instance_id);
    assert_eq!(fixture.machine.metadata.finalizers, Some(vec![MACHINE_FINALIZER.to_string()]));
    assert_eq!(
        fixture.condition(READY_CONDITION).unwrap(),
        (ConditionStatus::False, reasons::DELETION_FAILED.to_string())
    );

    fixture.mock.clear_failures();
    assert_eq!(fixture.run().await.unwrap().outcome, ReconcileOutcome::Done);
    assert!(!fixture.mock.contains(ResourceKind::Instance, instance_id));
}

#[test]
fn test_instance_state_mapping() {
    assert_eq!(instance_state(Some(InstanceStatus::Pending)), InstanceState::Pending);
    assert_eq!(instance_state(Some(InstanceStatus::Ready)), InstanceState::Ready);
    assert_eq!(instance_state(Some(InstanceStatus::Error)), InstanceState::Error);
    assert_eq!(instance_state(Some(InstanceStatus::Unknown)), InstanceState::Unknown);
    assert_eq!(instance_state(None), InstanceState::Unknown);
}
