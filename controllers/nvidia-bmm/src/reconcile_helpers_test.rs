//! Unit tests for reconcile_helpers module

use super::*;
use crds::{Condition, NetworkStatus, READY_CONDITION, reasons};
use std::collections::BTreeMap;

const FINALIZER: &str = "nvidiabmmcluster.infrastructure.cluster.x-k8s.io";

#[test]
fn test_add_finalizer_is_idempotent() {
    let mut meta = ObjectMeta::default();
    assert!(!has_finalizer(&meta, FINALIZER));

    assert!(add_finalizer(&mut meta, FINALIZER));
    assert!(!add_finalizer(&mut meta, FINALIZER));
    assert_eq!(meta.finalizers.as_ref().unwrap().len(), 1);
    assert!(has_finalizer(&meta, FINALIZER));
}

#[test]
fn test_remove_finalizer_keeps_others() {
    let mut meta = ObjectMeta {
        finalizers: Some(vec!["other.io/keep".to_string(), FINALIZER.to_string()]),
        ..Default::default()
    };

    assert!(remove_finalizer(&mut meta, FINALIZER));
    assert!(!remove_finalizer(&mut meta, FINALIZER));
    assert_eq!(meta.finalizers.unwrap(), vec!["other.io/keep".to_string()]);
}

#[tokio::test]
async fn test_check_existing_found() {
    let id = Uuid::new_v4();
    let result = check_existing(async { Ok::<_, BmmError>(42) }, "VPC", id).await.unwrap();
    assert_eq!(result, Some(42));
}

#[tokio::test]
async fn test_check_existing_not_found_means_stale() {
    let id = Uuid::new_v4();
    let result = check_existing(async { Err::<u8, _>(BmmError::NotFound("vpc".into())) }, "VPC", id)
        .await
        .unwrap();
    assert_eq!(result, None);
}

#[tokio::test]
async fn test_check_existing_other_errors_propagate() {
    let id = Uuid::new_v4();
    let err = check_existing(
        async {
            Err::<u8, _>(BmmError::Api {
                status: 500,
                message: "boom".into(),
            })
        },
        "VPC",
        id,
    )
    .await
    .unwrap_err();
    assert!(matches!(err, ControllerError::Bmm(BmmError::Api { status: 500, .. })));
}

#[tokio::test]
async fn test_delete_tolerates_not_found() {
    let id = Uuid::new_v4();
    delete_tolerating_absent(async { Err(BmmError::NotFound("subnet".into())) }, "Subnet", id)
        .await
        .unwrap();

    let err = delete_tolerating_absent(async { Err(BmmError::Timeout("slow".into())) }, "Subnet", id)
        .await
        .unwrap_err();
    assert!(matches!(err, ControllerError::Bmm(BmmError::Timeout(_))));
}

#[test]
fn test_parse_cached_id() {
    let id = Uuid::new_v4();
    assert_eq!(parse_cached_id(Some(&id.to_string()), "VPC"), Some(id));
    assert_eq!(parse_cached_id(Some(""), "VPC"), None);
    assert_eq!(parse_cached_id(Some("vpc-123"), "VPC"), None);
    assert_eq!(parse_cached_id(None, "VPC"), None);
}

#[test]
fn test_parse_cached_id_for_delete() {
    let id = Uuid::new_v4();
    assert_eq!(parse_cached_id_for_delete(&id.to_string(), "VPC").unwrap(), Some(id));
    assert_eq!(parse_cached_id_for_delete("", "VPC").unwrap(), None);

    let err = parse_cached_id_for_delete("vpc-123", "VPC").unwrap_err();
    assert!(matches!(err, ControllerError::InvalidConfig(_)));
    assert!(err.is_configuration());
}

#[test]
fn test_cluster_status_patch_nulls_cleared_ids_and_removed_subnets() {
    let before = NvidiaBMMClusterStatus {
        ready: true,
        vpc_id: Some("v".into()),
        network_status: NetworkStatus {
            subnet_ids: BTreeMap::from([("a".to_string(), "A".to_string()), ("b".to_string(), "B".to_string())]),
            nsg_id: Some("N".into()),
            ip_block_id: Some("I".into()),
        },
        conditions: vec![],
    };
    let after = NvidiaBMMClusterStatus {
        ready: false,
        vpc_id: Some("v".into()),
        network_status: NetworkStatus {
            subnet_ids: BTreeMap::from([("b".to_string(), "B".to_string())]),
            nsg_id: None,
            ip_block_id: Some("I".into()),
        },
        conditions: vec![Condition::false_(READY_CONDITION, reasons::DELETION_FAILED, "subnet a")],
    };

    let patch = cluster_status_patch(Some(&before), &after);
    let status = &patch["status"];
    assert_eq!(status["ready"], false);
    assert_eq!(status["vpcID"], "v");
    assert_eq!(status["networkStatus"]["subnetIDs"]["a"], Value::Null);
    assert_eq!(status["networkStatus"]["subnetIDs"]["b"], "B");
    assert_eq!(status["networkStatus"]["nsgID"], Value::Null);
    assert!(status["networkStatus"].as_object().unwrap().contains_key("nsgID"));
    assert_eq!(status["conditions"][0]["reason"], "DeletionFailed");
}

#[test]
fn test_cluster_status_patch_without_previous_status() {
    let after = NvidiaBMMClusterStatus::default();
    let patch = cluster_status_patch(None, &after);
    assert_eq!(patch["status"]["networkStatus"]["subnetIDs"], json!({}));
    assert_eq!(patch["status"]["vpcID"], Value::Null);
}

#[test]
fn test_machine_status_patch_writes_nulls() {
    let after = NvidiaBMMMachineStatus {
        addresses: vec![MachineAddress::internal_ip("10.0.1.7")],
        ..Default::default()
    };
    let patch = machine_status_patch(&after);
    assert_eq!(patch["status"]["instanceID"], Value::Null);
    assert_eq!(patch["status"]["instanceState"], Value::Null);
    assert_eq!(patch["status"]["addresses"][0]["type"], "InternalIP");
    assert_eq!(patch["status"]["addresses"][0]["address"], "10.0.1.7");
}

#[test]
fn test_finalizers_patch_carries_resource_version() {
    let patch = finalizers_patch(&[FINALIZER.to_string()], Some("17"));
    assert_eq!(patch["metadata"]["finalizers"][0], FINALIZER);
    assert_eq!(patch["metadata"]["resourceVersion"], "17");

    let emptied = finalizers_patch(&[], None);
    assert_eq!(emptied, json!({ "metadata": { "finalizers": [] } }));
}

#[test]
fn test_spec_patches() {
    assert_eq!(provider_id_patch(Some("nvidia-bmm://o/t/s/u")), json!({"spec": {"providerID": "nvidia-bmm://o/t/s/u"}}));
    let endpoint = ApiEndpoint {
        host: "10.0.1.7".into(),
        port: 6443,
    };
    assert_eq!(
        control_plane_endpoint_patch(&endpoint),
        json!({"spec": {"controlPlaneEndpoint": {"host": "10.0.1.7", "port": 6443}}})
    );
}
