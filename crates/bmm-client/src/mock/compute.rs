//! Instance operations for MockBmmClient

use super::{MockBmmClient, Operation, ResourceKind};
use crate::error::BmmError;
use crate::models::*;
use uuid::Uuid;

pub async fn create_instance(client: &MockBmmClient, _org: &str, request: &InstanceCreateRequest) -> Result<Instance, BmmError> {
    client.record(Operation::Create, ResourceKind::Instance, None)?;
    client.instance_requests.lock().unwrap().push(request.clone());

    let id = Uuid::new_v4();
    let instance = Instance {
        id,
        name: request.name.clone(),
        status: Some(*client.initial_instance_status.lock().unwrap()),
        machine_id: request
            .machine_id
            .clone()
            .or_else(|| Some(format!("machine-{}", id.simple()))),
        interfaces: request
            .interfaces
            .iter()
            .map(|i| InstanceInterface {
                subnet_id: Some(i.subnet_id),
                is_physical: Some(i.is_physical),
                ip_addresses: Vec::new(),
            })
            .collect(),
    };
    client.record_created(id);
    client.instances.lock().unwrap().insert(id, instance.clone());
    Ok(instance)
}

pub async fn get_instance(client: &MockBmmClient, _org: &str, id: Uuid) -> Result<Instance, BmmError> {
    client.record(Operation::Get, ResourceKind::Instance, Some(id))?;
    client.instances
        .lock()
        .unwrap()
        .get(&id)
        .cloned()
        .ok_or_else(|| BmmError::NotFound(format!("Instance {} not found", id)))
}

pub async fn delete_instance(
    client: &MockBmmClient,
    _org: &str,
    id: Uuid,
    request: &InstanceDeleteRequest,
) -> Result<(), BmmError> {
    client.record(Operation::Delete, ResourceKind::Instance, Some(id))?;
    client.instance_delete_requests.lock().unwrap().push(request.clone());
    client.instances
        .lock()
        .unwrap()
        .remove(&id)
        .map(|_| ())
        .ok_or_else(|| BmmError::NotFound(format!("Instance {} not found", id)))
}
