//! Reconcile scopes
//!
//! A scope wraps the objects of one reconcile pass together with an
//! authenticated BMM client, and exposes typed accessors over the state the
//! reconcilers read and write. Scopes only mutate in memory; persisting the
//! result is the caller's job.

pub mod cluster;
pub mod machine;

pub use cluster::{ClusterScope, resolve_credentials};
pub use machine::{InstanceAllocation, MachineScope};

use crate::error::ControllerError;
use crds::SiteReference;
use uuid::Uuid;

/// Resolve a site reference to its UUID.
///
/// A direct ID wins over a name. Name lookups are not supported yet.
pub fn resolve_site_id(site_ref: &SiteReference) -> Result<Uuid, ControllerError> {
    if let Some(id) = site_ref.id.as_deref().filter(|id| !id.is_empty()) {
        return parse_uuid(id, "site ID");
    }
    if site_ref.name.as_deref().is_some_and(|name| !name.is_empty()) {
        return Err(ControllerError::InvalidConfig(
            "site name reference not yet supported, use siteRef.id".to_string(),
        ));
    }
    Err(ControllerError::InvalidConfig("site reference is empty".to_string()))
}

/// Parse a UUID-valued field, naming it in the error
pub fn parse_uuid(value: &str, what: &str) -> Result<Uuid, ControllerError> {
    Uuid::parse_str(value.trim())
        .map_err(|e| ControllerError::InvalidConfig(format!("invalid {} {:?}: {}", what, value, e)))
}
