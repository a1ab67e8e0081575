//! Provider ID codec
//!
//! A provider ID ties a Cluster API `Machine` to the BMM instance backing it:
//!
//! ```text
//! nvidia-bmm://<org>/<tenant>/<site>/<instance-uuid>
//! ```

use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

/// URI scheme of every provider ID this controller writes
pub const PROVIDER_ID_SCHEME: &str = "nvidia-bmm";

const SCHEME_SEPARATOR: &str = "://";

/// Provider ID parse and construction errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProviderIdError {
    /// Wrong scheme, wrong segment count, or an empty segment
    #[error("malformed provider ID: {0}")]
    Structural(String),

    /// The instance segment is not a UUID
    #[error("invalid instance UUID {value:?} in provider ID: {reason}")]
    InvalidUuid {
        /// Offending segment
        value: String,
        /// Parser message
        reason: String,
    },
}

/// Decoded provider ID
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProviderId {
    org: String,
    tenant: String,
    site: String,
    instance_id: Uuid,
}

impl ProviderId {
    /// Build a provider ID; segments must be non-empty and free of `/`.
    pub fn new(
        org: impl Into<String>,
        tenant: impl Into<String>,
        site: impl Into<String>,
        instance_id: Uuid,
    ) -> Result<Self, ProviderIdError> {
        let id = Self {
            org: org.into(),
            tenant: tenant.into(),
            site: site.into(),
            instance_id,
        };
        for (label, value) in [("org", &id.org), ("tenant", &id.tenant), ("site", &id.site)] {
            validate_segment(label, value)?;
        }
        Ok(id)
    }

    /// Organization segment
    pub fn org(&self) -> &str {
        &self.org
    }

    /// Tenant segment
    pub fn tenant(&self) -> &str {
        &self.tenant
    }

    /// Site segment
    pub fn site(&self) -> &str {
        &self.site
    }

    /// Instance UUID
    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    /// Encoded string form
    pub fn encode(&self) -> String {
        self.to_string()
    }

    /// Parse an encoded provider ID
    pub fn decode(value: &str) -> Result<Self, ProviderIdError> {
        let rest = value
            .strip_prefix(PROVIDER_ID_SCHEME)
            .and_then(|rest| rest.strip_prefix(SCHEME_SEPARATOR))
            .ok_or_else(|| {
                ProviderIdError::Structural(format!(
                    "{:?} does not start with {}{}",
                    value, PROVIDER_ID_SCHEME, SCHEME_SEPARATOR
                ))
            })?;

        let segments: Vec<&str> = rest.split('/').collect();
        let [org, tenant, site, instance] = segments.as_slice() else {
            return Err(ProviderIdError::Structural(format!(
                "{:?} has {} segments, expected 4",
                value,
                segments.len()
            )));
        };

        for (label, segment) in [("org", org), ("tenant", tenant), ("site", site), ("instance", instance)] {
            if segment.is_empty() {
                return Err(ProviderIdError::Structural(format!("{:?} has an empty {} segment", value, label)));
            }
        }

        let instance_id = Uuid::parse_str(instance).map_err(|e| ProviderIdError::InvalidUuid {
            value: (*instance).to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            org: (*org).to_string(),
            tenant: (*tenant).to_string(),
            site: (*site).to_string(),
            instance_id,
        })
    }
}

fn validate_segment(label: &str, value: &str) -> Result<(), ProviderIdError> {
    if value.is_empty() {
        return Err(ProviderIdError::Structural(format!("{} segment is empty", label)));
    }
    if value.contains('/') {
        return Err(ProviderIdError::Structural(format!("{} segment {:?} contains '/'", label, value)));
    }
    Ok(())
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}/{}/{}/{}",
            PROVIDER_ID_SCHEME, SCHEME_SEPARATOR, self.org, self.tenant, self.site, self.instance_id
        )
    }
}

impl FromStr for ProviderId {
    type Err = ProviderIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::decode(s)
    }
}
