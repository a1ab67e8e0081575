//! NVIDIA BMM REST API Client
//!
//! A Rust client for the subset of the NVIDIA BMM (Carbide) REST API used by
//! the Cluster API infrastructure provider: VPCs, IP blocks, subnets, network
//! security groups and instances.
//!
//! # Example
//!
//! ```no_run
//! use bmm_client::{BmmClient, BmmClientTrait, VpcCreateRequest};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = BmmClient::new(
//!     "https://bmm.example.com".to_string(),
//!     "your-api-token".to_string(),
//! )?;
//!
//! let vpc = client
//!     .create_vpc("my-org", &VpcCreateRequest {
//!         name: "cluster-a".to_string(),
//!         site_id: uuid::Uuid::new_v4(),
//!         network_virtualization_type: None,
//!         labels: None,
//!     })
//!     .await?;
//! println!("created VPC {}", vpc.id);
//! # Ok(())
//! # }
//! ```
//!
//! All identifiers are UUIDs. `get_*` and `delete_*` return
//! [`BmmError::NotFound`] when the resource does not exist, which callers use
//! to detect drift.

pub mod client;
pub mod error;
pub mod models;
#[path = "trait.rs"]
pub mod bmm_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use client::BmmClient;
pub use error::BmmError;
pub use models::*;
pub use bmm_trait::BmmClientTrait;
#[cfg(feature = "test-util")]
pub use mock::{MockBmmClient, MockCall, Operation, ResourceKind};
