//! Hardware Manager REST API Client
//!
//! A Rust client library for the vendor hardware manager API used by the
//! `dell-hwmgr` adaptor. Resources are allocated in bulk through resource
//! groups: a group request names, per node group, the resource pool, the
//! resource profile and the number of resources wanted. The backend fulfils
//! the request asynchronously and reports progress through the group's job
//! state.
//!
//! # Example
//!
//! ```no_run
//! use hwmgr_client::{HwMgrClient, HwMgrClientTrait, JobState};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = HwMgrClient::new(
//!     "https://hwmgr.example.com".to_string(),
//!     "your-api-token".to_string(),
//!     "default_tenant".to_string(),
//! )?;
//!
//! let pools = client.get_resource_pools().await?;
//! println!("{} resource pools", pools.len());
//!
//! let group = client.get_resource_group("rg-1234").await?;
//! if group.state() == JobState::Completed {
//!     println!("{} resources allocated", group.resources.len());
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod common;
pub mod error;
pub mod models;
#[path = "trait.rs"]
pub mod hwmgr_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use client::HwMgrClient;
pub use common::HttpClient;
pub use error::HwMgrError;
pub use models::*;
pub use hwmgr_trait::HwMgrClientTrait;
#[cfg(any(test, feature = "test-util"))]
pub use mock::MockHwMgrClient;
