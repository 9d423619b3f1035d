//! PowerStore Provider
//!
//! Declarative lifecycle management for Dell PowerStore arrays: file systems,
//! NFS exports, SMB shares, hosts and host groups, volumes and volume groups,
//! snapshots, and protection rules and policies.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │              Host surface (CLI / axum REST API)                  │
//! ├──────────────────────────────────────────────────────────────────┤
//! │   PowerStoreProvider: resource + data source registry            │
//! │  ┌────────────────────────────┐  ┌────────────────────────────┐  │
//! │  │  Resources (14)            │  │  Data sources (15)         │  │
//! │  │  create/read/update/delete │  │  id / name / filter lookup │  │
//! │  └─────────────┬──────────────┘  └─────────────┬──────────────┘  │
//! │                └──────────────┬────────────────┘                 │
//! │         Framework: schema, validation, planning, diagnostics     │
//! ├──────────────────────────────────────────────────────────────────┤
//! │   PowerStoreClient (typed facade over PowerStoreApi)             │
//! │  ┌────────────────────────────┐  ┌────────────────────────────┐  │
//! │  │  RestClient (reqwest)      │  │  InMemoryArray             │  │
//! │  └────────────────────────────┘  └────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`provider`]: provider registry, resources, and data sources
//! - [`framework`]: schemas, validators, diagnostics, lifecycle traits
//! - [`client`]: PowerStore REST client, entity models, in-memory array
//! - [`domain`]: transport trait, list queries, capacity units
//! - [`api`]: HTTP host surface and metrics
//! - [`config`]: provider connection settings
//! - [`error`]: Error types and handling

pub mod api;
pub mod client;
pub mod config;
pub mod domain;
pub mod error;
pub mod framework;
pub mod provider;

// Re-export commonly used types
pub use api::{ApiServer, ApiServerConfig, ProviderMetrics};
pub use client::{InMemoryArray, PowerStoreClient, RestClient};
pub use config::{ConfigOverrides, ProviderConfig};
pub use domain::ports::{Collection, ListQuery, PowerStoreApi, PowerStoreApiRef};
pub use error::{Error, ErrorCategory, Result};
pub use framework::{DataSourceHandler, Diagnostics, ResourceHandler, Schema};
pub use provider::PowerStoreProvider;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
