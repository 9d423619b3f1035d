//! API Module
//!
//! HTTP host surface for the provider lifecycle, with health checks and
//! prometheus metrics.

pub mod metrics;
pub mod rest;
pub mod server;

pub use metrics::ProviderMetrics;
pub use rest::{status_for, ApiErrorResponse, LifecycleRequest, RestRouter};
pub use server::{ApiServer, ApiServerConfig};
