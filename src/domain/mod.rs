//! Domain layer - ports and value conversions shared by every resource
//!
//! This module defines the transport trait the array adapters implement and
//! the capacity unit arithmetic the sized resources rely on.

pub mod ports;
pub mod units;

pub use ports::*;
pub use units::{from_bytes, to_bytes, CapacityUnit};
