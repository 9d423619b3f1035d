//! Provider framework
//!
//! The pieces every resource shares:
//! - [`schema`]: attribute declarations and validators
//! - [`validation`]: config checks run before any remote call
//! - [`plan`]: defaults and state-for-unknown planning
//! - [`diagnostics`]: findings reported to the caller
//! - [`resource`]: the lifecycle traits and their JSON adapters

pub mod diagnostics;
pub mod plan;
pub mod resource;
pub mod schema;
pub mod validation;

pub use diagnostics::{Diagnostic, Diagnostics, Severity};
pub use resource::{
    DataSource, DataSourceHandler, JsonDataSource, JsonResource, Resource, ResourceHandler,
    TYPE_PREFIX,
};
pub use schema::{AttrType, Attribute, ConfigRule, Schema, Validator};
