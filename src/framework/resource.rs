//! Resource and data source contracts
//!
//! Handlers implement the typed [`Resource`] / [`DataSource`] traits. The
//! provider stores them behind the JSON-facing [`ResourceHandler`] /
//! [`DataSourceHandler`] traits, which add schema validation and planning
//! around every call.

use super::diagnostics::{Diagnostic, Diagnostics};
use super::plan::plan;
use super::schema::Schema;
use super::validation::validate_config;
use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::time::Instant;
use tracing::{debug, info};

/// Prefix of every registered type name
pub const TYPE_PREFIX: &str = "powerstore_";

// =============================================================================
// Typed Contracts
// =============================================================================

/// Lifecycle of one managed entity type
#[async_trait]
pub trait Resource: Send + Sync + 'static {
    /// Persisted state; also used to decode configuration and plans
    type State: Serialize + DeserializeOwned + Clone + Default + Send + Sync + 'static;

    /// Type name without the `powerstore_` prefix
    fn type_name(&self) -> &'static str;

    fn schema(&self) -> Schema;

    /// Cross-field checks the schema cannot express
    fn validate(&self, _config: &Self::State) -> Result<()> {
        Ok(())
    }

    async fn create(&self, plan: Self::State) -> Result<Self::State>;

    async fn read(&self, state: Self::State) -> Result<Self::State>;

    async fn update(&self, plan: Self::State, state: Self::State) -> Result<Self::State>;

    async fn delete(&self, state: Self::State) -> Result<()>;

    /// Seed state with only the identifier, then read it
    async fn import(&self, id: &str) -> Result<Self::State> {
        let seed: Self::State = serde_json::from_value(json!({ "id": id }))?;
        self.read(seed).await
    }
}

/// Read-only lookup of one entity type
#[async_trait]
pub trait DataSource: Send + Sync + 'static {
    type Config: DeserializeOwned + Send + Sync + 'static;
    type State: Serialize + Send + Sync + 'static;

    fn type_name(&self) -> &'static str;

    fn schema(&self) -> Schema;

    /// Cross-field checks the schema cannot express
    fn validate(&self, _config: &Self::Config) -> Result<()> {
        Ok(())
    }

    async fn read(&self, config: Self::Config) -> Result<Self::State>;
}

// =============================================================================
// JSON Handlers
// =============================================================================

/// Resource handler as seen by the host surface
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    fn type_name(&self) -> &'static str;

    fn schema(&self) -> Schema;

    /// Schema and cross-field validation of a configuration
    fn validate(&self, config: &Value) -> Diagnostics;

    /// Planned state for a configuration and optional prior state
    fn plan(&self, config: &Value, prior: Option<&Value>) -> Result<Value>;

    async fn create(&self, config: &Value) -> Result<Value>;

    async fn read(&self, state: &Value) -> Result<Value>;

    async fn update(&self, config: &Value, state: &Value) -> Result<Value>;

    async fn delete(&self, state: &Value) -> Result<()>;

    async fn import(&self, id: &str) -> Result<Value>;
}

/// Data source handler as seen by the host surface
#[async_trait]
pub trait DataSourceHandler: Send + Sync {
    fn type_name(&self) -> &'static str;

    fn schema(&self) -> Schema;

    fn validate(&self, config: &Value) -> Diagnostics;

    async fn read(&self, config: &Value) -> Result<Value>;
}

/// Adapter from a typed [`Resource`] to a [`ResourceHandler`]
pub struct JsonResource<R>(pub R);

/// Adapter from a typed [`DataSource`] to a [`DataSourceHandler`]
pub struct JsonDataSource<D>(pub D);

fn decode_state<T: DeserializeOwned>(value: &Value) -> Result<T> {
    serde_json::from_value(value.clone()).map_err(|e| {
        Error::validation(
            "Invalid Configuration",
            format!("Value does not match the attribute types: {}", e),
        )
    })
}

fn typed_validation<T, F>(config: &Value, check: F) -> Diagnostics
where
    T: DeserializeOwned,
    F: FnOnce(&T) -> Result<()>,
{
    let mut diags = Diagnostics::new();
    match decode_state::<T>(config).and_then(|typed| check(&typed)) {
        Ok(()) => {}
        Err(err) => diags.push(Diagnostic::from(&err)),
    }
    diags
}

#[async_trait]
impl<R: Resource> ResourceHandler for JsonResource<R> {
    fn type_name(&self) -> &'static str {
        self.0.type_name()
    }

    fn schema(&self) -> Schema {
        self.0.schema()
    }

    fn validate(&self, config: &Value) -> Diagnostics {
        let mut diags = validate_config(&self.0.schema(), config);
        if !diags.has_errors() {
            diags.extend(typed_validation::<R::State, _>(config, |c| self.0.validate(c)));
        }
        diags
    }

    fn plan(&self, config: &Value, prior: Option<&Value>) -> Result<Value> {
        self.validate(config).into_result()?;
        Ok(plan(&self.0.schema(), config, prior))
    }

    async fn create(&self, config: &Value) -> Result<Value> {
        let planned: R::State = decode_state(&self.plan(config, None)?)?;
        let started = Instant::now();
        info!("Creating {}{}", TYPE_PREFIX, self.type_name());
        let state = self.0.create(planned).await?;
        debug!("Created {}{} in {:?}", TYPE_PREFIX, self.type_name(), started.elapsed());
        Ok(serde_json::to_value(state)?)
    }

    async fn read(&self, state: &Value) -> Result<Value> {
        let current: R::State = decode_state(state)?;
        debug!("Reading {}{}", TYPE_PREFIX, self.type_name());
        Ok(serde_json::to_value(self.0.read(current).await?)?)
    }

    async fn update(&self, config: &Value, state: &Value) -> Result<Value> {
        let planned: R::State = decode_state(&self.plan(config, Some(state))?)?;
        let current: R::State = decode_state(state)?;
        info!("Updating {}{}", TYPE_PREFIX, self.type_name());
        Ok(serde_json::to_value(self.0.update(planned, current).await?)?)
    }

    async fn delete(&self, state: &Value) -> Result<()> {
        let current: R::State = decode_state(state)?;
        info!("Deleting {}{}", TYPE_PREFIX, self.type_name());
        self.0.delete(current).await
    }

    async fn import(&self, id: &str) -> Result<Value> {
        info!("Importing {}{} {}", TYPE_PREFIX, self.type_name(), id);
        Ok(serde_json::to_value(self.0.import(id).await?)?)
    }
}

#[async_trait]
impl<D: DataSource> DataSourceHandler for JsonDataSource<D> {
    fn type_name(&self) -> &'static str {
        self.0.type_name()
    }

    fn schema(&self) -> Schema {
        self.0.schema()
    }

    fn validate(&self, config: &Value) -> Diagnostics {
        let mut diags = validate_config(&self.0.schema(), config);
        if !diags.has_errors() {
            diags.extend(typed_validation::<D::Config, _>(config, |c| self.0.validate(c)));
        }
        diags
    }

    async fn read(&self, config: &Value) -> Result<Value> {
        self.validate(config).into_result()?;
        let typed: D::Config = decode_state(config)?;
        debug!("Reading data source {}{}", TYPE_PREFIX, self.type_name());
        Ok(serde_json::to_value(self.0.read(typed).await?)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framework::schema::{Attribute, Validator};
    use assert_matches::assert_matches;
    use serde::Deserialize;

    #[derive(Debug, Clone, Default, Serialize, Deserialize)]
    #[serde(default)]
    struct EchoState {
        id: Option<String>,
        name: Option<String>,
        unit: Option<String>,
    }

    struct Echo;

    #[async_trait]
    impl Resource for Echo {
        type State = EchoState;

        fn type_name(&self) -> &'static str {
            "echo"
        }

        fn schema(&self) -> Schema {
            Schema::new("echo")
                .attribute(Attribute::id("id"))
                .attribute(Attribute::string("name").required())
                .attribute(
                    Attribute::string("unit")
                        .default_value(json!("GB"))
                        .validate(Validator::OneOf(&["GB", "TB"])),
                )
        }

        fn validate(&self, config: &EchoState) -> Result<()> {
            if config.name.as_deref() == Some("forbidden") {
                return Err(Error::validation("Error creating echo", "name is forbidden"));
            }
            Ok(())
        }

        async fn create(&self, mut plan: EchoState) -> Result<EchoState> {
            plan.id = Some("echo-1".into());
            Ok(plan)
        }

        async fn read(&self, state: EchoState) -> Result<EchoState> {
            let id = state.id.unwrap_or_default();
            if id != "echo-1" {
                return Err(Error::NotFound {
                    kind: "echo".into(),
                    id,
                });
            }
            Ok(EchoState {
                id: Some(id),
                name: Some("imported".into()),
                unit: Some("GB".into()),
            })
        }

        async fn update(&self, plan: EchoState, _state: EchoState) -> Result<EchoState> {
            Ok(plan)
        }

        async fn delete(&self, _state: EchoState) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_create_applies_defaults() {
        let handler = JsonResource(Echo);
        let state = handler.create(&json!({"name": "a"})).await.unwrap();
        assert_eq!(state, json!({"id": "echo-1", "name": "a", "unit": "GB"}));
    }

    #[tokio::test]
    async fn test_validation_runs_before_create() {
        let handler = JsonResource(Echo);
        let err = handler.create(&json!({"name": "a", "unit": "KB"})).await.unwrap_err();
        assert_matches!(err, Error::Validation { .. });

        let err = handler.create(&json!({"name": "forbidden"})).await.unwrap_err();
        assert_matches!(err, Error::Validation { ref detail, .. } if detail == "name is forbidden");
    }

    #[tokio::test]
    async fn test_import_reads_by_id() {
        let handler = JsonResource(Echo);
        let state = handler.import("echo-1").await.unwrap();
        assert_eq!(state["name"], "imported");

        let err = handler.import("missing").await.unwrap_err();
        assert!(err.is_not_found());
    }
}
