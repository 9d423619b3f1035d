//! `powerstore_storagecontainer`

use super::{changed, id_of, Messages};
use crate::client::{PowerStoreClient, StorageContainer};
use crate::domain::ports::Collection;
use crate::error::Result;
use crate::framework::{Attribute, Resource, Schema, Validator};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

const MESSAGES: Messages = Messages("storage container");

const PROTOCOLS: &[&str] = &["SCSI", "NVMe"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageContainerState {
    pub id: Option<String>,
    pub name: Option<String>,
    pub quota: Option<i64>,
    pub storage_protocol: Option<String>,
    pub high_water_mark: Option<i64>,
}

impl From<StorageContainer> for StorageContainerState {
    fn from(container: StorageContainer) -> Self {
        Self {
            id: Some(container.id),
            name: Some(container.name),
            quota: Some(container.quota),
            storage_protocol: Some(container.storage_protocol),
            high_water_mark: Some(container.high_water_mark),
        }
    }
}

/// Create and modify body; unset fields are left to the array
#[derive(Debug, Default, Serialize)]
struct ContainerBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    quota: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    storage_protocol: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    high_water_mark: Option<i64>,
}

impl ContainerBody {
    fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.quota.is_none()
            && self.storage_protocol.is_none()
            && self.high_water_mark.is_none()
    }
}

pub struct StorageContainerResource {
    client: PowerStoreClient,
}

impl StorageContainerResource {
    pub fn new(client: PowerStoreClient) -> Self {
        Self { client }
    }

    async fn fetch(&self, id: &str) -> Result<StorageContainerState> {
        let container: StorageContainer = self.client.get(id).await?;
        Ok(container.into())
    }
}

#[async_trait]
impl Resource for StorageContainerResource {
    type State = StorageContainerState;

    fn type_name(&self) -> &'static str {
        "storagecontainer"
    }

    fn schema(&self) -> Schema {
        Schema::new(
            "This resource is used to manage the storage container entity of PowerStore Array. \
             We can Create, Update and Delete the storage container using this resource. \
             We can also import an existing storage container from PowerStore array.",
        )
        .attribute(Attribute::id("The ID of the storage container."))
        .attribute(
            Attribute::string("name")
                .required()
                .validate(Validator::LengthAtLeast(1))
                .describe(
                    "Name for the storage container. This should be unique across all \
                     storage containers in the cluster.",
                ),
        )
        .attribute(
            Attribute::int("quota")
                .optional_computed()
                .describe(
                    "The total number of bytes that can be provisioned/reserved against this \
                     storage container. A value of 0 means there is no limit.",
                ),
        )
        .attribute(
            Attribute::string("storage_protocol")
                .optional_computed()
                .validate(Validator::OneOf(PROTOCOLS))
                .describe("The storage protocol of the storage container."),
        )
        .attribute(
            Attribute::int("high_water_mark")
                .optional_computed()
                .describe("The percentage of the quota that can be consumed before an alert is raised."),
        )
    }

    async fn create(&self, plan: StorageContainerState) -> Result<StorageContainerState> {
        let body = ContainerBody {
            name: plan.name.clone(),
            quota: plan.quota,
            storage_protocol: plan.storage_protocol.clone(),
            high_water_mark: plan.high_water_mark,
        };
        let id = self
            .client
            .create(Collection::StorageContainer, &body)
            .await
            .map_err(|e| MESSAGES.create(&e))?;
        info!("Created storage container {}", id);

        self.fetch(&id).await.map_err(|e| MESSAGES.created_refresh(&e))
    }

    async fn read(&self, state: StorageContainerState) -> Result<StorageContainerState> {
        let id = id_of(&state.id);
        self.fetch(id).await.map_err(|e| MESSAGES.read(id, e))
    }

    async fn update(
        &self,
        plan: StorageContainerState,
        state: StorageContainerState,
    ) -> Result<StorageContainerState> {
        let id = id_of(&state.id);
        let mut body = ContainerBody::default();
        if changed(&plan.name, &state.name) {
            body.name = plan.name.clone();
        }
        if changed(&plan.quota, &state.quota) {
            body.quota = plan.quota;
        }
        if changed(&plan.storage_protocol, &state.storage_protocol) {
            body.storage_protocol = plan.storage_protocol.clone();
        }
        if changed(&plan.high_water_mark, &state.high_water_mark) {
            body.high_water_mark = plan.high_water_mark;
        }

        if body.is_empty() {
            debug!("Storage container {} is up to date", id);
        } else {
            self.client
                .modify(Collection::StorageContainer, id, &body)
                .await
                .map_err(|e| MESSAGES.update(id, &e))?;
        }

        self.fetch(id).await.map_err(|e| MESSAGES.updated_refresh(&e))
    }

    async fn delete(&self, state: StorageContainerState) -> Result<()> {
        let id = id_of(&state.id);
        self.client
            .delete(Collection::StorageContainer, id)
            .await
            .map_err(|e| MESSAGES.delete(id, &e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::InMemoryArray;
    use crate::error::Error;
    use crate::framework::{JsonResource, ResourceHandler};
    use assert_matches::assert_matches;
    use serde_json::json;
    use std::sync::Arc;

    fn setup() -> (Arc<InMemoryArray>, JsonResource<StorageContainerResource>) {
        let array = Arc::new(InMemoryArray::with_fixtures());
        let client = PowerStoreClient::new(array.clone());
        (array, JsonResource(StorageContainerResource::new(client)))
    }

    #[tokio::test]
    async fn test_create_fills_computed_values() {
        let (_, handler) = setup();
        let state = handler.create(&json!({"name": "sc1"})).await.unwrap();
        assert_eq!(state["name"], "sc1");
        assert_eq!(state["quota"], 0);
        assert_eq!(state["storage_protocol"], "SCSI");
        assert_eq!(state["high_water_mark"], 0);
        assert!(state["id"].is_string());
    }

    #[tokio::test]
    async fn test_unknown_protocol_rejected() {
        let (array, handler) = setup();
        let err = handler
            .create(&json!({"name": "sc1", "storage_protocol": "iSCSI"}))
            .await
            .unwrap_err();
        assert_matches!(err, Error::Validation { .. });
        assert_eq!(array.count(Collection::StorageContainer), 0);
    }

    #[tokio::test]
    async fn test_duplicate_name() {
        let (_, handler) = setup();
        handler.create(&json!({"name": "sc1"})).await.unwrap();
        let err = handler.create(&json!({"name": "sc1"})).await.unwrap_err();
        assert_eq!(err.summary(), "Error creating storage container");
    }

    #[tokio::test]
    async fn test_update_sends_only_changed_fields() {
        let (array, handler) = setup();
        let state = handler
            .create(&json!({"name": "sc1", "quota": 10737418240_i64, "high_water_mark": 80}))
            .await
            .unwrap();
        let id = state["id"].as_str().unwrap().to_string();

        array.clear_calls();
        let updated = handler
            .update(
                &json!({"name": "sc1", "quota": 21474836480_i64, "high_water_mark": 80}),
                &state,
            )
            .await
            .unwrap();
        assert_eq!(updated["quota"], 21474836480_i64);
        assert_eq!(updated["high_water_mark"], 80);
        assert_eq!(
            array.mutating_calls(),
            vec![format!("PATCH {}/{}", Collection::StorageContainer, id)]
        );

        array.clear_calls();
        handler
            .update(&json!({"name": "sc1"}), &updated)
            .await
            .unwrap();
        assert!(array.mutating_calls().is_empty());
    }

    #[tokio::test]
    async fn test_rejected_update_reports_container() {
        let (_, handler) = setup();
        let state = handler.create(&json!({"name": "sc1"})).await.unwrap();
        let err = handler
            .update(&json!({"name": "sc1", "high_water_mark": 150}), &state)
            .await
            .unwrap_err();
        assert_eq!(err.summary(), "Error updating storage container");
    }

    #[tokio::test]
    async fn test_import_and_delete() {
        let (array, handler) = setup();
        let state = handler
            .create(&json!({"name": "sc1", "storage_protocol": "NVMe"}))
            .await
            .unwrap();
        let id = state["id"].as_str().unwrap();

        let imported = handler.import(id).await.unwrap();
        assert_eq!(imported, state);

        handler.delete(&state).await.unwrap();
        assert_eq!(array.count(Collection::StorageContainer), 0);
        assert_matches!(handler.read(&state).await, Err(Error::NotFound { .. }));
    }
}
