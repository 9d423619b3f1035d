//! `powerstore_volumegroup_snapshot`

use super::filesystem_snapshot::UTC_TIMESTAMP;
use super::{expiration_to_state, id_of, non_empty, Messages};
use crate::client::{Entity, PowerStoreClient, VolumeGroup};
use crate::domain::ports::Collection;
use crate::error::{Error, Result};
use crate::framework::{Attribute, ConfigRule, Resource, Schema, Validator};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

const MESSAGES: Messages = Messages("volume group snapshot");

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeGroupSnapshotState {
    pub id: Option<String>,
    pub name: Option<String>,
    pub volume_group_id: Option<String>,
    pub volume_group_name: Option<String>,
    pub description: Option<String>,
    pub expiration_timestamp: Option<String>,
}

impl VolumeGroupSnapshotState {
    fn from_response(snap: VolumeGroup, volume_group_name: Option<String>) -> Self {
        Self {
            id: Some(snap.id),
            name: Some(snap.name),
            volume_group_id: snap.protection_data.parent_id,
            volume_group_name,
            description: Some(snap.description),
            expiration_timestamp: expiration_to_state(snap.protection_data.expiration_timestamp),
        }
    }
}

#[derive(Debug, Serialize)]
struct SnapshotCreate {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expiration_timestamp: Option<String>,
}

/// An empty expiration clears it on the array
#[derive(Debug, Serialize)]
struct SnapshotModify {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    expiration_timestamp: String,
}

pub struct VolumeGroupSnapshotResource {
    client: PowerStoreClient,
}

impl VolumeGroupSnapshotResource {
    pub fn new(client: PowerStoreClient) -> Self {
        Self { client }
    }

    async fn fetch(&self, id: &str, volume_group_name: Option<String>) -> Result<VolumeGroupSnapshotState> {
        let snap: VolumeGroup = self.client.get(id).await?;
        Ok(VolumeGroupSnapshotState::from_response(snap, volume_group_name))
    }

    /// The group the plan points at, resolving the name when no id is given
    async fn planned_group_id(&self, plan: &VolumeGroupSnapshotState) -> Result<String> {
        self.client
            .resolve_id::<VolumeGroup>(
                plan.volume_group_id.as_deref(),
                plan.volume_group_name.as_deref(),
            )
            .await?
            .ok_or_else(|| Error::NotFound {
                kind: VolumeGroup::KIND.to_string(),
                id: String::new(),
            })
    }
}

#[async_trait]
impl Resource for VolumeGroupSnapshotResource {
    type State = VolumeGroupSnapshotState;

    fn type_name(&self) -> &'static str {
        "volumegroup_snapshot"
    }

    fn schema(&self) -> Schema {
        Schema::new(
            "This resource is used to manage the volumegroup snapshot entity of PowerStore Array. \
             We can Create, Update and Delete the volumegroup snapshot using this resource. \
             We can also import an existing volumegroup snapshot from PowerStore array.",
        )
        .attribute(Attribute::id("The unique identifier of the volume group snapshot."))
        .attribute(
            Attribute::string("name")
                .required()
                .validate(Validator::LengthAtLeast(1))
                .describe("Name of the volume group snapshot."),
        )
        .attribute(
            Attribute::string("volume_group_id")
                .optional_computed()
                .validate(Validator::LengthAtLeast(1))
                .describe(
                    "ID of the volume group to take snapshot. Conflicts with `volume_group_name`. \
                     Cannot be updated.",
                ),
        )
        .attribute(
            Attribute::string("volume_group_name")
                .optional()
                .validate(Validator::LengthAtLeast(1))
                .describe(
                    "Name of the volume group to take snapshot. Conflicts with `volume_group_id`. \
                     Cannot be updated.",
                ),
        )
        .attribute(
            Attribute::string("description")
                .optional_computed()
                .describe("Description of the volume group snapshot."),
        )
        .attribute(
            Attribute::string("expiration_timestamp")
                .optional_computed()
                .validate(UTC_TIMESTAMP)
                .describe("Expiration Timestamp of the volume group snapshot. Only UTC (+Z) format is allowed."),
        )
        .rule(ConfigRule::ExactlyOneOf(&["volume_group_id", "volume_group_name"]))
    }

    async fn create(&self, plan: VolumeGroupSnapshotState) -> Result<VolumeGroupSnapshotState> {
        let group_id = self.planned_group_id(&plan).await.map_err(|e| {
            Error::operation(
                "Error creating volume group snapshot",
                "Could not fetch volume group ID from volume group name, unexpected error: ",
                &e,
            )
        })?;

        let body = SnapshotCreate {
            name: plan.name.clone().unwrap_or_default(),
            description: plan.description.clone(),
            expiration_timestamp: non_empty(&plan.expiration_timestamp),
        };
        let id = self
            .client
            .snapshot(Collection::VolumeGroup, &group_id, &body)
            .await
            .map_err(|e| MESSAGES.create(&e))?;
        info!("Created snapshot {} of volume group {}", id, group_id);

        self.fetch(&id, plan.volume_group_name)
            .await
            .map_err(|e| MESSAGES.created_refresh(&e))
    }

    async fn read(&self, state: VolumeGroupSnapshotState) -> Result<VolumeGroupSnapshotState> {
        let id = id_of(&state.id);
        self.fetch(id, state.volume_group_name.clone())
            .await
            .map_err(|e| MESSAGES.read(id, e))
    }

    async fn update(
        &self,
        plan: VolumeGroupSnapshotState,
        state: VolumeGroupSnapshotState,
    ) -> Result<VolumeGroupSnapshotState> {
        let planned_group = self.planned_group_id(&plan).await.map_err(|e| {
            Error::operation(
                "Error updating volume group snapshot",
                "Could not fetch volume group ID from volume group name, unexpected error: ",
                &e,
            )
        })?;
        if Some(&planned_group) != state.volume_group_id.as_ref() {
            return Err(Error::validation(
                "Error updating volume group snapshot resource",
                "Volume group Name or Volume group ID cannot be updated",
            ));
        }

        let id = id_of(&state.id);
        let body = SnapshotModify {
            name: non_empty(&plan.name),
            description: plan.description.clone(),
            expiration_timestamp: plan.expiration_timestamp.clone().unwrap_or_default(),
        };
        self.client
            .modify(Collection::VolumeGroup, id, &body)
            .await
            .map_err(|e| MESSAGES.update(id, &e))?;

        self.fetch(id, plan.volume_group_name)
            .await
            .map_err(|e| MESSAGES.updated_refresh(&e))
    }

    async fn delete(&self, state: VolumeGroupSnapshotState) -> Result<()> {
        let id = id_of(&state.id);
        self.client
            .delete(Collection::VolumeGroup, id)
            .await
            .map_err(|e| MESSAGES.delete(id, &e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::InMemoryArray;
    use crate::framework::{JsonResource, ResourceHandler};
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn setup() -> (Arc<InMemoryArray>, JsonResource<VolumeGroupSnapshotResource>, String) {
        let array = Arc::new(InMemoryArray::with_fixtures());
        let group_id = array.seed(
            Collection::VolumeGroup,
            json!({"name": "vg1", "type": "Primary", "volume_ids": [],
                   "is_write_order_consistent": true}),
        );
        let client = PowerStoreClient::new(array.clone());
        (array, JsonResource(VolumeGroupSnapshotResource::new(client)), group_id)
    }

    #[tokio::test]
    async fn test_create_by_group_name() {
        let (_, handler, group_id) = setup();
        let state = handler
            .create(&json!({
                "name": "vgs1",
                "volume_group_name": "vg1",
                "expiration_timestamp": "2035-01-02T03:04:05Z",
            }))
            .await
            .unwrap();

        assert_eq!(state["volume_group_id"], json!(group_id));
        assert_eq!(state["volume_group_name"], "vg1");
        assert_eq!(state["expiration_timestamp"], "2035-01-02T03:04:05Z");
    }

    #[tokio::test]
    async fn test_name_resolved_before_immutability_check() {
        let (array, handler, group_id) = setup();
        let state = handler
            .create(&json!({"name": "vgs1", "volume_group_id": group_id}))
            .await
            .unwrap();

        // Switching from the id to the name of the same group is not a change.
        let updated = handler
            .update(
                &json!({"name": "vgs1", "volume_group_name": "vg1", "description": "weekly"}),
                &state,
            )
            .await
            .unwrap();
        assert_eq!(updated["description"], "weekly");
        assert_eq!(updated["expiration_timestamp"], Value::Null);

        array.seed(
            Collection::VolumeGroup,
            json!({"name": "vg2", "type": "Primary", "volume_ids": []}),
        );
        let err = handler
            .update(&json!({"name": "vgs1", "volume_group_name": "vg2"}), &updated)
            .await
            .unwrap_err();
        assert_eq!(err.detail(), "Volume group Name or Volume group ID cannot be updated");
    }

    #[tokio::test]
    async fn test_delete() {
        let (array, handler, group_id) = setup();
        let state = handler
            .create(&json!({"name": "vgs1", "volume_group_id": group_id}))
            .await
            .unwrap();
        handler.delete(&state).await.unwrap();

        let err = handler.read(&state).await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(array.count(Collection::VolumeGroup), 1);
    }
}
