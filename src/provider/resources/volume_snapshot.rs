//! `powerstore_volume_snapshot`

use super::filesystem_snapshot::UTC_TIMESTAMP;
use super::{changed, expiration_to_state, id_of, non_empty, Messages};
use crate::client::{PowerStoreClient, Volume};
use crate::domain::ports::Collection;
use crate::error::{Error, Result};
use crate::framework::{Attribute, ConfigRule, Resource, Schema, Validator};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

const MESSAGES: Messages = Messages("volume snapshot");

pub(crate) const PERFORMANCE_POLICIES: &[&str] = &["default_medium", "default_low", "default_high"];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeSnapshotState {
    pub id: Option<String>,
    pub name: Option<String>,
    pub volume_id: Option<String>,
    pub volume_name: Option<String>,
    pub description: Option<String>,
    pub performance_policy_id: Option<String>,
    pub expiration_timestamp: Option<String>,
    pub creator_type: Option<String>,
}

impl VolumeSnapshotState {
    /// `volume_name` and `creator_type` are not reported by the array
    fn from_response(snap: Volume, volume_name: Option<String>, creator_type: Option<String>) -> Self {
        Self {
            id: Some(snap.id),
            name: Some(snap.name),
            volume_id: snap.protection_data.parent_id,
            volume_name,
            description: Some(snap.description),
            performance_policy_id: Some(snap.performance_policy_id),
            expiration_timestamp: expiration_to_state(snap.protection_data.expiration_timestamp),
            creator_type,
        }
    }
}

#[derive(Debug, Serialize)]
struct SnapshotCreate {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    performance_policy_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expiration_timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    creator_type: Option<String>,
}

#[derive(Debug, Default, Serialize)]
struct SnapshotModify {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    performance_policy_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expiration_timestamp: Option<String>,
}

pub struct VolumeSnapshotResource {
    client: PowerStoreClient,
}

impl VolumeSnapshotResource {
    pub fn new(client: PowerStoreClient) -> Self {
        Self { client }
    }

    async fn fetch(
        &self,
        id: &str,
        volume_name: Option<String>,
        creator_type: Option<String>,
    ) -> Result<VolumeSnapshotState> {
        let snap: Volume = self.client.get(id).await?;
        Ok(VolumeSnapshotState::from_response(snap, volume_name, creator_type))
    }
}

#[async_trait]
impl Resource for VolumeSnapshotResource {
    type State = VolumeSnapshotState;

    fn type_name(&self) -> &'static str {
        "volume_snapshot"
    }

    fn schema(&self) -> Schema {
        Schema::new(
            "This resource is used to manage the volume snapshot entity of PowerStore Array. \
             We can Create, Update and Delete the volume snapshot using this resource. \
             We can also import an existing volume snapshot from PowerStore array.",
        )
        .attribute(Attribute::id("The unique identifier of the volume snapshot."))
        .attribute(
            Attribute::string("name")
                .optional_computed()
                .keep_state()
                .validate(Validator::LengthAtLeast(1))
                .describe(
                    "Name of the volume snapshot. The default name of the volume snapshot \
                     is the date and time when the snapshot is taken.",
                ),
        )
        .attribute(
            Attribute::string("volume_id")
                .optional_computed()
                .validate(Validator::LengthAtLeast(1))
                .describe("ID of the volume to take snapshot. Conflicts with `volume_name`. Cannot be updated."),
        )
        .attribute(
            Attribute::string("volume_name")
                .optional()
                .validate(Validator::LengthAtLeast(1))
                .describe("Name of the volume to take snapshot. Conflicts with `volume_id`. Cannot be updated."),
        )
        .attribute(
            Attribute::string("description")
                .optional_computed()
                .describe("Description of the volume snapshot."),
        )
        .attribute(
            Attribute::string("performance_policy_id")
                .optional_computed()
                .validate(Validator::OneOf(PERFORMANCE_POLICIES))
                .describe(
                    "Performance Policy id of the volume snapshot. \
                     Valid values are default_medium, default_low, default_high.",
                ),
        )
        .attribute(
            Attribute::string("expiration_timestamp")
                .optional_computed()
                .validate(UTC_TIMESTAMP)
                .describe("Expiration Timestamp of the volume snapshot. Only UTC (+Z) format is allowed."),
        )
        .attribute(
            Attribute::string("creator_type")
                .optional_computed()
                .default_value(json!("User"))
                .validate(Validator::OneOf(&["User"]))
                .describe("Creator Type of the volume snapshot."),
        )
        .rule(ConfigRule::ExactlyOneOf(&["volume_id", "volume_name"]))
    }

    async fn create(&self, plan: VolumeSnapshotState) -> Result<VolumeSnapshotState> {
        let volume_id = match non_empty(&plan.volume_id) {
            Some(id) => id,
            None => {
                let name = plan.volume_name.clone().unwrap_or_default();
                let volume: Volume = self.client.get_by_name(&name).await.map_err(|e| {
                    Error::operation(
                        "Error creating volume snapshot",
                        "Could not fetch volume ID from volume name, unexpected error: ",
                        &e,
                    )
                })?;
                volume.id
            }
        };

        let name = match non_empty(&plan.name) {
            Some(name) => name,
            None => {
                let time = self.client.system_time().await.map_err(|e| {
                    Error::operation(
                        "Error creating volume snapshot",
                        "Could not fetch name of the cluster, unexpected error: ",
                        &e,
                    )
                })?;
                debug!("Naming snapshot of volume {} after system time {}", volume_id, time);
                time
            }
        };

        let body = SnapshotCreate {
            name,
            description: plan.description.clone(),
            performance_policy_id: non_empty(&plan.performance_policy_id),
            expiration_timestamp: non_empty(&plan.expiration_timestamp),
            creator_type: non_empty(&plan.creator_type),
        };
        let id = self
            .client
            .snapshot(Collection::Volume, &volume_id, &body)
            .await
            .map_err(|e| MESSAGES.create(&e))?;
        info!("Created snapshot {} of volume {}", id, volume_id);

        self.fetch(&id, plan.volume_name, plan.creator_type)
            .await
            .map_err(|e| MESSAGES.created_refresh(&e))
    }

    async fn read(&self, state: VolumeSnapshotState) -> Result<VolumeSnapshotState> {
        let id = id_of(&state.id);
        self.fetch(id, state.volume_name.clone(), state.creator_type.clone())
            .await
            .map_err(|e| MESSAGES.read(id, e))
    }

    async fn update(
        &self,
        plan: VolumeSnapshotState,
        state: VolumeSnapshotState,
    ) -> Result<VolumeSnapshotState> {
        if changed(&non_empty(&plan.volume_id), &state.volume_id)
            || non_empty(&plan.volume_name) != non_empty(&state.volume_name)
        {
            return Err(Error::validation(
                "Error updating volume snapshot resource",
                "Volume Name or Volume ID cannot be updated",
            ));
        }

        let id = id_of(&state.id);
        let body = SnapshotModify {
            name: non_empty(&plan.name),
            description: plan.description.clone(),
            performance_policy_id: non_empty(&plan.performance_policy_id),
            expiration_timestamp: non_empty(&plan.expiration_timestamp),
        };
        self.client
            .modify(Collection::Volume, id, &body)
            .await
            .map_err(|e| MESSAGES.update(id, &e))?;

        self.fetch(id, plan.volume_name, plan.creator_type)
            .await
            .map_err(|e| MESSAGES.updated_refresh(&e))
    }

    async fn delete(&self, state: VolumeSnapshotState) -> Result<()> {
        let id = id_of(&state.id);
        self.client
            .delete(Collection::Volume, id)
            .await
            .map_err(|e| MESSAGES.delete(id, &e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::InMemoryArray;
    use crate::framework::{JsonResource, ResourceHandler};
    use assert_matches::assert_matches;
    use serde_json::Value;
    use std::sync::Arc;

    fn setup() -> (Arc<InMemoryArray>, JsonResource<VolumeSnapshotResource>, String) {
        let array = Arc::new(InMemoryArray::with_fixtures());
        let volume_id = array.seed(
            Collection::Volume,
            json!({"name": "vol1", "size": 1073741824_i64, "type": "Primary",
                   "performance_policy_id": "default_medium",
                   "protection_data": {"parent_id": null}}),
        );
        let client = PowerStoreClient::new(array.clone());
        (array, JsonResource(VolumeSnapshotResource::new(client)), volume_id)
    }

    #[tokio::test]
    async fn test_create_by_volume_name_defaults_name() {
        let (array, handler, volume_id) = setup();
        let state = handler.create(&json!({"volume_name": "vol1"})).await.unwrap();

        assert_eq!(state["volume_id"], json!(volume_id));
        assert_eq!(state["volume_name"], "vol1");
        assert_eq!(state["creator_type"], "User");
        assert_eq!(state["expiration_timestamp"], Value::Null);

        let cluster = array.entity(Collection::Cluster, "0").unwrap();
        assert_eq!(state["name"], cluster["system_time"]);
    }

    #[tokio::test]
    async fn test_exactly_one_volume_reference() {
        let (array, handler, volume_id) = setup();
        let err = handler
            .create(&json!({"name": "s1", "volume_id": volume_id, "volume_name": "vol1"}))
            .await
            .unwrap_err();
        assert_matches!(err, Error::Validation { .. });

        let err = handler.create(&json!({"name": "s1"})).await.unwrap_err();
        assert_matches!(err, Error::Validation { .. });
        assert_eq!(array.mutating_calls().len(), 0);
    }

    #[tokio::test]
    async fn test_update_and_volume_is_immutable() {
        let (array, handler, volume_id) = setup();
        let other = array.seed(
            Collection::Volume,
            json!({"name": "vol2", "size": 1073741824_i64, "type": "Primary"}),
        );
        let state = handler
            .create(&json!({
                "name": "s1",
                "volume_id": volume_id,
                "expiration_timestamp": "2035-01-02T03:04:05Z",
            }))
            .await
            .unwrap();
        assert_eq!(state["expiration_timestamp"], "2035-01-02T03:04:05Z");

        let updated = handler
            .update(
                &json!({"name": "s1", "volume_id": volume_id, "performance_policy_id": "default_high",
                        "description": "nightly"}),
                &state,
            )
            .await
            .unwrap();
        assert_eq!(updated["performance_policy_id"], "default_high");
        assert_eq!(updated["description"], "nightly");

        let err = handler
            .update(&json!({"name": "s1", "volume_id": other}), &updated)
            .await
            .unwrap_err();
        assert_eq!(err.detail(), "Volume Name or Volume ID cannot be updated");
    }

    #[tokio::test]
    async fn test_unknown_volume_name() {
        let (_, handler, _) = setup();
        let err = handler.create(&json!({"volume_name": "missing"})).await.unwrap_err();
        assert_eq!(err.summary(), "Error creating volume snapshot");
        assert!(err.detail().starts_with("Could not fetch volume ID from volume name"));
    }
}
