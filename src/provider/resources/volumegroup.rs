//! `powerstore_volumegroup`

use super::{diff_ids, id_of, non_empty, non_empty_str, Messages};
use crate::client::{PowerStoreClient, ProtectionPolicy, Volume, VolumeGroup};
use crate::domain::ports::Collection;
use crate::error::{Error, Result};
use crate::framework::{Attribute, Resource, Schema, Validator};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

const MESSAGES: Messages = Messages("volume group");

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeGroupState {
    pub id: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub volume_ids: Option<Vec<String>>,
    pub volume_names: Option<Vec<String>>,
    pub is_write_order_consistent: Option<bool>,
    pub protection_policy_id: Option<String>,
    pub protection_policy_name: Option<String>,
}

impl VolumeGroupState {
    fn from_response(group: VolumeGroup, known: &VolumeGroupState) -> Self {
        Self {
            id: Some(group.id),
            name: Some(group.name),
            description: Some(group.description),
            volume_ids: Some(group.volumes.into_iter().map(|v| v.id).collect()),
            volume_names: known.volume_names.clone(),
            is_write_order_consistent: Some(group.is_write_order_consistent),
            protection_policy_id: group.protection_policy_id.and_then(non_empty_str),
            protection_policy_name: known.protection_policy_name.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct VolumeGroupCreate {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    volume_ids: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    is_write_order_consistent: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    protection_policy_id: Option<String>,
}

/// An empty `protection_policy_id` unassigns the policy
#[derive(Debug, Serialize)]
struct VolumeGroupModify {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    is_write_order_consistent: Option<bool>,
    protection_policy_id: String,
}

pub struct VolumeGroupResource {
    client: PowerStoreClient,
}

impl VolumeGroupResource {
    pub fn new(client: PowerStoreClient) -> Self {
        Self { client }
    }

    async fn fetch(&self, id: &str, known: &VolumeGroupState) -> Result<VolumeGroupState> {
        let group: VolumeGroup = self.client.get(id).await?;
        Ok(VolumeGroupState::from_response(group, known))
    }

    /// Swap `volume_names` and `protection_policy_name` for the ids they name
    async fn resolve_names(&self, plan: &mut VolumeGroupState) -> std::result::Result<(), String> {
        if let Some(names) = plan.volume_names.as_ref().filter(|names| !names.is_empty()) {
            let mut ids = Vec::with_capacity(names.len());
            for name in names {
                let volume: Volume = self
                    .client
                    .get_by_name(name)
                    .await
                    .map_err(|_| format!("Error getting volume with name: {}", name))?;
                ids.push(volume.id);
            }
            plan.volume_ids = Some(ids);
        }
        if let Some(name) = non_empty(&plan.protection_policy_name) {
            let policy: ProtectionPolicy = self
                .client
                .get_by_name(&name)
                .await
                .map_err(|_| format!("Error getting protection policy with name: {}", name))?;
            plan.protection_policy_id = Some(policy.id);
        }
        Ok(())
    }

    async fn members(&self, id: &str, action: &str, volume_ids: &[String]) -> Result<()> {
        if volume_ids.is_empty() {
            return Ok(());
        }
        debug!("{} {:?} on volume group {}", action, volume_ids, id);
        self.client
            .action(Collection::VolumeGroup, id, action, &json!({ "volume_ids": volume_ids }))
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Resource for VolumeGroupResource {
    type State = VolumeGroupState;

    fn type_name(&self) -> &'static str {
        "volumegroup"
    }

    fn schema(&self) -> Schema {
        Schema::new(
            "This resource is used to manage the volumegroup entity of PowerStore Array. \
             We can Create, Update and Delete the volumegroup using this resource. \
             We can also import an existing volumegroup from PowerStore array.",
        )
        .attribute(Attribute::id("Unique identifier of the volume group."))
        .attribute(
            Attribute::string("name")
                .required()
                .validate(Validator::LengthAtLeast(1))
                .describe("Name of the volume group."),
        )
        .attribute(
            Attribute::string("description")
                .optional_computed()
                .describe("Description for the volume group."),
        )
        .attribute(
            Attribute::string_set("volume_ids")
                .optional_computed()
                .validate(Validator::ConflictsWith(&["volume_names"]))
                .describe("A list of identifiers of existing volumes that should be added to the volume group."),
        )
        .attribute(
            Attribute::string_set("volume_names")
                .optional()
                .describe("A list of names of existing volumes that should be added to the volume group."),
        )
        .attribute(
            Attribute::bool("is_write_order_consistent")
                .optional_computed()
                .default_value(json!(true))
                .describe("Determines whether snapshot sets of the group will be write order consistent."),
        )
        .attribute(
            Attribute::string("protection_policy_id")
                .optional_computed()
                .validate(Validator::ConflictsWith(&["protection_policy_name"]))
                .describe(
                    "Unique identifier of the protection policy assigned to the volume group. \
                     Conflicts with `protection_policy_name`.",
                ),
        )
        .attribute(
            Attribute::string("protection_policy_name")
                .optional()
                .describe(
                    "Unique name of the protection policy assigned to the volume group. \
                     Conflicts with `protection_policy_id`.",
                ),
        )
    }

    async fn create(&self, mut plan: VolumeGroupState) -> Result<VolumeGroupState> {
        self.resolve_names(&mut plan).await.map_err(|msg| {
            Error::operation_msg(
                "Error creating volume group",
                format!("Could not create volume group, unexpected error: {}", msg),
            )
        })?;

        let body = VolumeGroupCreate {
            name: plan.name.clone().unwrap_or_default(),
            description: plan.description.clone(),
            volume_ids: plan.volume_ids.clone().unwrap_or_default(),
            is_write_order_consistent: plan.is_write_order_consistent,
            protection_policy_id: non_empty(&plan.protection_policy_id),
        };
        let id = self
            .client
            .create(Collection::VolumeGroup, &body)
            .await
            .map_err(|e| MESSAGES.create(&e))?;
        info!("Created volume group {} with {} volumes", id, body.volume_ids.len());

        self.fetch(&id, &plan)
            .await
            .map_err(|e| MESSAGES.created_refresh(&e))
    }

    async fn read(&self, state: VolumeGroupState) -> Result<VolumeGroupState> {
        let id = id_of(&state.id);
        self.fetch(id, &state).await.map_err(|e| MESSAGES.read(id, e))
    }

    async fn update(&self, mut plan: VolumeGroupState, state: VolumeGroupState) -> Result<VolumeGroupState> {
        self.resolve_names(&mut plan).await.map_err(|msg| {
            Error::operation_msg(
                "Error updating volume group",
                format!("Could not update volume group, unexpected error: {}", msg),
            )
        })?;

        let id = id_of(&state.id);
        let planned = plan.volume_ids.clone().unwrap_or_default();
        let current = state.volume_ids.clone().unwrap_or_default();
        let (add, remove) = diff_ids(&current, &planned);

        // Every step runs, the first failure is reported.
        let body = VolumeGroupModify {
            name: non_empty(&plan.name),
            description: plan.description.clone(),
            is_write_order_consistent: plan.is_write_order_consistent,
            protection_policy_id: plan.protection_policy_id.clone().unwrap_or_default(),
        };
        let steps = [
            self.client.modify(Collection::VolumeGroup, id, &body).await,
            self.members(id, "add_members", &add).await,
            self.members(id, "remove_members", &remove).await,
        ];
        if let Some(err) = steps.into_iter().find_map(Result::err) {
            return Err(Error::operation(
                "Error updating volume group",
                &format!("Could not update volumeGroupID {}: ", id),
                &err,
            ));
        }

        self.fetch(id, &plan)
            .await
            .map_err(|e| MESSAGES.updated_refresh(&e))
    }

    async fn delete(&self, state: VolumeGroupState) -> Result<()> {
        let id = id_of(&state.id);
        let current: VolumeGroup = self
            .client
            .get(id)
            .await
            .map_err(|e| MESSAGES.read(id, e))?;

        if current.protection_policy_id.and_then(non_empty_str).is_some() {
            self.client
                .modify(Collection::VolumeGroup, id, &json!({"protection_policy_id": ""}))
                .await
                .map_err(|e| {
                    Error::operation(
                        "Error deleting volume group",
                        &format!("Could not remove protection policy from volume group {}: ", id),
                        &e,
                    )
                })?;
        }

        let members: Vec<String> = current.volumes.into_iter().map(|v| v.id).collect();
        self.members(id, "remove_members", &members)
            .await
            .map_err(|e| {
                Error::operation(
                    "Error deleting volume group",
                    &format!("Could not remove volume from volume group {}: ", id),
                    &e,
                )
            })?;

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
    use serde_json::Value;
    use std::sync::Arc;

    fn setup() -> (Arc<InMemoryArray>, JsonResource<VolumeGroupResource>, Vec<String>) {
        let array = Arc::new(InMemoryArray::with_fixtures());
        let volumes = ["vol1", "vol2", "vol3"]
            .into_iter()
            .map(|name| {
                array.seed(
                    Collection::Volume,
                    json!({"name": name, "size": 1073741824_i64, "type": "Primary"}),
                )
            })
            .collect();
        let client = PowerStoreClient::new(array.clone());
        (array, JsonResource(VolumeGroupResource::new(client)), volumes)
    }

    fn sorted(value: &Value) -> Vec<String> {
        let mut ids: Vec<String> = serde_json::from_value(value.clone()).unwrap();
        ids.sort();
        ids
    }

    #[tokio::test]
    async fn test_create_by_volume_names() {
        let (_, handler, volumes) = setup();
        let state = handler
            .create(&json!({"name": "vg1", "volume_names": ["vol1", "vol2"]}))
            .await
            .unwrap();

        let mut expected = volumes[..2].to_vec();
        expected.sort();
        assert_eq!(sorted(&state["volume_ids"]), expected);
        assert_eq!(state["is_write_order_consistent"], true);
        assert_eq!(state["protection_policy_id"], Value::Null);
    }

    #[tokio::test]
    async fn test_membership_diff() {
        let (array, handler, volumes) = setup();
        let state = handler
            .create(&json!({"name": "vg1", "volume_ids": [volumes[0], volumes[1]]}))
            .await
            .unwrap();
        let group_id = state["id"].as_str().unwrap().to_string();
        array.clear_calls();

        let updated = handler
            .update(&json!({"name": "vg1", "volume_ids": [volumes[1], volumes[2]]}), &state)
            .await
            .unwrap();
        let mut expected = volumes[1..].to_vec();
        expected.sort();
        assert_eq!(sorted(&updated["volume_ids"]), expected);

        let calls = array.mutating_calls();
        assert!(calls.contains(&format!("POST volume_group/{}/add_members", group_id)));
        assert!(calls.contains(&format!("POST volume_group/{}/remove_members", group_id)));
    }

    #[tokio::test]
    async fn test_unknown_volume_name() {
        let (array, handler, _) = setup();
        let err = handler
            .create(&json!({"name": "vg1", "volume_names": ["missing"]}))
            .await
            .unwrap_err();
        assert_eq!(err.summary(), "Error creating volume group");
        assert!(err.detail().ends_with("Error getting volume with name: missing"));
        assert_eq!(array.count(Collection::VolumeGroup), 0);
    }

    #[tokio::test]
    async fn test_delete_releases_members_and_policy() {
        let (array, handler, volumes) = setup();
        let rule = array.seed(
            Collection::SnapshotRule,
            json!({"name": "sr", "interval": "One_Hour", "desired_retention": 1}),
        );
        array.seed(
            Collection::Policy,
            json!({"name": "pp", "type": "Protection", "snapshot_rule_ids": [rule],
                   "replication_rule_ids": []}),
        );
        let state = handler
            .create(&json!({"name": "vg1", "volume_ids": [volumes[0]], "protection_policy_name": "pp"}))
            .await
            .unwrap();
        assert_eq!(state["protection_policy_name"], "pp");

        handler.delete(&state).await.unwrap();
        assert_eq!(array.count(Collection::VolumeGroup), 0);
        assert_eq!(array.count(Collection::Volume), 3);
    }
}
