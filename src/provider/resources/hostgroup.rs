//! `powerstore_hostgroup`

use super::host::HOST_CONNECTIVITY;
use super::{diff_ids, id_of, non_empty, Messages};
use crate::client::{Host, HostGroup, PowerStoreClient};
use crate::domain::ports::Collection;
use crate::error::{Error, Result};
use crate::framework::{Attribute, Resource, Schema, Validator};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const MESSAGES: Messages = Messages("host group");

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostGroupState {
    pub id: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub host_ids: Option<Vec<String>>,
    pub host_names: Option<Vec<String>>,
    pub host_connectivity: Option<String>,
}

impl HostGroupState {
    fn from_response(group: HostGroup, host_names: Option<Vec<String>>) -> Self {
        Self {
            id: Some(group.id),
            name: Some(group.name),
            description: Some(group.description),
            host_ids: Some(group.hosts.into_iter().map(|h| h.id).collect()),
            host_names,
            host_connectivity: Some(group.host_connectivity),
        }
    }
}

#[derive(Debug, Serialize)]
struct HostGroupCreate {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    host_ids: Vec<String>,
}

#[derive(Debug, Default, Serialize)]
struct HostGroupModify {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    host_connectivity: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    add_host_ids: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    remove_host_ids: Vec<String>,
}

pub struct HostGroupResource {
    client: PowerStoreClient,
}

impl HostGroupResource {
    pub fn new(client: PowerStoreClient) -> Self {
        Self { client }
    }

    async fn fetch(&self, id: &str, host_names: Option<Vec<String>>) -> Result<HostGroupState> {
        let group: HostGroup = self.client.get(id).await?;
        Ok(HostGroupState::from_response(group, host_names))
    }

    /// Host ids of the plan, resolving `host_names` when given
    async fn planned_host_ids(&self, plan: &HostGroupState) -> std::result::Result<Vec<String>, String> {
        match plan.host_names.as_ref().filter(|names| !names.is_empty()) {
            Some(names) => {
                let mut ids = Vec::with_capacity(names.len());
                for name in names {
                    let host: Host = self
                        .client
                        .get_by_name(name)
                        .await
                        .map_err(|_| format!("Error getting host with name: {}", name))?;
                    ids.push(host.id);
                }
                Ok(ids)
            }
            None => Ok(plan.host_ids.clone().unwrap_or_default()),
        }
    }
}

#[async_trait]
impl Resource for HostGroupResource {
    type State = HostGroupState;

    fn type_name(&self) -> &'static str {
        "hostgroup"
    }

    fn schema(&self) -> Schema {
        Schema::new(
            "This resource is used to manage the host group entity of PowerStore Array. \
             We can Create, Update and Delete the host group using this resource. \
             We can also import an existing host group from PowerStore array.",
        )
        .attribute(Attribute::id("Unique identifier of the host group."))
        .attribute(
            Attribute::string("name")
                .required()
                .validate(Validator::LengthAtLeast(1))
                .describe("The host group name."),
        )
        .attribute(
            Attribute::string("description")
                .optional_computed()
                .validate(Validator::LengthAtLeast(1))
                .describe("An optional description for the host group."),
        )
        .attribute(
            Attribute::string_set("host_ids")
                .optional_computed()
                .validate(Validator::ConflictsWith(&["host_names"]))
                .describe("The list of host IDs to include in the host group. Conflicts with `host_names`."),
        )
        .attribute(
            Attribute::string_set("host_names")
                .optional_computed()
                .describe("The list of host names to include in the host group. Conflicts with `host_ids`."),
        )
        .attribute(
            Attribute::string("host_connectivity")
                .optional_computed()
                .validate(Validator::OneOf(HOST_CONNECTIVITY))
                .describe("Connectivity type for hosts and host groups."),
        )
    }

    async fn create(&self, plan: HostGroupState) -> Result<HostGroupState> {
        let host_ids = self
            .planned_host_ids(&plan)
            .await
            .map_err(|msg| {
                Error::operation_msg(
                    "Error creating host group",
                    format!("Could not create host group, unexpected error: {}", msg),
                )
            })?;
        if non_empty(&plan.host_connectivity).is_some() {
            return Err(Error::validation(
                "Error creating host group",
                "Could not set host_connectivity while creating host group",
            ));
        }

        let body = HostGroupCreate {
            name: plan.name.clone().unwrap_or_default(),
            description: plan.description.clone(),
            host_ids,
        };
        let id = self
            .client
            .create(Collection::HostGroup, &body)
            .await
            .map_err(|e| MESSAGES.create(&e))?;

        self.fetch(&id, plan.host_names)
            .await
            .map_err(|e| MESSAGES.created_refresh(&e))
    }

    async fn read(&self, state: HostGroupState) -> Result<HostGroupState> {
        let id = id_of(&state.id);
        self.fetch(id, state.host_names.clone())
            .await
            .map_err(|e| MESSAGES.read(id, e))
    }

    async fn update(&self, plan: HostGroupState, state: HostGroupState) -> Result<HostGroupState> {
        let id = id_of(&state.id);
        let planned = self.planned_host_ids(&plan).await.map_err(|msg| {
            Error::operation_msg(
                "Error updating host group",
                format!("Could not update host group, unexpected error: {}", msg),
            )
        })?;
        let current = state.host_ids.clone().unwrap_or_default();
        let (add_host_ids, remove_host_ids) = diff_ids(&current, &planned);

        if plan.host_connectivity.as_deref() == Some("Local_Only")
            && planned.is_empty()
            && !remove_host_ids.is_empty()
        {
            return Err(Error::validation(
                "Error updating host group",
                format!(
                    "Could not update hostGroupID {}: Cannot remove all the hosts when host_connectivity is set",
                    id
                ),
            ));
        }

        let body = HostGroupModify {
            name: non_empty(&plan.name),
            description: non_empty(&plan.description),
            host_connectivity: non_empty(&plan.host_connectivity),
            add_host_ids,
            remove_host_ids,
        };
        self.client
            .modify(Collection::HostGroup, id, &body)
            .await
            .map_err(|e| MESSAGES.update(id, &e))?;

        self.fetch(id, plan.host_names)
            .await
            .map_err(|e| MESSAGES.updated_refresh(&e))
    }

    async fn delete(&self, state: HostGroupState) -> Result<()> {
        let id = id_of(&state.id);
        let members = state.host_ids.clone().unwrap_or_default();
        if !members.is_empty() {
            let body = HostGroupModify {
                remove_host_ids: members,
                ..Default::default()
            };
            self.client
                .modify(Collection::HostGroup, id, &body)
                .await
                .map_err(|e| MESSAGES.delete(id, &e))?;
        }
        self.client
            .delete(Collection::HostGroup, id)
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
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn setup() -> (Arc<InMemoryArray>, JsonResource<HostGroupResource>, String, String) {
        let array = Arc::new(InMemoryArray::with_fixtures());
        let h1 = array.seed(Collection::Host, json!({"name": "host-a", "os_type": "Linux"}));
        let h2 = array.seed(Collection::Host, json!({"name": "host-b", "os_type": "Linux"}));
        let client = PowerStoreClient::new(array.clone());
        (array, JsonResource(HostGroupResource::new(client)), h1, h2)
    }

    fn sorted(value: &Value) -> Vec<String> {
        let mut ids: Vec<String> = value
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_str().unwrap().to_string())
            .collect();
        ids.sort();
        ids
    }

    #[tokio::test]
    async fn test_create_by_host_names() {
        let (_, handler, h1, h2) = setup();
        let state = handler
            .create(&json!({"name": "hg1", "host_names": ["host-a", "host-b"]}))
            .await
            .unwrap();

        let mut expected = vec![h1, h2];
        expected.sort();
        assert_eq!(sorted(&state["host_ids"]), expected);
        assert_eq!(state["host_names"], json!(["host-a", "host-b"]));
    }

    #[tokio::test]
    async fn test_create_rejects_connectivity_and_conflicts() {
        let (array, handler, h1, _) = setup();
        let err = handler
            .create(&json!({"name": "hg1", "host_ids": [h1], "host_connectivity": "Metro_Optimize_Both"}))
            .await
            .unwrap_err();
        assert_eq!(err.detail(), "Could not set host_connectivity while creating host group");

        let err = handler
            .create(&json!({"name": "hg1", "host_ids": [h1], "host_names": ["host-a"]}))
            .await
            .unwrap_err();
        assert_matches!(err, Error::Validation { .. });

        let err = handler
            .create(&json!({"name": "hg1", "host_names": ["nobody"]}))
            .await
            .unwrap_err();
        assert!(err.detail().contains("Error getting host with name: nobody"));
        assert_eq!(array.count(Collection::HostGroup), 0);
    }

    #[tokio::test]
    async fn test_update_membership_and_delete() {
        let (array, handler, h1, h2) = setup();
        let state = handler
            .create(&json!({"name": "hg1", "host_ids": [h1.clone()]}))
            .await
            .unwrap();

        let updated = handler
            .update(&json!({"name": "hg1", "host_ids": [h2.clone()]}), &state)
            .await
            .unwrap();
        assert_eq!(sorted(&updated["host_ids"]), vec![h2.clone()]);
        assert_eq!(array.entity(Collection::Host, &h1).unwrap()["host_group_id"], Value::Null);

        let err = handler
            .update(&json!({"name": "hg1", "host_connectivity": "Local_Only"}), &updated)
            .await
            .unwrap_err();
        assert!(err.detail().ends_with("Cannot remove all the hosts when host_connectivity is set"));

        handler.delete(&updated).await.unwrap();
        assert_eq!(array.count(Collection::HostGroup), 0);
        assert_eq!(array.entity(Collection::Host, &h2).unwrap()["host_group_id"], Value::Null);
    }

    #[tokio::test]
    async fn test_delete_reports_member_removal_failure() {
        let (array, handler, h1, _) = setup();
        let state = handler
            .create(&json!({"name": "hg1", "host_ids": [h1]}))
            .await
            .unwrap();
        let id = state["id"].as_str().unwrap().to_string();

        array.fail_on(format!("PATCH {}/{}", Collection::HostGroup, id));
        let err = handler.delete(&state).await.unwrap_err();
        assert_eq!(err.summary(), "Error deleting host group");
        assert!(err.detail().starts_with(&format!("Could not delete host group {}: ", id)));
        assert_eq!(array.count(Collection::HostGroup), 1);
    }
}
