//! `powerstore_protectionpolicy`
//!
//! A policy groups snapshot rules and replication rules. Rule sets are
//! edited in place on update by sending only the ids to add and remove.

use super::{diff_ids, id_of, Messages};
use crate::client::{Entity, HasId, PowerStoreClient, ProtectionPolicy, ReplicationRule, SnapshotRule};
use crate::domain::ports::Collection;
use crate::error::{Error, Result};
use crate::framework::{Attribute, ConfigRule, Resource, Schema, Validator};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

const MESSAGES: Messages = Messages("protection policy");

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtectionPolicyState {
    pub id: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub snapshot_rule_ids: Option<Vec<String>>,
    pub snapshot_rule_names: Option<Vec<String>>,
    pub replication_rule_ids: Option<Vec<String>>,
    pub replication_rule_names: Option<Vec<String>>,
}

impl ProtectionPolicyState {
    fn from_response(policy: ProtectionPolicy, known: &ProtectionPolicyState) -> Self {
        Self {
            id: Some(policy.id),
            name: Some(policy.name),
            description: Some(policy.description),
            snapshot_rule_ids: Some(policy.snapshot_rules.into_iter().map(|r| r.id).collect()),
            snapshot_rule_names: known.snapshot_rule_names.clone(),
            replication_rule_ids: Some(policy.replication_rules.into_iter().map(|r| r.id).collect()),
            replication_rule_names: known.replication_rule_names.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
struct PolicyCreate {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    snapshot_rule_ids: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    replication_rule_ids: Vec<String>,
}

#[derive(Debug, Default, Serialize)]
struct PolicyModify {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    add_snapshot_rule_ids: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    remove_snapshot_rule_ids: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    add_replication_rule_ids: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    remove_replication_rule_ids: Vec<String>,
}

/// Rule ids of a plan after name resolution
struct PlannedRules {
    snapshot: Vec<String>,
    replication: Vec<String>,
}

pub struct ProtectionPolicyResource {
    client: PowerStoreClient,
}

impl ProtectionPolicyResource {
    pub fn new(client: PowerStoreClient) -> Self {
        Self { client }
    }

    async fn fetch(&self, id: &str, known: &ProtectionPolicyState) -> Result<ProtectionPolicyState> {
        let policy: ProtectionPolicy = self.client.get(id).await?;
        Ok(ProtectionPolicyState::from_response(policy, known))
    }

    async fn ids_of<T: Entity + HasId>(&self, names: &[String]) -> Result<Vec<String>> {
        let mut ids = Vec::with_capacity(names.len());
        for name in names {
            let rule: T = self.client.get_by_name(name).await?;
            ids.push(rule.id().to_string());
        }
        Ok(ids)
    }

    async fn planned_rules(&self, plan: &ProtectionPolicyState) -> Result<PlannedRules> {
        let snapshot = match plan.snapshot_rule_names.as_deref().filter(|n| !n.is_empty()) {
            Some(names) => self.ids_of::<SnapshotRule>(names).await?,
            None => plan.snapshot_rule_ids.clone().unwrap_or_default(),
        };
        let replication = match plan.replication_rule_names.as_deref().filter(|n| !n.is_empty()) {
            Some(names) => self.ids_of::<ReplicationRule>(names).await?,
            None => plan.replication_rule_ids.clone().unwrap_or_default(),
        };
        Ok(PlannedRules { snapshot, replication })
    }
}

fn rule_set(name: &'static str, description: &'static str, conflicts: &'static [&'static str]) -> Attribute {
    Attribute::string_set(name)
        .optional_computed()
        .validate(Validator::SizeAtLeast(1))
        .validate(Validator::ConflictsWith(conflicts))
        .describe(description)
}

#[async_trait]
impl Resource for ProtectionPolicyResource {
    type State = ProtectionPolicyState;

    fn type_name(&self) -> &'static str {
        "protectionpolicy"
    }

    fn schema(&self) -> Schema {
        Schema::new(
            "This resource is used to manage the protection policy entity of PowerStore Array. \
             We can Create, Update and Delete the protection policy using this resource. \
             We can also import an existing protection policy from PowerStore array.",
        )
        .attribute(Attribute::id("Unique identifier of the policy."))
        .attribute(
            Attribute::string("name")
                .required()
                .validate(Validator::LengthAtLeast(1))
                .describe("The name of the protection policy."),
        )
        .attribute(
            Attribute::string("description")
                .optional_computed()
                .validate(Validator::LengthAtLeast(1))
                .describe("The description of the protection policy."),
        )
        .attributes([
            rule_set(
                "snapshot_rule_ids",
                "List of the snapshot rule IDs that are associated with this policy.",
                &["snapshot_rule_names"],
            ),
            rule_set(
                "snapshot_rule_names",
                "List of the snapshot rule names that are associated with this policy.",
                &["snapshot_rule_ids"],
            ),
            rule_set(
                "replication_rule_ids",
                "List of the replication rule IDs that are associated with this policy.",
                &["replication_rule_names"],
            ),
            rule_set(
                "replication_rule_names",
                "List of the replication rule names that are associated with this policy.",
                &["replication_rule_ids"],
            ),
        ])
        .rule(ConfigRule::AtLeastOneOf(&[
            "snapshot_rule_ids",
            "snapshot_rule_names",
            "replication_rule_ids",
            "replication_rule_names",
        ]))
    }

    async fn create(&self, plan: ProtectionPolicyState) -> Result<ProtectionPolicyState> {
        let rules = self.planned_rules(&plan).await.map_err(|e| {
            Error::operation(
                "Error creating protection policy",
                "Could not resolve rule names, unexpected error: ",
                &e,
            )
        })?;

        let body = PolicyCreate {
            name: plan.name.clone().unwrap_or_default(),
            description: plan.description.clone(),
            snapshot_rule_ids: rules.snapshot,
            replication_rule_ids: rules.replication,
        };
        let id = self
            .client
            .create(Collection::Policy, &body)
            .await
            .map_err(|e| MESSAGES.create(&e))?;
        info!(
            "Created protection policy {} with {} snapshot and {} replication rules",
            id,
            body.snapshot_rule_ids.len(),
            body.replication_rule_ids.len()
        );

        self.fetch(&id, &plan)
            .await
            .map_err(|e| MESSAGES.created_refresh(&e))
    }

    async fn read(&self, state: ProtectionPolicyState) -> Result<ProtectionPolicyState> {
        let id = id_of(&state.id);
        self.fetch(id, &state).await.map_err(|e| MESSAGES.read(id, e))
    }

    async fn update(
        &self,
        plan: ProtectionPolicyState,
        state: ProtectionPolicyState,
    ) -> Result<ProtectionPolicyState> {
        let rules = self.planned_rules(&plan).await.map_err(|e| {
            Error::operation(
                "Error updating protection policy",
                "Could not resolve rule names, unexpected error: ",
                &e,
            )
        })?;

        let id = id_of(&state.id);
        let (add_snapshot_rule_ids, remove_snapshot_rule_ids) =
            diff_ids(&state.snapshot_rule_ids.clone().unwrap_or_default(), &rules.snapshot);
        let (add_replication_rule_ids, remove_replication_rule_ids) =
            diff_ids(&state.replication_rule_ids.clone().unwrap_or_default(), &rules.replication);
        let body = PolicyModify {
            name: plan.name.clone(),
            description: plan.description.clone(),
            add_snapshot_rule_ids,
            remove_snapshot_rule_ids,
            add_replication_rule_ids,
            remove_replication_rule_ids,
        };
        self.client
            .modify(Collection::Policy, id, &body)
            .await
            .map_err(|e| {
                Error::operation(
                    "Error updating protection policy",
                    &format!("Could not update protectionPolicyID {}: ", id),
                    &e,
                )
            })?;

        self.fetch(id, &plan)
            .await
            .map_err(|e| MESSAGES.updated_refresh(&e))
    }

    async fn delete(&self, state: ProtectionPolicyState) -> Result<()> {
        let id = id_of(&state.id);
        self.client.delete(Collection::Policy, id).await.map_err(|e| {
            Error::operation(
                "Error deleting protection policy",
                &format!("Could not delete protectionPolicyID {}: ", id),
                &e,
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::InMemoryArray;
    use crate::framework::{JsonResource, ResourceHandler};
    use assert_matches::assert_matches;
    use serde_json::json;
    use std::sync::Arc;

    const REMOTE: &str = "6c4dc7a6-7a0c-4e2c-9c2f-3a3e0f1b2c4d";

    struct Fixture {
        array: Arc<InMemoryArray>,
        handler: JsonResource<ProtectionPolicyResource>,
        hourly: String,
        daily: String,
        replication: String,
    }

    fn setup() -> Fixture {
        let array = Arc::new(InMemoryArray::with_fixtures());
        let hourly = array.seed(
            Collection::SnapshotRule,
            json!({"name": "hourly", "interval": "One_Hour", "desired_retention": 24}),
        );
        let daily = array.seed(
            Collection::SnapshotRule,
            json!({"name": "daily", "interval": "One_Day", "desired_retention": 7}),
        );
        let replication = array.seed(
            Collection::ReplicationRule,
            json!({"name": "rr", "rpo": "One_Hour", "remote_system_id": REMOTE}),
        );
        let client = PowerStoreClient::new(array.clone());
        Fixture {
            array,
            handler: JsonResource(ProtectionPolicyResource::new(client)),
            hourly,
            daily,
            replication,
        }
    }

    #[tokio::test]
    async fn test_create_by_rule_names() {
        let f = setup();
        let state = f
            .handler
            .create(&json!({
                "name": "pp",
                "snapshot_rule_names": ["hourly"],
                "replication_rule_names": ["rr"],
            }))
            .await
            .unwrap();

        assert_eq!(state["snapshot_rule_ids"], json!([f.hourly]));
        assert_eq!(state["replication_rule_ids"], json!([f.replication]));
        assert_eq!(state["snapshot_rule_names"], json!(["hourly"]));
    }

    #[tokio::test]
    async fn test_at_least_one_rule() {
        let f = setup();
        let err = f.handler.create(&json!({"name": "pp"})).await.unwrap_err();
        assert_matches!(err, Error::Validation { .. });

        let err = f
            .handler
            .create(&json!({"name": "pp", "snapshot_rule_ids": [f.hourly], "snapshot_rule_names": ["hourly"]}))
            .await
            .unwrap_err();
        assert_matches!(err, Error::Validation { .. });
        assert_eq!(f.array.count(Collection::Policy), 0);
    }

    #[tokio::test]
    async fn test_update_sends_rule_edits() {
        let f = setup();
        let state = f
            .handler
            .create(&json!({"name": "pp", "snapshot_rule_ids": [f.hourly]}))
            .await
            .unwrap();
        let id = state["id"].as_str().unwrap().to_string();

        let updated = f
            .handler
            .update(&json!({"name": "pp", "snapshot_rule_ids": [f.daily]}), &state)
            .await
            .unwrap();
        assert_eq!(updated["snapshot_rule_ids"], json!([f.daily]));

        let stored = f.array.entity(Collection::Policy, &id).unwrap();
        assert_eq!(stored["snapshot_rule_ids"], json!([f.daily]));
    }

    #[tokio::test]
    async fn test_policy_in_use_cannot_be_deleted() {
        let f = setup();
        let state = f
            .handler
            .create(&json!({"name": "pp", "snapshot_rule_ids": [f.hourly]}))
            .await
            .unwrap();
        f.array.seed(
            Collection::Volume,
            json!({"name": "vol1", "size": 1073741824_i64, "protection_policy_id": state["id"]}),
        );

        let err = f.handler.delete(&state).await.unwrap_err();
        assert_eq!(err.summary(), "Error deleting protection policy");
        assert_eq!(f.array.count(Collection::Policy), 1);
    }
}
