//! `powerstore_replication_rule`

use super::{changed, id_of, Messages};
use crate::client::{PowerStoreClient, ReplicationRule};
use crate::domain::ports::Collection;
use crate::error::{Error, Result};
use crate::framework::{Attribute, Resource, Schema, Validator};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;

const MESSAGES: Messages = Messages("replication rule");

pub(crate) const RPO_VALUES: &[&str] = &[
    "Five_Minutes",
    "Fifteen_Minutes",
    "Thirty_Minutes",
    "One_Hour",
    "Six_Hours",
    "Twelve_Hours",
    "One_Day",
    "Zero",
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationRuleState {
    pub id: Option<String>,
    pub name: Option<String>,
    pub rpo: Option<String>,
    pub remote_system_id: Option<String>,
    pub alert_threshold: Option<i64>,
    pub is_read_only: Option<bool>,
}

impl From<ReplicationRule> for ReplicationRuleState {
    fn from(rule: ReplicationRule) -> Self {
        Self {
            id: Some(rule.id),
            name: Some(rule.name),
            rpo: Some(rule.rpo),
            remote_system_id: Some(rule.remote_system_id),
            alert_threshold: Some(rule.alert_threshold),
            is_read_only: Some(rule.is_read_only),
        }
    }
}

#[derive(Debug, Serialize)]
struct RuleCreate {
    name: String,
    rpo: String,
    remote_system_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    alert_threshold: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    is_read_only: Option<bool>,
}

#[derive(Debug, Serialize)]
struct RuleModify {
    name: String,
    rpo: String,
    remote_system_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    alert_threshold: Option<i64>,
}

pub struct ReplicationRuleResource {
    client: PowerStoreClient,
}

impl ReplicationRuleResource {
    pub fn new(client: PowerStoreClient) -> Self {
        Self { client }
    }

    async fn fetch(&self, id: &str) -> Result<ReplicationRuleState> {
        let rule: ReplicationRule = self.client.get(id).await?;
        Ok(rule.into())
    }
}

#[async_trait]
impl Resource for ReplicationRuleResource {
    type State = ReplicationRuleState;

    fn type_name(&self) -> &'static str {
        "replication_rule"
    }

    fn schema(&self) -> Schema {
        Schema::new(
            "This resource is used to manage the replication rule entity of PowerStore Array. \
             We can Create, Update and Delete the replication rule using this resource. \
             We can also import an existing replication rule from PowerStore array.",
        )
        .attribute(Attribute::id("The ID of the replication rule."))
        .attribute(
            Attribute::string("name")
                .required()
                .validate(Validator::LengthAtLeast(1))
                .describe("The name of the replication rule."),
        )
        .attribute(
            Attribute::string("rpo")
                .required()
                .validate(Validator::OneOf(RPO_VALUES))
                .describe("Recovery Point Objective (RPO) of the replication rule."),
        )
        .attribute(
            Attribute::string("remote_system_id")
                .required()
                .validate(Validator::LengthAtLeast(36))
                .describe("Unique identifier of the remote system associated with the replication rule."),
        )
        .attribute(
            Attribute::int("alert_threshold")
                .optional_computed()
                .describe("Alert threshold for the replication rule."),
        )
        .attribute(
            Attribute::bool("is_read_only")
                .optional_computed()
                .keep_state()
                .describe("Indicates whether the replication rule is read-only."),
        )
    }

    async fn create(&self, plan: ReplicationRuleState) -> Result<ReplicationRuleState> {
        let body = RuleCreate {
            name: plan.name.clone().unwrap_or_default(),
            rpo: plan.rpo.clone().unwrap_or_default(),
            remote_system_id: plan.remote_system_id.clone().unwrap_or_default(),
            alert_threshold: plan.alert_threshold,
            is_read_only: plan.is_read_only,
        };
        let id = self
            .client
            .create(Collection::ReplicationRule, &body)
            .await
            .map_err(|e| MESSAGES.create(&e))?;
        info!("Created replication rule {} towards {}", id, body.remote_system_id);

        self.fetch(&id).await.map_err(|e| MESSAGES.created_refresh(&e))
    }

    async fn read(&self, state: ReplicationRuleState) -> Result<ReplicationRuleState> {
        let id = id_of(&state.id);
        self.fetch(id).await.map_err(|e| MESSAGES.read(id, e))
    }

    async fn update(
        &self,
        plan: ReplicationRuleState,
        state: ReplicationRuleState,
    ) -> Result<ReplicationRuleState> {
        if changed(&plan.is_read_only, &state.is_read_only) {
            return Err(Error::validation(
                "The attribute is_read_only cannot be modified.",
                "The attribute is_read_only cannot be modified.",
            ));
        }

        let id = id_of(&state.id);
        let body = RuleModify {
            name: plan.name.clone().unwrap_or_default(),
            rpo: plan.rpo.clone().unwrap_or_default(),
            remote_system_id: plan.remote_system_id.clone().unwrap_or_default(),
            alert_threshold: plan.alert_threshold,
        };
        self.client
            .modify(Collection::ReplicationRule, id, &body)
            .await
            .map_err(|e| {
                Error::operation(
                    "Error updating replication rule",
                    &format!("Could not update replication rule with id {}: ", id),
                    &e,
                )
            })?;

        self.fetch(id).await.map_err(|e| MESSAGES.updated_refresh(&e))
    }

    async fn delete(&self, state: ReplicationRuleState) -> Result<()> {
        let id = id_of(&state.id);
        self.client
            .delete(Collection::ReplicationRule, id)
            .await
            .map_err(|e| {
                Error::operation(
                    "Error deleting replication rule",
                    &format!("Could not delete replication rule with ID {}: ", id),
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

    fn setup() -> (Arc<InMemoryArray>, JsonResource<ReplicationRuleResource>) {
        let array = Arc::new(InMemoryArray::with_fixtures());
        let client = PowerStoreClient::new(array.clone());
        (array, JsonResource(ReplicationRuleResource::new(client)))
    }

    #[tokio::test]
    async fn test_create_defaults_threshold() {
        let (_, handler) = setup();
        let state = handler
            .create(&json!({"name": "rr", "rpo": "One_Hour", "remote_system_id": REMOTE}))
            .await
            .unwrap();
        assert_eq!(state["alert_threshold"], 15);
        assert_eq!(state["is_read_only"], false);
    }

    #[tokio::test]
    async fn test_short_remote_id_rejected() {
        let (array, handler) = setup();
        let err = handler
            .create(&json!({"name": "rr", "rpo": "One_Hour", "remote_system_id": "short"}))
            .await
            .unwrap_err();
        assert_matches!(err, Error::Validation { .. });
        assert_eq!(array.count(Collection::ReplicationRule), 0);
    }

    #[tokio::test]
    async fn test_update_rpo_but_not_read_only() {
        let (_, handler) = setup();
        let config = json!({"name": "rr", "rpo": "One_Hour", "remote_system_id": REMOTE});
        let state = handler.create(&config).await.unwrap();

        let updated = handler
            .update(
                &json!({"name": "rr", "rpo": "Six_Hours", "remote_system_id": REMOTE, "alert_threshold": 30}),
                &state,
            )
            .await
            .unwrap();
        assert_eq!(updated["rpo"], "Six_Hours");
        assert_eq!(updated["alert_threshold"], 30);

        let err = handler
            .update(
                &json!({"name": "rr", "rpo": "Six_Hours", "remote_system_id": REMOTE, "is_read_only": true}),
                &updated,
            )
            .await
            .unwrap_err();
        assert_eq!(err.summary(), "The attribute is_read_only cannot be modified.");
    }

    #[tokio::test]
    async fn test_rule_in_policy_cannot_be_deleted() {
        let (array, handler) = setup();
        let state = handler
            .create(&json!({"name": "rr", "rpo": "One_Hour", "remote_system_id": REMOTE}))
            .await
            .unwrap();
        array.seed(
            Collection::Policy,
            json!({"name": "pp", "type": "Protection", "snapshot_rule_ids": [],
                   "replication_rule_ids": [state["id"]]}),
        );

        let err = handler.delete(&state).await.unwrap_err();
        assert_eq!(err.summary(), "Error deleting replication rule");
        assert_eq!(array.count(Collection::ReplicationRule), 1);
    }
}
