//! `powerstore_smb_share`
//!
//! The share's ACL lives behind the `get_acl`/`set_acl` actions and is kept
//! in state as the `aces` set.

use super::{changed, id_of, non_empty, Messages};
use crate::client::{Ace, AclResponse, PowerStoreClient, SmbShare};
use crate::domain::ports::Collection;
use crate::error::{Error, Result};
use crate::framework::{Attribute, Resource, Schema, Validator};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, warn};

const MESSAGES: Messages = Messages("smb share");

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmbShareState {
    pub id: Option<String>,
    pub file_system_id: Option<String>,
    pub name: Option<String>,
    pub path: Option<String>,
    pub description: Option<String>,
    pub is_continuous_availability_enabled: Option<bool>,
    pub is_encryption_enabled: Option<bool>,
    pub is_abe_enabled: Option<bool>,
    pub is_branch_cache_enabled: Option<bool>,
    pub offline_availability: Option<String>,
    pub umask: Option<String>,
    pub aces: Option<Vec<Ace>>,
}

impl SmbShareState {
    fn from_response(share: SmbShare, aces: Vec<Ace>) -> Self {
        Self {
            id: Some(share.id),
            file_system_id: Some(share.file_system_id),
            name: Some(share.name),
            path: Some(share.path),
            description: Some(share.description),
            is_continuous_availability_enabled: Some(share.is_continuous_availability_enabled),
            is_encryption_enabled: Some(share.is_encryption_enabled),
            is_abe_enabled: Some(share.is_abe_enabled),
            is_branch_cache_enabled: Some(share.is_branch_cache_enabled),
            offline_availability: Some(share.offline_availability),
            umask: Some(share.umask),
            aces: Some(aces),
        }
    }
}

#[derive(Debug, Default, Serialize)]
struct ShareSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    is_continuous_availability_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    is_encryption_enabled: Option<bool>,
    #[serde(rename = "is_ABE_enabled", skip_serializing_if = "Option::is_none")]
    is_abe_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    is_branch_cache_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    offline_availability: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    umask: Option<String>,
}

impl From<&SmbShareState> for ShareSettings {
    fn from(plan: &SmbShareState) -> Self {
        Self {
            description: non_empty(&plan.description),
            is_continuous_availability_enabled: plan.is_continuous_availability_enabled,
            is_encryption_enabled: plan.is_encryption_enabled,
            is_abe_enabled: plan.is_abe_enabled,
            is_branch_cache_enabled: plan.is_branch_cache_enabled,
            offline_availability: non_empty(&plan.offline_availability),
            umask: non_empty(&plan.umask),
        }
    }
}

#[derive(Debug, Serialize)]
struct ShareCreate {
    file_system_id: String,
    name: String,
    path: String,
    #[serde(flatten)]
    settings: ShareSettings,
}

#[derive(Debug, Serialize)]
struct AclUpdate<'a> {
    aces: &'a [Ace],
}

fn same_aces(left: &[Ace], right: &[Ace]) -> bool {
    let mut left = left.to_vec();
    let mut right = right.to_vec();
    left.sort();
    left.dedup();
    right.sort();
    right.dedup();
    left == right
}

pub struct SmbShareResource {
    client: PowerStoreClient,
}

impl SmbShareResource {
    pub fn new(client: PowerStoreClient) -> Self {
        Self { client }
    }

    async fn get_acl(&self, id: &str) -> Result<Vec<Ace>> {
        let value = self
            .client
            .action(Collection::SmbShare, id, "get_acl", &json!({}))
            .await?;
        let acl: AclResponse = serde_json::from_value(value)?;
        Ok(acl.aces)
    }

    async fn fetch(&self, id: &str) -> Result<SmbShareState> {
        let share: SmbShare = self.client.get(id).await?;
        let aces = self.get_acl(id).await?;
        Ok(SmbShareState::from_response(share, aces))
    }

    /// Replace the ACL when it differs from `desired`
    async fn reconcile_acl(&self, id: &str, desired: &[Ace]) -> Result<()> {
        let current = self.get_acl(id).await?;
        if same_aces(&current, desired) {
            return Ok(());
        }
        self.client
            .action(Collection::SmbShare, id, "set_acl", &AclUpdate { aces: desired })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Resource for SmbShareResource {
    type State = SmbShareState;

    fn type_name(&self) -> &'static str {
        "smb_share"
    }

    fn schema(&self) -> Schema {
        Schema::new(
            "This resource is used to manage the smb share entity of PowerStore Array. \
             We can Create, Update and Delete the smb share using this resource. \
             We can also import an existing smb share from PowerStore array.",
        )
        .attribute(Attribute::id("The unique identifier of the SMB Share."))
        .attribute(
            Attribute::string("file_system_id")
                .required()
                .validate(Validator::LengthAtLeast(1))
                .describe("The unique identifier of the file system on which the SMB Share is created."),
        )
        .attribute(
            Attribute::string("name")
                .required()
                .validate(Validator::LengthBetween(1, 80))
                .describe("The name of the SMB Share."),
        )
        .attribute(
            Attribute::string("path")
                .required()
                .validate(Validator::LengthAtLeast(1))
                .describe("The local path to export relative to the NAS Server."),
        )
        .attribute(
            Attribute::string("description")
                .optional_computed()
                .keep_state()
                .validate(Validator::LengthBetween(1, 255))
                .describe("User defined SMB share description."),
        )
        .attributes(
            [
                (
                    "is_continuous_availability_enabled",
                    "Whether continuous availability for SMB 3.0 is enabled for the SMB Share.",
                ),
                (
                    "is_encryption_enabled",
                    "Whether encryption for SMB 3.0 is enabled at the shared folder level.",
                ),
                ("is_abe_enabled", "Whether Access-based Enumeration (ABE) is enabled."),
                ("is_branch_cache_enabled", "Whether BranchCache optimization is enabled."),
            ]
            .into_iter()
            .map(|(name, description)| {
                Attribute::bool(name)
                    .optional_computed()
                    .keep_state()
                    .describe(description)
            }),
        )
        .attribute(
            Attribute::string("offline_availability")
                .optional_computed()
                .keep_state()
                .validate(Validator::OneOf(&["Manual", "Documents", "Programs", "None"]))
                .describe("Defines valid states of Offline Availability."),
        )
        .attribute(
            Attribute::string("umask")
                .optional_computed()
                .keep_state()
                .validate(Validator::LengthBetween(3, 3))
                .describe("The default UNIX umask for new files created on the Share."),
        )
        .attribute(
            Attribute::object_set(
                "aces",
                vec![
                    Attribute::string("trustee_name")
                        .required()
                        .describe("The name of the trustee."),
                    Attribute::string("trustee_type")
                        .required()
                        .validate(Validator::OneOf(&["Manual", "SID", "User", "Group", "WellKnown"]))
                        .describe("The type of the trustee."),
                    Attribute::string("access_level")
                        .required()
                        .validate(Validator::OneOf(&["Read", "Full", "Change"]))
                        .describe("The access level."),
                    Attribute::string("access_type")
                        .required()
                        .validate(Validator::OneOf(&["Allow", "Deny"]))
                        .describe("The access type."),
                ],
            )
            .optional_computed()
            .keep_state()
            .describe("To specify the ACL access options."),
        )
    }

    async fn create(&self, plan: SmbShareState) -> Result<SmbShareState> {
        let body = ShareCreate {
            file_system_id: plan.file_system_id.clone().unwrap_or_default(),
            name: plan.name.clone().unwrap_or_default(),
            path: plan.path.clone().unwrap_or_default(),
            settings: ShareSettings::from(&plan),
        };
        let id = self
            .client
            .create(Collection::SmbShare, &body)
            .await
            .map_err(|e| MESSAGES.create(&e))?;

        if let Some(aces) = &plan.aces {
            if let Err(err) = self.reconcile_acl(&id, aces).await {
                // A share whose ACL could not be set is removed again
                warn!("Setting the ACL of SMB share {} failed, deleting it", id);
                let acl_error = Error::operation(
                    "Error creating smb share ACL",
                    "Could not create smb share ACL, unexpected error: ",
                    &err,
                );
                if let Err(delete_err) = self.client.delete(Collection::SmbShare, &id).await {
                    return Err(Error::operation_msg(
                        "Error creating smb share ACL",
                        format!(
                            "{}; Could not delete SMBShareID {}: {}",
                            acl_error.detail(),
                            id,
                            delete_err
                        ),
                    ));
                }
                return Err(acl_error);
            }
        }

        let state = self
            .fetch(&id)
            .await
            .map_err(|e| MESSAGES.created_refresh(&e))?;
        info!("Created SMB share {} at {}", id, state.path.as_deref().unwrap_or_default());
        Ok(state)
    }

    async fn read(&self, state: SmbShareState) -> Result<SmbShareState> {
        let id = id_of(&state.id);
        self.fetch(id).await.map_err(|e| MESSAGES.read(id, e))
    }

    async fn update(&self, plan: SmbShareState, state: SmbShareState) -> Result<SmbShareState> {
        if changed(&plan.name, &state.name)
            || changed(&plan.file_system_id, &state.file_system_id)
            || changed(&plan.path, &state.path)
        {
            return Err(Error::validation(
                "Error updating smb share resource",
                "smb share attributes [name, filesystem_id, path] are not modifiable",
            ));
        }

        let id = id_of(&state.id);
        self.client
            .modify(Collection::SmbShare, id, &ShareSettings::from(&plan))
            .await
            .map_err(|e| Error::operation("Error updating smb share", "Could not update smb share: ", &e))?;

        if let Some(aces) = &plan.aces {
            self.reconcile_acl(id, aces).await.map_err(|e| {
                Error::operation(
                    "Error updating smb share ACL details",
                    "Could not update smb share ACL, unexpected error: ",
                    &e,
                )
            })?;
        }

        self.fetch(id).await.map_err(|e| MESSAGES.updated_refresh(&e))
    }

    async fn delete(&self, state: SmbShareState) -> Result<()> {
        let id = id_of(&state.id);
        self.client
            .delete(Collection::SmbShare, id)
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
    use std::sync::Arc;

    fn setup() -> (Arc<InMemoryArray>, JsonResource<SmbShareResource>, String) {
        let array = Arc::new(InMemoryArray::with_fixtures());
        let fs_id = array.seed(
            Collection::FileSystem,
            json!({"name": "fs", "nas_server_id": "nas-1", "size_total": 1073741824_i64}),
        );
        let client = PowerStoreClient::new(array.clone());
        (array, JsonResource(SmbShareResource::new(client)), fs_id)
    }

    fn ace(name: &str, level: &str) -> serde_json::Value {
        json!({"trustee_name": name, "trustee_type": "User", "access_level": level, "access_type": "Allow"})
    }

    #[tokio::test]
    async fn test_create_without_aces_keeps_default_acl() {
        let (array, handler, fs_id) = setup();
        let state = handler
            .create(&json!({"file_system_id": fs_id, "name": "share1", "path": "/share1"}))
            .await
            .unwrap();

        assert_eq!(state["umask"], "022");
        assert_eq!(state["offline_availability"], "Manual");
        assert_eq!(state["aces"][0]["trustee_name"], "Everyone");
        assert!(!array.calls().iter().any(|c| c.contains("set_acl")));
    }

    #[tokio::test]
    async fn test_create_sets_requested_acl() {
        let (_, handler, fs_id) = setup();
        let state = handler
            .create(&json!({
                "file_system_id": fs_id,
                "name": "share1",
                "path": "/share1",
                "is_abe_enabled": true,
                "aces": [ace("alice", "Read"), ace("bob", "Full")],
            }))
            .await
            .unwrap();

        assert_eq!(state["is_abe_enabled"], true);
        assert_eq!(state["aces"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_failed_acl_removes_share() {
        let (array, handler, fs_id) = setup();
        let err = handler
            .create(&json!({
                "file_system_id": fs_id,
                "name": "share1",
                "path": "/share1",
                "aces": [ace("", "Read")],
            }))
            .await
            .unwrap_err();

        assert_eq!(err.summary(), "Error creating smb share ACL");
        assert_eq!(array.count(Collection::SmbShare), 0);
    }

    #[tokio::test]
    async fn test_update_acl_only_when_changed() {
        let (array, handler, fs_id) = setup();
        let config = json!({
            "file_system_id": fs_id,
            "name": "share1",
            "path": "/share1",
            "aces": [ace("alice", "Read")],
        });
        let state = handler.create(&config).await.unwrap();

        array.clear_calls();
        let same = handler.update(&config, &state).await.unwrap();
        assert_eq!(same["aces"], state["aces"]);
        assert!(!array.calls().iter().any(|c| c.contains("set_acl")));

        let updated = handler
            .update(
                &json!({
                    "file_system_id": fs_id,
                    "name": "share1",
                    "path": "/share1",
                    "aces": [ace("alice", "Change")],
                }),
                &same,
            )
            .await
            .unwrap();
        assert_eq!(updated["aces"][0]["access_level"], "Change");

        let err = handler
            .update(&json!({"file_system_id": fs_id, "name": "renamed", "path": "/share1"}), &updated)
            .await
            .unwrap_err();
        assert_matches!(err, Error::Validation { .. });
    }
}
