//! `powerstore_filesystem_snapshot`

use super::{changed, expiration_to_state, id_of, non_empty, Messages};
use crate::client::{FileSystem, PowerStoreClient};
use crate::domain::ports::Collection;
use crate::error::{Error, Result};
use crate::framework::{Attribute, Resource, Schema, Validator};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

const MESSAGES: Messages = Messages("filesystem snapshot");

/// Sent when the plan leaves the description unset
const BLANK_DESCRIPTION: &str = " ";
/// Sent when the plan leaves the expiration unset; clears it on the array
const NO_EXPIRATION: &str = "1970-01-01T00:00:00.000Z";

pub(crate) const UTC_TIMESTAMP: Validator = Validator::Regex {
    pattern: r"(^([0-9]{4}-[0-9]{2}-[0-9]{2}T[0-9]{2}:[0-9]{2}:[0-9]{2}Z)$|^$)",
    message: "Only UTC (+Z) format is allowed eg: 2023-05-06T09:01:47Z",
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileSystemSnapshotState {
    pub id: Option<String>,
    pub name: Option<String>,
    pub filesystem_id: Option<String>,
    pub description: Option<String>,
    pub expiration_timestamp: Option<String>,
    pub access_type: Option<String>,
}

impl FileSystemSnapshotState {
    fn from_response(fs: FileSystem) -> Self {
        Self {
            id: Some(fs.id),
            name: Some(fs.name),
            filesystem_id: fs.parent_id,
            description: Some(fs.description),
            expiration_timestamp: expiration_to_state(fs.expiration_timestamp),
            access_type: fs.access_type,
        }
    }
}

#[derive(Debug, Serialize)]
struct SnapshotCreate {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expiration_timestamp: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    access_type: Option<String>,
}

#[derive(Debug, Serialize)]
struct SnapshotModify {
    description: String,
    expiration_timestamp: String,
}

pub struct FileSystemSnapshotResource {
    client: PowerStoreClient,
}

impl FileSystemSnapshotResource {
    pub fn new(client: PowerStoreClient) -> Self {
        Self { client }
    }

    async fn fetch(&self, id: &str) -> Result<FileSystemSnapshotState> {
        let fs: FileSystem = self.client.get(id).await?;
        Ok(FileSystemSnapshotState::from_response(fs))
    }
}

#[async_trait]
impl Resource for FileSystemSnapshotResource {
    type State = FileSystemSnapshotState;

    fn type_name(&self) -> &'static str {
        "filesystem_snapshot"
    }

    fn schema(&self) -> Schema {
        Schema::new(
            "This resource is used to manage the filesystem snapshot entity of PowerStore Array. \
             We can Create, Update and Delete the filesystem snapshot using this resource. \
             We can also import an existing filesystem snapshot from PowerStore array.",
        )
        .attribute(Attribute::id("The unique identifier of the filesystem snapshot."))
        .attribute(
            Attribute::string("name")
                .optional_computed()
                .keep_state()
                .describe("Name of the filesystem snapshot. Defaults to the time the snapshot is taken."),
        )
        .attribute(
            Attribute::string("filesystem_id")
                .required()
                .describe("ID of the filesystem to take snapshot. Cannot be updated."),
        )
        .attribute(
            Attribute::string("description")
                .optional_computed()
                .describe("Description of the filesystem snapshot."),
        )
        .attribute(
            Attribute::string("expiration_timestamp")
                .optional_computed()
                .validate(UTC_TIMESTAMP)
                .describe("Expiration Timestamp of the filesystem snapshot, e.g. 2023-05-06T09:01:47Z."),
        )
        .attribute(
            Attribute::string("access_type")
                .default_value(json!("Snapshot"))
                .validate(Validator::OneOf(&["Snapshot", "Protocol"]))
                .describe("Access type of the filesystem snapshot. Cannot be updated."),
        )
    }

    async fn create(&self, plan: FileSystemSnapshotState) -> Result<FileSystemSnapshotState> {
        let parent = plan.filesystem_id.clone().unwrap_or_default();
        let body = SnapshotCreate {
            name: non_empty(&plan.name),
            description: plan.description.clone(),
            expiration_timestamp: non_empty(&plan.expiration_timestamp),
            access_type: non_empty(&plan.access_type),
        };

        let id = self
            .client
            .snapshot(Collection::FileSystem, &parent, &body)
            .await
            .map_err(|e| MESSAGES.create(&e))?;
        info!("Created snapshot {} of file system {}", id, parent);

        self.fetch(&id).await.map_err(|e| MESSAGES.created_refresh(&e))
    }

    async fn read(&self, state: FileSystemSnapshotState) -> Result<FileSystemSnapshotState> {
        let id = id_of(&state.id);
        self.fetch(id).await.map_err(|e| MESSAGES.read(id, e))
    }

    async fn update(
        &self,
        plan: FileSystemSnapshotState,
        state: FileSystemSnapshotState,
    ) -> Result<FileSystemSnapshotState> {
        if changed(&plan.name, &state.name)
            || changed(&plan.filesystem_id, &state.filesystem_id)
            || changed(&plan.access_type, &state.access_type)
        {
            return Err(Error::validation(
                "Error updating filesystem snapshot resource",
                "filesystem snapshot attributes [name, filesystem_id, access_type] are not modifiable",
            ));
        }

        let id = id_of(&state.id);
        let body = SnapshotModify {
            description: non_empty(&plan.description).unwrap_or_else(|| BLANK_DESCRIPTION.to_string()),
            expiration_timestamp: non_empty(&plan.expiration_timestamp)
                .unwrap_or_else(|| NO_EXPIRATION.to_string()),
        };
        self.client
            .modify(Collection::FileSystem, id, &body)
            .await
            .map_err(|e| MESSAGES.update(id, &e))?;

        self.fetch(id).await.map_err(|e| MESSAGES.updated_refresh(&e))
    }

    async fn delete(&self, state: FileSystemSnapshotState) -> Result<()> {
        let id = id_of(&state.id);
        self.client
            .delete(Collection::FileSystem, id)
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

    fn setup() -> (Arc<InMemoryArray>, JsonResource<FileSystemSnapshotResource>, String) {
        let array = Arc::new(InMemoryArray::with_fixtures());
        let fs_id = array.seed(
            Collection::FileSystem,
            json!({"name": "parent", "nas_server_id": "nas-1", "size_total": 1073741824_i64,
                   "filesystem_type": "Primary"}),
        );
        let client = PowerStoreClient::new(array.clone());
        (array, JsonResource(FileSystemSnapshotResource::new(client)), fs_id)
    }

    #[tokio::test]
    async fn test_create_normalizes_expiration() {
        let (array, handler, fs_id) = setup();
        let state = handler
            .create(&json!({
                "name": "snap1",
                "filesystem_id": fs_id,
                "expiration_timestamp": "2035-05-06T09:01:47Z",
            }))
            .await
            .unwrap();

        assert_eq!(state["filesystem_id"], json!(fs_id));
        assert_eq!(state["access_type"], "Snapshot");
        assert_eq!(state["expiration_timestamp"], "2035-05-06T09:01:47Z");

        let stored = array
            .entity(Collection::FileSystem, state["id"].as_str().unwrap())
            .unwrap();
        assert_eq!(stored["filesystem_type"], "Snapshot");
        assert_eq!(stored["expiration_timestamp"], "2035-05-06T09:01:47+00:00");
    }

    #[tokio::test]
    async fn test_rejects_non_utc_expiration() {
        let (_, handler, fs_id) = setup();
        let err = handler
            .create(&json!({"filesystem_id": fs_id, "expiration_timestamp": "2035-05-06 09:01"}))
            .await
            .unwrap_err();
        assert_matches!(err, Error::Validation { .. });
    }

    #[tokio::test]
    async fn test_update_clears_unset_expiration() {
        let (_, handler, fs_id) = setup();
        let state = handler
            .create(&json!({
                "name": "snap1",
                "filesystem_id": fs_id,
                "expiration_timestamp": "2035-05-06T09:01:47Z",
            }))
            .await
            .unwrap();

        let updated = handler
            .update(&json!({"name": "snap1", "filesystem_id": fs_id, "description": "kept"}), &state)
            .await
            .unwrap();
        assert_eq!(updated["description"], "kept");
        assert_eq!(updated["expiration_timestamp"], Value::Null);

        let err = handler
            .update(&json!({"name": "snap1", "filesystem_id": fs_id, "access_type": "Protocol"}), &updated)
            .await
            .unwrap_err();
        assert_eq!(
            err.detail(),
            "filesystem snapshot attributes [name, filesystem_id, access_type] are not modifiable"
        );
    }

    #[tokio::test]
    async fn test_create_on_missing_filesystem() {
        let (_, handler, _) = setup();
        let err = handler
            .create(&json!({"name": "snap1", "filesystem_id": "missing"}))
            .await
            .unwrap_err();
        assert_eq!(err.summary(), "Error creating filesystem snapshot");
    }
}
