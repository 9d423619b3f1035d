//! `powerstore_nfs_export`
//!
//! Host sets are sent in the array's notation and compared by meaning, see
//! [`crate::provider::hostset`].

use super::{changed, id_of, non_empty, Messages};
use crate::client::{NfsExport, PowerStoreClient};
use crate::domain::ports::Collection;
use crate::error::{Error, Result};
use crate::framework::{Attribute, Resource, Schema, Validator};
use crate::provider::hostset;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

const MESSAGES: Messages = Messages("nfs export");

pub(crate) const DEFAULT_ACCESS: &[&str] =
    &["No_Access", "Read_Only", "Read_Write", "Root", "Read_Only_Root"];
pub(crate) const MIN_SECURITY: &[&str] = &[
    "Sys",
    "Kerberos",
    "Kerberos_With_Integrity",
    "Kerberos_With_Encryption",
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NfsExportState {
    pub id: Option<String>,
    pub file_system_id: Option<String>,
    pub name: Option<String>,
    pub path: Option<String>,
    pub description: Option<String>,
    pub min_security: Option<String>,
    pub anonymous_gid: Option<i32>,
    pub anonymous_uid: Option<i32>,
    pub is_no_suid: Option<bool>,
    pub nfs_owner_username: Option<String>,
    pub default_access: Option<String>,
    pub no_access_hosts: Option<Vec<String>>,
    pub read_only_hosts: Option<Vec<String>>,
    pub read_only_root_hosts: Option<Vec<String>>,
    pub read_write_hosts: Option<Vec<String>>,
    pub read_write_root_hosts: Option<Vec<String>>,
}

impl NfsExportState {
    fn from_response(export: NfsExport) -> Self {
        Self {
            id: Some(export.id),
            file_system_id: Some(export.file_system_id),
            name: Some(export.name),
            path: Some(export.path),
            description: Some(export.description),
            min_security: Some(export.min_security),
            anonymous_gid: Some(export.anonymous_gid),
            anonymous_uid: Some(export.anonymous_uid),
            is_no_suid: Some(export.is_no_suid),
            nfs_owner_username: Some(export.nfs_owner_username),
            default_access: Some(export.default_access),
            no_access_hosts: Some(export.no_access_hosts),
            read_only_hosts: Some(export.read_only_hosts),
            read_only_root_hosts: Some(export.read_only_root_hosts),
            read_write_hosts: Some(export.read_write_hosts),
            read_write_root_hosts: Some(export.read_write_root_hosts),
        }
    }

    /// Keep the planned spelling of every host set the array agrees with
    fn reconcile_hosts(mut self, plan: &NfsExportState) -> Self {
        let pairs = [
            (&plan.no_access_hosts, &mut self.no_access_hosts),
            (&plan.read_only_hosts, &mut self.read_only_hosts),
            (&plan.read_only_root_hosts, &mut self.read_only_root_hosts),
            (&plan.read_write_hosts, &mut self.read_write_hosts),
            (&plan.read_write_root_hosts, &mut self.read_write_root_hosts),
        ];
        for (planned, current) in pairs {
            if let Some(returned) = current.take() {
                *current = Some(hostset::reconcile(planned.as_ref(), returned));
            }
        }
        self
    }
}

/// Settings shared by create and modify; host sets are full replacements
#[derive(Debug, Default, Serialize)]
struct ExportSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    min_security: Option<String>,
    #[serde(rename = "anonymous_GID", skip_serializing_if = "Option::is_none")]
    anonymous_gid: Option<i32>,
    #[serde(rename = "anonymous_UID", skip_serializing_if = "Option::is_none")]
    anonymous_uid: Option<i32>,
    #[serde(rename = "is_no_SUID", skip_serializing_if = "Option::is_none")]
    is_no_suid: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    nfs_owner_username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    default_access: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    no_access_hosts: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    read_only_hosts: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    read_only_root_hosts: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    read_write_hosts: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    read_write_root_hosts: Option<Vec<String>>,
}

impl From<&NfsExportState> for ExportSettings {
    fn from(plan: &NfsExportState) -> Self {
        let wire = |hosts: &Option<Vec<String>>| hosts.as_deref().map(hostset::to_wire);
        Self {
            description: plan.description.clone(),
            min_security: non_empty(&plan.min_security),
            anonymous_gid: plan.anonymous_gid,
            anonymous_uid: plan.anonymous_uid,
            is_no_suid: plan.is_no_suid,
            nfs_owner_username: non_empty(&plan.nfs_owner_username),
            default_access: non_empty(&plan.default_access),
            no_access_hosts: wire(&plan.no_access_hosts),
            read_only_hosts: wire(&plan.read_only_hosts),
            read_only_root_hosts: wire(&plan.read_only_root_hosts),
            read_write_hosts: wire(&plan.read_write_hosts),
            read_write_root_hosts: wire(&plan.read_write_root_hosts),
        }
    }
}

#[derive(Debug, Serialize)]
struct ExportCreate {
    file_system_id: String,
    name: String,
    path: String,
    #[serde(flatten)]
    settings: ExportSettings,
}

fn host_set(name: &'static str, access: &'static str) -> Attribute {
    Attribute::string_set(name)
        .optional_computed()
        .validate(Validator::SizeAtLeast(1))
        .validate(Validator::ValuesLengthBetween(0, 255))
        .describe(access)
}

pub struct NfsExportResource {
    client: PowerStoreClient,
}

impl NfsExportResource {
    pub fn new(client: PowerStoreClient) -> Self {
        Self { client }
    }

    async fn fetch(&self, id: &str) -> Result<NfsExportState> {
        let export: NfsExport = self.client.get(id).await?;
        Ok(NfsExportState::from_response(export))
    }
}

#[async_trait]
impl Resource for NfsExportResource {
    type State = NfsExportState;

    fn type_name(&self) -> &'static str {
        "nfs_export"
    }

    fn schema(&self) -> Schema {
        Schema::new(
            "This resource is used to manage the nfs export entity of PowerStore Array. \
             We can Create, Update and Delete the nfs export using this resource. \
             We can also import an existing nfs export from PowerStore array.",
        )
        .attribute(Attribute::id("The unique identifier of the NFS Export."))
        .attribute(
            Attribute::string("file_system_id")
                .required()
                .validate(Validator::LengthAtLeast(1))
                .describe("The unique identifier of the file system on which the NFS Export will be created."),
        )
        .attribute(
            Attribute::string("name")
                .required()
                .validate(Validator::LengthAtLeast(1))
                .describe("The name of the NFS Export."),
        )
        .attribute(
            Attribute::string("path")
                .required()
                .validate(Validator::LengthAtLeast(1))
                .describe("The local path to export relative to the nfs export root directory."),
        )
        .attribute(
            Attribute::string("description")
                .optional_computed()
                .validate(Validator::LengthAtLeast(1))
                .describe("A user-defined description of the NFS Export."),
        )
        .attribute(
            Attribute::string("min_security")
                .optional_computed()
                .validate(Validator::OneOf(MIN_SECURITY))
                .describe("The NFS enforced security type for users accessing the NFS Export."),
        )
        .attribute(
            Attribute::int("anonymous_gid")
                .optional_computed()
                .describe("The GID (Group ID) of the anonymous user."),
        )
        .attribute(
            Attribute::int("anonymous_uid")
                .optional_computed()
                .describe("The UID (User ID) of the anonymous user."),
        )
        .attribute(
            Attribute::bool("is_no_suid")
                .optional_computed()
                .describe("If set, do not allow access to set SUID. Otherwise, allow access."),
        )
        .attribute(
            Attribute::string("nfs_owner_username")
                .optional_computed()
                .validate(Validator::LengthBetween(1, 32))
                .describe("The default owner of the NFS Export associated with the datastore."),
        )
        .attribute(
            Attribute::string("default_access")
                .optional_computed()
                .validate(Validator::OneOf(DEFAULT_ACCESS))
                .describe("The default access level for hosts not listed in any host set."),
        )
        .attributes(vec![
            host_set("no_access_hosts", "Hosts with no access to the NFS Export."),
            host_set("read_only_hosts", "Hosts with read-only access to the NFS Export."),
            host_set(
                "read_only_root_hosts",
                "Hosts with read-only and read-only for root user access to the NFS Export.",
            ),
            host_set("read_write_hosts", "Hosts with read and write access to the NFS Export."),
            host_set(
                "read_write_root_hosts",
                "Hosts with read and write and read and write for root user access to the NFS Export.",
            ),
        ])
    }

    fn validate(&self, config: &NfsExportState) -> Result<()> {
        for hosts in [
            &config.no_access_hosts,
            &config.read_only_hosts,
            &config.read_only_root_hosts,
            &config.read_write_hosts,
            &config.read_write_root_hosts,
        ]
        .into_iter()
        .flatten()
        {
            hostset::normalize(hosts)?;
        }
        Ok(())
    }

    async fn create(&self, plan: NfsExportState) -> Result<NfsExportState> {
        let body = ExportCreate {
            file_system_id: plan.file_system_id.clone().unwrap_or_default(),
            name: plan.name.clone().unwrap_or_default(),
            path: plan.path.clone().unwrap_or_default(),
            settings: ExportSettings::from(&plan),
        };
        let id = self
            .client
            .create(Collection::NfsExport, &body)
            .await
            .map_err(|e| MESSAGES.create(&e))?;

        let state = self
            .fetch(&id)
            .await
            .map_err(|e| MESSAGES.created_refresh(&e))?;
        Ok(state.reconcile_hosts(&plan))
    }

    async fn read(&self, state: NfsExportState) -> Result<NfsExportState> {
        let id = id_of(&state.id);
        self.fetch(id).await.map_err(|e| MESSAGES.read(id, e))
    }

    async fn update(&self, plan: NfsExportState, state: NfsExportState) -> Result<NfsExportState> {
        if changed(&plan.name, &state.name)
            || changed(&plan.file_system_id, &state.file_system_id)
            || changed(&plan.path, &state.path)
        {
            return Err(Error::validation(
                "Error updating nfs export resource",
                "nfs export attributes [name, filesystem_id, path] are not modifiable",
            ));
        }

        let id = id_of(&state.id);
        self.client
            .modify(Collection::NfsExport, id, &ExportSettings::from(&plan))
            .await
            .map_err(|e| Error::operation("Error updating nfs export", "Could not update nfs export: ", &e))?;

        let refreshed = self.fetch(id).await.map_err(|e| {
            Error::refresh(
                "Error getting nfs export after modify",
                "Could not get nfs export, unexpected error: ",
                &e,
            )
        })?;
        Ok(refreshed.reconcile_hosts(&plan))
    }

    async fn delete(&self, state: NfsExportState) -> Result<()> {
        let id = id_of(&state.id);
        self.client
            .delete(Collection::NfsExport, id)
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
    use serde_json::json;
    use std::sync::Arc;

    fn setup() -> (Arc<InMemoryArray>, JsonResource<NfsExportResource>, String) {
        let array = Arc::new(InMemoryArray::with_fixtures());
        let fs_id = array.seed(
            Collection::FileSystem,
            json!({"name": "fs", "nas_server_id": "nas-1", "size_total": 1073741824_i64}),
        );
        let client = PowerStoreClient::new(array.clone());
        (array, JsonResource(NfsExportResource::new(client)), fs_id)
    }

    #[tokio::test]
    async fn test_create_keeps_planned_host_spelling() {
        let (array, handler, fs_id) = setup();
        let state = handler
            .create(&json!({
                "file_system_id": fs_id,
                "name": "export1",
                "path": "/export1",
                "read_write_hosts": ["10.0.0.1", "192.168.0.0/16"],
                "read_only_hosts": ["host-a"],
            }))
            .await
            .unwrap();

        assert_eq!(state["read_write_hosts"], json!(["10.0.0.1", "192.168.0.0/16"]));
        assert_eq!(state["read_only_hosts"], json!(["host-a"]));
        assert_eq!(state["no_access_hosts"], json!([]));

        let stored = array
            .entity(Collection::NfsExport, state["id"].as_str().unwrap())
            .unwrap();
        assert_eq!(
            stored["read_write_hosts"],
            json!(["10.0.0.1/255.255.255.255", "192.168.0.0/255.255.0.0"])
        );

        let refreshed = handler.read(&state).await.unwrap();
        assert_eq!(refreshed["read_write_hosts"], stored["read_write_hosts"]);
    }

    #[tokio::test]
    async fn test_invalid_hosts_are_rejected() {
        let (array, handler, fs_id) = setup();
        let err = handler
            .create(&json!({
                "file_system_id": fs_id,
                "name": "export1",
                "path": "/export1",
                "read_write_hosts": ["10.0.0.0/99"],
            }))
            .await
            .unwrap_err();
        assert_matches!(err, Error::Validation { ref summary, .. } if summary == "Error parsing host values");

        let err = handler
            .create(&json!({
                "file_system_id": fs_id,
                "name": "export1",
                "path": "/export1",
                "read_write_hosts": [],
            }))
            .await
            .unwrap_err();
        assert_matches!(err, Error::Validation { .. });
        assert_eq!(array.count(Collection::NfsExport), 0);
    }

    #[tokio::test]
    async fn test_update_replaces_hosts() {
        let (_, handler, fs_id) = setup();
        let config = json!({
            "file_system_id": fs_id,
            "name": "export1",
            "path": "/export1",
            "read_write_hosts": ["10.0.0.1"],
        });
        let state = handler.create(&config).await.unwrap();

        let updated = handler
            .update(
                &json!({
                    "file_system_id": fs_id,
                    "name": "export1",
                    "path": "/export1",
                    "read_write_hosts": ["10.0.0.2"],
                    "default_access": "Read_Only",
                }),
                &state,
            )
            .await
            .unwrap();
        assert_eq!(updated["read_write_hosts"], json!(["10.0.0.2"]));
        assert_eq!(updated["default_access"], "Read_Only");

        let err = handler
            .update(
                &json!({"file_system_id": fs_id, "name": "export1", "path": "/other"}),
                &updated,
            )
            .await
            .unwrap_err();
        assert_eq!(
            err.detail(),
            "nfs export attributes [name, filesystem_id, path] are not modifiable"
        );
    }

    #[tokio::test]
    async fn test_create_requires_absolute_path() {
        let (_, handler, fs_id) = setup();
        let err = handler
            .create(&json!({"file_system_id": fs_id, "name": "export1", "path": "relative"}))
            .await
            .unwrap_err();
        assert_eq!(err.summary(), "Error creating nfs export");
    }
}
