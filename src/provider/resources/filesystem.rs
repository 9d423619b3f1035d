//! `powerstore_filesystem`
//!
//! NAS file systems. Size is declared as a float plus a unit and sent to
//! the array in bytes; state reports the largest unit the size fills.

use super::{changed, id_of, non_empty, Messages};
use crate::client::{FileSystem, PowerStoreClient};
use crate::domain::ports::Collection;
use crate::domain::units::{from_bytes, to_bytes};
use crate::error::{Error, Result};
use crate::framework::{Attribute, Resource, Schema, Validator};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

const MESSAGES: Messages = Messages("file system");

const RETENTION: Validator = Validator::Regex {
    pattern: r"(^\d+[DMY]$)|(^infinite$)",
    message: "must be a number of days, months or years (e.g. 1D, 6M, 2Y) or infinite",
};

// =============================================================================
// State
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlrState {
    pub mode: Option<String>,
    pub minimum_retention: Option<String>,
    pub default_retention: Option<String>,
    pub maximum_retention: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileSystemState {
    pub id: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub size: Option<f64>,
    pub capacity_unit: Option<String>,
    pub nas_server_id: Option<String>,
    pub config_type: Option<String>,
    pub access_policy: Option<String>,
    pub locking_policy: Option<String>,
    pub folder_rename_policy: Option<String>,
    pub is_smb_sync_writes_enabled: Option<bool>,
    pub is_smb_no_notify_enabled: Option<bool>,
    pub is_smb_op_locks_enabled: Option<bool>,
    pub is_smb_notify_on_access_enabled: Option<bool>,
    pub is_smb_notify_on_write_enabled: Option<bool>,
    pub smb_notify_on_change_dir_depth: Option<i64>,
    pub is_async_mtime_enabled: Option<bool>,
    pub protection_policy_id: Option<String>,
    pub file_events_publishing_mode: Option<String>,
    pub host_io_size: Option<String>,
    pub file_system_type: Option<String>,
    pub flr_attributes: Option<FlrState>,
    pub parent_id: Option<String>,
}

impl FileSystemState {
    fn from_response(fs: FileSystem) -> Self {
        let (size, unit) = from_bytes(fs.size_total);
        Self {
            id: Some(fs.id),
            name: Some(fs.name),
            description: Some(fs.description),
            size: Some(size),
            capacity_unit: Some(unit.to_string()),
            nas_server_id: Some(fs.nas_server_id),
            config_type: Some(fs.config_type),
            access_policy: Some(fs.access_policy),
            locking_policy: Some(fs.locking_policy),
            folder_rename_policy: Some(fs.folder_rename_policy),
            is_smb_sync_writes_enabled: Some(fs.is_smb_sync_writes_enabled),
            is_smb_no_notify_enabled: Some(fs.is_smb_no_notify_enabled),
            is_smb_op_locks_enabled: Some(fs.is_smb_op_locks_enabled),
            is_smb_notify_on_access_enabled: Some(fs.is_smb_notify_on_access_enabled),
            is_smb_notify_on_write_enabled: Some(fs.is_smb_notify_on_write_enabled),
            smb_notify_on_change_dir_depth: Some(fs.smb_notify_on_change_dir_depth),
            is_async_mtime_enabled: Some(fs.is_async_mtime_enabled),
            protection_policy_id: fs.protection_policy_id,
            file_events_publishing_mode: Some(fs.file_events_publishing_mode),
            host_io_size: fs.host_io_size,
            file_system_type: Some(fs.filesystem_type),
            flr_attributes: Some(FlrState {
                mode: Some(fs.flr_attributes.mode),
                minimum_retention: Some(fs.flr_attributes.minimum_retention),
                default_retention: Some(fs.flr_attributes.default_retention),
                maximum_retention: Some(fs.flr_attributes.maximum_retention),
            }),
            parent_id: fs.parent_id,
        }
    }

    fn size_in_bytes(&self, summary: &str) -> Result<i64> {
        let unit = self.capacity_unit.as_deref().unwrap_or("GB");
        to_bytes(self.size.unwrap_or_default(), unit).map_err(|e| {
            Error::validation(
                summary,
                format!("Error in converting the given size into bytes: {}", e),
            )
        })
    }

    fn flr_mode(&self) -> Option<String> {
        self.flr_attributes.as_ref().and_then(|f| f.mode.clone())
    }
}

// =============================================================================
// Request Bodies
// =============================================================================

#[derive(Debug, Default, Serialize)]
struct FlrBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    minimum_retention: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    default_retention: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    maximum_retention: Option<String>,
}

impl FlrBody {
    fn from_plan(flr: Option<&FlrState>, with_mode: bool) -> Option<Self> {
        let flr = flr?;
        let body = Self {
            mode: if with_mode { non_empty(&flr.mode) } else { None },
            minimum_retention: non_empty(&flr.minimum_retention),
            default_retention: non_empty(&flr.default_retention),
            maximum_retention: non_empty(&flr.maximum_retention),
        };
        let empty = body.mode.is_none()
            && body.minimum_retention.is_none()
            && body.default_retention.is_none()
            && body.maximum_retention.is_none();
        (!empty).then_some(body)
    }
}

/// Attributes shared by create and modify
#[derive(Debug, Default, Serialize)]
struct FileSystemSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    size_total: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    access_policy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    locking_policy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    folder_rename_policy: Option<String>,
    #[serde(rename = "is_async_MTime_enabled", skip_serializing_if = "Option::is_none")]
    is_async_mtime_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    protection_policy_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_events_publishing_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    is_smb_sync_writes_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    is_smb_no_notify_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    is_smb_op_locks_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    is_smb_notify_on_access_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    is_smb_notify_on_write_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    smb_notify_on_change_dir_depth: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    flr_attributes: Option<FlrBody>,
}

impl FileSystemSettings {
    fn from_plan(plan: &FileSystemState, size_total: i64, with_mode: bool) -> Self {
        Self {
            description: plan.description.clone(),
            size_total,
            access_policy: non_empty(&plan.access_policy),
            locking_policy: non_empty(&plan.locking_policy),
            folder_rename_policy: non_empty(&plan.folder_rename_policy),
            is_async_mtime_enabled: plan.is_async_mtime_enabled,
            protection_policy_id: plan.protection_policy_id.clone(),
            file_events_publishing_mode: non_empty(&plan.file_events_publishing_mode),
            is_smb_sync_writes_enabled: plan.is_smb_sync_writes_enabled,
            is_smb_no_notify_enabled: plan.is_smb_no_notify_enabled,
            is_smb_op_locks_enabled: plan.is_smb_op_locks_enabled,
            is_smb_notify_on_access_enabled: plan.is_smb_notify_on_access_enabled,
            is_smb_notify_on_write_enabled: plan.is_smb_notify_on_write_enabled,
            smb_notify_on_change_dir_depth: plan.smb_notify_on_change_dir_depth,
            flr_attributes: FlrBody::from_plan(plan.flr_attributes.as_ref(), with_mode),
        }
    }
}

#[derive(Debug, Serialize)]
struct FileSystemCreate {
    name: String,
    nas_server_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    config_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    host_io_size: Option<String>,
    #[serde(flatten)]
    settings: FileSystemSettings,
}

// =============================================================================
// Resource
// =============================================================================

pub struct FileSystemResource {
    client: PowerStoreClient,
}

impl FileSystemResource {
    pub fn new(client: PowerStoreClient) -> Self {
        Self { client }
    }

    async fn fetch(&self, id: &str) -> Result<FileSystemState> {
        let fs: FileSystem = self.client.get(id).await?;
        Ok(FileSystemState::from_response(fs))
    }
}

#[async_trait]
impl Resource for FileSystemResource {
    type State = FileSystemState;

    fn type_name(&self) -> &'static str {
        "filesystem"
    }

    fn schema(&self) -> Schema {
        Schema::new(
            "This resource is used to manage the file system entity of PowerStore Array. \
             We can Create, Update and Delete the file system using this resource. \
             We can also import an existing file system from PowerStore array.",
        )
        .attribute(Attribute::id("Unique identifier of the file system."))
        .attribute(Attribute::string("name").required().describe("Name of the file system."))
        .attribute(
            Attribute::string("description")
                .optional_computed()
                .describe("File system description."),
        )
        .attribute(
            Attribute::float("size")
                .required()
                .describe("Size that the file system presents to the host or end user."),
        )
        .attribute(
            Attribute::string("capacity_unit")
                .default_value(json!("GB"))
                .validate(Validator::OneOf(&["MB", "GB", "TB"]))
                .describe("The Capacity Unit corresponding to the size."),
        )
        .attribute(
            Attribute::string("nas_server_id")
                .required()
                .describe("Unique identifier of the NAS Server on which the file system is mounted."),
        )
        .attribute(
            Attribute::string("config_type")
                .default_value(json!("General"))
                .validate(Validator::OneOf(&["General", "VMware"]))
                .describe("File system configuration type."),
        )
        .attribute(
            Attribute::string("access_policy")
                .default_value(json!("Native"))
                .validate(Validator::OneOf(&["Native", "UNIX", "Windows"]))
                .describe("File system security access policies."),
        )
        .attribute(
            Attribute::string("locking_policy")
                .default_value(json!("Advisory"))
                .validate(Validator::OneOf(&["Advisory", "Mandatory"]))
                .describe("File system locking policies."),
        )
        .attribute(
            Attribute::string("folder_rename_policy")
                .default_value(json!("All_Forbidden"))
                .validate(Validator::OneOf(&["All_Allowed", "SMB_Forbidden", "All_Forbidden"]))
                .describe(
                    "File system folder rename policies for the file system with multiprotocol access enabled.",
                ),
        )
        .attributes(vec![
            Attribute::bool("is_smb_sync_writes_enabled")
                .optional_computed()
                .describe("Indicates whether the synchronous writes option is enabled on the file system."),
            Attribute::bool("is_smb_no_notify_enabled")
                .optional_computed()
                .describe("Indicates whether notifications of changes to directory file structure are enabled."),
            Attribute::bool("is_smb_op_locks_enabled")
                .optional_computed()
                .describe("Indicates whether opportunistic file locking is enabled on the file system."),
            Attribute::bool("is_smb_notify_on_access_enabled")
                .optional_computed()
                .describe("Indicates whether file access notifications are enabled on the file system."),
            Attribute::bool("is_smb_notify_on_write_enabled")
                .optional_computed()
                .describe("Indicates whether file writes notifications are enabled on the file system."),
        ])
        .attribute(
            Attribute::int("smb_notify_on_change_dir_depth")
                .optional_computed()
                .validate(Validator::IntBetween(1, 512))
                .describe("Lowest directory level to which the enabled notifications apply, if any."),
        )
        .attribute(
            Attribute::bool("is_async_mtime_enabled")
                .optional_computed()
                .describe("Indicates whether asynchronous MTIME is enabled on the file system."),
        )
        .attribute(
            Attribute::string("protection_policy_id")
                .optional_computed()
                .describe("Unique identifier of the protection policy applied to the file system."),
        )
        .attribute(
            Attribute::string("file_events_publishing_mode")
                .default_value(json!("None"))
                .validate(Validator::OneOf(&["None", "SMB_Only", "NFS_Only", "All"]))
                .describe("State of the event notification services for all file systems of the NAS server."),
        )
        .attribute(
            Attribute::string("host_io_size")
                .optional_computed()
                .validate(Validator::OneOf(&["VMware_8K", "VMware_16K", "VMware_32K", "VMware_64K"]))
                .describe("Typical size of writes from the VMware host to the file system."),
        )
        .attribute(
            Attribute::string("file_system_type")
                .computed()
                .describe("Type of filesystem: normal or snapshot."),
        )
        .attribute(
            Attribute::object(
                "flr_attributes",
                vec![
                    Attribute::string("mode")
                        .default_value(json!("Enterprise"))
                        .validate(Validator::OneOf(&["None", "Enterprise", "Compliance"]))
                        .describe("The FLR type of the file system."),
                    Attribute::string("minimum_retention")
                        .default_value(json!("1D"))
                        .validate(RETENTION)
                        .describe("Minimum retention period for files locked by the file system."),
                    Attribute::string("default_retention")
                        .optional_computed()
                        .validate(RETENTION)
                        .describe("Default retention period applied to locked files."),
                    Attribute::string("maximum_retention")
                        .default_value(json!("infinite"))
                        .validate(RETENTION)
                        .describe("Maximum retention period for files locked by the file system."),
                ],
            )
            .optional_computed()
            .keep_state()
            .describe("File retention attributes of the file system."),
        )
        .attribute(
            Attribute::string("parent_id")
                .computed()
                .describe("Unique identifier of the parent filesystem."),
        )
    }

    async fn create(&self, plan: FileSystemState) -> Result<FileSystemState> {
        let size_total = plan.size_in_bytes("Error creating file system")?;
        let body = FileSystemCreate {
            name: plan.name.clone().unwrap_or_default(),
            nas_server_id: plan.nas_server_id.clone().unwrap_or_default(),
            config_type: non_empty(&plan.config_type),
            host_io_size: non_empty(&plan.host_io_size),
            settings: FileSystemSettings::from_plan(&plan, size_total, true),
        };

        let id = self
            .client
            .create(Collection::FileSystem, &body)
            .await
            .map_err(|e| MESSAGES.create(&e))?;
        info!("Created file system {} ({} bytes)", id, size_total);

        self.fetch(&id).await.map_err(|e| MESSAGES.created_refresh(&e))
    }

    async fn read(&self, state: FileSystemState) -> Result<FileSystemState> {
        let id = id_of(&state.id);
        self.fetch(id).await.map_err(|e| MESSAGES.read(id, e))
    }

    async fn update(&self, plan: FileSystemState, state: FileSystemState) -> Result<FileSystemState> {
        if changed(&plan.name, &state.name) {
            return Err(MESSAGES.immutable("Name of the file system can't be updated"));
        }
        if changed(&plan.nas_server_id, &state.nas_server_id) {
            return Err(MESSAGES.immutable("NAS server ID can't be updated"));
        }
        if changed(&plan.host_io_size, &state.host_io_size) {
            return Err(MESSAGES.immutable("Host IO size can't be updated"));
        }
        if changed(&plan.config_type, &state.config_type) {
            return Err(MESSAGES.immutable("Config type can't be updated"));
        }
        if changed(&plan.flr_mode(), &state.flr_mode()) {
            return Err(MESSAGES.immutable("Mode of the flr attributes can't be updated"));
        }

        let id = id_of(&state.id);
        let size_total = plan.size_in_bytes("Error updating file system")?;
        let body = FileSystemSettings::from_plan(&plan, size_total, false);
        debug!("Modifying file system {}", id);
        self.client
            .modify(Collection::FileSystem, id, &body)
            .await
            .map_err(|e| MESSAGES.update(id, &e))?;

        self.fetch(id).await.map_err(|e| MESSAGES.updated_refresh(&e))
    }

    async fn delete(&self, state: FileSystemState) -> Result<()> {
        let id = id_of(&state.id);
        self.client
            .delete(Collection::FileSystem, id)
            .await
            .map_err(|e| MESSAGES.delete(id, &e))
    }
}
