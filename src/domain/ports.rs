//! Domain Ports - the boundary between resource handlers and the array
//!
//! Resource handlers talk to the array only through [`PowerStoreApi`]. The
//! REST client and the in-memory array both implement it.

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

// =============================================================================
// Collections
// =============================================================================

/// REST collections the provider reads or mutates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    FileSystem,
    Host,
    HostGroup,
    NfsExport,
    SmbShare,
    Volume,
    VolumeGroup,
    SnapshotRule,
    ReplicationRule,
    Policy,
    NasServer,
    RemoteSystem,
    Cluster,
    Appliance,
    HostVolumeMapping,
    StorageContainer,
}

impl Collection {
    /// Path segment under the REST base URL
    pub fn path(&self) -> &'static str {
        match self {
            Collection::FileSystem => "file_system",
            Collection::Host => "host",
            Collection::HostGroup => "host_group",
            Collection::NfsExport => "nfs_export",
            Collection::SmbShare => "smb_share",
            Collection::Volume => "volume",
            Collection::VolumeGroup => "volume_group",
            Collection::SnapshotRule => "snapshot_rule",
            Collection::ReplicationRule => "replication_rule",
            Collection::Policy => "policy",
            Collection::NasServer => "nas_server",
            Collection::RemoteSystem => "remote_system",
            Collection::Cluster => "cluster",
            Collection::Appliance => "appliance",
            Collection::HostVolumeMapping => "host_volume_mapping",
            Collection::StorageContainer => "storage_container",
        }
    }

    /// Fields requested through `select`; the array returns only `id` otherwise
    pub fn select(&self) -> &'static str {
        match self {
            Collection::FileSystem => {
                "id,name,description,size_total,size_used,nas_server_id,parent_id,\
                 filesystem_type,config_type,access_policy,locking_policy,\
                 folder_rename_policy,is_smb_sync_writes_enabled,is_smb_no_notify_enabled,\
                 is_smb_op_locks_enabled,is_smb_notify_on_access_enabled,\
                 is_smb_notify_on_write_enabled,smb_notify_on_change_dir_depth,\
                 is_async_MTime_enabled,protection_policy_id,file_events_publishing_mode,\
                 host_io_size,access_type,creator_type,expiration_timestamp,\
                 creation_timestamp,flr_attributes"
            }
            Collection::Host => {
                "id,name,description,os_type,host_group_id,host_connectivity,\
                 host_initiators"
            }
            Collection::HostGroup => "id,name,description,host_connectivity,hosts(id,name)",
            Collection::NfsExport => {
                "id,file_system_id,name,description,path,default_access,min_security,\
                 nfs_owner_username,no_access_hosts,read_only_hosts,read_only_root_hosts,\
                 read_write_hosts,read_write_root_hosts,anonymous_UID,anonymous_GID,\
                 is_no_SUID"
            }
            Collection::SmbShare => {
                "id,file_system_id,name,path,description,is_continuous_availability_enabled,\
                 is_encryption_enabled,is_ABE_enabled,is_branch_cache_enabled,\
                 offline_availability,umask"
            }
            Collection::Volume => {
                "id,name,description,type,wwn,nsid,nguid,appliance_id,state,size,\
                 logical_used,sector_size,node_affinity,creation_timestamp,protection_policy_id,\
                 performance_policy_id,is_replication_destination,app_type,\
                 app_type_other,volume_groups(id,name),protection_data,\
                 host_volume_mapping(host_id,host_group_id,logical_unit_number)"
            }
            Collection::VolumeGroup => {
                "id,name,description,type,creation_timestamp,is_write_order_consistent,\
                 protection_policy_id,is_protectable,is_replication_destination,\
                 protection_data,volumes(id,name)"
            }
            Collection::SnapshotRule => {
                "id,name,interval,time_of_day,timezone,days_of_week,desired_retention,\
                 is_replica,nas_access_type,is_read_only,managed_by,managed_by_id,\
                 policies(id,name)"
            }
            Collection::ReplicationRule => {
                "id,name,rpo,remote_system_id,alert_threshold,is_read_only,is_replica,\
                 managed_by,managed_by_id,policies(id,name)"
            }
            Collection::Policy => {
                "id,name,description,type,managed_by,managed_by_id,is_read_only,\
                 is_replica,snapshot_rules(id,name),replication_rules(id,name)"
            }
            Collection::NasServer => {
                "id,name,description,operational_status,current_node_id,\
                 preferred_node_id,default_unix_user,default_windows_user,\
                 is_username_translation_enabled,is_auto_user_mapping_enabled,\
                 production_IPv4_interface_id,production_IPv6_interface_id"
            }
            Collection::RemoteSystem => {
                "id,name,description,serial_number,management_address,\
                 data_connection_state,capabilities"
            }
            Collection::Cluster => "id,name,system_time",
            Collection::Appliance => "id,name,model,service_tag",
            Collection::HostVolumeMapping => "id,host_id,host_group_id,volume_id,logical_unit_number",
            Collection::StorageContainer => "id,name,quota,storage_protocol,high_water_mark",
        }
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.path())
    }
}

// =============================================================================
// List Queries
// =============================================================================

/// PostgREST-style query parameters for list calls
///
/// Values carry their operator, for example `("name", "eq.fs1")`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListQuery {
    pub params: Vec<(String, String)>,
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a raw parameter
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    /// Add an equality filter
    pub fn eq(self, key: impl Into<String>, value: impl AsRef<str>) -> Self {
        let value = format!("eq.{}", value.as_ref());
        self.with(key, value)
    }

    /// Merge another query into this one
    pub fn extend(mut self, other: ListQuery) -> Self {
        self.params.extend(other.params);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

// =============================================================================
// Array API Port
// =============================================================================

/// JSON transport to a PowerStore array
///
/// Bodies and entities are raw JSON; typed access lives in
/// [`crate::client::PowerStoreClient`].
#[async_trait]
pub trait PowerStoreApi: Send + Sync {
    /// Create an entity, returning its id
    async fn create(&self, collection: Collection, body: Value) -> Result<String>;

    /// Get one entity by id
    async fn get(&self, collection: Collection, id: &str) -> Result<Value>;

    /// List entities matching the query, following pagination
    async fn list(&self, collection: Collection, query: &ListQuery) -> Result<Vec<Value>>;

    /// Modify an entity in place
    async fn modify(&self, collection: Collection, id: &str, body: Value) -> Result<()>;

    /// Delete an entity, with an optional request body
    async fn delete(&self, collection: Collection, id: &str, body: Option<Value>) -> Result<()>;

    /// Invoke an action endpoint such as `snapshot` or `set_acl`
    async fn action(
        &self,
        collection: Collection,
        id: &str,
        action: &str,
        body: Value,
    ) -> Result<Value>;

    /// Name of this transport, for logs
    fn backend_name(&self) -> &str;
}

/// Shared handle to the array transport
pub type PowerStoreApiRef = Arc<dyn PowerStoreApi>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_paths() {
        assert_eq!(Collection::FileSystem.path(), "file_system");
        assert_eq!(Collection::Policy.to_string(), "policy");
        assert!(Collection::Host.select().contains("initiators"));
        assert!(!Collection::FileSystem.select().contains(' '));
    }

    #[test]
    fn test_list_query_builder() {
        let query = ListQuery::new()
            .eq("name", "fs1")
            .with("filesystem_type", "eq.Primary");
        assert_eq!(
            query.params,
            vec![
                ("name".to_string(), "eq.fs1".to_string()),
                ("filesystem_type".to_string(), "eq.Primary".to_string()),
            ]
        );
        assert!(ListQuery::new().is_empty());
    }
}
