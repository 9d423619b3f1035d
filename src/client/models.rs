//! Typed PowerStore entities
//!
//! Field names follow the REST wire format. Every struct tolerates missing
//! fields so partial `select` lists still decode.

use crate::domain::ports::Collection;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// An entity that lives in a REST collection
pub trait Entity: DeserializeOwned + Serialize + Send + Sync {
    const COLLECTION: Collection;
    /// Human readable kind, used in not-found errors
    const KIND: &'static str;
}

/// Reference to a related entity as embedded by `select=rel(id,name)`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Related {
    pub id: String,
    pub name: String,
}

/// Response body of every create call
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CreateResponse {
    pub id: String,
}

// =============================================================================
// File Systems
// =============================================================================

/// File retention attributes of a file system
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlrAttributes {
    pub mode: String,
    pub minimum_retention: String,
    pub default_retention: String,
    pub maximum_retention: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FileSystem {
    pub id: String,
    pub name: String,
    pub description: String,
    pub size_total: i64,
    pub size_used: i64,
    pub nas_server_id: String,
    pub parent_id: Option<String>,
    pub filesystem_type: String,
    pub config_type: String,
    pub access_policy: String,
    pub locking_policy: String,
    pub folder_rename_policy: String,
    pub is_smb_sync_writes_enabled: bool,
    pub is_smb_no_notify_enabled: bool,
    pub is_smb_op_locks_enabled: bool,
    pub is_smb_notify_on_access_enabled: bool,
    pub is_smb_notify_on_write_enabled: bool,
    pub smb_notify_on_change_dir_depth: i64,
    #[serde(rename = "is_async_MTime_enabled")]
    pub is_async_mtime_enabled: bool,
    pub protection_policy_id: Option<String>,
    pub file_events_publishing_mode: String,
    pub host_io_size: Option<String>,
    pub access_type: Option<String>,
    pub creator_type: Option<String>,
    pub expiration_timestamp: Option<String>,
    pub creation_timestamp: Option<String>,
    pub flr_attributes: FlrAttributes,
}

impl Entity for FileSystem {
    const COLLECTION: Collection = Collection::FileSystem;
    const KIND: &'static str = "file system";
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NasServer {
    pub id: String,
    pub name: String,
    pub description: String,
    pub operational_status: String,
    pub current_node_id: String,
    pub preferred_node_id: String,
    pub default_unix_user: String,
    pub default_windows_user: String,
    pub is_username_translation_enabled: bool,
    pub is_auto_user_mapping_enabled: bool,
    #[serde(rename = "production_IPv4_interface_id")]
    pub production_ipv4_interface_id: Option<String>,
    #[serde(rename = "production_IPv6_interface_id")]
    pub production_ipv6_interface_id: Option<String>,
}

impl Entity for NasServer {
    const COLLECTION: Collection = Collection::NasServer;
    const KIND: &'static str = "NAS server";
}

// =============================================================================
// File Sharing
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NfsExport {
    pub id: String,
    pub file_system_id: String,
    pub name: String,
    pub description: String,
    pub path: String,
    pub default_access: String,
    pub min_security: String,
    pub nfs_owner_username: String,
    pub no_access_hosts: Vec<String>,
    pub read_only_hosts: Vec<String>,
    pub read_only_root_hosts: Vec<String>,
    pub read_write_hosts: Vec<String>,
    pub read_write_root_hosts: Vec<String>,
    #[serde(rename = "anonymous_UID")]
    pub anonymous_uid: i32,
    #[serde(rename = "anonymous_GID")]
    pub anonymous_gid: i32,
    #[serde(rename = "is_no_SUID")]
    pub is_no_suid: bool,
}

impl Entity for NfsExport {
    const COLLECTION: Collection = Collection::NfsExport;
    const KIND: &'static str = "NFS export";
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SmbShare {
    pub id: String,
    pub file_system_id: String,
    pub name: String,
    pub path: String,
    pub description: String,
    pub is_continuous_availability_enabled: bool,
    pub is_encryption_enabled: bool,
    #[serde(rename = "is_ABE_enabled")]
    pub is_abe_enabled: bool,
    pub is_branch_cache_enabled: bool,
    pub offline_availability: String,
    pub umask: String,
}

impl Entity for SmbShare {
    const COLLECTION: Collection = Collection::SmbShare;
    const KIND: &'static str = "SMB share";
}

/// One access control entry of an SMB share
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct Ace {
    pub trustee_name: String,
    pub trustee_type: String,
    pub access_level: String,
    pub access_type: String,
}

/// Body of `smb_share/{id}/get_acl`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AclResponse {
    pub aces: Vec<Ace>,
}

// =============================================================================
// Hosts
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostInitiator {
    pub port_name: String,
    pub port_type: String,
    pub chap_single_username: Option<String>,
    pub chap_mutual_username: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Host {
    pub id: String,
    pub name: String,
    pub description: String,
    pub os_type: String,
    pub host_group_id: Option<String>,
    pub host_connectivity: String,
    #[serde(rename = "host_initiators")]
    pub initiators: Vec<HostInitiator>,
}

impl Entity for Host {
    const COLLECTION: Collection = Collection::Host;
    const KIND: &'static str = "host";
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HostGroup {
    pub id: String,
    pub name: String,
    pub description: String,
    pub host_connectivity: String,
    pub hosts: Vec<Related>,
}

impl Entity for HostGroup {
    const COLLECTION: Collection = Collection::HostGroup;
    const KIND: &'static str = "host group";
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HostVolumeMapping {
    pub id: String,
    pub host_id: Option<String>,
    pub host_group_id: Option<String>,
    pub volume_id: String,
    pub logical_unit_number: i64,
}

impl Entity for HostVolumeMapping {
    const COLLECTION: Collection = Collection::HostVolumeMapping;
    const KIND: &'static str = "host volume mapping";
}

// =============================================================================
// Volumes
// =============================================================================

/// Snapshot lineage of volumes and volume groups
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtectionData {
    pub parent_id: Option<String>,
    pub source_id: Option<String>,
    pub creator_type: Option<String>,
    pub expiration_timestamp: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Volume {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub volume_type: String,
    pub wwn: String,
    pub nsid: i64,
    pub nguid: String,
    pub appliance_id: String,
    pub state: String,
    pub size: i64,
    pub logical_used: i64,
    pub sector_size: i64,
    pub node_affinity: String,
    pub creation_timestamp: String,
    pub protection_policy_id: Option<String>,
    pub performance_policy_id: String,
    pub is_replication_destination: bool,
    pub app_type: Option<String>,
    pub app_type_other: Option<String>,
    pub volume_groups: Vec<Related>,
    pub protection_data: ProtectionData,
    pub host_volume_mapping: Vec<HostVolumeMapping>,
}

impl Entity for Volume {
    const COLLECTION: Collection = Collection::Volume;
    const KIND: &'static str = "volume";
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeGroup {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub group_type: String,
    pub creation_timestamp: String,
    pub is_write_order_consistent: bool,
    pub protection_policy_id: Option<String>,
    pub is_protectable: bool,
    pub is_replication_destination: bool,
    pub protection_data: ProtectionData,
    pub volumes: Vec<Related>,
}

impl Entity for VolumeGroup {
    const COLLECTION: Collection = Collection::VolumeGroup;
    const KIND: &'static str = "volume group";
}

// =============================================================================
// Protection
// =============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotRule {
    pub id: String,
    pub name: String,
    pub interval: Option<String>,
    pub time_of_day: Option<String>,
    pub timezone: Option<String>,
    pub days_of_week: Vec<String>,
    pub desired_retention: i64,
    pub is_replica: bool,
    pub nas_access_type: String,
    pub is_read_only: bool,
    pub managed_by: String,
    pub managed_by_id: Option<String>,
    pub policies: Vec<Related>,
}

impl Entity for SnapshotRule {
    const COLLECTION: Collection = Collection::SnapshotRule;
    const KIND: &'static str = "snapshot rule";
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplicationRule {
    pub id: String,
    pub name: String,
    pub rpo: String,
    pub remote_system_id: String,
    pub alert_threshold: i64,
    pub is_read_only: bool,
    pub is_replica: bool,
    pub managed_by: String,
    pub managed_by_id: Option<String>,
    pub policies: Vec<Related>,
}

impl Entity for ReplicationRule {
    const COLLECTION: Collection = Collection::ReplicationRule;
    const KIND: &'static str = "replication rule";
}

/// vVol storage container
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageContainer {
    pub id: String,
    pub name: String,
    /// Bytes that may be provisioned, `0` for no limit
    pub quota: i64,
    pub storage_protocol: String,
    pub high_water_mark: i64,
}

impl Entity for StorageContainer {
    const COLLECTION: Collection = Collection::StorageContainer;
    const KIND: &'static str = "storage container";
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtectionPolicy {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub policy_type: String,
    pub managed_by: String,
    pub managed_by_id: Option<String>,
    pub is_read_only: bool,
    pub is_replica: bool,
    pub snapshot_rules: Vec<Related>,
    pub replication_rules: Vec<Related>,
}

impl Entity for ProtectionPolicy {
    const COLLECTION: Collection = Collection::Policy;
    const KIND: &'static str = "protection policy";
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteSystem {
    pub id: String,
    pub name: String,
    pub description: String,
    pub serial_number: String,
    pub management_address: String,
    pub data_connection_state: String,
    pub capabilities: Vec<String>,
}

impl Entity for RemoteSystem {
    const COLLECTION: Collection = Collection::RemoteSystem;
    const KIND: &'static str = "remote system";
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Cluster {
    pub id: String,
    pub name: String,
    pub system_time: String,
}

impl Entity for Cluster {
    const COLLECTION: Collection = Collection::Cluster;
    const KIND: &'static str = "cluster";
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Appliance {
    pub id: String,
    pub name: String,
    pub model: String,
    pub service_tag: String,
}

impl Entity for Appliance {
    const COLLECTION: Collection = Collection::Appliance;
    const KIND: &'static str = "appliance";
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_file_system_wire_names() {
        let fs: FileSystem = serde_json::from_value(json!({
            "id": "fs-1",
            "name": "fs",
            "size_total": 5368709120_i64,
            "is_async_MTime_enabled": true,
            "flr_attributes": {"mode": "Enterprise"}
        }))
        .unwrap();

        assert_eq!(fs.size_total, 5 * (1 << 30));
        assert!(fs.is_async_mtime_enabled);
        assert_eq!(fs.flr_attributes.mode, "Enterprise");
        assert!(fs.parent_id.is_none());
    }

    #[test]
    fn test_host_initiators_wire_name() {
        let host: Host = serde_json::from_value(json!({
            "id": "h1",
            "host_initiators": [{"port_name": "iqn.1998-01.com.vmware:h1", "port_type": "iSCSI"}]
        }))
        .unwrap();
        assert_eq!(host.initiators.len(), 1);
        assert_eq!(host.initiators[0].port_type, "iSCSI");
    }
}
