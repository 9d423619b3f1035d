//! In-Memory PowerStore Array
//!
//! An in-process stand-in for a PowerStore array. It keeps entities as JSON
//! and applies the server-side behavior the provider depends on: generated
//! ids, default values, name uniqueness, reference checks, relation
//! embedding and the array's timestamp formats.

use crate::domain::ports::{Collection, ListQuery, PowerStoreApi};
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use tracing::debug;

const ALL_DAYS: [&str; 7] = [
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

// =============================================================================
// Array State
// =============================================================================

#[derive(Default)]
struct ArrayState {
    entities: BTreeMap<Collection, BTreeMap<String, Value>>,
    next_id: u64,
}

impl ArrayState {
    fn new_id(&mut self) -> String {
        self.next_id += 1;
        format!("00000000-0000-4000-8000-{:012x}", self.next_id)
    }

    fn table(&self, collection: Collection) -> impl Iterator<Item = (&String, &Value)> {
        self.entities.get(&collection).into_iter().flatten()
    }

    fn stored(&self, collection: Collection, id: &str) -> Option<&Value> {
        self.entities.get(&collection).and_then(|t| t.get(id))
    }

    fn stored_mut(&mut self, collection: Collection, id: &str) -> Result<&mut Map<String, Value>> {
        self.entities
            .get_mut(&collection)
            .and_then(|t| t.get_mut(id))
            .and_then(Value::as_object_mut)
            .ok_or_else(|| not_found(collection, id))
    }

    fn insert(&mut self, collection: Collection, id: &str, entity: Map<String, Value>) {
        self.entities
            .entry(collection)
            .or_default()
            .insert(id.to_string(), Value::Object(entity));
    }

    fn exists(&self, collection: Collection, id: &str) -> bool {
        self.stored(collection, id).is_some()
    }

    /// Fail with 422 when a referenced entity is missing
    fn require(&self, collection: Collection, id: &str) -> Result<()> {
        if self.exists(collection, id) {
            Ok(())
        } else {
            Err(unprocessable(format!(
                "The specified {} {} does not exist.",
                collection, id
            )))
        }
    }

    fn check_unique_name(&self, collection: Collection, name: &str, except: Option<&str>) -> Result<()> {
        let taken = self.table(collection).any(|(id, entity)| {
            Some(id.as_str()) != except && entity.get("name").and_then(Value::as_str) == Some(name)
        });
        if taken {
            return Err(unprocessable(format!("The name {} is already in use.", name)));
        }
        Ok(())
    }

    fn related(&self, collection: Collection, ids: &[String]) -> Value {
        Value::Array(
            ids.iter()
                .filter_map(|id| self.stored(collection, id))
                .map(|e| json!({"id": e["id"], "name": e["name"]}))
                .collect(),
        )
    }

    /// Ids of `owner` entities whose `field` array contains `id`
    fn owners_of(&self, owner: Collection, field: &str, id: &str) -> Vec<String> {
        self.table(owner)
            .filter(|(_, e)| string_list(e.get(field)).iter().any(|v| v == id))
            .map(|(owner_id, _)| owner_id.clone())
            .collect()
    }

    /// Entity as returned by a GET, with relations embedded
    fn render(&self, collection: Collection, id: &str) -> Result<Value> {
        let mut entity = self
            .stored(collection, id)
            .cloned()
            .ok_or_else(|| not_found(collection, id))?;
        let Some(map) = entity.as_object_mut() else {
            return Ok(entity);
        };

        match collection {
            Collection::HostGroup => {
                let hosts: Vec<String> = self
                    .table(Collection::Host)
                    .filter(|(_, h)| h.get("host_group_id").and_then(Value::as_str) == Some(id))
                    .map(|(host_id, _)| host_id.clone())
                    .collect();
                map.insert("hosts".into(), self.related(Collection::Host, &hosts));
            }
            Collection::Volume => {
                let groups = self.owners_of(Collection::VolumeGroup, "volume_ids", id);
                map.insert(
                    "volume_groups".into(),
                    self.related(Collection::VolumeGroup, &groups),
                );
                let mappings: Vec<Value> = self
                    .table(Collection::HostVolumeMapping)
                    .filter(|(_, m)| m.get("volume_id").and_then(Value::as_str) == Some(id))
                    .map(|(_, m)| m.clone())
                    .collect();
                map.insert("host_volume_mapping".into(), Value::Array(mappings));
            }
            Collection::VolumeGroup => {
                let members = string_list(map.remove("volume_ids").as_ref());
                map.insert("volumes".into(), self.related(Collection::Volume, &members));
            }
            Collection::Policy => {
                let snaps = string_list(map.remove("snapshot_rule_ids").as_ref());
                let reps = string_list(map.remove("replication_rule_ids").as_ref());
                map.insert(
                    "snapshot_rules".into(),
                    self.related(Collection::SnapshotRule, &snaps),
                );
                map.insert(
                    "replication_rules".into(),
                    self.related(Collection::ReplicationRule, &reps),
                );
            }
            Collection::SnapshotRule | Collection::ReplicationRule => {
                let field = if collection == Collection::SnapshotRule {
                    "snapshot_rule_ids"
                } else {
                    "replication_rule_ids"
                };
                let policies = self.owners_of(Collection::Policy, field, id);
                map.insert("policies".into(), self.related(Collection::Policy, &policies));
            }
            Collection::SmbShare => {
                map.remove("aces");
            }
            _ => {}
        }
        Ok(entity)
    }
}

// =============================================================================
// In-Memory Array
// =============================================================================

/// PowerStore array held in memory
pub struct InMemoryArray {
    state: RwLock<ArrayState>,
    calls: Mutex<Vec<String>>,
    failures: Mutex<Vec<String>>,
}

impl Default for InMemoryArray {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryArray {
    /// Create an array with only the cluster entry
    pub fn new() -> Self {
        let array = Self {
            state: RwLock::new(ArrayState::default()),
            calls: Mutex::new(Vec::new()),
            failures: Mutex::new(Vec::new()),
        };
        let now = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string();
        array.seed(
            Collection::Cluster,
            json!({"id": "0", "name": "PowerStore", "system_time": now}),
        );
        array
    }

    /// Create an array with a NAS server, a remote system and an appliance
    pub fn with_fixtures() -> Self {
        let array = Self::new();
        array.seed(
            Collection::NasServer,
            json!({"id": "nas-1", "name": "nas_server_1", "operational_status": "Started",
                   "current_node_id": "A1-NodeA", "preferred_node_id": "A1-NodeA"}),
        );
        array.seed(
            Collection::RemoteSystem,
            json!({"id": "6c4dc7a6-7a0c-4e2c-9c2f-3a3e0f1b2c4d", "name": "remote-array",
                   "serial_number": "PS000000000001", "management_address": "10.0.0.2",
                   "data_connection_state": "OK", "capabilities": ["Synchronous_Block_Replication"]}),
        );
        array.seed(
            Collection::Appliance,
            json!({"id": "A1", "name": "Appliance-WND8977", "model": "PowerStore 1000T",
                   "service_tag": "WND8977"}),
        );
        array
    }

    /// Insert an entity as-is, generating an id when it has none
    pub fn seed(&self, collection: Collection, entity: Value) -> String {
        let mut state = self.state.write();
        let mut map = match entity {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        let id = match map.get("id").and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => state.new_id(),
        };
        map.insert("id".into(), Value::String(id.clone()));
        state.insert(collection, &id, map);
        id
    }

    /// Raw stored entity, without relations
    pub fn entity(&self, collection: Collection, id: &str) -> Option<Value> {
        self.state.read().stored(collection, id).cloned()
    }

    /// Number of stored entities in a collection
    pub fn count(&self, collection: Collection) -> usize {
        self.state
            .read()
            .entities
            .get(&collection)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }

    /// Calls received so far, as `"<VERB> <path>"`
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    /// Calls that would change state on a real array
    pub fn mutating_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| !c.starts_with("GET ") && !c.starts_with("LIST "))
            .collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    /// Fail every later call whose `"<VERB> <path>"` starts with `prefix`
    pub fn fail_on(&self, prefix: impl Into<String>) {
        self.failures.lock().push(prefix.into());
    }

    fn record(&self, call: String) -> Result<()> {
        debug!("in-memory array: {}", call);
        let failing = self.failures.lock().iter().any(|f| call.starts_with(f.as_str()));
        self.calls.lock().push(call.clone());
        if failing {
            return Err(Error::Api {
                status: 500,
                message: format!("Injected failure for {}", call),
            });
        }
        Ok(())
    }

    // =========================================================================
    // Create
    // =========================================================================

    fn create_entity(&self, collection: Collection, body: Value) -> Result<String> {
        let mut body = into_object(body)?;
        let mut state = self.state.write();

        if let Some(name) = body.get("name").and_then(Value::as_str) {
            state.check_unique_name(collection, name, None)?;
        }
        let id = state.new_id();
        body.insert("id".into(), Value::String(id.clone()));

        match collection {
            Collection::FileSystem => {
                state.require(Collection::NasServer, &str_field(&body, "nas_server_id"))?;
                if let Some(policy) = opt_str(&body, "protection_policy_id") {
                    state.require(Collection::Policy, &policy)?;
                }
                if body.get("size_total").and_then(Value::as_i64).unwrap_or(0) <= 0 {
                    return Err(unprocessable("size_total must be greater than zero."));
                }
                let vmware = body.get("config_type").and_then(Value::as_str) == Some("VMware");
                defaults(
                    &mut body,
                    &[
                        ("description", json!("")),
                        ("filesystem_type", json!("Primary")),
                        ("parent_id", Value::Null),
                        ("size_used", json!(0)),
                        ("config_type", json!("General")),
                        ("access_policy", json!("Native")),
                        ("locking_policy", json!("Advisory")),
                        ("folder_rename_policy", json!("All_Forbidden")),
                        ("is_smb_sync_writes_enabled", json!(false)),
                        ("is_smb_no_notify_enabled", json!(false)),
                        ("is_smb_op_locks_enabled", json!(true)),
                        ("is_smb_notify_on_access_enabled", json!(false)),
                        ("is_smb_notify_on_write_enabled", json!(false)),
                        ("smb_notify_on_change_dir_depth", json!(512)),
                        ("is_async_MTime_enabled", json!(false)),
                        ("file_events_publishing_mode", json!("None")),
                        ("protection_policy_id", Value::Null),
                        ("host_io_size", if vmware { json!("VMware_8K") } else { Value::Null }),
                        ("creation_timestamp", json!(now())),
                    ],
                );
                let flr = body
                    .entry("flr_attributes")
                    .or_insert_with(|| json!({}));
                if let Some(flr) = flr.as_object_mut() {
                    defaults(
                        flr,
                        &[
                            ("mode", json!("None")),
                            ("minimum_retention", json!("1D")),
                            ("default_retention", json!("1Y")),
                            ("maximum_retention", json!("infinite")),
                        ],
                    );
                }
            }
            Collection::Host => {
                let initiators = body.remove("initiators").unwrap_or_else(|| json!([]));
                body.insert("host_initiators".into(), strip_initiators(&initiators));
                defaults(
                    &mut body,
                    &[
                        ("description", json!("")),
                        ("host_group_id", Value::Null),
                        ("host_connectivity", json!("Local_Only")),
                    ],
                );
            }
            Collection::HostGroup => {
                let host_ids = string_list(body.remove("host_ids").as_ref());
                for host_id in &host_ids {
                    state.require(Collection::Host, host_id)?;
                    let host = state.stored(Collection::Host, host_id);
                    if host.and_then(|h| h.get("host_group_id")).and_then(Value::as_str).is_some() {
                        return Err(unprocessable(format!(
                            "Host {} already belongs to a host group.",
                            host_id
                        )));
                    }
                }
                for host_id in &host_ids {
                    state
                        .stored_mut(Collection::Host, host_id)?
                        .insert("host_group_id".into(), Value::String(id.clone()));
                }
                defaults(
                    &mut body,
                    &[
                        ("description", json!("")),
                        ("host_connectivity", json!("Local_Only")),
                    ],
                );
            }
            Collection::NfsExport => {
                state.require(Collection::FileSystem, &str_field(&body, "file_system_id"))?;
                if !str_field(&body, "path").starts_with('/') {
                    return Err(unprocessable("The export path must start with '/'."));
                }
                defaults(
                    &mut body,
                    &[
                        ("description", json!("")),
                        ("default_access", json!("No_Access")),
                        ("min_security", json!("Sys")),
                        ("nfs_owner_username", json!("0")),
                        ("no_access_hosts", json!([])),
                        ("read_only_hosts", json!([])),
                        ("read_only_root_hosts", json!([])),
                        ("read_write_hosts", json!([])),
                        ("read_write_root_hosts", json!([])),
                        ("anonymous_UID", json!(-2)),
                        ("anonymous_GID", json!(-2)),
                        ("is_no_SUID", json!(false)),
                    ],
                );
            }
            Collection::SmbShare => {
                state.require(Collection::FileSystem, &str_field(&body, "file_system_id"))?;
                if !str_field(&body, "path").starts_with('/') {
                    return Err(unprocessable("The share path must start with '/'."));
                }
                defaults(
                    &mut body,
                    &[
                        ("description", json!("")),
                        ("is_continuous_availability_enabled", json!(false)),
                        ("is_encryption_enabled", json!(false)),
                        ("is_ABE_enabled", json!(false)),
                        ("is_branch_cache_enabled", json!(false)),
                        ("offline_availability", json!("Manual")),
                        ("umask", json!("022")),
                        (
                            "aces",
                            json!([{"trustee_name": "Everyone", "trustee_type": "WellKnown",
                                    "access_level": "Full", "access_type": "Allow"}]),
                        ),
                    ],
                );
            }
            Collection::Volume => {
                if body.get("size").and_then(Value::as_i64).unwrap_or(0) <= 0 {
                    return Err(unprocessable("size must be greater than zero."));
                }
                if let Some(policy) = opt_str(&body, "protection_policy_id") {
                    state.require(Collection::Policy, &policy)?;
                }
                let group = opt_str(&body, "volume_group_id");
                if let Some(group) = &group {
                    state.require(Collection::VolumeGroup, group)?;
                }
                let host = opt_str(&body, "host_id");
                let host_group = opt_str(&body, "host_group_id");
                if let Some(host) = &host {
                    state.require(Collection::Host, host)?;
                }
                if let Some(host_group) = &host_group {
                    state.require(Collection::HostGroup, host_group)?;
                }
                let lun = body.remove("logical_unit_number");
                for key in ["volume_group_id", "host_id", "host_group_id"] {
                    body.remove(key);
                }
                let n = state.next_id;
                defaults(
                    &mut body,
                    &[
                        ("description", json!("")),
                        ("type", json!("Primary")),
                        ("wwn", json!(format!("naa.68ccf09800{:022x}", n))),
                        ("nsid", json!(n)),
                        ("nguid", json!(format!("nguid.{:032x}", n))),
                        ("appliance_id", json!("A1")),
                        ("state", json!("Ready")),
                        ("logical_used", json!(0)),
                        ("node_affinity", json!("System_Select_At_Attach")),
                        ("creation_timestamp", json!(now())),
                        ("protection_policy_id", Value::Null),
                        ("performance_policy_id", json!("default_medium")),
                        ("is_replication_destination", json!(false)),
                        ("sector_size", json!(512)),
                        ("protection_data", json!({"parent_id": null, "source_id": null,
                                                   "creator_type": "User",
                                                   "expiration_timestamp": null})),
                    ],
                );
                if let Some(group) = group {
                    push_unique(state.stored_mut(Collection::VolumeGroup, &group)?, "volume_ids", &id);
                }
                if host.is_some() || host_group.is_some() {
                    let mapping_id = state.new_id();
                    let mapping = json!({
                        "id": mapping_id,
                        "volume_id": id,
                        "host_id": host,
                        "host_group_id": host_group,
                        "logical_unit_number": lun.and_then(|l| l.as_i64()).unwrap_or(1),
                    });
                    state.insert(Collection::HostVolumeMapping, &mapping_id, into_object(mapping)?);
                }
            }
            Collection::VolumeGroup => {
                let members = string_list(body.get("volume_ids"));
                for member in &members {
                    state.require(Collection::Volume, member)?;
                }
                if let Some(policy) = opt_str(&body, "protection_policy_id") {
                    state.require(Collection::Policy, &policy)?;
                }
                defaults(
                    &mut body,
                    &[
                        ("description", json!("")),
                        ("type", json!("Primary")),
                        ("volume_ids", json!([])),
                        ("creation_timestamp", json!(now())),
                        ("is_write_order_consistent", json!(true)),
                        ("protection_policy_id", Value::Null),
                        ("is_protectable", json!(true)),
                        ("is_replication_destination", json!(false)),
                        ("protection_data", json!({"parent_id": null, "source_id": null,
                                                   "creator_type": "User",
                                                   "expiration_timestamp": null})),
                    ],
                );
            }
            Collection::SnapshotRule => {
                normalize_time_of_day(&mut body);
                let daily = body.get("time_of_day").map(|v| !v.is_null()).unwrap_or(false);
                if daily {
                    body.insert("interval".into(), Value::Null);
                    defaults(&mut body, &[("timezone", json!("UTC"))]);
                } else {
                    defaults(&mut body, &[("time_of_day", Value::Null), ("timezone", Value::Null)]);
                }
                if string_list(body.get("days_of_week")).is_empty() {
                    body.insert("days_of_week".into(), json!(ALL_DAYS));
                }
                defaults(
                    &mut body,
                    &[
                        ("nas_access_type", json!("Protocol")),
                        ("is_read_only", json!(false)),
                        ("is_replica", json!(false)),
                        ("managed_by", json!("User")),
                        ("managed_by_id", Value::Null),
                    ],
                );
            }
            Collection::ReplicationRule => {
                state.require(Collection::RemoteSystem, &str_field(&body, "remote_system_id"))?;
                defaults(
                    &mut body,
                    &[
                        ("alert_threshold", json!(15)),
                        ("is_read_only", json!(false)),
                        ("is_replica", json!(false)),
                        ("managed_by", json!("User")),
                        ("managed_by_id", Value::Null),
                    ],
                );
            }
            Collection::Policy => {
                for rule in string_list(body.get("snapshot_rule_ids")) {
                    state.require(Collection::SnapshotRule, &rule)?;
                }
                for rule in string_list(body.get("replication_rule_ids")) {
                    state.require(Collection::ReplicationRule, &rule)?;
                }
                defaults(
                    &mut body,
                    &[
                        ("description", json!("")),
                        ("type", json!("Protection")),
                        ("managed_by", json!("User")),
                        ("managed_by_id", Value::Null),
                        ("is_read_only", json!(false)),
                        ("is_replica", json!(false)),
                        ("snapshot_rule_ids", json!([])),
                        ("replication_rule_ids", json!([])),
                    ],
                );
            }
            Collection::StorageContainer => {
                validate_container(&body)?;
                defaults(
                    &mut body,
                    &[
                        ("quota", json!(0)),
                        ("storage_protocol", json!("SCSI")),
                        ("high_water_mark", json!(0)),
                    ],
                );
            }
            _ => {}
        }

        state.insert(collection, &id, body);
        Ok(id)
    }

    // =========================================================================
    // Modify
    // =========================================================================

    fn modify_entity(&self, collection: Collection, id: &str, body: Value) -> Result<()> {
        let mut body = into_object(body)?;
        let mut state = self.state.write();

        if !state.exists(collection, id) {
            return Err(not_found(collection, id));
        }
        if let Some(name) = body.get("name").and_then(Value::as_str) {
            state.check_unique_name(collection, name, Some(id))?;
        }

        match collection {
            Collection::FileSystem => {
                normalize_expiration(&mut body, "expiration_timestamp");
                let flr = body.remove("flr_attributes");
                let entity = state.stored_mut(collection, id)?;
                if let Some(Value::Object(flr)) = flr {
                    let target = entity
                        .entry("flr_attributes")
                        .or_insert_with(|| json!({}));
                    if let Some(target) = target.as_object_mut() {
                        target.extend(flr);
                    }
                }
                entity.extend(body);
            }
            Collection::Host => {
                let add = body.remove("add_initiators");
                let remove = string_list(body.remove("remove_initiators").as_ref());
                let changed = body.remove("modify_initiators");
                let entity = state.stored_mut(collection, id)?;
                let mut initiators = entity
                    .get("host_initiators")
                    .and_then(Value::as_array)
                    .cloned()
                    .unwrap_or_default();

                initiators.retain(|i| {
                    let port = i.get("port_name").and_then(Value::as_str).unwrap_or_default();
                    !remove.iter().any(|r| r == port)
                });
                if let Some(Value::Array(added)) = add.as_ref().map(strip_initiators) {
                    initiators.extend(added);
                }
                if let Some(Value::Array(changes)) = changed {
                    for change in changes {
                        let port = change.get("port_name").cloned();
                        if let Some(target) = initiators.iter_mut().find(|i| i.get("port_name") == port.as_ref()) {
                            for key in ["chap_single_username", "chap_mutual_username"] {
                                if let (Some(value), Some(target)) = (change.get(key), target.as_object_mut()) {
                                    target.insert(key.into(), value.clone());
                                }
                            }
                        }
                    }
                }
                entity.insert("host_initiators".into(), Value::Array(initiators));
                drop_empty(&mut body, &["name", "host_connectivity"]);
                entity.extend(body);
            }
            Collection::HostGroup => {
                let add = string_list(body.remove("add_host_ids").as_ref());
                let remove = string_list(body.remove("remove_host_ids").as_ref());
                for host_id in add.iter().chain(remove.iter()) {
                    state.require(Collection::Host, host_id)?;
                }
                for host_id in &remove {
                    state
                        .stored_mut(Collection::Host, host_id)?
                        .insert("host_group_id".into(), Value::Null);
                }
                for host_id in &add {
                    state
                        .stored_mut(Collection::Host, host_id)?
                        .insert("host_group_id".into(), Value::String(id.to_string()));
                }
                drop_empty(&mut body, &["name", "host_connectivity"]);
                state.stored_mut(collection, id)?.extend(body);
            }
            Collection::NfsExport => {
                let entity = state.stored_mut(collection, id)?;
                for list in [
                    "no_access_hosts",
                    "read_only_hosts",
                    "read_only_root_hosts",
                    "read_write_hosts",
                    "read_write_root_hosts",
                ] {
                    if let Some(added) = body.remove(&format!("add_{}", list)) {
                        for host in string_list(Some(&added)) {
                            push_unique(entity, list, &host);
                        }
                    }
                    if let Some(removed) = body.remove(&format!("remove_{}", list)) {
                        let removed = string_list(Some(&removed));
                        let kept: Vec<String> = string_list(entity.get(list))
                            .into_iter()
                            .filter(|h| !removed.contains(h))
                            .collect();
                        entity.insert(list.into(), json!(kept));
                    }
                }
                entity.extend(body);
            }
            Collection::Volume => {
                if let Some(size) = body.get("size").and_then(Value::as_i64) {
                    let current = state
                        .stored(collection, id)
                        .and_then(|v| v.get("size"))
                        .and_then(Value::as_i64)
                        .unwrap_or(0);
                    if size < current {
                        return Err(unprocessable("The new size must be larger than the current size."));
                    }
                }
                if let Some(policy) = opt_str(&body, "protection_policy_id") {
                    state.require(Collection::Policy, &policy)?;
                }
                move_expiration_into_protection_data(state.stored_mut(collection, id)?, &mut body);
                unassign_empty(&mut body, "protection_policy_id");
                state.stored_mut(collection, id)?.extend(body);
            }
            Collection::VolumeGroup => {
                if let Some(policy) = opt_str(&body, "protection_policy_id") {
                    state.require(Collection::Policy, &policy)?;
                }
                move_expiration_into_protection_data(state.stored_mut(collection, id)?, &mut body);
                unassign_empty(&mut body, "protection_policy_id");
                state.stored_mut(collection, id)?.extend(body);
            }
            Collection::SnapshotRule => {
                normalize_time_of_day(&mut body);
                let entity = state.stored_mut(collection, id)?;
                if body.get("interval").map(|v| !v.is_null()).unwrap_or(false) {
                    entity.insert("time_of_day".into(), Value::Null);
                    entity.insert("timezone".into(), Value::Null);
                }
                if body.get("time_of_day").map(|v| !v.is_null()).unwrap_or(false) {
                    entity.insert("interval".into(), Value::Null);
                }
                entity.extend(body);
            }
            Collection::ReplicationRule => {
                if let Some(remote) = opt_str(&body, "remote_system_id") {
                    state.require(Collection::RemoteSystem, &remote)?;
                }
                state.stored_mut(collection, id)?.extend(body);
            }
            Collection::Policy => {
                let edits = [
                    ("snapshot_rule_ids", Collection::SnapshotRule),
                    ("replication_rule_ids", Collection::ReplicationRule),
                ];
                for (field, rules) in edits {
                    let add = string_list(body.remove(&format!("add_{}", field)).as_ref());
                    let remove = string_list(body.remove(&format!("remove_{}", field)).as_ref());
                    for rule in &add {
                        state.require(rules, rule)?;
                    }
                    let entity = state.stored_mut(collection, id)?;
                    let mut current = string_list(entity.get(field));
                    current.retain(|r| !remove.contains(r));
                    for rule in add {
                        if !current.contains(&rule) {
                            current.push(rule);
                        }
                    }
                    entity.insert(field.into(), json!(current));
                }
                state.stored_mut(collection, id)?.extend(body);
            }
            Collection::StorageContainer => {
                validate_container(&body)?;
                state.stored_mut(collection, id)?.extend(body);
            }
            _ => {
                state.stored_mut(collection, id)?.extend(body);
            }
        }
        Ok(())
    }

    // =========================================================================
    // Delete
    // =========================================================================

    fn delete_entity(&self, collection: Collection, id: &str) -> Result<()> {
        let mut state = self.state.write();
        if !state.exists(collection, id) {
            return Err(not_found(collection, id));
        }

        match collection {
            Collection::HostGroup => {
                let has_hosts = state
                    .table(Collection::Host)
                    .any(|(_, h)| h.get("host_group_id").and_then(Value::as_str) == Some(id));
                if has_hosts {
                    return Err(unprocessable("The host group still contains hosts."));
                }
            }
            Collection::Host => {
                if state
                    .stored(collection, id)
                    .and_then(|h| h.get("host_group_id"))
                    .and_then(Value::as_str)
                    .is_some()
                {
                    return Err(unprocessable("The host is a member of a host group."));
                }
            }
            Collection::Volume => {
                let mapped = state
                    .table(Collection::HostVolumeMapping)
                    .any(|(_, m)| m.get("volume_id").and_then(Value::as_str) == Some(id));
                if mapped {
                    return Err(unprocessable("The volume is mapped to a host."));
                }
                if !state.owners_of(Collection::VolumeGroup, "volume_ids", id).is_empty() {
                    return Err(unprocessable("The volume is a member of a volume group."));
                }
                if opt_str_value(state.stored(collection, id), "protection_policy_id").is_some() {
                    return Err(unprocessable("The volume is protected by a policy."));
                }
            }
            Collection::SnapshotRule => {
                if !state.owners_of(Collection::Policy, "snapshot_rule_ids", id).is_empty() {
                    return Err(unprocessable("The snapshot rule is used by a protection policy."));
                }
            }
            Collection::ReplicationRule => {
                if !state.owners_of(Collection::Policy, "replication_rule_ids", id).is_empty() {
                    return Err(unprocessable("The replication rule is used by a protection policy."));
                }
            }
            Collection::Policy => {
                let in_use = [Collection::Volume, Collection::VolumeGroup, Collection::FileSystem]
                    .into_iter()
                    .any(|c| {
                        state.table(c).any(|(_, e)| {
                            e.get("protection_policy_id").and_then(Value::as_str) == Some(id)
                        })
                    });
                if in_use {
                    return Err(unprocessable("The protection policy is assigned to storage resources."));
                }
            }
            Collection::FileSystem => {
                for child in [Collection::NfsExport, Collection::SmbShare] {
                    let ids: Vec<String> = state
                        .table(child)
                        .filter(|(_, e)| e.get("file_system_id").and_then(Value::as_str) == Some(id))
                        .map(|(child_id, _)| child_id.clone())
                        .collect();
                    if let Some(table) = state.entities.get_mut(&child) {
                        for child_id in ids {
                            table.remove(&child_id);
                        }
                    }
                }
            }
            _ => {}
        }

        if let Some(table) = state.entities.get_mut(&collection) {
            table.remove(id);
        }
        Ok(())
    }

    // =========================================================================
    // Actions
    // =========================================================================

    fn run_action(&self, collection: Collection, id: &str, action: &str, body: Value) -> Result<Value> {
        let body = into_object(body)?;
        if !self.state.read().exists(collection, id) {
            return Err(not_found(collection, id));
        }

        match (collection, action) {
            (Collection::FileSystem, "snapshot") => {
                let parent = self.entity(collection, id).unwrap_or_default();
                let mut snap = body;
                normalize_expiration(&mut snap, "expiration_timestamp");
                defaults(
                    &mut snap,
                    &[
                        ("name", json!(format!("snap-{}", now()))),
                        ("description", json!("")),
                        ("access_type", json!("Snapshot")),
                        ("creator_type", json!("User")),
                        ("expiration_timestamp", Value::Null),
                    ],
                );
                for key in ["nas_server_id", "size_total", "config_type", "access_policy",
                            "locking_policy", "folder_rename_policy", "flr_attributes"] {
                    if let Some(value) = parent.get(key) {
                        snap.insert(key.into(), value.clone());
                    }
                }
                snap.insert("filesystem_type".into(), json!("Snapshot"));
                snap.insert("parent_id".into(), json!(id));
                let new_id = self.insert_snapshot(collection, snap)?;
                Ok(json!({"id": new_id}))
            }
            (Collection::Volume, "snapshot") | (Collection::VolumeGroup, "snapshot") => {
                let parent = self.entity(collection, id).unwrap_or_default();
                let mut snap = body;
                normalize_expiration(&mut snap, "expiration_timestamp");
                let expiration = snap.remove("expiration_timestamp").unwrap_or(Value::Null);
                let creator = snap.remove("creator_type").unwrap_or_else(|| json!("User"));
                defaults(&mut snap, &[("description", json!(""))]);
                let copied: &[&str] = if collection == Collection::Volume {
                    &["size", "appliance_id", "wwn", "sector_size"]
                } else {
                    &["is_write_order_consistent"]
                };
                for key in copied {
                    if let Some(value) = parent.get(*key) {
                        snap.insert((*key).into(), value.clone());
                    }
                }
                if collection == Collection::Volume {
                    defaults(&mut snap, &[("performance_policy_id", json!("default_medium"))]);
                } else {
                    snap.insert("volume_ids".into(), json!([]));
                }
                snap.insert("type".into(), json!("Snapshot"));
                snap.insert("state".into(), json!("Ready"));
                snap.insert("creation_timestamp".into(), json!(now()));
                snap.insert("protection_policy_id".into(), Value::Null);
                snap.insert(
                    "protection_data".into(),
                    json!({"parent_id": id, "source_id": id, "creator_type": creator,
                           "expiration_timestamp": expiration}),
                );
                let new_id = self.insert_snapshot(collection, snap)?;
                Ok(json!({"id": new_id}))
            }
            (Collection::SmbShare, "get_acl") => {
                let aces = self
                    .entity(collection, id)
                    .and_then(|e| e.get("aces").cloned())
                    .unwrap_or_else(|| json!([]));
                Ok(json!({"aces": aces}))
            }
            (Collection::SmbShare, "set_acl") => {
                let aces = body.get("aces").cloned().unwrap_or_else(|| json!([]));
                for ace in aces.as_array().into_iter().flatten() {
                    if ace.get("trustee_name").and_then(Value::as_str).unwrap_or_default().is_empty() {
                        return Err(unprocessable("Every ACE needs a trustee name."));
                    }
                }
                let mut state = self.state.write();
                state.stored_mut(collection, id)?.insert("aces".into(), aces);
                Ok(Value::Null)
            }
            (Collection::Volume, "attach") => {
                let mut state = self.state.write();
                let host = opt_str(&body, "host_id");
                let host_group = opt_str(&body, "host_group_id");
                match (&host, &host_group) {
                    (Some(h), None) => state.require(Collection::Host, h)?,
                    (None, Some(g)) => state.require(Collection::HostGroup, g)?,
                    _ => return Err(unprocessable("Exactly one of host_id or host_group_id is required.")),
                }
                let mapped = state.table(Collection::HostVolumeMapping).any(|(_, m)| {
                    m.get("volume_id").and_then(Value::as_str) == Some(id)
                        && (opt_str_value(Some(m), "host_id") == host
                            && opt_str_value(Some(m), "host_group_id") == host_group)
                });
                if mapped {
                    return Err(unprocessable("The volume is already attached."));
                }
                let mapping_id = state.new_id();
                let mapping = json!({
                    "id": mapping_id,
                    "volume_id": id,
                    "host_id": host,
                    "host_group_id": host_group,
                    "logical_unit_number": body.get("logical_unit_number").and_then(Value::as_i64).unwrap_or(1),
                });
                state.insert(Collection::HostVolumeMapping, &mapping_id, into_object(mapping)?);
                Ok(Value::Null)
            }
            (Collection::Volume, "detach") => {
                let mut state = self.state.write();
                let host = opt_str(&body, "host_id");
                let host_group = opt_str(&body, "host_group_id");
                let matching: Vec<String> = state
                    .table(Collection::HostVolumeMapping)
                    .filter(|(_, m)| {
                        m.get("volume_id").and_then(Value::as_str) == Some(id)
                            && ((host.is_some() && opt_str_value(Some(m), "host_id") == host)
                                || (host_group.is_some()
                                    && opt_str_value(Some(m), "host_group_id") == host_group))
                    })
                    .map(|(mapping_id, _)| mapping_id.clone())
                    .collect();
                if matching.is_empty() {
                    return Err(unprocessable("The volume is not attached to the given host."));
                }
                if let Some(table) = state.entities.get_mut(&Collection::HostVolumeMapping) {
                    for mapping_id in matching {
                        table.remove(&mapping_id);
                    }
                }
                Ok(Value::Null)
            }
            (Collection::VolumeGroup, "add_members") | (Collection::VolumeGroup, "remove_members") => {
                let mut state = self.state.write();
                let members = string_list(body.get("volume_ids"));
                for member in &members {
                    state.require(Collection::Volume, member)?;
                }
                let group = state.stored_mut(collection, id)?;
                if action == "add_members" {
                    for member in &members {
                        push_unique(group, "volume_ids", member);
                    }
                } else {
                    let kept: Vec<String> = string_list(group.get("volume_ids"))
                        .into_iter()
                        .filter(|v| !members.contains(v))
                        .collect();
                    group.insert("volume_ids".into(), json!(kept));
                }
                Ok(Value::Null)
            }
            _ => Err(Error::Api {
                status: 400,
                message: format!("Unsupported action {} on {}", action, collection),
            }),
        }
    }

    fn insert_snapshot(&self, collection: Collection, mut snap: Map<String, Value>) -> Result<String> {
        let mut state = self.state.write();
        if let Some(name) = snap.get("name").and_then(Value::as_str) {
            state.check_unique_name(collection, name, None)?;
        }
        let id = state.new_id();
        snap.insert("id".into(), Value::String(id.clone()));
        state.insert(collection, &id, snap);
        Ok(id)
    }

    fn list_entities(&self, collection: Collection, query: &ListQuery) -> Result<Vec<Value>> {
        let filters = query
            .params
            .iter()
            .filter(|(k, _)| !matches!(k.as_str(), "select" | "limit" | "offset" | "order"))
            .map(|(k, v)| Filter::parse(k, v))
            .collect::<Result<Vec<_>>>()?;

        let state = self.state.read();
        let ids: Vec<String> = state.table(collection).map(|(id, _)| id.clone()).collect();
        let mut out = Vec::new();
        for id in ids {
            let entity = state.render(collection, &id)?;
            if filters.iter().all(|f| f.matches(&entity)) {
                out.push(entity);
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl PowerStoreApi for InMemoryArray {
    async fn create(&self, collection: Collection, body: Value) -> Result<String> {
        self.record(format!("POST {}", collection))?;
        self.create_entity(collection, body)
    }

    async fn get(&self, collection: Collection, id: &str) -> Result<Value> {
        self.record(format!("GET {}/{}", collection, id))?;
        self.state.read().render(collection, id)
    }

    async fn list(&self, collection: Collection, query: &ListQuery) -> Result<Vec<Value>> {
        self.record(format!("LIST {}", collection))?;
        self.list_entities(collection, query)
    }

    async fn modify(&self, collection: Collection, id: &str, body: Value) -> Result<()> {
        self.record(format!("PATCH {}/{}", collection, id))?;
        self.modify_entity(collection, id, body)
    }

    async fn delete(&self, collection: Collection, id: &str, body: Option<Value>) -> Result<()> {
        match body {
            Some(body) => self.record(format!("DELETE {}/{} {}", collection, id, body))?,
            None => self.record(format!("DELETE {}/{}", collection, id))?,
        }
        self.delete_entity(collection, id)
    }

    async fn action(
        &self,
        collection: Collection,
        id: &str,
        action: &str,
        body: Value,
    ) -> Result<Value> {
        self.record(format!("POST {}/{}/{}", collection, id, action))?;
        self.run_action(collection, id, action, body)
    }

    fn backend_name(&self) -> &str {
        "in-memory"
    }
}

// =============================================================================
// List Filters
// =============================================================================

enum FilterOp {
    Eq(String),
    Neq(String),
    In(Vec<String>),
    Like(String),
}

struct Filter {
    field: String,
    op: FilterOp,
}

impl Filter {
    fn parse(field: &str, raw: &str) -> Result<Self> {
        let (op, value) = raw.split_once('.').ok_or_else(|| Error::Api {
            status: 400,
            message: format!("Invalid filter {}={}", field, raw),
        })?;
        let op = match op {
            "eq" => FilterOp::Eq(value.to_string()),
            "neq" => FilterOp::Neq(value.to_string()),
            "in" => FilterOp::In(
                value
                    .trim_start_matches('(')
                    .trim_end_matches(')')
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .collect(),
            ),
            "like" | "ilike" => FilterOp::Like(value.to_lowercase()),
            other => {
                return Err(Error::Api {
                    status: 400,
                    message: format!("Unsupported filter operator {}", other),
                })
            }
        };
        Ok(Self {
            field: field.to_string(),
            op,
        })
    }

    fn matches(&self, entity: &Value) -> bool {
        let actual = match entity.get(&self.field) {
            Some(Value::String(s)) => s.clone(),
            Some(Value::Null) | None => "null".to_string(),
            Some(other) => other.to_string(),
        };
        match &self.op {
            FilterOp::Eq(v) => &actual == v,
            FilterOp::Neq(v) => &actual != v,
            FilterOp::In(values) => values.contains(&actual),
            FilterOp::Like(pattern) => like(&actual.to_lowercase(), pattern),
        }
    }
}

/// `*` matches any run of characters
fn like(value: &str, pattern: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return value == pattern;
    }
    let mut rest = value;
    for (i, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if i == 0 {
            match rest.strip_prefix(part) {
                Some(r) => rest = r,
                None => return false,
            }
        } else if i == parts.len() - 1 {
            return rest.ends_with(part);
        } else {
            match rest.find(part) {
                Some(pos) => rest = &rest[pos + part.len()..],
                None => return false,
            }
        }
    }
    true
}

// =============================================================================
// Helpers
// =============================================================================

fn not_found(collection: Collection, id: &str) -> Error {
    Error::NotFound {
        kind: collection.to_string(),
        id: id.to_string(),
    }
}

fn unprocessable(message: impl Into<String>) -> Error {
    Error::Api {
        status: 422,
        message: message.into(),
    }
}

fn now() -> String {
    chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.6f+00:00").to_string()
}

fn into_object(value: Value) -> Result<Map<String, Value>> {
    match value {
        Value::Object(map) => Ok(map),
        Value::Null => Ok(Map::new()),
        other => Err(Error::Api {
            status: 400,
            message: format!("Expected a JSON object body, got {}", other),
        }),
    }
}

/// Fill missing or null keys
fn defaults(map: &mut Map<String, Value>, values: &[(&str, Value)]) {
    for (key, value) in values {
        match map.get(*key) {
            Some(existing) if !existing.is_null() => {}
            _ => {
                map.insert((*key).to_string(), value.clone());
            }
        }
    }
}

/// Empty strings in a modify body leave the current value alone
fn drop_empty(map: &mut Map<String, Value>, keys: &[&str]) {
    for key in keys {
        if map.get(*key).and_then(Value::as_str) == Some("") {
            map.remove(*key);
        }
    }
}

/// An empty id in a modify body unassigns the relation
fn unassign_empty(map: &mut Map<String, Value>, key: &str) {
    if map.get(key).and_then(Value::as_str) == Some("") {
        map.insert(key.to_string(), Value::Null);
    }
}

fn str_field(map: &Map<String, Value>, key: &str) -> String {
    map.get(key).and_then(Value::as_str).unwrap_or_default().to_string()
}

fn opt_str(map: &Map<String, Value>, key: &str) -> Option<String> {
    map.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn opt_str_value(value: Option<&Value>, key: &str) -> Option<String> {
    value.and_then(Value::as_object).and_then(|m| opt_str(m, key))
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

fn push_unique(map: &mut Map<String, Value>, key: &str, item: &str) {
    let mut items = string_list(map.get(key));
    if !items.iter().any(|i| i == item) {
        items.push(item.to_string());
    }
    map.insert(key.to_string(), json!(items));
}

/// Drop CHAP secrets, which the array never returns
fn strip_initiators(initiators: &Value) -> Value {
    Value::Array(
        initiators
            .as_array()
            .into_iter()
            .flatten()
            .map(|i| {
                let port_name = i.get("port_name").and_then(Value::as_str).unwrap_or_default();
                json!({
                    "port_name": port_name,
                    "port_type": port_type_of(port_name),
                    "chap_single_username": i.get("chap_single_username").cloned().unwrap_or(Value::Null),
                    "chap_mutual_username": i.get("chap_mutual_username").cloned().unwrap_or(Value::Null),
                })
            })
            .collect(),
    )
}

/// Protocol implied by the initiator name
fn port_type_of(port_name: &str) -> &'static str {
    if port_name.starts_with("iqn") {
        "iSCSI"
    } else if port_name.starts_with("nqn") {
        "NVMe"
    } else {
        "FC"
    }
}

/// The array reports `hh:mm:ss`
/// Protocol and high water mark ranges enforced by the array
fn validate_container(map: &Map<String, Value>) -> Result<()> {
    if let Some(protocol) = map.get("storage_protocol").and_then(Value::as_str) {
        if protocol != "SCSI" && protocol != "NVMe" {
            return Err(Error::Api {
                status: 400,
                message: format!("Invalid storage_protocol {}.", protocol),
            });
        }
    }
    if let Some(mark) = map.get("high_water_mark").and_then(Value::as_i64) {
        if !(0..=100).contains(&mark) {
            return Err(unprocessable("high_water_mark must be between 0 and 100."));
        }
    }
    if map.get("quota").and_then(Value::as_i64).unwrap_or(0) < 0 {
        return Err(unprocessable("quota must not be negative."));
    }
    Ok(())
}

fn normalize_time_of_day(map: &mut Map<String, Value>) {
    if let Some(Value::String(time)) = map.get_mut("time_of_day") {
        if time.split(':').count() == 2 {
            time.push_str(":00");
        }
    }
}

/// The array reports UTC offsets instead of `Z`; the epoch clears the value
fn normalize_expiration(map: &mut Map<String, Value>, key: &str) {
    let Some(Value::String(ts)) = map.get(key).cloned() else {
        return;
    };
    if ts.is_empty() || ts.starts_with("1970-01-01") {
        map.insert(key.to_string(), Value::Null);
    } else if let Some(stripped) = ts.strip_suffix('Z') {
        let base = stripped.split('.').next().unwrap_or(stripped);
        map.insert(key.to_string(), json!(format!("{}+00:00", base)));
    }
}

fn move_expiration_into_protection_data(entity: &mut Map<String, Value>, body: &mut Map<String, Value>) {
    if !body.contains_key("expiration_timestamp") {
        return;
    }
    normalize_expiration(body, "expiration_timestamp");
    let expiration = body.remove("expiration_timestamp").unwrap_or(Value::Null);
    let data = entity
        .entry("protection_data")
        .or_insert_with(|| json!({}));
    if let Some(data) = data.as_object_mut() {
        data.insert("expiration_timestamp".into(), expiration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_system_defaults_and_references() {
        let array = InMemoryArray::with_fixtures();

        let missing = array
            .create(
                Collection::FileSystem,
                json!({"name": "fs", "nas_server_id": "nope", "size_total": 1024}),
            )
            .await;
        assert!(matches!(missing, Err(Error::Api { status: 422, .. })));

        let id = array
            .create(
                Collection::FileSystem,
                json!({"name": "fs", "nas_server_id": "nas-1", "size_total": 1 << 30}),
            )
            .await
            .unwrap();
        let fs = array.get(Collection::FileSystem, &id).await.unwrap();
        assert_eq!(fs["filesystem_type"], "Primary");
        assert_eq!(fs["flr_attributes"]["maximum_retention"], "infinite");

        let dup = array
            .create(
                Collection::FileSystem,
                json!({"name": "fs", "nas_server_id": "nas-1", "size_total": 1 << 30}),
            )
            .await;
        assert!(dup.is_err());
    }

    #[tokio::test]
    async fn test_snapshot_timestamps() {
        let array = InMemoryArray::with_fixtures();
        let fs = array
            .create(
                Collection::FileSystem,
                json!({"name": "fs", "nas_server_id": "nas-1", "size_total": 1 << 30}),
            )
            .await
            .unwrap();

        let created = array
            .action(
                Collection::FileSystem,
                &fs,
                "snapshot",
                json!({"name": "snap", "expiration_timestamp": "2030-01-01T10:00:00Z"}),
            )
            .await
            .unwrap();
        let snap_id = created["id"].as_str().unwrap().to_string();
        let snap = array.get(Collection::FileSystem, &snap_id).await.unwrap();
        assert_eq!(snap["parent_id"], fs.as_str());
        assert_eq!(snap["expiration_timestamp"], "2030-01-01T10:00:00+00:00");

        let snaps = array
            .list(
                Collection::FileSystem,
                &ListQuery::new().eq("filesystem_type", "Snapshot"),
            )
            .await
            .unwrap();
        assert_eq!(snaps.len(), 1);
    }

    #[tokio::test]
    async fn test_host_group_membership() {
        let array = InMemoryArray::new();
        let host = array
            .create(Collection::Host, json!({"name": "h1", "os_type": "Linux"}))
            .await
            .unwrap();
        let group = array
            .create(Collection::HostGroup, json!({"name": "g1", "host_ids": [&host]}))
            .await
            .unwrap();

        let rendered = array.get(Collection::HostGroup, &group).await.unwrap();
        assert_eq!(rendered["hosts"][0]["id"], host.as_str());

        assert!(array.delete(Collection::HostGroup, &group, None).await.is_err());
        array
            .modify(Collection::HostGroup, &group, json!({"remove_host_ids": [&host]}))
            .await
            .unwrap();
        array.delete(Collection::HostGroup, &group, None).await.unwrap();
    }

    #[tokio::test]
    async fn test_storage_container_defaults_and_ranges() {
        let array = InMemoryArray::new();
        let id = array
            .create(Collection::StorageContainer, json!({"name": "sc1"}))
            .await
            .unwrap();
        let container = array.get(Collection::StorageContainer, &id).await.unwrap();
        assert_eq!(container["quota"], 0);
        assert_eq!(container["storage_protocol"], "SCSI");

        let bad_mark = array
            .modify(Collection::StorageContainer, &id, json!({"high_water_mark": 120}))
            .await;
        assert!(matches!(bad_mark, Err(Error::Api { status: 422, .. })));
        let bad_protocol = array
            .create(Collection::StorageContainer, json!({"name": "sc2", "storage_protocol": "iSCSI"}))
            .await;
        assert!(matches!(bad_protocol, Err(Error::Api { status: 400, .. })));
    }

    #[tokio::test]
    async fn test_injected_failure() {
        let array = InMemoryArray::new();
        array.fail_on("POST host");
        let err = array
            .create(Collection::Host, json!({"name": "h1"}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Api { status: 500, .. }));
        assert_eq!(array.count(Collection::Host), 0);
    }

    #[test]
    fn test_like_patterns() {
        assert!(like("fs_data_01", "fs*"));
        assert!(like("fs_data_01", "*01"));
        assert!(like("fs_data_01", "*data*"));
        assert!(!like("fs_data_01", "vol*"));
    }
}
