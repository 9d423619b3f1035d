//! `powerstore_volume`
//!
//! Besides the volume itself this resource owns the volume's host (or host
//! group) mapping and its volume group membership. Every related entity
//! may be named by id or by name; names are resolved before any call.

use super::volume_snapshot::PERFORMANCE_POLICIES;
use super::{id_of, non_empty, non_empty_str, Messages};
use crate::client::{
    Appliance, Host, HostGroup, PowerStoreClient, ProtectionPolicy, Volume, VolumeGroup,
};
use crate::domain::ports::Collection;
use crate::domain::units::{from_bytes, to_bytes, CapacityUnit};
use crate::error::{Error, Result};
use crate::framework::{Attribute, Resource, Schema, Validator};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

const MESSAGES: Messages = Messages("volume");

const DEFAULT_SECTOR_SIZE: i64 = 512;

pub(crate) const APP_TYPES: &[&str] = &[
    "Relational_Databases_Other",
    "Relational_Databases_Oracle",
    "Relational_Databases_SQL_Server",
    "Relational_Databases_PostgreSQL",
    "Relational_Databases_MySQL",
    "Relational_Databases_IBM_DB2",
    "Big_Data_Analytics_Other",
    "Big_Data_Analytics_MongoDB",
    "Big_Data_Analytics_Cassandra",
    "Big_Data_Analytics_SAP_HANA",
    "Big_Data_Analytics_Spark",
    "Big_Data_Analytics_Splunk",
    "Big_Data_Analytics_ElasticSearch",
    "Business_Applications_Other",
    "Business_Applications_ERP_SAP",
    "Business_Applications_CRM",
    "Business_Applications_Exchange",
    "Business_Applications_Sharepoint",
    "Healthcare_Other",
    "Healthcare_Epic",
    "Healthcare_MEDITECH",
    "Healthcare_Allscripts",
    "Healthcare_Cerner",
    "Virtualization_Other",
    "Virtualization_Virtual_Servers_VSI",
    "Virtualization_Containers_Kubernetes",
    "Virtualization_Virtual_Desktops_VDI",
    "Other",
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeState {
    pub id: Option<String>,
    pub name: Option<String>,
    pub size: Option<f64>,
    pub capacity_unit: Option<String>,
    pub description: Option<String>,
    pub host_id: Option<String>,
    pub host_name: Option<String>,
    pub host_group_id: Option<String>,
    pub host_group_name: Option<String>,
    pub logical_unit_number: Option<i64>,
    pub volume_group_id: Option<String>,
    pub volume_group_name: Option<String>,
    pub sector_size: Option<i64>,
    pub appliance_id: Option<String>,
    pub appliance_name: Option<String>,
    pub protection_policy_id: Option<String>,
    pub protection_policy_name: Option<String>,
    pub performance_policy_id: Option<String>,
    pub app_type: Option<String>,
    pub app_type_other: Option<String>,
    pub creation_timestamp: Option<String>,
    pub is_replication_destination: Option<bool>,
    pub node_affinity: Option<String>,
    #[serde(rename = "type")]
    pub volume_type: Option<String>,
    pub wwn: Option<String>,
    pub state: Option<String>,
    pub nguid: Option<String>,
    pub nsid: Option<i64>,
    pub logical_used: Option<i64>,
}

impl VolumeState {
    /// Names are not reported by the array and are carried from `known`
    fn from_response(volume: Volume, known: &VolumeState) -> Self {
        let (size, unit) = from_bytes(volume.size);
        let mapping = volume.host_volume_mapping.first();
        Self {
            id: Some(volume.id),
            name: Some(volume.name),
            size: Some(size),
            capacity_unit: Some(unit.to_string()),
            description: Some(volume.description),
            host_id: mapping.and_then(|m| m.host_id.clone()),
            host_name: known.host_name.clone(),
            host_group_id: mapping.and_then(|m| m.host_group_id.clone()),
            host_group_name: known.host_group_name.clone(),
            logical_unit_number: mapping.map(|m| m.logical_unit_number),
            volume_group_id: volume.volume_groups.first().map(|g| g.id.clone()),
            volume_group_name: known.volume_group_name.clone(),
            sector_size: Some(volume.sector_size),
            appliance_id: Some(volume.appliance_id),
            appliance_name: known.appliance_name.clone(),
            protection_policy_id: volume.protection_policy_id.and_then(non_empty_str),
            protection_policy_name: known.protection_policy_name.clone(),
            performance_policy_id: Some(volume.performance_policy_id),
            app_type: volume.app_type.and_then(non_empty_str),
            app_type_other: volume.app_type_other.and_then(non_empty_str),
            creation_timestamp: Some(volume.creation_timestamp),
            is_replication_destination: Some(volume.is_replication_destination),
            node_affinity: Some(volume.node_affinity),
            volume_type: Some(volume.volume_type),
            wwn: Some(volume.wwn),
            state: Some(volume.state),
            nguid: Some(volume.nguid),
            nsid: Some(volume.nsid),
            logical_used: Some(volume.logical_used),
        }
    }

    fn size_in_bytes(&self) -> std::result::Result<i64, String> {
        let unit = self.capacity_unit.as_deref().unwrap_or("GB");
        to_bytes(self.size.unwrap_or_default(), unit).map_err(|_| "Invalid Capacity unit".to_string())
    }

    /// Where the volume should be mapped, as `(host_id, host_group_id)`
    fn mapping(&self) -> (Option<String>, Option<String>) {
        (non_empty(&self.host_id), non_empty(&self.host_group_id))
    }
}

#[derive(Debug, Serialize)]
struct VolumeCreate {
    name: String,
    size: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    appliance_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    volume_group_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    sector_size: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    protection_policy_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    performance_policy_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    app_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    app_type_other: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    host_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    host_group_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    logical_unit_number: Option<i64>,
}

/// An empty `protection_policy_id` unassigns the policy
#[derive(Debug, Serialize)]
struct VolumeModify {
    name: String,
    size: i64,
    protection_policy_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    performance_policy_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    app_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    app_type_other: Option<String>,
}

#[derive(Debug, Default, Serialize)]
struct MappingChange {
    #[serde(skip_serializing_if = "Option::is_none")]
    host_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    host_group_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    logical_unit_number: Option<i64>,
}

/// Outcome of the independent steps of an update
#[derive(Debug, Default)]
struct UpdateReport {
    updated: Vec<&'static str>,
    failed: Vec<&'static str>,
    errors: Vec<String>,
}

impl UpdateReport {
    fn record(&mut self, step: &'static str, failure: &'static str, outcome: Result<()>) {
        match outcome {
            Ok(()) => self.updated.push(step),
            Err(err) => {
                warn!("Volume update step '{}' failed: {}", failure, err);
                self.failed.push(failure);
                self.errors.push(format!("Failed to {}: {}", failure, err));
            }
        }
    }

    fn into_result(self) -> Result<()> {
        if self.failed.is_empty() {
            return Ok(());
        }
        Err(Error::operation_msg(
            format!(
                "Failed to update all parameters of Volume, updated parameters are {:?} \
                 and parameters failed to update are {:?}",
                self.updated, self.failed
            ),
            self.errors.join(",\n"),
        ))
    }
}

pub struct VolumeResource {
    client: PowerStoreClient,
}

impl VolumeResource {
    pub fn new(client: PowerStoreClient) -> Self {
        Self { client }
    }

    async fn fetch(&self, id: &str, known: &VolumeState) -> Result<VolumeState> {
        let volume: Volume = self.client.get(id).await?;
        Ok(VolumeState::from_response(volume, known))
    }

    /// Replace every `*_name` of the plan with the id it names
    async fn resolve_names(&self, plan: &mut VolumeState) -> std::result::Result<(), String> {
        let client = &self.client;
        if let Some(name) = non_empty(&plan.host_name) {
            let host: Host = client.get_by_name(&name).await.map_err(|_| "Invalid host name")?;
            plan.host_id = Some(host.id);
        }
        if let Some(name) = non_empty(&plan.host_group_name) {
            let group: HostGroup = client
                .get_by_name(&name)
                .await
                .map_err(|_| "Invalid host group name")?;
            plan.host_group_id = Some(group.id);
        }
        if let Some(name) = non_empty(&plan.volume_group_name) {
            let group: VolumeGroup = client
                .get_by_name(&name)
                .await
                .map_err(|_| "Invalid volume group name")?;
            plan.volume_group_id = Some(group.id);
        }
        if let Some(name) = non_empty(&plan.appliance_name) {
            let appliance: Appliance = client
                .get_by_name(&name)
                .await
                .map_err(|_| "Invalid Appliance name")?;
            plan.appliance_id = Some(appliance.id);
        }
        if let Some(name) = non_empty(&plan.protection_policy_name) {
            let policy: ProtectionPolicy = client
                .get_by_name(&name)
                .await
                .map_err(|_| "Invalid Protection policy name")?;
            plan.protection_policy_id = Some(policy.id);
        }
        Ok(())
    }

    async fn detach(&self, id: &str, host_id: Option<String>, host_group_id: Option<String>) -> Result<()> {
        if host_id.is_none() && host_group_id.is_none() {
            return Ok(());
        }
        let body = MappingChange {
            host_id,
            host_group_id,
            logical_unit_number: None,
        };
        self.client.action(Collection::Volume, id, "detach", &body).await?;
        Ok(())
    }

    async fn attach(&self, id: &str, plan: &VolumeState) -> Result<()> {
        let (host_id, host_group_id) = plan.mapping();
        if host_id.is_none() && host_group_id.is_none() {
            return Ok(());
        }
        let body = MappingChange {
            host_id,
            host_group_id,
            logical_unit_number: plan.logical_unit_number,
        };
        self.client.action(Collection::Volume, id, "attach", &body).await?;
        Ok(())
    }

    async fn change_membership(&self, group_id: &str, volume_id: &str, action: &str) -> Result<()> {
        self.client
            .action(
                Collection::VolumeGroup,
                group_id,
                action,
                &json!({ "volume_ids": [volume_id] }),
            )
            .await?;
        Ok(())
    }
}

/// Checks that only need the plan and prior state
fn validate_update(plan: &VolumeState, state: &VolumeState) -> std::result::Result<(), &'static str> {
    let (host, group) = plan.mapping();
    if host.is_some() && group.is_some() {
        return Err("Either of HostID and Host GroupID should be present.");
    }
    if plan.logical_unit_number.is_some() && plan.logical_unit_number != state.logical_unit_number {
        return Err("Logical Unit Number cannot be modified.");
    }
    if non_empty(&plan.appliance_id).is_some() && non_empty(&plan.appliance_id) != state.appliance_id {
        return Err("Appliance ID cannot be modified.");
    }
    if non_empty(&plan.appliance_name) != non_empty(&state.appliance_name) {
        return Err("Appliance Name cannot be modified.");
    }
    if plan.sector_size.is_some() && plan.sector_size != state.sector_size {
        return Err("Sector Size cannot be modified.");
    }
    Ok(())
}

#[async_trait]
impl Resource for VolumeResource {
    type State = VolumeState;

    fn type_name(&self) -> &'static str {
        "volume"
    }

    fn schema(&self) -> Schema {
        Schema::new(
            "This resource is used to manage the volume entity of PowerStore Array. \
             We can Create, Update and Delete the volume using this resource. \
             We can also import an existing volume from PowerStore array.",
        )
        .attribute(Attribute::id("The ID of the volume."))
        .attribute(
            Attribute::string("name")
                .required()
                .validate(Validator::LengthAtLeast(1))
                .describe("The name of the volume."),
        )
        .attribute(Attribute::float("size").required().describe("The size of the volume."))
        .attribute(
            Attribute::string("capacity_unit")
                .optional_computed()
                .default_value(json!("GB"))
                .validate(Validator::OneOf(&CapacityUnit::ALL))
                .describe("The Capacity Unit corresponding to the size."),
        )
        .attribute(
            Attribute::string("description")
                .optional_computed()
                .describe("The description of the volume."),
        )
        .attribute(Attribute::string("host_id").optional_computed().describe("The host id of the volume."))
        .attribute(
            Attribute::string("host_name")
                .optional()
                .validate(Validator::ConflictsWith(&["host_id"]))
                .describe("The host name of the volume."),
        )
        .attribute(
            Attribute::string("host_group_id")
                .optional_computed()
                .describe("The host group id of the volume."),
        )
        .attribute(
            Attribute::string("host_group_name")
                .optional()
                .validate(Validator::ConflictsWith(&["host_group_id"]))
                .describe("The host group name of the volume."),
        )
        .attribute(
            Attribute::int("logical_unit_number")
                .optional_computed()
                .describe("The logical unit number of the host mapping."),
        )
        .attribute(
            Attribute::string("volume_group_id")
                .optional_computed()
                .describe("The volume group id of the volume."),
        )
        .attribute(
            Attribute::string("volume_group_name")
                .optional()
                .validate(Validator::ConflictsWith(&["volume_group_id"]))
                .describe("The volume group name of the volume."),
        )
        .attribute(
            Attribute::int("sector_size")
                .optional_computed()
                .default_value(json!(DEFAULT_SECTOR_SIZE))
                .describe("The sector size of the volume."),
        )
        .attribute(
            Attribute::string("appliance_id")
                .optional_computed()
                .keep_state()
                .describe("The appliance_id of the volume."),
        )
        .attribute(
            Attribute::string("appliance_name")
                .optional()
                .validate(Validator::ConflictsWith(&["appliance_id"]))
                .describe("The appliance name of the volume."),
        )
        .attribute(
            Attribute::string("protection_policy_id")
                .optional_computed()
                .describe("The protection_policy_id of the volume."),
        )
        .attribute(
            Attribute::string("protection_policy_name")
                .optional()
                .validate(Validator::ConflictsWith(&["protection_policy_id"]))
                .describe("The protection policy name of the volume."),
        )
        .attribute(
            Attribute::string("performance_policy_id")
                .optional_computed()
                .default_value(json!("default_medium"))
                .validate(Validator::OneOf(PERFORMANCE_POLICIES))
                .describe("The performance_policy_id of the volume."),
        )
        .attribute(
            Attribute::string("app_type")
                .optional_computed()
                .validate(Validator::OneOf(APP_TYPES))
                .describe("The app type of the volume."),
        )
        .attribute(
            Attribute::string("app_type_other")
                .optional_computed()
                .describe("The app type other of the volume."),
        )
        .attributes([
            Attribute::string("creation_timestamp").computed().describe("The creation_timestamp of the volume."),
            Attribute::bool("is_replication_destination")
                .computed()
                .describe("The is_replication_destination of the volume."),
            Attribute::string("node_affinity").computed().describe("The node_affinity of the volume."),
            Attribute::string("type").computed().describe("The type of the volume."),
            Attribute::string("wwn").computed().describe("The wwn of the volume."),
            Attribute::string("state").computed().describe("The state of the volume."),
            Attribute::string("nguid").computed().describe("The nguid of the volume."),
            Attribute::int("nsid").computed().describe("The nsid of the volume."),
            Attribute::int("logical_used")
                .computed()
                .describe("Current amount of data used by the volume."),
        ])
    }

    fn validate(&self, config: &VolumeState) -> Result<()> {
        let host = non_empty(&config.host_id).or_else(|| non_empty(&config.host_name));
        let group = non_empty(&config.host_group_id).or_else(|| non_empty(&config.host_group_name));
        if host.is_some() && group.is_some() {
            return Err(Error::validation(
                "Invalid Attribute Combination",
                "Either HostID or HostGroupID can be present",
            ));
        }
        Ok(())
    }

    async fn create(&self, mut plan: VolumeState) -> Result<VolumeState> {
        let size = plan.size_in_bytes().map_err(|msg| {
            Error::validation("Error creating volume", format!("Could not create volume {}", msg))
        })?;
        self.resolve_names(&mut plan).await.map_err(|msg| {
            Error::operation_msg("Error creating volume", format!("Could not create volume, {}", msg))
        })?;

        let (host_id, host_group_id) = plan.mapping();
        let mapped = host_id.is_some() || host_group_id.is_some();
        let body = VolumeCreate {
            name: plan.name.clone().unwrap_or_default(),
            size,
            description: non_empty(&plan.description),
            appliance_id: non_empty(&plan.appliance_id),
            volume_group_id: non_empty(&plan.volume_group_id),
            sector_size: plan.sector_size,
            protection_policy_id: non_empty(&plan.protection_policy_id),
            performance_policy_id: non_empty(&plan.performance_policy_id),
            app_type: non_empty(&plan.app_type),
            app_type_other: non_empty(&plan.app_type_other),
            host_id,
            host_group_id,
            logical_unit_number: plan.logical_unit_number.filter(|_| mapped),
        };
        let id = self
            .client
            .create(Collection::Volume, &body)
            .await
            .map_err(|e| MESSAGES.create(&e))?;
        info!("Created volume {} ({} bytes)", id, size);

        self.fetch(&id, &plan)
            .await
            .map_err(|e| MESSAGES.created_refresh(&e))
    }

    async fn read(&self, state: VolumeState) -> Result<VolumeState> {
        let id = id_of(&state.id);
        self.fetch(id, &state).await.map_err(|e| MESSAGES.read(id, e))
    }

    async fn update(&self, mut plan: VolumeState, state: VolumeState) -> Result<VolumeState> {
        self.resolve_names(&mut plan).await.map_err(|msg| {
            Error::operation_msg("Error Updating volume", format!("Could not Update volume, {}", msg))
        })?;
        validate_update(&plan, &state).map_err(|msg| {
            Error::validation("Validation Check Failed", format!("Validation Error: {}", msg))
        })?;
        let size = plan.size_in_bytes().map_err(|msg| {
            Error::validation("Validation Check Failed", format!("Validation Failed: {}", msg))
        })?;

        let id = id_of(&state.id);
        let mut report = UpdateReport::default();

        let body = VolumeModify {
            name: plan.name.clone().unwrap_or_default(),
            size,
            protection_policy_id: plan.protection_policy_id.clone().unwrap_or_default(),
            performance_policy_id: non_empty(&plan.performance_policy_id),
            description: plan.description.clone(),
            app_type: non_empty(&plan.app_type),
            app_type_other: non_empty(&plan.app_type_other),
        };
        report.record(
            "name, size, protection policy, performance policy, description",
            "update name, size, protection policy, performance policy, description",
            self.client.modify(Collection::Volume, id, &body).await,
        );

        if plan.mapping() != state.mapping() {
            let (host_id, host_group_id) = state.mapping();
            debug!("Remapping volume {}", id);
            report.record(
                "unmapped volume from host",
                "unmap volume from host",
                self.detach(id, host_id, host_group_id).await,
            );
            report.record("mapped volume to host", "map volume to host", self.attach(id, &plan).await);
        }

        let desired_group = non_empty(&plan.volume_group_id);
        let current_group = non_empty(&state.volume_group_id);
        if desired_group != current_group {
            if let Some(group) = &current_group {
                report.record(
                    "unmapped volume group ID",
                    "unmap volume group ID",
                    self.change_membership(group, id, "remove_members").await,
                );
            }
            if let Some(group) = &desired_group {
                report.record(
                    "mapped volume group ID",
                    "map volume group ID",
                    self.change_membership(group, id, "add_members").await,
                );
            }
        }
        report.into_result()?;

        self.fetch(id, &plan).await.map_err(|e| {
            Error::refresh(
                "Error getting volume after update",
                &format!("Could not get after update volID {}: ", id),
                &e,
            )
        })
    }

    async fn delete(&self, state: VolumeState) -> Result<()> {
        let id = id_of(&state.id);
        let current = self.fetch(id, &state).await.map_err(|e| MESSAGES.read(id, e))?;

        if current.protection_policy_id.is_some() {
            self.client
                .modify(Collection::Volume, id, &json!({"protection_policy_id": ""}))
                .await
                .map_err(|e| {
                    Error::operation(
                        "Cannot detach protection policy",
                        "Could not delete volume, unexpected error: ",
                        &e,
                    )
                })?;
        }

        let (host_id, host_group_id) = current.mapping();
        self.detach(id, host_id, host_group_id).await.map_err(|e| {
            Error::operation(
                "Cannot detach volume host mapping",
                "Could not delete volume, unexpected error: ",
                &e,
            )
        })?;

        if let Some(group) = &current.volume_group_id {
            self.change_membership(group, id, "remove_members")
                .await
                .map_err(|e| {
                    Error::operation(
                        "Error detaching volume Group",
                        "Could not delete volume, unexpected error: ",
                        &e,
                    )
                })?;
        }

        self.client
            .delete(Collection::Volume, id)
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

    struct Fixture {
        array: Arc<InMemoryArray>,
        handler: JsonResource<VolumeResource>,
        host: String,
        host_group: String,
        volume_group: String,
    }

    fn setup() -> Fixture {
        let array = Arc::new(InMemoryArray::with_fixtures());
        let host = array.seed(Collection::Host, json!({"name": "host-a", "os_type": "Linux"}));
        let host_group = array.seed(Collection::HostGroup, json!({"name": "hg-a"}));
        let volume_group = array.seed(
            Collection::VolumeGroup,
            json!({"name": "vg-a", "type": "Primary", "volume_ids": []}),
        );
        let client = PowerStoreClient::new(array.clone());
        Fixture {
            array,
            handler: JsonResource(VolumeResource::new(client)),
            host,
            host_group,
            volume_group,
        }
    }

    #[tokio::test]
    async fn test_create_with_names() {
        let f = setup();
        let state = f
            .handler
            .create(&json!({
                "name": "vol1",
                "size": 2.5,
                "host_name": "host-a",
                "volume_group_name": "vg-a",
                "appliance_name": "Appliance-WND8977",
            }))
            .await
            .unwrap();

        assert_eq!(state["size"], 2.5);
        assert_eq!(state["capacity_unit"], "GB");
        assert_eq!(state["host_id"], json!(f.host));
        assert_eq!(state["host_name"], "host-a");
        assert_eq!(state["logical_unit_number"], 1);
        assert_eq!(state["volume_group_id"], json!(f.volume_group));
        assert_eq!(state["sector_size"], 512);
        assert_eq!(state["performance_policy_id"], "default_medium");
        assert_eq!(state["type"], "Primary");

        let stored = f
            .array
            .entity(Collection::Volume, state["id"].as_str().unwrap())
            .unwrap();
        assert_eq!(stored["size"], 2684354560_i64);
    }

    #[tokio::test]
    async fn test_host_and_host_group_are_exclusive() {
        let f = setup();
        let err = f
            .handler
            .create(&json!({"name": "vol1", "size": 1, "host_name": "host-a", "host_group_id": f.host_group}))
            .await
            .unwrap_err();
        assert_matches!(err, Error::Validation { .. });

        let err = f
            .handler
            .create(&json!({"name": "vol1", "size": 1, "host_name": "nobody"}))
            .await
            .unwrap_err();
        assert_eq!(err.detail(), "Could not create volume, Invalid host name");
        assert_eq!(f.array.count(Collection::Volume), 0);
    }

    #[tokio::test]
    async fn test_remap_and_regroup() {
        let f = setup();
        let state = f
            .handler
            .create(&json!({"name": "vol1", "size": 1, "host_id": f.host, "volume_group_id": f.volume_group}))
            .await
            .unwrap();

        let updated = f
            .handler
            .update(
                &json!({"name": "vol1", "size": 2, "host_group_id": f.host_group}),
                &state,
            )
            .await
            .unwrap();
        assert_eq!(updated["host_id"], Value::Null);
        assert_eq!(updated["host_group_id"], json!(f.host_group));
        assert_eq!(updated["volume_group_id"], Value::Null);
        assert_eq!(updated["size"], 2.0);
    }

    #[tokio::test]
    async fn test_immutables_and_shrink() {
        let f = setup();
        let state = f
            .handler
            .create(&json!({"name": "vol1", "size": 2}))
            .await
            .unwrap();

        let err = f
            .handler
            .update(&json!({"name": "vol1", "size": 2, "sector_size": 4096}), &state)
            .await
            .unwrap_err();
        assert_eq!(err.summary(), "Validation Check Failed");
        assert_eq!(err.detail(), "Validation Error: Sector Size cannot be modified.");

        let err = f
            .handler
            .update(&json!({"name": "vol1", "size": 1}), &state)
            .await
            .unwrap_err();
        assert!(err.summary().starts_with("Failed to update all parameters of Volume"));
    }

    #[tokio::test]
    async fn test_delete_detaches_everything() {
        let f = setup();
        let policy_rule = f.array.seed(
            Collection::SnapshotRule,
            json!({"name": "sr", "interval": "One_Hour", "desired_retention": 1}),
        );
        let policy = f.array.seed(
            Collection::Policy,
            json!({"name": "pp", "type": "Protection", "snapshot_rule_ids": [policy_rule],
                   "replication_rule_ids": []}),
        );
        let state = f
            .handler
            .create(&json!({
                "name": "vol1",
                "size": 1,
                "host_id": f.host,
                "volume_group_id": f.volume_group,
                "protection_policy_id": policy,
            }))
            .await
            .unwrap();

        f.handler.delete(&state).await.unwrap();
        assert_eq!(f.array.count(Collection::Volume), 0);
        assert_eq!(f.array.count(Collection::HostVolumeMapping), 0);
    }
}
