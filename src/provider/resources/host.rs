//! `powerstore_host`
//!
//! Hosts and their initiators. CHAP passwords are write-only on the array,
//! so state carries them over from the plan (create, update) or from the
//! prior state (read).

use super::{changed, id_of, non_empty, Messages};
use crate::client::{Host, PowerStoreClient};
use crate::domain::ports::Collection;
use crate::error::{Error, Result};
use crate::framework::{Attribute, Resource, Schema, Validator};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

const MESSAGES: Messages = Messages("host");

pub(crate) const HOST_CONNECTIVITY: &[&str] = &[
    "Local_Only",
    "Metro_Optimize_Both",
    "Metro_Optimize_Local",
    "Metro_Optimize_Remote",
];

// =============================================================================
// State
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InitiatorState {
    pub port_name: Option<String>,
    pub port_type: Option<String>,
    pub chap_single_username: Option<String>,
    pub chap_single_password: Option<String>,
    pub chap_mutual_username: Option<String>,
    pub chap_mutual_password: Option<String>,
}

impl InitiatorState {
    fn port(&self) -> &str {
        self.port_name.as_deref().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostState {
    pub id: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    pub os_type: Option<String>,
    pub initiators: Option<Vec<InitiatorState>>,
    pub host_connectivity: Option<String>,
    pub host_group_id: Option<String>,
}

impl HostState {
    /// Build state from the array, taking passwords from `secrets`
    fn from_response(host: Host, secrets: &[InitiatorState]) -> Self {
        let known: BTreeMap<&str, &InitiatorState> =
            secrets.iter().map(|i| (i.port(), i)).collect();

        let initiators = host
            .initiators
            .into_iter()
            .map(|initiator| {
                let previous = known.get(initiator.port_name.as_str());
                let mut state = InitiatorState {
                    port_name: Some(initiator.port_name.clone()),
                    port_type: Some(initiator.port_type.clone()),
                    ..Default::default()
                };
                if initiator.port_type == "iSCSI" {
                    if let Some(single) = non_empty(&initiator.chap_single_username) {
                        state.chap_single_username = Some(single);
                        state.chap_single_password =
                            previous.and_then(|p| p.chap_single_password.clone());
                    }
                    if let Some(mutual) = non_empty(&initiator.chap_mutual_username) {
                        state.chap_mutual_username = Some(mutual);
                        state.chap_mutual_password =
                            previous.and_then(|p| p.chap_mutual_password.clone());
                    }
                }
                state
            })
            .collect();

        Self {
            id: Some(host.id),
            name: Some(host.name),
            description: Some(host.description),
            os_type: Some(host.os_type),
            initiators: Some(initiators),
            host_connectivity: Some(host.host_connectivity),
            host_group_id: host.host_group_id,
        }
    }

    fn initiators(&self) -> &[InitiatorState] {
        self.initiators.as_deref().unwrap_or_default()
    }
}

// =============================================================================
// Request Bodies
// =============================================================================

/// Initiator as sent on create and `add_initiators`
#[derive(Debug, Default, Serialize)]
struct InitiatorBody {
    port_name: String,
    port_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    chap_single_username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    chap_single_password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    chap_mutual_username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    chap_mutual_password: Option<String>,
}

/// Entry of `modify_initiators`
#[derive(Debug, Default, Serialize)]
struct InitiatorChange {
    port_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    chap_single_username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    chap_single_password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    chap_mutual_username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    chap_mutual_password: Option<String>,
}

/// Protocol implied by the initiator name
pub fn port_type_of(port_name: &str) -> &'static str {
    if port_name.starts_with("iqn") {
        "iSCSI"
    } else if port_name.starts_with("nqn") {
        "NVMe"
    } else {
        "FC"
    }
}

/// CHAP credentials to send for a planned initiator; only iSCSI carries them
fn chap_of(initiator: &InitiatorState) -> [Option<String>; 4] {
    let single = non_empty(&initiator.chap_single_username);
    let mutual = non_empty(&initiator.chap_mutual_username);
    if port_type_of(initiator.port()) != "iSCSI" || (single.is_none() && mutual.is_none()) {
        return [None, None, None, None];
    }
    let single_password = initiator.chap_single_password.clone().or_else(|| Some(String::new()));
    if mutual.is_none() {
        return [single, single_password, None, None];
    }
    let mutual_password = initiator.chap_mutual_password.clone().or_else(|| Some(String::new()));
    [single, single_password, mutual, mutual_password]
}

impl From<&InitiatorState> for InitiatorBody {
    fn from(initiator: &InitiatorState) -> Self {
        let [chap_single_username, chap_single_password, chap_mutual_username, chap_mutual_password] =
            chap_of(initiator);
        Self {
            port_name: initiator.port().to_string(),
            port_type: port_type_of(initiator.port()).to_string(),
            chap_single_username,
            chap_single_password,
            chap_mutual_username,
            chap_mutual_password,
        }
    }
}

impl From<&InitiatorState> for InitiatorChange {
    fn from(initiator: &InitiatorState) -> Self {
        let [chap_single_username, chap_single_password, chap_mutual_username, chap_mutual_password] =
            chap_of(initiator);
        Self {
            port_name: initiator.port().to_string(),
            chap_single_username,
            chap_single_password,
            chap_mutual_username,
            chap_mutual_password,
        }
    }
}

#[derive(Debug, Serialize)]
struct HostCreate {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    os_type: String,
    initiators: Vec<InitiatorBody>,
    #[serde(skip_serializing_if = "Option::is_none")]
    host_connectivity: Option<String>,
}

#[derive(Debug, Default, Serialize)]
struct HostModify {
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    host_connectivity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    add_initiators: Option<Vec<InitiatorBody>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    remove_initiators: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    modify_initiators: Option<Vec<InitiatorChange>>,
}

// =============================================================================
// Resource
// =============================================================================

pub struct HostResource {
    client: PowerStoreClient,
}

impl HostResource {
    pub fn new(client: PowerStoreClient) -> Self {
        Self { client }
    }

    async fn fetch(&self, id: &str, secrets: &[InitiatorState]) -> Result<HostState> {
        let host: Host = self.client.get(id).await?;
        Ok(HostState::from_response(host, secrets))
    }

    /// The three modify calls of an update: settings and additions,
    /// removals, then CHAP changes of retained ports
    fn modify_bodies(plan: &HostState, state: &HostState) -> Vec<HostModify> {
        let current: BTreeMap<&str, &InitiatorState> =
            state.initiators().iter().map(|i| (i.port(), i)).collect();
        let planned: BTreeMap<&str, &InitiatorState> =
            plan.initiators().iter().map(|i| (i.port(), i)).collect();

        let added: Vec<InitiatorBody> = planned
            .iter()
            .filter(|(port, _)| !current.contains_key(*port))
            .map(|(_, i)| InitiatorBody::from(*i))
            .collect();
        let removed: Vec<String> = current
            .keys()
            .filter(|port| !planned.contains_key(*port))
            .map(|port| port.to_string())
            .collect();
        let retained: Vec<InitiatorChange> = planned
            .iter()
            .filter(|(port, _)| current.contains_key(*port))
            .map(|(_, i)| InitiatorChange::from(*i))
            .collect();

        let mut bodies = vec![HostModify {
            name: non_empty(&plan.name),
            description: plan.description.clone(),
            host_connectivity: non_empty(&plan.host_connectivity),
            add_initiators: (!added.is_empty()).then_some(added),
            ..Default::default()
        }];
        if !removed.is_empty() {
            bodies.push(HostModify {
                remove_initiators: Some(removed),
                ..Default::default()
            });
        }
        if !retained.is_empty() {
            bodies.push(HostModify {
                modify_initiators: Some(retained),
                ..Default::default()
            });
        }
        bodies
    }
}

#[async_trait]
impl Resource for HostResource {
    type State = HostState;

    fn type_name(&self) -> &'static str {
        "host"
    }

    fn schema(&self) -> Schema {
        Schema::new(
            "This resource is used to manage the host entity of PowerStore Array. \
             We can Create, Update and Delete the host using this resource. \
             We can also import an existing host from PowerStore array.",
        )
        .attribute(Attribute::id("The unique identifier of the host."))
        .attribute(
            Attribute::string("name")
                .required()
                .validate(Validator::LengthAtLeast(1))
                .describe("Name of the host. This should be unique across all hosts in the cluster."),
        )
        .attribute(
            Attribute::string("description")
                .optional_computed()
                .describe("Description of the host."),
        )
        .attribute(
            Attribute::string("host_group_id")
                .computed()
                .describe("Associated host group, if host is part of host group."),
        )
        .attribute(
            Attribute::string("os_type")
                .required()
                .validate(Validator::OneOf(&["Windows", "Linux", "ESXi"]))
                .describe("Operating system of the host. This cannot be updated."),
        )
        .attribute(
            Attribute::object_set(
                "initiators",
                vec![
                    Attribute::string("port_name")
                        .required()
                        .validate(Validator::LengthAtLeast(1))
                        .describe("IQN name aka address or NQN name for NVMEoF port types."),
                    Attribute::string("port_type")
                        .computed()
                        .describe("Protocol type of the host initiator."),
                    Attribute::string("chap_single_username")
                        .optional()
                        .describe("Username for CHAP authentication in single mode."),
                    Attribute::string("chap_single_password")
                        .optional()
                        .sensitive()
                        .describe("Password for CHAP authentication in single mode. Cannot be queried."),
                    Attribute::string("chap_mutual_username")
                        .optional()
                        .describe("Username for CHAP authentication in mutual mode."),
                    Attribute::string("chap_mutual_password")
                        .optional()
                        .sensitive()
                        .describe("Password for CHAP authentication in mutual mode. Cannot be queried."),
                ],
            )
            .required()
            .describe("Parameters for creating or adding initiators to host."),
        )
        .attribute(
            Attribute::string("host_connectivity")
                .optional_computed()
                .validate(Validator::OneOf(HOST_CONNECTIVITY))
                .describe("Connectivity type for hosts and host groups."),
        )
    }

    fn validate(&self, config: &HostState) -> Result<()> {
        let orphan_mutual = config.initiators().iter().any(|i| {
            i.chap_mutual_username.is_some() && i.chap_single_username.is_none()
        });
        if orphan_mutual {
            return Err(Error::validation(
                "Error validating config host",
                "`chap_mutual_username` cannot be present without `chap_single_username`",
            ));
        }
        Ok(())
    }

    async fn create(&self, plan: HostState) -> Result<HostState> {
        let body = HostCreate {
            name: plan.name.clone().unwrap_or_default(),
            description: plan.description.clone(),
            os_type: plan.os_type.clone().unwrap_or_default(),
            initiators: plan.initiators().iter().map(InitiatorBody::from).collect(),
            host_connectivity: non_empty(&plan.host_connectivity),
        };

        let id = self
            .client
            .create(Collection::Host, &body)
            .await
            .map_err(|e| MESSAGES.create(&e))?;

        self.fetch(&id, plan.initiators())
            .await
            .map_err(|e| MESSAGES.created_refresh(&e))
    }

    async fn read(&self, state: HostState) -> Result<HostState> {
        let id = id_of(&state.id);
        self.fetch(id, state.initiators())
            .await
            .map_err(|e| MESSAGES.read(id, e))
    }

    async fn update(&self, plan: HostState, state: HostState) -> Result<HostState> {
        if changed(&plan.os_type, &state.os_type) {
            return Err(MESSAGES.immutable("os_type of the host can't be updated"));
        }

        let id = id_of(&state.id);
        for body in Self::modify_bodies(&plan, &state) {
            debug!("Modifying host {}", id);
            self.client
                .modify(Collection::Host, id, &body)
                .await
                .map_err(|e| MESSAGES.update(id, &e))?;
        }

        self.fetch(id, plan.initiators())
            .await
            .map_err(|e| MESSAGES.updated_refresh(&e))
    }

    async fn delete(&self, state: HostState) -> Result<()> {
        let id = id_of(&state.id);
        self.client
            .delete(Collection::Host, id)
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
    use serde_json::{json, Value};
    use std::sync::Arc;

    const IQN: &str = "iqn.1998-01.com.vmware:lgloc187-4cfa37b6";
    const WWN: &str = "21:00:00:24:ff:31:e9:fc";

    fn setup() -> (Arc<InMemoryArray>, JsonResource<HostResource>) {
        let array = Arc::new(InMemoryArray::with_fixtures());
        let client = PowerStoreClient::new(array.clone());
        (array, JsonResource(HostResource::new(client)))
    }

    fn port<'a>(state: &'a Value, name: &str) -> &'a Value {
        state["initiators"]
            .as_array()
            .unwrap()
            .iter()
            .find(|i| i["port_name"] == name)
            .unwrap()
    }

    #[test]
    fn test_port_type_of() {
        assert_eq!(port_type_of(IQN), "iSCSI");
        assert_eq!(port_type_of("nqn.2014-08.org.nvmexpress:uuid"), "NVMe");
        assert_eq!(port_type_of(WWN), "FC");
    }

    #[tokio::test]
    async fn test_create_keeps_passwords_from_plan() {
        let (array, handler) = setup();
        let state = handler
            .create(&json!({
                "name": "host1",
                "os_type": "Linux",
                "initiators": [
                    {"port_name": IQN, "chap_single_username": "chapuser",
                     "chap_single_password": "chappassword12"},
                    {"port_name": WWN},
                ],
            }))
            .await
            .unwrap();

        let iscsi = port(&state, IQN);
        assert_eq!(iscsi["port_type"], "iSCSI");
        assert_eq!(iscsi["chap_single_username"], "chapuser");
        assert_eq!(iscsi["chap_single_password"], "chappassword12");
        assert_eq!(port(&state, WWN)["port_type"], "FC");

        let stored = array
            .entity(Collection::Host, state["id"].as_str().unwrap())
            .unwrap();
        assert!(!stored.to_string().contains("chappassword12"));

        let refreshed = handler.read(&state).await.unwrap();
        assert_eq!(port(&refreshed, IQN)["chap_single_password"], "chappassword12");
    }

    #[tokio::test]
    async fn test_mutual_without_single_is_rejected() {
        let (array, handler) = setup();
        let err = handler
            .create(&json!({
                "name": "host1",
                "os_type": "Linux",
                "initiators": [{"port_name": IQN, "chap_mutual_username": "m"}],
            }))
            .await
            .unwrap_err();
        assert_matches!(
            err,
            Error::Validation { ref detail, .. }
                if detail == "`chap_mutual_username` cannot be present without `chap_single_username`"
        );
        assert_eq!(array.count(Collection::Host), 0);
    }

    #[tokio::test]
    async fn test_update_swaps_initiators() {
        let (array, handler) = setup();
        let state = handler
            .create(&json!({
                "name": "host1",
                "os_type": "Linux",
                "initiators": [{"port_name": IQN}],
            }))
            .await
            .unwrap();
        array.clear_calls();

        let updated = handler
            .update(
                &json!({
                    "name": "host1-renamed",
                    "os_type": "Linux",
                    "initiators": [{"port_name": WWN}],
                }),
                &state,
            )
            .await
            .unwrap();

        assert_eq!(updated["name"], "host1-renamed");
        let ports: Vec<&Value> = updated["initiators"]
            .as_array()
            .unwrap()
            .iter()
            .map(|i| &i["port_name"])
            .collect();
        assert_eq!(ports, vec![&json!(WWN)]);
        assert_eq!(array.mutating_calls().len(), 2);
    }

    #[tokio::test]
    async fn test_os_type_is_immutable() {
        let (_, handler) = setup();
        let state = handler
            .create(&json!({"name": "host1", "os_type": "Linux", "initiators": [{"port_name": IQN}]}))
            .await
            .unwrap();
        let err = handler
            .update(
                &json!({"name": "host1", "os_type": "Windows", "initiators": [{"port_name": IQN}]}),
                &state,
            )
            .await
            .unwrap_err();
        assert_eq!(err.summary(), "Error updating host");
    }
}
