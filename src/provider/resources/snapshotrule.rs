//! `powerstore_snapshotrule`
//!
//! A rule runs either on a fixed `interval` or once a day at `time_of_day`
//! in `timezone`, never both.

use super::{id_of, non_empty, Messages};
use crate::client::{PowerStoreClient, SnapshotRule};
use crate::domain::ports::Collection;
use crate::error::{Error, Result};
use crate::framework::{Attribute, Resource, Schema, Validator};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

const MESSAGES: Messages = Messages("snapshot rule");

pub(crate) const SNAPSHOT_INTERVALS: &[&str] = &[
    "Five_Minutes",
    "Fifteen_Minutes",
    "Thirty_Minutes",
    "One_Hour",
    "Two_Hours",
    "Three_Hours",
    "Four_Hours",
    "Six_Hours",
    "Eight_Hours",
    "Twelve_Hours",
    "One_Day",
];

pub(crate) const DAYS_OF_WEEK: &[&str] = &[
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
    "Sunday",
];

/// Time zones accepted by the array
pub(crate) const TIME_ZONES: &[&str] = &[
    "Etc__GMT_plus_12", "US__Samoa", "Etc__GMT_plus_11", "America__Atka", "US__Hawaii",
    "Etc__GMT_plus_10", "Pacific__Marquesas", "US__Alaska", "Pacific__Gambier",
    "Etc__GMT_plus_9", "PST8PDT", "Pacific__Pitcairn", "US__Pacific", "Etc__GMT_plus_8",
    "Mexico__BajaSur", "America__Boise", "America__Phoenix", "MST7MDT", "Etc__GMT_plus_7",
    "CST6CDT", "America__Chicago", "Canada__Saskatchewan", "America__Bahia_Banderas",
    "Etc__GMT_plus_6", "Chile__EasterIsland", "America__Bogota", "America__New_York", "EST5EDT",
    "America__Havana", "Etc__GMT_plus_5", "America__Caracas", "America__Cuiaba",
    "America__Santo_Domingo", "Canada__Atlantic", "America__Asuncion", "Etc__GMT_plus_4",
    "Canada__Newfoundland", "Chile__Continental", "Brazil__East", "America__Godthab",
    "America__Miquelon", "America__Buenos_Aires", "Etc__GMT_plus_3", "America__Noronha",
    "Etc__GMT_plus_2", "America__Scoresbysund", "Atlantic__Cape_Verde", "Etc__GMT_plus_1",
    "UTC", "Europe__London", "Africa__Casablanca", "Atlantic__Reykjavik", "Antarctica__Troll",
    "Europe__Paris", "Europe__Sarajevo", "Europe__Belgrade", "Europe__Rome", "Africa__Tunis",
    "Etc__GMT_minus_1", "Asia__Gaza", "Europe__Bucharest", "Europe__Helsinki", "Asia__Beirut",
    "Africa__Harare", "Asia__Damascus", "Asia__Amman", "Europe__Tiraspol", "Asia__Jerusalem",
    "Etc__GMT_minus_2", "Asia__Baghdad", "Africa__Asmera", "Etc__GMT_minus_3", "Asia__Tehran",
    "Asia__Baku", "Etc__GMT_minus_4", "Asia__Kabul", "Asia__Karachi", "Etc__GMT_minus_5",
    "Asia__Kolkata", "Asia__Katmandu", "Asia__Almaty", "Etc__GMT_minus_6", "Asia__Rangoon",
    "Asia__Hovd", "Asia__Bangkok", "Etc__GMT_minus_7", "Asia__Hong_Kong", "Asia__Brunei",
    "Asia__Singapore", "Etc__GMT_minus_8", "Asia__Pyongyang", "Australia__Eucla", "Asia__Seoul",
    "Etc__GMT_minus_9", "Australia__Darwin", "Australia__Adelaide", "Australia__Sydney",
    "Australia__Brisbane", "Asia__Magadan", "Etc__GMT_minus_10", "Australia__Lord_Howe",
    "Etc__GMT_minus_11", "Asia__Kamchatka", "Pacific__Fiji", "Antarctica__South_Pole",
    "Etc__GMT_minus_12", "Pacific__Chatham", "Pacific__Tongatapu", "Pacific__Apia",
    "Etc__GMT_minus_13", "Pacific__Kiritimati", "Etc__GMT_minus_14",
];

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotRuleState {
    pub id: Option<String>,
    pub name: Option<String>,
    pub interval: Option<String>,
    pub time_of_day: Option<String>,
    pub timezone: Option<String>,
    pub days_of_week: Option<Vec<String>>,
    pub desired_retention: Option<i64>,
    pub is_replica: Option<bool>,
    pub nas_access_type: Option<String>,
    pub is_read_only: Option<bool>,
    pub managed_by: Option<String>,
    pub managed_by_id: Option<String>,
    pub delete_snaps: Option<bool>,
}

impl SnapshotRuleState {
    /// `is_read_only` and `delete_snaps` are carried from `known`
    fn from_response(rule: SnapshotRule, known: &SnapshotRuleState) -> Self {
        Self {
            id: Some(rule.id),
            name: Some(rule.name),
            interval: rule.interval.filter(|i| !i.is_empty()),
            time_of_day: rule.time_of_day.as_deref().and_then(trim_seconds),
            timezone: rule.timezone.filter(|tz| !tz.is_empty()),
            days_of_week: Some(rule.days_of_week),
            desired_retention: Some(rule.desired_retention),
            is_replica: Some(rule.is_replica),
            nas_access_type: Some(rule.nas_access_type),
            is_read_only: Some(known.is_read_only.unwrap_or(false)),
            managed_by: Some(rule.managed_by),
            managed_by_id: rule.managed_by_id,
            delete_snaps: known.delete_snaps,
        }
    }
}

/// The array reports `hh:mm:ss`, configurations use `hh:mm`
fn trim_seconds(time: &str) -> Option<String> {
    if time.is_empty() {
        return None;
    }
    let parts: Vec<&str> = time.split(':').collect();
    if parts.len() == 3 {
        Some(format!("{}:{}", parts[0], parts[1]))
    } else {
        Some(time.to_string())
    }
}

#[derive(Debug, Serialize)]
struct RuleBody {
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    interval: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    time_of_day: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    timezone: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    days_of_week: Vec<String>,
    desired_retention: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    nas_access_type: Option<String>,
}

impl From<&SnapshotRuleState> for RuleBody {
    fn from(plan: &SnapshotRuleState) -> Self {
        Self {
            name: plan.name.clone().unwrap_or_default(),
            interval: non_empty(&plan.interval),
            time_of_day: non_empty(&plan.time_of_day),
            timezone: non_empty(&plan.timezone),
            days_of_week: plan.days_of_week.clone().unwrap_or_default(),
            desired_retention: plan.desired_retention.unwrap_or_default(),
            nas_access_type: non_empty(&plan.nas_access_type),
        }
    }
}

pub struct SnapshotRuleResource {
    client: PowerStoreClient,
}

impl SnapshotRuleResource {
    pub fn new(client: PowerStoreClient) -> Self {
        Self { client }
    }

    async fn fetch(&self, id: &str, known: &SnapshotRuleState) -> Result<SnapshotRuleState> {
        let rule: SnapshotRule = self.client.get(id).await?;
        Ok(SnapshotRuleState::from_response(rule, known))
    }
}

#[async_trait]
impl Resource for SnapshotRuleResource {
    type State = SnapshotRuleState;

    fn type_name(&self) -> &'static str {
        "snapshotrule"
    }

    fn schema(&self) -> Schema {
        Schema::new(
            "This resource is used to manage the snapshot rule entity of PowerStore Array. \
             We can Create, Update and Delete the snapshot rule using this resource. \
             We can also import an existing snapshot rule from PowerStore array.",
        )
        .attribute(Attribute::id("The ID of the snapshot rule."))
        .attribute(
            Attribute::string("name")
                .required()
                .validate(Validator::LengthAtLeast(1))
                .describe("The name of the snapshot rule."),
        )
        .attribute(
            Attribute::string("interval")
                .optional_computed()
                .validate(Validator::OneOf(SNAPSHOT_INTERVALS))
                .validate(Validator::ConflictsWith(&["time_of_day", "timezone"]))
                .describe(
                    "The interval between snapshots taken by a snapshot rule, \
                     mutually exclusive with time_of_day parameter.",
                ),
        )
        .attribute(
            Attribute::string("time_of_day")
                .optional_computed()
                .validate(Validator::Regex {
                    pattern: r"^[0-9]{2}:[0-9]{2}$",
                    message: "format is hh:mm",
                })
                .validate(Validator::AlsoRequires(&["timezone"]))
                .describe(
                    "The time of the day to take a daily snapshot, with format hh:mm, \
                     mutually exclusive with interval parameter.",
                ),
        )
        .attribute(
            Attribute::string("timezone")
                .optional_computed()
                .validate(Validator::OneOf(TIME_ZONES))
                .validate(Validator::AlsoRequires(&["time_of_day"]))
                .describe("The time zone identifier for applying the time zone to the time_of_day."),
        )
        .attribute(
            Attribute::string_list("days_of_week")
                .optional_computed()
                .default_value(json!(DAYS_OF_WEEK))
                .validate(Validator::ValuesOneOf(DAYS_OF_WEEK))
                .describe("The days of the week when the snapshot rule should be applied."),
        )
        .attribute(
            Attribute::int("desired_retention")
                .required()
                .describe("The desired snapshot retention period in hours."),
        )
        .attribute(
            Attribute::bool("is_replica")
                .computed()
                .describe("Indicates whether this is a replica of a snapshot rule on a remote system."),
        )
        .attribute(
            Attribute::string("nas_access_type")
                .optional_computed()
                .default_value(json!("Snapshot"))
                .validate(Validator::OneOf(&["Snapshot", "Protocol"]))
                .describe("The NAS filesystem snapshot access method for snapshot rule."),
        )
        .attribute(
            Attribute::bool("is_read_only")
                .optional_computed()
                .default_value(json!(false))
                .describe("Indicates whether this snapshot rule can be modified."),
        )
        .attribute(
            Attribute::string("managed_by")
                .computed()
                .describe("The entity that owns and manages the instance."),
        )
        .attribute(
            Attribute::string("managed_by_id")
                .computed()
                .describe("The unique id of the managing entity."),
        )
        .attribute(
            Attribute::bool("delete_snaps")
                .optional()
                .default_value(json!(false))
                .describe(
                    "Specify whether all snapshots previously created by this snapshot rule \
                     should also be deleted when this rule is removed.",
                ),
        )
    }

    async fn create(&self, plan: SnapshotRuleState) -> Result<SnapshotRuleState> {
        let id = self
            .client
            .create(Collection::SnapshotRule, &RuleBody::from(&plan))
            .await
            .map_err(|e| MESSAGES.create(&e))?;
        info!("Created snapshot rule {}", id);

        self.fetch(&id, &plan)
            .await
            .map_err(|e| MESSAGES.created_refresh(&e))
    }

    async fn read(&self, state: SnapshotRuleState) -> Result<SnapshotRuleState> {
        let id = id_of(&state.id);
        self.fetch(id, &state).await.map_err(|e| MESSAGES.read(id, e))
    }

    async fn update(&self, plan: SnapshotRuleState, state: SnapshotRuleState) -> Result<SnapshotRuleState> {
        let id = id_of(&state.id);
        self.client
            .modify(Collection::SnapshotRule, id, &RuleBody::from(&plan))
            .await
            .map_err(|e| {
                Error::operation(
                    "Error updating snapshotRule",
                    &format!("Could not update snapshotRuleID {}: ", id),
                    &e,
                )
            })?;

        self.fetch(id, &plan)
            .await
            .map_err(|e| MESSAGES.updated_refresh(&e))
    }

    async fn delete(&self, state: SnapshotRuleState) -> Result<()> {
        let id = id_of(&state.id);
        let body = json!({"delete_snaps": state.delete_snaps.unwrap_or(false)});
        self.client
            .delete_with(Collection::SnapshotRule, id, &body)
            .await
            .map_err(|e| {
                Error::operation(
                    "Error deleting snapshotRule",
                    &format!("Could not delete snapshotRuleID {}: ", id),
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
    use serde_json::Value;
    use std::sync::Arc;

    fn setup() -> (Arc<InMemoryArray>, JsonResource<SnapshotRuleResource>) {
        let array = Arc::new(InMemoryArray::with_fixtures());
        let client = PowerStoreClient::new(array.clone());
        (array, JsonResource(SnapshotRuleResource::new(client)))
    }

    #[test]
    fn test_trim_seconds() {
        assert_eq!(trim_seconds("21:30:00").as_deref(), Some("21:30"));
        assert_eq!(trim_seconds("21:30").as_deref(), Some("21:30"));
        assert_eq!(trim_seconds(""), None);
    }

    #[tokio::test]
    async fn test_create_daily_rule() {
        let (array, handler) = setup();
        let state = handler
            .create(&json!({
                "name": "daily",
                "time_of_day": "21:30",
                "timezone": "Asia__Kolkata",
                "desired_retention": 56,
            }))
            .await
            .unwrap();

        assert_eq!(state["time_of_day"], "21:30");
        assert_eq!(state["timezone"], "Asia__Kolkata");
        assert_eq!(state["interval"], Value::Null);
        assert_eq!(state["days_of_week"], json!(DAYS_OF_WEEK));
        assert_eq!(state["nas_access_type"], "Snapshot");
        assert_eq!(state["is_read_only"], false);
        assert_eq!(state["delete_snaps"], false);

        let stored = array
            .entity(Collection::SnapshotRule, state["id"].as_str().unwrap())
            .unwrap();
        assert_eq!(stored["time_of_day"], "21:30:00");
    }

    #[tokio::test]
    async fn test_schedule_conflicts_are_rejected() {
        let (array, handler) = setup();
        let err = handler
            .create(&json!({
                "name": "bad",
                "interval": "One_Hour",
                "time_of_day": "21:30",
                "timezone": "UTC",
                "desired_retention": 1,
            }))
            .await
            .unwrap_err();
        assert_matches!(err, Error::Validation { .. });

        let err = handler
            .create(&json!({"name": "bad", "time_of_day": "21:30", "desired_retention": 1}))
            .await
            .unwrap_err();
        assert_matches!(err, Error::Validation { .. });

        let err = handler
            .create(&json!({"name": "bad", "interval": "One_Hour", "timezone": "Mars", "desired_retention": 1}))
            .await
            .unwrap_err();
        assert_matches!(err, Error::Validation { .. });
        assert_eq!(array.count(Collection::SnapshotRule), 0);
    }

    #[tokio::test]
    async fn test_switch_to_interval_and_delete_snaps() {
        let (array, handler) = setup();
        let state = handler
            .create(&json!({
                "name": "rule",
                "time_of_day": "01:00",
                "timezone": "UTC",
                "desired_retention": 24,
                "delete_snaps": true,
            }))
            .await
            .unwrap();

        let updated = handler
            .update(
                &json!({
                    "name": "rule",
                    "interval": "Four_Hours",
                    "desired_retention": 48,
                    "delete_snaps": true,
                }),
                &state,
            )
            .await
            .unwrap();
        assert_eq!(updated["interval"], "Four_Hours");
        assert_eq!(updated["time_of_day"], Value::Null);
        assert_eq!(updated["timezone"], Value::Null);
        assert_eq!(updated["desired_retention"], 48);
        assert_eq!(updated["delete_snaps"], true);

        array.clear_calls();
        handler.delete(&updated).await.unwrap();
        assert_eq!(array.count(Collection::SnapshotRule), 0);
        assert!(array.mutating_calls().iter().any(|c| c.contains("delete_snaps")));
    }

    #[tokio::test]
    async fn test_unconfigured_delete_snaps_plans_default() {
        let (_array, handler) = setup();
        let state = handler
            .create(&json!({
                "name": "rule",
                "interval": "One_Day",
                "desired_retention": 24,
                "delete_snaps": true,
            }))
            .await
            .unwrap();
        assert_eq!(state["delete_snaps"], true);

        let config = json!({"name": "rule", "interval": "One_Day", "desired_retention": 24});
        let planned = handler.plan(&config, Some(&state)).unwrap();
        assert_eq!(planned["delete_snaps"], false);

        let updated = handler.update(&config, &state).await.unwrap();
        assert_eq!(updated["delete_snaps"], false);
    }
}
