//! Data sources
//!
//! Every data source is the same lookup over one collection, parameterized
//! by a [`LookupSpec`]. A lookup goes, in order of precedence:
//! 1. by `id`
//! 2. by `filter_expression`
//! 3. by `name` and scope attributes such as `nas_server_id`
//! 4. otherwise everything in the collection
//!
//! Base filters (for example `type=neq.Snapshot`) apply to every list call.

use super::filter::{parse_filter_expression, reject_keys};
use crate::client::{
    Entity, FileSystem, Host, HostGroup, NasServer, NfsExport, PowerStoreClient, ProtectionPolicy,
    RemoteSystem, ReplicationRule, SmbShare, SnapshotRule, Volume, VolumeGroup,
};
use crate::domain::ports::ListQuery;
use crate::error::{Error, Result};
use crate::framework::{Attribute, DataSource, DataSourceHandler, JsonDataSource, Schema, Validator};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::marker::PhantomData;
use tracing::debug;

/// An extra attribute that narrows the listing to one parent
#[derive(Debug, Clone, Copy)]
pub struct Scope {
    pub attribute: &'static str,
    /// Entity field the attribute filters on
    pub field: &'static str,
    pub description: &'static str,
}

/// Static description of one data source
#[derive(Debug, Clone, Copy)]
pub struct LookupSpec {
    pub type_name: &'static str,
    pub description: &'static str,
    /// Used in "Unable to Read PowerStore <label>"
    pub label: &'static str,
    /// Name of the computed output list
    pub output: &'static str,
    pub base_filters: &'static [(&'static str, &'static str)],
    /// Filter keys the data source sets itself
    pub forbidden_keys: &'static [&'static str],
    pub scopes: &'static [Scope],
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LookupConfig {
    pub id: Option<String>,
    pub name: Option<String>,
    pub filter_expression: Option<String>,
    #[serde(flatten)]
    pub scopes: BTreeMap<String, Value>,
}

impl LookupConfig {
    fn scope(&self, attribute: &str) -> Option<&str> {
        self.scopes
            .get(attribute)
            .and_then(Value::as_str)
            .filter(|v| !v.is_empty())
    }

    fn scoped(&self) -> bool {
        self.scopes.keys().any(|k| self.scope(k).is_some())
    }
}

/// Lookup of entities of type `T`
pub struct EntityLookup<T> {
    spec: LookupSpec,
    client: PowerStoreClient,
    _entity: PhantomData<fn() -> T>,
}

impl<T: Entity> EntityLookup<T> {
    pub fn new(spec: LookupSpec, client: PowerStoreClient) -> Self {
        Self {
            spec,
            client,
            _entity: PhantomData,
        }
    }

    fn failure(&self, prefix: String, err: &Error) -> Error {
        Error::operation(format!("Unable to Read PowerStore {}", self.spec.label), &prefix, err)
    }

    fn base_query(&self) -> ListQuery {
        self.spec
            .base_filters
            .iter()
            .fold(ListQuery::new(), |query, (key, value)| query.with(*key, *value))
    }

    async fn find(&self, config: &LookupConfig) -> Result<Vec<T>> {
        let label = self.spec.label;

        if let Some(id) = config.id.as_deref() {
            let entity = self
                .client
                .get::<T>(id)
                .await
                .map_err(|e| self.failure(format!("Could not read {} with id {}: ", label, id), &e))?;
            return Ok(vec![entity]);
        }

        if let Some(raw) = config.filter_expression.as_deref() {
            let filters = parse_filter_expression(raw)?;
            reject_keys(&filters, self.spec.forbidden_keys)?;
            let query = self.base_query().extend(filters);
            debug!("Listing {} with filter {:?}", label, query.params);
            return self
                .client
                .list_where::<T>(&query)
                .await
                .map_err(|e| self.failure(format!("Could not read {} with error ", label), &e));
        }

        let mut query = self.base_query();
        if let Some(name) = config.name.as_deref() {
            query = query.eq("name", name);
        }
        for scope in self.spec.scopes {
            if let Some(value) = config.scope(scope.attribute) {
                query = query.eq(scope.field, value);
            }
        }
        let found = self
            .client
            .list_where::<T>(&query)
            .await
            .map_err(|e| self.failure(format!("Could not read {} with error ", label), &e))?;

        match config.name.as_deref() {
            Some(name) if found.is_empty() => {
                let missing = Error::NotFound {
                    kind: T::KIND.to_string(),
                    id: name.to_string(),
                };
                Err(self.failure(format!("Could not read {} with name {}: ", label, name), &missing))
            }
            _ => Ok(found),
        }
    }
}

#[async_trait]
impl<T: Entity + 'static> DataSource for EntityLookup<T> {
    type Config = LookupConfig;
    type State = Value;

    fn type_name(&self) -> &'static str {
        self.spec.type_name
    }

    fn schema(&self) -> Schema {
        let scopes = self.spec.scopes.iter().map(|scope| {
            Attribute::string(scope.attribute)
                .optional()
                .validate(Validator::LengthAtLeast(1))
                .describe(scope.description)
        });
        Schema::new(self.spec.description)
            .attribute(
                Attribute::string("id")
                    .optional()
                    .validate(Validator::LengthAtLeast(1))
                    .validate(Validator::ConflictsWith(&["name", "filter_expression"]))
                    .describe("Unique identifier. Conflicts with `name` and `filter_expression`."),
            )
            .attribute(
                Attribute::string("name")
                    .optional()
                    .validate(Validator::LengthAtLeast(1))
                    .validate(Validator::ConflictsWith(&["filter_expression"]))
                    .describe("Name to look up. Conflicts with `id` and `filter_expression`."),
            )
            .attributes(scopes)
            .attribute(
                Attribute::string("filter_expression")
                    .optional()
                    .describe("PowerStore filter expression, e.g. `name=ilike.prod*`. Conflicts with every other argument."),
            )
            .attribute(Attribute::output_list(self.spec.output).describe("Entities found by the lookup."))
    }

    fn validate(&self, config: &LookupConfig) -> Result<()> {
        if config.scoped() && (config.id.is_some() || config.filter_expression.is_some()) {
            let names: Vec<&str> = self.spec.scopes.iter().map(|s| s.attribute).collect();
            return Err(Error::validation(
                "Invalid Attribute Combination",
                format!(
                    "{} cannot be combined with `id` or `filter_expression`",
                    names.join(", ")
                ),
            ));
        }
        Ok(())
    }

    async fn read(&self, config: LookupConfig) -> Result<Value> {
        let found = self.find(&config).await?;
        debug!("{} lookup matched {} entities", self.spec.type_name, found.len());

        let mut state = Map::new();
        for (key, value) in [
            ("id", &config.id),
            ("name", &config.name),
            ("filter_expression", &config.filter_expression),
        ] {
            if let Some(value) = value {
                state.insert(key.into(), Value::String(value.clone()));
            }
        }
        for (key, value) in config.scopes {
            if !value.is_null() {
                state.insert(key, value);
            }
        }
        let items = found
            .iter()
            .map(serde_json::to_value)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        state.insert(self.spec.output.into(), Value::Array(items));
        Ok(Value::Object(state))
    }
}

// =============================================================================
// Catalogue
// =============================================================================

const NOT_SNAPSHOT: &[(&str, &str)] = &[("type", "neq.Snapshot")];
const ONLY_SNAPSHOT: &[(&str, &str)] = &[("type", "eq.Snapshot")];
const NONE: &[(&str, &str)] = &[];

const NAS_SERVER_SCOPE: Scope = Scope {
    attribute: "nas_server_id",
    field: "nas_server_id",
    description: "NAS server ID. Conflicts with `id` and `filter_expression`.",
};

pub const FILESYSTEM: LookupSpec = LookupSpec {
    type_name: "filesystem",
    description: "This datasource is used to query the existing File System from PowerStore array. \
                  The information fetched from this datasource can be used for getting the details \
                  for further processing in resource block.",
    label: "File Systems",
    output: "filesystems",
    base_filters: &[("filesystem_type", "eq.Primary")],
    forbidden_keys: &["filesystem_type"],
    scopes: &[NAS_SERVER_SCOPE],
};

pub const FILESYSTEM_SNAPSHOT: LookupSpec = LookupSpec {
    type_name: "filesystem_snapshot",
    description: "This datasource is used to query the existing File System Snapshot from PowerStore array.",
    label: "File System Snapshots",
    output: "filesystem_snapshots",
    base_filters: &[("filesystem_type", "eq.Snapshot")],
    forbidden_keys: &["filesystem_type"],
    scopes: &[
        Scope {
            attribute: "filesystem_id",
            field: "parent_id",
            description: "Parent file system ID of the snapshot. Conflicts with `id` and `filter_expression`.",
        },
        NAS_SERVER_SCOPE,
    ],
};

pub const HOST: LookupSpec = LookupSpec {
    type_name: "host",
    description: "This datasource is used to query the existing host from PowerStore array.",
    label: "Hosts",
    output: "host",
    base_filters: NONE,
    forbidden_keys: &[],
    scopes: &[],
};

pub const HOSTGROUP: LookupSpec = LookupSpec {
    type_name: "hostgroup",
    description: "This datasource is used to query the existing host group from PowerStore array.",
    label: "Host Group",
    output: "host_groups",
    base_filters: NONE,
    forbidden_keys: &[],
    scopes: &[],
};

pub const NAS_SERVER: LookupSpec = LookupSpec {
    type_name: "nas_server",
    description: "This datasource is used to query the existing NAS servers from PowerStore array.",
    label: "NAS Servers",
    output: "nas_servers",
    base_filters: NONE,
    forbidden_keys: &[],
    scopes: &[],
};

pub const NFS_EXPORT: LookupSpec = LookupSpec {
    type_name: "nfs_export",
    description: "This datasource is used to query the existing NFS exports from PowerStore array.",
    label: "NFS Exports",
    output: "nfs_exports",
    base_filters: NONE,
    forbidden_keys: &[],
    scopes: &[Scope {
        attribute: "file_system_id",
        field: "file_system_id",
        description: "File system ID of the exports. Conflicts with `id` and `filter_expression`.",
    }],
};

pub const SMB_SHARE: LookupSpec = LookupSpec {
    type_name: "smb_share",
    description: "This datasource is used to query the existing SMB shares from PowerStore array.",
    label: "SMB Shares",
    output: "smb_shares",
    base_filters: NONE,
    forbidden_keys: &[],
    scopes: &[Scope {
        attribute: "file_system_id",
        field: "file_system_id",
        description: "File system ID of the shares. Conflicts with `id` and `filter_expression`.",
    }],
};

pub const PROTECTION_POLICY: LookupSpec = LookupSpec {
    type_name: "protectionpolicy",
    description: "This datasource is used to query the existing protection policies from PowerStore array.",
    label: "Protection Policy",
    output: "policies",
    base_filters: NONE,
    forbidden_keys: &[],
    scopes: &[],
};

pub const REMOTE_SYSTEM: LookupSpec = LookupSpec {
    type_name: "remote_system",
    description: "This datasource is used to query the existing remote systems from PowerStore array.",
    label: "Remote Systems",
    output: "remote_systems",
    base_filters: NONE,
    forbidden_keys: &[],
    scopes: &[],
};

pub const REPLICATION_RULE: LookupSpec = LookupSpec {
    type_name: "replication_rule",
    description: "This datasource is used to query the existing replication rules from PowerStore array.",
    label: "Replication Rules",
    output: "replication_rules",
    base_filters: NONE,
    forbidden_keys: &[],
    scopes: &[],
};

pub const SNAPSHOT_RULE: LookupSpec = LookupSpec {
    type_name: "snapshotrule",
    description: "This datasource is used to query the existing snapshot rules from PowerStore array.",
    label: "Snapshot Rules",
    output: "snapshot_rules",
    base_filters: NONE,
    forbidden_keys: &[],
    scopes: &[],
};

pub const VOLUME: LookupSpec = LookupSpec {
    type_name: "volume",
    description: "This datasource is used to query the existing volume from PowerStore array.",
    label: "Volumes",
    output: "volumes",
    base_filters: NOT_SNAPSHOT,
    forbidden_keys: &["type"],
    scopes: &[],
};

pub const VOLUMEGROUP: LookupSpec = LookupSpec {
    type_name: "volumegroup",
    description: "This datasource is used to query the existing volume group from PowerStore array.",
    label: "Volume Group",
    output: "volume_groups",
    base_filters: NOT_SNAPSHOT,
    forbidden_keys: &["type"],
    scopes: &[],
};

pub const VOLUMEGROUP_SNAPSHOT: LookupSpec = LookupSpec {
    type_name: "volumegroup_snapshot",
    description: "This datasource is used to query the existing volume group snapshot from PowerStore array.",
    label: "Volume Group Snapshot",
    output: "volume_groups",
    base_filters: ONLY_SNAPSHOT,
    forbidden_keys: &["type"],
    scopes: &[],
};

pub const VOLUME_SNAPSHOT: LookupSpec = LookupSpec {
    type_name: "volume_snapshot",
    description: "This datasource is used to query the existing volume snapshot from PowerStore array.",
    label: "Volume Snapshots",
    output: "volumes",
    base_filters: ONLY_SNAPSHOT,
    forbidden_keys: &["type"],
    scopes: &[],
};

fn lookup<T: Entity + 'static>(spec: LookupSpec, client: &PowerStoreClient) -> Box<dyn DataSourceHandler> {
    Box::new(JsonDataSource(EntityLookup::<T>::new(spec, client.clone())))
}

/// Every data source, ready to register
pub fn all(client: &PowerStoreClient) -> Vec<Box<dyn DataSourceHandler>> {
    vec![
        lookup::<FileSystem>(FILESYSTEM, client),
        lookup::<FileSystem>(FILESYSTEM_SNAPSHOT, client),
        lookup::<Host>(HOST, client),
        lookup::<HostGroup>(HOSTGROUP, client),
        lookup::<NasServer>(NAS_SERVER, client),
        lookup::<NfsExport>(NFS_EXPORT, client),
        lookup::<SmbShare>(SMB_SHARE, client),
        lookup::<ProtectionPolicy>(PROTECTION_POLICY, client),
        lookup::<RemoteSystem>(REMOTE_SYSTEM, client),
        lookup::<ReplicationRule>(REPLICATION_RULE, client),
        lookup::<SnapshotRule>(SNAPSHOT_RULE, client),
        lookup::<Volume>(VOLUME, client),
        lookup::<VolumeGroup>(VOLUMEGROUP, client),
        lookup::<VolumeGroup>(VOLUMEGROUP_SNAPSHOT, client),
        lookup::<Volume>(VOLUME_SNAPSHOT, client),
    ]
}
