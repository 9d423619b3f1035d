//! PowerStore provider
//!
//! The provider owns one configured array client and the registry of every
//! resource and data source type built on it. Handlers are looked up by
//! type name, with or without the `powerstore_` prefix.

pub mod datasources;
pub mod filter;
pub mod hostset;
pub mod resources;

use crate::client::{InMemoryArray, PowerStoreClient, RestClient};
use crate::config::ProviderConfig;
use crate::domain::ports::PowerStoreApiRef;
use crate::error::{Error, Result};
use crate::framework::{
    Attribute, DataSourceHandler, JsonResource, ResourceHandler, Schema, Validator, TYPE_PREFIX,
};
use resources::*;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{error, info};

/// Schema of the provider block itself
pub fn provider_schema() -> Schema {
    Schema::new("The Terraform provider for Dell PowerStore can be used to interact with a Dell PowerStore array in order to manage the array resources.")
        .attribute(
            Attribute::string("endpoint")
                .required()
                .describe("IP or FQDN of the PowerStore host"),
        )
        .attribute(
            Attribute::string("username")
                .required()
                .validate(Validator::LengthAtLeast(1))
                .describe("The username of the PowerStore host."),
        )
        .attribute(
            Attribute::string("password")
                .required()
                .sensitive()
                .describe("The password of the PowerStore host."),
        )
        .attribute(
            Attribute::bool("insecure")
                .optional()
                .describe("Boolean variable to specify whether to validate SSL certificate or not."),
        )
        .attribute(
            Attribute::int("timeout")
                .optional()
                .describe("The default timeout value for the Powerstore host."),
        )
}

/// Registry of resource and data source handlers over one array
pub struct PowerStoreProvider {
    client: PowerStoreClient,
    resources: BTreeMap<&'static str, Arc<dyn ResourceHandler>>,
    data_sources: BTreeMap<&'static str, Arc<dyn DataSourceHandler>>,
}

impl PowerStoreProvider {
    /// Build the registry on top of any array transport
    pub fn with_api(api: PowerStoreApiRef) -> Self {
        let client = PowerStoreClient::new(api);

        let handlers: Vec<Arc<dyn ResourceHandler>> = vec![
            Arc::new(JsonResource(FileSystemResource::new(client.clone()))),
            Arc::new(JsonResource(FileSystemSnapshotResource::new(client.clone()))),
            Arc::new(JsonResource(HostResource::new(client.clone()))),
            Arc::new(JsonResource(HostGroupResource::new(client.clone()))),
            Arc::new(JsonResource(NfsExportResource::new(client.clone()))),
            Arc::new(JsonResource(SmbShareResource::new(client.clone()))),
            Arc::new(JsonResource(VolumeSnapshotResource::new(client.clone()))),
            Arc::new(JsonResource(VolumeGroupSnapshotResource::new(client.clone()))),
            Arc::new(JsonResource(SnapshotRuleResource::new(client.clone()))),
            Arc::new(JsonResource(ReplicationRuleResource::new(client.clone()))),
            Arc::new(JsonResource(VolumeResource::new(client.clone()))),
            Arc::new(JsonResource(VolumeGroupResource::new(client.clone()))),
            Arc::new(JsonResource(ProtectionPolicyResource::new(client.clone()))),
            Arc::new(JsonResource(StorageContainerResource::new(client.clone()))),
        ];
        let resources = handlers.into_iter().map(|h| (h.type_name(), h)).collect();

        let data_sources = datasources::all(&client)
            .into_iter()
            .map(|d| {
                let d: Arc<dyn DataSourceHandler> = Arc::from(d);
                (d.type_name(), d)
            })
            .collect();

        Self {
            client,
            resources,
            data_sources,
        }
    }

    /// Log in to the array and build the registry
    pub async fn configure(config: &ProviderConfig) -> Result<Self> {
        config.validate()?;
        let client = RestClient::connect(config).await.map_err(|e| {
            error!("Login to {} failed: {}", config.endpoint, e);
            Error::operation("Unable to create powerstore client", "", &e)
        })?;
        info!("Connected to PowerStore array at {}", config.endpoint);
        Ok(Self::with_api(Arc::new(client)))
    }

    /// Provider backed by an in-process array with a few fixtures
    pub fn simulated() -> Self {
        info!("Using the in-memory PowerStore array");
        Self::with_api(Arc::new(InMemoryArray::with_fixtures()))
    }

    pub fn backend_name(&self) -> &str {
        self.client.api().backend_name()
    }

    /// Round trip to the array, used by readiness checks
    pub async fn check_connection(&self) -> Result<()> {
        self.client.system_time().await.map(|_| ())
    }

    pub fn resource(&self, type_name: &str) -> Result<Arc<dyn ResourceHandler>> {
        let key = strip_prefix(type_name);
        self.resources
            .get(key)
            .cloned()
            .ok_or_else(|| Error::UnknownType {
                kind: "resource".into(),
                name: type_name.to_string(),
            })
    }

    pub fn data_source(&self, type_name: &str) -> Result<Arc<dyn DataSourceHandler>> {
        let key = strip_prefix(type_name);
        self.data_sources
            .get(key)
            .cloned()
            .ok_or_else(|| Error::UnknownType {
                kind: "data source".into(),
                name: type_name.to_string(),
            })
    }

    /// Registered resource type names, prefixed
    pub fn resource_types(&self) -> Vec<String> {
        self.resources.keys().map(|k| format!("{}{}", TYPE_PREFIX, k)).collect()
    }

    /// Registered data source type names, prefixed
    pub fn data_source_types(&self) -> Vec<String> {
        self.data_sources.keys().map(|k| format!("{}{}", TYPE_PREFIX, k)).collect()
    }

    /// Provider, resource and data source schemas as one document
    pub fn schema(&self) -> Result<Value> {
        let mut resources = Map::new();
        for (name, handler) in &self.resources {
            resources.insert(format!("{}{}", TYPE_PREFIX, name), serde_json::to_value(handler.schema())?);
        }
        let mut data_sources = Map::new();
        for (name, handler) in &self.data_sources {
            data_sources.insert(format!("{}{}", TYPE_PREFIX, name), serde_json::to_value(handler.schema())?);
        }
        Ok(json!({
            "provider": provider_schema(),
            "resource_schemas": resources,
            "data_source_schemas": data_sources,
        }))
    }

    /// Copy of a resource document with sensitive attributes masked, for logs
    pub fn redacted(&self, type_name: &str, document: &Value) -> Value {
        match self.resource(type_name) {
            Ok(handler) => handler.schema().redact(document),
            Err(_) => document.clone(),
        }
    }
}

fn strip_prefix(type_name: &str) -> &str {
    type_name.strip_prefix(TYPE_PREFIX).unwrap_or(type_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn test_registry_contents() {
        let provider = PowerStoreProvider::simulated();
        assert_eq!(provider.resource_types().len(), 14);
        assert_eq!(provider.data_source_types().len(), 15);
        assert!(provider.resource_types().contains(&"powerstore_nfs_export".to_string()));
        assert_eq!(provider.backend_name(), "in-memory");
    }

    #[test]
    fn test_lookup_with_and_without_prefix() {
        let provider = PowerStoreProvider::simulated();
        assert_eq!(provider.resource("powerstore_filesystem").unwrap().type_name(), "filesystem");
        assert_eq!(provider.resource("host").unwrap().type_name(), "host");
        assert_eq!(
            provider.data_source("powerstore_volumegroup_snapshot").unwrap().type_name(),
            "volumegroup_snapshot"
        );
        assert_matches!(
            provider.resource("powerstore_lun").err(),
            Some(Error::UnknownType { ref name, .. }) if name == "powerstore_lun"
        );
        assert_matches!(
            provider.data_source("powerstore_lun").err(),
            Some(Error::UnknownType { ref kind, .. }) if kind == "data source"
        );
    }

    #[test]
    fn test_schema_document() {
        let provider = PowerStoreProvider::simulated();
        let doc = provider.schema().unwrap();
        assert!(doc["resource_schemas"]["powerstore_smb_share"]["attributes"].is_array());
        assert!(doc["data_source_schemas"]["powerstore_filesystem"].is_object());
        assert_eq!(provider_schema().sensitive_attributes(), vec!["password"]);
    }

    #[test]
    fn test_redacted() {
        let provider = PowerStoreProvider::simulated();
        let doc = json!({"name": "h1", "initiators": [{"port_name": "iqn.1", "chap_single_password": "secret"}]});
        let masked = provider.redacted("powerstore_host", &doc);
        assert_eq!(masked["name"], "h1");
        assert_eq!(masked["initiators"][0]["chap_single_password"], "<sensitive>");
    }

    #[tokio::test]
    async fn test_check_connection() {
        let provider = PowerStoreProvider::simulated();
        assert!(provider.check_connection().await.is_ok());
    }

    #[tokio::test]
    async fn test_configure_requires_endpoint() {
        let config = ProviderConfig {
            endpoint: String::new(),
            username: "admin".into(),
            password: "secret".into(),
            insecure: false,
            timeout: 120,
        };
        let err = PowerStoreProvider::configure(&config).await.err().unwrap();
        assert_matches!(err, Error::Configuration(_));
    }
}
