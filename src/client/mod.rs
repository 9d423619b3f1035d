//! PowerStore Client
//!
//! Typed access to the array on top of a [`PowerStoreApi`] transport:
//! - [`RestClient`]: HTTPS transport against a real array
//! - [`InMemoryArray`]: in-process array used by tests and `--simulate`

pub mod memory;
pub mod models;
pub mod rest;

pub use memory::InMemoryArray;
pub use models::*;
pub use rest::RestClient;

use crate::domain::ports::{Collection, ListQuery, PowerStoreApiRef};
use crate::error::{Error, Result};
use serde::Serialize;
use serde_json::Value;

/// Typed facade over the array transport
///
/// Cheap to clone, every resource handler holds its own copy.
#[derive(Clone)]
pub struct PowerStoreClient {
    api: PowerStoreApiRef,
}

impl PowerStoreClient {
    pub fn new(api: PowerStoreApiRef) -> Self {
        Self { api }
    }

    /// Underlying transport
    pub fn api(&self) -> &PowerStoreApiRef {
        &self.api
    }

    /// Get an entity by id
    pub async fn get<T: Entity>(&self, id: &str) -> Result<T> {
        let value = self.api.get(T::COLLECTION, id).await?;
        decode(value)
    }

    /// Get an entity by its unique name
    pub async fn get_by_name<T: Entity>(&self, name: &str) -> Result<T> {
        let query = ListQuery::new().eq("name", name);
        self.list_where::<T>(&query)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound {
                kind: T::KIND.to_string(),
                id: name.to_string(),
            })
    }

    /// List every entity of a collection
    pub async fn list<T: Entity>(&self) -> Result<Vec<T>> {
        self.list_where(&ListQuery::new()).await
    }

    /// List entities matching a query
    pub async fn list_where<T: Entity>(&self, query: &ListQuery) -> Result<Vec<T>> {
        self.api
            .list(T::COLLECTION, query)
            .await?
            .into_iter()
            .map(decode)
            .collect()
    }

    /// Create an entity, returning the new id
    pub async fn create<B: Serialize>(&self, collection: Collection, body: &B) -> Result<String> {
        self.api.create(collection, serde_json::to_value(body)?).await
    }

    /// Modify an entity
    pub async fn modify<B: Serialize>(
        &self,
        collection: Collection,
        id: &str,
        body: &B,
    ) -> Result<()> {
        self.api
            .modify(collection, id, serde_json::to_value(body)?)
            .await
    }

    /// Delete an entity
    pub async fn delete(&self, collection: Collection, id: &str) -> Result<()> {
        self.api.delete(collection, id, None).await
    }

    /// Delete an entity with a request body
    pub async fn delete_with<B: Serialize>(
        &self,
        collection: Collection,
        id: &str,
        body: &B,
    ) -> Result<()> {
        self.api
            .delete(collection, id, Some(serde_json::to_value(body)?))
            .await
    }

    /// Invoke an action endpoint
    pub async fn action<B: Serialize>(
        &self,
        collection: Collection,
        id: &str,
        action: &str,
        body: &B,
    ) -> Result<Value> {
        self.api
            .action(collection, id, action, serde_json::to_value(body)?)
            .await
    }

    /// Create a snapshot through `{collection}/{id}/snapshot`
    pub async fn snapshot<B: Serialize>(
        &self,
        collection: Collection,
        parent_id: &str,
        body: &B,
    ) -> Result<String> {
        let value = self.action(collection, parent_id, "snapshot", body).await?;
        let created: CreateResponse = serde_json::from_value(value)?;
        Ok(created.id)
    }

    /// Current time on the array, as reported by the cluster
    pub async fn system_time(&self) -> Result<String> {
        let clusters: Vec<Cluster> = self.list().await?;
        clusters
            .into_iter()
            .next()
            .map(|c| c.system_time)
            .ok_or_else(|| Error::NotFound {
                kind: Cluster::KIND.to_string(),
                id: "system_time".to_string(),
            })
    }

    /// Resolve an optional id/name pair to an id
    ///
    /// The id wins when set. An empty name resolves to `None`.
    pub async fn resolve_id<T: Entity + HasId>(
        &self,
        id: Option<&str>,
        name: Option<&str>,
    ) -> Result<Option<String>> {
        if let Some(id) = id.filter(|id| !id.is_empty()) {
            return Ok(Some(id.to_string()));
        }
        match name.filter(|n| !n.is_empty()) {
            Some(name) => Ok(Some(self.get_by_name::<T>(name).await?.id().to_string())),
            None => Ok(None),
        }
    }
}

/// Decode an entity, treating null fields as absent
///
/// The array reports unset strings as `null`; the models default them.
pub fn decode<T: Entity>(mut value: Value) -> Result<T> {
    strip_nulls(&mut value);
    Ok(serde_json::from_value(value)?)
}

fn strip_nulls(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|_, v| !v.is_null());
            map.values_mut().for_each(strip_nulls);
        }
        Value::Array(items) => items.iter_mut().for_each(strip_nulls),
        _ => {}
    }
}

/// Entities that expose their id
pub trait HasId {
    fn id(&self) -> &str;
}

macro_rules! impl_has_id {
    ($($ty:ty),* $(,)?) => {
        $(impl HasId for $ty {
            fn id(&self) -> &str {
                &self.id
            }
        })*
    };
}

impl_has_id!(
    FileSystem,
    NasServer,
    NfsExport,
    SmbShare,
    Host,
    HostGroup,
    Volume,
    VolumeGroup,
    SnapshotRule,
    ReplicationRule,
    ProtectionPolicy,
    RemoteSystem,
    Appliance,
);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_get_by_name_and_resolve() {
        let array = Arc::new(InMemoryArray::new());
        let client = PowerStoreClient::new(array.clone());

        let nas_id = array.seed(Collection::NasServer, json!({"name": "nas1"}));

        let nas: NasServer = client.get_by_name("nas1").await.unwrap();
        assert_eq!(nas.id, nas_id);

        let resolved = client
            .resolve_id::<NasServer>(None, Some("nas1"))
            .await
            .unwrap();
        assert_eq!(resolved.as_deref(), Some(nas_id.as_str()));

        let by_id = client
            .resolve_id::<NasServer>(Some("explicit"), Some("nas1"))
            .await
            .unwrap();
        assert_eq!(by_id.as_deref(), Some("explicit"));

        assert!(client
            .resolve_id::<NasServer>(None, None)
            .await
            .unwrap()
            .is_none());

        let missing = client.get_by_name::<NasServer>("nope").await;
        assert!(missing.unwrap_err().is_not_found());
    }

    #[test]
    fn test_decode_null_fields() {
        let fs: FileSystem = decode(json!({
            "id": "fs-1",
            "description": null,
            "parent_id": null,
            "flr_attributes": {"mode": "None", "default_retention": null}
        }))
        .unwrap();
        assert_eq!(fs.description, "");
        assert!(fs.parent_id.is_none());
        assert_eq!(fs.flr_attributes.default_retention, "");
    }

    #[tokio::test]
    async fn test_system_time() {
        let array = Arc::new(InMemoryArray::new());
        let client = PowerStoreClient::new(array);
        let time = client.system_time().await.unwrap();
        assert!(time.ends_with('Z'));
    }
}
