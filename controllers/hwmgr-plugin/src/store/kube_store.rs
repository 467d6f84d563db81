//! API server backed object store.

use super::{ObjectStore, StoreError};
use k8s_openapi::NamespaceResourceScope;
use kube::api::{DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::{Api, Client, Resource, ResourceExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::marker::PhantomData;
use tracing::debug;

/// `ObjectStore` over `kube::Api`.
pub struct KubeStore<K> {
    client: Client,
    _kind: PhantomData<fn() -> K>,
}

impl<K> KubeStore<K> {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            _kind: PhantomData,
        }
    }
}

impl<K> KubeStore<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
{
    fn api(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

fn object_name<K: Resource<DynamicType = ()>>(obj: &K) -> Result<String, StoreError> {
    obj.meta()
        .name
        .clone()
        .ok_or_else(|| StoreError::MissingMetadata(format!("{} without a name", K::kind(&()))))
}

#[async_trait::async_trait]
impl<K> ObjectStore<K> for KubeStore<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static,
{
    async fn get(&self, namespace: &str, name: &str) -> Result<K, StoreError> {
        Ok(self.api(namespace).get(name).await?)
    }

    async fn list(&self, namespace: Option<&str>) -> Result<Vec<K>, StoreError> {
        let api = match namespace {
            Some(ns) => self.api(ns),
            None => Api::all(self.client.clone()),
        };
        Ok(api.list(&ListParams::default()).await?.items)
    }

    async fn create(&self, namespace: &str, obj: &K) -> Result<K, StoreError> {
        Ok(self.api(namespace).create(&PostParams::default(), obj).await?)
    }

    async fn replace(&self, namespace: &str, obj: &K) -> Result<K, StoreError> {
        let name = object_name(obj)?;
        Ok(self.api(namespace).replace(&name, &PostParams::default(), obj).await?)
    }

    async fn replace_status(&self, namespace: &str, obj: &K) -> Result<K, StoreError> {
        let name = object_name(obj)?;
        // Carrying resourceVersion makes the merge patch conditional.
        let status = serde_json::to_value(obj)?
            .get("status")
            .cloned()
            .unwrap_or(serde_json::Value::Null);
        let patch = serde_json::json!({
            "metadata": { "resourceVersion": obj.resource_version() },
            "status": status,
        });
        debug!("Patching status of {}/{}", namespace, name);
        Ok(self
            .api(namespace)
            .patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?)
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        self.api(namespace).delete(name, &DeleteParams::default()).await?;
        Ok(())
    }
}
