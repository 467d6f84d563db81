//! In-memory object store for tests.
//!
//! Mirrors the API server semantics the reconciliation core depends on:
//! resourceVersion conflicts on writes, generation bumps on spec changes,
//! status writes that leave spec untouched, and finalizer-gated deletion.
//! Conflicts and read failures can be injected to exercise retry paths.

use super::{ObjectStore, StoreError};
use kube::{Resource, ResourceExt};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

type Key = (String, String);

pub struct MemoryStore<K> {
    objects: Mutex<BTreeMap<Key, K>>,
    next_version: AtomicU64,
    injected_conflicts: AtomicUsize,
    unreachable: Mutex<HashSet<String>>,
    gets: AtomicUsize,
    writes: AtomicUsize,
}

impl<K> Default for MemoryStore<K> {
    fn default() -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            next_version: AtomicU64::new(1),
            injected_conflicts: AtomicUsize::new(0),
            unreachable: Mutex::new(HashSet::new()),
            gets: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}

/// Everything but metadata and status, used to detect spec changes
fn desired_state(value: &Value) -> Value {
    let mut value = value.clone();
    if let Some(map) = value.as_object_mut() {
        map.remove("metadata");
        map.remove("status");
    }
    value
}

impl<K> MemoryStore<K>
where
    K: Resource<DynamicType = ()> + Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds an object, filling in server-assigned metadata.
    pub fn insert(&self, mut obj: K) -> K {
        let version = self.bump();
        let meta = obj.meta_mut();
        meta.resource_version = Some(version.to_string());
        if meta.uid.is_none() {
            meta.uid = Some(format!("uid-{}", version));
        }
        if meta.generation.is_none() {
            meta.generation = Some(1);
        }
        let key = (obj.namespace().unwrap_or_default(), obj.name_any());
        lock(&self.objects).insert(key, obj.clone());
        obj
    }

    /// Current copy of an object, bypassing counters and injected failures
    pub fn fetch(&self, namespace: &str, name: &str) -> Option<K> {
        lock(&self.objects)
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn objects(&self) -> Vec<K> {
        lock(&self.objects).values().cloned().collect()
    }

    /// Fails the next `count` writes with a conflict
    pub fn inject_conflicts(&self, count: usize) {
        self.injected_conflicts.store(count, Ordering::SeqCst);
    }

    /// Makes every read of `name` fail with a retriable error
    pub fn make_unreachable(&self, name: &str) {
        lock(&self.unreachable).insert(name.to_string());
    }

    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    fn bump(&self) -> u64 {
        self.next_version.fetch_add(1, Ordering::SeqCst)
    }

    fn take_injected_conflict(&self) -> bool {
        self.injected_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    /// Shared write path: conflict checks, version bump, status handling.
    fn write(&self, namespace: &str, obj: &K, status_only: bool) -> Result<K, StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let name = obj.name_any();
        if self.take_injected_conflict() {
            return Err(StoreError::Conflict(format!("{}/{} was modified", namespace, name)));
        }

        let key = (namespace.to_string(), name.clone());
        let mut objects = lock(&self.objects);
        let current = objects
            .get(&key)
            .ok_or_else(|| StoreError::NotFound(format!("{}/{}", namespace, name)))?;

        if let Some(version) = obj.resource_version() {
            if current.resource_version().as_deref() != Some(version.as_str()) {
                return Err(StoreError::Conflict(format!(
                    "{}/{}: resourceVersion {} is stale",
                    namespace, name, version
                )));
            }
        }

        let current_value = serde_json::to_value(current)?;
        let incoming_value = serde_json::to_value(obj)?;
        let mut merged = if status_only { current_value.clone() } else { incoming_value.clone() };
        let status_source = if status_only { &incoming_value } else { &current_value };
        if let Some(map) = merged.as_object_mut() {
            match status_source.get("status") {
                Some(status) => map.insert("status".to_string(), status.clone()),
                None => map.remove("status"),
            };
        }

        let mut updated: K = serde_json::from_value(merged)?;
        let generation = current.meta().generation.unwrap_or(1);
        let spec_changed =
            !status_only && desired_state(&current_value) != desired_state(&incoming_value);
        let meta = updated.meta_mut();
        meta.resource_version = Some(self.bump().to_string());
        meta.generation = Some(if spec_changed { generation + 1 } else { generation });
        meta.uid.clone_from(&current.meta().uid);
        if status_only {
            meta.deletion_timestamp.clone_from(&current.meta().deletion_timestamp);
        }

        let releasable = updated.meta().deletion_timestamp.is_some() && updated.finalizers().is_empty();
        if releasable {
            objects.remove(&key);
        } else {
            objects.insert(key, updated.clone());
        }
        Ok(updated)
    }
}

#[async_trait::async_trait]
impl<K> ObjectStore<K> for MemoryStore<K>
where
    K: Resource<DynamicType = ()> + Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn get(&self, namespace: &str, name: &str) -> Result<K, StoreError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if lock(&self.unreachable).contains(name) {
            return Err(StoreError::Retriable(format!("{}/{} is unreachable", namespace, name)));
        }
        self.fetch(namespace, name)
            .ok_or_else(|| StoreError::NotFound(format!("{}/{}", namespace, name)))
    }

    async fn list(&self, namespace: Option<&str>) -> Result<Vec<K>, StoreError> {
        Ok(lock(&self.objects)
            .iter()
            .filter(|((ns, _), _)| namespace.is_none_or(|wanted| wanted == ns))
            .map(|(_, obj)| obj.clone())
            .collect())
    }

    async fn create(&self, namespace: &str, obj: &K) -> Result<K, StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let name = obj.name_any();
        if self.fetch(namespace, &name).is_some() {
            return Err(StoreError::AlreadyExists(format!("{}/{}", namespace, name)));
        }
        let mut obj = obj.clone();
        obj.meta_mut().namespace = Some(namespace.to_string());
        obj.meta_mut().uid = None;
        obj.meta_mut().generation = None;
        Ok(self.insert(obj))
    }

    async fn replace(&self, namespace: &str, obj: &K) -> Result<K, StoreError> {
        self.write(namespace, obj, false)
    }

    async fn replace_status(&self, namespace: &str, obj: &K) -> Result<K, StoreError> {
        self.write(namespace, obj, true)
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        let key = (namespace.to_string(), name.to_string());
        let mut objects = lock(&self.objects);
        let Some(current) = objects.get_mut(&key) else {
            return Err(StoreError::NotFound(format!("{}/{}", namespace, name)));
        };

        if current.finalizers().is_empty() {
            objects.remove(&key);
            return Ok(());
        }

        if current.meta().deletion_timestamp.is_none() {
            current.meta_mut().deletion_timestamp =
                Some(serde_json::from_value(serde_json::json!("2024-01-01T00:00:00Z"))?);
            current.meta_mut().resource_version = Some(self.bump().to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::ConfigMap;
    use kube::api::ObjectMeta;

    fn config_map(name: &str) -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("ns".to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_stale_write_is_rejected() {
        let store = MemoryStore::new();
        store.insert(config_map("cm"));

        let first = store.get("ns", "cm").await.expect("get");
        let second = store.get("ns", "cm").await.expect("get");

        store.replace("ns", &first).await.expect("first write succeeds");
        let err = store.replace("ns", &second).await.expect_err("second write is stale");
        assert!(err.is_conflict());
    }

    #[tokio::test]
    async fn test_delete_with_finalizer_marks_deletion() {
        let store = MemoryStore::new();
        let mut cm = config_map("cm");
        cm.metadata.finalizers = Some(vec!["example/finalizer".to_string()]);
        store.insert(cm);

        store.delete("ns", "cm").await.expect("delete");
        let mut marked = store.fetch("ns", "cm").expect("still present");
        assert!(marked.metadata.deletion_timestamp.is_some());

        marked.metadata.finalizers = Some(Vec::new());
        store.replace("ns", &marked).await.expect("remove finalizer");
        assert!(store.fetch("ns", "cm").is_none());
    }

    #[tokio::test]
    async fn test_injected_conflicts_are_consumed() {
        let store = MemoryStore::new();
        store.insert(config_map("cm"));
        store.inject_conflicts(1);

        let cm = store.get("ns", "cm").await.expect("get");
        assert!(store.replace("ns", &cm).await.expect_err("injected").is_conflict());
        store.replace("ns", &cm).await.expect("second write succeeds");
        assert_eq!(store.write_count(), 2);
    }
}
