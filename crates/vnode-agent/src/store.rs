//! In-memory record of the workloads placed on this node

use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;
use vnode_core::{Error, Result, Workload, WorkloadKey};

/// Authoritative mapping from workload key to workload record
///
/// Readers share the lock; `put` and `delete` take it exclusively. Records
/// are handed out as `Arc`s so a snapshot stays valid after the lock is
/// released.
#[derive(Debug, Clone, Default)]
pub struct NodeStateStore {
    workloads: Arc<RwLock<HashMap<WorkloadKey, Arc<Workload>>>>,
    stats: Arc<StoreStats>,
}

/// Store statistics
#[derive(Debug, Default)]
pub struct StoreStats {
    pub puts: AtomicU64,
    pub deletes: AtomicU64,
    pub queries: AtomicU64,
}

/// Point-in-time copy of [`StoreStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StoreStatsSnapshot {
    pub puts: u64,
    pub deletes: u64,
    pub queries: u64,
    pub entries: usize,
}

impl NodeStateStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the record stored under `key`
    ///
    /// Returns the record that was replaced, if any.
    pub async fn put(&self, key: WorkloadKey, workload: Workload) -> Option<Arc<Workload>> {
        let mut workloads = self.workloads.write().await;
        let previous = workloads.insert(key.clone(), Arc::new(workload));
        self.stats.puts.fetch_add(1, Ordering::Relaxed);
        debug!("Stored workload {} (replaced: {})", key, previous.is_some());
        previous
    }

    /// Fetch the record stored under `key`
    pub async fn get(&self, key: &WorkloadKey) -> Option<Arc<Workload>> {
        self.stats.queries.fetch_add(1, Ordering::Relaxed);
        self.workloads.read().await.get(key).cloned()
    }

    /// Remove the record stored under `key`
    pub async fn delete(&self, key: &WorkloadKey) -> Result<Arc<Workload>> {
        let removed = self.workloads.write().await.remove(key);
        match removed {
            Some(workload) => {
                self.stats.deletes.fetch_add(1, Ordering::Relaxed);
                debug!("Removed workload {}", key);
                Ok(workload)
            }
            None => Err(Error::not_found(format!("workload {}", key))),
        }
    }

    /// Snapshot of every stored record, in no particular order
    pub async fn list(&self) -> Vec<Arc<Workload>> {
        self.stats.queries.fetch_add(1, Ordering::Relaxed);
        self.workloads.read().await.values().cloned().collect()
    }

    pub async fn contains(&self, key: &WorkloadKey) -> bool {
        self.workloads.read().await.contains_key(key)
    }

    pub async fn len(&self) -> usize {
        self.workloads.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.workloads.read().await.is_empty()
    }

    /// Current statistics
    pub async fn stats(&self) -> StoreStatsSnapshot {
        StoreStatsSnapshot {
            puts: self.stats.puts.load(Ordering::Relaxed),
            deletes: self.stats.deletes.load(Ordering::Relaxed),
            queries: self.stats.queries.load(Ordering::Relaxed),
            entries: self.len().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(ns: &str, name: &str) -> WorkloadKey {
        WorkloadKey::build(ns, name).unwrap()
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = NodeStateStore::new();
        assert!(store.is_empty().await);

        let workload = Workload::new("default", "web").with_container("app", "nginx");
        assert!(store.put(key("default", "web"), workload.clone()).await.is_none());

        let stored = store.get(&key("default", "web")).await.unwrap();
        assert_eq!(*stored, workload);
        assert!(store.contains(&key("default", "web")).await);
        assert_eq!(store.len().await, 1);

        let removed = store.delete(&key("default", "web")).await.unwrap();
        assert_eq!(*removed, workload);
        assert!(store.get(&key("default", "web")).await.is_none());
    }

    #[tokio::test]
    async fn test_put_replaces_wholesale() {
        let store = NodeStateStore::new();
        let k = key("default", "web");

        store
            .put(k.clone(), Workload::new("default", "web").with_container("a", "img:1"))
            .await;
        let replaced = store
            .put(k.clone(), Workload::new("default", "web").with_container("b", "img:2"))
            .await;

        assert_eq!(replaced.unwrap().spec.containers[0].name, "a");
        let current = store.get(&k).await.unwrap();
        assert_eq!(current.spec.containers.len(), 1);
        assert_eq!(current.spec.containers[0].name, "b");
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let store = NodeStateStore::new();
        store.put(key("default", "web"), Workload::new("default", "web")).await;

        let err = store.delete(&key("default", "db")).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_keys_do_not_collide() {
        let store = NodeStateStore::new();
        store.put(key("a-b", "c"), Workload::new("a-b", "c")).await;
        store.put(key("a", "b-c"), Workload::new("a", "b-c")).await;

        assert_eq!(store.len().await, 2);
        assert_eq!(store.get(&key("a", "b-c")).await.unwrap().metadata.namespace, "a");
    }

    #[tokio::test]
    async fn test_list_snapshot_outlives_mutation() {
        let store = NodeStateStore::new();
        store.put(key("default", "web"), Workload::new("default", "web")).await;

        let snapshot = store.list().await;
        store.delete(&key("default", "web")).await.unwrap();

        assert_eq!(snapshot.len(), 1);
        assert!(store.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_writers() {
        let store = NodeStateStore::new();
        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let name = format!("w{}", i);
                store
                    .put(key("default", &name), Workload::new("default", name.as_str()))
                    .await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.len().await, 16);
        let stats = store.stats().await;
        assert_eq!(stats.puts, 16);
        assert_eq!(stats.entries, 16);
    }
}
