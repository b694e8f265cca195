//! Warm container pool (C3)
//!
//! Tracks running containers keyed by id, indexed per function, behind a
//! single mutex so borrow/return/insert/evict are linearizable. Container
//! removal (`docker rm -f`) always happens after the lock is released —
//! it's a slow external call and must never be made while holding the
//! lock other invocations are waiting on.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use barq_core::BarqError;
use tracing::{debug, info, warn};

use crate::driver::ContainerDriver;
use crate::function::Runtime;

#[derive(Debug, Clone)]
struct PoolEntry {
    container_id: String,
    func_id: String,
    runtime: Runtime,
    code_hash: String,
    last_used: Instant,
    in_use: bool,
}

struct PoolInner {
    containers: HashMap<String, PoolEntry>,
    func_containers: HashMap<String, Vec<String>>,
}

impl PoolInner {
    fn new() -> Self {
        Self {
            containers: HashMap::new(),
            func_containers: HashMap::new(),
        }
    }

    fn unlink(&mut self, container_id: &str) -> Option<PoolEntry> {
        let entry = self.containers.remove(container_id)?;
        if let Some(ids) = self.func_containers.get_mut(&entry.func_id) {
            ids.retain(|id| id != container_id);
        }
        Some(entry)
    }
}

/// Snapshot of pool occupancy, returned by [`WarmPool::stats`].
#[derive(Debug, Clone, serde::Serialize)]
pub struct PoolStats {
    pub total: usize,
    pub in_use: usize,
    pub idle: usize,
    pub max_containers: usize,
    pub per_function: HashMap<String, usize>,
}

/// Bounded pool of warm containers, one per (function, code version) slot.
pub struct WarmPool {
    inner: Mutex<PoolInner>,
    driver: ContainerDriver,
    max_containers: usize,
    ttl: Duration,
    shutdown: tokio::sync::watch::Sender<bool>,
}

impl WarmPool {
    pub fn new(driver: ContainerDriver, max_containers: usize, ttl: Duration) -> Self {
        let (shutdown, _) = tokio::sync::watch::channel(false);
        Self {
            inner: Mutex::new(PoolInner::new()),
            driver,
            max_containers,
            ttl,
            shutdown,
        }
    }

    /// Borrow an idle warm container for `func_id`, if one with a matching
    /// `code_hash` exists. Marks it in-use and bumps its last-used time.
    pub fn borrow(&self, func_id: &str, code_hash: &str) -> Option<String> {
        let mut inner = self.inner.lock().expect("pool mutex poisoned");
        let candidates = inner.func_containers.get(func_id)?.clone();
        for container_id in candidates {
            if let Some(entry) = inner.containers.get_mut(&container_id) {
                if !entry.in_use && entry.code_hash == code_hash {
                    entry.in_use = true;
                    entry.last_used = Instant::now();
                    debug!(container_id = %container_id, func_id, "reusing warm container");
                    return Some(container_id);
                }
            }
        }
        None
    }

    /// Hand a container back to the pool as idle. Updates `last_used` so the
    /// TTL reaper measures idle time from the point of return, not creation.
    pub fn return_container(&self, container_id: &str) {
        let mut inner = self.inner.lock().expect("pool mutex poisoned");
        if let Some(entry) = inner.containers.get_mut(container_id) {
            entry.in_use = false;
            entry.last_used = Instant::now();
        }
    }

    /// Register a freshly-started container as idle and immediately
    /// borrowable. Evicts the oldest idle container first if the pool is at
    /// capacity; if every container is in use, the insert proceeds anyway —
    /// the cap is soft, not a hard admission limit — and a
    /// [`BarqError::PoolCapacityPressure`] is logged for visibility.
    pub fn insert(&self, container_id: String, func_id: String, runtime: Runtime, code_hash: String) {
        let evicted = {
            let mut inner = self.inner.lock().expect("pool mutex poisoned");

            let evicted = if inner.containers.len() >= self.max_containers {
                let oldest_idle = inner
                    .containers
                    .values()
                    .filter(|e| !e.in_use)
                    .min_by_key(|e| e.last_used)
                    .map(|e| e.container_id.clone());
                if oldest_idle.is_none() {
                    let pressure = BarqError::PoolCapacityPressure(format!(
                        "pool at capacity ({}) with every container in use; admitting {container_id} anyway",
                        self.max_containers
                    ));
                    warn!(func_id, code = pressure.code(), "{pressure}");
                }
                oldest_idle.and_then(|id| inner.unlink(&id))
            } else {
                None
            };

            inner.func_containers
                .entry(func_id.clone())
                .or_default()
                .push(container_id.clone());
            inner.containers.insert(
                container_id.clone(),
                PoolEntry {
                    container_id,
                    func_id,
                    runtime,
                    code_hash,
                    last_used: Instant::now(),
                    in_use: false,
                },
            );

            evicted
        };

        if let Some(entry) = evicted {
            self.schedule_removal(entry.container_id);
        }
    }

    /// Remove a container from the pool and tear it down. Used when a warm
    /// dispatch fails and the container is no longer trustworthy.
    pub fn remove(&self, container_id: &str) {
        let removed = {
            let mut inner = self.inner.lock().expect("pool mutex poisoned");
            inner.unlink(container_id)
        };
        if removed.is_some() {
            self.schedule_removal(container_id.to_string());
        }
    }

    pub fn stats(&self) -> PoolStats {
        let inner = self.inner.lock().expect("pool mutex poisoned");
        let mut per_function = HashMap::new();
        let mut in_use = 0;
        for entry in inner.containers.values() {
            *per_function.entry(entry.func_id.clone()).or_insert(0usize) += 1;
            if entry.in_use {
                in_use += 1;
            }
        }
        PoolStats {
            total: inner.containers.len(),
            in_use,
            idle: inner.containers.len() - in_use,
            max_containers: self.max_containers,
            per_function,
        }
    }

    /// Spawn the background reaper that removes idle containers past their
    /// TTL. Stops as soon as [`WarmPool::shutdown`] signals it to.
    pub fn start_reaper(self: &std::sync::Arc<Self>) {
        let pool = std::sync::Arc::clone(self);
        let mut shutdown = pool.shutdown.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(30)) => {
                        pool.reap_expired().await;
                    }
                    _ = shutdown.changed() => {
                        debug!("reaper stopping on shutdown signal");
                        break;
                    }
                }
            }
        });
    }

    async fn reap_expired(&self) {
        let expired: Vec<String> = {
            let mut inner = self.inner.lock().expect("pool mutex poisoned");
            let now = Instant::now();
            let expired: Vec<String> = inner
                .containers
                .values()
                .filter(|e| !e.in_use && now.duration_since(e.last_used) > self.ttl)
                .map(|e| e.container_id.clone())
                .collect();
            for id in &expired {
                inner.unlink(id);
            }
            expired
        };

        for container_id in expired {
            info!(container_id = %container_id, "evicting expired warm container");
            self.driver.remove(&container_id).await;
        }
    }

    fn schedule_removal(&self, container_id: String) {
        let driver = self.driver.clone();
        tokio::spawn(async move {
            driver.remove(&container_id).await;
        });
    }

    /// Signal the reaper to stop and remove every tracked container. Used on
    /// graceful shutdown.
    pub async fn shutdown(&self) {
        let _ = self.shutdown.send(true);
        let ids: Vec<String> = {
            let mut inner = self.inner.lock().expect("pool mutex poisoned");
            let ids: Vec<String> = inner.containers.keys().cloned().collect();
            inner.containers.clear();
            inner.func_containers.clear();
            ids
        };
        for id in ids {
            self.driver.remove(&id).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool() -> WarmPool {
        WarmPool::new(ContainerDriver::new("bridge"), 2, Duration::from_secs(300))
    }

    #[test]
    fn borrow_returns_none_when_empty() {
        let pool = pool();
        assert!(pool.borrow("f1", "hash1").is_none());
    }

    #[test]
    fn insert_then_return_then_borrow_round_trips() {
        let pool = pool();
        pool.insert("c1".to_string(), "f1".to_string(), Runtime::Python311, "hash1".to_string());
        // freshly inserted containers are idle and immediately borrowable
        assert_eq!(pool.borrow("f1", "hash1"), Some("c1".to_string()));
        // now in-use
        assert!(pool.borrow("f1", "hash1").is_none());
        pool.return_container("c1");
        assert_eq!(pool.borrow("f1", "hash1"), Some("c1".to_string()));
    }

    #[test]
    fn borrow_rejects_mismatched_code_hash() {
        let pool = pool();
        pool.insert("c1".to_string(), "f1".to_string(), Runtime::Python311, "hash1".to_string());
        assert!(pool.borrow("f1", "hash2").is_none());
    }

    #[test]
    fn stats_reports_counts() {
        let pool = pool();
        pool.insert("c1".to_string(), "f1".to_string(), Runtime::Python311, "hash1".to_string());
        pool.insert("c2".to_string(), "f2".to_string(), Runtime::Go1, "hash2".to_string());
        pool.borrow("f1", "hash1");
        let stats = pool.stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.in_use, 1);
        assert_eq!(stats.idle, 1);
    }

    #[tokio::test]
    async fn capacity_eviction_only_touches_idle_containers() {
        let pool = pool();
        pool.insert("c1".to_string(), "f1".to_string(), Runtime::Python311, "hash1".to_string());
        pool.insert("c2".to_string(), "f2".to_string(), Runtime::Python311, "hash2".to_string());
        // pool at capacity (2), both idle: inserting a third evicts the oldest idle (c1)
        pool.insert("c3".to_string(), "f3".to_string(), Runtime::Python311, "hash3".to_string());
        let stats = pool.stats();
        assert_eq!(stats.total, 2);
        assert!(pool.borrow("f1", "hash1").is_none());
        assert_eq!(pool.borrow("f2", "hash2"), Some("c2".to_string()));
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let pool = pool();
        pool.insert("c1".to_string(), "f1".to_string(), Runtime::Python311, "hash1".to_string());
        pool.remove("c1");
        pool.remove("c1");
        assert_eq!(pool.stats().total, 0);
    }
}
