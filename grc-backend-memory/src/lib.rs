//! An in-memory [`Provider`], grounded on the reference `backend/memory`
//! implementation: a 100ms TTL sweep and per-subscriber watch channels
//! filtered on key prefix. Intended as a test double, not a production
//! backend — there is exactly one process's worth of state and no
//! durability.

use async_trait::async_trait;
use grc_core::provider::{EventType, KVPair, Provider, ProviderError, WatchEvent, WatchReceiver};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::time::interval;

struct Entry {
    value: String,
    expire_at: Option<Instant>,
}

struct Watcher {
    id: u64,
    tx: mpsc::Sender<WatchEvent>,
    key: String,
    recursive: bool,
}

struct Inner {
    kvs: RwLock<HashMap<String, Entry>>,
    watchers: RwLock<Vec<Watcher>>,
    counters: RwLock<HashMap<String, i64>>,
}

/// In-process, single-node `Provider`. Cheap to construct; every clone of
/// the returned `Arc` shares the same state.
pub struct Memory {
    inner: Arc<Inner>,
    shutdown_tx: watch::Sender<bool>,
    next_watcher_id: AtomicU64,
}

impl Memory {
    pub fn new() -> Arc<Self> {
        let inner = Arc::new(Inner {
            kvs: RwLock::new(HashMap::new()),
            watchers: RwLock::new(Vec::new()),
            counters: RwLock::new(HashMap::new()),
        });
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let sweep_inner = inner.clone();
        let mut sweep_shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            ttl_sweep(sweep_inner, &mut sweep_shutdown).await;
        });

        Arc::new(Self { inner, shutdown_tx, next_watcher_id: AtomicU64::new(1) })
    }

    /// Delivers `event` to every matching subscriber, awaited in place
    /// rather than handed off to a detached `tokio::spawn` per subscriber:
    /// two events dispatched back-to-back for the same key (e.g. a `Put`
    /// immediately followed by a `Delete`) are enqueued to each subscriber's
    /// channel in that same order, since the second `dispatch` call can't
    /// start until the first one's sends have returned. A spawned task per
    /// event gives no such guarantee — the scheduler is free to run them in
    /// either order.
    async fn dispatch(&self, event: WatchEvent) {
        dispatch(&self.inner, event).await;
    }
}

async fn ttl_sweep(inner: Arc<Inner>, shutdown: &mut watch::Receiver<bool>) {
    let mut ticker = interval(Duration::from_millis(100));
    loop {
        tokio::select! {
            _ = shutdown.changed() => return,
            _ = ticker.tick() => {
                let now = Instant::now();
                let expired: Vec<String> = inner
                    .kvs
                    .read()
                    .iter()
                    .filter_map(|(k, v)| match v.expire_at {
                        Some(at) if at <= now => Some(k.clone()),
                        _ => None,
                    })
                    .collect();
                if expired.is_empty() {
                    continue;
                }
                let mut kvs = inner.kvs.write();
                for key in &expired {
                    kvs.remove(key);
                }
                drop(kvs);
                for key in expired {
                    dispatch(&inner, WatchEvent::delete(key)).await;
                }
            }
        }
    }
}

/// Free-function twin of `Memory::dispatch`, used by the sweep task which
/// only has `Inner`, not a `Memory`, in scope. Same in-order-per-subscriber
/// contract.
async fn dispatch(inner: &Inner, event: WatchEvent) {
    let matching: Vec<mpsc::Sender<WatchEvent>> = inner
        .watchers
        .read()
        .iter()
        .filter(|w| w.key == event.key || (w.recursive && event.key.starts_with(&w.key)))
        .map(|w| w.tx.clone())
        .collect();
    for tx in matching {
        let _ = tx.send(event.clone()).await;
    }
}

#[async_trait]
impl Provider for Memory {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), ProviderError> {
        let expire_at = if ttl.is_zero() { None } else { Some(Instant::now() + ttl) };
        self.inner.kvs.write().insert(key.to_string(), Entry { value: value.to_string(), expire_at });
        self.dispatch(WatchEvent::put(key, value)).await;
        Ok(())
    }

    async fn get(&self, key: &str, recursive: bool) -> Result<Vec<KVPair>, ProviderError> {
        let kvs = self.inner.kvs.read();
        if !recursive {
            return Ok(kvs
                .get(key)
                .map(|e| vec![KVPair { key: key.to_string(), value: e.value.clone() }])
                .unwrap_or_default());
        }
        Ok(kvs
            .iter()
            .filter(|(k, _)| k.starts_with(key))
            .map(|(k, e)| KVPair { key: k.clone(), value: e.value.clone() })
            .collect())
    }

    async fn incr(&self, key: &str) -> Result<i64, ProviderError> {
        let mut counters = self.inner.counters.write();
        let next = counters.entry(key.to_string()).or_insert(0);
        *next += 1;
        Ok(*next)
    }

    async fn delete(&self, key: &str, recursive: bool) -> Result<(), ProviderError> {
        let removed: Vec<String> = {
            let mut kvs = self.inner.kvs.write();
            if !recursive {
                if kvs.remove(key).is_some() {
                    vec![key.to_string()]
                } else {
                    vec![]
                }
            } else {
                let keys: Vec<String> = kvs.keys().filter(|k| k.starts_with(key)).cloned().collect();
                for k in &keys {
                    kvs.remove(k);
                }
                keys
            }
        };
        for key in removed {
            self.dispatch(WatchEvent::delete(key)).await;
        }
        Ok(())
    }

    async fn watch(&self, key: &str, recursive: bool) -> Result<WatchReceiver, ProviderError> {
        let (tx, rx) = mpsc::channel(256);
        let id = self.next_watcher_id.fetch_add(1, Ordering::Relaxed);
        self.inner.watchers.write().push(Watcher { id, tx, key: key.to_string(), recursive });
        Ok(rx)
    }

    /// Writes the key, then refreshes its expiry on a timer until the
    /// provider is closed. The reference implementation this is grounded on
    /// reset `ttl` to zero on every refresh, which never expires the key at
    /// all; this realizes the documented refresh contract instead.
    async fn keep_alive(&self, key: &str, value: &str, ttl: Duration) -> Result<(), ProviderError> {
        self.set(key, value, ttl).await?;
        if ttl.is_zero() {
            return Ok(());
        }

        let inner = self.inner.clone();
        let key = key.to_string();
        let value = value.to_string();
        let mut shutdown = self.shutdown_tx.subscribe();
        let refresh_every = (ttl / 3).max(Duration::from_millis(100));
        tokio::spawn(async move {
            let mut ticker = interval(refresh_every);
            ticker.tick().await; // first tick fires immediately; skip it, set() already wrote
            loop {
                tokio::select! {
                    _ = shutdown.changed() => {
                        inner.kvs.write().remove(&key);
                        return;
                    }
                    _ = ticker.tick() => {
                        let expire_at = Instant::now() + ttl;
                        if let Some(entry) = inner.kvs.write().get_mut(&key) {
                            entry.expire_at = Some(expire_at);
                            entry.value = value.clone();
                        } else {
                            inner.kvs.write().insert(
                                key.clone(),
                                Entry { value: value.clone(), expire_at: Some(expire_at) },
                            );
                        }
                    }
                }
            }
        });
        Ok(())
    }

    async fn close(&self) -> Result<(), ProviderError> {
        let _ = self.shutdown_tx.send(true);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let p = Memory::new();
        p.set("/a/b", "1", Duration::ZERO).await.unwrap();
        let kvs = p.get("/a/b", false).await.unwrap();
        assert_eq!(kvs, vec![KVPair { key: "/a/b".into(), value: "1".into() }]);
    }

    #[tokio::test]
    async fn recursive_get_matches_prefix() {
        let p = Memory::new();
        p.set("/svc/a", "1", Duration::ZERO).await.unwrap();
        p.set("/svc/b", "2", Duration::ZERO).await.unwrap();
        p.set("/other", "3", Duration::ZERO).await.unwrap();
        let mut kvs = p.get("/svc/", true).await.unwrap();
        kvs.sort_by(|a, b| a.key.cmp(&b.key));
        assert_eq!(kvs.len(), 2);
    }

    #[tokio::test]
    async fn incr_is_strictly_increasing() {
        let p = Memory::new();
        assert_eq!(p.incr("/ctr").await.unwrap(), 1);
        assert_eq!(p.incr("/ctr").await.unwrap(), 2);
        assert_eq!(p.incr("/ctr").await.unwrap(), 3);
    }

    #[tokio::test]
    async fn watch_sees_put_and_delete() {
        let p = Memory::new();
        let mut rx = p.watch("/svc/", true).await.unwrap();
        p.set("/svc/a", "1", Duration::ZERO).await.unwrap();
        let evt = rx.recv().await.unwrap();
        assert_eq!(evt.ty, EventType::Put);
        assert_eq!(evt.key, "/svc/a");

        p.delete("/svc/a", false).await.unwrap();
        let evt = rx.recv().await.unwrap();
        assert_eq!(evt.ty, EventType::Delete);
    }

    #[tokio::test]
    async fn put_then_delete_arrive_in_order() {
        let p = Memory::new();
        let mut rx = p.watch("/ord/", true).await.unwrap();
        for i in 0..20 {
            let key = format!("/ord/{i}");
            p.set(&key, "v", Duration::ZERO).await.unwrap();
            p.delete(&key, false).await.unwrap();
        }
        for _ in 0..20 {
            assert_eq!(rx.recv().await.unwrap().ty, EventType::Put);
            assert_eq!(rx.recv().await.unwrap().ty, EventType::Delete);
        }
    }

    #[tokio::test]
    async fn ttl_sweep_expires_keys() {
        let p = Memory::new();
        p.set("/expiring", "1", Duration::from_millis(50)).await.unwrap();
        tokio::time::sleep(Duration::from_millis(300)).await;
        let kvs = p.get("/expiring", false).await.unwrap();
        assert!(kvs.is_empty());
    }
}
