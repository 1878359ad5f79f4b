//! An etcd-backed [`Provider`]: real leases, a monotonic revision, and a
//! watch stream that survives compaction and disconnection by collapsing
//! them into a single `Reset` event. Grounded on the teacher's
//! `common::store::Etcd`, generalized from its typed `Store`/`StorableObject`
//! contract to the plain string KV contract the core depends on.

use async_trait::async_trait;
use etcd_client::{
    Client, Compare, CompareOp, ConnectOptions, EventType as EtcdEventType, GetOptions, PutOptions,
    WatchOptions,
};
use grc_core::provider::{
    KVPair, Provider, ProviderError, WatchEvent, WatchReceiver, DIAL_TIMEOUT, INCR_TIMEOUT,
    KEEP_ALIVE_MIN_BACKOFF, READ_TIMEOUT, WRITE_TIMEOUT,
};
use parking_lot::RwLock;
use std::future::Future;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// etcd-backed `Provider`. Cheap to clone: `etcd_client::Client` is a thin
/// handle over a shared channel.
pub struct Etcd {
    client: Client,
    shutdown_tx: watch::Sender<bool>,
    leases: RwLock<Vec<watch::Sender<bool>>>,
}

impl Etcd {
    /// Connect to one or more etcd endpoints.
    pub async fn connect<E: AsRef<str>, S: AsRef<[E]>>(endpoints: S) -> Result<Self, ProviderError> {
        let options = ConnectOptions::new().with_connect_timeout(DIAL_TIMEOUT);
        let client = Client::connect(endpoints, Some(options)).await.map_err(connect_err)?;
        let (shutdown_tx, _) = watch::channel(false);
        Ok(Self { client, shutdown_tx, leases: RwLock::new(Vec::new()) })
    }
}

fn connect_err(e: etcd_client::Error) -> ProviderError {
    ProviderError::BackendUnavailable { reason: format!("connect: {}", e) }
}

fn rpc_err(during: &str, e: etcd_client::Error) -> ProviderError {
    ProviderError::BackendUnavailable { reason: format!("{}: {}", during, e) }
}

/// Bounds a single etcd RPC to `d`, turning an elapsed deadline into the same
/// `ProviderError` a transport failure would produce — callers never need to
/// tell a hung server apart from an unreachable one.
async fn with_timeout<T>(
    d: Duration,
    during: &'static str,
    fut: impl Future<Output = Result<T, etcd_client::Error>>,
) -> Result<T, ProviderError> {
    match tokio::time::timeout(d, fut).await {
        Ok(result) => result.map_err(|e| rpc_err(during, e)),
        Err(_) => Err(ProviderError::BackendUnavailable { reason: format!("{during}: timed out after {d:?}") }),
    }
}

#[async_trait]
impl Provider for Etcd {
    fn kind(&self) -> &'static str {
        "etcd"
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), ProviderError> {
        let mut client = self.client.clone();
        if ttl.is_zero() {
            with_timeout(WRITE_TIMEOUT, "put", client.put(key, value, None)).await?;
            return Ok(());
        }
        let lease =
            with_timeout(WRITE_TIMEOUT, "lease grant", client.lease_grant(ttl.as_secs().max(1) as i64, None))
                .await?;
        with_timeout(
            WRITE_TIMEOUT,
            "put",
            client.put(key, value, Some(PutOptions::new().with_lease(lease.id()))),
        )
        .await?;
        Ok(())
    }

    async fn get(&self, key: &str, recursive: bool) -> Result<Vec<KVPair>, ProviderError> {
        let mut client = self.client.clone();
        let options = recursive.then(|| GetOptions::new().with_prefix());
        let resp = with_timeout(READ_TIMEOUT, "get", client.get(key, options)).await?;
        let mut kvs = Vec::with_capacity(resp.kvs().len());
        for kv in resp.kvs() {
            let (Ok(k), Ok(v)) = (kv.key_str(), kv.value_str()) else { continue };
            kvs.push(KVPair { key: k.to_string(), value: v.to_string() });
        }
        Ok(kvs)
    }

    /// Optimistic compare-and-swap loop: a blind read-modify-write would
    /// lose updates under concurrent incrementers, so every attempt reads
    /// the current revision/value and only commits if nothing else won the
    /// race meanwhile.
    async fn incr(&self, key: &str) -> Result<i64, ProviderError> {
        let mut client = self.client.clone();
        loop {
            let resp = with_timeout(INCR_TIMEOUT, "incr get", client.get(key, None)).await?;
            let (current, mod_revision): (i64, i64) = match resp.kvs().first() {
                Some(kv) => {
                    let parsed = kv.value_str().ok().and_then(|s| s.parse().ok()).unwrap_or(0);
                    (parsed, kv.mod_revision())
                }
                None => (0, 0),
            };
            let next = current + 1;
            let cmp = Compare::mod_revision(key, CompareOp::Equal, mod_revision);
            let put = etcd_client::TxnOp::put(key, next.to_string(), None);
            let txn = etcd_client::Txn::new().when([cmp]).and_then([put]);
            let resp = with_timeout(INCR_TIMEOUT, "incr txn", client.txn(txn)).await?;
            if resp.succeeded() {
                return Ok(next);
            }
            // lost the race: another incrementer committed first, retry.
        }
    }

    async fn delete(&self, key: &str, recursive: bool) -> Result<(), ProviderError> {
        let mut client = self.client.clone();
        let options = recursive.then(|| etcd_client::DeleteOptions::new().with_prefix());
        with_timeout(WRITE_TIMEOUT, "delete", client.delete(key, options)).await?;
        Ok(())
    }

    /// Opens a watch and translates its events into [`WatchEvent`]s.
    ///
    /// Compaction and disconnection are retried internally with back-off
    /// (one second, capped at five) rather than surfaced as a channel error;
    /// each successful reconnection emits exactly one `Reset` so the
    /// consumer knows to rebuild its view with a fresh `Get` before trusting
    /// incremental events again.
    async fn watch(&self, key: &str, recursive: bool) -> Result<WatchReceiver, ProviderError> {
        let options = recursive.then(|| WatchOptions::new().with_prefix());
        let mut client = self.client.clone();
        let (watcher, stream) = client.watch(key, options.clone()).await.map_err(|e| rpc_err("watch", e))?;
        drop(watcher);

        let (tx, rx) = mpsc::channel(256);
        let key = key.to_string();
        let mut shutdown = self.shutdown_tx.subscribe();
        tokio::spawn(async move {
            watch_loop(client, key, options, stream, tx, &mut shutdown).await;
        });
        Ok(rx)
    }

    /// Writes the key under a fresh lease, then keeps that lease alive
    /// indefinitely. Back-off (minimum three seconds) covers three distinct
    /// failure modes: lease grant failure, the initial put, and the
    /// keep-alive stream closing early; each retry cycle acquires a brand
    /// new lease rather than trying to resurrect the old one.
    async fn keep_alive(&self, key: &str, value: &str, ttl: Duration) -> Result<(), ProviderError> {
        let mut client = self.client.clone();
        let lease = grant_and_put(&mut client, key, value, ttl).await?;

        let (lease_shutdown_tx, mut lease_shutdown) = watch::channel(false);
        self.leases.write().push(lease_shutdown_tx);

        let key = key.to_string();
        let value = value.to_string();
        tokio::spawn(async move {
            let mut lease_id = lease;
            loop {
                let (mut keeper, mut stream) = match client.lease_keep_alive(lease_id).await {
                    Ok(pair) => pair,
                    Err(e) => {
                        tracing::warn!(error = %e, "lease keep-alive stream failed to open, retrying");
                        if sleep_or_shutdown(KEEP_ALIVE_MIN_BACKOFF, &mut lease_shutdown).await {
                            let _ = client.delete(key.clone(), None).await;
                            return;
                        }
                        lease_id = match grant_and_put(&mut client, &key, &value, ttl).await {
                            Ok(id) => id,
                            Err(e) => {
                                tracing::warn!(error = %e, "re-grant after keep-alive open failure also failed");
                                continue;
                            }
                        };
                        continue;
                    }
                };

                let refresh_every = (ttl / 3).max(Duration::from_secs(1));
                let mut ticker = tokio::time::interval(refresh_every);
                ticker.tick().await;
                loop {
                    tokio::select! {
                        _ = lease_shutdown.changed() => {
                            let _ = client.delete(key.clone(), None).await;
                            return;
                        }
                        _ = ticker.tick() => {
                            let closed = keeper.keep_alive().await.is_err()
                                || !matches!(stream.message().await, Ok(Some(_)));
                            if closed {
                                tracing::warn!("lease keep-alive channel closed, re-granting");
                                break;
                            }
                        }
                    }
                }

                if sleep_or_shutdown(KEEP_ALIVE_MIN_BACKOFF, &mut lease_shutdown).await {
                    let _ = client.delete(key.clone(), None).await;
                    return;
                }
                lease_id = loop {
                    match grant_and_put(&mut client, &key, &value, ttl).await {
                        Ok(id) => break id,
                        Err(e) => {
                            tracing::warn!(error = %e, "lease re-grant failed, retrying");
                            if sleep_or_shutdown(KEEP_ALIVE_MIN_BACKOFF, &mut lease_shutdown).await {
                                return;
                            }
                        }
                    }
                };
            }
        });
        Ok(())
    }

    async fn close(&self) -> Result<(), ProviderError> {
        let _ = self.shutdown_tx.send(true);
        for lease in self.leases.read().iter() {
            let _ = lease.send(true);
        }
        Ok(())
    }
}

async fn grant_and_put(
    client: &mut Client,
    key: &str,
    value: &str,
    ttl: Duration,
) -> Result<i64, ProviderError> {
    let lease =
        with_timeout(WRITE_TIMEOUT, "lease grant", client.lease_grant(ttl.as_secs().max(1) as i64, None))
            .await?;
    with_timeout(
        WRITE_TIMEOUT,
        "put",
        client.put(key, value, Some(PutOptions::new().with_lease(lease.id()))),
    )
    .await?;
    Ok(lease.id())
}

/// Sleeps for `d` unless shutdown fires first. Returns `true` if shutdown
/// won the race.
async fn sleep_or_shutdown(d: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(d) => false,
        _ = shutdown.changed() => true,
    }
}

async fn watch_loop(
    mut client: Client,
    key: String,
    options: Option<WatchOptions>,
    mut stream: etcd_client::WatchStream,
    tx: mpsc::Sender<WatchEvent>,
    shutdown: &mut watch::Receiver<bool>,
) {
    let mut backoff = Duration::from_secs(1);
    const MAX_BACKOFF: Duration = Duration::from_secs(5);

    loop {
        let message = tokio::select! {
            _ = shutdown.changed() => return,
            m = stream.message() => m,
        };

        match message {
            Ok(Some(resp)) if !resp.canceled() => {
                backoff = Duration::from_secs(1);
                for event in resp.events() {
                    let Some(kv) = event.kv() else { continue };
                    let (Ok(k), Ok(v)) = (kv.key_str(), kv.value_str()) else { continue };
                    let out = match event.event_type() {
                        EtcdEventType::Put => WatchEvent::put(k, v),
                        EtcdEventType::Delete => WatchEvent::delete(k),
                    };
                    if tx.send(out).await.is_err() {
                        return;
                    }
                }
                continue;
            }
            Ok(Some(resp)) => {
                tracing::warn!(reason = resp.cancel_reason(), "watch canceled, resetting");
            }
            Ok(None) => {
                tracing::warn!(key = %key, "watch stream closed, reconnecting");
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "watch stream errored, reconnecting");
            }
        }

        if !reconnect_until(&mut client, &key, &options, &mut stream, &tx, &mut backoff, MAX_BACKOFF, shutdown).await
        {
            return;
        }
        backoff = Duration::from_secs(1);
    }
}

/// Retries opening the watch with capped exponential back-off until it
/// succeeds, shutdown fires, or the receiver goes away. On success, sends
/// exactly one `Reset` telling the consumer its materialised view may be
/// stale and must be rebuilt from a fresh `Get` before trusting further
/// incremental events. Returns `false` if the caller should give up
/// entirely (shutdown, or the receiver is gone).
#[allow(clippy::too_many_arguments)]
async fn reconnect_until(
    client: &mut Client,
    key: &str,
    options: &Option<WatchOptions>,
    stream: &mut etcd_client::WatchStream,
    tx: &mpsc::Sender<WatchEvent>,
    backoff: &mut Duration,
    max_backoff: Duration,
    shutdown: &mut watch::Receiver<bool>,
) -> bool {
    loop {
        match client.watch(key, options.clone()).await {
            Ok((watcher, new_stream)) => {
                drop(watcher);
                *stream = new_stream;
                return tx.send(WatchEvent::reset()).await.is_ok();
            }
            Err(e) => {
                tracing::error!(key = %key, error = %e, "watch reconnect failed, retrying");
                if sleep_or_shutdown(*backoff, shutdown).await {
                    return false;
                }
                *backoff = (*backoff * 2).min(max_backoff);
            }
        }
    }
}
