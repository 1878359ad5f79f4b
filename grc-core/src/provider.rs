//! The [`Provider`] trait is the minimal KV contract every backend (etcd,
//! in-memory, or any future implementation) must satisfy.

use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::mpsc::Receiver;

/// Dial/read/write deadlines used by backends for individual RPCs.
pub const DIAL_TIMEOUT: Duration = Duration::from_secs(3);
pub const READ_TIMEOUT: Duration = Duration::from_secs(3);
pub const WRITE_TIMEOUT: Duration = Duration::from_secs(3);
/// `Incr` needs to acquire a lock before writing, so it gets double the
/// regular write budget.
pub const INCR_TIMEOUT: Duration = Duration::from_secs(6);

/// Minimum back-off between `KeepAlive` retry cycles.
pub const KEEP_ALIVE_MIN_BACKOFF: Duration = Duration::from_secs(3);

/// A single key/value pair as stored by a provider. The value is an opaque
/// string; the core encodes structured values (`ConfigItem`, `Node`) as JSON
/// before handing them to `Set`/`KeepAlive`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KVPair {
    pub key: String,
    pub value: String,
}

/// The three event kinds a watch stream can surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Put,
    Delete,
    /// The consumer's prior view is no longer trustworthy and must be
    /// rebuilt with a fresh `Get`.
    Reset,
}

/// A single item delivered over a watch stream.
#[derive(Debug, Clone)]
pub struct WatchEvent {
    pub ty: EventType,
    /// Empty for `Reset` events, which carry no single key.
    pub key: String,
    /// Empty for `Reset` and `Delete` events.
    pub value: String,
}

impl WatchEvent {
    pub fn put(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self { ty: EventType::Put, key: key.into(), value: value.into() }
    }

    pub fn delete(key: impl Into<String>) -> Self {
        Self { ty: EventType::Delete, key: key.into(), value: String::new() }
    }

    pub fn reset() -> Self {
        Self { ty: EventType::Reset, key: String::new(), value: String::new() }
    }
}

/// The receiving half of a watch stream. Backends are free to choose their
/// own internal buffering; consumers only ever see `WatchEvent`s, never a
/// transport-level error (see `grc_core::error::Error::WatchTransient`).
pub type WatchReceiver = Receiver<WatchEvent>;

/// Uniform contract over a hierarchical key-value store.
///
/// Implementations must uphold the resilience contract described on
/// `watch`: compaction, disconnection and leader loss are retried
/// internally and surfaced to the consumer only as a `Reset` event, never as
/// a channel error.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Human-readable provider kind, e.g. `"memory"` or `"etcd"`.
    fn kind(&self) -> &'static str;

    /// Upsert `key` with `value`. `ttl = 0` means no expiry; otherwise the
    /// key is bound to a lease and vanishes after `ttl` without a refresh.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), ProviderError>;

    /// Point (`recursive = false`) or prefix (`recursive = true`) read.
    /// Order of the returned pairs is unspecified but stable within one
    /// response.
    async fn get(&self, key: &str, recursive: bool) -> Result<Vec<KVPair>, ProviderError>;

    /// Atomic 64-bit counter increment. Concurrent callers must observe
    /// distinct, strictly-increasing results.
    async fn incr(&self, key: &str) -> Result<i64, ProviderError>;

    /// Point or subtree delete.
    async fn delete(&self, key: &str, recursive: bool) -> Result<(), ProviderError>;

    /// Open a watch stream over `key` (or its subtree, if `recursive`). The
    /// stream terminates only when the provider is closed.
    async fn watch(&self, key: &str, recursive: bool) -> Result<WatchReceiver, ProviderError>;

    /// Write `value` at `key` with `ttl`, then keep refreshing the lease
    /// indefinitely in the background. Best-effort-deletes the key on
    /// shutdown.
    async fn keep_alive(&self, key: &str, value: &str, ttl: Duration) -> Result<(), ProviderError>;

    /// Release backend resources. Idempotent.
    async fn close(&self) -> Result<(), ProviderError>;
}

/// Transport-level failure from a backend. `Provider::watch`/`keep_alive`
/// never let this escape past their initial call — only `set`/`get`/`incr`/
/// `delete` (and the first write inside `keep_alive`) can fail this way.
#[derive(Debug, snafu::Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ProviderError {
    #[snafu(display("backend unavailable: {}", reason))]
    BackendUnavailable { reason: String },
}
