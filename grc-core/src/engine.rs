//! The top-level façade wiring a [`Provider`] to the Config and Discovery
//! engines, and owning the shared shutdown signal both bind loops select on.

use crate::config_engine;
use crate::discovery_engine::DiscoveryEngine;
use crate::dispatcher::Dispatcher;
use crate::error::Error;
use crate::node::Nodes;
use crate::options::RegisterNodeOptions;
use crate::provider::Provider;
use crate::schema::ConfigSchema;
use std::sync::Arc;
use tokio::sync::watch;

/// Functional options accepted by [`Engine::new`], mirroring the original's
/// variadic constructor options.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub(crate) auto_create: bool,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self { auto_create: true }
    }
}

impl EngineOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Disable auto-creation of missing config keys; `register_config` then
    /// only ever reads what's already there.
    pub fn without_auto_create(mut self) -> Self {
        self.auto_create = false;
        self
    }
}

/// The single entry point a consumer depends on: one `Engine` per base path,
/// shared across every `register_config`/`register_node` call against it.
pub struct Engine {
    provider: Arc<dyn Provider>,
    base_path: String,
    options: EngineOptions,
    discovery: Arc<DiscoveryEngine>,
    dispatcher: Dispatcher,
    shutdown_tx: watch::Sender<bool>,
}

impl Engine {
    /// Build an engine over `provider`, rooted at `base_path`. Starts the
    /// discovery materialisation loop immediately; config targets are
    /// started lazily, one per `register_config` call.
    pub async fn new(
        provider: Arc<dyn Provider>,
        base_path: impl Into<String>,
        options: EngineOptions,
    ) -> Result<Self, Error> {
        let base_path = base_path.into();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let discovery = DiscoveryEngine::start(provider.clone(), base_path.clone(), shutdown_rx.clone()).await?;
        let dispatcher = Dispatcher::spawn(shutdown_rx);
        Ok(Self { provider, base_path, options, discovery, dispatcher, shutdown_tx })
    }

    /// Register `target` as the live config for `service`. The returned
    /// `Arc<T>` stays current for as long as the engine runs: dynamic cells
    /// inside it update in place, static fields are frozen after this call
    /// returns.
    pub async fn register_config<T>(&self, service: impl Into<String>, target: T) -> Result<Arc<T>, Error>
    where
        T: ConfigSchema + Send + Sync + 'static,
    {
        config_engine::register_config(
            self.provider.clone(),
            self.base_path.clone(),
            service.into(),
            target,
            self.options.auto_create,
            self.dispatcher.clone(),
            self.shutdown_tx.subscribe(),
        )
        .await
    }

    /// Register a node under `service`/`address`, maintaining its lease for
    /// as long as the engine runs. Returns the node's stable `unique_id`.
    pub async fn register_node(
        &self,
        service: impl AsRef<str>,
        address: impl AsRef<str>,
        options: RegisterNodeOptions,
    ) -> Result<i64, Error> {
        self.discovery.register_node(service.as_ref(), address.as_ref(), options).await
    }

    /// Current materialised nodes for `service`.
    pub fn get_nodes(&self, service: impl AsRef<str>) -> Nodes {
        self.discovery.get_nodes(service.as_ref())
    }

    /// Signal every bind loop to stop and release the backing provider.
    /// Idempotent; safe to call more than once.
    pub async fn close(&self) -> Result<(), Error> {
        let _ = self.shutdown_tx.send(true);
        self.provider
            .close()
            .await
            .map_err(|source| Error::BackendUnavailable { during: "closing engine".into(), source })
    }
}
