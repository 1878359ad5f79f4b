//! C6 Discovery Engine: per-node lease maintenance, unique node-ID
//! allocation, and a continuously materialised per-service node table.

use crate::error::{BackendUnavailable, Error};
use crate::keys;
use crate::node::{Node, Nodes};
use crate::options::RegisterNodeOptions;
use crate::provider::{EventType, Provider, WatchEvent};
use parking_lot::RwLock;
use snafu::ResultExt;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::watch;

/// Owns the materialised `service -> (address -> Node)` table and the
/// keep-alive registrations for locally-registered nodes.
pub struct DiscoveryEngine {
    provider: Arc<dyn Provider>,
    base_path: String,
    services: RwLock<HashMap<String, Nodes>>,
}

impl DiscoveryEngine {
    /// Opens the recursive service watch, performs the bootstrap `Get`, and
    /// spawns the materialisation loop. Mirrors `grc.New()`'s constructor
    /// sequence: watch first, then bootstrap get, then the background task.
    pub async fn start(
        provider: Arc<dyn Provider>,
        base_path: String,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<Arc<Self>, Error> {
        let prefix = keys::service_discovery_prefix(&base_path);
        let watch_rx = provider
            .watch(&prefix, true)
            .await
            .context(BackendUnavailable { during: "opening service watch" })?;

        let engine = Arc::new(Self {
            provider: provider.clone(),
            base_path,
            services: RwLock::new(HashMap::new()),
        });

        engine
            .reload_all_services(&prefix)
            .await
            .context(BackendUnavailable { during: "bootstrap service get" })?;

        let task_engine = engine.clone();
        let task_prefix = prefix.clone();
        tokio::spawn(async move {
            task_engine.materialisation_loop(task_prefix, watch_rx, &mut shutdown).await;
        });

        Ok(engine)
    }

    /// The currently materialised view for `service`. Callers must treat it
    /// as read-only.
    pub fn get_nodes(&self, service: &str) -> Nodes {
        self.services.read().get(service).cloned().unwrap_or_default()
    }

    /// Register a node with a lease. Returns the node's stable `unique_id`.
    pub async fn register_node(
        &self,
        service: &str,
        address: &str,
        options: RegisterNodeOptions,
    ) -> Result<i64, Error> {
        let mut node = Node::new(service, address);
        node.set_ttl(options.ttl);
        node.weight = options.weight;
        node.metadata = options.metadata;

        if options.ops {
            self.load_unique_id(&mut node)
                .await
                .context(BackendUnavailable { during: "loading ops unique_id" })?;
        } else {
            let key = keys::service_node_id_key(&self.base_path, service);
            node.unique_id = self
                .provider
                .incr(&key)
                .await
                .context(BackendUnavailable { during: "allocating node id" })?;
        }

        let key = keys::service_discovery_key(&self.base_path, service, address);
        self.provider
            .keep_alive(&key, &node.to_json(), node.ttl())
            .await
            .context(BackendUnavailable { during: "registering node keep-alive" })?;
        Ok(node.unique_id)
    }

    /// Adopt the ops record's `unique_id`/`weight` if present, otherwise
    /// allocate a fresh id and persist the (un-leased) ops record. Keeps a
    /// `(service, address)` pair's identity stable across restarts.
    async fn load_unique_id(&self, node: &mut Node) -> Result<(), crate::provider::ProviderError> {
        let ops_key = keys::service_ops_key(&self.base_path, &node.service, &node.address);
        let existing = self.provider.get(&ops_key, false).await?;
        if let Some(pair) = existing.first() {
            if let Ok(ops) = Node::from_json(&pair.value) {
                node.unique_id = ops.unique_id;
                node.weight = ops.weight;
                return Ok(());
            }
        }

        let id_key = keys::service_node_id_key(&self.base_path, &node.service);
        let unique_id = self.provider.incr(&id_key).await?;
        node.unique_id = unique_id;

        let mut ops = Node::new(&node.service, &node.address);
        ops.unique_id = unique_id;
        ops.weight = node.weight;
        ops.ttl = 0;
        self.provider.set(&ops_key, &ops.to_json(), std::time::Duration::ZERO).await?;
        Ok(())
    }

    async fn reload_all_services(&self, prefix: &str) -> Result<(), crate::provider::ProviderError> {
        let kvs = self.provider.get(prefix, true).await?;
        let mut services: HashMap<String, Nodes> = HashMap::new();
        for kv in kvs {
            if let Ok(node) = Node::from_json(&kv.value) {
                services.entry(node.service.clone()).or_default().insert(node.address.clone(), node);
            }
        }
        *self.services.write() = services;
        Ok(())
    }

    /// Re-`Get`s only the single affected service subtree and replaces its
    /// entry wholesale, trading a little extra work for crash-free handling
    /// of interleaved deletes (the per-service re-Get always reflects the
    /// current revision, so a stale update can never overwrite a later one).
    async fn reload_one_service(&self, service: &str) -> Result<(), crate::provider::ProviderError> {
        let prefix = keys::service_subtree_prefix(&self.base_path, service);
        let kvs = self.provider.get(&prefix, true).await?;
        let mut nodes = Nodes::new();
        for kv in kvs {
            if let Ok(node) = Node::from_json(&kv.value) {
                nodes.insert(node.address.clone(), node);
            }
        }
        self.services.write().insert(service.to_string(), nodes);
        Ok(())
    }

    async fn materialisation_loop(
        self: Arc<Self>,
        prefix: String,
        mut events: tokio::sync::mpsc::Receiver<WatchEvent>,
        shutdown: &mut watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    return;
                }
                event = events.recv() => {
                    let Some(event) = event else { return };
                    let result = match event.ty {
                        EventType::Reset => self.reload_all_services(&prefix).await,
                        EventType::Put | EventType::Delete => {
                            match event.key.strip_prefix(&prefix).and_then(|rest| rest.split('/').next()) {
                                Some(service) if !service.is_empty() => {
                                    self.reload_one_service(service).await
                                }
                                _ => Ok(()),
                            }
                        }
                    };
                    if let Err(e) = result {
                        tracing::warn!(error = %e, key = %event.key, "discovery watch event failed");
                    }
                }
            }
        }
    }
}
