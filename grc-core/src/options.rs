//! Functional options for node registration, mirroring the builder style the
//! teacher uses for its own service construction
//! (`common::Service::builder(..).with_shared_state(..)`).

use std::collections::HashMap;
use std::time::Duration;

/// Minimum node lease TTL; shorter requests are clamped up.
pub const MIN_NODE_TTL: Duration = Duration::from_secs(1);

/// Options accepted by [`crate::discovery_engine::DiscoveryEngine::register_node`].
#[derive(Debug, Clone)]
pub struct RegisterNodeOptions {
    pub(crate) ttl: Duration,
    pub(crate) weight: i64,
    pub(crate) metadata: HashMap<String, String>,
    pub(crate) ops: bool,
}

impl Default for RegisterNodeOptions {
    fn default() -> Self {
        Self { ttl: Duration::from_secs(3), weight: 1, metadata: HashMap::new(), ops: false }
    }
}

impl RegisterNodeOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clamped to a minimum of one second.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl.max(MIN_NODE_TTL);
        self
    }

    pub fn with_weight(mut self, weight: i64) -> Self {
        self.weight = weight;
        self
    }

    pub fn with_metadata(mut self, metadata: HashMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Adopt/allocate the node's `unique_id` from the non-leased ops record
    /// instead of minting a fresh one on every registration.
    pub fn with_ops_config(mut self) -> Self {
        self.ops = true;
        self
    }
}
