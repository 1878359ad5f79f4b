//! The JSON document stored at a discovery or ops key. `Node` always
//! carries `ttl`, `unique_id`, `weight` and `metadata` — the original source
//! mixed several incompatible Node schemas; this is the superset (§9 design
//! note 4).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Node {
    /// Nanoseconds, matching the wire representation of a Go `time.Duration`.
    #[serde(default, skip_serializing_if = "is_zero_u64")]
    pub ttl: u64,
    #[serde(default, skip_serializing_if = "is_zero_i64")]
    pub unique_id: i64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub service: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub address: String,
    #[serde(default, skip_serializing_if = "is_zero_i64")]
    pub weight: i64,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

fn is_zero_u64(v: &u64) -> bool {
    *v == 0
}

fn is_zero_i64(v: &i64) -> bool {
    *v == 0
}

impl Node {
    pub fn new(service: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            ttl: Duration::from_secs(3).as_nanos() as u64,
            unique_id: 0,
            service: service.into(),
            address: address.into(),
            weight: 1,
            metadata: HashMap::new(),
        }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_nanos(self.ttl)
    }

    pub fn set_ttl(&mut self, ttl: Duration) {
        self.ttl = ttl.as_nanos() as u64;
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("Node always serializes")
    }

    pub fn from_json(s: &str) -> serde_json::Result<Self> {
        serde_json::from_str(s)
    }
}

/// The materialised per-service view: address -> Node.
pub type Nodes = HashMap<String, Node>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let mut n = Node::new("Svc", "node1");
        n.unique_id = 42;
        n.metadata.insert("zone".into(), "eu-west".into());
        let json = n.to_json();
        let back = Node::from_json(&json).unwrap();
        assert_eq!(n, back);
    }
}
