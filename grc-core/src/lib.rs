//! Remote configuration and service discovery over a hierarchical key-value
//! store.
//!
//! An [`Engine`] binds a [`Provider`] backend to a base path and exposes two
//! capabilities: live, auto-updating config targets (`register_config`) and
//! a continuously materialised service registry (`register_node`/
//! `get_nodes`). Dynamic config fields are one of the cell types in
//! [`dynamic`]; everything else is a plain struct field hydrated once at
//! start-of-day.

pub mod config_engine;
pub mod config_item;
pub mod dispatcher;
pub mod discovery_engine;
pub mod dynamic;
pub mod engine;
pub mod error;
pub mod keys;
pub mod node;
pub mod options;
pub mod provider;
pub mod schema;

pub use engine::{Engine, EngineOptions};
pub use error::{Error, Result};
pub use node::{Node, Nodes};
pub use options::RegisterNodeOptions;
pub use provider::{EventType, KVPair, Provider, ProviderError, WatchEvent, WatchReceiver};
pub use schema::ConfigSchema;
