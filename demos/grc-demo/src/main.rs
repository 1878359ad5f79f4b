//! Demonstrates wiring an `Engine` to either backend: registers a config
//! target with one dynamic and one static field, registers a node, and
//! prints both as they change.

use grc_core::config_schema;
use grc_core::dynamic::{Bool, DynamicValue, StringValue};
use grc_core::engine::{Engine, EngineOptions};
use grc_core::options::RegisterNodeOptions;
use std::sync::Arc;
use std::time::Duration;
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(name = "grc-demo")]
struct CliArgs {
    /// Backend to run against: "memory" or "etcd"
    #[structopt(long, default_value = "memory")]
    backend: String,

    /// etcd endpoint, only used when `--backend etcd`
    #[structopt(long, default_value = "http://localhost:2379")]
    etcd_endpoint: String,

    /// Base path every key is rooted under
    #[structopt(long, default_value = "/grc-demo")]
    base_path: String,

    /// Service name to register config and a node under
    #[structopt(long, default_value = "demo-service")]
    service: String,

    /// Node lease TTL
    #[structopt(long, default_value = "5s")]
    node_ttl: humantime::Duration,
}

pub struct ServiceConfig {
    pub max_connections: i64,
    pub feature_enabled: Bool,
    pub greeting: StringValue,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self { max_connections: 0, feature_enabled: Bool::default(), greeting: StringValue::default() }
    }
}

config_schema! {
    struct ServiceConfig {
        #[default = "100", comment = "maximum concurrent connections"]
        max_connections: Int => i64,
        #[default = "true", comment = "toggle the experimental request path"]
        feature_enabled: DynamicCell => Bool,
        #[default = "hello", comment = "greeting served to clients"]
        greeting: DynamicCell => StringValue,
    }
}

#[tokio::main]
async fn main() {
    let args = CliArgs::from_args();
    tracing_subscriber::fmt::init();

    let provider: Arc<dyn grc_core::provider::Provider> = match args.backend.as_str() {
        "etcd" => Arc::new(
            grc_backend_etcd::Etcd::connect([&args.etcd_endpoint])
                .await
                .expect("connect to etcd"),
        ),
        _ => grc_backend_memory::Memory::new(),
    };

    let engine = Engine::new(provider, args.base_path.clone(), EngineOptions::new())
        .await
        .expect("construct engine");

    let config = engine
        .register_config(args.service.clone(), ServiceConfig::default())
        .await
        .expect("register config");

    config.greeting.changed(Box::new(|| {
        tracing::info!("greeting changed");
    }));

    let unique_id = engine
        .register_node(
            &args.service,
            "127.0.0.1:9000",
            RegisterNodeOptions::new().with_ttl(args.node_ttl.into()).with_ops_config(),
        )
        .await
        .expect("register node");
    tracing::info!(unique_id, "node registered");

    loop {
        tokio::time::sleep(Duration::from_secs(5)).await;
        tracing::info!(
            max_connections = config.max_connections,
            feature_enabled = config.feature_enabled.load(),
            greeting = %config.greeting.load(),
            nodes = ?engine.get_nodes(&args.service),
            "current state"
        );
    }
}
