//! End-to-end scenarios driven against the in-memory backend: initial
//! hydration of system scalars and two-level containers, dynamic-cell live
//! updates (and their no-op-on-equal-value guarantee), node identity
//! stability, and a custom-setter field type.

use grc_core::config_item::ConfigItem;
use grc_core::config_schema;
use grc_core::dynamic::{DynamicValue, StringValue};
use grc_core::engine::{Engine, EngineOptions};
use grc_core::keys;
use grc_core::options::RegisterNodeOptions;
use grc_core::schema::ConfigSchema;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

struct ScalarConfig {
    iv: i64,
    piv: Option<i64>,
    mv: HashMap<String, i64>,
    av: Vec<bool>,
}

impl Default for ScalarConfig {
    fn default() -> Self {
        Self { iv: 0, piv: None, mv: HashMap::new(), av: Vec::new() }
    }
}

config_schema! {
    struct ScalarConfig {
        #[default = "1", comment = "plain int"]
        iv: Int => i64,
        #[default = "10", comment = "pointer-to-int equivalent"]
        piv: Int => Option<i64>,
        #[default = "a:1,b:2", comment = "flat string-to-int map"]
        mv: Map => HashMap<String, i64>,
        #[default = "false,true", comment = "bool slice"]
        av: Slice => Vec<bool>,
    }
}

#[tokio::test]
async fn s1_system_scalar_hydration() {
    let provider = grc_backend_memory::Memory::new();
    let engine = Engine::new(provider, "/t", EngineOptions::new()).await.unwrap();

    let config = engine.register_config("Svc1", ScalarConfig::default()).await.unwrap();

    assert_eq!(config.iv, 1);
    assert_eq!(config.piv, Some(10));
    assert_eq!(config.mv.get("a"), Some(&1));
    assert_eq!(config.mv.get("b"), Some(&2));
    assert_eq!(config.av, vec![false, true]);
}

struct NestedMapConfig {
    emv: HashMap<String, HashMap<String, i32>>,
}

impl Default for NestedMapConfig {
    fn default() -> Self {
        Self { emv: HashMap::new() }
    }
}

config_schema! {
    struct NestedMapConfig {
        #[default = "a_1:bb_2:1,cc_2:2;b_1:dd_2:19,ee_2:20", comment = "two level map"]
        emv: Map => HashMap<String, HashMap<String, i32>>,
    }
}

#[tokio::test]
async fn s2_two_level_containers() {
    let provider = grc_backend_memory::Memory::new();
    let engine = Engine::new(provider, "/t", EngineOptions::new()).await.unwrap();

    let config = engine.register_config("Svc2", NestedMapConfig::default()).await.unwrap();

    assert_eq!(config.emv["a_1"]["bb_2"], 1);
    assert_eq!(config.emv["a_1"]["cc_2"], 2);
    assert_eq!(config.emv["b_1"]["dd_2"], 19);
    assert_eq!(config.emv["b_1"]["ee_2"], 20);
}

struct DynamicStringConfig {
    sv: StringValue,
}

impl Default for DynamicStringConfig {
    fn default() -> Self {
        Self { sv: StringValue::default() }
    }
}

config_schema! {
    struct DynamicStringConfig {
        #[default = "aa", comment = "live-updatable greeting"]
        sv: DynamicCell => StringValue,
    }
}

#[tokio::test]
async fn s3_dynamic_cell_live_update() {
    let provider = grc_backend_memory::Memory::new();
    let write_provider = provider.clone();
    let engine = Engine::new(provider, "/t", EngineOptions::new()).await.unwrap();

    let config = engine.register_config("Svc3", DynamicStringConfig::default()).await.unwrap();
    assert_eq!(config.sv.load(), "aa");

    let fired = Arc::new(AtomicUsize::new(0));
    let notify = Arc::new(tokio::sync::Notify::new());
    let (fired2, notify2) = (fired.clone(), notify.clone());
    config.sv.changed(Box::new(move || {
        fired2.fetch_add(1, Ordering::SeqCst);
        notify2.notify_one();
    }));

    let key = keys::service_config_key("/t", "Svc3", "sv");
    let item = ConfigItem::new("string", "bb", "live-updatable greeting");
    grc_core::provider::Provider::set(write_provider.as_ref(), &key, &item.to_json(), Duration::ZERO)
        .await
        .unwrap();

    tokio::time::timeout(Duration::from_secs(1), notify.notified()).await.expect("callback fired");
    assert_eq!(config.sv.load(), "bb");
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn s4_equal_value_store_is_noop() {
    let provider = grc_backend_memory::Memory::new();
    let write_provider = provider.clone();
    let engine = Engine::new(provider, "/t", EngineOptions::new()).await.unwrap();

    let config = engine.register_config("Svc4", DynamicStringConfig::default()).await.unwrap();

    let fired = Arc::new(AtomicUsize::new(0));
    let notify = Arc::new(tokio::sync::Notify::new());
    let (fired2, notify2) = (fired.clone(), notify.clone());
    config.sv.changed(Box::new(move || {
        fired2.fetch_add(1, Ordering::SeqCst);
        notify2.notify_one();
    }));

    let key = keys::service_config_key("/t", "Svc4", "sv");
    let item = ConfigItem::new("string", "bb", "live-updatable greeting");
    grc_core::provider::Provider::set(write_provider.as_ref(), &key, &item.to_json(), Duration::ZERO)
        .await
        .unwrap();
    tokio::time::timeout(Duration::from_secs(1), notify.notified()).await.expect("first callback fired");
    assert_eq!(fired.load(Ordering::SeqCst), 1);

    // Same payload again: no second notification.
    grc_core::provider::Provider::set(write_provider.as_ref(), &key, &item.to_json(), Duration::ZERO)
        .await
        .unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(fired.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn s5_node_unique_id_stability() {
    let provider = grc_backend_memory::Memory::new();
    let engine = Engine::new(provider, "/t", EngineOptions::new()).await.unwrap();

    let id1 = engine
        .register_node("Svc5", "node1", RegisterNodeOptions::new().with_ops_config())
        .await
        .unwrap();
    let id1_again = engine
        .register_node("Svc5", "node1", RegisterNodeOptions::new().with_ops_config())
        .await
        .unwrap();
    assert_eq!(id1, id1_again);

    let no_ops_a = engine.register_node("Svc5", "node2", RegisterNodeOptions::new()).await.unwrap();
    let no_ops_b = engine.register_node("Svc5", "node2", RegisterNodeOptions::new()).await.unwrap();
    assert_ne!(no_ops_a, no_ops_b);
    assert!(no_ops_a > 0);
    assert!(no_ops_b > 0);
}

/// A user type exposing a `Set(string)`-shaped capability, hydrated as a
/// custom setter field rather than a system scalar or dynamic cell.
struct EpochTime(i64);

impl Default for EpochTime {
    fn default() -> Self {
        Self(0)
    }
}

impl EpochTime {
    fn set(&mut self, s: &str) {
        self.0 = parse_rfc3339_epoch(s);
    }
}

struct TimeConfig {
    at: EpochTime,
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self { at: EpochTime::default() }
    }
}

config_schema! {
    struct TimeConfig {
        #[default = "2020-06-04T21:00:57-08:00", comment = "registration deadline"]
        at: CustomSetter => EpochTime,
    }
}

#[tokio::test]
async fn s6_custom_setter_type() {
    let provider = grc_backend_memory::Memory::new();
    let engine = Engine::new(provider, "/t", EngineOptions::new()).await.unwrap();

    let config = engine.register_config("Svc6", TimeConfig::default()).await.unwrap();
    assert_eq!(config.at.0, 1_591_333_257);
}

/// Days since the Unix epoch for a proleptic-Gregorian civil date, per
/// Howard Hinnant's `days_from_civil` algorithm.
fn days_from_civil(y: i64, m: u32, d: u32) -> i64 {
    let y = if m <= 2 { y - 1 } else { y };
    let era = if y >= 0 { y } else { y - 399 } / 400;
    let yoe = y - era * 400;
    let mp = if m > 2 { m as i64 - 3 } else { m as i64 + 9 };
    let doy = (153 * mp + 2) / 5 + d as i64 - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

fn parse_rfc3339_epoch(s: &str) -> i64 {
    let year: i64 = s[0..4].parse().unwrap();
    let month: u32 = s[5..7].parse().unwrap();
    let day: u32 = s[8..10].parse().unwrap();
    let hour: i64 = s[11..13].parse().unwrap();
    let minute: i64 = s[14..16].parse().unwrap();
    let second: i64 = s[17..19].parse().unwrap();
    let rest = &s[19..];
    let offset_seconds: i64 = if rest.starts_with('Z') || rest.is_empty() {
        0
    } else {
        let sign: i64 = if rest.starts_with('-') { -1 } else { 1 };
        let oh: i64 = rest[1..3].parse().unwrap();
        let om: i64 = rest[4..6].parse().unwrap();
        sign * (oh * 3600 + om * 60)
    };
    days_from_civil(year, month, day) * 86400 + hour * 3600 + minute * 60 + second - offset_seconds
}
