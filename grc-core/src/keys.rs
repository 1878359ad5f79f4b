//! Key schema helpers. Every key lives under a user-supplied base path;
//! these are the only functions that know the on-disk layout, so an
//! out-of-tree admin tool can depend on them directly instead of
//! re-deriving the schema (mirrors `build_key_prefix` being public in the
//! teacher's `common/src/store/etcd.rs`).

pub const CONFIG_PREFIX: &str = "config";
pub const SERVICE_PREFIX: &str = "service";
pub const OPS_PREFIX: &str = "ops";
pub const NODE_ID_PREFIX: &str = "node_id";

/// `<base>/config/<service>/`
pub fn service_config_prefix(base: &str, service: &str) -> String {
    format!("{base}/{CONFIG_PREFIX}/{service}/")
}

/// `<base>/config/<service>/<field-path>`
pub fn service_config_key(base: &str, service: &str, field_path: &str) -> String {
    format!("{}{}", service_config_prefix(base, service), field_path)
}

/// `<base>/service/`
pub fn service_discovery_prefix(base: &str) -> String {
    format!("{base}/{SERVICE_PREFIX}/")
}

/// `<base>/service/<service>/`
pub fn service_subtree_prefix(base: &str, service: &str) -> String {
    format!("{}{}/", service_discovery_prefix(base), service)
}

/// `<base>/service/<service>/<address>`
pub fn service_discovery_key(base: &str, service: &str, address: &str) -> String {
    format!("{}{}", service_subtree_prefix(base, service), address)
}

/// `<base>/ops/<service>/<address>`
pub fn service_ops_key(base: &str, service: &str, address: &str) -> String {
    format!("{base}/{OPS_PREFIX}/{service}/{address}")
}

/// `<base>/node_id/<service>`
pub fn service_node_id_key(base: &str, service: &str) -> String {
    format!("{base}/{NODE_ID_PREFIX}/{service}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_matches_spec_layout() {
        assert_eq!(service_config_key("/test", "Svc", "IV"), "/test/config/Svc/IV");
        assert_eq!(service_discovery_key("/test", "Svc", "node1"), "/test/service/Svc/node1");
        assert_eq!(service_ops_key("/test", "Svc", "node1"), "/test/ops/Svc/node1");
        assert_eq!(service_node_id_key("/test", "Svc"), "/test/node_id/Svc");
    }
}
