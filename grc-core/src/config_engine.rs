//! C5 Config Engine: auto-creation, initial hydration and the live bind
//! loop for a single registered config target.

use crate::dispatcher::Dispatcher;
use crate::error::{BackendUnavailable, Error};
use crate::keys;
use crate::provider::{EventType, Provider, WatchEvent};
use crate::schema::{reflected_items, ConfigSchema};
use snafu::ResultExt;
use std::sync::Arc;
use tokio::sync::watch;

/// Register `T` under `service`, returning the live, shared target.
///
/// Sequence: reflect the schema's defaults, create any keys missing from the
/// store (auto-creation never overwrites an existing key), perform initial
/// hydration against an owned `&mut T`, wrap the result in `Arc<T>`, then
/// spawn the bind loop. Only the bind loop ever touches the `Arc<T>` again,
/// and only through `hydrate_dynamic(&self, ..)` — static fields are never
/// reassigned past this point, mirroring the original's
/// `forUpdate || setStaticValue(..)` short-circuit.
pub async fn register_config<T>(
    provider: Arc<dyn Provider>,
    base_path: String,
    service: String,
    mut target: T,
    auto_create: bool,
    dispatcher: Dispatcher,
    mut shutdown: watch::Receiver<bool>,
) -> Result<Arc<T>, Error>
where
    T: ConfigSchema + Send + Sync + 'static,
{
    let prefix = keys::service_config_prefix(&base_path, &service);

    if auto_create {
        create_missing_keys::<T>(&provider, &base_path, &service)
            .await
            .context(BackendUnavailable { during: "auto-creating config keys" })?;
    }

    let watch_rx = provider
        .watch(&prefix, true)
        .await
        .context(BackendUnavailable { during: "opening config watch" })?;

    hydrate_all(&provider, &base_path, &service, &mut target)
        .await
        .context(BackendUnavailable { during: "initial config hydration" })?;

    let target = Arc::new(target);
    target.bind_dispatcher(&dispatcher);

    let bind_target = target.clone();
    tokio::spawn(async move {
        bind_loop(provider, prefix, bind_target, watch_rx, &mut shutdown).await;
    });

    Ok(target)
}

async fn create_missing_keys<T: ConfigSchema>(
    provider: &Arc<dyn Provider>,
    base_path: &str,
    service: &str,
) -> Result<(), crate::provider::ProviderError> {
    let existing = provider.get(&keys::service_config_prefix(base_path, service), true).await?;
    let existing_paths: std::collections::HashSet<&str> = existing
        .iter()
        .filter_map(|kv| kv.key.rsplit('/').next())
        .collect();

    for (path, item) in reflected_items::<T>() {
        if existing_paths.contains(path.as_str()) {
            continue;
        }
        let key = keys::service_config_key(base_path, service, &path);
        provider.set(&key, &item.to_json(), std::time::Duration::from_secs(0)).await?;
    }
    Ok(())
}

/// Fetch every key under the service's config prefix and hydrate `target`
/// with it, dynamic cells and static fields both. Used both for the initial
/// hydration (owned `&mut T`, before the `Arc` wrap) and for re-running a
/// `Reset` against an already-shared target's dynamic cells only.
async fn hydrate_all<T: ConfigSchema>(
    provider: &Arc<dyn Provider>,
    base_path: &str,
    service: &str,
    target: &mut T,
) -> Result<(), crate::provider::ProviderError> {
    let prefix = keys::service_config_prefix(base_path, service);
    let kvs = provider.get(&prefix, true).await?;
    for kv in kvs {
        let Some(path) = kv.key.strip_prefix(&prefix) else { continue };
        let Ok(item) = crate::config_item::ConfigItem::from_json(&kv.value) else { continue };
        if target.hydrate_dynamic(path, &item.value) {
            continue;
        }
        if let Err(e) = target.hydrate_static(path, &item.value) {
            tracing::warn!(error = %e, path = %path, "config field failed to decode");
        }
    }
    Ok(())
}

/// Dynamic-only re-hydration, used for `Reset` events against an already
/// shared `Arc<T>`. Static fields are untouched: a static field's value was
/// fixed forever at initial hydration.
async fn hydrate_dynamic_only<T: ConfigSchema>(
    provider: &Arc<dyn Provider>,
    base_path: &str,
    service: &str,
    target: &Arc<T>,
) -> Result<(), crate::provider::ProviderError> {
    let prefix = keys::service_config_prefix(base_path, service);
    let kvs = provider.get(&prefix, true).await?;
    for kv in kvs {
        let Some(path) = kv.key.strip_prefix(&prefix) else { continue };
        let Ok(item) = crate::config_item::ConfigItem::from_json(&kv.value) else { continue };
        target.hydrate_dynamic(path, &item.value);
    }
    Ok(())
}

async fn bind_loop<T: ConfigSchema + Send + Sync + 'static>(
    provider: Arc<dyn Provider>,
    prefix: String,
    target: Arc<T>,
    mut events: crate::provider::WatchReceiver,
    shutdown: &mut watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => {
                return;
            }
            event = events.recv() => {
                let Some(event) = event else { return };
                apply_event(&provider, &prefix, &target, event).await;
            }
        }
    }
}

async fn apply_event<T: ConfigSchema>(
    provider: &Arc<dyn Provider>,
    prefix: &str,
    target: &Arc<T>,
    event: WatchEvent,
) {
    match event.ty {
        EventType::Reset => {
            let (base_path, service) = split_config_prefix(prefix);
            if let Err(e) = hydrate_dynamic_only(provider, base_path, service, target).await {
                tracing::warn!(error = %e, "config reset re-hydration failed");
            }
        }
        EventType::Put => {
            let Some(path) = event.key.strip_prefix(prefix) else { return };
            let Ok(item) = crate::config_item::ConfigItem::from_json(&event.value) else {
                tracing::warn!(key = %event.key, "config put carried undecodable payload");
                return;
            };
            if !target.hydrate_dynamic(path, &item.value) {
                tracing::debug!(path = %path, "config put on a static or unknown field ignored");
            }
        }
        EventType::Delete => {
            tracing::debug!(key = %event.key, "config key deleted upstream, keeping last known value");
        }
    }
}

/// Split a `<base>/config/<service>/` prefix back into its parts.
fn split_config_prefix(prefix: &str) -> (&str, &str) {
    let trimmed = prefix.trim_end_matches('/');
    let marker = format!("/{}/", keys::CONFIG_PREFIX);
    match trimmed.rfind(&marker) {
        Some(idx) => (&trimmed[..idx], &trimmed[idx + marker.len()..]),
        None => (trimmed, ""),
    }
}
