use super::{format_entry, notify_changed, split_entry, DynamicValue};
use crate::dispatcher::{CellId, Dispatcher};
use crate::dynamic::slice_value::SliceView;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use std::collections::HashMap;

/// A pure, read-only snapshot view over a map's current entries. Values are
/// stored raw (unsplit) until a nested accessor (`slice_val`/`map_val`) is
/// used to parse one level deeper — the same lazy-nesting behaviour as the
/// original encoding.
#[derive(Debug, Clone, Default)]
pub struct MapView {
    entries: HashMap<String, String>,
    recursable: bool,
}

impl MapView {
    fn new(entries: HashMap<String, String>, recursable: bool) -> Self {
        Self { entries, recursable }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> SliceView {
        SliceView::default().with_elements(self.entries.keys().cloned().collect())
    }

    pub fn string_val(&self, key: &str) -> String {
        self.entries.get(key).cloned().unwrap_or_default()
    }

    pub fn bool_val(&self, key: &str) -> bool {
        self.entries.get(key).and_then(|v| v.parse().ok()).unwrap_or(false)
    }

    pub fn int_val(&self, key: &str) -> i64 {
        self.entries.get(key).and_then(|v| v.parse().ok()).unwrap_or(0)
    }

    pub fn uint_val(&self, key: &str) -> u64 {
        self.entries.get(key).and_then(|v| v.parse().ok()).unwrap_or(0)
    }

    pub fn float_val(&self, key: &str) -> f64 {
        self.entries.get(key).and_then(|v| v.parse().ok()).unwrap_or(0.0)
    }

    /// # Panics
    /// Panics if this view is already a nested (non-recursable) view.
    pub fn slice_val(&self, key: &str) -> SliceView {
        if !self.recursable {
            panic!("grc: only support two level map/slice");
        }
        let raw = self.entries.get(key).cloned().unwrap_or_default();
        SliceView::default().with_elements(raw.split(',').map(str::to_string).collect())
    }

    /// # Panics
    /// Panics if this view is already a nested (non-recursable) view.
    pub fn map_val(&self, key: &str) -> MapView {
        if !self.recursable {
            panic!("grc: only support two level map/slice");
        }
        let raw = self.entries.get(key).cloned().unwrap_or_default();
        MapView::new(parse_entries(&raw, ','), false)
    }

    fn to_canonical_string(&self) -> String {
        let sep = if self.recursable { ";" } else { "," };
        let mut parts: Vec<String> =
            self.entries.iter().map(|(k, v)| format_entry(k, v)).collect();
        parts.sort();
        parts.join(sep)
    }
}

fn parse_entries(s: &str, sep: char) -> HashMap<String, String> {
    if s.is_empty() {
        return HashMap::new();
    }
    s.split(sep)
        .map(|entry| {
            let (k, v) = split_entry(entry);
            (k.to_string(), v.to_string())
        })
        .collect()
}

/// A dynamic map cell. Top-level cells always support one level of nesting
/// (`Store` always splits entries on `;`, values on `,`).
pub struct Map {
    id: CellId,
    value: RwLock<MapView>,
    dispatcher: OnceCell<Dispatcher>,
}

impl Map {
    pub fn new(default: HashMap<String, String>) -> Self {
        Self {
            id: CellId::new(),
            value: RwLock::new(MapView::new(default, true)),
            dispatcher: OnceCell::new(),
        }
    }

    pub fn load(&self) -> MapView {
        self.value.read().clone()
    }

    pub fn len(&self) -> usize {
        self.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.load().is_empty()
    }

    pub fn keys(&self) -> SliceView {
        self.load().keys()
    }

    pub fn string_val(&self, key: &str) -> String {
        self.load().string_val(key)
    }

    pub fn bool_val(&self, key: &str) -> bool {
        self.load().bool_val(key)
    }

    pub fn int_val(&self, key: &str) -> i64 {
        self.load().int_val(key)
    }

    pub fn uint_val(&self, key: &str) -> u64 {
        self.load().uint_val(key)
    }

    pub fn float_val(&self, key: &str) -> f64 {
        self.load().float_val(key)
    }

    pub fn slice_val(&self, key: &str) -> SliceView {
        self.load().slice_val(key)
    }

    pub fn map_val(&self, key: &str) -> MapView {
        self.load().map_val(key)
    }
}

impl Default for Map {
    fn default() -> Self {
        Self::new(HashMap::new())
    }
}

impl DynamicValue for Map {
    fn cell_id(&self) -> CellId {
        self.id
    }

    fn store(&self, s: &str) {
        let entries = parse_entries(s, ';');
        let mut guard = self.value.write();
        if guard.entries == entries {
            return;
        }
        guard.entries = entries;
        drop(guard);
        notify_changed(&self.dispatcher, self.id);
    }

    fn to_canonical_string(&self) -> String {
        self.load().to_canonical_string()
    }

    fn dispatcher_slot(&self) -> &OnceCell<Dispatcher> {
        &self.dispatcher
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hydrates_flat_map() {
        let m = Map::default();
        m.store("a:1,b:2");
        assert_eq!(m.int_val("a"), 1);
        assert_eq!(m.int_val("b"), 2);
    }

    #[test]
    fn two_level_nesting() {
        let m = Map::default();
        m.store("a_1:bb_2:1,cc_2:2;b_1:dd_2:19,ee_2:20");
        let a = m.map_val("a_1");
        assert_eq!(a.int_val("bb_2"), 1);
        assert_eq!(a.int_val("cc_2"), 2);
        let b = m.map_val("b_1");
        assert_eq!(b.int_val("dd_2"), 19);
        assert_eq!(b.int_val("ee_2"), 20);
    }

    #[test]
    fn empty_value_omits_colon() {
        let m = Map::default();
        m.store("solo,b:2");
        assert_eq!(m.string_val("solo"), "");
        assert_eq!(m.int_val("b"), 2);
    }
}
