use super::{notify_changed, DynamicValue};
use crate::dispatcher::{CellId, Dispatcher};
use once_cell::sync::OnceCell;
use parking_lot::RwLock;

/// A dynamic string cell.
pub struct StringValue {
    id: CellId,
    value: RwLock<String>,
    dispatcher: OnceCell<Dispatcher>,
}

impl StringValue {
    pub fn new(default: impl Into<String>) -> Self {
        Self { id: CellId::new(), value: RwLock::new(default.into()), dispatcher: OnceCell::new() }
    }

    /// Lock-free-ish read of the current value (a short read-lock).
    pub fn load(&self) -> String {
        self.value.read().clone()
    }
}

impl Default for StringValue {
    fn default() -> Self {
        Self::new(String::new())
    }
}

impl DynamicValue for StringValue {
    fn cell_id(&self) -> CellId {
        self.id
    }

    fn store(&self, s: &str) {
        let mut guard = self.value.write();
        if guard.as_str() == s {
            return;
        }
        *guard = s.to_string();
        drop(guard);
        notify_changed(&self.dispatcher, self.id);
    }

    fn to_canonical_string(&self) -> String {
        self.load()
    }

    fn dispatcher_slot(&self) -> &OnceCell<Dispatcher> {
        &self.dispatcher
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equal_store_is_noop_value() {
        let s = StringValue::new("aa");
        s.store("aa");
        assert_eq!(s.load(), "aa");
    }

    #[test]
    fn store_replaces_value() {
        let s = StringValue::new("aa");
        s.store("bb");
        assert_eq!(s.load(), "bb");
    }
}
