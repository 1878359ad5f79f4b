use super::{notify_changed, DynamicValue};
use crate::dispatcher::{CellId, Dispatcher};
use once_cell::sync::OnceCell;
use std::sync::atomic::{AtomicI64, Ordering};

/// A dynamic signed-integer cell, stored internally as `i64`.
pub struct Int {
    id: CellId,
    value: AtomicI64,
    dispatcher: OnceCell<Dispatcher>,
}

impl Int {
    pub fn new(default: i64) -> Self {
        Self { id: CellId::new(), value: AtomicI64::new(default), dispatcher: OnceCell::new() }
    }

    pub fn load(&self) -> i64 {
        self.value.load(Ordering::Acquire)
    }

    pub fn as_i32(&self) -> i32 {
        self.load() as i32
    }

    pub fn as_i16(&self) -> i16 {
        self.load() as i16
    }

    pub fn as_i8(&self) -> i8 {
        self.load() as i8
    }
}

impl Default for Int {
    fn default() -> Self {
        Self::new(0)
    }
}

impl DynamicValue for Int {
    fn cell_id(&self) -> CellId {
        self.id
    }

    fn store(&self, s: &str) {
        let parsed: i64 = s.parse().unwrap_or(0);
        if self.value.swap(parsed, Ordering::AcqRel) == parsed {
            return;
        }
        notify_changed(&self.dispatcher, self.id);
    }

    fn to_canonical_string(&self) -> String {
        self.load().to_string()
    }

    fn dispatcher_slot(&self) -> &OnceCell<Dispatcher> {
        &self.dispatcher
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stores_base_ten() {
        let i = Int::new(0);
        i.store("42");
        assert_eq!(i.load(), 42);
    }
}
