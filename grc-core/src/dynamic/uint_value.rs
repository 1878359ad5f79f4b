use super::{notify_changed, DynamicValue};
use crate::dispatcher::{CellId, Dispatcher};
use once_cell::sync::OnceCell;
use std::sync::atomic::{AtomicU64, Ordering};

/// A dynamic unsigned-integer cell, stored internally as `u64`.
pub struct Uint {
    id: CellId,
    value: AtomicU64,
    dispatcher: OnceCell<Dispatcher>,
}

impl Uint {
    pub fn new(default: u64) -> Self {
        Self { id: CellId::new(), value: AtomicU64::new(default), dispatcher: OnceCell::new() }
    }

    pub fn load(&self) -> u64 {
        self.value.load(Ordering::Acquire)
    }

    pub fn as_u32(&self) -> u32 {
        self.load() as u32
    }
}

impl Default for Uint {
    fn default() -> Self {
        Self::new(0)
    }
}

impl DynamicValue for Uint {
    fn cell_id(&self) -> CellId {
        self.id
    }

    fn store(&self, s: &str) {
        let parsed: u64 = s.parse().unwrap_or(0);
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
