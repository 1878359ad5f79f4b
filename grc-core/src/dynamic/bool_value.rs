use super::{notify_changed, DynamicValue};
use crate::dispatcher::{CellId, Dispatcher};
use once_cell::sync::OnceCell;
use std::sync::atomic::{AtomicBool, Ordering};

/// A dynamic boolean cell.
pub struct Bool {
    id: CellId,
    value: AtomicBool,
    dispatcher: OnceCell<Dispatcher>,
}

impl Bool {
    pub fn new(default: bool) -> Self {
        Self { id: CellId::new(), value: AtomicBool::new(default), dispatcher: OnceCell::new() }
    }

    pub fn load(&self) -> bool {
        self.value.load(Ordering::Acquire)
    }
}

impl Default for Bool {
    fn default() -> Self {
        Self::new(false)
    }
}

impl DynamicValue for Bool {
    fn cell_id(&self) -> CellId {
        self.id
    }

    fn store(&self, s: &str) {
        let parsed = s.parse::<bool>().unwrap_or(false);
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
    fn parses_canonical_bool() {
        let b = Bool::new(false);
        b.store("true");
        assert!(b.load());
    }
}
