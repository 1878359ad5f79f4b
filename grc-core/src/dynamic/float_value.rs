use super::{notify_changed, DynamicValue};
use crate::dispatcher::{CellId, Dispatcher};
use once_cell::sync::OnceCell;
use parking_lot::RwLock;

/// A dynamic floating-point cell.
pub struct Float {
    id: CellId,
    value: RwLock<f64>,
    dispatcher: OnceCell<Dispatcher>,
}

impl Float {
    pub fn new(default: f64) -> Self {
        Self { id: CellId::new(), value: RwLock::new(default), dispatcher: OnceCell::new() }
    }

    pub fn load(&self) -> f64 {
        *self.value.read()
    }

    pub fn as_f32(&self) -> f32 {
        self.load() as f32
    }
}

impl Default for Float {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl DynamicValue for Float {
    fn cell_id(&self) -> CellId {
        self.id
    }

    fn store(&self, s: &str) {
        let parsed: f64 = s.parse().unwrap_or(0.0);
        let mut guard = self.value.write();
        if *guard == parsed {
            return;
        }
        *guard = parsed;
        drop(guard);
        notify_changed(&self.dispatcher, self.id);
    }

    fn to_canonical_string(&self) -> String {
        // Six fractional digits, per the canonical encoding.
        format!("{:.6}", self.load())
    }

    fn dispatcher_slot(&self) -> &OnceCell<Dispatcher> {
        &self.dispatcher
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_six_fractional_digits() {
        let f = Float::new(1.5);
        assert_eq!(f.to_canonical_string(), "1.500000");
    }
}
