use super::{notify_changed, DynamicValue};
use crate::dispatcher::{CellId, Dispatcher};
use once_cell::sync::OnceCell;
use parking_lot::RwLock;

/// A pure, read-only snapshot view over a slice's current elements. Two
/// nesting levels are supported: a top-level [`Slice`] cell's view can
/// descend one level via [`SliceView::nested`]; the resulting view cannot
/// descend further.
#[derive(Debug, Clone, Default)]
pub struct SliceView {
    elements: Vec<String>,
    recursable: bool,
}

impl SliceView {
    fn new(elements: Vec<String>, recursable: bool) -> Self {
        Self { elements, recursable }
    }

    pub(crate) fn with_elements(mut self, elements: Vec<String>) -> Self {
        self.elements = elements;
        self
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn strings(&self) -> Vec<String> {
        self.elements.clone()
    }

    pub fn bools(&self) -> Vec<bool> {
        self.elements.iter().map(|v| v.parse().unwrap_or(false)).collect()
    }

    pub fn ints(&self) -> Vec<i64> {
        self.elements.iter().map(|v| v.parse().unwrap_or(0)).collect()
    }

    pub fn uints(&self) -> Vec<u64> {
        self.elements.iter().map(|v| v.parse().unwrap_or(0)).collect()
    }

    pub fn floats(&self) -> Vec<f64> {
        self.elements.iter().map(|v| v.parse().unwrap_or(0.0)).collect()
    }

    /// Descend into the nested, comma-separated elements of `self.elements[i]`.
    ///
    /// # Panics
    /// Panics if this view is already a nested (non-recursable) view, or if
    /// `i` is out of range — container nesting beyond two levels is a
    /// schema error that should have been caught at registration time.
    pub fn nested(&self, i: usize) -> SliceView {
        if !self.recursable {
            panic!("grc: only support two level map/slice");
        }
        let elem = self.elements.get(i).unwrap_or_else(|| panic!("grc: index out of range"));
        SliceView::new(elem.split(',').map(str::to_string).collect(), false)
    }

    fn to_canonical_string(&self) -> String {
        let sep = if self.recursable { ";" } else { "," };
        self.elements.join(sep)
    }
}

/// A dynamic slice cell. Top-level cells always support one level of
/// nesting (`Store` always splits on `;`).
pub struct Slice {
    id: CellId,
    value: RwLock<SliceView>,
    dispatcher: OnceCell<Dispatcher>,
}

impl Slice {
    pub fn new(default: impl IntoIterator<Item = String>) -> Self {
        Self {
            id: CellId::new(),
            value: RwLock::new(SliceView::new(default.into_iter().collect(), true)),
            dispatcher: OnceCell::new(),
        }
    }

    pub fn load(&self) -> SliceView {
        self.value.read().clone()
    }

    pub fn len(&self) -> usize {
        self.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.load().is_empty()
    }

    pub fn strings(&self) -> Vec<String> {
        self.load().strings()
    }

    pub fn bools(&self) -> Vec<bool> {
        self.load().bools()
    }

    pub fn ints(&self) -> Vec<i64> {
        self.load().ints()
    }

    pub fn uints(&self) -> Vec<u64> {
        self.load().uints()
    }

    pub fn floats(&self) -> Vec<f64> {
        self.load().floats()
    }

    pub fn nested(&self, i: usize) -> SliceView {
        self.load().nested(i)
    }
}

impl Default for Slice {
    fn default() -> Self {
        Self::new(std::iter::empty())
    }
}

impl DynamicValue for Slice {
    fn cell_id(&self) -> CellId {
        self.id
    }

    fn store(&self, s: &str) {
        let elements: Vec<String> = s.split(';').map(str::to_string).collect();
        let mut guard = self.value.write();
        if guard.elements == elements {
            return;
        }
        guard.elements = elements;
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
    fn hydrates_bool_slice() {
        let s = Slice::default();
        s.store("false,true");
        assert_eq!(s.bools(), vec![false, true]);
    }

    #[test]
    fn two_level_nesting() {
        let s = Slice::default();
        s.store("1,2;3,4");
        assert_eq!(s.nested(0).ints(), vec![1, 2]);
        assert_eq!(s.nested(1).ints(), vec![3, 4]);
    }

    #[test]
    #[should_panic(expected = "only support two level")]
    fn panics_beyond_two_levels() {
        let s = Slice::default();
        s.store("1,2");
        let nested = s.nested(0);
        let _ = nested.nested(0);
    }
}
