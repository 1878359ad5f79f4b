//! Dynamic cells: atomically updatable typed values whose mutations flow
//! through the [`crate::dispatcher::Dispatcher`].
//!
//! Canonical string encodings (the wire format used by `Store`/`to_string`):
//! bool is `true`/`false`; numerics are base-10; floats format with six
//! fractional digits; slices join elements with `;` at the top level and
//! `,` inside a nested element; maps join entries with `;` at the top level
//! and `,` inside a nested entry, each entry being `k:v` with `:v` omitted
//! when the value is empty. Nesting deeper than two levels is a schema
//! error, enforced in [`crate::schema`].

mod bool_value;
mod float_value;
mod int_value;
mod map_value;
mod slice_value;
mod string_value;
mod uint_value;

pub use bool_value::Bool;
pub use float_value::Float;
pub use int_value::Int;
pub use map_value::{Map, MapView};
pub use slice_value::{Slice, SliceView};
pub use string_value::StringValue;
pub use uint_value::Uint;

use crate::dispatcher::{Callback, CellId, Dispatcher};
use once_cell::sync::OnceCell;

/// Common capability of every dynamic cell: parse a canonical string into
/// the cell's type and atomically swap it in, notifying subscribers iff the
/// value actually changed.
pub trait DynamicValue: Send + Sync {
    /// Stable identity used as the dispatcher's map key.
    fn cell_id(&self) -> CellId;

    /// Parse `s` into this cell's type. A no-op (parsed value equal to the
    /// current one) emits no event.
    fn store(&self, s: &str);

    /// Current value, canonically encoded.
    fn to_canonical_string(&self) -> String;

    /// The slot this cell's dispatcher is bound into, set once by
    /// `Engine::register_config` before a caller can observe the returned
    /// target. A cell constructed and used on its own (e.g. in a unit test)
    /// is never bound: registrations and notifications against it are then
    /// silent no-ops instead of reaching for a dispatcher that doesn't exist.
    fn dispatcher_slot(&self) -> &OnceCell<Dispatcher>;

    /// Bind the dispatcher this cell's changes route through. A no-op past
    /// the first call.
    fn attach_dispatcher(&self, dispatcher: Dispatcher) {
        let _ = self.dispatcher_slot().set(dispatcher);
    }

    /// Register `cb` to run (on the dispatcher's worker) whenever this cell
    /// changes. Callbacks for one cell fire in registration order. A no-op
    /// if no dispatcher has been bound yet.
    fn changed(&self, cb: Callback) {
        if let Some(dispatcher) = self.dispatcher_slot().get() {
            dispatcher.register(self.cell_id(), cb);
        }
    }
}

pub(crate) fn notify_changed(slot: &OnceCell<Dispatcher>, id: CellId) {
    if let Some(dispatcher) = slot.get() {
        dispatcher.notify(id);
    }
}

/// Split `a:b` into `("a", "b")`, treating a missing `:v` as empty, per the
/// canonical map-entry encoding.
pub(crate) fn split_entry(entry: &str) -> (&str, &str) {
    match entry.split_once(':') {
        Some((k, v)) => (k, v),
        None => (entry, ""),
    }
}

/// Format a map entry, omitting `:v` when `v` is empty.
pub(crate) fn format_entry(k: &str, v: &str) -> String {
    if v.is_empty() {
        k.to_string()
    } else {
        format!("{k}:{v}")
    }
}
