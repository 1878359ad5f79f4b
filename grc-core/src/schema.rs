//! Schema Reflector, realized without runtime reflection (§9 design note 1,
//! §4.3 of `SPEC_FULL.md`). A type derives [`ConfigSchema`] — by hand, or
//! via the [`config_schema!`] declarative macro — to describe its leaf
//! fields as a flat list of [`FieldDescriptor`]s instead of being walked by
//! a reflector at runtime.

use crate::config_item::ConfigItem;
use crate::dispatcher::Dispatcher;
use crate::error::Error;
use std::collections::HashMap;

/// The three field shapes the original reflector recognised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// A boolean, integer, float, string, duration, or a (single-level, or
    /// two-level container of) slice/map thereof.
    SystemScalar(ScalarType),
    /// One of the seven dynamic cell variants. `container` is set for the
    /// `Slice`/`Map` cells, whose `Store` always splits on `;` at the top
    /// level regardless of how the default annotation was written.
    DynamicCell { container: bool },
    /// A user type exposing a `Set(string)`-shaped capability.
    CustomSetter,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarType {
    String,
    Bool,
    Int,
    Uint,
    Float,
    /// Nanosecond integer parsed from a human duration annotation (`"1h"`).
    Duration,
    Slice,
    Map,
}

/// A single leaf field, as the reflector would have emitted it.
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    /// Slash-delimited path, e.g. `"Nested/Field"`.
    pub path: &'static str,
    /// Raw default annotation, canonically encoded.
    pub default: &'static str,
    pub comment: &'static str,
    pub kind: FieldKind,
}

impl FieldDescriptor {
    pub fn to_config_item(&self) -> ConfigItem {
        ConfigItem::new(self.type_name(), self.canonical_default(), self.comment)
    }

    fn type_name(&self) -> &'static str {
        match self.kind {
            FieldKind::SystemScalar(ScalarType::String) => "string",
            FieldKind::SystemScalar(ScalarType::Bool) => "bool",
            FieldKind::SystemScalar(ScalarType::Int) => "int",
            FieldKind::SystemScalar(ScalarType::Uint) => "uint",
            FieldKind::SystemScalar(ScalarType::Float) => "float",
            FieldKind::SystemScalar(ScalarType::Duration) => "duration",
            FieldKind::SystemScalar(ScalarType::Slice) => "slice",
            FieldKind::SystemScalar(ScalarType::Map) => "map",
            FieldKind::DynamicCell { .. } => "dynamic",
            FieldKind::CustomSetter => "custom",
        }
    }

    /// A dynamic slice/map cell's `Store` always splits on `;` at the top
    /// level (see `dynamic` module docs), but a `#[default = ...]`
    /// annotation is commonly written with `,` throughout, the same way a
    /// flat `SystemScalar` slice/map default is. Normalize it here, once, at
    /// the point the default is turned into the `ConfigItem` that gets
    /// auto-created in the backend — mirrors the original reflector's
    /// `formatDefaultValue`.
    fn canonical_default(&self) -> String {
        if matches!(self.kind, FieldKind::DynamicCell { container: true }) && !self.default.contains(';') {
            self.default.replace(',', ";")
        } else {
            self.default.to_string()
        }
    }
}

/// Implemented by every type that can be registered with the Config Engine.
///
/// `fields()` is the reflected key -> default map (§4.3); `hydrate`/
/// `hydrate_dynamic` are the two halves of "setConfig" (§4.4): a dynamic
/// cell's `Store` is always called, while a static field is only assigned
/// during initial hydration, never on a later watch event.
pub trait ConfigSchema {
    /// The flat field list this type exposes.
    fn fields() -> Vec<FieldDescriptor>;

    /// Route `value` into the dynamic cell at `path`, if there is one.
    /// Returns `true` if `path` named a dynamic cell (handled either way).
    fn hydrate_dynamic(&self, path: &str, value: &str) -> bool;

    /// Assign `value` into the static field at `path`. Only called during
    /// initial hydration; returns an error if `path` doesn't decode into
    /// the target field's type. Unknown paths are schema drift, and are the
    /// caller's responsibility to log and skip, not an error here.
    fn hydrate_static(&mut self, path: &str, value: &str) -> Result<(), Error>;

    /// Bind every dynamic cell field to `dispatcher`, called once by
    /// `config_engine::register_config` right after the target is wrapped in
    /// its `Arc`. Static and custom-setter fields are no-ops here — only a
    /// `DynamicCell` field has a dispatcher slot to fill.
    fn bind_dispatcher(&self, dispatcher: &Dispatcher);
}

/// Whether a `config_schema!` field's cell type is one of the two
/// container-shaped dynamic cells (`Slice`/`Map`), identified from the
/// field's declared type name. Used by the macro's `@descriptor` arm to set
/// [`FieldKind::DynamicCell`]'s `container` flag, since a dynamic cell
/// carries no other shape information at schema-reflection time.
#[doc(hidden)]
pub fn type_name_is_container(ty: &str) -> bool {
    matches!(ty.rsplit("::").next().unwrap_or(ty), "Slice" | "Map")
}

/// Compute the key -> `ConfigItem` map a schema reflects to, rooted at
/// nothing (the caller prefixes with the service's config path).
pub fn reflected_items<T: ConfigSchema>() -> HashMap<String, ConfigItem> {
    T::fields()
        .into_iter()
        .map(|f| (f.path.to_string(), f.to_config_item()))
        .collect()
}

/// Declarative macro generating a `ConfigSchema` impl, replacing the
/// original's runtime struct walk (teacher style: `macro_rules!`-generated
/// boilerplate, as in `common/src/mbus_api/send.rs`'s
/// `bus_impl_message_all!`, rather than a `syn`/`quote` proc-macro crate).
///
/// ```ignore
/// config_schema! {
///     struct MyConfig {
///         #[default = "1", comment = "some int"]
///         iv: Int => i64,
///         #[default = "aa", comment = "dynamic string"]
///         sv: DynamicCell => StringValue,
///     }
/// }
/// ```
#[macro_export]
macro_rules! config_schema {
    (
        struct $name:ident {
            $(
                #[default = $default:expr, comment = $comment:expr]
                $field:ident : $kind:tt => $ty:ty
            ),* $(,)?
        }
    ) => {
        impl $crate::schema::ConfigSchema for $name {
            fn fields() -> Vec<$crate::schema::FieldDescriptor> {
                vec![
                    $(
                        $crate::config_schema!(@descriptor $field, $default, $comment, $kind, $ty)
                    ),*
                ]
            }

            fn hydrate_dynamic(&self, path: &str, value: &str) -> bool {
                $(
                    if path == stringify!($field) {
                        return $crate::config_schema!(@hydrate_dynamic self, $field, value, $kind);
                    }
                )*
                false
            }

            fn hydrate_static(&mut self, path: &str, value: &str) -> Result<(), $crate::error::Error> {
                $(
                    if path == stringify!($field) {
                        return $crate::config_schema!(@hydrate_static self, $field, value, $kind);
                    }
                )*
                Ok(())
            }

            fn bind_dispatcher(&self, dispatcher: &$crate::dispatcher::Dispatcher) {
                $(
                    $crate::config_schema!(@bind_dispatcher self, $field, dispatcher, $kind);
                )*
            }
        }
    };

    (@descriptor $field:ident, $default:expr, $comment:expr, DynamicCell, $ty:ty) => {
        $crate::schema::FieldDescriptor {
            path: stringify!($field),
            default: $default,
            comment: $comment,
            kind: $crate::schema::FieldKind::DynamicCell {
                container: $crate::schema::type_name_is_container(stringify!($ty)),
            },
        }
    };
    (@descriptor $field:ident, $default:expr, $comment:expr, CustomSetter, $ty:ty) => {
        $crate::schema::FieldDescriptor {
            path: stringify!($field),
            default: $default,
            comment: $comment,
            kind: $crate::schema::FieldKind::CustomSetter,
        }
    };
    (@descriptor $field:ident, $default:expr, $comment:expr, $scalar:ident, $ty:ty) => {
        $crate::schema::FieldDescriptor {
            path: stringify!($field),
            default: $default,
            comment: $comment,
            kind: $crate::schema::FieldKind::SystemScalar($crate::schema::ScalarType::$scalar),
        }
    };

    (@hydrate_dynamic $self:ident, $field:ident, $value:ident, DynamicCell) => {
        {
            $crate::dynamic::DynamicValue::store(&$self.$field, $value);
            true
        }
    };
    (@hydrate_dynamic $self:ident, $field:ident, $value:ident, $other:tt) => {
        false
    };

    (@hydrate_static $self:ident, $field:ident, $value:ident, CustomSetter) => {
        {
            $self.$field.set($value);
            Ok(())
        }
    };
    (@hydrate_static $self:ident, $field:ident, $value:ident, $scalar:ident) => {
        {
            $crate::schema::decode_scalar($value, &mut $self.$field);
            Ok(())
        }
    };

    (@bind_dispatcher $self:ident, $field:ident, $dispatcher:ident, DynamicCell) => {
        $crate::dynamic::DynamicValue::attach_dispatcher(&$self.$field, $dispatcher.clone());
    };
    (@bind_dispatcher $self:ident, $field:ident, $dispatcher:ident, $other:tt) => {};
}

/// Decode a canonical string into a system scalar/container type. Used by
/// `config_schema!`'s generated `hydrate_static` arm for non-dynamic,
/// non-custom fields.
pub trait DecodeScalar: Sized {
    fn decode(s: &str) -> Self;
}

pub fn decode_scalar<T: DecodeScalar>(s: &str, target: &mut T) {
    *target = T::decode(s);
}

impl DecodeScalar for String {
    fn decode(s: &str) -> Self {
        s.to_string()
    }
}
impl DecodeScalar for bool {
    fn decode(s: &str) -> Self {
        s.parse().unwrap_or(false)
    }
}
impl DecodeScalar for i64 {
    fn decode(s: &str) -> Self {
        s.parse().unwrap_or(0)
    }
}
impl DecodeScalar for i32 {
    fn decode(s: &str) -> Self {
        s.parse().unwrap_or(0)
    }
}
impl DecodeScalar for u64 {
    fn decode(s: &str) -> Self {
        s.parse().unwrap_or(0)
    }
}
impl DecodeScalar for f64 {
    fn decode(s: &str) -> Self {
        s.parse().unwrap_or(0.0)
    }
}
impl DecodeScalar for std::time::Duration {
    fn decode(s: &str) -> Self {
        humantime::parse_duration(s).unwrap_or_default()
    }
}
impl<T: DecodeScalar> DecodeScalar for Option<T> {
    fn decode(s: &str) -> Self {
        Some(T::decode(s))
    }
}
impl DecodeScalar for Vec<bool> {
    fn decode(s: &str) -> Self {
        s.split(',').map(|v| v.parse().unwrap_or(false)).collect()
    }
}
impl DecodeScalar for Vec<i64> {
    fn decode(s: &str) -> Self {
        s.split(',').map(|v| v.parse().unwrap_or(0)).collect()
    }
}
fn split_kv(entry: &str) -> (&str, &str) {
    match entry.split_once(':') {
        Some((k, v)) => (k, v),
        None => (entry, ""),
    }
}

impl DecodeScalar for HashMap<String, i64> {
    fn decode(s: &str) -> Self {
        s.split(',')
            .map(|entry| {
                let (k, v) = split_kv(entry);
                (k.to_string(), v.parse().unwrap_or(0))
            })
            .collect()
    }
}
impl DecodeScalar for HashMap<String, HashMap<String, i32>> {
    fn decode(s: &str) -> Self {
        s.split(';')
            .map(|top| {
                let (k, raw) = split_kv(top);
                let inner: HashMap<String, i32> = raw
                    .split(',')
                    .map(|entry| {
                        let (ik, iv) = split_kv(entry);
                        (ik.to_string(), iv.parse().unwrap_or(0))
                    })
                    .collect();
                (k.to_string(), inner)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_two_level_map_default() {
        let m: HashMap<String, HashMap<String, i32>> =
            DecodeScalar::decode("a_1:bb_2:1,cc_2:2;b_1:dd_2:19,ee_2:20");
        assert_eq!(m["a_1"]["bb_2"], 1);
        assert_eq!(m["a_1"]["cc_2"], 2);
        assert_eq!(m["b_1"]["dd_2"], 19);
        assert_eq!(m["b_1"]["ee_2"], 20);
    }
}
