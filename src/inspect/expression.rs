//! Child labels and re-evaluable expressions
//!
//! Every displayed element gets a label and, when possible, a source
//! expression that evaluates exactly that element on its own. The rules
//! depend only on the parent's kind, the parent's expression and the child's
//! position or name:
//!
//! | parent          | child label          | child expression                     |
//! |-----------------|----------------------|--------------------------------------|
//! | map, folded key | `[k]`                | none                                 |
//! | map, pair       | `[i key]`/`[i value]`| none                                 |
//! | slice / array   | `[i]`                | `E[i]`                               |
//! | pointer         | child's name         | `(*(E))`                             |
//! | struct / chan   | field name           | `E.field`, with one `(*(..))` peeled |
//! | interface       | `data`               | none                                 |
//! | top level       | name                 | name                                 |
//! | anything else   | name                 | none                                 |
//!
//! An empty parent expression always yields an empty child expression, except
//! at the top level.

use crate::inspect::pretty::quote_str;
use crate::remote::value::{Kind, RawValue};

/// Keys at least this long are never folded into a label
pub const MIN_INLINE_KEY_VALUE_LEN: usize = 20;

/// Label and expression for one child
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildLabel {
    pub name: String,
    pub expression: String,
}

/// Label and expression for the child at `index` of a non-map parent.
///
/// `parent` is `None` for top-level collections (locals, globals).
pub fn child_label(
    parent: Option<Kind>,
    parent_expr: &str,
    index: usize,
    raw_name: &str,
) -> ChildLabel {
    let (name, expression) = match parent {
        None => (raw_name.to_string(), raw_name.to_string()),
        Some(kind) => match kind {
            Kind::Interface => ("data".to_string(), String::new()),
            Kind::Slice | Kind::Array => {
                let name = format!("[{}]", index);
                let expr = if parent_expr.is_empty() {
                    String::new()
                } else {
                    format!("{}{}", parent_expr, name)
                };
                (name, expr)
            }
            Kind::Ptr => (raw_name.to_string(), deref_expr(parent_expr)),
            Kind::Struct | Kind::Chan => (raw_name.to_string(), field_expr(parent_expr, raw_name)),
            // map children are labelled pairwise, see `map_pair_labels`
            Kind::Map => (raw_name.to_string(), String::new()),
            Kind::Invalid
            | Kind::Bool
            | Kind::Int
            | Kind::Int8
            | Kind::Int16
            | Kind::Int32
            | Kind::Int64
            | Kind::Uint
            | Kind::Uint8
            | Kind::Uint16
            | Kind::Uint32
            | Kind::Uint64
            | Kind::Uintptr
            | Kind::Float32
            | Kind::Float64
            | Kind::Complex64
            | Kind::Complex128
            | Kind::Func
            | Kind::String
            | Kind::UnsafePointer => (raw_name.to_string(), String::new()),
        },
    };
    ChildLabel { name, expression }
}

/// `(*(E))`, or empty when `E` is
pub fn deref_expr(expr: &str) -> String {
    if expr.is_empty() {
        String::new()
    } else {
        format!("(*({}))", expr)
    }
}

/// `E.field`, peeling one `(*(..))` wrapper off `E` first
pub fn field_expr(expr: &str, field: &str) -> String {
    if expr.is_empty() {
        return String::new();
    }
    format!("{}.{}", strip_deref(expr), field)
}

fn strip_deref(expr: &str) -> &str {
    expr.strip_prefix("(*(")
        .and_then(|inner| inner.strip_suffix("))"))
        .unwrap_or(expr)
}

/// How one map entry is laid out in the tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapEntryLabel {
    /// The key is folded into the value's label; the key slot is a placeholder
    Folded { label: String },
    /// Key and value are shown as two separate nodes
    Pair { key: String, value: String },
}

/// Label the map entry at pair position `index`
pub fn map_entry_label(key: &RawValue, index: usize) -> MapEntryLabel {
    if let Some(label) = folded_key_label(key) {
        return MapEntryLabel::Folded { label };
    }
    MapEntryLabel::Pair {
        key: format!("[{} key]", index),
        value: format!("[{} value]", index),
    }
}

/// `["k"]` for short string keys, `[k]` for short numeric keys
pub fn folded_key_label(key: &RawValue) -> Option<String> {
    if !key.children.is_empty() || key.value.len() >= MIN_INLINE_KEY_VALUE_LEN {
        return None;
    }
    match key.kind {
        Kind::String => Some(format!("[{}]", quote_str(&key.value))),
        k if k.is_numeric() => Some(format!("[{}]", key.value)),
        _ => None,
    }
}
