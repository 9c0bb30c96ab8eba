//! Raw value snapshots as reported by the debugger service
//!
//! A [`RawValue`] is an immutable picture of one debuggee value: its [`Kind`],
//! declared type, address, length/capacity and an ordered list of children.
//! Maps report their children as a flattened `key, value, key, value, ...`
//! sequence.
//!
//! A value may be only partially materialized:
//! - `only_addr` marks an address-only placeholder whose contents were never
//!   fetched.
//! - `children.len()` (or half of it, for maps) may be smaller than `len`.
//! - `unreadable` carries the service's diagnostic when the value could not be
//!   read at all.

use serde::{Deserialize, Serialize};

/// Closed set of value kinds understood by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    #[default]
    Invalid,
    Bool,
    Int,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Uintptr,
    Float32,
    Float64,
    Complex64,
    Complex128,
    Array,
    Chan,
    Func,
    Interface,
    Map,
    Ptr,
    Slice,
    String,
    Struct,
    UnsafePointer,
}

impl Kind {
    pub fn is_signed_int(self) -> bool {
        matches!(
            self,
            Kind::Int | Kind::Int8 | Kind::Int16 | Kind::Int32 | Kind::Int64
        )
    }

    pub fn is_unsigned_int(self) -> bool {
        matches!(
            self,
            Kind::Uint | Kind::Uint8 | Kind::Uint16 | Kind::Uint32 | Kind::Uint64 | Kind::Uintptr
        )
    }

    pub fn is_integer(self) -> bool {
        self.is_signed_int() || self.is_unsigned_int()
    }

    pub fn is_float(self) -> bool {
        matches!(self, Kind::Float32 | Kind::Float64)
    }

    pub fn is_complex(self) -> bool {
        matches!(self, Kind::Complex64 | Kind::Complex128)
    }

    /// Kinds that can be written inline as a map key label
    pub fn is_numeric(self) -> bool {
        self.is_integer() || self.is_float() || self.is_complex()
    }

    /// Containers whose tail can be fetched with a `[n:]` slice expression
    pub fn is_sequence(self) -> bool {
        matches!(self, Kind::Array | Kind::Slice)
    }
}

/// Per-variable flags reported alongside the value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VariableFlags {
    /// The variable lives on the heap and was reported through a pointer (`&x`)
    pub escaped: bool,
    /// Another variable with the same name hides this one at the current line
    pub shadowed: bool,
}

/// Snapshot of a single debuggee value
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawValue {
    pub name: String,
    pub addr: u64,
    pub only_addr: bool,
    #[serde(rename = "type")]
    pub type_name: String,
    pub real_type: String,
    pub kind: Kind,
    pub value: String,
    pub len: i64,
    pub cap: i64,
    pub children: Vec<RawValue>,
    /// Entry point for functions, target address for unsafe pointers
    pub base: u64,
    pub unreadable: String,
    pub flags: VariableFlags,
    pub decl_line: i64,
    pub location_expr: String,
}

impl RawValue {
    /// Direct child with the given name (struct fields, channel internals)
    pub fn field(&self, name: &str) -> Option<&RawValue> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn is_readable(&self) -> bool {
        self.unreadable.is_empty()
    }

    /// Number of logical elements currently materialized (pairs for maps)
    pub fn loaded_len(&self) -> usize {
        if self.kind == Kind::Map {
            self.children.len() / 2
        } else {
            self.children.len()
        }
    }

    /// An address-only copy of this value, with no contents
    pub fn placeholder(&self) -> RawValue {
        RawValue {
            name: self.name.clone(),
            addr: self.addr,
            only_addr: true,
            type_name: self.type_name.clone(),
            real_type: self.real_type.clone(),
            kind: self.kind,
            ..RawValue::default()
        }
    }

    /// An unreadable value carrying the error text
    pub fn unreadable(name: &str, message: impl Into<String>) -> RawValue {
        RawValue {
            name: name.to_string(),
            unreadable: message.into(),
            ..RawValue::default()
        }
    }
}
