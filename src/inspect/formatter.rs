//! Formatting rules for displayed values
//!
//! The shown value of a node is chosen by the first rule that applies:
//!
//! 1. an override installed for the node's address ([`ValueOverride`])
//! 2. the printable-ASCII annotation for byte and rune integers
//! 3. a [`CustomFormatter`] registered for the declared type, when allowed
//! 4. the packed `time.Time` decoder
//! 5. the raw value string

use crate::errors::FormatterError;
use crate::inspect::pretty::{quote_char, quote_str};
use crate::inspect::time::{format_time, TIME_TYPE};
use crate::remote::value::{Kind, RawValue};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Types that can never carry a custom formatter
const BUILTIN_TYPES: &[&str] = &[
    "bool",
    "int",
    "int8",
    "int16",
    "int32",
    "int64",
    "byte",
    "rune",
    "uintptr",
    "uint",
    "uint8",
    "uint16",
    "uint32",
    "uint64",
    "float32",
    "float64",
    "complex64",
    "complex128",
    "string",
];

/// Integer types that get a character annotation
const CHAR_TYPES: &[&str] = &["uint8", "byte", "int32", "rune"];

/// Base used to print an integer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum IntMode {
    #[default]
    Dec,
    Hex,
    Oct,
}

/// Notation used to print a float
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatFormat {
    /// Shortest representation that round-trips
    Shortest,
    /// Fixed notation with this many decimals
    Fixed(usize),
    /// Scientific notation with this many decimals
    Exponent(usize),
}

/// Per-address display override chosen by the user
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueOverride {
    Int(IntMode),
    Float(FloatFormat),
}

impl ValueOverride {
    fn name(self) -> &'static str {
        match self {
            ValueOverride::Int(_) => "integer",
            ValueOverride::Float(_) => "float",
        }
    }

    fn accepts(self, kind: Kind) -> bool {
        match self {
            ValueOverride::Int(_) => kind.is_integer(),
            ValueOverride::Float(_) => kind.is_float(),
        }
    }

    /// Render `raw` with this override; `None` if the value does not parse
    pub fn apply(self, raw: &RawValue) -> Option<String> {
        match self {
            ValueOverride::Int(mode) if raw.kind.is_signed_int() => {
                let n: i64 = raw.value.parse().ok()?;
                let sign = if n < 0 { "-" } else { "" };
                Some(match mode {
                    IntMode::Dec => n.to_string(),
                    IntMode::Hex => format!("{}{:#x}", sign, n.unsigned_abs()),
                    IntMode::Oct => format!("{}0o{:o}", sign, n.unsigned_abs()),
                })
            }
            ValueOverride::Int(mode) => {
                let n: u64 = raw.value.parse().ok()?;
                Some(match mode {
                    IntMode::Dec => n.to_string(),
                    IntMode::Hex => format!("{:#x}", n),
                    IntMode::Oct => format!("0o{:o}", n),
                })
            }
            ValueOverride::Float(format) => {
                let x: f64 = raw.value.parse().ok()?;
                Some(match format {
                    FloatFormat::Shortest => shortest_float(x),
                    FloatFormat::Fixed(prec) => format!("{:.*}", prec, x),
                    FloatFormat::Exponent(prec) => format!("{:.*e}", prec, x),
                })
            }
        }
    }
}

/// User-authored formatter for one declared type.
///
/// `fmtstr` accepts the verbs `%v %s %d %x %q` and `%%`; each verb consumes
/// the next entry of `args`, a path such as `name`, `inner.len` or `buf[0]`
/// resolved against the value's children.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CustomFormatter {
    pub fmtstr: String,
    pub args: Vec<String>,
}

impl CustomFormatter {
    pub fn new(fmtstr: impl Into<String>, args: Vec<String>) -> Self {
        CustomFormatter {
            fmtstr: fmtstr.into(),
            args,
        }
    }

    pub fn format(&self, raw: &RawValue) -> String {
        let mut out = String::new();
        let mut args = self.args.iter();
        let mut chars = self.fmtstr.chars();
        while let Some(c) = chars.next() {
            if c != '%' {
                out.push(c);
                continue;
            }
            let Some(verb) = chars.next() else {
                out.push('%');
                break;
            };
            if verb == '%' {
                out.push('%');
                continue;
            }
            let arg = args.next().and_then(|path| resolve_arg(raw, path));
            match arg {
                Some(v) => render_verb(&mut out, verb, v),
                None => out.push('?'),
            }
        }
        out
    }
}

/// Follow `path` through the children of `raw`, stepping through pointers
fn resolve_arg<'a>(raw: &'a RawValue, path: &str) -> Option<&'a RawValue> {
    let mut cur = raw;
    let mut rest = path.trim();
    while !rest.is_empty() {
        while cur.kind == Kind::Ptr {
            cur = cur.children.first()?;
        }
        if let Some(tail) = rest.strip_prefix('[') {
            let (index, tail) = tail.split_once(']')?;
            cur = cur.children.get(index.trim().parse::<usize>().ok()?)?;
            rest = tail;
        } else {
            let rest_field = rest.strip_prefix('.').unwrap_or(rest);
            let end = rest_field.find(['.', '[']).unwrap_or(rest_field.len());
            cur = cur.field(&rest_field[..end])?;
            rest = &rest_field[end..];
        }
    }
    Some(cur)
}

fn render_verb(out: &mut String, verb: char, v: &RawValue) {
    match verb {
        'd' if v.kind.is_integer() => out.push_str(&v.value),
        'x' if v.kind.is_signed_int() => match v.value.parse::<i64>() {
            Ok(n) if n < 0 => {
                let _ = write!(out, "-{:x}", n.unsigned_abs());
            }
            Ok(n) => {
                let _ = write!(out, "{:x}", n);
            }
            Err(_) => out.push('?'),
        },
        'x' if v.kind.is_unsigned_int() => match v.value.parse::<u64>() {
            Ok(n) => {
                let _ = write!(out, "{:x}", n);
            }
            Err(_) => out.push('?'),
        },
        'x' if v.kind == Kind::String => {
            for b in v.value.bytes() {
                let _ = write!(out, "{:02x}", b);
            }
        }
        'q' if v.kind == Kind::String => out.push_str(&quote_str(&v.value)),
        'q' if v.kind.is_integer() => match v.value.parse::<u32>().ok().and_then(char::from_u32) {
            Some(c) => out.push_str(&quote_char(c)),
            None => out.push('?'),
        },
        'v' | 's' => {
            if v.value.is_empty() && v.kind != Kind::String {
                out.push_str(&v.type_name);
            } else {
                out.push_str(&v.value);
            }
        }
        _ => out.push('?'),
    }
}

/// Shortest round-trip digits, switching to exponent form (`1e+21`,
/// `1.5e-07`) when the decimal exponent is below -4 or at least 21
fn shortest_float(x: f64) -> String {
    if x == 0.0 || !x.is_finite() {
        return x.to_string();
    }
    let sci = format!("{:e}", x);
    let Some((mantissa, exp)) = sci.split_once('e') else {
        return x.to_string();
    };
    let Ok(exp) = exp.parse::<i32>() else {
        return x.to_string();
    };
    if (-4..21).contains(&exp) {
        return x.to_string();
    }
    let sign = if exp < 0 { '-' } else { '+' };
    format!("{}e{}{:02}", mantissa, sign, exp.abs())
}

/// Printable-ASCII annotation for byte and rune values: `65 'A'`
fn char_annotation(raw: &RawValue) -> Option<String> {
    if !raw.kind.is_integer() || !CHAR_TYPES.contains(&raw.type_name.as_str()) {
        return None;
    }
    let n: u32 = raw.value.parse().ok()?;
    let c = char::from_u32(n).filter(|c| (' '..='~').contains(c))?;
    Some(format!("{} {}", raw.value, quote_char(c)))
}

/// Address overrides and type-keyed custom formatters
#[derive(Debug, Clone, Default)]
pub struct FormatterRegistry {
    overrides: FxHashMap<u64, ValueOverride>,
    custom: FxHashMap<String, CustomFormatter>,
}

impl FormatterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Key an override on the address of an already evaluated value
    pub fn install_override(
        &mut self,
        raw: &RawValue,
        value_override: ValueOverride,
    ) -> Result<(), FormatterError> {
        if raw.addr == 0 {
            return Err(FormatterError::NoAddress {
                name: raw.name.clone(),
            });
        }
        if !value_override.accepts(raw.kind) {
            return Err(FormatterError::KindMismatch {
                requested: value_override.name(),
                kind: raw.kind,
            });
        }
        self.overrides.insert(raw.addr, value_override);
        Ok(())
    }

    pub fn remove_override(&mut self, addr: u64) -> Option<ValueOverride> {
        self.overrides.remove(&addr)
    }

    pub fn override_at(&self, addr: u64) -> Option<ValueOverride> {
        self.overrides.get(&addr).copied()
    }

    /// Address overrides do not survive a restart of the debuggee
    pub fn clear_overrides(&mut self) {
        self.overrides.clear();
    }

    pub fn install_custom(
        &mut self,
        type_name: &str,
        formatter: CustomFormatter,
    ) -> Result<Option<CustomFormatter>, FormatterError> {
        if BUILTIN_TYPES.contains(&type_name) {
            return Err(FormatterError::BuiltinType(type_name.to_string()));
        }
        Ok(self.custom.insert(type_name.to_string(), formatter))
    }

    pub fn remove_custom(&mut self, type_name: &str) -> Option<CustomFormatter> {
        self.custom.remove(type_name)
    }

    pub fn custom(&self, type_name: &str) -> Option<&CustomFormatter> {
        self.custom.get(type_name)
    }

    pub fn custom_formatters(&self) -> impl Iterator<Item = (&str, &CustomFormatter)> {
        self.custom.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// The value shown for `raw`
    pub fn format(&self, raw: &RawValue, allow_custom: bool) -> String {
        if raw.addr != 0 {
            if let Some(value_override) = self.override_at(raw.addr) {
                return value_override
                    .apply(raw)
                    .unwrap_or_else(|| raw.value.clone());
            }
        }
        if CHAR_TYPES.contains(&raw.type_name.as_str()) && raw.kind.is_integer() {
            return char_annotation(raw).unwrap_or_else(|| raw.value.clone());
        }
        if allow_custom {
            if let Some(custom) = self.custom.get(&raw.type_name) {
                return custom.format(raw);
            }
        }
        if raw.type_name == TIME_TYPE {
            return format_time(raw);
        }
        raw.value.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int(type_name: &str, kind: Kind, value: &str, addr: u64) -> RawValue {
        RawValue {
            name: "n".into(),
            type_name: type_name.into(),
            kind,
            value: value.into(),
            addr,
            ..RawValue::default()
        }
    }

    fn point() -> RawValue {
        RawValue {
            name: "p".into(),
            type_name: "main.Point".into(),
            kind: Kind::Struct,
            addr: 0x200,
            len: 2,
            children: vec![
                int("int", Kind::Int, "10", 0x200),
                int("int", Kind::Int, "-3", 0x208),
            ]
            .into_iter()
            .zip(["X", "Y"])
            .map(|(mut v, name)| {
                v.name = name.into();
                v
            })
            .collect(),
            ..RawValue::default()
        }
    }

    #[test]
    fn test_int_overrides() {
        let v = int("int", Kind::Int, "-255", 0x10);
        assert_eq!(ValueOverride::Int(IntMode::Hex).apply(&v).as_deref(), Some("-0xff"));
        assert_eq!(ValueOverride::Int(IntMode::Oct).apply(&v).as_deref(), Some("-0o377"));
        let v = int("uint64", Kind::Uint64, "255", 0x10);
        assert_eq!(ValueOverride::Int(IntMode::Hex).apply(&v).as_deref(), Some("0xff"));
    }

    #[test]
    fn test_float_overrides() {
        let v = int("float64", Kind::Float64, "1234.5", 0x10);
        assert_eq!(
            ValueOverride::Float(FloatFormat::Fixed(2)).apply(&v).as_deref(),
            Some("1234.50")
        );
        assert_eq!(
            ValueOverride::Float(FloatFormat::Exponent(1)).apply(&v).as_deref(),
            Some("1.2e3")
        );
    }

    #[test]
    fn test_shortest_float_switches_to_exponent() {
        let shortest = |value: &str| {
            let v = int("float64", Kind::Float64, value, 0x10);
            ValueOverride::Float(FloatFormat::Shortest).apply(&v)
        };
        assert_eq!(shortest("1234.5").as_deref(), Some("1234.5"));
        assert_eq!(shortest("0.0001").as_deref(), Some("0.0001"));
        assert_eq!(shortest("1e20").as_deref(), Some("100000000000000000000"));
        assert_eq!(shortest("1e21").as_deref(), Some("1e+21"));
        assert_eq!(shortest("-2.5e22").as_deref(), Some("-2.5e+22"));
        assert_eq!(shortest("1.5e-7").as_deref(), Some("1.5e-07"));
        assert_eq!(shortest("0").as_deref(), Some("0"));
    }

    #[test]
    fn test_install_override_rejects_bad_targets() {
        let mut reg = FormatterRegistry::new();
        let unevaluated = int("int", Kind::Int, "1", 0);
        assert!(matches!(
            reg.install_override(&unevaluated, ValueOverride::Int(IntMode::Hex)),
            Err(FormatterError::NoAddress { .. })
        ));
        let float = int("float64", Kind::Float64, "1.5", 0x10);
        assert!(matches!(
            reg.install_override(&float, ValueOverride::Int(IntMode::Hex)),
            Err(FormatterError::KindMismatch { .. })
        ));
        assert!(reg.override_at(0x10).is_none());
    }

    #[test]
    fn test_ascii_annotation() {
        let reg = FormatterRegistry::new();
        assert_eq!(reg.format(&int("uint8", Kind::Uint8, "65", 1), true), "65 'A'");
        assert_eq!(reg.format(&int("int32", Kind::Int32, "39", 1), true), "39 '\\''");
        assert_eq!(reg.format(&int("int32", Kind::Int32, "7", 1), true), "7");
        assert_eq!(reg.format(&int("int64", Kind::Int64, "65", 1), true), "65");
    }

    #[test]
    fn test_custom_formatter() {
        let mut reg = FormatterRegistry::new();
        reg.install_custom(
            "main.Point",
            CustomFormatter::new("(%d, %x) %v 100%%", vec!["X".into(), "Y".into(), "Z".into()]),
        )
        .expect("not builtin");
        assert_eq!(reg.format(&point(), true), "(10, -3) ? 100%");
        assert_eq!(reg.format(&point(), false), "");
        assert!(reg
            .install_custom("int", CustomFormatter::default())
            .is_err());
    }

    #[test]
    fn test_override_beats_custom_formatter() {
        let mut reg = FormatterRegistry::new();
        reg.install_custom("main.Fd", CustomFormatter::new("fd %d", vec!["".into()]))
            .expect("not builtin");
        let fd = int("main.Fd", Kind::Int, "255", 0x40);
        assert_eq!(reg.format(&fd, true), "fd 255");
        reg.install_override(&fd, ValueOverride::Int(IntMode::Hex))
            .expect("installs");
        assert_eq!(reg.format(&fd, true), "0xff");
        reg.remove_override(0x40);
        assert_eq!(reg.format(&fd, true), "fd 255");
    }

    #[test]
    fn test_resolve_arg_paths() {
        let mut outer = point();
        outer.children.push(RawValue {
            name: "next".into(),
            kind: Kind::Ptr,
            children: vec![point()],
            ..RawValue::default()
        });
        assert_eq!(resolve_arg(&outer, "next.Y").map(|v| v.value.as_str()), Some("-3"));
        assert_eq!(resolve_arg(&outer, "[0]").map(|v| v.value.as_str()), Some("10"));
        assert!(resolve_arg(&outer, "missing").is_none());
    }
}
