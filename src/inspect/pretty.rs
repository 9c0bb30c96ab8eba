//! Text renderings of display nodes
//!
//! - [`singleline`]: compact one-line form used for collapsed rows, traced
//!   expressions and breakpoint summaries
//! - [`multiline`]: indented form used by `print` and the diagnostics log
//! - [`shorten_type`]: strips package import paths from type names
//!
//! Both renderings use each node's `formatted_value`, so formatter overrides
//! show up everywhere a value is printed.

use crate::inspect::formatter::FormatterRegistry;
use crate::inspect::tree::{DisplayNode, DisplayTree, NodeId};
use crate::inspect::wrap::Wrapper;
use crate::remote::value::{Kind, RawValue};
use std::fmt::Write;

/// Containers nested deeper than this are elided in one-line output
const MAX_INLINE_DEPTH: usize = 3;

/// Quote a string the way the debuggee's language does
pub fn quote_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() && (c as u32) < 0x80 => {
                let _ = write!(out, "\\x{:02x}", c as u32);
            }
            c if c.is_control() => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

/// Character literal for a printable ASCII code point
pub fn quote_char(c: char) -> String {
    match c {
        '\'' => "'\\''".to_string(),
        '\\' => "'\\\\'".to_string(),
        c => format!("'{}'", c),
    }
}

/// Drop import paths from every qualified name in a type:
/// `map[string]*github.com/a/b.T` becomes `map[string]*b.T`.
pub fn shorten_type(ty: &str) -> String {
    let mut out = String::with_capacity(ty.len());
    let mut word = String::new();
    let flush = |word: &mut String, out: &mut String| {
        match word.rfind('/') {
            Some(slash) => out.push_str(&word[slash + 1..]),
            None => out.push_str(word),
        }
        word.clear();
    };
    for c in ty.chars() {
        if c.is_alphanumeric() || matches!(c, '_' | '.' | '/' | '-') {
            word.push(c);
        } else {
            flush(&mut word, &mut out);
            out.push(c);
        }
    }
    flush(&mut word, &mut out);
    out
}

/// One-line rendering of `id`
pub fn singleline(tree: &DisplayTree, id: NodeId, include_type: bool, full_types: bool) -> String {
    let printer = Printer {
        tree,
        full_types,
        indent: None,
    };
    let mut out = String::new();
    printer.write(&mut out, id, include_type, 0);
    out
}

/// Multi-line rendering of `id`; nested lines start with `indent`
pub fn multiline(tree: &DisplayTree, id: NodeId, indent: &str) -> String {
    let printer = Printer {
        tree,
        full_types: true,
        indent: Some(indent),
    };
    let mut out = String::new();
    printer.write(&mut out, id, true, 0);
    out
}

/// `name=value, ...` for breakpoint-hit lines. Custom formatters are not
/// applied: these values are loaded with the short policy.
pub fn breakpoint_summary(formatters: &FormatterRegistry, args: Vec<RawValue>) -> String {
    let wrapper = Wrapper::new(formatters, false);
    let mut tree = DisplayTree::new(0);
    let mut parts = Vec::with_capacity(args.len());
    for arg in args {
        let name = arg.name.clone();
        let id = wrapper.wrap(&mut tree, arg, &name, &name);
        parts.push(format!("{}={}", name, singleline(&tree, id, true, true)));
    }
    parts.join(", ")
}

struct Printer<'a> {
    tree: &'a DisplayTree,
    full_types: bool,
    indent: Option<&'a str>,
}

impl Printer<'_> {
    fn write(&self, out: &mut String, id: NodeId, include_type: bool, depth: usize) {
        let Some(n) = self.tree.get(id) else {
            out.push('?');
            return;
        };
        if n.is_unreadable() {
            let _ = write!(out, "(unreadable {})", n.raw.unreadable);
            return;
        }
        if n.raw.only_addr {
            let _ = write!(out, "(*{})({:#x})", n.display_type(self.full_types), n.raw.addr);
            return;
        }
        let ty = n.display_type(self.full_types);
        let nil_reference = n.is_nil_at(depth)
            && matches!(
                n.kind(),
                Kind::Ptr | Kind::Slice | Kind::Map | Kind::Chan | Kind::Interface | Kind::Func
            );
        if nil_reference {
            out.push_str("nil");
            return;
        }

        match n.kind() {
            Kind::Ptr => match n.children.first().copied().flatten() {
                None => out.push('?'),
                Some(target) => {
                    let target_nil = self.tree.get(target).map_or(true, |t| t.raw.addr == 0);
                    if n.raw.type_name.is_empty() || target_nil {
                        out.push_str("nil");
                    } else {
                        out.push('*');
                        self.write(out, target, include_type, depth + 1);
                    }
                }
            },
            Kind::UnsafePointer => {
                let target = n
                    .children
                    .first()
                    .copied()
                    .flatten()
                    .and_then(|c| self.tree.get(c))
                    .map_or(n.raw.base, |c| c.raw.addr);
                let _ = write!(out, "unsafe.Pointer({:#x})", target);
            }
            Kind::String => {
                out.push_str(&quote_str(&n.formatted_value));
                if n.raw.len > n.raw.value.len() as i64 {
                    out.push_str("...");
                }
            }
            Kind::Slice | Kind::Array => {
                if include_type {
                    let _ = write!(out, "{} ", ty);
                }
                if depth > MAX_INLINE_DEPTH && self.indent.is_none() {
                    out.push_str("[...]");
                    return;
                }
                let items: Vec<String> = n
                    .children
                    .iter()
                    .flatten()
                    .map(|&c| self.render(c, false, depth + 1))
                    .collect();
                self.write_list(out, n, items, ('[', ']'), depth);
            }
            Kind::Struct => {
                if include_type {
                    out.push_str(ty);
                }
                if (n.children.is_empty() && n.raw.len > 0)
                    || (depth > MAX_INLINE_DEPTH && self.indent.is_none())
                {
                    out.push_str(" {...}");
                    return;
                }
                let items: Vec<String> = n
                    .children
                    .iter()
                    .flatten()
                    .filter_map(|&c| {
                        let field = self.tree.get(c)?;
                        Some(format!(
                            "{}: {}",
                            field.display_name,
                            self.render(c, false, depth + 1)
                        ))
                    })
                    .collect();
                self.write_list(out, n, items, ('{', '}'), depth);
            }
            Kind::Map => {
                if include_type {
                    let _ = write!(out, "{} ", ty);
                }
                if depth > MAX_INLINE_DEPTH && self.indent.is_none() {
                    out.push_str("[...]");
                    return;
                }
                let items: Vec<String> = n
                    .children
                    .chunks(2)
                    .filter_map(|pair| self.render_entry(pair, depth))
                    .collect();
                self.write_list(out, n, items, ('[', ']'), depth);
            }
            Kind::Interface => {
                let data = n
                    .children
                    .first()
                    .copied()
                    .flatten()
                    .and_then(|c| self.tree.get(c).map(|d| (c, d)));
                match data {
                    Some((c, d)) if d.kind() != Kind::Invalid => {
                        if include_type {
                            let _ = write!(out, "{}({}) ", ty, d.display_type(self.full_types));
                        }
                        self.write(out, c, false, depth);
                    }
                    _ => out.push_str("nil"),
                }
            }
            Kind::Chan => {
                if n.children.is_empty() {
                    out.push_str("nil");
                    return;
                }
                let count = self.field_value(n, "qcount");
                let size = self.field_value(n, "dataqsiz");
                match (count, size) {
                    (Some(count), Some(size)) => {
                        let _ = write!(out, "{} {}/{}", ty, count, size);
                    }
                    _ => out.push_str(ty),
                }
            }
            Kind::Func => {
                if n.formatted_value.is_empty() {
                    out.push_str("nil");
                } else {
                    out.push_str(&n.formatted_value);
                }
            }
            Kind::Complex64 | Kind::Complex128 => {
                let mut parts = n
                    .children
                    .iter()
                    .flatten()
                    .filter_map(|&c| self.tree.get(c).map(|p| p.formatted_value.as_str()));
                match (parts.next(), parts.next()) {
                    (Some(re), Some(im)) => {
                        let _ = write!(out, "({} + {}i)", re, im);
                    }
                    _ => out.push_str(&n.formatted_value),
                }
            }
            kind => {
                if n.formatted_value.is_empty() {
                    let _ = write!(out, "(unknown {:?})", kind);
                } else {
                    out.push_str(&n.formatted_value);
                }
            }
        }
    }

    fn render(&self, id: NodeId, include_type: bool, depth: usize) -> String {
        let mut s = String::new();
        self.write(&mut s, id, include_type, depth);
        s
    }

    fn render_entry(&self, pair: &[Option<NodeId>], depth: usize) -> Option<String> {
        match pair {
            // folded key: label is `[k]`
            [Some(value), None] => {
                let v = self.tree.get(*value)?;
                let key = v
                    .display_name
                    .strip_prefix('[')
                    .and_then(|k| k.strip_suffix(']'))
                    .unwrap_or(&v.display_name);
                Some(format!("{}: {}", key, self.render(*value, false, depth + 1)))
            }
            [Some(key), Some(value)] => Some(format!(
                "{}: {}",
                self.render(*key, false, depth + 1),
                self.render(*value, false, depth + 1)
            )),
            _ => None,
        }
    }

    fn field_value<'n>(&'n self, n: &DisplayNode, name: &str) -> Option<&'n str> {
        n.children
            .iter()
            .flatten()
            .filter_map(|&c| self.tree.get(c))
            .find(|c| c.raw.name == name)
            .map(|c| c.formatted_value.as_str())
    }

    fn write_list(
        &self,
        out: &mut String,
        n: &DisplayNode,
        mut items: Vec<String>,
        (open, close): (char, char),
        depth: usize,
    ) {
        let remaining = n.remaining();
        if remaining > 0 {
            items.push(format!("...+{} more", remaining));
        }
        out.push(open);
        match self.indent {
            Some(indent) if !items.is_empty() => {
                let inner = format!("{}{}", indent, "\t".repeat(depth + 1));
                for item in &items {
                    let _ = write!(out, "\n{}{},", inner, item);
                }
                let _ = write!(out, "\n{}{}", indent, "\t".repeat(depth));
            }
            _ => out.push_str(&items.join(", ")),
        }
        out.push(close);
    }
}
