//! Conversion of raw snapshots into display nodes

use crate::inspect::expression::{child_label, map_entry_label, MapEntryLabel};
use crate::inspect::formatter::FormatterRegistry;
use crate::inspect::pretty::shorten_type;
use crate::inspect::tree::{DisplayNode, DisplayTree, NodeId};
use crate::remote::value::{Kind, RawValue};

/// Builds display nodes into a [`DisplayTree`], formatting values with a
/// borrowed [`FormatterRegistry`]
#[derive(Debug, Clone, Copy)]
pub struct Wrapper<'a> {
    formatters: &'a FormatterRegistry,
    allow_custom: bool,
}

impl<'a> Wrapper<'a> {
    pub fn new(formatters: &'a FormatterRegistry, allow_custom: bool) -> Self {
        Wrapper {
            formatters,
            allow_custom,
        }
    }

    /// Wrap a top-level value and allocate it in `tree`. The node is not
    /// made a root; see [`DisplayTree::push_root`].
    pub fn wrap(&self, tree: &mut DisplayTree, raw: RawValue, name: &str, expr: &str) -> NodeId {
        let node = self.build(tree, raw, name, expr, 0);
        tree.alloc(node)
    }

    /// Build the node for `raw` at `depth`, allocating its descendants in
    /// `tree` but not the node itself
    pub fn build(
        &self,
        tree: &mut DisplayTree,
        mut raw: RawValue,
        name: &str,
        expr: &str,
        depth: usize,
    ) -> DisplayNode {
        let formatted_value = self.formatters.format(&raw, self.allow_custom);
        let display_name = if name.is_empty() {
            raw.type_name.clone()
        } else {
            name.to_string()
        };
        let short_type = shorten_type(&raw.type_name);

        let kind = raw.kind;
        let raw_children = std::mem::take(&mut raw.children);
        let nil_reference = depth > 0 && raw.addr == 0 && !kind.is_complex();
        let children = if nil_reference {
            Vec::new()
        } else {
            self.wrap_collection(tree, raw_children, Some(kind), 0, expr, depth + 1)
        };

        if kind == Kind::Interface {
            collapse_interface_data(tree, &children);
        }

        DisplayNode {
            raw,
            unique_id: display_name.clone(),
            display_name,
            short_type,
            expression: expr.to_string(),
            formatted_value,
            loading: false,
            children,
        }
    }

    /// Wrap a run of siblings. `start` is the index of the first element in
    /// its parent (pair index for maps); `parent` is `None` for top-level
    /// collections.
    pub fn wrap_collection(
        &self,
        tree: &mut DisplayTree,
        raws: Vec<RawValue>,
        parent: Option<Kind>,
        start: usize,
        expr: &str,
        depth: usize,
    ) -> Vec<Option<NodeId>> {
        let mut out = Vec::with_capacity(raws.len());
        if parent == Some(Kind::Map) {
            let mut entries = raws.into_iter();
            let mut index = start;
            while let (Some(key), Some(mut value)) = (entries.next(), entries.next()) {
                match map_entry_label(&key, index) {
                    MapEntryLabel::Folded { label } => {
                        value.name = label[1..label.len() - 1].to_string();
                        let node = self.build(tree, value, &label, "", depth);
                        out.push(Some(tree.alloc(node)));
                        out.push(None);
                    }
                    MapEntryLabel::Pair {
                        key: key_label,
                        value: value_label,
                    } => {
                        let k = self.build(tree, key, &key_label, "", depth);
                        out.push(Some(tree.alloc(k)));
                        let v = self.build(tree, value, &value_label, "", depth);
                        out.push(Some(tree.alloc(v)));
                    }
                }
                index += 1;
            }
            return out;
        }

        for (i, raw) in raws.into_iter().enumerate() {
            let label = child_label(parent, expr, start + i, &raw.name);
            let node = self.build(tree, raw, &label.name, &label.expression, depth);
            out.push(Some(tree.alloc(node)));
        }
        out
    }
}

/// `data (*T)` followed by its target: the target takes over the pointer's
/// label
fn collapse_interface_data(tree: &mut DisplayTree, children: &[Option<NodeId>]) {
    let Some(data) = children.first().copied().flatten().and_then(|id| tree.get(id)) else {
        return;
    };
    if data.kind() != Kind::Ptr {
        return;
    }
    let label = data.display_name.clone();
    let Some(target) = data.children.first().copied().flatten() else {
        return;
    };
    if let Some(t) = tree.get_mut(target) {
        t.display_name = label;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar(kind: Kind, type_name: &str, value: &str) -> RawValue {
        RawValue {
            kind,
            type_name: type_name.into(),
            value: value.into(),
            addr: 0x1000,
            ..RawValue::default()
        }
    }

    fn names(tree: &DisplayTree, ids: &[Option<NodeId>]) -> Vec<Option<String>> {
        ids.iter()
            .map(|id| id.and_then(|id| tree.get(id)).map(|n| n.display_name.clone()))
            .collect()
    }

    #[test]
    fn test_anonymous_value_is_named_after_its_type() {
        let reg = FormatterRegistry::new();
        let mut tree = DisplayTree::new(0);
        let id = Wrapper::new(&reg, true).wrap(&mut tree, scalar(Kind::Int, "int", "1"), "", "");
        let n = tree.get(id).expect("allocated");
        assert_eq!(n.display_name, "int");
        assert_eq!(n.unique_id, "int");
        assert_eq!(n.expression, "");
    }

    #[test]
    fn test_map_folding_and_pairs() {
        let reg = FormatterRegistry::new();
        let mut tree = DisplayTree::new(0);
        let w = Wrapper::new(&reg, true);
        let raws = vec![
            scalar(Kind::String, "string", "a"),
            scalar(Kind::Int, "int", "1"),
            RawValue {
                kind: Kind::Struct,
                type_name: "main.K".into(),
                addr: 0x2000,
                children: vec![scalar(Kind::Int, "int", "9")],
                ..RawValue::default()
            },
            scalar(Kind::Int, "int", "2"),
        ];
        let ids = w.wrap_collection(&mut tree, raws, Some(Kind::Map), 3, "m", 1);
        assert_eq!(
            names(&tree, &ids),
            vec![
                Some("[\"a\"]".to_string()),
                None,
                Some("[4 key]".to_string()),
                Some("[4 value]".to_string()),
            ]
        );
        let folded = ids[0].and_then(|id| tree.get(id)).expect("folded");
        assert_eq!(folded.raw.name, "\"a\"");
        assert!(folded.expression.is_empty());
    }

    #[test]
    fn test_slice_children_continue_from_start() {
        let reg = FormatterRegistry::new();
        let mut tree = DisplayTree::new(0);
        let w = Wrapper::new(&reg, true);
        let raws = vec![scalar(Kind::Int, "int", "5"), scalar(Kind::Int, "int", "6")];
        let ids = w.wrap_collection(&mut tree, raws, Some(Kind::Slice), 16, "s", 1);
        let exprs: Vec<String> = ids
            .iter()
            .flatten()
            .filter_map(|&id| tree.get(id).map(|n| n.expression.clone()))
            .collect();
        assert_eq!(exprs, vec!["s[16]", "s[17]"]);
    }

    #[test]
    fn test_nil_reference_has_no_children() {
        let reg = FormatterRegistry::new();
        let mut tree = DisplayTree::new(0);
        let nil_ptr = RawValue {
            name: "next".into(),
            kind: Kind::Ptr,
            type_name: "*main.Node".into(),
            addr: 0,
            children: vec![RawValue {
                kind: Kind::Struct,
                ..RawValue::default()
            }],
            ..RawValue::default()
        };
        let outer = RawValue {
            name: "n".into(),
            kind: Kind::Struct,
            type_name: "main.Node".into(),
            addr: 0x3000,
            len: 1,
            children: vec![nil_ptr],
            ..RawValue::default()
        };
        let id = Wrapper::new(&reg, true).wrap(&mut tree, outer, "n", "n");
        let field = tree.children(id).next().expect("field");
        let field = tree.get(field).expect("node");
        assert_eq!(field.expression, "n.next");
        assert!(field.children.is_empty());
    }

    #[test]
    fn test_interface_pointer_target_takes_pointer_label() {
        let reg = FormatterRegistry::new();
        let mut tree = DisplayTree::new(0);
        let iface = RawValue {
            name: "err".into(),
            kind: Kind::Interface,
            type_name: "error".into(),
            addr: 0x4000,
            children: vec![RawValue {
                kind: Kind::Ptr,
                type_name: "*errors.errorString".into(),
                addr: 0x4008,
                children: vec![RawValue {
                    kind: Kind::Struct,
                    type_name: "errors.errorString".into(),
                    addr: 0x5000,
                    ..RawValue::default()
                }],
                ..RawValue::default()
            }],
            ..RawValue::default()
        };
        let id = Wrapper::new(&reg, true).wrap(&mut tree, iface, "err", "err");
        let data = tree.children(id).next().expect("data");
        assert_eq!(tree.get(data).map(|n| n.display_name.as_str()), Some("data"));
        let target = tree.children(data).next().expect("target");
        assert_eq!(tree.get(target).map(|n| n.display_name.as_str()), Some("data"));
    }
}
