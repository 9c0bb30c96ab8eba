//! Variable pane rendering: watches, locals and globals
//!
//! Each pane is a flat list of [`Row`]s built from one or more panel trees.
//! Open nodes show their children on the following rows, indented one level;
//! a truncated container ends with an "N more" row and a node waiting on a
//! background load shows a "Loading..." row.

use crate::inspect::pretty::singleline;
use crate::inspect::{DisplayNode, DisplayTree, NodeId, NodeRef, PanelId, Workspace};
use crate::remote::value::Kind;
use crate::ui::theme::DEFAULT_THEME;
use ratatui::{
    layout::Rect,
    style::{Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem},
    Frame,
};
use rustc_hash::FxHashSet;

/// Nodes the user expanded
pub type OpenSet = FxHashSet<NodeRef>;

/// One visible line of a variable pane
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Row {
    Header(&'static str),
    Node { target: NodeRef, depth: usize },
    Loading { depth: usize },
    More { target: NodeRef, depth: usize, remaining: i64 },
}

impl Row {
    pub fn target(&self) -> Option<NodeRef> {
        match *self {
            Row::Node { target, .. } | Row::More { target, .. } => Some(target),
            Row::Header(_) | Row::Loading { .. } => None,
        }
    }
}

/// Scroll and selection state for a variable pane
#[derive(Debug, Default)]
pub struct VariablesScrollState {
    pub offset: usize,
    pub selected: usize,
}

/// Data needed to render a variable pane
pub struct VariablesRenderData<'a> {
    pub title: &'a str,
    pub workspace: &'a Workspace,
    pub rows: &'a [Row],
    pub open: &'a OpenSet,
    pub show_addr: bool,
    pub full_types: bool,
}

/// Whether a node has anything to show when opened
pub fn is_expandable(tree: &DisplayTree, node: &DisplayNode, depth: usize) -> bool {
    if node.is_nil_at(depth) || node.is_unreadable() {
        return false;
    }
    let first = node
        .children
        .first()
        .copied()
        .flatten()
        .and_then(|c| tree.get(c));
    match node.kind() {
        Kind::Ptr => first.is_some_and(|t| t.raw.addr != 0),
        Kind::Interface => first.is_some_and(|d| d.kind() != Kind::Invalid),
        Kind::Struct => node.raw.len > 0 || !node.children.is_empty(),
        _ => !node.children.is_empty() || node.raw.only_addr || node.has_more(),
    }
}

/// Flatten the given panels into rows. Watch panels are grouped under a
/// "Watches" header.
pub fn collect_rows(ws: &Workspace, panels: &[PanelId], open: &OpenSet) -> Vec<Row> {
    let mut rows = Vec::new();
    let mut in_watches = false;
    for &panel in panels {
        let Some(tree) = ws.tree(panel) else { continue };
        match panel {
            PanelId::Watch(_) if !in_watches => {
                rows.push(Row::Header("Watches"));
                in_watches = true;
            }
            PanelId::Locals if in_watches => {
                rows.push(Row::Header("Locals"));
                in_watches = false;
            }
            _ => {}
        }
        for &root in tree.roots() {
            push_node(&mut rows, tree, panel, root, 0, open);
        }
    }
    rows
}

fn push_node(
    rows: &mut Vec<Row>,
    tree: &DisplayTree,
    panel: PanelId,
    id: NodeId,
    depth: usize,
    open: &OpenSet,
) {
    let Some(node) = tree.get(id) else { return };
    let target = NodeRef {
        panel,
        generation: tree.generation(),
        node: id,
    };
    rows.push(Row::Node { target, depth });
    if !open.contains(&target) || !is_expandable(tree, node, depth) {
        return;
    }
    if node.loading {
        rows.push(Row::Loading { depth: depth + 1 });
    }
    for child in tree.children(id) {
        push_node(rows, tree, panel, child, depth + 1, open);
    }
    if node.has_more() {
        rows.push(Row::More {
            target,
            depth: depth + 1,
            remaining: node.remaining(),
        });
    }
}

/// The formatted value when there is one, the one-line rendering otherwise
fn display_value(tree: &DisplayTree, id: NodeId, node: &DisplayNode, full_types: bool) -> String {
    if node.formatted_value.is_empty() || node.kind() == Kind::String || node.is_unreadable() {
        singleline(tree, id, false, full_types)
    } else {
        node.formatted_value.clone()
    }
}

fn value_style(node: &DisplayNode) -> Style {
    let color = if node.is_unreadable() {
        DEFAULT_THEME.error
    } else if node.kind() == Kind::String {
        DEFAULT_THEME.string
    } else if node.kind().is_numeric() || node.kind() == Kind::Bool {
        DEFAULT_THEME.number
    } else if node.kind() == Kind::Func {
        DEFAULT_THEME.function
    } else {
        DEFAULT_THEME.fg
    };
    Style::default().fg(color)
}

fn render_row<'a>(
    data: &VariablesRenderData<'a>,
    row: &Row,
    content_width: usize,
) -> Line<'a> {
    let comment = Style::default().fg(DEFAULT_THEME.comment);
    match *row {
        Row::Header(title) => Line::from(Span::styled(
            format!("── {} ", title),
            Style::default()
                .fg(DEFAULT_THEME.secondary)
                .add_modifier(Modifier::BOLD),
        )),
        Row::Loading { depth } => Line::from(vec![
            Span::raw("  ".repeat(depth)),
            Span::styled("Loading...", comment.add_modifier(Modifier::ITALIC)),
        ]),
        Row::More {
            depth, remaining, ..
        } => Line::from(vec![
            Span::raw("  ".repeat(depth)),
            Span::styled(
                format!("[ {} more ]", remaining),
                Style::default().fg(DEFAULT_THEME.primary),
            ),
        ]),
        Row::Node { target, depth } => {
            let Some(tree) = data.workspace.tree(target.panel) else {
                return Line::from("");
            };
            let Some(node) = tree.get(target.node) else {
                return Line::from("");
            };
            let expandable = is_expandable(tree, node, depth);
            let is_open = expandable && data.open.contains(&target);
            let marker = match (expandable, is_open) {
                (true, true) => "▾ ",
                (true, false) => "▸ ",
                _ => "  ",
            };
            let name_color = match target.panel {
                PanelId::Watch(_) if depth == 0 => DEFAULT_THEME.watch,
                _ => DEFAULT_THEME.fg,
            };

            let mut spans = Vec::new();
            let mut left_width = 0;
            if data.show_addr {
                let addr = format!("0x{:08x} ", node.raw.addr);
                left_width += addr.len();
                spans.push(Span::styled(addr, comment));
            }
            let indent = "  ".repeat(depth);
            left_width += indent.len() + 2 + node.display_name.chars().count();
            spans.push(Span::raw(indent));
            spans.push(Span::styled(marker, Style::default().fg(DEFAULT_THEME.secondary)));
            spans.push(Span::styled(
                node.display_name.clone(),
                Style::default().fg(name_color),
            ));

            if !is_open {
                let value = display_value(tree, target.node, node, data.full_types);
                left_width += 3 + value.chars().count();
                spans.push(Span::styled(" = ", comment));
                spans.push(Span::styled(value, value_style(node)));
            }

            let type_str = node.display_type(data.full_types).to_string();
            let padding = content_width.saturating_sub(left_width + type_str.chars().count() + 1);
            spans.push(Span::raw(" ".repeat(padding.max(1))));
            spans.push(Span::styled(
                type_str,
                Style::default().fg(DEFAULT_THEME.type_name),
            ));
            Line::from(spans)
        }
    }
}

/// Render a variable pane
pub fn render_variables_pane(
    frame: &mut Frame,
    area: Rect,
    data: VariablesRenderData,
    is_focused: bool,
    scroll_state: &mut VariablesScrollState,
) {
    let border_style = if is_focused {
        Style::default()
            .fg(DEFAULT_THEME.border_focused)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(DEFAULT_THEME.border_normal)
    };

    let block = Block::default()
        .title(format!(" {} ", data.title))
        .borders(Borders::ALL)
        .border_style(border_style);

    if data.rows.is_empty() {
        let list = List::new(vec![
            ListItem::new("(empty)").style(Style::default().fg(DEFAULT_THEME.comment))
        ])
        .block(block);
        frame.render_widget(list, area);
        return;
    }

    let content_width = area.width.saturating_sub(2) as usize; // borders only
    let total_items = data.rows.len();
    let visible_height = area.height.saturating_sub(2).max(1) as usize; // Account for borders, min 1

    // Keep the selection on screen
    scroll_state.selected = scroll_state.selected.min(total_items - 1);
    if scroll_state.selected < scroll_state.offset {
        scroll_state.offset = scroll_state.selected;
    } else if scroll_state.selected >= scroll_state.offset + visible_height {
        scroll_state.offset = scroll_state.selected + 1 - visible_height;
    }
    scroll_state.offset = scroll_state
        .offset
        .min(total_items.saturating_sub(visible_height));

    let visible_items: Vec<ListItem> = data
        .rows
        .iter()
        .enumerate()
        .skip(scroll_state.offset)
        .take(visible_height)
        .map(|(i, row)| {
            let item = ListItem::new(render_row(&data, row, content_width));
            if is_focused && i == scroll_state.selected {
                item.style(Style::default().bg(DEFAULT_THEME.selection_bg))
            } else {
                item
            }
        })
        .collect();

    let list = List::new(visible_items).block(block);
    frame.render_widget(list, area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inspect::FormatterRegistry;
    use crate::remote::value::RawValue;
    use crate::remote::{DebuggerService, EvalScope, LoadPolicy};
    use crate::errors::EvalError;
    use crate::scrollback::Scrollback;

    struct OneLocal(RawValue);

    impl DebuggerService for OneLocal {
        fn evaluate(&self, _: EvalScope, e: &str, _: LoadPolicy) -> Result<RawValue, EvalError> {
            Err(EvalError::UnknownVariable(e.to_string()))
        }
        fn list_package_variables(&self, _: &str, _: LoadPolicy) -> Result<Vec<RawValue>, EvalError> {
            Ok(Vec::new())
        }
        fn list_function_args(&self, _: EvalScope, _: LoadPolicy) -> Result<Vec<RawValue>, EvalError> {
            Ok(Vec::new())
        }
        fn list_local_variables(&self, _: EvalScope, _: LoadPolicy) -> Result<Vec<RawValue>, EvalError> {
            Ok(vec![self.0.clone()])
        }
    }

    fn int(name: &str, addr: u64) -> RawValue {
        RawValue {
            name: name.into(),
            kind: Kind::Int,
            type_name: "int".into(),
            value: "1".into(),
            addr,
            ..RawValue::default()
        }
    }

    #[test]
    fn test_rows_follow_open_nodes() {
        let nil_ptr = RawValue {
            name: "next".into(),
            kind: Kind::Ptr,
            type_name: "*main.T".into(),
            children: vec![RawValue {
                kind: Kind::Struct,
                type_name: "main.T".into(),
                ..RawValue::default()
            }],
            ..RawValue::default()
        };
        let slice = RawValue {
            name: "s".into(),
            kind: Kind::Slice,
            type_name: "[]int".into(),
            addr: 0x50,
            len: 10,
            children: vec![int("", 0x60), int("", 0x68)],
            ..RawValue::default()
        };
        let local = RawValue {
            name: "t".into(),
            kind: Kind::Struct,
            type_name: "main.T".into(),
            addr: 0x40,
            len: 2,
            children: vec![nil_ptr, slice],
            ..RawValue::default()
        };
        let mut ws = Workspace::new(FormatterRegistry::new(), LoadPolicy::LONG, Scrollback::new());
        ws.refresh_locals(&OneLocal(local)).expect("refresh");

        let mut open = OpenSet::default();
        let rows = collect_rows(&ws, &[PanelId::Locals], &open);
        assert_eq!(rows.len(), 1);

        let root = rows[0].target().expect("root");
        open.insert(root);
        let rows = collect_rows(&ws, &[PanelId::Locals], &open);
        assert_eq!(rows.len(), 3);

        let slice = rows[2].target().expect("slice");
        open.insert(slice);
        let next = rows[1].target().expect("next");
        open.insert(next);
        let rows = collect_rows(&ws, &[PanelId::Locals], &open);
        // t, next (nil, nothing below), s, [0], [1], more
        assert_eq!(rows.len(), 6);
        assert!(matches!(rows[5], Row::More { remaining: 8, .. }));
    }
}
