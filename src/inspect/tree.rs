//! Display nodes and the per-panel tree that owns them
//!
//! A [`DisplayTree`] is an arena of [`DisplayNode`]s addressed by [`NodeId`].
//! Nodes are never moved once allocated: a background load that refreshes a
//! node overwrites the slot in place, so a `NodeId` held by the UI (the
//! current selection, an expanded-row set) stays valid for the lifetime of
//! the tree.
//!
//! A tree is replaced wholesale whenever its evaluation scope changes; each
//! replacement carries a new `generation` so that loads issued against the
//! old tree can be recognized and dropped.

use crate::remote::value::{Kind, RawValue};

/// Autoload never looks deeper than this many levels below a root
pub const MAX_AUTOLOAD_DEPTH: usize = 10;

/// Stable handle to a node inside one [`DisplayTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Presentation node derived from one [`RawValue`]
#[derive(Debug, Clone, Default)]
pub struct DisplayNode {
    /// The snapshot this node was built from. Its `children` have been moved
    /// into [`DisplayNode::children`] and are always empty here.
    pub raw: RawValue,
    pub display_name: String,
    pub short_type: String,
    /// Source text that re-evaluates this node; empty when it cannot be
    /// evaluated on its own
    pub expression: String,
    pub unique_id: String,
    pub formatted_value: String,
    /// A background fetch for this node is outstanding
    pub loading: bool,
    /// `None` entries keep map pairs aligned when a key was folded into the
    /// value's label
    pub children: Vec<Option<NodeId>>,
}

impl DisplayNode {
    pub fn kind(&self) -> Kind {
        self.raw.kind
    }

    pub fn full_type(&self) -> &str {
        &self.raw.type_name
    }

    pub fn display_type(&self, full_types: bool) -> &str {
        if full_types {
            &self.raw.type_name
        } else {
            &self.short_type
        }
    }

    /// Elements currently materialized, counting pairs for maps
    pub fn loaded_len(&self) -> usize {
        if self.kind() == Kind::Map {
            self.children.len() / 2
        } else {
            self.children.len()
        }
    }

    /// Elements the debuggee has that are not loaded yet
    pub fn remaining(&self) -> i64 {
        match self.kind() {
            Kind::Array | Kind::Slice | Kind::Map if self.raw.addr != 0 => {
                (self.raw.len - self.loaded_len() as i64).max(0)
            }
            _ => 0,
        }
    }

    pub fn has_more(&self) -> bool {
        self.remaining() > 0
    }

    /// A reference below the top level with a zero address
    pub fn is_nil_at(&self, depth: usize) -> bool {
        depth > 0 && self.raw.addr == 0
    }

    pub fn is_unreadable(&self) -> bool {
        !self.raw.unreadable.is_empty()
    }
}

/// Forest of display nodes owned by one panel
#[derive(Debug, Clone, Default)]
pub struct DisplayTree {
    /// `None` marks a slot freed by [`DisplayTree::replace`]
    nodes: Vec<Option<DisplayNode>>,
    free: Vec<usize>,
    roots: Vec<NodeId>,
    generation: u64,
}

impl DisplayTree {
    pub fn new(generation: u64) -> Self {
        DisplayTree {
            nodes: Vec::new(),
            free: Vec::new(),
            roots: Vec::new(),
            generation,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn is_root(&self, id: NodeId) -> bool {
        self.roots.contains(&id)
    }

    pub fn push_root(&mut self, id: NodeId) {
        self.roots.push(id);
    }

    /// Reorder the roots; `compare` sees the nodes, not their ids
    pub fn sort_roots_by<F>(&mut self, mut compare: F)
    where
        F: FnMut(&DisplayNode, &DisplayNode) -> std::cmp::Ordering,
    {
        let nodes = &self.nodes;
        self.roots.sort_by(|a, b| match (&nodes[a.0], &nodes[b.0]) {
            (Some(a), Some(b)) => compare(a, b),
            (a, b) => a.is_some().cmp(&b.is_some()),
        });
    }

    /// Live nodes, freed slots excluded
    pub fn len(&self) -> usize {
        self.nodes.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn get(&self, id: NodeId) -> Option<&DisplayNode> {
        self.nodes.get(id.0)?.as_ref()
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut DisplayNode> {
        self.nodes.get_mut(id.0)?.as_mut()
    }

    /// Every live node
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut DisplayNode> {
        self.nodes.iter_mut().flatten()
    }

    pub(crate) fn alloc(&mut self, node: DisplayNode) -> NodeId {
        if let Some(slot) = self.free.pop() {
            self.nodes[slot] = Some(node);
            return NodeId(slot);
        }
        self.nodes.push(Some(node));
        NodeId(self.nodes.len() - 1)
    }

    /// Overwrite the node at `id`, keeping the handle valid. The old node's
    /// descendants are freed for reuse; `node`'s own children must already
    /// be allocated.
    pub(crate) fn replace(&mut self, id: NodeId, node: DisplayNode) -> bool {
        let Some(old) = self.nodes.get_mut(id.0).and_then(Option::take) else {
            return false;
        };
        let mut pending: Vec<NodeId> = old.children.iter().flatten().copied().collect();
        while let Some(child) = pending.pop() {
            if let Some(n) = self.nodes.get_mut(child.0).and_then(Option::take) {
                pending.extend(n.children.iter().flatten().copied());
                self.free.push(child.0);
            }
        }
        self.nodes[id.0] = Some(node);
        true
    }

    /// Children of `id`, skipping map alignment placeholders
    pub fn children(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.get(id)
            .into_iter()
            .flat_map(|n| n.children.iter().flatten().copied())
    }

    /// First root whose unique id matches
    pub fn find_root(&self, unique_id: &str) -> Option<NodeId> {
        self.roots
            .iter()
            .copied()
            .find(|&id| self.get(id).is_some_and(|n| n.unique_id == unique_id))
    }

    /// The first open node that should be refreshed without user action.
    ///
    /// A node qualifies when it is address-only, is a struct with no fields
    /// loaded, is a pointer whose target is address-only (the target is
    /// returned), or is an array/slice/map/interface whose first element
    /// qualifies. Nodes at [`MAX_AUTOLOAD_DEPTH`] or deeper are never
    /// considered.
    pub fn autoload_target<F>(&self, mut is_open: F) -> Option<NodeId>
    where
        F: FnMut(NodeId) -> bool,
    {
        self.roots
            .iter()
            .find_map(|&root| self.autoload_visit(root, 0, &mut is_open))
    }

    fn autoload_visit<F>(&self, id: NodeId, depth: usize, is_open: &mut F) -> Option<NodeId>
    where
        F: FnMut(NodeId) -> bool,
    {
        if depth >= MAX_AUTOLOAD_DEPTH {
            return None;
        }
        let node = self.get(id)?;
        if node.loading || node.is_unreadable() || node.is_nil_at(depth) || !is_open(id) {
            return None;
        }
        if node.raw.only_addr && node.raw.addr != 0 {
            return Some(id);
        }

        let first = node.children.first().copied().flatten();
        match node.kind() {
            Kind::Struct if node.children.is_empty() && node.raw.len != 0 => return Some(id),
            Kind::Ptr => {
                if let (Some(target), 1) = (first, node.children.len()) {
                    let t = self.get(target)?;
                    if t.raw.only_addr && t.raw.addr != 0 && !t.loading {
                        return Some(target);
                    }
                }
            }
            Kind::Array | Kind::Slice | Kind::Map => {
                if first.is_some_and(|c| self.needs_reload(c)) {
                    return Some(id);
                }
            }
            Kind::Interface => {
                if let Some(data) = first.and_then(|c| self.get(c)) {
                    let bare_ptr = data.kind() == Kind::Ptr && data.children.is_empty();
                    if (data.raw.only_addr && data.raw.addr != 0) || bare_ptr {
                        return Some(id);
                    }
                }
            }
            _ => {}
        }

        node.children
            .iter()
            .flatten()
            .find_map(|&child| self.autoload_visit(child, depth + 1, is_open))
    }

    fn needs_reload(&self, id: NodeId) -> bool {
        let Some(node) = self.get(id) else {
            return false;
        };
        if node.raw.only_addr {
            return true;
        }
        match node.kind() {
            Kind::Struct => node.children.is_empty() && node.raw.len != 0,
            Kind::Ptr => {
                node.children.len() == 1
                    && node.children[0]
                        .and_then(|c| self.get(c))
                        .is_some_and(|c| c.raw.only_addr)
            }
            _ => false,
        }
    }
}
